use thiserror::Error;

/// Numerical domain violations.
///
/// These are the only errors allowed to cross a gate boundary. The pipeline
/// catches them at its edge, converts them into an EMERGENCY reject and
/// escalates the DRP state machine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainViolation {
    /// Compounding domain floor breached: r <= -1 + eps.
    ///
    /// Requires DRP EMERGENCY activation; the raw return is carried for audit.
    #[error("compounding domain violation: r={r:.12} <= -1 + {eps:.3e}")]
    Compounding { r: f64, eps: f64 },

    /// NaN or infinity reached a computation that forbids fallbacks.
    #[error("non-finite value in {context}: {value}")]
    NonFinite { context: &'static str, value: f64 },

    /// Quadratic heat form produced a negative square beyond tolerance.
    #[error("negative heat^2 beyond tolerance: {value:.6e} < -{tol:.3e}")]
    NegativeHeatSquare { value: f64, tol: f64 },

    /// Variance denominator collapsed below zero.
    #[error("negative variance denominator: {value:.6e}")]
    NegativeVariance { value: f64 },
}

/// Typed conflicts returned by the reservation ledger API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    #[error("portfolio risk limit exceeded")]
    PortfolioLimitExceeded,
    #[error("cluster risk limit exceeded")]
    ClusterLimitExceeded,
    #[error("gross risk limit exceeded")]
    GrossLimitExceeded,
    #[error("heat budget exceeded")]
    HeatBudgetExceeded,
    #[error("stale portfolio snapshot: used {used}, current {current}")]
    StaleSnapshot { used: u64, current: u64 },
    #[error("unknown reservation: {0}")]
    UnknownReservation(uuid::Uuid),
    #[error("writer queue overloaded: depth {depth} > cap {cap}")]
    WriterOverloaded { depth: usize, cap: usize },
    #[error("optimistic commit failed after {retries} retries")]
    CommitConflict { retries: u32 },
}

/// Entity validation failures (schema-level, pre-admission).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} is not finite: {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} out of range: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("level ordering violated for {direction}: entry={entry}, tp={tp}, sl={sl}")]
    LevelOrdering {
        direction: &'static str,
        entry: f64,
        tp: f64,
        sl: f64,
    },
    #[error("artifact sha256 malformed: {0}")]
    BadArtifactHash(String),
    #[error("probabilities do not sum to 1: p_fail={p_fail} p_neutral={p_neutral} p_success={p_success}")]
    ProbabilitySum {
        p_fail: f64,
        p_neutral: f64,
        p_success: f64,
    },
    #[error("feature schema version {got} incompatible, model requires {required}")]
    FeatureSchemaIncompatible { got: u32, required: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_violation_display() {
        let err = DomainViolation::Compounding { r: -1.0, eps: 1e-6 };
        let msg = err.to_string();
        assert!(msg.contains("compounding domain violation"));
    }

    #[test]
    fn test_reservation_error_display() {
        let err = ReservationError::StaleSnapshot { used: 4, current: 7 };
        assert!(err.to_string().contains("used 4"));
    }
}
