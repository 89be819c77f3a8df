//! Safe geometric growth and variance-drag accounting.
//!
//! Equity compounds multiplicatively, so all growth math runs in log space:
//!
//! ```text
//! log(E_K) = log(E_0) + sum(log(1 + r_k))
//! ```
//!
//! The log domain is guarded: any return at or below `-1 + eps` is a
//! [`DomainViolation::Compounding`], which the pipeline converts into a DRP
//! EMERGENCY. Small returns use `log1p` for precision.

use crate::errors::DomainViolation;
use crate::num::sanitize;

/// Domain floor for log(1+r): r must exceed `-1 + COMPOUNDING_R_FLOOR_EPS`.
pub const COMPOUNDING_R_FLOOR_EPS: f64 = 1e-6;

/// Below this magnitude, `log1p(r)` is used instead of `log(1+r)`.
pub const LOG1P_SWITCH_THRESHOLD: f64 = 0.01;

/// Variance drag above this fraction of the target annual return is critical.
pub const VARIANCE_DRAG_CRITICAL_FRAC: f64 = 0.35;

/// Default trades per year used to annualize drag.
pub const TRADES_PER_YEAR_DEFAULT: f64 = 140.0;

/// Default target annual return for the drag criticality check.
pub const TARGET_RETURN_ANNUAL_DEFAULT: f64 = 0.12;

/// Validate a return against the compounding domain floor.
pub fn safe_compound_rate(r: f64, eps: f64) -> Result<f64, DomainViolation> {
    if !r.is_finite() {
        return Err(DomainViolation::NonFinite {
            context: "compound_rate",
            value: r,
        });
    }
    if r <= -1.0 + eps {
        return Err(DomainViolation::Compounding { r, eps });
    }
    Ok(r)
}

/// Clamp a return to the domain floor, reporting whether it was violated.
///
/// Only for post-incident diagnostics after the violation has already been
/// recorded and the DRP escalated; never on the admission path.
pub fn clamp_compound_rate_emergency(r: f64, eps: f64) -> (f64, bool) {
    let r = sanitize(r, 0.0);
    let floor = -1.0 + eps;
    if r <= floor {
        (floor, true)
    } else {
        (r, false)
    }
}

/// Numerically stable `log(1 + r)` with domain checking.
pub fn safe_log_return(r: f64) -> Result<f64, DomainViolation> {
    let r = safe_compound_rate(r, COMPOUNDING_R_FLOOR_EPS)?;
    if r.abs() < LOG1P_SWITCH_THRESHOLD {
        Ok(r.ln_1p())
    } else {
        Ok((1.0 + r).ln())
    }
}

/// Final equity after applying `returns` geometrically.
///
/// Computed in log space; any out-of-domain return aborts with the violation.
pub fn compound_equity(initial_equity: f64, returns: &[f64]) -> Result<f64, DomainViolation> {
    if initial_equity <= 0.0 {
        return Err(DomainViolation::NonFinite {
            context: "initial_equity",
            value: initial_equity,
        });
    }
    let mut log_equity = initial_equity.ln();
    for &r in returns {
        log_equity += safe_log_return(r)?;
    }
    Ok(sanitize(log_equity.exp(), initial_equity))
}

/// Full equity trajectory `[E_0, E_1, ..., E_K]`.
pub fn compound_equity_trajectory(
    initial_equity: f64,
    returns: &[f64],
) -> Result<Vec<f64>, DomainViolation> {
    if initial_equity <= 0.0 {
        return Err(DomainViolation::NonFinite {
            context: "initial_equity",
            value: initial_equity,
        });
    }
    let mut trajectory = Vec::with_capacity(returns.len() + 1);
    trajectory.push(initial_equity);
    let mut current = initial_equity;
    for &r in returns {
        let r = safe_compound_rate(r, COMPOUNDING_R_FLOOR_EPS)?;
        current = sanitize(current * (1.0 + r), current);
        trajectory.push(current);
    }
    Ok(trajectory)
}

/// Variance drag metrics: arithmetic vs geometric growth.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceDragMetrics {
    /// Arithmetic mean return E[r].
    pub mean_return: f64,
    /// Mean log return mean(ln(1+r)).
    pub mean_log_return: f64,
    /// Geometric mean return per trade: exp(mean_ln) - 1.
    pub geometric_mean_return_per_trade: f64,
    /// E[r] - g_trade.
    pub variance_drag_per_trade: f64,
    /// Per-trade drag annualized by trades_per_year.
    pub variance_drag_annual: f64,
    /// exp(mean_ln * trades_per_year) - 1.
    pub geometric_return_annual: f64,
    /// E[r] * trades_per_year.
    pub arithmetic_return_annual_approx: f64,
    /// Sample size.
    pub num_trades: usize,
    /// Annualization factor used.
    pub trades_per_year: f64,
}

/// Compute variance drag metrics for a return sample.
pub fn variance_drag_metrics(
    returns: &[f64],
    trades_per_year: f64,
) -> Result<VarianceDragMetrics, DomainViolation> {
    assert!(!returns.is_empty(), "returns sample cannot be empty");
    assert!(trades_per_year > 0.0, "trades_per_year must be positive");

    let n = returns.len() as f64;
    let mean_return = returns.iter().sum::<f64>() / n;

    let mut log_sum = 0.0;
    for &r in returns {
        log_sum += safe_log_return(r)?;
    }
    let mean_log_return = log_sum / n;

    let geometric_mean_return_per_trade = mean_log_return.exp() - 1.0;
    let variance_drag_per_trade = mean_return - geometric_mean_return_per_trade;

    Ok(VarianceDragMetrics {
        mean_return,
        mean_log_return,
        geometric_mean_return_per_trade,
        variance_drag_per_trade,
        variance_drag_annual: variance_drag_per_trade * trades_per_year,
        geometric_return_annual: (mean_log_return * trades_per_year).exp() - 1.0,
        arithmetic_return_annual_approx: mean_return * trades_per_year,
        num_trades: returns.len(),
        trades_per_year,
    })
}

/// Is annualized variance drag critical relative to the target return?
///
/// Returns `(is_critical, drag_ratio)`. A critical result is a signal the
/// DRP may escalate to DEFENSIVE.
pub fn check_variance_drag_critical(
    variance_drag_annual: f64,
    target_return_annual: f64,
    critical_frac: f64,
) -> (bool, f64) {
    assert!(
        target_return_annual > 0.0,
        "target_return_annual must be positive"
    );
    let drag_ratio = variance_drag_annual / target_return_annual;
    (drag_ratio > critical_frac, drag_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_compound_rate_passes_normal() {
        assert_eq!(safe_compound_rate(0.05, COMPOUNDING_R_FLOOR_EPS).unwrap(), 0.05);
        assert_eq!(safe_compound_rate(-0.5, COMPOUNDING_R_FLOOR_EPS).unwrap(), -0.5);
    }

    #[test]
    fn test_safe_compound_rate_rejects_total_loss() {
        let err = safe_compound_rate(-1.0, COMPOUNDING_R_FLOOR_EPS).unwrap_err();
        assert!(matches!(err, DomainViolation::Compounding { .. }));
        assert!(safe_compound_rate(-2.0, COMPOUNDING_R_FLOOR_EPS).is_err());
    }

    #[test]
    fn test_safe_compound_rate_rejects_nan() {
        assert!(safe_compound_rate(f64::NAN, COMPOUNDING_R_FLOOR_EPS).is_err());
    }

    #[test]
    fn test_safe_log_return_small_uses_log1p() {
        let r = 1e-10;
        // log1p(r) ~ r for tiny r; naive log(1+r) would lose precision
        assert!((safe_log_return(r).unwrap() - r).abs() < 1e-20);
    }

    #[test]
    fn test_safe_log_return_large() {
        assert!((safe_log_return(-0.5).unwrap() - (-0.6931471805599453)).abs() < 1e-12);
    }

    #[test]
    fn test_compound_equity() {
        let e = compound_equity(100.0, &[0.1, 0.2]).unwrap();
        assert!((e - 132.0).abs() < 1e-9);
        let e = compound_equity(100.0, &[-0.1, -0.2]).unwrap();
        assert!((e - 72.0).abs() < 1e-9);
    }

    #[test]
    fn test_compound_equity_empty() {
        assert_eq!(compound_equity(100.0, &[]).unwrap(), 100.0);
    }

    #[test]
    fn test_compound_equity_propagates_violation() {
        assert!(compound_equity(100.0, &[0.1, -1.0]).is_err());
    }

    #[test]
    fn test_trajectory() {
        let t = compound_equity_trajectory(100.0, &[0.1, 0.2]).unwrap();
        assert_eq!(t.len(), 3);
        assert!((t[1] - 110.0).abs() < 1e-9);
        assert!((t[2] - 132.0).abs() < 1e-9);
    }

    #[test]
    fn test_variance_drag_positive_for_noisy_returns() {
        let returns = [0.02, -0.01, 0.03, -0.015, 0.025];
        let m = variance_drag_metrics(&returns, 100.0).unwrap();
        assert_eq!(m.num_trades, 5);
        assert!((m.mean_return - 0.012).abs() < 1e-9);
        // geometric mean always lags arithmetic mean under variance
        assert!(m.geometric_mean_return_per_trade < m.mean_return);
        assert!(m.variance_drag_per_trade > 0.0);
    }

    #[test]
    fn test_variance_drag_critical_check() {
        let (critical, ratio) = check_variance_drag_critical(0.02, 0.12, VARIANCE_DRAG_CRITICAL_FRAC);
        assert!(!critical);
        assert!((ratio - 0.16666666666).abs() < 1e-6);

        let (critical, _) = check_variance_drag_critical(0.05, 0.12, VARIANCE_DRAG_CRITICAL_FRAC);
        assert!(critical);
    }
}
