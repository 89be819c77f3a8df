//! Admission decision types: stable rejection reasons, per-gate results and
//! the diagnostics bundle returned with every decision.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DrpState, FinalRegime, MleDecision, RegimeConflict};
use crate::dqs::DqsResult;
use crate::heat::HeatAdmission;
use crate::sizing::SizingResult;
use crate::units::EffectivePrices;

/// Stable rejection reason codes; the wire name is the snake_case form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    DqsHardGateBlock,
    OracleSanityBlock,
    StaleBookGlitchBlock,
    EmergencyModeBlock,
    WarmupInProgressBlock,
    HibernateModeBlock,
    SnapshotStaleBlock,
    ManualHaltBlock,
    TradingModeBlock,
    ShadowModeNoTrade,
    MrcConflictBlock,
    RegimeNoTradeBlock,
    RegimeIncompatibleBlock,
    SignalSanityBlock,
    UnitRiskTooSmallBlock,
    UnitRiskBelowMinAtrBlock,
    FeatureSchemaIncompatibleBlock,
    MleReject,
    NetEdgeBelowFloor,
    LiquidityHardBlock,
    SpoofingSuspectedBlock,
    GapGlitchBlock,
    FundingCostBlock,
    FundingNetYieldBlock,
    FundingBlackoutBlock,
    BasisLevelBlock,
    CorrelationExposureBlock,
    NetRrBelowMin,
    BankruptcyGapBlockSingle,
    BankruptcyPortfolioStressBlock,
    LiquidationBufferBlock,
    HeatHardViolation,
    HeatSoftBlockIncrease,
    ForcedHedgeNotEffectiveBlock,
    RiskFloorBlock,
    SizingNotConvergedBlock,
    SizingInfeasibleBlock,
    ImpactHardBlock,
    PortfolioWriterOverloadBlock,
    ReservationConflict,
    StalePortfolioSnapshot,
    PreexecValidationTimeout,
    OrphanSweepInProgressBlock,
    LotRoundingRiskDeviationBlock,
    CompoundingDomainViolationBlock,
}

impl RejectReason {
    /// Wire code, identical to the serde name.
    pub fn code(&self) -> String {
        serde_json::to_value(self)
            .expect("reason serializes")
            .as_str()
            .expect("reason is a string")
            .to_string()
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Gate identifiers in authoritative chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GateId {
    G00WarmupDqs,
    G01KillSwitch,
    G02RegimeResolution,
    G03StrategyCompat,
    G04SignalSanity,
    G05PreSizing,
    G06MleDecision,
    G07Liquidity,
    G08GapGlitch,
    G09Funding,
    G10BasisExposure,
    G11NetRr,
    G12Bankruptcy,
    G13SequentialRisk,
    G14Sizing,
    G15ImpactLimits,
    G16Reservation,
    G17ActualRisk,
    G18PartialFill,
}

/// Per-gate trace entry kept in the diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateTrace {
    pub gate: GateId,
    pub blocked: bool,
    pub reason: Option<RejectReason>,
    /// Risk multiplier contributed by this gate, if any.
    pub risk_mult: Option<f64>,
}

/// Funding-gate intermediates surfaced in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FundingDiagnostics {
    pub n_events: f64,
    pub funding_r: f64,
    pub funding_cost_r: f64,
    pub funding_bonus_r_used: f64,
    pub net_yield_r: f64,
    pub proximity_tau: f64,
    pub proximity_mult: f64,
    pub blackout_triggered: bool,
    pub funding_risk_mult: f64,
}

/// Sequential-risk (gate 13) intermediates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RemDiagnostics {
    pub dd_risk_max: f64,
    pub kelly_cap: f64,
    pub base_risk_pct: f64,
    pub tail_lambda_mult: f64,
    pub corr_beta_mult: f64,
    pub funding_mult: f64,
    pub basis_mult: f64,
    pub adl_mult: f64,
    pub liquidity_mult: f64,
    pub dqs_mult: f64,
    pub defensive_mult: f64,
    pub combined_market: f64,
    pub combined_ops: f64,
    pub effective_count_market: f64,
    pub effective_count_ops: f64,
    pub combined_total: f64,
    pub risk_pre_liquidity_pct: f64,
    /// Heat/portfolio/cluster limit that bound the final size, if any.
    pub limiting_factor: Option<String>,
}

/// Full decision diagnostics: every alternate path is marked here, never
/// silently taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DecisionDiagnostics {
    pub config_version: u32,
    pub snapshot_id: u64,
    pub portfolio_id: u64,
    pub logical_clock_ms: i64,
    pub trace: Vec<GateTrace>,
    pub dqs: Option<DqsResult>,
    pub drp_state: Option<DrpState>,
    pub final_regime: Option<FinalRegime>,
    pub regime_conflict: Option<RegimeConflict>,
    pub regime_risk_mult: f64,
    pub is_probe: bool,
    pub is_shadow: bool,
    pub effective_prices: Option<EffectivePrices>,
    pub unit_risk_bps: f64,
    pub expected_cost_r_pre_mle: f64,
    pub ev_r_price: f64,
    pub expected_cost_r_post_mle: f64,
    pub mle_decision: Option<MleDecision>,
    pub liquidity_mult: f64,
    pub impact_bps_est: f64,
    pub obi: f64,
    pub funding: FundingDiagnostics,
    pub basis_risk_mult: f64,
    pub basis_interpretation: Option<String>,
    pub correlation_exposure_mult: f64,
    pub net_rr: f64,
    pub glitch_severity: Option<crate::gatekeeper::gates::GlitchSeverity>,
    pub gap_mult: f64,
    pub portfolio_gap_loss_pct: f64,
    pub rem: RemDiagnostics,
    pub heat: Option<HeatAdmission>,
    pub sizing: Option<SizingResult>,
    pub reservation_id: Option<Uuid>,
    pub risk_pct_actual: f64,
    pub corr_matrix_stale: bool,
    pub sizing_not_converged_event: bool,
    pub reduced_risk_accepted: bool,
}

/// The admission verdict: the single source of truth for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    /// Notional size in USD; zero when not allowed.
    pub size_notional: f64,
    /// Quantity in contracts after lot rounding.
    pub qty: f64,
    /// Empty string when allowed.
    pub rejection_reason: String,
    pub diagnostics: DecisionDiagnostics,
}

impl AdmissionDecision {
    pub fn rejected(reason: RejectReason, diagnostics: DecisionDiagnostics) -> Self {
        Self {
            allowed: false,
            size_notional: 0.0,
            qty: 0.0,
            rejection_reason: reason.code(),
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes_are_snake_case() {
        assert_eq!(RejectReason::DqsHardGateBlock.code(), "dqs_hard_gate_block");
        assert_eq!(RejectReason::ShadowModeNoTrade.code(), "shadow_mode_no_trade");
        assert_eq!(
            RejectReason::BankruptcyPortfolioStressBlock.code(),
            "bankruptcy_portfolio_stress_block"
        );
        assert_eq!(
            RejectReason::PortfolioWriterOverloadBlock.code(),
            "portfolio_writer_overload_block"
        );
    }

    #[test]
    fn test_gate_order_is_total() {
        assert!(GateId::G00WarmupDqs < GateId::G01KillSwitch);
        assert!(GateId::G13SequentialRisk < GateId::G14Sizing);
        assert!(GateId::G17ActualRisk < GateId::G18PartialFill);
    }

    #[test]
    fn test_rejected_constructor() {
        let d = AdmissionDecision::rejected(RejectReason::MleReject, DecisionDiagnostics::default());
        assert!(!d.allowed);
        assert_eq!(d.size_notional, 0.0);
        assert_eq!(d.rejection_reason, "mle_reject");
    }
}
