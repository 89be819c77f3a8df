//! Frozen portfolio snapshot: equity, risk aggregates, protocol states and
//! open positions. Only the single writer produces new versions.

use serde::{Deserialize, Serialize};

use crate::units::Direction;

pub const MARKET_STATE_SCHEMA_VERSION: u32 = 1;
pub const PORTFOLIO_STATE_SCHEMA_VERSION: u32 = 1;

/// Disaster-Recovery Protocol state.
///
/// Priority when multiple causes compete:
/// EMERGENCY > HIBERNATE > RECOVERY > DEFENSIVE > DEGRADED > NORMAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrpState {
    Normal,
    Degraded,
    Defensive,
    Emergency,
    Recovery,
    Hibernate,
}

impl DrpState {
    /// Conflict-resolution priority (higher wins).
    pub fn priority(self) -> u8 {
        match self {
            DrpState::Emergency => 5,
            DrpState::Hibernate => 4,
            DrpState::Recovery => 3,
            DrpState::Defensive => 2,
            DrpState::Degraded => 1,
            DrpState::Normal => 0,
        }
    }

    /// States counted by the anti-flapping window.
    pub fn is_strict(self) -> bool {
        matches!(
            self,
            DrpState::Emergency | DrpState::Recovery | DrpState::Defensive
        )
    }

    /// New entries are forbidden in these states.
    pub fn blocks_new_entries(self) -> bool {
        matches!(
            self,
            DrpState::Emergency | DrpState::Recovery | DrpState::Hibernate
        )
    }

    /// Resolve two concurrent targets by priority.
    pub fn max_priority(self, other: DrpState) -> DrpState {
        if other.priority() > self.priority() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for DrpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DrpState::Normal => "NORMAL",
            DrpState::Degraded => "DEGRADED",
            DrpState::Defensive => "DEFENSIVE",
            DrpState::Emergency => "EMERGENCY",
            DrpState::Recovery => "RECOVERY",
            DrpState::Hibernate => "HIBERNATE",
        };
        write!(f, "{s}")
    }
}

/// MLOps pipeline health state (model artifacts, calibration drift).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MlopsState {
    Healthy,
    Degraded,
    Failed,
}

/// Trading mode of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingMode {
    Live,
    Shadow,
    Paper,
    Backtest,
}

/// One open position as carried by the portfolio snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub cluster_id: u32,
    pub direction: Direction,
    pub qty: f64,
    pub entry_price: f64,
    pub entry_eff_allin: f64,
    pub sl_eff_allin: f64,
    /// qty * unit_risk_allin_net; the committed-position risk identity.
    pub risk_amount_usd: f64,
    pub risk_pct_equity: f64,
    pub notional_usd: f64,
    pub unrealized_pnl_usd: f64,
    pub funding_pnl_usd: f64,
    pub opened_ts_ms: i64,
}

impl Position {
    /// Signed risk fraction: direction sign times risk percentage.
    pub fn signed_risk_pct(&self) -> f64 {
        self.direction.sign() * self.risk_pct_equity
    }

    /// Unit risk implied by the committed identity.
    pub fn unit_risk_allin_net(&self) -> f64 {
        (self.entry_eff_allin - self.sl_eff_allin).abs()
    }
}

/// Immutable portfolio snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub schema_version: u32,
    pub portfolio_id: u64,
    pub ts_utc_ms: i64,

    // equity
    pub equity_usd: f64,
    pub equity_peak_usd: f64,
    /// Drawdown fraction in [0, 1].
    pub drawdown: f64,
    /// EMA-smoothed drawdown used by the DD ladder.
    pub drawdown_smoothed: f64,

    // risk aggregates (fractions of equity)
    pub current_portfolio_risk_pct: f64,
    pub reserved_portfolio_risk_pct: f64,
    pub current_cluster_risk_pct: f64,
    pub reserved_cluster_risk_pct: f64,
    pub sum_abs_risk_pct: f64,
    pub reserved_heat_upper_bound_pct: f64,
    pub adjusted_heat_base_pct: f64,
    pub adjusted_heat_blend_pct: f64,
    pub adjusted_heat_worst_pct: f64,
    pub heat_uni_abs_pct: f64,
    pub max_trade_risk_cap_pct: f64,

    // protocol states
    pub drp_state: DrpState,
    pub mlops_state: MlopsState,
    pub trading_mode: TradingMode,
    pub warmup_bars_remaining: u32,
    pub drp_flap_count: u32,
    pub hibernate_until_ts_ms: Option<i64>,
    pub manual_halt_new_entries: bool,
    pub manual_halt_all_trading: bool,

    pub positions: Vec<Position>,
}

impl PortfolioState {
    /// Gross open risk plus reservations for one cluster.
    pub fn cluster_risk_pct(&self, cluster_id: u32) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.cluster_id == cluster_id)
            .map(|p| p.risk_pct_equity)
            .sum()
    }

    /// Signed risk vector over open positions, in snapshot order.
    pub fn signed_risk_vector(&self) -> Vec<f64> {
        self.positions.iter().map(|p| p.signed_risk_pct()).collect()
    }

    /// Verify the committed-risk identity for every position.
    pub fn check_risk_identities(&self, rel_tol: f64) -> Result<(), String> {
        for p in &self.positions {
            let expected = p.qty * p.unit_risk_allin_net();
            let diff = (p.risk_amount_usd - expected).abs();
            if diff > rel_tol * expected.abs().max(1e-9) {
                return Err(format!(
                    "position {} violates risk identity: {} vs qty*unit_risk {}",
                    p.instrument, p.risk_amount_usd, expected
                ));
            }
        }
        Ok(())
    }
}
