//! Risk units and all-in effective prices.
//!
//! The only sanctioned conversions between USD risk, %-of-equity risk and
//! dimensionless R units live here, together with the all-in effective price
//! model that makes `|entry_eff - sl_eff|` the authoritative unit risk.
//!
//! Cost model per leg (basis points):
//!
//! ```text
//! entry: half_spread + slippage_entry + impact_entry + fee_entry
//! tp:    half_spread + slippage_tp    + impact_exit  + fee_exit
//! sl:    half_spread + stop_slippage_mult * slippage_stop + impact_stop + fee_exit
//! ```
//!
//! A LONG pays the entry cost upward and loses the exit costs downward on
//! tp/sl; a SHORT mirrors. Rounding is always conservative: the rounded
//! price never flatters the trade.

use serde::{Deserialize, Serialize};

use crate::num::{denom_safe_signed, EPS_PRICE};

/// Minimal absolute unit risk (quote units).
pub const UNIT_RISK_MIN_ABS: f64 = 1e-6;
/// Default ATR multiple for the unit-risk floor.
pub const UNIT_RISK_MIN_ATR_MULT_DEFAULT: f64 = 0.02;
/// Default stop slippage multiplier.
pub const STOP_SLIPPAGE_MULT_DEFAULT: f64 = 2.0;
/// Equity floor for percentage conversions (USD).
pub const PNL_EPS_USD: f64 = 1e-6;
/// Risk-amount floor for R conversion (USD).
pub const RISK_AMOUNT_EPS_USD: f64 = 1e-6;
/// Absolute minimum per-trade risk (USD).
pub const RISK_AMOUNT_MIN_ABSOLUTE_USD: f64 = 0.10;

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Basis-point cost components of one admission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostModelBps {
    pub spread_bps: f64,
    pub fee_entry_bps: f64,
    pub fee_exit_bps: f64,
    pub slippage_entry_bps: f64,
    pub slippage_tp_bps: f64,
    pub slippage_stop_bps: f64,
    pub impact_entry_bps: f64,
    pub impact_exit_bps: f64,
    pub impact_stop_bps: f64,
    pub stop_slippage_mult: f64,
}

impl Default for CostModelBps {
    fn default() -> Self {
        Self {
            spread_bps: 2.0,
            fee_entry_bps: 3.0,
            fee_exit_bps: 3.0,
            slippage_entry_bps: 1.0,
            slippage_tp_bps: 1.0,
            slippage_stop_bps: 2.0,
            impact_entry_bps: 0.5,
            impact_exit_bps: 0.5,
            impact_stop_bps: 1.0,
            stop_slippage_mult: STOP_SLIPPAGE_MULT_DEFAULT,
        }
    }
}

impl CostModelBps {
    /// Entry-leg cost in bps: half-spread + slippage + impact + fee.
    pub fn entry_cost_bps(&self) -> f64 {
        0.5 * self.spread_bps + self.slippage_entry_bps + self.impact_entry_bps + self.fee_entry_bps
    }

    /// TP-exit cost in bps.
    pub fn tp_exit_cost_bps(&self) -> f64 {
        0.5 * self.spread_bps + self.slippage_tp_bps + self.impact_exit_bps + self.fee_exit_bps
    }

    /// SL-exit cost in bps: stop slippage is amplified by the stop multiplier.
    pub fn sl_exit_cost_bps(&self) -> f64 {
        0.5 * self.spread_bps
            + self.stop_slippage_mult * self.slippage_stop_bps
            + self.impact_stop_bps
            + self.fee_exit_bps
    }

    fn validate(&self) -> Result<(), String> {
        let components = [
            ("spread_bps", self.spread_bps),
            ("fee_entry_bps", self.fee_entry_bps),
            ("fee_exit_bps", self.fee_exit_bps),
            ("slippage_entry_bps", self.slippage_entry_bps),
            ("slippage_tp_bps", self.slippage_tp_bps),
            ("slippage_stop_bps", self.slippage_stop_bps),
            ("impact_entry_bps", self.impact_entry_bps),
            ("impact_exit_bps", self.impact_exit_bps),
            ("impact_stop_bps", self.impact_stop_bps),
        ];
        for (name, v) in components {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("{name} must be finite and non-negative, got {v}"));
            }
        }
        if self.stop_slippage_mult < 1.0 {
            return Err(format!(
                "stop_slippage_mult must be >= 1.0, got {}",
                self.stop_slippage_mult
            ));
        }
        Ok(())
    }
}

/// Convert basis points to a fraction.
#[inline]
pub fn bps_to_fraction(bps: f64) -> f64 {
    bps / 10_000.0
}

/// All-in effective prices and the derived unit risk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectivePrices {
    pub entry_eff_allin: f64,
    pub tp_eff_allin: f64,
    pub sl_eff_allin: f64,
    /// `|entry_eff_allin - sl_eff_allin|` - the authoritative unit risk.
    pub unit_risk_allin_net: f64,
}

impl EffectivePrices {
    /// Compute all-in effective prices from raw levels and the cost model.
    ///
    /// Levels must already satisfy direction monotonicity
    /// (LONG: tp > entry > sl; SHORT: tp < entry < sl).
    pub fn compute(
        direction: Direction,
        entry: f64,
        tp: f64,
        sl: f64,
        costs: &CostModelBps,
    ) -> Result<Self, String> {
        if entry <= 0.0 || tp <= 0.0 || sl <= 0.0 {
            return Err(format!("prices must be positive: entry={entry} tp={tp} sl={sl}"));
        }
        costs.validate()?;
        match direction {
            Direction::Long => {
                if tp <= entry {
                    return Err(format!("LONG requires tp > entry ({tp} <= {entry})"));
                }
                if sl >= entry {
                    return Err(format!("LONG requires sl < entry ({sl} >= {entry})"));
                }
            }
            Direction::Short => {
                if tp >= entry {
                    return Err(format!("SHORT requires tp < entry ({tp} >= {entry})"));
                }
                if sl <= entry {
                    return Err(format!("SHORT requires sl > entry ({sl} <= {entry})"));
                }
            }
        }

        let entry_frac = bps_to_fraction(costs.entry_cost_bps());
        let tp_frac = bps_to_fraction(costs.tp_exit_cost_bps());
        let sl_frac = bps_to_fraction(costs.sl_exit_cost_bps());

        let (entry_eff, tp_eff, sl_eff) = match direction {
            Direction::Long => (
                entry * (1.0 + entry_frac),
                tp * (1.0 - tp_frac),
                sl * (1.0 - sl_frac),
            ),
            Direction::Short => (
                entry * (1.0 - entry_frac),
                tp * (1.0 + tp_frac),
                sl * (1.0 + sl_frac),
            ),
        };

        Ok(Self {
            entry_eff_allin: entry_eff,
            tp_eff_allin: tp_eff,
            sl_eff_allin: sl_eff,
            unit_risk_allin_net: (entry_eff - sl_eff).abs(),
        })
    }

    /// Reward distance on effective prices.
    #[inline]
    pub fn net_reward(&self) -> f64 {
        (self.tp_eff_allin - self.entry_eff_allin).abs()
    }
}

/// Unit-risk floor check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRiskCheck {
    Ok,
    /// Below the absolute floor.
    BelowAbsoluteMin,
    /// Below the ATR-scaled floor.
    BelowAtrMin,
}

/// Validate the unit risk against the absolute and ATR-scaled floors.
pub fn check_unit_risk(unit_risk: f64, atr: Option<f64>, min_atr_mult: f64) -> UnitRiskCheck {
    if unit_risk < UNIT_RISK_MIN_ABS {
        return UnitRiskCheck::BelowAbsoluteMin;
    }
    if let Some(atr) = atr {
        if atr > 0.0 && unit_risk < min_atr_mult * atr - crate::num::EPS_FLOAT_COMPARE_ABS {
            return UnitRiskCheck::BelowAtrMin;
        }
    }
    UnitRiskCheck::Ok
}

/// Conservative tick rounding for the three levels of one trade.
///
/// LONG: entry rounds up (worse for us), tp and sl round down.
/// SHORT: entry rounds down, tp and sl round up.
pub fn round_levels_conservative(
    direction: Direction,
    entry: f64,
    tp: f64,
    sl: f64,
    tick_size: f64,
) -> (f64, f64, f64) {
    debug_assert!(tick_size > 0.0, "tick_size must be positive");
    let up = |p: f64| (p / tick_size).ceil() * tick_size;
    let down = |p: f64| (p / tick_size).floor() * tick_size;
    match direction {
        Direction::Long => (up(entry), down(tp), down(sl)),
        Direction::Short => (down(entry), up(tp), up(sl)),
    }
}

/// Effective equity for percentage conversions (floored away from zero).
#[inline]
pub fn equity_effective(equity_usd: f64) -> f64 {
    equity_usd.max(PNL_EPS_USD)
}

/// Risk as a fraction of equity to USD.
pub fn risk_pct_to_usd(risk_pct_equity: f64, equity_usd: f64) -> f64 {
    risk_pct_equity * equity_effective(equity_usd)
}

/// Risk in USD to a fraction of equity.
pub fn risk_usd_to_pct(risk_amount_usd: f64, equity_usd: f64) -> f64 {
    risk_amount_usd / equity_effective(equity_usd)
}

/// PnL in USD to R units via the signed safe denominator.
///
/// A stop-out at the planned stop yields exactly -1R.
pub fn pnl_to_r(pnl_usd: f64, risk_amount_usd: f64) -> f64 {
    pnl_usd / denom_safe_signed(risk_amount_usd, RISK_AMOUNT_EPS_USD)
}

/// R units back to PnL in USD.
#[inline]
pub fn r_to_pnl(r_value: f64, risk_amount_usd: f64) -> f64 {
    r_value * risk_amount_usd
}

/// Size-invariant unit risk in basis points of the entry reference price.
pub fn unit_risk_bps(unit_risk_allin_net: f64, entry_price_ref: f64) -> f64 {
    10_000.0 * unit_risk_allin_net / entry_price_ref.max(EPS_PRICE)
}
