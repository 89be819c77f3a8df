//! Gate 18: partial-fill economics.
//!
//! Runs after the first fill, outside the admission chain proper: decides
//! whether chasing the remainder is still worth its impact, and how long a
//! passive order may fade before it is pulled.
//!
//! ```text
//! impact_R_remaining  = impact_bps * (1 - fill_frac) / unit_risk_bps
//! abandon_threshold_R = max(net_RR * rr_frac, min_abandon_R, min_bps / unit_risk_bps)
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::num::{clamp, denom_safe_unsigned};

const UNIT_RISK_BPS_EPS: f64 = 1e-6;

/// Inputs observed after the first partial fill.
#[derive(Debug, Clone, Copy)]
pub struct PartialFillInputs {
    /// Fraction of the order already filled, in [0, 1].
    pub fill_frac: f64,
    /// Current impact estimate for the remaining quantity (bps).
    pub impact_bps: f64,
    /// Size-invariant unit risk of the admission (bps).
    pub unit_risk_bps: f64,
    /// Net reward/risk of the admission (gate 11 output).
    pub net_rr: f64,
    /// Short-horizon ATR z-score, scales the passive fade timeout.
    pub atr_z_short: f64,
}

/// Verdict on the unfilled remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialFillDecision {
    /// Cancel the remainder and keep the filled fraction.
    pub abandon_remainder: bool,
    pub impact_r_remaining: f64,
    pub abandon_threshold_r: f64,
    /// How long a passive remainder may rest before being pulled (seconds).
    pub passive_fade_timeout_sec: f64,
}

pub(crate) fn evaluate(inp: &PartialFillInputs, cfg: &EngineConfig) -> PartialFillDecision {
    let pf_cfg = &cfg.partial_fill;
    let unit_risk_bps = denom_safe_unsigned(inp.unit_risk_bps, UNIT_RISK_BPS_EPS);

    let remaining_frac = clamp(1.0 - inp.fill_frac, 0.0, 1.0);
    let impact_r_remaining = inp.impact_bps * remaining_frac / unit_risk_bps;

    let abandon_threshold_r = (inp.net_rr * pf_cfg.fill_abandonment_rr_frac)
        .max(pf_cfg.min_abandon_r)
        .max(pf_cfg.abandon_threshold_min_bps / unit_risk_bps);

    let abandon_remainder = impact_r_remaining > abandon_threshold_r;
    if abandon_remainder {
        info!(
            target: "riskgate::gatekeeper",
            impact_r_remaining,
            abandon_threshold_r,
            "fill_abandon_event: cancelling remainder"
        );
    }

    // hot markets fade passive orders faster
    let passive_fade_timeout_sec = clamp(
        pf_cfg.passive_fade_timeout_base_sec / inp.atr_z_short.max(1.0),
        pf_cfg.passive_fade_timeout_min_sec,
        pf_cfg.passive_fade_timeout_max_sec,
    );

    PartialFillDecision {
        abandon_remainder,
        impact_r_remaining,
        abandon_threshold_r,
        passive_fade_timeout_sec,
    }
}
