//! Gate 10: basis risk and correlation/exposure conflict.
//!
//! This gate carries both historical interpretations side by side: the
//! basis-z band multipliers AND the per-position correlation / exposure-cap
//! checks. The active interpretation for the blocking decision is recorded
//! in diagnostics; both multiplier families feed gate 13.

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::clamp;

const EXPOSURE_EPS: f64 = 1e-9;

/// Band multiplier: 1 below soft, `soft_mult` between bands, `hard_mult` above hard.
fn band_mult(value: f64, soft: f64, hard: f64, soft_mult: f64, hard_mult: f64) -> f64 {
    if value >= hard {
        hard_mult
    } else if value >= soft {
        let t = clamp((value - soft) / (hard - soft).max(1e-9), 0.0, 1.0);
        soft_mult * (1.0 - t) + hard_mult * t
    } else {
        1.0
    }
}

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let be_cfg = &cfg.basis_exposure;
    let deriv = &inp.market.derivatives;

    // --- basis-risk interpretation -------------------------------------
    let level_mult = band_mult(
        deriv.basis_z.abs(),
        be_cfg.basis_z_soft,
        be_cfg.basis_z_hard,
        be_cfg.basis_soft_mult,
        be_cfg.basis_hard_mult,
    );
    let vol_mult = band_mult(
        deriv.basis_vol_z.abs(),
        be_cfg.basis_vol_z_soft,
        be_cfg.basis_vol_z_hard,
        be_cfg.basis_soft_mult,
        be_cfg.basis_hard_mult,
    );
    // event proximity reuses the band shape on remaining seconds (inverted)
    let event_mult = {
        let t_sec = deriv.time_to_next_funding_sec as f64;
        if t_sec <= be_cfg.basis_event_hard_sec as f64 {
            be_cfg.basis_hard_mult
        } else if t_sec <= be_cfg.basis_event_soft_sec as f64 {
            be_cfg.basis_soft_mult
        } else {
            1.0
        }
    };
    let basis_risk_mult = level_mult.min(vol_mult).min(event_mult);
    st.basis_risk_mult = basis_risk_mult;

    // a hard basis dislocation blocks outright
    if deriv.basis_z.abs() >= be_cfg.basis_z_hard || deriv.basis_vol_z.abs() >= be_cfg.basis_vol_z_hard
    {
        st.basis_interpretation = Some("basis_risk".into());
        return Err(RejectReason::BasisLevelBlock);
    }

    // --- correlation / exposure interpretation -------------------------
    let signal = inp.signal;
    let candidate_risk_r = 1.0; // size-invariant: one risk unit per position

    let mut max_corr = 0.0f64;
    for pos in &inp.portfolio.positions {
        if pos.risk_pct_equity < be_cfg.min_exposure_r_for_correlation * 1e-2 {
            continue;
        }
        // without a pairwise matrix row the BTC tail correlation is the
        // conservative stand-in for every crypto pair
        let rho = if pos.instrument == signal.instrument {
            1.0
        } else {
            inp.market.correlations.tail_corr_to_btc.abs()
        };
        // opposite direction turns correlation into a hedge
        let adj = if pos.direction == signal.direction {
            rho.abs()
        } else {
            -rho.abs()
        };
        max_corr = max_corr.max(adj);
    }

    let correlation_mult = band_mult(
        max_corr,
        be_cfg.max_correlation_soft,
        be_cfg.max_correlation_hard,
        be_cfg.correlation_mult_soft,
        be_cfg.correlation_mult_hard,
    );

    // exposure in R units across the whole book plus the candidate
    let total_r: f64 = inp
        .portfolio
        .positions
        .iter()
        .map(|p| p.risk_pct_equity / cfg.rem.max_trade_risk_hard_cap_pct.max(EXPOSURE_EPS))
        .sum();
    let cluster_r: f64 = inp
        .portfolio
        .positions
        .iter()
        .filter(|p| p.instrument == signal.instrument)
        .map(|p| p.risk_pct_equity / cfg.rem.max_trade_risk_hard_cap_pct.max(EXPOSURE_EPS))
        .sum();
    let projected_total = total_r + candidate_risk_r;
    let projected_asset = cluster_r + candidate_risk_r;

    let total_util = projected_total / (be_cfg.max_total_exposure_r + EXPOSURE_EPS);
    let asset_util = projected_asset / (be_cfg.max_asset_exposure_r + EXPOSURE_EPS);
    let worst_util = total_util.max(asset_util);

    let exposure_mult = band_mult(
        worst_util,
        be_cfg.exposure_soft_utilization,
        be_cfg.exposure_hard_utilization,
        be_cfg.exposure_mult_soft,
        be_cfg.exposure_mult_hard,
    );

    // position-count and concentration constraints
    let projected_n = inp.portfolio.positions.len() + 1;
    let positions_block = projected_n > be_cfg.max_positions_hard;
    let concentration_block = if !inp.portfolio.positions.is_empty() {
        let max_single = inp
            .portfolio
            .positions
            .iter()
            .map(|p| p.risk_pct_equity)
            .fold(cfg.rem.max_trade_risk_hard_cap_pct, f64::max);
        let total_pct: f64 = inp.portfolio.positions.iter().map(|p| p.risk_pct_equity).sum::<f64>()
            + cfg.rem.max_trade_risk_hard_cap_pct;
        total_pct > EXPOSURE_EPS && max_single / total_pct >= be_cfg.concentration_hard
    } else {
        false
    };

    st.correlation_exposure_mult = correlation_mult.min(exposure_mult);

    if max_corr >= be_cfg.max_correlation_hard
        || worst_util >= be_cfg.exposure_hard_utilization
        || positions_block
        || concentration_block
    {
        st.basis_interpretation = Some("correlation_exposure".into());
        return Err(RejectReason::CorrelationExposureBlock);
    }

    st.basis_interpretation = Some("both_advisory".into());
    Ok(())
}
