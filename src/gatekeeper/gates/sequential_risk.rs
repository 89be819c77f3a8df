//! Gate 13: sequential risk-multiplier (REM) chain.
//!
//! The order is authoritative and fixed:
//!
//!  1. DRP/halt short-circuit          9. basis multiplier
//!  2. MLE risk multiplier            10. ADL multiplier
//!  3. drawdown ladder                11. liquidity multiplier (recorded
//!  4. Kelly cap                          only; sizing applies it once)
//!  5. base risk                      12. DQS multiplier
//!  6. tail-lambda multiplier         13. defensive (DRP/MLOps) multiplier
//!  7. corr/beta multiplier           14. sizing multiplier (1 until 14)
//!  8. funding x proximity            15. cluster combination
//!                                    16. portfolio/cluster/heat limits
//!                                    17. risk floor -> hibernate trigger
//!
//! Multipliers partition into a Market cluster and an Ops cluster; stacked
//! penalties within a cluster are combined with a power-law active-strength
//! count, and the two clusters merge through a harmonic mean.

use nalgebra::{DMatrix, DVector};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::EngineConfig;
use crate::domain::{DrpState, MlopsState};
use crate::drp::DrpStateMachine;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::heat;
use crate::num::clamp;

/// Smooth band multiplier falling from 1 to `m_min` between soft and hard.
fn soft_band(value: f64, soft: f64, hard: f64, m_min: f64) -> f64 {
    1.0 - (1.0 - m_min) * clamp((value - soft) / (hard - soft).max(1e-12), 0.0, 1.0)
}

/// Active strength of a multiplier: how far below 1 it sits, normalized.
fn active_strength(m: f64, active_thr: f64, power: f64) -> f64 {
    clamp(
        ((1.0 - m) / (1.0 - active_thr).max(1e-9)).powf(power),
        0.0,
        1.0,
    )
}

/// Combine one cluster of multipliers with a stacking penalty.
fn combine_cluster(mults: &[f64], cfg: &crate::config::RemConfig) -> (f64, f64) {
    let min_mult = mults.iter().copied().fold(1.0, f64::min);
    let effective_count: f64 = mults
        .iter()
        .map(|&m| active_strength(m, cfg.active_threshold, cfg.active_power))
        .sum();
    let combined = if effective_count <= 1.0 {
        min_mult
    } else {
        min_mult * cfg.stacking_penalty_base.powf(effective_count - 1.0)
    };
    (combined, effective_count)
}

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
    drp: &mut DrpStateMachine,
    low_risk_streak: &mut u32,
) -> Result<(), RejectReason> {
    let rem_cfg = &cfg.rem;
    let pf = inp.portfolio;
    let corr_view = &inp.market.correlations;

    // (1) DRP/halt short-circuit
    let drp_state = st.drp_state.unwrap_or(pf.drp_state);
    if drp_state.blocks_new_entries() || pf.manual_halt_new_entries || pf.manual_halt_all_trading {
        st.rem.risk_pre_liquidity_pct = 0.0;
        return Err(RejectReason::EmergencyModeBlock);
    }

    // (2) MLE multiplier, scaled by the regime/probe multiplier from gate 2
    let mle_mult = st
        .mle_decision
        .map(|d| d.risk_mult())
        .unwrap_or(0.0)
        * st.regime_risk_mult;

    // (3) drawdown ladder on the smoothed drawdown
    let dd_s = rem_cfg.dd_smoothing_alpha * pf.drawdown
        + (1.0 - rem_cfg.dd_smoothing_alpha) * pf.drawdown_smoothed;
    let mut dd_risk_max = rem_cfg.max_trade_risk_hard_cap_pct;
    for &(threshold, cap) in &rem_cfg.dd_ladder {
        if dd_s >= threshold {
            dd_risk_max = cap;
        }
    }
    st.rem.dd_risk_max = dd_risk_max;

    // (4) Kelly cap, only against a valid KPI sample
    let kelly_cap = match inp.kpi {
        Some(kpi) if kpi.valid => {
            let rr = kpi.avg_rr.max(1e-9);
            let kelly_full = (kpi.win_rate * rr - (1.0 - kpi.win_rate)) / rr;
            clamp(kelly_full * rem_cfg.kelly_fraction, 0.0, rem_cfg.kelly_cap_max)
        }
        _ => rem_cfg.kelly_cap_max,
    };
    st.rem.kelly_cap = kelly_cap;

    // (5) base risk
    let base_risk = dd_risk_max
        .min(kelly_cap)
        .min(rem_cfg.max_trade_risk_hard_cap_pct)
        * mle_mult;
    st.rem.base_risk_pct = base_risk;

    // (6) tail-lambda multiplier
    let tail_lambda_mult = soft_band(
        corr_view.lambda_used,
        rem_cfg.tail_lambda_soft,
        rem_cfg.tail_lambda_hard,
        rem_cfg.tail_lambda_mult_min,
    );

    // (7) corr/beta multiplier: worst of beta, tail-corr and reliability
    let beta_mult = soft_band(
        corr_view.stress_beta_to_btc.abs(),
        rem_cfg.stress_beta_soft,
        rem_cfg.stress_beta_hard,
        rem_cfg.corr_beta_mult_min,
    );
    let corr_mult = soft_band(
        corr_view.tail_corr_to_btc.abs(),
        rem_cfg.tail_corr_soft,
        rem_cfg.tail_corr_hard,
        rem_cfg.corr_beta_mult_min,
    );
    let reliability_mult = if corr_view.tail_reliability_score < rem_cfg.reliability_floor {
        rem_cfg.corr_beta_mult_min
    } else {
        1.0
    };
    let corr_beta_mult = beta_mult.min(corr_mult).min(reliability_mult);

    // (8) funding x proximity (from gate 9)
    let funding_mult = if st.funding.funding_risk_mult > 0.0 {
        st.funding.funding_risk_mult
    } else {
        1.0
    };

    // (9) basis multiplier (from gate 10)
    let basis_mult = if st.basis_risk_mult > 0.0 { st.basis_risk_mult } else { 1.0 };

    // (10) ADL multiplier
    let adl_mult = inp
        .market
        .derivatives
        .adl_rank_quantile
        .map(|q| {
            soft_band(
                q,
                rem_cfg.adl_quantile_soft,
                rem_cfg.adl_quantile_hard,
                rem_cfg.adl_mult_min,
            )
        })
        .unwrap_or(1.0);

    // (11) liquidity multiplier: recorded for diagnostics only. The chain
    // emits PRE-liquidity risk; sizing multiplies it in exactly once.
    // Folding it into the cluster here would double-apply it.
    let liquidity_mult = st.liquidity_mult;

    // (12) DQS multiplier, degraded further by a stale correlation matrix
    let mut dqs_mult = st.dqs.as_ref().map(|d| d.dqs_mult).unwrap_or(0.0);
    if st.corr_matrix_stale {
        dqs_mult *= cfg.corr.stale_mult;
    }

    // (13) defensive multiplier: min of the DRP and MLOps tables
    let drp_mult = match drp_state {
        DrpState::Normal => 1.0,
        DrpState::Degraded => rem_cfg.drp_degraded_mult,
        DrpState::Defensive => rem_cfg.drp_defensive_mult,
        _ => 0.0,
    };
    let mlops_mult = match pf.mlops_state {
        MlopsState::Healthy => 1.0,
        MlopsState::Degraded => rem_cfg.mlops_degraded_mult,
        MlopsState::Failed => rem_cfg.mlops_failed_mult,
    };
    let defensive_mult = drp_mult.min(mlops_mult);

    // (14) sizing multiplier is 1 until gate 14 runs
    let sizing_mult = 1.0;

    // (15) cluster combination
    let market_cluster: SmallVec<[f64; 8]> = SmallVec::from_slice(&[
        tail_lambda_mult,
        corr_beta_mult,
        funding_mult,
        basis_mult,
        adl_mult,
        st.correlation_exposure_mult.max(1e-12).min(1.0),
    ]);
    let ops_cluster: SmallVec<[f64; 4]> =
        SmallVec::from_slice(&[dqs_mult, defensive_mult, sizing_mult]);

    let (combined_market, count_market) = combine_cluster(&market_cluster, rem_cfg);
    let (combined_ops, count_ops) = combine_cluster(&ops_cluster, rem_cfg);
    let combined_total =
        2.0 * combined_market * combined_ops / (combined_market + combined_ops).max(1e-12);

    st.rem.tail_lambda_mult = tail_lambda_mult;
    st.rem.corr_beta_mult = corr_beta_mult;
    st.rem.funding_mult = funding_mult;
    st.rem.basis_mult = basis_mult;
    st.rem.adl_mult = adl_mult;
    st.rem.liquidity_mult = liquidity_mult;
    st.rem.dqs_mult = dqs_mult;
    st.rem.defensive_mult = defensive_mult;
    st.rem.combined_market = combined_market;
    st.rem.combined_ops = combined_ops;
    st.rem.effective_count_market = count_market;
    st.rem.effective_count_ops = count_ops;
    st.rem.combined_total = combined_total;

    // (16) portfolio / cluster / heat limits
    let mut allowed_risk = base_risk * combined_total;
    let mut limiting: Option<String> = None;

    let remaining_portfolio = (cfg.heat.max_portfolio_risk_pct
        - pf.current_portfolio_risk_pct
        - pf.reserved_portfolio_risk_pct)
        .max(0.0);
    let cluster_used = pf.current_cluster_risk_pct + pf.reserved_cluster_risk_pct;
    let remaining_cluster = (cfg.heat.max_cluster_risk_pct - cluster_used).max(0.0);

    // heat admission over PSD / blend / collapse, with the candidate axis
    // appended to the book's risk vector
    let n = pf.positions.len();
    let mut risk_vec = DVector::zeros(n + 1);
    for (i, pos) in pf.positions.iter().enumerate() {
        risk_vec[i] = pos.signed_risk_pct();
    }
    let (psd, blend) = match inp.corr {
        Some(snap) if !st.corr_matrix_stale => {
            let reliability_low =
                corr_view.tail_reliability_score < cfg.heat.heat_blend_min_reliability;
            let psd = expand_matrix(&snap.psd(), &snap.instruments, pf, &inp.signal.instrument);
            let blend_src = if reliability_low { snap.psd() } else { snap.blend() };
            let blend = expand_matrix(&blend_src, &snap.instruments, pf, &inp.signal.instrument);
            (psd, blend)
        }
        // no usable matrix: fall back to the conservative all-ones view
        _ => (
            DMatrix::from_element(n + 1, n + 1, 1.0),
            DMatrix::from_element(n + 1, n + 1, 1.0),
        ),
    };

    let admission = heat::admit_candidate(
        &risk_vec,
        &psd,
        &blend,
        n,
        inp.signal.direction.sign(),
        remaining_cluster,
        remaining_portfolio,
        cfg.sizing.lot_step_qty * 1e-6,
        &cfg.heat,
    )
    .map_err(|_| RejectReason::HeatHardViolation)?;

    if admission.above_hard && admission.x_max <= 0.0 {
        let is_hedge = admission.is_hedge;
        st.heat = Some(admission);
        return Err(if is_hedge {
            // the candidate was a hedge but could not reduce heat enough
            RejectReason::ForcedHedgeNotEffectiveBlock
        } else {
            RejectReason::HeatHardViolation
        });
    }

    // soft limit: inside the soft band only heat-reducing trades grow the book
    let h_soft = cfg.heat.heat_soft_frac * cfg.heat.max_adjusted_heat_pct;
    if admission.heat_before > h_soft && !admission.is_hedge && !admission.above_hard {
        st.heat = Some(admission);
        return Err(RejectReason::HeatSoftBlockIncrease);
    }

    if allowed_risk > admission.x_max {
        allowed_risk = admission.x_max;
        limiting = Some("heat".into());
    }
    if allowed_risk > remaining_portfolio {
        allowed_risk = remaining_portfolio;
        limiting = Some("portfolio".into());
    }
    if allowed_risk > remaining_cluster {
        allowed_risk = remaining_cluster;
        limiting = Some("cluster".into());
    }
    st.heat = Some(admission);

    // (17) risk floor: persistent dust-sized admissions park the engine
    if allowed_risk < rem_cfg.min_risk_floor_pct {
        *low_risk_streak += 1;
        if *low_risk_streak >= rem_cfg.hibernate_trigger_n {
            drp.force_hibernate(inp.now_ms);
            *low_risk_streak = 0;
        }
        st.rem.risk_pre_liquidity_pct = 0.0;
        st.rem.limiting_factor = limiting;
        return Err(RejectReason::RiskFloorBlock);
    }
    *low_risk_streak = 0;

    st.rem.risk_pre_liquidity_pct = allowed_risk;
    st.rem.limiting_factor = limiting;
    debug!(
        target: "riskgate::gatekeeper",
        base_risk,
        combined_total,
        allowed_risk,
        "sequential risk chain complete"
    );

    Ok(())
}

/// Expand a published matrix onto the (positions + candidate) axis order.
///
/// Instruments missing from the snapshot fall back to +1 against everything,
/// the conservative default.
fn expand_matrix(
    src: &DMatrix<f64>,
    instruments: &[String],
    pf: &crate::domain::PortfolioState,
    candidate: &str,
) -> DMatrix<f64> {
    let n = pf.positions.len();
    let index_of = |name: &str| instruments.iter().position(|i| i == name);
    let mut axis: Vec<Option<usize>> = pf
        .positions
        .iter()
        .map(|p| index_of(&p.instrument))
        .collect();
    axis.push(index_of(candidate));

    let mut out = DMatrix::from_element(n + 1, n + 1, 1.0);
    for a in 0..=n {
        for b in 0..=n {
            if a == b {
                out[(a, b)] = 1.0;
            } else if let (Some(ia), Some(ib)) = (axis[a], axis[b]) {
                out[(a, b)] = src[(ia, ib)];
            }
        }
    }
    out
}
