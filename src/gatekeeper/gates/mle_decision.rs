//! Gate 6: MLE decision and size-invariant price edge.
//!
//! ```text
//! mu_success_R = |tp_eff - entry_eff| / unit_risk_allin_net
//! mu_fail_R    = -1,  CVaR-amplified through the tail-dependence beta
//! EV_R_price   = p_s * mu_success + p_n * mu_neutral + p_f * min(mu_fail, CVaR_fail(beta))
//! ```
//!
//! SHADOW mode terminates the pipeline right after this gate.

use crate::config::EngineConfig;
use crate::domain::MleDecision;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::{clamp, denom_safe_unsigned};

const UNIT_RISK_BPS_EPS: f64 = 1e-6;
const LAMBDA_EPS: f64 = 1e-6;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let mle = match inp.mle {
        Some(m) => m,
        // no model output means no edge estimate; the engine cannot admit
        None => return Err(RejectReason::MleReject),
    };
    if let Err(err) = mle.validate(cfg.mle.required_feature_schema_version) {
        return Err(match err {
            crate::errors::ValidationError::FeatureSchemaIncompatible { .. } => {
                RejectReason::FeatureSchemaIncompatibleBlock
            }
            _ => RejectReason::MleReject,
        });
    }

    let effective = st.effective_prices.expect("gate 5 ran");
    let unit_risk = effective.unit_risk_allin_net;

    let mu_success_r = effective.net_reward() / denom_safe_unsigned(unit_risk, 1e-12);
    // neutral exits scratch near entry; costs are booked separately
    let mu_neutral_r = 0.0;

    // tail-dependence-adjusted CVaR on the fail leg: heavier tails push beta
    // up and the fail outcome below -1R
    let tail_alpha = inp.market.correlations.tail_corr_to_btc.abs().max(LAMBDA_EPS);
    let lambda = inp.market.correlations.lambda_used.max(LAMBDA_EPS);
    let beta = clamp(
        cfg.mle.beta_base * tail_alpha / lambda,
        cfg.mle.beta_min,
        cfg.mle.beta_max,
    );
    let beta_span = (cfg.mle.beta_max - cfg.mle.beta_min).max(1e-12);
    let cvar_fail_r = -1.0
        + (cfg.mle.cvar_fail_floor_r + 1.0) * ((beta - cfg.mle.beta_min) / beta_span);
    let mu_fail_r = (-1.0f64).min(cvar_fail_r);

    let ev_r_price =
        mle.p_success * mu_success_r + mle.p_neutral * mu_neutral_r + mle.p_fail * mu_fail_r;

    // expected cost after the model's outcome mix
    let entry_cost_bps = cfg.costs.entry_cost_bps();
    let tp_exit_cost_bps = cfg.costs.tp_exit_cost_bps();
    let sl_exit_cost_bps = cfg.costs.sl_exit_cost_bps();
    let expected_cost_bps_post =
        entry_cost_bps + mle.p_success * tp_exit_cost_bps + mle.p_fail * sl_exit_cost_bps;
    let expected_cost_r_post =
        expected_cost_bps_post / denom_safe_unsigned(st.unit_risk_bps, UNIT_RISK_BPS_EPS);

    st.ev_r_price = ev_r_price;
    st.expected_cost_r_post_mle = expected_cost_r_post;

    // decision bands on the price edge
    let decision = if ev_r_price <= 0.0 {
        MleDecision::Reject
    } else if ev_r_price < cfg.mle.ev_r_weak_threshold {
        MleDecision::Weak
    } else if ev_r_price < cfg.mle.ev_r_normal_threshold {
        MleDecision::Normal
    } else {
        MleDecision::Strong
    };
    st.mle_decision = Some(decision);

    if decision == MleDecision::Reject {
        return Err(RejectReason::MleReject);
    }

    // defensive: a neutral-heavy forecast with a near-zero edge is noise
    if mle.p_neutral >= cfg.mle.p_neutral_cutoff && ev_r_price.abs() < cfg.mle.ev_near_zero_band {
        st.mle_decision = Some(MleDecision::Reject);
        return Err(RejectReason::MleReject);
    }

    // net-edge floor before funding (gate 9 re-checks with funding included)
    if ev_r_price - expected_cost_r_post < cfg.mle.net_edge_floor_r {
        return Err(RejectReason::NetEdgeBelowFloor);
    }

    Ok(())
}
