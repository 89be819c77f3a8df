//! Gate 9: funding filter, event proximity and blackout.
//!
//! Sign convention: positive funding means longs pay. The expected funding
//! flow over the holding horizon converts to R units through the unit risk,
//! and the net yield must clear its floor after all costs:
//!
//! ```text
//! funding_pnl_frac = -direction_sign * funding_rate * n_events
//! funding_R        = funding_pnl_frac * entry_ref / max(unit_risk, floor)
//! Net_Yield_R      = EV_R - cost_R_post - funding_cost_R + bonus_used
//! ```
//!
//! The blackout hard-block fires only when every condition holds at once:
//! imminent funding event, a real cost, a short holding horizon and a cost
//! share that dominates the edge.

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::clamp;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let f_cfg = &cfg.funding;
    let deriv = &inp.market.derivatives;
    let signal = inp.signal;
    let effective = st.effective_prices.expect("gate 5 ran");

    let holding_h = signal.context.expected_holding_hours;
    let t_next_h = deriv.time_to_next_funding_sec as f64 / 3_600.0;
    let period_h = deriv.funding_period_hours.max(1e-9);

    // deterministic event count over the holding horizon
    let n_events_raw = if holding_h < t_next_h {
        0u32
    } else {
        1 + ((holding_h - t_next_h) / period_h).floor() as u32
    };
    // smooth the count near event boundaries so a one-second shift in
    // holding horizon cannot step the decision discontinuously
    let n_events = {
        let raw = n_events_raw as f64;
        let width_h = f_cfg.count_smoothing_width_sec / 3_600.0;
        let boundary_h = t_next_h + (n_events_raw as f64) * period_h;
        let dist_h = boundary_h - holding_h;
        if dist_h > 0.0 && dist_h < width_h {
            raw + (1.0 - dist_h / width_h)
        } else {
            raw
        }
    };

    let direction_sign = signal.direction.sign();
    let funding_pnl_frac = -direction_sign * deriv.funding_rate * n_events;
    let unit_risk_for_funding = effective
        .unit_risk_allin_net
        .max(f_cfg.unit_risk_min_for_funding);
    let funding_r = funding_pnl_frac * signal.levels.entry_price / unit_risk_for_funding;
    let funding_cost_r = (-funding_r).max(0.0);
    let funding_bonus_r = funding_r.max(0.0);
    let funding_bonus_r_used = if f_cfg.funding_credit_allowed {
        funding_bonus_r
    } else {
        0.0
    };

    // a unit risk too small to carry funding math is itself a block
    if effective.unit_risk_allin_net < f_cfg.unit_risk_min_for_funding {
        return Err(RejectReason::UnitRiskTooSmallBlock);
    }

    let net_yield_r = st.ev_r_price - st.expected_cost_r_post_mle - funding_cost_r + funding_bonus_r_used;

    // proximity model: tau rises toward 1 as the event approaches
    let soft = f_cfg.proximity_soft_sec as f64;
    let hard = f_cfg.proximity_hard_sec as f64;
    let tau = clamp(
        (soft - deriv.time_to_next_funding_sec as f64) / (soft - hard).max(1.0),
        0.0,
        1.0,
    );
    let proximity_mult = 1.0 - (1.0 - f_cfg.proximity_mult_min) * tau.powf(f_cfg.proximity_power);

    // blackout: all four conditions at once
    let blackout_window_sec = f_cfg.blackout_minutes * 60 + f_cfg.event_inclusion_epsilon_sec;
    let cost_share = funding_cost_r / st.ev_r_price.abs().max(f_cfg.blackout_ev_eps);
    let blackout_triggered = deriv.time_to_next_funding_sec <= blackout_window_sec
        && funding_cost_r > 0.0
        && holding_h <= f_cfg.blackout_max_holding_hours
        && cost_share >= f_cfg.blackout_cost_share_threshold;

    // soft funding-cost penalty between the soft and block thresholds
    let funding_risk_mult = if funding_cost_r >= f_cfg.funding_cost_soft_r {
        let t = clamp(
            (funding_cost_r - f_cfg.funding_cost_soft_r)
                / (f_cfg.funding_cost_block_r - f_cfg.funding_cost_soft_r).max(1e-9),
            0.0,
            1.0,
        );
        1.0 - t * (1.0 - f_cfg.risk_mult_soft_penalty)
    } else {
        1.0
    };

    st.funding.n_events = n_events;
    st.funding.funding_r = funding_r;
    st.funding.funding_cost_r = funding_cost_r;
    st.funding.funding_bonus_r_used = funding_bonus_r_used;
    st.funding.net_yield_r = net_yield_r;
    st.funding.proximity_tau = tau;
    st.funding.proximity_mult = proximity_mult;
    st.funding.blackout_triggered = blackout_triggered;
    st.funding.funding_risk_mult = funding_risk_mult * proximity_mult;

    if funding_cost_r >= f_cfg.funding_cost_block_r {
        return Err(RejectReason::FundingCostBlock);
    }
    // blackout outranks the net-yield check: an imminent event with a
    // dominating cost share is the more specific diagnosis
    if blackout_triggered {
        return Err(RejectReason::FundingBlackoutBlock);
    }
    if net_yield_r < f_cfg.min_net_yield_r {
        return Err(RejectReason::FundingNetYieldBlock);
    }

    Ok(())
}
