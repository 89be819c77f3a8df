//! Gate 5: pre-sizing size-invariant cost and risk units.
//!
//! Computes the all-in effective prices, `unit_risk_bps` and the worst-case
//! pre-MLE cost estimate. Nothing downstream of this gate may recompute
//! effective prices from raw levels.

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::denom_safe_unsigned;
use crate::units::{check_unit_risk, unit_risk_bps, EffectivePrices, UnitRiskCheck};

const UNIT_RISK_BPS_EPS: f64 = 1e-6;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let signal = inp.signal;

    let effective = EffectivePrices::compute(
        signal.direction,
        signal.levels.entry_price,
        signal.levels.take_profit,
        signal.levels.stop_loss,
        &cfg.costs,
    )
    .map_err(|_| RejectReason::SignalSanityBlock)?;

    match check_unit_risk(
        effective.unit_risk_allin_net,
        Some(inp.market.volatility.atr),
        cfg.mle.unit_risk_min_atr_mult,
    ) {
        UnitRiskCheck::Ok => {}
        UnitRiskCheck::BelowAbsoluteMin => return Err(RejectReason::UnitRiskTooSmallBlock),
        UnitRiskCheck::BelowAtrMin => return Err(RejectReason::UnitRiskBelowMinAtrBlock),
    }

    let ur_bps = unit_risk_bps(effective.unit_risk_allin_net, signal.levels.entry_price);
    let entry_cost_bps = cfg.costs.entry_cost_bps();
    let sl_exit_cost_bps = cfg.costs.sl_exit_cost_bps();
    // worst case before the model weighs in: assume the stop exit
    let expected_cost_bps_pre = entry_cost_bps + sl_exit_cost_bps;
    let expected_cost_r_pre =
        expected_cost_bps_pre / denom_safe_unsigned(ur_bps, UNIT_RISK_BPS_EPS);

    st.effective_prices = Some(effective);
    st.unit_risk_bps = ur_bps;
    st.expected_cost_r_pre_mle = expected_cost_r_pre;

    Ok(())
}
