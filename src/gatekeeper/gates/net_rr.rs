//! Gate 11: net reward/risk on all-in effective prices.
//!
//! The raw-level RR passed gate 4; this one re-checks after every cost is
//! loaded into the prices. Probe admissions demand an extra margin.

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::denom_safe_unsigned;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let effective = st.effective_prices.expect("gate 5 ran");

    let net_reward = effective.net_reward();
    let net_risk = (effective.entry_eff_allin - effective.sl_eff_allin).abs();
    let net_rr = net_reward / denom_safe_unsigned(net_risk, cfg.bankruptcy.net_rr_eps_price);
    st.net_rr = net_rr;

    let mut rr_min = inp.signal.constraints.rr_min_engine;
    if st.is_probe {
        rr_min += cfg.bankruptcy.rr_min_probe_add;
    }

    if net_rr < rr_min {
        return Err(RejectReason::NetRrBelowMin);
    }
    Ok(())
}
