//! Gate 4: engine-signal sanity.
//!
//! Level monotonicity and finiteness, raw reward/risk floor, SL distance in
//! ATR bounds and the holding-horizon window.

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    _st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let signal = inp.signal;

    if signal.validate().is_err() {
        return Err(RejectReason::SignalSanityBlock);
    }

    let atr = inp.market.volatility.atr;
    if !atr.is_finite() || atr < cfg.signal.min_atr_for_validation {
        return Err(RejectReason::SignalSanityBlock);
    }

    let holding = signal.context.expected_holding_hours;
    if holding < cfg.signal.holding_hours_min || holding > cfg.signal.holding_hours_max {
        return Err(RejectReason::SignalSanityBlock);
    }

    if signal.raw_rr() < signal.constraints.rr_min_engine {
        return Err(RejectReason::SignalSanityBlock);
    }

    let sl_distance_atr = signal.sl_distance() / atr;
    if sl_distance_atr < signal.constraints.sl_min_atr_mult
        || sl_distance_atr > signal.constraints.sl_max_atr_mult
    {
        return Err(RejectReason::SignalSanityBlock);
    }

    Ok(())
}
