//! Gate 1: manual halt flags and trading mode.
//!
//! Manual halts take absolute priority. PAPER/BACKTEST processes never admit
//! live entries; SHADOW passes through but is flagged so the pipeline
//! terminates after gate 6 without touching execution-side gates.

use crate::config::EngineConfig;
use crate::domain::TradingMode;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    _cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let pf = inp.portfolio;

    if pf.manual_halt_all_trading || pf.manual_halt_new_entries {
        return Err(RejectReason::ManualHaltBlock);
    }

    match pf.trading_mode {
        TradingMode::Live => {}
        TradingMode::Shadow => {
            st.is_shadow = true;
        }
        TradingMode::Paper | TradingMode::Backtest => {
            return Err(RejectReason::TradingModeBlock);
        }
    }

    Ok(())
}
