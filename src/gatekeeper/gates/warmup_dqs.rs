//! Gate 0: warm-up, data availability, cross-validation, hard-gates, DQS.
//!
//! Runs the DQS evaluator, feeds the outcome into the DRP state machine and
//! blocks on hard-gates, EMERGENCY, warm-up and HIBERNATE. Emits `dqs_mult`
//! for the sequential-risk chain.

use crate::config::EngineConfig;
use crate::dqs::{self, DqsHardGate};
use crate::drp::{DrpInputs, DrpStateMachine, EmergencyCause};
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
    drp: &mut DrpStateMachine,
) -> Result<(), RejectReason> {
    let dqs_result = dqs::evaluate(inp.market, inp.now_ms, &cfg.dqs);

    let emergency_cause = dqs_result.hard_gate.map(|gate| match gate {
        DqsHardGate::CriticalStaleness
        | DqsHardGate::NonFiniteCritical
        | DqsHardGate::SuspectedGlitch
        | DqsHardGate::StaleBookFreshPrice => EmergencyCause::DataGlitch,
        DqsHardGate::CrossSourceDeviation | DqsHardGate::OracleSanity => EmergencyCause::Depeg,
        DqsHardGate::SourcesBelowMin => EmergencyCause::Other,
    });

    let transition = drp.evaluate(&DrpInputs {
        dqs: dqs_result.dqs,
        hard_gate_triggered: dqs_result.hard_gated(),
        crisis_index: inp.crisis_index,
        compounding_violation: false,
        reservation_expired_fill: false,
        adl_critical: inp
            .market
            .derivatives
            .adl_rank_quantile
            .map(|q| q >= 0.99)
            .unwrap_or(false),
        // stale correlation matrix or a clock behind the market timestamp
        // both degrade the protocol floor to DEFENSIVE
        defensive_floor: st.corr_matrix_stale
            || inp.clock_behind_market
            || inp.logical_clock_ms < inp.market.ts_utc_ms,
        atr_z_short: inp.market.volatility.atr_z_short,
        emergency_cause,
        successful_bar_completed: inp.successful_bar_completed,
        operator_ack: inp.operator_ack,
        now_ms: inp.now_ms,
    });

    st.dqs = Some(dqs_result.clone());
    st.drp_state = Some(transition.new_state);

    if let Some(hard_gate) = dqs_result.hard_gate {
        return Err(match hard_gate {
            DqsHardGate::OracleSanity => RejectReason::OracleSanityBlock,
            DqsHardGate::StaleBookFreshPrice => RejectReason::StaleBookGlitchBlock,
            _ => RejectReason::DqsHardGateBlock,
        });
    }

    if transition.new_state.blocks_new_entries() {
        return Err(match transition.new_state {
            crate::domain::DrpState::Hibernate => RejectReason::HibernateModeBlock,
            crate::domain::DrpState::Recovery => RejectReason::WarmupInProgressBlock,
            _ => RejectReason::EmergencyModeBlock,
        });
    }

    Ok(())
}
