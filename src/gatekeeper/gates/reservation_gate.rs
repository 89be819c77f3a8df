//! Gates 16 and 17: risk reservation with pre-exec validation, then the
//! actual-risk check after lot rounding.

use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::errors::ReservationError;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::reservation::{ReservationLedger, ReservationRequest};

pub(crate) fn evaluate_gate16(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
    ledger: &Arc<Mutex<ReservationLedger>>,
) -> Result<(), RejectReason> {
    // pre-exec validation must fit its deadline; the caller measures the
    // elapsed decision time and passes it in for determinism
    if inp.preexec_elapsed_ms > cfg.reservation.preexec_validation_deadline_ms {
        return Err(RejectReason::PreexecValidationTimeout);
    }
    if inp.orphan_sweep_in_progress {
        return Err(RejectReason::OrphanSweepInProgressBlock);
    }
    if inp.writer_queue_depth > cfg.reservation.writer_queue_hard_cap {
        return Err(RejectReason::PortfolioWriterOverloadBlock);
    }

    let sizing = st.sizing.as_ref().expect("gate 14 ran");
    let risk_pct = sizing.risk_pct_actual;

    let reservation = {
        let mut guard = ledger.lock().expect("ledger poisoned");
        guard.reserve(&ReservationRequest {
            snapshot_id_used: inp.snapshot_id,
            portfolio_id_used: inp.portfolio.portfolio_id,
            instrument: inp.signal.instrument.clone(),
            cluster_id: inp.cluster_id,
            risk_pct: inp.signal.direction.sign() * risk_pct,
            order_type: inp.order_type,
            now_ms: inp.now_ms,
        })
    };

    match reservation {
        Ok(res) => {
            st.reservation_id = Some(res.reservation_id);
            Ok(())
        }
        Err(ReservationError::StaleSnapshot { .. }) => Err(RejectReason::StalePortfolioSnapshot),
        Err(ReservationError::WriterOverloaded { .. }) => {
            Err(RejectReason::PortfolioWriterOverloadBlock)
        }
        Err(_) => Err(RejectReason::ReservationConflict),
    }
}

/// Gate 17: post-rounding actual risk versus the target.
///
/// Lot rounding can only shrink the quantity; a deviation beyond the
/// configured threshold either rejects or is accepted as reduced risk per
/// policy, with the alternate path always marked in diagnostics.
pub(crate) fn evaluate_gate17(
    _inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let sizing = st.sizing.as_ref().expect("gate 14 ran");
    let target = sizing.risk_pct_target;
    let actual = sizing.risk_pct_actual;
    st.risk_pct_actual = actual;

    if target <= 0.0 {
        return Err(RejectReason::SizingInfeasibleBlock);
    }
    let deviation = (actual - target).abs() / target;
    if deviation > cfg.sizing.lot_rounding_risk_deviation_threshold {
        if cfg.sizing.accept_reduced_risk && actual < target {
            st.reduced_risk_accepted = true;
            return Ok(());
        }
        return Err(RejectReason::LotRoundingRiskDeviationBlock);
    }
    Ok(())
}
