//! Risk reservations and the single-writer portfolio commit path.
//!
//! The admission pipeline never mutates portfolio state. Gate 16 places a
//! scalar risk reservation through the [`ReservationLedger`]; the external
//! execution manager sends the order and reports fills; the
//! [`PortfolioWriter`] is the only component that produces new portfolio
//! versions, via an optimistic two-phase commit keyed on `portfolio_id`.
//!
//! Reservations carry a TTL by order type, a renewable lease and an
//! independent heartbeat; losing the heartbeat releases the hold, and a fill
//! arriving after expiry is an EMERGENCY-grade infrastructure fault.

mod ledger;
mod writer;

pub use ledger::{
    OrderType, Reservation, ReservationLedger, ReservationRequest, ReservationState, SweepReport,
};
pub use writer::{
    ExchangeOrder, Fill, FillCommit, OrphanSweep, OrphanSweepReport, PortfolioWriter, WriterEvent,
};

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::config::ReservationConfig;

/// Background heartbeat sweeper.
///
/// Ticks the ledger on `heartbeat_period_ms`, releasing reservations whose
/// heartbeat has been silent past the grace window and expiring TTLs. Emits
/// each sweep report over a bounded channel for telemetry.
pub async fn run_heartbeat_sweeper(
    ledger: Arc<Mutex<ReservationLedger>>,
    cfg: ReservationConfig,
    reports: mpsc::Sender<SweepReport>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let period = std::time::Duration::from_millis(cfg.heartbeat_period_ms.max(1) as u64);
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let report = {
                    let mut guard = ledger.lock().expect("ledger poisoned");
                    guard.sweep(now_ms)
                };
                if !report.is_empty() {
                    debug!(
                        target: "riskgate::reservation",
                        expired = report.expired.len(),
                        heartbeat_lost = report.heartbeat_lost.len(),
                        "reservation sweep"
                    );
                    // telemetry backpressure must not stall the sweeper
                    let _ = reports.try_send(report);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
