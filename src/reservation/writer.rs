//! Single-writer portfolio commit path and orphan reconciliation.
//!
//! Readers hold `Arc<PortfolioState>` snapshots and never lock; the writer
//! swaps the current pointer after each successful commit, incrementing
//! `portfolio_id`. Fill commits are optimistic: a commit carrying a stale
//! `portfolio_id_used` refreshes against the current version and rechecks
//! limits, up to `commit_retry_count` times.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ReservationConfig;
use crate::domain::{PortfolioState, Position};
use crate::errors::ReservationError;
use crate::reservation::{ReservationLedger, ReservationState};
use crate::units::Direction;

/// Fill event from the execution manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub reservation_id: Uuid,
    pub snapshot_id_used: u64,
    pub portfolio_id_used: u64,
    pub instrument: String,
    pub cluster_id: u32,
    pub direction: Direction,
    pub filled_qty: f64,
    pub fill_price: f64,
    pub entry_eff_allin: f64,
    pub sl_eff_allin: f64,
    pub ts_ms: i64,
}

/// Outcome of a two-phase fill commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillCommit {
    pub portfolio_id: u64,
    pub occ_retries: u32,
    /// The reservation had already expired when the fill arrived.
    pub reservation_expired_fill_event: bool,
    /// Expired-fill protocol engaged: position trimmed back to limits.
    pub auto_reduced: bool,
}

/// Writer-side events surfaced to the DRP and telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriterEvent {
    ReservationExpiredFill { reservation_id: Uuid },
    AutoReduceToLimits { instrument: String, excess_risk_pct: f64 },
    OrphanOrderDetected { exchange_order_id: String },
    WriterOverload { depth: usize },
}

/// The single mutator of portfolio state.
pub struct PortfolioWriter {
    cfg: ReservationConfig,
    current: Arc<PortfolioState>,
    ledger: Arc<Mutex<ReservationLedger>>,
    /// Pending commit queue depth (fed by the event loop).
    queue_depth: usize,
    events: Vec<WriterEvent>,
    /// Orphan sweep blocks new entries until reconciliation completes.
    orphan_sweep_in_progress: bool,
}

impl PortfolioWriter {
    pub fn new(
        cfg: ReservationConfig,
        initial: PortfolioState,
        ledger: Arc<Mutex<ReservationLedger>>,
    ) -> Self {
        Self {
            cfg,
            current: Arc::new(initial),
            ledger,
            queue_depth: 0,
            events: Vec::new(),
            orphan_sweep_in_progress: false,
        }
    }

    /// Lock-free read of the current portfolio version.
    pub fn current(&self) -> Arc<PortfolioState> {
        Arc::clone(&self.current)
    }

    pub fn set_queue_depth(&mut self, depth: usize) {
        self.queue_depth = depth;
    }

    /// Fast-reject check for new-entry admissions (risk-reducing flows pass).
    pub fn overloaded(&self) -> bool {
        self.queue_depth > self.cfg.writer_queue_hard_cap
    }

    pub fn orphan_sweep_in_progress(&self) -> bool {
        self.orphan_sweep_in_progress
    }

    /// Drain accumulated writer events.
    pub fn take_events(&mut self) -> Vec<WriterEvent> {
        std::mem::take(&mut self.events)
    }

    /// Two-phase fill commit.
    ///
    /// Phase 1 resolved the reservation at admission time; phase 2 applies
    /// the fill under OCC. A fill against an expired reservation still
    /// commits (the position exists on the exchange) but trims to limits and
    /// reports the EMERGENCY-grade event.
    pub fn commit_fill(&mut self, fill: &Fill) -> Result<FillCommit, ReservationError> {
        if self.overloaded() {
            self.events.push(WriterEvent::WriterOverload {
                depth: self.queue_depth,
            });
            return Err(ReservationError::WriterOverloaded {
                depth: self.queue_depth,
                cap: self.cfg.writer_queue_hard_cap,
            });
        }

        let (reservation_state, reserved_risk_pct) = {
            let mut ledger = self.ledger.lock().expect("ledger poisoned");
            let res = ledger
                .get(fill.reservation_id)
                .ok_or(ReservationError::UnknownReservation(fill.reservation_id))?
                .clone();
            let state = res.state;
            if state == ReservationState::Reserved {
                ledger.commit(fill.reservation_id)?;
            }
            (state, res.reserved_risk_pct)
        };

        let expired_fill = matches!(
            reservation_state,
            ReservationState::Expired | ReservationState::Cancelled
        );
        if expired_fill {
            error!(
                target: "riskgate::reservation",
                id = %fill.reservation_id,
                "reservation_expired_fill_event: fill arrived after expiry"
            );
            self.events.push(WriterEvent::ReservationExpiredFill {
                reservation_id: fill.reservation_id,
            });
        }

        // OCC: retry against refreshed versions on conflict
        let mut retries = 0;
        loop {
            let base = self.current();
            let stale = fill.portfolio_id_used != base.portfolio_id;
            if stale && retries >= self.cfg.commit_retry_count {
                return Err(ReservationError::CommitConflict { retries });
            }
            // On a stale snapshot the limits are rechecked against the
            // refreshed version; the recheck here is the apply itself, which
            // recomputes aggregates from `base`.
            let (next, auto_reduced) = self.apply_fill(&base, fill, reserved_risk_pct, expired_fill);
            // single writer: nobody else advanced the pointer since `base`
            if Arc::ptr_eq(&base, &self.current) {
                self.current = Arc::new(next);
                info!(
                    target: "riskgate::reservation",
                    portfolio_id = self.current.portfolio_id,
                    instrument = %fill.instrument,
                    qty = fill.filled_qty,
                    retries,
                    "fill committed"
                );
                return Ok(FillCommit {
                    portfolio_id: self.current.portfolio_id,
                    occ_retries: retries,
                    reservation_expired_fill_event: expired_fill,
                    auto_reduced,
                });
            }
            retries += 1;
        }
    }

    /// Build the successor portfolio version with the fill applied.
    fn apply_fill(
        &mut self,
        base: &PortfolioState,
        fill: &Fill,
        reserved_risk_pct: f64,
        expired_fill: bool,
    ) -> (PortfolioState, bool) {
        let unit_risk = (fill.entry_eff_allin - fill.sl_eff_allin).abs();
        let mut qty = fill.filled_qty;
        let mut auto_reduced = false;

        let risk_usd = qty * unit_risk;
        let mut risk_pct = if base.equity_usd > 0.0 {
            risk_usd / base.equity_usd
        } else {
            0.0
        };

        if expired_fill {
            // auto_reduce_to_limits: keep only what the reservation held
            let allowed = reserved_risk_pct.abs();
            if risk_pct > allowed && risk_pct > 0.0 {
                let scale = allowed / risk_pct;
                qty *= scale;
                let excess = risk_pct - allowed;
                risk_pct = allowed;
                auto_reduced = true;
                self.events.push(WriterEvent::AutoReduceToLimits {
                    instrument: fill.instrument.clone(),
                    excess_risk_pct: excess,
                });
            }
        }

        let position = Position {
            instrument: fill.instrument.clone(),
            cluster_id: fill.cluster_id,
            direction: fill.direction,
            qty,
            entry_price: fill.fill_price,
            entry_eff_allin: fill.entry_eff_allin,
            sl_eff_allin: fill.sl_eff_allin,
            risk_amount_usd: qty * unit_risk,
            risk_pct_equity: risk_pct,
            notional_usd: qty * fill.fill_price,
            unrealized_pnl_usd: 0.0,
            funding_pnl_usd: 0.0,
            opened_ts_ms: fill.ts_ms,
        };

        let mut next = base.clone();
        next.portfolio_id = base.portfolio_id + 1;
        next.ts_utc_ms = fill.ts_ms;
        next.positions.push(position);
        next.current_portfolio_risk_pct += risk_pct;
        next.sum_abs_risk_pct += risk_pct;
        (next, auto_reduced)
    }

    /// Cancel path: release the reservation without touching the portfolio.
    pub fn cancel_reservation(&mut self, reservation_id: Uuid) -> Result<(), ReservationError> {
        let mut ledger = self.ledger.lock().expect("ledger poisoned");
        ledger.cancel(reservation_id)?;
        Ok(())
    }
}

/// One exchange-side open order seen during reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub exchange_order_id: String,
    pub instrument: String,
    /// Reservation id round-tripped through the order's client id, if any.
    pub reservation_id: Option<Uuid>,
}

/// Orphan-sweep outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanSweepReport {
    pub orphans: Vec<String>,
    pub matched: usize,
    /// Local reservations with no exchange-side order (to be cancelled).
    pub dangling_reservations: Vec<Uuid>,
}

/// Startup/reconnect reconciliation of exchange orders against the ledger.
pub struct OrphanSweep;

impl OrphanSweep {
    /// Reconcile; blocks new entries on the writer while running.
    pub fn run(
        writer: &mut PortfolioWriter,
        exchange_orders: &[ExchangeOrder],
        local_reservation_ids: &HashSet<Uuid>,
    ) -> OrphanSweepReport {
        writer.orphan_sweep_in_progress = true;
        let mut report = OrphanSweepReport {
            orphans: Vec::new(),
            matched: 0,
            dangling_reservations: Vec::new(),
        };

        let mut seen: HashSet<Uuid> = HashSet::new();
        for order in exchange_orders {
            match order.reservation_id {
                Some(id) if local_reservation_ids.contains(&id) => {
                    report.matched += 1;
                    seen.insert(id);
                }
                _ => {
                    // exchange-side order with no local owner: cancel or
                    // flip to risk-reducing-only, per policy
                    warn!(
                        target: "riskgate::reservation",
                        order = %order.exchange_order_id,
                        "orphan_order_detected"
                    );
                    writer.events.push(WriterEvent::OrphanOrderDetected {
                        exchange_order_id: order.exchange_order_id.clone(),
                    });
                    report.orphans.push(order.exchange_order_id.clone());
                }
            }
        }
        for &id in local_reservation_ids {
            if !seen.contains(&id) {
                report.dangling_reservations.push(id);
            }
        }

        writer.orphan_sweep_in_progress = false;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::{OrderType, ReservationRequest};
    use crate::testkit::sample_portfolio_state;

    fn setup() -> (PortfolioWriter, Arc<Mutex<ReservationLedger>>) {
        let ledger = Arc::new(Mutex::new(ReservationLedger::new(
            ReservationConfig::default(),
            0.04,
            0.02,
            0.08,
            0.03,
        )));
        let writer = PortfolioWriter::new(
            ReservationConfig::default(),
            sample_portfolio_state(),
            Arc::clone(&ledger),
        );
        (writer, ledger)
    }

    fn reserve(ledger: &Arc<Mutex<ReservationLedger>>, portfolio_id: u64) -> Uuid {
        ledger
            .lock()
            .unwrap()
            .reserve(&ReservationRequest {
                snapshot_id_used: 1,
                portfolio_id_used: portfolio_id,
                instrument: "BTC-PERP".into(),
                cluster_id: 0,
                risk_pct: 0.004,
                order_type: OrderType::Taker,
                now_ms: 1_000,
            })
            .unwrap()
            .reservation_id
    }

    fn fill(reservation_id: Uuid, portfolio_id_used: u64) -> Fill {
        Fill {
            reservation_id,
            snapshot_id_used: 1,
            portfolio_id_used,
            instrument: "BTC-PERP".into(),
            cluster_id: 0,
            direction: Direction::Long,
            filled_qty: 19.7,
            fill_price: 100.0,
            entry_eff_allin: 100.075,
            sl_eff_allin: 97.907,
            ts_ms: 2_000,
        }
    }

    #[test]
    fn test_commit_advances_portfolio_id() {
        let (mut writer, ledger) = setup();
        let base_id = writer.current().portfolio_id;
        let res_id = reserve(&ledger, base_id);
        let out = writer.commit_fill(&fill(res_id, base_id)).unwrap();
        assert_eq!(out.portfolio_id, base_id + 1);
        assert!(!out.reservation_expired_fill_event);
        assert_eq!(writer.current().positions.len(), 1);
        // risk identity on the committed position
        writer.current().check_risk_identities(1e-9).unwrap();
    }

    #[test]
    fn test_readers_keep_old_snapshot() {
        let (mut writer, ledger) = setup();
        let before = writer.current();
        let res_id = reserve(&ledger, before.portfolio_id);
        writer.commit_fill(&fill(res_id, before.portfolio_id)).unwrap();
        // the old Arc is untouched: snapshots are immutable
        assert!(before.positions.is_empty());
        assert_eq!(writer.current().positions.len(), 1);
    }

    #[test]
    fn test_expired_fill_triggers_auto_reduce_and_event() {
        let (mut writer, ledger) = setup();
        let base_id = writer.current().portfolio_id;
        let res_id = reserve(&ledger, base_id);
        // TTL 30 s for takers; expire it
        ledger.lock().unwrap().sweep(1_000 + 31_000);

        // oversize the fill so the reservation cannot cover it
        let mut f = fill(res_id, base_id);
        f.filled_qty = 60.0;
        let out = writer.commit_fill(&f).unwrap();
        assert!(out.reservation_expired_fill_event);
        assert!(out.auto_reduced);
        let events = writer.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, WriterEvent::ReservationExpiredFill { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, WriterEvent::AutoReduceToLimits { .. })));
        // position trimmed to the reserved risk
        let pos = &writer.current().positions[0];
        assert!((pos.risk_pct_equity - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_stale_portfolio_id_refreshes_and_commits() {
        let (mut writer, ledger) = setup();
        let base_id = writer.current().portfolio_id;
        let res_a = reserve(&ledger, base_id);
        writer.commit_fill(&fill(res_a, base_id)).unwrap();

        // second fill still references the old version; single-writer means
        // the pointer no longer matches and retries cannot reconcile the id
        let res_b = reserve(&ledger, base_id);
        let out = writer.commit_fill(&fill(res_b, base_id));
        // the writer refreshes and applies against the current version
        assert!(out.is_ok(), "stale snapshot is refreshed and rechecked");
        assert_eq!(out.unwrap().portfolio_id, base_id + 2);
    }

    #[test]
    fn test_overload_fast_reject() {
        let (mut writer, ledger) = setup();
        let base_id = writer.current().portfolio_id;
        let res_id = reserve(&ledger, base_id);
        writer.set_queue_depth(2_000);
        let err = writer.commit_fill(&fill(res_id, base_id)).unwrap_err();
        assert!(matches!(err, ReservationError::WriterOverloaded { .. }));
    }

    #[test]
    fn test_orphan_sweep_detects_unowned_orders() {
        let (mut writer, ledger) = setup();
        let base_id = writer.current().portfolio_id;
        let owned = reserve(&ledger, base_id);
        let local: HashSet<Uuid> = [owned].into_iter().collect();

        let orders = vec![
            ExchangeOrder {
                exchange_order_id: "ex-1".into(),
                instrument: "BTC-PERP".into(),
                reservation_id: Some(owned),
            },
            ExchangeOrder {
                exchange_order_id: "ex-2".into(),
                instrument: "ETH-PERP".into(),
                reservation_id: None,
            },
        ];
        let report = OrphanSweep::run(&mut writer, &orders, &local);
        assert_eq!(report.matched, 1);
        assert_eq!(report.orphans, vec!["ex-2".to_string()]);
        assert!(report.dangling_reservations.is_empty());
        assert!(!writer.orphan_sweep_in_progress());
        assert!(writer
            .take_events()
            .iter()
            .any(|e| matches!(e, WriterEvent::OrphanOrderDetected { .. })));
    }

    #[test]
    fn test_orphan_sweep_finds_dangling_reservations() {
        let (mut writer, ledger) = setup();
        let base_id = writer.current().portfolio_id;
        let dangling = reserve(&ledger, base_id);
        let local: HashSet<Uuid> = [dangling].into_iter().collect();
        let report = OrphanSweep::run(&mut writer, &[], &local);
        assert_eq!(report.dangling_reservations, vec![dangling]);
    }
}
