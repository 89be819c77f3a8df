//! Scalar reservation ledger with check-and-set admission.
//!
//! All four budget scalars (portfolio, cluster, gross, heat upper bound) are
//! checked and taken in one atomic step; either the whole reservation fits
//! or nothing is taken. The state machine per reservation is idempotent in
//! `reservation_id`: re-applying commit/cancel/expire is a no-op.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ReservationConfig;
use crate::errors::ReservationError;

/// Order type driving the reservation TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Maker,
    Taker,
    Stop,
}

/// Reservation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Reserved,
    Committed,
    Cancelled,
    Expired,
}

impl ReservationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationState::Reserved)
    }
}

/// One reservation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: Uuid,
    pub snapshot_id_used: u64,
    pub portfolio_id_used: u64,
    pub instrument: String,
    pub cluster_id: u32,
    pub reserved_risk_pct: f64,
    pub reserved_cluster_risk_pct: f64,
    pub reserved_sum_abs_risk_pct: f64,
    /// |reserved_risk_pct|: the conservative heat hold.
    pub reserved_heat_upper_bound_pct: f64,
    pub order_type: OrderType,
    pub state: ReservationState,
    pub created_ts_ms: i64,
    pub expires_at_ms: i64,
    pub lease_id: Uuid,
    pub lease_renewal_deadline_ms: i64,
    pub last_heartbeat_ms: i64,
    pub last_renewal_ms: i64,
}

/// Reservation request from gate 16.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub snapshot_id_used: u64,
    pub portfolio_id_used: u64,
    pub instrument: String,
    pub cluster_id: u32,
    pub risk_pct: f64,
    pub order_type: OrderType,
    pub now_ms: i64,
}

/// Result of a sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub expired: Vec<Uuid>,
    /// Released because the heartbeat went silent past the grace window.
    pub heartbeat_lost: Vec<Uuid>,
    /// Consecutive sweeps that released a heartbeat-lost reservation; the
    /// caller escalates DRP to DEFENSIVE past the configured threshold.
    pub consecutive_heartbeat_losses: u32,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.heartbeat_lost.is_empty()
    }
}

/// Aggregate scalar budgets plus the record map.
#[derive(Debug)]
pub struct ReservationLedger {
    cfg: ReservationConfig,
    // budget limits (fractions of equity)
    max_portfolio_risk_pct: f64,
    max_cluster_risk_pct: f64,
    max_gross_risk_pct: f64,
    max_heat_budget_pct: f64,
    // currently-open aggregates from the portfolio snapshot
    open_portfolio_risk_pct: f64,
    open_cluster_risk_pct: HashMap<u32, f64>,
    open_gross_risk_pct: f64,
    open_heat_pct: f64,
    // reserved aggregates
    reserved_portfolio_pct: f64,
    reserved_cluster_pct: HashMap<u32, f64>,
    reserved_gross_pct: f64,
    reserved_heat_pct: f64,
    records: HashMap<Uuid, Reservation>,
    consecutive_heartbeat_losses: u32,
}

impl ReservationLedger {
    pub fn new(
        cfg: ReservationConfig,
        max_portfolio_risk_pct: f64,
        max_cluster_risk_pct: f64,
        max_gross_risk_pct: f64,
        max_heat_budget_pct: f64,
    ) -> Self {
        Self {
            cfg,
            max_portfolio_risk_pct,
            max_cluster_risk_pct,
            max_gross_risk_pct,
            max_heat_budget_pct,
            open_portfolio_risk_pct: 0.0,
            open_cluster_risk_pct: HashMap::new(),
            open_gross_risk_pct: 0.0,
            open_heat_pct: 0.0,
            reserved_portfolio_pct: 0.0,
            reserved_cluster_pct: HashMap::new(),
            reserved_gross_pct: 0.0,
            reserved_heat_pct: 0.0,
            records: HashMap::new(),
            consecutive_heartbeat_losses: 0,
        }
    }

    /// Refresh the open-risk aggregates from a new portfolio version.
    pub fn sync_open_risk(
        &mut self,
        portfolio_risk_pct: f64,
        cluster_risk_pct: HashMap<u32, f64>,
        gross_risk_pct: f64,
        heat_pct: f64,
    ) {
        self.open_portfolio_risk_pct = portfolio_risk_pct;
        self.open_cluster_risk_pct = cluster_risk_pct;
        self.open_gross_risk_pct = gross_risk_pct;
        self.open_heat_pct = heat_pct;
    }

    fn ttl_sec(&self, order_type: OrderType) -> f64 {
        match order_type {
            // a passive maker must outlive the fade timeout
            OrderType::Maker => self
                .cfg
                .ttl_sec_min_maker
                .max(self.cfg.passive_fade_hard_timeout_sec),
            OrderType::Taker => self.cfg.ttl_sec_min_taker,
            OrderType::Stop => self.cfg.ttl_sec_min_stop,
        }
    }

    /// Atomic RESERVE: all four scalars checked, then all four taken.
    pub fn reserve(&mut self, req: &ReservationRequest) -> Result<Reservation, ReservationError> {
        let risk = req.risk_pct.abs();
        let cluster_open = *self.open_cluster_risk_pct.get(&req.cluster_id).unwrap_or(&0.0);
        let cluster_reserved = *self.reserved_cluster_pct.get(&req.cluster_id).unwrap_or(&0.0);

        if self.open_portfolio_risk_pct + self.reserved_portfolio_pct + risk
            > self.max_portfolio_risk_pct
        {
            return Err(ReservationError::PortfolioLimitExceeded);
        }
        if cluster_open + cluster_reserved + risk > self.max_cluster_risk_pct {
            return Err(ReservationError::ClusterLimitExceeded);
        }
        if self.open_gross_risk_pct + self.reserved_gross_pct + risk > self.max_gross_risk_pct {
            return Err(ReservationError::GrossLimitExceeded);
        }
        if self.open_heat_pct + self.reserved_heat_pct + risk > self.max_heat_budget_pct {
            return Err(ReservationError::HeatBudgetExceeded);
        }

        let ttl_ms = (self.ttl_sec(req.order_type) * 1_000.0) as i64;
        let reservation = Reservation {
            reservation_id: Uuid::new_v4(),
            snapshot_id_used: req.snapshot_id_used,
            portfolio_id_used: req.portfolio_id_used,
            instrument: req.instrument.clone(),
            cluster_id: req.cluster_id,
            reserved_risk_pct: req.risk_pct,
            reserved_cluster_risk_pct: risk,
            reserved_sum_abs_risk_pct: risk,
            reserved_heat_upper_bound_pct: risk,
            order_type: req.order_type,
            state: ReservationState::Reserved,
            created_ts_ms: req.now_ms,
            expires_at_ms: req.now_ms + ttl_ms,
            lease_id: Uuid::new_v4(),
            lease_renewal_deadline_ms: req.now_ms + ttl_ms,
            last_heartbeat_ms: req.now_ms,
            last_renewal_ms: req.now_ms,
        };

        self.reserved_portfolio_pct += risk;
        *self.reserved_cluster_pct.entry(req.cluster_id).or_insert(0.0) += risk;
        self.reserved_gross_pct += risk;
        self.reserved_heat_pct += risk;
        self.records
            .insert(reservation.reservation_id, reservation.clone());

        info!(
            target: "riskgate::reservation",
            id = %reservation.reservation_id,
            instrument = %reservation.instrument,
            risk_pct = req.risk_pct,
            ?req.order_type,
            "reserved"
        );
        Ok(reservation)
    }

    fn release_aggregates(&mut self, res: &Reservation) {
        let risk = res.reserved_risk_pct.abs();
        self.reserved_portfolio_pct = (self.reserved_portfolio_pct - risk).max(0.0);
        if let Some(c) = self.reserved_cluster_pct.get_mut(&res.cluster_id) {
            *c = (*c - risk).max(0.0);
        }
        self.reserved_gross_pct = (self.reserved_gross_pct - risk).max(0.0);
        self.reserved_heat_pct = (self.reserved_heat_pct - risk).max(0.0);
    }

    /// Transition a reservation to a terminal state; idempotent.
    fn transition(
        &mut self,
        id: Uuid,
        target: ReservationState,
    ) -> Result<ReservationState, ReservationError> {
        let res = self
            .records
            .get(&id)
            .cloned()
            .ok_or(ReservationError::UnknownReservation(id))?;
        if res.state.is_terminal() {
            // idempotent: repeated terminal application is a no-op
            return Ok(res.state);
        }
        self.release_aggregates(&res);
        if let Some(rec) = self.records.get_mut(&id) {
            rec.state = target;
        }
        Ok(target)
    }

    /// COMMIT: the fill landed inside the TTL.
    pub fn commit(&mut self, id: Uuid) -> Result<ReservationState, ReservationError> {
        self.transition(id, ReservationState::Committed)
    }

    /// CANCEL: order cancelled or pre-exec validation failed.
    pub fn cancel(&mut self, id: Uuid) -> Result<ReservationState, ReservationError> {
        self.transition(id, ReservationState::Cancelled)
    }

    /// Record a heartbeat for an active reservation.
    pub fn heartbeat(&mut self, id: Uuid, now_ms: i64) -> Result<(), ReservationError> {
        let res = self
            .records
            .get_mut(&id)
            .ok_or(ReservationError::UnknownReservation(id))?;
        res.last_heartbeat_ms = now_ms;
        Ok(())
    }

    /// Renew the lease; rate-limited to `renewal_min_period_sec`.
    pub fn renew(&mut self, id: Uuid, now_ms: i64) -> Result<bool, ReservationError> {
        let min_period_ms = (self.cfg.renewal_min_period_sec * 1_000.0) as i64;
        let ttl_sec = {
            let res = self
                .records
                .get(&id)
                .ok_or(ReservationError::UnknownReservation(id))?;
            if res.state.is_terminal() {
                return Ok(false);
            }
            if now_ms - res.last_renewal_ms < min_period_ms {
                return Ok(false);
            }
            self.ttl_sec(res.order_type)
        };
        let res = self.records.get_mut(&id).expect("checked above");
        res.last_renewal_ms = now_ms;
        res.expires_at_ms = now_ms + (ttl_sec * 1_000.0) as i64;
        res.lease_renewal_deadline_ms = res.expires_at_ms;
        Ok(true)
    }

    /// Sweep TTL expiries and lost heartbeats.
    pub fn sweep(&mut self, now_ms: i64) -> SweepReport {
        let mut report = SweepReport::default();
        let ids: Vec<Uuid> = self
            .records
            .values()
            .filter(|r| r.state == ReservationState::Reserved)
            .map(|r| r.reservation_id)
            .collect();
        for id in ids {
            let res = self.records.get(&id).expect("listed above").clone();
            if now_ms >= res.expires_at_ms {
                let _ = self.transition(id, ReservationState::Expired);
                report.expired.push(id);
                warn!(target: "riskgate::reservation", id = %id, "reservation expired");
            } else if now_ms - res.last_heartbeat_ms > self.cfg.heartbeat_grace_ms {
                let _ = self.transition(id, ReservationState::Expired);
                report.heartbeat_lost.push(id);
                warn!(
                    target: "riskgate::reservation",
                    id = %id,
                    "reservation_heartbeat_lost_release_event"
                );
            }
        }
        if report.heartbeat_lost.is_empty() {
            if report.expired.is_empty() {
                // quiet sweep: heartbeat-loss streak decays
                self.consecutive_heartbeat_losses = 0;
            }
        } else {
            self.consecutive_heartbeat_losses += 1;
        }
        report.consecutive_heartbeat_losses = self.consecutive_heartbeat_losses;
        report
    }

    /// Repeated heartbeat losses force DRP DEFENSIVE.
    pub fn heartbeat_losses_critical(&self) -> bool {
        self.consecutive_heartbeat_losses >= self.cfg.heartbeat_loss_defensive_threshold
    }

    pub fn get(&self, id: Uuid) -> Option<&Reservation> {
        self.records.get(&id)
    }

    /// Total reserved portfolio risk (fraction of equity).
    pub fn reserved_portfolio_pct(&self) -> f64 {
        self.reserved_portfolio_pct
    }

    /// `open + reserved <= limit` must hold for every budget scalar.
    pub fn check_budget_invariant(&self) -> Result<(), String> {
        let eps = 1e-12;
        if self.open_portfolio_risk_pct + self.reserved_portfolio_pct
            > self.max_portfolio_risk_pct + eps
        {
            return Err("portfolio budget exceeded".into());
        }
        if self.open_gross_risk_pct + self.reserved_gross_pct > self.max_gross_risk_pct + eps {
            return Err("gross budget exceeded".into());
        }
        if self.open_heat_pct + self.reserved_heat_pct > self.max_heat_budget_pct + eps {
            return Err("heat budget exceeded".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ReservationLedger {
        ReservationLedger::new(ReservationConfig::default(), 0.04, 0.02, 0.08, 0.03)
    }

    fn request(risk_pct: f64, order_type: OrderType, now_ms: i64) -> ReservationRequest {
        ReservationRequest {
            snapshot_id_used: 1,
            portfolio_id_used: 1,
            instrument: "BTC-PERP".into(),
            cluster_id: 0,
            risk_pct,
            order_type,
            now_ms,
        }
    }

    #[test]
    fn test_reserve_within_budget() {
        let mut l = ledger();
        let res = l.reserve(&request(0.004, OrderType::Maker, 1_000)).unwrap();
        assert_eq!(res.state, ReservationState::Reserved);
        assert!((l.reserved_portfolio_pct() - 0.004).abs() < 1e-12);
        l.check_budget_invariant().unwrap();
    }

    #[test]
    fn test_reserve_rejects_over_budget() {
        let mut l = ledger();
        for _ in 0..5 {
            l.reserve(&request(0.004, OrderType::Taker, 1_000)).unwrap();
        }
        // 5 x 0.4% = 2.0% = cluster cap; the sixth breaks the cluster budget
        let err = l.reserve(&request(0.004, OrderType::Taker, 1_000)).unwrap_err();
        assert_eq!(err, ReservationError::ClusterLimitExceeded);
    }

    #[test]
    fn test_commit_releases_budget() {
        let mut l = ledger();
        let res = l.reserve(&request(0.004, OrderType::Taker, 1_000)).unwrap();
        l.commit(res.reservation_id).unwrap();
        assert!(l.reserved_portfolio_pct() < 1e-12);
        assert_eq!(
            l.get(res.reservation_id).unwrap().state,
            ReservationState::Committed
        );
    }

    #[test]
    fn test_idempotent_terminal_transitions() {
        let mut l = ledger();
        let res = l.reserve(&request(0.004, OrderType::Taker, 1_000)).unwrap();
        let id = res.reservation_id;
        assert_eq!(l.commit(id).unwrap(), ReservationState::Committed);
        // a second commit and a late cancel are both no-ops
        assert_eq!(l.commit(id).unwrap(), ReservationState::Committed);
        assert_eq!(l.cancel(id).unwrap(), ReservationState::Committed);
        assert!(l.reserved_portfolio_pct() < 1e-12, "budget released exactly once");
    }

    #[test]
    fn test_ttl_expiry_sweep() {
        let mut l = ledger();
        let res = l.reserve(&request(0.004, OrderType::Taker, 1_000)).unwrap();
        // taker TTL = 30 s
        let report = l.sweep(1_000 + 31_000);
        assert_eq!(report.expired, vec![res.reservation_id]);
        assert_eq!(
            l.get(res.reservation_id).unwrap().state,
            ReservationState::Expired
        );
        assert!(l.reserved_portfolio_pct() < 1e-12);
    }

    #[test]
    fn test_maker_ttl_covers_passive_fade() {
        let l = ledger();
        assert!(l.ttl_sec(OrderType::Maker) >= l.cfg.passive_fade_hard_timeout_sec);
    }

    #[test]
    fn test_heartbeat_loss_release() {
        let mut l = ledger();
        let res = l.reserve(&request(0.004, OrderType::Stop, 1_000)).unwrap();
        // grace is 5 s; no heartbeat for 6 s
        let report = l.sweep(1_000 + 6_000);
        assert_eq!(report.heartbeat_lost, vec![res.reservation_id]);
        assert_eq!(report.consecutive_heartbeat_losses, 1);
    }

    #[test]
    fn test_heartbeat_keeps_reservation_alive() {
        let mut l = ledger();
        let res = l.reserve(&request(0.004, OrderType::Stop, 1_000)).unwrap();
        l.heartbeat(res.reservation_id, 5_000).unwrap();
        let report = l.sweep(9_000);
        assert!(report.is_empty());
    }

    #[test]
    fn test_repeated_heartbeat_loss_escalates() {
        let mut l = ledger();
        for k in 0..3 {
            let now = 1_000 + k * 100_000;
            l.reserve(&request(0.004, OrderType::Stop, now)).unwrap();
            l.sweep(now + 6_000);
        }
        assert!(l.heartbeat_losses_critical());
    }

    #[test]
    fn test_renewal_rate_limited() {
        let mut l = ledger();
        let res = l.reserve(&request(0.004, OrderType::Maker, 1_000)).unwrap();
        // renewal inside the min period is refused
        assert!(!l.renew(res.reservation_id, 2_000).unwrap());
        // past the min period it extends the TTL
        assert!(l.renew(res.reservation_id, 7_000).unwrap());
        let rec = l.get(res.reservation_id).unwrap();
        assert!(rec.expires_at_ms > 7_000);
    }

    #[test]
    fn test_open_risk_counts_against_budget() {
        let mut l = ledger();
        l.sync_open_risk(0.038, HashMap::from([(0, 0.01)]), 0.038, 0.029);
        let err = l.reserve(&request(0.004, OrderType::Taker, 1_000)).unwrap_err();
        assert_eq!(err, ReservationError::PortfolioLimitExceeded);
        // a small one still fits under portfolio but breaks heat
        let err = l.reserve(&request(0.0015, OrderType::Taker, 1_000)).unwrap_err();
        assert_eq!(err, ReservationError::HeatBudgetExceeded);
    }
}
