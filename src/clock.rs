//! Logical clock and snapshot registry.
//!
//! A Lamport-style clock keeps decision time monotone even when external
//! timestamps stall or run backwards; the registry hands out monotone
//! snapshot ids and enforces the max-age rule for admission reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::domain::{MarketState, PortfolioState};

/// Lamport-style millisecond clock: `tick(ext) = max(ext, prev + 1)`.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    last_ms: i64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self { last_ms: 0 }
    }

    /// Advance the clock with an external timestamp.
    pub fn tick(&mut self, external_ts_ms: i64) -> i64 {
        self.last_ms = external_ts_ms.max(self.last_ms + 1);
        self.last_ms
    }

    /// Last issued logical time.
    pub fn now_ms(&self) -> i64 {
        self.last_ms
    }
}

/// One registered decision snapshot: the immutable (market, portfolio) pair
/// plus the logical time it was sealed at.
#[derive(Debug, Clone)]
pub struct DecisionSnapshot {
    pub snapshot_id: u64,
    pub logical_clock_ms: i64,
    pub market: Arc<MarketState>,
    pub portfolio: Arc<PortfolioState>,
}

/// Why a snapshot read was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRejection {
    Unknown,
    /// Older than `snapshot_max_age_ms` relative to the logical clock.
    TooOld { age_ms: i64 },
}

/// Registry of published snapshots with monotone ids and age enforcement.
///
/// The `clock_behind_market` flag latches when a market timestamp outruns
/// the logical clock; the caller must force DRP >= DEFENSIVE on it.
#[derive(Debug)]
pub struct SnapshotRegistry {
    clock: LogicalClock,
    next_id: u64,
    max_age_ms: i64,
    retained: usize,
    snapshots: BTreeMap<u64, DecisionSnapshot>,
    clock_behind_market: bool,
}

impl SnapshotRegistry {
    pub fn new(max_age_ms: i64, retained: usize) -> Self {
        Self {
            clock: LogicalClock::new(),
            next_id: 1,
            max_age_ms,
            retained: retained.max(1),
            snapshots: BTreeMap::new(),
            clock_behind_market: false,
        }
    }

    /// Seal a (market, portfolio) pair into a new snapshot.
    ///
    /// The behind-market check runs against the pre-tick clock: the event
    /// loop keeps the clock current through [`tick`](Self::tick) heartbeats,
    /// so a market timestamp that outruns it is stamped in the future. The
    /// latch is skipped while the clock is uninitialized.
    pub fn publish(
        &mut self,
        market: Arc<MarketState>,
        portfolio: Arc<PortfolioState>,
    ) -> DecisionSnapshot {
        if self.clock.now_ms() > 0 && market.ts_utc_ms > self.clock.now_ms() {
            warn!(
                target: "riskgate::clock",
                market_ts = market.ts_utc_ms,
                logical_ts = self.clock.now_ms(),
                "logical clock behind market timestamp"
            );
            self.clock_behind_market = true;
        }
        let logical = self.clock.tick(market.ts_utc_ms);
        let snapshot = DecisionSnapshot {
            snapshot_id: self.next_id,
            logical_clock_ms: logical,
            market,
            portfolio,
        };
        self.next_id += 1;
        self.snapshots.insert(snapshot.snapshot_id, snapshot.clone());
        while self.snapshots.len() > self.retained {
            let oldest = *self.snapshots.keys().next().expect("non-empty");
            self.snapshots.remove(&oldest);
        }
        snapshot
    }

    /// Read a snapshot for admission; refuses unknown or stale ids.
    pub fn read_for_admission(&self, snapshot_id: u64) -> Result<&DecisionSnapshot, SnapshotRejection> {
        let snap = self
            .snapshots
            .get(&snapshot_id)
            .ok_or(SnapshotRejection::Unknown)?;
        let age_ms = self.clock.now_ms() - snap.logical_clock_ms;
        if age_ms > self.max_age_ms {
            return Err(SnapshotRejection::TooOld { age_ms });
        }
        Ok(snap)
    }

    /// Latest published snapshot, if any.
    pub fn latest(&self) -> Option<&DecisionSnapshot> {
        self.snapshots.values().next_back()
    }

    /// Did a market timestamp ever outrun the logical clock?
    ///
    /// The pipeline feeds this into `GateInputs::clock_behind_market`, where
    /// it floors the DRP target at DEFENSIVE.
    pub fn clock_behind_market(&self) -> bool {
        self.clock_behind_market
    }

    /// Current logical time.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Advance the logical clock without publishing.
    ///
    /// The event loop calls this with wall-clock heartbeats between
    /// snapshots; it is what makes the behind-market detection in
    /// [`publish`](Self::publish) meaningful.
    pub fn tick(&mut self, external_ts_ms: i64) -> i64 {
        self.clock.tick(external_ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{sample_market_state, sample_portfolio_state};

    fn registry() -> SnapshotRegistry {
        SnapshotRegistry::new(5_000, 16)
    }

    #[test]
    fn test_clock_monotone_under_stalled_input() {
        let mut clock = LogicalClock::new();
        assert_eq!(clock.tick(1_000), 1_000);
        assert_eq!(clock.tick(1_000), 1_001);
        assert_eq!(clock.tick(900), 1_002);
        assert_eq!(clock.tick(2_000), 2_000);
    }

    #[test]
    fn test_snapshot_ids_monotone() {
        let mut reg = registry();
        let a = reg.publish(
            Arc::new(sample_market_state()),
            Arc::new(sample_portfolio_state()),
        );
        let b = reg.publish(
            Arc::new(sample_market_state()),
            Arc::new(sample_portfolio_state()),
        );
        assert!(b.snapshot_id > a.snapshot_id);
        assert!(b.logical_clock_ms > a.logical_clock_ms);
    }

    #[test]
    fn test_stale_snapshot_rejected() {
        let mut reg = registry();
        let mut ms = sample_market_state();
        ms.ts_utc_ms = 1_000;
        let snap = reg.publish(Arc::new(ms), Arc::new(sample_portfolio_state()));
        // advance the clock far past max age
        reg.tick(10_000);
        match reg.read_for_admission(snap.snapshot_id) {
            Err(SnapshotRejection::TooOld { age_ms }) => assert!(age_ms > 5_000),
            other => panic!("expected TooOld, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_snapshot_rejected() {
        let reg = registry();
        assert_eq!(
            reg.read_for_admission(42).unwrap_err(),
            SnapshotRejection::Unknown
        );
    }

    #[test]
    fn test_behind_market_latch() {
        let mut reg = registry();
        // heartbeat establishes the clock at wall time
        reg.tick(5_000);
        assert!(!reg.clock_behind_market());

        // a market snapshot stamped past the clock trips the latch
        let mut ms = sample_market_state();
        ms.ts_utc_ms = 8_000;
        let snap = reg.publish(Arc::new(ms), Arc::new(sample_portfolio_state()));
        assert!(reg.clock_behind_market());
        // the clock still absorbs the timestamp monotonically
        assert_eq!(snap.logical_clock_ms, 8_000);
    }

    #[test]
    fn test_current_market_ts_does_not_latch() {
        let mut reg = registry();
        reg.tick(5_000);
        let mut ms = sample_market_state();
        ms.ts_utc_ms = 4_000;
        reg.publish(Arc::new(ms), Arc::new(sample_portfolio_state()));
        assert!(!reg.clock_behind_market());
    }

    #[test]
    fn test_retention_bound() {
        let mut reg = SnapshotRegistry::new(1_000_000, 2);
        for _ in 0..5 {
            reg.publish(
                Arc::new(sample_market_state()),
                Arc::new(sample_portfolio_state()),
            );
        }
        assert_eq!(reg.snapshots.len(), 2);
        assert!(reg.latest().is_some());
    }
}
