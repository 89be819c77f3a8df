//! Correlation-snapshot publisher.
//!
//! Runs off the hot path as an independent task: consumes raw correlation
//! estimates, runs the PSD/stress/blend pipeline and publishes immutable,
//! hashed snapshots over a bounded channel. The Gatekeeper reads snapshots
//! by id and refuses anything stale or not yet valid.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::CorrConfig;
use crate::corr::{blend, check_invariants, project_psd, smooth_gamma, stress_transform};

/// Published correlation snapshot, referenced by id from market state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrMatrixSnapshot {
    pub corr_matrix_snapshot_id: u64,
    pub computed_at_ts_ms: i64,
    /// Consumers must not use the snapshot before this time.
    pub valid_from_ts_ms: i64,
    pub matrix_age_sec: f64,
    pub gamma_s: f64,
    /// SHA256 over the serialized blend matrix, for reproducibility audits.
    pub sha256: String,
    pub instruments: Vec<String>,
    /// Row-major base (PSD) matrix.
    pub psd_data: Vec<f64>,
    /// Row-major stressed matrix.
    pub stress_data: Vec<f64>,
    /// Row-major gamma-blend matrix.
    pub blend_data: Vec<f64>,
}

impl CorrMatrixSnapshot {
    fn matrix_from(&self, data: &[f64]) -> DMatrix<f64> {
        let n = self.instruments.len();
        DMatrix::from_row_slice(n, n, data)
    }

    pub fn psd(&self) -> DMatrix<f64> {
        self.matrix_from(&self.psd_data)
    }

    pub fn stress(&self) -> DMatrix<f64> {
        self.matrix_from(&self.stress_data)
    }

    pub fn blend(&self) -> DMatrix<f64> {
        self.matrix_from(&self.blend_data)
    }

    /// Is this snapshot usable for admission at `now`?
    pub fn usable_at(&self, now_ms: i64, max_age_sec: f64) -> bool {
        now_ms >= self.valid_from_ts_ms && self.age_at(now_ms) <= max_age_sec
    }

    /// Age at `now`, seconds.
    pub fn age_at(&self, now_ms: i64) -> f64 {
        self.matrix_age_sec + ((now_ms - self.computed_at_ts_ms).max(0) as f64) / 1_000.0
    }
}

/// Raw input to the publisher: an estimate plus its observation metadata.
#[derive(Debug, Clone)]
pub struct RawCorrUpdate {
    pub instruments: Vec<String>,
    /// Row-major raw correlation estimate.
    pub raw: Vec<f64>,
    pub observed_gamma: f64,
    pub ts_ms: i64,
    /// Estimation lag already accumulated upstream (seconds).
    pub estimate_age_sec: f64,
}

/// Handle held by consumers: the latest published snapshot.
pub type CorrPublisherHandle = watch::Receiver<Option<CorrMatrixSnapshot>>;

/// Background publisher task driving the correlation pipeline.
pub struct CorrPublisher {
    cfg: CorrConfig,
    rx: mpsc::Receiver<RawCorrUpdate>,
    tx_latest: watch::Sender<Option<CorrMatrixSnapshot>>,
    next_id: u64,
    gamma_s: f64,
}

impl CorrPublisher {
    /// Build the publisher plus the channel endpoints it serves.
    pub fn new(cfg: CorrConfig, queue_depth: usize) -> (Self, mpsc::Sender<RawCorrUpdate>, CorrPublisherHandle) {
        let (tx_raw, rx) = mpsc::channel(queue_depth);
        let (tx_latest, rx_latest) = watch::channel(None);
        (
            Self {
                cfg,
                rx,
                tx_latest,
                next_id: 1,
                gamma_s: 0.0,
            },
            tx_raw,
            rx_latest,
        )
    }

    /// Process one raw update into a published snapshot.
    ///
    /// Exposed separately from [`run`](Self::run) so backtests can drive the
    /// pipeline synchronously with bit-identical results.
    pub fn process(&mut self, update: RawCorrUpdate) -> Option<CorrMatrixSnapshot> {
        let n = update.instruments.len();
        if n == 0 || update.raw.len() != n * n {
            warn!(
                target: "riskgate::corr",
                n,
                len = update.raw.len(),
                "malformed correlation update dropped"
            );
            return None;
        }
        let raw = DMatrix::from_row_slice(n, n, &update.raw);
        let psd = project_psd(&raw, &self.cfg).matrix;
        let stress = stress_transform(&psd, &self.cfg);
        self.gamma_s = smooth_gamma(self.gamma_s, update.observed_gamma, self.cfg.gamma_ema_alpha);
        let blended = blend(&psd, &stress, self.gamma_s);

        if let Err(err) = check_invariants(&blended, self.cfg.diag_eps, self.cfg.psd_neg_eig_tol) {
            warn!(target: "riskgate::corr", %err, "blend failed invariants, snapshot dropped");
            return None;
        }

        let blend_data: Vec<f64> = blended.transpose().iter().copied().collect();
        let mut hasher = Sha256::new();
        for v in &blend_data {
            hasher.update(v.to_le_bytes());
        }
        let sha256 = format!("{:x}", hasher.finalize());

        let snapshot = CorrMatrixSnapshot {
            corr_matrix_snapshot_id: self.next_id,
            computed_at_ts_ms: update.ts_ms,
            valid_from_ts_ms: update.ts_ms,
            matrix_age_sec: update.estimate_age_sec,
            gamma_s: self.gamma_s,
            sha256,
            instruments: update.instruments,
            psd_data: psd.transpose().iter().copied().collect(),
            stress_data: stress.transpose().iter().copied().collect(),
            blend_data,
        };
        self.next_id += 1;
        debug!(
            target: "riskgate::corr",
            id = snapshot.corr_matrix_snapshot_id,
            gamma_s = snapshot.gamma_s,
            "published correlation snapshot"
        );
        Some(snapshot)
    }

    /// Drive the publisher until the input channel closes.
    pub async fn run(mut self) {
        while let Some(update) = self.rx.recv().await {
            if let Some(snapshot) = self.process(update) {
                // receivers lagging is fine; watch keeps only the latest
                let _ = self.tx_latest.send(Some(snapshot));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(ts_ms: i64, gamma: f64) -> RawCorrUpdate {
        RawCorrUpdate {
            instruments: vec!["BTC-PERP".into(), "ETH-PERP".into(), "SOL-PERP".into()],
            raw: vec![1.0, 0.6, 0.4, 0.6, 1.0, 0.5, 0.4, 0.5, 1.0],
            observed_gamma: gamma,
            ts_ms,
            estimate_age_sec: 1.0,
        }
    }

    #[test]
    fn test_process_publishes_valid_snapshot() {
        let (mut publisher, _tx, _rx) = CorrPublisher::new(CorrConfig::default(), 8);
        let snap = publisher.process(update(1_000, 0.3)).expect("snapshot");
        assert_eq!(snap.corr_matrix_snapshot_id, 1);
        assert_eq!(snap.sha256.len(), 64);
        check_invariants(&snap.blend(), 1e-4, 1e-8).unwrap();
        // gamma is EMA-smoothed from 0
        assert!(snap.gamma_s > 0.0 && snap.gamma_s < 0.3);
    }

    #[test]
    fn test_snapshot_ids_monotone_and_hash_stable() {
        let (mut publisher, _tx, _rx) = CorrPublisher::new(CorrConfig::default(), 8);
        let a = publisher.process(update(1_000, 0.3)).unwrap();
        let b = publisher.process(update(2_000, 0.3)).unwrap();
        assert!(b.corr_matrix_snapshot_id > a.corr_matrix_snapshot_id);

        // identical pipeline state + input yields identical hashes
        let (mut p1, _t1, _r1) = CorrPublisher::new(CorrConfig::default(), 8);
        let (mut p2, _t2, _r2) = CorrPublisher::new(CorrConfig::default(), 8);
        let s1 = p1.process(update(1_000, 0.3)).unwrap();
        let s2 = p2.process(update(1_000, 0.3)).unwrap();
        assert_eq!(s1.sha256, s2.sha256);
    }

    #[test]
    fn test_staleness_window() {
        let (mut publisher, _tx, _rx) = CorrPublisher::new(CorrConfig::default(), 8);
        let snap = publisher.process(update(1_000, 0.2)).unwrap();
        assert!(snap.usable_at(1_000, 900.0));
        assert!(!snap.usable_at(500, 900.0), "not yet valid");
        assert!(!snap.usable_at(1_000 + 1_000_000, 900.0), "stale");
    }

    #[test]
    fn test_malformed_update_dropped() {
        let (mut publisher, _tx, _rx) = CorrPublisher::new(CorrConfig::default(), 8);
        let bad = RawCorrUpdate {
            instruments: vec!["BTC-PERP".into()],
            raw: vec![1.0, 0.5],
            observed_gamma: 0.1,
            ts_ms: 0,
            estimate_age_sec: 0.0,
        };
        assert!(publisher.process(bad).is_none());
    }

    #[tokio::test]
    async fn test_run_publishes_to_watch() {
        let (publisher, tx, mut rx) = CorrPublisher::new(CorrConfig::default(), 8);
        let handle = tokio::spawn(publisher.run());
        tx.send(update(1_000, 0.25)).await.unwrap();
        drop(tx);
        handle.await.unwrap();
        rx.changed().await.ok();
        let latest = rx.borrow().clone();
        assert!(latest.is_some());
    }
}
