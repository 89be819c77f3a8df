//! Rolling trade KPIs: weighted win rate, average win/loss and the profit
//! factor, with the money/ratio identity check used to validate the sample.
//!
//! With a weighted win rate `WR_w` the identity
//!
//! ```text
//! PF_money = gross_wins / gross_losses
//!          = (WR_w * AvgWin_w) / ((1 - WR_w) * AvgLoss_w)
//! ```
//!
//! holds exactly; drift beyond tolerance means the sample is inconsistent
//! (mixed units, dropped trades) and must not feed the Kelly cap.

use serde::{Deserialize, Serialize};

use crate::gatekeeper::KpiStats;
use crate::num::{is_close, CompareContext};

/// Weighted KPI sample over closed trades.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KpiSample {
    win_weight: f64,
    loss_weight: f64,
    gross_win_usd: f64,
    gross_loss_usd: f64,
    /// Sum and sum-of-squares of per-trade risk, for the dispersion check.
    risk_sum: f64,
    risk_sq_sum: f64,
    trades: usize,
}

impl KpiSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one closed trade: PnL in USD and the risk that was staked.
    pub fn record(&mut self, pnl_usd: f64, risk_amount_usd: f64, weight: f64) {
        debug_assert!(risk_amount_usd > 0.0, "risk must be positive");
        if pnl_usd >= 0.0 {
            self.win_weight += weight;
            self.gross_win_usd += weight * pnl_usd;
        } else {
            self.loss_weight += weight;
            self.gross_loss_usd += weight * (-pnl_usd);
        }
        self.risk_sum += risk_amount_usd;
        self.risk_sq_sum += risk_amount_usd * risk_amount_usd;
        self.trades += 1;
    }

    pub fn trades(&self) -> usize {
        self.trades
    }

    /// Weighted win rate.
    pub fn win_rate(&self) -> f64 {
        let total = self.win_weight + self.loss_weight;
        if total <= 0.0 {
            0.0
        } else {
            self.win_weight / total
        }
    }

    pub fn avg_win_usd(&self) -> f64 {
        if self.win_weight <= 0.0 {
            0.0
        } else {
            self.gross_win_usd / self.win_weight
        }
    }

    pub fn avg_loss_usd(&self) -> f64 {
        if self.loss_weight <= 0.0 {
            0.0
        } else {
            self.gross_loss_usd / self.loss_weight
        }
    }

    /// Profit factor from gross money flows.
    pub fn pf_money(&self) -> f64 {
        if self.gross_loss_usd <= 0.0 {
            f64::INFINITY
        } else {
            self.gross_win_usd / self.gross_loss_usd
        }
    }

    /// Profit factor reconstructed from the win-rate/average form.
    pub fn pf_from_ratios(&self) -> f64 {
        let wr = self.win_rate();
        let denom = (1.0 - wr) * self.avg_loss_usd();
        if denom <= 0.0 {
            f64::INFINITY
        } else {
            wr * self.avg_win_usd() / denom
        }
    }

    /// Coefficient of variation of per-trade risk.
    ///
    /// A high dispersion means trades were staked at wildly different risk
    /// and the weighted identity loses meaning.
    pub fn cv_risk(&self) -> f64 {
        if self.trades < 2 {
            return 0.0;
        }
        let n = self.trades as f64;
        let mean = self.risk_sum / n;
        if mean <= 0.0 {
            return f64::INFINITY;
        }
        let var = (self.risk_sq_sum / n - mean * mean).max(0.0);
        var.sqrt() / mean
    }

    /// Does the money/ratio identity hold within the integration tolerance?
    pub fn pf_identity_holds(&self, cv_threshold: f64) -> bool {
        if self.cv_risk() > cv_threshold {
            return false;
        }
        let money = self.pf_money();
        let ratios = self.pf_from_ratios();
        if !money.is_finite() || !ratios.is_finite() {
            return money == ratios;
        }
        is_close(money, ratios, CompareContext::IntegrationKpi)
    }

    /// Export the stats consumed by the Kelly cap, marking validity.
    pub fn stats(&self, min_trades: usize, cv_threshold: f64) -> KpiStats {
        let avg_loss = self.avg_loss_usd();
        let avg_rr = if avg_loss > 0.0 {
            self.avg_win_usd() / avg_loss
        } else {
            0.0
        };
        KpiStats {
            win_rate: self.win_rate(),
            avg_rr,
            valid: self.trades >= min_trades && self.pf_identity_holds(cv_threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KpiSample {
        let mut s = KpiSample::new();
        // even-staked sample: 3 wins of 80, 2 losses of 50 at 50 risk each
        for _ in 0..3 {
            s.record(80.0, 50.0, 1.0);
        }
        for _ in 0..2 {
            s.record(-50.0, 50.0, 1.0);
        }
        s
    }

    #[test]
    fn test_win_rate_and_averages() {
        let s = sample();
        assert!((s.win_rate() - 0.6).abs() < 1e-12);
        assert!((s.avg_win_usd() - 80.0).abs() < 1e-12);
        assert!((s.avg_loss_usd() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_i7_pf_identity() {
        let s = sample();
        // PF_money = 240 / 100 = 2.4; ratio form: 0.6*80 / (0.4*50) = 2.4
        assert!((s.pf_money() - 2.4).abs() < 1e-12);
        assert!((s.pf_from_ratios() - 2.4).abs() < 1e-12);
        assert!(s.pf_identity_holds(0.5));
    }

    #[test]
    fn test_identity_with_weights() {
        let mut s = KpiSample::new();
        s.record(100.0, 50.0, 2.0);
        s.record(-40.0, 50.0, 1.0);
        s.record(60.0, 50.0, 0.5);
        assert!(s.pf_identity_holds(0.5));
    }

    #[test]
    fn test_high_risk_dispersion_invalidates() {
        let mut s = KpiSample::new();
        s.record(80.0, 10.0, 1.0);
        s.record(-50.0, 500.0, 1.0);
        s.record(80.0, 10.0, 1.0);
        assert!(s.cv_risk() > 0.5);
        assert!(!s.pf_identity_holds(0.5));
        assert!(!s.stats(3, 0.5).valid);
    }

    #[test]
    fn test_stats_export() {
        let s = sample();
        let stats = s.stats(5, 0.5);
        assert!(stats.valid);
        assert!((stats.win_rate - 0.6).abs() < 1e-12);
        assert!((stats.avg_rr - 1.6).abs() < 1e-12);

        let stats = s.stats(10, 0.5);
        assert!(!stats.valid, "sample below min_trades must be invalid");
    }

    #[test]
    fn test_all_wins_infinite_pf() {
        let mut s = KpiSample::new();
        s.record(80.0, 50.0, 1.0);
        assert!(s.pf_money().is_infinite());
        assert!(s.pf_identity_holds(0.5));
    }
}
