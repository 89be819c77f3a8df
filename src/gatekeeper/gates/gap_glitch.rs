//! Gate 8: gap and data-glitch detection.
//!
//! Price jumps against the previous print, statistical spikes against a
//! short window, and the frozen-book-with-printing-prices pathology. A
//! severe anomaly sets `suspected_data_glitch` for the DRP with a severity
//! grade.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::EPS_PRICE;

/// Minimum history for the z-score spike check.
const MIN_POINTS_FOR_ZSCORE: usize = 5;
const STDDEV_EPS: f64 = 1e-9;

/// One historical price print.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub ts_ms: i64,
}

/// Glitch severity handed to the DRP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlitchSeverity {
    Low,
    Medium,
    High,
}

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let gap_cfg = &cfg.gap;
    let price = inp.market.price.last;

    // 1. jump against the previous print
    let mut jump_pct = 0.0;
    if let Some(prev) = inp.price_history.last() {
        if prev.price > EPS_PRICE {
            jump_pct = (price - prev.price).abs() / prev.price * 100.0;
        }
    }
    if jump_pct > gap_cfg.price_jump_hard_pct {
        warn!(target: "riskgate::gatekeeper", jump_pct, "hard price jump");
        st.glitch_severity = Some(GlitchSeverity::High);
        return Err(RejectReason::GapGlitchBlock);
    }

    // 2. z-score spike over the recent window
    let mut zscore = None;
    if inp.price_history.len() >= MIN_POINTS_FOR_ZSCORE {
        let n = inp.price_history.len() as f64;
        let mean = inp.price_history.iter().map(|p| p.price).sum::<f64>() / n;
        let var = inp
            .price_history
            .iter()
            .map(|p| (p.price - mean).powi(2))
            .sum::<f64>()
            / (n - 1.0);
        let stddev = var.sqrt();
        if stddev > STDDEV_EPS {
            zscore = Some((price - mean).abs() / stddev);
        }
    }
    if let Some(z) = zscore {
        if z > gap_cfg.price_spike_zscore_hard {
            st.glitch_severity = Some(GlitchSeverity::High);
            return Err(RejectReason::GapGlitchBlock);
        }
    }

    // 3. frozen book under printing prices
    let orderbook_age = inp.now_ms - inp.market.liquidity.orderbook_ts_ms;
    let price_age = inp.now_ms - inp.market.price.price_ts_ms;
    let stale_book_fresh_price =
        orderbook_age > gap_cfg.max_orderbook_age_ms && price_age <= gap_cfg.max_price_age_ms;
    if stale_book_fresh_price {
        st.glitch_severity = Some(GlitchSeverity::Medium);
        return Err(RejectReason::GapGlitchBlock);
    }

    // soft detections feed the DRP without blocking this admission
    let jump_detected = jump_pct > gap_cfg.price_jump_threshold_pct;
    let spike_detected = zscore.map(|z| z > gap_cfg.price_spike_zscore_threshold).unwrap_or(false);
    if jump_detected || spike_detected {
        let severe = jump_pct > gap_cfg.drp_trigger_jump_pct
            || zscore.map(|z| z > gap_cfg.drp_trigger_zscore).unwrap_or(false);
        st.glitch_severity = Some(if severe {
            GlitchSeverity::High
        } else if jump_detected && spike_detected {
            GlitchSeverity::Medium
        } else {
            GlitchSeverity::Low
        });
    }

    Ok(())
}
