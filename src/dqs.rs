//! Data Quality Score evaluator.
//!
//! Produces the composite DQS from per-source staleness, cross-source price
//! validation, oracle sanity and glitch flags, plus the hard-gates that zero
//! the score outright and the `dqs_mult` risk multiplier derived from it.
//!
//! ```text
//! dqs_src_i    = clip(1 - staleness_i / staleness_hard_i, 0, 1)
//! DQS_sources  = sum(w_i * dqs_src_i) / sum(w_i)
//! DQS_critical = min over critical buckets
//! DQS          = w * DQS_critical + (1 - w) * DQS_noncritical,  w = 0.75
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DqsConfig;
use crate::domain::MarketState;
use crate::num::clamp;

/// Hard-gate causes, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DqsHardGate {
    CriticalStaleness,
    CrossSourceDeviation,
    SourcesBelowMin,
    NonFiniteCritical,
    SuspectedGlitch,
    OracleSanity,
    StaleBookFreshPrice,
}

/// Full DQS evaluation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqsResult {
    pub dqs: f64,
    pub dqs_critical: f64,
    pub dqs_noncritical: f64,
    pub dqs_sources: f64,
    /// Risk multiplier interpolated between the emergency and degraded bands.
    pub dqs_mult: f64,
    pub hard_gate: Option<DqsHardGate>,
    /// Bucket that limited DQS_critical (for diagnostics).
    pub limiting_critical_bucket: String,
}

impl DqsResult {
    pub fn hard_gated(&self) -> bool {
        self.hard_gate.is_some()
    }
}

fn staleness_score(staleness_ms: i64, hard_ms: i64) -> f64 {
    if hard_ms <= 0 {
        return 0.0;
    }
    clamp(1.0 - staleness_ms as f64 / hard_ms as f64, 0.0, 1.0)
}

/// Evaluate the DQS for one market snapshot at `now_ms`.
pub fn evaluate(market: &MarketState, now_ms: i64, cfg: &DqsConfig) -> DqsResult {
    // per-bucket staleness (ms), floored at zero for clock skew
    let price_stale = (now_ms - market.price.price_ts_ms).max(0);
    let orderbook_stale = (now_ms - market.liquidity.orderbook_ts_ms).max(0);
    let volatility_stale = (now_ms - market.volatility.volatility_ts_ms).max(0);
    let liquidity_stale = (now_ms - market.liquidity.liquidity_ts_ms).max(0);
    let derivatives_stale = (now_ms - market.derivatives.derivatives_ts_ms).max(0);

    let critical_buckets: [(&'static str, i64, i64); 4] = [
        ("price", price_stale, cfg.price_staleness_hard_ms),
        ("orderbook", orderbook_stale, cfg.orderbook_staleness_hard_ms),
        ("volatility", volatility_stale, cfg.volatility_staleness_hard_ms),
        ("liquidity", liquidity_stale, cfg.liquidity_staleness_hard_ms),
    ];

    let (limiting_critical_bucket, dqs_critical) = critical_buckets
        .iter()
        .map(|&(name, stale, hard)| (name, staleness_score(stale, hard)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).expect("scores are finite"))
        .expect("non-empty buckets");

    // non-critical: derivatives freshness and completeness
    let derivatives_score = staleness_score(derivatives_stale, cfg.derivatives_staleness_hard_ms);
    let completeness = {
        let mut present = 0usize;
        let mut total = 0usize;
        for has in [
            market.derivatives.funding_rate_forecast.is_some(),
            market.derivatives.adl_rank_quantile.is_some(),
            market.volatility.hv30.is_some(),
            market.correlations.corr_matrix_snapshot_id.is_some(),
        ] {
            total += 1;
            if has {
                present += 1;
            }
        }
        present as f64 / total as f64
    };
    let dqs_noncritical = 0.5 * derivatives_score + 0.5 * completeness;

    // weighted per-source score (sources = critical buckets + derivatives)
    let source_weights: [(f64, f64); 5] = [
        (3.0, staleness_score(price_stale, cfg.price_staleness_hard_ms)),
        (2.0, staleness_score(orderbook_stale, cfg.orderbook_staleness_hard_ms)),
        (1.0, staleness_score(volatility_stale, cfg.volatility_staleness_hard_ms)),
        (1.0, staleness_score(liquidity_stale, cfg.liquidity_staleness_hard_ms)),
        (1.0, derivatives_score),
    ];
    let weight_sum: f64 = source_weights.iter().map(|(w, _)| w).sum();
    let dqs_sources = source_weights.iter().map(|(w, s)| w * s).sum::<f64>() / weight_sum;

    // hard-gates, in priority order
    let hard_gate = detect_hard_gate(
        market,
        cfg,
        &critical_buckets,
        dqs_sources,
        price_stale,
        orderbook_stale,
    );

    let (dqs, dqs_critical, dqs_noncritical) = if hard_gate.is_some() {
        (0.0, 0.0, dqs_noncritical)
    } else {
        let dqs = cfg.weight_critical * dqs_critical + (1.0 - cfg.weight_critical) * dqs_noncritical;
        (dqs, dqs_critical, dqs_noncritical)
    };

    let dqs_mult = clamp(
        (dqs - cfg.emergency_threshold) / (cfg.degraded_threshold - cfg.emergency_threshold),
        0.0,
        1.0,
    );

    debug!(
        target: "riskgate::dqs",
        instrument = %market.instrument,
        dqs,
        dqs_critical,
        dqs_sources,
        ?hard_gate,
        "dqs evaluated"
    );

    DqsResult {
        dqs,
        dqs_critical,
        dqs_noncritical,
        dqs_sources,
        dqs_mult,
        hard_gate,
        limiting_critical_bucket: limiting_critical_bucket.to_string(),
    }
}

fn detect_hard_gate(
    market: &MarketState,
    cfg: &DqsConfig,
    critical_buckets: &[(&'static str, i64, i64); 4],
    dqs_sources: f64,
    price_stale_ms: i64,
    orderbook_stale_ms: i64,
) -> Option<DqsHardGate> {
    // 1. any critical bucket beyond its hard threshold
    if critical_buckets.iter().any(|&(_, stale, hard)| stale > hard) {
        return Some(DqsHardGate::CriticalStaleness);
    }

    // 2. cross-source deviation with a valid secondary source
    if let (Some(xdev), Some(cross_stale)) = (
        market.data_quality.xdev_bps,
        market.data_quality.cross_source_staleness_ms,
    ) {
        if xdev >= cfg.xdev_block_bps && cross_stale <= cfg.price_staleness_hard_ms {
            return Some(DqsHardGate::CrossSourceDeviation);
        }
    }

    // 3. weighted source score collapsed
    if dqs_sources < cfg.sources_min {
        return Some(DqsHardGate::SourcesBelowMin);
    }

    // 4. NaN/Inf in critical fields
    if market.has_non_finite_critical().is_some() {
        return Some(DqsHardGate::NonFiniteCritical);
    }

    // 5. upstream glitch flag
    if market.data_quality.suspected_data_glitch {
        return Some(DqsHardGate::SuspectedGlitch);
    }

    // 6. oracle sanity: deviation AND freshness must both hold
    if let (Some(dev), Some(stale)) = (
        market.data_quality.oracle_dev_frac,
        market.data_quality.oracle_staleness_ms,
    ) {
        if dev >= cfg.oracle_dev_block_frac && stale <= cfg.oracle_staleness_hard_ms {
            return Some(DqsHardGate::OracleSanity);
        }
    }

    // 7. order book frozen while prices keep printing
    if market.data_quality.stale_book_glitch
        || (orderbook_stale_ms > cfg.orderbook_staleness_hard_ms
            && price_stale_ms <= cfg.price_staleness_hard_ms)
    {
        return Some(DqsHardGate::StaleBookFreshPrice);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::sample_market_state;

    fn cfg() -> DqsConfig {
        DqsConfig::default()
    }

    #[test]
    fn test_fresh_snapshot_scores_high() {
        let ms = sample_market_state();
        let out = evaluate(&ms, ms.ts_utc_ms, &cfg());
        assert!(out.hard_gate.is_none());
        assert!(out.dqs > 0.9, "fresh snapshot should score high, got {}", out.dqs);
        assert_eq!(out.dqs_mult, 1.0);
    }

    #[test]
    fn test_price_staleness_hard_gate() {
        let ms = sample_market_state();
        // 3000 ms price staleness > 2000 ms hard threshold
        let now = ms.price.price_ts_ms + 3_000;
        let mut ms = ms;
        // keep the other buckets fresh relative to `now`
        ms.liquidity.orderbook_ts_ms = now;
        ms.liquidity.liquidity_ts_ms = now;
        ms.volatility.volatility_ts_ms = now;
        ms.derivatives.derivatives_ts_ms = now;
        let out = evaluate(&ms, now, &cfg());
        assert_eq!(out.hard_gate, Some(DqsHardGate::CriticalStaleness));
        assert_eq!(out.dqs, 0.0);
        assert_eq!(out.dqs_mult, 0.0);
    }

    #[test]
    fn test_xdev_hard_gate_requires_fresh_secondary() {
        let mut ms = sample_market_state();
        ms.data_quality.xdev_bps = Some(30.0);
        ms.data_quality.cross_source_staleness_ms = Some(100);
        let out = evaluate(&ms, ms.ts_utc_ms, &cfg());
        assert_eq!(out.hard_gate, Some(DqsHardGate::CrossSourceDeviation));

        // stale secondary source: deviation not trustworthy, no hard gate
        ms.data_quality.cross_source_staleness_ms = Some(10_000);
        let out = evaluate(&ms, ms.ts_utc_ms, &cfg());
        assert!(out.hard_gate.is_none());
    }

    #[test]
    fn test_oracle_block_needs_both_conditions() {
        let mut ms = sample_market_state();
        ms.data_quality.oracle_dev_frac = Some(0.02);
        ms.data_quality.oracle_staleness_ms = Some(1_000);
        let out = evaluate(&ms, ms.ts_utc_ms, &cfg());
        assert_eq!(out.hard_gate, Some(DqsHardGate::OracleSanity));

        ms.data_quality.oracle_staleness_ms = Some(60_000);
        let out = evaluate(&ms, ms.ts_utc_ms, &cfg());
        assert!(out.hard_gate.is_none(), "stale oracle cannot block");
    }

    #[test]
    fn test_nan_critical_hard_gate() {
        let mut ms = sample_market_state();
        ms.price.mid = f64::NAN;
        let out = evaluate(&ms, ms.ts_utc_ms, &cfg());
        assert_eq!(out.hard_gate, Some(DqsHardGate::NonFiniteCritical));
    }

    #[test]
    fn test_glitch_flag_hard_gate() {
        let mut ms = sample_market_state();
        ms.data_quality.suspected_data_glitch = true;
        let out = evaluate(&ms, ms.ts_utc_ms, &cfg());
        assert_eq!(out.hard_gate, Some(DqsHardGate::SuspectedGlitch));
    }

    #[test]
    fn test_stale_book_fresh_price() {
        let ms = sample_market_state();
        let now = ms.ts_utc_ms + 6_000;
        let mut ms = ms;
        ms.price.price_ts_ms = now; // fresh price
        ms.volatility.volatility_ts_ms = now;
        ms.liquidity.liquidity_ts_ms = now;
        // orderbook left 6 s stale -> critical staleness fires first
        let out = evaluate(&ms, now, &cfg());
        assert_eq!(out.hard_gate, Some(DqsHardGate::CriticalStaleness));

        // explicit upstream flag also gates even with fresh book
        let mut ms2 = sample_market_state();
        ms2.data_quality.stale_book_glitch = true;
        let out = evaluate(&ms2, ms2.ts_utc_ms, &cfg());
        assert_eq!(out.hard_gate, Some(DqsHardGate::StaleBookFreshPrice));
    }

    #[test]
    fn test_dqs_mult_interpolation() {
        // degrade volatility freshness to land DQS between the bands
        let ms = sample_market_state();
        let now = ms.ts_utc_ms + 30_000; // half of the 60 s volatility hard limit
        let mut ms = ms;
        ms.price.price_ts_ms = now;
        ms.liquidity.orderbook_ts_ms = now;
        ms.liquidity.liquidity_ts_ms = now;
        ms.derivatives.derivatives_ts_ms = now;
        let out = evaluate(&ms, now, &cfg());
        assert!(out.hard_gate.is_none());
        assert!(out.dqs_critical <= 0.5 + 1e-9);
        assert!(out.dqs_mult < 1.0);
        assert!(out.dqs_mult > 0.0);
    }

    #[test]
    fn test_monotone_in_staleness() {
        // worsening staleness never raises DQS
        let base = sample_market_state();
        let mut prev = f64::INFINITY;
        for extra in [0i64, 5_000, 15_000, 30_000, 45_000] {
            let now = base.ts_utc_ms + extra;
            let mut ms = base.clone();
            ms.price.price_ts_ms = now;
            ms.liquidity.orderbook_ts_ms = now;
            ms.liquidity.liquidity_ts_ms = now;
            // volatility and derivatives age with `extra`
            let out = evaluate(&ms, now, &cfg());
            assert!(out.dqs <= prev + 1e-12, "DQS must be monotone non-increasing");
            prev = out.dqs;
        }
    }
}
