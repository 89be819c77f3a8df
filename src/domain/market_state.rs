//! Frozen market snapshot: prices, volatility, liquidity, derivatives,
//! correlation references and data-quality observations for one instrument.

use serde::{Deserialize, Serialize};

/// Price block of the market snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceState {
    pub last: f64,
    pub mid: f64,
    pub bid: f64,
    pub ask: f64,
    pub tick_size: f64,
    /// Timestamp of the last price update (UTC ms).
    pub price_ts_ms: i64,
}

/// Volatility block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityState {
    /// Average true range on the working timeframe.
    pub atr: f64,
    /// Short-horizon ATR z-score (drives flap-window adaptation).
    pub atr_z_short: f64,
    /// Long-horizon ATR z-score.
    pub atr_z_long: f64,
    /// 30-day historical volatility (annualized fraction), if available.
    pub hv30: Option<f64>,
    pub hv30_z: Option<f64>,
    pub volatility_ts_ms: i64,
}

/// Order book and liquidity block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityState {
    pub spread_bps: f64,
    pub bid_depth_usd: f64,
    pub ask_depth_usd: f64,
    pub volume_24h_usd: f64,
    /// Size-invariant impact estimate for a reference notional.
    pub impact_bps_est: f64,
    /// Coefficient of variation of top-of-book depth over the sampling window.
    pub depth_volatility_cv: f64,
    /// Bid volume within 1% of mid (for order book imbalance).
    pub bid_volume_near: f64,
    /// Ask volume within 1% of mid.
    pub ask_volume_near: f64,
    pub orderbook_ts_ms: i64,
    /// Age of the venue's last order book update id (ms).
    pub orderbook_update_id_age_ms: i64,
    pub liquidity_ts_ms: i64,
}

impl LiquidityState {
    /// Order book imbalance in [-1, 1]: (bid - ask) / (bid + ask).
    pub fn obi(&self) -> f64 {
        let total = self.bid_volume_near + self.ask_volume_near;
        if total <= 0.0 {
            0.0
        } else {
            (self.bid_volume_near - self.ask_volume_near) / total
        }
    }
}

/// Perpetual-derivative block: funding, open interest, basis, ADL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativesState {
    /// Current funding rate per period (exchange sign: positive = longs pay).
    pub funding_rate: f64,
    /// Forecast funding rate for the next period, if published.
    pub funding_rate_forecast: Option<f64>,
    pub funding_period_hours: f64,
    pub time_to_next_funding_sec: i64,
    pub open_interest_usd: f64,
    pub basis_value: f64,
    pub basis_z: f64,
    pub basis_vol_z: f64,
    /// Auto-deleveraging queue position as a quantile in [0, 1], if known.
    pub adl_rank_quantile: Option<f64>,
    pub derivatives_ts_ms: i64,
}

/// Cross-asset correlation references carried by the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationView {
    /// Reliability of the tail-dependence estimate in [0, 1].
    pub tail_reliability_score: f64,
    pub tail_corr_to_btc: f64,
    pub stress_beta_to_btc: f64,
    /// Tail-dependence lambda actually used downstream.
    pub lambda_used: f64,
    /// Published correlation matrix snapshot consumed by heat/stress math.
    pub corr_matrix_snapshot_id: Option<u64>,
    pub corr_matrix_age_sec: f64,
    /// Stress-blend weight gamma_s in [0, 1].
    pub gamma_s: f64,
}

/// Data-quality observations feeding the DQS evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityView {
    pub suspected_data_glitch: bool,
    pub stale_book_glitch: bool,
    /// Cross-source price deviation in bps (primary vs secondary feed).
    pub xdev_bps: Option<f64>,
    /// Staleness of the secondary source used for xdev (ms).
    pub cross_source_staleness_ms: Option<i64>,
    /// Oracle price deviation as a fraction of mid.
    pub oracle_dev_frac: Option<f64>,
    pub oracle_staleness_ms: Option<i64>,
    pub toxic_flow_suspected: bool,
}

/// Immutable per-instrument market snapshot.
///
/// Created by the data layer on every critical field update; the Gatekeeper
/// only ever reads it through the snapshot registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub schema_version: u32,
    pub market_data_id: u64,
    pub instrument: String,
    /// Working timeframe, "H1" for this engine.
    pub timeframe: String,
    pub ts_utc_ms: i64,
    pub price: PriceState,
    pub volatility: VolatilityState,
    pub liquidity: LiquidityState,
    pub derivatives: DerivativesState,
    pub correlations: CorrelationView,
    pub data_quality: DataQualityView,
}

impl MarketState {
    /// Critical fields whose non-finiteness hard-gates the snapshot.
    pub fn critical_fields(&self) -> [(&'static str, f64); 7] {
        [
            ("price.last", self.price.last),
            ("price.mid", self.price.mid),
            ("price.bid", self.price.bid),
            ("price.ask", self.price.ask),
            ("volatility.atr", self.volatility.atr),
            ("liquidity.spread_bps", self.liquidity.spread_bps),
            ("liquidity.bid_depth_usd", self.liquidity.bid_depth_usd),
        ]
    }

    /// Any NaN/Inf among critical fields?
    pub fn has_non_finite_critical(&self) -> Option<&'static str> {
        self.critical_fields()
            .into_iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(name, _)| name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::sample_market_state;

    #[test]
    fn test_obi_balanced() {
        let ms = sample_market_state();
        assert!(ms.liquidity.obi().abs() < 1e-12);
    }

    #[test]
    fn test_obi_skewed() {
        let mut ms = sample_market_state();
        ms.liquidity.bid_volume_near = 300.0;
        ms.liquidity.ask_volume_near = 100.0;
        assert!((ms.liquidity.obi() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_critical_detection() {
        let mut ms = sample_market_state();
        assert!(ms.has_non_finite_critical().is_none());
        ms.volatility.atr = f64::NAN;
        assert_eq!(ms.has_non_finite_critical(), Some("volatility.atr"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let ms = sample_market_state();
        let json = serde_json::to_string(&ms).unwrap();
        let back: MarketState = serde_json::from_str(&json).unwrap();
        assert_eq!(ms, back);
    }
}
