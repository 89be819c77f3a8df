//! Shared unit-test fixtures: fresh, healthy snapshots that individual
//! tests degrade as needed.

use crate::domain::*;
use crate::units::Direction;

pub(crate) const BASE_TS_MS: i64 = 1_700_000_000_000;

pub(crate) fn sample_market_state() -> MarketState {
    MarketState {
        schema_version: MARKET_STATE_SCHEMA_VERSION,
        market_data_id: 1,
        instrument: "BTC-PERP".to_string(),
        timeframe: "H1".to_string(),
        ts_utc_ms: BASE_TS_MS,
        price: PriceState {
            last: 100.0,
            mid: 100.0,
            bid: 99.975,
            ask: 100.025,
            tick_size: 0.01,
            price_ts_ms: BASE_TS_MS,
        },
        volatility: VolatilityState {
            atr: 1.5,
            atr_z_short: 1.0,
            atr_z_long: 1.0,
            hv30: Some(0.55),
            hv30_z: Some(0.0),
            volatility_ts_ms: BASE_TS_MS,
        },
        liquidity: LiquidityState {
            spread_bps: 5.0,
            bid_depth_usd: 2_000_000.0,
            ask_depth_usd: 2_000_000.0,
            volume_24h_usd: 50_000_000.0,
            impact_bps_est: 1.0,
            depth_volatility_cv: 0.10,
            bid_volume_near: 200.0,
            ask_volume_near: 200.0,
            orderbook_ts_ms: BASE_TS_MS,
            orderbook_update_id_age_ms: 50,
            liquidity_ts_ms: BASE_TS_MS,
        },
        derivatives: DerivativesState {
            funding_rate: 0.0001,
            funding_rate_forecast: Some(0.0001),
            funding_period_hours: 8.0,
            time_to_next_funding_sec: 4 * 3_600,
            open_interest_usd: 1_000_000_000.0,
            basis_value: 0.0005,
            basis_z: 0.5,
            basis_vol_z: 0.5,
            adl_rank_quantile: Some(0.20),
            derivatives_ts_ms: BASE_TS_MS,
        },
        correlations: CorrelationView {
            tail_reliability_score: 0.80,
            tail_corr_to_btc: 0.20,
            stress_beta_to_btc: 1.0,
            lambda_used: 0.25,
            corr_matrix_snapshot_id: Some(1),
            corr_matrix_age_sec: 10.0,
            gamma_s: 0.20,
        },
        data_quality: DataQualityView {
            suspected_data_glitch: false,
            stale_book_glitch: false,
            xdev_bps: Some(2.0),
            cross_source_staleness_ms: Some(100),
            oracle_dev_frac: Some(0.001),
            oracle_staleness_ms: Some(500),
            toxic_flow_suspected: false,
        },
    }
}

pub(crate) fn sample_portfolio_state() -> PortfolioState {
    PortfolioState {
        schema_version: PORTFOLIO_STATE_SCHEMA_VERSION,
        portfolio_id: 1,
        ts_utc_ms: BASE_TS_MS,
        equity_usd: 10_000.0,
        equity_peak_usd: 10_000.0,
        drawdown: 0.0,
        drawdown_smoothed: 0.0,
        current_portfolio_risk_pct: 0.0,
        reserved_portfolio_risk_pct: 0.0,
        current_cluster_risk_pct: 0.0,
        reserved_cluster_risk_pct: 0.0,
        sum_abs_risk_pct: 0.0,
        reserved_heat_upper_bound_pct: 0.0,
        adjusted_heat_base_pct: 0.0,
        adjusted_heat_blend_pct: 0.0,
        adjusted_heat_worst_pct: 0.0,
        heat_uni_abs_pct: 0.0,
        max_trade_risk_cap_pct: 0.005,
        drp_state: DrpState::Normal,
        mlops_state: MlopsState::Healthy,
        trading_mode: TradingMode::Live,
        warmup_bars_remaining: 0,
        drp_flap_count: 0,
        hibernate_until_ts_ms: None,
        manual_halt_new_entries: false,
        manual_halt_all_trading: false,
        positions: Vec::new(),
    }
}

pub(crate) fn sample_position(instrument: &str, direction: Direction, risk_pct: f64) -> Position {
    let equity = 10_000.0;
    let entry_eff = 100.075;
    let sl_eff = 97.907;
    let unit_risk = entry_eff - sl_eff;
    let risk_usd = risk_pct * equity;
    Position {
        instrument: instrument.to_string(),
        cluster_id: 0,
        direction,
        qty: risk_usd / unit_risk,
        entry_price: 100.0,
        entry_eff_allin: entry_eff,
        sl_eff_allin: sl_eff,
        risk_amount_usd: risk_usd,
        risk_pct_equity: risk_pct,
        notional_usd: risk_usd / unit_risk * 100.0,
        unrealized_pnl_usd: 0.0,
        funding_pnl_usd: 0.0,
        opened_ts_ms: BASE_TS_MS - 3_600_000,
    }
}

pub(crate) fn sample_signal() -> EngineSignal {
    EngineSignal {
        schema_version: 1,
        instrument: "BTC-PERP".to_string(),
        engine: EngineKind::Trend,
        direction: Direction::Long,
        levels: SignalLevels {
            entry_price: 100.0,
            stop_loss: 98.0,
            take_profit: 106.0,
        },
        context: SignalContext {
            expected_holding_hours: 6.0,
            regime_hint: None,
            setup_id: "trend-breakout-01".to_string(),
        },
        constraints: SignalConstraints {
            rr_min_engine: 1.5,
            sl_min_atr_mult: 0.5,
            sl_max_atr_mult: 3.0,
        },
    }
}

pub(crate) fn sample_mle_output() -> MleOutput {
    MleOutput {
        schema_version: 5,
        model_id: "mle-h1-v12".to_string(),
        artifact_sha256: "a".repeat(64),
        feature_schema_version: 1,
        calibration_version: 3,
        decision: MleDecision::Normal,
        risk_mult: 1.0,
        ev_r_price: 0.35,
        p_fail: 0.40,
        p_neutral: 0.05,
        p_success: 0.55,
        p_stopout_noise: Some(0.10),
        expected_cost_r_pre_mle: Some(0.08),
        expected_cost_r_post_mle: Some(0.07),
    }
}
