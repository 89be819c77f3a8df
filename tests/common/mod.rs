//! Shared fixtures for the pipeline integration tests: a healthy snapshot
//! pair, a calibrated signal and a harness that wires the Gatekeeper to a
//! live ledger the way the production event loop does.

use std::sync::{Arc, Mutex};

use riskgate::config::EngineConfig;
use riskgate::corr::{CorrMatrixSnapshot, CorrPublisher, RawCorrUpdate};
use riskgate::domain::*;
use riskgate::gatekeeper::{GateInputs, Gatekeeper, KpiStats, PricePoint};
use riskgate::reservation::{OrderType, ReservationLedger};
use riskgate::units::{CostModelBps, Direction};

pub const BASE_TS_MS: i64 = 1_700_000_000_000;

pub fn s1_costs() -> CostModelBps {
    CostModelBps {
        spread_bps: 5.0,
        fee_entry_bps: 2.0,
        fee_exit_bps: 2.0,
        slippage_entry_bps: 2.0,
        slippage_tp_bps: 2.0,
        slippage_stop_bps: 2.0,
        impact_entry_bps: 1.0,
        impact_exit_bps: 1.0,
        impact_stop_bps: 1.0,
        stop_slippage_mult: 2.0,
    }
}

pub fn config() -> EngineConfig {
    EngineConfig {
        costs: s1_costs(),
        ..EngineConfig::default()
    }
}

pub fn market_state() -> MarketState {
    MarketState {
        schema_version: 1,
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

pub fn portfolio_state() -> PortfolioState {
    PortfolioState {
        schema_version: 1,
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

pub fn long_signal() -> EngineSignal {
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

pub fn mle_output(p_success: f64, p_fail: f64) -> MleOutput {
    MleOutput {
        schema_version: 5,
        model_id: "mle-h1-v12".to_string(),
        artifact_sha256: "a".repeat(64),
        feature_schema_version: 1,
        calibration_version: 3,
        decision: MleDecision::Normal,
        risk_mult: 1.0,
        ev_r_price: 0.35,
        p_fail,
        p_neutral: (1.0 - p_success - p_fail).max(0.0),
        p_success,
        p_stopout_noise: None,
        expected_cost_r_pre_mle: None,
        expected_cost_r_post_mle: None,
    }
}

pub fn corr_snapshot(cfg: &EngineConfig) -> CorrMatrixSnapshot {
    let (mut publisher, _tx, _rx) = CorrPublisher::new(cfg.corr.clone(), 4);
    publisher
        .process(RawCorrUpdate {
            instruments: vec!["BTC-PERP".into(), "ETH-PERP".into()],
            raw: vec![1.0, 0.6, 0.6, 1.0],
            observed_gamma: 0.2,
            ts_ms: BASE_TS_MS,
            estimate_age_sec: 1.0,
        })
        .expect("snapshot publishes")
}

/// Wires a Gatekeeper to a fresh ledger sized from the config limits.
pub struct Harness {
    pub cfg: Arc<EngineConfig>,
    pub ledger: Arc<Mutex<ReservationLedger>>,
    pub gatekeeper: Gatekeeper,
    pub corr: CorrMatrixSnapshot,
}

impl Harness {
    pub fn new(cfg: EngineConfig) -> Self {
        let cfg = Arc::new(cfg);
        let ledger = Arc::new(Mutex::new(ReservationLedger::new(
            cfg.reservation.clone(),
            cfg.heat.max_portfolio_risk_pct,
            cfg.heat.max_cluster_risk_pct,
            2.0 * cfg.heat.max_portfolio_risk_pct,
            cfg.heat.max_adjusted_heat_pct,
        )));
        let gatekeeper = Gatekeeper::new(Arc::clone(&cfg), Arc::clone(&ledger));
        let corr = corr_snapshot(&cfg);
        Self {
            cfg,
            ledger,
            gatekeeper,
            corr,
        }
    }

    pub fn decide(
        &mut self,
        market: &MarketState,
        portfolio: &PortfolioState,
        signal: &EngineSignal,
        mle: &MleOutput,
    ) -> riskgate::gatekeeper::AdmissionDecision {
        self.decide_at(market, portfolio, signal, mle, market.ts_utc_ms)
    }

    pub fn decide_at(
        &mut self,
        market: &MarketState,
        portfolio: &PortfolioState,
        signal: &EngineSignal,
        mle: &MleOutput,
        now_ms: i64,
    ) -> riskgate::gatekeeper::AdmissionDecision {
        let history: Vec<PricePoint> = (1..=6)
            .rev()
            .map(|k| PricePoint {
                price: 100.0 - 0.01 * k as f64,
                ts_ms: market.ts_utc_ms - 60_000 * k,
            })
            .collect();
        self.gatekeeper.evaluate_entry_signal(&GateInputs {
            mrc: MrcResult {
                class: MrcClass::TrendUp,
                confidence: 0.80,
            },
            baseline: BaselineClass::TrendUp,
            signal,
            mle: Some(mle),
            market,
            portfolio,
            corr: Some(&self.corr),
            price_history: &history,
            kpi: Some(KpiStats {
                win_rate: 0.52,
                avg_rr: 2.0,
                valid: true,
            }),
            conflict_count_in_window: 0,
            crisis_index: 0.0,
            clock_behind_market: false,
            snapshot_id: 1,
            logical_clock_ms: now_ms,
            now_ms,
            cluster_id: 0,
            order_type: OrderType::Taker,
            operator_ack: false,
            successful_bar_completed: true,
            writer_queue_depth: 0,
            orphan_sweep_in_progress: false,
            preexec_elapsed_ms: 5,
        })
    }
}
