//! Process-wide immutable engine configuration.
//!
//! Loaded once, frozen, and carried by reference into every gate. Hot reload
//! means building a new `EngineConfig` with a bumped `config_version` and
//! swapping it together with a fresh snapshot; nothing mutates in place.
//!
//! Defaults follow the published parameter tables; tests treat them as the
//! source of truth.

use serde::{Deserialize, Serialize};

use crate::corr::StressMode;
use crate::units::CostModelBps;

/// Data-quality scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqsConfig {
    /// Weight of the critical bucket in the composite score.
    pub weight_critical: f64,
    /// DQS below this is EMERGENCY territory (dqs_mult = 0).
    pub emergency_threshold: f64,
    /// DQS at or above this is full quality (dqs_mult = 1).
    pub degraded_threshold: f64,
    /// Cross-source deviation hard gate (bps).
    pub xdev_block_bps: f64,
    /// Oracle deviation hard gate (fraction of mid).
    pub oracle_dev_block_frac: f64,
    /// Oracle staleness beyond which the oracle check is moot (ms).
    pub oracle_staleness_hard_ms: i64,
    /// Weighted per-source score floor.
    pub sources_min: f64,
    // hard staleness thresholds per critical bucket (ms)
    pub price_staleness_hard_ms: i64,
    pub orderbook_staleness_hard_ms: i64,
    pub volatility_staleness_hard_ms: i64,
    pub liquidity_staleness_hard_ms: i64,
    // non-critical staleness thresholds (ms)
    pub funding_staleness_hard_ms: i64,
    pub basis_staleness_hard_ms: i64,
    pub derivatives_staleness_hard_ms: i64,
}

impl Default for DqsConfig {
    fn default() -> Self {
        Self {
            weight_critical: 0.75,
            emergency_threshold: 0.40,
            degraded_threshold: 0.70,
            xdev_block_bps: 25.0,
            oracle_dev_block_frac: 0.01,
            oracle_staleness_hard_ms: 30_000,
            sources_min: 0.50,
            price_staleness_hard_ms: 2_000,
            orderbook_staleness_hard_ms: 5_000,
            volatility_staleness_hard_ms: 60_000,
            liquidity_staleness_hard_ms: 10_000,
            funding_staleness_hard_ms: 120_000,
            basis_staleness_hard_ms: 120_000,
            derivatives_staleness_hard_ms: 120_000,
        }
    }
}

/// DRP warm-up and anti-flapping parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrpConfig {
    /// DQS below this targets EMERGENCY (mirrors DqsConfig::emergency_threshold).
    pub dqs_emergency_threshold: f64,
    /// DQS below this targets DEFENSIVE (mirrors DqsConfig::degraded_threshold).
    pub dqs_degraded_threshold: f64,
    pub warmup_bars_data_glitch: u32,
    pub warmup_bars_liquidity: u32,
    pub warmup_bars_depeg: u32,
    pub warmup_bars_base: u32,
    pub warmup_bars_min: u32,
    pub warmup_bars_max: u32,
    /// Recovery hold used to derive warm-up bars for OTHER causes (minutes).
    pub recovery_hold_minutes: f64,
    pub flap_window_minutes_base: f64,
    pub flap_window_minutes_min: f64,
    pub flap_window_minutes_max: f64,
    pub flap_to_hibernate_threshold: u32,
    pub hibernate_min_duration_sec: f64,
    /// Crisis index at or above this forces EMERGENCY.
    pub crisis_emergency_threshold: f64,
}

impl Default for DrpConfig {
    fn default() -> Self {
        Self {
            dqs_emergency_threshold: 0.40,
            dqs_degraded_threshold: 0.70,
            warmup_bars_data_glitch: 3,
            warmup_bars_liquidity: 6,
            warmup_bars_depeg: 24,
            warmup_bars_base: 3,
            warmup_bars_min: 2,
            warmup_bars_max: 48,
            recovery_hold_minutes: 60.0,
            flap_window_minutes_base: 60.0,
            flap_window_minutes_min: 10.0,
            flap_window_minutes_max: 240.0,
            flap_to_hibernate_threshold: 5,
            hibernate_min_duration_sec: 3_600.0,
            crisis_emergency_threshold: 0.90,
        }
    }
}

/// Gate 2 regime-resolution parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    pub mrc_high_conf_threshold: f64,
    pub mrc_very_high_conf_threshold: f64,
    pub mrc_low_conf_threshold: f64,
    pub conflict_window_bars: u32,
    pub conflict_ratio_threshold: f64,
    pub diagnostic_block_minutes: u32,
    pub probe_min_depth_usd: f64,
    pub probe_max_spread_bps: f64,
    pub probe_risk_mult: f64,
    /// Conservative risk reduction applied when a very-high-confidence MRC
    /// overrides a NOISE baseline. Deliberately a documented config knob.
    pub noise_override_risk_mult: f64,
    /// Risk reduction when a trend call downgrades to breakout vs a RANGE baseline.
    pub trend_vs_range_risk_mult: f64,
    /// ATR-z cap for the RANGE-engine NOISE exception in gate 3.
    pub noise_range_atr_z_cap: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            mrc_high_conf_threshold: 0.70,
            mrc_very_high_conf_threshold: 0.85,
            mrc_low_conf_threshold: 0.55,
            conflict_window_bars: 10,
            conflict_ratio_threshold: 0.60,
            diagnostic_block_minutes: 120,
            probe_min_depth_usd: 50_000.0,
            probe_max_spread_bps: 5.0,
            probe_risk_mult: 0.33,
            noise_override_risk_mult: 0.50,
            trend_vs_range_risk_mult: 0.75,
            noise_range_atr_z_cap: 1.5,
        }
    }
}

/// Gate 4 signal-sanity bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSanityConfig {
    pub holding_hours_min: f64,
    pub holding_hours_max: f64,
    /// ATR floor below which validation is meaningless.
    pub min_atr_for_validation: f64,
}

impl Default for SignalSanityConfig {
    fn default() -> Self {
        Self {
            holding_hours_min: 0.5,
            holding_hours_max: 168.0,
            min_atr_for_validation: 1e-8,
        }
    }
}

/// Gate 5/6 pre-sizing and MLE-decision parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MleConfig {
    /// e1: EV_R below this (but positive) is WEAK.
    pub ev_r_weak_threshold: f64,
    /// e2: EV_R at or above this is STRONG.
    pub ev_r_normal_threshold: f64,
    pub net_edge_floor_r: f64,
    /// Defensive reject: high neutral mass with near-zero EV.
    pub p_neutral_cutoff: f64,
    pub ev_near_zero_band: f64,
    // CVaR beta adjustment for the fail leg
    pub beta_base: f64,
    pub beta_min: f64,
    pub beta_max: f64,
    /// CVaR amplification of the -1R fail leg at beta_max.
    pub cvar_fail_floor_r: f64,
    pub unit_risk_min_atr_mult: f64,
    /// Feature schema version this engine build requires.
    pub required_feature_schema_version: u32,
}

impl Default for MleConfig {
    fn default() -> Self {
        Self {
            ev_r_weak_threshold: 0.10,
            ev_r_normal_threshold: 0.25,
            net_edge_floor_r: 0.05,
            p_neutral_cutoff: 0.60,
            ev_near_zero_band: 0.05,
            beta_base: 0.95,
            beta_min: 0.90,
            beta_max: 0.99,
            cvar_fail_floor_r: -1.25,
            unit_risk_min_atr_mult: 0.02,
            required_feature_schema_version: 1,
        }
    }
}

/// Gate 7 liquidity thresholds and multiplier bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityConfig {
    pub bid_depth_min_usd: f64,
    pub ask_depth_min_usd: f64,
    pub spread_max_soft_bps: f64,
    pub spread_max_hard_bps: f64,
    pub volume_24h_min_usd: f64,
    pub impact_k: f64,
    pub impact_pow: f64,
    pub impact_max_soft_bps: f64,
    pub impact_max_hard_bps: f64,
    /// Depth CV above this flags spoofing.
    pub depth_volatility_cv_threshold: f64,
    pub spoofing_block_enabled: bool,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            bid_depth_min_usd: 500_000.0,
            ask_depth_min_usd: 500_000.0,
            spread_max_soft_bps: 10.0,
            spread_max_hard_bps: 25.0,
            volume_24h_min_usd: 10_000_000.0,
            impact_k: 0.01,
            impact_pow: 0.5,
            impact_max_soft_bps: 8.0,
            impact_max_hard_bps: 20.0,
            depth_volatility_cv_threshold: 0.50,
            spoofing_block_enabled: true,
        }
    }
}

/// Gate 8 gap/glitch detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapGlitchConfig {
    pub price_jump_threshold_pct: f64,
    pub price_jump_hard_pct: f64,
    pub price_spike_zscore_threshold: f64,
    pub price_spike_zscore_hard: f64,
    pub max_orderbook_age_ms: i64,
    pub max_price_age_ms: i64,
    pub drp_trigger_zscore: f64,
    pub drp_trigger_jump_pct: f64,
}

impl Default for GapGlitchConfig {
    fn default() -> Self {
        Self {
            price_jump_threshold_pct: 2.0,
            price_jump_hard_pct: 5.0,
            price_spike_zscore_threshold: 3.0,
            price_spike_zscore_hard: 5.0,
            max_orderbook_age_ms: 5_000,
            max_price_age_ms: 1_000,
            drp_trigger_zscore: 4.0,
            drp_trigger_jump_pct: 3.5,
        }
    }
}

/// Gate 9 funding filter, proximity model and blackout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingConfig {
    pub unit_risk_min_for_funding: f64,
    pub funding_cost_soft_r: f64,
    pub funding_cost_block_r: f64,
    pub min_net_yield_r: f64,
    /// Whether positive funding may add to Net_Yield_R (policy; default off).
    pub funding_credit_allowed: bool,
    pub proximity_soft_sec: i64,
    pub proximity_hard_sec: i64,
    pub proximity_power: f64,
    pub proximity_mult_min: f64,
    pub blackout_minutes: i64,
    pub blackout_max_holding_hours: f64,
    pub blackout_cost_share_threshold: f64,
    pub blackout_ev_eps: f64,
    pub event_inclusion_epsilon_sec: i64,
    /// EMA width for smoothing the funding-event count (seconds).
    pub count_smoothing_width_sec: f64,
    pub risk_mult_soft_penalty: f64,
    pub risk_mult_hard_penalty: f64,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            unit_risk_min_for_funding: 5e-4,
            funding_cost_soft_r: 0.10,
            funding_cost_block_r: 0.25,
            min_net_yield_r: 0.05,
            funding_credit_allowed: false,
            proximity_soft_sec: 1_800,
            proximity_hard_sec: 300,
            proximity_power: 2.0,
            proximity_mult_min: 0.80,
            blackout_minutes: 15,
            blackout_max_holding_hours: 12.0,
            blackout_cost_share_threshold: 0.40,
            blackout_ev_eps: 0.05,
            event_inclusion_epsilon_sec: 2,
            count_smoothing_width_sec: 60.0,
            risk_mult_soft_penalty: 0.95,
            risk_mult_hard_penalty: 0.85,
        }
    }
}

/// Gate 10 basis-risk bands and correlation/exposure caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasisExposureConfig {
    // basis bands on |z|
    pub basis_z_soft: f64,
    pub basis_z_hard: f64,
    pub basis_vol_z_soft: f64,
    pub basis_vol_z_hard: f64,
    pub basis_soft_mult: f64,
    pub basis_hard_mult: f64,
    /// Funding-event proximity bands for the basis event multiplier (sec).
    pub basis_event_soft_sec: i64,
    pub basis_event_hard_sec: i64,
    // correlation conflict
    pub max_correlation_soft: f64,
    pub max_correlation_hard: f64,
    pub min_exposure_r_for_correlation: f64,
    pub correlation_mult_soft: f64,
    pub correlation_mult_hard: f64,
    // exposure caps (R units) and utilization bands
    pub max_total_exposure_r: f64,
    pub max_asset_exposure_r: f64,
    pub max_sector_exposure_r: f64,
    pub exposure_soft_utilization: f64,
    pub exposure_hard_utilization: f64,
    pub exposure_mult_soft: f64,
    pub exposure_mult_hard: f64,
    pub max_positions_soft: usize,
    pub max_positions_hard: usize,
    pub concentration_soft: f64,
    pub concentration_hard: f64,
}

impl Default for BasisExposureConfig {
    fn default() -> Self {
        Self {
            basis_z_soft: 2.0,
            basis_z_hard: 3.5,
            basis_vol_z_soft: 2.0,
            basis_vol_z_hard: 3.5,
            basis_soft_mult: 0.75,
            basis_hard_mult: 0.40,
            basis_event_soft_sec: 1_800,
            basis_event_hard_sec: 300,
            max_correlation_soft: 0.70,
            max_correlation_hard: 0.85,
            min_exposure_r_for_correlation: 0.01,
            correlation_mult_soft: 0.95,
            correlation_mult_hard: 0.85,
            max_total_exposure_r: 10.0,
            max_asset_exposure_r: 5.0,
            max_sector_exposure_r: 3.0,
            exposure_soft_utilization: 0.80,
            exposure_hard_utilization: 0.95,
            exposure_mult_soft: 0.95,
            exposure_mult_hard: 0.85,
            max_positions_soft: 6,
            max_positions_hard: 8,
            concentration_soft: 0.50,
            concentration_hard: 0.70,
        }
    }
}

/// Gate 11/12 net-RR and bankruptcy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankruptcyConfig {
    pub rr_min_probe_add: f64,
    pub net_rr_eps_price: f64,
    pub gap_frac_base: f64,
    pub gap_hv_sensitivity: f64,
    pub gap_hv_z_cap: f64,
    pub gap_frac_min: f64,
    pub gap_frac_max: f64,
    pub gap_unit_risk_eps: f64,
    pub max_gap_loss_pct_equity: f64,
    pub portfolio_max_gap_loss_pct_equity: f64,
    /// SL must sit at least this fraction away from the liquidation price.
    pub liq_buffer_frac: f64,
    /// Assumed maintenance-margin fraction for the liquidation estimate.
    pub maintenance_margin_frac: f64,
    pub leverage_max: f64,
    /// Top-K positions by risk included in the stress-gap set S.
    pub stress_gap_top_k: usize,
    /// Lambda at or above which all stress off-diagonals snap to +1.
    pub stress_gap_lambda_unity_threshold: f64,
    pub hv30_ref: f64,
}

impl Default for BankruptcyConfig {
    fn default() -> Self {
        Self {
            rr_min_probe_add: 0.10,
            net_rr_eps_price: 1e-8,
            gap_frac_base: 0.01,
            gap_hv_sensitivity: 0.50,
            gap_hv_z_cap: 3.0,
            gap_frac_min: 0.005,
            gap_frac_max: 0.05,
            gap_unit_risk_eps: 1e-9,
            max_gap_loss_pct_equity: 0.02,
            portfolio_max_gap_loss_pct_equity: 0.05,
            liq_buffer_frac: 0.20,
            maintenance_margin_frac: 0.005,
            leverage_max: 10.0,
            stress_gap_top_k: 5,
            stress_gap_lambda_unity_threshold: 0.85,
            hv30_ref: 0.60,
        }
    }
}

/// Gate 13 sequential risk-multiplier (REM) parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemConfig {
    // DD ladder: (drawdown threshold, allowed risk cap)
    pub dd_ladder: Vec<(f64, f64)>,
    pub dd_smoothing_alpha: f64,
    pub kelly_fraction: f64,
    pub kelly_cap_max: f64,
    pub max_trade_risk_hard_cap_pct: f64,
    // tail-lambda band
    pub tail_lambda_soft: f64,
    pub tail_lambda_hard: f64,
    pub tail_lambda_mult_min: f64,
    // corr/beta z bands
    pub stress_beta_soft: f64,
    pub stress_beta_hard: f64,
    pub tail_corr_soft: f64,
    pub tail_corr_hard: f64,
    pub reliability_floor: f64,
    pub corr_beta_mult_min: f64,
    // ADL
    pub adl_quantile_soft: f64,
    pub adl_quantile_hard: f64,
    pub adl_mult_min: f64,
    // defensive tables
    pub drp_defensive_mult: f64,
    pub drp_degraded_mult: f64,
    pub mlops_degraded_mult: f64,
    pub mlops_failed_mult: f64,
    // cluster combination
    pub active_threshold: f64,
    pub active_power: f64,
    pub stacking_penalty_base: f64,
    // risk floor / hibernation
    pub min_risk_floor_pct: f64,
    pub hibernate_trigger_n: u32,
}

impl Default for RemConfig {
    fn default() -> Self {
        Self {
            dd_ladder: vec![
                (0.05, 0.005),
                (0.10, 0.0035),
                (0.15, 0.002),
                (0.20, 0.001),
            ],
            dd_smoothing_alpha: 0.20,
            kelly_fraction: 0.50,
            kelly_cap_max: 0.004,
            max_trade_risk_hard_cap_pct: 0.005,
            tail_lambda_soft: 0.30,
            tail_lambda_hard: 0.70,
            tail_lambda_mult_min: 0.40,
            stress_beta_soft: 1.5,
            stress_beta_hard: 3.0,
            tail_corr_soft: 0.60,
            tail_corr_hard: 0.90,
            reliability_floor: 0.30,
            corr_beta_mult_min: 0.50,
            adl_quantile_soft: 0.70,
            adl_quantile_hard: 0.95,
            adl_mult_min: 0.30,
            drp_defensive_mult: 0.50,
            drp_degraded_mult: 0.75,
            mlops_degraded_mult: 0.60,
            mlops_failed_mult: 0.0,
            active_threshold: 0.95,
            active_power: 1.0,
            stacking_penalty_base: 0.90,
            min_risk_floor_pct: 2e-4,
            hibernate_trigger_n: 5,
        }
    }
}

/// Portfolio heat limits (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatConfig {
    pub max_portfolio_risk_pct: f64,
    pub max_cluster_risk_pct: f64,
    pub max_adjusted_heat_pct: f64,
    pub heat_soft_frac: f64,
    pub heat_min_reduction_bps: f64,
    pub heat_disc_floor_eps: f64,
    pub heat_blend_min_reliability: f64,
    pub hedge_opt_mult: f64,
    pub hedge_abs_cap_pct: f64,
    /// |b| below this switches the quadratic to the pure-sqrt branch.
    pub heat_b_eps: f64,
    /// Forced-hedge minimum |b| for admission above the hard limit.
    pub forced_b_min: f64,
    pub diag_eps: f64,
    pub psd_neg_eig_tol: f64,
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            max_portfolio_risk_pct: 0.04,
            max_cluster_risk_pct: 0.02,
            max_adjusted_heat_pct: 0.03,
            heat_soft_frac: 0.95,
            heat_min_reduction_bps: 10.0,
            heat_disc_floor_eps: 1e-12,
            heat_blend_min_reliability: 0.40,
            hedge_opt_mult: 1.0,
            hedge_abs_cap_pct: 0.01,
            heat_b_eps: 1e-10,
            forced_b_min: 1e-6,
            diag_eps: 1e-4,
            psd_neg_eig_tol: 1e-8,
        }
    }
}

/// Sizing solver parameters (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub max_sizing_iters: u32,
    pub fixed_point_alpha: f64,
    pub fixed_point_alpha_min: f64,
    pub newton_deriv_floor: f64,
    pub convergence_rel_tol: f64,
    pub liquidity_min_convergence_threshold: f64,
    pub low_liquidity_cap_mult: f64,
    pub high_impact_cap_mult: f64,
    pub not_converged_risk_cap_mult: f64,
    pub lot_step_qty: f64,
    pub lot_rounding_eps: f64,
    pub lot_rounding_risk_deviation_threshold: f64,
    /// Accept a reduced-risk fill after rounding instead of rejecting.
    pub accept_reduced_risk: bool,
    pub max_acceptable_impact_bps: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            max_sizing_iters: 24,
            fixed_point_alpha: 0.50,
            fixed_point_alpha_min: 0.05,
            newton_deriv_floor: 1e-9,
            convergence_rel_tol: 1e-6,
            liquidity_min_convergence_threshold: 0.25,
            low_liquidity_cap_mult: 0.50,
            high_impact_cap_mult: 0.50,
            not_converged_risk_cap_mult: 0.50,
            lot_step_qty: 0.001,
            lot_rounding_eps: 1e-9,
            lot_rounding_risk_deviation_threshold: 0.10,
            accept_reduced_risk: true,
            max_acceptable_impact_bps: 25.0,
        }
    }
}

/// Reservation ledger and writer parameters (C11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationConfig {
    pub ttl_sec_min_maker: f64,
    pub ttl_sec_min_taker: f64,
    pub ttl_sec_min_stop: f64,
    pub passive_fade_hard_timeout_sec: f64,
    pub renewal_min_period_sec: f64,
    pub heartbeat_period_ms: i64,
    pub heartbeat_grace_ms: i64,
    /// Repeated heartbeat losses within the window force DEFENSIVE.
    pub heartbeat_loss_defensive_threshold: u32,
    pub commit_retry_count: u32,
    pub max_occ_retries: u32,
    pub writer_queue_hard_cap: usize,
    pub preexec_validation_deadline_ms: i64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            ttl_sec_min_maker: 120.0,
            ttl_sec_min_taker: 30.0,
            ttl_sec_min_stop: 300.0,
            passive_fade_hard_timeout_sec: 90.0,
            renewal_min_period_sec: 5.0,
            heartbeat_period_ms: 1_000,
            heartbeat_grace_ms: 5_000,
            heartbeat_loss_defensive_threshold: 3,
            commit_retry_count: 3,
            max_occ_retries: 3,
            writer_queue_hard_cap: 1_024,
            preexec_validation_deadline_ms: 500,
        }
    }
}

/// Correlation pipeline parameters (C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrConfig {
    pub shrinkage_alpha: f64,
    pub higham_max_iters: u32,
    pub higham_tol: f64,
    pub psd_eig_floor: f64,
    pub psd_diag_floor: f64,
    pub diag_eps: f64,
    pub psd_neg_eig_tol: f64,
    pub min_eigenvalue_floor: f64,
    pub clip_normalize_passes: u32,
    pub stress_mode: StressMode,
    pub stress_corr_delta: f64,
    pub gamma_ema_alpha: f64,
    pub matrix_max_age_sec: f64,
    pub stale_mult: f64,
}

impl Default for CorrConfig {
    fn default() -> Self {
        Self {
            shrinkage_alpha: 0.10,
            higham_max_iters: 32,
            higham_tol: 1e-10,
            psd_eig_floor: 1e-6,
            psd_diag_floor: 1e-6,
            diag_eps: 1e-4,
            psd_neg_eig_tol: 1e-8,
            min_eigenvalue_floor: 1e-5,
            clip_normalize_passes: 3,
            stress_mode: StressMode::Asymmetric,
            stress_corr_delta: 0.50,
            gamma_ema_alpha: 0.10,
            matrix_max_age_sec: 900.0,
            stale_mult: 0.50,
        }
    }
}

/// Gate 18 partial-fill economics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialFillConfig {
    pub fill_abandonment_rr_frac: f64,
    pub min_abandon_r: f64,
    pub abandon_threshold_min_bps: f64,
    pub passive_fade_timeout_base_sec: f64,
    pub passive_fade_timeout_min_sec: f64,
    pub passive_fade_timeout_max_sec: f64,
}

impl Default for PartialFillConfig {
    fn default() -> Self {
        Self {
            fill_abandonment_rr_frac: 0.25,
            min_abandon_r: 0.05,
            abandon_threshold_min_bps: 2.0,
            passive_fade_timeout_base_sec: 60.0,
            passive_fade_timeout_min_sec: 10.0,
            passive_fade_timeout_max_sec: 180.0,
        }
    }
}

/// Top-level frozen engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bumped on every hot reload; decisions log the version they ran under.
    pub config_version: u32,
    pub snapshot_max_age_ms: i64,
    pub costs: CostModelBps,
    pub dqs: DqsConfig,
    pub drp: DrpConfig,
    pub regime: RegimeConfig,
    pub signal: SignalSanityConfig,
    pub mle: MleConfig,
    pub liquidity: LiquidityConfig,
    pub gap: GapGlitchConfig,
    pub funding: FundingConfig,
    pub basis_exposure: BasisExposureConfig,
    pub bankruptcy: BankruptcyConfig,
    pub rem: RemConfig,
    pub heat: HeatConfig,
    pub sizing: SizingConfig,
    pub reservation: ReservationConfig,
    pub corr: CorrConfig,
    pub partial_fill: PartialFillConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_version: 1,
            snapshot_max_age_ms: 5_000,
            costs: CostModelBps::default(),
            dqs: DqsConfig::default(),
            drp: DrpConfig::default(),
            regime: RegimeConfig::default(),
            signal: SignalSanityConfig::default(),
            mle: MleConfig::default(),
            liquidity: LiquidityConfig::default(),
            gap: GapGlitchConfig::default(),
            funding: FundingConfig::default(),
            basis_exposure: BasisExposureConfig::default(),
            bankruptcy: BankruptcyConfig::default(),
            rem: RemConfig::default(),
            heat: HeatConfig::default(),
            sizing: SizingConfig::default(),
            reservation: ReservationConfig::default(),
            corr: CorrConfig::default(),
            partial_fill: PartialFillConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_published_tables() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.dqs.degraded_threshold, 0.70);
        assert_eq!(cfg.dqs.emergency_threshold, 0.40);
        assert_eq!(cfg.dqs.weight_critical, 0.75);
        assert_eq!(cfg.dqs.xdev_block_bps, 25.0);
        assert_eq!(cfg.dqs.oracle_dev_block_frac, 0.01);
        assert_eq!(cfg.corr.stress_corr_delta, 0.50);
        assert_eq!(cfg.corr.psd_eig_floor, 1e-6);
        assert_eq!(cfg.corr.psd_diag_floor, 1e-6);
        assert_eq!(cfg.corr.diag_eps, 1e-4);
        assert_eq!(cfg.rem.kelly_fraction, 0.50);
        assert_eq!(cfg.rem.kelly_cap_max, 0.004);
        assert_eq!(cfg.rem.max_trade_risk_hard_cap_pct, 0.005);
        assert_eq!(cfg.heat.max_portfolio_risk_pct, 0.04);
        assert_eq!(cfg.heat.max_adjusted_heat_pct, 0.03);
        assert_eq!(cfg.heat.heat_soft_frac, 0.95);
        assert_eq!(cfg.funding.blackout_minutes, 15);
        assert_eq!(cfg.funding.blackout_cost_share_threshold, 0.40);
        assert!(!cfg.funding.funding_credit_allowed);
        assert_eq!(cfg.bankruptcy.rr_min_probe_add, 0.10);
        assert_eq!(cfg.regime.probe_risk_mult, 0.33);
        assert_eq!(cfg.sizing.not_converged_risk_cap_mult, 0.50);
        assert_eq!(cfg.sizing.max_acceptable_impact_bps, 25.0);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.config_version, cfg.config_version);
        assert_eq!(back.rem.dd_ladder, cfg.rem.dd_ladder);
    }

    #[test]
    fn test_heat_buffer_exceeds_trade_cap() {
        // invariant (d): heat budget must leave room for at least one max trade
        let cfg = EngineConfig::default();
        let heat_buffer = cfg.heat.max_adjusted_heat_pct * (1.0 - cfg.heat.heat_soft_frac)
            + cfg.heat.max_portfolio_risk_pct
            - cfg.heat.max_adjusted_heat_pct;
        assert!(heat_buffer >= cfg.rem.max_trade_risk_hard_cap_pct);
    }
}
