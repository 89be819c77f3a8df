//! Gate 7: liquidity hard limits and soft degradation multipliers.
//!
//! Hard rejects on thin depth, wide spreads, dead volume and suspected
//! spoofing. The soft bands produce `liquidity_mult = min(spread_mult,
//! impact_mult)` which the sizing solver consumes exactly once.

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::clamp;
use crate::units::risk_pct_to_usd;

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let liq_cfg = &cfg.liquidity;
    let liq = &inp.market.liquidity;

    if liq.bid_depth_usd < liq_cfg.bid_depth_min_usd || liq.ask_depth_usd < liq_cfg.ask_depth_min_usd {
        return Err(RejectReason::LiquidityHardBlock);
    }
    if liq.spread_bps > liq_cfg.spread_max_hard_bps {
        return Err(RejectReason::LiquidityHardBlock);
    }
    if liq.volume_24h_usd < liq_cfg.volume_24h_min_usd {
        return Err(RejectReason::LiquidityHardBlock);
    }
    if liq_cfg.spoofing_block_enabled && liq.depth_volatility_cv > liq_cfg.depth_volatility_cv_threshold
    {
        return Err(RejectReason::SpoofingSuspectedBlock);
    }

    // spread degradation between the soft and hard bands
    let spread_mult = clamp(
        (liq_cfg.spread_max_hard_bps - liq.spread_bps)
            / (liq_cfg.spread_max_hard_bps - liq_cfg.spread_max_soft_bps),
        0.0,
        1.0,
    );

    // size-invariant impact estimate: the reference notional is the maximum
    // trade the risk caps would ever allow, not the actual quantity
    let effective = st.effective_prices.expect("gate 5 ran");
    let reference_risk_usd = risk_pct_to_usd(
        cfg.rem.max_trade_risk_hard_cap_pct,
        inp.portfolio.equity_usd,
    );
    let reference_notional = if effective.unit_risk_allin_net > 0.0 {
        reference_risk_usd / effective.unit_risk_allin_net * inp.signal.levels.entry_price
    } else {
        0.0
    };
    let avg_depth = 0.5 * (liq.bid_depth_usd + liq.ask_depth_usd);
    let impact_bps_est = if liq.impact_bps_est > 0.0 {
        // the book publishes a live L2-derived estimate; prefer it
        liq.impact_bps_est
    } else if avg_depth > 0.0 {
        liq_cfg.impact_k * (reference_notional / avg_depth).powf(liq_cfg.impact_pow) * 10_000.0
    } else {
        f64::INFINITY
    };

    if impact_bps_est > liq_cfg.impact_max_hard_bps {
        return Err(RejectReason::LiquidityHardBlock);
    }
    let impact_mult = clamp(
        (liq_cfg.impact_max_hard_bps - impact_bps_est)
            / (liq_cfg.impact_max_hard_bps - liq_cfg.impact_max_soft_bps),
        0.0,
        1.0,
    );

    st.liquidity_mult = spread_mult.min(impact_mult);
    st.impact_bps_est = impact_bps_est;
    st.obi = liq.obi();

    Ok(())
}
