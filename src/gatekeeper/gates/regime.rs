//! Gates 2 and 3: MRC/baseline conflict resolution and engine compatibility.
//!
//! The decision table is deterministic; every cell either names a final
//! regime (possibly with a reduced-risk multiplier) or lands on NO_TRADE.
//! An opposed-trend conflict may still trade through the probe path when
//! the microstructure conditions all hold.

use crate::config::EngineConfig;
use crate::domain::{BaselineClass, EngineKind, FinalRegime, MleDecision, MrcClass, RegimeConflict};
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;

pub(crate) fn evaluate_gate2(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let regime_cfg = &cfg.regime;
    let mrc = inp.mrc;
    let baseline = inp.baseline;

    // sustained conflict: diagnostic lock regardless of today's resolution
    let sustained_threshold =
        (regime_cfg.conflict_window_bars as f64 * regime_cfg.conflict_ratio_threshold).ceil() as u32;
    if inp.conflict_count_in_window >= sustained_threshold {
        return Err(RejectReason::MrcConflictBlock);
    }

    let dqs = st.dqs.as_ref().map(|d| d.dqs).unwrap_or(0.0);
    let mle_normal_or_strong = inp
        .mle
        .map(|m| matches!(m.decision, MleDecision::Normal | MleDecision::Strong))
        .unwrap_or(false);
    let probe_microstructure_ok = inp.market.liquidity.bid_depth_usd >= regime_cfg.probe_min_depth_usd
        && inp.market.liquidity.ask_depth_usd >= regime_cfg.probe_min_depth_usd
        && inp.market.liquidity.spread_bps <= regime_cfg.probe_max_spread_bps
        && mle_normal_or_strong;

    let mut conflict: Option<RegimeConflict> = None;
    let mut risk_mult = 1.0;
    let mut is_probe = false;

    let final_regime = match (mrc.class, baseline) {
        // MRC NOISE: no trade, except a RANGE baseline keeps the range book
        (MrcClass::Noise, BaselineClass::Range) => {
            conflict = Some(make_conflict("noise_range_exception", mrc.class, baseline, mrc.confidence, false, false));
            risk_mult = regime_cfg.noise_override_risk_mult;
            FinalRegime::Range
        }
        (MrcClass::Noise, _) => {
            conflict = Some(make_conflict("mrc_noise", mrc.class, baseline, mrc.confidence, false, false));
            FinalRegime::NoTrade
        }

        // baseline NOISE: only a very confident directional MRC overrides
        (m, BaselineClass::Noise) => {
            if mrc.confidence >= regime_cfg.mrc_very_high_conf_threshold && m.direction_sign() != 0 {
                conflict = Some(make_conflict("baseline_noise_override", m, baseline, mrc.confidence, false, false));
                risk_mult = regime_cfg.noise_override_risk_mult;
                match m {
                    MrcClass::TrendUp => FinalRegime::TrendUp,
                    MrcClass::TrendDown => FinalRegime::TrendDown,
                    MrcClass::BreakoutUp => FinalRegime::BreakoutUp,
                    MrcClass::BreakoutDown => FinalRegime::BreakoutDown,
                    _ => unreachable!("direction_sign filtered non-directional"),
                }
            } else {
                conflict = Some(make_conflict("baseline_noise", m, baseline, mrc.confidence, false, false));
                FinalRegime::NoTrade
            }
        }

        // MRC RANGE vs trending baseline: the range call wins
        (MrcClass::Range, BaselineClass::TrendUp | BaselineClass::TrendDown) => {
            conflict = Some(make_conflict("range_vs_trend", mrc.class, baseline, mrc.confidence, false, false));
            FinalRegime::Range
        }

        // MRC trend vs RANGE baseline: downgrade to breakout at reduced risk
        (MrcClass::TrendUp, BaselineClass::Range) => {
            conflict = Some(make_conflict("trend_vs_range", mrc.class, baseline, mrc.confidence, false, false));
            risk_mult = regime_cfg.trend_vs_range_risk_mult;
            FinalRegime::BreakoutUp
        }
        (MrcClass::TrendDown, BaselineClass::Range) => {
            conflict = Some(make_conflict("trend_vs_range", mrc.class, baseline, mrc.confidence, false, false));
            risk_mult = regime_cfg.trend_vs_range_risk_mult;
            FinalRegime::BreakoutDown
        }

        // breakout vs RANGE baseline: breakout stands
        (MrcClass::BreakoutUp, BaselineClass::Range) => FinalRegime::BreakoutUp,
        (MrcClass::BreakoutDown, BaselineClass::Range) => FinalRegime::BreakoutDown,

        // breakout vs trend: signs must agree
        (m @ (MrcClass::BreakoutUp | MrcClass::BreakoutDown), b @ (BaselineClass::TrendUp | BaselineClass::TrendDown)) => {
            if m.direction_sign() == b.direction_sign() {
                match m {
                    MrcClass::BreakoutUp => FinalRegime::BreakoutUp,
                    _ => FinalRegime::BreakoutDown,
                }
            } else {
                conflict = Some(make_conflict("breakout_trend_conflict", m, b, mrc.confidence, false, false));
                FinalRegime::NoTrade
            }
        }

        // opposed trends: probe path or nothing
        (m @ (MrcClass::TrendUp | MrcClass::TrendDown), b @ (BaselineClass::TrendUp | BaselineClass::TrendDown))
            if m.direction_sign() != b.direction_sign() =>
        {
            let probe_ok = mrc.confidence >= regime_cfg.mrc_very_high_conf_threshold
                && dqs >= cfg.dqs.degraded_threshold
                && probe_microstructure_ok;
            conflict = Some(make_conflict("trend_vs_trend", m, b, mrc.confidence, true, probe_ok));
            if probe_ok {
                is_probe = true;
                risk_mult = regime_cfg.probe_risk_mult;
                FinalRegime::ProbeTrade
            } else {
                FinalRegime::NoTrade
            }
        }

        // agreement
        (MrcClass::TrendUp, BaselineClass::TrendUp) => FinalRegime::TrendUp,
        (MrcClass::TrendDown, BaselineClass::TrendDown) => FinalRegime::TrendDown,
        (MrcClass::Range, BaselineClass::Range) => FinalRegime::Range,

        // anything else is an unexpected combination; fail safe
        (m, b) => {
            conflict = Some(make_conflict("unexpected_combination", m, b, mrc.confidence, false, false));
            FinalRegime::NoTrade
        }
    };

    st.final_regime = Some(final_regime);
    st.regime_conflict = conflict;
    st.is_probe = is_probe;
    st.rem.risk_pre_liquidity_pct = 0.0; // set later by gate 13
    st.regime_risk_mult = risk_mult;

    if final_regime == FinalRegime::NoTrade {
        return Err(RejectReason::RegimeNoTradeBlock);
    }
    Ok(())
}

fn make_conflict(
    conflict_type: &'static str,
    mrc_class: MrcClass,
    baseline_class: BaselineClass,
    mrc_confidence: f64,
    is_probe_eligible: bool,
    probe_conditions_met: bool,
) -> RegimeConflict {
    RegimeConflict {
        conflict_type: conflict_type.to_string(),
        is_probe_eligible,
        probe_conditions_met,
        mrc_class,
        baseline_class,
        mrc_confidence,
    }
}

/// Gate 3: engine/regime compatibility.
pub(crate) fn evaluate_gate3(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let final_regime = st.final_regime.expect("gate 2 ran");
    let mle_strong = inp
        .mle
        .map(|m| m.decision == MleDecision::Strong)
        .unwrap_or(false);

    let compatible = match inp.signal.engine {
        EngineKind::Trend => matches!(
            final_regime,
            FinalRegime::TrendUp
                | FinalRegime::TrendDown
                | FinalRegime::BreakoutUp
                | FinalRegime::BreakoutDown
                | FinalRegime::ProbeTrade
        ),
        EngineKind::Range => {
            final_regime == FinalRegime::Range
                // NOISE is tradable for the range book only behind a STRONG
                // model call in quiet volatility
                || (final_regime == FinalRegime::Noise
                    && mle_strong
                    && inp.market.volatility.atr_z_short < cfg.regime.noise_range_atr_z_cap)
        }
    };

    if !compatible {
        return Err(RejectReason::RegimeIncompatibleBlock);
    }
    Ok(())
}
