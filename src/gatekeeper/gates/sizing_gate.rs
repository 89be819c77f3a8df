//! Gates 13.5/14/15: feasibility caps, the sizing solve and the post-sizing
//! impact check.
//!
//! This is the first point in the chain allowed to touch `qty`; everything
//! upstream was size-invariant by construction.

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::sizing::{self, ImpactCurve, SizingInputs, SizingOutcome};

pub(crate) fn evaluate_gate14(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let effective = st.effective_prices.expect("gate 5 ran");

    // calibrate the power-law impact curve so the reference estimate from
    // gate 7 is reproduced at the reference quantity
    let liq = &inp.market.liquidity;
    let avg_depth = 0.5 * (liq.bid_depth_usd + liq.ask_depth_usd);
    let impact = if avg_depth > 0.0 {
        let k_price = inp.signal.levels.entry_price / avg_depth;
        ImpactCurve {
            a: cfg.liquidity.impact_k * k_price.powf(cfg.liquidity.impact_pow) * 10_000.0,
            b: cfg.liquidity.impact_pow,
        }
    } else {
        ImpactCurve { a: f64::INFINITY, b: 1.0 }
    };

    let result = sizing::solve(
        &SizingInputs {
            risk_pre_liquidity_pct: st.rem.risk_pre_liquidity_pct,
            liquidity_mult: st.liquidity_mult,
            equity_usd: inp.portfolio.equity_usd,
            base_unit_risk: effective.unit_risk_allin_net,
            entry_price_ref: inp.signal.levels.entry_price,
            impact,
        },
        &cfg.sizing,
    );

    st.sizing_not_converged_event = result.sizing_not_converged_event;
    let outcome = result.outcome;
    st.sizing = Some(result);

    match outcome {
        SizingOutcome::Infeasible => Err(RejectReason::SizingInfeasibleBlock),
        _ => Ok(()),
    }
}

/// Gate 15: the solved size must not sweep the book.
pub(crate) fn evaluate_gate15(
    _inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let sizing = st.sizing.as_ref().expect("gate 14 ran");
    if sizing.impact_bps > cfg.sizing.max_acceptable_impact_bps {
        return Err(RejectReason::ImpactHardBlock);
    }
    Ok(())
}
