//! Gate 12: bankruptcy bounds - single-position gap, liquidation buffer and
//! the portfolio stress-gap scenario.
//!
//! A weekend gap can jump straight through the stop. The gap fraction scales
//! with realized volatility; the gapped stop re-runs through the effective
//! price model, and the resulting loss multiple must stay inside the equity
//! budget both for this position alone and for the stressed portfolio.

use nalgebra::{DMatrix, DVector};

use crate::config::EngineConfig;
use crate::gatekeeper::decision::{DecisionDiagnostics, RejectReason};
use crate::gatekeeper::GateInputs;
use crate::num::clamp;
use crate::units::{Direction, EffectivePrices};

pub(crate) fn evaluate(
    inp: &GateInputs<'_>,
    st: &mut DecisionDiagnostics,
    cfg: &EngineConfig,
) -> Result<(), RejectReason> {
    let bk_cfg = &cfg.bankruptcy;
    let signal = inp.signal;
    let effective = st.effective_prices.expect("gate 5 ran");

    // volatility-scaled gap fraction
    let hv30_z = inp
        .market
        .volatility
        .hv30
        .map(|hv| hv / bk_cfg.hv30_ref.max(1e-9))
        .unwrap_or(1.0);
    let gap_frac = clamp(
        bk_cfg.gap_frac_base * (1.0 + bk_cfg.gap_hv_sensitivity * clamp(hv30_z - 1.0, 0.0, bk_cfg.gap_hv_z_cap)),
        bk_cfg.gap_frac_min,
        bk_cfg.gap_frac_max,
    );

    // gapped stop re-priced through the full cost model
    let sl_gap_price = match signal.direction {
        Direction::Long => signal.levels.stop_loss * (1.0 - gap_frac),
        Direction::Short => signal.levels.stop_loss * (1.0 + gap_frac),
    };
    let gapped = EffectivePrices::compute(
        signal.direction,
        signal.levels.entry_price,
        signal.levels.take_profit,
        sl_gap_price,
        &cfg.costs,
    )
    .map_err(|_| RejectReason::BankruptcyGapBlockSingle)?;

    let gap_mult = (gapped.entry_eff_allin - gapped.sl_eff_allin).abs()
        / effective.unit_risk_allin_net.max(bk_cfg.gap_unit_risk_eps);
    st.gap_mult = gap_mult;

    // single-position bound: the worst admissible risk times the gap
    // multiple must stay inside the per-trade gap-loss budget
    let risk_pct_upper_bound = cfg.rem.max_trade_risk_hard_cap_pct;
    if risk_pct_upper_bound * gap_mult > bk_cfg.max_gap_loss_pct_equity {
        return Err(RejectReason::BankruptcyGapBlockSingle);
    }

    // liquidation buffer: the stop must trigger well before the estimated
    // liquidation price at maximum leverage
    let entry = signal.levels.entry_price;
    let liq_price = match signal.direction {
        Direction::Long => entry * (1.0 - 1.0 / bk_cfg.leverage_max + bk_cfg.maintenance_margin_frac),
        Direction::Short => entry * (1.0 + 1.0 / bk_cfg.leverage_max - bk_cfg.maintenance_margin_frac),
    };
    let sl_to_liq = (signal.levels.stop_loss - liq_price).abs();
    let entry_to_liq = (entry - liq_price).abs().max(1e-12);
    let stop_beyond_liq = match signal.direction {
        Direction::Long => signal.levels.stop_loss <= liq_price,
        Direction::Short => signal.levels.stop_loss >= liq_price,
    };
    if stop_beyond_liq || sl_to_liq / entry_to_liq < bk_cfg.liq_buffer_frac {
        return Err(RejectReason::LiquidationBufferBlock);
    }

    // portfolio stress-gap: current cluster + top-K by risk + the candidate
    let mut members: Vec<(String, f64)> = Vec::new();
    let mut by_risk: Vec<&crate::domain::Position> = inp.portfolio.positions.iter().collect();
    by_risk.sort_by(|a, b| {
        b.risk_pct_equity
            .partial_cmp(&a.risk_pct_equity)
            .expect("risk fractions are finite")
    });
    for pos in by_risk.iter().take(bk_cfg.stress_gap_top_k) {
        members.push((
            pos.instrument.clone(),
            pos.direction.sign() * pos.risk_pct_equity * gap_mult,
        ));
    }
    members.push((
        signal.instrument.clone(),
        signal.direction.sign() * risk_pct_upper_bound * gap_mult,
    ));

    let n = members.len();
    let gap_vec = DVector::from_iterator(n, members.iter().map(|(_, g)| *g));
    let stress = stress_matrix_for(&members, inp, cfg);
    let q = (gap_vec.transpose() * &stress * &gap_vec)[(0, 0)];
    let portfolio_gap_loss = q.max(0.0).sqrt();
    st.portfolio_gap_loss_pct = portfolio_gap_loss;

    if portfolio_gap_loss > bk_cfg.portfolio_max_gap_loss_pct_equity {
        return Err(RejectReason::BankruptcyPortfolioStressBlock);
    }

    Ok(())
}

/// Stress correlation matrix over the stress-gap member set.
///
/// Pairs absent from the published snapshot default to +1 (the conservative
/// gap assumption); when tail dependence saturates, every off-diagonal snaps
/// to +1 outright.
fn stress_matrix_for(
    members: &[(String, f64)],
    inp: &GateInputs<'_>,
    cfg: &EngineConfig,
) -> DMatrix<f64> {
    let n = members.len();
    let lambda_unity =
        inp.market.correlations.lambda_used >= cfg.bankruptcy.stress_gap_lambda_unity_threshold;

    let mut m = DMatrix::from_element(n, n, 1.0);
    if lambda_unity {
        return m;
    }

    if let Some(snapshot) = inp.corr {
        let stress = snapshot.stress();
        let index_of = |name: &str| snapshot.instruments.iter().position(|i| i == name);
        for a in 0..n {
            for b in 0..n {
                if a == b {
                    continue;
                }
                if let (Some(ia), Some(ib)) = (index_of(&members[a].0), index_of(&members[b].0)) {
                    m[(a, b)] = stress[(ia, ib)];
                }
                // missing pair stays at +1
            }
        }
    }
    m
}
