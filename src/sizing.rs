//! Final position sizing.
//!
//! Chooses `qty` so that realized risk matches the target
//! `risk_target_for_sizing = risk_pre_liquidity * liquidity_mult`, with
//! size-dependent impact feeding back into the all-in unit risk. The
//! liquidity multiplier is applied exactly once, here; the REM chain hands
//! over the pre-liquidity risk untouched.
//!
//! Strategies, in order of preference:
//! 1. analytic solve when the impact curve is a clean power law,
//! 2. Newton-Raphson with a derivative floor,
//! 3. damped fixed point with adaptive halving on oscillation.
//!
//! Non-convergence adopts the smallest valid iterate, halves the risk via
//! `not_converged_risk_cap_mult` and flags the decision.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SizingConfig;
use crate::num::{floor_to_step, EPS_QTY};
use crate::units::{bps_to_fraction, risk_pct_to_usd};

/// Power-law impact curve: `impact_bps(qty) = a * qty^b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactCurve {
    pub a: f64,
    pub b: f64,
}

impl ImpactCurve {
    pub fn impact_bps(&self, qty: f64) -> f64 {
        if qty <= 0.0 {
            0.0
        } else {
            self.a * qty.powf(self.b)
        }
    }
}

/// How the solver terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingOutcome {
    Analytic,
    Newton,
    FixedPoint,
    /// Budget exhausted; smallest valid iterate adopted with the risk cap.
    NotConverged,
    /// No feasible quantity at or above one lot step.
    Infeasible,
}

/// Sizing result handed to gates 15-17.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    pub qty: f64,
    pub qty_rounded: f64,
    /// Unit risk at the solved quantity, impact included.
    pub unit_risk_allin_net: f64,
    pub impact_bps: f64,
    pub risk_amount_usd: f64,
    pub risk_pct_actual: f64,
    pub risk_pct_target: f64,
    pub iterations: u32,
    pub outcome: SizingOutcome,
    /// Feasibility caps applied before solving (gate 13.5).
    pub feasibility_mult: f64,
    pub sizing_not_converged_event: bool,
}

/// Inputs the solver needs from the earlier gates.
#[derive(Debug, Clone, Copy)]
pub struct SizingInputs {
    /// Risk target before the liquidity multiplier (fraction of equity).
    pub risk_pre_liquidity_pct: f64,
    pub liquidity_mult: f64,
    pub equity_usd: f64,
    /// Unit risk at zero impact (from gate 5 effective prices).
    pub base_unit_risk: f64,
    pub entry_price_ref: f64,
    pub impact: ImpactCurve,
}

/// Unit risk once size-dependent impact widens the entry leg.
///
/// Impact is paid on entry and amplified on the stop exit, so both legs of
/// the all-in spread widen with quantity.
fn unit_risk_at(inputs: &SizingInputs, qty: f64) -> f64 {
    let impact_frac = bps_to_fraction(inputs.impact.impact_bps(qty));
    inputs.base_unit_risk + 2.0 * inputs.entry_price_ref * impact_frac
}

fn risk_usd_at(inputs: &SizingInputs, qty: f64) -> f64 {
    qty * unit_risk_at(inputs, qty)
}

/// Solve the final quantity.
pub fn solve(inputs: &SizingInputs, cfg: &SizingConfig) -> SizingResult {
    // gate 13.5 feasibility caps, applied to the target before solving
    let mut feasibility_mult = 1.0;
    if inputs.liquidity_mult < cfg.liquidity_min_convergence_threshold {
        feasibility_mult *= cfg.low_liquidity_cap_mult;
    }

    let risk_target_pct = inputs.risk_pre_liquidity_pct * inputs.liquidity_mult * feasibility_mult;
    let target_usd = risk_pct_to_usd(risk_target_pct, inputs.equity_usd);

    if target_usd <= 0.0 || inputs.base_unit_risk <= 0.0 {
        return finish(inputs, cfg, 0.0, 0, SizingOutcome::Infeasible, feasibility_mult, risk_target_pct);
    }

    // initial guess ignores impact entirely
    let q0 = target_usd / inputs.base_unit_risk;

    // 1. analytic attempt: for b == 1 the fixed point is exact in one step
    //    qty * (base + 2*p*a'*qty) = target  (a' = a/1e4) is a quadratic.
    if (inputs.impact.b - 1.0).abs() < 1e-9 {
        let a_frac = inputs.impact.a / 10_000.0;
        let k = 2.0 * inputs.entry_price_ref * a_frac;
        let qty = if k.abs() < 1e-18 {
            q0
        } else {
            let disc = inputs.base_unit_risk * inputs.base_unit_risk + 4.0 * k * target_usd;
            (-inputs.base_unit_risk + disc.max(0.0).sqrt()) / (2.0 * k)
        };
        if qty.is_finite() && qty > 0.0 {
            return finish(inputs, cfg, qty, 1, SizingOutcome::Analytic, feasibility_mult, risk_target_pct);
        }
    }

    // 2. Newton-Raphson on F(q) = q * unit_risk(q) - target
    let mut qty = q0;
    let mut newton_ok = false;
    let mut iterations = 0;
    for _ in 0..cfg.max_sizing_iters {
        iterations += 1;
        let f = risk_usd_at(inputs, qty) - target_usd;
        if (f / target_usd).abs() < cfg.convergence_rel_tol {
            newton_ok = true;
            break;
        }
        // F'(q) = unit_risk(q) + q * d(unit_risk)/dq
        let d_impact = if qty > 0.0 {
            inputs.impact.a * inputs.impact.b * qty.powf(inputs.impact.b - 1.0) / 10_000.0
        } else {
            0.0
        };
        let deriv = unit_risk_at(inputs, qty) + qty * 2.0 * inputs.entry_price_ref * d_impact;
        let next = qty - f / deriv.max(cfg.newton_deriv_floor);
        if !next.is_finite() || next <= 0.0 {
            break;
        }
        qty = next;
    }
    if newton_ok {
        return finish(inputs, cfg, qty, iterations, SizingOutcome::Newton, feasibility_mult, risk_target_pct);
    }

    // 3. damped fixed point: qty_hat = target / unit_risk(qty)
    let mut alpha = cfg.fixed_point_alpha;
    let mut qty = q0;
    let mut prev_delta = 0.0f64;
    let mut best_valid: Option<f64> = None;
    let mut converged = false;
    let mut fp_iterations = 0;
    for _ in 0..cfg.max_sizing_iters {
        fp_iterations += 1;
        let unit = unit_risk_at(inputs, qty);
        if unit > 0.0 && qty.is_finite() && qty > 0.0 {
            let achieved = risk_usd_at(inputs, qty);
            if achieved.is_finite() && achieved > 0.0 {
                // track the smallest iterate with a finite valid risk estimate
                best_valid = Some(best_valid.map_or(qty, |b: f64| b.min(qty)));
            }
        }
        let qty_hat = target_usd / unit.max(EPS_QTY);
        let delta = qty_hat - qty;
        if (delta / qty.max(EPS_QTY)).abs() < cfg.convergence_rel_tol {
            converged = true;
            qty = qty_hat;
            break;
        }
        // oscillation: the step flipped sign, halve the damping
        if prev_delta != 0.0 && delta.signum() != prev_delta.signum() {
            alpha = (alpha * 0.5).max(cfg.fixed_point_alpha_min);
        }
        prev_delta = delta;
        qty = (1.0 - alpha) * qty + alpha * qty_hat;
    }

    let total_iterations = iterations + fp_iterations;
    if converged {
        return finish(inputs, cfg, qty, total_iterations, SizingOutcome::FixedPoint, feasibility_mult, risk_target_pct);
    }

    // non-convergence policy: smallest valid iterate, capped risk
    let fallback = best_valid.unwrap_or(0.0) * cfg.not_converged_risk_cap_mult;
    warn!(
        target: "riskgate::sizing",
        iterations = total_iterations,
        fallback_qty = fallback,
        "sizing did not converge, adopting capped minimum iterate"
    );
    finish(inputs, cfg, fallback, total_iterations, SizingOutcome::NotConverged, feasibility_mult, risk_target_pct)
}

fn finish(
    inputs: &SizingInputs,
    cfg: &SizingConfig,
    qty: f64,
    iterations: u32,
    mut outcome: SizingOutcome,
    mut feasibility_mult: f64,
    risk_target_pct: f64,
) -> SizingResult {
    let mut qty = qty.max(0.0);

    // post-solve impact feasibility: scale down rather than ship a sweep
    let mut impact_bps = inputs.impact.impact_bps(qty);
    if impact_bps > cfg.max_acceptable_impact_bps && qty > 0.0 {
        qty *= cfg.high_impact_cap_mult;
        feasibility_mult *= cfg.high_impact_cap_mult;
        impact_bps = inputs.impact.impact_bps(qty);
    }

    let qty_rounded = floor_to_step(qty, cfg.lot_step_qty, cfg.lot_rounding_eps);
    if qty_rounded < cfg.lot_step_qty {
        outcome = SizingOutcome::Infeasible;
    }

    let unit_risk = unit_risk_at(inputs, qty_rounded);
    let risk_amount_usd = qty_rounded * unit_risk;
    let risk_pct_actual = if inputs.equity_usd > 0.0 {
        risk_amount_usd / inputs.equity_usd
    } else {
        0.0
    };

    let not_converged = outcome == SizingOutcome::NotConverged;
    debug!(
        target: "riskgate::sizing",
        qty,
        qty_rounded,
        ?outcome,
        iterations,
        risk_pct_actual,
        risk_target_pct,
        "sizing finished"
    );

    SizingResult {
        qty,
        qty_rounded,
        unit_risk_allin_net: unit_risk,
        impact_bps: inputs.impact.impact_bps(qty_rounded),
        risk_amount_usd,
        risk_pct_actual,
        risk_pct_target: risk_target_pct,
        iterations,
        outcome,
        feasibility_mult,
        sizing_not_converged_event: not_converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> SizingInputs {
        SizingInputs {
            risk_pre_liquidity_pct: 0.004,
            liquidity_mult: 1.0,
            equity_usd: 10_000.0,
            base_unit_risk: 2.03,
            entry_price_ref: 100.0,
            impact: ImpactCurve { a: 0.0, b: 1.0 },
        }
    }

    #[test]
    fn test_zero_impact_is_exact() {
        let out = solve(&inputs(), &SizingConfig::default());
        // 0.4% of 10k = 40 USD at 2.03 per unit ~ 19.70 units
        assert!(matches!(out.outcome, SizingOutcome::Analytic | SizingOutcome::Newton));
        assert!((out.qty - 40.0 / 2.03).abs() < 1e-6);
        assert!(out.qty_rounded <= out.qty);
        assert!(!out.sizing_not_converged_event);
    }

    #[test]
    fn test_linear_impact_analytic() {
        let mut inp = inputs();
        inp.impact = ImpactCurve { a: 0.5, b: 1.0 };
        let out = solve(&inp, &SizingConfig::default());
        assert_eq!(out.outcome, SizingOutcome::Analytic);
        // achieved risk must hit the target within tolerance
        let achieved = out.qty * (inp.base_unit_risk + 2.0 * 100.0 * (0.5 * out.qty / 10_000.0) / 1.0);
        assert!((achieved - 40.0).abs() / 40.0 < 1e-6);
    }

    #[test]
    fn test_powerlaw_impact_newton() {
        let mut inp = inputs();
        inp.impact = ImpactCurve { a: 3e-2, b: 1.5 };
        let out = solve(&inp, &SizingConfig::default());
        assert!(matches!(out.outcome, SizingOutcome::Newton | SizingOutcome::FixedPoint));
        let achieved = risk_usd_at(&inp, out.qty);
        assert!((achieved - 40.0).abs() / 40.0 < 1e-4, "achieved {achieved}");
    }

    #[test]
    fn test_liquidity_mult_applied_once() {
        let mut inp = inputs();
        inp.liquidity_mult = 0.5;
        let out = solve(&inp, &SizingConfig::default());
        assert!((out.risk_pct_target - 0.002).abs() < 1e-12);
        assert!((out.qty - 20.0 / 2.03).abs() < 1e-6);
    }

    #[test]
    fn test_low_liquidity_feasibility_cap() {
        let mut inp = inputs();
        inp.liquidity_mult = 0.10; // below the 0.25 convergence threshold
        let out = solve(&inp, &SizingConfig::default());
        assert!((out.feasibility_mult - 0.5).abs() < 1e-12);
        assert!((out.risk_pct_target - 0.004 * 0.10 * 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_infeasible_below_lot_step() {
        let mut inp = inputs();
        inp.risk_pre_liquidity_pct = 1e-9;
        let out = solve(&inp, &SizingConfig::default());
        assert_eq!(out.outcome, SizingOutcome::Infeasible);
        assert_eq!(out.qty_rounded, 0.0);
    }

    #[test]
    fn test_lot_rounding_floors() {
        let cfg = SizingConfig {
            lot_step_qty: 1.0,
            ..SizingConfig::default()
        };
        let out = solve(&inputs(), &cfg);
        assert_eq!(out.qty_rounded, out.qty.floor());
        assert!(out.risk_pct_actual <= out.risk_pct_target + 1e-12);
    }

    #[test]
    fn test_non_convergence_applies_cap() {
        // one iteration cannot solve a steep impact curve
        let cfg = SizingConfig {
            max_sizing_iters: 1,
            convergence_rel_tol: 1e-15,
            ..SizingConfig::default()
        };
        let mut inp = inputs();
        inp.impact = ImpactCurve { a: 3e-6, b: 1.5 };
        let out = solve(&inp, &cfg);
        assert_eq!(out.outcome, SizingOutcome::NotConverged);
        assert!(out.sizing_not_converged_event);
        // capped at half the minimum valid iterate
        assert!(out.qty <= 0.5 * (40.0 / 2.03) + 1e-6);
    }

    #[test]
    fn test_risk_identity_holds_after_rounding() {
        let mut inp = inputs();
        inp.impact = ImpactCurve { a: 0.2, b: 1.0 };
        let out = solve(&inp, &SizingConfig::default());
        let unit = unit_risk_at(&inp, out.qty_rounded);
        assert!((out.risk_amount_usd - out.qty_rounded * unit).abs() < 1e-9);
    }
}
