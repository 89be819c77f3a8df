//! Portfolio heat algebra.
//!
//! Heat is the matrix-weighted risk norm `H(R) = sqrt(max(R^T C R, 0))` over
//! the signed per-position risk vector. Admission of a candidate with signed
//! risk `s*x` along basis vector `e_j` reduces to a scalar quadratic:
//!
//! ```text
//! H(x)^2 = x^2 + 2 b x + c,   c = R^T C R,  u = (C R)_j,  b = s u
//! x_max  = -b + sqrt(b^2 + H_max^2 - c)
//! ```
//!
//! Limits are worst-case across the base PSD matrix, the gamma-blend matrix
//! and the uniform-collapse scenario `H_uni = sum |R_i|`.

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HeatConfig;
use crate::errors::DomainViolation;

static HEAT_CALC_SEQ: AtomicU64 = AtomicU64::new(1);

/// Which matrix bound the admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatLimitSource {
    Psd,
    Blend,
    UniAbs,
}

/// Candidate-admission outcome from the heat core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatAdmission {
    pub heat_calculation_id: u64,
    /// Heat before the candidate, worst-case across matrices.
    pub heat_before: f64,
    /// Maximum admissible |signed risk| for the candidate.
    pub x_max: f64,
    pub limit_source: HeatLimitSource,
    /// Linear coefficient under the limiting matrix.
    pub b: f64,
    /// The candidate reduces heat (b < 0) under the limiting matrix.
    pub is_hedge: bool,
    /// Above the hard limit, only heat-reducing trades pass.
    pub above_hard: bool,
    /// Halving fallback engaged on a degenerate discriminant.
    pub used_halving_fallback: bool,
}

/// Compute `H(R) = sqrt(max(R^T C R, 0))`, flagging material negativity.
pub fn heat(risk: &DVector<f64>, corr: &DMatrix<f64>, cfg: &HeatConfig) -> Result<f64, DomainViolation> {
    debug_assert_eq!(risk.len(), corr.nrows());
    for i in 0..corr.nrows() {
        debug_assert!(
            (corr[(i, i)] - 1.0).abs() < cfg.diag_eps,
            "heat input matrix must have unit diagonal"
        );
    }
    let q = (risk.transpose() * corr * risk)[(0, 0)];
    if q < -cfg.psd_neg_eig_tol {
        return Err(DomainViolation::NegativeHeatSquare {
            value: q,
            tol: cfg.psd_neg_eig_tol,
        });
    }
    Ok(q.max(0.0).sqrt())
}

/// Collapse-scenario heat: every pair at correlation +1.
pub fn heat_uni_abs(risk: &DVector<f64>) -> f64 {
    risk.iter().map(|r| r.abs()).sum()
}

/// Worst-case heat across PSD, blend and collapse scenarios.
pub fn heat_worst(
    risk: &DVector<f64>,
    psd: &DMatrix<f64>,
    blend: &DMatrix<f64>,
    cfg: &HeatConfig,
) -> Result<f64, DomainViolation> {
    let h_psd = heat(risk, psd, cfg)?;
    let h_blend = heat(risk, blend, cfg)?;
    Ok(h_psd.max(h_blend).max(heat_uni_abs(risk)))
}

/// Solve the largest admissible candidate size under one matrix.
///
/// Returns `(x_max, b, used_halving)`. `lot_floor_risk` is the risk-space
/// equivalent of one lot step; the halving fallback rejects (x = 0) once the
/// trial drops below it.
fn solve_single(
    risk: &DVector<f64>,
    corr: &DMatrix<f64>,
    index: usize,
    direction_sign: f64,
    h_max: f64,
    lot_floor_risk: f64,
    cfg: &HeatConfig,
) -> Result<(f64, f64, bool), DomainViolation> {
    let c = {
        let q = (risk.transpose() * corr * risk)[(0, 0)];
        if q < -cfg.psd_neg_eig_tol {
            return Err(DomainViolation::NegativeHeatSquare {
                value: q,
                tol: cfg.psd_neg_eig_tol,
            });
        }
        q.max(0.0)
    };
    let u = (corr * risk)[index];
    let b = direction_sign * u;

    if b.abs() < cfg.heat_b_eps {
        // orthogonal candidate: pure sqrt branch
        return Ok(((h_max * h_max - c).max(0.0).sqrt(), b, false));
    }

    let disc = b * b + h_max * h_max - c;
    if disc > cfg.heat_disc_floor_eps {
        let x = (-b + disc.max(0.0).sqrt()).max(0.0);
        return Ok((x, b, false));
    }

    // Degenerate discriminant with room under the limit: halve a trial size
    // until it fits or falls below one lot.
    if c < h_max * h_max {
        let mut x_try = (h_max * h_max - c).max(0.0).sqrt();
        while x_try >= lot_floor_risk {
            let h_after_sq = x_try * x_try + 2.0 * b * x_try + c;
            if h_after_sq <= h_max * h_max {
                return Ok((x_try, b, true));
            }
            x_try *= 0.5;
        }
    }
    Ok((0.0, b, true))
}

/// Candidate admission against worst-case heat limits.
///
/// `index` addresses the candidate instrument inside the risk vector (its
/// current entry must be zero for a new position); `direction_sign` is +1
/// long / -1 short.
pub fn admit_candidate(
    risk: &DVector<f64>,
    psd: &DMatrix<f64>,
    blend: &DMatrix<f64>,
    index: usize,
    direction_sign: f64,
    remaining_cluster: f64,
    remaining_portfolio: f64,
    lot_floor_risk: f64,
    cfg: &HeatConfig,
) -> Result<HeatAdmission, DomainViolation> {
    let h_max = cfg.max_adjusted_heat_pct;
    let heat_before = heat_worst(risk, psd, blend, cfg)?;
    let above_hard = heat_before > h_max;

    let (x_psd, b_psd, halve_psd) =
        solve_single(risk, psd, index, direction_sign, h_max, lot_floor_risk, cfg)?;
    let (x_blend, b_blend, halve_blend) =
        solve_single(risk, blend, index, direction_sign, h_max, lot_floor_risk, cfg)?;
    // collapse scenario: adding |x| raises H_uni one-for-one unless hedged
    let x_uni = (h_max - heat_uni_abs(risk)).max(0.0);

    let (mut x_max, limit_source, b, used_halving) = [
        (x_psd, HeatLimitSource::Psd, b_psd, halve_psd),
        (x_blend, HeatLimitSource::Blend, b_blend, halve_blend),
        (x_uni, HeatLimitSource::UniAbs, b_psd, false),
    ]
    .into_iter()
    .min_by(|a, b| a.0.partial_cmp(&b.0).expect("sizes are finite"))
    .expect("three candidates");

    let is_hedge = b < 0.0;

    if above_hard {
        if !(is_hedge && b.abs() > cfg.forced_b_min) {
            // above the hard limit only strictly heat-reducing trades pass
            x_max = 0.0;
        } else {
            // forced hedge must actually bring heat down by the minimum step
            let required_drop = cfg.heat_min_reduction_bps / 10_000.0;
            let x_opt = cfg.hedge_opt_mult * (-b).max(0.0);
            let x_capped = x_opt
                .min(cfg.hedge_abs_cap_pct)
                .min(remaining_cluster.max(0.0))
                .min(remaining_portfolio.max(0.0));
            let c = heat_before * heat_before;
            let h_after_sq = x_capped * x_capped + 2.0 * b * x_capped + c;
            let h_after = h_after_sq.max(0.0).sqrt();
            if h_after > heat_before - required_drop {
                x_max = 0.0;
            } else {
                x_max = x_capped;
            }
        }
    } else if is_hedge {
        // no over-hedging past the optimum even in normal territory
        let x_hedge_cap = (cfg.hedge_opt_mult * (-b).max(0.0))
            .min(cfg.hedge_abs_cap_pct)
            .min(remaining_cluster.max(0.0))
            .min(remaining_portfolio.max(0.0));
        x_max = x_max.min(x_hedge_cap);
    } else {
        x_max = x_max
            .min(remaining_cluster.max(0.0))
            .min(remaining_portfolio.max(0.0));
    }

    let heat_calculation_id = HEAT_CALC_SEQ.fetch_add(1, Ordering::Relaxed);
    debug!(
        target: "riskgate::heat",
        heat_calculation_id,
        heat_before,
        x_max,
        ?limit_source,
        b,
        above_hard,
        "candidate heat admission"
    );

    Ok(HeatAdmission {
        heat_calculation_id,
        heat_before,
        x_max,
        limit_source,
        b,
        is_hedge,
        above_hard,
        used_halving_fallback: used_halving,
    })
}

/// Heat after adding signed risk `s*x` at `index`, under one matrix.
pub fn heat_after(
    risk: &DVector<f64>,
    corr: &DMatrix<f64>,
    index: usize,
    signed_x: f64,
    cfg: &HeatConfig,
) -> Result<f64, DomainViolation> {
    let mut with = risk.clone();
    with[index] += signed_x;
    heat(&with, corr, cfg)
}
