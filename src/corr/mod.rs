//! Correlation-matrix algebra: shrinkage, PSD projection, stress transforms
//! and the gamma-blended matrix consumed by the heat core.
//!
//! The numerical pipeline over a raw correlation estimate is:
//!
//! ```text
//! shrink(alpha) -> Higham PSD (bounded) | eigenvalue clip fallback
//!   -> symmetrize -> diagonal floor -> D^{-1/2} C D^{-1/2}
//!   -> up to N clip/normalize passes -> alpha*I regularization if needed
//! ```
//!
//! Every matrix leaving this module satisfies |C_ii - 1| < diag_eps and
//! lambda_min >= -psd_neg_eig_tol.

mod publisher;

pub use publisher::{CorrMatrixSnapshot, CorrPublisher, CorrPublisherHandle, RawCorrUpdate};

use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CorrConfig;

/// Pairwise stress transform mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StressMode {
    /// Hedges stop working: negative correlations decay toward zero,
    /// positive ones stay.
    BreakHedges,
    /// Magnitudes rise toward 1, signs preserved.
    PreserveSign,
    /// Positive correlations rise toward 1, negative ones decay toward zero.
    Asymmetric,
}

/// Outcome of the PSD pipeline, with diagnostics for the publisher.
#[derive(Debug, Clone)]
pub struct PsdOutcome {
    pub matrix: DMatrix<f64>,
    pub higham_iterations: u32,
    pub used_clip_fallback: bool,
    pub regularized: bool,
    pub min_eigenvalue: f64,
}

/// Symmetrize in place: C := (C + C^T) / 2.
fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

/// Smallest eigenvalue of a symmetric matrix.
fn min_eigenvalue(m: &DMatrix<f64>) -> f64 {
    SymmetricEigen::new(m.clone())
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

/// Clip eigenvalues to `floor` and reassemble.
fn eigenvalue_clip(m: &DMatrix<f64>, floor: f64) -> DMatrix<f64> {
    let eig = SymmetricEigen::new(m.clone());
    let clipped = eig.eigenvalues.map(|l| l.max(floor));
    let q = eig.eigenvectors;
    &q * DMatrix::from_diagonal(&clipped) * q.transpose()
}

/// Normalize to unit diagonal: C := D^{-1/2} C D^{-1/2} with a diagonal floor.
fn normalize_diagonal(m: &mut DMatrix<f64>, diag_floor: f64) {
    let n = m.nrows();
    let scale: Vec<f64> = (0..n).map(|i| m[(i, i)].max(diag_floor).sqrt()).collect();
    for i in 0..n {
        for j in 0..n {
            m[(i, j)] /= scale[i] * scale[j];
        }
        m[(i, i)] = 1.0;
    }
}

/// Shrink toward identity: C := (1 - alpha) C + alpha I.
pub fn shrink(m: &DMatrix<f64>, alpha: f64) -> DMatrix<f64> {
    let n = m.nrows();
    let mut out = m * (1.0 - alpha);
    for i in 0..n {
        out[(i, i)] += alpha;
    }
    out
}

/// Higham alternating-projection PSD repair with eigenvalue-clip fallback.
///
/// Alternates the PSD projection with the unit-diagonal projection. If the
/// iteration budget runs out before convergence, falls back to a single
/// eigenvalue clip at `psd_eig_floor`.
pub fn project_psd(raw: &DMatrix<f64>, cfg: &CorrConfig) -> PsdOutcome {
    let n = raw.nrows();
    assert_eq!(n, raw.ncols(), "correlation matrix must be square");

    let mut y = raw.clone();
    symmetrize(&mut y);
    // Dykstra correction for the PSD projection step
    let mut ds = DMatrix::<f64>::zeros(n, n);
    let mut used_clip_fallback = true;
    let mut iterations = 0;

    for iter in 0..cfg.higham_max_iters {
        iterations = iter + 1;
        let r = &y - &ds;
        let x = eigenvalue_clip(&r, 0.0);
        ds = &x - &r;
        let mut next = x.clone();
        for i in 0..n {
            next[(i, i)] = 1.0;
        }
        let delta = (&next - &y).norm() / y.norm().max(1.0);
        y = next;
        if delta < cfg.higham_tol && min_eigenvalue(&y) >= -cfg.psd_neg_eig_tol {
            used_clip_fallback = false;
            break;
        }
    }

    if used_clip_fallback {
        y = eigenvalue_clip(raw, cfg.psd_eig_floor);
    }

    symmetrize(&mut y);
    normalize_diagonal(&mut y, cfg.psd_diag_floor);

    // clip/normalize passes until the spectrum behaves
    for _ in 0..cfg.clip_normalize_passes {
        if min_eigenvalue(&y) >= -cfg.psd_neg_eig_tol {
            break;
        }
        y = eigenvalue_clip(&y, cfg.psd_eig_floor);
        symmetrize(&mut y);
        normalize_diagonal(&mut y, cfg.psd_diag_floor);
    }

    // final safety: alpha*I regularization if the spectrum is still shy
    let mut lambda_min = min_eigenvalue(&y);
    let mut regularized = false;
    if lambda_min < cfg.min_eigenvalue_floor {
        let alpha = (cfg.min_eigenvalue_floor - lambda_min).min(0.5);
        y = shrink(&y, alpha / (1.0 + alpha));
        normalize_diagonal(&mut y, cfg.psd_diag_floor);
        lambda_min = min_eigenvalue(&y);
        regularized = true;
    }

    debug!(
        target: "riskgate::corr",
        n,
        iterations,
        used_clip_fallback,
        regularized,
        lambda_min,
        "psd projection complete"
    );

    PsdOutcome {
        matrix: y,
        higham_iterations: iterations,
        used_clip_fallback,
        regularized,
        min_eigenvalue: lambda_min,
    }
}

/// Apply the pairwise stress transform, then re-project.
pub fn stress_transform(psd: &DMatrix<f64>, cfg: &CorrConfig) -> DMatrix<f64> {
    let n = psd.nrows();
    let delta = cfg.stress_corr_delta;
    let mut stressed = psd.clone();
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let rho = psd[(i, j)];
            stressed[(i, j)] = match cfg.stress_mode {
                StressMode::BreakHedges => {
                    if rho < 0.0 {
                        rho * (1.0 - delta)
                    } else {
                        rho + delta * (1.0 - rho)
                    }
                }
                StressMode::PreserveSign => rho.signum() * (rho.abs() + delta * (1.0 - rho.abs())),
                StressMode::Asymmetric => {
                    if rho >= 0.0 {
                        rho + delta * (1.0 - rho)
                    } else {
                        rho * (1.0 - delta)
                    }
                }
            };
        }
    }
    project_psd(&stressed, cfg).matrix
}

/// Blend the base and stressed matrices: (1 - gamma) C_psd + gamma C_stress.
///
/// The blend of two unit-diagonal PSD matrices stays PSD, so no re-projection
/// is needed here.
pub fn blend(psd: &DMatrix<f64>, stress: &DMatrix<f64>, gamma_s: f64) -> DMatrix<f64> {
    let g = gamma_s.clamp(0.0, 1.0);
    psd * (1.0 - g) + stress * g
}

/// Verify the published-matrix invariants: unit diagonal, tolerable spectrum.
pub fn check_invariants(m: &DMatrix<f64>, diag_eps: f64, neg_eig_tol: f64) -> Result<(), String> {
    for i in 0..m.nrows() {
        if (m[(i, i)] - 1.0).abs() >= diag_eps {
            return Err(format!("diagonal[{i}] = {} violates |C_ii - 1| < {diag_eps}", m[(i, i)]));
        }
    }
    let lmin = min_eigenvalue(m);
    if lmin < -neg_eig_tol {
        return Err(format!("lambda_min = {lmin} below -{neg_eig_tol}"));
    }
    Ok(())
}

/// EMA update for the stress-blend weight gamma_s.
pub fn smooth_gamma(prev: f64, observed: f64, alpha: f64) -> f64 {
    (alpha * observed + (1.0 - alpha) * prev).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CorrConfig {
        CorrConfig::default()
    }

    fn valid_corr() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[1.0, 0.5, 0.2, 0.5, 1.0, 0.3, 0.2, 0.3, 1.0])
    }

    /// Not PSD: the 2x2 blocks demand inconsistent correlations.
    fn broken_corr() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[1.0, 0.9, -0.9, 0.9, 1.0, 0.9, -0.9, 0.9, 1.0])
    }

    #[test]
    fn test_valid_matrix_unchanged_in_essence() {
        let out = project_psd(&valid_corr(), &cfg());
        assert!(!out.used_clip_fallback);
        check_invariants(&out.matrix, 1e-4, 1e-8).unwrap();
        // off-diagonals stay close to the input
        assert!((out.matrix[(0, 1)] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_broken_matrix_repaired() {
        let raw = broken_corr();
        assert!(min_eigenvalue(&raw) < 0.0, "fixture must be indefinite");
        let out = project_psd(&raw, &cfg());
        check_invariants(&out.matrix, 1e-4, 1e-8).unwrap();
        assert!(out.min_eigenvalue >= -1e-8);
    }

    #[test]
    fn test_shrink_moves_toward_identity() {
        let m = valid_corr();
        let s = shrink(&m, 0.5);
        assert!((s[(0, 1)] - 0.25).abs() < 1e-12);
        assert!((s[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stress_asymmetric_raises_positive_decays_negative() {
        let mut raw = valid_corr();
        raw[(0, 2)] = -0.4;
        raw[(2, 0)] = -0.4;
        let base = project_psd(&raw, &cfg()).matrix;
        let stressed = stress_transform(&base, &cfg());
        // positive pair rises
        assert!(stressed[(0, 1)] > base[(0, 1)] - 1e-6);
        // negative pair decays toward zero
        assert!(stressed[(0, 2)] > base[(0, 2)]);
        check_invariants(&stressed, 1e-4, 1e-8).unwrap();
    }

    #[test]
    fn test_stress_break_hedges() {
        let mut c = cfg();
        c.stress_mode = StressMode::BreakHedges;
        let mut raw = valid_corr();
        raw[(0, 2)] = -0.6;
        raw[(2, 0)] = -0.6;
        let base = project_psd(&raw, &c).matrix;
        let stressed = stress_transform(&base, &c);
        assert!(stressed[(0, 2)].abs() < base[(0, 2)].abs() + 1e-9);
    }

    #[test]
    fn test_blend_interpolates() {
        let c = cfg();
        let base = project_psd(&valid_corr(), &c).matrix;
        let stressed = stress_transform(&base, &c);
        let blended = blend(&base, &stressed, 0.5);
        let expected = 0.5 * (base[(0, 1)] + stressed[(0, 1)]);
        assert!((blended[(0, 1)] - expected).abs() < 1e-12);
        check_invariants(&blended, 1e-4, 1e-8).unwrap();
    }

    #[test]
    fn test_blend_extremes() {
        let c = cfg();
        let base = project_psd(&valid_corr(), &c).matrix;
        let stressed = stress_transform(&base, &c);
        assert!((blend(&base, &stressed, 0.0) - &base).norm() < 1e-12);
        assert!((blend(&base, &stressed, 1.0) - &stressed).norm() < 1e-12);
    }

    #[test]
    fn test_gamma_smoothing_clamped() {
        assert!((smooth_gamma(0.2, 0.6, 0.1) - 0.24).abs() < 1e-12);
        assert_eq!(smooth_gamma(0.9, 5.0, 1.0), 1.0);
    }

    #[test]
    fn test_invariant_check_catches_bad_diag() {
        let mut m = valid_corr();
        m[(1, 1)] = 1.2;
        assert!(check_invariants(&m, 1e-4, 1e-8).is_err());
    }
}
