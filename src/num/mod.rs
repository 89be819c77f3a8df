//! Numerical primitives - safe math for the admission path.
//!
//! Every float comparison and division inside the gate chain routes through
//! this module. Direct `==`/`<` on floats in gate logic is forbidden; the
//! named comparison contexts below carry the tolerances for each domain.

pub mod compounding;

use crate::errors::DomainViolation;

/// Epsilon for prices (USD or quote currency).
pub const EPS_PRICE: f64 = 1e-8;
/// Epsilon for quantities (contracts, lots, base currency).
pub const EPS_QTY: f64 = 1e-12;
/// Epsilon for general calculations and comparisons.
pub const EPS_CALC: f64 = 1e-12;
/// Relative tolerance for float comparison.
pub const EPS_FLOAT_COMPARE_REL: f64 = 1e-9;
/// Absolute tolerance for float comparison.
pub const EPS_FLOAT_COMPARE_ABS: f64 = 1e-12;

/// Named comparison context: each domain gets its own tolerance pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareContext {
    /// Strict unit math (R conversions, unit risk identities).
    StrictUnit,
    /// Integration-level KPI checks (PF identity, SL=-1R replay).
    IntegrationKpi,
    /// Price comparisons (tick-level).
    Prices,
    /// ML model outputs (probabilities, EV).
    MlOutputs,
}

impl CompareContext {
    /// (rel_tol, abs_tol) for this context.
    pub fn tolerances(self) -> (f64, f64) {
        match self {
            CompareContext::StrictUnit => (1e-9, 1e-12),
            CompareContext::IntegrationKpi => (1e-6, 1e-9),
            CompareContext::Prices => (1e-9, 1e-8),
            CompareContext::MlOutputs => (1e-6, 1e-6),
        }
    }
}

/// Safe signed divisor: preserves sign, floors magnitude at `eps`.
///
/// `denom_safe_signed(x, eps) = sign(x) * max(|x|, eps)`; exact zero maps
/// to `+eps`.
#[inline]
pub fn denom_safe_signed(value: f64, eps: f64) -> f64 {
    debug_assert!(eps > 0.0, "eps must be positive");
    if value.abs() >= eps {
        value
    } else if value < 0.0 {
        -eps
    } else {
        eps
    }
}

/// Safe unsigned divisor: always positive, floored at `eps`.
#[inline]
pub fn denom_safe_unsigned(value: f64, eps: f64) -> f64 {
    debug_assert!(eps > 0.0, "eps must be positive");
    value.abs().max(eps)
}

/// Safe division with NaN/Inf sanitization and zero-denominator fallback.
///
/// An exactly-zero denominator (after sanitization) yields `fallback`; small
/// non-zero denominators get the epsilon guard.
pub fn safe_divide(numerator: f64, denominator: f64, eps: f64, fallback: f64) -> f64 {
    let num = sanitize(numerator, 0.0);
    let denom_raw = sanitize(denominator, 0.0);
    if denom_raw == 0.0 {
        return fallback;
    }
    let denom = denom_safe_signed(denom_raw, eps);
    sanitize(num / denom, fallback)
}

/// True when the value is finite (not NaN, not +/-Inf).
#[inline]
pub fn is_valid(value: f64) -> bool {
    value.is_finite()
}

/// Replace NaN/Inf with `fallback`.
#[inline]
pub fn sanitize(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Sanitize that refuses to fall back: non-finite input is a domain violation.
pub fn sanitize_strict(value: f64, context: &'static str) -> Result<f64, DomainViolation> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DomainViolation::NonFinite { context, value })
    }
}

/// Tolerant float equality: `|a-b| <= max(rel*max(|a|,|b|), abs)`.
#[inline]
pub fn is_close_with(a: f64, b: f64, rel_tol: f64, abs_tol: f64) -> bool {
    (a - b).abs() <= (rel_tol * a.abs().max(b.abs())).max(abs_tol)
}

/// Tolerant float equality under a named context.
#[inline]
pub fn is_close(a: f64, b: f64, ctx: CompareContext) -> bool {
    let (rel, abs) = ctx.tolerances();
    is_close_with(a, b, rel, abs)
}

/// Is the value within `tol` of zero?
#[inline]
pub fn is_zero(value: f64, tol: f64) -> bool {
    value.abs() <= tol
}

/// Strictly positive beyond tolerance.
#[inline]
pub fn is_positive(value: f64, tol: f64) -> bool {
    value > tol
}

/// Strictly negative beyond tolerance.
#[inline]
pub fn is_negative(value: f64, tol: f64) -> bool {
    value < -tol
}

/// Three-way comparison with absolute tolerance.
///
/// Returns `Less`/`Equal`/`Greater` treating values within `tol` as equal.
pub fn compare_with_tolerance(a: f64, b: f64, tol: f64) -> std::cmp::Ordering {
    let diff = a - b;
    if diff.abs() <= tol {
        std::cmp::Ordering::Equal
    } else if diff < 0.0 {
        std::cmp::Ordering::Less
    } else {
        std::cmp::Ordering::Greater
    }
}

/// Clamp into `[min, max]`.
#[inline]
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.clamp(min, max)
}

/// Round to the nearest multiple of `step` (half away from zero).
pub fn round_to_step(value: f64, step: f64) -> f64 {
    debug_assert!(step > 0.0, "step must be positive");
    let ratio = value / step;
    let steps = if ratio >= 0.0 {
        (ratio + 0.5).floor()
    } else {
        (ratio - 0.5).ceil()
    };
    steps * step
}

/// Epsilon-compensated floor to a step grid.
///
/// `steps = floor((amount + eps) / step)`; the epsilon compensates binary
/// representation error so amounts sitting exactly on a step boundary do not
/// lose a full step.
pub fn floor_to_step(amount: f64, step: f64, eps: f64) -> f64 {
    debug_assert!(step > 0.0, "step must be positive");
    let steps = ((amount + eps) / step).floor().max(0.0);
    steps * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denom_safe_signed_passthrough() {
        assert_eq!(denom_safe_signed(10.0, 1e-6), 10.0);
        assert_eq!(denom_safe_signed(-10.0, 1e-6), -10.0);
    }

    #[test]
    fn test_denom_safe_signed_floors_preserving_sign() {
        assert_eq!(denom_safe_signed(1e-9, 1e-6), 1e-6);
        assert_eq!(denom_safe_signed(-1e-9, 1e-6), -1e-6);
        assert_eq!(denom_safe_signed(0.0, 1e-6), 1e-6);
    }

    #[test]
    fn test_denom_safe_unsigned() {
        assert_eq!(denom_safe_unsigned(-10.0, 1e-6), 10.0);
        assert_eq!(denom_safe_unsigned(0.0, 1e-6), 1e-6);
    }

    #[test]
    fn test_safe_divide_zero_denominator() {
        assert_eq!(safe_divide(10.0, 0.0, EPS_CALC, 0.0), 0.0);
        assert_eq!(safe_divide(10.0, f64::NAN, EPS_CALC, -1.0), -1.0);
    }

    #[test]
    fn test_safe_divide_small_denominator_guarded() {
        let out = safe_divide(10.0, 1e-20, 1e-12, 0.0);
        assert!((out - 1e13).abs() / 1e13 < 1e-9);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(1.5, 0.0), 1.5);
        assert_eq!(sanitize(f64::NAN, 0.0), 0.0);
        assert_eq!(sanitize(f64::INFINITY, -2.0), -2.0);
    }

    #[test]
    fn test_sanitize_strict_rejects() {
        assert!(sanitize_strict(f64::NAN, "test").is_err());
        assert_eq!(sanitize_strict(3.0, "test").unwrap(), 3.0);
    }

    #[test]
    fn test_is_close_contexts() {
        assert!(is_close(1.0, 1.0 + 1e-10, CompareContext::StrictUnit));
        assert!(!is_close(1.0, 1.1, CompareContext::StrictUnit));
        // integration tolerance is looser
        assert!(is_close(1.0, 1.0 + 5e-7, CompareContext::IntegrationKpi));
        assert!(!is_close(1.0, 1.0 + 5e-7, CompareContext::StrictUnit));
    }

    #[test]
    fn test_compare_with_tolerance() {
        use std::cmp::Ordering;
        assert_eq!(compare_with_tolerance(1.0, 2.0, 1e-12), Ordering::Less);
        assert_eq!(compare_with_tolerance(2.0, 1.0, 1e-12), Ordering::Greater);
        assert_eq!(
            compare_with_tolerance(1.0, 1.0 + 1e-13, 1e-12),
            Ordering::Equal
        );
    }

    #[test]
    fn test_round_to_step_half_away_from_zero() {
        assert!((round_to_step(125.0, 10.0) - 130.0).abs() < 1e-9);
        assert!((round_to_step(1.23456789, 0.01) - 1.23).abs() < 1e-9);
        assert!((round_to_step(-125.0, 10.0) + 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_floor_to_step_epsilon_compensated() {
        // 0.30000000000000004 would truncate to 0.2 without the epsilon
        let amount = 0.1 + 0.2;
        assert!((floor_to_step(amount, 0.1, 1e-9) - 0.3).abs() < 1e-9);
        assert_eq!(floor_to_step(-0.05, 0.1, 1e-9), 0.0);
    }
}
