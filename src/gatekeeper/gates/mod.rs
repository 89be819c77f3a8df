//! The admission gates, one module per chain position.
//!
//! Ordering is authoritative: 0 -> 1 -> 2 -> 3 -> 4 -> 5 -> 6 ->
//! (SHADOW exit) -> 7 -> 8 -> 9 -> 10 -> 11 -> 12 -> 13 -> 13.5 -> 14 ->
//! 15 -> 16 -> 17 -> 18. Every gate before 14 is size-invariant: nothing may
//! read `qty_actual` or lot rounding.

pub(crate) mod basis_exposure;
pub(crate) mod bankruptcy;
pub(crate) mod funding;
pub(crate) mod gap_glitch;
pub(crate) mod kill_switch;
pub(crate) mod liquidity;
pub(crate) mod mle_decision;
pub(crate) mod net_rr;
pub(crate) mod partial_fill;
pub(crate) mod pre_sizing;
pub(crate) mod regime;
pub(crate) mod reservation_gate;
pub(crate) mod sequential_risk;
pub(crate) mod signal_sanity;
pub(crate) mod sizing_gate;
pub(crate) mod warmup_dqs;

pub use gap_glitch::{GlitchSeverity, PricePoint};
pub use partial_fill::{PartialFillDecision, PartialFillInputs};
