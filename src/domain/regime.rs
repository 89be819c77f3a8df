//! Market-regime classifications and the MRC/baseline conflict record.

use serde::{Deserialize, Serialize};

/// MRC (model regime classifier) class on the working timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MrcClass {
    TrendUp,
    TrendDown,
    Range,
    Noise,
    BreakoutUp,
    BreakoutDown,
}

impl MrcClass {
    /// Directional sign: +1 up, -1 down, 0 for non-directional classes.
    pub fn direction_sign(self) -> i8 {
        match self {
            MrcClass::TrendUp | MrcClass::BreakoutUp => 1,
            MrcClass::TrendDown | MrcClass::BreakoutDown => -1,
            MrcClass::Range | MrcClass::Noise => 0,
        }
    }
}

/// Baseline (fallback) classifier class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaselineClass {
    TrendUp,
    TrendDown,
    Range,
    Noise,
}

impl BaselineClass {
    pub fn direction_sign(self) -> i8 {
        match self {
            BaselineClass::TrendUp => 1,
            BaselineClass::TrendDown => -1,
            BaselineClass::Range | BaselineClass::Noise => 0,
        }
    }
}

/// Final regime after MRC/baseline conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalRegime {
    TrendUp,
    TrendDown,
    Range,
    Noise,
    BreakoutUp,
    BreakoutDown,
    NoTrade,
    ProbeTrade,
}

/// MRC classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MrcResult {
    pub class: MrcClass,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

/// Record of a detected MRC/baseline conflict, kept for the sliding
/// conflict window and probe diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeConflict {
    pub conflict_type: String,
    pub is_probe_eligible: bool,
    pub probe_conditions_met: bool,
    pub mrc_class: MrcClass,
    pub baseline_class: BaselineClass,
    pub mrc_confidence: f64,
}
