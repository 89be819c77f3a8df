//! MLE (meta-labeling engine) output attached to a signal.
//!
//! The model itself is an external black box; this is its typed contract.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::num::{is_close, CompareContext};

/// Discrete MLE verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MleDecision {
    Reject,
    Weak,
    Normal,
    Strong,
}

impl MleDecision {
    /// Risk multiplier attached to the verdict.
    pub fn risk_mult(self) -> f64 {
        match self {
            MleDecision::Reject => 0.0,
            MleDecision::Weak => 0.5,
            MleDecision::Normal => 1.0,
            MleDecision::Strong => 1.25,
        }
    }
}

/// Typed MLE model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MleOutput {
    pub schema_version: u32,
    pub model_id: String,
    /// 64-hex SHA256 of the model artifact.
    pub artifact_sha256: String,
    pub feature_schema_version: u32,
    pub calibration_version: u32,
    pub decision: MleDecision,
    /// Model-supplied risk multiplier in [0, 1].
    pub risk_mult: f64,
    /// Price-edge expectation in R units.
    pub ev_r_price: f64,
    pub p_fail: f64,
    pub p_neutral: f64,
    pub p_success: f64,
    pub p_stopout_noise: Option<f64>,
    pub expected_cost_r_pre_mle: Option<f64>,
    pub expected_cost_r_post_mle: Option<f64>,
}

impl MleOutput {
    /// Validate hash shape, probability bounds and the simplex constraint.
    pub fn validate(&self, required_feature_schema_version: u32) -> Result<(), ValidationError> {
        if self.artifact_sha256.len() != 64
            || !self
                .artifact_sha256
                .bytes()
                .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(ValidationError::BadArtifactHash(self.artifact_sha256.clone()));
        }
        for (field, value) in [
            ("p_fail", self.p_fail),
            ("p_neutral", self.p_neutral),
            ("p_success", self.p_success),
            ("risk_mult", self.risk_mult),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::OutOfRange {
                    field,
                    value,
                    expected: "[0, 1]",
                });
            }
        }
        if let Some(p) = self.p_stopout_noise {
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(ValidationError::OutOfRange {
                    field: "p_stopout_noise",
                    value: p,
                    expected: "[0, 1]",
                });
            }
        }
        let sum = self.p_fail + self.p_neutral + self.p_success;
        if !is_close(sum, 1.0, CompareContext::MlOutputs) {
            return Err(ValidationError::ProbabilitySum {
                p_fail: self.p_fail,
                p_neutral: self.p_neutral,
                p_success: self.p_success,
            });
        }
        if self.feature_schema_version < required_feature_schema_version {
            return Err(ValidationError::FeatureSchemaIncompatible {
                got: self.feature_schema_version,
                required: required_feature_schema_version,
            });
        }
        Ok(())
    }
}
