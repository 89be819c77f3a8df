//! Engine trading signal: levels, holding context and engine constraints.

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;
use crate::units::Direction;

/// Which strategy engine produced the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineKind {
    Trend,
    Range,
}

/// Entry/stop/target levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalLevels {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Holding-horizon context attached by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    pub expected_holding_hours: f64,
    pub regime_hint: Option<String>,
    pub setup_id: String,
}

/// Engine-side admission constraints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalConstraints {
    /// Minimum raw reward/risk the engine demands.
    pub rr_min_engine: f64,
    /// SL distance floor in ATR multiples.
    pub sl_min_atr_mult: f64,
    /// SL distance ceiling in ATR multiples.
    pub sl_max_atr_mult: f64,
}

/// A candidate trade emitted by a strategy engine, consumed exactly once
/// by the Gatekeeper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSignal {
    pub schema_version: u32,
    pub instrument: String,
    pub engine: EngineKind,
    pub direction: Direction,
    pub levels: SignalLevels,
    pub context: SignalContext,
    pub constraints: SignalConstraints,
}

impl EngineSignal {
    /// Validate level finiteness, positivity and direction monotonicity.
    ///
    /// LONG requires tp > entry > sl; SHORT requires tp < entry < sl.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let SignalLevels {
            entry_price,
            stop_loss,
            take_profit,
        } = self.levels;

        for (field, value) in [
            ("entry_price", entry_price),
            ("stop_loss", stop_loss),
            ("take_profit", take_profit),
            ("expected_holding_hours", self.context.expected_holding_hours),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field, value });
            }
        }
        for (field, value) in [
            ("entry_price", entry_price),
            ("stop_loss", stop_loss),
            ("take_profit", take_profit),
        ] {
            if value <= 0.0 {
                return Err(ValidationError::OutOfRange {
                    field,
                    value,
                    expected: "> 0",
                });
            }
        }

        let ordered = match self.direction {
            Direction::Long => take_profit > entry_price && entry_price > stop_loss,
            Direction::Short => take_profit < entry_price && entry_price < stop_loss,
        };
        if !ordered {
            return Err(ValidationError::LevelOrdering {
                direction: match self.direction {
                    Direction::Long => "LONG",
                    Direction::Short => "SHORT",
                },
                entry: entry_price,
                tp: take_profit,
                sl: stop_loss,
            });
        }
        Ok(())
    }

    /// Raw reward/risk on quoted levels, before costs.
    pub fn raw_rr(&self) -> f64 {
        let reward = (self.levels.take_profit - self.levels.entry_price).abs();
        let risk = (self.levels.entry_price - self.levels.stop_loss).abs();
        reward / risk.max(crate::num::EPS_PRICE)
    }

    /// Absolute SL distance on quoted levels.
    pub fn sl_distance(&self) -> f64 {
        (self.levels.entry_price - self.levels.stop_loss).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::sample_signal;

    #[test]
    fn test_valid_long_signal() {
        let sig = sample_signal();
        assert!(sig.validate().is_ok());
        assert!((sig.raw_rr() - 3.0).abs() < 1e-9);
        assert!((sig.sl_distance() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_level_ordering_rejected() {
        let mut sig = sample_signal();
        sig.levels.stop_loss = 101.0;
        assert!(matches!(
            sig.validate(),
            Err(ValidationError::LevelOrdering { .. })
        ));
    }

    #[test]
    fn test_short_level_ordering() {
        let mut sig = sample_signal();
        sig.direction = Direction::Short;
        sig.levels = SignalLevels {
            entry_price: 100.0,
            stop_loss: 102.0,
            take_profit: 94.0,
        };
        assert!(sig.validate().is_ok());

        sig.levels.take_profit = 103.0;
        assert!(sig.validate().is_err());
    }

    #[test]
    fn test_nan_levels_rejected() {
        let mut sig = sample_signal();
        sig.levels.entry_price = f64::NAN;
        assert!(matches!(
            sig.validate(),
            Err(ValidationError::NonFinite { .. })
        ));
    }
}
