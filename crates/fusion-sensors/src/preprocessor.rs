//! [`SensorPreprocessor`] – lane-wise range clipping of 256-bit vectors.
//!
//! Each of the sixteen signed 16-bit lanes is clipped into
//! `[min_val, max_val]`.  Clipped lanes are recorded in a 16-bit mask.  The
//! stage is total and idempotent: clipped values are already inside the
//! bounds, so a second pass changes nothing and reports nothing.
//!
//! # Example
//!
//! ```rust
//! use fusion_sensors::preprocessor::{PreprocessorConfig, SensorPreprocessor};
//! use fusion_types::{BitVector, pack_lane};
//!
//! let pre = SensorPreprocessor::new(PreprocessorConfig::default()).unwrap();
//! let raw = pack_lane(BitVector::zero(256), 20_000, 2, 16);
//! let out = pre.process(&raw);
//! assert_eq!(out.vector.lane(2, 16), 16_383);
//! assert_eq!(out.clipped, 0b100);
//! ```

use fusion_types::frame::FEATURE_BITS;
use fusion_types::{BitVector, FusionError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const LANES: usize = 16;
const LANE_BITS: usize = 16;

fn default_min_val() -> i16 {
    -16384
}

fn default_max_val() -> i16 {
    16383
}

/// Clipping bounds (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PreprocessorConfig {
    #[serde(default = "default_min_val")]
    pub min_val: i16,
    #[serde(default = "default_max_val")]
    pub max_val: i16,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            min_val: default_min_val(),
            max_val: default_max_val(),
        }
    }
}

/// Normalised vector plus the lanes that were clipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessed {
    pub vector: BitVector,
    /// Bit `i` set when lane `i` was clipped.
    pub clipped: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPreprocessor {
    min_val: i64,
    max_val: i64,
}

impl SensorPreprocessor {
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when `min_val > max_val`.
    pub fn new(config: PreprocessorConfig) -> Result<Self, FusionError> {
        if config.min_val > config.max_val {
            return Err(FusionError::InvalidConfig(format!(
                "preprocessor min_val {} exceeds max_val {}",
                config.min_val, config.max_val
            )));
        }
        Ok(Self {
            min_val: i64::from(config.min_val),
            max_val: i64::from(config.max_val),
        })
    }

    /// Clip every lane of `input`.
    ///
    /// # Panics
    ///
    /// Panics when `input` is not 256 bits wide.
    pub fn process(&self, input: &BitVector) -> Preprocessed {
        assert_eq!(input.width(), FEATURE_BITS, "preprocessor input must be 256 bits");
        let mut vector = input.clone();
        let mut clipped = 0u16;
        for lane in 0..LANES {
            let value = input.lane(lane, LANE_BITS);
            let bounded = value.clamp(self.min_val, self.max_val);
            if bounded != value {
                vector.set_lane(lane, LANE_BITS, bounded);
                clipped |= 1 << lane;
            }
        }
        Preprocessed { vector, clipped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_types::pack_lane;

    fn lanes(values: &[i64]) -> BitVector {
        values
            .iter()
            .enumerate()
            .fold(BitVector::zero(FEATURE_BITS), |v, (i, x)| pack_lane(v, *x, i, 16))
    }

    #[test]
    fn in_range_lanes_pass_untouched() {
        let pre = SensorPreprocessor::new(PreprocessorConfig::default()).unwrap();
        let input = lanes(&[0, 1, -1, 16383, -16384]);
        let out = pre.process(&input);
        assert_eq!(out.vector, input);
        assert_eq!(out.clipped, 0);
    }

    #[test]
    fn out_of_range_lanes_clip_to_nearer_bound() {
        let pre = SensorPreprocessor::new(PreprocessorConfig::default()).unwrap();
        let input = lanes(&[32767, -32768, 5, 16384]);
        let out = pre.process(&input);
        assert_eq!(out.vector.lane(0, 16), 16383);
        assert_eq!(out.vector.lane(1, 16), -16384);
        assert_eq!(out.vector.lane(2, 16), 5);
        assert_eq!(out.vector.lane(3, 16), 16383);
        assert_eq!(out.clipped, 0b1011);
    }

    #[test]
    fn second_pass_is_a_fixed_point() {
        let pre = SensorPreprocessor::new(PreprocessorConfig {
            min_val: -10,
            max_val: 10,
        })
        .unwrap();
        let once = pre.process(&lanes(&[-300, 300, 7]));
        let twice = pre.process(&once.vector);
        assert_eq!(twice.vector, once.vector);
        assert_eq!(twice.clipped, 0);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = SensorPreprocessor::new(PreprocessorConfig {
            min_val: 5,
            max_val: -5,
        })
        .unwrap_err();
        assert!(matches!(err, FusionError::InvalidConfig(_)));
    }

    #[test]
    fn config_defaults_from_empty_json() {
        let cfg: PreprocessorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, PreprocessorConfig::default());
    }
}
