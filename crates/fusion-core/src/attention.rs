//! [`AttentionCalculator`] – scaled dot product of Q and K.
//!
//! `sat64((Σ Q[i]·K[i]) >> shift + bias)`.  The sum is formed in `i128`, so
//! no intermediate overflow is possible for either geometry.  The shift is
//! arithmetic (floor toward negative infinity) and saturation is silent.

use fusion_types::{BitVector, FusionError, LaneGeometry, saturate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest accepted right shift.
pub const MAX_SHIFT: u32 = 63;

fn default_shift() -> u32 {
    2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AttentionConfig {
    /// Right shift approximating `1/√d`.
    #[serde(default = "default_shift")]
    pub shift: u32,
    /// Linear bias added after the shift.
    #[serde(default)]
    pub bias: i64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            shift: default_shift(),
            bias: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionCalculator {
    geometry: LaneGeometry,
    shift: u32,
    bias: i64,
}

impl AttentionCalculator {
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when `shift` exceeds [`MAX_SHIFT`].
    pub fn new(geometry: LaneGeometry, config: AttentionConfig) -> Result<Self, FusionError> {
        if config.shift > MAX_SHIFT {
            return Err(FusionError::InvalidConfig(format!(
                "attention shift {} exceeds {MAX_SHIFT}",
                config.shift
            )));
        }
        Ok(Self {
            geometry,
            shift: config.shift,
            bias: config.bias,
        })
    }

    /// Attention weight for one Q/K pair.
    pub fn score(&self, q: &BitVector, k: &BitVector) -> i64 {
        let lane_width = self.geometry.lane_width();
        let dot: i128 = (0..self.geometry.lanes())
            .map(|i| i128::from(q.lane(i, lane_width)) * i128::from(k.lane(i, lane_width)))
            .sum();
        saturate((dot >> self.shift) + i128::from(self.bias), 64).value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_types::geometry::QKV_BITS;

    fn bus(geometry: LaneGeometry, values: &[i64]) -> BitVector {
        let mut v = BitVector::zero(QKV_BITS);
        for (i, x) in values.iter().enumerate() {
            v.set_lane(i, geometry.lane_width(), *x);
        }
        v
    }

    #[test]
    fn dot_product_is_shifted_and_biased() {
        let g = LaneGeometry::Narrow12x16;
        let calc = AttentionCalculator::new(g, AttentionConfig { shift: 2, bias: 5 }).unwrap();
        let q = bus(g, &[3, 4, -2]);
        let k = bus(g, &[5, 6, 7]);
        // (15 + 24 - 14) >> 2 = 6
        assert_eq!(calc.score(&q, &k), 11);
    }

    #[test]
    fn negative_sums_floor() {
        let g = LaneGeometry::Wide6x32;
        let calc = AttentionCalculator::new(g, AttentionConfig::default()).unwrap();
        let q = bus(g, &[-1]);
        let k = bus(g, &[1]);
        assert_eq!(calc.score(&q, &k), -1);
    }

    #[test]
    fn extreme_inputs_saturate_silently() {
        let g = LaneGeometry::Wide6x32;
        let calc = AttentionCalculator::new(g, AttentionConfig { shift: 0, bias: i64::MAX }).unwrap();
        let v = bus(g, &[i64::from(i32::MIN); 6]);
        assert_eq!(calc.score(&v, &v), i64::MAX);

        let calc = AttentionCalculator::new(g, AttentionConfig { shift: 0, bias: i64::MIN }).unwrap();
        let q = bus(g, &[i64::from(i32::MAX); 6]);
        let k = bus(g, &[i64::from(i32::MIN); 6]);
        assert_eq!(calc.score(&q, &k), i64::MIN);
    }

    #[test]
    fn shift_bound_is_enforced() {
        let g = LaneGeometry::Wide6x32;
        assert!(AttentionCalculator::new(g, AttentionConfig { shift: 63, bias: 0 }).is_ok());
        assert!(AttentionCalculator::new(g, AttentionConfig { shift: 64, bias: 0 }).is_err());
    }
}
