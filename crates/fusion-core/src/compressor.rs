//! [`FusionCompressor`] – optional dense projection of the four fused
//! features into the 2048-bit tensor.
//!
//! The low 192 bits of each fused feature are concatenated (camera first)
//! and read as 96 signed 16-bit inputs, zero-extended past the available
//! bits.  Each of the 128 outputs is `relu(bias + Σ W·x)` saturated to
//! `i16::MAX`.

use fusion_types::frame::{FUSED_BITS, TENSOR_BITS};
use fusion_types::geometry::QKV_BITS;
use fusion_types::{BitVector, FusionError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::qkv::check_shape;

pub const COMPRESSOR_INPUTS: usize = 96;
pub const COMPRESSOR_OUTPUTS: usize = 128;
const LANE_BITS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompressorWeights {
    /// `[128 × 96]`.
    pub weights: Vec<Vec<i32>>,
    /// 128 entries.
    pub biases: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FusionCompressor {
    weights: Vec<Vec<i32>>,
    biases: Vec<i32>,
}

impl FusionCompressor {
    /// # Errors
    ///
    /// [`FusionError::WeightShape`] on a malformed matrix or bias vector.
    pub fn new(config: &CompressorWeights) -> Result<Self, FusionError> {
        check_shape("compressor", &config.weights, COMPRESSOR_OUTPUTS, COMPRESSOR_INPUTS)?;
        if config.biases.len() != COMPRESSOR_OUTPUTS {
            return Err(FusionError::WeightShape {
                matrix: "compressor bias".to_string(),
                expected_rows: COMPRESSOR_OUTPUTS,
                expected_cols: 1,
                rows: config.biases.len(),
                cols: 1,
            });
        }
        Ok(Self {
            weights: config.weights.clone(),
            biases: config.biases.clone(),
        })
    }

    /// Project four fused features into one tensor.
    ///
    /// # Panics
    ///
    /// Panics when a feature is not 512 bits wide.
    pub fn compress(&self, fused: &[BitVector; 4]) -> BitVector {
        let mut packed = BitVector::zero(COMPRESSOR_INPUTS * LANE_BITS);
        for (i, f) in fused.iter().enumerate() {
            assert_eq!(f.width(), FUSED_BITS, "fused feature must be {FUSED_BITS} bits");
            packed.place(i * QKV_BITS, &f.slice(0, QKV_BITS));
        }
        let input: Vec<i64> = (0..COMPRESSOR_INPUTS)
            .map(|k| packed.lane(k, LANE_BITS))
            .collect();

        let mut out = BitVector::zero(TENSOR_BITS);
        for (j, (row, bias)) in self.weights.iter().zip(&self.biases).enumerate() {
            let acc: i64 = i64::from(*bias)
                + row
                    .iter()
                    .zip(&input)
                    .map(|(w, x)| i64::from(*w) * x)
                    .sum::<i64>();
            let activated = acc.clamp(0, i64::from(i16::MAX));
            out.set_lane(j, LANE_BITS, activated);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(fill: impl Fn(usize, usize) -> i32, bias: i32) -> CompressorWeights {
        CompressorWeights {
            weights: (0..COMPRESSOR_OUTPUTS)
                .map(|j| (0..COMPRESSOR_INPUTS).map(|k| fill(j, k)).collect())
                .collect(),
            biases: vec![bias; COMPRESSOR_OUTPUTS],
        }
    }

    fn feature(lane0: i64) -> BitVector {
        let mut f = BitVector::zero(FUSED_BITS);
        f.set_lane(0, 16, lane0);
        f
    }

    #[test]
    fn selects_inputs_across_features() {
        // Output j reads input lane j (only the first 48 carry data).
        let c = FusionCompressor::new(&weights(|j, k| i32::from(j == k), 0)).unwrap();
        let out = c.compress(&[feature(7), feature(8), feature(9), feature(10)]);
        assert_eq!(out.lane(0, 16), 7);
        assert_eq!(out.lane(12, 16), 8);
        assert_eq!(out.lane(24, 16), 9);
        assert_eq!(out.lane(36, 16), 10);
        assert_eq!(out.lane(60, 16), 0);
    }

    #[test]
    fn relu_and_saturation() {
        let c = FusionCompressor::new(&weights(|_, k| if k == 0 { 10 } else { 0 }, -5)).unwrap();
        let zero = BitVector::zero(FUSED_BITS);
        let neg = c.compress(&[feature(-1), zero.clone(), zero.clone(), zero.clone()]);
        assert!(neg.is_zero());
        let big = c.compress(&[feature(30_000), zero.clone(), zero.clone(), zero]);
        assert_eq!(big.lane(127, 16), 32767);
    }

    #[test]
    fn shape_is_checked() {
        let mut w = weights(|_, _| 0, 0);
        w.biases.pop();
        assert!(FusionCompressor::new(&w).is_err());
        let mut w = weights(|_, _| 0, 0);
        w.weights[3].push(1);
        assert!(FusionCompressor::new(&w).is_err());
    }
}
