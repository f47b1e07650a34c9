//! [`QkvGenerator`] – projection of a normalised feature vector into the
//! Query, Key and Value buses.
//!
//! For each output lane `j`: `Σ W[j][k] · x[k]` over the sixteen input lanes,
//! accumulated in `i64` and saturated to the lane width of the configured
//! [`LaneGeometry`].  Saturation sets the lane's bit in the per-matrix overflow
//! mask and the matrix's bit in the summary.
//!
//! # Example
//!
//! ```rust
//! use fusion_core::qkv::{QkvGenerator, QkvOverflow, QkvWeights};
//! use fusion_types::{BitVector, LaneGeometry, pack_lane};
//!
//! let geometry = LaneGeometry::Narrow12x16;
//! let mut weights = QkvWeights::zeros(geometry);
//! weights.w_q[0][0] = 2;
//! let qkv = QkvGenerator::new(geometry, &weights).unwrap();
//!
//! let x = pack_lane(BitVector::zero(256), 20_000, 0, 16);
//! let out = qkv.generate(&x);
//! assert_eq!(out.q.lane(0, 16), 32767);
//! assert_eq!(out.summary, QkvOverflow::Q);
//! ```

use fusion_types::frame::FEATURE_BITS;
use fusion_types::geometry::QKV_BITS;
use fusion_types::{BitVector, FusionError, LaneGeometry, saturate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Input lanes of the normalised vector.
pub const INPUT_LANES: usize = 16;
const INPUT_LANE_BITS: usize = 16;

fusion_types::flag_set! {
    /// Which of the three projections saturated somewhere.
    pub struct QkvOverflow: u8 {
        const Q = 0x1;
        const K = 0x2;
        const V = 0x4;
    }
}

impl QkvOverflow {
    /// Summary of the three per-lane saturation masks.
    pub fn from_masks(q: u16, k: u16, v: u16) -> Self {
        let mut summary = Self::NONE;
        for (mask, flag) in [(q, Self::Q), (k, Self::K), (v, Self::V)] {
            if mask != 0 {
                summary |= flag;
            }
        }
        summary
    }
}

/// Projection weights, `[geometry.lanes() × 16]` each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QkvWeights {
    pub w_q: Vec<Vec<i32>>,
    pub w_k: Vec<Vec<i32>>,
    pub w_v: Vec<Vec<i32>>,
}

impl QkvWeights {
    /// All-zero weights shaped for `geometry`.
    pub fn zeros(geometry: LaneGeometry) -> Self {
        let m = vec![vec![0; INPUT_LANES]; geometry.lanes()];
        Self {
            w_q: m.clone(),
            w_k: m.clone(),
            w_v: m,
        }
    }

    /// Check every matrix is `[geometry.lanes() × 16]`.
    ///
    /// # Errors
    ///
    /// [`FusionError::WeightShape`] naming the first malformed matrix.
    pub fn validate(&self, geometry: LaneGeometry) -> Result<(), FusionError> {
        for (name, m) in [("w_q", &self.w_q), ("w_k", &self.w_k), ("w_v", &self.w_v)] {
            check_shape(name, m, geometry.lanes(), INPUT_LANES)?;
        }
        Ok(())
    }
}

pub(crate) fn check_shape(
    matrix: &str,
    m: &[Vec<i32>],
    expected_rows: usize,
    expected_cols: usize,
) -> Result<(), FusionError> {
    let cols = m
        .iter()
        .map(Vec::len)
        .find(|c| *c != expected_cols)
        .unwrap_or(expected_cols);
    if m.len() != expected_rows || cols != expected_cols {
        return Err(FusionError::WeightShape {
            matrix: matrix.to_string(),
            expected_rows,
            expected_cols,
            rows: m.len(),
            cols,
        });
    }
    Ok(())
}

/// Q, K, V buses plus overflow reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QkvOutput {
    pub q: BitVector,
    pub k: BitVector,
    pub v: BitVector,
    /// Per-lane saturation masks (bit `j` = output lane `j`).
    pub q_overflow: u16,
    pub k_overflow: u16,
    pub v_overflow: u16,
    pub summary: QkvOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QkvGenerator {
    geometry: LaneGeometry,
    weights: QkvWeights,
}

impl QkvGenerator {
    /// # Errors
    ///
    /// [`FusionError::WeightShape`] when a matrix does not match `geometry`.
    pub fn new(geometry: LaneGeometry, weights: &QkvWeights) -> Result<Self, FusionError> {
        weights.validate(geometry)?;
        Ok(Self {
            geometry,
            weights: weights.clone(),
        })
    }

    pub fn geometry(&self) -> LaneGeometry {
        self.geometry
    }

    /// Project `x` (sixteen signed 16-bit lanes).
    ///
    /// # Panics
    ///
    /// Panics when `x` is not 256 bits wide.
    pub fn generate(&self, x: &BitVector) -> QkvOutput {
        assert_eq!(x.width(), FEATURE_BITS, "qkv input must be {FEATURE_BITS} bits");
        let input: [i64; INPUT_LANES] = std::array::from_fn(|k| x.lane(k, INPUT_LANE_BITS));

        let (q, q_overflow) = self.project(&self.weights.w_q, &input);
        let (k, k_overflow) = self.project(&self.weights.w_k, &input);
        let (v, v_overflow) = self.project(&self.weights.w_v, &input);

        QkvOutput {
            q,
            k,
            v,
            q_overflow,
            k_overflow,
            v_overflow,
            summary: QkvOverflow::from_masks(q_overflow, k_overflow, v_overflow),
        }
    }

    fn project(&self, w: &[Vec<i32>], input: &[i64; INPUT_LANES]) -> (BitVector, u16) {
        let lane_width = self.geometry.lane_width();
        let mut out = BitVector::zero(QKV_BITS);
        let mut overflow = 0u16;
        for (j, row) in w.iter().enumerate() {
            let acc: i64 = row.iter().zip(input).map(|(wk, xk)| i64::from(*wk) * xk).sum();
            let s = saturate(i128::from(acc), lane_width);
            if s.overflowed {
                overflow |= 1 << j;
            }
            out.set_lane(j, lane_width, s.value);
        }
        (out, overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_types::pack_lane;

    fn input(values: &[i64]) -> BitVector {
        values
            .iter()
            .enumerate()
            .fold(BitVector::zero(FEATURE_BITS), |v, (i, x)| pack_lane(v, *x, i, 16))
    }

    #[test]
    fn wide_geometry_accumulates_exactly() {
        let g = LaneGeometry::Wide6x32;
        let mut w = QkvWeights::zeros(g);
        w.w_q[0] = vec![1; 16];
        w.w_k[5][3] = -7;
        w.w_v[2][0] = 100_000;
        let out = QkvGenerator::new(g, &w).unwrap().generate(&input(&[10, 20, 30, 40]));
        assert_eq!(out.q.lane(0, 32), 100);
        assert_eq!(out.k.lane(5, 32), -280);
        assert_eq!(out.v.lane(2, 32), 1_000_000);
        assert_eq!(out.summary, QkvOverflow::NONE);
    }

    #[test]
    fn narrow_geometry_saturates_and_flags_lane() {
        let g = LaneGeometry::Narrow12x16;
        let mut w = QkvWeights::zeros(g);
        w.w_k[11][0] = -4;
        w.w_v[3][1] = 3;
        let out = QkvGenerator::new(g, &w).unwrap().generate(&input(&[10_000, 10_000]));
        assert_eq!(out.k.lane(11, 16), -32768);
        assert_eq!(out.k_overflow, 1 << 11);
        assert_eq!(out.v.lane(3, 16), 30_000);
        assert_eq!(out.v_overflow, 0);
        assert_eq!(out.summary, QkvOverflow::K);
    }

    #[test]
    fn wide_geometry_saturates_at_32_bits() {
        let g = LaneGeometry::Wide6x32;
        let mut w = QkvWeights::zeros(g);
        w.w_q[1] = vec![i32::MAX; 16];
        w.w_v[0] = vec![i32::MIN; 16];
        let out = QkvGenerator::new(g, &w).unwrap().generate(&input(&[1, 1, 1]));
        assert_eq!(out.q.lane(1, 32), i64::from(i32::MAX));
        assert_eq!(out.v.lane(0, 32), i64::from(i32::MIN));
        assert_eq!(out.summary, QkvOverflow::Q | QkvOverflow::V);
    }

    #[test]
    fn malformed_weights_are_rejected() {
        let mut w = QkvWeights::zeros(LaneGeometry::Wide6x32);
        assert!(QkvGenerator::new(LaneGeometry::Narrow12x16, &w).is_err());
        w.w_v[4].pop();
        let err = QkvGenerator::new(LaneGeometry::Wide6x32, &w).unwrap_err();
        assert_eq!(
            err,
            FusionError::WeightShape {
                matrix: "w_v".to_string(),
                expected_rows: 6,
                expected_cols: 16,
                rows: 6,
                cols: 15
            }
        );
    }
}
