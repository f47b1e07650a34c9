//! [`FeatureFusion`] – scaling of the Value bus by an attention weight.
//!
//! The weight is Q16.16: each V lane is multiplied in `i128`, shifted right
//! by 16 and saturated to the lane width.  The result occupies the low 192
//! bits of a 512-bit fused feature; the upper bits stay zero.

use fusion_types::frame::FUSED_BITS;
use fusion_types::{BitVector, LaneGeometry, saturate};

/// Fractional bits of the attention weight.
pub const FIXED_POINT_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFusion {
    geometry: LaneGeometry,
}

impl FeatureFusion {
    pub fn new(geometry: LaneGeometry) -> Self {
        Self { geometry }
    }

    /// Scale `v` by `weight`.
    pub fn fuse(&self, weight: i64, v: &BitVector) -> BitVector {
        let lane_width = self.geometry.lane_width();
        let mut out = BitVector::zero(FUSED_BITS);
        for lane in 0..self.geometry.lanes() {
            let product = i128::from(weight) * i128::from(v.lane(lane, lane_width));
            let scaled = saturate(product >> FIXED_POINT_SHIFT, lane_width);
            out.set_lane(lane, lane_width, scaled.value);
        }
        out
    }
}
