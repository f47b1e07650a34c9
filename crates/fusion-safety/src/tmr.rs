//! [`TmrVoter`] – triple modular redundancy majority voter.
//!
//! Three redundant copies of a bus are compared lane by lane.  The voter
//! never fails closed: every lane resolves to one of the three inputs, and a
//! per-lane error bit records the lanes on which no two copies agreed.
//!
//! Per lane, in order:
//! 1. `c1 == c2` or `c1 == c3` – output `c1`, no error.
//! 2. `c2 == c3` – output `c2`, no error.
//! 3. otherwise – output `c1` and set the lane's error bit.

use fusion_types::{BitVector, FusionError};
use serde::{Deserialize, Serialize};

/// Lane width used when none is specified.
pub const DEFAULT_VOTE_LANE_BITS: usize = 16;

/// Outcome of one vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmrVote {
    /// Majority value (width of the inputs).
    pub voted: BitVector,
    /// One bit per lane; set where all three copies disagreed.
    pub errors: BitVector,
}

impl TmrVote {
    /// `true` when every lane had a majority.
    pub fn is_clean(&self) -> bool {
        self.errors.is_zero()
    }

    /// Number of lanes without a majority.
    pub fn error_count(&self) -> u32 {
        self.errors.count_ones()
    }
}

/// Majority vote of a single word.  Returns the selected word and `true`
/// when all three disagreed.
pub fn vote_word(c1: u64, c2: u64, c3: u64) -> (u64, bool) {
    if c1 == c2 || c1 == c3 {
        (c1, false)
    } else if c2 == c3 {
        (c2, false)
    } else {
        (c1, true)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TmrVoter
// ────────────────────────────────────────────────────────────────────────────

/// Lane-wise majority voter over `width`-bit buses.
///
/// # Example
///
/// ```
/// use fusion_safety::tmr::TmrVoter;
/// use fusion_types::BitVector;
///
/// let voter = TmrVoter::new(32, 16).unwrap();
/// let good = BitVector::from_u128(32, 0x1111_2222);
/// let upset = BitVector::from_u128(32, 0x1111_2223);
///
/// let vote = voter.vote(&upset, &good, &good);
/// assert_eq!(vote.voted, good);
/// assert!(vote.is_clean());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmrVoter {
    width: usize,
    lane_width: usize,
}

impl TmrVoter {
    /// Voter for `width`-bit buses split into `lane_width`-bit lanes.
    ///
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when `lane_width` is not in `1..=64`,
    /// `width` is zero, or `width` is not a multiple of `lane_width`.
    pub fn new(width: usize, lane_width: usize) -> Result<Self, FusionError> {
        if !(1..=64).contains(&lane_width) {
            return Err(FusionError::InvalidConfig(format!(
                "vote lane width {lane_width} must be in 1..=64"
            )));
        }
        if width == 0 || width % lane_width != 0 {
            return Err(FusionError::InvalidConfig(format!(
                "vote width {width} is not a positive multiple of lane width {lane_width}"
            )));
        }
        Ok(Self { width, lane_width })
    }

    /// Voter for a bus whose geometry is known to be valid.
    pub(crate) const fn for_bus(width: usize, lane_width: usize) -> Self {
        Self { width, lane_width }
    }

    /// Voter with [`DEFAULT_VOTE_LANE_BITS`]-bit lanes.
    pub fn with_default_lanes(width: usize) -> Result<Self, FusionError> {
        Self::new(width, DEFAULT_VOTE_LANE_BITS)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn lane_width(&self) -> usize {
        self.lane_width
    }

    /// Number of lanes, and therefore the width of the error mask.
    pub fn lanes(&self) -> usize {
        self.width / self.lane_width
    }

    /// Vote three copies lane by lane.
    ///
    /// # Panics
    ///
    /// Panics when any copy is not exactly [`TmrVoter::width`] bits wide.
    pub fn vote(&self, c1: &BitVector, c2: &BitVector, c3: &BitVector) -> TmrVote {
        for c in [c1, c2, c3] {
            assert_eq!(
                c.width(),
                self.width,
                "voter configured for {} bits got a {}-bit copy",
                self.width,
                c.width()
            );
        }

        let mut voted = c1.clone();
        let mut errors = BitVector::zero(self.lanes());
        for lane in 0..self.lanes() {
            let offset = lane * self.lane_width;
            let a = c1.bits(offset, self.lane_width);
            let b = c2.bits(offset, self.lane_width);
            let c = c3.bits(offset, self.lane_width);
            let (word, disagree) = vote_word(a, b, c);
            if word != a {
                voted.set_bits(offset, self.lane_width, word);
            }
            if disagree {
                errors.set_bits(lane, 1, 1);
            }
        }
        TmrVote { voted, errors }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
