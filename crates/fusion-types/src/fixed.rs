//! Signed fixed-width saturation.
//!
//! Every arithmetic stage in the pipeline accumulates in a wider integer and
//! then clamps into the declared lane range.  [`saturate`] is the single
//! place that performs that clamp and reports whether it fired.

/// Result of clamping a wide intermediate into a narrower signed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Saturated {
    /// The clamped value (always representable in the target width).
    pub value: i64,
    /// `true` when the input lay outside the target range.
    pub overflowed: bool,
}

/// Inclusive `(min, max)` of a two's-complement integer of `width` bits.
///
/// # Panics
///
/// Panics when `width` is not in `1..=64`.
pub fn signed_bounds(width: usize) -> (i64, i64) {
    assert!((1..=64).contains(&width), "signed width {width} must be in 1..=64");
    if width == 64 {
        return (i64::MIN, i64::MAX);
    }
    let max = (1i64 << (width - 1)) - 1;
    (-max - 1, max)
}

/// Clamp `value` into the signed range of `width` bits.
pub fn saturate(value: i128, width: usize) -> Saturated {
    let (min, max) = signed_bounds(width);
    if value > i128::from(max) {
        Saturated {
            value: max,
            overflowed: true,
        }
    } else if value < i128::from(min) {
        Saturated {
            value: min,
            overflowed: true,
        }
    } else {
        Saturated {
            value: value as i64,
            overflowed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_for_common_widths() {
        assert_eq!(signed_bounds(16), (-32768, 32767));
        assert_eq!(signed_bounds(32), (i32::MIN as i64, i32::MAX as i64));
        assert_eq!(signed_bounds(64), (i64::MIN, i64::MAX));
    }

    #[test]
    fn in_range_value_is_exact() {
        assert_eq!(
            saturate(-32768, 16),
            Saturated {
                value: -32768,
                overflowed: false
            }
        );
    }

    #[test]
    fn out_of_range_value_clamps_to_boundary() {
        let hi = saturate(32768, 16);
        assert_eq!(hi.value, 32767);
        assert!(hi.overflowed);

        let lo = saturate(i128::from(i64::MIN) - 1, 64);
        assert_eq!(lo.value, i64::MIN);
        assert!(lo.overflowed);
    }
}
