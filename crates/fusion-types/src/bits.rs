//! Wide bit-vectors and the BitField codec.
//!
//! A [`BitVector`] models a fixed-width unsigned hardware bus (up to a few
//! thousand bits).  Bit 0 is the least significant bit of `words[0]`; bits
//! above the declared width are always zero.
//!
//! Lanes are fixed-width fields addressed by index: lane `i` of width `w`
//! occupies bits `[i*w + w - 1 : i*w]`.  The codec functions
//! [`extract_signed`], [`extract_unsigned`] and [`pack_lane`] are the only way
//! the pipeline stages read or write numeric values.
//!
//! # Example
//!
//! ```rust
//! use fusion_types::bits::{BitVector, extract_signed, pack_lane};
//!
//! let v = pack_lane(BitVector::zero(256), -5, 3, 16);
//! assert_eq!(extract_signed(&v, 3, 16), -5);
//! assert_eq!(v.bits(48, 16), 0xFFFB);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::FusionError;

const WORD_BITS: usize = 64;

/// Mask with the low `len` bits set (`len` in `1..=64`).
#[inline]
const fn low_mask(len: usize) -> u64 {
    if len >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

/// Sign-extend the low `width` bits of `raw` to an `i64`.
#[inline]
pub const fn sign_extend(raw: u64, width: usize) -> i64 {
    let shift = (WORD_BITS - width) as u32;
    ((raw << shift) as i64) >> shift
}

// ────────────────────────────────────────────────────────────────────────────
// BitVector
// ────────────────────────────────────────────────────────────────────────────

/// Fixed-width unsigned bit-vector stored as little-endian 64-bit words.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "HexRepr", into = "HexRepr")]
pub struct BitVector {
    width: usize,
    words: Vec<u64>,
}

impl BitVector {
    /// An all-zero vector of `width` bits.
    pub fn zero(width: usize) -> Self {
        Self {
            width,
            words: vec![0; width.div_ceil(WORD_BITS)],
        }
    }

    /// Build a vector from a `u128`, truncated to `width` bits.
    pub fn from_u128(width: usize, value: u128) -> Self {
        Self::from_words(width, &[value as u64, (value >> 64) as u64])
    }

    /// Build a vector from little-endian words.  Missing words are zero and
    /// anything beyond `width` is discarded.
    pub fn from_words(width: usize, words: &[u64]) -> Self {
        let mut v = Self::zero(width);
        for (dst, src) in v.words.iter_mut().zip(words) {
            *dst = *src;
        }
        v.mask_top();
        v
    }

    /// Parse a big-endian hexadecimal string (optional `0x` prefix,
    /// underscores ignored).
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::InvalidConfig`] on a non-hex digit and
    /// [`FusionError::WidthMismatch`] when the value does not fit in `width`.
    pub fn from_hex(width: usize, hex: &str) -> Result<Self, FusionError> {
        let digits = hex.trim().trim_start_matches("0x").replace('_', "");
        let mut v = Self::zero(width);
        for (i, c) in digits.chars().rev().enumerate() {
            let nibble = c
                .to_digit(16)
                .ok_or_else(|| FusionError::InvalidConfig(format!("invalid hex digit {c:?}")))?;
            if nibble == 0 {
                continue;
            }
            let offset = i * 4;
            let needed = offset + (32 - nibble.leading_zeros()) as usize;
            if needed > width {
                return Err(FusionError::WidthMismatch {
                    what: "hex literal".to_string(),
                    expected: width,
                    actual: needed,
                });
            }
            v.set_bits(offset, 4.min(width - offset), u64::from(nibble));
        }
        Ok(v)
    }

    /// Declared width in bits.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Backing words, least significant first.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// `true` when every bit is clear.
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Position of the highest set bit plus one (0 for an all-zero vector).
    pub fn significant_bits(&self) -> usize {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map_or(0, |(i, w)| i * WORD_BITS + (WORD_BITS - w.leading_zeros() as usize))
    }

    /// Read the `len`-bit field starting at bit `offset`.
    ///
    /// # Panics
    ///
    /// Panics when `len` is not in `1..=64` or the field exceeds the width.
    pub fn bits(&self, offset: usize, len: usize) -> u64 {
        self.check_field(offset, len);
        let word = offset / WORD_BITS;
        let shift = offset % WORD_BITS;
        let mut value = self.words[word] >> shift;
        if shift != 0 && shift + len > WORD_BITS {
            value |= self.words[word + 1] << (WORD_BITS - shift);
        }
        value & low_mask(len)
    }

    /// Overwrite the `len`-bit field at `offset` with the low `len` bits of
    /// `value`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`BitVector::bits`].
    pub fn set_bits(&mut self, offset: usize, len: usize, value: u64) {
        self.check_field(offset, len);
        let mask = low_mask(len);
        let value = value & mask;
        let word = offset / WORD_BITS;
        let shift = offset % WORD_BITS;
        self.words[word] = (self.words[word] & !(mask << shift)) | (value << shift);
        if shift != 0 && shift + len > WORD_BITS {
            let spill = low_mask(shift + len - WORD_BITS);
            self.words[word + 1] = (self.words[word + 1] & !spill) | (value >> (WORD_BITS - shift));
        }
    }

    /// XOR `mask` into the `len`-bit field at `offset`.
    pub fn xor_bits(&mut self, offset: usize, len: usize, mask: u64) {
        let current = self.bits(offset, len);
        self.set_bits(offset, len, current ^ mask);
    }

    /// Signed value of lane `index` (see [`extract_signed`]).
    pub fn lane(&self, index: usize, lane_width: usize) -> i64 {
        sign_extend(self.bits(index * lane_width, lane_width), lane_width)
    }

    /// Store `value` into lane `index` (see [`pack_lane`]).
    pub fn set_lane(&mut self, index: usize, lane_width: usize, value: i64) {
        self.set_bits(index * lane_width, lane_width, value as u64);
    }

    /// Copy out `width` bits starting at `offset` as a new vector.
    ///
    /// # Panics
    ///
    /// Panics when the range exceeds this vector.
    pub fn slice(&self, offset: usize, width: usize) -> BitVector {
        assert!(
            offset + width <= self.width,
            "slice [{}+{width}] exceeds {}-bit vector",
            offset,
            self.width
        );
        let mut out = BitVector::zero(width);
        for start in (0..width).step_by(WORD_BITS) {
            let len = WORD_BITS.min(width - start);
            out.set_bits(start, len, self.bits(offset + start, len));
        }
        out
    }

    /// Write all of `field` into this vector starting at bit `offset`.
    ///
    /// # Panics
    ///
    /// Panics when `field` does not fit.
    pub fn place(&mut self, offset: usize, field: &BitVector) {
        assert!(
            offset + field.width <= self.width,
            "{}-bit field at offset {offset} exceeds {}-bit vector",
            field.width,
            self.width
        );
        for start in (0..field.width).step_by(WORD_BITS) {
            let len = WORD_BITS.min(field.width - start);
            self.set_bits(offset + start, len, field.bits(start, len));
        }
    }

    /// Big-endian hex digits, zero-padded to the full width.
    pub fn to_hex(&self) -> String {
        let digits = self.width.div_ceil(4);
        (0..digits)
            .rev()
            .map(|i| {
                let offset = i * 4;
                let nibble = self.bits(offset, 4.min(self.width - offset));
                char::from_digit(nibble as u32, 16).unwrap_or('0')
            })
            .collect()
    }

    fn mask_top(&mut self) {
        let rem = self.width % WORD_BITS;
        if rem != 0
            && let Some(last) = self.words.last_mut()
        {
            *last &= low_mask(rem);
        }
    }

    fn check_field(&self, offset: usize, len: usize) {
        assert!(
            (1..=WORD_BITS).contains(&len),
            "field length {len} must be in 1..=64"
        );
        assert!(
            offset + len <= self.width,
            "field [{}:{}] exceeds {}-bit vector",
            offset + len - 1,
            offset,
            self.width
        );
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitVector<{}>(0x{})", self.width, self.to_hex())
    }
}

impl fmt::LowerHex for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(&self.to_hex())
    }
}

/// Serialised form: `{ "width": 64, "hex": "00ff..." }`.
#[derive(Serialize, Deserialize)]
struct HexRepr {
    width: usize,
    hex: String,
}

impl TryFrom<HexRepr> for BitVector {
    type Error = FusionError;

    fn try_from(repr: HexRepr) -> Result<Self, Self::Error> {
        BitVector::from_hex(repr.width, &repr.hex)
    }
}

impl From<BitVector> for HexRepr {
    fn from(v: BitVector) -> Self {
        HexRepr {
            width: v.width,
            hex: v.to_hex(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// BitField codec
// ────────────────────────────────────────────────────────────────────────────

/// Unsigned value of lane `lane_index` of width `lane_width`.
///
/// # Panics
///
/// Panics when the lane lies outside the vector.
pub fn extract_unsigned(vector: &BitVector, lane_index: usize, lane_width: usize) -> u64 {
    vector.bits(lane_index * lane_width, lane_width)
}

/// Two's-complement value of lane `lane_index`, sign-extended from exactly
/// `lane_width` bits.
///
/// # Panics
///
/// Panics when the lane lies outside the vector.
pub fn extract_signed(vector: &BitVector, lane_index: usize, lane_width: usize) -> i64 {
    vector.lane(lane_index, lane_width)
}

/// Return `vector` with lane `lane_index` replaced by the low `lane_width`
/// bits of `value`.
///
/// # Panics
///
/// Panics when the lane lies outside the vector.
pub fn pack_lane(mut vector: BitVector, value: i64, lane_index: usize, lane_width: usize) -> BitVector {
    vector.set_lane(lane_index, lane_width, value);
    vector
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
