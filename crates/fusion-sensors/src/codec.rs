//! Pluggable payload codecs for the camera and LiDAR decoders.
//!
//! The decoders own validation (tags, headers, windows, bounds); the actual
//! bitstream transform sits behind [`SliceCodec`] and [`PointCloudCodec`] so a
//! real codec can replace the reversible placeholders without touching the
//! control path.

use std::fmt;

use fusion_types::BitVector;

// ────────────────────────────────────────────────────────────────────────────
// Camera slices
// ────────────────────────────────────────────────────────────────────────────

/// Decodes one camera slice unit.
pub trait SliceCodec: Send {
    /// Decode the slice `payload` of unit type `unit_type` (1, 2 or 5).
    ///
    /// The returned vector must have the same width as `payload`.
    fn decode_slice(&mut self, unit_type: u8, payload: &BitVector) -> BitVector;
}

/// Placeholder slice codec: XORs the low 32 bits with a fixed key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorSliceCodec {
    key: u32,
}

impl XorSliceCodec {
    pub const DEFAULT_KEY: u32 = 0xAAAA_AAAA;

    pub fn new(key: u32) -> Self {
        Self { key }
    }
}

impl Default for XorSliceCodec {
    fn default() -> Self {
        Self::new(Self::DEFAULT_KEY)
    }
}

impl SliceCodec for XorSliceCodec {
    fn decode_slice(&mut self, _unit_type: u8, payload: &BitVector) -> BitVector {
        let mut out = payload.clone();
        out.xor_bits(0, 32, u64::from(self.key));
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LiDAR point clouds
// ────────────────────────────────────────────────────────────────────────────

/// Reason a [`PointCloudCodec`] could not decode a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFault {
    /// The entropy-coded stream is malformed.
    CorruptEntropyCode,
    /// Decoding would exceed the output capacity.
    DecoderOverflow,
}

impl fmt::Display for CodecFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecFault::CorruptEntropyCode => f.write_str("corrupt entropy code"),
            CodecFault::DecoderOverflow => f.write_str("decoder overflow"),
        }
    }
}

/// Decompresses the LiDAR payload for a given compression mode.
pub trait PointCloudCodec: Send {
    /// `true` when `mode` is a compression mode this codec understands.
    fn supports(&self, mode: u8) -> bool;

    /// Decode `payload` (same width in and out).
    ///
    /// # Errors
    ///
    /// A [`CodecFault`] when the payload cannot be decoded.
    fn decode(&self, mode: u8, payload: &BitVector) -> Result<BitVector, CodecFault>;
}

/// Placeholder point-cloud codec.
///
/// | mode | transform | fault |
/// |---|---|---|
/// | 0 raw | identity | – |
/// | 1 entropy-A | XOR `0x1234_5678` | low 16 bits all zero |
/// | 2 entropy-B | XOR `0x8765_4321` | payload within 1000 of its maximum |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XorPointCloudCodec;

impl XorPointCloudCodec {
    const KEY_A: u64 = 0x1234_5678;
    const KEY_B: u64 = 0x8765_4321;
    const OVERFLOW_MARGIN: u64 = 1000;

    /// `max - payload < OVERFLOW_MARGIN` for an all-ones maximum.
    fn near_capacity(payload: &BitVector) -> bool {
        let low_bits = 10;
        let width = payload.width();
        if width <= low_bits {
            return false;
        }
        let upper = payload.slice(low_bits, width - low_bits);
        if upper.count_ones() as usize != upper.width() {
            return false;
        }
        let headroom = !payload.bits(0, low_bits) & ((1 << low_bits) - 1);
        headroom < Self::OVERFLOW_MARGIN
    }
}

impl PointCloudCodec for XorPointCloudCodec {
    fn supports(&self, mode: u8) -> bool {
        mode <= 2
    }

    fn decode(&self, mode: u8, payload: &BitVector) -> Result<BitVector, CodecFault> {
        let mut out = payload.clone();
        match mode {
            0 => {}
            1 => {
                if payload.bits(0, 16) == 0 {
                    return Err(CodecFault::CorruptEntropyCode);
                }
                out.xor_bits(0, 32, Self::KEY_A);
            }
            _ => {
                if Self::near_capacity(payload) {
                    return Err(CodecFault::DecoderOverflow);
                }
                out.xor_bits(0, 32, Self::KEY_B);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_slice_is_reversible() {
        let mut codec = XorSliceCodec::default();
        let payload = BitVector::from_u128(3064, 0xABCD_EF00);
        let once = codec.decode_slice(1, &payload);
        assert_eq!(once.bits(0, 32), 0xABCD_EF00 ^ 0xAAAA_AAAA);
        assert_eq!(codec.decode_slice(1, &once), payload);
    }

    #[test]
    fn point_cloud_modes() {
        let codec = XorPointCloudCodec;
        let payload = BitVector::from_u128(460, 0xABCD_EF01);
        assert_eq!(codec.decode(0, &payload).unwrap(), payload);
        assert_eq!(
            codec.decode(1, &payload).unwrap().bits(0, 32),
            0xABCD_EF01 ^ 0x1234_5678
        );
        assert_eq!(
            codec.decode(2, &payload).unwrap().bits(0, 32),
            0xABCD_EF01 ^ 0x8765_4321
        );
        assert!(codec.supports(2));
        assert!(!codec.supports(3));
    }

    #[test]
    fn entropy_a_rejects_empty_symbol_table() {
        let payload = BitVector::from_u128(460, 0xFFFF_0000);
        assert_eq!(
            XorPointCloudCodec.decode(1, &payload),
            Err(CodecFault::CorruptEntropyCode)
        );
    }

    #[test]
    fn entropy_b_rejects_payload_near_capacity() {
        let mut full = BitVector::zero(460);
        for start in (0..460).step_by(64) {
            let len = 64.min(460 - start);
            full.set_bits(start, len, u64::MAX);
        }
        assert_eq!(
            XorPointCloudCodec.decode(2, &full),
            Err(CodecFault::DecoderOverflow)
        );

        // Exactly 1000 below the maximum is still decodable.
        let mut edge = full.clone();
        edge.set_bits(0, 10, 0x3FF - 1000);
        assert!(XorPointCloudCodec.decode(2, &edge).is_ok());
        edge.set_bits(0, 10, 0x3FF - 999);
        assert!(XorPointCloudCodec.decode(2, &edge).is_err());
    }
}
