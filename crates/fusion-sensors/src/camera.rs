//! [`CameraDecoder`] – NAL-unit validation for the 3072-bit camera bus.
//!
//! The top eight bits carry the unit-type tag, the remaining 3064 bits the
//! unit payload.  Unknown tags are decoded as plain slices rather than
//! rejected.  Only a structurally invalid payload fails the frame:
//!
//! - a header unit whose resolution lies outside `16..=4096`,
//! - a payload longer than the configured bound,
//! - a slice referring past the reference window.
//!
//! Slice decoding itself goes through a pluggable [`SliceCodec`].

use std::collections::VecDeque;

use fusion_types::frame::CAMERA_BITS;
use fusion_types::{BitVector, FusionError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Decoded;
use crate::codec::{SliceCodec, XorSliceCodec};

/// Bits of payload below the unit-type tag.
pub const CAMERA_PAYLOAD_BITS: usize = CAMERA_BITS - 8;
/// Unit-type tags the decoder recognises.
pub const ACCEPTED_UNIT_TYPES: [u8; 7] = [1, 2, 5, 6, 7, 8, 9];
/// Maximum depth of the reference-picture window.
pub const MAX_REFERENCE_DEPTH: usize = 16;

const SLICE: u8 = 1;
const IDR: u8 = 5;
const MIN_DIMENSION: u16 = 16;
const MAX_DIMENSION: u16 = 4096;
const DEFAULT_WIDTH: u16 = 1920;
const DEFAULT_HEIGHT: u16 = 1080;

fusion_types::flag_set! {
    /// Camera decoder status.
    pub struct CameraFlags: u8 {
        /// Tag outside the accepted set; decoded as a slice.
        const UNKNOWN_UNIT_TYPE = 0x01;
        const INVALID_RESOLUTION = 0x02;
        const PAYLOAD_OVERSIZE = 0x04;
        const REFERENCE_OUT_OF_RANGE = 0x08;
    }
}

impl CameraFlags {
    /// Flags that zero the frame.
    pub const FATAL: Self = Self::from_bits(
        Self::INVALID_RESOLUTION.bits()
            | Self::PAYLOAD_OVERSIZE.bits()
            | Self::REFERENCE_OUT_OF_RANGE.bits(),
    );
}

fn default_max_payload_bits() -> usize {
    CAMERA_PAYLOAD_BITS
}

fn default_reference_depth() -> usize {
    MAX_REFERENCE_DEPTH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CameraConfig {
    /// Payloads with more significant bits than this are rejected.
    #[serde(default = "default_max_payload_bits")]
    pub max_payload_bits: usize,
    /// Reference window depth; slice reference indices must be below it.
    #[serde(default = "default_reference_depth")]
    pub reference_depth: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            max_payload_bits: default_max_payload_bits(),
            reference_depth: default_reference_depth(),
        }
    }
}

/// Stream parameters carried by header units (tags 7 and 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHeader {
    pub width: u16,
    pub height: u16,
    pub profile: u8,
    pub level: u8,
}

impl StreamHeader {
    /// Read the header fields from a unit payload.  Zero dimensions take the
    /// 1920×1080 defaults.
    pub fn parse(payload: &BitVector) -> Self {
        let width = payload.bits(16, 16) as u16;
        let height = payload.bits(32, 16) as u16;
        Self {
            width: if width == 0 { DEFAULT_WIDTH } else { width },
            height: if height == 0 { DEFAULT_HEIGHT } else { height },
            profile: payload.bits(48, 8) as u8,
            level: payload.bits(56, 8) as u8,
        }
    }

    pub fn is_valid(&self) -> bool {
        let range = MIN_DIMENSION..=MAX_DIMENSION;
        range.contains(&self.width) && range.contains(&self.height)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CameraDecoder
// ────────────────────────────────────────────────────────────────────────────

/// Stateful camera decoder.  Owns the reference window and the active stream
/// header.
pub struct CameraDecoder {
    config: CameraConfig,
    codec: Box<dyn SliceCodec>,
    references: VecDeque<BitVector>,
    header: Option<StreamHeader>,
}

impl CameraDecoder {
    /// Decoder with the placeholder [`XorSliceCodec`].
    pub fn new(config: CameraConfig) -> Result<Self, FusionError> {
        Self::with_codec(config, Box::new(XorSliceCodec::default()))
    }

    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when the reference depth is not in
    /// `1..=16` or the payload bound exceeds the payload width.
    pub fn with_codec(config: CameraConfig, codec: Box<dyn SliceCodec>) -> Result<Self, FusionError> {
        if !(1..=MAX_REFERENCE_DEPTH).contains(&config.reference_depth) {
            return Err(FusionError::InvalidConfig(format!(
                "camera reference depth {} must be in 1..={MAX_REFERENCE_DEPTH}",
                config.reference_depth
            )));
        }
        if config.max_payload_bits > CAMERA_PAYLOAD_BITS {
            return Err(FusionError::InvalidConfig(format!(
                "camera max_payload_bits {} exceeds the {CAMERA_PAYLOAD_BITS}-bit payload",
                config.max_payload_bits
            )));
        }
        Ok(Self {
            config,
            codec,
            references: VecDeque::with_capacity(config.reference_depth),
            header: None,
        })
    }

    /// Header of the most recent valid header unit.
    pub fn active_header(&self) -> Option<StreamHeader> {
        self.header
    }

    /// Number of decoded pictures currently held as references.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Decode one camera unit.
    ///
    /// # Panics
    ///
    /// Panics when `raw` is not 3072 bits wide.
    pub fn decode(&mut self, raw: &BitVector) -> Decoded<CameraFlags> {
        assert_eq!(raw.width(), CAMERA_BITS, "camera unit must be {CAMERA_BITS} bits");
        if raw.is_zero() {
            return Decoded::idle(CAMERA_BITS);
        }

        let tag = raw.bits(CAMERA_PAYLOAD_BITS, 8) as u8;
        let payload = raw.slice(0, CAMERA_PAYLOAD_BITS);
        let mut flags = CameraFlags::NONE;

        let unit_type = if ACCEPTED_UNIT_TYPES.contains(&tag) {
            tag
        } else {
            debug!(tag, "unknown camera unit type, decoding as slice");
            flags |= CameraFlags::UNKNOWN_UNIT_TYPE;
            SLICE
        };

        if payload.significant_bits() > self.config.max_payload_bits {
            return self.reject(flags | CameraFlags::PAYLOAD_OVERSIZE, unit_type);
        }

        let decoded = match unit_type {
            7 | 8 => {
                let header = StreamHeader::parse(&payload);
                if !header.is_valid() {
                    return self.reject(flags | CameraFlags::INVALID_RESOLUTION, unit_type);
                }
                self.header = Some(header);
                payload
            }
            1 | 2 | 5 => {
                let reference = payload.bits(24, 8) as usize;
                if reference >= self.config.reference_depth {
                    return self.reject(flags | CameraFlags::REFERENCE_OUT_OF_RANGE, unit_type);
                }
                if unit_type == IDR {
                    self.references.clear();
                }
                let picture = self.codec.decode_slice(unit_type, &payload);
                assert_eq!(
                    picture.width(),
                    CAMERA_PAYLOAD_BITS,
                    "slice codec must preserve payload width"
                );
                if self.references.len() == self.config.reference_depth {
                    self.references.pop_front();
                }
                self.references.push_back(picture.clone());
                picture
            }
            _ => payload,
        };

        let mut out = BitVector::zero(CAMERA_BITS);
        out.place(0, &decoded);
        out.set_bits(CAMERA_PAYLOAD_BITS, 8, u64::from(unit_type));
        Decoded { payload: out, flags }
    }

    fn reject(&self, flags: CameraFlags, unit_type: u8) -> Decoded<CameraFlags> {
        warn!(unit_type, flags = %flags, "camera unit rejected");
        Decoded {
            payload: BitVector::zero(CAMERA_BITS),
            flags,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(tag: u8, payload: u128) -> BitVector {
        let mut v = BitVector::from_u128(CAMERA_BITS, payload);
        v.set_bits(CAMERA_PAYLOAD_BITS, 8, u64::from(tag));
        v
    }

    fn decoder() -> CameraDecoder {
        CameraDecoder::new(CameraConfig::default()).unwrap()
    }

    #[test]
    fn idle_bus_decodes_to_zero_without_flags() {
        let out = decoder().decode(&BitVector::zero(CAMERA_BITS));
        assert!(out.payload.is_zero());
        assert!(out.flags.is_empty());
    }

    #[test]
    fn slice_applies_codec_and_keeps_tag() {
        let mut dec = decoder();
        let out = dec.decode(&unit(1, 0x0012_EF00));
        assert!(out.flags.is_empty());
        assert_eq!(out.payload.bits(0, 32), 0x0012_EF00 ^ 0xAAAA_AAAA);
        assert_eq!(out.payload.bits(CAMERA_PAYLOAD_BITS, 8), 1);
        assert_eq!(dec.reference_count(), 1);
    }

    #[test]
    fn unknown_tag_decodes_as_slice_with_flag() {
        let out = decoder().decode(&unit(0xFF, 0x1111));
        assert_eq!(out.flags, CameraFlags::UNKNOWN_UNIT_TYPE);
        assert!(!out.flags.intersects(CameraFlags::FATAL));
        assert_eq!(out.payload.bits(CAMERA_PAYLOAD_BITS, 8), 1);
        assert_eq!(out.payload.bits(0, 32), 0x1111 ^ 0xAAAA_AAAA);
    }

    #[test]
    fn header_unit_sets_active_header() {
        let mut dec = decoder();
        let payload = (1280u128 << 16) | (720u128 << 32) | (100u128 << 48) | (40u128 << 56);
        let out = dec.decode(&unit(7, payload));
        assert!(out.flags.is_empty());
        assert_eq!(out.payload.bits(0, 64), payload as u64);
        assert_eq!(
            dec.active_header(),
            Some(StreamHeader {
                width: 1280,
                height: 720,
                profile: 100,
                level: 40
            })
        );
    }

    #[test]
    fn header_zero_dimensions_take_defaults() {
        let mut dec = decoder();
        dec.decode(&unit(8, 0x4200_0000_0000_0000));
        let header = dec.active_header().unwrap();
        assert_eq!((header.width, header.height), (1920, 1080));
    }

    #[test]
    fn header_with_bad_resolution_fails_frame() {
        let mut dec = decoder();
        let out = dec.decode(&unit(7, (8u128 << 16) | (720u128 << 32)));
        assert_eq!(out.flags, CameraFlags::INVALID_RESOLUTION);
        assert!(out.payload.is_zero());
        assert_eq!(dec.active_header(), None);

        let out = dec.decode(&unit(7, (5000u128 << 16) | (720u128 << 32)));
        assert!(out.flags.contains(CameraFlags::INVALID_RESOLUTION));
    }

    #[test]
    fn oversize_payload_fails_frame() {
        let mut dec = CameraDecoder::new(CameraConfig {
            max_payload_bits: 64,
            ..CameraConfig::default()
        })
        .unwrap();
        let mut raw = unit(6, 1);
        raw.set_bits(100, 1, 1);
        let out = dec.decode(&raw);
        assert_eq!(out.flags, CameraFlags::PAYLOAD_OVERSIZE);
        assert!(out.payload.is_zero());
    }

    #[test]
    fn reference_index_must_fit_window() {
        let mut dec = decoder();
        let out = dec.decode(&unit(2, 16u128 << 24));
        assert_eq!(out.flags, CameraFlags::REFERENCE_OUT_OF_RANGE);
        assert!(out.payload.is_zero());
        assert_eq!(dec.reference_count(), 0);

        let out = dec.decode(&unit(2, 15u128 << 24));
        assert!(out.flags.is_empty());
    }

    #[test]
    fn reference_window_is_bounded_and_idr_resets_it() {
        let mut dec = decoder();
        for i in 0..20u128 {
            dec.decode(&unit(1, i + 1));
        }
        assert_eq!(dec.reference_count(), MAX_REFERENCE_DEPTH);
        dec.decode(&unit(5, 0xFEDC_BA98 & 0x00FF_FFFF));
        assert_eq!(dec.reference_count(), 1);
    }

    #[test]
    fn rejected_idr_keeps_reference_window() {
        let mut dec = decoder();
        for i in 0..3u128 {
            dec.decode(&unit(1, i + 1));
        }
        let out = dec.decode(&unit(5, 16u128 << 24));
        assert_eq!(out.flags, CameraFlags::REFERENCE_OUT_OF_RANGE);
        assert_eq!(dec.reference_count(), 3);
    }

    #[test]
    fn passthrough_units_are_unchanged() {
        let out = decoder().decode(&unit(9, 0xDEAD_BEEF));
        assert_eq!(out.payload, unit(9, 0xDEAD_BEEF));
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(
            CameraDecoder::new(CameraConfig {
                reference_depth: 0,
                ..CameraConfig::default()
            })
            .is_err()
        );
        assert!(
            CameraDecoder::new(CameraConfig {
                max_payload_bits: 4000,
                ..CameraConfig::default()
            })
            .is_err()
        );
    }
}
