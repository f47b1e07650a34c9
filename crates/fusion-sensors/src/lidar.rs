//! [`LidarDecoder`] – header validation and payload decompression for the
//! 512-bit LiDAR bus.
//!
//! ```text
//! [511:480] magic  [479:476] mode  [475:460] point count  [459:0] payload
//! ```
//!
//! Any header violation zeroes the whole frame.  On success the header bits
//! are preserved and the payload is replaced by the codec output.

use fusion_types::frame::LIDAR_BITS;
use fusion_types::{BitVector, FusionError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Decoded;
use crate::codec::{CodecFault, PointCloudCodec, XorPointCloudCodec};

/// Stream magic (`"LIDA"`).
pub const LIDAR_MAGIC: u32 = 0x4C49_4441;
/// Width of the compressed payload below the header.
pub const LIDAR_PAYLOAD_BITS: usize = 460;
/// Hard ceiling on the declared point count.
pub const MAX_POINT_COUNT: u16 = 32767;

fusion_types::flag_set! {
    /// LiDAR decoder status.  Every flag is fatal.
    pub struct LidarFlags: u8 {
        const INVALID_MAGIC = 0x01;
        const UNSUPPORTED_MODE = 0x02;
        const EXCESSIVE_POINTS = 0x04;
        const EMPTY_CLOUD = 0x08;
        const CORRUPT_ENTROPY_CODE = 0x10;
        const DECODER_OVERFLOW = 0x20;
    }
}

impl From<CodecFault> for LidarFlags {
    fn from(fault: CodecFault) -> Self {
        match fault {
            CodecFault::CorruptEntropyCode => LidarFlags::CORRUPT_ENTROPY_CODE,
            CodecFault::DecoderOverflow => LidarFlags::DECODER_OVERFLOW,
        }
    }
}

impl LidarFlags {
    pub const FATAL: Self = Self::from_bits(0x3F);
}

fn default_max_points() -> u16 {
    MAX_POINT_COUNT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LidarConfig {
    /// Point counts above this are rejected.
    #[serde(default = "default_max_points")]
    pub max_points: u16,
}

impl Default for LidarConfig {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
        }
    }
}

/// The 32-bit stream header plus point count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LidarHeader {
    pub magic: u32,
    pub mode: u8,
    pub point_count: u16,
}

impl LidarHeader {
    pub fn parse(raw: &BitVector) -> Self {
        Self {
            magic: raw.bits(480, 32) as u32,
            mode: raw.bits(476, 4) as u8,
            point_count: raw.bits(460, 16) as u16,
        }
    }
}

pub struct LidarDecoder {
    config: LidarConfig,
    codec: Box<dyn PointCloudCodec>,
}

impl LidarDecoder {
    /// Decoder with the placeholder [`XorPointCloudCodec`].
    pub fn new(config: LidarConfig) -> Result<Self, FusionError> {
        Self::with_codec(config, Box::new(XorPointCloudCodec))
    }

    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when `max_points` is zero.
    pub fn with_codec(config: LidarConfig, codec: Box<dyn PointCloudCodec>) -> Result<Self, FusionError> {
        if config.max_points == 0 {
            return Err(FusionError::InvalidConfig(
                "lidar max_points must be positive".to_string(),
            ));
        }
        Ok(Self { config, codec })
    }

    /// Decode one LiDAR frame.
    ///
    /// # Panics
    ///
    /// Panics when `raw` is not 512 bits wide.
    pub fn decode(&self, raw: &BitVector) -> Decoded<LidarFlags> {
        assert_eq!(raw.width(), LIDAR_BITS, "lidar frame must be {LIDAR_BITS} bits");
        if raw.is_zero() {
            return Decoded::idle(LIDAR_BITS);
        }

        let header = LidarHeader::parse(raw);
        if header.magic != LIDAR_MAGIC {
            return reject(LidarFlags::INVALID_MAGIC, &header);
        }

        let mut flags = LidarFlags::NONE;
        if !self.codec.supports(header.mode) {
            flags |= LidarFlags::UNSUPPORTED_MODE;
        }
        if header.point_count > self.config.max_points {
            flags |= LidarFlags::EXCESSIVE_POINTS;
        }
        if header.point_count == 0 {
            flags |= LidarFlags::EMPTY_CLOUD;
        }
        if !flags.is_empty() {
            return reject(flags, &header);
        }

        let payload = raw.slice(0, LIDAR_PAYLOAD_BITS);
        match self.codec.decode(header.mode, &payload) {
            Ok(points) => {
                assert_eq!(
                    points.width(),
                    LIDAR_PAYLOAD_BITS,
                    "point-cloud codec must preserve payload width"
                );
                let mut out = raw.clone();
                out.place(0, &points);
                Decoded {
                    payload: out,
                    flags,
                }
            }
            Err(fault) => {
                warn!(mode = header.mode, %fault, "lidar payload undecodable");
                reject(fault.into(), &header)
            }
        }
    }
}

fn reject(flags: LidarFlags, header: &LidarHeader) -> Decoded<LidarFlags> {
    warn!(
        magic = header.magic,
        mode = header.mode,
        points = header.point_count,
        flags = %flags,
        "lidar frame rejected"
    );
    Decoded {
        payload: BitVector::zero(LIDAR_BITS),
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(magic: u32, mode: u8, points: u16, payload: u128) -> BitVector {
        let mut v = BitVector::from_u128(LIDAR_BITS, payload);
        v.set_bits(480, 32, u64::from(magic));
        v.set_bits(476, 4, u64::from(mode));
        v.set_bits(460, 16, u64::from(points));
        v
    }

    fn decoder() -> LidarDecoder {
        LidarDecoder::new(LidarConfig::default()).unwrap()
    }

    #[test]
    fn raw_mode_preserves_frame() {
        let raw = frame(LIDAR_MAGIC, 0, 1000, 0xABCD_EF00);
        let out = decoder().decode(&raw);
        assert!(out.flags.is_empty());
        assert_eq!(out.payload, raw);
    }

    #[test]
    fn entropy_modes_transform_payload_and_keep_header() {
        let out = decoder().decode(&frame(LIDAR_MAGIC, 1, 10, 0x1234_5678));
        assert!(out.flags.is_empty());
        assert_eq!(out.payload.bits(0, 32), 0);
        assert_eq!(out.payload.bits(480, 32), u64::from(LIDAR_MAGIC));

        let out = decoder().decode(&frame(LIDAR_MAGIC, 2, 10, 0x8765_4321));
        assert_eq!(out.payload.bits(0, 32), 0);
        assert_eq!(out.payload.bits(460, 16), 10);
    }

    #[test]
    fn wrong_magic_rejects_any_payload() {
        for payload in [0u128, 1, 0x1111_1111, u128::MAX] {
            let out = decoder().decode(&frame(0x1234_5678, 0, 100, payload));
            assert_eq!(out.flags, LidarFlags::INVALID_MAGIC);
            assert!(out.payload.is_zero());
        }
    }

    #[test]
    fn header_violations_accumulate() {
        let out = decoder().decode(&frame(LIDAR_MAGIC, 7, 40000, 1));
        assert_eq!(out.flags, LidarFlags::UNSUPPORTED_MODE | LidarFlags::EXCESSIVE_POINTS);
        assert!(out.payload.is_zero());

        let out = decoder().decode(&frame(LIDAR_MAGIC, 0, 0, 1));
        assert_eq!(out.flags, LidarFlags::EMPTY_CLOUD);
    }

    #[test]
    fn point_count_ceiling_is_inclusive() {
        let out = decoder().decode(&frame(LIDAR_MAGIC, 0, 32767, 1));
        assert!(out.flags.is_empty());
        let out = decoder().decode(&frame(LIDAR_MAGIC, 0, 32768, 1));
        assert_eq!(out.flags, LidarFlags::EXCESSIVE_POINTS);
    }

    #[test]
    fn codec_fault_maps_to_flag() {
        let out = decoder().decode(&frame(LIDAR_MAGIC, 1, 10, 0xFFFF_0000));
        assert_eq!(out.flags, LidarFlags::CORRUPT_ENTROPY_CODE);
        assert!(out.payload.is_zero());
    }

    #[test]
    fn idle_bus_is_not_rejected() {
        let out = decoder().decode(&BitVector::zero(LIDAR_BITS));
        assert!(out.flags.is_empty());
        assert!(out.payload.is_zero());
    }
}
