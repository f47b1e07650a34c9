//! Per-sensor feature extraction to the common 256-bit feature width.
//!
//! The extractors here are deterministic placeholders that only fix the
//! interface: sixteen signed 16-bit lanes per sensor.  A learned extractor
//! plugs in through [`FeatureExtractor`].

use fusion_types::frame::FEATURE_BITS;
use fusion_types::{BitVector, Sensor};

const LANES: usize = 16;
const LANE_BITS: usize = 16;

/// Maps one decoded sensor bus to a 256-bit feature vector.
pub trait FeatureExtractor: Send {
    /// Sensor whose bus this extractor reads.
    fn sensor(&self) -> Sensor;

    /// Extract features from a decoded payload of [`Sensor::bus_bits`] width.
    fn extract(&self, payload: &BitVector) -> BitVector;
}

/// Lane `i` = bits `[192i+15 : 192i]` XOR `0xAAAA`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraFeatures;

/// Lane `i` = bits `[32i+15 : 32i]` XOR `0x5678`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LidarFeatures;

/// Lane `4s + j` = byte `j` of measurement `s` shifted into the high byte,
/// with `s` running range, velocity, angle, intensity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadarFeatures;

/// Lanes 0..4 = quaternion `w, x, y, z`; remaining lanes zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImuFeatures;

fn strided(payload: &BitVector, stride: usize, key: u64) -> BitVector {
    let mut out = BitVector::zero(FEATURE_BITS);
    for lane in 0..LANES {
        out.set_bits(lane * LANE_BITS, LANE_BITS, payload.bits(lane * stride, LANE_BITS) ^ key);
    }
    out
}

impl FeatureExtractor for CameraFeatures {
    fn sensor(&self) -> Sensor {
        Sensor::Camera
    }

    fn extract(&self, payload: &BitVector) -> BitVector {
        strided(payload, 192, 0xAAAA)
    }
}

impl FeatureExtractor for LidarFeatures {
    fn sensor(&self) -> Sensor {
        Sensor::Lidar
    }

    fn extract(&self, payload: &BitVector) -> BitVector {
        strided(payload, 32, 0x5678)
    }
}

impl FeatureExtractor for RadarFeatures {
    fn sensor(&self) -> Sensor {
        Sensor::Radar
    }

    fn extract(&self, payload: &BitVector) -> BitVector {
        let mut out = BitVector::zero(FEATURE_BITS);
        for s in 0..4 {
            // Range sits in the most significant 32-bit lane.
            let measurement = payload.bits((3 - s) * 32, 32);
            for j in 0..4 {
                let byte = (measurement >> (8 * j)) & 0xFF;
                out.set_bits((4 * s + j) * LANE_BITS, LANE_BITS, byte << 8);
            }
        }
        out
    }
}

impl FeatureExtractor for ImuFeatures {
    fn sensor(&self) -> Sensor {
        Sensor::Imu
    }

    fn extract(&self, payload: &BitVector) -> BitVector {
        let mut out = BitVector::zero(FEATURE_BITS);
        out.set_bits(0, 64, payload.bits(0, 64));
        out
    }
}

/// The placeholder extractor set, indexed by [`Sensor::index`].
pub fn default_extractors() -> [Box<dyn FeatureExtractor>; 4] {
    [
        Box::new(CameraFeatures),
        Box::new(LidarFeatures),
        Box::new(RadarFeatures),
        Box::new(ImuFeatures),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_types::frame::{CAMERA_BITS, LIDAR_BITS, RADAR_BITS};

    #[test]
    fn camera_samples_every_192_bits() {
        let mut payload = BitVector::zero(CAMERA_BITS);
        payload.set_bits(0, 16, 0xAAAA);
        payload.set_bits(192 * 15, 16, 0x0001);
        let f = CameraFeatures.extract(&payload);
        assert_eq!(f.bits(0, 16), 0);
        assert_eq!(f.bits(15 * 16, 16), 0xAAAB);
        assert_eq!(f.bits(16, 16), 0xAAAA);
    }

    #[test]
    fn lidar_samples_every_32_bits() {
        let mut payload = BitVector::zero(LIDAR_BITS);
        payload.set_bits(32 * 3, 16, 0x5678);
        let f = LidarFeatures.extract(&payload);
        assert_eq!(f.bits(3 * 16, 16), 0);
        assert_eq!(f.bits(0, 16), 0x5678);
    }

    #[test]
    fn radar_spreads_bytes_into_high_halves() {
        let mut payload = BitVector::zero(RADAR_BITS);
        payload.set_bits(96, 32, 0x0403_0201); // range
        payload.set_bits(0, 32, 0xDDCC_BBAA); // intensity
        let f = RadarFeatures.extract(&payload);
        assert_eq!(f.bits(0, 16), 0x0100);
        assert_eq!(f.bits(3 * 16, 16), 0x0400);
        assert_eq!(f.bits(12 * 16, 16), 0xAA00);
        assert_eq!(f.bits(15 * 16, 16), 0xDD00);
    }

    #[test]
    fn imu_copies_quaternion_lanes() {
        let payload = BitVector::from_u128(64, 0x0004_0003_0002_0001);
        let f = ImuFeatures.extract(&payload);
        assert_eq!(f.bits(0, 64), 0x0004_0003_0002_0001);
        assert_eq!(f.bits(64, 64), 0);
    }

    #[test]
    fn default_set_is_in_sensor_order() {
        for (i, e) in default_extractors().iter().enumerate() {
            assert_eq!(e.sensor().index(), i);
        }
    }
}
