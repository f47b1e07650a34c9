//! Temporal alignment – packing of the four decoded sensor buses into one
//! 3840-bit frame, and the adapter that reads them back out.
//!
//! ```text
//! [3839:3328] LiDAR   [3327:256] camera   [255:128] radar   [127:64] reserved   [63:0] IMU
//! ```

use fusion_types::frame::{CAMERA_BITS, IMU_BITS, LIDAR_BITS, RADAR_BITS};
use fusion_types::{BitVector, Sensor};

/// Width of an aligned frame.
pub const ALIGNED_BITS: usize = 3840;

const IMU_OFFSET: usize = 0;
const RADAR_OFFSET: usize = 128;
const CAMERA_OFFSET: usize = 256;
const LIDAR_OFFSET: usize = 3328;

const fn offset(sensor: Sensor) -> usize {
    match sensor {
        Sensor::Camera => CAMERA_OFFSET,
        Sensor::Lidar => LIDAR_OFFSET,
        Sensor::Radar => RADAR_OFFSET,
        Sensor::Imu => IMU_OFFSET,
    }
}

/// Decoded sensor data at fixed offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedFrame(BitVector);

impl AlignedFrame {
    /// The slot of `sensor`, on that sensor's bus width.
    pub fn slot(&self, sensor: Sensor) -> BitVector {
        self.0.slice(offset(sensor), sensor.bus_bits())
    }

    pub fn camera(&self) -> BitVector {
        self.slot(Sensor::Camera)
    }

    pub fn lidar(&self) -> BitVector {
        self.slot(Sensor::Lidar)
    }

    pub fn radar(&self) -> BitVector {
        self.slot(Sensor::Radar)
    }

    pub fn imu(&self) -> BitVector {
        self.slot(Sensor::Imu)
    }

    pub fn as_bits(&self) -> &BitVector {
        &self.0
    }
}

/// Stateless assembler of [`AlignedFrame`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalAlignment;

impl TemporalAlignment {
    /// Place each vector at its fixed offset.
    ///
    /// # Panics
    ///
    /// Panics when a vector does not have its sensor's bus width.
    pub fn align(camera: &BitVector, lidar: &BitVector, radar: &BitVector, imu: &BitVector) -> AlignedFrame {
        let mut frame = BitVector::zero(ALIGNED_BITS);
        for (sensor, v) in [
            (Sensor::Camera, camera),
            (Sensor::Lidar, lidar),
            (Sensor::Radar, radar),
            (Sensor::Imu, imu),
        ] {
            assert_eq!(
                v.width(),
                sensor.bus_bits(),
                "{sensor} slot takes {} bits",
                sensor.bus_bits()
            );
            frame.place(offset(sensor), v);
        }
        AlignedFrame(frame)
    }
}

// Slots must tile the frame without overlapping the reserved gap.
const _: () = assert!(IMU_OFFSET + IMU_BITS <= 64);
const _: () = assert!(RADAR_OFFSET + RADAR_BITS == CAMERA_OFFSET);
const _: () = assert!(CAMERA_OFFSET + CAMERA_BITS == LIDAR_OFFSET);
const _: () = assert!(LIDAR_OFFSET + LIDAR_BITS == ALIGNED_BITS);

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: usize, value: u64) -> BitVector {
        let mut v = BitVector::zero(width);
        v.set_bits(0, 16, value);
        v.set_bits(width - 16, 16, value);
        v
    }

    #[test]
    fn slots_land_at_fixed_offsets() {
        let frame = TemporalAlignment::align(
            &filled(CAMERA_BITS, 0xCAFE),
            &filled(LIDAR_BITS, 0x1D4A),
            &filled(RADAR_BITS, 0x4AD4),
            &filled(IMU_BITS, 0x0111),
        );
        let bits = frame.as_bits();
        assert_eq!(bits.bits(0, 16), 0x0111);
        assert_eq!(bits.bits(48, 16), 0x0111);
        assert_eq!(bits.bits(64, 64), 0, "reserved gap stays zero");
        assert_eq!(bits.bits(128, 16), 0x4AD4);
        assert_eq!(bits.bits(240, 16), 0x4AD4);
        assert_eq!(bits.bits(256, 16), 0xCAFE);
        assert_eq!(bits.bits(3312, 16), 0xCAFE);
        assert_eq!(bits.bits(3328, 16), 0x1D4A);
        assert_eq!(bits.bits(3824, 16), 0x1D4A);
    }

    #[test]
    fn adapter_recovers_every_slot() {
        let camera = filled(CAMERA_BITS, 1);
        let lidar = filled(LIDAR_BITS, 2);
        let radar = filled(RADAR_BITS, 3);
        let imu = filled(IMU_BITS, 4);
        let frame = TemporalAlignment::align(&camera, &lidar, &radar, &imu);
        assert_eq!(frame.camera(), camera);
        assert_eq!(frame.lidar(), lidar);
        assert_eq!(frame.radar(), radar);
        assert_eq!(frame.imu(), imu);
    }

    #[test]
    #[should_panic(expected = "radar slot takes 128 bits")]
    fn wrong_width_panics() {
        TemporalAlignment::align(
            &BitVector::zero(CAMERA_BITS),
            &BitVector::zero(LIDAR_BITS),
            &BitVector::zero(64),
            &BitVector::zero(IMU_BITS),
        );
    }
}
