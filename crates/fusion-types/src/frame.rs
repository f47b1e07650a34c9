//! Raw multi-sensor frame record and the fixed bus widths.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::FusionError;
use crate::bits::BitVector;

/// Width of the raw camera bus (NAL unit tag + payload).
pub const CAMERA_BITS: usize = 3072;
/// Width of the raw LiDAR bus (header + compressed payload).
pub const LIDAR_BITS: usize = 512;
/// Width of the raw radar bus (range, velocity, angle, intensity).
pub const RADAR_BITS: usize = 128;
/// Width of the raw IMU bus (quaternion w, x, y, z).
pub const IMU_BITS: usize = 64;
/// Width of a normalised / feature vector (16 × 16-bit lanes).
pub const FEATURE_BITS: usize = 256;
/// Width of a fused feature.
pub const FUSED_BITS: usize = 512;
/// Width of the final fused tensor.
pub const TENSOR_BITS: usize = 2048;

/// The four sensor channels of a frame, in tensor order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sensor {
    Camera,
    Lidar,
    Radar,
    Imu,
}

impl Sensor {
    /// All sensors in tensor order.
    pub const ALL: [Sensor; 4] = [Sensor::Camera, Sensor::Lidar, Sensor::Radar, Sensor::Imu];

    /// Width of this sensor's raw bus.
    pub const fn bus_bits(self) -> usize {
        match self {
            Sensor::Camera => CAMERA_BITS,
            Sensor::Lidar => LIDAR_BITS,
            Sensor::Radar => RADAR_BITS,
            Sensor::Imu => IMU_BITS,
        }
    }

    /// Position in [`Sensor::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            Sensor::Camera => "camera",
            Sensor::Lidar => "lidar",
            Sensor::Radar => "radar",
            Sensor::Imu => "imu",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One tick of raw sensor input.
///
/// Construct with [`SensorFrame::new`], which rejects vectors of the wrong
/// width so that per-frame processing never has to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FrameRepr")]
pub struct SensorFrame {
    camera: BitVector,
    lidar: BitVector,
    radar: BitVector,
    imu: BitVector,
    /// Capture time of this frame (microseconds).
    timestamp_us: u64,
    /// Time the frame is to be aligned to (microseconds).
    reference_time_us: u64,
}

impl SensorFrame {
    /// Validate widths and build a frame.
    ///
    /// # Errors
    ///
    /// Returns [`FusionError::WidthMismatch`] naming the first sensor whose
    /// vector does not have its bus width.
    pub fn new(
        camera: BitVector,
        lidar: BitVector,
        radar: BitVector,
        imu: BitVector,
        timestamp_us: u64,
        reference_time_us: u64,
    ) -> Result<Self, FusionError> {
        check_width(Sensor::Camera, &camera)?;
        check_width(Sensor::Lidar, &lidar)?;
        check_width(Sensor::Radar, &radar)?;
        check_width(Sensor::Imu, &imu)?;
        Ok(Self {
            camera,
            lidar,
            radar,
            imu,
            timestamp_us,
            reference_time_us,
        })
    }

    /// A frame in which every sensor is idle (all-zero).
    pub fn idle(timestamp_us: u64, reference_time_us: u64) -> Self {
        Self {
            camera: BitVector::zero(CAMERA_BITS),
            lidar: BitVector::zero(LIDAR_BITS),
            radar: BitVector::zero(RADAR_BITS),
            imu: BitVector::zero(IMU_BITS),
            timestamp_us,
            reference_time_us,
        }
    }

    /// Raw vector of `sensor`.
    pub fn sensor(&self, sensor: Sensor) -> &BitVector {
        match sensor {
            Sensor::Camera => &self.camera,
            Sensor::Lidar => &self.lidar,
            Sensor::Radar => &self.radar,
            Sensor::Imu => &self.imu,
        }
    }

    /// Rebuild the frame with every sensor vector replaced by `f`.
    ///
    /// # Panics
    ///
    /// Panics when `f` returns a vector whose width differs from the
    /// sensor's bus width.
    pub fn map_sensors(&self, mut f: impl FnMut(Sensor, &BitVector) -> BitVector) -> Self {
        let mut apply = |sensor: Sensor| {
            let v = f(sensor, self.sensor(sensor));
            assert_eq!(
                v.width(),
                sensor.bus_bits(),
                "{sensor} vector must stay {} bits wide",
                sensor.bus_bits()
            );
            v
        };
        Self {
            camera: apply(Sensor::Camera),
            lidar: apply(Sensor::Lidar),
            radar: apply(Sensor::Radar),
            imu: apply(Sensor::Imu),
            timestamp_us: self.timestamp_us,
            reference_time_us: self.reference_time_us,
        }
    }

    /// Same frame with different timing.
    pub fn with_timing(mut self, timestamp_us: u64, reference_time_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self.reference_time_us = reference_time_us;
        self
    }

    pub fn camera(&self) -> &BitVector {
        &self.camera
    }

    pub fn lidar(&self) -> &BitVector {
        &self.lidar
    }

    pub fn radar(&self) -> &BitVector {
        &self.radar
    }

    pub fn imu(&self) -> &BitVector {
        &self.imu
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn reference_time_us(&self) -> u64 {
        self.reference_time_us
    }
}

fn check_width(sensor: Sensor, v: &BitVector) -> Result<(), FusionError> {
    let expected = sensor.bus_bits();
    if v.width() == expected {
        Ok(())
    } else {
        Err(FusionError::WidthMismatch {
            what: sensor.name().to_string(),
            expected,
            actual: v.width(),
        })
    }
}

#[derive(Deserialize)]
struct FrameRepr {
    camera: BitVector,
    lidar: BitVector,
    radar: BitVector,
    imu: BitVector,
    timestamp_us: u64,
    reference_time_us: u64,
}

impl TryFrom<FrameRepr> for SensorFrame {
    type Error = FusionError;

    fn try_from(r: FrameRepr) -> Result<Self, Self::Error> {
        SensorFrame::new(r.camera, r.lidar, r.radar, r.imu, r.timestamp_us, r.reference_time_us)
    }
}
