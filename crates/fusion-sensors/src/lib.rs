//! `fusion-sensors` – Decoding & Normalisation
//!
//! Per-sensor front end of the fusion pipeline.  Every stage here is total:
//! malformed input produces a defined payload plus status flags, never an
//! error.
//!
//! # Modules
//!
//! - [`preprocessor`] – [`SensorPreprocessor`][preprocessor::SensorPreprocessor]:
//!   lane-wise clipping of 256-bit vectors with a clip mask.
//! - [`camera`] – [`CameraDecoder`][camera::CameraDecoder]: NAL-unit tag
//!   resolution, header validation and a bounded reference window.
//! - [`lidar`] – [`LidarDecoder`][lidar::LidarDecoder]: stream header checks
//!   and per-mode payload decompression.
//! - [`radar`] – [`RadarFilter`][radar::RadarFilter]: range clamp, Doppler
//!   de-aliasing, noise floor, clutter and multipath corrections.
//! - [`imu`] – [`ImuSynchronizer`][imu::ImuSynchronizer]: drift check,
//!   history FIFO, renormalisation and time interpolation.
//! - [`codec`] – the pluggable [`SliceCodec`][codec::SliceCodec] and
//!   [`PointCloudCodec`][codec::PointCloudCodec] traits.

use fusion_types::BitVector;
use serde::{Deserialize, Serialize};

pub mod camera;
pub mod codec;
pub mod imu;
pub mod lidar;
pub mod preprocessor;
pub mod radar;

pub use camera::{CameraConfig, CameraDecoder, CameraFlags};
pub use imu::{ImuConfig, ImuFlags, ImuSynchronizer};
pub use lidar::{LidarConfig, LidarDecoder, LidarFlags};
pub use preprocessor::{Preprocessed, PreprocessorConfig, SensorPreprocessor};
pub use radar::{RadarConfig, RadarFilter, RadarFlags};

/// Output of one decoder: the payload on the sensor's bus width and the
/// decoder's status flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded<F> {
    pub payload: BitVector,
    pub flags: F,
}

impl<F: Default> Decoded<F> {
    /// All-zero payload with no flags, emitted for an idle sensor.
    pub fn idle(width: usize) -> Self {
        Self {
            payload: BitVector::zero(width),
            flags: F::default(),
        }
    }
}
