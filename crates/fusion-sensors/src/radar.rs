//! [`RadarFilter`] – correction chain for the 128-bit radar bus.
//!
//! Four 32-bit lanes, most significant first: range (0.1 m), velocity
//! (offset-binary, 0.01 km/h), angle (0.01°) and intensity.  The checks run
//! in a fixed order and may all fire on one measurement.  Only the noise floor
//! discards the frame; everything else corrects and flags.

use fusion_types::frame::RADAR_BITS;
use fusion_types::{BitVector, FusionError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Decoded;

const VELOCITY_ZERO: i64 = 0x8000_0000;
const FULL_CIRCLE: u32 = 36_000;
const MULTIPATH_PERIOD: u32 = 1000;
const MULTIPATH_WINDOW: u32 = 50;
const MULTIPATH_OFFSET: u32 = 50;

fusion_types::flag_set! {
    /// Radar filter status.
    pub struct RadarFlags: u8 {
        const RANGE_CLAMPED = 0x01;
        const DOPPLER_ALIASED = 0x02;
        /// Below the noise floor; the frame is zeroed.
        const LOW_INTENSITY = 0x04;
        const CLUTTER_SUPPRESSED = 0x08;
        const MULTIPATH_CORRECTED = 0x10;
    }
}

impl RadarFlags {
    /// Flags that zero the frame.
    pub const FATAL: Self = Self::LOW_INTENSITY;
}

fn default_max_range() -> u32 {
    3000
}

fn default_max_velocity() -> u32 {
    10_000
}

fn default_noise_threshold() -> u32 {
    0x1000
}

fn default_clutter_velocity() -> u32 {
    100
}

fn default_clutter_intensity() -> u32 {
    0x8000_0000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RadarConfig {
    /// Range ceiling in 0.1 m units (300 m).
    #[serde(default = "default_max_range")]
    pub max_range: u32,
    /// Maximum unambiguous speed in 0.01 km/h units (100 km/h).
    #[serde(default = "default_max_velocity")]
    pub max_velocity: u32,
    /// Intensities below this are noise.
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: u32,
    /// Speeds below this count as stationary for clutter suppression.
    #[serde(default = "default_clutter_velocity")]
    pub clutter_velocity: u32,
    /// Stationary returns brighter than this are attenuated.
    #[serde(default = "default_clutter_intensity")]
    pub clutter_intensity: u32,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            max_range: default_max_range(),
            max_velocity: default_max_velocity(),
            noise_threshold: default_noise_threshold(),
            clutter_velocity: default_clutter_velocity(),
            clutter_intensity: default_clutter_intensity(),
        }
    }
}

/// One decoded radar return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadarMeasurement {
    pub range: u32,
    /// Signed velocity (0.01 km/h).
    pub velocity: i64,
    pub angle: u32,
    pub intensity: u32,
}

impl RadarMeasurement {
    pub fn from_raw(raw: &BitVector) -> Self {
        Self {
            range: raw.bits(96, 32) as u32,
            velocity: raw.bits(64, 32) as i64 - VELOCITY_ZERO,
            angle: raw.bits(32, 32) as u32,
            intensity: raw.bits(0, 32) as u32,
        }
    }

    /// Pack into the 128-bit bus layout.  Velocity is stored offset-binary
    /// and must lie within the signed 32-bit range.
    pub fn to_raw(&self) -> BitVector {
        let mut v = BitVector::zero(RADAR_BITS);
        v.set_bits(96, 32, u64::from(self.range));
        v.set_bits(64, 32, (self.velocity + VELOCITY_ZERO) as u64);
        v.set_bits(32, 32, u64::from(self.angle));
        v.set_bits(0, 32, u64::from(self.intensity));
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadarFilter {
    config: RadarConfig,
}

impl RadarFilter {
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when `max_velocity` is zero.
    pub fn new(config: RadarConfig) -> Result<Self, FusionError> {
        if config.max_velocity == 0 {
            return Err(FusionError::InvalidConfig(
                "radar max_velocity must be positive".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Run the correction chain on one radar frame.
    ///
    /// # Panics
    ///
    /// Panics when `raw` is not 128 bits wide.
    pub fn filter(&self, raw: &BitVector) -> Decoded<RadarFlags> {
        assert_eq!(raw.width(), RADAR_BITS, "radar frame must be {RADAR_BITS} bits");
        if raw.is_zero() {
            return Decoded::idle(RADAR_BITS);
        }

        let cfg = &self.config;
        let mut m = RadarMeasurement::from_raw(raw);
        let mut flags = RadarFlags::NONE;

        let clamped = m.range > cfg.max_range;
        if clamped {
            m.range = cfg.max_range;
            flags |= RadarFlags::RANGE_CLAMPED;
        }

        let max_v = i64::from(cfg.max_velocity);
        if m.velocity.abs() > max_v {
            m.velocity = m.velocity.signum() * (m.velocity.abs() % max_v);
            flags |= RadarFlags::DOPPLER_ALIASED;
        }

        m.angle %= FULL_CIRCLE;

        if m.intensity < cfg.noise_threshold {
            flags |= RadarFlags::LOW_INTENSITY;
        }

        if m.velocity.abs() < i64::from(cfg.clutter_velocity) && m.intensity > cfg.clutter_intensity {
            m.intensity >>= 2;
            flags |= RadarFlags::CLUTTER_SUPPRESSED;
        }

        if !clamped && m.range % MULTIPATH_PERIOD < MULTIPATH_WINDOW {
            m.range = (m.range + MULTIPATH_OFFSET).min(cfg.max_range);
            flags |= RadarFlags::MULTIPATH_CORRECTED;
        }

        if flags.contains(RadarFlags::LOW_INTENSITY) {
            debug!(flags = %flags, intensity = m.intensity, "radar return below noise floor");
            return Decoded {
                payload: BitVector::zero(RADAR_BITS),
                flags,
            };
        }
        if !flags.is_empty() {
            debug!(flags = %flags, range = m.range, velocity = m.velocity, "radar return corrected");
        }
        Decoded {
            payload: m.to_raw(),
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> RadarFilter {
        RadarFilter::new(RadarConfig::default()).unwrap()
    }

    fn measurement(range: u32, velocity: i64, angle: u32, intensity: u32) -> BitVector {
        RadarMeasurement {
            range,
            velocity,
            angle,
            intensity,
        }
        .to_raw()
    }

    #[test]
    fn layout_round_trip() {
        let raw = measurement(1500, -250, 9000, 0x2000);
        assert_eq!(raw.bits(64, 32), 0x8000_0000 - 250);
        assert_eq!(
            RadarMeasurement::from_raw(&raw),
            RadarMeasurement {
                range: 1500,
                velocity: -250,
                angle: 9000,
                intensity: 0x2000
            }
        );
    }

    #[test]
    fn range_beyond_ceiling_is_clamped() {
        let out = filter().filter(&measurement(4000, 500, 0, 0x2000));
        assert_eq!(out.flags, RadarFlags::RANGE_CLAMPED);
        assert_eq!(RadarMeasurement::from_raw(&out.payload).range, 3000);
    }

    #[test]
    fn range_inside_ceiling_passes() {
        let raw = measurement(1500, 500, 0, 0x2000);
        let out = filter().filter(&raw);
        assert!(out.flags.is_empty());
        assert_eq!(out.payload, raw);
    }

    #[test]
    fn excess_velocity_aliases_with_sign() {
        let out = filter().filter(&measurement(1500, -12_345, 0, 0x2000));
        assert_eq!(out.flags, RadarFlags::DOPPLER_ALIASED);
        assert_eq!(RadarMeasurement::from_raw(&out.payload).velocity, -2345);
    }

    #[test]
    fn angle_wraps_silently() {
        let out = filter().filter(&measurement(1500, 500, 36_000 + 4500, 0x2000));
        assert!(out.flags.is_empty());
        assert_eq!(RadarMeasurement::from_raw(&out.payload).angle, 4500);
    }

    #[test]
    fn noise_floor_zeroes_frame_and_keeps_earlier_flags() {
        let out = filter().filter(&measurement(5000, 500, 0, 0x0500));
        assert_eq!(out.flags, RadarFlags::RANGE_CLAMPED | RadarFlags::LOW_INTENSITY);
        assert!(out.payload.is_zero());
    }

    #[test]
    fn noise_floor_still_reports_later_corrections() {
        let out = filter().filter(&measurement(2020, 500, 0, 0x0500));
        assert_eq!(out.flags, RadarFlags::LOW_INTENSITY | RadarFlags::MULTIPATH_CORRECTED);
        assert!(out.payload.is_zero());
    }

    #[test]
    fn bright_stationary_return_is_attenuated() {
        let out = filter().filter(&measurement(1500, 20, 0, 0xC000_0000));
        assert_eq!(out.flags, RadarFlags::CLUTTER_SUPPRESSED);
        assert_eq!(RadarMeasurement::from_raw(&out.payload).intensity, 0x3000_0000);
    }

    #[test]
    fn multipath_nudges_range() {
        let out = filter().filter(&measurement(2020, 500, 0, 0x2000));
        assert_eq!(out.flags, RadarFlags::MULTIPATH_CORRECTED);
        assert_eq!(RadarMeasurement::from_raw(&out.payload).range, 2070);
    }

    #[test]
    fn all_corrections_may_fire_together() {
        let out = filter().filter(&measurement(1010, 10_050, 36_100, 0x9000_0000));
        assert_eq!(
            out.flags,
            RadarFlags::DOPPLER_ALIASED | RadarFlags::CLUTTER_SUPPRESSED | RadarFlags::MULTIPATH_CORRECTED
        );
        let m = RadarMeasurement::from_raw(&out.payload);
        assert_eq!((m.range, m.velocity, m.angle, m.intensity), (1060, 50, 100, 0x2400_0000));
    }

    #[test]
    fn idle_bus_is_silent() {
        let out = filter().filter(&BitVector::zero(RADAR_BITS));
        assert!(out.flags.is_empty());
        assert!(out.payload.is_zero());
    }
}
