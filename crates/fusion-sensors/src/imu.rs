//! [`ImuSynchronizer`] – time alignment of IMU quaternions.
//!
//! The 64-bit bus carries a Q1.15 quaternion (lane 0 = w, then x, y, z).
//! Each sample arrives with its system timestamp and the reference time it is
//! to be aligned to.  The synchroniser is the one decoder that may drop a
//! frame: excessive clock drift, a full history FIFO or a time offset past
//! the interpolation ceiling all yield a zero quaternion.
//!
//! Offsets are interpolated toward zero with integer arithmetic (truncation
//! toward zero):
//!
//! | offset | action |
//! |---|---|
//! | ≤ 1 ms | pass through |
//! | ≤ 50 ms | `q · (50 ms − d) / 50 ms` |
//! | ≤ 200 ms | `q · (200 ms − d) / 200 ms`, boundary flag |
//! | beyond | fail |
//!
//! Only accepted samples enter the history.  The FIFO holds `fifo_depth`
//! samples per `retire_window_us`, so a steady stream faster than that
//! (320 Hz with the defaults) drops a frame whenever the window is full.

use std::collections::VecDeque;

use fusion_types::frame::IMU_BITS;
use fusion_types::{BitVector, FusionError, saturate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Decoded;

/// Full-scale Q1.15 magnitude.
pub const UNIT_SCALE: i64 = 32767;
const LANE_BITS: usize = 16;

fusion_types::flag_set! {
    /// IMU synchroniser status.
    pub struct ImuFlags: u8 {
        /// System clock too far from the reference; frame dropped.
        const EXCESSIVE_DRIFT = 0x01;
        /// Quaternion renormalised to unit scale.
        const DENORMALIZED = 0x02;
        /// History FIFO full; frame dropped.
        const FIFO_OVERFLOW = 0x04;
        const INTERPOLATION_BOUNDARY = 0x08;
        /// Offset beyond the interpolation ceiling; frame dropped.
        const INTERPOLATION_FAILED = 0x10;
        const HIGH_ANGULAR_RATE = 0x20;
    }
}

impl ImuFlags {
    /// Flags that zero the frame.
    pub const FATAL: Self = Self::from_bits(
        Self::EXCESSIVE_DRIFT.bits() | Self::FIFO_OVERFLOW.bits() | Self::INTERPOLATION_FAILED.bits(),
    );
}

fn default_drift_ceiling_us() -> u64 {
    100_000
}

fn default_passthrough_us() -> u64 {
    1_000
}

fn default_interpolation_window_us() -> u64 {
    50_000
}

fn default_interpolation_ceiling_us() -> u64 {
    200_000
}

fn default_retire_window_us() -> u64 {
    50_000
}

fn default_fifo_depth() -> usize {
    16
}

fn default_denorm_tolerance() -> i64 {
    4096
}

fn default_angular_rate_threshold() -> i64 {
    16384
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImuConfig {
    /// Maximum |system − reference| before the frame is dropped.
    #[serde(default = "default_drift_ceiling_us")]
    pub drift_ceiling_us: u64,
    #[serde(default = "default_passthrough_us")]
    pub passthrough_us: u64,
    #[serde(default = "default_interpolation_window_us")]
    pub interpolation_window_us: u64,
    #[serde(default = "default_interpolation_ceiling_us")]
    pub interpolation_ceiling_us: u64,
    /// History samples older than this before the reference are retired.
    #[serde(default = "default_retire_window_us")]
    pub retire_window_us: u64,
    /// History depth.  Bounds the sustained rate at `fifo_depth` samples per
    /// retire window; faster streams see `FIFO_OVERFLOW`.
    #[serde(default = "default_fifo_depth")]
    pub fifo_depth: usize,
    /// Allowed deviation of the magnitude from [`UNIT_SCALE`], as a root.
    #[serde(default = "default_denorm_tolerance")]
    pub denorm_tolerance: i64,
    /// Per-component jump from the previous sample that counts as a
    /// high angular rate.
    #[serde(default = "default_angular_rate_threshold")]
    pub angular_rate_threshold: i64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            drift_ceiling_us: default_drift_ceiling_us(),
            passthrough_us: default_passthrough_us(),
            interpolation_window_us: default_interpolation_window_us(),
            interpolation_ceiling_us: default_interpolation_ceiling_us(),
            retire_window_us: default_retire_window_us(),
            fifo_depth: default_fifo_depth(),
            denorm_tolerance: default_denorm_tolerance(),
            angular_rate_threshold: default_angular_rate_threshold(),
        }
    }
}

/// One quaternion sample kept in the history FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImuSample {
    pub timestamp_us: u64,
    /// `[w, x, y, z]` in Q1.15.
    pub quaternion: [i64; 4],
}

pub struct ImuSynchronizer {
    config: ImuConfig,
    history: VecDeque<ImuSample>,
}

impl ImuSynchronizer {
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when the windows are not ordered
    /// `passthrough < interpolation window < interpolation ceiling` or the
    /// FIFO depth is zero.
    pub fn new(config: ImuConfig) -> Result<Self, FusionError> {
        if !(config.passthrough_us < config.interpolation_window_us
            && config.interpolation_window_us < config.interpolation_ceiling_us)
        {
            return Err(FusionError::InvalidConfig(format!(
                "imu windows must satisfy {} < {} < {}",
                config.passthrough_us, config.interpolation_window_us, config.interpolation_ceiling_us
            )));
        }
        if config.fifo_depth == 0 {
            return Err(FusionError::InvalidConfig(
                "imu fifo_depth must be positive".to_string(),
            ));
        }
        Ok(Self {
            config,
            history: VecDeque::with_capacity(config.fifo_depth),
        })
    }

    /// Samples currently held in the history FIFO.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Most recent accepted sample.
    pub fn last_sample(&self) -> Option<&ImuSample> {
        self.history.back()
    }

    /// Align one quaternion captured at `system_time_us` to
    /// `desired_time_us`.
    ///
    /// # Panics
    ///
    /// Panics when `raw` is not 64 bits wide.
    pub fn synchronize(&mut self, raw: &BitVector, system_time_us: u64, desired_time_us: u64) -> Decoded<ImuFlags> {
        assert_eq!(raw.width(), IMU_BITS, "imu sample must be {IMU_BITS} bits");
        if raw.is_zero() {
            return Decoded::idle(IMU_BITS);
        }

        let cfg = self.config;
        let diff = system_time_us.abs_diff(desired_time_us);
        if diff > cfg.drift_ceiling_us {
            return drop_frame(ImuFlags::EXCESSIVE_DRIFT, diff);
        }

        let horizon = desired_time_us.saturating_sub(cfg.retire_window_us);
        while self.history.front().is_some_and(|s| s.timestamp_us < horizon) {
            self.history.pop_front();
        }
        if self.history.len() >= cfg.fifo_depth {
            return drop_frame(ImuFlags::FIFO_OVERFLOW, diff);
        }

        let mut flags = ImuFlags::NONE;
        let mut q: [i64; 4] = std::array::from_fn(|lane| raw.lane(lane, LANE_BITS));

        let magnitude_sq: i64 = q.iter().map(|c| c * c).sum();
        let unit_sq = UNIT_SCALE * UNIT_SCALE;
        if (magnitude_sq - unit_sq).abs() > cfg.denorm_tolerance * cfg.denorm_tolerance {
            let magnitude = magnitude_sq.isqrt();
            if magnitude > 0 {
                q = q.map(|c| saturate(i128::from(c * UNIT_SCALE / magnitude), LANE_BITS).value);
            }
            flags |= ImuFlags::DENORMALIZED;
        }

        if let Some(prev) = self.history.back()
            && q
                .iter()
                .zip(prev.quaternion.iter())
                .any(|(a, b)| (a - b).abs() > cfg.angular_rate_threshold)
        {
            flags |= ImuFlags::HIGH_ANGULAR_RATE;
        }

        let (numerator, denominator) = if diff <= cfg.passthrough_us {
            (1, 1)
        } else if diff <= cfg.interpolation_window_us {
            (cfg.interpolation_window_us - diff, cfg.interpolation_window_us)
        } else if diff <= cfg.interpolation_ceiling_us {
            flags |= ImuFlags::INTERPOLATION_BOUNDARY;
            (cfg.interpolation_ceiling_us - diff, cfg.interpolation_ceiling_us)
        } else {
            return drop_frame(flags | ImuFlags::INTERPOLATION_FAILED, diff);
        };
        self.history.push_back(ImuSample {
            timestamp_us: system_time_us,
            quaternion: q,
        });

        let mut out = BitVector::zero(IMU_BITS);
        for (lane, c) in q.iter().enumerate() {
            let scaled = i128::from(*c) * i128::from(numerator) / i128::from(denominator);
            out.set_lane(lane, LANE_BITS, scaled as i64);
        }
        if !flags.is_empty() {
            debug!(flags = %flags, offset_us = diff, "imu sample corrected");
        }
        Decoded { payload: out, flags }
    }
}

fn drop_frame(flags: ImuFlags, offset_us: u64) -> Decoded<ImuFlags> {
    warn!(flags = %flags, offset_us, "imu sample dropped");
    Decoded {
        payload: BitVector::zero(IMU_BITS),
        flags,
    }
}
