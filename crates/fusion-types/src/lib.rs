//! `fusion-types` – shared vocabulary of the fusion pipeline.
//!
//! # Modules
//!
//! - [`bits`] – [`BitVector`][bits::BitVector] plus the BitField codec
//!   (`extract_signed`, `extract_unsigned`, `pack_lane`).
//! - [`fixed`] – signed saturation used by every arithmetic stage.
//! - [`geometry`] – [`LaneGeometry`][geometry::LaneGeometry] of the Q/K/V
//!   buses.
//! - [`frame`] – [`SensorFrame`][frame::SensorFrame] and the bus widths.
//! - [`flags`] – the [`flag_set!`] macro for status bitmasks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bits;
pub mod fixed;
pub mod flags;
pub mod frame;
pub mod geometry;

pub use bits::{BitVector, extract_signed, extract_unsigned, pack_lane};
pub use fixed::{Saturated, saturate, signed_bounds};
pub use frame::{Sensor, SensorFrame};
pub use geometry::LaneGeometry;

/// Error type for caller contract violations and runtime plumbing.
///
/// Per-frame processing never returns this: every in-frame condition is
/// reported through status flags instead.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FusionError {
    #[error("Width Mismatch on {what}: expected {expected} bits, got {actual}")]
    WidthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Weight Shape Error on {matrix}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    WeightShape {
        matrix: String,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}
