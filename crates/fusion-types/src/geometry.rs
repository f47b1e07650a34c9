//! Q/K/V lane geometry.
//!
//! Two packings of the 192-bit Q, K and V buses are in use: six 32-bit lanes
//! and twelve 16-bit lanes.  The geometry is chosen once per pipeline
//! instance and shared by the QKV generator, the attention calculator and the
//! feature-fusion stage.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::FusionError;

/// Width of each of the Q, K and V buses.
pub const QKV_BITS: usize = 192;

/// Lane packing of the 192-bit Q/K/V buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum LaneGeometry {
    /// Six signed 32-bit lanes.
    #[default]
    #[serde(rename = "6x32")]
    Wide6x32,
    /// Twelve signed 16-bit lanes.
    #[serde(rename = "12x16")]
    Narrow12x16,
}

impl LaneGeometry {
    /// Number of lanes on each bus.
    pub const fn lanes(self) -> usize {
        match self {
            LaneGeometry::Wide6x32 => 6,
            LaneGeometry::Narrow12x16 => 12,
        }
    }

    /// Width of one lane in bits.
    pub const fn lane_width(self) -> usize {
        match self {
            LaneGeometry::Wide6x32 => 32,
            LaneGeometry::Narrow12x16 => 16,
        }
    }
}

impl fmt::Display for LaneGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.lanes(), self.lane_width())
    }
}

impl FromStr for LaneGeometry {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "6x32" => Ok(LaneGeometry::Wide6x32),
            "12x16" => Ok(LaneGeometry::Narrow12x16),
            other => Err(FusionError::InvalidConfig(format!(
                "unknown lane geometry {other:?} (expected \"6x32\" or \"12x16\")"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_geometries_fill_the_bus() {
        for g in [LaneGeometry::Wide6x32, LaneGeometry::Narrow12x16] {
            assert_eq!(g.lanes() * g.lane_width(), QKV_BITS);
        }
    }

    #[test]
    fn parse_and_display_agree() {
        for g in [LaneGeometry::Wide6x32, LaneGeometry::Narrow12x16] {
            assert_eq!(g.to_string().parse::<LaneGeometry>().unwrap(), g);
        }
        assert!("8x24".parse::<LaneGeometry>().is_err());
    }

    #[test]
    fn serde_names_match_display() {
        let json = serde_json::to_string(&LaneGeometry::Narrow12x16).unwrap();
        assert_eq!(json, "\"12x16\"");
    }
}
