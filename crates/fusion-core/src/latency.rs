//! [`LatencyModel`] – deterministic cycle estimate of one pipeline pass.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_clock_mhz() -> u64 {
    100
}

fn default_decoder_cycles() -> u64 {
    8
}

fn default_alignment_cycles() -> u64 {
    4
}

fn default_feature_cycles() -> u64 {
    12
}

fn default_fusion_cycles() -> u64 {
    6
}

fn default_output_cycles() -> u64 {
    2
}

fn default_vote_cycles() -> u64 {
    1
}

/// Per-stage cycle costs at a fixed clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LatencyModel {
    #[serde(default = "default_clock_mhz")]
    pub clock_mhz: u64,
    #[serde(default = "default_decoder_cycles")]
    pub decoder_cycles: u64,
    #[serde(default = "default_alignment_cycles")]
    pub alignment_cycles: u64,
    #[serde(default = "default_feature_cycles")]
    pub feature_cycles: u64,
    #[serde(default = "default_fusion_cycles")]
    pub fusion_cycles: u64,
    #[serde(default = "default_output_cycles")]
    pub output_cycles: u64,
    /// Added once per voted boundary.
    #[serde(default = "default_vote_cycles")]
    pub vote_cycles: u64,
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self {
            clock_mhz: default_clock_mhz(),
            decoder_cycles: default_decoder_cycles(),
            alignment_cycles: default_alignment_cycles(),
            feature_cycles: default_feature_cycles(),
            fusion_cycles: default_fusion_cycles(),
            output_cycles: default_output_cycles(),
            vote_cycles: default_vote_cycles(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyEstimate {
    pub cycles: u64,
    pub nanos: u64,
}

impl LatencyModel {
    /// Estimate for one frame with `voted_boundaries` TMR votes in the path.
    pub fn estimate(&self, voted_boundaries: u64) -> LatencyEstimate {
        let cycles = self.decoder_cycles
            + self.alignment_cycles
            + self.feature_cycles
            + self.fusion_cycles
            + self.output_cycles
            + voted_boundaries * self.vote_cycles;
        LatencyEstimate {
            cycles,
            nanos: cycles * 1000 / self.clock_mhz.max(1),
        }
    }
}
