//! [`PipelineConfig`] – everything a [`FusionCore`][crate::FusionCore] is
//! built from.
//!
//! Every field has a serde default, so an empty document yields the
//! reference configuration: 6×32 geometry, zero weights, default decoder
//! thresholds, attention shift 2, concatenated tensor, no QKV replicas.
//!
//! # Example
//!
//! ```rust
//! use fusion_core::config::{PipelineConfig, TensorLayout};
//! use fusion_types::LaneGeometry;
//!
//! let cfg: PipelineConfig = serde_json::from_str(r#"{ "geometry": "12x16" }"#).unwrap();
//! assert_eq!(cfg.geometry, LaneGeometry::Narrow12x16);
//! assert_eq!(cfg.tensor_layout, TensorLayout::Concatenated);
//! assert_eq!(cfg.qkv_weights().w_q.len(), 12);
//! cfg.validate().unwrap();
//! ```

use fusion_sensors::{CameraConfig, ImuConfig, LidarConfig, PreprocessorConfig, RadarConfig};
use fusion_types::{FusionError, LaneGeometry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::attention::{AttentionConfig, MAX_SHIFT};
use crate::compressor::{CompressorWeights, FusionCompressor};
use crate::latency::LatencyModel;
use crate::qkv::QkvWeights;

/// How the four fused features become the 2048-bit tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// Camera, LiDAR, radar, IMU features at 512-bit offsets.
    #[default]
    Concatenated,
    /// Dense projection through the fusion compressor.
    Compressed,
}

/// Redundancy options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TmrConfig {
    /// Run three QKV replicas and vote their outputs.
    #[serde(default)]
    pub qkv_replicas: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    pub geometry: LaneGeometry,
    /// Projection weights; zero weights for the geometry when absent.
    #[serde(default)]
    pub weights: Option<QkvWeights>,
    #[serde(default)]
    pub preprocessor: PreprocessorConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub lidar: LidarConfig,
    #[serde(default)]
    pub radar: RadarConfig,
    #[serde(default)]
    pub imu: ImuConfig,
    #[serde(default)]
    pub attention: AttentionConfig,
    #[serde(default)]
    pub tmr: TmrConfig,
    #[serde(default)]
    pub tensor_layout: TensorLayout,
    /// Required when `tensor_layout` is `compressed`.
    #[serde(default)]
    pub compressor: Option<CompressorWeights>,
    #[serde(default)]
    pub latency: LatencyModel,
}

impl PipelineConfig {
    /// Configured weights, or zero weights shaped for the geometry.
    pub fn qkv_weights(&self) -> QkvWeights {
        self.weights
            .clone()
            .unwrap_or_else(|| QkvWeights::zeros(self.geometry))
    }

    /// Reject shapes and bounds that cannot be built.
    ///
    /// Decoder and preprocessor bounds are checked by their constructors;
    /// this covers the cross-field rules.
    ///
    /// # Errors
    ///
    /// [`FusionError::WeightShape`] or [`FusionError::InvalidConfig`].
    pub fn validate(&self) -> Result<(), FusionError> {
        self.qkv_weights().validate(self.geometry)?;
        if self.attention.shift > MAX_SHIFT {
            return Err(FusionError::InvalidConfig(format!(
                "attention shift {} exceeds {MAX_SHIFT}",
                self.attention.shift
            )));
        }
        match (&self.compressor, self.tensor_layout) {
            (Some(c), _) => {
                FusionCompressor::new(c)?;
            }
            (None, TensorLayout::Compressed) => {
                return Err(FusionError::InvalidConfig(
                    "compressed tensor layout requires compressor weights".to_string(),
                ));
            }
            (None, TensorLayout::Concatenated) => {}
        }
        if self.latency.clock_mhz == 0 {
            return Err(FusionError::InvalidConfig(
                "latency clock_mhz must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
