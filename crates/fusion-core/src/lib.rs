//! `fusion-core` – Alignment, Attention & Fusion
//!
//! Turns one decoded frame per sensor into the 2048-bit fused tensor.  Every
//! stage is deterministic bit-exact integer arithmetic: identical inputs and
//! configuration always produce identical tensors and diagnostics.
//!
//! # Modules
//!
//! - [`pipeline`] – [`FusionCore`][pipeline::FusionCore]: the orchestrator,
//!   producing a [`FrameReport`][pipeline::FrameReport] per frame.
//! - [`alignment`] – [`TemporalAlignment`][alignment::TemporalAlignment]:
//!   packs the four decoded buses into one 3840-bit frame.
//! - [`features`] – the [`FeatureExtractor`][features::FeatureExtractor] seam
//!   and the default per-sensor extractors.
//! - [`qkv`] – [`QkvGenerator`][qkv::QkvGenerator]: saturating Q/K/V
//!   projection in either lane geometry.
//! - [`attention`] – [`AttentionCalculator`][attention::AttentionCalculator]:
//!   shifted, biased Q·K dot product.
//! - [`fusion`] – [`FeatureFusion`][fusion::FeatureFusion]: Q16.16 scaling of
//!   the Value bus.
//! - [`compressor`] – [`FusionCompressor`][compressor::FusionCompressor]: the
//!   optional dense tensor projection.
//! - [`latency`] – [`LatencyModel`][latency::LatencyModel]: cycle estimate
//!   per pass.
//! - [`config`] – [`PipelineConfig`][config::PipelineConfig].
//!
//! # Example
//!
//! ```rust
//! use fusion_core::{FusionCore, PipelineConfig};
//! use fusion_types::SensorFrame;
//!
//! let mut core = FusionCore::new(&PipelineConfig::default()).unwrap();
//! let report = core.process(&SensorFrame::idle(1_000, 1_000));
//! assert!(report.tensor.is_zero());
//! assert!(!report.degraded());
//! ```

pub mod alignment;
pub mod attention;
pub mod compressor;
pub mod config;
pub mod features;
pub mod fusion;
pub mod latency;
pub mod pipeline;
pub mod qkv;

pub use alignment::{AlignedFrame, TemporalAlignment};
pub use attention::{AttentionCalculator, AttentionConfig};
pub use compressor::{CompressorWeights, FusionCompressor};
pub use config::{PipelineConfig, TensorLayout, TmrConfig};
pub use features::FeatureExtractor;
pub use fusion::FeatureFusion;
pub use latency::{LatencyEstimate, LatencyModel};
pub use pipeline::{DecoderFlags, FrameDiagnostics, FrameReport, FusionCore, QkvDiagnostics};
pub use qkv::{QkvGenerator, QkvOutput, QkvOverflow, QkvWeights};
