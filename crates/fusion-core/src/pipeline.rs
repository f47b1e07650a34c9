//! [`FusionCore`] – one pass of the fusion pipeline per frame.
//!
//! ```text
//! decode ─► align ─► extract ─► preprocess ─► QKV (×3 + vote) ─► attention ─► fusion ─► tensor
//! ```
//!
//! Processing never fails.  A decoder that rejects its input contributes a
//! zeroed slot and flags, and the report is marked `degraded`; a decoder
//! that only corrected its input flags it without degrading the frame.  The core owns
//! the only cross-frame state (camera reference window, IMU history), so one
//! instance must see frames in arrival order.

use fusion_safety::{SensorVoteReport, TmrVoter, vote_sensor_frames};
use fusion_sensors::{
    CameraDecoder, CameraFlags, ImuFlags, ImuSynchronizer, LidarDecoder, LidarFlags, RadarFilter, RadarFlags,
    SensorPreprocessor,
};
use fusion_types::frame::{FEATURE_BITS, FUSED_BITS, TENSOR_BITS};
use fusion_types::geometry::QKV_BITS;
use fusion_types::{BitVector, FusionError, Sensor, SensorFrame};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::alignment::{AlignedFrame, TemporalAlignment};
use crate::attention::AttentionCalculator;
use crate::compressor::FusionCompressor;
use crate::config::{PipelineConfig, TensorLayout};
use crate::features::{FeatureExtractor, default_extractors};
use crate::fusion::FeatureFusion;
use crate::latency::{LatencyEstimate, LatencyModel};
use crate::qkv::{QkvGenerator, QkvOutput, QkvOverflow, QkvWeights};

// ────────────────────────────────────────────────────────────────────────────
// Report types
// ────────────────────────────────────────────────────────────────────────────

/// Decoder status of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecoderFlags {
    pub camera: CameraFlags,
    pub lidar: LidarFlags,
    pub radar: RadarFlags,
    pub imu: ImuFlags,
}

impl DecoderFlags {
    pub fn is_empty(&self) -> bool {
        self.camera.is_empty() && self.lidar.is_empty() && self.radar.is_empty() && self.imu.is_empty()
    }

    /// `true` when some decoder zeroed its slot.  Corrections alone (clamps,
    /// renormalisation, unknown camera tags) do not count.
    pub fn any_fatal(&self) -> bool {
        self.camera.intersects(CameraFlags::FATAL)
            || self.lidar.intersects(LidarFlags::FATAL)
            || self.radar.intersects(RadarFlags::FATAL)
            || self.imu.intersects(ImuFlags::FATAL)
    }
}

/// QKV status of one sensor path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QkvDiagnostics {
    pub overflow: QkvOverflow,
    /// Per-lane saturation masks of Q, K and V.
    pub lane_overflow: [u16; 3],
    /// Per-lane voter disagreement masks of Q, K and V (zero without
    /// replicas).
    pub vote_errors: [u16; 3],
}

/// Everything the pipeline flagged for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameDiagnostics {
    pub decoders: DecoderFlags,
    /// Preprocessor clip masks, indexed by [`Sensor::index`].
    pub clipped: [u16; 4],
    /// QKV status, indexed by [`Sensor::index`].
    pub qkv: [QkvDiagnostics; 4],
    /// Present when the frame came from [`FusionCore::process_redundant`].
    pub sensor_vote: Option<SensorVoteReport>,
    /// Set when a decoder zeroed its slot or any voter lacked a majority.
    pub degraded: bool,
}

/// Output of one pipeline pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    pub timestamp_us: u64,
    /// The 2048-bit fused tensor.
    pub tensor: BitVector,
    pub diagnostics: FrameDiagnostics,
    pub latency: LatencyEstimate,
}

impl FrameReport {
    pub fn degraded(&self) -> bool {
        self.diagnostics.degraded
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FusionCore
// ────────────────────────────────────────────────────────────────────────────

pub struct FusionCore {
    preprocessor: SensorPreprocessor,
    camera: CameraDecoder,
    lidar: LidarDecoder,
    radar: RadarFilter,
    imu: ImuSynchronizer,
    extractors: [Box<dyn FeatureExtractor>; 4],
    qkv: QkvStage,
    attention: AttentionCalculator,
    fusion: FeatureFusion,
    layout: TensorLayout,
    compressor: Option<FusionCompressor>,
    latency: LatencyModel,
}

impl FusionCore {
    /// Build every stage from `config`.  With `tmr.qkv_replicas` set, three
    /// identical QKV replicas are voted.
    ///
    /// # Errors
    ///
    /// Any [`FusionError`] raised while validating `config`.
    pub fn new(config: &PipelineConfig) -> Result<Self, FusionError> {
        config.validate()?;
        let weights = config.qkv_weights();
        let qkv = if config.tmr.qkv_replicas {
            QkvStage::replicated(config, [weights.clone(), weights.clone(), weights])?
        } else {
            QkvStage::Single(QkvGenerator::new(config.geometry, &weights)?)
        };
        Self::build(config, qkv)
    }

    /// Build with three independently weighted QKV replicas, voted on every
    /// frame regardless of `tmr.qkv_replicas`.
    pub fn with_qkv_replicas(config: &PipelineConfig, replicas: [QkvWeights; 3]) -> Result<Self, FusionError> {
        config.validate()?;
        let qkv = QkvStage::replicated(config, replicas)?;
        Self::build(config, qkv)
    }

    fn build(config: &PipelineConfig, qkv: QkvStage) -> Result<Self, FusionError> {
        let geometry = config.geometry;
        let compressor = config.compressor.as_ref().map(FusionCompressor::new).transpose()?;
        Ok(Self {
            preprocessor: SensorPreprocessor::new(config.preprocessor)?,
            camera: CameraDecoder::new(config.camera)?,
            lidar: LidarDecoder::new(config.lidar)?,
            radar: RadarFilter::new(config.radar)?,
            imu: ImuSynchronizer::new(config.imu)?,
            extractors: default_extractors(),
            qkv,
            attention: AttentionCalculator::new(geometry, config.attention)?,
            fusion: FeatureFusion::new(geometry),
            layout: config.tensor_layout,
            compressor,
            latency: config.latency,
        })
    }

    /// Replace the extractor of one sensor.
    pub fn set_extractor(&mut self, extractor: Box<dyn FeatureExtractor>) {
        let index = extractor.sensor().index();
        self.extractors[index] = extractor;
    }

    /// Run one frame through the pipeline.
    #[instrument(skip_all, fields(timestamp_us = frame.timestamp_us()))]
    pub fn process(&mut self, frame: &SensorFrame) -> FrameReport {
        self.run(frame, None)
    }

    /// Vote three raw replicas of a frame, then run the voted frame.
    #[instrument(skip_all, fields(timestamp_us = replicas[0].timestamp_us()))]
    pub fn process_redundant(&mut self, replicas: &[SensorFrame; 3]) -> FrameReport {
        let (voted, report) = vote_sensor_frames(replicas);
        self.run(&voted, Some(report))
    }

    fn run(&mut self, frame: &SensorFrame, sensor_vote: Option<SensorVoteReport>) -> FrameReport {
        let mut diagnostics = FrameDiagnostics::default();

        let aligned = self.decode(frame, &mut diagnostics.decoders);

        let mut fused: [BitVector; 4] = std::array::from_fn(|_| BitVector::zero(FUSED_BITS));
        for sensor in Sensor::ALL {
            let i = sensor.index();
            let slot = aligned.slot(sensor);
            let features = if slot.is_zero() {
                BitVector::zero(FEATURE_BITS)
            } else {
                self.extractors[i].extract(&slot)
            };

            let normalised = self.preprocessor.process(&features);
            diagnostics.clipped[i] = normalised.clipped;

            let (qkv, vote_errors) = self.qkv.generate(&normalised.vector);
            diagnostics.qkv[i] = QkvDiagnostics {
                overflow: qkv.summary,
                lane_overflow: [qkv.q_overflow, qkv.k_overflow, qkv.v_overflow],
                vote_errors,
            };
            if vote_errors.iter().any(|m| *m != 0) {
                warn!(%sensor, q = vote_errors[0], k = vote_errors[1], v = vote_errors[2], "qkv replicas disagree");
            }

            let weight = self.attention.score(&qkv.q, &qkv.k);
            fused[i] = self.fusion.fuse(weight, &qkv.v);
        }

        let tensor = self.assemble(&fused);

        let voter_errors = diagnostics.qkv.iter().any(|d| d.vote_errors.iter().any(|m| *m != 0))
            || sensor_vote.as_ref().is_some_and(|r| !r.is_clean());
        diagnostics.degraded = diagnostics.decoders.any_fatal() || voter_errors;
        diagnostics.sensor_vote = sensor_vote;

        let boundaries = u64::from(self.qkv.is_replicated()) + u64::from(diagnostics.sensor_vote.is_some());
        let latency = self.latency.estimate(boundaries);
        if diagnostics.degraded {
            debug!(decoders = ?diagnostics.decoders, "frame degraded");
        }
        FrameReport {
            timestamp_us: frame.timestamp_us(),
            tensor,
            diagnostics,
            latency,
        }
    }

    fn decode(&mut self, frame: &SensorFrame, flags: &mut DecoderFlags) -> AlignedFrame {
        let camera = self.camera.decode(frame.camera());
        let lidar = self.lidar.decode(frame.lidar());
        let radar = self.radar.filter(frame.radar());
        let imu = self
            .imu
            .synchronize(frame.imu(), frame.timestamp_us(), frame.reference_time_us());
        *flags = DecoderFlags {
            camera: camera.flags,
            lidar: lidar.flags,
            radar: radar.flags,
            imu: imu.flags,
        };
        TemporalAlignment::align(&camera.payload, &lidar.payload, &radar.payload, &imu.payload)
    }

    fn assemble(&self, fused: &[BitVector; 4]) -> BitVector {
        match (self.layout, &self.compressor) {
            (TensorLayout::Compressed, Some(c)) => c.compress(fused),
            _ => {
                let mut tensor = BitVector::zero(TENSOR_BITS);
                for (i, f) in fused.iter().enumerate() {
                    tensor.place(i * FUSED_BITS, f);
                }
                tensor
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// QKV stage
// ────────────────────────────────────────────────────────────────────────────

enum QkvStage {
    Single(QkvGenerator),
    Replicated {
        replicas: [QkvGenerator; 3],
        voter: TmrVoter,
    },
}

impl QkvStage {
    fn replicated(config: &PipelineConfig, weights: [QkvWeights; 3]) -> Result<Self, FusionError> {
        let geometry = config.geometry;
        let [a, b, c] = weights;
        Ok(Self::Replicated {
            replicas: [
                QkvGenerator::new(geometry, &a)?,
                QkvGenerator::new(geometry, &b)?,
                QkvGenerator::new(geometry, &c)?,
            ],
            voter: TmrVoter::new(QKV_BITS, geometry.lane_width())?,
        })
    }

    fn is_replicated(&self) -> bool {
        matches!(self, Self::Replicated { .. })
    }

    /// Project `x`; with replicas, vote Q, K and V lane by lane.  Each
    /// lane's saturation bit is voted 2-of-3 alongside its value.
    fn generate(&self, x: &BitVector) -> (QkvOutput, [u16; 3]) {
        match self {
            Self::Single(generator) => (generator.generate(x), [0; 3]),
            Self::Replicated { replicas, voter } => {
                let [a, b, c] = replicas.each_ref().map(|g| g.generate(x));
                let q = voter.vote(&a.q, &b.q, &c.q);
                let k = voter.vote(&a.k, &b.k, &c.k);
                let v = voter.vote(&a.v, &b.v, &c.v);
                let lanes = voter.lanes();
                let errors = [&q, &k, &v].map(|vote| vote.errors.bits(0, lanes) as u16);
                let q_overflow = majority(a.q_overflow, b.q_overflow, c.q_overflow);
                let k_overflow = majority(a.k_overflow, b.k_overflow, c.k_overflow);
                let v_overflow = majority(a.v_overflow, b.v_overflow, c.v_overflow);
                let voted = QkvOutput {
                    q: q.voted,
                    k: k.voted,
                    v: v.voted,
                    q_overflow,
                    k_overflow,
                    v_overflow,
                    summary: QkvOverflow::from_masks(q_overflow, k_overflow, v_overflow),
                };
                (voted, errors)
            }
        }
    }
}

/// Bitwise 2-of-3.
fn majority(a: u16, b: u16, c: u16) -> u16 {
    (a & b) | (b & c) | (a & c)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
