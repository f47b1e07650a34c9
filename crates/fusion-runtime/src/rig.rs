//! [`RigRunner`] – one fusion pipeline per sensor rig, each on its own task.
//!
//! A rig owns a [`FusionCore`] and the cross-frame decoder state inside it,
//! so frames for one rig are processed strictly in submission order.
//! Independent rigs run concurrently.  Every report is timed and classified
//! against the configured frame deadline before it reaches the caller; the
//! deadline never influences the pipeline itself.
//!
//! # Example
//!
//! ```rust
//! use fusion_runtime::{RigRunner, RuntimeSettings};
//! use fusion_types::SensorFrame;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut runner = RigRunner::spawn(&RuntimeSettings::default(), 2).unwrap();
//! runner.submit(1, SensorFrame::idle(0, 0)).await.unwrap();
//!
//! let out = runner.next_output().await.unwrap();
//! assert_eq!(out.rig, 1);
//! assert!(out.report.tensor.is_zero());
//! runner.shutdown().await.unwrap();
//! # }
//! ```

use std::time::{Duration, Instant};

use fusion_core::{FrameReport, FusionCore};
use fusion_types::{FusionError, SensorFrame};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use crate::settings::RuntimeSettings;

/// Whether a frame finished inside its wall-clock budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineStatus {
    Met,
    Missed,
}

impl DeadlineStatus {
    /// `Met` when `elapsed` does not exceed `deadline`.
    pub fn classify(elapsed: Duration, deadline: Duration) -> Self {
        if elapsed <= deadline {
            DeadlineStatus::Met
        } else {
            DeadlineStatus::Missed
        }
    }
}

/// A frame submitted to a rig.
#[derive(Debug, Clone)]
pub enum RigInput {
    Single(SensorFrame),
    /// Three acquisition replicas, voted before decoding.
    Redundant(Box<[SensorFrame; 3]>),
}

impl From<SensorFrame> for RigInput {
    fn from(frame: SensorFrame) -> Self {
        RigInput::Single(frame)
    }
}

impl From<[SensorFrame; 3]> for RigInput {
    fn from(replicas: [SensorFrame; 3]) -> Self {
        RigInput::Redundant(Box::new(replicas))
    }
}

/// One processed frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RigOutput {
    pub rig: usize,
    /// Position of the frame in the rig's submission order, from zero.
    pub sequence: u64,
    pub report: FrameReport,
    pub elapsed: Duration,
    pub deadline: DeadlineStatus,
}

// ────────────────────────────────────────────────────────────────────────────
// RigRunner
// ────────────────────────────────────────────────────────────────────────────

pub struct RigRunner {
    inputs: Vec<mpsc::Sender<RigInput>>,
    outputs: mpsc::Receiver<RigOutput>,
    tasks: Vec<JoinHandle<()>>,
}

impl RigRunner {
    /// Build `rigs` pipelines from `settings` and spawn one task per rig.
    ///
    /// Must be called from within a Tokio runtime.  Outputs share one
    /// channel of `channel_capacity`; callers that stop draining it
    /// eventually block their own submissions.
    ///
    /// # Errors
    ///
    /// [`FusionError::InvalidConfig`] when `rigs` is zero or the settings do
    /// not validate.
    pub fn spawn(settings: &RuntimeSettings, rigs: usize) -> Result<Self, FusionError> {
        if rigs == 0 {
            return Err(FusionError::InvalidConfig(
                "rig runner needs at least one rig".to_string(),
            ));
        }
        settings.validate()?;
        let cores = (0..rigs)
            .map(|_| FusionCore::new(&settings.pipeline))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::spawn_cores(
            cores,
            Duration::from_micros(settings.frame_deadline_us),
            settings.channel_capacity,
        ))
    }

    /// Spawn one task per pre-built core.  Rig indices follow `cores`.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    pub fn spawn_cores(cores: Vec<FusionCore>, deadline: Duration, capacity: usize) -> Self {
        let (out_tx, outputs) = mpsc::channel(capacity);
        let mut inputs = Vec::with_capacity(cores.len());
        let mut tasks = Vec::with_capacity(cores.len());
        for (rig, core) in cores.into_iter().enumerate() {
            let (tx, rx) = mpsc::channel(capacity);
            let span = info_span!("rig", rig);
            tasks.push(tokio::spawn(
                run_rig(rig, core, deadline, rx, out_tx.clone()).instrument(span),
            ));
            inputs.push(tx);
        }
        Self {
            inputs,
            outputs,
            tasks,
        }
    }

    pub fn rigs(&self) -> usize {
        self.inputs.len()
    }

    /// Queue a frame for `rig`, waiting while its channel is full.
    ///
    /// # Errors
    ///
    /// [`FusionError::Channel`] when `rig` does not exist or its task has
    /// stopped.
    pub async fn submit(&self, rig: usize, input: impl Into<RigInput>) -> Result<(), FusionError> {
        let tx = self
            .inputs
            .get(rig)
            .ok_or_else(|| FusionError::Channel(format!("no rig {rig} (runner has {})", self.inputs.len())))?;
        tx.send(input.into())
            .await
            .map_err(|_| FusionError::Channel(format!("rig {rig} stopped")))
    }

    /// Next processed frame from any rig; `None` once every rig has stopped.
    pub async fn next_output(&mut self) -> Option<RigOutput> {
        self.outputs.recv().await
    }

    /// Close all inputs, let every rig finish its queue and return the
    /// outputs not yet taken.
    ///
    /// # Errors
    ///
    /// [`FusionError::Channel`] when a rig task panicked.
    pub async fn shutdown(self) -> Result<Vec<RigOutput>, FusionError> {
        let Self {
            inputs,
            mut outputs,
            tasks,
        } = self;
        drop(inputs);

        let mut remaining = Vec::new();
        while let Some(output) = outputs.recv().await {
            remaining.push(output);
        }
        for task in tasks {
            task.await
                .map_err(|e| FusionError::Channel(format!("rig task failed: {e}")))?;
        }
        Ok(remaining)
    }
}

async fn run_rig(
    rig: usize,
    mut core: FusionCore,
    deadline: Duration,
    mut inputs: mpsc::Receiver<RigInput>,
    outputs: mpsc::Sender<RigOutput>,
) {
    let mut sequence = 0u64;
    while let Some(input) = inputs.recv().await {
        let start = Instant::now();
        let report = match &input {
            RigInput::Single(frame) => core.process(frame),
            RigInput::Redundant(replicas) => core.process_redundant(replicas),
        };
        let elapsed = start.elapsed();
        let status = DeadlineStatus::classify(elapsed, deadline);
        if status == DeadlineStatus::Missed {
            warn!(
                sequence,
                elapsed_us = elapsed.as_micros() as u64,
                deadline_us = deadline.as_micros() as u64,
                "frame missed its deadline"
            );
        }

        let output = RigOutput {
            rig,
            sequence,
            report,
            elapsed,
            deadline: status,
        };
        if outputs.send(output).await.is_err() {
            debug!("output channel closed; stopping rig");
            break;
        }
        sequence += 1;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
