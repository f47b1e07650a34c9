//! `fusion-runtime` – Host-side runtime for fusion rigs
//!
//! Everything a process needs around the synchronous pipeline in
//! `fusion-core`: logging and trace export, persisted settings, and a task
//! per sensor rig.
//!
//! # Modules
//!
//! - [`rig`] – [`RigRunner`][rig::RigRunner]: one Tokio task and one
//!   [`FusionCore`][fusion_core::FusionCore] per rig, frames processed in
//!   submission order, every report classified against the frame deadline.
//! - [`settings`] – [`RuntimeSettings`][settings::RuntimeSettings]: TOML
//!   load/save with `FUSION_*` environment overrides and a JSON schema.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber from the `[telemetry]` settings table, with
//!   optional span timing and OTLP export.

pub mod rig;
pub mod settings;
pub mod telemetry;

pub use rig::{DeadlineStatus, RigInput, RigOutput, RigRunner};
pub use settings::RuntimeSettings;
pub use telemetry::{LogFormat, TelemetryConfig, TelemetryGuard, init_tracing};
