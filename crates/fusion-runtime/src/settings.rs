//! Runtime settings – reads and writes a `fusion.toml` document.
//!
//! [`RuntimeSettings`] wraps the [`PipelineConfig`] every rig is built from
//! with the host-side knobs: the per-frame deadline and the channel depth
//! between callers and rig tasks, plus the `[telemetry]` table.  Every field
//! has a default, so a missing or empty file yields a working configuration.

use std::fs;
use std::path::Path;

use fusion_core::PipelineConfig;
use fusion_types::{FusionError, LaneGeometry};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::telemetry::{LogFormat, TelemetryConfig};

/// Environment variables consulted by [`apply_env_overrides`].
pub const OVERRIDE_VARS: [&str; 8] = [
    "FUSION_GEOMETRY",
    "FUSION_ATTENTION_SHIFT",
    "FUSION_QKV_TMR",
    "FUSION_FRAME_DEADLINE_US",
    "FUSION_CHANNEL_CAPACITY",
    "FUSION_LOG_FORMAT",
    "RUST_LOG",
    "OTEL_EXPORTER_OTLP_ENDPOINT",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Wall-clock budget for one frame, in microseconds.
    #[serde(default = "default_frame_deadline_us")]
    pub frame_deadline_us: u64,

    /// Depth of each rig's input channel and of the shared output channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_frame_deadline_us() -> u64 {
    10_000
}
fn default_channel_capacity() -> usize {
    64
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            frame_deadline_us: default_frame_deadline_us(),
            channel_capacity: default_channel_capacity(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl RuntimeSettings {
    /// Validate the pipeline plus the host-side bounds.
    ///
    /// # Errors
    ///
    /// Whatever [`PipelineConfig::validate`] reports, or
    /// [`FusionError::InvalidConfig`] for a zero deadline or capacity.
    pub fn validate(&self) -> Result<(), FusionError> {
        self.pipeline.validate()?;
        if self.frame_deadline_us == 0 {
            return Err(FusionError::InvalidConfig(
                "frame_deadline_us must be positive".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(FusionError::InvalidConfig(
                "channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `path`, applying `FUSION_*` overrides.  Returns
/// `None` when the file does not exist.
///
/// # Errors
///
/// [`FusionError::Config`] when the file cannot be read or parsed.
pub fn load_from(path: &Path) -> Result<Option<RuntimeSettings>, FusionError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| FusionError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut settings = parse(&raw)?;
    apply_env_overrides(&mut settings);
    Ok(Some(settings))
}

/// Parse a TOML document without consulting the environment.
pub fn parse(raw: &str) -> Result<RuntimeSettings, FusionError> {
    toml::from_str(raw).map_err(|e| FusionError::Config(format!("failed to parse settings: {e}")))
}

/// Apply `FUSION_*` environment variable overrides to `settings`.
///
/// | Variable | Field |
/// |---|---|
/// | `FUSION_GEOMETRY` | `pipeline.geometry` (`6x32` or `12x16`) |
/// | `FUSION_ATTENTION_SHIFT` | `pipeline.attention.shift` |
/// | `FUSION_QKV_TMR` | `pipeline.tmr.qkv_replicas` (`true`/`false`/`1`/`0`) |
/// | `FUSION_FRAME_DEADLINE_US` | `frame_deadline_us` |
/// | `FUSION_CHANNEL_CAPACITY` | `channel_capacity` |
/// | `FUSION_LOG_FORMAT` | `telemetry.log_format` (`compact` or `json`) |
/// | `RUST_LOG` | `telemetry.filter` |
/// | `OTEL_EXPORTER_OTLP_ENDPOINT` | `telemetry.otlp_endpoint` |
///
/// Unparseable values are logged and ignored.
pub fn apply_env_overrides(settings: &mut RuntimeSettings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

/// [`apply_env_overrides`] with an explicit variable lookup.
pub fn apply_overrides_from(settings: &mut RuntimeSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("FUSION_GEOMETRY") {
        match v.parse::<LaneGeometry>() {
            Ok(geometry) => settings.pipeline.geometry = geometry,
            Err(e) => ignored("FUSION_GEOMETRY", &v, &e.to_string()),
        }
    }
    if let Some(v) = lookup("FUSION_ATTENTION_SHIFT") {
        match v.trim().parse::<u32>() {
            Ok(shift) => settings.pipeline.attention.shift = shift,
            Err(e) => ignored("FUSION_ATTENTION_SHIFT", &v, &e.to_string()),
        }
    }
    if let Some(v) = lookup("FUSION_QKV_TMR") {
        match v.trim() {
            "1" | "true" => settings.pipeline.tmr.qkv_replicas = true,
            "0" | "false" => settings.pipeline.tmr.qkv_replicas = false,
            _ => ignored("FUSION_QKV_TMR", &v, "expected true, false, 1 or 0"),
        }
    }
    if let Some(v) = lookup("FUSION_FRAME_DEADLINE_US") {
        match v.trim().parse::<u64>() {
            Ok(us) => settings.frame_deadline_us = us,
            Err(e) => ignored("FUSION_FRAME_DEADLINE_US", &v, &e.to_string()),
        }
    }
    if let Some(v) = lookup("FUSION_CHANNEL_CAPACITY") {
        match v.trim().parse::<usize>() {
            Ok(capacity) => settings.channel_capacity = capacity,
            Err(e) => ignored("FUSION_CHANNEL_CAPACITY", &v, &e.to_string()),
        }
    }
    if let Some(v) = lookup("FUSION_LOG_FORMAT") {
        match v.parse::<LogFormat>() {
            Ok(format) => settings.telemetry.log_format = format,
            Err(e) => ignored("FUSION_LOG_FORMAT", &v, &e.to_string()),
        }
    }
    if let Some(v) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
        settings.telemetry.filter = v;
    }
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()) {
        settings.telemetry.otlp_endpoint = Some(v);
    }
}

fn ignored(var: &str, value: &str, reason: &str) {
    warn!(var, value, reason, "ignoring environment override");
}

/// Save `settings` to `path`, creating parent directories.
///
/// On Unix the file is written owner-only (`0o600`).
///
/// # Errors
///
/// [`FusionError::Config`] on serialisation or I/O failure.
pub fn save_to(settings: &RuntimeSettings, path: &Path) -> Result<(), FusionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| FusionError::Config(format!("failed to create {}: {e}", parent.display())))?;
    }
    let raw = toml::to_string_pretty(settings)
        .map_err(|e| FusionError::Config(format!("failed to serialize settings: {e}")))?;
    let write_err = |e: std::io::Error| FusionError::Config(format!("failed to write {}: {e}", path.display()));

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

/// JSON schema of [`RuntimeSettings`], for editors and validators.
pub fn json_schema() -> Result<String, FusionError> {
    let schema = schemars::schema_for!(RuntimeSettings);
    serde_json::to_string_pretty(&schema).map_err(|e| FusionError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roundtrip_default_settings() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("fusion.toml");

        save_to(&RuntimeSettings::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.frame_deadline_us, 10_000);
        assert_eq!(loaded.channel_capacity, 64);
        assert_eq!(loaded.pipeline.geometry, LaneGeometry::Wide6x32);
    }

    #[test]
    fn roundtrip_keeps_weights() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nested").join("fusion.toml");

        let mut settings = RuntimeSettings::default();
        let mut weights = fusion_core::QkvWeights::zeros(LaneGeometry::Wide6x32);
        weights.w_k[3][7] = -42;
        settings.pipeline.weights = Some(weights);
        save_to(&settings, &path).expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert_eq!(parse(&raw).expect("parse"), settings);
    }

    #[cfg(unix)]
    #[test]
    fn settings_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("fusion.toml");

        save_to(&RuntimeSettings::default(), &path).expect("save");
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        assert!(load_from(&dir.path().join("absent.toml")).expect("no error").is_none());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        assert!(matches!(parse("frame_deadline_us = \"soon\""), Err(FusionError::Config(_))));
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let settings = parse(
            r#"
            channel_capacity = 8

            [pipeline]
            geometry = "12x16"

            [pipeline.attention]
            shift = 4

            [telemetry]
            span_timing = true
            "#,
        )
        .expect("parse");
        assert_eq!(settings.channel_capacity, 8);
        assert_eq!(settings.frame_deadline_us, 10_000);
        assert_eq!(settings.pipeline.geometry, LaneGeometry::Narrow12x16);
        assert_eq!(settings.pipeline.attention.shift, 4);
        assert_eq!(settings.pipeline.attention.bias, 0);
        assert!(settings.telemetry.span_timing);
        assert_eq!(settings.telemetry.service_name, "fusion-rig");
        settings.validate().expect("valid");
    }

    #[test]
    fn overrides_apply_every_variable() {
        let mut settings = RuntimeSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("FUSION_GEOMETRY", "12x16"),
                ("FUSION_ATTENTION_SHIFT", "5"),
                ("FUSION_QKV_TMR", "true"),
                ("FUSION_FRAME_DEADLINE_US", "2500"),
                ("FUSION_CHANNEL_CAPACITY", "16"),
                ("FUSION_LOG_FORMAT", "json"),
                ("RUST_LOG", "warn,fusion_core=debug"),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", "http://collector:4318"),
            ]),
        );
        assert_eq!(settings.pipeline.geometry, LaneGeometry::Narrow12x16);
        assert_eq!(settings.pipeline.attention.shift, 5);
        assert!(settings.pipeline.tmr.qkv_replicas);
        assert_eq!(settings.frame_deadline_us, 2500);
        assert_eq!(settings.channel_capacity, 16);
        assert_eq!(settings.telemetry.log_format, LogFormat::Json);
        assert_eq!(settings.telemetry.filter, "warn,fusion_core=debug");
        assert_eq!(settings.telemetry.otlp_endpoint.as_deref(), Some("http://collector:4318"));
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut settings = RuntimeSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("FUSION_GEOMETRY", "8x24"),
                ("FUSION_QKV_TMR", "maybe"),
                ("FUSION_CHANNEL_CAPACITY", "-1"),
                ("FUSION_LOG_FORMAT", "pretty"),
                ("OTEL_EXPORTER_OTLP_ENDPOINT", "  "),
            ]),
        );
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let settings = RuntimeSettings {
            channel_capacity: 0,
            ..RuntimeSettings::default()
        };
        assert!(matches!(settings.validate(), Err(FusionError::InvalidConfig(_))));
    }

    #[test]
    fn schema_names_runtime_fields() {
        let schema = json_schema().expect("schema");
        assert!(schema.contains("frame_deadline_us"));
        assert!(schema.contains("channel_capacity"));
        assert!(schema.contains("pipeline"));
        assert!(schema.contains("otlp_endpoint"));
    }
}
