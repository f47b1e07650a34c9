//! Log and trace output for fusion hosts.
//!
//! [`TelemetryConfig`] is the `[telemetry]` table of `fusion.toml`.
//! [`init_tracing`] installs the global subscriber from it once per process:
//!
//! - console events, compact or newline-delimited JSON, filtered by an
//!   `EnvFilter` directive string;
//! - with `span_timing`, one event per closed `process` and `rig` span
//!   carrying its busy and idle time;
//! - with an `otlp_endpoint`, the same spans exported over OTLP/HTTP.
//!   The exported resource names the lane geometry, tensor layout and QKV
//!   redundancy of the pipeline being traced.
//!
//! # Example
//!
//! ```rust,no_run
//! use fusion_runtime::RuntimeSettings;
//! use fusion_runtime::telemetry::init_tracing;
//!
//! let settings = RuntimeSettings::default();
//! let _guard = init_tracing(&settings.telemetry, &settings.pipeline).unwrap();
//! ```

use std::fmt;
use std::str::FromStr;

use fusion_core::PipelineConfig;
use fusion_types::FusionError;
use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const TRACER_NAME: &str = "fusion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    /// Newline-delimited JSON.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(FusionError::Config(format!(
                "unknown log format {other:?} (expected \"compact\" or \"json\")"
            ))),
        }
    }
}

fn default_service_name() -> String {
    "fusion-rig".to_string()
}

fn default_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TelemetryConfig {
    /// `service.name` of exported spans.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// `EnvFilter` directives, e.g. `info,fusion_sensors=debug`.
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log the duration of every closed pipeline and rig span.
    #[serde(default)]
    pub span_timing: bool,

    /// OTLP/HTTP collector base URL.  Export is off when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            filter: default_filter(),
            log_format: LogFormat::default(),
            span_timing: false,
            otlp_endpoint: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscriber installation
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global subscriber described by `config`.
///
/// Hold the returned [`TelemetryGuard`] until the process exits; dropping
/// it flushes the exporter.
///
/// # Errors
///
/// [`FusionError::Config`] when the filter does not parse, the exporter
/// cannot be built, or a global subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig, pipeline: &PipelineConfig) -> Result<TelemetryGuard, FusionError> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| FusionError::Config(format!("invalid log filter {:?}: {e}", config.filter)))?;
    let provider = config
        .otlp_endpoint
        .as_deref()
        .map(|endpoint| build_provider(endpoint, pipeline_resource(config, pipeline)))
        .transpose()?;

    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer(TRACER_NAME)));
    let span_events = if config.span_timing { FmtSpan::CLOSE } else { FmtSpan::NONE };
    let fmt_layer = tracing_subscriber::fmt::layer().with_span_events(span_events);

    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);
    let installed = match config.log_format {
        LogFormat::Compact => registry.with(fmt_layer.compact()).try_init(),
        LogFormat::Json => registry.with(fmt_layer.json()).try_init(),
    };
    installed.map_err(|e| FusionError::Config(format!("tracing subscriber not installed: {e}")))?;

    Ok(TelemetryGuard { provider })
}

/// OTLP resource for spans of one pipeline configuration.
fn pipeline_resource(config: &TelemetryConfig, pipeline: &PipelineConfig) -> Resource {
    let layout = serde_json::to_value(pipeline.tensor_layout)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("fusion.geometry", pipeline.geometry.to_string()),
            KeyValue::new("fusion.tensor_layout", layout),
            KeyValue::new("fusion.qkv_replicas", pipeline.tmr.qkv_replicas),
        ])
        .build()
}

fn build_provider(endpoint: &str, resource: Resource) -> Result<SdkTracerProvider, FusionError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| FusionError::Config(format!("OTLP exporter for {endpoint}: {e}")))?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        // No Tokio runtime is needed at init time.
        .with_simple_exporter(exporter)
        .build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Guard
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the span exporter; flushes it on drop.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    /// Flush and stop the exporter now, reporting a failure instead of
    /// logging it.
    ///
    /// # Errors
    ///
    /// [`FusionError::Config`] when the exporter fails to shut down.
    pub fn shutdown(mut self) -> Result<(), FusionError> {
        match self.provider.take() {
            Some(provider) => provider
                .shutdown()
                .map_err(|e| FusionError::Config(format!("span exporter shutdown: {e}"))),
            None => Ok(()),
        }
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            warn!(error = %e, "span exporter shutdown failed");
        }
    }
}
