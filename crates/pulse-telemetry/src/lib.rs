mod metrics;

pub use metrics::{
    CounterSample, HistogramSample, HistogramSummary, MetricsRecorder, MetricsSnapshot,
};

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format for stdout logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "pulse_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    pub log_format: LogFormat,
    /// Whether metrics recording is enabled.
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            log_format: LogFormat::default(),
            metrics_enabled: true,
        }
    }
}

/// Handle returned by [`init_telemetry`]. Owns the metrics recorder.
pub struct TelemetryGuard {
    metrics_recorder: Option<Arc<MetricsRecorder>>,
}

impl TelemetryGuard {
    /// Access the metrics recorder for recording and querying.
    pub fn metrics(&self) -> Option<Arc<MetricsRecorder>> {
        self.metrics_recorder.clone()
    }
}

/// Build the filter directive string from a config, e.g.
/// `info,pulse_llm=debug`.
pub fn filter_directives(config: &TelemetryConfig) -> String {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter_str
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config)));

    let (json_layer, pretty_layer) = match config.log_format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true),
            ),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(tracing_subscriber::fmt::layer().compact().with_target(true)),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    let metrics_recorder = config
        .metrics_enabled
        .then(|| Arc::new(MetricsRecorder::new()));

    TelemetryGuard { metrics_recorder }
}
