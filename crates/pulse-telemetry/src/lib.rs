mod logging;
mod metrics;

pub use logging::{LogQuery, LogRecord, RecentLogLayer, RecentLogs};
pub use metrics::{Labels, MetricSample, MetricType, MetricsRecorder};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "pulse_link" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
    /// How many warn+ records the in-memory ring keeps.
    pub recent_log_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            recent_log_capacity: 200,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("global tracing subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Handles to the in-memory telemetry sinks. Keep it alive for the life of
/// the process.
pub struct TelemetryGuard {
    recent_logs: Arc<RecentLogs>,
    metrics: Arc<MetricsRecorder>,
}

impl TelemetryGuard {
    /// Shared metrics recorder, handed to the components that record into it.
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.metrics)
    }

    /// Recent warn+ log records.
    pub fn logs(&self) -> Arc<RecentLogs> {
        Arc::clone(&self.recent_logs)
    }
}

/// Build the `EnvFilter` directive string for a config.
pub fn filter_directive(config: &TelemetryConfig) -> String {
    let mut filter = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config)));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    let recent_logs = Arc::new(RecentLogs::new(config.recent_log_capacity));
    let recent_layer = RecentLogLayer::new(Arc::clone(&recent_logs));

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .with(recent_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    Ok(TelemetryGuard {
        recent_logs,
        metrics: Arc::new(MetricsRecorder::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_without_overrides() {
        let config = TelemetryConfig::default();
        assert_eq!(filter_directive(&config), "info");
    }

    #[test]
    fn directive_with_module_overrides() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("pulse_link".into(), Level::DEBUG),
                ("pulse_tracker".into(), Level::TRACE),
            ],
            ..Default::default()
        };
        assert_eq!(
            filter_directive(&config),
            "warn,pulse_link=debug,pulse_tracker=trace"
        );
    }

    #[test]
    fn second_init_is_an_error() {
        let _first = init_telemetry(TelemetryConfig::default());
        let second = init_telemetry(TelemetryConfig::default());
        assert!(matches!(second, Err(TelemetryError::AlreadyInitialized(_))));
    }
}
