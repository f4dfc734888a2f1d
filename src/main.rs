use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pulse_link::{
    ConnectionManager, EventDispatcher, LinkConfig, ReconnectPolicy, ServiceEndpoint, WsTransport,
};
use pulse_settings::{load_settings_from_path, parse_services, settings_path, PulseSettings};
use pulse_telemetry::{init_telemetry, TelemetryConfig};
use pulse_tracker::RequestTracker;

const SUMMARY_INTERVAL: Duration = Duration::from_secs(60);

/// pulse - live view of in-flight requests on one or more backend services
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.pulse/settings.json)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Service to observe as NAME=URL; repeatable, replaces configured services
    #[arg(long = "service", value_name = "NAME=URL")]
    services: Vec<String>,

    /// Maximum number of tracked request records
    #[arg(long)]
    capacity: Option<usize>,

    /// Port for the local status server
    #[arg(long)]
    status_port: Option<u16>,

    /// Do not start the status server
    #[arg(long)]
    no_server: bool,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    let log_level = settings
        .logging
        .level
        .parse::<tracing::Level>()
        .with_context(|| format!("invalid log level: {}", settings.logging.level))?;
    let telemetry = init_telemetry(TelemetryConfig {
        log_level,
        module_levels: Vec::new(),
        json: settings.logging.json,
        recent_log_capacity: settings.logging.recent_capacity,
    })?;

    tracing::info!(
        services = settings.services.len(),
        capacity = settings.tracker.capacity,
        "starting pulse"
    );

    let dispatcher = EventDispatcher::new();
    let tracker = Arc::new(RequestTracker::new(settings.tracker.capacity));
    let _subscription = tracker.attach(&dispatcher);

    let manager = Arc::new(ConnectionManager::new(
        endpoints(&settings),
        link_config(&settings),
        Arc::new(WsTransport),
        Arc::clone(&dispatcher),
        telemetry.metrics(),
    ));

    let _server = if settings.server.enabled {
        let handle = pulse_server::start(
            pulse_server::ServerConfig {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            pulse_server::AppState {
                manager: Arc::clone(&manager),
                tracker: Arc::clone(&tracker),
                logs: telemetry.logs(),
            },
        )
        .await
        .context("failed to start status server")?;
        tracing::info!(port = handle.port, "status server ready");
        Some(handle)
    } else {
        None
    };

    manager.connect_all();

    let mut summary = tokio::time::interval(SUMMARY_INTERVAL);
    summary.tick().await;
    loop {
        tokio::select! {
            _ = summary.tick() => log_summary(&manager, &tracker),
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl+c")?;
                break;
            }
        }
    }

    tracing::info!("shutting down");
    manager.shutdown();
    Ok(())
}

/// Defaults, then file and `PULSE_*` env, then command-line flags.
fn resolve_settings(cli: &Cli) -> anyhow::Result<PulseSettings> {
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    if !cli.services.is_empty() {
        settings.services = parse_services(&cli.services.join(","))?;
    }
    if let Some(capacity) = cli.capacity {
        settings.tracker.capacity = capacity;
    }
    if let Some(port) = cli.status_port {
        settings.server.port = port;
    }
    if cli.no_server {
        settings.server.enabled = false;
    }
    if cli.json_logs {
        settings.logging.json = true;
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }

    settings.validate()?;
    Ok(settings)
}

fn endpoints(settings: &PulseSettings) -> Vec<ServiceEndpoint> {
    settings
        .services
        .iter()
        .map(|s| ServiceEndpoint::new(s.name.as_str(), s.address.as_str()))
        .collect()
}

fn link_config(settings: &PulseSettings) -> LinkConfig {
    let reconnect = &settings.reconnect;
    LinkConfig {
        connect_timeout: settings.connection.connect_timeout(),
        heartbeat_interval: settings.connection.heartbeat_interval(),
        keepalive_payload: settings.connection.keepalive_payload.clone(),
        reconnect: ReconnectPolicy {
            max_attempts: reconnect.max_attempts,
            fast_attempts: reconnect.fast_attempts,
            fast_delay: Duration::from_millis(reconnect.fast_delay_ms),
            backoff_base: Duration::from_millis(reconnect.backoff_base_ms),
        },
    }
}

fn log_summary(manager: &ConnectionManager, tracker: &RequestTracker) {
    let link = manager.stats();
    let requests = tracker.stats();
    tracing::info!(
        open = manager.open_count(),
        services = manager.endpoints().len(),
        tracked = requests.total,
        streaming = requests.streaming,
        completed = requests.completed,
        failed = requests.failed,
        frames = link.frames_received,
        malformed = link.malformed_dropped,
        "summary"
    );
    for status in manager.service_statuses().iter().filter(|s| s.exhausted) {
        tracing::warn!(
            service = %status.service,
            last_error = status.last_error.as_deref().unwrap_or(""),
            "service disconnected, retries exhausted; POST /reconnect to retry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "pulse",
            "--config",
            "/nonexistent/pulse.json",
            "--service",
            "claude=ws://10.0.0.1:3210/ws/realtime",
            "--capacity",
            "20",
            "--no-server",
            "--log-level",
            "debug",
        ]);
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.services.len(), 1);
        assert_eq!(settings.services[0].address, "ws://10.0.0.1:3210/ws/realtime");
        assert_eq!(settings.tracker.capacity, 20);
        assert!(!settings.server.enabled);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_service_flag_is_rejected() {
        let cli = Cli::parse_from([
            "pulse",
            "--config",
            "/nonexistent/pulse.json",
            "--service",
            "claude=http://10.0.0.1",
        ]);
        assert!(resolve_settings(&cli).is_err());
    }

    #[test]
    fn link_config_maps_reconnect_settings() {
        let config = link_config(&PulseSettings::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(endpoints(&PulseSettings::default()).len(), 2);
    }
}
