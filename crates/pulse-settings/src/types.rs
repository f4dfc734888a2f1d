//! Settings types. All structs serialize with camelCase keys and fill
//! missing fields from their `Default`.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseSettings {
    /// Backend services to observe, one persistent connection each.
    pub services: Vec<ServiceSettings>,
    pub tracker: TrackerSettings,
    pub connection: ConnectionSettings,
    pub reconnect: ReconnectSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl Default for PulseSettings {
    fn default() -> Self {
        Self {
            services: vec![
                ServiceSettings::new("claude", "ws://127.0.0.1:3210/ws/realtime"),
                ServiceSettings::new("codex", "ws://127.0.0.1:3211/ws/realtime"),
            ],
            tracker: TrackerSettings::default(),
            connection: ConnectionSettings::default(),
            reconnect: ReconnectSettings::default(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PulseSettings {
    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(SettingsError::InvalidValue(
                "at least one service must be configured".into(),
            ));
        }
        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(SettingsError::InvalidValue("service name is empty".into()));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(SettingsError::InvalidValue(format!(
                    "duplicate service name: {}",
                    service.name
                )));
            }
            if !(service.address.starts_with("ws://") || service.address.starts_with("wss://")) {
                return Err(SettingsError::InvalidValue(format!(
                    "service {} address must be ws:// or wss://, got {}",
                    service.name, service.address
                )));
            }
        }
        if self.tracker.capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "tracker capacity must be at least 1".into(),
            ));
        }
        if self.connection.connect_timeout_ms == 0 || self.connection.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSettings {
    pub name: String,
    pub address: String,
}

impl ServiceSettings {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerSettings {
    /// Maximum number of request records kept.
    pub capacity: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Text frame sent on every heartbeat.
    pub keepalive_payload: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            heartbeat_interval_ms: 30_000,
            keepalive_payload: r#"{"type":"ping"}"#.to_string(),
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    /// Consecutive failures after which a service is left disconnected.
    pub max_attempts: u32,
    /// Attempts that use the fixed short delay before backoff kicks in.
    pub fast_attempts: u32,
    pub fast_delay_ms: u64,
    pub backoff_base_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            fast_attempts: 3,
            fast_delay_ms: 1_000,
            backoff_base_ms: 1_000,
        }
    }
}

/// Local status HTTP surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 3390,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Warn+ records kept in memory for `/logs`.
    pub recent_capacity: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            recent_capacity: 200,
        }
    }
}
