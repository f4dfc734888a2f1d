use chrono::{DateTime, Utc};
use pulse_telemetry::MetricsRecorder;
use serde::{Deserialize, Serialize};

pub(crate) const FRAMES_RECEIVED: &str = "link_frames_received";
pub(crate) const KEEPALIVES_DROPPED: &str = "link_keepalives_dropped";
pub(crate) const MALFORMED_DROPPED: &str = "link_malformed_dropped";
pub(crate) const EVENTS_DISPATCHED: &str = "link_events_dispatched";
pub(crate) const RECONNECTS_SCHEDULED: &str = "link_reconnects_scheduled";
pub(crate) const CONNECTIONS_OPENED: &str = "link_connections_opened";
pub(crate) const CONNECTION_ERRORS: &str = "link_connection_errors";
pub(crate) const SERVICES_OPEN: &str = "link_services_open";

/// Lifecycle of one service connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Error => "ERROR",
        }
    }
}

/// Per-service health snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: String,
    pub address: String,
    pub state: ConnectionState,
    pub open: bool,
    /// Reconnects scheduled since the last successful open or manual
    /// connect.
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Retries used up; stays disconnected until a manual reconnect.
    pub exhausted: bool,
    pub reconnect_pending: bool,
    pub last_change: DateTime<Utc>,
}

/// Aggregate link counters across all services.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub frames_received: u64,
    pub keepalives_dropped: u64,
    pub malformed_dropped: u64,
    pub events_dispatched: u64,
    pub reconnects_scheduled: u64,
    pub connections_opened: u64,
    pub connection_errors: u64,
}

impl LinkStats {
    pub fn from_metrics(metrics: &MetricsRecorder) -> Self {
        Self {
            frames_received: metrics.counter_total(FRAMES_RECEIVED),
            keepalives_dropped: metrics.counter_total(KEEPALIVES_DROPPED),
            malformed_dropped: metrics.counter_total(MALFORMED_DROPPED),
            events_dispatched: metrics.counter_total(EVENTS_DISPATCHED),
            reconnects_scheduled: metrics.counter_total(RECONNECTS_SCHEDULED),
            connections_opened: metrics.counter_total(CONNECTIONS_OPENED),
            connection_errors: metrics.counter_total(CONNECTION_ERRORS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connecting).unwrap(),
            "\"CONNECTING\""
        );
        assert_eq!(ConnectionState::Error.as_str(), "ERROR");
    }

    #[test]
    fn stats_sum_across_services() {
        let m = MetricsRecorder::new();
        m.counter_inc(FRAMES_RECEIVED, &[("service", "claude")], 3);
        m.counter_inc(FRAMES_RECEIVED, &[("service", "codex")], 2);
        m.counter_inc(MALFORMED_DROPPED, &[("service", "codex")], 1);
        let stats = LinkStats::from_metrics(&m);
        assert_eq!(stats.frames_received, 5);
        assert_eq!(stats.malformed_dropped, 1);
        assert_eq!(stats.events_dispatched, 0);
    }
}
