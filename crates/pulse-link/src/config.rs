use std::time::Duration;

use pulse_core::{ServiceName, KEEPALIVE_FRAME};

use crate::backoff::ReconnectPolicy;

/// A backend to keep a connection open to. Static for the manager's life.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: ServiceName,
    pub address: String,
}

impl ServiceEndpoint {
    pub fn new(name: impl Into<ServiceName>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Connection tuning shared by every service.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Text frame sent on every heartbeat tick.
    pub keepalive_payload: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            keepalive_payload: KEEPALIVE_FRAME.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
