use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Failures of a single connection. Never surfaced to callers of the
/// manager; they drive the reconnect schedule instead.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("connection closed")]
    Closed,

    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

impl TransportError {
    /// Short machine-readable category, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Timeout(_) => "timeout",
            Self::Send(_) => "send",
            Self::Receive(_) => "receive",
            Self::Closed => "closed",
            Self::WebSocket(_) => "websocket",
        }
    }
}
