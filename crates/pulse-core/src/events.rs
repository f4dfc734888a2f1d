use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;
use crate::ids::{RequestId, ServiceName};
use crate::status::RequestStatus;

/// Keep-alive payload exchanged in both directions.
pub const KEEPALIVE_FRAME: &str = r#"{"type":"ping"}"#;

/// WebSocket close code for a deliberate shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Request-scoped payload shared by every domain frame.
///
/// Every field but `request_id` is optional; an absent field leaves the
/// corresponding record field untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestUpdate {
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequestStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    // Request metadata carried by `started` and `snapshot` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_truncated: Option<bool>,
    /// Full response so far; only sent in `snapshot` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_chunks: Option<Vec<String>>,
}

impl RequestUpdate {
    pub fn new(request_id: impl Into<RequestId>) -> Self {
        Self {
            request_id: request_id.into(),
            status: None,
            status_code: None,
            duration_ms: None,
            response_delta: None,
            error: None,
            channel: None,
            method: None,
            path: None,
            start_time: None,
            target_url: None,
            response_truncated: None,
            response_chunks: None,
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn with_delta(mut self, delta: impl Into<String>) -> Self {
        self.response_delta = Some(delta.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Frames as they arrive on the wire. `ping` is a keep-alive and never
/// leaves the connection manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Ping,
    Snapshot(RequestUpdate),
    Started(RequestUpdate),
    Progress(RequestUpdate),
    Completed(RequestUpdate),
    Failed(RequestUpdate),
}

impl InboundFrame {
    pub fn is_keepalive(&self) -> bool {
        matches!(self, Self::Ping)
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Snapshot(_) => "snapshot",
            Self::Started(_) => "started",
            Self::Progress(_) => "progress",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }

    fn update(&self) -> Option<&RequestUpdate> {
        match self {
            Self::Ping => None,
            Self::Snapshot(u)
            | Self::Started(u)
            | Self::Progress(u)
            | Self::Completed(u)
            | Self::Failed(u) => Some(u),
        }
    }

    /// Tag the frame with its origin. Keep-alives yield `None`.
    pub fn into_event(self, service: &ServiceName) -> Option<Event> {
        let kind = match self {
            Self::Ping => return None,
            Self::Snapshot(u) => EventKind::Snapshot(u),
            Self::Started(u) => EventKind::Started(u),
            Self::Progress(u) => EventKind::Progress(u),
            Self::Completed(u) => EventKind::Completed(u),
            Self::Failed(u) => EventKind::Failed(u),
        };
        Some(Event {
            service: service.clone(),
            kind,
        })
    }
}

/// Decode one text frame. Unknown extra fields are ignored; unknown frame
/// types, missing or empty `request_id`, and mistyped fields are errors.
pub fn decode_frame(text: &str) -> Result<InboundFrame, DecodeError> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    if let Some(update) = frame.update() {
        if update.request_id.is_empty() {
            return Err(DecodeError::EmptyRequestId {
                frame_type: frame.frame_type(),
            });
        }
    }
    Ok(frame)
}

/// Connection lifecycle reported by the manager itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionNotice {
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Connection(ConnectionNotice),
    Snapshot(RequestUpdate),
    Started(RequestUpdate),
    Progress(RequestUpdate),
    Completed(RequestUpdate),
    Failed(RequestUpdate),
}

/// An event as delivered to subscribers, always tagged with the service
/// whose connection produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub service: ServiceName,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn connection(
        service: ServiceName,
        status: ConnectionStatus,
        code: Option<u16>,
        error: Option<String>,
    ) -> Self {
        Self {
            service,
            kind: EventKind::Connection(ConnectionNotice {
                status,
                code,
                error,
            }),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match &self.kind {
            EventKind::Connection(_) => "connection",
            EventKind::Snapshot(_) => "snapshot",
            EventKind::Started(_) => "started",
            EventKind::Progress(_) => "progress",
            EventKind::Completed(_) => "completed",
            EventKind::Failed(_) => "failed",
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match &self.kind {
            EventKind::Connection(_) => None,
            EventKind::Snapshot(u)
            | EventKind::Started(u)
            | EventKind::Progress(u)
            | EventKind::Completed(u)
            | EventKind::Failed(u) => Some(&u.request_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_frame_decodes_as_ping() {
        let frame = decode_frame(KEEPALIVE_FRAME).unwrap();
        assert!(frame.is_keepalive());
        assert!(frame.into_event(&ServiceName::from("claude")).is_none());
    }

    #[test]
    fn started_frame_from_backend() {
        let json = r#"{
            "type": "started",
            "request_id": "r1",
            "service": "ignored-by-decoder",
            "timestamp": "2025-01-01T00:00:00",
            "channel": "primary",
            "method": "POST",
            "path": "/v1/messages",
            "start_time": "2025-01-01T00:00:00",
            "status": "PENDING",
            "duration_ms": 0,
            "status_code": null,
            "request_headers": {"x-api-key": "[hidden]"},
            "response_chunks": [],
            "response_truncated": false,
            "target_url": null
        }"#;
        let frame = decode_frame(json).unwrap();
        let InboundFrame::Started(update) = frame else {
            panic!("expected started frame");
        };
        assert_eq!(update.request_id.as_str(), "r1");
        assert_eq!(update.status, Some(RequestStatus::Pending));
        assert_eq!(update.status_code, None);
        assert_eq!(update.method.as_deref(), Some("POST"));
        assert_eq!(update.target_url, None);
    }

    #[test]
    fn progress_with_delta() {
        let frame =
            decode_frame(r#"{"type":"progress","request_id":"r1","response_delta":"He","duration_ms":12}"#)
                .unwrap();
        let event = frame.into_event(&ServiceName::from("codex")).unwrap();
        assert_eq!(event.service.as_str(), "codex");
        assert_eq!(event.event_type(), "progress");
        let EventKind::Progress(update) = &event.kind else {
            panic!("expected progress");
        };
        assert_eq!(update.response_delta.as_deref(), Some("He"));
        assert_eq!(update.duration_ms, Some(12));
        assert_eq!(update.status, None);
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame(r#"{"request_id":"r1"}"#).is_err());
        assert!(decode_frame(r#"{"type":"teleport","request_id":"r1"}"#).is_err());
        assert!(decode_frame(r#"{"type":"progress"}"#).is_err());
        assert!(decode_frame(r#"{"type":"progress","request_id":"r1","status_code":"ok"}"#).is_err());
        assert!(decode_frame(r#"{"type":"completed","request_id":"r1","status":"DONE"}"#).is_err());
    }

    #[test]
    fn connection_type_is_not_accepted_from_wire() {
        assert!(decode_frame(r#"{"type":"connection","status":"connected"}"#).is_err());
    }

    #[test]
    fn empty_request_id_rejected() {
        let err = decode_frame(r#"{"type":"completed","request_id":""}"#).unwrap_err();
        assert!(matches!(err, DecodeError::EmptyRequestId { frame_type: "completed" }));
    }

    #[test]
    fn event_serializes_flat_with_service_tag() {
        let event = Event::connection(
            ServiceName::from("claude"),
            ConnectionStatus::Disconnected,
            Some(1006),
            None,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connection");
        assert_eq!(json["service"], "claude");
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["code"], 1006);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn request_id_accessor() {
        let event = InboundFrame::Completed(RequestUpdate::new("r9").with_status_code(200))
            .into_event(&ServiceName::from("claude"))
            .unwrap();
        assert_eq!(event.request_id().map(RequestId::as_str), Some("r9"));

        let conn = Event::connection(ServiceName::from("claude"), ConnectionStatus::Connected, None, None);
        assert!(conn.request_id().is_none());
    }
}
