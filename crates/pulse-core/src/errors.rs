/// Why an inbound frame could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{frame_type} frame has an empty request_id")]
    EmptyRequestId { frame_type: &'static str },
}

impl DecodeError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Json(e) if e.is_syntax() || e.is_eof() => "syntax",
            Self::Json(_) => "schema",
            Self::EmptyRequestId { .. } => "empty_request_id",
        }
    }
}
