use serde::{Deserialize, Serialize};

/// Lifecycle status of a tracked request. Wire form is upper case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl RequestStatus {
    /// `Pending < Streaming < {Completed, Failed}`.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Streaming => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Resolve the status a record should hold after observing `incoming`.
    ///
    /// Never moves to a lower rank, and a terminal status always replaces a
    /// non-terminal one regardless of arrival order.
    pub fn advance(self, incoming: Self) -> Self {
        if incoming.is_terminal() && !self.is_terminal() {
            return incoming;
        }
        if incoming.rank() >= self.rank() {
            incoming
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Streaming => "STREAMING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
