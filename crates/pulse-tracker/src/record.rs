use chrono::{DateTime, Utc};
use pulse_core::{RequestId, RequestStatus, RequestUpdate, ServiceName};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one backend request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: RequestId,
    pub service: ServiceName,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub accumulated_text: String,
    /// Monotonic creation sequence. Never changes after creation.
    pub created_order: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    pub response_truncated: bool,
    pub updated_at: DateTime<Utc>,
}

impl RequestRecord {
    /// A fresh record seeded from a creating frame.
    pub(crate) fn create(
        service: ServiceName,
        update: &RequestUpdate,
        initial: RequestStatus,
        created_order: u64,
    ) -> Self {
        let mut record = Self {
            request_id: update.request_id.clone(),
            service,
            status: update.status.unwrap_or(initial),
            status_code: None,
            duration_ms: None,
            accumulated_text: String::new(),
            created_order,
            error: None,
            channel: None,
            method: None,
            path: None,
            start_time: None,
            target_url: None,
            response_truncated: false,
            updated_at: Utc::now(),
        };
        record.seed_text(update);
        record.merge_fields(update);
        record
    }

    /// Full text from `response_chunks` if present, otherwise the delta.
    /// Only applies while nothing has been accumulated yet.
    pub(crate) fn seed_text(&mut self, update: &RequestUpdate) {
        if !self.accumulated_text.is_empty() {
            if let Some(delta) = &update.response_delta {
                self.accumulated_text.push_str(delta);
            }
            return;
        }
        match (&update.response_chunks, &update.response_delta) {
            (Some(chunks), _) if !chunks.is_empty() => self.accumulated_text = chunks.concat(),
            (_, Some(delta)) => self.accumulated_text.push_str(delta),
            _ => {}
        }
    }

    pub(crate) fn append(&mut self, delta: Option<&str>) {
        if let Some(delta) = delta {
            self.accumulated_text.push_str(delta);
        }
    }

    pub(crate) fn advance(&mut self, incoming: RequestStatus) {
        self.status = self.status.advance(incoming);
    }

    /// Overwrite every optional field the update carries.
    pub(crate) fn merge_fields(&mut self, update: &RequestUpdate) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        set(&mut self.status_code, &update.status_code);
        set(&mut self.duration_ms, &update.duration_ms);
        set(&mut self.error, &update.error);
        set(&mut self.channel, &update.channel);
        set(&mut self.method, &update.method);
        set(&mut self.path, &update.path);
        set(&mut self.start_time, &update.start_time);
        set(&mut self.target_url, &update.target_url);
        if let Some(truncated) = update.response_truncated {
            self.response_truncated = truncated;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_seeds_from_chunks_before_delta() {
        let mut update = RequestUpdate::new("r1").with_delta("ignored");
        update.response_chunks = Some(vec!["Hel".into(), "lo".into()]);
        let record = RequestRecord::create("claude".into(), &update, RequestStatus::Pending, 1);
        assert_eq!(record.accumulated_text, "Hello");
        assert_eq!(record.status, RequestStatus::Pending);
    }

    #[test]
    fn create_uses_explicit_status() {
        let update = RequestUpdate::new("r1").with_status(RequestStatus::Streaming);
        let record = RequestRecord::create("codex".into(), &update, RequestStatus::Pending, 7);
        assert_eq!(record.status, RequestStatus::Streaming);
        assert_eq!(record.created_order, 7);
    }

    #[test]
    fn merge_keeps_fields_the_update_omits() {
        let mut update = RequestUpdate::new("r1").with_status_code(200);
        update.method = Some("POST".into());
        let mut record = RequestRecord::create("claude".into(), &update, RequestStatus::Pending, 1);

        record.merge_fields(&RequestUpdate::new("r1").with_duration_ms(40));
        assert_eq!(record.status_code, Some(200));
        assert_eq!(record.method.as_deref(), Some("POST"));
        assert_eq!(record.duration_ms, Some(40));
    }

    #[test]
    fn serializes_status_upper_case() {
        let record = RequestRecord::create(
            "claude".into(),
            &RequestUpdate::new("r1"),
            RequestStatus::Pending,
            1,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["request_id"], "r1");
        assert!(json.get("status_code").is_none());
    }
}
