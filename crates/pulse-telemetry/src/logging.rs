use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A warn+ log record kept in memory for the diagnostics surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub seq: u64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Query parameters for searching recent logs.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub service: Option<String>,
    pub limit: Option<usize>,
}

/// Bounded ring of recent warn+ records. Oldest records fall off first.
pub struct RecentLogs {
    capacity: usize,
    inner: Mutex<Ring>,
}

struct Ring {
    records: VecDeque<LogRecord>,
    next_seq: u64,
}

impl RecentLogs {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Ring {
                records: VecDeque::new(),
                next_seq: 1,
            }),
        }
    }

    fn push(&self, mut record: LogRecord) {
        let mut ring = self.inner.lock();
        record.seq = ring.next_seq;
        ring.next_seq += 1;
        if ring.records.len() == self.capacity {
            ring.records.pop_front();
        }
        ring.records.push_back(record);
    }

    /// Newest first.
    pub fn query(&self, q: &LogQuery) -> Vec<LogRecord> {
        let ring = self.inner.lock();
        let limit = q.limit.unwrap_or(100);
        ring.records
            .iter()
            .rev()
            .filter(|r| {
                q.level
                    .as_deref()
                    .map_or(true, |l| r.level.eq_ignore_ascii_case(l))
            })
            .filter(|r| {
                q.service
                    .as_deref()
                    .map_or(true, |s| r.service.as_deref() == Some(s))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// tracing Layer that copies warn+ events into a [`RecentLogs`] ring.
pub struct RecentLogLayer {
    sink: Arc<RecentLogs>,
}

impl RecentLogLayer {
    pub fn new(sink: Arc<RecentLogs>) -> Self {
        Self { sink }
    }
}

/// Visitor that extracts fields from a tracing event.
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    service: Option<String>,
    request_id: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: serde_json::Map::new(),
            service: None,
            request_id: None,
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{:?}", value);
        match field.name() {
            "message" => self.message = Some(val),
            "service" => self.service = Some(val.trim_matches('"').to_string()),
            "request_id" => self.request_id = Some(val.trim_matches('"').to_string()),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(val));
            }
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "service" => self.service = Some(value.to_string()),
            "request_id" => self.request_id = Some(value.to_string()),
            name => {
                self.fields
                    .insert(name.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

impl<S> Layer<S> for RecentLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        self.sink.push(LogRecord {
            seq: 0,
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: (!visitor.fields.is_empty()).then(|| serde_json::Value::Object(visitor.fields)),
            service: visitor.service,
            request_id: visitor.request_id,
        });
    }
}
