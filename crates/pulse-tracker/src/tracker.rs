use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use pulse_core::{Event, EventKind, RequestId, RequestStatus, RequestUpdate, ServiceName};
use pulse_link::{EventDispatcher, ListenerHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::record::RequestRecord;

pub const DEFAULT_CAPACITY: usize = 100;

/// What `apply` did with an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    Ignored,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total: usize,
    pub pending: usize,
    pub streaming: usize,
    pub completed: usize,
    pub failed: usize,
    /// Records dropped to stay within capacity.
    pub evicted: u64,
    /// Non-creating events for ids never seen.
    pub ignored: u64,
}

struct TrackerState {
    records: HashMap<RequestId, RequestRecord>,
    /// Creation order, newest at the front.
    order: VecDeque<RequestId>,
    next_order: u64,
    evicted: u64,
    ignored: u64,
}

/// Bounded map of request id to lifecycle record.
///
/// Records are created only by `started` or `snapshot` events and are
/// removed only by eviction of the oldest-created record once `capacity`
/// is exceeded. Updates never change a record's position.
pub struct RequestTracker {
    capacity: usize,
    state: Mutex<TrackerState>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl RequestTracker {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(TrackerState {
                records: HashMap::new(),
                order: VecDeque::new(),
                next_order: 1,
                evicted: 0,
                ignored: 0,
            }),
        }
    }

    /// Subscribe to `dispatcher`. Every event it delivers is applied.
    pub fn attach(self: &Arc<Self>, dispatcher: &Arc<EventDispatcher>) -> ListenerHandle {
        let tracker = Arc::clone(self);
        dispatcher.add_listener(move |event| {
            tracker.apply(event);
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn apply(&self, event: &Event) -> Outcome {
        match &event.kind {
            EventKind::Connection(_) => Outcome::Ignored,
            EventKind::Snapshot(u) | EventKind::Started(u) => {
                self.create_or_refresh(&event.service, u)
            }
            EventKind::Progress(u) => self.update(event, u, |record| {
                record.advance(u.status.unwrap_or(RequestStatus::Streaming));
                record.merge_fields(u);
                record.append(u.response_delta.as_deref());
            }),
            EventKind::Completed(u) => self.update(event, u, |record| {
                record.advance(terminal_status(u, RequestStatus::Completed));
                record.merge_fields(u);
                record.append(u.response_delta.as_deref());
            }),
            EventKind::Failed(u) => self.update(event, u, |record| {
                record.advance(terminal_status(u, RequestStatus::Failed));
                record.merge_fields(u);
                record.append(u.response_delta.as_deref());
            }),
        }
    }

    fn create_or_refresh(&self, service: &ServiceName, update: &RequestUpdate) -> Outcome {
        let mut state = self.state.lock();
        if let Some(record) = state.records.get_mut(&update.request_id) {
            if let Some(status) = update.status {
                record.advance(status);
            }
            record.seed_text(update);
            record.merge_fields(update);
            return Outcome::Updated;
        }

        let order = state.next_order;
        state.next_order += 1;
        let record = RequestRecord::create(service.clone(), update, RequestStatus::Pending, order);
        state.order.push_front(update.request_id.clone());
        state.records.insert(update.request_id.clone(), record);
        trace!(service = %service, request_id = %update.request_id, "tracking request");

        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_back() {
                state.records.remove(&oldest);
                state.evicted += 1;
                debug!(request_id = %oldest, "evicted oldest request record");
            }
        }
        Outcome::Created
    }

    fn update<F>(&self, event: &Event, update: &RequestUpdate, f: F) -> Outcome
    where
        F: FnOnce(&mut RequestRecord),
    {
        let mut state = self.state.lock();
        match state.records.get_mut(&update.request_id) {
            Some(record) => {
                f(record);
                Outcome::Updated
            }
            None => {
                state.ignored += 1;
                debug!(
                    service = %event.service,
                    request_id = %update.request_id,
                    event_type = event.event_type(),
                    "event for untracked request ignored"
                );
                Outcome::Ignored
            }
        }
    }

    /// All records, newest first.
    pub fn records(&self) -> Vec<RequestRecord> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    /// Records for one service, newest first.
    pub fn records_for(&self, service: &str) -> Vec<RequestRecord> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.service.as_str() == service)
            .cloned()
            .collect()
    }

    pub fn get(&self, request_id: &str) -> Option<RequestRecord> {
        self.state.lock().records.get(request_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.state.lock();
        let mut stats = TrackerStats {
            total: state.records.len(),
            evicted: state.evicted,
            ignored: state.ignored,
            ..Default::default()
        };
        for record in state.records.values() {
            match record.status {
                RequestStatus::Pending => stats.pending += 1,
                RequestStatus::Streaming => stats.streaming += 1,
                RequestStatus::Completed => stats.completed += 1,
                RequestStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

/// The explicit status when it is terminal, otherwise the event's own.
fn terminal_status(update: &RequestUpdate, fallback: RequestStatus) -> RequestStatus {
    update
        .status
        .filter(|s| s.is_terminal())
        .unwrap_or(fallback)
}
