//! Reduces the dispatched event stream into a bounded, newest-first
//! collection of request lifecycle records.

pub mod record;
pub mod tracker;

pub use record::RequestRecord;
pub use tracker::{Outcome, RequestTracker, TrackerStats, DEFAULT_CAPACITY};
