use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Type of metric.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Counter,
    Gauge,
}

/// Sorted label set. Sorting makes `[("a","1"),("b","2")]` and
/// `[("b","2"),("a","1")]` the same series.
pub type Labels = BTreeMap<String, String>;

/// Point-in-time value of one series.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: Labels,
    pub value: f64,
    pub metric_type: MetricType,
}

/// In-memory counter. Monotonically increasing.
struct Counter {
    value: AtomicU64,
}

impl Counter {
    fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }
    fn increment(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }
    fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// In-memory gauge. Can go up or down.
struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }
    fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }
    fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct SeriesKey {
    name: String,
    labels: Labels,
}

impl SeriesKey {
    fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }
}

/// Process-local metrics registry. Nothing is persisted.
#[derive(Default)]
pub struct MetricsRecorder {
    counters: RwLock<HashMap<SeriesKey, Arc<Counter>>>,
    gauges: RwLock<HashMap<SeriesKey, Arc<Gauge>>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = SeriesKey::new(name, labels);
        if let Some(counter) = self.counters.read().get(&key) {
            counter.increment(n);
            return;
        }
        let counter = Arc::clone(
            self.counters
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(Counter::new())),
        );
        counter.increment(n);
    }

    pub fn gauge_set(&self, name: &str, labels: &[(&str, &str)], value: i64) {
        let key = SeriesKey::new(name, labels);
        if let Some(gauge) = self.gauges.read().get(&key) {
            gauge.set(value);
            return;
        }
        let gauge = Arc::clone(
            self.gauges
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(Gauge::new())),
        );
        gauge.set(value);
    }

    /// Value of one counter series, 0 if never incremented.
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .read()
            .get(&SeriesKey::new(name, labels))
            .map_or(0, |c| c.get())
    }

    /// Sum of a counter across all label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .read()
            .iter()
            .filter(|(k, _)| k.name == name)
            .map(|(_, c)| c.get())
            .sum()
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<i64> {
        self.gauges
            .read()
            .get(&SeriesKey::new(name, labels))
            .map(|g| g.get())
    }

    /// All series, sorted by name then labels.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        let mut samples: Vec<MetricSample> = self
            .counters
            .read()
            .iter()
            .map(|(k, c)| MetricSample {
                name: k.name.clone(),
                labels: k.labels.clone(),
                value: c.get() as f64,
                metric_type: MetricType::Counter,
            })
            .collect();
        samples.extend(self.gauges.read().iter().map(|(k, g)| MetricSample {
            name: k.name.clone(),
            labels: k.labels.clone(),
            value: g.get() as f64,
            metric_type: MetricType::Gauge,
        }));
        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.labels.cmp(&b.labels)));
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_series() {
        let m = MetricsRecorder::new();
        m.counter_inc("frames", &[("service", "claude")], 1);
        m.counter_inc("frames", &[("service", "claude")], 2);
        m.counter_inc("frames", &[("service", "codex")], 5);

        assert_eq!(m.counter("frames", &[("service", "claude")]), 3);
        assert_eq!(m.counter("frames", &[("service", "codex")]), 5);
        assert_eq!(m.counter("frames", &[("service", "other")]), 0);
        assert_eq!(m.counter_total("frames"), 8);
        assert_eq!(m.counter_total("missing"), 0);
    }

    #[test]
    fn label_order_is_irrelevant() {
        let m = MetricsRecorder::new();
        m.counter_inc("x", &[("a", "1"), ("b", "2")], 1);
        m.counter_inc("x", &[("b", "2"), ("a", "1")], 1);
        assert_eq!(m.counter("x", &[("a", "1"), ("b", "2")]), 2);
    }

    #[test]
    fn gauges_overwrite() {
        let m = MetricsRecorder::new();
        assert_eq!(m.gauge("open", &[]), None);
        m.gauge_set("open", &[], 2);
        m.gauge_set("open", &[], 1);
        assert_eq!(m.gauge("open", &[]), Some(1));
    }

    #[test]
    fn snapshot_is_sorted() {
        let m = MetricsRecorder::new();
        m.counter_inc("b", &[], 1);
        m.gauge_set("a", &[], 7);
        let snap = m.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].name, "a");
        assert_eq!(snap[0].metric_type, MetricType::Gauge);
        assert_eq!(snap[1].value, 1.0);
    }

    #[test]
    fn concurrent_increments() {
        let m = Arc::new(MetricsRecorder::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.counter_inc("hits", &[], 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.counter("hits", &[]), 8000);
    }
}
