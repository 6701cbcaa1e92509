use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

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

/// Upper bound on retained observations per histogram. Oldest are dropped.
const HISTOGRAM_CAPACITY: usize = 4096;

/// In-memory histogram over a bounded window of recent observations.
struct Histogram {
    observations: Mutex<VecDeque<f64>>,
}

impl Histogram {
    fn new() -> Self {
        Self {
            observations: Mutex::new(VecDeque::with_capacity(HISTOGRAM_CAPACITY)),
        }
    }
    fn observe(&self, value: f64) {
        let mut obs = self.observations.lock();
        if obs.len() >= HISTOGRAM_CAPACITY {
            let _ = obs.pop_front();
        }
        obs.push_back(value);
    }
    fn summary(&self) -> HistogramSummary {
        let mut obs: Vec<f64> = self.observations.lock().iter().copied().collect();
        if obs.is_empty() {
            return HistogramSummary::default();
        }
        obs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = obs.len();
        let sum: f64 = obs.iter().sum();
        let p50 = obs[count / 2];
        let p95 = obs[((count as f64 * 0.95) as usize).min(count - 1)];
        let p99 = obs[((count as f64 * 0.99) as usize).min(count - 1)];
        HistogramSummary {
            count: count as u64,
            sum,
            p50,
            p95,
            p99,
        }
    }
}

/// Summary statistics from a histogram.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Metric key: name + labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    fn new(name: impl Into<String>, labels: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            name: name.into(),
            labels: sorted,
        }
    }

    fn labels_map(&self) -> HashMap<String, String> {
        self.labels.iter().cloned().collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CounterSample {
    pub name: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, String>,
    pub value: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistogramSample {
    pub name: String,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub labels: HashMap<String, String>,
    #[serde(flatten)]
    pub summary: HistogramSummary,
}

/// Point-in-time view of every metric, sorted by name for stable output.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: Vec<CounterSample>,
    pub histograms: Vec<HistogramSample>,
}

/// Thread-safe in-process metrics recorder.
pub struct MetricsRecorder {
    counters: RwLock<HashMap<MetricKey, Counter>>,
    histograms: RwLock<HashMap<MetricKey, Histogram>>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
        }
    }

    /// Increment a counter by n.
    pub fn counter_inc(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        let key = MetricKey::new(name, labels);
        let counters = self.counters.read();
        if let Some(c) = counters.get(&key) {
            c.increment(n);
            return;
        }
        drop(counters);
        let mut counters = self.counters.write();
        let c = counters.entry(key).or_insert_with(Counter::new);
        c.increment(n);
    }

    /// Record a histogram observation.
    pub fn histogram_observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = MetricKey::new(name, labels);
        let histograms = self.histograms.read();
        if let Some(h) = histograms.get(&key) {
            h.observe(value);
            return;
        }
        drop(histograms);
        let mut histograms = self.histograms.write();
        let h = histograms.entry(key).or_insert_with(Histogram::new);
        h.observe(value);
    }

    /// Get current value of a counter.
    pub fn counter_get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = MetricKey::new(name, labels);
        self.counters.read().get(&key).map_or(0, |c| c.get())
    }

    /// Get a histogram summary.
    pub fn histogram_summary(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        let key = MetricKey::new(name, labels);
        self.histograms
            .read()
            .get(&key)
            .map(|h| h.summary())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters: Vec<CounterSample> = self
            .counters
            .read()
            .iter()
            .map(|(key, counter)| CounterSample {
                name: key.name.clone(),
                labels: key.labels_map(),
                value: counter.get(),
            })
            .collect();
        counters.sort_by(|a, b| a.name.cmp(&b.name));

        let mut histograms: Vec<HistogramSample> = self
            .histograms
            .read()
            .iter()
            .map(|(key, histogram)| HistogramSample {
                name: key.name.clone(),
                labels: key.labels_map(),
                summary: histogram.summary(),
            })
            .collect();
        histograms.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            counters,
            histograms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counter_increments() {
        let m = MetricsRecorder::new();
        m.counter_inc("reviews_created_total", &[], 1);
        m.counter_inc("reviews_created_total", &[], 2);
        assert_eq!(m.counter_get("reviews_created_total", &[]), 3);
    }

    #[test]
    fn counter_labels_are_order_insensitive() {
        let m = MetricsRecorder::new();
        m.counter_inc("http_requests_total", &[("route", "GET:list"), ("status", "200")], 1);
        m.counter_inc("http_requests_total", &[("status", "200"), ("route", "GET:list")], 1);
        assert_eq!(
            m.counter_get("http_requests_total", &[("route", "GET:list"), ("status", "200")]),
            2
        );
        assert_eq!(
            m.counter_get("http_requests_total", &[("route", "GET:list"), ("status", "429")]),
            0
        );
    }

    #[test]
    fn unknown_counter_is_zero() {
        let m = MetricsRecorder::new();
        assert_eq!(m.counter_get("nope", &[]), 0);
    }

    #[test]
    fn histogram_summary_percentiles() {
        let m = MetricsRecorder::new();
        for v in 1..=100 {
            m.histogram_observe("generation_duration_ms", &[], v as f64);
        }
        let s = m.histogram_summary("generation_duration_ms", &[]);
        assert_eq!(s.count, 100);
        assert_eq!(s.sum, 5050.0);
        assert_eq!(s.p50, 51.0);
        assert!((95.0..=96.0).contains(&s.p95), "p95 = {}", s.p95);
        assert!((99.0..=100.0).contains(&s.p99), "p99 = {}", s.p99);
    }

    #[test]
    fn histogram_single_observation() {
        let m = MetricsRecorder::new();
        m.histogram_observe("h", &[], 7.0);
        let s = m.histogram_summary("h", &[]);
        assert_eq!(s.count, 1);
        assert_eq!(s.p50, 7.0);
        assert_eq!(s.p99, 7.0);
    }

    #[test]
    fn histogram_is_bounded() {
        let m = MetricsRecorder::new();
        for v in 0..(HISTOGRAM_CAPACITY + 10) {
            m.histogram_observe("h", &[], v as f64);
        }
        let s = m.histogram_summary("h", &[]);
        assert_eq!(s.count, HISTOGRAM_CAPACITY as u64);
        // The ten oldest observations (0..10) were evicted.
        let kept: f64 = (10..HISTOGRAM_CAPACITY + 10).map(|v| v as f64).sum();
        assert_eq!(s.sum, kept);
    }

    #[test]
    fn empty_histogram_summary_is_default() {
        let m = MetricsRecorder::new();
        assert_eq!(m.histogram_summary("missing", &[]), HistogramSummary::default());
    }

    #[test]
    fn snapshot_is_sorted_and_serializable() {
        let m = MetricsRecorder::new();
        m.counter_inc("b_total", &[], 1);
        m.counter_inc("a_total", &[("route", "POST:submit")], 4);
        m.histogram_observe("latency_ms", &[], 12.5);

        let snap = m.snapshot();
        let names: Vec<_> = snap.counters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a_total", "b_total"]);
        assert_eq!(snap.counters[0].labels["route"], "POST:submit");

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["histograms"][0]["name"], "latency_ms");
        assert_eq!(json["histograms"][0]["count"], 1);
        assert!(json["counters"][1].get("labels").is_none());
    }

    #[test]
    fn concurrent_increments() {
        let m = Arc::new(MetricsRecorder::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.counter_inc("c", &[], 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.counter_get("c", &[]), 8000);
    }
}
