//! Process-wide metrics.
//!
//! The pipeline only ever writes metrics through [`MetricsSink`]; it never reads
//! them back. [`MetricsRegistry`] stores every series as lock-free atomics so
//! concurrent requests never lose an update.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Write-only metrics capability handed to the pipeline.
pub trait MetricsSink: Send + Sync {
    /// Add `value` to a monotonically increasing counter.
    fn increment(&self, name: &str, value: f64, tags: &[(&str, &str)]);

    /// Record one observation of a distribution (latency, sizes).
    fn observe(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SeriesKey {
    name: String,
    tags: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &str, tags: &[(&str, &str)]) -> Self {
        let mut tags: Vec<(String, String)> = tags
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        tags.sort();
        Self {
            name: name.to_string(),
            tags,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "{{{}}}", tags.join(","))?;
        }
        Ok(())
    }
}

/// An f64 stored as its bit pattern, updated by compare-and-swap.
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn update(&self, f: impl Fn(f64) -> f64) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(f(f64::from_bits(bits)).to_bits())
            });
    }

    fn add(&self, delta: f64) {
        self.update(|current| current + delta);
    }
}

#[derive(Debug)]
struct Histogram {
    count: AtomicU64,
    sum: AtomicF64,
    min: AtomicF64,
    max: AtomicF64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicF64::new(0.0),
            min: AtomicF64::new(f64::INFINITY),
            max: AtomicF64::new(f64::NEG_INFINITY),
        }
    }

    fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::AcqRel);
        self.sum.add(value);
        self.min.update(|current| current.min(value));
        self.max.update(|current| current.max(value));
    }

    fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count.load(Ordering::Acquire);
        let (min, max) = if count == 0 {
            (0.0, 0.0)
        } else {
            (self.min.load(), self.max.load())
        };
        HistogramSnapshot {
            count,
            sum: self.sum.load(),
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramSnapshot {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Point-in-time copy of every series, keyed by `name{tag=value,...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

/// In-process registry of counters and histograms.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: RwLock<HashMap<SeriesKey, Arc<AtomicF64>>>,
    histograms: RwLock<HashMap<SeriesKey, Arc<Histogram>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn counter_handle(&self, key: SeriesKey) -> Arc<AtomicF64> {
        if let Some(existing) = self.counters.read().get(&key) {
            return Arc::clone(existing);
        }
        let mut counters = self.counters.write();
        Arc::clone(
            counters
                .entry(key)
                .or_insert_with(|| Arc::new(AtomicF64::new(0.0))),
        )
    }

    fn histogram_handle(&self, key: SeriesKey) -> Arc<Histogram> {
        if let Some(existing) = self.histograms.read().get(&key) {
            return Arc::clone(existing);
        }
        let mut histograms = self.histograms.write();
        Arc::clone(
            histograms
                .entry(key)
                .or_insert_with(|| Arc::new(Histogram::new())),
        )
    }

    /// Current value of one counter series; zero if it was never written.
    pub fn counter(&self, name: &str, tags: &[(&str, &str)]) -> f64 {
        self.counters
            .read()
            .get(&SeriesKey::new(name, tags))
            .map(|c| c.load())
            .unwrap_or(0.0)
    }

    /// Sum of a counter across every tag combination.
    pub fn counter_total(&self, name: &str) -> f64 {
        self.counters
            .read()
            .iter()
            .filter(|(key, _)| key.name == name)
            .map(|(_, c)| c.load())
            .sum()
    }

    pub fn histogram(&self, name: &str, tags: &[(&str, &str)]) -> Option<HistogramSnapshot> {
        self.histograms
            .read()
            .get(&SeriesKey::new(name, tags))
            .map(|h| h.snapshot())
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(key, c)| (key.to_string(), c.load()))
            .collect();
        let histograms = self
            .histograms
            .read()
            .iter()
            .map(|(key, h)| (key.to_string(), h.snapshot()))
            .collect();
        MetricsSnapshot {
            counters,
            histograms,
        }
    }
}

impl MetricsSink for MetricsRegistry {
    fn increment(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.counter_handle(SeriesKey::new(name, tags)).add(value);
    }

    fn observe(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.histogram_handle(SeriesKey::new(name, tags))
            .observe(value);
    }
}
