//! Thread-safe metric registry

use crate::Histogram;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Named counters, gauges and histograms.
///
/// Metrics are created on first use. Lookups take a read lock; only the
/// first touch of a name takes the write lock.
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicI64>>>,
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
}

fn get_or_insert<T>(
    map: &RwLock<HashMap<String, Arc<T>>>,
    name: &str,
    init: impl FnOnce() -> T,
) -> Arc<T> {
    if let Some(existing) = map.read().get(name) {
        return Arc::clone(existing);
    }
    let mut map = map.write();
    Arc::clone(map.entry(name.to_string()).or_insert_with(|| Arc::new(init())))
}

impl Metrics {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter
    pub fn counter(&self, name: &str, delta: u64) {
        get_or_insert(&self.counters, name, || AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Set a gauge
    pub fn gauge(&self, name: &str, value: i64) {
        get_or_insert(&self.gauges, name, || AtomicI64::new(0)).store(value, Ordering::Relaxed);
    }

    /// Add `delta` (possibly negative) to a gauge
    pub fn gauge_add(&self, name: &str, delta: i64) {
        get_or_insert(&self.gauges, name, || AtomicI64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Record a histogram observation
    pub fn histogram(&self, name: &str, value: f64) {
        get_or_insert(&self.histograms, name, Histogram::new).observe(value);
    }

    /// Counter value, `None` if never touched
    pub fn get_counter(&self, name: &str) -> Option<u64> {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Gauge value, `None` if never touched
    pub fn get_gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Histogram mean
    pub fn get_histogram_mean(&self, name: &str) -> Option<f64> {
        self.histograms.read().get(name).map(|h| h.mean())
    }

    /// Histogram observation count
    pub fn histogram_count(&self, name: &str) -> Option<u64> {
        self.histograms.read().get(name).map(|h| h.total_count())
    }

    /// All counters
    pub fn all_counters(&self) -> Vec<(String, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// All gauges
    pub fn all_gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// All histograms as (name, mean, count)
    pub fn all_histograms(&self) -> Vec<(String, f64, u64)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.mean(), v.total_count()))
            .collect()
    }
}
