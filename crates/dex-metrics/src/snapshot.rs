//! Point-in-time export of a [`Metrics`] registry

use crate::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value
    pub mean: f64,
    /// Observation count
    pub count: u64,
}

impl MetricsSnapshot {
    /// Capture the current values
    pub fn from_metrics(metrics: &Metrics) -> Self {
        Self {
            counters: metrics.all_counters().into_iter().collect(),
            gauges: metrics.all_gauges().into_iter().collect(),
            histograms: metrics
                .all_histograms()
                .into_iter()
                .map(|(name, mean, count)| (name, HistogramSummary { mean, count }))
                .collect(),
        }
    }

    /// Counter value or 0
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names;

    #[test]
    fn test_snapshot_json_roundtrip() {
        let metrics = Metrics::new();
        metrics.counter(names::TX_RECEIVED, 100);
        metrics.gauge(names::PEERS, 5);
        metrics.histogram(names::HANDSHAKE_DURATION, 50.0);

        let snapshot = MetricsSnapshot::from_metrics(&metrics);
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("p2p.tx.received"));
        assert!(json.contains("p2p.peers"));

        let parsed: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_missing_counter_is_zero() {
        let snapshot = MetricsSnapshot::from_metrics(&Metrics::new());
        assert_eq!(snapshot.counter(names::OUTBOUND_DROPPED), 0);
    }
}
