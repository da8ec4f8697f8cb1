//! # dex-metrics
//!
//! In-process metrics for the DEX node.
//!
//! - Counters for event counting
//! - Gauges for current values
//! - Histograms for latency tracking
//! - JSON snapshots
//!
//! Metric names used by the peer protocol live in [`names`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
mod histogram;
mod snapshot;

pub use collector::Metrics;
pub use histogram::Histogram;
pub use snapshot::{HistogramSummary, MetricsSnapshot};

/// Metric names reported by the peer protocol
pub mod names {
    /// Gauge: registered peers
    pub const PEERS: &str = "p2p.peers";
    /// Counter: failed session or protocol handshakes
    pub const HANDSHAKE_FAILED: &str = "p2p.handshake.failed";
    /// Histogram: handshake duration in microseconds
    pub const HANDSHAKE_DURATION: &str = "p2p.handshake.duration_us";
    /// Counter: transactions received and forwarded to the pool
    pub const TX_RECEIVED: &str = "p2p.tx.received";
    /// Counter: transactions discarded while the accept gate is closed
    pub const TX_DISCARDED: &str = "p2p.tx.discarded";
    /// Counter: transactions queued to peers
    pub const TX_SENT: &str = "p2p.tx.sent";
    /// Counter: records received
    pub const RECORD_RECEIVED: &str = "p2p.record.received";
    /// Counter: records queued to peers
    pub const RECORD_SENT: &str = "p2p.record.sent";
    /// Counter: consensus artifacts delivered to the aggregated channel
    pub const CONSENSUS_RECEIVED: &str = "p2p.consensus.received";
    /// Counter: consensus messages queued to peers
    pub const CONSENSUS_SENT: &str = "p2p.consensus.sent";
    /// Counter: private shares whose recipient was not connected
    pub const PRIVATE_SHARE_UNDELIVERED: &str = "p2p.private_share.undelivered";
    /// Counter: outbound messages dropped because a peer queue was full
    pub const OUTBOUND_DROPPED: &str = "p2p.outbound.dropped";
}

/// Time a block and record the elapsed microseconds in a histogram
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.histogram($name, start.elapsed().as_micros() as f64);
        result
    }};
}
