//! In-memory node record table
//!
//! Keeps the highest-`seq` signed record per node id and publishes new or
//! newer records on a [`Feed`].

use crate::feed::Feed;
use crate::traits::RecordTable;
use dex_primitives::H256;
use dex_types::NodeRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

/// Default feed buffer per subscriber
const FEED_CAPACITY: usize = 256;

/// Record table keyed by node id
pub struct NodeTable {
    records: RwLock<HashMap<H256, NodeRecord>>,
    feed: Feed<Vec<NodeRecord>>,
}

impl NodeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            feed: Feed::new(FEED_CAPACITY),
        }
    }

    /// Record for `node_id`
    pub fn get(&self, node_id: &H256) -> Option<NodeRecord> {
        self.records.read().get(node_id).cloned()
    }

    /// Number of known nodes
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no node is known
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Every stored record
    pub fn entries(&self) -> Vec<NodeRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Store the records that are new or newer, returning them
    fn merge(&self, records: Vec<NodeRecord>) -> Vec<NodeRecord> {
        let mut table = self.records.write();
        let mut accepted = Vec::new();
        for record in records {
            let Some(node_id) = record.node_id() else {
                debug!("Ignoring record without identity");
                continue;
            };
            if let Err(e) = record.verify() {
                debug!("Ignoring record for {}: {}", node_id.abbrev(), e);
                continue;
            }
            let newer = table
                .get(&node_id)
                .map_or(true, |current| record.seq > current.seq);
            if newer {
                table.insert(node_id, record.clone());
                accepted.push(record);
            }
        }
        accepted
    }
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordTable for NodeTable {
    fn add_records(&self, records: Vec<NodeRecord>) {
        let accepted = self.merge(records);
        if !accepted.is_empty() {
            self.feed.send(accepted);
        }
    }

    fn subscribe_new_records(&self) -> broadcast::Receiver<Vec<NodeRecord>> {
        self.feed.subscribe()
    }
}
