//! Transaction and record relay
//!
//! Both relays follow the same pattern: inbound batches mark their hashes
//! known on the sender before reaching the collaborator, and outbound
//! batches carry only the items a peer's known set accepted as new. The
//! check and the mark happen under one lock, so concurrent senders never
//! deliver an item twice.

use crate::error::{DeliveryError, NetworkResult};
use crate::peer::Peer;
use crate::peer_set::PeerSet;
use crate::traits::{RecordTable, TxPool};
use dex_metrics::{names, Metrics};
use dex_types::{NodeRecord, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Log and count a failed hand-off to one peer
pub(crate) fn report_undelivered(metrics: &Metrics, err: &DeliveryError) {
    match err {
        DeliveryError::QueueFull(_) => {
            warn!("Dropping outbound message: {}", err);
            metrics.counter(names::OUTBOUND_DROPPED, 1);
        }
        _ => debug!("Dropping outbound message: {}", err),
    }
}

/// Split `txs` into packs of roughly `limit` encoded bytes. A single
/// transaction larger than `limit` travels alone.
pub(crate) fn pack_transactions(txs: Vec<Transaction>, limit: usize) -> Vec<Vec<Transaction>> {
    let mut packs = Vec::new();
    let mut pack = Vec::new();
    let mut size = 0;
    for tx in txs {
        let len = tx.encoded_len();
        if !pack.is_empty() && size + len > limit {
            packs.push(std::mem::take(&mut pack));
            size = 0;
        }
        size += len;
        pack.push(tx);
    }
    if !pack.is_empty() {
        packs.push(pack);
    }
    packs
}

// ============================================================================
// Transactions
// ============================================================================

/// Transaction relay with the one-way accept gate
pub struct TxRelay {
    peers: Arc<PeerSet>,
    pool: Arc<dyn TxPool>,
    accepting: AtomicBool,
    pack_size: usize,
    metrics: Arc<Metrics>,
}

impl TxRelay {
    /// Create a relay with the gate closed
    pub fn new(
        peers: Arc<PeerSet>,
        pool: Arc<dyn TxPool>,
        pack_size: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            peers,
            pool,
            accepting: AtomicBool::new(false),
            pack_size,
            metrics,
        }
    }

    /// Open the gate. There is no way to close it again.
    pub fn mark_synced(&self) {
        self.accepting.store(true, Ordering::Release);
    }

    /// Whether inbound transactions are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Handle a `Tx` batch from `peer`
    pub fn handle_inbound(&self, peer: &Peer, txs: Vec<Transaction>) -> NetworkResult<()> {
        if !self.is_accepting() {
            debug!(
                "Discarding {} transactions from {}: not synced",
                txs.len(),
                peer.id()
            );
            self.metrics.counter(names::TX_DISCARDED, txs.len() as u64);
            return Ok(());
        }
        for tx in &txs {
            peer.mark_transaction(tx.hash());
        }
        self.metrics.counter(names::TX_RECEIVED, txs.len() as u64);
        self.pool.add_remotes(txs)?;
        Ok(())
    }

    /// Send each transaction to every peer lacking it
    pub fn broadcast(&self, txs: &[Transaction]) {
        for peer in self.peers.all() {
            let claimed = peer.claim_transactions(txs);
            if !claimed.is_empty() {
                self.send_packs(&peer, claimed);
            }
        }
    }

    /// Send every pending transaction `peer` does not know
    pub fn sync_pending(&self, peer: &Peer) {
        let unknown = peer.claim_transactions(&self.pool.pending());
        if unknown.is_empty() {
            return;
        }
        debug!("Syncing {} transactions to {}", unknown.len(), peer.id());
        self.send_packs(peer, unknown);
    }

    fn send_packs(&self, peer: &Peer, txs: Vec<Transaction>) {
        for pack in pack_transactions(txs, self.pack_size) {
            match peer.send_transactions(&pack) {
                Ok(()) => self.metrics.counter(names::TX_SENT, pack.len() as u64),
                Err(e) => report_undelivered(&self.metrics, &e),
            }
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Node record relay
pub struct RecordRelay {
    peers: Arc<PeerSet>,
    table: Arc<dyn RecordTable>,
    metrics: Arc<Metrics>,
}

impl RecordRelay {
    /// Create a relay feeding `table`
    pub fn new(peers: Arc<PeerSet>, table: Arc<dyn RecordTable>, metrics: Arc<Metrics>) -> Self {
        Self {
            peers,
            table,
            metrics,
        }
    }

    /// Handle a `Record` batch from `peer`
    pub fn handle_inbound(&self, peer: &Peer, records: Vec<NodeRecord>) {
        self.metrics
            .counter(names::RECORD_RECEIVED, records.len() as u64);
        let fresh: Vec<NodeRecord> = records
            .into_iter()
            .filter(|record| peer.mark_record(record.hash()))
            .collect();
        if !fresh.is_empty() {
            self.table.add_records(fresh);
        }
    }

    /// Send each record to every peer lacking it
    pub fn broadcast(&self, records: &[NodeRecord]) {
        for peer in self.peers.all() {
            let claimed = peer.claim_records(records);
            if claimed.is_empty() {
                continue;
            }
            match peer.send_records(&claimed) {
                Ok(()) => self
                    .metrics
                    .counter(names::RECORD_SENT, claimed.len() as u64),
                Err(e) => report_undelivered(&self.metrics, &e),
            }
        }
    }
}
