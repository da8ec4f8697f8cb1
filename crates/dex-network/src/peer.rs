//! Connected peer state
//!
//! A [`Peer`] exists only after a successful handshake. It carries the
//! negotiated version, the remote head, bounded sets of content hashes the
//! remote is known to have, and the sending half of its outbound queue.
//! Sending never awaits: a full queue drops the message for this peer only.

use crate::codec::{Message, MessageCode};
use crate::error::DeliveryError;
use crate::types::PeerId;
use dex_crypto::NodePublicKey;
use dex_primitives::{BlockNumber, H256};
use dex_types::{
    AgreementResult, Block, NodeRecord, PartialSignature, PrivateShare, RandomnessResult,
    Transaction, Vote,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;

/// Default capacity of each known-hash set
pub const DEFAULT_KNOWN_CACHE_CAPACITY: usize = 32768;

/// Bounded set of hashes; inserting into a full set evicts the oldest entry.
#[derive(Debug)]
pub struct KnownCache {
    set: HashSet<H256>,
    order: VecDeque<H256>,
    capacity: usize,
}

impl KnownCache {
    /// Create with the given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            set: HashSet::with_capacity(capacity.min(4096)),
            order: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Insert a hash. Returns `true` if it was not present.
    pub fn insert(&mut self, hash: H256) -> bool {
        if self.set.contains(&hash) {
            return false;
        }
        while self.order.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.set.remove(&old);
            }
        }
        self.set.insert(hash);
        self.order.push_back(hash);
        true
    }

    /// Whether `hash` is present
    pub fn contains(&self, hash: &H256) -> bool {
        self.set.contains(hash)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// An Active peer
#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    public_key: NodePublicKey,
    version: u32,
    head: RwLock<(BlockNumber, H256)>,
    known_txs: Mutex<KnownCache>,
    known_records: Mutex<KnownCache>,
    queue: mpsc::Sender<Message>,
}

impl Peer {
    /// Create a peer around the sending half of its outbound queue
    pub fn new(
        public_key: NodePublicKey,
        version: u32,
        head: (BlockNumber, H256),
        known_cache_capacity: usize,
        queue: mpsc::Sender<Message>,
    ) -> Self {
        Self {
            id: PeerId::from_public_key(&public_key),
            public_key,
            version,
            head: RwLock::new(head),
            known_txs: Mutex::new(KnownCache::new(known_cache_capacity)),
            known_records: Mutex::new(KnownCache::new(known_cache_capacity)),
            queue,
        }
    }

    /// Peer id
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Authenticated node public key
    pub fn public_key(&self) -> &NodePublicKey {
        &self.public_key
    }

    /// Negotiated protocol version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Last known head `(number, hash)`
    pub fn head(&self) -> (BlockNumber, H256) {
        *self.head.read()
    }

    /// Update the remote head
    pub fn set_head(&self, number: BlockNumber, hash: H256) {
        *self.head.write() = (number, hash);
    }

    // ==================== Dedup ====================

    /// Record that the peer has this transaction. Returns `true` if new.
    pub fn mark_transaction(&self, hash: H256) -> bool {
        self.known_txs.lock().insert(hash)
    }

    /// Whether the peer is known to have this transaction
    pub fn knows_transaction(&self, hash: &H256) -> bool {
        self.known_txs.lock().contains(hash)
    }

    /// Record that the peer has this record. Returns `true` if new.
    pub fn mark_record(&self, hash: H256) -> bool {
        self.known_records.lock().insert(hash)
    }

    /// Whether the peer is known to have this record
    pub fn knows_record(&self, hash: &H256) -> bool {
        self.known_records.lock().contains(hash)
    }

    /// Mark every transaction known under one lock and return those that
    /// were not. Concurrent callers never both get the same transaction.
    pub fn claim_transactions(&self, txs: &[Transaction]) -> Vec<Transaction> {
        let mut known = self.known_txs.lock();
        txs.iter()
            .filter(|tx| known.insert(tx.hash()))
            .cloned()
            .collect()
    }

    /// Record counterpart of [`claim_transactions`](Self::claim_transactions)
    pub fn claim_records(&self, records: &[NodeRecord]) -> Vec<NodeRecord> {
        let mut known = self.known_records.lock();
        records
            .iter()
            .filter(|record| known.insert(record.hash()))
            .cloned()
            .collect()
    }

    // ==================== Outbound ====================

    /// Queue a raw message without waiting
    pub fn send(&self, msg: Message) -> Result<(), DeliveryError> {
        self.queue.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull(self.id),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected(self.id),
        })
    }

    /// Send a transaction pack. Hashes are claimed beforehand with
    /// [`claim_transactions`](Self::claim_transactions).
    pub fn send_transactions(&self, txs: &[Transaction]) -> Result<(), DeliveryError> {
        self.send(Message::encode_list(MessageCode::Tx, txs))
    }

    /// Send records. Hashes are claimed beforehand with
    /// [`claim_records`](Self::claim_records).
    pub fn send_records(&self, records: &[NodeRecord]) -> Result<(), DeliveryError> {
        self.send(Message::encode_list(MessageCode::Record, records))
    }

    /// Send consensus blocks
    pub fn send_core_blocks(&self, blocks: &[Block]) -> Result<(), DeliveryError> {
        self.send(Message::encode_list(MessageCode::CoreBlock, blocks))
    }

    /// Send votes
    pub fn send_votes(&self, votes: &[Vote]) -> Result<(), DeliveryError> {
        self.send(Message::encode_list(MessageCode::Vote, votes))
    }

    /// Send one agreement result
    pub fn send_agreement(&self, agreement: &AgreementResult) -> Result<(), DeliveryError> {
        self.send(Message::encode(MessageCode::Agreement, agreement))
    }

    /// Send randomness results
    pub fn send_randomness(&self, results: &[RandomnessResult]) -> Result<(), DeliveryError> {
        self.send(Message::encode_list(MessageCode::Randomness, results))
    }

    /// Send one DKG private share
    pub fn send_private_share(&self, share: &PrivateShare) -> Result<(), DeliveryError> {
        self.send(Message::encode(MessageCode::DkgPrivateShare, share))
    }

    /// Send one DKG partial signature
    pub fn send_partial_signature(&self, psig: &PartialSignature) -> Result<(), DeliveryError> {
        self.send(Message::encode(MessageCode::DkgPartialSignature, psig))
    }
}
