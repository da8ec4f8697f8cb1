//! Collaborator interfaces
//!
//! The protocol manager does not validate or store anything itself. It
//! hands transactions to a [`TxPool`], records to a [`RecordTable`], reads
//! the chain through a [`ChainStore`] and forwards sync traffic to an
//! optional [`SyncHandler`].

use crate::codec::MessageCode;
use crate::error::CollaboratorError;
use crate::types::{GetBlockHeadersData, PeerId};
use bytes::Bytes;
use dex_primitives::{BlockNumber, H256};
use dex_types::{NodeRecord, Transaction};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Transaction pool
pub trait TxPool: Send + Sync + 'static {
    /// Add transactions received from peers
    fn add_remotes(&self, txs: Vec<Transaction>) -> Result<(), CollaboratorError>;

    /// Every transaction currently pending
    fn pending(&self) -> Vec<Transaction>;

    /// Batches of newly accepted transactions
    fn subscribe_new_txs(&self) -> broadcast::Receiver<Vec<Transaction>>;
}

/// Node record table
pub trait RecordTable: Send + Sync + 'static {
    /// Add records received from peers
    fn add_records(&self, records: Vec<NodeRecord>);

    /// Batches of new or updated records
    fn subscribe_new_records(&self) -> broadcast::Receiver<Vec<NodeRecord>>;
}

/// Read access to the local chain
pub trait ChainStore: Send + Sync + 'static {
    /// Genesis block hash
    fn genesis_hash(&self) -> H256;

    /// Head `(number, hash)`
    fn current_head(&self) -> (BlockNumber, H256);
}

/// Consumer of block sync traffic
pub trait SyncHandler: Send + Sync + 'static {
    /// Header range query from `peer`
    fn on_get_block_headers(
        &self,
        peer: PeerId,
        query: GetBlockHeadersData,
    ) -> Result<(), CollaboratorError>;

    /// Any other sync message, payload undecoded
    fn on_message(
        &self,
        peer: PeerId,
        code: MessageCode,
        payload: Bytes,
    ) -> Result<(), CollaboratorError>;
}

/// Collaborators handed to the protocol manager
#[derive(Clone)]
pub struct Backend {
    /// Transaction pool
    pub pool: Arc<dyn TxPool>,
    /// Record table
    pub records: Arc<dyn RecordTable>,
    /// Chain
    pub chain: Arc<dyn ChainStore>,
    /// Optional sync handler
    pub sync: Option<Arc<dyn SyncHandler>>,
}

impl Backend {
    /// Backend without a sync handler
    pub fn new(
        pool: Arc<dyn TxPool>,
        records: Arc<dyn RecordTable>,
        chain: Arc<dyn ChainStore>,
    ) -> Self {
        Self {
            pool,
            records,
            chain,
            sync: None,
        }
    }

    /// Attach a sync handler
    pub fn with_sync(mut self, sync: Arc<dyn SyncHandler>) -> Self {
        self.sync = Some(sync);
        self
    }
}
