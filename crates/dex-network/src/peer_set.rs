//! Registry of Active peers
//!
//! All indices live behind one lock so they are always mutually
//! consistent: every id in the label, direct and identity indices is a
//! registered peer.

use crate::error::{NetworkError, NetworkResult};
use crate::peer::Peer;
use crate::types::{PeerId, PeerLabel};
use dex_crypto::NodePublicKey;
use dex_primitives::{Round, H256};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    peers: HashMap<PeerId, Arc<Peer>>,
    labels: HashMap<PeerLabel, HashSet<PeerId>>,
    direct: HashMap<PeerId, HashSet<PeerLabel>>,
    identities: HashMap<NodePublicKey, PeerId>,
    closed: bool,
}

impl Inner {
    fn ensure_registered(&self, id: &PeerId) -> NetworkResult<()> {
        if self.peers.contains_key(id) {
            Ok(())
        } else {
            Err(NetworkError::PeerNotFound(*id))
        }
    }

    fn label(&mut self, id: PeerId, label: PeerLabel) {
        self.labels.entry(label).or_default().insert(id);
    }

    fn unlabel(&mut self, id: &PeerId, label: &PeerLabel) {
        if let Some(members) = self.labels.get_mut(label) {
            members.remove(id);
            if members.is_empty() {
                self.labels.remove(label);
            }
        }
    }
}

/// Set of Active peers
pub struct PeerSet {
    inner: RwLock<Inner>,
    max_peers: usize,
}

impl PeerSet {
    /// Create a set admitting at most `max_peers` peers
    pub fn new(max_peers: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_peers,
        }
    }

    /// Register a peer after a successful handshake
    pub fn register(&self, peer: Arc<Peer>) -> NetworkResult<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(NetworkError::NotRunning);
        }
        let id = peer.id();
        if inner.peers.contains_key(&id) {
            return Err(NetworkError::AlreadyRegistered(id));
        }
        if inner.peers.len() >= self.max_peers {
            return Err(NetworkError::TooManyPeers(self.max_peers));
        }
        inner.identities.insert(*peer.public_key(), id);
        inner.peers.insert(id, peer);
        Ok(())
    }

    /// Remove a peer and purge it from every index
    pub fn unregister(&self, id: &PeerId) -> Option<Arc<Peer>> {
        let mut inner = self.inner.write();
        let peer = inner.peers.remove(id)?;
        inner.identities.remove(peer.public_key());
        inner.direct.remove(id);
        inner.labels.retain(|_, members| {
            members.remove(id);
            !members.is_empty()
        });
        Some(peer)
    }

    /// Get a peer
    pub fn get(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.inner.read().peers.get(id).cloned()
    }

    /// Number of registered peers
    pub fn len(&self) -> usize {
        self.inner.read().peers.len()
    }

    /// Whether no peer is registered
    pub fn is_empty(&self) -> bool {
        self.inner.read().peers.is_empty()
    }

    /// Snapshot of every registered peer
    pub fn all(&self) -> Vec<Arc<Peer>> {
        self.inner.read().peers.values().cloned().collect()
    }

    /// Snapshot of every registered id
    pub fn ids(&self) -> Vec<PeerId> {
        self.inner.read().peers.keys().copied().collect()
    }

    // ==================== Labels ====================

    /// Add `id` to the members of `label`
    pub fn associate_label(&self, id: &PeerId, label: PeerLabel) -> NetworkResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_registered(id)?;
        inner.label(*id, label);
        Ok(())
    }

    /// Label `id` and mark it as a direct peer for `label`
    pub fn add_direct_peer(&self, id: &PeerId, label: PeerLabel) -> NetworkResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_registered(id)?;
        inner.label(*id, label);
        inner.direct.entry(*id).or_default().insert(label);
        Ok(())
    }

    /// Undo [`add_direct_peer`](Self::add_direct_peer) for one label
    pub fn remove_direct_peer(&self, id: &PeerId, label: &PeerLabel) -> NetworkResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_registered(id)?;
        inner.unlabel(id, label);
        let drained = match inner.direct.get_mut(id) {
            Some(labels) => {
                labels.remove(label);
                labels.is_empty()
            }
            None => false,
        };
        if drained {
            inner.direct.remove(id);
        }
        Ok(())
    }

    /// Whether `id` is a direct peer for any label
    pub fn is_direct(&self, id: &PeerId) -> bool {
        self.inner.read().direct.contains_key(id)
    }

    /// Drop every label and direct entry for rounds up to and including `round`
    pub fn forget_round(&self, round: Round) {
        let mut inner = self.inner.write();
        inner.labels.retain(|label, _| label.round > round);
        inner.direct.retain(|_, labels| {
            labels.retain(|label| label.round > round);
            !labels.is_empty()
        });
    }

    /// Ids carrying exactly `label`
    pub fn members_of(&self, label: &PeerLabel) -> Vec<PeerId> {
        self.inner
            .read()
            .labels
            .get(label)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Peers carrying exactly `label`
    pub fn peers_with_label(&self, label: &PeerLabel) -> Vec<Arc<Peer>> {
        let inner = self.inner.read();
        inner
            .labels
            .get(label)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| inner.peers.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a node public key to a connected peer
    pub fn lookup_by_identity(&self, key: &NodePublicKey) -> Option<Arc<Peer>> {
        let inner = self.inner.read();
        inner
            .identities
            .get(key)
            .and_then(|id| inner.peers.get(id).cloned())
    }

    // ==================== Dedup queries ====================

    /// Peers not yet known to have transaction `hash`
    pub fn peers_without_transaction(&self, hash: &H256) -> Vec<Arc<Peer>> {
        self.inner
            .read()
            .peers
            .values()
            .filter(|p| !p.knows_transaction(hash))
            .cloned()
            .collect()
    }

    /// Peers not yet known to have record `hash`
    pub fn peers_without_record(&self, hash: &H256) -> Vec<Arc<Peer>> {
        self.inner
            .read()
            .peers
            .values()
            .filter(|p| !p.knows_record(hash))
            .cloned()
            .collect()
    }

    /// Refuse further registrations and drain every peer
    pub fn close(&self) -> Vec<Arc<Peer>> {
        let mut inner = self.inner.write();
        inner.closed = true;
        inner.labels.clear();
        inner.direct.clear();
        inner.identities.clear();
        inner.peers.drain().map(|(_, peer)| peer).collect()
    }
}
