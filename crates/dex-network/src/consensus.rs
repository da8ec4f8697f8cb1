//! Consensus relay
//!
//! Every peer connection feeds decoded consensus artifacts into one bounded
//! channel consumed by the consensus engine. A full channel slows only the
//! reader that produced the artifact; the wait always races shutdown.
//!
//! Outbound fan-out:
//!
//! | artifact | recipients |
//! |---|---|
//! | block, agreement, randomness | every Active peer |
//! | vote | notary set of the vote's round |
//! | partial signature | DKG set of its round |
//! | private share | the one peer with the recipient's identity |

use crate::error::{DeliveryError, NetworkError, NetworkResult};
use crate::peer::Peer;
use crate::peer_set::PeerSet;
use crate::relay::report_undelivered;
use crate::types::PeerLabel;
use dex_crypto::NodePublicKey;
use dex_metrics::{names, Metrics};
use dex_types::{
    AgreementResult, Block, PartialSignature, PrivateShare, RandomnessResult, Vote,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Artifact delivered to the consensus engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusMessage {
    /// Consensus block
    Block(Block),
    /// Vote
    Vote(Vote),
    /// Agreement result
    Agreement(AgreementResult),
    /// Randomness result
    Randomness(RandomnessResult),
    /// DKG private share
    PrivateShare(PrivateShare),
    /// DKG partial signature
    PartialSignature(PartialSignature),
}

/// Aggregated inbound channel plus outbound fan-out
pub struct ConsensusRelay {
    peers: Arc<PeerSet>,
    sender: RwLock<Option<mpsc::Sender<ConsensusMessage>>>,
    receiver: Mutex<Option<mpsc::Receiver<ConsensusMessage>>>,
    metrics: Arc<Metrics>,
}

impl ConsensusRelay {
    /// Create with a channel of `capacity` artifacts
    pub fn new(peers: Arc<PeerSet>, capacity: usize, metrics: Arc<Metrics>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            peers,
            sender: RwLock::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            metrics,
        }
    }

    /// Take the receiving half. Only the first call returns `Some`.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<ConsensusMessage>> {
        self.receiver.lock().take()
    }

    /// Push decoded artifacts in order, waiting for capacity.
    ///
    /// Fails with `ChannelClosed` once `cancel` fires or the relay is closed.
    /// Artifacts are dropped silently if the receiver was dropped.
    pub async fn deliver(
        &self,
        batch: Vec<ConsensusMessage>,
        cancel: &CancellationToken,
    ) -> NetworkResult<()> {
        let Some(sender) = self.sender.read().clone() else {
            return Err(NetworkError::ChannelClosed);
        };
        for msg in batch {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(NetworkError::ChannelClosed),
                sent = sender.send(msg) => {
                    if sent.is_err() {
                        debug!("Consensus receiver dropped, discarding artifact");
                        return Ok(());
                    }
                    self.metrics.counter(names::CONSENSUS_RECEIVED, 1);
                }
            }
        }
        Ok(())
    }

    /// Drop the relay's sender so the receiver drains and ends
    pub fn close(&self) {
        self.sender.write().take();
    }

    fn fan_out<F>(&self, peers: Vec<Arc<Peer>>, send: F)
    where
        F: Fn(&Peer) -> Result<(), DeliveryError>,
    {
        for peer in peers {
            match send(&peer) {
                Ok(()) => self.metrics.counter(names::CONSENSUS_SENT, 1),
                Err(e) => report_undelivered(&self.metrics, &e),
            }
        }
    }

    /// Send a block to every peer
    pub fn broadcast_core_block(&self, block: &Block) {
        let blocks = std::slice::from_ref(block);
        self.fan_out(self.peers.all(), |p| p.send_core_blocks(blocks));
    }

    /// Send a vote to the notary set of its round
    pub fn broadcast_vote(&self, vote: &Vote) {
        let label = PeerLabel::notary(vote.round());
        let votes = std::slice::from_ref(vote);
        self.fan_out(self.peers.peers_with_label(&label), |p| p.send_votes(votes));
    }

    /// Send an agreement result to every peer
    pub fn broadcast_agreement_result(&self, agreement: &AgreementResult) {
        self.fan_out(self.peers.all(), |p| p.send_agreement(agreement));
    }

    /// Send a randomness result to every peer
    pub fn broadcast_randomness_result(&self, result: &RandomnessResult) {
        let results = std::slice::from_ref(result);
        self.fan_out(self.peers.all(), |p| p.send_randomness(results));
    }

    /// Send a partial signature to the DKG set of its round
    pub fn broadcast_partial_signature(&self, psig: &PartialSignature) {
        let label = PeerLabel::dkg(psig.round);
        self.fan_out(self.peers.peers_with_label(&label), |p| {
            p.send_partial_signature(psig)
        });
    }

    /// Unicast a private share, reporting why it could not be handed off
    pub fn try_send_private_share(
        &self,
        recipient: &NodePublicKey,
        share: &PrivateShare,
    ) -> Result<(), DeliveryError> {
        let peer = self
            .peers
            .lookup_by_identity(recipient)
            .ok_or_else(|| DeliveryError::UnknownRecipient(recipient.id().abbrev()))?;
        peer.send_private_share(share)?;
        self.metrics.counter(names::CONSENSUS_SENT, 1);
        Ok(())
    }

    /// Unicast a private share; an unreachable recipient is logged and counted
    pub fn send_private_share(&self, recipient: &NodePublicKey, share: &PrivateShare) {
        match self.try_send_private_share(recipient, share) {
            Ok(()) => {}
            Err(e @ DeliveryError::UnknownRecipient(_)) => {
                warn!("Private share for round {} undelivered: {}", share.round, e);
                self.metrics.counter(names::PRIVATE_SHARE_UNDELIVERED, 1);
            }
            Err(e) => report_undelivered(&self.metrics, &e),
        }
    }
}
