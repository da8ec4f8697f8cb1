//! Protocol manager
//!
//! Owns the peer set and the relays, runs one reader and one writer task per
//! Active peer, and exposes the broadcast API used by the consensus engine.

use crate::codec::{Message, MessageCode, MessageCodec};
use crate::config::ProtocolConfig;
use crate::consensus::{ConsensusMessage, ConsensusRelay};
use crate::error::{DeliveryError, NetworkError, NetworkResult, ProtocolError};
use crate::handshake::exchange_status;
use crate::peer::Peer;
use crate::peer_set::PeerSet;
use crate::relay::{RecordRelay, TxRelay};
use crate::session::authenticate;
use crate::traits::Backend;
use crate::types::{GetBlockHeadersData, PeerId, StatusData};
use bytes::Bytes;
use dex_crypto::{NodeKey, NodePublicKey};
use dex_metrics::{names, timed, Metrics, MetricsSnapshot};
use dex_types::{
    AgreementResult, Block, NodeRecord, PartialSignature, PrivateShare, RandomnessResult,
    Transaction, Vote,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

/// Bound on flushing a peer's sink after its writer stops
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

struct Inner {
    config: ProtocolConfig,
    node_key: NodeKey,
    backend: Backend,
    peers: Arc<PeerSet>,
    txs: TxRelay,
    records: RecordRelay,
    consensus: ConsensusRelay,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
    stopped: AtomicBool,
    local_addr: RwLock<Option<SocketAddr>>,
}

/// Protocol manager handle. Clones share the same state.
#[derive(Clone)]
pub struct ProtocolManager {
    inner: Arc<Inner>,
}

impl ProtocolManager {
    /// Create a manager. Nothing runs until [`start`](Self::start) or
    /// [`handle_connection`](Self::handle_connection) is called.
    pub fn new(config: ProtocolConfig, node_key: NodeKey, backend: Backend) -> Self {
        let metrics = Arc::new(Metrics::new());
        let peers = Arc::new(PeerSet::new(config.max_peers));
        let txs = TxRelay::new(
            peers.clone(),
            backend.pool.clone(),
            config.tx_pack_size,
            metrics.clone(),
        );
        let records = RecordRelay::new(peers.clone(), backend.records.clone(), metrics.clone());
        let consensus = ConsensusRelay::new(
            peers.clone(),
            config.receive_channel_capacity,
            metrics.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                config,
                node_key,
                backend,
                peers,
                txs,
                records,
                consensus,
                metrics,
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                local_addr: RwLock::new(None),
            }),
        }
    }

    // ==================== Accessors ====================

    /// Configuration
    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    /// Our node public key
    pub fn public_key(&self) -> NodePublicKey {
        self.inner.node_key.public()
    }

    /// Our peer id as seen by remotes
    pub fn id(&self) -> PeerId {
        PeerId(self.inner.node_key.id())
    }

    /// Peer set handle, used to label peers
    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.inner.peers
    }

    /// Metrics
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    /// Current metric values, exportable as JSON
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_metrics(&self.inner.metrics)
    }

    /// Bound listener address, once started with a listen address
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.read()
    }

    /// Start accepting transactions from peers. One-way.
    pub fn mark_synced(&self) {
        if !self.inner.txs.is_accepting() {
            info!("Chain synced, accepting transactions");
        }
        self.inner.txs.mark_synced();
    }

    /// Whether transactions from peers are accepted
    pub fn is_synced(&self) -> bool {
        self.inner.txs.is_accepting()
    }

    /// Take the aggregated consensus receiver. Only the first call returns `Some`.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<ConsensusMessage>> {
        self.inner.consensus.take_receiver()
    }

    // ==================== Outbound ====================

    /// Send a consensus block to every peer
    pub fn broadcast_core_block(&self, block: &Block) {
        self.inner.consensus.broadcast_core_block(block);
    }

    /// Send a vote to the notary set of its round
    pub fn broadcast_vote(&self, vote: &Vote) {
        self.inner.consensus.broadcast_vote(vote);
    }

    /// Send an agreement result to every peer
    pub fn broadcast_agreement_result(&self, agreement: &AgreementResult) {
        self.inner.consensus.broadcast_agreement_result(agreement);
    }

    /// Send a randomness result to every peer
    pub fn broadcast_randomness_result(&self, result: &RandomnessResult) {
        self.inner.consensus.broadcast_randomness_result(result);
    }

    /// Send a DKG partial signature to the DKG set of its round
    pub fn broadcast_partial_signature(&self, psig: &PartialSignature) {
        self.inner.consensus.broadcast_partial_signature(psig);
    }

    /// Send a DKG private share to the peer with identity `recipient`.
    /// An unreachable recipient is logged, not reported.
    pub fn send_private_share(&self, recipient: &NodePublicKey, share: &PrivateShare) {
        self.inner.consensus.send_private_share(recipient, share);
    }

    /// Like [`send_private_share`](Self::send_private_share), reporting failure
    pub fn try_send_private_share(
        &self,
        recipient: &NodePublicKey,
        share: &PrivateShare,
    ) -> Result<(), DeliveryError> {
        self.inner.consensus.try_send_private_share(recipient, share)
    }

    /// Send transactions to every peer lacking them
    pub fn broadcast_transactions(&self, txs: &[Transaction]) {
        self.inner.txs.broadcast(txs);
    }

    /// Send records to every peer lacking them
    pub fn broadcast_records(&self, records: &[NodeRecord]) {
        self.inner.records.broadcast(records);
    }

    // ==================== Connections ====================

    fn local_status(&self) -> StatusData {
        let chain = &self.inner.backend.chain;
        let (number, current_block) = chain.current_head();
        StatusData {
            protocol_version: self.inner.config.protocol_version,
            network_id: self.inner.config.network_id,
            dmoment: self.inner.config.dmoment,
            number,
            current_block,
            genesis_block: chain.genesis_hash(),
        }
    }

    /// Run session auth and the status handshake on `io`, then register the
    /// peer and spawn its reader and writer.
    pub async fn handle_connection<S>(&self, io: S) -> NetworkResult<PeerId>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(NetworkError::NotRunning);
        }

        let framed = Framed::new(io, MessageCodec::new(inner.config.max_message_size));
        let (mut sink, mut stream) = framed.split();
        let local = self.local_status();

        let result = timed!(inner.metrics, names::HANDSHAKE_DURATION, {
            let handshake = async {
                let key = authenticate(&mut sink, &mut stream, &inner.node_key).await?;
                let status = exchange_status(&mut sink, &mut stream, &local).await?;
                Ok::<_, NetworkError>((key, status))
            };
            tokio::select! {
                _ = inner.cancel.cancelled() => Err(NetworkError::NotRunning),
                outcome = tokio::time::timeout(inner.config.handshake_timeout(), handshake) => {
                    match outcome {
                        Ok(result) => result,
                        Err(_) => Err(NetworkError::Timeout("handshake".into())),
                    }
                }
            }
        });
        let (remote_key, status) = match result {
            Ok(ok) => ok,
            Err(e) => {
                inner.metrics.counter(names::HANDSHAKE_FAILED, 1);
                debug!("Handshake failed: {}", e);
                return Err(e);
            }
        };

        let (queue, outbound) = mpsc::channel(inner.config.peer_queue_capacity.max(1));
        let peer = Arc::new(Peer::new(
            remote_key,
            status.protocol_version,
            (status.number, status.current_block),
            inner.config.known_cache_capacity,
            queue,
        ));
        let id = peer.id();
        // Keeps `stop` waiting until both tasks are on the tracker
        let _spawning = inner.tracker.token();
        inner.peers.register(peer.clone())?;
        inner
            .metrics
            .gauge(names::PEERS, inner.peers.len() as i64);
        info!("Peer {} connected, head #{}", id, status.number);

        let token = inner.cancel.child_token();
        inner
            .tracker
            .spawn(write_loop(id, sink, outbound, token.clone()));
        inner
            .tracker
            .spawn(self.clone().read_loop(peer.clone(), stream, token));

        inner.txs.sync_pending(&peer);
        Ok(id)
    }

    /// Dial `addr` and run [`handle_connection`](Self::handle_connection)
    pub async fn connect(&self, addr: SocketAddr) -> NetworkResult<PeerId> {
        debug!("Dialing {}", addr);
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        self.handle_connection(stream).await
    }

    async fn read_loop<R>(self, peer: Arc<Peer>, mut stream: R, cancel: CancellationToken)
    where
        R: Stream<Item = Result<Message, NetworkError>> + Unpin,
    {
        let id = peer.id();
        let result = loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                next = stream.next() => match next {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break Err(e),
                    None => break Ok(()),
                },
            };
            if let Err(e) = self.dispatch(&peer, msg, &cancel).await {
                if e.is_fatal() {
                    break Err(e);
                }
                debug!("Message from {} rejected: {}", id, e);
            }
        };

        match result {
            Err(NetworkError::ChannelClosed) if cancel.is_cancelled() => {}
            Err(e) => warn!("Dropping peer {}: {}", id, e),
            Ok(()) => {}
        }
        cancel.cancel();
        if self.inner.peers.unregister(&id).is_some() {
            self.inner
                .metrics
                .gauge(names::PEERS, self.inner.peers.len() as i64);
            info!("Peer {} disconnected", id);
        }
    }

    async fn dispatch(
        &self,
        peer: &Arc<Peer>,
        msg: Message,
        cancel: &CancellationToken,
    ) -> NetworkResult<()> {
        let code = MessageCode::try_from(msg.code)?;
        match code {
            MessageCode::Status => Err(ProtocolError::ExtraStatusMsg.into()),
            MessageCode::Tx => {
                let txs: Vec<Transaction> = msg.decode_list()?;
                self.inner.txs.handle_inbound(peer, txs)
            }
            MessageCode::Record => {
                let records: Vec<NodeRecord> = msg.decode_list()?;
                self.inner.records.handle_inbound(peer, records);
                Ok(())
            }
            MessageCode::CoreBlock => {
                let blocks: Vec<Block> = msg.decode_list()?;
                self.deliver(blocks.into_iter().map(ConsensusMessage::Block), cancel)
                    .await
            }
            MessageCode::Vote => {
                let votes: Vec<Vote> = msg.decode_list()?;
                self.deliver(votes.into_iter().map(ConsensusMessage::Vote), cancel)
                    .await
            }
            MessageCode::Agreement => {
                let agreement: AgreementResult = msg.decode()?;
                self.deliver([ConsensusMessage::Agreement(agreement)], cancel)
                    .await
            }
            MessageCode::Randomness => {
                let results: Vec<RandomnessResult> = msg.decode_list()?;
                self.deliver(results.into_iter().map(ConsensusMessage::Randomness), cancel)
                    .await
            }
            MessageCode::DkgPrivateShare => {
                let share: PrivateShare = msg.decode()?;
                self.deliver([ConsensusMessage::PrivateShare(share)], cancel)
                    .await
            }
            MessageCode::DkgPartialSignature => {
                let psig: PartialSignature = msg.decode()?;
                self.deliver([ConsensusMessage::PartialSignature(psig)], cancel)
                    .await
            }
            MessageCode::GetBlockHeaders => {
                let query: GetBlockHeadersData = msg.decode()?;
                match &self.inner.backend.sync {
                    Some(sync) => sync.on_get_block_headers(peer.id(), query)?,
                    None => trace!("Ignoring header query from {}", peer.id()),
                }
                Ok(())
            }
            MessageCode::NewBlockHashes
            | MessageCode::BlockHeaders
            | MessageCode::GetBlockBodies
            | MessageCode::BlockBodies
            | MessageCode::NewBlock
            | MessageCode::GetNodeData
            | MessageCode::NodeData
            | MessageCode::GetReceipts
            | MessageCode::Receipts => self.forward_sync(peer.id(), code, msg.payload),
        }
    }

    async fn deliver<I>(&self, artifacts: I, cancel: &CancellationToken) -> NetworkResult<()>
    where
        I: IntoIterator<Item = ConsensusMessage>,
    {
        let batch: Vec<ConsensusMessage> = artifacts.into_iter().collect();
        self.inner.consensus.deliver(batch, cancel).await
    }

    fn forward_sync(&self, peer: PeerId, code: MessageCode, payload: Bytes) -> NetworkResult<()> {
        match &self.inner.backend.sync {
            Some(sync) => Ok(sync.on_message(peer, code, payload)?),
            None => {
                trace!("Ignoring {:?} from {}", code, peer);
                Ok(())
            }
        }
    }

    // ==================== Lifecycle ====================

    /// Start the listener, bootstrap dials and the pool/record broadcast loops
    pub async fn start(&self) -> NetworkResult<()> {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return Err(NetworkError::NotRunning);
        }
        if inner.started.swap(true, Ordering::AcqRel) {
            return Err(NetworkError::AlreadyRunning);
        }

        let listener = match inner.config.listen_addr {
            Some(addr) => {
                let listener = match TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        inner.started.store(false, Ordering::Release);
                        return Err(e.into());
                    }
                };
                let bound = listener.local_addr()?;
                *inner.local_addr.write() = Some(bound);
                info!("Listening on {}", bound);
                Some(listener)
            }
            None => None,
        };

        inner
            .tracker
            .spawn(self.clone().tx_broadcast_loop(inner.backend.pool.subscribe_new_txs()));
        inner.tracker.spawn(
            self.clone()
                .record_broadcast_loop(inner.backend.records.subscribe_new_records()),
        );
        if let Some(listener) = listener {
            inner.tracker.spawn(self.clone().accept_loop(listener));
        }
        for addr in inner.config.bootstrap_peers.iter().copied() {
            let manager = self.clone();
            inner.tracker.spawn(async move {
                if let Err(e) = manager.connect(addr).await {
                    warn!("Failed to connect to bootstrap peer {}: {}", addr, e);
                }
            });
        }

        info!(
            "Protocol manager started, network {} version {}",
            inner.config.network_id, inner.config.protocol_version
        );
        Ok(())
    }

    /// Stop everything and wait for every task to finish.
    ///
    /// Afterwards the peer set is empty and the consensus receiver yields
    /// `None` once drained. Calling it again is a no-op.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::AcqRel) {
            inner.tracker.wait().await;
            return;
        }
        info!("Stopping protocol manager");
        inner.cancel.cancel();
        let dropped = inner.peers.close();
        debug!("Closed {} peer connections", dropped.len());
        drop(dropped);
        inner.tracker.close();
        inner.tracker.wait().await;
        inner.consensus.close();
        inner.metrics.gauge(names::PEERS, 0);
        info!("Protocol manager stopped");
    }

    async fn accept_loop(self, listener: TcpListener) {
        let cancel = self.inner.cancel.clone();
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    debug!("Incoming connection from {}", addr);
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay failed for {}: {}", addr, e);
                    }
                    let manager = self.clone();
                    self.inner.tracker.spawn(async move {
                        if let Err(e) = manager.handle_connection(stream).await {
                            debug!("Connection from {} failed: {}", addr, e);
                        }
                    });
                }
                Err(e) => error!("Accept error: {}", e),
            }
        }
    }

    async fn tx_broadcast_loop(self, mut events: broadcast::Receiver<Vec<Transaction>>) {
        let cancel = self.inner.cancel.clone();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(txs) => self.inner.txs.broadcast(&txs),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Transaction broadcast lagged, skipped {} batches", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn record_broadcast_loop(self, mut events: broadcast::Receiver<Vec<NodeRecord>>) {
        let cancel = self.inner.cancel.clone();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(records) => self.inner.records.broadcast(&records),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Record broadcast lagged, skipped {} batches", n)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

async fn write_loop<W>(
    id: PeerId,
    mut sink: W,
    mut outbound: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    W: Sink<Message, Error = NetworkError> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = outbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = sink.send(msg) => sent,
        };
        if let Err(e) = sent {
            debug!("Write to {} failed: {}", id, e);
            break;
        }
    }
    cancel.cancel();
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
}
