//! Shared harness for dex-network integration tests
//!
//! Connections run over in-memory duplex pipes. A [`TestPeer`] speaks the
//! wire protocol directly so tests can inject arbitrary frames.

#![allow(dead_code)]

use dex_crypto::NodeKey;
use dex_network::handshake::exchange_status;
use dex_network::session::authenticate;
use dex_network::{
    Backend, ChainStore, CollaboratorError, Message, MessageCodec, NetworkError, NetworkResult,
    NodeTable, PeerId, ProtocolConfig, ProtocolManager, StatusData, TxPool,
};
use dex_primitives::H256;
use dex_types::Transaction;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;

pub const DMOMENT: u64 = 123456;
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

type Conn = Framed<DuplexStream, MessageCodec>;

/// Install a tracing subscriber honoring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn genesis() -> H256 {
    H256::with_prefix(&[2])
}

pub fn tx(nonce: u64) -> Transaction {
    Transaction {
        nonce,
        gas_price: 1,
        gas_limit: 21000,
        value: 1,
        ..Default::default()
    }
}

// ============================================================================
// Collaborators
// ============================================================================

pub struct TestPool {
    pub pending: Mutex<Vec<Transaction>>,
    pub added: Mutex<Vec<Transaction>>,
    feed: broadcast::Sender<Vec<Transaction>>,
}

impl TestPool {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            added: Mutex::new(Vec::new()),
            feed: broadcast::channel(64).0,
        }
    }

    /// Accept transactions locally and announce them
    pub fn add_local(&self, txs: Vec<Transaction>) {
        self.pending.lock().extend(txs.iter().cloned());
        let _ = self.feed.send(txs);
    }

    pub fn added_len(&self) -> usize {
        self.added.lock().len()
    }
}

impl TxPool for TestPool {
    fn add_remotes(&self, txs: Vec<Transaction>) -> Result<(), CollaboratorError> {
        self.added.lock().extend(txs);
        Ok(())
    }

    fn pending(&self) -> Vec<Transaction> {
        self.pending.lock().clone()
    }

    fn subscribe_new_txs(&self) -> broadcast::Receiver<Vec<Transaction>> {
        self.feed.subscribe()
    }
}

pub struct TestChain;

impl ChainStore for TestChain {
    fn genesis_hash(&self) -> H256 {
        genesis()
    }

    fn current_head(&self) -> (u64, H256) {
        (0, genesis())
    }
}

pub struct Node {
    pub manager: ProtocolManager,
    pub pool: Arc<TestPool>,
    pub records: Arc<NodeTable>,
}

pub fn test_config() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_dmoment(DMOMENT)
        .with_handshake_timeout(Duration::from_secs(2))
}

pub fn node(config: ProtocolConfig) -> Node {
    let pool = Arc::new(TestPool::new());
    let records = Arc::new(NodeTable::new());
    let backend = Backend::new(pool.clone(), records.clone(), Arc::new(TestChain));
    Node {
        manager: ProtocolManager::new(config, NodeKey::random(), backend),
        pool,
        records,
    }
}

/// Status a well-behaved remote sends
pub fn remote_status() -> StatusData {
    StatusData {
        protocol_version: 64,
        network_id: 237,
        dmoment: DMOMENT,
        number: 0,
        current_block: genesis(),
        genesis_block: genesis(),
    }
}

// ============================================================================
// Test peer
// ============================================================================

pub struct TestPeer {
    pub key: NodeKey,
    pub sink: SplitSink<Conn, Message>,
    pub stream: SplitStream<Conn>,
}

impl TestPeer {
    pub fn id(&self) -> PeerId {
        PeerId(self.key.id())
    }

    pub async fn send(&mut self, msg: Message) {
        self.sink.send(msg).await.unwrap();
    }

    /// Next frame, or `None` on timeout or close
    pub async fn read_msg(&mut self) -> Option<Message> {
        match tokio::time::timeout(READ_TIMEOUT, self.stream.next()).await {
            Ok(Some(Ok(msg))) => Some(msg),
            _ => None,
        }
    }

    /// Assert nothing arrives within `wait`
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(Some(Ok(msg))) = tokio::time::timeout(wait, self.stream.next()).await {
            panic!("unexpected message code {:#x}", msg.code);
        }
    }

    /// Whether the manager closed the connection within the read timeout
    pub async fn is_closed(&mut self) -> bool {
        loop {
            match tokio::time::timeout(READ_TIMEOUT, self.stream.next()).await {
                Ok(None) | Ok(Some(Err(_))) => return true,
                Ok(Some(Ok(_))) => continue,
                Err(_) => return false,
            }
        }
    }
}

fn pipe() -> (DuplexStream, Conn) {
    let (local, remote) = tokio::io::duplex(1 << 20);
    (local, Framed::new(remote, MessageCodec::default()))
}

/// Connect a test peer that completes the handshake with `status`.
/// Returns the manager's result and the peer.
pub async fn connect_with_status(
    manager: &ProtocolManager,
    status: StatusData,
) -> (NetworkResult<PeerId>, TestPeer) {
    connect_as(manager, NodeKey::random(), status).await
}

/// Like [`connect_with_status`] with a chosen node key
pub async fn connect_as(
    manager: &ProtocolManager,
    key: NodeKey,
    status: StatusData,
) -> (NetworkResult<PeerId>, TestPeer) {
    let (local, remote) = pipe();
    let (mut sink, mut stream) = remote.split();

    let manager_side = manager.handle_connection(local);
    let peer_side = async {
        authenticate(&mut sink, &mut stream, &key).await?;
        exchange_status(&mut sink, &mut stream, &status).await
    };
    let (result, _) = tokio::join!(manager_side, peer_side);
    (result, TestPeer { key, sink, stream })
}

/// Connect a test peer that authenticates and then runs `script` in place of
/// the status exchange.
pub async fn connect_with_script<F, Fut>(
    manager: &ProtocolManager,
    script: F,
) -> NetworkResult<PeerId>
where
    F: FnOnce(SplitSink<Conn, Message>, SplitStream<Conn>) -> Fut,
    Fut: Future<Output = ()>,
{
    let (local, remote) = pipe();
    let key = NodeKey::random();
    let (mut sink, mut stream) = remote.split();

    let manager_side = manager.handle_connection(local);
    let peer_side = async move {
        if authenticate(&mut sink, &mut stream, &key).await.is_ok() {
            script(sink, stream).await;
        }
    };
    let (result, _) = tokio::join!(manager_side, peer_side);
    result
}

/// Connect a well-behaved test peer
pub async fn connect(manager: &ProtocolManager) -> TestPeer {
    let (result, peer) = connect_with_status(manager, remote_status()).await;
    let id = result.unwrap();
    assert_eq!(id, peer.id());
    peer
}

/// Poll `cond` until it holds or `READ_TIMEOUT` passes
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + READ_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Map any error to its display text
pub fn err_text<T: std::fmt::Debug>(result: Result<T, NetworkError>) -> String {
    result.unwrap_err().to_string()
}
