//! Protocol manager lifecycle and TCP tests

mod common;

use common::*;
use dex_metrics::names;
use dex_network::{ConsensusMessage, Message, MessageCode, NetworkError};
use dex_types::{Block, Vote};
use std::time::Duration;
use tokio::io::duplex;

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_start_twice() {
    let node = node(test_config());
    node.manager.start().await.unwrap();
    assert!(matches!(
        node.manager.start().await,
        Err(NetworkError::AlreadyRunning)
    ));
    node.manager.stop().await;
}

#[tokio::test]
async fn test_stop_closes_everything() {
    init_tracing();
    let node = node(test_config());
    let mut rx = node.manager.take_receiver().unwrap();
    node.manager.start().await.unwrap();
    let mut a = connect(&node.manager).await;
    let mut b = connect(&node.manager).await;

    a.send(Message::encode_list(MessageCode::CoreBlock, &[Block::default()]))
        .await;
    assert_eq!(
        tokio::time::timeout(READ_TIMEOUT, rx.recv()).await.unwrap(),
        Some(ConsensusMessage::Block(Block::default()))
    );

    tokio::time::timeout(STOP_TIMEOUT, node.manager.stop())
        .await
        .expect("stop finishes");
    assert!(node.manager.peers().is_empty());
    assert!(a.is_closed().await);
    assert!(b.is_closed().await);
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let node = node(test_config());
    node.manager.start().await.unwrap();
    node.manager.stop().await;
    node.manager.stop().await;
    assert!(matches!(
        node.manager.start().await,
        Err(NetworkError::NotRunning)
    ));
}

#[tokio::test]
async fn test_connections_refused_after_stop() {
    let node = node(test_config());
    node.manager.stop().await;
    let (local, _remote) = duplex(1024);
    assert!(matches!(
        node.manager.handle_connection(local).await,
        Err(NetworkError::NotRunning)
    ));
}

#[tokio::test]
async fn test_stop_with_full_consensus_channel() {
    let node = node(test_config().with_receive_channel_capacity(1));
    let _rx = node.manager.take_receiver().unwrap();
    let mut peer = connect(&node.manager).await;

    let votes: Vec<Vote> = (0..3).map(|_| Vote::default()).collect();
    peer.send(Message::encode_list(MessageCode::Vote, &votes))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(STOP_TIMEOUT, node.manager.stop())
        .await
        .expect("stop is not blocked by a full channel");
    assert!(node.manager.peers().is_empty());
}

#[tokio::test]
async fn test_full_channel_only_slows_its_own_peer() {
    let node = node(test_config().with_receive_channel_capacity(1));
    let _rx = node.manager.take_receiver().unwrap();
    let mut flooder = connect(&node.manager).await;
    let mut other = connect(&node.manager).await;

    let votes: Vec<Vote> = (0..3).map(|_| Vote::default()).collect();
    flooder
        .send(Message::encode_list(MessageCode::Vote, &votes))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Outbound traffic to other peers still flows
    node.manager.broadcast_core_block(&Block::default());
    assert!(other.read_msg().await.is_some());
    assert!(flooder.read_msg().await.is_some());
    node.manager.stop().await;
}

#[tokio::test]
async fn test_tcp_end_to_end() {
    init_tracing();
    let server = node(test_config().with_listen_addr("127.0.0.1:0".parse().unwrap()));
    let client = node(test_config());
    let mut server_rx = server.manager.take_receiver().unwrap();
    let mut client_rx = client.manager.take_receiver().unwrap();

    server.manager.start().await.unwrap();
    client.manager.start().await.unwrap();
    let addr = server.manager.local_addr().expect("bound address");

    let server_id = client.manager.connect(addr).await.unwrap();
    assert_eq!(server_id, server.manager.id());
    assert!(wait_until(|| server.manager.peers().len() == 1).await);
    assert!(server
        .manager
        .peers()
        .get(&client.manager.id())
        .is_some());

    server.manager.broadcast_core_block(&Block::default());
    let got = tokio::time::timeout(READ_TIMEOUT, client_rx.recv())
        .await
        .unwrap();
    assert_eq!(got, Some(ConsensusMessage::Block(Block::default())));

    client
        .manager
        .broadcast_agreement_result(&Default::default());
    let got = tokio::time::timeout(READ_TIMEOUT, server_rx.recv())
        .await
        .unwrap();
    assert!(matches!(got, Some(ConsensusMessage::Agreement(_))));

    client.manager.stop().await;
    assert!(wait_until(|| server.manager.peers().is_empty()).await);
    server.manager.stop().await;
}

#[tokio::test]
async fn test_bootstrap_peers_are_dialed() {
    let server = node(test_config().with_listen_addr("127.0.0.1:0".parse().unwrap()));
    server.manager.start().await.unwrap();
    let addr = server.manager.local_addr().unwrap();

    let client = node(test_config().with_bootstrap_peer(addr));
    client.manager.start().await.unwrap();
    assert!(wait_until(|| client.manager.peers().len() == 1).await);

    client.manager.stop().await;
    server.manager.stop().await;
}

#[tokio::test]
async fn test_tcp_handshake_mismatch() {
    let server = node(test_config().with_listen_addr("127.0.0.1:0".parse().unwrap()));
    server.manager.start().await.unwrap();
    let addr = server.manager.local_addr().unwrap();

    let client = node(test_config().with_network_id(999));
    let err = client.manager.connect(addr).await.unwrap_err();
    assert_eq!(err.to_string(), "NetworkId mismatch - 237 (!= 999)");
    assert!(client.manager.peers().is_empty());

    client.manager.stop().await;
    server.manager.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_racing_handshakes_leaves_nothing_running() {
    let node = node(test_config());
    let mut joins = Vec::new();
    for _ in 0..16 {
        let manager = node.manager.clone();
        joins.push(tokio::spawn(async move {
            connect_with_status(&manager, remote_status()).await
        }));
    }
    tokio::task::yield_now().await;
    node.manager.stop().await;
    assert!(node.manager.peers().is_empty());

    for join in joins {
        let (result, mut peer) = join.await.unwrap();
        match result {
            Ok(_) => assert!(peer.is_closed().await),
            Err(e) => assert!(matches!(e, NetworkError::NotRunning), "{}", e),
        }
    }
    assert!(node.manager.peers().is_empty());
}

#[tokio::test]
async fn test_metrics_snapshot() {
    let node = node(test_config());
    let _peer = connect(&node.manager).await;
    node.manager.broadcast_core_block(&Block::default());

    let snapshot = node.manager.metrics_snapshot();
    assert_eq!(snapshot.gauges.get(names::PEERS), Some(&1));
    assert_eq!(snapshot.counter(names::CONSENSUS_SENT), 1);
    assert_eq!(snapshot.histograms[names::HANDSHAKE_DURATION].count, 1);
    let json = snapshot.to_json().unwrap();
    assert!(json.contains(names::PEERS));
    node.manager.stop().await;
}
