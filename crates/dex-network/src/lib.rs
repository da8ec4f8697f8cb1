//! # dex-network
//!
//! Peer protocol for the DEX node.
//!
//! This crate provides:
//! - Length-prefixed message framing and the protocol message codes
//! - Session authentication of the remote node key
//! - Status handshake with ordered, distinguishable failures
//! - A peer set with `(role, round)` labels, direct peers and identity lookup
//! - Transaction and node record relay with bounded per-peer dedup
//! - Consensus relay into one aggregated channel
//!
//! ## Architecture
//!
//! ```text
//! +-------------------+
//! |  ProtocolManager  |  <- Lifecycle, broadcast API
//! +-------------------+
//!          |
//! +--------+--------+
//! | Listen | Connect|  <- TCP, or any AsyncRead + AsyncWrite
//! +--------+--------+
//!          |
//! +-------------------+
//! | session/handshake |  <- Auth, then Status
//! +-------------------+
//!          |
//! +-------------------+      +-------------------+
//! |  reader / writer  | ---> | Tx / Record /     |
//! |  task per peer    |      | Consensus relays  |
//! +-------------------+      +-------------------+
//!          |                          |
//! +-------------------+      +-------------------+
//! |     PeerSet       |      |  TxPool, Records, |
//! +-------------------+      |  consensus engine |
//!                            +-------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use dex_network::{Backend, ProtocolConfig, ProtocolManager, PeerLabel};
//!
//! let config = ProtocolConfig::default()
//!     .with_dmoment(dmoment)
//!     .with_listen_addr("0.0.0.0:30303".parse()?);
//! let manager = ProtocolManager::new(config, node_key, Backend::new(pool, records, chain));
//! let mut inbound = manager.take_receiver().unwrap();
//!
//! manager.start().await?;
//! manager.peers().associate_label(&peer_id, PeerLabel::notary(round))?;
//! manager.broadcast_vote(&vote);
//!
//! while let Some(msg) = inbound.recv().await {
//!     // hand to the consensus engine
//! }
//! manager.stop().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
mod config;
mod consensus;
mod error;
mod feed;
pub mod handshake;
mod node_table;
mod peer;
mod peer_set;
mod relay;
mod service;
pub mod session;
mod traits;
mod types;

pub use codec::{Message, MessageCode, MessageCodec, DEFAULT_MAX_MESSAGE_SIZE, PROTOCOL_LENGTH};
pub use config::{ProtocolConfig, DEFAULT_NETWORK_ID, PROTOCOL_VERSION};
pub use consensus::{ConsensusMessage, ConsensusRelay};
pub use error::{CollaboratorError, DeliveryError, NetworkError, NetworkResult, ProtocolError};
pub use feed::Feed;
pub use node_table::NodeTable;
pub use peer::{KnownCache, Peer, DEFAULT_KNOWN_CACHE_CAPACITY};
pub use peer_set::PeerSet;
pub use relay::{RecordRelay, TxRelay};
pub use service::ProtocolManager;
pub use traits::{Backend, ChainStore, RecordTable, SyncHandler, TxPool};
pub use types::{
    AmbiguousOrigin, GetBlockHeadersData, HashOrNumber, PeerId, PeerLabel, PeerRole, StatusData,
};
