//! Protocol manager configuration

use crate::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::peer::DEFAULT_KNOWN_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Protocol version spoken by this implementation
pub const PROTOCOL_VERSION: u32 = 64;

/// Default network id
pub const DEFAULT_NETWORK_ID: u64 = 237;

/// Protocol manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Network id
    pub network_id: u64,
    /// Protocol version
    pub protocol_version: u32,
    /// Genesis moment shared by the network
    pub dmoment: u64,
    /// TCP listen address; no listener when unset
    pub listen_addr: Option<SocketAddr>,
    /// Peers dialed on start
    pub bootstrap_peers: Vec<SocketAddr>,
    /// Maximum Active peers
    pub max_peers: usize,
    /// Bound on session auth plus status handshake
    pub handshake_timeout_ms: u64,
    /// Outbound queue length per peer
    pub peer_queue_capacity: usize,
    /// Capacity of the aggregated consensus channel
    pub receive_channel_capacity: usize,
    /// Frame size limit in bytes
    pub max_message_size: usize,
    /// Soft byte limit of one outbound transaction pack
    pub tx_pack_size: usize,
    /// Capacity of each per-peer known-hash set
    pub known_cache_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            network_id: DEFAULT_NETWORK_ID,
            protocol_version: PROTOCOL_VERSION,
            dmoment: 0,
            listen_addr: None,
            bootstrap_peers: Vec::new(),
            max_peers: 50,
            handshake_timeout_ms: 5_000,
            peer_queue_capacity: 1024,
            receive_channel_capacity: 100_000,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            tx_pack_size: 100 * 1024,
            known_cache_capacity: DEFAULT_KNOWN_CACHE_CAPACITY,
        }
    }
}

impl ProtocolConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Handshake timeout
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Set network id
    pub fn with_network_id(mut self, network_id: u64) -> Self {
        self.network_id = network_id;
        self
    }

    /// Set protocol version
    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set dMoment
    pub fn with_dmoment(mut self, dmoment: u64) -> Self {
        self.dmoment = dmoment;
        self
    }

    /// Set listen address
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Add a bootstrap peer
    pub fn with_bootstrap_peer(mut self, addr: SocketAddr) -> Self {
        self.bootstrap_peers.push(addr);
        self
    }

    /// Set max peers
    pub fn with_max_peers(mut self, max_peers: usize) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Set handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set per-peer queue capacity
    pub fn with_peer_queue_capacity(mut self, capacity: usize) -> Self {
        self.peer_queue_capacity = capacity;
        self
    }

    /// Set aggregated channel capacity
    pub fn with_receive_channel_capacity(mut self, capacity: usize) -> Self {
        self.receive_channel_capacity = capacity;
        self
    }

    /// Set frame size limit
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set transaction pack size
    pub fn with_tx_pack_size(mut self, size: usize) -> Self {
        self.tx_pack_size = size;
        self
    }

    /// Set known-hash set capacity
    pub fn with_known_cache_capacity(mut self, capacity: usize) -> Self {
        self.known_cache_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProtocolConfig::default();
        assert_eq!(config.network_id, 237);
        assert_eq!(config.protocol_version, 64);
        assert_eq!(config.max_peers, 50);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.receive_channel_capacity, 100_000);
        assert_eq!(config.max_message_size, 10 * 1024 * 1024);
        assert_eq!(config.tx_pack_size, 100 * 1024);
        assert_eq!(config.known_cache_capacity, 32768);
        assert!(config.listen_addr.is_none());
    }

    #[test]
    fn test_builders() {
        let addr: SocketAddr = "127.0.0.1:30303".parse().unwrap();
        let config = ProtocolConfig::default()
            .with_network_id(999)
            .with_dmoment(123456)
            .with_listen_addr(addr)
            .with_bootstrap_peer(addr)
            .with_handshake_timeout(Duration::from_millis(250));
        assert_eq!(config.network_id, 999);
        assert_eq!(config.dmoment, 123456);
        assert_eq!(config.listen_addr, Some(addr));
        assert_eq!(config.bootstrap_peers, vec![addr]);
        assert_eq!(config.handshake_timeout_ms, 250);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ProtocolConfig::from_json(r#"{"network_id": 1, "listen_addr": "0.0.0.0:30303"}"#)
                .unwrap();
        assert_eq!(config.network_id, 1);
        assert_eq!(config.protocol_version, 64);
        assert!(config.listen_addr.is_some());
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        assert!(ProtocolConfig::from_json(r#"{"max_peers": "many"}"#).is_err());
    }
}
