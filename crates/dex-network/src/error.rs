//! Network error types

use crate::types::PeerId;
use dex_rlp::DecoderError;
use thiserror::Error;

/// Errors that end a peer connection.
///
/// Display text is `<Kind> - <detail>` and is part of the wire contract:
/// callers and tests match on it byte for byte.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// First message after session setup was not `Status`
    #[error("No status message - first msg has code {got:x} (!= {want:x})")]
    NoStatusMsg {
        /// Observed code
        got: u64,
        /// Status code
        want: u64,
    },

    /// Protocol version differs
    #[error("Protocol version mismatch - {got} (!= {want})")]
    ProtocolVersionMismatch {
        /// Remote version
        got: u32,
        /// Local version
        want: u32,
    },

    /// Network id differs
    #[error("NetworkId mismatch - {got} (!= {want})")]
    NetworkIdMismatch {
        /// Remote network id
        got: u64,
        /// Local network id
        want: u64,
    },

    /// Genesis moment differs
    #[error("DMoment mismatch - {got} (!= {want})")]
    DMomentMismatch {
        /// Remote dMoment
        got: u64,
        /// Local dMoment
        want: u64,
    },

    /// Genesis block hash differs
    #[error("Genesis block mismatch - {} (!= {})", .got.abbrev(), .want.abbrev())]
    GenesisBlockMismatch {
        /// Remote genesis hash
        got: dex_primitives::H256,
        /// Local genesis hash
        want: dex_primitives::H256,
    },

    /// `Status` received after the handshake completed
    #[error("Extra status message - uncontrolled status message")]
    ExtraStatusMsg,

    /// Frame larger than the configured limit
    #[error("Message too long - {size} > {max}")]
    MsgTooLarge {
        /// Announced frame size
        size: usize,
        /// Limit
        max: usize,
    },

    /// Malformed payload for a known code
    #[error("Invalid message - {0}")]
    Decode(String),

    /// Code outside the protocol's message space
    #[error("Invalid message code - {0}")]
    InvalidMsgCode(u64),
}

impl From<DecoderError> for ProtocolError {
    fn from(err: DecoderError) -> Self {
        ProtocolError::Decode(err.to_string())
    }
}

/// Error reported by a collaborator (pool, sync handler)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Input rejected; the connection that delivered it stays up
    #[error("rejected: {0}")]
    Rejected(String),

    /// Local state is corrupted; the triggering connection is dropped
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Network errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol violation by the remote
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session authentication failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Remote presented our own node key
    #[error("connected to self")]
    SelfConnection,

    /// Timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// Peer not registered
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    /// Peer already registered
    #[error("peer already registered: {0}")]
    AlreadyRegistered(PeerId),

    /// Peer limit reached
    #[error("too many peers (max {0})")]
    TooManyPeers(usize),

    /// Already running
    #[error("protocol manager already running")]
    AlreadyRunning,

    /// Not running, or already stopped
    #[error("protocol manager not running")]
    NotRunning,

    /// Channel closed
    #[error("channel closed")]
    ChannelClosed,

    /// Collaborator failure
    #[error("collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}

impl From<DecoderError> for NetworkError {
    fn from(err: DecoderError) -> Self {
        NetworkError::Protocol(err.into())
    }
}

impl NetworkError {
    /// Whether the connection that produced this error must be closed
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            NetworkError::Collaborator(CollaboratorError::Rejected(_))
        )
    }
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Failure to hand a message to one specific peer. Never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// No connected peer has this identity
    #[error("recipient not connected: {0}")]
    UnknownRecipient(String),

    /// The peer's outbound queue is full
    #[error("outbound queue full for peer {0}")]
    QueueFull(PeerId),

    /// The peer's writer has gone away
    #[error("peer {0} disconnected")]
    Disconnected(PeerId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use dex_primitives::H256;

    #[test]
    fn test_no_status_text() {
        let err = ProtocolError::NoStatusMsg { got: 2, want: 0 };
        assert_eq!(
            err.to_string(),
            "No status message - first msg has code 2 (!= 0)"
        );
        // Codes render in hex
        let err = ProtocolError::NoStatusMsg { got: 0x13, want: 0 };
        assert_eq!(
            err.to_string(),
            "No status message - first msg has code 13 (!= 0)"
        );
    }

    #[test]
    fn test_mismatch_texts() {
        assert_eq!(
            ProtocolError::ProtocolVersionMismatch { got: 10, want: 64 }.to_string(),
            "Protocol version mismatch - 10 (!= 64)"
        );
        assert_eq!(
            ProtocolError::NetworkIdMismatch { got: 999, want: 237 }.to_string(),
            "NetworkId mismatch - 999 (!= 237)"
        );
        assert_eq!(
            ProtocolError::DMomentMismatch {
                got: 123450,
                want: 123456
            }
            .to_string(),
            "DMoment mismatch - 123450 (!= 123456)"
        );
    }

    #[test]
    fn test_genesis_mismatch_uses_prefix() {
        let err = ProtocolError::GenesisBlockMismatch {
            got: H256::with_prefix(&[3]),
            want: H256::from_bytes([0xab; 32]),
        };
        assert_eq!(
            err.to_string(),
            "Genesis block mismatch - 0300000000000000 (!= abababababababab)"
        );
    }

    #[test]
    fn test_other_protocol_texts() {
        assert_eq!(
            ProtocolError::ExtraStatusMsg.to_string(),
            "Extra status message - uncontrolled status message"
        );
        assert_eq!(
            ProtocolError::MsgTooLarge { size: 11, max: 10 }.to_string(),
            "Message too long - 11 > 10"
        );
        assert_eq!(
            ProtocolError::InvalidMsgCode(0x42).to_string(),
            "Invalid message code - 66"
        );
    }

    #[test]
    fn test_protocol_error_is_transparent() {
        let err: NetworkError = ProtocolError::ProtocolVersionMismatch { got: 1, want: 2 }.into();
        assert_eq!(err.to_string(), "Protocol version mismatch - 1 (!= 2)");
    }

    #[test]
    fn test_decoder_error_conversion() {
        let err: NetworkError = DecoderError::RlpIsTooShort.into();
        assert!(matches!(err, NetworkError::Protocol(ProtocolError::Decode(_))));
        assert!(err.to_string().starts_with("Invalid message - "));
    }

    #[test]
    fn test_error_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: NetworkError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(!NetworkError::Collaborator(CollaboratorError::Rejected("nonce".into())).is_fatal());
        assert!(NetworkError::Collaborator(CollaboratorError::Fatal("db".into())).is_fatal());
        assert!(NetworkError::Protocol(ProtocolError::ExtraStatusMsg).is_fatal());
        assert!(NetworkError::ChannelClosed.is_fatal());
    }

    #[test]
    fn test_delivery_error_text() {
        let id = PeerId::from(H256::from_bytes([0x11; 32]));
        assert_eq!(
            DeliveryError::QueueFull(id).to_string(),
            "outbound queue full for peer 1111111111111111"
        );
    }

    #[test]
    fn test_network_result_err() {
        let result: NetworkResult<u32> = Err(NetworkError::NotRunning);
        assert!(matches!(result, Err(NetworkError::NotRunning)));
    }
}
