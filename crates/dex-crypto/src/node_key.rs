//! Node identity keys
//!
//! A node is identified on the wire by its 64-byte uncompressed public key
//! (the SEC1 encoding without the leading `0x04`). The node id used by the
//! consensus layer is the Keccak-256 hash of those 64 bytes.

use crate::{keccak256, sign, CryptoError, PrivateKey, PublicKey, Signature};
use dex_primitives::H256;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use std::fmt;

/// Length of a node public key on the wire
pub const NODE_PUBLIC_KEY_LENGTH: usize = 64;

/// Uncompressed secp256k1 public key without the SEC1 tag byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodePublicKey([u8; NODE_PUBLIC_KEY_LENGTH]);

impl NodePublicKey {
    /// Encode a verifying key
    pub fn from_verifying_key(key: &PublicKey) -> Self {
        let point = key.to_encoded_point(false);
        let mut bytes = [0u8; NODE_PUBLIC_KEY_LENGTH];
        // Uncompressed points are always 65 bytes: 0x04 || x || y
        bytes.copy_from_slice(&point.as_bytes()[1..]);
        NodePublicKey(bytes)
    }

    /// Parse from a 64-byte slice, checking that it is a curve point
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != NODE_PUBLIC_KEY_LENGTH {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected {} bytes, got {}",
                NODE_PUBLIC_KEY_LENGTH,
                slice.len()
            )));
        }
        let mut bytes = [0u8; NODE_PUBLIC_KEY_LENGTH];
        bytes.copy_from_slice(slice);
        let key = NodePublicKey(bytes);
        key.to_verifying_key()?;
        Ok(key)
    }

    /// Decode into a verifying key
    pub fn to_verifying_key(&self) -> Result<PublicKey, CryptoError> {
        let mut sec1 = [0u8; NODE_PUBLIC_KEY_LENGTH + 1];
        sec1[0] = 0x04;
        sec1[1..].copy_from_slice(&self.0);
        PublicKey::from_sec1_bytes(&sec1).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; NODE_PUBLIC_KEY_LENGTH] {
        &self.0
    }

    /// Node id: keccak256 of the 64 key bytes
    pub fn id(&self) -> H256 {
        keccak256(&self.0)
    }
}

impl fmt::Debug for NodePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodePublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for NodePublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A node's private key together with its cached public key.
#[derive(Clone)]
pub struct NodeKey {
    secret: PrivateKey,
    public: NodePublicKey,
}

impl NodeKey {
    /// Generate a fresh random key
    pub fn random() -> Self {
        Self::from_private_key(PrivateKey::random(&mut OsRng))
    }

    /// Wrap an existing private key
    pub fn from_private_key(secret: PrivateKey) -> Self {
        let public = NodePublicKey::from_verifying_key(secret.verifying_key());
        NodeKey { secret, public }
    }

    /// Load from 32 secret bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = PrivateKey::from_slice(bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_private_key(secret))
    }

    /// Public half
    pub fn public(&self) -> NodePublicKey {
        self.public
    }

    /// Node id of this key
    pub fn id(&self) -> H256 {
        self.public.id()
    }

    /// Sign a digest
    pub fn sign(&self, digest: &H256) -> Result<Signature, CryptoError> {
        sign(digest, &self.secret)
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
