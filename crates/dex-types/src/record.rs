//! Signed node records
//!
//! A record is a sequence-numbered set of key/value pairs signed by the
//! node it describes. The `secp256k1` entry carries the node's 64-byte
//! public key; the record's node id is the Keccak-256 of that value.
//!
//! Wire form: `[signature, seq, k1, v1, k2, v2, ...]` with keys sorted and
//! unique. The signature covers `keccak256(rlp([seq, k1, v1, ...]))`.

use crate::codec::bytes_at;
use dex_crypto::{keccak256, recover_public_key, NodeKey, NodePublicKey, Signature};
use dex_primitives::H256;
use dex_rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::collections::BTreeMap;
use thiserror::Error;

/// Key of the entry holding the node public key
pub const IDENTITY_KEY: &str = "secp256k1";

/// Record signing and verification errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// No `secp256k1` entry
    #[error("record has no identity entry")]
    MissingIdentity,

    /// Identity entry is not a valid public key
    #[error("invalid identity entry: {0}")]
    InvalidIdentity(String),

    /// Signature does not match the identity entry
    #[error("record signature mismatch")]
    SignatureMismatch,

    /// Underlying crypto failure
    #[error(transparent)]
    Crypto(#[from] dex_crypto::CryptoError),
}

/// Node record
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct NodeRecord {
    /// Signature over the content, empty when unsigned
    pub signature: Vec<u8>,
    /// Sequence number; higher replaces lower
    pub seq: u64,
    /// Sorted key/value pairs
    pub pairs: BTreeMap<String, Vec<u8>>,
}

impl NodeRecord {
    /// Empty unsigned record
    pub fn new(seq: u64) -> Self {
        NodeRecord {
            seq,
            ..Default::default()
        }
    }

    /// Set an entry, invalidating any signature
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.pairs.insert(key.into(), value.into());
        self.signature.clear();
    }

    /// Get an entry
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.pairs.get(key).map(Vec::as_slice)
    }

    /// Node id derived from the identity entry
    pub fn node_id(&self) -> Option<H256> {
        self.get(IDENTITY_KEY).map(keccak256)
    }

    /// Content hash used for deduplication
    pub fn hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }

    /// Digest covered by the signature
    pub fn signing_hash(&self) -> H256 {
        let mut s = RlpStream::new_list(1 + self.pairs.len() * 2);
        self.append_content(&mut s);
        keccak256(&s.out())
    }

    /// Set the identity entry to `key`'s public key and sign
    pub fn sign(&mut self, key: &NodeKey) -> Result<(), RecordError> {
        self.set(IDENTITY_KEY, key.public().as_bytes().to_vec());
        let sig = key.sign(&self.signing_hash())?;
        self.signature = sig.to_bytes().to_vec();
        Ok(())
    }

    /// Check that the signature was made by the identity entry's key
    pub fn verify(&self) -> Result<(), RecordError> {
        let identity = self.get(IDENTITY_KEY).ok_or(RecordError::MissingIdentity)?;
        let expected = NodePublicKey::from_slice(identity)
            .map_err(|e| RecordError::InvalidIdentity(e.to_string()))?;
        let sig = Signature::from_slice(&self.signature)?;
        let recovered = recover_public_key(&self.signing_hash(), &sig)?;
        if NodePublicKey::from_verifying_key(&recovered) != expected {
            return Err(RecordError::SignatureMismatch);
        }
        Ok(())
    }

    fn append_content(&self, s: &mut RlpStream) {
        s.append(&self.seq);
        for (k, v) in &self.pairs {
            s.append(k);
            s.append(v);
        }
    }
}

impl Encodable for NodeRecord {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2 + self.pairs.len() * 2);
        s.append(&self.signature);
        self.append_content(s);
    }
}

impl Decodable for NodeRecord {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        let count = rlp.item_count()?;
        if count < 2 || count % 2 != 0 {
            return Err(DecoderError::RlpIncorrectListLen);
        }

        let mut pairs = BTreeMap::new();
        let mut last: Option<String> = None;
        for i in (2..count).step_by(2) {
            let key: String = rlp.val_at(i)?;
            if last.as_ref().is_some_and(|prev| *prev >= key) {
                return Err(DecoderError::Custom("record keys not sorted or not unique"));
            }
            last = Some(key.clone());
            pairs.insert(key, bytes_at(rlp, i + 1)?);
        }

        Ok(NodeRecord {
            signature: bytes_at(rlp, 0)?,
            seq: rlp.val_at(1)?,
            pairs,
        })
    }
}
