//! Protocol data types

use dex_crypto::NodePublicKey;
use dex_primitives::{BlockNumber, Round, H256};
use dex_rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use std::fmt;
use thiserror::Error;

/// Peer identifier: Keccak-256 of the peer's 64-byte node public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub H256);

impl PeerId {
    /// Derive from a node public key
    pub fn from_public_key(key: &NodePublicKey) -> Self {
        PeerId(key.id())
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<H256> for PeerId {
    fn from(hash: H256) -> Self {
        PeerId(hash)
    }
}

impl From<&NodePublicKey> for PeerId {
    fn from(key: &NodePublicKey) -> Self {
        PeerId::from_public_key(key)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0.abbrev())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.abbrev())
    }
}

/// Consensus role a peer can be labeled with for a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeerRole {
    /// Notary set member
    Notary,
    /// DKG set member
    Dkg,
}

/// `(role, round)` pair scoping role-restricted broadcasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerLabel {
    /// Role
    pub role: PeerRole,
    /// Round
    pub round: Round,
}

impl PeerLabel {
    /// Notary set of `round`
    pub const fn notary(round: Round) -> Self {
        PeerLabel {
            role: PeerRole::Notary,
            round,
        }
    }

    /// DKG set of `round`
    pub const fn dkg(round: Round) -> Self {
        PeerLabel {
            role: PeerRole::Dkg,
            round,
        }
    }
}

impl fmt::Display for PeerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.role, self.round)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Handshake payload, exchanged once per connection.
///
/// RLP: `[protocol_version, network_id, dmoment, number, current_block, genesis_block]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusData {
    /// Protocol version
    pub protocol_version: u32,
    /// Network id
    pub network_id: u64,
    /// Genesis moment shared by the network
    pub dmoment: u64,
    /// Head block number, informational
    pub number: BlockNumber,
    /// Head block hash, informational
    pub current_block: H256,
    /// Genesis block hash
    pub genesis_block: H256,
}

impl Encodable for StatusData {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.protocol_version);
        s.append(&self.network_id);
        s.append(&self.dmoment);
        s.append(&self.number);
        s.append(&self.current_block);
        s.append(&self.genesis_block);
    }
}

impl Decodable for StatusData {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(StatusData {
            protocol_version: rlp.val_at(0)?,
            network_id: rlp.val_at(1)?,
            dmoment: rlp.val_at(2)?,
            number: rlp.val_at(3)?,
            current_block: rlp.val_at(4)?,
            genesis_block: rlp.val_at(5)?,
        })
    }
}

// ============================================================================
// HashOrNumber
// ============================================================================

/// Encoding error for a [`HashOrNumber`] with both fields set
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("both origin hash ({}) and number ({number}) provided", hex::encode(.hash.as_bytes()))]
pub struct AmbiguousOrigin {
    /// Hash field
    pub hash: H256,
    /// Number field
    pub number: u64,
}

/// Query origin: either a block hash or a block number.
///
/// A zero hash means "hash unset" and a zero number means "number unset".
/// Setting both is a caller bug and encoding fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashOrNumber {
    /// Block hash
    pub hash: H256,
    /// Block number
    pub number: u64,
}

impl HashOrNumber {
    /// Origin by hash
    pub fn from_hash(hash: H256) -> Self {
        HashOrNumber { hash, number: 0 }
    }

    /// Origin by number
    pub fn from_number(number: u64) -> Self {
        HashOrNumber {
            hash: H256::ZERO,
            number,
        }
    }

    /// Append to `s`, or fail without writing anything when both fields are set.
    pub fn try_rlp_append(&self, s: &mut RlpStream) -> Result<(), AmbiguousOrigin> {
        if !self.hash.is_zero() && self.number != 0 {
            return Err(AmbiguousOrigin {
                hash: self.hash,
                number: self.number,
            });
        }
        if self.hash.is_zero() {
            s.append(&self.number);
        } else {
            s.append(&self.hash);
        }
        Ok(())
    }

    /// Standalone RLP encoding
    pub fn to_rlp(&self) -> Result<Vec<u8>, AmbiguousOrigin> {
        let mut s = RlpStream::new();
        self.try_rlp_append(&mut s)?;
        Ok(s.out().to_vec())
    }
}

impl Decodable for HashOrNumber {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if !rlp.is_data() {
            return Err(DecoderError::RlpExpectedToBeData);
        }
        match rlp.size() {
            32 => Ok(HashOrNumber::from_hash(rlp.as_val()?)),
            n if n <= 8 => Ok(HashOrNumber::from_number(rlp.as_val()?)),
            _ => Err(DecoderError::Custom("invalid input size for origin")),
        }
    }
}

/// Block header range query
///
/// RLP: `[origin, amount, skip, reverse]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GetBlockHeadersData {
    /// First block of the range
    pub origin: HashOrNumber,
    /// Maximum number of headers
    pub amount: u64,
    /// Blocks to skip between headers
    pub skip: u64,
    /// Walk towards genesis
    pub reverse: bool,
}

impl GetBlockHeadersData {
    /// RLP encoding, failing on an ambiguous origin
    pub fn to_rlp(&self) -> Result<Vec<u8>, AmbiguousOrigin> {
        let mut s = RlpStream::new_list(4);
        self.origin.try_rlp_append(&mut s)?;
        s.append(&self.amount);
        s.append(&self.skip);
        s.append(&self.reverse);
        Ok(s.out().to_vec())
    }
}

impl Decodable for GetBlockHeadersData {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(GetBlockHeadersData {
            origin: rlp.val_at(0)?,
            amount: rlp.val_at(1)?,
            skip: rlp.val_at(2)?,
            reverse: rlp.val_at(3)?,
        })
    }
}
