//! Consensus artifacts exchanged between BFT participants
//!
//! The relay layer treats these as opaque payloads: it encodes, decodes,
//! hashes and routes them, and never checks signatures or contents.
//! Routing uses only `Vote::header.position.round`, `PartialSignature::round`
//! and the recipient of a `PrivateShare`.

use crate::codec::{bytes_at, expect_list};
use dex_primitives::{BlockNumber, Round, H256};
use dex_rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

// ============================================================================
// Common building blocks
// ============================================================================

/// Consensus-layer node identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodeId(pub H256);

impl Encodable for NodeId {
    fn rlp_append(&self, s: &mut RlpStream) {
        self.0.rlp_append(s);
    }
}

impl Decodable for NodeId {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(NodeId(H256::decode(rlp)?))
    }
}

/// Position in the consensus timeline
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Position {
    /// Consensus round
    pub round: Round,
    /// Height within the chain
    pub height: BlockNumber,
}

impl Encodable for Position {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.round);
        s.append(&self.height);
    }
}

impl Decodable for Position {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 2)?;
        Ok(Position {
            round: rlp.val_at(0)?,
            height: rlp.val_at(1)?,
        })
    }
}

/// Signature tagged with its scheme name
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TypedSignature {
    /// Scheme name
    pub sig_type: String,
    /// Raw signature bytes
    pub data: Vec<u8>,
}

impl TypedSignature {
    /// Build from a scheme name and bytes
    pub fn new(sig_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        TypedSignature {
            sig_type: sig_type.into(),
            data: data.into(),
        }
    }
}

impl Encodable for TypedSignature {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.sig_type);
        s.append(&self.data);
    }
}

impl Decodable for TypedSignature {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 2)?;
        Ok(TypedSignature {
            sig_type: rlp.val_at(0)?,
            data: bytes_at(rlp, 1)?,
        })
    }
}

// ============================================================================
// Block
// ============================================================================

/// Witness data attached to a block
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Witness {
    /// Witnessed height
    pub height: BlockNumber,
    /// Opaque witness payload
    pub data: Vec<u8>,
}

impl Encodable for Witness {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.height);
        s.append(&self.data);
    }
}

impl Decodable for Witness {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 2)?;
        Ok(Witness {
            height: rlp.val_at(0)?,
            data: bytes_at(rlp, 1)?,
        })
    }
}

/// Finalization data of a block
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct FinalizationResult {
    /// Randomness bytes
    pub randomness: Vec<u8>,
    /// Finalization time, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Finalized height
    pub height: BlockNumber,
}

impl Encodable for FinalizationResult {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.randomness);
        s.append(&self.timestamp);
        s.append(&self.height);
    }
}

impl Decodable for FinalizationResult {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 3)?;
        Ok(FinalizationResult {
            randomness: bytes_at(rlp, 0)?,
            timestamp: rlp.val_at(1)?,
            height: rlp.val_at(2)?,
        })
    }
}

/// Consensus block
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Block {
    /// Proposer
    pub proposer_id: NodeId,
    /// Parent block hash
    pub parent_hash: H256,
    /// Block hash as computed by the consensus engine
    pub hash: H256,
    /// Position
    pub position: Position,
    /// Proposal time, milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Acknowledged block hashes
    pub acks: Vec<H256>,
    /// Opaque payload
    pub payload: Vec<u8>,
    /// Witness
    pub witness: Witness,
    /// Finalization result
    pub finalization: FinalizationResult,
    /// Proposer signature
    pub signature: TypedSignature,
    /// CRS signature
    pub crs_signature: TypedSignature,
}

impl Block {
    /// Content hash of the encoded block
    pub fn content_hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(11);
        s.append(&self.proposer_id);
        s.append(&self.parent_hash);
        s.append(&self.hash);
        s.append(&self.position);
        s.append(&self.timestamp);
        s.append_list(&self.acks);
        s.append(&self.payload);
        s.append(&self.witness);
        s.append(&self.finalization);
        s.append(&self.signature);
        s.append(&self.crs_signature);
    }
}

impl Decodable for Block {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 11)?;
        Ok(Block {
            proposer_id: rlp.val_at(0)?,
            parent_hash: rlp.val_at(1)?,
            hash: rlp.val_at(2)?,
            position: rlp.val_at(3)?,
            timestamp: rlp.val_at(4)?,
            acks: rlp.list_at(5)?,
            payload: bytes_at(rlp, 6)?,
            witness: rlp.val_at(7)?,
            finalization: rlp.val_at(8)?,
            signature: rlp.val_at(9)?,
            crs_signature: rlp.val_at(10)?,
        })
    }
}

// ============================================================================
// Votes and agreement
// ============================================================================

/// Vote type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum VoteType {
    /// Initial vote
    #[default]
    Init = 0,
    /// Pre-commit
    PreCommit = 1,
    /// Commit
    Commit = 2,
    /// Fast path vote
    Fast = 3,
    /// Fast path commit
    FastCommit = 4,
}

impl TryFrom<u8> for VoteType {
    type Error = DecoderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VoteType::Init),
            1 => Ok(VoteType::PreCommit),
            2 => Ok(VoteType::Commit),
            3 => Ok(VoteType::Fast),
            4 => Ok(VoteType::FastCommit),
            _ => Err(DecoderError::Custom("unknown vote type")),
        }
    }
}

/// Signed part of a vote
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct VoteHeader {
    /// Voter
    pub proposer_id: NodeId,
    /// Vote type
    pub vote_type: VoteType,
    /// Block voted for
    pub block_hash: H256,
    /// Agreement period
    pub period: u64,
    /// Position; its round selects the notary set that receives the vote
    pub position: Position,
}

impl Encodable for VoteHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.proposer_id);
        s.append(&(self.vote_type as u8));
        s.append(&self.block_hash);
        s.append(&self.period);
        s.append(&self.position);
    }
}

impl Decodable for VoteHeader {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 5)?;
        let vote_type: u8 = rlp.val_at(1)?;
        Ok(VoteHeader {
            proposer_id: rlp.val_at(0)?,
            vote_type: VoteType::try_from(vote_type)?,
            block_hash: rlp.val_at(2)?,
            period: rlp.val_at(3)?,
            position: rlp.val_at(4)?,
        })
    }
}

/// Agreement vote
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Vote {
    /// Header
    pub header: VoteHeader,
    /// Voter signature
    pub signature: TypedSignature,
}

impl Vote {
    /// Round of the notary set this vote belongs to
    pub fn round(&self) -> Round {
        self.header.position.round
    }

    /// Content hash of the encoded vote
    pub fn hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }
}

impl Encodable for Vote {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.header);
        s.append(&self.signature);
    }
}

impl Decodable for Vote {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 2)?;
        Ok(Vote {
            header: rlp.val_at(0)?,
            signature: rlp.val_at(1)?,
        })
    }
}

/// Proof that a block reached agreement
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AgreementResult {
    /// Agreed block
    pub block_hash: H256,
    /// Position
    pub position: Position,
    /// Supporting votes
    pub votes: Vec<Vote>,
    /// Whether the agreed block is empty
    pub is_empty_block: bool,
}

impl AgreementResult {
    /// Content hash of the encoded result
    pub fn hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }
}

impl Encodable for AgreementResult {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.block_hash);
        s.append(&self.position);
        s.append_list(&self.votes);
        s.append(&self.is_empty_block);
    }
}

impl Decodable for AgreementResult {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 4)?;
        Ok(AgreementResult {
            block_hash: rlp.val_at(0)?,
            position: rlp.val_at(1)?,
            votes: rlp.list_at(2)?,
            is_empty_block: rlp.val_at(3)?,
        })
    }
}

/// Randomness produced for a block
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RandomnessResult {
    /// Block the randomness belongs to
    pub block_hash: H256,
    /// Position
    pub position: Position,
    /// Randomness bytes
    pub randomness: Vec<u8>,
}

impl RandomnessResult {
    /// Content hash of the encoded result
    pub fn hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }
}

impl Encodable for RandomnessResult {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.block_hash);
        s.append(&self.position);
        s.append(&self.randomness);
    }
}

impl Decodable for RandomnessResult {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 3)?;
        Ok(RandomnessResult {
            block_hash: rlp.val_at(0)?,
            position: rlp.val_at(1)?,
            randomness: bytes_at(rlp, 2)?,
        })
    }
}

// ============================================================================
// DKG
// ============================================================================

/// DKG private share addressed to a single receiver
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PrivateShare {
    /// Sender
    pub proposer_id: NodeId,
    /// Intended receiver
    pub receiver_id: NodeId,
    /// DKG round
    pub round: Round,
    /// Opaque share bytes
    pub private_share: Vec<u8>,
    /// Sender signature
    pub signature: TypedSignature,
}

impl PrivateShare {
    /// Content hash of the encoded share
    pub fn hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }
}

impl Encodable for PrivateShare {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.proposer_id);
        s.append(&self.receiver_id);
        s.append(&self.round);
        s.append(&self.private_share);
        s.append(&self.signature);
    }
}

impl Decodable for PrivateShare {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 5)?;
        Ok(PrivateShare {
            proposer_id: rlp.val_at(0)?,
            receiver_id: rlp.val_at(1)?,
            round: rlp.val_at(2)?,
            private_share: bytes_at(rlp, 3)?,
            signature: rlp.val_at(4)?,
        })
    }
}

/// DKG partial signature, sent to the DKG set of its round
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PartialSignature {
    /// Signer
    pub proposer_id: NodeId,
    /// DKG round
    pub round: Round,
    /// Signed hash
    pub hash: H256,
    /// Partial signature bytes
    pub partial_signature: Vec<u8>,
    /// Signer signature over the message
    pub signature: TypedSignature,
}

impl PartialSignature {
    /// Content hash of the encoded message
    pub fn content_hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }
}

impl Encodable for PartialSignature {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.proposer_id);
        s.append(&self.round);
        s.append(&self.hash);
        s.append(&self.partial_signature);
        s.append(&self.signature);
    }
}

impl Decodable for PartialSignature {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 5)?;
        Ok(PartialSignature {
            proposer_id: rlp.val_at(0)?,
            round: rlp.val_at(1)?,
            hash: rlp.val_at(2)?,
            partial_signature: bytes_at(rlp, 3)?,
            signature: rlp.val_at(4)?,
        })
    }
}
