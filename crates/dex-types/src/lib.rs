//! # dex-types
//!
//! Payload types carried by the DEX peer protocol.
//!
//! This crate provides:
//! - [`Transaction`](transaction::Transaction) - Signed transactions relayed between pools
//! - [`NodeRecord`](record::NodeRecord) - Signed node records shared for discovery
//! - Consensus artifacts ([`Block`], [`Vote`], [`AgreementResult`],
//!   [`RandomnessResult`], [`PrivateShare`], [`PartialSignature`])
//!
//! Every type has a canonical RLP encoding; its content hash is the
//! Keccak-256 of that encoding.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod codec;
pub mod consensus;
pub mod record;
pub mod transaction;

pub use consensus::{
    AgreementResult, Block, FinalizationResult, NodeId, PartialSignature, Position,
    PrivateShare, RandomnessResult, TypedSignature, Vote, VoteHeader, VoteType, Witness,
};
pub use record::{NodeRecord, RecordError, IDENTITY_KEY};
pub use transaction::Transaction;
