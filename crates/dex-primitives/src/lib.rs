//! # dex-primitives
//!
//! Fixed-size hash types shared by every DEX node crate.
//!
//! With the `rlp` feature enabled, both hash types encode as RLP byte
//! strings of their exact length and reject any other length on decode.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod hash;

pub use hash::{Hash, HashError, H160, H256};

/// Block height type
pub type BlockNumber = u64;

/// Consensus round type
pub type Round = u64;
