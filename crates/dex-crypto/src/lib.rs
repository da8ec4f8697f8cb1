//! # dex-crypto
//!
//! Cryptographic primitives for the DEX node.
//!
//! - Keccak-256 hashing
//! - ECDSA signing and public key recovery (secp256k1)
//! - Node keys: the 64-byte node public key and the node id derived from it

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod node_key;
mod signature;

pub use error::CryptoError;
pub use hash::{keccak256, keccak256_concat};
pub use node_key::{NodeKey, NodePublicKey, NODE_PUBLIC_KEY_LENGTH};
pub use signature::{recover_public_key, sign, verify, PrivateKey, PublicKey, Signature};
