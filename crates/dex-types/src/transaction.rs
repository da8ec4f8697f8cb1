//! Legacy-format signed transactions
//!
//! The relay layer never validates transactions; it only needs a stable
//! encoding and a content hash for deduplication.

use crate::codec::{bytes_at, expect_list};
use dex_primitives::{H160, H256};
use dex_rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// Signed transaction: `[nonce, gas_price, gas_limit, to, value, payload, v, r, s]`
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Transaction {
    /// Sender nonce
    pub nonce: u64,
    /// Gas price
    pub gas_price: u64,
    /// Gas limit
    pub gas_limit: u64,
    /// Recipient, `None` for contract creation
    pub to: Option<H160>,
    /// Transferred value
    pub value: u64,
    /// Call data or init code
    pub payload: Vec<u8>,
    /// Signature recovery value
    pub v: u64,
    /// Signature r
    pub r: H256,
    /// Signature s
    pub s: H256,
}

impl Transaction {
    /// Content hash: keccak256 of the RLP encoding
    pub fn hash(&self) -> H256 {
        dex_rlp::rlp_hash(self)
    }

    /// Length of the RLP encoding in bytes
    pub fn encoded_len(&self) -> usize {
        dex_rlp::encode(self).len()
    }
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(9);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.payload);
        s.append(&self.v);
        s.append(&self.r);
        s.append(&self.s);
    }
}

impl Decodable for Transaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, 9)?;
        let to = {
            let item = rlp.at(3)?;
            if item.is_empty() {
                None
            } else {
                Some(item.as_val()?)
            }
        };
        Ok(Transaction {
            nonce: rlp.val_at(0)?,
            gas_price: rlp.val_at(1)?,
            gas_limit: rlp.val_at(2)?,
            to,
            value: rlp.val_at(4)?,
            payload: bytes_at(rlp, 5)?,
            v: rlp.val_at(6)?,
            r: rlp.val_at(7)?,
            s: rlp.val_at(8)?,
        })
    }
}
