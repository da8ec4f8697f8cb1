//! # dex-rlp
//!
//! RLP (Recursive Length Prefix) helpers shared by the DEX node crates.
//!
//! Wraps the `rlp` crate with fallible entry points that never panic on
//! malformed input, plus the content hash used for transactions and blocks.
//!
//! ## RLP Encoding Rules
//!
//! - Single byte `[0x00, 0x7f]`: itself
//! - Short string (0-55 bytes): `0x80 + len` + data
//! - Long string (>55 bytes): `0xb7 + len_of_len` + len + data
//! - Short list (0-55 bytes payload): `0xc0 + len` + items
//! - Long list (>55 bytes payload): `0xf7 + len_of_len` + len + items

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export rlp crate for direct use
pub use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

pub use dex_primitives::{H160, H256};

/// Encode a value to RLP bytes
pub fn encode<T: Encodable>(value: &T) -> Vec<u8> {
    rlp::encode(value).to_vec()
}

/// Decode RLP bytes to a value
pub fn decode<T: Decodable>(data: &[u8]) -> Result<T, DecoderError> {
    rlp::decode(data)
}

/// Decode a value that must span the whole input.
///
/// Trailing bytes after the first item are an error.
pub fn decode_exact<T: Decodable>(data: &[u8]) -> Result<T, DecoderError> {
    let rlp = Rlp::new(data);
    let info = rlp.payload_info()?;
    if info.total() != data.len() {
        return Err(DecoderError::RlpInconsistentLengthAndData);
    }
    rlp.as_val()
}

/// Encode a slice as an RLP list
pub fn encode_list<T: Encodable>(items: &[T]) -> Vec<u8> {
    let mut s = RlpStream::new();
    s.append_list(items);
    s.out().to_vec()
}

/// Decode an RLP list.
///
/// Unlike `rlp::decode_list` this reports malformed input instead of panicking.
pub fn decode_list<T: Decodable>(data: &[u8]) -> Result<Vec<T>, DecoderError> {
    let rlp = Rlp::new(data);
    let info = rlp.payload_info()?;
    if info.total() != data.len() {
        return Err(DecoderError::RlpInconsistentLengthAndData);
    }
    rlp.as_list()
}

/// Keccak-256 of the RLP encoding of `value`
pub fn rlp_hash<T: Encodable>(value: &T) -> H256 {
    dex_crypto::keccak256(&rlp::encode(value))
}

/// RLP encoding utilities
pub mod utils {
    use super::*;
    use bytes::{BufMut, BytesMut};

    /// Encode a u64 with minimal bytes (no leading zeros)
    pub fn encode_u64(value: u64) -> Vec<u8> {
        if value == 0 {
            return vec![0x80];
        }
        if value < 0x80 {
            return vec![value as u8];
        }

        let bytes = value.to_be_bytes();
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(7);
        let mut buf = BytesMut::with_capacity(9);
        buf.put_u8(0x80 + (8 - start) as u8);
        buf.put_slice(&bytes[start..]);
        buf.to_vec()
    }

    /// Decode an RLP integer prefix, returning the value and bytes consumed.
    ///
    /// Rejects non-canonical encodings (leading zeros, or a one-byte string
    /// that should have been a single byte).
    pub fn decode_u64(data: &[u8]) -> Result<(u64, usize), DecoderError> {
        let first = *data.first().ok_or(DecoderError::RlpIsTooShort)?;
        match first {
            0x00..=0x7f => Ok((first as u64, 1)),
            0x80 => Ok((0, 1)),
            0x81..=0xb7 => {
                let len = (first - 0x80) as usize;
                if len > 8 {
                    return Err(DecoderError::RlpIsTooBig);
                }
                let body = data.get(1..1 + len).ok_or(DecoderError::RlpIsTooShort)?;
                if body[0] == 0 {
                    return Err(DecoderError::RlpInvalidIndirection);
                }
                if len == 1 && body[0] < 0x80 {
                    return Err(DecoderError::RlpInvalidIndirection);
                }
                let value = body.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
                Ok((value, 1 + len))
            }
            _ => Err(DecoderError::RlpExpectedToBeData),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utils::*;

    // ==================== encode/decode ====================

    #[test]
    fn test_encode_decode_h256() {
        let hash = H256::from_bytes([0x42; 32]);
        let decoded: H256 = decode(&encode(&hash)).unwrap();
        assert_eq!(hash, decoded);
    }

    #[test]
    fn test_decode_exact_rejects_trailing_bytes() {
        let mut encoded = encode(&7u64);
        assert_eq!(decode_exact::<u64>(&encoded).unwrap(), 7);
        encoded.push(0x01);
        assert_eq!(
            decode_exact::<u64>(&encoded),
            Err(DecoderError::RlpInconsistentLengthAndData)
        );
    }

    #[test]
    fn test_decode_empty_input() {
        assert!(decode_exact::<u64>(&[]).is_err());
        assert!(decode_list::<u64>(&[]).is_err());
    }

    #[test]
    fn test_decode_truncated_data() {
        // Claims 5 bytes, has 2
        assert!(decode_exact::<Vec<u8>>(&[0x85, 0x01, 0x02]).is_err());
    }

    // ==================== lists ====================

    #[test]
    fn test_list_roundtrip() {
        let items = vec![1u64, 1024, 0, u64::MAX];
        let encoded = encode_list(&items);
        assert_eq!(decode_list::<u64>(&encoded).unwrap(), items);
    }

    #[test]
    fn test_empty_list() {
        let encoded = encode_list::<u64>(&[]);
        assert_eq!(encoded, vec![0xc0]);
        assert!(decode_list::<u64>(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_decode_list_of_non_list() {
        let encoded = encode(&5u64);
        assert_eq!(
            decode_list::<u64>(&encoded),
            Err(DecoderError::RlpExpectedToBeList)
        );
    }

    #[test]
    fn test_decode_list_bad_item() {
        // [H256-sized item, 3-byte item] decoded as hashes
        let mut s = RlpStream::new_list(2);
        s.append(&H256::from_bytes([1; 32]));
        s.append(&vec![1u8, 2, 3]);
        assert!(decode_list::<H256>(&s.out()).is_err());
    }

    #[test]
    fn test_long_list() {
        let items: Vec<H256> = (0..10u8).map(|i| H256::from_bytes([i; 32])).collect();
        let encoded = encode_list(&items);
        // 10 * 33 = 330 byte payload => 0xf9 0x01 0x4a
        assert_eq!(&encoded[..3], &[0xf9, 0x01, 0x4a]);
        assert_eq!(decode_list::<H256>(&encoded).unwrap(), items);
    }

    // ==================== rlp_hash ====================

    #[test]
    fn test_rlp_hash_empty_list() {
        let hash = rlp_hash(&Vec::<u64>::new());
        assert_eq!(
            hash.to_hex(),
            "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347"
        );
    }

    #[test]
    fn test_rlp_hash_matches_encoding() {
        let value = vec![1u8, 2, 3];
        assert_eq!(rlp_hash(&value), dex_crypto::keccak256(&encode(&value)));
    }

    // ==================== integer utils ====================

    #[test]
    fn test_encode_u64() {
        assert_eq!(encode_u64(0), vec![0x80]);
        assert_eq!(encode_u64(1), vec![0x01]);
        assert_eq!(encode_u64(0x7f), vec![0x7f]);
        assert_eq!(encode_u64(0x80), vec![0x81, 0x80]);
        assert_eq!(encode_u64(0x0400), vec![0x82, 0x04, 0x00]);
        assert_eq!(encode_u64(u64::MAX), {
            let mut v = vec![0x88];
            v.extend([0xff; 8]);
            v
        });
    }

    #[test]
    fn test_encode_u64_matches_rlp_crate() {
        for v in [0u64, 1, 0x7f, 0x80, 0xff, 0x100, 0x1_0000, u64::MAX] {
            assert_eq!(encode_u64(v), rlp::encode(&v).to_vec(), "value {}", v);
        }
    }

    #[test]
    fn test_decode_u64() {
        assert_eq!(decode_u64(&[0x00]).unwrap(), (0, 1));
        assert_eq!(decode_u64(&[0x80]).unwrap(), (0, 1));
        assert_eq!(decode_u64(&[0x11, 0xff]).unwrap(), (0x11, 1));
        assert_eq!(decode_u64(&[0x81, 0x80]).unwrap(), (0x80, 2));
        assert_eq!(decode_u64(&[0x82, 0x04, 0x00, 0xaa]).unwrap(), (0x0400, 3));
    }

    #[test]
    fn test_decode_u64_errors() {
        assert_eq!(decode_u64(&[]), Err(DecoderError::RlpIsTooShort));
        assert_eq!(decode_u64(&[0x82, 0x01]), Err(DecoderError::RlpIsTooShort));
        assert_eq!(decode_u64(&[0x89; 10]), Err(DecoderError::RlpIsTooBig));
        assert_eq!(decode_u64(&[0xc0]), Err(DecoderError::RlpExpectedToBeData));
    }

    #[test]
    fn test_decode_u64_non_canonical() {
        // Leading zero
        assert_eq!(
            decode_u64(&[0x82, 0x00, 0x01]),
            Err(DecoderError::RlpInvalidIndirection)
        );
        // Single small byte wrapped in a string header
        assert_eq!(
            decode_u64(&[0x81, 0x05]),
            Err(DecoderError::RlpInvalidIndirection)
        );
    }
}
