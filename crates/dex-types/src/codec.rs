//! Shared RLP decoding helpers.

use dex_rlp::{DecoderError, Rlp};

/// Require `rlp` to be a list of exactly `expected` items.
pub(crate) fn expect_list(rlp: &Rlp, expected: usize) -> Result<(), DecoderError> {
    if !rlp.is_list() {
        return Err(DecoderError::RlpExpectedToBeList);
    }
    if rlp.item_count()? != expected {
        return Err(DecoderError::RlpIncorrectListLen);
    }
    Ok(())
}

/// Decode a byte string item.
pub(crate) fn bytes_at(rlp: &Rlp, index: usize) -> Result<Vec<u8>, DecoderError> {
    let item = rlp.at(index)?;
    if !item.is_data() {
        return Err(DecoderError::RlpExpectedToBeData);
    }
    Ok(item.data()?.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dex_rlp::RlpStream;

    #[test]
    fn test_expect_list_counts() {
        let mut s = RlpStream::new_list(2);
        s.append(&1u64);
        s.append(&2u64);
        let out = s.out();
        let rlp = Rlp::new(&out);
        assert!(expect_list(&rlp, 2).is_ok());
        assert_eq!(expect_list(&rlp, 3), Err(DecoderError::RlpIncorrectListLen));
        assert_eq!(expect_list(&rlp, 1), Err(DecoderError::RlpIncorrectListLen));
    }

    #[test]
    fn test_expect_list_rejects_data() {
        let out = dex_rlp::encode(&7u64);
        assert_eq!(
            expect_list(&Rlp::new(&out), 1),
            Err(DecoderError::RlpExpectedToBeList)
        );
    }

    #[test]
    fn test_bytes_at_rejects_list() {
        let mut s = RlpStream::new_list(1);
        s.begin_list(0);
        let out = s.out();
        assert_eq!(
            bytes_at(&Rlp::new(&out), 0),
            Err(DecoderError::RlpExpectedToBeData)
        );
    }
}
