//! Message framing for network transport
//!
//! Wire format: `[length: u32 BE][rlp(code: u64)][payload]`, where `length`
//! covers the code prefix and the payload. Payloads are RLP.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use dex_rlp::{utils, Decodable, Encodable};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{NetworkError, ProtocolError};

/// Default frame size limit (10 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Length prefix size (4 bytes)
const LENGTH_PREFIX_SIZE: usize = 4;

/// Number of codes reserved by the protocol; session codes live above it
pub const PROTOCOL_LENGTH: u64 = 0x18;

/// Protocol message codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    /// Handshake status
    Status,
    /// Announcement of new block hashes
    NewBlockHashes,
    /// Transaction batch
    Tx,
    /// Header range query
    GetBlockHeaders,
    /// Header range reply
    BlockHeaders,
    /// Body query
    GetBlockBodies,
    /// Body reply
    BlockBodies,
    /// Full block announcement
    NewBlock,
    /// State node query
    GetNodeData,
    /// State node reply
    NodeData,
    /// Receipt query
    GetReceipts,
    /// Receipt reply
    Receipts,
    /// Node record batch
    Record,
    /// Consensus block list
    CoreBlock,
    /// Vote list
    Vote,
    /// Single agreement result
    Agreement,
    /// Randomness result list
    Randomness,
    /// Single DKG private share
    DkgPrivateShare,
    /// Single DKG partial signature
    DkgPartialSignature,
}

impl MessageCode {
    /// Every code, in numeric order
    pub const ALL: [MessageCode; 19] = [
        MessageCode::Status,
        MessageCode::NewBlockHashes,
        MessageCode::Tx,
        MessageCode::GetBlockHeaders,
        MessageCode::BlockHeaders,
        MessageCode::GetBlockBodies,
        MessageCode::BlockBodies,
        MessageCode::NewBlock,
        MessageCode::GetNodeData,
        MessageCode::NodeData,
        MessageCode::GetReceipts,
        MessageCode::Receipts,
        MessageCode::Record,
        MessageCode::CoreBlock,
        MessageCode::Vote,
        MessageCode::Agreement,
        MessageCode::Randomness,
        MessageCode::DkgPrivateShare,
        MessageCode::DkgPartialSignature,
    ];

    /// Numeric wire code
    pub const fn code(self) -> u64 {
        match self {
            MessageCode::Status => 0x00,
            MessageCode::NewBlockHashes => 0x01,
            MessageCode::Tx => 0x02,
            MessageCode::GetBlockHeaders => 0x03,
            MessageCode::BlockHeaders => 0x04,
            MessageCode::GetBlockBodies => 0x05,
            MessageCode::BlockBodies => 0x06,
            MessageCode::NewBlock => 0x07,
            MessageCode::GetNodeData => 0x0d,
            MessageCode::NodeData => 0x0e,
            MessageCode::GetReceipts => 0x0f,
            MessageCode::Receipts => 0x10,
            MessageCode::Record => 0x11,
            MessageCode::CoreBlock => 0x12,
            MessageCode::Vote => 0x13,
            MessageCode::Agreement => 0x14,
            MessageCode::Randomness => 0x15,
            MessageCode::DkgPrivateShare => 0x16,
            MessageCode::DkgPartialSignature => 0x17,
        }
    }
}

impl TryFrom<u64> for MessageCode {
    type Error = ProtocolError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        MessageCode::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .ok_or(ProtocolError::InvalidMsgCode(code))
    }
}

/// A framed message: numeric code plus RLP payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message code
    pub code: u64,
    /// Payload bytes
    pub payload: Bytes,
}

impl Message {
    /// Create from a raw code and payload
    pub fn new(code: u64, payload: impl Into<Bytes>) -> Self {
        Message {
            code,
            payload: payload.into(),
        }
    }

    /// Encode a single value under a protocol code
    pub fn encode<T: Encodable>(code: MessageCode, value: &T) -> Self {
        Message::new(code.code(), dex_rlp::encode(value))
    }

    /// Encode a list of values under a protocol code
    pub fn encode_list<T: Encodable>(code: MessageCode, items: &[T]) -> Self {
        Message::new(code.code(), dex_rlp::encode_list(items))
    }

    /// Decode the payload as a single value spanning the whole payload
    pub fn decode<T: Decodable>(&self) -> Result<T, ProtocolError> {
        Ok(dex_rlp::decode_exact(&self.payload)?)
    }

    /// Decode the payload as a list
    pub fn decode_list<T: Decodable>(&self) -> Result<Vec<T>, ProtocolError> {
        Ok(dex_rlp::decode_list(&self.payload)?)
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Codec for [`Message`] frames
#[derive(Debug)]
pub struct MessageCodec {
    max_message_size: usize,
    decode_state: DecodeState,
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    ReadingLength,
    ReadingFrame {
        length: usize,
    },
}

impl MessageCodec {
    /// Create a codec rejecting frames above `max_message_size` bytes
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            decode_state: DecodeState::default(),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = NetworkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.decode_state {
                DecodeState::ReadingLength => {
                    if src.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }

                    let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
                    if length > self.max_message_size {
                        return Err(ProtocolError::MsgTooLarge {
                            size: length,
                            max: self.max_message_size,
                        }
                        .into());
                    }
                    if length == 0 {
                        return Err(ProtocolError::Decode("empty frame".into()).into());
                    }

                    src.advance(LENGTH_PREFIX_SIZE);
                    src.reserve(length);
                    self.decode_state = DecodeState::ReadingFrame { length };
                }
                DecodeState::ReadingFrame { length } => {
                    if src.len() < length {
                        return Ok(None);
                    }

                    let mut frame = src.split_to(length);
                    self.decode_state = DecodeState::ReadingLength;

                    let (code, consumed) = utils::decode_u64(&frame)?;
                    frame.advance(consumed);
                    return Ok(Some(Message {
                        code,
                        payload: frame.freeze(),
                    }));
                }
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = NetworkError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let code = utils::encode_u64(item.code);
        let length = code.len() + item.payload.len();
        if length > self.max_message_size {
            return Err(ProtocolError::MsgTooLarge {
                size: length,
                max: self.max_message_size,
            }
            .into());
        }

        dst.reserve(LENGTH_PREFIX_SIZE + length);
        dst.put_u32(length as u32);
        dst.put_slice(&code);
        dst.put_slice(&item.payload);
        Ok(())
    }
}
