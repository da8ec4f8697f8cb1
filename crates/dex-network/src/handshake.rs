//! Status handshake
//!
//! Runs once per connection right after session authentication. Both sides
//! send their [`StatusData`] concurrently; the remote's is validated in a
//! fixed order and only the first mismatch is reported.

use crate::codec::{Message, MessageCode};
use crate::error::{NetworkError, NetworkResult, ProtocolError};
use crate::session::recv;
use crate::types::StatusData;
use futures::{Sink, SinkExt, Stream};

/// Check a remote status against ours.
///
/// Order: protocol version, network id, dMoment, genesis hash. Head number
/// and hash are informational and never checked.
pub fn validate(remote: &StatusData, local: &StatusData) -> Result<(), ProtocolError> {
    if remote.protocol_version != local.protocol_version {
        return Err(ProtocolError::ProtocolVersionMismatch {
            got: remote.protocol_version,
            want: local.protocol_version,
        });
    }
    if remote.network_id != local.network_id {
        return Err(ProtocolError::NetworkIdMismatch {
            got: remote.network_id,
            want: local.network_id,
        });
    }
    if remote.dmoment != local.dmoment {
        return Err(ProtocolError::DMomentMismatch {
            got: remote.dmoment,
            want: local.dmoment,
        });
    }
    if remote.genesis_block != local.genesis_block {
        return Err(ProtocolError::GenesisBlockMismatch {
            got: remote.genesis_block,
            want: local.genesis_block,
        });
    }
    Ok(())
}

async fn read_status<R>(stream: &mut R) -> NetworkResult<StatusData>
where
    R: Stream<Item = Result<Message, NetworkError>> + Unpin,
{
    let msg = recv(stream).await?;
    if msg.code != MessageCode::Status.code() {
        return Err(ProtocolError::NoStatusMsg {
            got: msg.code,
            want: MessageCode::Status.code(),
        }
        .into());
    }
    Ok(msg.decode()?)
}

/// Send `local` while awaiting the remote status, then validate it.
pub async fn exchange_status<W, R>(
    sink: &mut W,
    stream: &mut R,
    local: &StatusData,
) -> NetworkResult<StatusData>
where
    W: Sink<Message, Error = NetworkError> + Unpin,
    R: Stream<Item = Result<Message, NetworkError>> + Unpin,
{
    let (_, remote) = tokio::try_join!(
        sink.send(Message::encode(MessageCode::Status, local)),
        read_status(stream),
    )?;
    validate(&remote, local)?;
    Ok(remote)
}
