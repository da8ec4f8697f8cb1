//! Session authentication
//!
//! Before the protocol handshake each side proves ownership of its node key:
//!
//! 1. both send `Hello = [node_public_key (64 bytes), nonce (32 bytes)]`
//! 2. both send `Auth = [signature (65 bytes)]` over
//!    `keccak256(remote_nonce || own_public_key)`
//! 3. each side recovers the signer and requires it to match the key
//!    announced in the remote `Hello`
//!
//! Session frames use codes above [`PROTOCOL_LENGTH`](crate::codec::PROTOCOL_LENGTH)
//! and never reach message dispatch.

use crate::codec::Message;
use crate::error::{NetworkError, NetworkResult};
use dex_crypto::{keccak256_concat, recover_public_key, NodeKey, NodePublicKey, Signature};
use dex_rlp::{Rlp, RlpStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use rand::RngCore;

/// Code of the `Hello` frame
pub const HELLO_CODE: u64 = 0x80;

/// Code of the `Auth` frame
pub const AUTH_CODE: u64 = 0x81;

const NONCE_LENGTH: usize = 32;

/// Receive the next frame, mapping a closed stream to an IO error
pub(crate) async fn recv<R>(stream: &mut R) -> NetworkResult<Message>
where
    R: Stream<Item = Result<Message, NetworkError>> + Unpin,
{
    match stream.next().await {
        Some(result) => result,
        None => Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by remote",
        )
        .into()),
    }
}

async fn expect<R>(stream: &mut R, code: u64) -> NetworkResult<Message>
where
    R: Stream<Item = Result<Message, NetworkError>> + Unpin,
{
    let msg = recv(stream).await?;
    if msg.code != code {
        return Err(NetworkError::Auth(format!(
            "expected session frame {:#x}, got {:#x}",
            code, msg.code
        )));
    }
    Ok(msg)
}

fn parse_hello(msg: &Message) -> NetworkResult<(NodePublicKey, [u8; NONCE_LENGTH])> {
    let rlp = Rlp::new(&msg.payload);
    if rlp.item_count()? != 2 {
        return Err(NetworkError::Auth("malformed hello".into()));
    }
    let key_bytes = rlp.at(0)?.data()?;
    let key = NodePublicKey::from_slice(key_bytes)
        .map_err(|e| NetworkError::Auth(e.to_string()))?;
    let nonce: [u8; NONCE_LENGTH] = rlp
        .at(1)?
        .data()?
        .try_into()
        .map_err(|_| NetworkError::Auth("bad nonce length".into()))?;
    Ok((key, nonce))
}

/// Authenticate the remote end of a fresh connection.
///
/// Returns the remote's verified node public key. A remote presenting our
/// own key is rejected with [`NetworkError::SelfConnection`].
pub async fn authenticate<W, R>(
    sink: &mut W,
    stream: &mut R,
    key: &NodeKey,
) -> NetworkResult<NodePublicKey>
where
    W: Sink<Message, Error = NetworkError> + Unpin,
    R: Stream<Item = Result<Message, NetworkError>> + Unpin,
{
    let own_public = key.public();
    let mut nonce = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut hello = RlpStream::new_list(2);
    hello.append(&own_public.as_bytes().to_vec());
    hello.append(&nonce.to_vec());
    let (_, remote_hello) = tokio::try_join!(
        sink.send(Message::new(HELLO_CODE, hello.out().freeze())),
        expect(stream, HELLO_CODE),
    )?;
    let (remote_public, remote_nonce) = parse_hello(&remote_hello)?;
    if remote_public == own_public {
        return Err(NetworkError::SelfConnection);
    }

    let proof = key
        .sign(&keccak256_concat(&[&remote_nonce, own_public.as_bytes()]))
        .map_err(|e| NetworkError::Auth(e.to_string()))?;
    let mut auth = RlpStream::new_list(1);
    auth.append(&proof.to_bytes().to_vec());
    let (_, remote_auth) = tokio::try_join!(
        sink.send(Message::new(AUTH_CODE, auth.out().freeze())),
        expect(stream, AUTH_CODE),
    )?;

    let rlp = Rlp::new(&remote_auth.payload);
    if rlp.item_count()? != 1 {
        return Err(NetworkError::Auth("malformed auth".into()));
    }
    let signature = Signature::from_slice(rlp.at(0)?.data()?)
        .map_err(|e| NetworkError::Auth(e.to_string()))?;
    let digest = keccak256_concat(&[&nonce, remote_public.as_bytes()]);
    let signer = recover_public_key(&digest, &signature)
        .map_err(|e| NetworkError::Auth(e.to_string()))?;
    if NodePublicKey::from_verifying_key(&signer) != remote_public {
        return Err(NetworkError::Auth("signature does not match hello key".into()));
    }

    Ok(remote_public)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MessageCodec;
    use tokio_util::codec::Framed;

    fn pipe() -> (
        Framed<tokio::io::DuplexStream, MessageCodec>,
        Framed<tokio::io::DuplexStream, MessageCodec>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            Framed::new(a, MessageCodec::default()),
            Framed::new(b, MessageCodec::default()),
        )
    }

    #[tokio::test]
    async fn test_mutual_authentication() {
        let (a, b) = pipe();
        let key_a = NodeKey::random();
        let key_b = NodeKey::random();
        let (mut a_sink, mut a_stream) = a.split();
        let (mut b_sink, mut b_stream) = b.split();

        let (seen_by_a, seen_by_b) = tokio::join!(
            authenticate(&mut a_sink, &mut a_stream, &key_a),
            authenticate(&mut b_sink, &mut b_stream, &key_b),
        );
        assert_eq!(seen_by_a.unwrap(), key_b.public());
        assert_eq!(seen_by_b.unwrap(), key_a.public());
    }

    #[tokio::test]
    async fn test_self_connection_rejected() {
        let (a, b) = pipe();
        let key = NodeKey::random();
        let (mut a_sink, mut a_stream) = a.split();
        let (mut b_sink, mut b_stream) = b.split();

        let (ra, rb) = tokio::join!(
            authenticate(&mut a_sink, &mut a_stream, &key),
            authenticate(&mut b_sink, &mut b_stream, &key),
        );
        assert!(matches!(ra, Err(NetworkError::SelfConnection)));
        assert!(matches!(rb, Err(NetworkError::SelfConnection)));
    }

    #[tokio::test]
    async fn test_forged_signature_rejected() {
        let (a, mut b) = pipe();
        let key_a = NodeKey::random();
        let claimed = NodeKey::random();
        let forger = NodeKey::random();

        let honest = tokio::spawn(async move {
            let (mut sink, mut stream) = a.split();
            authenticate(&mut sink, &mut stream, &key_a).await
        });

        // Announce `claimed` but sign with `forger`
        let mut hello = RlpStream::new_list(2);
        hello.append(&claimed.public().as_bytes().to_vec());
        hello.append(&vec![7u8; 32]);
        b.send(Message::new(HELLO_CODE, hello.out().freeze()))
            .await
            .unwrap();
        let remote_hello = b.next().await.unwrap().unwrap();
        let (_, remote_nonce) = parse_hello(&remote_hello).unwrap();
        let sig = forger
            .sign(&keccak256_concat(&[&remote_nonce, claimed.public().as_bytes()]))
            .unwrap();
        let mut auth = RlpStream::new_list(1);
        auth.append(&sig.to_bytes().to_vec());
        b.send(Message::new(AUTH_CODE, auth.out().freeze()))
            .await
            .unwrap();

        let result = honest.await.unwrap();
        assert!(matches!(result, Err(NetworkError::Auth(_))));
    }

    #[tokio::test]
    async fn test_protocol_frame_before_hello_rejected() {
        let (a, mut b) = pipe();
        let key = NodeKey::random();
        let task = tokio::spawn(async move {
            let (mut sink, mut stream) = a.split();
            authenticate(&mut sink, &mut stream, &key).await
        });
        b.send(Message::new(0x00, vec![0xc0])).await.unwrap();
        assert!(matches!(task.await.unwrap(), Err(NetworkError::Auth(_))));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (a, b) = pipe();
        drop(b);
        let key = NodeKey::random();
        let (mut sink, mut stream) = a.split();
        assert!(authenticate(&mut sink, &mut stream, &key).await.is_err());
    }
}
