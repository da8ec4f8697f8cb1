//! Recoverable ECDSA signatures over secp256k1

use crate::CryptoError;
use dex_primitives::H256;
use k256::ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey};

/// Public key
pub type PublicKey = VerifyingKey;

/// Private key (32 bytes)
pub type PrivateKey = SigningKey;

/// Recoverable signature: `r || s || v` with `v` in {0, 1}.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature {
    /// r component
    pub r: [u8; 32],
    /// s component, always in the lower half of the curve order
    pub s: [u8; 32],
    /// recovery id
    pub v: u8,
}

impl Signature {
    /// Encoded length in bytes
    pub const LEN: usize = 65;

    /// Serialize as `r || s || v`
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Parse from a 65-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != Self::LEN {
            return Err(CryptoError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Signature { r, s, v: bytes[64] })
    }

    fn to_k256(self) -> Result<(K256Signature, RecoveryId), CryptoError> {
        let sig = K256Signature::from_scalars(self.r, self.s)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let recid =
            RecoveryId::from_byte(self.v).ok_or(CryptoError::InvalidRecoveryId(self.v))?;
        Ok((sig, recid))
    }
}

/// Sign a 32-byte digest. The result is normalized to low-s.
pub fn sign(digest: &H256, private_key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (mut sig, mut recid) = private_key
        .sign_prehash_recoverable(digest.as_bytes())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recid = RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced());
    }

    Ok(Signature {
        r: sig.r().to_bytes().into(),
        s: sig.s().to_bytes().into(),
        v: recid.to_byte(),
    })
}

/// Verify a signature against a digest and public key.
///
/// High-s signatures are rejected.
pub fn verify(
    digest: &H256,
    signature: &Signature,
    public_key: &PublicKey,
) -> Result<bool, CryptoError> {
    use k256::ecdsa::signature::hazmat::PrehashVerifier;

    let (sig, _) = signature.to_k256()?;
    if sig.normalize_s().is_some() {
        return Ok(false);
    }
    Ok(public_key.verify_prehash(digest.as_bytes(), &sig).is_ok())
}

/// Recover the signer's public key
pub fn recover_public_key(digest: &H256, signature: &Signature) -> Result<PublicKey, CryptoError> {
    let (sig, recid) = signature.to_k256()?;
    VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recid)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))
}
