//! # Signature Verification
//!
//! Verification of signatures that arrive as raw bytes: vkey witnesses on
//! submitted transactions and COSE signatures on authentication messages.
//! Both carry their own public key, so the caller also gets the key hash the
//! signature proves control of.

use thiserror::Error;

use super::keys::VerificationKey;
use crate::ledger::types::KeyHash;

/// Errors from raw signature verification.
///
/// Intentionally coarse: callers learn *that* verification failed, not which
/// byte was wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("signature verification failed")]
    VerificationFailed,
}

/// Verifies `signature` over `message` under the raw 32-byte `public_key`
/// and returns the key's hash on success.
pub fn verify_raw(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<KeyHash, SignatureError> {
    let key = VerificationKey::from_bytes(public_key).map_err(|_| SignatureError::InvalidPublicKey)?;
    if key.verify(message, signature) {
        Ok(key.key_hash())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::PaymentKey;

    #[test]
    fn valid_signature_yields_key_hash() {
        let key = PaymentKey::from_seed(&[9; 32]);
        let sig = key.sign(b"msg");
        let vk = key.verification_key().to_bytes();
        assert_eq!(verify_raw(&vk, b"msg", &sig).unwrap(), key.key_hash());
    }

    #[test]
    fn tampered_message_fails() {
        let key = PaymentKey::from_seed(&[9; 32]);
        let sig = key.sign(b"msg");
        let vk = key.verification_key().to_bytes();
        assert_eq!(
            verify_raw(&vk, b"msh", &sig),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn short_key_is_invalid() {
        assert_eq!(
            verify_raw(&[1, 2, 3], b"msg", &[0; 64]),
            Err(SignatureError::InvalidPublicKey)
        );
    }
}
