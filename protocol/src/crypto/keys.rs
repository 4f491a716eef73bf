//! # Payment Keys
//!
//! Ed25519 signing keys as the ledger sees them: a 32-byte verification key
//! whose BLAKE2b-224 hash is the *key credential* that appears in addresses,
//! required-signer lists and native scripts.
//!
//! Key material is never logged and `PaymentKey` deliberately has no serde
//! support. Loading keys from storage is the wallet's business, not ours.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

use super::hash::blake2b_224;
use crate::ledger::types::KeyHash;

/// Errors that can occur during key operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid verification key bytes")]
    InvalidVerificationKey,
}

/// An Ed25519 signing key used to witness transactions and sign messages.
#[derive(Clone)]
pub struct PaymentKey {
    signing_key: SigningKey,
}

impl PaymentKey {
    /// Generates a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key from a 32-byte seed. Handy for tests and fixtures.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Parses a hex-encoded 32-byte secret key.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(text.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey(self.signing_key.verifying_key())
    }

    /// Hash of the verification key.
    pub fn key_hash(&self) -> KeyHash {
        self.verification_key().key_hash()
    }

    /// Raw 64-byte Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for PaymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentKey")
            .field("key_hash", &self.key_hash())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 verification (public) key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VerificationKey(VerifyingKey);

impl VerificationKey {
    /// Parses 32 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidVerificationKey)?;
        VerifyingKey::from_bytes(&array)
            .map(Self)
            .map_err(|_| KeyError::InvalidVerificationKey)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// The ledger credential for this key.
    pub fn key_hash(&self) -> KeyHash {
        KeyHash::new(blake2b_224(self.0.as_bytes()))
    }

    /// Strict Ed25519 verification. Returns `false` for malformed signatures.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        let signature = Signature::from_bytes(&bytes);
        self.0.verify_strict(message, &signature).is_ok()
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({})", hex::encode(self.0.as_bytes()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_deterministic() {
        let a = PaymentKey::from_seed(&[7; 32]);
        let b = PaymentKey::from_seed(&[7; 32]);
        assert_eq!(a.key_hash(), b.key_hash());
        assert_ne!(a.key_hash(), PaymentKey::from_seed(&[8; 32]).key_hash());
    }

    #[test]
    fn sign_and_verify() {
        let key = PaymentKey::generate();
        let sig = key.sign(b"escrow");
        let vk = key.verification_key();
        assert!(vk.verify(b"escrow", &sig));
        assert!(!vk.verify(b"escrow!", &sig));
        assert!(!vk.verify(b"escrow", &sig[..63]));
    }

    #[test]
    fn key_hash_is_hash_of_vkey_bytes() {
        let key = PaymentKey::from_seed(&[1; 32]);
        let vk = key.verification_key();
        assert_eq!(vk.key_hash(), KeyHash::new(blake2b_224(&vk.to_bytes())));
    }

    #[test]
    fn from_hex_validates_length() {
        assert!(PaymentKey::from_hex(&"11".repeat(32)).is_ok());
        assert_eq!(
            PaymentKey::from_hex("1122").unwrap_err(),
            KeyError::InvalidSecretKey
        );
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let key = PaymentKey::from_seed(&[0x42; 32]);
        let text = format!("{key:?}");
        assert!(!text.contains(&"42".repeat(32)));
        assert!(text.contains("key_hash"));
    }

    #[test]
    fn verification_key_parsing() {
        let vk = PaymentKey::from_seed(&[3; 32]).verification_key();
        assert_eq!(VerificationKey::from_bytes(&vk.to_bytes()).unwrap(), vk);
        assert!(VerificationKey::from_bytes(&[0u8; 31]).is_err());
    }
}
