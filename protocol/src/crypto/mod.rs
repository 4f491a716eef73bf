//! # Cryptographic Primitives
//!
//! Thin, typed wrappers over audited implementations: BLAKE2b from the
//! `blake2` crate and Ed25519 from `ed25519-dalek`. Nothing here is clever,
//! and it should stay that way.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{blake2b_224, blake2b_224_parts, blake2b_256, blake2b_256_parts};
pub use keys::{KeyError, PaymentKey, VerificationKey};
pub use signatures::{verify_raw, SignatureError};
