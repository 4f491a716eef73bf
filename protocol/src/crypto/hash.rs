//! # Hashing Utilities
//!
//! The ledger speaks exactly one hash family: BLAKE2b, at two output sizes.
//!
//! - **BLAKE2b-256**: transaction ids, datum hashes, auxiliary-data hashes
//!   and the script-integrity hash.
//! - **BLAKE2b-224**: everything that names a *credential*: payment and
//!   stake key hashes, script hashes, and minting policy ids.
//!
//! Nothing else is hashed anywhere in this crate. If a new call site seems to
//! need a different function, it is almost certainly talking to the wrong
//! ledger.

use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};

type Blake2b224 = Blake2b<U28>;
type Blake2b256 = Blake2b<U32>;

/// Output length of [`blake2b_224`] in bytes.
pub const HASH_224_LENGTH: usize = 28;

/// Output length of [`blake2b_256`] in bytes.
pub const HASH_256_LENGTH: usize = 32;

/// Compute the BLAKE2b-256 digest of `data`.
///
/// # Example
///
/// ```
/// use athena_protocol::crypto::blake2b_256;
///
/// let digest = blake2b_256(b"athena");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn blake2b_256(data: &[u8]) -> [u8; HASH_256_LENGTH] {
    blake2b_256_parts(&[data])
}

/// Compute the BLAKE2b-224 digest of `data`.
pub fn blake2b_224(data: &[u8]) -> [u8; HASH_224_LENGTH] {
    blake2b_224_parts(&[data])
}

/// BLAKE2b-224 over the concatenation of `parts`, without materializing it.
///
/// Script hashes are computed over `language_tag || script_bytes`; this
/// avoids copying a potentially large script just to prepend one byte.
pub fn blake2b_224_parts(parts: &[&[u8]]) -> [u8; HASH_224_LENGTH] {
    let mut hasher = Blake2b224::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; HASH_224_LENGTH];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// BLAKE2b-256 over the concatenation of `parts`.
pub fn blake2b_256_parts(parts: &[&[u8]]) -> [u8; HASH_256_LENGTH] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; HASH_256_LENGTH];
    output.copy_from_slice(&hasher.finalize());
    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
