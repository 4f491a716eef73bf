//! Transaction signing with Ed25519 payment keys.
//!
//! Signing is a separate step from building because the keys may not be
//! available at construction time (browser wallet, remote signer). Every
//! witness signs the 32-byte transaction id, which covers the body only, so
//! adding witnesses never changes what was signed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::assembler::ProposedTransaction;
use super::types::{Transaction, VKeyWitness};
use crate::crypto::PaymentKey;
use crate::ledger::{KeyHash, TxId};

/// Errors from attaching signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// A required key hash has no matching key among those supplied.
    #[error("no signing key supplied for required key {key_hash}")]
    MissingSigningKey { key_hash: KeyHash },
}

/// A transaction carrying every required vkey witness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub id: TxId,
    pub transaction: Transaction,
}

impl SignedTransaction {
    pub fn to_cbor_hex(&self) -> String {
        self.transaction.to_cbor_hex()
    }
}

/// The witness `key` contributes to the transaction `id`.
pub fn witness(id: &TxId, key: &PaymentKey) -> VKeyWitness {
    VKeyWitness {
        vkey: key.verification_key().to_bytes(),
        signature: key.sign(id.as_bytes()),
    }
}

/// Signs `proposal` with one key per required key hash.
///
/// Keys that are not required are ignored. Witnesses are attached in the
/// order of `required_keys`, so the result is deterministic.
pub fn sign_transaction(
    proposal: &ProposedTransaction,
    keys: &[&PaymentKey],
) -> Result<SignedTransaction, SigningError> {
    let mut transaction = proposal.transaction.clone();
    transaction.witness_set.vkeys = proposal
        .required_keys
        .iter()
        .map(|required| {
            keys.iter()
                .find(|k| k.key_hash() == *required)
                .map(|k| witness(&proposal.id, k))
                .ok_or(SigningError::MissingSigningKey {
                    key_hash: *required,
                })
        })
        .collect::<Result<_, _>>()?;

    debug!(
        tx_id = %proposal.id,
        witnesses = transaction.witness_set.vkeys.len(),
        "transaction signed"
    );
    Ok(SignedTransaction {
        id: proposal.id,
        transaction,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
