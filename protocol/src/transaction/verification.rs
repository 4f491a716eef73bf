//! Ledger-side checks on a signed transaction.
//!
//! These are the rules the in-memory chain enforces before applying a
//! transaction, ordered from cheapest to most expensive so invalid
//! submissions fail fast: structure and balance first, Ed25519 last. They
//! are a faithful subset of the real ledger rules, enough to catch a
//! builder bug, not a replacement for script evaluation.

use std::collections::BTreeSet;

use thiserror::Error;

use super::types::{RedeemerTag, Transaction};
use crate::crypto::{blake2b_224, verify_raw};
use crate::ledger::{Credential, KeyHash, OutputRef, Slot, Utxo, Value, ValueError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reasons a transaction fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("slot {slot} is outside the validity interval")]
    OutsideValidity { slot: Slot },

    #[error("value not conserved: consumed {consumed}, produced {produced}")]
    NotConserved { consumed: Value, produced: Value },

    #[error("output {index} carries {coin} lovelace, below its minimum of {min}")]
    OutputBelowMinimum { index: usize, coin: u64, min: u64 },

    #[error("vkey witness for {key_hash} does not verify")]
    InvalidWitness { key_hash: KeyHash },

    #[error("missing vkey witness for {key_hash}")]
    MissingWitness { key_hash: KeyHash },

    #[error("script input {input} has no matching datum in the witness set")]
    MissingDatum { input: OutputRef },

    #[error("script input {input} has no spend redeemer")]
    MissingRedeemer { input: OutputRef },

    #[error("script input {input} has no validator in the witness set")]
    MissingScript { input: OutputRef },

    #[error("script execution requested without collateral")]
    MissingCollateral,

    #[error(transparent)]
    Value(#[from] ValueError),
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// `slot` must fall in `[validity_start, ttl)`.
pub fn check_validity(tx: &Transaction, slot: Slot) -> Result<(), VerificationError> {
    let body = &tx.body;
    let started = body.validity_start.map_or(true, |start| slot >= start);
    let alive = body.ttl.map_or(true, |ttl| slot < ttl);
    if started && alive {
        Ok(())
    } else {
        Err(VerificationError::OutsideValidity { slot })
    }
}

/// `consumed + minted == outputs + fee + burned`.
pub fn check_conservation(tx: &Transaction, consumed: &[Utxo]) -> Result<(), VerificationError> {
    let body = &tx.body;
    if body.inputs.is_empty() {
        return Err(VerificationError::NoInputs);
    }

    let mut left = Value::sum(consumed.iter().map(Utxo::value))?;
    let mut right = Value::sum(body.outputs.iter().map(|o| &o.value))?
        .checked_add(&Value::from_coin(body.fee))?;
    for (policy, names) in &body.mint {
        for (name, quantity) in names {
            let magnitude = Value::zero().with_asset(*policy, name.clone(), quantity.unsigned_abs());
            if *quantity > 0 {
                left = left.checked_add(&magnitude)?;
            } else {
                right = right.checked_add(&magnitude)?;
            }
        }
    }

    if left == right {
        Ok(())
    } else {
        Err(VerificationError::NotConserved {
            consumed: left,
            produced: right,
        })
    }
}

/// Every output carries at least its minimum coin.
pub fn check_min_coin(tx: &Transaction, coins_per_utxo_byte: u64) -> Result<(), VerificationError> {
    for (index, output) in tx.body.outputs.iter().enumerate() {
        let min = output.min_coin(coins_per_utxo_byte);
        if output.value.coin < min {
            return Err(VerificationError::OutputBelowMinimum {
                index,
                coin: output.value.coin,
                min,
            });
        }
    }
    Ok(())
}

/// Script-locked inputs carry their datum, validator and spend redeemer,
/// and script execution is backed by collateral.
pub fn check_script_inputs(tx: &Transaction, consumed: &[Utxo]) -> Result<(), VerificationError> {
    let witnesses = &tx.witness_set;
    let datum_hashes: BTreeSet<_> = witnesses.plutus_data.iter().map(|d| d.hash()).collect();
    let script_hashes: BTreeSet<_> = witnesses.plutus_scripts.iter().map(|s| s.hash()).collect();

    for utxo in consumed {
        let Credential::Script(script_hash) = utxo.address().payment_credential() else {
            continue;
        };
        let input = utxo.input;
        if !script_hashes.contains(script_hash) {
            return Err(VerificationError::MissingScript { input });
        }
        match utxo.output.datum_hash {
            Some(hash) if datum_hashes.contains(&hash) => {}
            _ => return Err(VerificationError::MissingDatum { input }),
        }
        let index = tx
            .body
            .inputs
            .binary_search(&input)
            .map_err(|_| VerificationError::MissingRedeemer { input })?;
        let redeemed = witnesses
            .redeemers
            .iter()
            .any(|r| r.tag == RedeemerTag::Spend && r.index as usize == index);
        if !redeemed {
            return Err(VerificationError::MissingRedeemer { input });
        }
    }

    if !witnesses.redeemers.is_empty() && tx.body.collateral.is_empty() {
        return Err(VerificationError::MissingCollateral);
    }
    Ok(())
}

/// Key hashes whose signatures the ledger demands: key-locked inputs and
/// collateral, declared required signers, and native-script signers.
pub fn required_keys(tx: &Transaction, consumed: &[Utxo], collateral: &[Utxo]) -> Vec<KeyHash> {
    let mut keys: BTreeSet<KeyHash> = consumed
        .iter()
        .chain(collateral)
        .filter_map(|u| u.address().payment_credential().key_hash().copied())
        .collect();
    keys.extend(tx.body.required_signers.iter().copied());
    keys.extend(tx.witness_set.native_scripts.iter().flat_map(|s| s.key_hashes()));
    keys.into_iter().collect()
}

/// Every vkey witness signs the transaction id, and every `required` key
/// has one.
pub fn verify_witnesses(tx: &Transaction, required: &[KeyHash]) -> Result<(), VerificationError> {
    let id = tx.id();
    let mut present = BTreeSet::new();
    for witness in &tx.witness_set.vkeys {
        let key_hash = verify_raw(&witness.vkey, id.as_bytes(), &witness.signature).map_err(|_| {
            VerificationError::InvalidWitness {
                key_hash: KeyHash::new(blake2b_224(&witness.vkey)),
            }
        })?;
        present.insert(key_hash);
    }

    match required.iter().find(|k| !present.contains(*k)) {
        Some(missing) => Err(VerificationError::MissingWitness { key_hash: *missing }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PaymentKey;
    use crate::ledger::{Address, TxId, TxOutput};
    use crate::transaction::signing::witness;
    use crate::transaction::types::{TxBody, WitnessSet};

    fn addr(key: &PaymentKey) -> Address {
        Address::enterprise(0, Credential::Key(key.key_hash()))
    }

    fn spend(key: &PaymentKey, coin: u64, fee: u64) -> (Transaction, Vec<Utxo>) {
        let utxo = Utxo::new(
            OutputRef::new(TxId::new([1; 32]), 0),
            TxOutput::new(addr(key), Value::from_coin(coin)),
        );
        let tx = Transaction {
            body: TxBody {
                inputs: vec![utxo.input],
                outputs: vec![TxOutput::new(addr(key), Value::from_coin(coin - fee))],
                fee,
                ttl: Some(Slot(100)),
                validity_start: Some(Slot(10)),
                ..TxBody::default()
            },
            witness_set: WitnessSet::default(),
            auxiliary_data: None,
        };
        (tx, vec![utxo])
    }

    #[test]
    fn validity_interval_is_half_open() {
        let key = PaymentKey::from_seed(&[3; 32]);
        let (tx, _) = spend(&key, 10_000_000, 200_000);
        assert!(check_validity(&tx, Slot(10)).is_ok());
        assert!(check_validity(&tx, Slot(99)).is_ok());
        assert!(check_validity(&tx, Slot(9)).is_err());
        assert!(check_validity(&tx, Slot(100)).is_err());
    }

    #[test]
    fn conservation_counts_the_fee() {
        let key = PaymentKey::from_seed(&[3; 32]);
        let (mut tx, consumed) = spend(&key, 10_000_000, 200_000);
        assert!(check_conservation(&tx, &consumed).is_ok());
        tx.body.fee += 1;
        assert!(matches!(
            check_conservation(&tx, &consumed),
            Err(VerificationError::NotConserved { .. })
        ));
    }

    #[test]
    fn witnesses_must_sign_the_id() {
        let key = PaymentKey::from_seed(&[3; 32]);
        let (mut tx, consumed) = spend(&key, 10_000_000, 200_000);
        let required = required_keys(&tx, &consumed, &[]);
        assert_eq!(required, vec![key.key_hash()]);

        assert_eq!(
            verify_witnesses(&tx, &required),
            Err(VerificationError::MissingWitness {
                key_hash: key.key_hash()
            })
        );

        tx.witness_set.vkeys.push(witness(&TxId::new([0; 32]), &key));
        assert_eq!(
            verify_witnesses(&tx, &required),
            Err(VerificationError::InvalidWitness {
                key_hash: key.key_hash()
            })
        );

        tx.witness_set.vkeys = vec![witness(&tx.id(), &key)];
        assert!(verify_witnesses(&tx, &required).is_ok());
    }

    #[test]
    fn redeemers_need_collateral() {
        use crate::ledger::PlutusData;
        use crate::transaction::types::{ExUnits, Redeemer};

        let key = PaymentKey::from_seed(&[3; 32]);
        let (mut tx, consumed) = spend(&key, 10_000_000, 200_000);
        tx.witness_set.redeemers.push(Redeemer {
            tag: RedeemerTag::Spend,
            index: 0,
            data: PlutusData::constr(0, vec![]),
            ex_units: ExUnits::default(),
        });
        assert_eq!(
            check_script_inputs(&tx, &consumed),
            Err(VerificationError::MissingCollateral)
        );
    }
}
