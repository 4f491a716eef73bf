//! # UTXO Classification & Selection
//!
//! Partitions an address's unspent outputs into the three roles the escrow
//! flow needs (collateral, identity proof, funding) and picks a covering
//! subset of funding candidates.
//!
//! Everything here walks candidates in canonical [`OutputRef`] order, so a
//! given snapshot always yields the same choice. Deterministic selection is
//! what makes proposed transactions reproducible byte for byte.
//!
//! [`OutputRef`]: crate::ledger::OutputRef

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EscrowError;
use crate::ledger::{PolicyId, Utxo, Value};

/// How leftover value is returned to the payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangePolicy {
    /// Always a dedicated change output.
    #[default]
    Separate,
    /// Folded into an existing output at the change address when there is
    /// one; otherwise a dedicated output.
    Merge,
}

/// The three candidate lists for one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Pure-coin UTXOs holding at least the collateral floor.
    pub collateral: Vec<Utxo>,
    /// UTXOs holding a token under the requested policy.
    pub identity: Vec<Utxo>,
    /// Every UTXO.
    pub funding: Vec<Utxo>,
}

/// Result of [`select_covering`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected: Vec<Utxo>,
    pub total: Value,
}

fn sorted(utxos: &[Utxo]) -> Vec<Utxo> {
    let mut out = utxos.to_vec();
    out.sort_by(|a, b| a.input.cmp(&b.input));
    out
}

fn is_collateral(utxo: &Utxo, floor: u64) -> bool {
    utxo.value().is_pure_coin() && utxo.value().coin >= floor
}

/// Splits `utxos` into collateral, identity and funding candidates.
pub fn classify(utxos: &[Utxo], policy: Option<&PolicyId>, collateral_floor: u64) -> Classification {
    let funding = sorted(utxos);
    let collateral = funding
        .iter()
        .filter(|u| is_collateral(u, collateral_floor))
        .cloned()
        .collect();
    let identity = match policy {
        Some(policy) => funding
            .iter()
            .filter(|u| u.value().holds_policy(policy))
            .cloned()
            .collect(),
        None => Vec::new(),
    };
    Classification {
        collateral,
        identity,
        funding,
    }
}

/// The first pure-coin UTXO at or above `floor`, in canonical order.
pub fn find_collateral(utxos: &[Utxo], floor: u64) -> Result<Utxo, EscrowError> {
    sorted(utxos)
        .into_iter()
        .find(|u| is_collateral(u, floor))
        .ok_or(EscrowError::CollateralUnavailable { floor })
}

/// The first UTXO holding a token under `policy`, in canonical order.
pub fn find_identity(utxos: &[Utxo], policy: &PolicyId) -> Result<Utxo, EscrowError> {
    sorted(utxos)
        .into_iter()
        .find(|u| u.value().holds_policy(policy))
        .ok_or(EscrowError::IdentityNotFound { policy: *policy })
}

/// Accumulates candidates in canonical order until the total covers
/// `target`, then drops any selected UTXO the rest can do without.
pub fn select_covering(candidates: &[Utxo], target: &Value) -> Result<Selection, EscrowError> {
    let ordered = sorted(candidates);

    let mut selected = Vec::new();
    let mut total = Value::zero();
    for utxo in &ordered {
        if total.covers(target) {
            break;
        }
        total = total.checked_add(utxo.value())?;
        selected.push(utxo.clone());
    }

    if !total.covers(target) {
        return Err(EscrowError::InsufficientFunds {
            required: target.clone(),
            available: total,
        });
    }

    // Trimming pass.
    let mut i = 0;
    while i < selected.len() {
        let without = total.checked_sub(selected[i].value())?;
        if without.covers(target) {
            debug!(input = %selected[i].input, "dropping redundant input");
            total = without;
            selected.remove(i);
        } else {
            i += 1;
        }
    }

    Ok(Selection { selected, total })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Address, AssetName, Credential, KeyHash, OutputRef, TxId, TxOutput};

    fn addr() -> Address {
        Address::enterprise(0, Credential::Key(KeyHash::new([1; 28])))
    }

    fn utxo(tx: u8, index: u32, value: Value) -> Utxo {
        Utxo::new(
            OutputRef::new(TxId::new([tx; 32]), index),
            TxOutput::new(addr(), value),
        )
    }

    fn policy(b: u8) -> PolicyId {
        PolicyId::new([b; 28])
    }

    fn token(b: u8) -> Value {
        Value::from_coin(2_000_000).with_asset(policy(b), AssetName::new(b"id".to_vec()).unwrap(), 1)
    }

    #[test]
    fn classify_partitions_by_role() {
        let utxos = vec![
            utxo(3, 0, Value::from_coin(10_000_000)),
            utxo(1, 0, Value::from_coin(1_000_000)),
            utxo(2, 0, token(9)),
        ];
        let c = classify(&utxos, Some(&policy(9)), 5_000_000);
        assert_eq!(c.collateral.len(), 1);
        assert_eq!(c.collateral[0].input.tx_id, TxId::new([3; 32]));
        assert_eq!(c.identity.len(), 1);
        assert_eq!(c.funding.len(), 3);
        assert_eq!(c.funding[0].input.tx_id, TxId::new([1; 32]), "canonical order");
    }

    #[test]
    fn collateral_takes_first_sufficient_not_smallest() {
        let utxos = vec![
            utxo(5, 0, Value::from_coin(6_000_000)),
            utxo(2, 0, Value::from_coin(50_000_000)),
        ];
        let chosen = find_collateral(&utxos, 5_000_000).unwrap();
        assert_eq!(chosen.input.tx_id, TxId::new([2; 32]));
    }

    #[test]
    fn collateral_ignores_token_bearing_outputs() {
        let utxos = vec![utxo(1, 0, token(1).checked_add(&Value::from_coin(10_000_000)).unwrap())];
        assert_eq!(
            find_collateral(&utxos, 5_000_000),
            Err(EscrowError::CollateralUnavailable { floor: 5_000_000 })
        );
    }

    #[test]
    fn identity_missing_reports_policy() {
        let utxos = vec![utxo(1, 0, token(1))];
        assert_eq!(
            find_identity(&utxos, &policy(2)),
            Err(EscrowError::IdentityNotFound { policy: policy(2) })
        );
        assert!(find_identity(&utxos, &policy(1)).is_ok());
    }

    #[test]
    fn selection_is_deterministic_and_trimmed() {
        let utxos = vec![
            utxo(1, 0, Value::from_coin(1_000_000)),
            utxo(2, 0, Value::from_coin(1_000_000)),
            utxo(3, 0, Value::from_coin(9_000_000)),
        ];
        let target = Value::from_coin(9_000_000);
        let first = select_covering(&utxos, &target).unwrap();
        let mut reversed = utxos.clone();
        reversed.reverse();
        let second = select_covering(&reversed, &target).unwrap();
        assert_eq!(first, second);
        // The two small inputs were picked first but are redundant.
        assert_eq!(first.selected.len(), 1);
        assert_eq!(first.total, Value::from_coin(9_000_000));
    }

    #[test]
    fn selection_covers_assets() {
        let utxos = vec![
            utxo(1, 0, Value::from_coin(5_000_000)),
            utxo(2, 0, token(4)),
        ];
        let target = token(4);
        let sel = select_covering(&utxos, &target).unwrap();
        assert!(sel.total.covers(&target));
        assert!(sel.selected.iter().any(|u| u.value().holds_policy(&policy(4))));
    }

    #[test]
    fn insufficient_funds_reports_totals() {
        let utxos = vec![utxo(1, 0, Value::from_coin(3))];
        match select_covering(&utxos, &Value::from_coin(4)).unwrap_err() {
            EscrowError::InsufficientFunds { required, available } => {
                assert_eq!(required, Value::from_coin(4));
                assert_eq!(available, Value::from_coin(3));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Exhaustive check over every subset of a small pool: selection succeeds
    /// exactly when some subset covers the target, and then its result covers
    /// the target using only pool members.
    #[test]
    fn selector_agrees_with_exhaustive_search() {
        let pool: Vec<Utxo> = vec![
            utxo(1, 0, Value::from_coin(3)),
            utxo(1, 1, token(1)),
            utxo(2, 0, Value::from_coin(7)),
            utxo(3, 0, token(2)),
            utxo(4, 0, Value::from_coin(1).with_asset(policy(1), AssetName::new(b"id".to_vec()).unwrap(), 2)),
        ];
        let targets = [
            Value::from_coin(0),
            Value::from_coin(10),
            Value::from_coin(4_000_011),
            Value::from_coin(1).with_asset(policy(1), AssetName::new(b"id".to_vec()).unwrap(), 3),
            Value::from_coin(1).with_asset(policy(1), AssetName::new(b"id".to_vec()).unwrap(), 4),
            token(2),
            Value::from_coin(u64::from(u32::MAX)),
        ];

        for mask in 0u32..(1 << pool.len()) {
            let subset: Vec<Utxo> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, u)| u.clone())
                .collect();
            let everything = Value::sum(subset.iter().map(Utxo::value)).unwrap();
            for target in &targets {
                // Values are non-negative, so some subset covers iff all of them do.
                let coverable = everything.covers(target);
                match select_covering(&subset, target) {
                    Ok(sel) => {
                        assert!(coverable);
                        assert!(sel.total.covers(target));
                        assert!(sel.selected.iter().all(|u| subset.contains(u)));
                        assert_eq!(sel.total, Value::sum(sel.selected.iter().map(Utxo::value)).unwrap());
                    }
                    Err(EscrowError::InsufficientFunds { .. }) => assert!(!coverable),
                    Err(other) => panic!("unexpected {other:?}"),
                }
            }
        }
    }
}
