//! # Multi-Asset Value
//!
//! A ledger value is a coin quantity (lovelace) plus a bundle of native
//! assets keyed by `(policy id, asset name)`. All arithmetic is checked
//! `u64`: money never wraps.
//!
//! Zero-quantity entries are never stored. Every constructor and operation
//! normalizes, so two values with the same non-zero contents compare equal
//! and serialize identically.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{AssetName, PolicyId};

/// Native assets grouped by policy.
pub type MultiAsset = BTreeMap<PolicyId, BTreeMap<AssetName, u64>>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from value arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Subtraction would make a quantity negative.
    #[error("value underflow on {asset}: have {have}, need {need}")]
    Underflow {
        /// `"lovelace"` or `"<policy>.<name>"`.
        asset: String,
        /// Quantity available on the left-hand side.
        have: u64,
        /// Quantity being subtracted.
        need: u64,
    },

    /// Addition would exceed `u64::MAX`.
    #[error("value overflow on {asset}")]
    Overflow {
        /// `"lovelace"` or `"<policy>.<name>"`.
        asset: String,
    },
}

fn asset_label(policy: &PolicyId, name: &AssetName) -> String {
    format!("{}.{}", policy, name.to_hex())
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Coin plus native assets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ValueRepr")]
pub struct Value {
    /// Lovelace.
    pub coin: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    assets: MultiAsset,
}

#[derive(Deserialize)]
struct ValueRepr {
    coin: u64,
    #[serde(default)]
    assets: MultiAsset,
}

impl From<ValueRepr> for Value {
    fn from(repr: ValueRepr) -> Self {
        let mut value = Value::from_coin(repr.coin);
        for (policy, names) in repr.assets {
            for (name, quantity) in names {
                value.set_quantity(policy, name, quantity);
            }
        }
        value
    }
}

impl Value {
    /// The empty value.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A pure-coin value.
    pub fn from_coin(coin: u64) -> Self {
        Self {
            coin,
            assets: MultiAsset::new(),
        }
    }

    /// Builder-style: set the quantity of one asset. A zero quantity removes it.
    pub fn with_asset(mut self, policy: PolicyId, name: AssetName, quantity: u64) -> Self {
        self.set_quantity(policy, name, quantity);
        self
    }

    fn set_quantity(&mut self, policy: PolicyId, name: AssetName, quantity: u64) {
        if quantity == 0 {
            if let Some(names) = self.assets.get_mut(&policy) {
                names.remove(&name);
                if names.is_empty() {
                    self.assets.remove(&policy);
                }
            }
            return;
        }
        self.assets.entry(policy).or_default().insert(name, quantity);
    }

    /// The native-asset bundle.
    pub fn multi_asset(&self) -> &MultiAsset {
        &self.assets
    }

    /// Iterate `(policy, name, quantity)` in canonical order.
    pub fn assets(&self) -> impl Iterator<Item = (&PolicyId, &AssetName, u64)> {
        self.assets
            .iter()
            .flat_map(|(policy, names)| names.iter().map(move |(name, q)| (policy, name, *q)))
    }

    /// Quantity of one asset, zero when absent.
    pub fn quantity_of(&self, policy: &PolicyId, name: &AssetName) -> u64 {
        self.assets
            .get(policy)
            .and_then(|names| names.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// True when at least one unit of any asset under `policy` is present.
    pub fn holds_policy(&self, policy: &PolicyId) -> bool {
        self.assets.contains_key(policy)
    }

    /// True when the value carries no native assets.
    pub fn is_pure_coin(&self) -> bool {
        self.assets.is_empty()
    }

    /// Componentwise sum.
    pub fn checked_add(&self, other: &Value) -> Result<Value, ValueError> {
        let mut result = self.clone();
        result.coin = self.coin.checked_add(other.coin).ok_or(ValueError::Overflow {
            asset: "lovelace".into(),
        })?;
        for (policy, name, quantity) in other.assets() {
            let sum = result
                .quantity_of(policy, name)
                .checked_add(quantity)
                .ok_or_else(|| ValueError::Overflow {
                    asset: asset_label(policy, name),
                })?;
            result.set_quantity(*policy, name.clone(), sum);
        }
        Ok(result)
    }

    /// Componentwise difference. Fails if any quantity would go negative.
    pub fn checked_sub(&self, other: &Value) -> Result<Value, ValueError> {
        let mut result = self.clone();
        result.coin = self
            .coin
            .checked_sub(other.coin)
            .ok_or_else(|| ValueError::Underflow {
                asset: "lovelace".into(),
                have: self.coin,
                need: other.coin,
            })?;
        for (policy, name, quantity) in other.assets() {
            let have = self.quantity_of(policy, name);
            let rest = have.checked_sub(quantity).ok_or_else(|| ValueError::Underflow {
                asset: asset_label(policy, name),
                have,
                need: quantity,
            })?;
            result.set_quantity(*policy, name.clone(), rest);
        }
        Ok(result)
    }

    /// True iff every quantity in `other` (coin included) is at most the
    /// corresponding quantity in `self`. Assets absent from `self` count as
    /// zero, so an unknown asset in `other` makes this false.
    pub fn covers(&self, other: &Value) -> bool {
        self.coin >= other.coin
            && other
                .assets()
                .all(|(policy, name, quantity)| self.quantity_of(policy, name) >= quantity)
    }

    /// What `have` is missing to cover `self`: each quantity of `self` less
    /// the matching quantity of `have`, floored at zero.
    pub fn shortfall(&self, have: &Value) -> Value {
        let mut missing = Value::from_coin(self.coin.saturating_sub(have.coin));
        for (policy, name, quantity) in self.assets() {
            let lacking = quantity.saturating_sub(have.quantity_of(policy, name));
            missing.set_quantity(*policy, name.clone(), lacking);
        }
        missing
    }

    /// No coin and no assets.
    pub fn is_zero(&self) -> bool {
        self.coin == 0 && self.assets.is_empty()
    }

    /// Sum of many values.
    pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<Value, ValueError> {
        values
            .into_iter()
            .try_fold(Value::zero(), |acc, v| acc.checked_add(v))
    }

    /// Number of distinct native assets.
    pub fn asset_count(&self) -> usize {
        self.assets.values().map(BTreeMap::len).sum()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lovelace", self.coin)?;
        for (policy, name, quantity) in self.assets() {
            write!(f, " + {} {}.{}", quantity, policy, name)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
