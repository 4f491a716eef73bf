//! # Spend Intents
//!
//! The redeemer tells the validator which path the spender is taking:
//!
//! | intent            | encoding                         |
//! |-------------------|----------------------------------|
//! | `ClaimAsTarget`   | `Constr 0 []`  → `d8 79 80`      |
//! | `ClaimAsFallback` | `Constr 1 []`  → `d8 7a 80`      |
//! | `ClaimAsFallback` | `Constr 1 [i]` with a reference index |
//!
//! When the validator build expects a reference index, it must equal the
//! position of the authorizing identity proof in the transaction's *sorted*
//! reference inputs. The assembler computes it; callers never guess it.

use serde::{Deserialize, Serialize};

use crate::error::EscrowError;
use crate::ledger::plutus::PlutusData;

/// Whether the fallback redeemer carries a reference-input index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemerShape {
    Plain,
    WithReferenceIndex,
}

/// What the spender of the escrow output intends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpendIntent {
    ClaimAsTarget,
    ClaimAsFallback { reference_input_index: Option<u64> },
}

impl SpendIntent {
    pub fn to_plutus_data(&self) -> PlutusData {
        match self {
            SpendIntent::ClaimAsTarget => PlutusData::constr(0, vec![]),
            SpendIntent::ClaimAsFallback {
                reference_input_index: None,
            } => PlutusData::constr(1, vec![]),
            SpendIntent::ClaimAsFallback {
                reference_input_index: Some(index),
            } => PlutusData::constr(1, vec![PlutusData::Integer(i128::from(*index))]),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_plutus_data().to_cbor()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EscrowError> {
        let data = PlutusData::from_cbor(bytes).map_err(|e| EscrowError::MalformedRedeemer {
            reason: e.to_string(),
        })?;
        Self::from_plutus_data(&data)
    }

    pub fn from_plutus_data(data: &PlutusData) -> Result<Self, EscrowError> {
        let malformed = |reason: &str| EscrowError::MalformedRedeemer {
            reason: reason.to_string(),
        };
        match data {
            PlutusData::Constr { tag: 0, fields } if fields.is_empty() => {
                Ok(SpendIntent::ClaimAsTarget)
            }
            PlutusData::Constr { tag: 1, fields } => match fields.as_slice() {
                [] => Ok(SpendIntent::ClaimAsFallback {
                    reference_input_index: None,
                }),
                [PlutusData::Integer(n)] => u64::try_from(*n)
                    .map(|index| SpendIntent::ClaimAsFallback {
                        reference_input_index: Some(index),
                    })
                    .map_err(|_| malformed("negative reference index")),
                _ => Err(malformed("unexpected fallback fields")),
            },
            PlutusData::Constr { .. } => Err(malformed("unknown constructor")),
            _ => Err(malformed("expected a constructor")),
        }
    }

    /// True when the intent matches the shape a validator build expects.
    pub fn matches_shape(&self, shape: RedeemerShape) -> bool {
        match (self, shape) {
            (SpendIntent::ClaimAsTarget, _) => true,
            (SpendIntent::ClaimAsFallback { reference_input_index }, RedeemerShape::Plain) => {
                reference_input_index.is_none()
            }
            (
                SpendIntent::ClaimAsFallback { reference_input_index },
                RedeemerShape::WithReferenceIndex,
            ) => reference_input_index.is_some(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
