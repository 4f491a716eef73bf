//! # Contract Datum
//!
//! The committed escrow parameters: three identity policies and a deadline.
//! Encoded as `Constr 0 [a, b, c, deadline]` where the order of the three
//! policies depends on the validator build being targeted.
//!
//! Validator builds have disagreed on that order, and a datum encoded in the
//! wrong order hashes to a different value and silently locks funds under
//! terms nobody can satisfy. The order is therefore an explicit
//! [`DatumLayout`] chosen in configuration, and decoding checks the shape
//! strictly instead of guessing.
//!
//! Deadlines are POSIX **milliseconds**. Values small enough to be seconds
//! are rejected at construction and decode time.

use serde::{Deserialize, Serialize};

use crate::error::EscrowError;
use crate::ledger::plutus::PlutusData;
use crate::ledger::time::{PosixMillis, MILLIS_PER_DAY};
use crate::ledger::types::{DatumHash, PolicyId};

/// Smallest deadline accepted as milliseconds (early 1973). Any realistic
/// deadline expressed in seconds is far below this.
pub const PLAUSIBLE_MILLIS_FLOOR: u64 = 100_000_000_000;

/// Field order of the three identity policies inside the datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatumLayout {
    /// `{mediators, target, fallback, deadline}`
    MediatorTargetFallback,
    /// `{target, fallback, mediators, deadline}`
    TargetFallbackMediator,
    /// `{target, mediator, fallback, deadline}`
    TargetMediatorFallback,
}

#[derive(Clone, Copy)]
enum Role {
    Target,
    Mediator,
    Fallback,
}

impl DatumLayout {
    fn order(self) -> [Role; 3] {
        match self {
            DatumLayout::MediatorTargetFallback => [Role::Mediator, Role::Target, Role::Fallback],
            DatumLayout::TargetFallbackMediator => [Role::Target, Role::Fallback, Role::Mediator],
            DatumLayout::TargetMediatorFallback => [Role::Target, Role::Mediator, Role::Fallback],
        }
    }
}

/// Escrow terms committed on-chain by hash.
///
/// Deserialization goes through [`ContractDatum::new`], so JSON input gets
/// the same deadline unit check as every other entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ContractDatumRepr")]
pub struct ContractDatum {
    /// Policy whose token identifies the party entitled to claim before the deadline.
    pub target: PolicyId,
    /// Policy whose token identifies the mediator.
    pub mediator: PolicyId,
    /// Policy whose token identifies the party receiving funds on the fallback path.
    pub fallback: PolicyId,
    /// Claim deadline.
    pub deadline: PosixMillis,
}

#[derive(Deserialize)]
struct ContractDatumRepr {
    target: PolicyId,
    mediator: PolicyId,
    fallback: PolicyId,
    deadline: PosixMillis,
}

impl TryFrom<ContractDatumRepr> for ContractDatum {
    type Error = EscrowError;

    fn try_from(repr: ContractDatumRepr) -> Result<Self, Self::Error> {
        ContractDatum::new(repr.target, repr.mediator, repr.fallback, repr.deadline)
    }
}

impl ContractDatum {
    /// Creates a datum, rejecting deadlines that look like POSIX seconds.
    pub fn new(
        target: PolicyId,
        mediator: PolicyId,
        fallback: PolicyId,
        deadline: PosixMillis,
    ) -> Result<Self, EscrowError> {
        check_deadline_unit(deadline)?;
        Ok(Self {
            target,
            mediator,
            fallback,
            deadline,
        })
    }

    fn policy(&self, role: Role) -> &PolicyId {
        match role {
            Role::Target => &self.target,
            Role::Mediator => &self.mediator,
            Role::Fallback => &self.fallback,
        }
    }

    pub fn to_plutus_data(&self, layout: DatumLayout) -> PlutusData {
        let mut fields: Vec<PlutusData> = layout
            .order()
            .iter()
            .map(|role| PlutusData::Bytes(self.policy(*role).as_ref().to_vec()))
            .collect();
        fields.push(PlutusData::Integer(i128::from(self.deadline.as_millis())));
        PlutusData::constr(0, fields)
    }

    /// Canonical CBOR bytes.
    pub fn encode(&self, layout: DatumLayout) -> Vec<u8> {
        self.to_plutus_data(layout).to_cbor()
    }

    /// The hash attached to the escrow output.
    pub fn hash(&self, layout: DatumLayout) -> DatumHash {
        datum_hash(&self.encode(layout))
    }

    /// Decodes bytes produced under `layout`.
    pub fn decode(bytes: &[u8], layout: DatumLayout) -> Result<Self, EscrowError> {
        let data = PlutusData::from_cbor(bytes).map_err(|e| EscrowError::MalformedDatum {
            reason: e.to_string(),
        })?;
        Self::from_plutus_data(&data, layout)
    }

    /// Interprets Plutus data under `layout`. Any other shape is an error.
    pub fn from_plutus_data(data: &PlutusData, layout: DatumLayout) -> Result<Self, EscrowError> {
        let malformed = |reason: String| EscrowError::MalformedDatum { reason };

        let fields = match data {
            PlutusData::Constr { tag: 0, fields } => fields,
            PlutusData::Constr { tag, .. } => {
                return Err(malformed(format!("expected constructor 0, found {tag}")))
            }
            _ => return Err(malformed("expected a constructor".into())),
        };
        if fields.len() != 4 {
            return Err(malformed(format!("expected 4 fields, found {}", fields.len())));
        }

        let mut policies = [PolicyId::new([0; 28]); 3];
        for (slot, field) in policies.iter_mut().zip(&fields[..3]) {
            *slot = match field {
                PlutusData::Bytes(bytes) => PolicyId::from_slice(bytes)
                    .map_err(|e| malformed(e.to_string()))?,
                _ => return Err(malformed("identity field is not a byte string".into())),
            };
        }
        let deadline = match &fields[3] {
            PlutusData::Integer(n) => u64::try_from(*n)
                .map(PosixMillis)
                .map_err(|_| malformed(format!("deadline {n} out of range")))?,
            _ => return Err(malformed("deadline is not an integer".into())),
        };

        let mut datum = ContractDatum {
            target: policies[0],
            mediator: policies[0],
            fallback: policies[0],
            deadline,
        };
        for (role, policy) in layout.order().iter().zip(policies) {
            match role {
                Role::Target => datum.target = policy,
                Role::Mediator => datum.mediator = policy,
                Role::Fallback => datum.fallback = policy,
            }
        }
        check_deadline_unit(deadline)?;
        Ok(datum)
    }
}

/// BLAKE2b-256 of encoded datum bytes.
pub fn datum_hash(encoded: &[u8]) -> DatumHash {
    DatumHash::new(crate::crypto::blake2b_256(encoded))
}

/// Deadline `days_to_complete` days after `created_at`, in milliseconds.
pub fn project_deadline(
    created_at: PosixMillis,
    days_to_complete: u32,
) -> Result<PosixMillis, EscrowError> {
    u64::from(days_to_complete)
        .checked_mul(MILLIS_PER_DAY)
        .and_then(|span| created_at.as_millis().checked_add(span))
        .map(PosixMillis)
        .ok_or_else(|| EscrowError::MalformedDatum {
            reason: "deadline overflows 64 bits".into(),
        })
}

fn check_deadline_unit(deadline: PosixMillis) -> Result<(), EscrowError> {
    if deadline.as_millis() < PLAUSIBLE_MILLIS_FLOOR {
        return Err(EscrowError::MalformedDatum {
            reason: format!(
                "deadline {} is too small for POSIX milliseconds; was it given in seconds?",
                deadline.as_millis()
            ),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
