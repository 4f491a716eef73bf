//! # Funding Records
//!
//! The persistence boundary. The escrow core never writes to a database; it
//! emits a [`FundingIntent`] naming the proposed transaction, the datum
//! hash, and the parties, and the CRUD layer stores it as a
//! [`FundingRecord`] whose status it then advances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use athena_protocol::escrow::DatumLayout;
use athena_protocol::ledger::{Address, DatumHash, PolicyId, TxId, Value};
use athena_protocol::{ContractDatum, ProposedTransaction};

use crate::escrow_state::ContractError;

/// Lifecycle of a funding request, owned by the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStatus {
    Requested,
    Submitted,
    OnChain,
    Expired,
}

impl FundingStatus {
    /// Forward-only: `requested -> submitted -> on_chain`, and anything not
    /// yet on chain may expire.
    pub fn can_advance_to(self, next: FundingStatus) -> bool {
        use FundingStatus::*;
        matches!(
            (self, next),
            (Requested, Submitted) | (Submitted, OnChain) | (Requested, Expired) | (Submitted, Expired)
        )
    }
}

impl std::fmt::Display for FundingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FundingStatus::Requested => write!(f, "requested"),
            FundingStatus::Submitted => write!(f, "submitted"),
            FundingStatus::OnChain => write!(f, "on_chain"),
            FundingStatus::Expired => write!(f, "expired"),
        }
    }
}

/// The identity policies an escrow names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parties {
    pub target: PolicyId,
    pub mediator: PolicyId,
    pub fallback: PolicyId,
}

/// What the core hands the store after proposing a funding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingIntent {
    pub proposed_tx_id: TxId,
    pub datum_hash: DatumHash,
    pub funder: Address,
    pub amount: Value,
    pub parties: Parties,
}

impl FundingIntent {
    pub fn new(
        proposal: &ProposedTransaction,
        funder: Address,
        amount: Value,
        datum: &ContractDatum,
        layout: DatumLayout,
    ) -> Self {
        Self {
            proposed_tx_id: proposal.id,
            datum_hash: datum.hash(layout),
            funder,
            amount,
            parties: Parties {
                target: datum.target,
                mediator: datum.mediator,
                fallback: datum.fallback,
            },
        }
    }
}

/// A stored funding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub id: Uuid,
    pub intent: FundingIntent,
    pub status: FundingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FundingRecord {
    pub fn from_intent(intent: FundingIntent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            intent,
            status: FundingStatus::Requested,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, next: FundingStatus) -> Result<(), ContractError> {
        if !self.status.can_advance_to(next) {
            return Err(ContractError::InvalidTransition {
                current: self.status.to_string(),
                attempted: "advance funding status",
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
