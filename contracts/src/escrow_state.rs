//! # Escrow State Machine
//!
//! The escrow's state is never stored; it is derived from what the chain
//! shows at the escrow address. The lifecycle is:
//!
//! 1. **Unfunded**: no output at the validator commits to the datum.
//! 2. **Funded**: exactly one does, carrying the agreed amount.
//! 3. **SettledToTarget** / **SettledToFallback**: that output was consumed
//!    by a claim. Both are terminal.
//!
//! Guards here are local and advisory. They refuse to propose a transition
//! whose precondition does not hold against the latest observation; the
//! chain re-validates everything on submission.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use athena_protocol::config::ValidatorVariant;
use athena_protocol::escrow::{ContractDatum, DatumLayout, SpendIntent};
use athena_protocol::ledger::{Address, PosixMillis, TxId, Utxo, Value};
use athena_protocol::selection::find_identity;
use athena_protocol::EscrowError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the escrow lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// The escrow is not in a state that allows this operation.
    #[error("invalid transition: escrow is {current}, cannot {attempted}")]
    InvalidTransition {
        /// The escrow's current state.
        current: String,
        /// What the caller tried to do.
        attempted: &'static str,
    },

    /// More than one output matches the same terms; funding the same datum
    /// twice makes the escrow unidentifiable.
    #[error("{count} outputs at the escrow address match the same datum and amount")]
    AmbiguousEscrow { count: usize },

    #[error(transparent)]
    Escrow(#[from] EscrowError),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where an escrow stands on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EscrowState {
    Unfunded,
    Funded { utxo: Utxo },
    SettledToTarget { tx_id: TxId },
    SettledToFallback { tx_id: TxId },
}

impl EscrowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscrowState::SettledToTarget { .. } | EscrowState::SettledToFallback { .. }
        )
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscrowState::Unfunded => write!(f, "Unfunded"),
            EscrowState::Funded { utxo } => write!(f, "Funded({})", utxo.input),
            EscrowState::SettledToTarget { .. } => write!(f, "SettledToTarget"),
            EscrowState::SettledToFallback { .. } => write!(f, "SettledToFallback"),
        }
    }
}

/// Derives the state of the escrow for `datum` from the outputs at the
/// validator address.
///
/// An output matches when it sits at `escrow_address`, commits to the
/// datum's hash, and carries exactly `amount`.
pub fn observe_escrow(
    script_utxos: &[Utxo],
    escrow_address: &Address,
    datum: &ContractDatum,
    amount: &Value,
    layout: DatumLayout,
) -> Result<EscrowState, ContractError> {
    let hash = datum.hash(layout);
    let mut matches: Vec<&Utxo> = script_utxos
        .iter()
        .filter(|u| {
            u.address() == escrow_address
                && u.output.datum_hash == Some(hash)
                && u.value() == amount
        })
        .collect();

    match matches.len() {
        0 => Ok(EscrowState::Unfunded),
        1 => Ok(EscrowState::Funded {
            utxo: matches.remove(0).clone(),
        }),
        count => Err(ContractError::AmbiguousEscrow { count }),
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// What a target claim needs once its guard passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetClaimProof {
    pub escrow: Utxo,
    pub identity: Utxo,
}

/// What a fallback claim needs once its guard passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackClaimProof {
    pub escrow: Utxo,
    pub mediator: Utxo,
    pub fallback: Utxo,
}

/// One escrow's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowMachine {
    datum: ContractDatum,
    layout: DatumLayout,
    state: EscrowState,
}

impl EscrowMachine {
    /// A machine for an escrow that has not been funded yet.
    pub fn new(datum: ContractDatum, layout: DatumLayout) -> Self {
        Self::with_state(datum, layout, EscrowState::Unfunded)
    }

    /// A machine resuming from an observed state.
    pub fn with_state(datum: ContractDatum, layout: DatumLayout, state: EscrowState) -> Self {
        Self {
            datum,
            layout,
            state,
        }
    }

    pub fn datum(&self) -> &ContractDatum {
        &self.datum
    }

    pub fn state(&self) -> &EscrowState {
        &self.state
    }

    fn refuse(&self, attempted: &'static str) -> ContractError {
        ContractError::InvalidTransition {
            current: self.state.to_string(),
            attempted,
        }
    }

    fn funded_utxo(&self, attempted: &'static str) -> Result<&Utxo, ContractError> {
        match &self.state {
            EscrowState::Funded { utxo } => Ok(utxo),
            _ => Err(self.refuse(attempted)),
        }
    }

    /// `Unfunded -> Funded` once the funding output is observed confirmed.
    ///
    /// The output must sit at `escrow_address` and commit to the datum, the
    /// same match `observe_escrow` applies.
    pub fn confirm_funding(&mut self, utxo: Utxo, escrow_address: &Address) -> Result<(), ContractError> {
        if self.state != EscrowState::Unfunded {
            return Err(self.refuse("confirm funding"));
        }
        if utxo.address() != escrow_address {
            return Err(EscrowError::MalformedDatum {
                reason: format!("{} is not at the escrow address", utxo.input),
            }
            .into());
        }
        let expected = self.datum.hash(self.layout);
        if utxo.output.datum_hash != Some(expected) {
            return Err(EscrowError::MalformedDatum {
                reason: format!("{} does not commit to datum {expected}", utxo.input),
            }
            .into());
        }
        self.state = EscrowState::Funded { utxo };
        Ok(())
    }

    /// Checks `Funded -> SettledToTarget`: before the deadline, with the
    /// claimant holding a target identity token.
    pub fn guard_target_claim(
        &self,
        now: PosixMillis,
        claimant_utxos: &[Utxo],
    ) -> Result<TargetClaimProof, ContractError> {
        let escrow = self.funded_utxo("claim as target")?;
        if now >= self.datum.deadline {
            return Err(EscrowError::DeadlinePassed {
                deadline: self.datum.deadline,
                now,
            }
            .into());
        }
        let identity = find_identity(claimant_utxos, &self.datum.target)?;
        Ok(TargetClaimProof {
            escrow: escrow.clone(),
            identity,
        })
    }

    /// Checks `Funded -> SettledToFallback`: both identity proofs observed,
    /// and the deadline passed when the validator variant demands it.
    pub fn guard_fallback_claim(
        &self,
        now: PosixMillis,
        mediator_utxos: &[Utxo],
        fallback_utxos: &[Utxo],
        variant: &ValidatorVariant,
    ) -> Result<FallbackClaimProof, ContractError> {
        let escrow = self.funded_utxo("claim as fallback")?;
        let mediator = find_identity(mediator_utxos, &self.datum.mediator)?;
        let fallback = find_identity(fallback_utxos, &self.datum.fallback)?;
        if variant.fallback_requires_deadline && now < self.datum.deadline {
            return Err(EscrowError::DeadlineNotYetReached {
                deadline: self.datum.deadline,
                now,
            }
            .into());
        }
        Ok(FallbackClaimProof {
            escrow: escrow.clone(),
            mediator,
            fallback,
        })
    }

    /// `Funded -> Settled*` once a claim carrying `intent` is confirmed.
    pub fn confirm_settlement(&mut self, intent: &SpendIntent, tx_id: TxId) -> Result<(), ContractError> {
        self.funded_utxo("confirm settlement")?;
        self.state = match intent {
            SpendIntent::ClaimAsTarget => EscrowState::SettledToTarget { tx_id },
            SpendIntent::ClaimAsFallback { .. } => EscrowState::SettledToFallback { tx_id },
        };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
