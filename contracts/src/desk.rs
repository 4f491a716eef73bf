//! # Escrow Desk
//!
//! Orchestrates one request end to end: authenticate the caller, observe
//! the escrow, check the transition guard, select inputs, and hand back a
//! proposal for the caller to sign. Submission goes through the same
//! [`ChainBackend`] the observations came from.
//!
//! The desk holds no mutable state. Every call re-observes the chain, so
//! two concurrent requests against the same escrow both get proposals and
//! the ledger decides which one lands; the loser sees
//! [`EscrowError::StaleInput`].

use athena_protocol::auth::{self, CredentialMode, SignedMessage, VerifiedMessage};
use athena_protocol::chain::{AwaitPolicy, ChainBackend, ChainError, Confirmation, SubmitError};
use athena_protocol::ledger::{AnyAddress, Address, TxId, Utxo, Value};
use athena_protocol::selection::select_covering;
use athena_protocol::transaction::{FallbackClaimRequest, TargetClaimRequest};
use athena_protocol::{
    Assembler, ContractDatum, EscrowConfig, EscrowError, ProposedTransaction, SignedTransaction,
};
use tracing::{info, warn};

use crate::escrow_state::{observe_escrow, ContractError, EscrowMachine, EscrowState};
use crate::funding::FundingIntent;

/// Lovelace reserved on top of the escrowed amount when picking funding
/// inputs, covering the fee and a change output.
pub const FUNDING_HEADROOM: u64 = 2_000_000;

impl From<ChainError> for ContractError {
    fn from(err: ChainError) -> Self {
        ContractError::Escrow(err.into())
    }
}

impl From<SubmitError> for ContractError {
    fn from(err: SubmitError) -> Self {
        ContractError::Escrow(err.into())
    }
}

/// Escrow request handling over one chain backend.
pub struct EscrowDesk<B> {
    config: EscrowConfig,
    chain: B,
}

impl<B: ChainBackend> EscrowDesk<B> {
    pub fn new(config: EscrowConfig, chain: B) -> Self {
        Self { config, chain }
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn chain(&self) -> &B {
        &self.chain
    }

    /// Verifies an API caller's signed message. `mode` defaults to the
    /// configured credential mode.
    pub fn authenticate(
        &self,
        signed: &SignedMessage,
        claimed: &AnyAddress,
        mode: Option<CredentialMode>,
        now_secs: u64,
    ) -> Result<VerifiedMessage, ContractError> {
        let auth = &self.config.auth;
        let mode = mode.unwrap_or(auth.credential_mode);
        auth::verify(signed, claimed, mode, auth, now_secs).map_err(|failure| {
            warn!(%failure, "authentication failed");
            ContractError::Escrow(failure.into())
        })
    }

    /// The escrow for `datum` and `amount` as the chain shows it now.
    pub async fn observe(&self, datum: &ContractDatum, amount: &Value) -> Result<EscrowMachine, ContractError> {
        let layout = self.config.variant.datum_layout;
        let script_address = self.config.script_address();
        let utxos = self.chain.list_utxos(&script_address).await?;
        let state = observe_escrow(&utxos, &script_address, datum, amount, layout)?;
        Ok(EscrowMachine::with_state(*datum, layout, state))
    }

    /// Proposes locking `amount` under `datum`, refusing if that escrow is
    /// already funded.
    pub async fn request_funding(
        &self,
        funder: &Address,
        amount: &Value,
        datum: &ContractDatum,
    ) -> Result<(ProposedTransaction, FundingIntent), ContractError> {
        let machine = self.observe(datum, amount).await?;
        if machine.state() != &EscrowState::Unfunded {
            return Err(ContractError::InvalidTransition {
                current: machine.state().to_string(),
                attempted: "fund",
            });
        }

        let wallet = self.chain.list_utxos(funder).await?;
        let target = amount.checked_add(&Value::from_coin(FUNDING_HEADROOM)).map_err(EscrowError::from)?;
        let funding = match select_covering(&wallet, &target) {
            Ok(selection) => selection.selected,
            // Let the assembler report the precise shortfall.
            Err(EscrowError::InsufficientFunds { .. }) => wallet,
            Err(e) => return Err(e.into()),
        };

        let proposal = Assembler::new(&self.config).propose_fund(funder, &funding, amount, datum)?;
        let intent = FundingIntent::new(
            &proposal,
            *funder,
            amount.clone(),
            datum,
            self.config.variant.datum_layout,
        );
        info!(tx_id = %proposal.id, datum_hash = %intent.datum_hash, "funding requested");
        Ok((proposal, intent))
    }

    /// Proposes the target's claim against the currently funded escrow.
    pub async fn request_target_claim(
        &self,
        target: &Address,
        datum: &ContractDatum,
        amount: &Value,
    ) -> Result<ProposedTransaction, ContractError> {
        let machine = self.observe(datum, amount).await?;
        let wallet = self.chain.list_utxos(target).await?;
        let now = self.chain.current_slot().await?;
        let now_ms = self.config.slot_config().slot_to_posix(now);

        let proof = machine.guard_target_claim(now_ms, &wallet)?;
        let spendable = without(&wallet, &[&proof.identity]);
        let proposal = Assembler::new(&self.config).propose_claim_as_target(&TargetClaimRequest {
            target_address: target,
            target_wallet: &spendable,
            identity_reference: Some(&proof.identity),
            escrow_utxo: &proof.escrow,
            datum,
            now,
        })?;
        Ok(proposal)
    }

    /// Proposes the mediator-authorized fallback claim.
    pub async fn request_fallback_claim(
        &self,
        mediator: &Address,
        fallback: &Address,
        datum: &ContractDatum,
        amount: &Value,
    ) -> Result<ProposedTransaction, ContractError> {
        let machine = self.observe(datum, amount).await?;
        let mediator_wallet = self.chain.list_utxos(mediator).await?;
        let fallback_wallet = self.chain.list_utxos(fallback).await?;
        let now = self.chain.current_slot().await?;
        let now_ms = self.config.slot_config().slot_to_posix(now);

        let proof = machine.guard_fallback_claim(now_ms, &mediator_wallet, &fallback_wallet, &self.config.variant)?;
        let spendable = without(&mediator_wallet, &[&proof.mediator]);
        let proposal = Assembler::new(&self.config).propose_claim_as_fallback(&FallbackClaimRequest {
            mediator_address: mediator,
            mediator_reference: Some(&proof.mediator),
            fallback_address: fallback,
            fallback_reference: Some(&proof.fallback),
            mediator_wallet: &spendable,
            escrow_utxo: &proof.escrow,
            datum,
            now,
        })?;
        Ok(proposal)
    }

    /// Submits a signed transaction. An already-spent input surfaces as the
    /// retryable [`EscrowError::StaleInput`].
    pub async fn submit(&self, signed: &SignedTransaction) -> Result<TxId, ContractError> {
        match self.chain.submit(signed).await {
            Ok(id) => Ok(id),
            Err(err) => {
                warn!(tx_id = %signed.id, error = %err, "submission failed");
                Err(err.into())
            }
        }
    }

    /// Submits and waits for inclusion.
    pub async fn submit_and_confirm(
        &self,
        signed: &SignedTransaction,
        policy: AwaitPolicy,
    ) -> Result<Confirmation, ContractError> {
        let id = self.submit(signed).await?;
        Ok(self.chain.await_confirmation(id, policy).await?)
    }
}

/// `utxos` minus the ones in `exclude`.
fn without(utxos: &[Utxo], exclude: &[&Utxo]) -> Vec<Utxo> {
    utxos
        .iter()
        .filter(|u| !exclude.iter().any(|e| e.input == u.input))
        .cloned()
        .collect()
}
