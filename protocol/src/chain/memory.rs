//! In-memory reference ledger.
//!
//! Applies submitted transactions atomically under one write lock: every
//! input must still exist, the current slot must sit inside the validity
//! interval, value must balance, and every required key must have signed.
//! Plutus scripts are not evaluated; their datum, redeemer and collateral
//! are only checked for presence.
//!
//! Used by the integration tests and by the CLI `simulate` command.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{AwaitPolicy, ChainBackend, ChainError, Confirmation, SubmitError};
use crate::config::DEFAULT_COINS_PER_UTXO_BYTE;
use crate::crypto::blake2b_256_parts;
use crate::ledger::{Address, OutputRef, Slot, TxId, TxOutput, Utxo, Value};
use crate::transaction::verification;
use crate::transaction::SignedTransaction;

#[derive(Debug, Default)]
struct LedgerState {
    utxos: BTreeMap<OutputRef, TxOutput>,
    slot: Slot,
    confirmed: BTreeMap<TxId, Slot>,
    genesis_count: u64,
}

/// A single-node ledger held in memory.
#[derive(Debug)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    coins_per_utxo_byte: u64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(Slot(0))
    }
}

impl InMemoryLedger {
    pub fn new(slot: Slot) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                slot,
                ..LedgerState::default()
            }),
            coins_per_utxo_byte: DEFAULT_COINS_PER_UTXO_BYTE,
        }
    }

    /// Overrides the minimum-coin rate enforced on outputs.
    pub fn with_coins_per_utxo_byte(mut self, rate: u64) -> Self {
        self.coins_per_utxo_byte = rate;
        self
    }

    /// Creates an output out of thin air, as a genesis distribution would.
    pub fn fund(&self, address: Address, value: Value) -> Utxo {
        let mut state = self.state.write();
        state.genesis_count += 1;
        let id = TxId::new(blake2b_256_parts(&[
            b"genesis",
            &state.genesis_count.to_be_bytes(),
        ]));
        let utxo = Utxo::new(OutputRef::new(id, 0), TxOutput::new(address, value));
        state.utxos.insert(utxo.input, utxo.output.clone());
        utxo
    }

    /// Inserts an arbitrary output, for example a script-locked one.
    pub fn insert(&self, utxo: Utxo) {
        self.state.write().utxos.insert(utxo.input, utxo.output);
    }

    pub fn utxo(&self, input: &OutputRef) -> Option<Utxo> {
        self.state
            .read()
            .utxos
            .get(input)
            .map(|output| Utxo::new(*input, output.clone()))
    }

    pub fn slot(&self) -> Slot {
        self.state.read().slot
    }

    pub fn set_slot(&self, slot: Slot) {
        self.state.write().slot = slot;
    }

    pub fn advance(&self, slots: u64) -> Slot {
        let mut state = self.state.write();
        state.slot = state.slot.saturating_add(slots);
        state.slot
    }

    /// Every unspent output, in canonical order.
    pub fn all_utxos(&self) -> Vec<Utxo> {
        self.state
            .read()
            .utxos
            .iter()
            .map(|(input, output)| Utxo::new(*input, output.clone()))
            .collect()
    }

    fn resolve(
        utxos: &BTreeMap<OutputRef, TxOutput>,
        inputs: &[OutputRef],
    ) -> Result<Vec<Utxo>, SubmitError> {
        inputs
            .iter()
            .map(|input| {
                utxos
                    .get(input)
                    .map(|output| Utxo::new(*input, output.clone()))
                    .ok_or(SubmitError::StaleInput { input: *input })
            })
            .collect()
    }

    fn validate(&self, state: &LedgerState, signed: &SignedTransaction) -> Result<Vec<Utxo>, SubmitError> {
        let tx = &signed.transaction;
        let body = &tx.body;

        let consumed = Self::resolve(&state.utxos, &body.inputs)?;
        Self::resolve(&state.utxos, &body.reference_inputs)?;
        let collateral = Self::resolve(&state.utxos, &body.collateral)?;

        let reject = |e: verification::VerificationError| SubmitError::Rejected(e.to_string());
        verification::check_validity(tx, state.slot).map_err(reject)?;
        verification::check_conservation(tx, &consumed).map_err(reject)?;
        verification::check_min_coin(tx, self.coins_per_utxo_byte).map_err(reject)?;
        verification::check_script_inputs(tx, &consumed).map_err(reject)?;
        let required = verification::required_keys(tx, &consumed, &collateral);
        verification::verify_witnesses(tx, &required).map_err(reject)?;
        Ok(consumed)
    }
}

#[async_trait]
impl ChainBackend for InMemoryLedger {
    async fn list_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ChainError> {
        Ok(self
            .state
            .read()
            .utxos
            .iter()
            .filter(|(_, output)| output.address == *address)
            .map(|(input, output)| Utxo::new(*input, output.clone()))
            .collect())
    }

    async fn current_slot(&self) -> Result<Slot, ChainError> {
        Ok(self.slot())
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<TxId, SubmitError> {
        let id = signed.transaction.id();
        if id != signed.id {
            return Err(SubmitError::Rejected(format!(
                "declared id {} does not match body id {id}",
                signed.id
            )));
        }

        let mut state = self.state.write();
        let consumed = match self.validate(&state, signed) {
            Ok(consumed) => consumed,
            Err(err) => {
                match &err {
                    SubmitError::StaleInput { input } => warn!(tx_id = %id, %input, "stale input"),
                    other => warn!(tx_id = %id, error = %other, "transaction rejected"),
                }
                return Err(err);
            }
        };

        for utxo in &consumed {
            state.utxos.remove(&utxo.input);
        }
        for (index, output) in signed.transaction.body.outputs.iter().enumerate() {
            state
                .utxos
                .insert(OutputRef::new(id, index as u32), output.clone());
        }
        let slot = state.slot;
        state.confirmed.insert(id, slot);

        info!(tx_id = %id, %slot, inputs = consumed.len(), "transaction applied");
        Ok(id)
    }

    async fn await_confirmation(
        &self,
        id: TxId,
        policy: AwaitPolicy,
    ) -> Result<Confirmation, ChainError> {
        let started = Instant::now();
        loop {
            if let Some(slot) = self.state.read().confirmed.get(&id).copied() {
                return Ok(Confirmation::Confirmed { slot });
            }
            if started.elapsed() >= policy.timeout {
                debug!(tx_id = %id, "confirmation timed out");
                return Ok(Confirmation::TimedOut);
            }
            sleep(policy.poll_interval).await;
        }
    }
}
