//! # Chain Collaborator
//!
//! The escrow core never talks to a node itself. Whatever observes the
//! chain and submits transactions implements [`ChainBackend`]; the core
//! only consumes snapshots and submission outcomes.
//!
//! Double-spends are not prevented ahead of time. A submission that names
//! an already-consumed input comes back as [`SubmitError::StaleInput`],
//! which converts into the retryable [`EscrowError::StaleInput`].

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EscrowError;
use crate::ledger::{Address, OutputRef, Slot, TxId, Utxo};
use crate::transaction::SignedTransaction;

pub use memory::InMemoryLedger;

/// Why a submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// An input no longer exists: someone else consumed it first.
    #[error("input {input} is already spent")]
    StaleInput { input: OutputRef },

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("chain backend unavailable: {0}")]
    Unavailable(String),
}

/// Failures talking to the chain outside of submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error(transparent)]
    Submit(SubmitError),

    #[error("chain backend unavailable: {0}")]
    Unavailable(String),
}

impl From<SubmitError> for EscrowError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::StaleInput { input } => EscrowError::StaleInput { input },
            other => EscrowError::Chain(ChainError::Submit(other)),
        }
    }
}

/// How long and how often to poll for inclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for AwaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Outcome of waiting for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Confirmation {
    Confirmed { slot: Slot },
    Rejected { reason: String },
    TimedOut,
}

/// Chain observation and submission.
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Unspent outputs currently at `address`, in canonical order.
    async fn list_utxos(&self, address: &Address) -> Result<Vec<Utxo>, ChainError>;

    async fn current_slot(&self) -> Result<Slot, ChainError>;

    /// Hands a signed transaction to the chain.
    async fn submit(&self, tx: &SignedTransaction) -> Result<TxId, SubmitError>;

    /// Waits until `id` is included, rejected, or `policy.timeout` elapses.
    async fn await_confirmation(
        &self,
        id: TxId,
        policy: AwaitPolicy,
    ) -> Result<Confirmation, ChainError>;
}
