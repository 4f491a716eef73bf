//! # Escrow Errors
//!
//! Every fallible operation in the escrow flow returns [`EscrowError`]. None
//! of these are fatal to the process; each is a tagged reason the calling
//! layer can act on. Only [`EscrowError::StaleInput`] and
//! [`EscrowError::CollateralUnavailable`] are worth retrying, and only after
//! re-observing the chain or creating collateral.

use thiserror::Error;

use crate::auth::AuthFailure;
use crate::chain::ChainError;
use crate::ledger::{AddressError, OutputRef, PolicyId, PosixMillis, ScriptError, Value, ValueError};
use crate::transaction::signing::SigningError;

/// The tagged failure kinds of the escrow core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    /// The available inputs cannot cover what the transaction must pay.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Total that had to be covered, fees included where known.
        required: Value,
        /// Total of every candidate input.
        available: Value,
    },

    /// An output would carry less coin than the ledger minimum for its shape.
    #[error("amount below minimum: output needs at least {required} lovelace, got {provided}")]
    AmountBelowMinimum {
        /// Minimum coin for the output.
        required: u64,
        /// Coin the caller asked for.
        provided: u64,
    },

    /// No UTXO carries a token under the required identity policy.
    #[error("no identity token under policy {policy} found")]
    IdentityNotFound {
        /// Policy whose token was required.
        policy: PolicyId,
    },

    /// No pure-coin UTXO large enough to serve as collateral.
    #[error("no pure-coin UTXO of at least {floor} lovelace available for collateral")]
    CollateralUnavailable {
        /// Required collateral floor.
        floor: u64,
    },

    /// The target claim window has closed.
    #[error("escrow deadline {deadline} has passed (now {now})")]
    DeadlinePassed {
        deadline: PosixMillis,
        now: PosixMillis,
    },

    /// The fallback path is not open yet under the configured validator.
    #[error("escrow deadline {deadline} not yet reached (now {now})")]
    DeadlineNotYetReached {
        deadline: PosixMillis,
        now: PosixMillis,
    },

    /// An input was already consumed by the time of submission.
    #[error("input {input} is already spent; re-observe the chain and retry")]
    StaleInput {
        /// The conflicting input.
        input: OutputRef,
    },

    /// Message authentication failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    /// A datum does not have the expected shape or contents.
    #[error("malformed datum: {reason}")]
    MalformedDatum { reason: String },

    /// A redeemer does not have the expected shape.
    #[error("malformed redeemer: {reason}")]
    MalformedRedeemer { reason: String },

    /// A mint request that cannot be expressed on the ledger.
    #[error("invalid mint: {reason}")]
    InvalidMint { reason: String },

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl EscrowError {
    /// True for the two kinds a caller can sensibly retry after remedial
    /// action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EscrowError::StaleInput { .. } | EscrowError::CollateralUnavailable { .. }
        )
    }
}
