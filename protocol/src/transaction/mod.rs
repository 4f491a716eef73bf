//! # Transaction Module
//!
//! Assembly, signing and verification of escrow transactions.
//!
//! ## Architecture
//!
//! ```text
//! types.rs       : body, witness set, auxiliary data and their CBOR
//! builder.rs     : TransactionBuilder: selection, change, fee balancing
//! assembler.rs   : the escrow proposals (fund, claims, mint, collateral)
//! signing.rs     : vkey witnesses over the transaction id
//! verification.rs: ledger-side checks used by the in-memory chain
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Propose**: an [`Assembler`] turns a UTXO snapshot into a balanced
//!    [`ProposedTransaction`].
//! 2. **Sign**: [`sign_transaction`] attaches one witness per required key.
//! 3. **Submit**: a [`ChainBackend`](crate::chain::ChainBackend) accepts or
//!    rejects it.
//!
//! ## Design Decisions
//!
//! - The transaction id is BLAKE2b-256 of the encoded body. Witnesses sign
//!   that id, so attaching them never changes it.
//! - Fees are computed from a draft carrying placeholder witnesses, so the
//!   signed transaction is never larger than what was paid for.
//! - All quantities are `u64` lovelace or asset units. No floating point
//!   anywhere near monetary values.

pub mod assembler;
pub mod builder;
pub mod signing;
pub mod types;
pub mod verification;

pub use assembler::{
    Assembler, FallbackClaimRequest, MintRequest, ProposedTransaction, TargetClaimRequest,
};
pub use builder::{script_data_hash, BuiltTransaction, ScriptSpend, TransactionBuilder};
pub use signing::{sign_transaction, SignedTransaction, SigningError};
pub use types::{
    AuxiliaryData, ExUnits, Metadatum, Redeemer, RedeemerTag, Transaction, TxBody, VKeyWitness,
    WitnessSet,
};
pub use verification::VerificationError;
