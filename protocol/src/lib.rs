// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Athena Protocol: Escrow Core
//!
//! Off-chain orchestration for funds locked under an on-chain escrow
//! validator. A funder locks value at the validator's address, committing to
//! a datum that names three identity-token policies (target, mediator,
//! fallback) and a deadline. Before the deadline the target can claim by
//! proving it holds its identity token; otherwise, under mediator
//! authorization, the funds go to the fallback party.
//!
//! This crate never holds the truth about the chain. It takes snapshots in,
//! proposes balanced transactions out, and treats the ledger's verdict on
//! submission as final.
//!
//! ## Architecture
//!
//! - **ledger**: ids, values, addresses, outputs, scripts, Plutus data, CBOR.
//! - **selection**: UTXO classification and deterministic coin selection.
//! - **escrow**: datum and redeemer codecs, the datum hash.
//! - **transaction**: the builder, the escrow proposals, signing.
//! - **auth**: CIP-8 signed-message verification for API callers.
//! - **chain**: the chain collaborator trait and an in-memory ledger.
//! - **config**: constants and the immutable deployment configuration.
//!
//! ## Design Philosophy
//!
//! 1. Every proposal is a pure function of its snapshot. Same UTXOs in,
//!    same bytes out.
//! 2. Money is `u64`, checked. Nothing wraps, nothing floats.
//! 3. Failures are tagged and non-fatal; the caller decides what to retry.

pub mod auth;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod escrow;
pub mod ledger;
pub mod selection;
pub mod transaction;

pub use config::EscrowConfig;
pub use error::EscrowError;
pub use escrow::{ContractDatum, DatumLayout, SpendIntent};
pub use transaction::{sign_transaction, Assembler, ProposedTransaction, SignedTransaction};
