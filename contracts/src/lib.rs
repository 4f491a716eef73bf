// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Athena Escrow Contracts
//!
//! Off-chain lifecycle logic for the escrow validator:
//!
//! - **Escrow State** - the derived `Unfunded -> Funded -> Settled*` machine
//!   and its transition guards.
//! - **Funding** - the records handed to the persistence layer.
//! - **Desk** - request orchestration over a chain backend: authenticate,
//!   observe, guard, propose, submit.
//!
//! ## Design Principles
//!
//! 1. State is derived from chain observation, never stored.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Guards are advisory; the ledger has the final word.
//! 4. Every public record type is serializable (serde) for the store.

pub mod desk;
pub mod escrow_state;
pub mod funding;

pub use desk::EscrowDesk;
pub use escrow_state::{observe_escrow, ContractError, EscrowMachine, EscrowState};
pub use funding::{FundingIntent, FundingRecord, FundingStatus};
