//! # Escrow Codec
//!
//! Datum and redeemer encodings the escrow validator checks, plus the datum
//! hash that ties a locked output to its terms.

pub mod datum;
pub mod redeemer;

pub use datum::{datum_hash, project_deadline, ContractDatum, DatumLayout};
pub use redeemer::{RedeemerShape, SpendIntent};
