//! # Ledger Primitives
//!
//! The slice of the ledger data model the escrow flow needs, and nothing
//! more: identifiers, values, addresses, outputs, scripts, Plutus data,
//! slot arithmetic, and the CBOR those are encoded in.
//!
//! ```text
//! types.rs  : fixed-length ids (PolicyId, KeyHash, TxId, ...), AssetName, OutputRef
//! value.rs  : multi-asset Value arithmetic
//! address.rs: Shelley addresses, credentials, bech32
//! utxo.rs   : TxOutput / Utxo and the minimum-coin rule
//! script.rs : Plutus script artifacts and native minting policies
//! plutus.rs : PlutusData and its canonical encoding
//! time.rs   : Slot, PosixMillis, SlotConfig
//! cbor.rs   : the minimal CBOR encoder/decoder underneath all of it
//! ```

pub mod address;
pub mod cbor;
pub mod plutus;
pub mod script;
pub mod time;
pub mod types;
pub mod utxo;
pub mod value;

pub use address::{Address, AddressError, AnyAddress, Credential, Network, RewardAddress};
pub use plutus::PlutusData;
pub use script::{NativeScript, PlutusScript, PlutusVersion, ScriptError};
pub use time::{PosixMillis, Slot, SlotConfig};
pub use types::{AssetName, DatumHash, Hash32, IdError, KeyHash, OutputRef, PolicyId, ScriptHash, TxId};
pub use utxo::{TxOutput, Utxo};
pub use value::{Value, ValueError};
