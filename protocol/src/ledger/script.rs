//! # Scripts
//!
//! Two script families appear in escrow transactions:
//!
//! - The **escrow validator**, a Plutus script supplied as an opaque
//!   artifact. It is hashed to derive the escrow address and attached as a
//!   witness when the escrow is spent; its contents are never interpreted.
//! - **Native scripts**, used as minting policies for identity tokens.
//!
//! Script hashes are BLAKE2b-224 over a one-byte language tag followed by
//! the script bytes: `0x00` native, `0x01` Plutus V1, `0x02` Plutus V2.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::address::{Address, Credential};
use super::cbor::{self, Cbor, CborError, Encoder};
use super::time::Slot;
use super::types::{KeyHash, PolicyId, ScriptHash};
use crate::crypto::blake2b_224_parts;

/// Language tag prepended to native scripts before hashing.
pub const NATIVE_SCRIPT_TAG: u8 = 0x00;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors loading or using script artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script artifact is not valid hex: {0}")]
    InvalidHex(String),

    #[error("script artifact is not valid CBOR: {0}")]
    Cbor(#[from] CborError),

    #[error("script artifact must be a CBOR byte string")]
    NotAByteString,

    #[error("unsupported script envelope type '{0}'")]
    UnsupportedEnvelope(String),

    #[error("malformed text envelope: {0}")]
    MalformedEnvelope(String),

    #[error("no cost model configured for {0:?}")]
    MissingCostModel(PlutusVersion),
}

// ---------------------------------------------------------------------------
// Plutus scripts
// ---------------------------------------------------------------------------

/// Plutus language version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlutusVersion {
    #[serde(rename = "PlutusV1")]
    V1,
    #[serde(rename = "PlutusV2")]
    V2,
}

impl PlutusVersion {
    /// Hashing tag.
    pub fn tag(self) -> u8 {
        match self {
            PlutusVersion::V1 => 0x01,
            PlutusVersion::V2 => 0x02,
        }
    }

    fn envelope_type(self) -> &'static str {
        match self {
            PlutusVersion::V1 => "PlutusScriptV1",
            PlutusVersion::V2 => "PlutusScriptV2",
        }
    }
}

/// A compiled Plutus script, held as the bytes that appear in the witness
/// set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TextEnvelope", into = "TextEnvelope")]
pub struct PlutusScript {
    version: PlutusVersion,
    bytes: Vec<u8>,
}

/// The `{ type, description, cborHex }` JSON written by compilers and
/// `cardano-cli`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "cborHex")]
    pub cbor_hex: String,
}

impl PlutusScript {
    /// Wraps witness-ready script bytes.
    pub fn new(version: PlutusVersion, bytes: Vec<u8>) -> Self {
        Self { version, bytes }
    }

    /// Loads from a `cborHex` field: one CBOR byte-string layer is removed.
    pub fn from_cbor_hex(version: PlutusVersion, cbor_hex: &str) -> Result<Self, ScriptError> {
        let raw = hex::decode(cbor_hex.trim()).map_err(|e| ScriptError::InvalidHex(e.to_string()))?;
        match cbor::decode(&raw)? {
            Cbor::Bytes(inner) => Ok(Self::new(version, inner)),
            _ => Err(ScriptError::NotAByteString),
        }
    }

    /// Parses a text-envelope JSON document.
    pub fn from_text_envelope(json: &str) -> Result<Self, ScriptError> {
        let envelope: TextEnvelope =
            serde_json::from_str(json).map_err(|e| ScriptError::MalformedEnvelope(e.to_string()))?;
        Self::try_from(envelope)
    }

    pub fn version(&self) -> PlutusVersion {
        self.version
    }

    /// Witness bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// BLAKE2b-224 of `tag || bytes`.
    pub fn hash(&self) -> ScriptHash {
        ScriptHash::new(blake2b_224_parts(&[&[self.version.tag()], &self.bytes]))
    }

    /// Enterprise address locked by this script.
    pub fn address(&self, network_id: u8) -> Address {
        Address::enterprise(network_id, Credential::Script(self.hash()))
    }
}

impl TryFrom<TextEnvelope> for PlutusScript {
    type Error = ScriptError;

    fn try_from(envelope: TextEnvelope) -> Result<Self, Self::Error> {
        let version = match envelope.kind.as_str() {
            "PlutusScriptV1" => PlutusVersion::V1,
            "PlutusScriptV2" => PlutusVersion::V2,
            other => return Err(ScriptError::UnsupportedEnvelope(other.to_string())),
        };
        Self::from_cbor_hex(version, &envelope.cbor_hex)
    }
}

impl From<PlutusScript> for TextEnvelope {
    fn from(script: PlutusScript) -> Self {
        let mut enc = Encoder::new();
        enc.bytes(&script.bytes);
        TextEnvelope {
            kind: script.version.envelope_type().to_string(),
            description: String::new(),
            cbor_hex: hex::encode(enc.into_bytes()),
        }
    }
}

// ---------------------------------------------------------------------------
// Native scripts
// ---------------------------------------------------------------------------

/// Timelock/multisig scripts evaluated by the ledger itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NativeScript {
    Pubkey { key_hash: KeyHash },
    All { scripts: Vec<NativeScript> },
    Any { scripts: Vec<NativeScript> },
    AtLeast { required: u32, scripts: Vec<NativeScript> },
    InvalidBefore { slot: Slot },
    InvalidHereafter { slot: Slot },
}

impl NativeScript {
    /// Single-signature policy.
    pub fn pubkey(key_hash: KeyHash) -> Self {
        NativeScript::Pubkey { key_hash }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            NativeScript::Pubkey { key_hash } => {
                enc.array(2).unsigned(0).bytes(key_hash.as_ref());
            }
            NativeScript::All { scripts } => {
                enc.array(2).unsigned(1);
                encode_scripts(enc, scripts);
            }
            NativeScript::Any { scripts } => {
                enc.array(2).unsigned(2);
                encode_scripts(enc, scripts);
            }
            NativeScript::AtLeast { required, scripts } => {
                enc.array(3).unsigned(3).unsigned(u64::from(*required));
                encode_scripts(enc, scripts);
            }
            NativeScript::InvalidBefore { slot } => {
                enc.array(2).unsigned(4).unsigned(slot.0);
            }
            NativeScript::InvalidHereafter { slot } => {
                enc.array(2).unsigned(5).unsigned(slot.0);
            }
        }
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// BLAKE2b-224 of `0x00 || cbor`.
    pub fn hash(&self) -> ScriptHash {
        ScriptHash::new(blake2b_224_parts(&[&[NATIVE_SCRIPT_TAG], &self.to_cbor()]))
    }

    /// A minting policy's id is its script hash.
    pub fn policy_id(&self) -> PolicyId {
        PolicyId::new(*self.hash().as_bytes())
    }

    /// Every key hash whose signature the script could demand.
    pub fn key_hashes(&self) -> Vec<KeyHash> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_keys(&self, out: &mut Vec<KeyHash>) {
        match self {
            NativeScript::Pubkey { key_hash } => out.push(*key_hash),
            NativeScript::All { scripts }
            | NativeScript::Any { scripts }
            | NativeScript::AtLeast { scripts, .. } => {
                for script in scripts {
                    script.collect_keys(out);
                }
            }
            NativeScript::InvalidBefore { .. } | NativeScript::InvalidHereafter { .. } => {}
        }
    }
}

fn encode_scripts(enc: &mut Encoder, scripts: &[NativeScript]) {
    enc.array(scripts.len());
    for script in scripts {
        script.encode(enc);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
