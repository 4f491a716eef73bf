//! Ledger transaction types and their canonical CBOR encoding.
//!
//! A transaction is `[body, witness_set, is_valid, auxiliary_data | null]`.
//! The body is a map keyed by small integers; only the keys the escrow
//! flow uses are ever written, in ascending order:
//!
//! | key | field                   |
//! |-----|-------------------------|
//! | 0   | inputs                  |
//! | 1   | outputs                 |
//! | 2   | fee                     |
//! | 3   | ttl (invalid hereafter) |
//! | 7   | auxiliary data hash     |
//! | 8   | validity start          |
//! | 9   | mint                    |
//! | 11  | script data hash        |
//! | 13  | collateral inputs       |
//! | 14  | required signers        |
//! | 18  | reference inputs        |
//!
//! The transaction id is BLAKE2b-256 of the encoded body, so two bodies
//! built from the same snapshot must encode to the same bytes. Every list
//! with no meaningful order (inputs, signers) is sorted before encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::blake2b_256;
use crate::ledger::cbor::Encoder;
use crate::ledger::types::hex_bytes;
use crate::ledger::{
    AssetName, Hash32, KeyHash, NativeScript, OutputRef, PlutusData, PlutusScript, PlutusVersion,
    PolicyId, Slot, TxId, TxOutput,
};

/// Minted (positive) or burned (negative) quantities per policy and name.
pub type Mint = BTreeMap<PolicyId, BTreeMap<AssetName, i64>>;

/// Longest text or byte string allowed inside transaction metadata.
pub const METADATA_CHUNK_SIZE: usize = 64;

/// Tag marking Alonzo-format auxiliary data.
const ALONZO_AUX_TAG: u64 = 259;

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// The signed part of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub inputs: Vec<OutputRef>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    /// First slot at which the transaction is no longer valid.
    pub ttl: Option<Slot>,
    pub auxiliary_data_hash: Option<Hash32>,
    /// First slot at which the transaction becomes valid.
    pub validity_start: Option<Slot>,
    pub mint: Mint,
    pub script_data_hash: Option<Hash32>,
    pub collateral: Vec<OutputRef>,
    pub required_signers: Vec<KeyHash>,
    pub reference_inputs: Vec<OutputRef>,
}

impl TxBody {
    /// Sorts and deduplicates every set-like field.
    pub fn canonicalize(&mut self) {
        for refs in [
            &mut self.inputs,
            &mut self.collateral,
            &mut self.reference_inputs,
        ] {
            refs.sort();
            refs.dedup();
        }
        self.required_signers.sort();
        self.required_signers.dedup();
        self.mint.retain(|_, names| {
            names.retain(|_, quantity| *quantity != 0);
            !names.is_empty()
        });
    }

    fn field_count(&self) -> usize {
        3 + usize::from(self.ttl.is_some())
            + usize::from(self.auxiliary_data_hash.is_some())
            + usize::from(self.validity_start.is_some())
            + usize::from(!self.mint.is_empty())
            + usize::from(self.script_data_hash.is_some())
            + usize::from(!self.collateral.is_empty())
            + usize::from(!self.required_signers.is_empty())
            + usize::from(!self.reference_inputs.is_empty())
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.map(self.field_count());

        enc.unsigned(0);
        encode_refs(enc, &self.inputs);

        enc.unsigned(1).array(self.outputs.len());
        for output in &self.outputs {
            output.encode(enc);
        }

        enc.unsigned(2).unsigned(self.fee);

        if let Some(ttl) = self.ttl {
            enc.unsigned(3).unsigned(ttl.0);
        }
        if let Some(hash) = &self.auxiliary_data_hash {
            enc.unsigned(7).bytes(hash.as_ref());
        }
        if let Some(start) = self.validity_start {
            enc.unsigned(8).unsigned(start.0);
        }
        if !self.mint.is_empty() {
            enc.unsigned(9).map(self.mint.len());
            for (policy, names) in &self.mint {
                enc.bytes(policy.as_ref()).map(names.len());
                for (name, quantity) in names {
                    enc.bytes(name.as_bytes()).int(i128::from(*quantity));
                }
            }
        }
        if let Some(hash) = &self.script_data_hash {
            enc.unsigned(11).bytes(hash.as_ref());
        }
        if !self.collateral.is_empty() {
            enc.unsigned(13);
            encode_refs(enc, &self.collateral);
        }
        if !self.required_signers.is_empty() {
            enc.unsigned(14).array(self.required_signers.len());
            for signer in &self.required_signers {
                enc.bytes(signer.as_ref());
            }
        }
        if !self.reference_inputs.is_empty() {
            enc.unsigned(18);
            encode_refs(enc, &self.reference_inputs);
        }
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// BLAKE2b-256 of the encoded body.
    pub fn id(&self) -> TxId {
        TxId::new(blake2b_256(&self.to_cbor()))
    }
}

fn encode_refs(enc: &mut Encoder, refs: &[OutputRef]) {
    enc.array(refs.len());
    for r in refs {
        enc.array(2)
            .bytes(r.tx_id.as_ref())
            .unsigned(u64::from(r.index));
    }
}

// ---------------------------------------------------------------------------
// Witnesses
// ---------------------------------------------------------------------------

/// Which kind of script purpose a redeemer is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemerTag {
    Spend,
    Mint,
}

impl RedeemerTag {
    fn code(self) -> u64 {
        match self {
            RedeemerTag::Spend => 0,
            RedeemerTag::Mint => 1,
        }
    }
}

/// Execution budget declared for one script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

/// A redeemer as it appears in the witness set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    /// Position of the redeemed item among the body's sorted inputs (or
    /// policies, for minting).
    pub index: u32,
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

impl Redeemer {
    pub fn encode(&self, enc: &mut Encoder) {
        enc.array(4)
            .unsigned(self.tag.code())
            .unsigned(u64::from(self.index));
        self.data.encode(enc);
        enc.array(2)
            .unsigned(self.ex_units.mem)
            .unsigned(self.ex_units.steps);
    }
}

/// An Ed25519 signature over the transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VKeyWitness {
    #[serde(with = "hex_bytes")]
    pub vkey: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub signature: [u8; 64],
}

impl VKeyWitness {
    /// Same-sized stand-in used when sizing a transaction for its fee.
    pub const PLACEHOLDER: VKeyWitness = VKeyWitness {
        vkey: [0; 32],
        signature: [0; 64],
    };
}

/// Everything that authorizes a transaction without being hashed into its
/// id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessSet {
    pub vkeys: Vec<VKeyWitness>,
    pub native_scripts: Vec<NativeScript>,
    pub plutus_scripts: Vec<PlutusScript>,
    pub plutus_data: Vec<PlutusData>,
    pub redeemers: Vec<Redeemer>,
}

impl WitnessSet {
    fn scripts_of(&self, version: PlutusVersion) -> impl Iterator<Item = &PlutusScript> {
        self.plutus_scripts
            .iter()
            .filter(move |s| s.version() == version)
    }

    /// Languages of the attached Plutus scripts, ascending.
    pub fn languages(&self) -> Vec<PlutusVersion> {
        let mut versions: Vec<PlutusVersion> =
            self.plutus_scripts.iter().map(PlutusScript::version).collect();
        versions.sort();
        versions.dedup();
        versions
    }

    /// Definite array of the attached datums, as hashed into the script
    /// data hash.
    pub fn encode_plutus_data(&self, enc: &mut Encoder) {
        enc.array(self.plutus_data.len());
        for datum in &self.plutus_data {
            datum.encode(enc);
        }
    }

    pub fn encode_redeemers(&self, enc: &mut Encoder) {
        enc.array(self.redeemers.len());
        for redeemer in &self.redeemers {
            redeemer.encode(enc);
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        let v1 = self.scripts_of(PlutusVersion::V1).count();
        let v2 = self.scripts_of(PlutusVersion::V2).count();
        let count = usize::from(!self.vkeys.is_empty())
            + usize::from(!self.native_scripts.is_empty())
            + usize::from(v1 > 0)
            + usize::from(!self.plutus_data.is_empty())
            + usize::from(!self.redeemers.is_empty())
            + usize::from(v2 > 0);
        enc.map(count);

        if !self.vkeys.is_empty() {
            enc.unsigned(0).array(self.vkeys.len());
            for w in &self.vkeys {
                enc.array(2).bytes(&w.vkey).bytes(&w.signature);
            }
        }
        if !self.native_scripts.is_empty() {
            enc.unsigned(1).array(self.native_scripts.len());
            for script in &self.native_scripts {
                script.encode(enc);
            }
        }
        if v1 > 0 {
            enc.unsigned(3).array(v1);
            for script in self.scripts_of(PlutusVersion::V1) {
                enc.bytes(script.bytes());
            }
        }
        if !self.plutus_data.is_empty() {
            enc.unsigned(4);
            self.encode_plutus_data(enc);
        }
        if !self.redeemers.is_empty() {
            enc.unsigned(5);
            self.encode_redeemers(enc);
        }
        if v2 > 0 {
            enc.unsigned(6).array(v2);
            for script in self.scripts_of(PlutusVersion::V2) {
                enc.bytes(script.bytes());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Auxiliary data
// ---------------------------------------------------------------------------

/// Errors converting JSON into transaction metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Booleans, nulls and non-integral numbers have no metadata form.
    #[error("metadata cannot represent {0}")]
    Unrepresentable(String),

    #[error("top-level metadata must be an object keyed by unsigned integer labels")]
    InvalidLabels,
}

/// One metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metadatum {
    Int(i128),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Text(String),
    List(Vec<Metadatum>),
    Map(Vec<(Metadatum, Metadatum)>),
}

impl Metadatum {
    /// Converts JSON, splitting strings longer than 64 bytes into a list of
    /// chunks on character boundaries.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, MetadataError> {
        use serde_json::Value as J;
        match value {
            J::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .map(Metadatum::Int)
                .ok_or_else(|| MetadataError::Unrepresentable(n.to_string())),
            J::String(s) if s.len() <= METADATA_CHUNK_SIZE => Ok(Metadatum::Text(s.clone())),
            J::String(s) => Ok(Metadatum::List(
                chunk_text(s).into_iter().map(Metadatum::Text).collect(),
            )),
            J::Array(items) => items
                .iter()
                .map(Metadatum::from_json)
                .collect::<Result<_, _>>()
                .map(Metadatum::List),
            J::Object(entries) => entries
                .iter()
                .map(|(k, v)| Ok((Metadatum::Text(k.clone()), Metadatum::from_json(v)?)))
                .collect::<Result<_, _>>()
                .map(Metadatum::Map),
            J::Bool(b) => Err(MetadataError::Unrepresentable(b.to_string())),
            J::Null => Err(MetadataError::Unrepresentable("null".into())),
        }
    }

    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Metadatum::Int(n) => {
                enc.int(*n);
            }
            Metadatum::Bytes(b) => {
                enc.bytes(b);
            }
            Metadatum::Text(t) => {
                enc.text(t);
            }
            Metadatum::List(items) => {
                enc.array(items.len());
                for item in items {
                    item.encode(enc);
                }
            }
            Metadatum::Map(entries) => {
                enc.map(entries.len());
                for (k, v) in entries {
                    k.encode(enc);
                    v.encode(enc);
                }
            }
        }
    }
}

fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > METADATA_CHUNK_SIZE {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Transaction metadata in the Alonzo auxiliary-data format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryData {
    pub metadata: BTreeMap<u64, Metadatum>,
}

impl AuxiliaryData {
    /// Builds metadata from a JSON object such as `{"721": {...}}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, MetadataError> {
        let object = value.as_object().ok_or(MetadataError::InvalidLabels)?;
        let mut metadata = BTreeMap::new();
        for (label, inner) in object {
            let label: u64 = label.parse().map_err(|_| MetadataError::InvalidLabels)?;
            metadata.insert(label, Metadatum::from_json(inner)?);
        }
        Ok(Self { metadata })
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.tag(ALONZO_AUX_TAG).map(1).unsigned(0);
        enc.map(self.metadata.len());
        for (label, value) in &self.metadata {
            enc.unsigned(*label);
            value.encode(enc);
        }
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// The hash committed in body key 7.
    pub fn hash(&self) -> Hash32 {
        Hash32::new(blake2b_256(&self.to_cbor()))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A complete transaction, signed or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub body: TxBody,
    pub witness_set: WitnessSet,
    pub auxiliary_data: Option<AuxiliaryData>,
}

impl Transaction {
    pub fn id(&self) -> TxId {
        self.body.id()
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.array(4);
        self.body.encode(&mut enc);
        self.witness_set.encode(&mut enc);
        enc.bool(true);
        match &self.auxiliary_data {
            Some(aux) => aux.encode(&mut enc),
            None => {
                enc.null();
            }
        }
        enc.into_bytes()
    }

    pub fn to_cbor_hex(&self) -> String {
        hex::encode(self.to_cbor())
    }

    pub fn size(&self) -> usize {
        self.to_cbor().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::cbor::{decode, Cbor};
    use crate::ledger::{Address, Credential, Value};

    fn body() -> TxBody {
        TxBody {
            inputs: vec![
                OutputRef::new(TxId::new([2; 32]), 0),
                OutputRef::new(TxId::new([1; 32]), 5),
            ],
            outputs: vec![TxOutput::new(
                Address::enterprise(0, Credential::Key(KeyHash::new([7; 28]))),
                Value::from_coin(2_000_000),
            )],
            fee: 170_000,
            ..TxBody::default()
        }
    }

    #[test]
    fn minimal_body_has_three_keys() {
        let bytes = body().to_cbor();
        assert_eq!(bytes[0], 0xa3);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.map_get(&Cbor::Unsigned(2)), Some(&Cbor::Unsigned(170_000)));
    }

    #[test]
    fn canonicalize_sorts_inputs_and_signers() {
        let mut b = body();
        b.required_signers = vec![KeyHash::new([9; 28]), KeyHash::new([3; 28]), KeyHash::new([9; 28])];
        b.canonicalize();
        assert_eq!(b.inputs[0].tx_id, TxId::new([1; 32]));
        assert_eq!(b.required_signers, vec![KeyHash::new([3; 28]), KeyHash::new([9; 28])]);
    }

    #[test]
    fn input_order_changes_the_id_until_canonicalized() {
        let mut a = body();
        let mut b = body();
        b.inputs.reverse();
        assert_ne!(a.id(), b.id());
        a.canonicalize();
        b.canonicalize();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn optional_keys_appear_in_ascending_order() {
        let mut b = body();
        b.ttl = Some(Slot(500));
        b.validity_start = Some(Slot(100));
        b.reference_inputs = vec![OutputRef::new(TxId::new([3; 32]), 1)];
        b.required_signers = vec![KeyHash::new([4; 28])];
        let decoded = decode(&b.to_cbor()).unwrap();
        let keys: Vec<i128> = decoded
            .as_map()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_int())
            .collect();
        assert_eq!(keys, vec![0, 1, 2, 3, 8, 14, 18]);
    }

    #[test]
    fn zero_mint_entries_are_dropped() {
        let mut b = body();
        let mut names = BTreeMap::new();
        names.insert(AssetName::new(b"a".to_vec()).unwrap(), 0);
        b.mint.insert(PolicyId::new([1; 28]), names);
        b.canonicalize();
        assert!(b.mint.is_empty());
    }

    #[test]
    fn redeemer_encoding() {
        let r = Redeemer {
            tag: RedeemerTag::Spend,
            index: 1,
            data: PlutusData::constr(0, vec![]),
            ex_units: ExUnits { mem: 10, steps: 20 },
        };
        let mut enc = Encoder::new();
        r.encode(&mut enc);
        assert_eq!(enc.into_bytes(), vec![0x84, 0x00, 0x01, 0xd8, 0x79, 0x80, 0x82, 0x0a, 0x14]);
    }

    #[test]
    fn long_metadata_strings_are_chunked() {
        let long = "é".repeat(40);
        let m = Metadatum::from_json(&serde_json::Value::String(long.clone())).unwrap();
        match m {
            Metadatum::List(parts) => {
                let mut joined = String::new();
                for part in parts {
                    match part {
                        Metadatum::Text(t) => {
                            assert!(t.len() <= METADATA_CHUNK_SIZE);
                            joined.push_str(&t);
                        }
                        other => panic!("unexpected {other:?}"),
                    }
                }
                assert_eq!(joined, long);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn auxiliary_data_uses_alonzo_tag() {
        let aux = AuxiliaryData::from_json(&serde_json::json!({"674": {"msg": ["hi"]}})).unwrap();
        let bytes = aux.to_cbor();
        assert_eq!(&bytes[..3], &[0xd9, 0x01, 0x03]);
        assert_eq!(aux.hash(), Hash32::new(blake2b_256(&bytes)));
    }

    #[test]
    fn metadata_rejects_booleans_and_bad_labels() {
        assert!(AuxiliaryData::from_json(&serde_json::json!({"1": true})).is_err());
        assert_eq!(
            AuxiliaryData::from_json(&serde_json::json!({"label": 1})),
            Err(MetadataError::InvalidLabels)
        );
    }

    #[test]
    fn transaction_envelope() {
        let tx = Transaction {
            body: body(),
            witness_set: WitnessSet::default(),
            auxiliary_data: None,
        };
        let bytes = tx.to_cbor();
        assert_eq!(bytes[0], 0x84);
        assert_eq!(bytes[bytes.len() - 2..], [0xf5, 0xf6]);
        assert_eq!(tx.id(), tx.body.id());
    }
}
