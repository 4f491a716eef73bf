//! # Plutus Data
//!
//! The universal data type validators receive for datums and redeemers, and
//! its CBOR encoding as produced by the reference ledger implementation:
//!
//! - `Constr i fields` is tag `121 + i` for `i < 7`, tag `1280 + (i - 7)` for
//!   `7 <= i < 128`, and tag `102` wrapping `[i, fields]` beyond that.
//! - Non-empty field lists and lists are indefinite-length arrays; empty
//!   ones are the definite empty array `0x80`.
//! - Byte strings longer than 64 bytes are chunked into 64-byte pieces.
//! - Integers outside the 64-bit head range are bignums.
//!
//! The encoding is hashed to produce datum hashes, so "equivalent" CBOR is
//! not good enough. It must be this CBOR.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::cbor::{self, Cbor, CborError, Encoder};
use super::types::DatumHash;
use crate::crypto::blake2b_256;

/// Byte strings longer than this are chunked.
pub const BYTES_CHUNK_SIZE: usize = 64;

/// Errors decoding Plutus data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlutusDataError {
    #[error("invalid CBOR: {0}")]
    Cbor(#[from] CborError),

    #[error("CBOR item is not Plutus data: {0}")]
    NotPlutusData(&'static str),

    #[error("integer does not fit in 128 bits")]
    IntegerTooLarge,
}

/// A Plutus data value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlutusData {
    Constr { tag: u64, fields: Vec<PlutusData> },
    Map(Vec<(PlutusData, PlutusData)>),
    List(Vec<PlutusData>),
    Integer(i128),
    Bytes(Vec<u8>),
}

impl PlutusData {
    /// Shorthand for a constructor.
    pub fn constr(tag: u64, fields: Vec<PlutusData>) -> Self {
        PlutusData::Constr { tag, fields }
    }

    /// Canonical CBOR encoding.
    pub fn to_cbor(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// Writes the canonical encoding into an existing encoder.
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            PlutusData::Constr { tag, fields } => {
                match *tag {
                    0..=6 => {
                        enc.tag(121 + tag);
                        encode_list(enc, fields);
                    }
                    7..=127 => {
                        enc.tag(1280 + tag - 7);
                        encode_list(enc, fields);
                    }
                    _ => {
                        enc.tag(102).array(2).unsigned(*tag);
                        encode_list(enc, fields);
                    }
                }
            }
            PlutusData::Map(entries) => {
                enc.map(entries.len());
                for (k, v) in entries {
                    k.encode(enc);
                    v.encode(enc);
                }
            }
            PlutusData::List(items) => encode_list(enc, items),
            PlutusData::Integer(n) => {
                enc.int(*n);
            }
            PlutusData::Bytes(bytes) => {
                if bytes.len() <= BYTES_CHUNK_SIZE {
                    enc.bytes(bytes);
                } else {
                    enc.bytes_chunked(bytes, BYTES_CHUNK_SIZE);
                }
            }
        }
    }

    /// BLAKE2b-256 of the canonical encoding.
    pub fn hash(&self) -> DatumHash {
        DatumHash::new(blake2b_256(&self.to_cbor()))
    }

    /// Decodes from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, PlutusDataError> {
        Self::from_item(&cbor::decode(bytes)?)
    }

    /// Interprets an already-decoded CBOR item.
    pub fn from_item(item: &Cbor) -> Result<Self, PlutusDataError> {
        match item {
            Cbor::Tag(tag @ 121..=127, inner) => Ok(PlutusData::Constr {
                tag: tag - 121,
                fields: list_items(inner)?,
            }),
            Cbor::Tag(tag @ 1280..=1400, inner) => Ok(PlutusData::Constr {
                tag: tag - 1280 + 7,
                fields: list_items(inner)?,
            }),
            Cbor::Tag(102, inner) => {
                let pair = inner
                    .as_array()
                    .filter(|items| items.len() == 2)
                    .ok_or(PlutusDataError::NotPlutusData("tag 102 expects [index, fields]"))?;
                let tag = match pair[0] {
                    Cbor::Unsigned(n) => n,
                    _ => return Err(PlutusDataError::NotPlutusData("constructor index")),
                };
                Ok(PlutusData::Constr {
                    tag,
                    fields: list_items(&pair[1])?,
                })
            }
            Cbor::Tag(2, inner) => {
                let magnitude = bignum(inner)?;
                i128::try_from(magnitude)
                    .map(PlutusData::Integer)
                    .map_err(|_| PlutusDataError::IntegerTooLarge)
            }
            Cbor::Tag(3, inner) => {
                let magnitude = bignum(inner)?;
                i128::try_from(magnitude)
                    .map(|m| PlutusData::Integer(-1 - m))
                    .map_err(|_| PlutusDataError::IntegerTooLarge)
            }
            Cbor::Tag(_, _) => Err(PlutusDataError::NotPlutusData("unknown tag")),
            Cbor::Unsigned(_) | Cbor::Negative(_) => item
                .as_int()
                .map(PlutusData::Integer)
                .ok_or(PlutusDataError::IntegerTooLarge),
            Cbor::Bytes(bytes) => Ok(PlutusData::Bytes(bytes.clone())),
            Cbor::Array(_) => Ok(PlutusData::List(list_items(item)?)),
            Cbor::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((Self::from_item(k)?, Self::from_item(v)?)))
                .collect::<Result<Vec<_>, _>>()
                .map(PlutusData::Map),
            Cbor::Text(_) => Err(PlutusDataError::NotPlutusData("text string")),
            Cbor::Bool(_) | Cbor::Null | Cbor::Undefined => {
                Err(PlutusDataError::NotPlutusData("simple value"))
            }
        }
    }
}

fn encode_list(enc: &mut Encoder, items: &[PlutusData]) {
    if items.is_empty() {
        enc.array(0);
        return;
    }
    enc.array_indefinite();
    for item in items {
        item.encode(enc);
    }
    enc.end();
}

fn list_items(item: &Cbor) -> Result<Vec<PlutusData>, PlutusDataError> {
    item.as_array()
        .ok_or(PlutusDataError::NotPlutusData("expected a list"))?
        .iter()
        .map(PlutusData::from_item)
        .collect()
}

fn bignum(item: &Cbor) -> Result<u128, PlutusDataError> {
    let bytes = item
        .as_bytes()
        .ok_or(PlutusDataError::NotPlutusData("bignum payload"))?;
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    if significant.len() > 16 {
        return Err(PlutusDataError::IntegerTooLarge);
    }
    Ok(significant
        .iter()
        .fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
}

/// Serialized as the hex of its canonical CBOR.
impl Serialize for PlutusData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.to_cbor()))
    }
}

impl<'de> Deserialize<'de> for PlutusData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        Self::from_cbor(&bytes).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
