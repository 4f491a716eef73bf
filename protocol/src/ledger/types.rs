//! # Ledger Identifiers
//!
//! Fixed-length byte identifiers used on the wire: policy ids, key and
//! script hashes, transaction ids and datum hashes. Every one of them is a
//! distinct newtype so a datum hash can never be passed where a policy id is
//! expected, even though both are "just bytes".
//!
//! Text form is lowercase hex everywhere (`Display`, `FromStr`, serde).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised when parsing identifiers from bytes or text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The byte string has the wrong length for the identifier kind.
    #[error("{kind} must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Identifier kind, e.g. `"policy id"`.
        kind: &'static str,
        /// Required length.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// The text is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// An asset name longer than the ledger permits.
    #[error("asset name is {0} bytes, maximum is 32")]
    AssetNameTooLong(usize),

    /// An output reference not of the form `<tx_id>#<index>`.
    #[error("malformed output reference: {0}")]
    MalformedOutputRef(String),
}

// ---------------------------------------------------------------------------
// Fixed-length identifiers
// ---------------------------------------------------------------------------

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of the identifier in bytes.
            pub const LEN: usize = $len;

            /// Wraps raw bytes.
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Parses from a slice, rejecting any other length.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
                let array: [u8; $len] =
                    bytes.try_into().map_err(|_| IdError::InvalidLength {
                        kind: $kind,
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(array))
            }

            /// Parses from lowercase or uppercase hex.
            pub fn from_hex(text: &str) -> Result<Self, IdError> {
                let bytes = hex::decode(text).map_err(|e| IdError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }

            /// The raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase hex encoding.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let text = String::deserialize(deserializer)?;
                Self::from_hex(&text).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// Minting policy identifier: the BLAKE2b-224 hash of the policy script.
    ///
    /// Possession of a token under a given policy is how escrow parties
    /// prove who they are.
    PolicyId,
    28,
    "policy id"
);

fixed_bytes!(
    /// BLAKE2b-224 hash of an Ed25519 verification key.
    KeyHash,
    28,
    "key hash"
);

fixed_bytes!(
    /// BLAKE2b-224 hash of a language-tagged script.
    ScriptHash,
    28,
    "script hash"
);

fixed_bytes!(
    /// BLAKE2b-256 hash of a transaction body.
    TxId,
    32,
    "transaction id"
);

fixed_bytes!(
    /// BLAKE2b-256 hash of an encoded datum, attached to locked outputs.
    DatumHash,
    32,
    "datum hash"
);

fixed_bytes!(
    /// Generic 32-byte digest (auxiliary data hash, script integrity hash).
    Hash32,
    32,
    "hash"
);

// ---------------------------------------------------------------------------
// AssetName
// ---------------------------------------------------------------------------

/// Maximum asset name length accepted by the ledger.
pub const MAX_ASSET_NAME_LENGTH: usize = 32;

/// A token name under a policy. Arbitrary bytes, at most 32 of them.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    /// Creates an asset name, rejecting anything longer than 32 bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, IdError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_ASSET_NAME_LENGTH {
            return Err(IdError::AssetNameTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Parses a hex-encoded asset name.
    pub fn from_hex(text: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(text).map_err(|e| IdError::InvalidHex(e.to_string()))?;
        Self::new(bytes)
    }

    /// The empty asset name.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) if text.chars().all(|c| c.is_ascii_graphic()) => f.write_str(text),
            _ => f.write_str(&self.to_hex()),
        }
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetName({})", self)
    }
}

impl Serialize for AssetName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AssetName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// OutputRef
// ---------------------------------------------------------------------------

/// Reference to a transaction output: `(tx_id, index)`.
///
/// The derived ordering (transaction id bytes, then index) is the canonical
/// order used for input sorting, UTXO selection and redeemer indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    /// Producing transaction.
    pub tx_id: TxId,
    /// Position among that transaction's outputs.
    pub index: u32,
}

impl OutputRef {
    /// Creates a new output reference.
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

impl FromStr for OutputRef {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx, index) = s
            .split_once('#')
            .ok_or_else(|| IdError::MalformedOutputRef(s.to_string()))?;
        let index = index
            .parse::<u32>()
            .map_err(|_| IdError::MalformedOutputRef(s.to_string()))?;
        Ok(Self::new(TxId::from_hex(tx)?, index))
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Serde adapter for byte fields carried as hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        T::try_from(bytes).map_err(|_| serde::de::Error::custom("byte string has the wrong length"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_id_rejects_wrong_length() {
        let err = PolicyId::from_slice(&[0u8; 27]).unwrap_err();
        assert_eq!(
            err,
            IdError::InvalidLength {
                kind: "policy id",
                expected: 28,
                actual: 27
            }
        );
        assert!(PolicyId::from_slice(&[0u8; 28]).is_ok());
    }

    #[test]
    fn hex_roundtrip_through_display() {
        let id = TxId::new([0xab; 32]);
        let parsed: TxId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn serde_uses_hex_strings() {
        let policy = PolicyId::new([1; 28]);
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(28)));
        let back: PolicyId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn asset_name_length_limit() {
        assert!(AssetName::new(vec![0u8; 32]).is_ok());
        assert_eq!(
            AssetName::new(vec![0u8; 33]).unwrap_err(),
            IdError::AssetNameTooLong(33)
        );
    }

    #[test]
    fn asset_name_display_prefers_text() {
        assert_eq!(AssetName::new(b"MIUR".to_vec()).unwrap().to_string(), "MIUR");
        assert_eq!(AssetName::new(vec![0x00, 0xff]).unwrap().to_string(), "00ff");
    }

    #[test]
    fn output_refs_order_by_tx_then_index() {
        let a = OutputRef::new(TxId::new([1; 32]), 9);
        let b = OutputRef::new(TxId::new([2; 32]), 0);
        let c = OutputRef::new(TxId::new([2; 32]), 1);
        let mut refs = vec![c, a, b];
        refs.sort();
        assert_eq!(refs, vec![a, b, c]);
    }

    #[test]
    fn output_ref_parses_hash_index_form() {
        let text = format!("{}#3", "cd".repeat(32));
        let parsed: OutputRef = text.parse().unwrap();
        assert_eq!(parsed.index, 3);
        assert_eq!(parsed.to_string(), text);
        assert!("nohash".parse::<OutputRef>().is_err());
    }
}
