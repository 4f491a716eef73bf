//! CIP-8 message signing envelopes.
//!
//! Wallets return a `COSE_Sign1` structure plus a `COSE_Key`. The signature
//! covers the `Sig_structure` `["Signature1", protected, h'', payload]`,
//! and the signing address travels in the protected header under the text
//! label `"address"`.

use thiserror::Error;

use super::SignedMessage;
use crate::crypto::{KeyError, PaymentKey, VerificationKey};
use crate::ledger::cbor::{self, Cbor, CborError, Encoder};
use crate::ledger::{AddressError, AnyAddress};

/// CBOR tag optionally wrapping a `COSE_Sign1`.
const COSE_SIGN1_TAG: u64 = 18;

/// COSE algorithm id for EdDSA.
const ALG_EDDSA: i128 = -8;

/// `COSE_Key` label holding the Ed25519 public key.
const KEY_LABEL_X: i128 = -2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoseError {
    #[error("invalid hex: {0}")]
    Hex(String),

    #[error(transparent)]
    Cbor(#[from] CborError),

    #[error("malformed COSE structure: {0}")]
    Structure(&'static str),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A decoded `COSE_Sign1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoseSign1 {
    /// Serialized protected header map, exactly as signed.
    pub protected: Vec<u8>,
    pub unprotected: Cbor,
    /// `None` for a detached payload.
    pub payload: Option<Vec<u8>>,
    pub signature: Vec<u8>,
}

impl CoseSign1 {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoseError> {
        let item = match cbor::decode(bytes)? {
            Cbor::Tag(COSE_SIGN1_TAG, inner) => *inner,
            other => other,
        };
        let parts = item
            .as_array()
            .filter(|p| p.len() == 4)
            .ok_or(CoseError::Structure("expected a four-element array"))?;

        let protected = parts[0]
            .as_bytes()
            .ok_or(CoseError::Structure("protected header is not a byte string"))?
            .to_vec();
        let payload = match &parts[2] {
            Cbor::Null => None,
            Cbor::Bytes(b) => Some(b.clone()),
            _ => return Err(CoseError::Structure("payload is neither bytes nor null")),
        };
        let signature = parts[3]
            .as_bytes()
            .ok_or(CoseError::Structure("signature is not a byte string"))?
            .to_vec();

        Ok(Self {
            protected,
            unprotected: parts[1].clone(),
            payload,
            signature,
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, CoseError> {
        let bytes = hex::decode(text).map_err(|e| CoseError::Hex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.array(4).bytes(&self.protected).item(&self.unprotected);
        match &self.payload {
            Some(p) => enc.bytes(p),
            None => enc.null(),
        };
        enc.bytes(&self.signature);
        enc.into_bytes()
    }

    fn protected_header(&self) -> Result<Cbor, CoseError> {
        if self.protected.is_empty() {
            return Ok(Cbor::Map(Vec::new()));
        }
        Ok(cbor::decode(&self.protected)?)
    }

    /// The signing address from the protected header.
    pub fn address(&self) -> Result<AnyAddress, CoseError> {
        let header = self.protected_header()?;
        let raw = header
            .map_get(&Cbor::Text("address".into()))
            .and_then(Cbor::as_bytes)
            .ok_or(CoseError::Structure("protected header has no address"))?;
        Ok(AnyAddress::from_bytes(raw)?)
    }

    /// True when the unprotected header marks the payload as pre-hashed.
    pub fn is_hashed(&self) -> bool {
        matches!(
            self.unprotected.map_get(&Cbor::Text("hashed".into())),
            Some(Cbor::Bool(true))
        )
    }

    /// The bytes the signature covers.
    pub fn sig_structure(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.array(4)
            .text("Signature1")
            .bytes(&self.protected)
            .bytes(&[])
            .bytes(self.payload.as_deref().unwrap_or_default());
        enc.into_bytes()
    }
}

/// Reads the Ed25519 key out of a `COSE_Key`.
pub fn decode_key(bytes: &[u8]) -> Result<VerificationKey, CoseError> {
    let key = cbor::decode(bytes)?;
    let x = key
        .map_get(&int_label(KEY_LABEL_X))
        .and_then(Cbor::as_bytes)
        .ok_or(CoseError::Structure("COSE_Key has no -2 label"))?;
    Ok(VerificationKey::from_bytes(x)?)
}

/// An OKP / Ed25519 `COSE_Key` for `key`.
pub fn encode_key(key: &VerificationKey) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.map(4)
        .unsigned(1)
        .unsigned(1) // kty: OKP
        .unsigned(3)
        .int(ALG_EDDSA)
        .int(-1)
        .unsigned(6) // crv: Ed25519
        .int(KEY_LABEL_X)
        .bytes(&key.to_bytes());
    enc.into_bytes()
}

fn int_label(label: i128) -> Cbor {
    if label < 0 {
        Cbor::Negative((-1 - label) as u64)
    } else {
        Cbor::Unsigned(label as u64)
    }
}

/// Produces the CIP-30 `signData` result for `payload`, as a wallet would.
pub fn sign_message(key: &PaymentKey, address: &AnyAddress, payload: &[u8]) -> SignedMessage {
    let mut protected = Encoder::new();
    protected
        .map(2)
        .unsigned(1)
        .int(ALG_EDDSA)
        .text("address")
        .bytes(&address.to_bytes());

    let mut envelope = CoseSign1 {
        protected: protected.into_bytes(),
        unprotected: Cbor::Map(vec![(Cbor::Text("hashed".into()), Cbor::Bool(false))]),
        payload: Some(payload.to_vec()),
        signature: Vec::new(),
    };
    envelope.signature = key.sign(&envelope.sig_structure()).to_vec();

    SignedMessage {
        signature: hex::encode(envelope.to_bytes()),
        key: hex::encode(encode_key(&key.verification_key())),
    }
}
