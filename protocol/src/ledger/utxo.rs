//! # Unspent Outputs
//!
//! A [`Utxo`] pairs an [`OutputRef`] with the [`TxOutput`] it names. Outputs
//! are encoded in the legacy array form `[address, amount, ?datum_hash]`,
//! which is what an output committing to a datum *hash* must use.

use serde::{Deserialize, Serialize};

use super::address::Address;
use super::cbor::Encoder;
use super::types::{DatumHash, OutputRef};
use super::value::Value;

/// Fixed per-output overhead the ledger adds before pricing by size.
pub const MIN_UTXO_OVERHEAD_BYTES: u64 = 160;

/// One transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum_hash: Option<DatumHash>,
}

impl TxOutput {
    pub fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum_hash: None,
        }
    }

    /// Commits the output to a datum.
    pub fn with_datum_hash(mut self, hash: DatumHash) -> Self {
        self.datum_hash = Some(hash);
        self
    }

    pub fn encode(&self, enc: &mut Encoder) {
        enc.array(if self.datum_hash.is_some() { 3 } else { 2 });
        enc.bytes(&self.address.to_bytes());
        encode_value(enc, &self.value);
        if let Some(hash) = &self.datum_hash {
            enc.bytes(hash.as_ref());
        }
    }

    pub fn to_cbor(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    /// Smallest coin quantity this output may carry:
    /// `(160 + serialized size) * coins_per_utxo_byte`, where the size is
    /// measured with the returned coin in place.
    pub fn min_coin(&self, coins_per_utxo_byte: u64) -> u64 {
        let mut probe = self.clone();
        let mut coin = 0u64;
        // The coin field's own width feeds back into the size; a handful of
        // iterations always reaches the fixed point.
        for _ in 0..8 {
            probe.value.coin = coin;
            let size = probe.to_cbor().len() as u64;
            let required = (MIN_UTXO_OVERHEAD_BYTES + size).saturating_mul(coins_per_utxo_byte);
            if required <= coin {
                break;
            }
            coin = required;
        }
        coin
    }
}

/// Writes `coin` alone for pure-coin values, `[coin, multiasset]` otherwise.
pub fn encode_value(enc: &mut Encoder, value: &Value) {
    if value.is_pure_coin() {
        enc.unsigned(value.coin);
        return;
    }
    enc.array(2).unsigned(value.coin);
    enc.map(value.multi_asset().len());
    for (policy, names) in value.multi_asset() {
        enc.bytes(policy.as_ref());
        enc.map(names.len());
        for (name, quantity) in names {
            enc.bytes(name.as_bytes()).unsigned(*quantity);
        }
    }
}

/// An output together with its reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Utxo {
    pub input: OutputRef,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(input: OutputRef, output: TxOutput) -> Self {
        Self { input, output }
    }

    pub fn value(&self) -> &Value {
        &self.output.value
    }

    pub fn address(&self) -> &Address {
        &self.output.address
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::address::Credential;
    use crate::ledger::types::{AssetName, KeyHash, PolicyId};

    fn addr() -> Address {
        Address::enterprise(0, Credential::Key(KeyHash::new([5; 28])))
    }

    #[test]
    fn pure_coin_output_encoding() {
        let out = TxOutput::new(addr(), Value::from_coin(2_000_000));
        let bytes = out.to_cbor();
        assert_eq!(bytes[0], 0x82);
        assert_eq!(&bytes[1..3], &[0x58, 29]);
        assert_eq!(&bytes[32..], &[0x1a, 0x00, 0x1e, 0x84, 0x80]);
    }

    #[test]
    fn datum_hash_adds_third_element() {
        let out = TxOutput::new(addr(), Value::from_coin(1)).with_datum_hash(DatumHash::new([1; 32]));
        let bytes = out.to_cbor();
        assert_eq!(bytes[0], 0x83);
        assert_eq!(&bytes[bytes.len() - 34..bytes.len() - 32], &[0x58, 0x20]);
    }

    #[test]
    fn min_coin_is_a_fixed_point() {
        let out = TxOutput::new(addr(), Value::from_coin(0));
        let min = out.min_coin(4_310);
        let mut filled = out.clone();
        filled.value.coin = min;
        let size = filled.to_cbor().len() as u64;
        assert!(min >= (MIN_UTXO_OVERHEAD_BYTES + size) * 4_310);
        // (160 + 37 bytes) at 4310 per byte
        assert_eq!(min, 849_070);
    }

    #[test]
    fn assets_raise_the_minimum() {
        let plain = TxOutput::new(addr(), Value::from_coin(0));
        let rich = TxOutput::new(
            addr(),
            Value::from_coin(0).with_asset(PolicyId::new([1; 28]), AssetName::new(b"tok".to_vec()).unwrap(), 1),
        );
        assert!(rich.min_coin(4_310) > plain.min_coin(4_310));
    }
}
