//! # Shelley Addresses
//!
//! Binary layout and bech32 text form of the address kinds the escrow flow
//! touches. The first byte is a header: the high nibble is the address type,
//! the low nibble the network id.
//!
//! | type | payment | stake  | kind        |
//! |------|---------|--------|-------------|
//! | 0    | key     | key    | base        |
//! | 1    | script  | key    | base        |
//! | 2    | key     | script | base        |
//! | 3    | script  | script | base        |
//! | 6    | key     |        | enterprise  |
//! | 7    | script  |        | enterprise  |
//! | 14   |         | key    | reward      |
//! | 15   |         | script | reward      |
//!
//! Pointer (4, 5) and Byron addresses are not supported.

use std::fmt;
use std::str::FromStr;

use bech32::{Bech32, Hrp};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::time::SlotConfig;
use super::types::{KeyHash, ScriptHash};

/// Network id carried in mainnet address headers.
pub const MAINNET_NETWORK_ID: u8 = 1;

/// Network id carried in every testnet address header.
pub const TESTNET_NETWORK_ID: u8 = 0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Address parsing and interpretation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("bech32 error: {0}")]
    Bech32(String),

    #[error("unexpected human-readable prefix '{0}'")]
    UnknownHrp(String),

    #[error("unsupported address header 0x{0:02x}")]
    UnsupportedHeader(u8),

    #[error("address payload has {actual} bytes, expected {expected}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("address is empty")]
    Empty,

    #[error("prefix '{hrp}' does not match network id {network_id}")]
    NetworkMismatch { hrp: String, network_id: u8 },

    #[error("address has a script payment credential where a key is required")]
    NotAKeyCredential,

    #[error("unknown network '{0}'")]
    UnknownNetwork(String),
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// The networks the escrow can be deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

impl Network {
    /// Header network id.
    pub fn network_id(self) -> u8 {
        match self {
            Network::Mainnet => MAINNET_NETWORK_ID,
            Network::Preprod | Network::Preview => TESTNET_NETWORK_ID,
        }
    }

    /// Slot-to-time mapping for this network.
    pub fn slot_config(self) -> SlotConfig {
        match self {
            Network::Mainnet => SlotConfig::MAINNET,
            Network::Preprod => SlotConfig::PREPROD,
            Network::Preview => SlotConfig::PREVIEW,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Preprod => write!(f, "preprod"),
            Network::Preview => write!(f, "preview"),
        }
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "preprod" => Ok(Network::Preprod),
            "preview" => Ok(Network::Preview),
            _ => Err(AddressError::UnknownNetwork(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Who may spend (payment) or delegate (stake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    Key(KeyHash),
    Script(ScriptHash),
}

impl Credential {
    fn bytes(&self) -> &[u8] {
        match self {
            Credential::Key(h) => h.as_ref(),
            Credential::Script(h) => h.as_ref(),
        }
    }

    fn is_script(&self) -> bool {
        matches!(self, Credential::Script(_))
    }

    fn from_bytes(bytes: &[u8], script: bool) -> Result<Self, AddressError> {
        let invalid = |_| AddressError::InvalidLength {
            expected: 28,
            actual: bytes.len(),
        };
        Ok(if script {
            Credential::Script(ScriptHash::from_slice(bytes).map_err(invalid)?)
        } else {
            Credential::Key(KeyHash::from_slice(bytes).map_err(invalid)?)
        })
    }

    /// The key hash, if this is a key credential.
    pub fn key_hash(&self) -> Option<&KeyHash> {
        match self {
            Credential::Key(h) => Some(h),
            Credential::Script(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A payment address: base or enterprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    network_id: u8,
    payment: Credential,
    stake: Option<Credential>,
}

impl Address {
    /// Base address with both credentials.
    pub fn base(network_id: u8, payment: Credential, stake: Credential) -> Self {
        Self {
            network_id: network_id & 0x0f,
            payment,
            stake: Some(stake),
        }
    }

    /// Enterprise address with no stake part.
    pub fn enterprise(network_id: u8, payment: Credential) -> Self {
        Self {
            network_id: network_id & 0x0f,
            payment,
            stake: None,
        }
    }

    pub fn network_id(&self) -> u8 {
        self.network_id
    }

    pub fn payment_credential(&self) -> &Credential {
        &self.payment
    }

    pub fn stake_credential(&self) -> Option<&Credential> {
        self.stake.as_ref()
    }

    /// The payment key hash, failing for script-locked addresses.
    pub fn payment_key_hash(&self) -> Result<KeyHash, AddressError> {
        self.payment
            .key_hash()
            .copied()
            .ok_or(AddressError::NotAKeyCredential)
    }

    fn header(&self) -> u8 {
        let kind = match (self.payment.is_script(), self.stake.map(|s| s.is_script())) {
            (false, Some(false)) => 0,
            (true, Some(false)) => 1,
            (false, Some(true)) => 2,
            (true, Some(true)) => 3,
            (false, None) => 6,
            (true, None) => 7,
        };
        (kind << 4) | self.network_id
    }

    /// Raw bytes: header, payment credential, optional stake credential.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(57);
        out.push(self.header());
        out.extend_from_slice(self.payment.bytes());
        if let Some(stake) = &self.stake {
            out.extend_from_slice(stake.bytes());
        }
        out
    }

    /// Parses raw address bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        match AnyAddress::from_bytes(bytes)? {
            AnyAddress::Payment(addr) => Ok(addr),
            AnyAddress::Reward(_) => Err(AddressError::UnsupportedHeader(bytes[0])),
        }
    }

    /// `addr1...` on mainnet, `addr_test1...` elsewhere.
    pub fn to_bech32(&self) -> String {
        let prefix = if self.network_id == MAINNET_NETWORK_ID {
            "addr"
        } else {
            "addr_test"
        };
        encode_bech32(prefix, &self.to_bytes())
    }

    /// Parses a bech32 payment address.
    pub fn from_bech32(text: &str) -> Result<Self, AddressError> {
        match AnyAddress::from_bech32(text)? {
            AnyAddress::Payment(addr) => Ok(addr),
            AnyAddress::Reward(_) => Err(AddressError::UnknownHrp("stake".into())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bech32())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_bech32())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_bech32(&text).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Reward addresses
// ---------------------------------------------------------------------------

/// A stake (reward) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RewardAddress {
    network_id: u8,
    credential: Credential,
}

impl RewardAddress {
    pub fn new(network_id: u8, credential: Credential) -> Self {
        Self {
            network_id: network_id & 0x0f,
            credential,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let kind = if self.credential.is_script() { 15 } else { 14 };
        let mut out = vec![(kind << 4) | self.network_id];
        out.extend_from_slice(self.credential.bytes());
        out
    }

    pub fn to_bech32(&self) -> String {
        let prefix = if self.network_id == MAINNET_NETWORK_ID {
            "stake"
        } else {
            "stake_test"
        };
        encode_bech32(prefix, &self.to_bytes())
    }
}

/// Either kind of address, as found in signed-message headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnyAddress {
    Payment(Address),
    Reward(RewardAddress),
}

impl AnyAddress {
    /// Interprets raw bytes by their header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        let header = *bytes.first().ok_or(AddressError::Empty)?;
        let kind = header >> 4;
        let network_id = header & 0x0f;
        let body = &bytes[1..];

        let expect_len = |expected: usize| {
            if body.len() == expected {
                Ok(())
            } else {
                Err(AddressError::InvalidLength {
                    expected,
                    actual: body.len(),
                })
            }
        };

        match kind {
            0..=3 => {
                expect_len(56)?;
                let payment = Credential::from_bytes(&body[..28], kind & 0b01 != 0)?;
                let stake = Credential::from_bytes(&body[28..], kind & 0b10 != 0)?;
                Ok(AnyAddress::Payment(Address::base(network_id, payment, stake)))
            }
            6 | 7 => {
                expect_len(28)?;
                let payment = Credential::from_bytes(body, kind == 7)?;
                Ok(AnyAddress::Payment(Address::enterprise(network_id, payment)))
            }
            14 | 15 => {
                expect_len(28)?;
                let credential = Credential::from_bytes(body, kind == 15)?;
                Ok(AnyAddress::Reward(RewardAddress::new(network_id, credential)))
            }
            _ => Err(AddressError::UnsupportedHeader(header)),
        }
    }

    /// Parses any supported bech32 address and checks the prefix against the
    /// header's network id.
    pub fn from_bech32(text: &str) -> Result<Self, AddressError> {
        let (hrp, bytes) = bech32::decode(text).map_err(|e| AddressError::Bech32(e.to_string()))?;
        let prefix = hrp.to_lowercase();
        let address = Self::from_bytes(&bytes)?;

        let (expected_prefix, network_id) = match &address {
            AnyAddress::Payment(a) => (
                if a.network_id == MAINNET_NETWORK_ID { "addr" } else { "addr_test" },
                a.network_id,
            ),
            AnyAddress::Reward(r) => (
                if r.network_id == MAINNET_NETWORK_ID { "stake" } else { "stake_test" },
                r.network_id,
            ),
        };
        if !["addr", "addr_test", "stake", "stake_test"].contains(&prefix.as_str()) {
            return Err(AddressError::UnknownHrp(prefix));
        }
        if prefix != expected_prefix {
            return Err(AddressError::NetworkMismatch {
                hrp: prefix,
                network_id,
            });
        }
        Ok(address)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            AnyAddress::Payment(a) => a.to_bytes(),
            AnyAddress::Reward(r) => r.to_bytes(),
        }
    }

    /// The spending credential, or the stake credential of a reward address.
    pub fn primary_credential(&self) -> &Credential {
        match self {
            AnyAddress::Payment(a) => a.payment_credential(),
            AnyAddress::Reward(r) => r.credential(),
        }
    }

    /// Every key hash the address names, payment first.
    pub fn key_hashes(&self) -> Vec<KeyHash> {
        match self {
            AnyAddress::Payment(a) => [Some(a.payment), a.stake]
                .into_iter()
                .flatten()
                .filter_map(|c| c.key_hash().copied())
                .collect(),
            AnyAddress::Reward(r) => r.credential.key_hash().copied().into_iter().collect(),
        }
    }
}

fn encode_bech32(prefix: &str, bytes: &[u8]) -> String {
    // Both prefixes are static ASCII and payloads are at most 57 bytes, so
    // neither parsing nor encoding can fail.
    match Hrp::parse(prefix).map(|hrp| bech32::encode::<Bech32>(hrp, bytes)) {
        Ok(Ok(text)) => text,
        _ => hex::encode(bytes),
    }
}

/// Returns the hex payment key hash of a bech32 address.
pub fn address_to_key_hash(text: &str) -> Result<String, AddressError> {
    Ok(Address::from_bech32(text)?.payment_key_hash()?.to_hex())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
