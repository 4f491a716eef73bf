//! # Escrow Configuration & Constants
//!
//! Every magic number the escrow flow depends on lives here, together with
//! [`EscrowConfig`]: the one immutable bundle of deployment parameters that
//! is built at startup and passed by reference into every proposal.
//!
//! Nothing in this crate reads the process environment. The binary decides
//! where configuration comes from; the library only accepts it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::CredentialMode;
use crate::escrow::{DatumLayout, RedeemerShape};
use crate::ledger::{Address, Network, PlutusScript, PlutusVersion, PolicyId, SlotConfig};
use crate::selection::ChangePolicy;
use crate::transaction::types::ExUnits;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum coin a UTXO must hold to be used as collateral: 5 ADA.
pub const COLLATERAL_FLOOR: u64 = 5_000_000;

/// Width of the validity interval on claim transactions: two hours of
/// one-second slots.
pub const VALIDITY_WINDOW_SLOTS: u64 = 2 * 60 * 60;

/// Default accepted clock skew for signed authentication messages.
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 60;

/// Fixed prefix of authentication message bodies.
pub const AUTH_MESSAGE_PREFIX: &str = "Athena MIUR";

/// Coin placed on a freshly minted identity-token output when the computed
/// minimum comes out as zero.
pub const MINT_OUTPUT_FALLBACK_COIN: u64 = 5_000_000;

/// Linear fee coefficient (lovelace per byte).
pub const DEFAULT_MIN_FEE_A: u64 = 44;

/// Linear fee constant (lovelace).
pub const DEFAULT_MIN_FEE_B: u64 = 155_381;

/// Lovelace charged per byte of output in the minimum-coin rule.
pub const DEFAULT_COINS_PER_UTXO_BYTE: u64 = 4_310;

/// Maximum transaction size in bytes.
pub const DEFAULT_MAX_TX_SIZE: u64 = 16_384;

/// Collateral must cover this percentage of the fee.
pub const DEFAULT_COLLATERAL_PERCENT: u64 = 150;

/// Fee headroom added whenever a Plutus script runs. Execution-unit
/// pricing itself is the chain's business; this covers a claim comfortably.
pub const DEFAULT_SCRIPT_FEE_RESERVE: u64 = 400_000;

/// Execution budget declared on escrow redeemers.
pub const DEFAULT_REDEEMER_EX_UNITS: ExUnits = ExUnits {
    mem: 1_400_000,
    steps: 500_000_000,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Protocol parameters
// ---------------------------------------------------------------------------

/// The subset of ledger protocol parameters proposals depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub coins_per_utxo_byte: u64,
    pub max_tx_size: u64,
    pub collateral_percent: u64,
    pub script_fee_reserve: u64,
    pub redeemer_ex_units: ExUnits,
    /// Required to compute the script integrity hash of V1 spends.
    pub cost_model_v1: Option<Vec<i64>>,
    /// Required to compute the script integrity hash of V2 spends.
    pub cost_model_v2: Option<Vec<i64>>,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_fee_a: DEFAULT_MIN_FEE_A,
            min_fee_b: DEFAULT_MIN_FEE_B,
            coins_per_utxo_byte: DEFAULT_COINS_PER_UTXO_BYTE,
            max_tx_size: DEFAULT_MAX_TX_SIZE,
            collateral_percent: DEFAULT_COLLATERAL_PERCENT,
            script_fee_reserve: DEFAULT_SCRIPT_FEE_RESERVE,
            redeemer_ex_units: DEFAULT_REDEEMER_EX_UNITS,
            cost_model_v1: None,
            cost_model_v2: None,
        }
    }
}

impl ProtocolParams {
    /// Cost model for a language, if configured.
    pub fn cost_model(&self, version: PlutusVersion) -> Option<&[i64]> {
        match version {
            PlutusVersion::V1 => self.cost_model_v1.as_deref(),
            PlutusVersion::V2 => self.cost_model_v2.as_deref(),
        }
    }

    /// `min_fee_a * size + min_fee_b`.
    pub fn linear_fee(&self, size: usize) -> u64 {
        self.min_fee_a
            .saturating_mul(size as u64)
            .saturating_add(self.min_fee_b)
    }
}

// ---------------------------------------------------------------------------
// Validator variant
// ---------------------------------------------------------------------------

/// Which on-chain validator build the proposals must satisfy.
///
/// There is no default: the caller states the build being targeted, because
/// getting any of these wrong produces transactions the chain rejects (or,
/// for the datum layout, funds locked under terms nobody can meet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorVariant {
    /// Field order of the datum.
    pub datum_layout: DatumLayout,
    /// When `true`, the fallback path opens only once the deadline has
    /// passed; when `false`, mediator authorization alone suffices.
    pub fallback_requires_deadline: bool,
    /// Whether the fallback redeemer carries a reference-input index.
    pub fallback_redeemer: RedeemerShape,
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Settings for verifying signed authentication messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Message bodies must read `"<prefix> | <unix seconds>"`.
    pub prefix: String,
    /// Maximum accepted `|now - timestamp|`, inclusive.
    pub freshness_window_secs: u64,
    /// Default credential matching mode when a caller does not choose one.
    pub credential_mode: CredentialMode,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            prefix: AUTH_MESSAGE_PREFIX.to_string(),
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
            credential_mode: CredentialMode::Payment,
        }
    }
}

// ---------------------------------------------------------------------------
// EscrowConfig
// ---------------------------------------------------------------------------

fn default_collateral_floor() -> u64 {
    COLLATERAL_FLOOR
}

fn default_validity_window() -> u64 {
    VALIDITY_WINDOW_SLOTS
}

fn default_fund_change() -> ChangePolicy {
    ChangePolicy::Merge
}

/// Deployment parameters for one escrow validator on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    pub network: Network,
    /// Overrides the network's built-in slot mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_config: Option<SlotConfig>,
    #[serde(default)]
    pub params: ProtocolParams,
    /// The escrow validator artifact (text-envelope JSON).
    pub script: PlutusScript,
    /// Mediator identity policy used when the service builds datums itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mediator_policy: Option<PolicyId>,
    pub variant: ValidatorVariant,
    #[serde(default = "default_collateral_floor")]
    pub collateral_floor: u64,
    #[serde(default = "default_validity_window")]
    pub validity_window_slots: u64,
    /// Change handling for funding transactions.
    #[serde(default = "default_fund_change")]
    pub fund_change: ChangePolicy,
    /// Change handling for identity-token mints.
    #[serde(default)]
    pub mint_change: ChangePolicy,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl EscrowConfig {
    /// A configuration with every optional setting at its default.
    pub fn new(network: Network, script: PlutusScript, variant: ValidatorVariant) -> Self {
        Self {
            network,
            slot_config: None,
            params: ProtocolParams::default(),
            script,
            mediator_policy: None,
            variant,
            collateral_floor: COLLATERAL_FLOOR,
            validity_window_slots: VALIDITY_WINDOW_SLOTS,
            fund_change: ChangePolicy::Merge,
            mint_change: ChangePolicy::Separate,
            auth: AuthConfig::default(),
        }
    }

    /// Parses and validates JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no proposal could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_config().slot_length_ms == 0 {
            return Err(ConfigError::Invalid("slot_length_ms must be positive".into()));
        }
        if self.validity_window_slots == 0 {
            return Err(ConfigError::Invalid("validity_window_slots must be positive".into()));
        }
        if self.collateral_floor == 0 {
            return Err(ConfigError::Invalid("collateral_floor must be positive".into()));
        }
        if self.params.coins_per_utxo_byte == 0 {
            return Err(ConfigError::Invalid("coins_per_utxo_byte must be positive".into()));
        }
        Ok(())
    }

    /// Slot mapping in force.
    pub fn slot_config(&self) -> SlotConfig {
        self.slot_config.unwrap_or_else(|| self.network.slot_config())
    }

    /// Address of the escrow validator on the configured network.
    pub fn script_address(&self) -> Address {
        self.script.address(self.network.network_id())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
