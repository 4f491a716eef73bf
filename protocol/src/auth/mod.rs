//! # Message Authenticator
//!
//! Verifies wallet-signed, freshness-bound messages before an API-triggered
//! settlement request is honored. A valid message body reads
//! `"<prefix> | <unix seconds>"` and must be signed by a key the claimed
//! address names.
//!
//! Two matching modes exist because different frontends signed with
//! different keys: [`CredentialMode::Payment`] demands the claimed
//! address's payment key, [`CredentialMode::Stake`] also accepts its stake
//! key.

pub mod cose;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AuthConfig;
use crate::ledger::{AnyAddress, KeyHash};

pub use cose::{sign_message, CoseError, CoseSign1};

/// Why a signed message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// The envelope does not parse, the signature does not verify, or the
    /// key is not part of the signing address.
    #[error("bad signature")]
    BadSignature,

    /// The signer is not the claimed party.
    #[error("signer does not match the claimed credential")]
    CredentialMismatch,

    /// The body is not `"<prefix> | <unix seconds>"`.
    #[error("malformed message body")]
    MalformedMessage,

    /// The timestamp is outside the freshness window.
    #[error("message timestamp outside the freshness window")]
    Stale,
}

/// Which of the claimant's credentials may sign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    /// Exact payment-credential match.
    #[default]
    Payment,
    /// Payment or stake credential.
    Stake,
}

/// CIP-30 `signData` output: hex `COSE_Sign1` and hex `COSE_Key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub signature: String,
    pub key: String,
}

/// A message that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedMessage {
    pub message: String,
    pub signer: KeyHash,
    pub timestamp: u64,
}

/// Verifies `signed` as coming from `claimed`, fresh relative to `now_secs`.
///
/// `|now - timestamp| == freshness_window_secs` is accepted.
pub fn verify(
    signed: &SignedMessage,
    claimed: &AnyAddress,
    mode: CredentialMode,
    config: &AuthConfig,
    now_secs: u64,
) -> Result<VerifiedMessage, AuthFailure> {
    let envelope = CoseSign1::from_hex(&signed.signature).map_err(|_| AuthFailure::BadSignature)?;
    let key = hex::decode(&signed.key)
        .map_err(|_| AuthFailure::BadSignature)
        .and_then(|bytes| cose::decode_key(&bytes).map_err(|_| AuthFailure::BadSignature))?;
    if !key.verify(&envelope.sig_structure(), &envelope.signature) {
        return Err(AuthFailure::BadSignature);
    }

    let signer = key.key_hash();
    let signing_address = envelope.address().map_err(|_| AuthFailure::BadSignature)?;
    if !signing_address.key_hashes().contains(&signer) {
        return Err(AuthFailure::BadSignature);
    }

    let matches = match mode {
        CredentialMode::Payment => claimed.primary_credential().key_hash() == Some(&signer),
        CredentialMode::Stake => claimed.key_hashes().contains(&signer),
    };
    if !matches {
        debug!(%signer, ?mode, "signer does not match claimed address");
        return Err(AuthFailure::CredentialMismatch);
    }

    if envelope.is_hashed() {
        return Err(AuthFailure::MalformedMessage);
    }
    let message = envelope
        .payload
        .as_deref()
        .and_then(|p| std::str::from_utf8(p).ok())
        .ok_or(AuthFailure::MalformedMessage)?;
    let timestamp = parse_body(message, &config.prefix).ok_or(AuthFailure::MalformedMessage)?;

    if now_secs.abs_diff(timestamp) > config.freshness_window_secs {
        debug!(timestamp, now_secs, "stale message");
        return Err(AuthFailure::Stale);
    }

    Ok(VerifiedMessage {
        message: message.to_string(),
        signer,
        timestamp,
    })
}

/// [`verify`] against the system clock.
pub fn verify_now(
    signed: &SignedMessage,
    claimed: &AnyAddress,
    mode: CredentialMode,
    config: &AuthConfig,
) -> Result<VerifiedMessage, AuthFailure> {
    let now = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
    verify(signed, claimed, mode, config, now)
}

/// The body every client signs.
pub fn message_body(prefix: &str, unix_secs: u64) -> String {
    format!("{prefix} | {unix_secs}")
}

fn parse_body(message: &str, prefix: &str) -> Option<u64> {
    message
        .strip_prefix(prefix)?
        .strip_prefix(" | ")?
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PaymentKey;
    use crate::ledger::{Address, Credential, RewardAddress};

    const NOW: u64 = 1_700_000_000;

    struct Wallet {
        payment: PaymentKey,
        stake: PaymentKey,
    }

    impl Wallet {
        fn new() -> Self {
            Self {
                payment: PaymentKey::from_seed(&[1; 32]),
                stake: PaymentKey::from_seed(&[2; 32]),
            }
        }

        fn base(&self) -> AnyAddress {
            AnyAddress::Payment(Address::base(
                0,
                Credential::Key(self.payment.key_hash()),
                Credential::Key(self.stake.key_hash()),
            ))
        }

        fn reward(&self) -> AnyAddress {
            AnyAddress::Reward(RewardAddress::new(0, Credential::Key(self.stake.key_hash())))
        }
    }

    fn config() -> AuthConfig {
        AuthConfig::default()
    }

    fn signed_at(key: &PaymentKey, address: &AnyAddress, ts: u64) -> SignedMessage {
        sign_message(key, address, message_body("Athena MIUR", ts).as_bytes())
    }

    #[test]
    fn accepts_fresh_payment_signature() {
        let w = Wallet::new();
        let msg = signed_at(&w.payment, &w.base(), NOW);
        let verified = verify(&msg, &w.base(), CredentialMode::Payment, &config(), NOW).unwrap();
        assert_eq!(verified.message, "Athena MIUR | 1700000000");
        assert_eq!(verified.signer, w.payment.key_hash());
        assert_eq!(verified.timestamp, NOW);
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        let w = Wallet::new();
        let msg = signed_at(&w.payment, &w.base(), NOW);
        let cfg = config();
        let window = cfg.freshness_window_secs;
        assert!(verify(&msg, &w.base(), CredentialMode::Payment, &cfg, NOW + window).is_ok());
        assert!(verify(&msg, &w.base(), CredentialMode::Payment, &cfg, NOW - window).is_ok());
        assert_eq!(
            verify(&msg, &w.base(), CredentialMode::Payment, &cfg, NOW + window + 1),
            Err(AuthFailure::Stale)
        );
    }

    #[test]
    fn stake_signature_needs_stake_mode() {
        let w = Wallet::new();
        let msg = signed_at(&w.stake, &w.reward(), NOW);
        assert_eq!(
            verify(&msg, &w.base(), CredentialMode::Payment, &config(), NOW),
            Err(AuthFailure::CredentialMismatch)
        );
        assert!(verify(&msg, &w.base(), CredentialMode::Stake, &config(), NOW).is_ok());
    }

    #[test]
    fn someone_else_is_a_mismatch() {
        let w = Wallet::new();
        let other = PaymentKey::from_seed(&[9; 32]);
        let other_address =
            AnyAddress::Payment(Address::enterprise(0, Credential::Key(other.key_hash())));
        let msg = signed_at(&other, &other_address, NOW);
        assert_eq!(
            verify(&msg, &w.base(), CredentialMode::Stake, &config(), NOW),
            Err(AuthFailure::CredentialMismatch)
        );
    }

    #[test]
    fn key_outside_signing_address_is_bad_signature() {
        let w = Wallet::new();
        let other = PaymentKey::from_seed(&[9; 32]);
        // Signed by `other` but claiming the wallet's address in the header.
        let msg = signed_at(&other, &w.base(), NOW);
        assert_eq!(
            verify(&msg, &w.base(), CredentialMode::Payment, &config(), NOW),
            Err(AuthFailure::BadSignature)
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let w = Wallet::new();
        let mut msg = signed_at(&w.payment, &w.base(), NOW);
        let last = msg.signature.len() - 2;
        let flipped = if &msg.signature[last..] == "00" { "01" } else { "00" };
        msg.signature.replace_range(last.., flipped);
        assert_eq!(
            verify(&msg, &w.base(), CredentialMode::Payment, &config(), NOW),
            Err(AuthFailure::BadSignature)
        );
    }

    #[test]
    fn body_must_match_prefix_and_timestamp() {
        let w = Wallet::new();
        for body in ["Athena MIUR | soon", "Other | 1700000000", "Athena MIUR 1700000000"] {
            let msg = sign_message(&w.payment, &w.base(), body.as_bytes());
            assert_eq!(
                verify(&msg, &w.base(), CredentialMode::Payment, &config(), NOW),
                Err(AuthFailure::MalformedMessage),
                "{body}"
            );
        }
    }

    #[test]
    fn freshness_window_is_configurable() {
        let w = Wallet::new();
        let msg = signed_at(&w.payment, &w.base(), NOW);
        let cfg = AuthConfig {
            freshness_window_secs: 24 * 60 * 60,
            ..AuthConfig::default()
        };
        assert!(verify(&msg, &w.base(), CredentialMode::Payment, &cfg, NOW + 3_600).is_ok());
    }
}
