// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Athena Node
//!
//! Entry point for the `athena-node` binary. Parses CLI arguments,
//! initializes logging, loads the escrow configuration once, and dispatches
//! to the requested subcommand.
//!
//! Results are printed to stdout as JSON; logs go to stderr.

mod cli;
mod logging;

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use athena_contracts::EscrowDesk;
use athena_protocol::auth::{self, CredentialMode};
use athena_protocol::chain::{AwaitPolicy, ChainBackend, Confirmation, InMemoryLedger};
use athena_protocol::crypto::PaymentKey;
use athena_protocol::ledger::{
    Address, AnyAddress, AssetName, Credential, KeyHash, NativeScript, PlutusScript, PosixMillis,
    Slot, TxId, Utxo, Value,
};
use athena_protocol::transaction::{FallbackClaimRequest, TargetClaimRequest};
use athena_protocol::{
    sign_transaction, Assembler, ContractDatum, EscrowConfig, ProposedTransaction,
};

use cli::{AthenaCli, Commands, GlobalArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AthenaCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.global.log_format);

    run(&cli.global, cli.command).await
}

async fn run(global: &GlobalArgs, command: Commands) -> Result<()> {
    match command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::VerifyMessage(args) => verify_message(global, args),
        Commands::DatumHash(args) => {
            let config = load_config(global)?;
            let layout = config.variant.datum_layout;
            let datum: ContractDatum = read_json(&args.datum)?;
            emit(&json!({
                "datum_hash": datum.hash(layout),
                "cbor_hex": hex::encode(datum.encode(layout)),
            }))
        }
        Commands::ScriptAddress => {
            let config = load_config(global)?;
            emit(&json!({
                "network": config.network,
                "script_hash": config.script.hash(),
                "address": config.script_address(),
            }))
        }
        Commands::ProposeFund(args) => {
            let config = load_config(global)?;
            let funder = parse_address(&args.funder)?;
            let utxos: Vec<Utxo> = read_json(&args.utxos)?;
            let datum: ContractDatum = read_json(&args.datum.datum)?;
            let proposal = Assembler::new(&config)
                .propose_fund(&funder, &utxos, &Value::from_coin(args.amount), &datum)
                .context("funding proposal failed")?;
            emit(&ProposalOutput::from(&proposal))
        }
        Commands::ProposeClaimTarget(args) => {
            let config = load_config(global)?;
            let target = parse_address(&args.target)?;
            let wallet: Vec<Utxo> = read_json(&args.wallet)?;
            let identity: Option<Utxo> = args.identity.as_deref().map(read_json::<Utxo>).transpose()?;
            let escrow: Utxo = read_json(&args.escrow)?;
            let datum: ContractDatum = read_json(&args.datum.datum)?;
            let proposal = Assembler::new(&config)
                .propose_claim_as_target(&TargetClaimRequest {
                    target_address: &target,
                    target_wallet: &wallet,
                    identity_reference: identity.as_ref(),
                    escrow_utxo: &escrow,
                    datum: &datum,
                    now: Slot(args.slot),
                })
                .context("target claim proposal failed")?;
            emit(&ProposalOutput::from(&proposal))
        }
        Commands::ProposeClaimFallback(args) => {
            let config = load_config(global)?;
            let mediator = parse_address(&args.mediator)?;
            let fallback = parse_address(&args.fallback)?;
            let mediator_proof: Option<Utxo> =
                args.mediator_proof.as_deref().map(read_json::<Utxo>).transpose()?;
            let fallback_proof: Option<Utxo> =
                args.fallback_proof.as_deref().map(read_json::<Utxo>).transpose()?;
            let wallet: Vec<Utxo> = read_json(&args.wallet)?;
            let escrow: Utxo = read_json(&args.escrow)?;
            let datum: ContractDatum = read_json(&args.datum.datum)?;
            let proposal = Assembler::new(&config)
                .propose_claim_as_fallback(&FallbackClaimRequest {
                    mediator_address: &mediator,
                    mediator_reference: mediator_proof.as_ref(),
                    fallback_address: &fallback,
                    fallback_reference: fallback_proof.as_ref(),
                    mediator_wallet: &wallet,
                    escrow_utxo: &escrow,
                    datum: &datum,
                    now: Slot(args.slot),
                })
                .context("fallback claim proposal failed")?;
            emit(&ProposalOutput::from(&proposal))
        }
        Commands::Simulate(args) => simulate(load_config(global)?, args).await,
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Reads the configuration file and applies the script override.
fn load_config(global: &GlobalArgs) -> Result<EscrowConfig> {
    let path = global
        .config
        .as_deref()
        .context("no configuration given: pass --config or set ATHENA_CONFIG")?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration at {}", path.display()))?;
    let mut config = EscrowConfig::from_json(&text)
        .with_context(|| format!("invalid configuration at {}", path.display()))?;

    if let Some(script_path) = &global.script_path {
        let envelope = std::fs::read_to_string(script_path)
            .with_context(|| format!("failed to read script at {}", script_path.display()))?;
        config.script = PlutusScript::from_text_envelope(&envelope)
            .with_context(|| format!("invalid script envelope at {}", script_path.display()))?;
        config.validate()?;
    }

    tracing::info!(
        network = ?config.network,
        script_hash = %config.script.hash(),
        layout = ?config.variant.datum_layout,
        "configuration loaded"
    );
    Ok(config)
}

fn auth_config(global: &GlobalArgs) -> Result<athena_protocol::config::AuthConfig> {
    match global.config {
        Some(_) => Ok(load_config(global)?.auth),
        None => Ok(Default::default()),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn verify_message(global: &GlobalArgs, args: cli::VerifyMessageArgs) -> Result<()> {
    let auth_config = auth_config(global)?;
    let claimed = AnyAddress::from_bech32(&args.address)
        .with_context(|| format!("invalid address {}", args.address))?;
    let mode = args
        .mode
        .map(CredentialMode::from)
        .unwrap_or(auth_config.credential_mode);
    let signed = auth::SignedMessage {
        signature: args.signature,
        key: args.key,
    };

    let result = match args.now {
        Some(now) => auth::verify(&signed, &claimed, mode, &auth_config, now),
        None => auth::verify_now(&signed, &claimed, mode, &auth_config),
    };
    match result {
        Ok(verified) => emit(&json!({ "valid": true, "message": verified })),
        Err(failure) => {
            tracing::warn!(%failure, "message rejected");
            emit(&json!({ "valid": false, "reason": failure.to_string() }))
        }
    }
}

/// Fund and settle one escrow on a throwaway in-memory ledger.
async fn simulate(config: EscrowConfig, args: cli::SimulateArgs) -> Result<()> {
    const ADA: u64 = 1_000_000;

    let slots = config.slot_config();
    let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
    let start = slots.posix_to_slot(PosixMillis(now_ms));
    let ledger = InMemoryLedger::new(start).with_coins_per_utxo_byte(config.params.coins_per_utxo_byte);

    let network_id = config.network.network_id();
    let party = || {
        let key = PaymentKey::generate();
        let address = Address::enterprise(network_id, Credential::Key(key.key_hash()));
        (key, address)
    };
    let (funder_key, funder) = party();
    let (target_key, target) = party();
    let (mediator_key, mediator) = party();
    let (fallback_key, fallback) = party();

    let token = AssetName::new(b"identity".to_vec())?;
    let policy_for = |owner: &Address, key: KeyHash| {
        let policy = NativeScript::pubkey(key).policy_id();
        ledger.fund(*owner, Value::from_coin(2 * ADA).with_asset(policy, token.clone(), 1));
        policy
    };
    let target_policy = policy_for(&target, target_key.key_hash());
    let mediator_policy = policy_for(&mediator, mediator_key.key_hash());
    let fallback_policy = policy_for(&fallback, fallback_key.key_hash());

    ledger.fund(funder, Value::from_coin(args.amount.saturating_add(10 * ADA)));
    ledger.fund(target, Value::from_coin(20 * ADA));
    ledger.fund(mediator, Value::from_coin(20 * ADA));

    let deadline = slots.slot_to_posix(start).as_millis() + args.deadline_secs * 1_000;
    let datum = ContractDatum::new(target_policy, mediator_policy, fallback_policy, PosixMillis(deadline))?;
    let amount = Value::from_coin(args.amount);

    let requires_deadline = config.variant.fallback_requires_deadline;
    let desk = EscrowDesk::new(config, ledger);

    let (funding, intent) = desk.request_funding(&funder, &amount, &datum).await?;
    let funding_id = confirm(&desk, &sign_transaction(&funding, &[&funder_key])?).await?;
    tracing::info!(tx_id = %funding_id, datum_hash = %intent.datum_hash, "escrow funded");

    let (settlement, settled_to) = if args.fallback {
        if requires_deadline {
            let slot_length_ms = desk.config().slot_config().slot_length_ms.max(1);
            desk.chain().advance(args.deadline_secs * 1_000 / slot_length_ms + 1);
        }
        let claim = desk
            .request_fallback_claim(&mediator, &fallback, &datum, &amount)
            .await?;
        (sign_transaction(&claim, &[&mediator_key])?, fallback)
    } else {
        let claim = desk.request_target_claim(&target, &datum, &amount).await?;
        (sign_transaction(&claim, &[&target_key])?, target)
    };
    let settlement_id = confirm(&desk, &settlement).await?;

    let received: Vec<Utxo> = desk.chain().list_utxos(&settled_to).await?;
    emit(&json!({
        "script_address": desk.config().script_address(),
        "funding_tx": funding_id,
        "settlement_tx": settlement_id,
        "settled_to": settled_to,
        "received": received.iter().filter(|u| u.input.tx_id == settlement_id).collect::<Vec<_>>(),
    }))
}

async fn confirm(
    desk: &EscrowDesk<InMemoryLedger>,
    signed: &athena_protocol::SignedTransaction,
) -> Result<TxId> {
    match desk.submit_and_confirm(signed, AwaitPolicy::default()).await? {
        Confirmation::Confirmed { .. } => Ok(signed.id),
        Confirmation::Rejected { reason } => bail!("transaction {} rejected: {reason}", signed.id),
        Confirmation::TimedOut => bail!("transaction {} not confirmed in time", signed.id),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// What proposal commands print: enough to sign and submit elsewhere.
#[derive(Serialize)]
struct ProposalOutput<'a> {
    tx_id: TxId,
    fee: u64,
    required_keys: &'a [KeyHash],
    cbor_hex: String,
}

impl<'a> From<&'a ProposedTransaction> for ProposalOutput<'a> {
    fn from(proposal: &'a ProposedTransaction) -> Self {
        Self {
            tx_id: proposal.id,
            fee: proposal.fee,
            required_keys: &proposal.required_keys,
            cbor_hex: proposal.transaction.to_cbor_hex(),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_address(text: &str) -> Result<Address> {
    text.parse().with_context(|| format!("invalid address {text}"))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("athena-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc       {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}
