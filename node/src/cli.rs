//! # CLI Interface
//!
//! Defines the command-line argument structure for `athena-node` using
//! `clap` derive. Every subcommand works offline: chain snapshots come in as
//! JSON files and proposals go out as JSON on stdout.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use athena_protocol::auth::CredentialMode;

use crate::logging::LogFormat;

/// Athena escrow toolkit.
///
/// Builds unsigned escrow transactions from UTXO snapshots, computes datum
/// hashes and script addresses, and verifies CIP-8 signed messages.
#[derive(Parser, Debug)]
#[command(
    name = "athena-node",
    about = "Athena escrow transaction toolkit",
    version,
    propagate_version = true
)]
pub struct AthenaCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Path to the escrow configuration file (JSON).
    #[arg(long, short = 'c', global = true, env = "ATHENA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the validator text envelope. Replaces the script in the
    /// configuration file.
    #[arg(long, global = true, env = "ATHENA_SCRIPT_PATH")]
    pub script_path: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, env = "ATHENA_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the hash and CBOR of a datum.
    DatumHash(DatumArgs),
    /// Print the escrow validator's address.
    ScriptAddress,
    /// Propose a funding transaction.
    ProposeFund(ProposeFundArgs),
    /// Propose a claim by the target before the deadline.
    ProposeClaimTarget(ProposeClaimTargetArgs),
    /// Propose a mediator-authorized claim paying the fallback party.
    ProposeClaimFallback(ProposeClaimFallbackArgs),
    /// Verify a CIP-8 signed message against a claimed address.
    VerifyMessage(VerifyMessageArgs),
    /// Run fund and claim against an in-memory ledger with throwaway keys.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// A datum file.
#[derive(Args, Debug)]
pub struct DatumArgs {
    /// JSON file holding `{target, mediator, fallback, deadline}`.
    #[arg(long)]
    pub datum: PathBuf,
}

/// Arguments for `propose-fund`.
#[derive(Args, Debug)]
pub struct ProposeFundArgs {
    /// Funder's bech32 address; receives change.
    #[arg(long)]
    pub funder: String,

    /// JSON array of the funder's UTXOs.
    #[arg(long)]
    pub utxos: PathBuf,

    /// Lovelace to lock.
    #[arg(long)]
    pub amount: u64,

    #[command(flatten)]
    pub datum: DatumArgs,
}

/// Arguments for `propose-claim-target`.
#[derive(Args, Debug)]
pub struct ProposeClaimTargetArgs {
    /// Target's bech32 address.
    #[arg(long)]
    pub target: String,

    /// JSON array of the target's spendable UTXOs.
    #[arg(long)]
    pub wallet: PathBuf,

    /// JSON UTXO holding the target identity token.
    #[arg(long)]
    pub identity: Option<PathBuf>,

    /// JSON UTXO locked at the escrow address.
    #[arg(long)]
    pub escrow: PathBuf,

    /// Current slot.
    #[arg(long)]
    pub slot: u64,

    #[command(flatten)]
    pub datum: DatumArgs,
}

/// Arguments for `propose-claim-fallback`.
#[derive(Args, Debug)]
pub struct ProposeClaimFallbackArgs {
    /// Mediator's bech32 address; pays the fee.
    #[arg(long)]
    pub mediator: String,

    /// JSON UTXO holding the mediator identity token.
    #[arg(long)]
    pub mediator_proof: Option<PathBuf>,

    /// Fallback party's bech32 address; receives the funds.
    #[arg(long)]
    pub fallback: String,

    /// JSON UTXO holding the fallback identity token.
    #[arg(long)]
    pub fallback_proof: Option<PathBuf>,

    /// JSON array of the mediator's spendable UTXOs.
    #[arg(long)]
    pub wallet: PathBuf,

    /// JSON UTXO locked at the escrow address.
    #[arg(long)]
    pub escrow: PathBuf,

    /// Current slot.
    #[arg(long)]
    pub slot: u64,

    #[command(flatten)]
    pub datum: DatumArgs,
}

/// How the signer must relate to the claimed address.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Payment,
    Stake,
}

impl From<ModeArg> for CredentialMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Payment => CredentialMode::Payment,
            ModeArg::Stake => CredentialMode::Stake,
        }
    }
}

/// Arguments for `verify-message`.
#[derive(Args, Debug)]
pub struct VerifyMessageArgs {
    /// Address the caller claims to control (bech32, payment or stake).
    #[arg(long)]
    pub address: String,

    /// Hex COSE_Sign1.
    #[arg(long)]
    pub signature: String,

    /// Hex COSE_Key.
    #[arg(long)]
    pub key: String,

    /// Overrides the configured credential mode.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Unix seconds to check freshness against. Defaults to the system clock.
    #[arg(long)]
    pub now: Option<u64>,
}

/// Arguments for `simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Lovelace to lock.
    #[arg(long, default_value_t = 50_000_000)]
    pub amount: u64,

    /// Deadline, in seconds after the simulated start.
    #[arg(long, default_value_t = 3_600)]
    pub deadline_secs: u64,

    /// Settle through the mediator instead of the target.
    #[arg(long)]
    pub fallback: bool,
}
