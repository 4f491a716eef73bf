//! Balanced transaction construction via the builder pattern.
//!
//! The [`TransactionBuilder`] collects the parts of a transaction (fixed
//! inputs, script spends, reference inputs, outputs, mints, validity
//! interval) and `.build()` turns them into a fee-balanced, canonical
//! [`Transaction`]:
//!
//! 1. Extra inputs are drawn from the wallet candidates with
//!    [`select_covering`] until inputs plus mints cover outputs, burns and
//!    the fee.
//! 2. Leftover value goes back to the change address per [`ChangePolicy`].
//! 3. The fee is measured on a draft carrying one placeholder signature per
//!    required key, and the build repeats until the fee stops growing.
//!
//! The builder does not sign. That happens in [`super::signing`], against
//! the `required_keys` the build reports.

use std::collections::BTreeSet;

use tracing::debug;

use super::types::{
    AuxiliaryData, Mint, Redeemer, RedeemerTag, Transaction, TxBody, VKeyWitness, WitnessSet,
};
use crate::config::ProtocolParams;
use crate::crypto::blake2b_256;
use crate::error::EscrowError;
use crate::ledger::cbor::Encoder;
use crate::ledger::{
    Address, AssetName, Hash32, KeyHash, NativeScript, OutputRef, PlutusData, PlutusScript,
    PlutusVersion, ScriptError, Slot, TxOutput, Utxo, Value,
};
use crate::selection::{select_covering, ChangePolicy};

/// Upper bound on balancing rounds. Each round either settles or raises the
/// fee or the change margin, so real builds finish in two or three.
const MAX_BALANCE_ROUNDS: usize = 16;

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// A script-locked UTXO to consume, with everything its validator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSpend {
    pub utxo: Utxo,
    pub script: PlutusScript,
    pub datum: PlutusData,
    pub redeemer: PlutusData,
}

/// Output of [`TransactionBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    pub transaction: Transaction,
    /// Every consumed UTXO, in canonical order.
    pub spent: Vec<Utxo>,
    /// Keys whose signatures the ledger will demand, sorted.
    pub required_keys: Vec<KeyHash>,
    pub fee: u64,
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for balanced, unsigned transactions.
///
/// ```rust,no_run
/// use athena_protocol::config::ProtocolParams;
/// use athena_protocol::ledger::{Address, TxOutput, Value};
/// use athena_protocol::selection::ChangePolicy;
/// use athena_protocol::transaction::TransactionBuilder;
///
/// # fn demo(params: &ProtocolParams, me: Address, to: Address, wallet: Vec<athena_protocol::ledger::Utxo>) {
/// let built = TransactionBuilder::new(params, me, ChangePolicy::Separate)
///     .candidates(wallet)
///     .output(TxOutput::new(to, Value::from_coin(2_000_000)))
///     .build();
/// # }
/// ```
pub struct TransactionBuilder<'a> {
    params: &'a ProtocolParams,
    change_address: Address,
    change_policy: ChangePolicy,
    inputs: Vec<Utxo>,
    script_spends: Vec<ScriptSpend>,
    candidates: Vec<Utxo>,
    reference_inputs: Vec<Utxo>,
    outputs: Vec<TxOutput>,
    collateral: Option<Utxo>,
    required_signers: Vec<KeyHash>,
    mint: Mint,
    native_scripts: Vec<NativeScript>,
    extra_datums: Vec<PlutusData>,
    validity_start: Option<Slot>,
    ttl: Option<Slot>,
    auxiliary_data: Option<AuxiliaryData>,
}

impl<'a> TransactionBuilder<'a> {
    /// A builder that returns change to `change_address`.
    pub fn new(params: &'a ProtocolParams, change_address: Address, change_policy: ChangePolicy) -> Self {
        Self {
            params,
            change_address,
            change_policy,
            inputs: Vec::new(),
            script_spends: Vec::new(),
            candidates: Vec::new(),
            reference_inputs: Vec::new(),
            outputs: Vec::new(),
            collateral: None,
            required_signers: Vec::new(),
            mint: Mint::new(),
            native_scripts: Vec::new(),
            extra_datums: Vec::new(),
            validity_start: None,
            ttl: None,
            auxiliary_data: None,
        }
    }

    /// Inputs that are always consumed.
    pub fn inputs(mut self, utxos: impl IntoIterator<Item = Utxo>) -> Self {
        self.inputs.extend(utxos);
        self
    }

    /// Consumes a script-locked UTXO. Its spend redeemer index is assigned
    /// at build time from the final sorted input list.
    pub fn spend_script(mut self, spend: ScriptSpend) -> Self {
        self.script_spends.push(spend);
        self
    }

    /// Wallet UTXOs the builder may add to pay for the fee and outputs.
    pub fn candidates(mut self, utxos: impl IntoIterator<Item = Utxo>) -> Self {
        self.candidates.extend(utxos);
        self
    }

    /// A UTXO inspected but not consumed.
    pub fn reference_input(mut self, utxo: Utxo) -> Self {
        self.reference_inputs.push(utxo);
        self
    }

    pub fn output(mut self, output: TxOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn collateral(mut self, utxo: Utxo) -> Self {
        self.collateral = Some(utxo);
        self
    }

    pub fn required_signer(mut self, key: KeyHash) -> Self {
        self.required_signers.push(key);
        self
    }

    /// Mints (positive) or burns (negative) under a native policy.
    pub fn mint_asset(mut self, policy: &NativeScript, name: AssetName, quantity: i64) -> Self {
        let policy_id = policy.policy_id();
        if !self.native_scripts.contains(policy) {
            self.native_scripts.push(policy.clone());
        }
        let entry = self.mint.entry(policy_id).or_default().entry(name).or_insert(0);
        *entry = entry.saturating_add(quantity);
        self
    }

    /// Attaches a datum to the witness set without spending anything that
    /// needs it, so observers can read the plaintext behind a datum hash.
    pub fn witness_datum(mut self, datum: PlutusData) -> Self {
        self.extra_datums.push(datum);
        self
    }

    pub fn validity_start(mut self, slot: Slot) -> Self {
        self.validity_start = Some(slot);
        self
    }

    pub fn ttl(mut self, slot: Slot) -> Self {
        self.ttl = Some(slot);
        self
    }

    pub fn auxiliary_data(mut self, aux: AuxiliaryData) -> Self {
        self.auxiliary_data = Some(aux);
        self
    }

    /// Balances and assembles the transaction.
    pub fn build(self) -> Result<BuiltTransaction, EscrowError> {
        let (minted, burned) = split_mint(&self.mint)?;

        let fixed: Vec<Utxo> = self
            .script_spends
            .iter()
            .map(|s| s.utxo.clone())
            .chain(self.inputs.iter().cloned())
            .collect();
        let available = Value::sum(fixed.iter().map(Utxo::value))?.checked_add(&minted)?;
        let base_need = Value::sum(self.outputs.iter().map(|o| &o.value))?.checked_add(&burned)?;

        let reserved: BTreeSet<OutputRef> = fixed
            .iter()
            .chain(self.reference_inputs.iter())
            .map(|u| u.input)
            .collect();
        let mut pool: Vec<Utxo> = self
            .candidates
            .iter()
            .filter(|u| !reserved.contains(&u.input))
            .cloned()
            .collect();
        pool.sort_by(|a, b| a.input.cmp(&b.input));
        pool.dedup_by(|a, b| a.input == b.input);
        let everything = available.checked_add(&Value::sum(pool.iter().map(Utxo::value))?)?;

        let mut fee = 0u64;
        let mut margin = 0u64;
        let mut merge_forced = false;

        for round in 0..MAX_BALANCE_ROUNDS {
            let need = base_need.checked_add(&Value::from_coin(fee))?;
            let target = need.checked_add(&Value::from_coin(margin))?;

            let extra = match draw(&pool, &target, &available) {
                Ok(extra) => extra,
                Err(EscrowError::InsufficientFunds { .. }) if margin > 0 => {
                    // Cannot fund a change output of its own; fold instead.
                    margin = 0;
                    merge_forced = true;
                    draw(&pool, &need, &available).map_err(|_| insufficient(&need, &everything))?
                }
                Err(EscrowError::InsufficientFunds { .. }) => {
                    return Err(insufficient(&need, &everything))
                }
                Err(e) => return Err(e),
            };

            let inputs_total = available.checked_add(&Value::sum(extra.iter().map(Utxo::value))?)?;
            let change = inputs_total.checked_sub(&need)?;

            let mut outputs = self.outputs.clone();
            if !change.is_zero() {
                let eligible = outputs
                    .iter()
                    .position(|o| o.address == self.change_address && o.datum_hash.is_none());
                let merge = self.change_policy == ChangePolicy::Merge || merge_forced;
                match eligible {
                    Some(i) if merge => {
                        outputs[i].value = outputs[i].value.checked_add(&change)?;
                    }
                    _ => {
                        let out = TxOutput::new(self.change_address, change);
                        let min = out.min_coin(self.params.coins_per_utxo_byte);
                        if out.value.coin < min {
                            if merge_forced {
                                let short = need.checked_add(&Value::from_coin(min))?;
                                return Err(insufficient(&short, &everything));
                            } else {
                                debug!(round, min, "change below output minimum; widening selection");
                                margin = margin.max(min);
                                continue;
                            }
                        } else {
                            outputs.push(out);
                        }
                    }
                }
            }

            let mut spent = fixed.clone();
            spent.extend(extra);
            spent.sort_by(|a, b| a.input.cmp(&b.input));

            let (transaction, required_keys) = self.assemble(&spent, outputs, fee)?;
            let needed_fee = self.required_fee(&transaction, required_keys.len());
            debug!(round, fee, needed_fee, inputs = spent.len(), "balancing round");

            if needed_fee <= fee {
                self.check_collateral(fee)?;
                return Ok(BuiltTransaction {
                    transaction,
                    spent,
                    required_keys,
                    fee,
                });
            }
            fee = needed_fee;
        }

        Err(insufficient(
            &base_need.checked_add(&Value::from_coin(fee))?,
            &everything,
        ))
    }

    fn assemble(
        &self,
        spent: &[Utxo],
        outputs: Vec<TxOutput>,
        fee: u64,
    ) -> Result<(Transaction, Vec<KeyHash>), EscrowError> {
        let mut body = TxBody {
            inputs: spent.iter().map(|u| u.input).collect(),
            outputs,
            fee,
            ttl: self.ttl,
            auxiliary_data_hash: self.auxiliary_data.as_ref().map(AuxiliaryData::hash),
            validity_start: self.validity_start,
            mint: self.mint.clone(),
            script_data_hash: None,
            collateral: self.collateral.iter().map(|u| u.input).collect(),
            required_signers: self.required_signers.clone(),
            reference_inputs: self.reference_inputs.iter().map(|u| u.input).collect(),
        };
        body.canonicalize();

        let mut witness_set = WitnessSet {
            native_scripts: self.native_scripts.clone(),
            ..WitnessSet::default()
        };
        for spend in &self.script_spends {
            let index = body
                .inputs
                .binary_search(&spend.utxo.input)
                .map_err(|_| EscrowError::StaleInput {
                    input: spend.utxo.input,
                })?;
            witness_set.redeemers.push(Redeemer {
                tag: RedeemerTag::Spend,
                index: index as u32,
                data: spend.redeemer.clone(),
                ex_units: self.params.redeemer_ex_units,
            });
            if !witness_set.plutus_data.contains(&spend.datum) {
                witness_set.plutus_data.push(spend.datum.clone());
            }
            if !witness_set.plutus_scripts.contains(&spend.script) {
                witness_set.plutus_scripts.push(spend.script.clone());
            }
        }
        for datum in &self.extra_datums {
            if !witness_set.plutus_data.contains(datum) {
                witness_set.plutus_data.push(datum.clone());
            }
        }
        witness_set.redeemers.sort_by_key(|r| (r.tag, r.index));
        body.script_data_hash = script_data_hash(&witness_set, self.params)?;

        let required_keys = self.required_keys(spent);
        Ok((
            Transaction {
                body,
                witness_set,
                auxiliary_data: self.auxiliary_data.clone(),
            },
            required_keys,
        ))
    }

    fn required_keys(&self, spent: &[Utxo]) -> Vec<KeyHash> {
        let mut keys: Vec<KeyHash> = spent
            .iter()
            .chain(self.collateral.iter())
            .filter_map(|u| u.address().payment_credential().key_hash().copied())
            .chain(self.required_signers.iter().copied())
            .chain(self.native_scripts.iter().flat_map(NativeScript::key_hashes))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn required_fee(&self, tx: &Transaction, signers: usize) -> u64 {
        let mut draft = tx.clone();
        draft.witness_set.vkeys = vec![VKeyWitness::PLACEHOLDER; signers];
        let fee = self.params.linear_fee(draft.size());
        if self.script_spends.is_empty() {
            fee
        } else {
            fee.saturating_add(self.params.script_fee_reserve)
        }
    }

    fn check_collateral(&self, fee: u64) -> Result<(), EscrowError> {
        if self.script_spends.is_empty() {
            return Ok(());
        }
        let floor = fee
            .saturating_mul(self.params.collateral_percent)
            .div_ceil(100);
        match &self.collateral {
            Some(utxo) if utxo.value().is_pure_coin() && utxo.value().coin >= floor => Ok(()),
            _ => Err(EscrowError::CollateralUnavailable { floor }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insufficient(required: &Value, available: &Value) -> EscrowError {
    EscrowError::InsufficientFunds {
        required: required.clone(),
        available: available.clone(),
    }
}

/// Wallet UTXOs needed on top of `available` to cover `target`.
fn draw(pool: &[Utxo], target: &Value, available: &Value) -> Result<Vec<Utxo>, EscrowError> {
    let missing = target.shortfall(available);
    if missing.is_zero() {
        return Ok(Vec::new());
    }
    Ok(select_covering(pool, &missing)?.selected)
}

/// Splits a mint map into what it adds to and removes from the transaction.
fn split_mint(mint: &Mint) -> Result<(Value, Value), EscrowError> {
    let mut minted = Value::zero();
    let mut burned = Value::zero();
    for (policy, names) in mint {
        for (name, quantity) in names {
            let magnitude = Value::zero().with_asset(*policy, name.clone(), quantity.unsigned_abs());
            if *quantity > 0 {
                minted = minted.checked_add(&magnitude)?;
            } else {
                burned = burned.checked_add(&magnitude)?;
            }
        }
    }
    Ok((minted, burned))
}

/// BLAKE2b-256 over `redeemers || datums || language views`, the script
/// integrity hash in body key 11.
///
/// With datums but no redeemers (a funding transaction publishing its
/// datum) the preimage is `0x80 || datums || 0xa0`. With neither there is
/// no hash.
pub fn script_data_hash(
    witness: &WitnessSet,
    params: &ProtocolParams,
) -> Result<Option<Hash32>, ScriptError> {
    if witness.redeemers.is_empty() && witness.plutus_data.is_empty() {
        return Ok(None);
    }
    let mut enc = Encoder::new();
    if witness.redeemers.is_empty() {
        enc.array(0);
        witness.encode_plutus_data(&mut enc);
        enc.map(0);
    } else {
        witness.encode_redeemers(&mut enc);
        if !witness.plutus_data.is_empty() {
            witness.encode_plutus_data(&mut enc);
        }
        encode_language_views(&mut enc, &witness.languages(), params)?;
    }
    Ok(Some(Hash32::new(blake2b_256(&enc.into_bytes()))))
}

/// Cost models keyed by language, in canonical key order (the one-byte V2
/// key sorts before the two-byte V1 key).
fn encode_language_views(
    enc: &mut Encoder,
    languages: &[PlutusVersion],
    params: &ProtocolParams,
) -> Result<(), ScriptError> {
    enc.map(languages.len());
    for version in [PlutusVersion::V2, PlutusVersion::V1] {
        if !languages.contains(&version) {
            continue;
        }
        let model = params
            .cost_model(version)
            .ok_or(ScriptError::MissingCostModel(version))?;
        match version {
            PlutusVersion::V2 => {
                enc.unsigned(1).array(model.len());
                for cost in model {
                    enc.int(i128::from(*cost));
                }
            }
            PlutusVersion::V1 => {
                // V1 keeps the historical double-encoded form.
                let mut inner = Encoder::new();
                inner.array_indefinite();
                for cost in model {
                    inner.int(i128::from(*cost));
                }
                inner.end();
                enc.bytes(&[0x00]).bytes(&inner.into_bytes());
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
