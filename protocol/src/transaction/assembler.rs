//! # Escrow Proposals
//!
//! One function per escrow operation, each turning an explicit UTXO
//! snapshot plus the immutable [`EscrowConfig`] into a balanced, unsigned
//! [`ProposedTransaction`]. Nothing here performs I/O or reads the clock:
//! "now" is the slot the caller observed, and the same arguments always
//! yield the same bytes.
//!
//! The deadline checks are local and advisory. They mirror what the
//! validator will enforce so callers fail early with a precise reason, but
//! the chain remains the authority on submission.

use serde::Serialize;
use tracing::info;

use super::builder::{BuiltTransaction, ScriptSpend, TransactionBuilder};
use super::types::{AuxiliaryData, Transaction, TxBody, WitnessSet};
use crate::config::{EscrowConfig, MINT_OUTPUT_FALLBACK_COIN};
use crate::error::EscrowError;
use crate::escrow::{ContractDatum, RedeemerShape, SpendIntent};
use crate::ledger::{
    Address, AssetName, KeyHash, NativeScript, OutputRef, PolicyId, PosixMillis, Slot, TxId,
    TxOutput, Utxo, Value,
};
use crate::selection::{find_collateral, ChangePolicy};

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// An assembled, unsigned transaction and what it takes to sign it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposedTransaction {
    pub id: TxId,
    pub transaction: Transaction,
    /// Keys that must sign, sorted.
    pub required_keys: Vec<KeyHash>,
    /// UTXOs the transaction consumes.
    pub spent: Vec<Utxo>,
    pub fee: u64,
}

impl ProposedTransaction {
    fn from_built(built: BuiltTransaction) -> Self {
        Self {
            id: built.transaction.id(),
            transaction: built.transaction,
            required_keys: built.required_keys,
            spent: built.spent,
            fee: built.fee,
        }
    }

    pub fn body(&self) -> &TxBody {
        &self.transaction.body
    }

    pub fn witnesses(&self) -> &WitnessSet {
        &self.transaction.witness_set
    }

    pub fn auxiliary_data(&self) -> Option<&AuxiliaryData> {
        self.transaction.auxiliary_data.as_ref()
    }

    /// The UTXOs this transaction creates once confirmed.
    pub fn produced(&self) -> Vec<Utxo> {
        self.body()
            .outputs
            .iter()
            .enumerate()
            .map(|(i, output)| Utxo::new(OutputRef::new(self.id, i as u32), output.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Inputs to [`Assembler::propose_claim_as_target`].
#[derive(Debug, Clone, Copy)]
pub struct TargetClaimRequest<'a> {
    pub target_address: &'a Address,
    /// The target's spendable UTXOs: fees, change and collateral come from
    /// here.
    pub target_wallet: &'a [Utxo],
    /// The target's identity proof, referenced but not spent.
    pub identity_reference: Option<&'a Utxo>,
    pub escrow_utxo: &'a Utxo,
    pub datum: &'a ContractDatum,
    pub now: Slot,
}

/// Inputs to [`Assembler::propose_claim_as_fallback`].
#[derive(Debug, Clone, Copy)]
pub struct FallbackClaimRequest<'a> {
    pub mediator_address: &'a Address,
    pub mediator_reference: Option<&'a Utxo>,
    pub fallback_address: &'a Address,
    pub fallback_reference: Option<&'a Utxo>,
    /// The mediator's spendable UTXOs: the mediator pays the fee.
    pub mediator_wallet: &'a [Utxo],
    pub escrow_utxo: &'a Utxo,
    pub datum: &'a ContractDatum,
    pub now: Slot,
}

/// Inputs to [`Assembler::propose_mint_identity_token`].
#[derive(Debug, Clone)]
pub struct MintRequest<'a> {
    pub payer: &'a Address,
    /// The key the new single-signature policy is locked to.
    pub policy_key_hash: KeyHash,
    pub payer_wallet: &'a [Utxo],
    pub receiver: &'a Address,
    /// Asset names and quantities to mint, all under the new policy.
    pub assets: Vec<(AssetName, u64)>,
    pub metadata: Option<AuxiliaryData>,
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Builds escrow transactions against one configuration.
#[derive(Debug, Clone, Copy)]
pub struct Assembler<'c> {
    config: &'c EscrowConfig,
}

impl<'c> Assembler<'c> {
    pub fn new(config: &'c EscrowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EscrowConfig {
        self.config
    }

    /// Locks `amount` at the escrow address under `datum`.
    ///
    /// Every UTXO in `funding_utxos` is consumed; nothing else is. The
    /// plaintext datum rides in the witness set so observers can match the
    /// output's datum hash.
    pub fn propose_fund(
        &self,
        funder: &Address,
        funding_utxos: &[Utxo],
        amount: &Value,
        datum: &ContractDatum,
    ) -> Result<ProposedTransaction, EscrowError> {
        let cfg = self.config;
        let layout = cfg.variant.datum_layout;

        let escrow_output = TxOutput::new(cfg.script_address(), amount.clone())
            .with_datum_hash(datum.hash(layout));
        let required = escrow_output.min_coin(cfg.params.coins_per_utxo_byte);
        if amount.coin < required {
            return Err(EscrowError::AmountBelowMinimum {
                required,
                provided: amount.coin,
            });
        }

        let built = TransactionBuilder::new(&cfg.params, *funder, cfg.fund_change)
            .inputs(funding_utxos.iter().cloned())
            .output(escrow_output)
            .witness_datum(datum.to_plutus_data(layout))
            .build()?;

        let proposal = ProposedTransaction::from_built(built);
        info!(
            tx_id = %proposal.id,
            fee = proposal.fee,
            amount = %amount,
            datum_hash = %datum.hash(layout),
            "proposed escrow funding"
        );
        Ok(proposal)
    }

    /// Releases the escrow to its target before the deadline.
    pub fn propose_claim_as_target(
        &self,
        req: &TargetClaimRequest<'_>,
    ) -> Result<ProposedTransaction, EscrowError> {
        let cfg = self.config;
        let datum = req.datum;
        let now_ms = cfg.slot_config().slot_to_posix(req.now);

        if now_ms >= datum.deadline {
            return Err(EscrowError::DeadlinePassed {
                deadline: datum.deadline,
                now: now_ms,
            });
        }
        self.check_escrow(req.escrow_utxo, datum)?;
        let proof = identity_proof(req.identity_reference, &datum.target, req.target_address)?;
        let signer = req.target_address.payment_key_hash()?;
        let collateral = find_collateral(req.target_wallet, cfg.collateral_floor)?;

        // Upper bound: the last slot that starts strictly before the deadline.
        let last_before = cfg
            .slot_config()
            .posix_to_slot(PosixMillis(datum.deadline.as_millis().saturating_sub(1)));
        let ttl = req
            .now
            .saturating_add(cfg.validity_window_slots)
            .min(last_before);
        if ttl <= req.now {
            return Err(EscrowError::DeadlinePassed {
                deadline: datum.deadline,
                now: now_ms,
            });
        }

        let built = TransactionBuilder::new(&cfg.params, *req.target_address, ChangePolicy::Separate)
            .spend_script(self.escrow_spend(req.escrow_utxo, datum, SpendIntent::ClaimAsTarget))
            .reference_input(proof.clone())
            .candidates(req.target_wallet.iter().cloned())
            .collateral(collateral)
            .required_signer(signer)
            .validity_start(req.now)
            .ttl(ttl)
            .output(TxOutput::new(*req.target_address, req.escrow_utxo.value().clone()))
            .build()?;

        let proposal = ProposedTransaction::from_built(built);
        info!(
            tx_id = %proposal.id,
            fee = proposal.fee,
            escrow = %req.escrow_utxo.input,
            "proposed target claim"
        );
        Ok(proposal)
    }

    /// Redirects the escrow to the fallback party under mediator
    /// authorization.
    pub fn propose_claim_as_fallback(
        &self,
        req: &FallbackClaimRequest<'_>,
    ) -> Result<ProposedTransaction, EscrowError> {
        let cfg = self.config;
        let datum = req.datum;
        let now_ms = cfg.slot_config().slot_to_posix(req.now);

        self.check_escrow(req.escrow_utxo, datum)?;
        let mediator = identity_proof(req.mediator_reference, &datum.mediator, req.mediator_address)?;
        let fallback = identity_proof(req.fallback_reference, &datum.fallback, req.fallback_address)?;

        if cfg.variant.fallback_requires_deadline && now_ms < datum.deadline {
            return Err(EscrowError::DeadlineNotYetReached {
                deadline: datum.deadline,
                now: now_ms,
            });
        }

        let signer = req.mediator_address.payment_key_hash()?;
        let collateral = find_collateral(req.mediator_wallet, cfg.collateral_floor)?;

        let mut references = vec![mediator.input, fallback.input];
        references.sort();
        references.dedup();
        let reference_input_index = match cfg.variant.fallback_redeemer {
            RedeemerShape::Plain => None,
            RedeemerShape::WithReferenceIndex => references
                .iter()
                .position(|r| *r == mediator.input)
                .map(|i| i as u64),
        };
        let intent = SpendIntent::ClaimAsFallback {
            reference_input_index,
        };

        let mut builder =
            TransactionBuilder::new(&cfg.params, *req.mediator_address, ChangePolicy::Separate)
                .spend_script(self.escrow_spend(req.escrow_utxo, datum, intent))
                .reference_input(mediator.clone());
        if fallback.input != mediator.input {
            builder = builder.reference_input(fallback.clone());
        }
        let built = builder
            .candidates(req.mediator_wallet.iter().cloned())
            .collateral(collateral)
            .required_signer(signer)
            .validity_start(req.now)
            .ttl(req.now.saturating_add(cfg.validity_window_slots))
            .output(TxOutput::new(*req.fallback_address, req.escrow_utxo.value().clone()))
            .build()?;

        let proposal = ProposedTransaction::from_built(built);
        info!(
            tx_id = %proposal.id,
            fee = proposal.fee,
            escrow = %req.escrow_utxo.input,
            reference_index = ?reference_input_index,
            "proposed fallback claim"
        );
        Ok(proposal)
    }

    /// Mints identity tokens under a fresh single-key native policy.
    pub fn propose_mint_identity_token(
        &self,
        req: &MintRequest<'_>,
    ) -> Result<ProposedTransaction, EscrowError> {
        let cfg = self.config;
        if req.assets.is_empty() {
            return Err(EscrowError::InvalidMint {
                reason: "no assets requested".into(),
            });
        }

        let policy = NativeScript::pubkey(req.policy_key_hash);
        let policy_id = policy.policy_id();
        let mut minted = Value::zero();
        for (name, quantity) in &req.assets {
            if *quantity == 0 || i64::try_from(*quantity).is_err() {
                return Err(EscrowError::InvalidMint {
                    reason: format!("quantity {quantity} of {name} is out of range"),
                });
            }
            if minted.quantity_of(&policy_id, name) > 0 {
                return Err(EscrowError::InvalidMint {
                    reason: format!("asset {name} listed twice"),
                });
            }
            minted = minted.with_asset(policy_id, name.clone(), *quantity);
        }

        let mut output = TxOutput::new(*req.receiver, minted);
        let min = output.min_coin(cfg.params.coins_per_utxo_byte);
        output.value.coin = if min == 0 { MINT_OUTPUT_FALLBACK_COIN } else { min };

        let mut builder = TransactionBuilder::new(&cfg.params, *req.payer, cfg.mint_change)
            .candidates(req.payer_wallet.iter().cloned())
            .output(output);
        for (name, quantity) in &req.assets {
            // Range-checked above.
            builder = builder.mint_asset(&policy, name.clone(), *quantity as i64);
        }
        if let Some(aux) = &req.metadata {
            builder = builder.auxiliary_data(aux.clone());
        }
        let built = builder.build()?;

        let proposal = ProposedTransaction::from_built(built);
        info!(
            tx_id = %proposal.id,
            fee = proposal.fee,
            policy = %policy_id,
            "proposed identity token mint"
        );
        Ok(proposal)
    }

    /// Pays `collateral_floor` of pure coin back to `owner`, creating the
    /// UTXO a later claim can pledge as collateral.
    pub fn propose_collateral(
        &self,
        owner: &Address,
        wallet: &[Utxo],
    ) -> Result<ProposedTransaction, EscrowError> {
        let cfg = self.config;
        let built = TransactionBuilder::new(&cfg.params, *owner, ChangePolicy::Separate)
            .candidates(wallet.iter().cloned())
            .output(TxOutput::new(*owner, Value::from_coin(cfg.collateral_floor)))
            .build()?;
        let proposal = ProposedTransaction::from_built(built);
        info!(tx_id = %proposal.id, fee = proposal.fee, "proposed collateral output");
        Ok(proposal)
    }

    fn escrow_spend(&self, escrow: &Utxo, datum: &ContractDatum, intent: SpendIntent) -> ScriptSpend {
        ScriptSpend {
            utxo: escrow.clone(),
            script: self.config.script.clone(),
            datum: datum.to_plutus_data(self.config.variant.datum_layout),
            redeemer: intent.to_plutus_data(),
        }
    }

    /// The escrow UTXO must sit at the validator and commit to `datum`.
    fn check_escrow(&self, escrow: &Utxo, datum: &ContractDatum) -> Result<(), EscrowError> {
        if escrow.address() != &self.config.script_address() {
            return Err(EscrowError::MalformedDatum {
                reason: format!("{} is not locked at the escrow validator", escrow.input),
            });
        }
        let expected = datum.hash(self.config.variant.datum_layout);
        if escrow.output.datum_hash != Some(expected) {
            return Err(EscrowError::MalformedDatum {
                reason: format!("{} does not commit to datum {expected}", escrow.input),
            });
        }
        Ok(())
    }
}

/// The reference UTXO, if it holds `policy` and belongs to `owner`.
fn identity_proof<'u>(
    reference: Option<&'u Utxo>,
    policy: &PolicyId,
    owner: &Address,
) -> Result<&'u Utxo, EscrowError> {
    reference
        .filter(|u| {
            u.value().holds_policy(policy)
                && u.address().payment_credential() == owner.payment_credential()
        })
        .ok_or(EscrowError::IdentityNotFound { policy: *policy })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorVariant;
    use crate::escrow::DatumLayout;
    use crate::ledger::{Credential, Network, PlutusScript, PlutusVersion};

    const ALWAYS_SUCCEEDS: &str = "4e4d01000033222220051200120011";
    const ADA: u64 = 1_000_000;

    fn config(shape: RedeemerShape, requires_deadline: bool) -> EscrowConfig {
        let script = PlutusScript::from_cbor_hex(PlutusVersion::V2, ALWAYS_SUCCEEDS).unwrap();
        let mut cfg = EscrowConfig::new(
            Network::Preprod,
            script,
            ValidatorVariant {
                datum_layout: DatumLayout::MediatorTargetFallback,
                fallback_requires_deadline: requires_deadline,
                fallback_redeemer: shape,
            },
        );
        cfg.params.cost_model_v2 = Some(vec![1; 8]);
        cfg
    }

    fn addr(b: u8) -> Address {
        Address::enterprise(0, Credential::Key(KeyHash::new([b; 28])))
    }

    fn policy(b: u8) -> PolicyId {
        PolicyId::new([b; 28])
    }

    fn utxo(tx: u8, index: u32, owner: Address, value: Value) -> Utxo {
        Utxo::new(OutputRef::new(TxId::new([tx; 32]), index), TxOutput::new(owner, value))
    }

    fn token(p: u8) -> Value {
        Value::from_coin(2 * ADA).with_asset(policy(p), AssetName::new(b"id".to_vec()).unwrap(), 1)
    }

    fn now(cfg: &EscrowConfig) -> (Slot, PosixMillis) {
        let slot = Slot(40_000_000);
        (slot, cfg.slot_config().slot_to_posix(slot))
    }

    fn datum_at(deadline: PosixMillis) -> ContractDatum {
        ContractDatum::new(policy(1), policy(2), policy(3), deadline).unwrap()
    }

    fn escrow(cfg: &EscrowConfig, datum: &ContractDatum) -> Utxo {
        Utxo::new(
            OutputRef::new(TxId::new([0xee; 32]), 0),
            TxOutput::new(cfg.script_address(), Value::from_coin(50 * ADA))
                .with_datum_hash(datum.hash(cfg.variant.datum_layout)),
        )
    }

    #[test]
    fn fund_locks_amount_with_datum_hash() {
        let cfg = config(RedeemerShape::Plain, true);
        let funder = addr(9);
        let (_, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let proposal = Assembler::new(&cfg)
            .propose_fund(&funder, &[utxo(1, 0, funder, Value::from_coin(100 * ADA))], &Value::from_coin(50 * ADA), &datum)
            .unwrap();

        let escrow_out = &proposal.body().outputs[0];
        assert_eq!(escrow_out.address, cfg.script_address());
        assert_eq!(escrow_out.value, Value::from_coin(50 * ADA));
        assert_eq!(escrow_out.datum_hash, Some(datum.hash(DatumLayout::MediatorTargetFallback)));
        assert_eq!(
            proposal.witnesses().plutus_data,
            vec![datum.to_plutus_data(DatumLayout::MediatorTargetFallback)]
        );
        assert!(proposal.body().script_data_hash.is_some());
        assert_eq!(proposal.required_keys, vec![KeyHash::new([9; 28])]);
    }

    #[test]
    fn fund_below_minimum_is_rejected() {
        let cfg = config(RedeemerShape::Plain, true);
        let funder = addr(9);
        let datum = datum_at(PosixMillis(1_800_000_000_000));
        let err = Assembler::new(&cfg)
            .propose_fund(&funder, &[utxo(1, 0, funder, Value::from_coin(100 * ADA))], &Value::from_coin(1_000), &datum)
            .unwrap_err();
        assert!(matches!(err, EscrowError::AmountBelowMinimum { provided: 1_000, .. }));
    }

    #[test]
    fn fund_uses_only_given_inputs() {
        let cfg = config(RedeemerShape::Plain, true);
        let funder = addr(9);
        let datum = datum_at(PosixMillis(1_800_000_000_000));
        let err = Assembler::new(&cfg)
            .propose_fund(&funder, &[utxo(1, 0, funder, Value::from_coin(10 * ADA))], &Value::from_coin(50 * ADA), &datum)
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds { .. }));
    }

    #[test]
    fn target_claim_validity_stays_before_deadline() {
        let cfg = config(RedeemerShape::Plain, true);
        let (slot, now_ms) = now(&cfg);
        // Deadline 10 minutes away: tighter than the two-hour window.
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 600_000));
        let target = addr(5);
        let wallet = vec![utxo(2, 0, target, Value::from_coin(20 * ADA))];
        let proof = utxo(3, 0, target, token(1));
        let escrow = escrow(&cfg, &datum);

        let proposal = Assembler::new(&cfg)
            .propose_claim_as_target(&TargetClaimRequest {
                target_address: &target,
                target_wallet: &wallet,
                identity_reference: Some(&proof),
                escrow_utxo: &escrow,
                datum: &datum,
                now: slot,
            })
            .unwrap();

        let body = proposal.body();
        assert_eq!(body.validity_start, Some(slot));
        let ttl = body.ttl.unwrap();
        assert!(ttl > slot);
        assert!(cfg.slot_config().slot_to_posix(ttl) < datum.deadline);
        assert_eq!(body.reference_inputs, vec![proof.input]);
        assert_eq!(body.required_signers, vec![KeyHash::new([5; 28])]);
        assert_eq!(body.outputs[0].address, target);
        assert_eq!(body.outputs[0].value, Value::from_coin(50 * ADA));
        let redeemer = &proposal.witnesses().redeemers[0];
        assert_eq!(redeemer.data, SpendIntent::ClaimAsTarget.to_plutus_data());
        assert_eq!(body.inputs[redeemer.index as usize], escrow.input);
    }

    #[test]
    fn target_claim_after_deadline_fails() {
        let cfg = config(RedeemerShape::Plain, true);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() - 3_600_000));
        let target = addr(5);
        let wallet = vec![utxo(2, 0, target, Value::from_coin(20 * ADA))];
        let proof = utxo(3, 0, target, token(1));
        let escrow = escrow(&cfg, &datum);
        let err = Assembler::new(&cfg)
            .propose_claim_as_target(&TargetClaimRequest {
                target_address: &target,
                target_wallet: &wallet,
                identity_reference: Some(&proof),
                escrow_utxo: &escrow,
                datum: &datum,
                now: slot,
            })
            .unwrap_err();
        assert!(matches!(err, EscrowError::DeadlinePassed { .. }));
    }

    #[test]
    fn target_claim_requires_own_identity() {
        let cfg = config(RedeemerShape::Plain, true);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let target = addr(5);
        let wallet = vec![utxo(2, 0, target, Value::from_coin(20 * ADA))];
        let escrow = escrow(&cfg, &datum);
        let someone_elses = utxo(3, 0, addr(6), token(1));
        let wrong_policy = utxo(3, 1, target, token(2));
        for reference in [None, Some(&someone_elses), Some(&wrong_policy)] {
            let err = Assembler::new(&cfg)
                .propose_claim_as_target(&TargetClaimRequest {
                    target_address: &target,
                    target_wallet: &wallet,
                    identity_reference: reference,
                    escrow_utxo: &escrow,
                    datum: &datum,
                    now: slot,
                })
                .unwrap_err();
            assert_eq!(err, EscrowError::IdentityNotFound { policy: policy(1) });
        }
    }

    #[test]
    fn target_claim_without_collateral_fails() {
        let cfg = config(RedeemerShape::Plain, true);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let target = addr(5);
        let wallet = vec![utxo(2, 0, target, Value::from_coin(2 * ADA))];
        let proof = utxo(3, 0, target, token(1));
        let escrow = escrow(&cfg, &datum);
        let err = Assembler::new(&cfg)
            .propose_claim_as_target(&TargetClaimRequest {
                target_address: &target,
                target_wallet: &wallet,
                identity_reference: Some(&proof),
                escrow_utxo: &escrow,
                datum: &datum,
                now: slot,
            })
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, EscrowError::CollateralUnavailable { .. }));
    }

    fn fallback_request<'a>(
        mediator: &'a Address,
        mediator_proof: Option<&'a Utxo>,
        fallback: &'a Address,
        fallback_proof: Option<&'a Utxo>,
        wallet: &'a [Utxo],
        escrow: &'a Utxo,
        datum: &'a ContractDatum,
        now: Slot,
    ) -> FallbackClaimRequest<'a> {
        FallbackClaimRequest {
            mediator_address: mediator,
            mediator_reference: mediator_proof,
            fallback_address: fallback,
            fallback_reference: fallback_proof,
            mediator_wallet: wallet,
            escrow_utxo: escrow,
            datum,
            now,
        }
    }

    #[test]
    fn fallback_reference_index_points_at_mediator_proof() {
        let cfg = config(RedeemerShape::WithReferenceIndex, false);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let mediator = addr(7);
        let fallback = addr(8);
        // The fallback proof sorts first, so the mediator proof lands at 1.
        let mediator_proof = utxo(0x40, 0, mediator, token(2));
        let fallback_proof = utxo(0x10, 0, fallback, token(3));
        let wallet = vec![utxo(4, 0, mediator, Value::from_coin(20 * ADA))];
        let escrow = escrow(&cfg, &datum);

        let proposal = Assembler::new(&cfg)
            .propose_claim_as_fallback(&fallback_request(
                &mediator,
                Some(&mediator_proof),
                &fallback,
                Some(&fallback_proof),
                &wallet,
                &escrow,
                &datum,
                slot,
            ))
            .unwrap();

        let body = proposal.body();
        let redeemer = SpendIntent::from_plutus_data(&proposal.witnesses().redeemers[0].data).unwrap();
        match redeemer {
            SpendIntent::ClaimAsFallback {
                reference_input_index: Some(i),
            } => assert_eq!(body.reference_inputs[i as usize], mediator_proof.input),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(body.required_signers, vec![KeyHash::new([7; 28])]);
        assert_eq!(body.outputs[0].address, fallback);
    }

    #[test]
    fn fallback_without_mediator_proof_fails() {
        let cfg = config(RedeemerShape::Plain, false);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() - 1));
        let mediator = addr(7);
        let fallback = addr(8);
        let fallback_proof = utxo(0x10, 0, fallback, token(3));
        let wallet = vec![utxo(4, 0, mediator, Value::from_coin(20 * ADA))];
        let escrow = escrow(&cfg, &datum);
        let err = Assembler::new(&cfg)
            .propose_claim_as_fallback(&fallback_request(
                &mediator,
                None,
                &fallback,
                Some(&fallback_proof),
                &wallet,
                &escrow,
                &datum,
                slot,
            ))
            .unwrap_err();
        assert_eq!(err, EscrowError::IdentityNotFound { policy: policy(2) });
    }

    #[test]
    fn deadline_gate_follows_variant() {
        let (mediator, fallback) = (addr(7), addr(8));
        let mediator_proof = utxo(0x40, 0, mediator, token(2));
        let fallback_proof = utxo(0x10, 0, fallback, token(3));
        let wallet = vec![utxo(4, 0, mediator, Value::from_coin(20 * ADA))];

        for (requires_deadline, expect_ok) in [(true, false), (false, true)] {
            let cfg = config(RedeemerShape::Plain, requires_deadline);
            let (slot, now_ms) = now(&cfg);
            let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
            let escrow = escrow(&cfg, &datum);
            let result = Assembler::new(&cfg).propose_claim_as_fallback(&fallback_request(
                &mediator,
                Some(&mediator_proof),
                &fallback,
                Some(&fallback_proof),
                &wallet,
                &escrow,
                &datum,
                slot,
            ));
            if expect_ok {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(EscrowError::DeadlineNotYetReached { .. })));
            }
        }
    }

    #[test]
    fn escrow_must_commit_to_datum() {
        let cfg = config(RedeemerShape::Plain, true);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let other = datum_at(PosixMillis(now_ms.as_millis() + 7_200_000));
        let target = addr(5);
        let wallet = vec![utxo(2, 0, target, Value::from_coin(20 * ADA))];
        let proof = utxo(3, 0, target, token(1));
        let escrow = escrow(&cfg, &other);
        let err = Assembler::new(&cfg)
            .propose_claim_as_target(&TargetClaimRequest {
                target_address: &target,
                target_wallet: &wallet,
                identity_reference: Some(&proof),
                escrow_utxo: &escrow,
                datum: &datum,
                now: slot,
            })
            .unwrap_err();
        assert!(matches!(err, EscrowError::MalformedDatum { .. }));
    }

    #[test]
    fn mint_requires_payer_and_policy_keys() {
        let cfg = config(RedeemerShape::Plain, true);
        let payer = addr(1);
        let receiver = addr(2);
        let wallet = vec![utxo(1, 0, payer, Value::from_coin(20 * ADA))];
        let metadata = AuxiliaryData::from_json(&serde_json::json!({"721": {"name": "Athena"}})).unwrap();
        let proposal = Assembler::new(&cfg)
            .propose_mint_identity_token(&MintRequest {
                payer: &payer,
                policy_key_hash: KeyHash::new([4; 28]),
                payer_wallet: &wallet,
                receiver: &receiver,
                assets: vec![(AssetName::new(b"mediator".to_vec()).unwrap(), 1)],
                metadata: Some(metadata.clone()),
            })
            .unwrap();
        assert_eq!(
            proposal.required_keys,
            vec![KeyHash::new([1; 28]), KeyHash::new([4; 28])]
        );
        let out = &proposal.body().outputs[0];
        assert_eq!(out.address, receiver);
        assert_eq!(out.value.coin, out.min_coin(cfg.params.coins_per_utxo_byte));
        assert_eq!(proposal.body().auxiliary_data_hash, Some(metadata.hash()));
        assert_eq!(proposal.auxiliary_data(), Some(&metadata));
    }

    #[test]
    fn mint_rejects_empty_and_zero_requests() {
        let cfg = config(RedeemerShape::Plain, true);
        let payer = addr(1);
        let wallet = vec![utxo(1, 0, payer, Value::from_coin(20 * ADA))];
        for assets in [vec![], vec![(AssetName::new(b"x".to_vec()).unwrap(), 0)]] {
            let err = Assembler::new(&cfg)
                .propose_mint_identity_token(&MintRequest {
                    payer: &payer,
                    policy_key_hash: KeyHash::new([4; 28]),
                    payer_wallet: &wallet,
                    receiver: &payer,
                    assets,
                    metadata: None,
                })
                .unwrap_err();
            assert!(matches!(err, EscrowError::InvalidMint { .. }));
        }
    }

    #[test]
    fn collateral_proposal_creates_pure_coin_output() {
        let cfg = config(RedeemerShape::Plain, true);
        let owner = addr(1);
        let wallet = vec![utxo(1, 0, owner, token(9).checked_add(&Value::from_coin(10 * ADA)).unwrap())];
        let proposal = Assembler::new(&cfg).propose_collateral(&owner, &wallet).unwrap();
        let produced = proposal.produced();
        assert!(find_collateral(&produced, cfg.collateral_floor).is_ok());
    }

    #[test]
    fn proposals_are_deterministic() {
        let cfg = config(RedeemerShape::WithReferenceIndex, false);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let target = addr(5);
        let wallet = vec![
            utxo(2, 0, target, Value::from_coin(20 * ADA)),
            utxo(1, 3, target, Value::from_coin(7 * ADA)),
        ];
        let proof = utxo(3, 0, target, token(1));
        let escrow = escrow(&cfg, &datum);
        let build = |wallet: &[Utxo]| {
            Assembler::new(&cfg)
                .propose_claim_as_target(&TargetClaimRequest {
                    target_address: &target,
                    target_wallet: wallet,
                    identity_reference: Some(&proof),
                    escrow_utxo: &escrow,
                    datum: &datum,
                    now: slot,
                })
                .unwrap()
                .transaction
                .to_cbor()
        };
        let mut reversed = wallet.clone();
        reversed.reverse();
        assert_eq!(build(&wallet), build(&reversed));
    }

    #[test]
    fn fund_proposal_ignores_input_order() {
        let cfg = config(RedeemerShape::Plain, true);
        let funder = addr(9);
        let (_, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let funding = vec![
            utxo(6, 1, funder, Value::from_coin(30 * ADA)),
            utxo(2, 0, funder, Value::from_coin(25 * ADA)),
            utxo(6, 0, funder, Value::from_coin(12 * ADA)),
        ];
        let build = |funding: &[Utxo]| {
            Assembler::new(&cfg)
                .propose_fund(&funder, funding, &Value::from_coin(50 * ADA), &datum)
                .unwrap()
                .transaction
                .to_cbor()
        };
        let rotated = vec![funding[2].clone(), funding[0].clone(), funding[1].clone()];
        let mut reversed = funding.clone();
        reversed.reverse();
        assert_eq!(build(&funding), build(&rotated));
        assert_eq!(build(&funding), build(&reversed));
    }

    #[test]
    fn fallback_proposal_ignores_wallet_order() {
        let cfg = config(RedeemerShape::WithReferenceIndex, false);
        let (slot, now_ms) = now(&cfg);
        let datum = datum_at(PosixMillis(now_ms.as_millis() + 3_600_000));
        let mediator = addr(7);
        let fallback = addr(8);
        let mediator_proof = utxo(0x40, 0, mediator, token(2));
        let fallback_proof = utxo(0x10, 0, fallback, token(3));
        let wallet = vec![
            utxo(4, 2, mediator, Value::from_coin(9 * ADA)),
            utxo(3, 0, mediator, Value::from_coin(20 * ADA)),
            utxo(4, 0, mediator, Value::from_coin(6 * ADA)),
        ];
        let escrow = escrow(&cfg, &datum);
        let build = |wallet: &[Utxo]| {
            Assembler::new(&cfg)
                .propose_claim_as_fallback(&fallback_request(
                    &mediator,
                    Some(&mediator_proof),
                    &fallback,
                    Some(&fallback_proof),
                    wallet,
                    &escrow,
                    &datum,
                    slot,
                ))
                .unwrap()
                .transaction
                .to_cbor()
        };
        let rotated = vec![wallet[1].clone(), wallet[2].clone(), wallet[0].clone()];
        let mut reversed = wallet.clone();
        reversed.reverse();
        assert_eq!(build(&wallet), build(&rotated));
        assert_eq!(build(&wallet), build(&reversed));
    }
}
