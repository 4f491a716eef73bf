//! Integration tests for the escrow desk.
//!
//! These drive the full lifecycle through [`EscrowDesk`] over the in-memory
//! ledger: funding, observation, both claim paths, caller authentication,
//! and the race between two claims on the same escrow.

use athena_contracts::{ContractError, EscrowDesk, EscrowState, FundingRecord, FundingStatus};
use athena_protocol::auth::{message_body, sign_message, AuthFailure, CredentialMode};
use athena_protocol::chain::{AwaitPolicy, ChainBackend, Confirmation, InMemoryLedger};
use athena_protocol::config::{ValidatorVariant, AUTH_MESSAGE_PREFIX};
use athena_protocol::crypto::PaymentKey;
use athena_protocol::escrow::{DatumLayout, RedeemerShape};
use athena_protocol::ledger::{
    Address, AnyAddress, AssetName, Credential, Network, PlutusScript, PlutusVersion, PolicyId,
    PosixMillis, Slot, Value,
};
use athena_protocol::{sign_transaction, ContractDatum, EscrowConfig, EscrowError, SpendIntent};

const ALWAYS_SUCCEEDS: &str = "4e4d01000033222220051200120011";
const ADA: u64 = 1_000_000;
const START: Slot = Slot(40_000_000);

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Party {
    key: PaymentKey,
    address: Address,
}

impl Party {
    fn new(seed: u8) -> Self {
        let key = PaymentKey::from_seed(&[seed; 32]);
        let address = Address::enterprise(0, Credential::Key(key.key_hash()));
        Self { key, address }
    }
}

fn config(fallback_requires_deadline: bool) -> EscrowConfig {
    let script = PlutusScript::from_cbor_hex(PlutusVersion::V2, ALWAYS_SUCCEEDS).unwrap();
    let mut config = EscrowConfig::new(
        Network::Preprod,
        script,
        ValidatorVariant {
            datum_layout: DatumLayout::MediatorTargetFallback,
            fallback_requires_deadline,
            fallback_redeemer: RedeemerShape::WithReferenceIndex,
        },
    );
    config.params.cost_model_v2 = Some(vec![1; 16]);
    config
}

fn identity(policy_byte: u8) -> Value {
    Value::from_coin(2 * ADA).with_asset(
        PolicyId::new([policy_byte; 28]),
        AssetName::new(b"identity".to_vec()).unwrap(),
        1,
    )
}

struct Parties {
    funder: Party,
    target: Party,
    mediator: Party,
    fallback: Party,
}

fn desk(fallback_requires_deadline: bool) -> (EscrowDesk<InMemoryLedger>, Parties) {
    let ledger = InMemoryLedger::new(START);
    let parties = Parties {
        funder: Party::new(1),
        target: Party::new(2),
        mediator: Party::new(3),
        fallback: Party::new(4),
    };

    ledger.fund(parties.funder.address, Value::from_coin(100 * ADA));
    ledger.fund(parties.target.address, Value::from_coin(20 * ADA));
    ledger.fund(parties.mediator.address, Value::from_coin(20 * ADA));
    ledger.fund(parties.target.address, identity(0xa1));
    ledger.fund(parties.mediator.address, identity(0xa2));
    ledger.fund(parties.fallback.address, identity(0xa3));

    (EscrowDesk::new(config(fallback_requires_deadline), ledger), parties)
}

fn datum(desk: &EscrowDesk<InMemoryLedger>, deadline_offset_ms: i64) -> ContractDatum {
    let now = desk.config().slot_config().slot_to_posix(START).as_millis() as i64;
    ContractDatum::new(
        PolicyId::new([0xa1; 28]),
        PolicyId::new([0xa2; 28]),
        PolicyId::new([0xa3; 28]),
        PosixMillis((now + deadline_offset_ms) as u64),
    )
    .unwrap()
}

fn amount() -> Value {
    Value::from_coin(50 * ADA)
}

async fn funded(desk: &EscrowDesk<InMemoryLedger>, parties: &Parties, datum: &ContractDatum) {
    let (proposal, _) = desk
        .request_funding(&parties.funder.address, &amount(), datum)
        .await
        .unwrap();
    let signed = sign_transaction(&proposal, &[&parties.funder.key]).unwrap();
    desk.submit(&signed).await.unwrap();
}

// ---------------------------------------------------------------------------
// Funding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn funding_moves_escrow_from_unfunded_to_funded() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);
    assert_eq!(desk.observe(&d, &amount()).await.unwrap().state(), &EscrowState::Unfunded);

    let (proposal, intent) = desk
        .request_funding(&parties.funder.address, &amount(), &d)
        .await
        .unwrap();
    assert_eq!(intent.proposed_tx_id, proposal.id);
    assert_eq!(intent.datum_hash, d.hash(DatumLayout::MediatorTargetFallback));
    assert_eq!(intent.parties.target, d.target);

    let mut record = FundingRecord::from_intent(intent);
    let signed = sign_transaction(&proposal, &[&parties.funder.key]).unwrap();
    let confirmation = desk
        .submit_and_confirm(&signed, AwaitPolicy::default())
        .await
        .unwrap();
    assert!(matches!(confirmation, Confirmation::Confirmed { .. }));
    record.advance(FundingStatus::Submitted).unwrap();
    record.advance(FundingStatus::OnChain).unwrap();

    match desk.observe(&d, &amount()).await.unwrap().state() {
        EscrowState::Funded { utxo } => {
            assert_eq!(utxo.value(), &amount());
            assert_eq!(utxo.input.tx_id, proposal.id);
        }
        other => panic!("expected funded escrow, got {other}"),
    }
}

#[tokio::test]
async fn funding_twice_is_refused() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);
    funded(&desk, &parties, &d).await;

    let err = desk
        .request_funding(&parties.funder.address, &amount(), &d)
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::InvalidTransition { attempted: "fund", .. }));
}

#[tokio::test]
async fn funding_beyond_wallet_reports_shortfall() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);

    let err = desk
        .request_funding(&parties.funder.address, &Value::from_coin(500 * ADA), &d)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ContractError::Escrow(EscrowError::InsufficientFunds { .. })
    ));
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[tokio::test]
async fn target_claims_before_deadline() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);
    funded(&desk, &parties, &d).await;
    let mut machine = desk.observe(&d, &amount()).await.unwrap();

    let proposal = desk
        .request_target_claim(&parties.target.address, &d, &amount())
        .await
        .unwrap();
    let signed = sign_transaction(&proposal, &[&parties.target.key]).unwrap();
    let tx_id = desk.submit(&signed).await.unwrap();

    // A spent escrow looks unfunded to observation; the caller records the
    // settlement it watched confirm.
    assert_eq!(desk.observe(&d, &amount()).await.unwrap().state(), &EscrowState::Unfunded);
    machine.confirm_settlement(&SpendIntent::ClaimAsTarget, tx_id).unwrap();
    assert_eq!(machine.state(), &EscrowState::SettledToTarget { tx_id });
    assert!(machine.state().is_terminal());
    assert!(machine.confirm_settlement(&SpendIntent::ClaimAsTarget, tx_id).is_err());

    let paid = desk.chain().list_utxos(&parties.target.address).await.unwrap();
    assert!(paid.iter().any(|u| u.value() == &amount()));
}

#[tokio::test]
async fn target_claim_after_deadline_is_refused() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 60_000);
    funded(&desk, &parties, &d).await;
    desk.chain().advance(120);

    let err = desk
        .request_target_claim(&parties.target.address, &d, &amount())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ContractError::Escrow(EscrowError::DeadlinePassed { .. })
    ));
}

#[tokio::test]
async fn claim_against_unfunded_escrow_is_invalid() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);

    let err = desk
        .request_target_claim(&parties.target.address, &d, &amount())
        .await
        .unwrap_err();
    assert!(matches!(err, ContractError::InvalidTransition { .. }));
}

#[tokio::test]
async fn fallback_settles_under_mediator_authority() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);
    funded(&desk, &parties, &d).await;

    let proposal = desk
        .request_fallback_claim(&parties.mediator.address, &parties.fallback.address, &d, &amount())
        .await
        .unwrap();
    let signed = sign_transaction(&proposal, &[&parties.mediator.key]).unwrap();
    desk.submit(&signed).await.unwrap();

    let paid = desk.chain().list_utxos(&parties.fallback.address).await.unwrap();
    assert!(paid.iter().any(|u| u.value() == &amount()));
}

#[tokio::test]
async fn fallback_waits_for_deadline_when_variant_requires_it() {
    let (desk, parties) = desk(true);
    let d = datum(&desk, 60_000);
    funded(&desk, &parties, &d).await;

    let early = desk
        .request_fallback_claim(&parties.mediator.address, &parties.fallback.address, &d, &amount())
        .await
        .unwrap_err();
    assert!(matches!(
        early,
        ContractError::Escrow(EscrowError::DeadlineNotYetReached { .. })
    ));

    desk.chain().advance(120);
    desk.request_fallback_claim(&parties.mediator.address, &parties.fallback.address, &d, &amount())
        .await
        .unwrap();
}

#[tokio::test]
async fn fallback_without_mediator_token_is_refused() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);
    funded(&desk, &parties, &d).await;

    // The funder holds no mediator identity token.
    let err = desk
        .request_fallback_claim(&parties.funder.address, &parties.fallback.address, &d, &amount())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ContractError::Escrow(EscrowError::IdentityNotFound { .. })
    ));
}

#[tokio::test]
async fn racing_claims_leave_one_stale() {
    let (desk, parties) = desk(false);
    let d = datum(&desk, 3_600_000);
    funded(&desk, &parties, &d).await;

    let target_claim = desk
        .request_target_claim(&parties.target.address, &d, &amount())
        .await
        .unwrap();
    let fallback_claim = desk
        .request_fallback_claim(&parties.mediator.address, &parties.fallback.address, &d, &amount())
        .await
        .unwrap();

    let first = sign_transaction(&target_claim, &[&parties.target.key]).unwrap();
    let second = sign_transaction(&fallback_claim, &[&parties.mediator.key]).unwrap();
    desk.submit(&first).await.unwrap();

    let err = desk.submit(&second).await.unwrap_err();
    assert!(matches!(err, ContractError::Escrow(EscrowError::StaleInput { .. })));
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authenticates_fresh_message_from_claimed_address() {
    let (desk, parties) = desk(false);
    let claimed = AnyAddress::Payment(parties.target.address);
    let signed = sign_message(
        &parties.target.key,
        &claimed,
        message_body(AUTH_MESSAGE_PREFIX, 1_760_000_000).as_bytes(),
    );

    let verified = desk
        .authenticate(&signed, &claimed, None, 1_760_000_030)
        .unwrap();
    assert_eq!(verified.signer, parties.target.key.key_hash());
    assert_eq!(verified.timestamp, 1_760_000_000);

    let stale = desk
        .authenticate(&signed, &claimed, Some(CredentialMode::Stake), 1_760_100_000)
        .unwrap_err();
    assert_eq!(stale, ContractError::Escrow(EscrowError::Auth(AuthFailure::Stale)));
}

#[tokio::test]
async fn rejects_message_signed_for_another_address() {
    let (desk, parties) = desk(false);
    let signer = AnyAddress::Payment(parties.mediator.address);
    let signed = sign_message(
        &parties.mediator.key,
        &signer,
        message_body(AUTH_MESSAGE_PREFIX, 1_760_000_000).as_bytes(),
    );

    let err = desk
        .authenticate(&signed, &AnyAddress::Payment(parties.target.address), None, 1_760_000_000)
        .unwrap_err();
    assert_eq!(
        err,
        ContractError::Escrow(EscrowError::Auth(AuthFailure::CredentialMismatch))
    );
}
