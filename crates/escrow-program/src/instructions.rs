//! The escrow program's instruction handlers: account bootstrap, funding,
//! withdrawal, atomic offline-payment settlement, and fraud reporting, plus
//! an always-rejecting `migrate_escrow` stub for the legacy account layout.

use crate::errors::{ProgramError, ProgramResult};
use crate::events::Event;
use crate::ledger::Ledger;
use crate::state::{
    BundleHistoryEntry, EscrowAccount, EscrowAccountV0, FraudRecord, FraudReason, NonceRegistry,
    derive_escrow_address,
};
use crate::verifier_key::VerifierKey;
use offline_pay_types::attestation::{BundleSummary, Role, attestation_root};
use offline_pay_types::{AttestationProof, EpochMillis, OfflineBundle, PublicKey};

/// Maximum age of an attestation proof accepted for on-chain replay. Kept
/// generous (24h) relative to the attestation service's own 5-minute
/// freshness bound, since a bundle may sit queued on-device for a while
/// before it ever reaches a settlement broadcast.
pub const MAX_ATTESTATION_AGE_MS: i64 = 24 * 60 * 60 * 1000;

pub fn initialize_nonce_registry(ledger: &mut dyn Ledger, owner: PublicKey) -> ProgramResult<Event> {
    if ledger.get_nonce_registry(&owner).is_some() {
        return Ok(Event::NonceRegistryInitialized { owner });
    }
    ledger.put_nonce_registry(NonceRegistry::new(owner));
    Ok(Event::NonceRegistryInitialized { owner })
}

pub fn initialize_escrow(
    ledger: &mut dyn Ledger,
    owner: PublicKey,
    escrow_token_account: [u8; 32],
    initial_amount: u64,
    owner_token_account: [u8; 32],
    now: EpochMillis,
) -> ProgramResult<Event> {
    if ledger.get_escrow(&owner).is_some() {
        return Err(ProgramError::EscrowAlreadyExists);
    }
    let bump = derive_escrow_address(&owner).bump;
    ledger.transfer_tokens(owner_token_account, escrow_token_account, initial_amount)?;
    let mut account = EscrowAccount::new(owner, escrow_token_account, bump, now);
    account.escrow_balance = initial_amount;
    ledger.put_escrow(account);
    Ok(Event::EscrowInitialized {
        owner,
        initial_amount,
    })
}

pub fn fund_escrow(
    ledger: &mut dyn Ledger,
    owner: PublicKey,
    owner_token_account: [u8; 32],
    amount: u64,
) -> ProgramResult<Event> {
    let mut account = ledger.get_escrow(&owner).ok_or(ProgramError::EscrowNotFound)?;
    ledger.transfer_tokens(owner_token_account, account.escrow_token_account, amount)?;
    account.escrow_balance = account
        .escrow_balance
        .checked_add(amount)
        .ok_or(ProgramError::Overflow)?;
    let new_balance = account.escrow_balance;
    ledger.put_escrow(account);
    Ok(Event::EscrowFunded {
        owner,
        amount,
        new_balance,
    })
}

pub fn withdraw_escrow(
    ledger: &mut dyn Ledger,
    owner: PublicKey,
    owner_token_account: [u8; 32],
    amount: u64,
) -> ProgramResult<Event> {
    let mut account = ledger.get_escrow(&owner).ok_or(ProgramError::EscrowNotFound)?;
    let new_balance = account
        .escrow_balance
        .checked_sub(amount)
        .ok_or(ProgramError::InsufficientFunds)?;
    ledger.transfer_tokens(account.escrow_token_account, owner_token_account, amount)?;
    account.escrow_balance = new_balance;
    ledger.put_escrow(account);
    Ok(Event::EscrowWithdrawn {
        owner,
        amount,
        new_balance,
    })
}

/// Arguments to `settle_offline_payment`. The bundle's own `tx_id` doubles
/// as the `bundle_id` used for length validation and attestation root
/// recomputation (see DESIGN.md).
pub struct SettleOfflinePaymentArgs {
    pub bundle: OfflineBundle,
    pub merchant_token_account: [u8; 32],
    pub payer_proof: AttestationProof,
    pub payer_attestation_nonce: [u8; 32],
    pub payer_attestation_timestamp: EpochMillis,
    pub merchant_proof: Option<AttestationProof>,
    pub merchant_attestation_nonce: Option<[u8; 32]>,
    pub merchant_attestation_timestamp: Option<EpochMillis>,
}

pub fn settle_offline_payment(
    ledger: &mut dyn Ledger,
    verifier_key: &VerifierKey,
    now: EpochMillis,
    args: SettleOfflinePaymentArgs,
) -> ProgramResult<[Event; 2]> {
    let bundle_id = &args.bundle.tx_id;

    // 1. bundle_id length in [1, 128]
    if bundle_id.is_empty() || bundle_id.len() > 128 {
        return Err(ProgramError::InvalidBundleId);
    }

    // 2. payer_proof.timestamp within MAX_ATTESTATION_AGE of current ledger time
    if !args.payer_proof.timestamp.within_age_of(now, MAX_ATTESTATION_AGE_MS) {
        return Err(ProgramError::InvalidAttestation);
    }

    let summary = BundleSummary {
        payer: args.bundle.payer_pubkey,
        merchant: args.bundle.merchant_pubkey,
        amount: args.bundle.token.amount,
        bundle_nonce: args.bundle.nonce,
    };

    // 3. recompute attestation_root, must equal payer_proof.root
    let expected_payer_root = attestation_root(
        bundle_id,
        &summary,
        Role::Payer,
        args.payer_attestation_nonce,
        args.payer_attestation_timestamp,
    );
    if expected_payer_root != args.payer_proof.root {
        return Err(ProgramError::InvalidAttestation);
    }

    // 4. Ed25519-verify payer_proof.signature over payer_proof.root
    if !verifier_key.verify(&args.payer_proof) {
        return Err(ProgramError::InvalidAttestation);
    }

    // Same for merchant_proof if present (checks 2-4 repeated for the second role).
    if let Some(merchant_proof) = &args.merchant_proof {
        if !merchant_proof.timestamp.within_age_of(now, MAX_ATTESTATION_AGE_MS) {
            return Err(ProgramError::InvalidAttestation);
        }
        let merchant_nonce = args
            .merchant_attestation_nonce
            .ok_or(ProgramError::InvalidAttestation)?;
        let merchant_timestamp = args
            .merchant_attestation_timestamp
            .ok_or(ProgramError::InvalidAttestation)?;
        let expected_merchant_root = attestation_root(
            bundle_id,
            &summary,
            Role::Merchant,
            merchant_nonce,
            merchant_timestamp,
        );
        if expected_merchant_root != merchant_proof.root {
            return Err(ProgramError::InvalidAttestation);
        }
        if !verifier_key.verify(merchant_proof) {
            return Err(ProgramError::InvalidAttestation);
        }
    }

    let mut nonce_registry = ledger
        .get_nonce_registry(&args.bundle.payer_pubkey)
        .ok_or(ProgramError::NonceRegistryNotFound)?;
    let mut escrow = ledger
        .get_escrow(&args.bundle.payer_pubkey)
        .ok_or(ProgramError::EscrowNotFound)?;

    // 5. recompute bundle_hash; must not appear in recent_bundle_hashes
    let bundle_hash = args.bundle.bundle_hash();
    if nonce_registry.has_seen_hash(&bundle_hash) {
        return Err(ProgramError::DuplicateBundle);
    }

    // 6. nonce must exceed both the registry's and the escrow's last-settled nonce
    let payer_nonce = args.bundle.nonce;
    if payer_nonce <= nonce_registry.last_nonce || payer_nonce <= escrow.last_nonce {
        return Err(ProgramError::InvalidNonce);
    }

    // 7. amount bounds
    let amount = args.bundle.token.amount;
    if amount == 0 {
        return Err(ProgramError::InvalidAmount);
    }
    if amount > escrow.escrow_balance {
        return Err(ProgramError::InsufficientFunds);
    }

    // 8. transfer amount from escrow token account to merchant token account
    ledger.transfer_tokens(escrow.escrow_token_account, args.merchant_token_account, amount)?;

    // 9. state updates, all checked
    escrow.escrow_balance = escrow
        .escrow_balance
        .checked_sub(amount)
        .ok_or(ProgramError::Underflow)?;
    escrow.total_spent = escrow
        .total_spent
        .checked_add(amount)
        .ok_or(ProgramError::Overflow)?;
    escrow.last_nonce = payer_nonce;
    nonce_registry.last_nonce = payer_nonce;
    nonce_registry.recent_bundle_hashes.push(bundle_hash);
    nonce_registry.bundle_history.push(BundleHistoryEntry {
        bundle_hash,
        merchant: args.bundle.merchant_pubkey,
        amount,
        settled_at: now,
        nonce: payer_nonce,
    });

    ledger.put_escrow(escrow);
    ledger.put_nonce_registry(nonce_registry);

    Ok([
        Event::PaymentSettled {
            payer: args.bundle.payer_pubkey,
            merchant: args.bundle.merchant_pubkey,
            amount,
            nonce: payer_nonce,
            bundle_id: bundle_id.clone(),
        },
        Event::BundleHistoryRecorded {
            payer: args.bundle.payer_pubkey,
            bundle_hash,
            nonce: payer_nonce,
            settled_at: now,
        },
    ])
}

pub fn report_fraudulent_bundle(
    ledger: &mut dyn Ledger,
    reporter: PublicKey,
    payer: PublicKey,
    bundle_hash: [u8; 32],
    conflicting_hash: [u8; 32],
    reason: FraudReason,
    now: EpochMillis,
) -> ProgramResult<Event> {
    let mut registry = ledger
        .get_nonce_registry(&payer)
        .ok_or(ProgramError::NonceRegistryNotFound)?;

    // A hash that already cleared settlement legitimately can't also be fraud evidence.
    let already_settled = registry
        .bundle_history
        .iter()
        .any(|entry| entry.bundle_hash == bundle_hash || entry.bundle_hash == conflicting_hash);
    if already_settled {
        return Err(ProgramError::FraudEvidenceExists);
    }
    if registry
        .fraud_records
        .contains(|record| record.bundle_hash == bundle_hash && record.conflicting_hash == conflicting_hash)
    {
        return Err(ProgramError::FraudHashMatches);
    }

    registry.fraud_records.push(FraudRecord {
        bundle_hash,
        conflicting_hash,
        reporter,
        reported_at: now,
        reason,
    });
    ledger.put_nonce_registry(registry);
    Ok(Event::FraudReported {
        payer,
        bundle_hash,
        conflicting_hash,
    })
}

/// Legacy accounts are never migrated automatically; an operator must
/// submit an explicit migration path, which this program does not yet
/// implement (see DESIGN.md).
pub fn migrate_escrow(_legacy: &EscrowAccountV0) -> ProgramResult<()> {
    Err(ProgramError::MigrationRequired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use ed25519_dalek::{Signer, SigningKey};
    use offline_pay_types::{Signature, Token};
    use rand::rngs::OsRng;

    struct Fixture {
        ledger: InMemoryLedger,
        verifier_signing_key: SigningKey,
        verifier_key: VerifierKey,
        payer: PublicKey,
        merchant: PublicKey,
        owner_token_account: [u8; 32],
        escrow_token_account: [u8; 32],
        merchant_token_account: [u8; 32],
    }

    fn setup(initial_amount: u64) -> Fixture {
        let mut rng = OsRng;
        let verifier_signing_key = SigningKey::generate(&mut rng);
        let verifier_key = VerifierKey(verifier_signing_key.verifying_key().to_bytes());

        let payer = PublicKey([1u8; 32]);
        let merchant = PublicKey([2u8; 32]);
        let owner_token_account = [10u8; 32];
        let escrow_token_account = [11u8; 32];
        let merchant_token_account = [12u8; 32];

        let mut ledger = InMemoryLedger::new();
        ledger.credit_token_account(owner_token_account, initial_amount);
        initialize_nonce_registry(&mut ledger, payer).unwrap();
        initialize_escrow(
            &mut ledger,
            payer,
            escrow_token_account,
            initial_amount,
            owner_token_account,
            EpochMillis(0),
        )
        .unwrap();

        Fixture {
            ledger,
            verifier_signing_key,
            verifier_key,
            payer,
            merchant,
            owner_token_account,
            escrow_token_account,
            merchant_token_account,
        }
    }

    fn signed_bundle_args(fx: &Fixture, nonce: u64, amount: u64, now: EpochMillis) -> SettleOfflinePaymentArgs {
        let bundle = OfflineBundle {
            tx_id: format!("tx-{nonce}"),
            payer_pubkey: fx.payer,
            merchant_pubkey: fx.merchant,
            token: Token {
                mint: [3u8; 32],
                amount,
                symbol: "USDC".into(),
            },
            nonce,
            timestamp: now,
            payer_signature: None,
            merchant_signature: None,
        };
        let summary = BundleSummary {
            payer: bundle.payer_pubkey,
            merchant: bundle.merchant_pubkey,
            amount: bundle.token.amount,
            bundle_nonce: bundle.nonce,
        };
        let attestation_nonce = [9u8; 32];
        let root = attestation_root(&bundle.tx_id, &summary, Role::Payer, attestation_nonce, now);
        let signature = fx.verifier_signing_key.sign(&root);
        let proof = AttestationProof {
            root,
            nonce: attestation_nonce,
            timestamp: now,
            signature: Signature(signature.to_bytes()),
        };
        SettleOfflinePaymentArgs {
            bundle,
            merchant_token_account: fx.merchant_token_account,
            payer_proof: proof,
            payer_attestation_nonce: attestation_nonce,
            payer_attestation_timestamp: now,
            merchant_proof: None,
            merchant_attestation_nonce: None,
            merchant_attestation_timestamp: None,
        }
    }

    #[test]
    fn happy_path_settles_and_moves_balance() {
        let mut fx = setup(1_000);
        let args = signed_bundle_args(&fx, 1, 400, EpochMillis(0));
        let events = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), args).unwrap();
        assert!(matches!(events[0], Event::PaymentSettled { amount: 400, .. }));
        assert_eq!(fx.ledger.token_balance(fx.merchant_token_account), 400);
        let escrow = fx.ledger.get_escrow(&fx.payer).unwrap();
        assert_eq!(escrow.escrow_balance, 600);
        assert_eq!(escrow.last_nonce, 1);
    }

    #[test]
    fn replaying_the_same_bundle_is_rejected_as_duplicate() {
        let mut fx = setup(1_000);
        let args = signed_bundle_args(&fx, 1, 400, EpochMillis(0));
        settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), args).unwrap();

        // Resubmitting the identical bundle hits the duplicate-hash ring
        // before the nonce check ever runs.
        let replay_args = signed_bundle_args(&fx, 1, 400, EpochMillis(0));
        let result = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), replay_args);
        assert_eq!(result, Err(ProgramError::DuplicateBundle));
    }

    #[test]
    fn out_of_order_nonce_is_rejected() {
        let mut fx = setup(1_000);
        let first = signed_bundle_args(&fx, 5, 100, EpochMillis(0));
        settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), first).unwrap();

        let stale = signed_bundle_args(&fx, 3, 100, EpochMillis(0));
        let result = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), stale);
        assert_eq!(result, Err(ProgramError::InvalidNonce));
    }

    #[test]
    fn tampered_attestation_signature_is_rejected() {
        let mut fx = setup(1_000);
        let mut args = signed_bundle_args(&fx, 1, 100, EpochMillis(0));
        let mut sig_bytes = *args.payer_proof.signature.as_bytes();
        sig_bytes[0] ^= 0xFF;
        args.payer_proof.signature = Signature(sig_bytes);
        let result = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), args);
        assert_eq!(result, Err(ProgramError::InvalidAttestation));
    }

    #[test]
    fn amount_exceeding_balance_is_rejected() {
        let mut fx = setup(100);
        let args = signed_bundle_args(&fx, 1, 101, EpochMillis(0));
        let result = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), args);
        assert_eq!(result, Err(ProgramError::InsufficientFunds));
    }

    #[test]
    fn amount_exactly_at_balance_settles() {
        let mut fx = setup(100);
        let args = signed_bundle_args(&fx, 1, 100, EpochMillis(0));
        let result = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), args);
        assert!(result.is_ok());
    }

    #[test]
    fn stale_attestation_beyond_max_age_is_rejected() {
        let mut fx = setup(1_000);
        let args = signed_bundle_args(&fx, 1, 100, EpochMillis(0));
        let now = EpochMillis(MAX_ATTESTATION_AGE_MS + 1);
        let result = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, now, args);
        assert_eq!(result, Err(ProgramError::InvalidAttestation));
    }

    #[test]
    fn fraud_report_against_settled_history_is_rejected() {
        let mut fx = setup(1_000);
        let args = signed_bundle_args(&fx, 1, 100, EpochMillis(0));
        settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), args).unwrap();
        let registry = fx.ledger.get_nonce_registry(&fx.payer).unwrap();
        let settled_hash = registry.bundle_history.iter().next().unwrap().bundle_hash;

        let result = report_fraudulent_bundle(
            &mut fx.ledger,
            fx.merchant,
            fx.payer,
            settled_hash,
            [0u8; 32],
            FraudReason::DuplicateBundle,
            EpochMillis(1),
        );
        assert_eq!(result, Err(ProgramError::FraudEvidenceExists));
    }

    #[test]
    fn fraud_report_against_unsettled_hash_succeeds() {
        let mut fx = setup(1_000);
        let result = report_fraudulent_bundle(
            &mut fx.ledger,
            fx.merchant,
            fx.payer,
            [4u8; 32],
            [5u8; 32],
            FraudReason::InvalidAttestation,
            EpochMillis(1),
        );
        assert!(matches!(result, Ok(Event::FraudReported { .. })));
    }

    #[test]
    fn migrate_escrow_always_rejects() {
        let legacy = EscrowAccountV0 {
            owner: PublicKey([1u8; 32]),
            escrow_balance: 10,
            last_nonce: 0,
        };
        assert_eq!(migrate_escrow(&legacy), Err(ProgramError::MigrationRequired));
    }

    #[test]
    fn bundle_id_over_length_limit_is_rejected() {
        let mut fx = setup(1_000);
        let mut args = signed_bundle_args(&fx, 1, 100, EpochMillis(0));
        args.bundle.tx_id = "x".repeat(129);
        let result = settle_offline_payment(&mut fx.ledger, &fx.verifier_key, EpochMillis(0), args);
        assert_eq!(result, Err(ProgramError::InvalidBundleId));
    }

    #[test]
    fn withdraw_then_fund_round_trips_balance() {
        let mut fx = setup(1_000);
        withdraw_escrow(&mut fx.ledger, fx.payer, fx.owner_token_account, 200).unwrap();
        assert_eq!(fx.ledger.get_escrow(&fx.payer).unwrap().escrow_balance, 800);
        fund_escrow(&mut fx.ledger, fx.payer, fx.owner_token_account, 200).unwrap();
        assert_eq!(fx.ledger.get_escrow(&fx.payer).unwrap().escrow_balance, 1_000);
    }

    #[test]
    fn initializing_escrow_twice_is_rejected() {
        let mut fx = setup(500);
        let result = initialize_escrow(
            &mut fx.ledger,
            fx.payer,
            fx.escrow_token_account,
            100,
            fx.owner_token_account,
            EpochMillis(0),
        );
        assert_eq!(result, Err(ProgramError::EscrowAlreadyExists));
    }
}
