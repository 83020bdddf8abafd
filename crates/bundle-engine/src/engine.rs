//! The device-side `BundleEngine`: constructs, signs, persists, and replays
//! bundles, driving the local state machine of spec §4.1. A single instance
//! owns one device's signer and bundle store; it is not `Clone` — callers
//! share it behind whatever synchronization their host runtime prefers (the
//! settlement worker wraps it in a `tokio::sync::Mutex`).

use offline_pay_types::attestation::{AttestationEnvelope, Role};
use offline_pay_types::{EpochMillis, OfflineBundle, PublicKey, Token};

use crate::diagnostics::{DiagnosticsSender, EngineEvent};
use crate::errors::{EngineError, EngineResult};
use crate::retry;
use crate::signer::{self, Signer};
use crate::state::{self, BundleState};
use crate::store::{BundleRecord, BundleStore};

/// One entry pulled off the `QUEUED` FIFO by `take_next_ready`, carrying
/// everything the settlement worker needs to attempt a broadcast without a
/// second store round-trip.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub bundle_id: String,
    pub bundle: OfflineBundle,
    pub payer_envelope: Option<AttestationEnvelope>,
    pub merchant_envelope: Option<AttestationEnvelope>,
    pub retry_count: u32,
}

pub struct BundleEngine<S: Signer> {
    signer: S,
    store: Box<dyn BundleStore>,
    diagnostics: DiagnosticsSender,
    retry_budget: u32,
    last_nonce: u64,
    last_timestamp: EpochMillis,
}

impl<S: Signer> BundleEngine<S> {
    pub fn new(signer: S, store: Box<dyn BundleStore>, diagnostics: DiagnosticsSender) -> Self {
        Self {
            signer,
            store,
            diagnostics,
            retry_budget: retry::DEFAULT_RETRY_BUDGET,
            last_nonce: 0,
            last_timestamp: EpochMillis(0),
        }
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Resumes nonce/clock state from a prior session. A real host calls
    /// this once at startup with the highest nonce it has ever issued for
    /// this payer (e.g. scanned from its own settlement history), since the
    /// in-memory `BundleStore` reference implementation keeps no such index
    /// across process restarts on its own.
    pub fn resume_from(&mut self, last_nonce: u64, last_timestamp: EpochMillis) {
        self.last_nonce = last_nonce;
        self.last_timestamp = last_timestamp;
    }

    pub fn public_key(&self) -> PublicKey {
        self.signer.public_key()
    }

    fn now(&self) -> EngineResult<EpochMillis> {
        EpochMillis::try_now().map_err(|_| EngineError::SignerUnavailable)
    }

    /// Loads the persisted record for `bundle_id`. `pub(crate)` so the
    /// settlement worker and tests elsewhere in this crate can inspect state
    /// without duplicating store access.
    pub(crate) fn load(&self, bundle_id: &str) -> EngineResult<BundleRecord> {
        self.store
            .get(bundle_id)
            .ok_or_else(|| EngineError::BundleNotFound(bundle_id.to_string()))
    }

    fn transition(&mut self, record: &mut BundleRecord, to: BundleState) -> EngineResult<()> {
        if !state::can_transition(record.state, to) {
            let (from, to) = state::transition_label(record.state, to);
            return Err(EngineError::InvalidTransition { from, to });
        }
        let (from, to_label) = state::transition_label(record.state, to);
        record.state = to;
        self.diagnostics.send(EngineEvent::StateTransitioned {
            bundle_id: record.bundle_id.clone(),
            from,
            to: to_label,
        });
        Ok(())
    }

    /// `create_bundle(merchant_pk, amount, mint) -> Bundle` (spec §4.1).
    /// Assigns `nonce := last_nonce + 1`, signs as payer. Does not persist:
    /// the bundle isn't part of this device's lifecycle until a merchant
    /// cosigns it (spec's `PENDING` label is explicitly "co-signed,
    /// awaiting attestations").
    pub fn create_bundle(
        &mut self,
        merchant_pk: PublicKey,
        amount: u64,
        mint: [u8; 32],
        symbol: impl Into<String>,
    ) -> EngineResult<OfflineBundle> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount);
        }
        let next_nonce = self.last_nonce.checked_add(1).ok_or(EngineError::NonceExhausted)?;
        let now = self.now()?;
        // Device clock monotonic w.r.t. last bundle: never let a backward or
        // equal clock reading collide with the previous bundle's timestamp.
        let timestamp = if now.0 > self.last_timestamp.0 {
            now
        } else {
            EpochMillis(self.last_timestamp.0 + 1)
        };

        let tx_id = generate_tx_id();
        let mut bundle = OfflineBundle {
            tx_id,
            payer_pubkey: self.signer.public_key(),
            merchant_pubkey: merchant_pk,
            token: Token {
                mint,
                amount,
                symbol: symbol.into(),
            },
            nonce: next_nonce,
            timestamp,
            payer_signature: None,
            merchant_signature: None,
        };
        let hash = bundle.bundle_hash();
        bundle.payer_signature = Some(self.signer.sign(&hash));

        self.last_nonce = next_nonce;
        self.last_timestamp = timestamp;
        self.diagnostics.send(EngineEvent::BundleCreated {
            bundle_id: bundle.tx_id.clone(),
        });
        Ok(bundle)
    }

    /// `cosign(bundle) -> Bundle` (spec §4.1). Persists the bundle in
    /// `PENDING` as its side effect.
    pub fn cosign(&mut self, mut bundle: OfflineBundle) -> EngineResult<OfflineBundle> {
        if bundle.merchant_pubkey != self.signer.public_key() {
            return Err(EngineError::WrongMerchant);
        }
        let hash = bundle.bundle_hash();
        let payer_signature = bundle.payer_signature.ok_or(EngineError::InvalidPayerSignature)?;
        if !signer::verify(&bundle.payer_pubkey, &hash, &payer_signature) {
            return Err(EngineError::InvalidPayerSignature);
        }
        if self.store.has_seen_hash(&hash) {
            return Err(EngineError::DuplicateBundle);
        }
        bundle.merchant_signature = Some(self.signer.sign(&hash));

        let record = BundleRecord::new(bundle.clone());
        self.store.put(record);
        self.diagnostics.send(EngineEvent::StateTransitioned {
            bundle_id: bundle.tx_id.clone(),
            from: "none",
            to: "pending",
        });
        Ok(bundle)
    }

    /// `attach_attestation(bundle_id, role, envelope)` (spec §4.1). Moves to
    /// `ATTESTED` once both role envelopes are present.
    pub fn attach_attestation(
        &mut self,
        bundle_id: &str,
        role: Role,
        envelope: AttestationEnvelope,
    ) -> EngineResult<()> {
        let mut record = self.load(bundle_id)?;
        match role {
            Role::Payer => record.payer_envelope = Some(envelope),
            Role::Merchant => record.merchant_envelope = Some(envelope),
        }
        if record.payer_envelope.is_some()
            && record.merchant_envelope.is_some()
            && record.state == BundleState::Pending
        {
            self.transition(&mut record, BundleState::Attested)?;
        }
        self.store.put(record);
        Ok(())
    }

    /// `enqueue_for_settlement(bundle_id)` (spec §4.1). Idempotent once
    /// already `QUEUED`.
    pub fn enqueue_for_settlement(&mut self, bundle_id: &str) -> EngineResult<()> {
        let mut record = self.load(bundle_id)?;
        if record.state == BundleState::Queued {
            return Ok(());
        }
        self.transition(&mut record, BundleState::Queued)?;
        record.enqueued_at = Some(self.now()?);
        self.store.put(record);
        Ok(())
    }

    /// `take_next_ready() -> Option<QueueEntry>` (spec §4.1). Pulls the
    /// oldest-enqueued `QUEUED` entry that isn't waiting out a backoff
    /// window, marking it `BROADCAST` before returning it, so at most one
    /// settlement attempt is ever in flight for a given bundle.
    pub fn take_next_ready(&mut self, now: EpochMillis) -> EngineResult<Option<QueueEntry>> {
        let eligible = self
            .store
            .list_queued_fifo()
            .into_iter()
            .find(|record| match record.next_attempt_at {
                Some(at) => at.0 <= now.0,
                None => true,
            });
        let Some(mut record) = eligible else {
            return Ok(None);
        };
        self.transition(&mut record, BundleState::Broadcast)?;
        let entry = QueueEntry {
            bundle_id: record.bundle_id.clone(),
            bundle: record.bundle.clone(),
            payer_envelope: record.payer_envelope.clone(),
            merchant_envelope: record.merchant_envelope.clone(),
            retry_count: record.retry_count,
        };
        self.store.put(record);
        Ok(Some(entry))
    }

    /// `mark_settled(bundle_id, signature)` (spec §4.1).
    pub fn mark_settled(&mut self, bundle_id: &str, signature: impl Into<String>) -> EngineResult<()> {
        let mut record = self.load(bundle_id)?;
        self.transition(&mut record, BundleState::Settled)?;
        let signature = signature.into();
        record.ledger_signature = Some(signature.clone());
        self.store.put(record);
        self.diagnostics.send(EngineEvent::SettlementSucceeded {
            bundle_id: bundle_id.to_string(),
            signature,
        });
        Ok(())
    }

    /// `mark_failed(bundle_id, error, retry_after)` (spec §4.1). Transient
    /// errors, within the retry budget, are promoted straight back to
    /// `QUEUED` with a backoff-scheduled `next_attempt_at`; everything else
    /// stays `FAILED`.
    pub fn mark_failed(&mut self, bundle_id: &str, error: &EngineError) -> EngineResult<()> {
        let mut record = self.load(bundle_id)?;
        self.transition(&mut record, BundleState::Failed)?;
        record.retry_count += 1;
        record.last_error = Some(error.to_string());

        let now = self.now()?;
        let should_retry = error.transience() == offline_pay_types::error::Transience::Transient
            && record.retry_count < self.retry_budget;
        let retry_after = if should_retry {
            let backoff = retry::backoff_for_attempt(record.retry_count - 1);
            let at = EpochMillis(now.0 + backoff.as_millis() as i64);
            record.next_attempt_at = Some(at);
            self.transition(&mut record, BundleState::Queued)?;
            Some(at)
        } else {
            record.next_attempt_at = None;
            None
        };
        self.store.put(record);
        self.diagnostics.send(EngineEvent::SettlementFailed {
            bundle_id: bundle_id.to_string(),
            reason: error.to_string(),
            retry_after,
        });
        Ok(())
    }

    /// `mark_rollback(bundle_id)` (spec §4.1): resolution of a conflicting
    /// duplicate detected before settlement.
    pub fn mark_rollback(&mut self, bundle_id: &str) -> EngineResult<()> {
        let mut record = self.load(bundle_id)?;
        self.transition(&mut record, BundleState::Rollback)?;
        self.store.put(record);
        Ok(())
    }

    /// User-initiated cancellation (spec §5): honoured only before
    /// `BROADCAST`; deferred (returns `CancellationDeferred`) once a
    /// settlement attempt is in flight, since the ledger side can't be
    /// cancelled.
    pub fn cancel(&mut self, bundle_id: &str) -> EngineResult<()> {
        let record = self.load(bundle_id)?;
        if !record.state.cancellable() {
            return Err(EngineError::CancellationDeferred(bundle_id.to_string()));
        }
        self.mark_rollback(bundle_id)
    }
}

/// 16 random bytes, hex-encoded: satisfies spec's "opaque 16+ byte string,
/// unique per payer" with enough entropy that collision requires no
/// dedicated bookkeeping.
fn generate_tx_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
