//! [`AttestationServiceLocal`]: the reference [`AttestationVerifier`]
//! implementation. Runs the six-step validation pipeline (spec §4.2),
//! tracks device reputation advisory-side (spec §4.2 "Reputation
//! tracking"), and caches verified envelopes by bundle id.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ed25519_dalek::{Signer as DalekSigner, SigningKey};
use offline_pay_types::attestation::{attestation_root, AttestationEnvelope, Role};
use offline_pay_types::proto::{Proofs, ReportFraudRequest, VerifyAttestationRequest};
use offline_pay_types::{AttestationProof, BundleSummary, EpochMillis, Signature};
use sha2::{Digest, Sha256};

use crate::errors::VerifyError;

/// Attestations older than this are rejected outright (spec §4.2 step 3:
/// "reject if stale (>5 min)").
const MAX_ATTESTATION_AGE_MS: i64 = 5 * 60 * 1000;

/// Attestation envelopes are cached against their `bundle_id` for this long
/// (spec §4.2 step 6), so a retried `/verify-attestation` call or a later
/// `/settle-offline` can be served without the device resubmitting.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A fraud score below this threshold blacklists the device
/// (spec §4.2 "blacklisted iff score < -10 or fraud_reports >= 3").
const BLACKLIST_SCORE_THRESHOLD: i64 = -10;
const BLACKLIST_FRAUD_REPORTS_THRESHOLD: u32 = 3;

const FRAUD_SCORE_PENALTY: i64 = 5;
const SUCCESS_SCORE_BONUS: i64 = 1;

/// Per-device reputation, advisory only; the ledger never consults this
/// (spec §4.2 "Reputation tracking is advisory; the ledger never consults
/// it").
#[derive(Debug, Clone, Default)]
struct ReputationEntry {
    score: i64,
    fraud_reports: u32,
}

impl ReputationEntry {
    fn is_blacklisted(&self) -> bool {
        self.score < BLACKLIST_SCORE_THRESHOLD
            || self.fraud_reports >= BLACKLIST_FRAUD_REPORTS_THRESHOLD
    }
}

#[derive(Clone)]
struct CachedEnvelope {
    proofs: Proofs,
    cached_at: std::time::Instant,
}

/// The service's Ed25519 state and its two in-memory stores. Device
/// identity is the hex-encoded SHA-256 of the envelope's leaf certificate
/// (or, lacking a chain, its attestation report) — the only value every
/// envelope carries that is stable across a device's bundles and available
/// both at verification time and at fraud-report time.
pub struct AttestationServiceLocal {
    signing_key: SigningKey,
    allow_dev_attestation: bool,
    reputation: DashMap<String, ReputationEntry>,
    cache: DashMap<String, CachedEnvelope>,
}

impl AttestationServiceLocal {
    pub fn new(signing_key: SigningKey, allow_dev_attestation: bool) -> Self {
        Self {
            signing_key,
            allow_dev_attestation,
            reputation: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Derives the stable device key used to key reputation tracking.
    fn device_key(envelope: &AttestationEnvelope) -> String {
        let mut hasher = Sha256::new();
        if let Some(leaf) = envelope.certificate_chain.first() {
            hasher.update(leaf);
        } else {
            hasher.update(&envelope.attestation_report);
        }
        hex::encode(hasher.finalize())
    }

    /// Step 2 of the validation pipeline: verifies the device integrity
    /// token. A real deployment checks `attestation_report` and
    /// `certificate_chain` against the platform attestation authority
    /// (Play Integrity / App Attest); this reference implementation only
    /// knows how to accept development tokens, gated by configuration
    /// (spec §4.2 step 2, §6 `allow_dev_attestation`).
    fn verify_device_token(&self, envelope: &AttestationEnvelope) -> Result<(), VerifyError> {
        if envelope.attestation_report.is_empty() {
            return Err(VerifyError::InvalidToken);
        }
        let is_dev_token = envelope
            .attestation_report
            .starts_with(b"dev-attestation:");
        if is_dev_token && !self.allow_dev_attestation {
            return Err(VerifyError::DeviceIntegrityFailed);
        }
        if !is_dev_token {
            // No platform authority integration in this reference build;
            // anything that isn't a recognized dev token fails closed.
            return Err(VerifyError::DeviceIntegrityFailed);
        }
        Ok(())
    }

    fn sign_root(&self, root: [u8; 32]) -> Signature {
        let signature = self.signing_key.sign(&root);
        Signature(signature.to_bytes())
    }

    fn proof_for(
        &self,
        bundle_id: &str,
        summary: &BundleSummary,
        role: Role,
        envelope: &AttestationEnvelope,
    ) -> Result<AttestationProof, VerifyError> {
        let device_key = Self::device_key(envelope);

        if let Some(entry) = self.reputation.get(&device_key) {
            if entry.is_blacklisted() {
                return Err(VerifyError::Blacklisted(device_key));
            }
        }

        self.verify_device_token(envelope)?;

        // The envelope's own bundle_id binds it to a specific attestation
        // nonce context; an envelope attested for one bundle must not be
        // replayed to verify a different one (spec §4.2 NONCE_MISMATCH).
        if envelope.bundle_id != bundle_id {
            return Err(VerifyError::NonceMismatch);
        }

        let now = EpochMillis::try_now().map_err(|e| VerifyError::ApiError(e.to_string()))?;
        if !envelope.timestamp.within_age_of(now, MAX_ATTESTATION_AGE_MS) {
            return Err(VerifyError::TokenExpired);
        }

        let root = attestation_root(bundle_id, summary, role, envelope.nonce, envelope.timestamp);
        let signature = self.sign_root(root);

        self.reputation
            .entry(device_key)
            .or_default()
            .score += SUCCESS_SCORE_BONUS;

        Ok(AttestationProof {
            root,
            nonce: envelope.nonce,
            timestamp: envelope.timestamp,
            signature,
        })
    }
}

impl crate::verifier::AttestationVerifier for AttestationServiceLocal {
    type Error = VerifyError;

    async fn verify_attestation(
        &self,
        request: VerifyAttestationRequest,
    ) -> Result<Proofs, VerifyError> {
        let summary = BundleSummary {
            payer: request.bundle_summary.payer,
            merchant: request.bundle_summary.merchant,
            amount: request.bundle_summary.amount,
            bundle_nonce: request.bundle_summary.nonce,
        };

        let payer_proof = self.proof_for(
            &request.bundle_id,
            &summary,
            Role::Payer,
            &request.payer_attestation,
        )?;

        let merchant_proof = match &request.merchant_attestation {
            Some(envelope) => Some(self.proof_for(&request.bundle_id, &summary, Role::Merchant, envelope)?),
            None => None,
        };

        let proofs = Proofs {
            payer: payer_proof,
            merchant: merchant_proof,
        };

        self.cache.insert(
            request.bundle_id.clone(),
            CachedEnvelope {
                proofs: proofs.clone(),
                cached_at: std::time::Instant::now(),
            },
        );

        Ok(proofs)
    }

    async fn report_fraud(&self, request: ReportFraudRequest) -> Result<(), VerifyError> {
        let mut entry = self.reputation.entry(request.device_id).or_default();
        entry.fraud_reports += 1;
        entry.score -= FRAUD_SCORE_PENALTY;
        tracing::warn!(
            bundle_id = %request.bundle_id,
            reason = ?request.reason,
            "fraud reported"
        );
        Ok(())
    }
}

impl AttestationServiceLocal {
    /// Looks up a previously verified bundle's proofs, evicting it if its
    /// TTL has elapsed (spec §4.2 step 6, 1-hour TTL, last-write-wins).
    pub fn cached_proofs(&self, bundle_id: &str) -> Option<Proofs> {
        let entry = self.cache.get(bundle_id)?;
        if entry.cached_at.elapsed() > CACHE_TTL {
            drop(entry);
            self.cache.remove(bundle_id);
            return None;
        }
        Some(entry.proofs.clone())
    }
}

pub type SharedVerifier = Arc<AttestationServiceLocal>;
