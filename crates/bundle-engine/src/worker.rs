//! The settlement worker (spec §4.1 "Settlement worker", §5 scheduling
//! model): a single long-lived task per device that polls connectivity and,
//! when online, drains the `QUEUED` FIFO — verifying attestations, then
//! submitting to the escrow ledger, then applying the resulting terminal
//! transition. An in-process mutex plus the persisted `BROADCAST` flag
//! (enforced inside `BundleEngine::take_next_ready`) guarantee at most one
//! concurrent settlement attempt per bundle.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use offline_pay_types::attestation::Role;
use offline_pay_types::proto::{BundleSummaryWire, SettleOfflineRequest, VerifyAttestationRequest};
use offline_pay_types::EpochMillis;

use crate::client::{AttestationClient, LedgerClient};
use crate::engine::BundleEngine;
use crate::errors::EngineError;
use crate::signer::Signer;

/// Network-reachability probe the worker consults before attempting a
/// drain pass (spec §5: "polls connectivity and, when online, drains the
/// queue"). A real mobile host backs this with its platform's
/// connectivity-manager API; tests use [`AlwaysOnline`].
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> impl Future<Output = bool> + Send;
}

pub struct AlwaysOnline;

impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

/// Timeout for a connectivity probe itself (spec §5: "5 s for connectivity
/// probes").
pub const CONNECTIVITY_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SettlementWorker<S, A, L>
where
    S: Signer,
    A: AttestationClient,
    L: LedgerClient,
{
    engine: Arc<Mutex<BundleEngine<S>>>,
    attestation_client: A,
    ledger_client: L,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl<S, A, L> SettlementWorker<S, A, L>
where
    S: Signer,
    A: AttestationClient,
    L: LedgerClient,
{
    pub fn new(engine: Arc<Mutex<BundleEngine<S>>>, attestation_client: A, ledger_client: L) -> Self {
        Self {
            engine,
            attestation_client,
            ledger_client,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Drains every eligible `QUEUED` entry once, oldest enqueue time first.
    /// Returns the number of bundles attempted. Used directly by tests and
    /// by [`run_forever`](Self::run_forever)'s poll loop.
    pub async fn drain_once(&self, now: EpochMillis) -> usize {
        let mut attempted = 0usize;
        loop {
            let entry = {
                let mut engine = self.engine.lock().await;
                match engine.take_next_ready(now) {
                    Ok(entry) => entry,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to pull next queued bundle");
                        break;
                    }
                }
            };
            let Some(entry) = entry else { break };

            {
                let mut in_flight = self.in_flight.lock().await;
                if !in_flight.insert(entry.bundle_id.clone()) {
                    // Another call is already settling this bundle_id; the
                    // persisted BROADCAST flag already prevented a second
                    // take_next_ready from handing it out, so this is a
                    // defensive no-op rather than an expected path.
                    continue;
                }
            }

            attempted += 1;
            let bundle_id = entry.bundle_id.clone();
            let result = self.attempt_settlement(&entry).await;

            let mut engine = self.engine.lock().await;
            match result {
                Ok(signature) => {
                    if let Err(err) = engine.mark_settled(&bundle_id, signature) {
                        tracing::error!(error = %err, bundle_id, "failed to record settlement success");
                    }
                }
                Err(err) => {
                    if let Err(mark_err) = engine.mark_failed(&bundle_id, &err) {
                        tracing::error!(error = %mark_err, bundle_id, "failed to record settlement failure");
                    }
                }
            }
            drop(engine);
            self.in_flight.lock().await.remove(&bundle_id);
        }
        attempted
    }

    async fn attempt_settlement(&self, entry: &crate::engine::QueueEntry) -> Result<String, EngineError> {
        let payer_envelope = entry
            .payer_envelope
            .clone()
            .ok_or(EngineError::MissingAttestation("payer"))?;
        if entry.bundle.merchant_signature.is_some() && entry.merchant_envelope.is_none() {
            return Err(EngineError::MissingAttestation("merchant"));
        }

        let bundle_summary = BundleSummaryWire {
            amount: entry.bundle.token.amount,
            nonce: entry.bundle.nonce,
            payer: entry.bundle.payer_pubkey,
            merchant: entry.bundle.merchant_pubkey,
        };

        let verify_request = VerifyAttestationRequest {
            bundle_id: entry.bundle_id.clone(),
            bundle_summary: bundle_summary.clone(),
            payer_attestation: payer_envelope,
            merchant_attestation: entry.merchant_envelope.clone(),
        };
        let verify_response = self.attestation_client.verify_attestation(&verify_request).await?;
        if !verify_response.valid {
            return Err(EngineError::AttestationInvalid);
        }
        let proofs = verify_response.proofs.ok_or(EngineError::AttestationInvalid)?;

        let settle_request = SettleOfflineRequest {
            bundle_id: entry.bundle_id.clone(),
            bundle_summary,
            bundle: entry.bundle.clone(),
            // The escrow program settles into the merchant's token account,
            // a distinct address from the merchant's signing key in a real
            // deployment; this reference client has no token-account
            // derivation of its own and reuses the merchant's public key.
            merchant_token_account: *entry.bundle.merchant_pubkey.as_bytes(),
            proofs,
        };
        let settle_response = self.ledger_client.settle_offline(&settle_request).await?;
        Ok(settle_response.signature)
    }

    /// Runs until `cancellation` fires: on each tick, probes connectivity
    /// (5 s timeout; a timeout counts as offline, not an error) and, if
    /// online, drains the queue once before sleeping `poll_interval`.
    pub async fn run_forever(
        &self,
        connectivity: impl ConnectivityProbe,
        cancellation: CancellationToken,
        poll_interval: Duration,
    ) {
        loop {
            if cancellation.is_cancelled() {
                return;
            }
            let online = tokio::time::timeout(CONNECTIVITY_PROBE_TIMEOUT, connectivity.is_online())
                .await
                .unwrap_or(false);
            if online {
                let now = EpochMillis::try_now().unwrap_or(EpochMillis(0));
                self.drain_once(now).await;
            }
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

/// Threads a [`Role`] through a bundle summary request without constructing
/// the full envelope again, used by diagnostics/log call sites that only
/// need to say which side's attestation was missing.
pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::Payer => "payer",
        Role::Merchant => "merchant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics;
    use crate::errors::EngineResult;
    use crate::signer::InMemorySigner;
    use crate::store::InMemoryBundleStore;
    use offline_pay_types::attestation::{attestation_root, BundleSummary};
    use offline_pay_types::proto::{Proofs, SettleOfflineResponse, VerifyAttestationResponse};
    use offline_pay_types::{AttestationEnvelope, AttestationProof, DeviceInfo, SecurityLevel, Signature};
    use rand::rngs::OsRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeAttestationClient {
        valid: bool,
    }

    impl AttestationClient for FakeAttestationClient {
        async fn verify_attestation(
            &self,
            request: &VerifyAttestationRequest,
        ) -> Result<VerifyAttestationResponse, EngineError> {
            if !self.valid {
                return Ok(VerifyAttestationResponse {
                    valid: false,
                    proofs: None,
                    error: Some("INVALID_TOKEN".to_string()),
                });
            }
            let summary = BundleSummary {
                payer: request.bundle_summary.payer,
                merchant: request.bundle_summary.merchant,
                amount: request.bundle_summary.amount,
                bundle_nonce: request.bundle_summary.nonce,
            };
            let root = attestation_root(
                &request.bundle_id,
                &summary,
                Role::Payer,
                [1u8; 32],
                EpochMillis(0),
            );
            let proof = AttestationProof {
                root,
                nonce: [1u8; 32],
                timestamp: EpochMillis(0),
                signature: Signature([0u8; 64]),
            };
            Ok(VerifyAttestationResponse {
                valid: true,
                proofs: Some(Proofs {
                    payer: proof,
                    merchant: None,
                }),
                error: None,
            })
        }
    }

    struct FakeLedgerClient {
        calls: AtomicUsize,
        fail_first: bool,
    }

    impl LedgerClient for FakeLedgerClient {
        async fn settle_offline(
            &self,
            _request: &SettleOfflineRequest,
        ) -> Result<SettleOfflineResponse, EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(EngineError::Timeout);
            }
            Ok(SettleOfflineResponse {
                signature: "ledger-sig".to_string(),
            })
        }
    }

    fn sample_envelope(bundle_id: &str) -> AttestationEnvelope {
        AttestationEnvelope {
            bundle_id: bundle_id.to_string(),
            timestamp: EpochMillis(0),
            nonce: [0u8; 32],
            attestation_report: vec![1],
            signature: vec![2],
            certificate_chain: vec![],
            device_info: DeviceInfo {
                model: "pixel".into(),
                os_version: "14".into(),
                security_level: SecurityLevel::Tee,
            },
        }
    }

    async fn queued_bundle() -> (Arc<Mutex<BundleEngine<InMemorySigner>>>, String) {
        let payer = InMemorySigner::generate(&mut OsRng);
        let merchant = InMemorySigner::generate(&mut OsRng);
        let merchant_pk = merchant.public_key();

        let (payer_tx, _rx1) = diagnostics::channel();
        let mut payer_engine = BundleEngine::new(payer, Box::new(InMemoryBundleStore::new()), payer_tx);
        let bundle = payer_engine
            .create_bundle(merchant_pk, 1_000, [9u8; 32], "USDX")
            .unwrap();
        let bundle_id = bundle.tx_id.clone();

        let (merchant_tx, _rx2) = diagnostics::channel();
        let mut merchant_engine =
            BundleEngine::new(merchant, Box::new(InMemoryBundleStore::new()), merchant_tx);
        merchant_engine.cosign(bundle).unwrap();
        merchant_engine
            .attach_attestation(&bundle_id, Role::Payer, sample_envelope(&bundle_id))
            .unwrap();
        merchant_engine
            .attach_attestation(&bundle_id, Role::Merchant, sample_envelope(&bundle_id))
            .unwrap();
        merchant_engine.enqueue_for_settlement(&bundle_id).unwrap();

        (Arc::new(Mutex::new(merchant_engine)), bundle_id)
    }

    #[tokio::test]
    async fn happy_path_settles_and_records_signature() {
        let (engine, bundle_id) = queued_bundle().await;
        let worker = SettlementWorker::new(
            engine.clone(),
            FakeAttestationClient { valid: true },
            FakeLedgerClient {
                calls: AtomicUsize::new(0),
                fail_first: false,
            },
        );
        let attempted = worker.drain_once(EpochMillis(i64::MAX)).await;
        assert_eq!(attempted, 1);

        let engine = engine.lock().await;
        let record: EngineResult<_> = engine.load(&bundle_id);
        let record = record.unwrap();
        assert_eq!(record.state, crate::state::BundleState::Settled);
        assert_eq!(record.ledger_signature.as_deref(), Some("ledger-sig"));
    }

    #[tokio::test]
    async fn invalid_attestation_moves_to_permanent_failure() {
        let (engine, bundle_id) = queued_bundle().await;
        let worker = SettlementWorker::new(
            engine.clone(),
            FakeAttestationClient { valid: false },
            FakeLedgerClient {
                calls: AtomicUsize::new(0),
                fail_first: false,
            },
        );
        worker.drain_once(EpochMillis(i64::MAX)).await;

        let engine = engine.lock().await;
        let record = engine.load(&bundle_id).unwrap();
        assert_eq!(record.state, crate::state::BundleState::Failed);
        assert!(record.next_attempt_at.is_none());
    }

    #[tokio::test]
    async fn transient_ledger_failure_requeues_for_retry() {
        let (engine, bundle_id) = queued_bundle().await;
        let worker = SettlementWorker::new(
            engine.clone(),
            FakeAttestationClient { valid: true },
            FakeLedgerClient {
                calls: AtomicUsize::new(0),
                fail_first: true,
            },
        );
        worker.drain_once(EpochMillis(i64::MAX)).await;
        {
            let engine = engine.lock().await;
            let record = engine.load(&bundle_id).unwrap();
            assert_eq!(record.state, crate::state::BundleState::Queued);
            assert!(record.next_attempt_at.is_some());
        }

        // Retrying far enough in the future succeeds on the second attempt.
        let attempted = worker.drain_once(EpochMillis(i64::MAX)).await;
        assert_eq!(attempted, 1);
        let engine = engine.lock().await;
        let record = engine.load(&bundle_id).unwrap();
        assert_eq!(record.state, crate::state::BundleState::Settled);
    }

    struct CapturingLedgerClient {
        captured: Mutex<Option<SettleOfflineRequest>>,
    }

    impl LedgerClient for CapturingLedgerClient {
        async fn settle_offline(
            &self,
            request: &SettleOfflineRequest,
        ) -> Result<SettleOfflineResponse, EngineError> {
            *self.captured.lock().await = Some(request.clone());
            Ok(SettleOfflineResponse {
                signature: "ledger-sig".to_string(),
            })
        }
    }

    /// Parity check (spec §9 open question): the hash the payer's device
    /// committed to when cosigning must be bit-for-bit what a server-submit
    /// path would independently recompute from the wire request, since both
    /// call the same `OfflineBundle::bundle_hash`.
    #[tokio::test]
    async fn settle_request_bundle_hash_matches_locally_signed_bundle() {
        let (engine, bundle_id) = queued_bundle().await;
        let locally_signed_hash = {
            let engine = engine.lock().await;
            engine.load(&bundle_id).unwrap().bundle.bundle_hash()
        };

        let ledger_client = CapturingLedgerClient {
            captured: Mutex::new(None),
        };
        let worker = SettlementWorker::new(engine.clone(), FakeAttestationClient { valid: true }, ledger_client);
        let attempted = worker.drain_once(EpochMillis(i64::MAX)).await;
        assert_eq!(attempted, 1);

        let captured = worker.ledger_client.captured.lock().await.clone().unwrap();
        assert_eq!(captured.bundle.bundle_hash(), locally_signed_hash);
    }
}
