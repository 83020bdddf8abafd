//! HTTP routes for the attestation service (spec §6): `/verify-attestation`,
//! `/settle-offline`, `/report-fraud`, plus `/health` and `/supported`.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use escrow_program::instructions::{settle_offline_payment, SettleOfflinePaymentArgs};
use escrow_program::{InMemoryLedger, VerifierKey};
use offline_pay_types::proto::{
    ReportFraudRequest, SettleOfflineRequest, SettleOfflineResponse, VerifyAttestationRequest,
    VerifyAttestationResponse,
};
use offline_pay_types::EpochMillis;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::config::Config;
use crate::errors::{FraudError, VerifyError};
use crate::service::AttestationServiceLocal;
use crate::verifier::AttestationVerifier;

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<AttestationServiceLocal>,
    pub verifier_key: VerifierKey,
    pub ledger: Arc<Mutex<InMemoryLedger>>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let signing_key = config.verifier_signing_key().as_signing_key().clone();
        let verifier_key_bytes = config.verifier_signing_key().verifying_key_bytes();
        Self {
            verifier: Arc::new(AttestationServiceLocal::new(
                signing_key,
                config.allow_dev_attestation(),
            )),
            verifier_key: VerifierKey(verifier_key_bytes),
            ledger: Arc::new(Mutex::new(InMemoryLedger::new())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/supported", get(supported))
        .route("/verify-attestation", post(verify_attestation))
        .route("/settle-offline", post(settle_offline))
        .route("/report-fraud", post(report_fraud))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> &'static str {
    "offline-pay attestation service"
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct SupportedResponse {
    operations: &'static [&'static str],
}

async fn supported() -> impl IntoResponse {
    Json(SupportedResponse {
        operations: &["verify-attestation", "settle-offline", "report-fraud"],
    })
}

#[instrument(skip_all, fields(bundle_id = %request.bundle_id))]
async fn verify_attestation(
    State(state): State<AppState>,
    Json(request): Json<VerifyAttestationRequest>,
) -> impl IntoResponse {
    match state.verifier.verify_attestation(request).await {
        Ok(proofs) => Json(VerifyAttestationResponse {
            valid: true,
            proofs: Some(proofs),
            error: None,
        })
        .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, code = err.code(), "attestation verification failed");
            let status = err.clone().into_response().status();
            let response = VerifyAttestationResponse {
                valid: false,
                proofs: None,
                error: Some(err.to_string()),
            };
            (status, Json(response)).into_response()
        }
    }
}

/// Recomputes the settlement the device already attested to and submits it
/// to the escrow program (spec §6 "optional server-side submission helper").
/// A real deployment broadcasts the instruction to the chain directly; this
/// reference server applies it to its own in-memory ledger.
#[instrument(skip_all, fields(bundle_id = %request.bundle_id))]
async fn settle_offline(
    State(state): State<AppState>,
    Json(request): Json<SettleOfflineRequest>,
) -> Result<impl IntoResponse, FraudError> {
    let SettleOfflineRequest {
        bundle,
        merchant_token_account,
        proofs,
        ..
    } = request;

    let payer_attestation_nonce = proofs.payer.nonce;
    let payer_attestation_timestamp = proofs.payer.timestamp;
    let (merchant_proof, merchant_nonce, merchant_timestamp) = match &proofs.merchant {
        Some(proof) => (Some(proof.clone()), Some(proof.nonce), Some(proof.timestamp)),
        None => (None, None, None),
    };

    let args = SettleOfflinePaymentArgs {
        bundle,
        merchant_token_account,
        payer_proof: proofs.payer,
        payer_attestation_nonce,
        payer_attestation_timestamp,
        merchant_proof,
        merchant_attestation_nonce: merchant_nonce,
        merchant_attestation_timestamp: merchant_timestamp,
    };

    let now = EpochMillis::try_now().map_err(|e| FraudError::Verify(VerifyError::ApiError(e.to_string())))?;

    let mut ledger = state.ledger.lock().expect("ledger mutex poisoned");
    let events = settle_offline_payment(&mut *ledger, &state.verifier_key, now, args)?;
    tracing::info!(?events, "bundle settled");

    let signature = hex::encode(state.verifier_key.0);
    Ok(Json(SettleOfflineResponse { signature }))
}

/// Records a fraud report against a device's reputation (spec §4.2
/// "Reputation tracking"). Advisory only: the escrow program's own
/// `report_fraudulent_bundle` instruction is invoked by the ledger operator
/// directly when settlement detects a conflicting bundle hash, not by this
/// endpoint, since the wire request here carries no conflicting hash or
/// reporter identity for the program to check.
#[instrument(skip_all, fields(bundle_id = %request.bundle_id, device_id = %request.device_id))]
async fn report_fraud(
    State(state): State<AppState>,
    Json(request): Json<ReportFraudRequest>,
) -> Result<impl IntoResponse, FraudError> {
    state
        .verifier
        .report_fraud(request)
        .await
        .map_err(FraudError::Verify)?;
    Ok(Json(serde_json::json!({ "recorded": true })))
}
