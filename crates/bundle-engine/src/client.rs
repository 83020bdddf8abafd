//! Outbound HTTP calls the settlement worker makes once a device comes
//! online: verify attestations with the service, then submit the resulting
//! proofs to the escrow ledger. Both are traits so the worker can be driven
//! by fakes in tests; the `reqwest`-backed implementations are the ones a
//! real device uses.

use offline_pay_types::proto::{
    SettleOfflineRequest, SettleOfflineResponse, VerifyAttestationRequest,
    VerifyAttestationResponse,
};
use std::future::Future;
use std::time::Duration;

use crate::errors::EngineError;

/// Recommended request timeout for `HttpAttestationClient` (spec §5: "20 s
/// for attestation").
pub const ATTESTATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Recommended request timeout for `HttpLedgerClient` (spec §5: "30 s for
/// settlement").
pub const SETTLEMENT_TIMEOUT: Duration = Duration::from_secs(30);

pub trait AttestationClient: Send + Sync {
    fn verify_attestation(
        &self,
        request: &VerifyAttestationRequest,
    ) -> impl Future<Output = Result<VerifyAttestationResponse, EngineError>> + Send;
}

pub trait LedgerClient: Send + Sync {
    fn settle_offline(
        &self,
        request: &SettleOfflineRequest,
    ) -> impl Future<Output = Result<SettleOfflineResponse, EngineError>> + Send;
}

/// Thin `reqwest` client pointed at a single attestation service base URL.
pub struct HttpAttestationClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAttestationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl AttestationClient for HttpAttestationClient {
    async fn verify_attestation(
        &self,
        request: &VerifyAttestationRequest,
    ) -> Result<VerifyAttestationResponse, EngineError> {
        let url = format!("{}/verify-attestation", self.base_url);
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        response
            .json::<VerifyAttestationResponse>()
            .await
            .map_err(|err| EngineError::AttestationRequest(err.to_string()))
    }
}

/// Submits proofs to the escrow ledger through the attestation service's
/// `/settle-offline` convenience endpoint, rather than talking to the ledger
/// runtime directly: the device has no chain connectivity of its own.
pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a plain timeout");
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl LedgerClient for HttpLedgerClient {
    async fn settle_offline(
        &self,
        request: &SettleOfflineRequest,
    ) -> Result<SettleOfflineResponse, EngineError> {
        let url = format!("{}/settle-offline", self.base_url);
        let response = self
            .http
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        response
            .json::<SettleOfflineResponse>()
            .await
            .map_err(|err| EngineError::LedgerRequest(err.to_string()))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout
    } else if err.is_connect() {
        EngineError::UpstreamUnavailable
    } else {
        EngineError::LedgerRequest(err.to_string())
    }
}
