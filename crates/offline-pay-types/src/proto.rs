//! HTTP wire bodies for the Attestation Service API (spec §6).

use crate::attestation::{AttestationEnvelope, AttestationProof};
use crate::bundle::OfflineBundle;
use crate::keys::PublicKey;
use crate::util::{amount_str, b64};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSummaryWire {
    #[serde(with = "amount_str")]
    pub amount: u64,
    pub nonce: u64,
    pub payer: PublicKey,
    pub merchant: PublicKey,
}

/// `POST /verify-attestation` request body (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAttestationRequest {
    pub bundle_id: String,
    pub bundle_summary: BundleSummaryWire,
    pub payer_attestation: AttestationEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_attestation: Option<AttestationEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proofs {
    pub payer: AttestationProof,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<AttestationProof>,
}

/// `POST /verify-attestation` response body (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAttestationResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proofs: Option<Proofs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /settle-offline` optional server-side submission helper (spec §6).
///
/// Carries the full signed bundle rather than only its summary: the escrow
/// program's `settle_offline_payment` instruction needs `tx_id`, `token`,
/// and `timestamp` to recompute `bundle_hash`, none of which round-trip
/// through `BundleSummaryWire` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOfflineRequest {
    pub bundle_id: String,
    pub bundle_summary: BundleSummaryWire,
    pub bundle: OfflineBundle,
    #[serde(with = "b64")]
    pub merchant_token_account: [u8; 32],
    pub proofs: Proofs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleOfflineResponse {
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudReason {
    DuplicateBundle,
    InvalidAttestation,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFraudRequest {
    pub device_id: String,
    pub bundle_id: String,
    pub reason: FraudReason,
}
