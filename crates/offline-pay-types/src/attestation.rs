//! Attestation envelopes and proofs (spec §3, §4.2), plus the `Role` tag
//! threaded through hashing and proof construction instead of a subclass
//! hierarchy (spec §9 "dynamic dispatch on role").

use crate::keys::{PublicKey, Signature};
use crate::timestamp::EpochMillis;
use crate::util::{amount_str, b64};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which side of the bundle an attestation or proof belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Payer,
    Merchant,
}

impl Role {
    /// The `role_byte` used in the canonical attestation root (spec §4.2):
    /// 0 for payer, 1 for merchant.
    pub fn as_byte(self) -> u8 {
        match self {
            Role::Payer => 0,
            Role::Merchant => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Strongbox,
    Tee,
    Software,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub model: String,
    pub os_version: String,
    pub security_level: SecurityLevel,
}

/// Device-signed integrity evidence bound to a bundle (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationEnvelope {
    pub bundle_id: String,
    pub timestamp: EpochMillis,
    #[serde(with = "b64")]
    pub nonce: [u8; 32],
    #[serde(with = "b64::vec")]
    pub attestation_report: Vec<u8>,
    #[serde(with = "b64::vec")]
    pub signature: Vec<u8>,
    #[serde(with = "b64::vec_of_vec")]
    pub certificate_chain: Vec<Vec<u8>>,
    pub device_info: DeviceInfo,
}

/// Verifier-signed certificate consumable by the escrow program (spec §3).
/// This is the only attestation form the on-chain program trusts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationProof {
    #[serde(with = "b64")]
    pub root: [u8; 32],
    #[serde(with = "b64")]
    pub nonce: [u8; 32],
    pub timestamp: EpochMillis,
    pub signature: Signature,
}

/// The minimal bundle facts the attestation root binds to, shared between
/// the device, the service, and the on-chain verifier (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleSummary {
    pub payer: PublicKey,
    pub merchant: PublicKey,
    pub amount: u64,
    pub bundle_nonce: u64,
}

const ATTESTATION_DOMAIN_TAG: &[u8] = b"offline-pay/attestation-root/v1";

/// Canonical SHA-256 attestation root (spec §4.2): domain tag ‖ bundle_id ‖
/// payer (32B) ‖ merchant (32B) ‖ amount (8B LE) ‖ bundle_nonce (8B LE) ‖
/// role_byte (1B) ‖ attestation_nonce (32B) ‖ attestation_timestamp (8B LE).
///
/// Device, service, and on-chain verifier MUST all compute this identically;
/// this is the single hardest interoperability requirement in the protocol.
pub fn attestation_root(
    bundle_id: &str,
    summary: &BundleSummary,
    role: Role,
    attestation_nonce: [u8; 32],
    attestation_timestamp: EpochMillis,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(ATTESTATION_DOMAIN_TAG);
    hasher.update(bundle_id.as_bytes());
    hasher.update(summary.payer.as_bytes());
    hasher.update(summary.merchant.as_bytes());
    hasher.update(summary.amount.to_le_bytes());
    hasher.update(summary.bundle_nonce.to_le_bytes());
    hasher.update([role.as_byte()]);
    hasher.update(attestation_nonce);
    hasher.update(attestation_timestamp.to_le_bytes());
    hasher.finalize().into()
}
