//! Shared error taxonomy (spec §7). Each crate wraps the members relevant to
//! its own boundary in its own `thiserror` enum rather than returning these
//! directly, but the kinds and their transient/permanent classification are
//! defined once here so the three components agree on vocabulary.

use serde::{Deserialize, Serialize};

/// Whether a failure should be retried with backoff or surfaced as terminal
/// (spec §4.1 "classification: network, rate-limit, clock-skew -> transient;
/// invalid-signature, insufficient-funds, duplicate -> permanent").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transience {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Validation
    InvalidAmount,
    InvalidBundleId,
    InvalidNonce,
    InvalidOwner,
    MissingAttestation,
    InvalidAttestation,
    // Duplicate/fraud
    DuplicateBundle,
    FraudHashMatches,
    FraudEvidenceExists,
    // Resource
    InsufficientFunds,
    Overflow,
    Underflow,
    // Cryptographic
    InvalidPayerSignature,
    InvalidMerchantSignature,
    InvalidVerifierSignature,
    // Transport/transient
    Timeout,
    RateLimited,
    UpstreamUnavailable,
    ClockSkew,
    // Local
    SignerUnavailable,
    StorageCorrupt,
    SchemaMismatch,
}

impl ErrorKind {
    pub fn transience(self) -> Transience {
        use ErrorKind::*;
        match self {
            Timeout | RateLimited | UpstreamUnavailable | ClockSkew => Transience::Transient,
            _ => Transience::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kinds_are_transient() {
        assert_eq!(ErrorKind::Timeout.transience(), Transience::Transient);
        assert_eq!(ErrorKind::RateLimited.transience(), Transience::Transient);
    }

    #[test]
    fn validation_kinds_are_permanent() {
        assert_eq!(
            ErrorKind::InvalidNonce.transience(),
            Transience::Permanent
        );
        assert_eq!(
            ErrorKind::DuplicateBundle.transience(),
            Transience::Permanent
        );
    }
}
