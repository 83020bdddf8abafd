use offline_pay_types::error::{ErrorKind, Transience};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("no signer is available on this device")]
    SignerUnavailable,
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("payer nonce counter is exhausted")]
    NonceExhausted,
    #[error("payer signature does not verify against the bundle hash")]
    InvalidPayerSignature,
    #[error("merchant key does not match this device's public key")]
    WrongMerchant,
    #[error("bundle hash has already been seen on this device")]
    DuplicateBundle,
    #[error("bundle {0} not found")]
    BundleNotFound(String),
    #[error("transition from {from:?} to {to:?} is not permitted")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("stored record schema version {found} does not match expected {expected}")]
    SchemaMismatch { expected: u8, found: u8 },
    #[error("retry budget of {budget} attempts exhausted for bundle {bundle_id}")]
    RetryBudgetExhausted { bundle_id: String, budget: u32 },
    #[error("attestation service request failed: {0}")]
    AttestationRequest(String),
    #[error("ledger submission failed: {0}")]
    LedgerRequest(String),
    #[error("request timed out")]
    Timeout,
    #[error("upstream is unavailable")]
    UpstreamUnavailable,
    #[error("attestation service returned invalid for this bundle")]
    AttestationInvalid,
    #[error("required {0} attestation envelope is missing")]
    MissingAttestation(&'static str),
    #[error("cancellation of bundle {0} is deferred until it resolves: already broadcast")]
    CancellationDeferred(String),
}

impl EngineError {
    /// Maps onto the shared error-kind taxonomy where a mapping exists, for
    /// retry classification and cross-component logging consistency. Errors
    /// with no useful shared kind (bad transitions, missing records) are
    /// always permanent.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::SignerUnavailable => Some(ErrorKind::SignerUnavailable),
            EngineError::InvalidAmount => Some(ErrorKind::InvalidAmount),
            EngineError::InvalidPayerSignature => Some(ErrorKind::InvalidPayerSignature),
            EngineError::DuplicateBundle => Some(ErrorKind::DuplicateBundle),
            EngineError::SchemaMismatch { .. } => Some(ErrorKind::SchemaMismatch),
            EngineError::Timeout => Some(ErrorKind::Timeout),
            EngineError::UpstreamUnavailable => Some(ErrorKind::UpstreamUnavailable),
            _ => None,
        }
    }

    pub fn transience(&self) -> Transience {
        self.kind().map(ErrorKind::transience).unwrap_or(Transience::Permanent)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
