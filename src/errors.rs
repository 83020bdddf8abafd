//! Error types returned by the attestation service's HTTP handlers
//! (spec §4.2, §7).
//!
//! Each variant carries the string code the wire API exposes; `.kind()`
//! maps it onto the shared [`offline_pay_types::error::ErrorKind`] taxonomy
//! so callers across the protocol agree on transience without this crate
//! re-deriving it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use offline_pay_types::error::{ErrorKind, Transience};
use serde::Serialize;
use thiserror::Error;

/// Failure modes of `POST /verify-attestation` and, by extension, the
/// validation pipeline `POST /settle-offline` reuses before forwarding to
/// the escrow program (spec §4.2 step 2-3).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("attestation envelope could not be parsed")]
    InvalidToken,
    #[error("device integrity token failed verification against the platform authority")]
    DeviceIntegrityFailed,
    #[error("bundle summary does not match the attested nonce")]
    NonceMismatch,
    #[error("attestation token is older than the allowed freshness window")]
    TokenExpired,
    #[error("device {0} is blacklisted")]
    Blacklisted(String),
    #[error("upstream attestation authority call failed: {0}")]
    ApiError(String),
}

impl VerifyError {
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::InvalidToken => "INVALID_TOKEN",
            VerifyError::DeviceIntegrityFailed => "DEVICE_INTEGRITY_FAILED",
            VerifyError::NonceMismatch => "NONCE_MISMATCH",
            VerifyError::TokenExpired => "TOKEN_EXPIRED",
            VerifyError::Blacklisted(_) => "BLACKLISTED",
            VerifyError::ApiError(_) => "API_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::InvalidToken => ErrorKind::InvalidAttestation,
            VerifyError::DeviceIntegrityFailed => ErrorKind::InvalidAttestation,
            VerifyError::NonceMismatch => ErrorKind::InvalidNonce,
            VerifyError::TokenExpired => ErrorKind::ClockSkew,
            VerifyError::Blacklisted(_) => ErrorKind::InvalidAttestation,
            VerifyError::ApiError(_) => ErrorKind::UpstreamUnavailable,
        }
    }

    /// Only `API_ERROR` is retryable (spec §4.2 "only API_ERROR
    /// retryable/transient"); every other failure is a terminal rejection of
    /// this particular attestation.
    pub fn transience(&self) -> Transience {
        match self {
            VerifyError::ApiError(_) => Transience::Transient,
            _ => Transience::Permanent,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            VerifyError::ApiError(_) => StatusCode::BAD_GATEWAY,
            VerifyError::Blacklisted(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// Failure modes of `POST /report-fraud` and `POST /settle-offline`'s
/// forwarding step into the escrow program.
#[derive(Debug, Error)]
pub enum FraudError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("escrow program rejected the settlement: {0}")]
    Program(#[from] escrow_program::errors::ProgramError),
}

impl FraudError {
    pub fn code(&self) -> String {
        match self {
            FraudError::Verify(e) => e.code().to_string(),
            FraudError::Program(e) => format!("{e:?}"),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            FraudError::Verify(e) => e.status(),
            FraudError::Program(_) => StatusCode::CONFLICT,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: String,
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for FraudError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}
