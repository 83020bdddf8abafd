//! The [`AttestationVerifier`] trait: the service's own facilitation
//! boundary, mirroring the shape of a payment facilitator's verify/settle
//! split — one call turns device evidence into a signed proof, a second
//! records fraud evidence against a device's reputation.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;

use offline_pay_types::proto::{
    Proofs, ReportFraudRequest, VerifyAttestationRequest,
};

/// Validates attestation envelopes and issues settlement proofs
/// (spec §4.2), and records fraud reports against device reputation
/// (spec §4.2 "Reputation tracking").
///
/// Implementors run the six-step validation pipeline; callers never see
/// that pipeline directly, only the success/failure of the two operations
/// it backs.
pub trait AttestationVerifier: Send + Sync {
    type Error: Debug + Display;

    fn verify_attestation(
        &self,
        request: VerifyAttestationRequest,
    ) -> impl Future<Output = Result<Proofs, Self::Error>> + Send;

    fn report_fraud(
        &self,
        request: ReportFraudRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T> AttestationVerifier for Arc<T>
where
    T: AttestationVerifier + Send + Sync,
{
    type Error = T::Error;

    fn verify_attestation(
        &self,
        request: VerifyAttestationRequest,
    ) -> impl Future<Output = Result<Proofs, Self::Error>> + Send {
        T::verify_attestation(self, request)
    }

    fn report_fraud(
        &self,
        request: ReportFraudRequest,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        T::report_fraud(self, request)
    }
}
