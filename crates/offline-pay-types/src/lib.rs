//! Core wire types for the offline stablecoin payment protocol.
//!
//! This crate provides the foundational data structures shared by the three
//! protocol components: the device-side bundle engine, the attestation
//! service, and the on-chain escrow program. It carries no I/O of its own.
//!
//! # Modules
//!
//! - [`bundle`] — [`OfflineBundle`](bundle::OfflineBundle) and the canonical
//!   bundle hash both parties sign.
//! - [`attestation`] — attestation envelopes, proofs, and the canonical
//!   attestation root the service and the on-chain verifier both compute.
//! - [`proto`] — HTTP wire bodies for the attestation service API.
//! - [`ring`] — the bounded, insertion-ordered ring buffer used for
//!   nonce-registry history.
//! - [`keys`] — Ed25519 public key / signature newtypes.
//! - [`timestamp`] — epoch-millisecond timestamps.
//! - [`error`] — the shared error-kind taxonomy.

pub mod attestation;
pub mod bundle;
pub mod error;
pub mod keys;
pub mod proto;
pub mod ring;
pub mod timestamp;
pub mod util;

pub use attestation::{
    AttestationEnvelope, AttestationProof, BundleSummary, DeviceInfo, Role, SecurityLevel,
};
pub use bundle::{OfflineBundle, Token};
pub use error::ErrorKind;
pub use keys::{PublicKey, Signature};
pub use ring::RingBuffer;
pub use timestamp::EpochMillis;
