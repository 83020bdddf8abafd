//! Device-side lifecycle for offline payment bundles.
//!
//! This crate owns the parts of the protocol that run on the payer's or
//! merchant's device: creating and co-signing [`offline_pay_types::OfflineBundle`]
//! records, driving them through the [`state::BundleState`] machine as
//! attestations and settlement results arrive, and persisting them with
//! [`store::BundleStore`] so a restart can resume in-flight work.
//!
//! # Modules
//!
//! - [`engine`] — [`engine::BundleEngine`], the synchronous core: bundle
//!   creation, co-signing, attestation attachment, and state transitions.
//! - [`worker`] — [`worker::SettlementWorker`], the async loop that drains
//!   the ready queue and talks to the attestation service and the ledger.
//! - [`client`] — HTTP clients for the attestation service and the escrow
//!   ledger, behind the [`client::AttestationClient`] / [`client::LedgerClient`]
//!   traits.
//! - [`signer`] — the [`signer::Signer`] trait and an in-memory Ed25519
//!   reference implementation.
//! - [`store`] — the versioned on-device record format and the
//!   [`store::BundleStore`] trait.
//! - [`state`] — the [`state::BundleState`] enum and its transition guard.
//! - [`retry`] — exponential backoff schedule for settlement attempts.
//! - [`diagnostics`] — a bounded event channel for observability hooks.
//! - [`errors`] — the crate's error type.

pub mod client;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod retry;
pub mod signer;
pub mod state;
pub mod store;
pub mod worker;

pub use client::{
    AttestationClient, HttpAttestationClient, HttpLedgerClient, LedgerClient, ATTESTATION_TIMEOUT,
    SETTLEMENT_TIMEOUT,
};
pub use diagnostics::{DiagnosticsSender, EngineEvent};
pub use engine::{BundleEngine, QueueEntry};
pub use errors::{EngineError, EngineResult};
pub use signer::{InMemorySigner, Signer};
pub use state::BundleState;
pub use store::{BundleRecord, BundleStore, InMemoryBundleStore, SCHEMA_VERSION};
pub use worker::{AlwaysOnline, ConnectivityProbe, SettlementWorker, CONNECTIVITY_PROBE_TIMEOUT};
