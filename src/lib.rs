//! Attestation service: the off-chain trusted verifier in the offline
//! stablecoin payment protocol.
//!
//! This crate validates device integrity attestations submitted by payer
//! and merchant devices, issues the Ed25519-signed proofs the escrow
//! program trusts, and optionally forwards settlement requests to that
//! program on the device's behalf. It carries no on-device or on-chain
//! logic of its own; those live in the `bundle-engine` and `escrow-program`
//! crates of this workspace.
//!
//! # Modules
//!
//! - [`config`] — server configuration, loaded from a JSON file.
//! - [`verifier`] — the [`verifier::AttestationVerifier`] trait.
//! - [`service`] — [`service::AttestationServiceLocal`], the reference
//!   verifier implementation: validation pipeline, reputation tracking,
//!   and the attestation cache.
//! - [`handlers`] — HTTP endpoint handlers (`/verify-attestation`,
//!   `/settle-offline`, `/report-fraud`, `/health`, `/supported`).
//! - [`errors`] — error types returned by the handlers.
//! - [`telemetry`] — tracing subscriber setup.
//! - [`sig_down`] — graceful shutdown signal handling.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod service;
pub mod sig_down;
pub mod telemetry;
pub mod verifier;
