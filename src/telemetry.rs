//! Tracing subscriber setup for the attestation service.
//!
//! Structured logging only, no OpenTelemetry/OTLP export: there is no
//! metrics backend configured for this service to export to, and generic
//! log collection is an external collaborator's concern.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a `tracing-subscriber` registry honoring `RUST_LOG`, defaulting
/// to `info` when unset.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    tracing::info!(
        service = service_name,
        version = env!("CARGO_PKG_VERSION"),
        "tracing initialized"
    );
}
