//! Attestation service HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server exposing the attestation
//! service's interface for validating device integrity attestations and
//! issuing the signed proofs the escrow program trusts.
//!
//! Endpoints:
//! - `POST /verify-attestation` – Validate a payer/merchant attestation and
//!   return signed proofs.
//! - `POST /settle-offline` – Forward a fully-attested bundle to the escrow
//!   program.
//! - `POST /report-fraud` – Record a fraud report against a device.
//! - `GET /health` – Liveness probe.
//! - `GET /supported` – List supported operations.
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` (or `--config`) selects the JSON config file
//! - `RUST_LOG` controls tracing verbosity

use attestation_service::config::Config;
use attestation_service::handlers::{router, AppState};
use attestation_service::sig_down::SigDown;
use attestation_service::telemetry;
use dotenvy::dotenv;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    telemetry::init(env!("CARGO_PKG_NAME"));

    let config = Config::load()?;
    let state = AppState::new(&config);
    let http_endpoints = router(state);

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!(network = ?config.network(), "starting attestation service at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        });

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    let graceful_shutdown = async move { cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(graceful_shutdown)
        .await?;

    Ok(())
}
