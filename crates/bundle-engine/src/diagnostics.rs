//! Bounded diagnostics channel for settlement-worker observability. Carries
//! `EngineEvent`s out of the worker loop for a host application to log,
//! display, or forward; if nobody drains it fast enough the oldest event is
//! dropped rather than blocking the worker.

use offline_pay_types::EpochMillis;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    BundleCreated { bundle_id: String },
    StateTransitioned { bundle_id: String, from: &'static str, to: &'static str },
    SettlementSucceeded { bundle_id: String, signature: String },
    SettlementFailed { bundle_id: String, reason: String, retry_after: Option<EpochMillis> },
}

const DEFAULT_CAPACITY: usize = 256;

pub struct DiagnosticsSender {
    sender: mpsc::Sender<EngineEvent>,
}

impl DiagnosticsSender {
    /// Sends `event`, dropping the event rather than waiting if the channel
    /// is full. Diagnostics must never slow down settlement.
    pub fn send(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.sender.try_send(event) {
            tracing::warn!("diagnostics channel full, dropping event");
        }
    }
}

pub fn channel() -> (DiagnosticsSender, mpsc::Receiver<EngineEvent>) {
    let (sender, receiver) = mpsc::channel(DEFAULT_CAPACITY);
    (DiagnosticsSender { sender }, receiver)
}
