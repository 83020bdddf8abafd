use serde::{Deserialize, Serialize};

/// A bundle's position in its device-local settlement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleState {
    /// Co-signed, awaiting attestations.
    Pending,
    /// Both parties attested.
    Attested,
    /// Ready for the settlement worker.
    Queued,
    /// In-flight settlement; at most one concurrent attempt per bundle.
    Broadcast,
    /// Terminal success, ledger signature recorded.
    Settled,
    /// Terminal failure with a reason; transient failures may be promoted
    /// back to `Queued`.
    Failed,
    /// Resolution of a conflicting duplicate detected before settlement.
    Rollback,
}

impl BundleState {
    fn label(self) -> &'static str {
        match self {
            BundleState::Pending => "pending",
            BundleState::Attested => "attested",
            BundleState::Queued => "queued",
            BundleState::Broadcast => "broadcast",
            BundleState::Settled => "settled",
            BundleState::Failed => "failed",
            BundleState::Rollback => "rollback",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BundleState::Settled | BundleState::Rollback)
            || self == BundleState::Failed
    }

    /// Whether cancellation may still take effect: only before the bundle
    /// has been broadcast, since the ledger side cannot be cancelled once a
    /// settlement attempt is in flight.
    pub fn cancellable(self) -> bool {
        matches!(self, BundleState::Pending | BundleState::Attested | BundleState::Queued)
    }
}

/// Guards every mutating engine method against transitions outside the
/// lifecycle diagram.
pub fn can_transition(from: BundleState, to: BundleState) -> bool {
    use BundleState::*;
    matches!(
        (from, to),
        (Pending, Attested)
            | (Attested, Queued)
            | (Queued, Queued) // enqueue_for_settlement is idempotent
            | (Queued, Broadcast)
            | (Broadcast, Settled)
            | (Broadcast, Failed)
            | (Failed, Queued) // retry promotion, transient failures only
            | (Pending, Rollback)
            | (Attested, Rollback)
            | (Queued, Rollback)
    )
}

pub(crate) fn transition_label(from: BundleState, to: BundleState) -> (&'static str, &'static str) {
    (from.label(), to.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use BundleState::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        assert!(can_transition(Pending, Attested));
        assert!(can_transition(Attested, Queued));
        assert!(can_transition(Queued, Broadcast));
        assert!(can_transition(Broadcast, Settled));
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!can_transition(Pending, Queued));
        assert!(!can_transition(Pending, Broadcast));
        assert!(!can_transition(Attested, Broadcast));
    }

    #[test]
    fn rollback_only_reachable_before_broadcast() {
        assert!(can_transition(Pending, Rollback));
        assert!(can_transition(Queued, Rollback));
        assert!(!can_transition(Broadcast, Rollback));
        assert!(!can_transition(Settled, Rollback));
    }

    #[test]
    fn failed_bundles_may_be_requeued() {
        assert!(can_transition(Failed, Queued));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for to in [Pending, Attested, Queued, Broadcast, Settled, Failed, Rollback] {
            assert!(!can_transition(Settled, to));
            assert!(!can_transition(Rollback, to));
        }
    }

    #[test]
    fn cancellation_is_only_honoured_before_broadcast() {
        assert!(Pending.cancellable());
        assert!(Attested.cancellable());
        assert!(Queued.cancellable());
        assert!(!Broadcast.cancellable());
        assert!(!Settled.cancellable());
    }
}
