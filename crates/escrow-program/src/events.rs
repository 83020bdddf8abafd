//! Events emitted by the escrow program for observers (spec §4.3 step 10,
//! generalized to every instruction per spec §4.3 item 6's framing of event
//! emission as a general program responsibility).

use offline_pay_types::{EpochMillis, PublicKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NonceRegistryInitialized {
        owner: PublicKey,
    },
    EscrowInitialized {
        owner: PublicKey,
        initial_amount: u64,
    },
    EscrowFunded {
        owner: PublicKey,
        amount: u64,
        new_balance: u64,
    },
    EscrowWithdrawn {
        owner: PublicKey,
        amount: u64,
        new_balance: u64,
    },
    PaymentSettled {
        payer: PublicKey,
        merchant: PublicKey,
        amount: u64,
        nonce: u64,
        bundle_id: String,
    },
    BundleHistoryRecorded {
        payer: PublicKey,
        bundle_hash: [u8; 32],
        nonce: u64,
        settled_at: EpochMillis,
    },
    FraudReported {
        payer: PublicKey,
        bundle_hash: [u8; 32],
        conflicting_hash: [u8; 32],
    },
}
