//! Abstracted settlement state machine for offline bundles: escrow and
//! nonce-registry account layouts, the instructions that mutate them, and
//! the `Ledger` trait standing in for whatever chain runtime hosts them.

pub mod errors;
pub mod events;
pub mod instructions;
pub mod ledger;
pub mod state;
pub mod verifier_key;

pub use errors::{ProgramError, ProgramResult};
pub use events::Event;
pub use ledger::{InMemoryLedger, Ledger};
pub use state::{
    BundleHistoryEntry, DerivedAddress, EscrowAccount, EscrowAccountV0, FraudRecord, FraudReason,
    NonceRegistry, derive_escrow_address, derive_nonce_registry_address,
};
pub use verifier_key::VerifierKey;
