//! On-chain account layouts (spec §3) and their deterministic addresses
//! (spec §4.3 "Derived addresses").

use offline_pay_types::ring::RingBuffer;
use offline_pay_types::{EpochMillis, PublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const RECENT_HASHES_CAPACITY: usize = 16;
pub const BUNDLE_HISTORY_CAPACITY: usize = 32;
pub const FRAUD_RECORDS_CAPACITY: usize = 16;

/// A 32-byte program-derived address plus the bump byte used to derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedAddress {
    pub address: [u8; 32],
    pub bump: u8,
}

fn derive(domain: &[u8], owner: &PublicKey) -> DerivedAddress {
    // Try decreasing bump values until the domain-tagged hash does not
    // collide with the raw owner key, mirroring the canonical
    // find-program-address pattern used by account-derivation runtimes.
    for bump in (0u8..=255).rev() {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update(owner.as_bytes());
        hasher.update([bump]);
        let candidate: [u8; 32] = hasher.finalize().into();
        if candidate != *owner.as_bytes() {
            return DerivedAddress {
                address: candidate,
                bump,
            };
        }
    }
    unreachable!("256 bump attempts exhausted without finding a valid derivation")
}

/// `derive("escrow", owner_pubkey)` (spec §4.3).
pub fn derive_escrow_address(owner: &PublicKey) -> DerivedAddress {
    derive(b"escrow", owner)
}

/// `derive("nonce", owner_pubkey)` (spec §4.3).
pub fn derive_nonce_registry_address(owner: &PublicKey) -> DerivedAddress {
    derive(b"nonce", owner)
}

/// One per owner (spec §3 `EscrowAccount`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccount {
    pub owner: PublicKey,
    pub escrow_token_account: [u8; 32],
    pub escrow_balance: u64,
    pub last_nonce: u64,
    pub reputation_score: u16,
    pub total_spent: u64,
    pub created_at: EpochMillis,
    pub bump: u8,
}

impl EscrowAccount {
    pub fn new(owner: PublicKey, escrow_token_account: [u8; 32], bump: u8, now: EpochMillis) -> Self {
        Self {
            owner,
            escrow_token_account,
            escrow_balance: 0,
            last_nonce: 0,
            reputation_score: 0,
            total_spent: 0,
            created_at: now,
            bump,
        }
    }
}

/// A legacy, shorter account layout (spec §9 open question: migration is
/// explicitly NOT automatic — see `crate::instructions::migrate_escrow`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowAccountV0 {
    pub owner: PublicKey,
    pub escrow_balance: u64,
    pub last_nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHistoryEntry {
    pub bundle_hash: [u8; 32],
    pub merchant: PublicKey,
    pub amount: u64,
    pub settled_at: EpochMillis,
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudReason {
    DuplicateBundle,
    InvalidAttestation,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudRecord {
    pub bundle_hash: [u8; 32],
    pub conflicting_hash: [u8; 32],
    pub reporter: PublicKey,
    pub reported_at: EpochMillis,
    pub reason: FraudReason,
}

/// One per payer (spec §3 `NonceRegistry`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceRegistry {
    pub owner: PublicKey,
    pub last_nonce: u64,
    pub recent_bundle_hashes: RingBuffer<[u8; 32], RECENT_HASHES_CAPACITY>,
    pub bundle_history: RingBuffer<BundleHistoryEntry, BUNDLE_HISTORY_CAPACITY>,
    pub fraud_records: RingBuffer<FraudRecord, FRAUD_RECORDS_CAPACITY>,
}

impl NonceRegistry {
    pub fn new(owner: PublicKey) -> Self {
        Self {
            owner,
            last_nonce: 0,
            recent_bundle_hashes: RingBuffer::new(),
            bundle_history: RingBuffer::new(),
            fraud_records: RingBuffer::new(),
        }
    }

    pub fn has_seen_hash(&self, hash: &[u8; 32]) -> bool {
        self.recent_bundle_hashes.contains(|h| h == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_addresses_differ_by_domain() {
        let owner = PublicKey([7u8; 32]);
        let escrow = derive_escrow_address(&owner);
        let nonce = derive_nonce_registry_address(&owner);
        assert_ne!(escrow.address, nonce.address);
    }

    #[test]
    fn derivation_is_deterministic() {
        let owner = PublicKey([9u8; 32]);
        let a = derive_escrow_address(&owner);
        let b = derive_escrow_address(&owner);
        assert_eq!(a, b);
    }

    #[test]
    fn different_owners_derive_different_addresses() {
        let a = derive_escrow_address(&PublicKey([1u8; 32]));
        let b = derive_escrow_address(&PublicKey([2u8; 32]));
        assert_ne!(a.address, b.address);
    }
}
