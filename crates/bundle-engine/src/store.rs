//! Device-local persistence for bundle records. The trait is storage-engine
//! agnostic; the in-memory implementation still round-trips records through
//! a versioned byte encoding so a real on-disk backend (sled, sqlite, a flat
//! file) can reuse `encode_record`/`decode_record` unchanged.

use crate::errors::{EngineError, EngineResult};
use crate::state::BundleState;
use offline_pay_types::attestation::AttestationEnvelope;
use offline_pay_types::{AttestationProof, EpochMillis, OfflineBundle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bumped whenever `BundleRecord`'s shape changes incompatibly. Readers must
/// reject records with a different version rather than guess at the layout.
pub const SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRecord {
    pub bundle_id: String,
    pub bundle: OfflineBundle,
    pub state: BundleState,
    pub payer_envelope: Option<AttestationEnvelope>,
    pub merchant_envelope: Option<AttestationEnvelope>,
    pub payer_proof: Option<AttestationProof>,
    pub merchant_proof: Option<AttestationProof>,
    pub enqueued_at: Option<EpochMillis>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub ledger_signature: Option<String>,
    /// When a retried bundle becomes eligible to be pulled again, persisted
    /// alongside the bundle so a restart resumes the same backoff schedule
    /// (spec §9 "coroutine-style retry loops").
    pub next_attempt_at: Option<EpochMillis>,
}

impl BundleRecord {
    pub fn new(bundle: OfflineBundle) -> Self {
        Self {
            bundle_id: bundle.tx_id.clone(),
            bundle,
            state: BundleState::Pending,
            payer_envelope: None,
            merchant_envelope: None,
            payer_proof: None,
            merchant_proof: None,
            enqueued_at: None,
            retry_count: 0,
            last_error: None,
            ledger_signature: None,
            next_attempt_at: None,
        }
    }
}

/// Serializes a record with its schema version prefixed as the first byte.
pub fn encode_record(record: &BundleRecord) -> Vec<u8> {
    let mut bytes = vec![SCHEMA_VERSION];
    bytes.extend(serde_json::to_vec(record).expect("BundleRecord is always serializable"));
    bytes
}

/// Decodes a record previously produced by `encode_record`. Returns
/// `EngineError::SchemaMismatch` rather than attempting to reinterpret bytes
/// written under a different schema version.
pub fn decode_record(bytes: &[u8]) -> EngineResult<BundleRecord> {
    let (version, payload) = bytes.split_first().ok_or_else(|| EngineError::SchemaMismatch {
        expected: SCHEMA_VERSION,
        found: 0,
    })?;
    if *version != SCHEMA_VERSION {
        return Err(EngineError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            found: *version,
        });
    }
    serde_json::from_slice(payload).map_err(|_| EngineError::SchemaMismatch {
        expected: SCHEMA_VERSION,
        found: *version,
    })
}

pub trait BundleStore: Send + Sync {
    fn get(&self, bundle_id: &str) -> Option<BundleRecord>;
    fn put(&mut self, record: BundleRecord);
    fn has_seen_hash(&self, hash: &[u8; 32]) -> bool;

    /// All `Queued` records, oldest `enqueued_at` first.
    fn list_queued_fifo(&self) -> Vec<BundleRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryBundleStore {
    records: HashMap<String, Vec<u8>>,
}

impl InMemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BundleStore for InMemoryBundleStore {
    fn get(&self, bundle_id: &str) -> Option<BundleRecord> {
        let bytes = self.records.get(bundle_id)?;
        decode_record(bytes).ok()
    }

    fn put(&mut self, record: BundleRecord) {
        self.records.insert(record.bundle_id.clone(), encode_record(&record));
    }

    fn has_seen_hash(&self, hash: &[u8; 32]) -> bool {
        self.records
            .values()
            .filter_map(|bytes| decode_record(bytes).ok())
            .any(|record| &record.bundle.bundle_hash() == hash)
    }

    fn list_queued_fifo(&self) -> Vec<BundleRecord> {
        let mut queued: Vec<BundleRecord> = self
            .records
            .values()
            .filter_map(|bytes| decode_record(bytes).ok())
            .filter(|record| record.state == BundleState::Queued)
            .collect();
        queued.sort_by_key(|record| record.enqueued_at);
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offline_pay_types::{PublicKey, Token};

    fn sample_bundle(tx_id: &str) -> OfflineBundle {
        OfflineBundle {
            tx_id: tx_id.to_string(),
            payer_pubkey: PublicKey([1u8; 32]),
            merchant_pubkey: PublicKey([2u8; 32]),
            token: Token {
                mint: [3u8; 32],
                amount: 100,
                symbol: "USDX".into(),
            },
            nonce: 1,
            timestamp: EpochMillis(0),
            payer_signature: None,
            merchant_signature: None,
        }
    }

    #[test]
    fn round_trips_through_versioned_encoding() {
        let record = BundleRecord::new(sample_bundle("tx-1"));
        let bytes = encode_record(&record);
        let decoded = decode_record(&bytes).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn mismatched_schema_version_is_rejected() {
        let record = BundleRecord::new(sample_bundle("tx-1"));
        let mut bytes = encode_record(&record);
        bytes[0] = SCHEMA_VERSION + 1;
        let result = decode_record(&bytes);
        assert_eq!(
            result,
            Err(EngineError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: SCHEMA_VERSION + 1
            })
        );
    }

    #[test]
    fn list_queued_fifo_orders_by_enqueue_time() {
        let mut store = InMemoryBundleStore::new();
        let mut first = BundleRecord::new(sample_bundle("tx-1"));
        first.state = BundleState::Queued;
        first.enqueued_at = Some(EpochMillis(100));
        let mut second = BundleRecord::new(sample_bundle("tx-2"));
        second.state = BundleState::Queued;
        second.enqueued_at = Some(EpochMillis(50));
        store.put(first);
        store.put(second);

        let queued = store.list_queued_fifo();
        assert_eq!(queued[0].bundle_id, "tx-2");
        assert_eq!(queued[1].bundle_id, "tx-1");
    }

    #[test]
    fn has_seen_hash_detects_existing_bundle() {
        let mut store = InMemoryBundleStore::new();
        let record = BundleRecord::new(sample_bundle("tx-1"));
        let hash = record.bundle.bundle_hash();
        store.put(record);
        assert!(store.has_seen_hash(&hash));
        assert!(!store.has_seen_hash(&[0u8; 32]));
    }
}
