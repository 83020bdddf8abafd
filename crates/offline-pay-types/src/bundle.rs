//! The offline payment contract exchanged between payer and merchant devices
//! (spec §3, §4.1).

use crate::keys::{PublicKey, Signature};
use crate::timestamp::EpochMillis;
use crate::util::{amount_str, b64};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The asset moved by a bundle: a mint identity, an amount in the smallest
/// unit of that mint, and a display-only symbol (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(with = "b64")]
    pub mint: [u8; 32],
    #[serde(with = "amount_str")]
    pub amount: u64,
    pub symbol: String,
}

/// The signed offline payment record (spec §3 `OfflineBundle`).
///
/// `bundle_hash` is deliberately not a field: it is always recomputed from
/// the other fields (Invariant B1), never trusted from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineBundle {
    pub tx_id: String,
    pub payer_pubkey: PublicKey,
    pub merchant_pubkey: PublicKey,
    pub token: Token,
    pub nonce: u64,
    pub timestamp: EpochMillis,
    pub payer_signature: Option<Signature>,
    pub merchant_signature: Option<Signature>,
}

impl OfflineBundle {
    /// Canonical SHA-256 bundle hash (spec §4.1): the concatenation, in
    /// this exact order, of payer_pubkey (32B) ‖ merchant_pubkey (32B) ‖
    /// mint (32B) ‖ amount (8B LE u64) ‖ nonce (8B LE u64) ‖ timestamp (8B LE
    /// i64) ‖ length-prefixed tx_id (4B LE u32 length, then UTF-8 bytes).
    /// Signatures are excluded (Invariant B1) so both parties can sign the
    /// same bytes independently.
    pub fn bundle_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.payer_pubkey.as_bytes());
        hasher.update(self.merchant_pubkey.as_bytes());
        hasher.update(self.token.mint);
        hasher.update(self.token.amount.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        let tx_id_bytes = self.tx_id.as_bytes();
        hasher.update((tx_id_bytes.len() as u32).to_le_bytes());
        hasher.update(tx_id_bytes);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> OfflineBundle {
        OfflineBundle {
            tx_id: "tx-0001-abcdefgh".to_string(),
            payer_pubkey: PublicKey([1u8; 32]),
            merchant_pubkey: PublicKey([2u8; 32]),
            token: Token {
                mint: [3u8; 32],
                amount: 25_000_000,
                symbol: "USDX".to_string(),
            },
            nonce: 1,
            timestamp: EpochMillis(1_700_000_000_000),
            payer_signature: None,
            merchant_signature: None,
        }
    }

    #[test]
    fn hash_is_deterministic_and_excludes_signatures() {
        let mut a = sample_bundle();
        let b_hash_before = a.bundle_hash();
        a.payer_signature = Some(Signature([9u8; 64]));
        let hash_after_signing = a.bundle_hash();
        assert_eq!(b_hash_before, hash_after_signing);
    }

    #[test]
    fn hash_changes_with_any_field() {
        let a = sample_bundle();
        let mut b = sample_bundle();
        b.nonce = 2;
        assert_ne!(a.bundle_hash(), b.bundle_hash());
    }

    #[test]
    fn round_trips_through_json() {
        let bundle = sample_bundle();
        let json = serde_json::to_string(&bundle).expect("serialize");
        let decoded: OfflineBundle = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(bundle, decoded);
        assert_eq!(bundle.bundle_hash(), decoded.bundle_hash());
    }

    #[test]
    fn tx_id_length_prefix_disambiguates_concatenation() {
        // Two tx_ids that would produce the same bytes under naive
        // concatenation must still hash differently once length-prefixed.
        let mut a = sample_bundle();
        let mut b = sample_bundle();
        a.tx_id = "ab".to_string();
        b.tx_id = "a".to_string(); // + would-be suffix "b" from another field; prefix prevents collision
        assert_ne!(a.bundle_hash(), b.bundle_hash());
    }
}
