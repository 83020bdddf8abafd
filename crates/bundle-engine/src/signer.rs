//! Secure-element capability abstraction: the engine never touches raw key
//! material directly, only this trait, so a real mobile host can back it
//! with Strongbox/TEE-resident keys without the engine's logic changing.

use ed25519_dalek::{Signer as _, SigningKey, Verifier, VerifyingKey};
use offline_pay_types::keys::{PublicKey, Signature};

pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;
    fn sign(&self, message: &[u8]) -> Signature;
}

/// Reference implementation for tests and non-mobile hosts. Not suitable for
/// production: the key lives in process memory with no hardware backing.
pub struct InMemorySigner {
    signing_key: SigningKey,
}

impl InMemorySigner {
    pub fn generate<R: rand::CryptoRng + rand::RngCore>(rng: &mut R) -> Self {
        Self {
            signing_key: SigningKey::generate(rng),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }
}

impl Signer for InMemorySigner {
    fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

/// Verifies `signature` over `message` against `public_key`. Used on both
/// the cosigning path (verifying the payer's signature) and in the parity
/// test that checks local-sign output against what a server-submit path
/// would independently verify.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let dalek_signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key.verify(message, &dalek_signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn signs_and_verifies_round_trip() {
        let signer = InMemorySigner::generate(&mut OsRng);
        let message = b"bundle-hash-bytes";
        let signature = signer.sign(message);
        assert!(verify(&signer.public_key(), message, &signature));
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer = InMemorySigner::generate(&mut OsRng);
        let signature = signer.sign(b"original");
        assert!(!verify(&signer.public_key(), b"different", &signature));
    }
}
