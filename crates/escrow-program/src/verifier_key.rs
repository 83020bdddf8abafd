//! The escrow program's view of the attestation verifier's public key
//! (spec §4.3 check 4: "Ed25519-verify `payer_proof.signature` ... with the
//! hard-coded verifier public key"). The program never learns this key from
//! instruction data; it is configured once, out of band, when the program
//! is deployed.

use ed25519_dalek::{Signature as DalekSignature, Verifier, VerifyingKey};
use offline_pay_types::AttestationProof;

#[derive(Debug, Clone, Copy)]
pub struct VerifierKey(pub [u8; 32]);

impl VerifierKey {
    /// Verifies `proof.signature` over `proof.root` against this key.
    pub fn verify(&self, proof: &AttestationProof) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = DalekSignature::from_bytes(proof.signature.as_bytes());
        verifying_key.verify(&proof.root, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use offline_pay_types::{EpochMillis, Signature};
    use rand::rngs::OsRng;

    fn signed_proof(signing_key: &SigningKey, root: [u8; 32]) -> AttestationProof {
        let signature = signing_key.sign(&root);
        AttestationProof {
            root,
            nonce: [0u8; 32],
            timestamp: EpochMillis(0),
            signature: Signature(signature.to_bytes()),
        }
    }

    #[test]
    fn accepts_genuine_signature_and_rejects_tampered() {
        let mut rng = OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        let verifier_key = VerifierKey(signing_key.verifying_key().to_bytes());

        let proof = signed_proof(&signing_key, [7u8; 32]);
        assert!(verifier_key.verify(&proof));

        let mut tampered = proof.clone();
        let mut sig_bytes = *tampered.signature.as_bytes();
        sig_bytes[0] ^= 0xFF;
        tampered.signature = Signature(sig_bytes);
        assert!(!verifier_key.verify(&tampered));
    }
}
