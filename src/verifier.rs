//! Elliptic-curve signature verifier (§6.1 ADDED, §4.6 "Finalization").

use ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};

pub trait SignatureVerifier {
    /// Verifies `signature` over `hash` (the flash writer's running SHA-256,
    /// §4.6) under `public_key`. `false` on any malformed-signature or
    /// verification failure — the caller treats both the same way (reject).
    fn verify(&self, public_key: &VerifyingKey, hash: &[u8; 32], signature: &[u8]) -> bool;
}

/// Verifies against a P-256/ECDSA public key using the prehashed digest
/// directly, matching `dfu_sha256`'s output (§4.6, §9 "signature read
/// address").
#[derive(Default)]
pub struct P256Verifier;

impl SignatureVerifier for P256Verifier {
    fn verify(&self, public_key: &VerifyingKey, hash: &[u8; 32], signature: &[u8]) -> bool {
        let Ok(sig) = Signature::from_slice(signature) else {
            return false;
        };
        public_key.verify_prehash(hash, &sig).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ecdsa::signature::hazmat::PrehashSigner;
    use p256::ecdsa::SigningKey;

    use super::*;

    #[test]
    fn verify_accepts_matching_signature_and_rejects_wrong_hash() {
        let signing_key = SigningKey::from_bytes(&[0x11; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let hash = [0x42u8; 32];
        let sig: Signature = signing_key.sign_prehash(&hash).unwrap();

        let verifier = P256Verifier;
        assert!(verifier.verify(&verifying_key, &hash, sig.to_bytes().as_slice()));

        let wrong_hash = [0x43u8; 32];
        assert!(!verifier.verify(&verifying_key, &wrong_hash, sig.to_bytes().as_slice()));
    }

    #[test]
    fn verify_rejects_malformed_signature_bytes() {
        let signing_key = SigningKey::from_bytes(&[0x22; 32].into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let verifier = P256Verifier;
        assert!(!verifier.verify(&verifying_key, &[0u8; 32], &[0u8; 3]));
    }
}
