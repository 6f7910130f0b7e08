//! Ed25519 signing identity, used to sign audit events (spec.md §6/§9).

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CoreError, CoreResult};

#[derive(Clone)]
pub struct SigningIdentity {
    signing_key_bytes: [u8; 32],
    pub pubkey_hex: String,
}

impl SigningIdentity {
    pub fn generate() -> Self {
        let mut key_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut key_bytes);
        Self::from_bytes(key_bytes)
    }

    /// Derive a stable identity from an arbitrary-length seed string
    /// (`QMN_SIGNING_KEY`), hashing it down to 32 bytes.
    pub fn from_seed(seed: &str) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(seed.as_bytes());
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&digest);
        Self::from_bytes(key_bytes)
    }

    fn from_bytes(key_bytes: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&key_bytes);
        let verifying_key = VerifyingKey::from(&signing_key);
        SigningIdentity {
            signing_key_bytes: key_bytes,
            pubkey_hex: hex::encode(verifying_key.to_bytes()),
        }
    }

    fn keys(&self) -> (SigningKey, VerifyingKey) {
        let s_key = SigningKey::from_bytes(&self.signing_key_bytes);
        let v_key = VerifyingKey::from(&s_key);
        (s_key, v_key)
    }

    pub fn sign(&self, data: &[u8]) -> String {
        let (signing_key, _) = self.keys();
        let signature: Signature = signing_key.sign(data);
        hex::encode(signature.to_bytes())
    }
}

/// Verify a hex-encoded signature against a hex-encoded public key.
pub fn verify(pubkey_hex: &str, data: &[u8], signature_hex: &str) -> CoreResult<bool> {
    let key_bytes = hex::decode(pubkey_hex)
        .map_err(|e| CoreError::Validation(format!("invalid pubkey hex: {e}")))?;
    if key_bytes.len() != 32 {
        return Err(CoreError::Validation("public key must be 32 bytes".into()));
    }
    let mut key_arr = [0u8; 32];
    key_arr.copy_from_slice(&key_bytes);
    let verifying_key = VerifyingKey::from_bytes(&key_arr)
        .map_err(|e| CoreError::Validation(format!("invalid public key: {e}")))?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| CoreError::Validation(format!("invalid signature hex: {e}")))?;
    if sig_bytes.len() != 64 {
        return Err(CoreError::Validation("signature must be 64 bytes".into()));
    }
    let mut sig_arr = [0u8; 64];
    sig_arr.copy_from_slice(&sig_bytes);
    let signature = Signature::from_slice(&sig_arr)
        .map_err(|e| CoreError::Validation(format!("malformed signature: {e}")))?;

    Ok(verifying_key.verify(data, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_and_verifies_roundtrip() {
        let identity = SigningIdentity::from_seed("test-seed");
        let sig = identity.sign(b"hello");
        assert!(verify(&identity.pubkey_hex, b"hello", &sig).unwrap());
        assert!(!verify(&identity.pubkey_hex, b"tampered", &sig).unwrap());
    }

    #[test]
    fn same_seed_yields_stable_identity() {
        let a = SigningIdentity::from_seed("seed-a");
        let b = SigningIdentity::from_seed("seed-a");
        assert_eq!(a.pubkey_hex, b.pubkey_hex);
    }
}
