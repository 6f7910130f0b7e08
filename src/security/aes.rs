//! AES-256-GCM payload encryption at rest, keyed by a PBKDF2-HMAC-SHA256
//! derivation from `QMN_ENCRYPTION_SECRET` (spec.md §9). Every message gets
//! its own random salt and nonce, so no two ciphertexts share a key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CoreError, CoreResult};

const PBKDF2_ROUNDS: u32 = 100_000;
const SALT_LEN: usize = 16;

pub struct SecureVault {
    secret: String,
}

impl SecureVault {
    pub fn from_secret(secret: &str) -> Self {
        SecureVault { secret: secret.to_string() }
    }

    fn derive_cipher(&self, salt: &[u8]) -> Aes256Gcm {
        let mut key_bytes = [0u8; 32];
        pbkdf2_hmac::<Sha256>(self.secret.as_bytes(), salt, PBKDF2_ROUNDS, &mut key_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Aes256Gcm::new(key)
    }

    /// Encrypt plaintext under a freshly derived key, returning
    /// `"salt_hex:nonce_hex:ciphertext_hex"`.
    pub fn encrypt(&self, plaintext: &str) -> CoreResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = self.derive_cipher(&salt_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CoreError::Internal(format!("encryption failed: {e}")))?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(salt_bytes),
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    pub fn decrypt(&self, encrypted: &str) -> CoreResult<String> {
        let mut parts = encrypted.splitn(3, ':');
        let salt_hex = parts
            .next()
            .ok_or_else(|| CoreError::Validation("expected 'salt:nonce:ciphertext'".into()))?;
        let nonce_hex = parts
            .next()
            .ok_or_else(|| CoreError::Validation("expected 'salt:nonce:ciphertext'".into()))?;
        let ciphertext_hex = parts
            .next()
            .ok_or_else(|| CoreError::Validation("expected 'salt:nonce:ciphertext'".into()))?;

        let salt_bytes =
            hex::decode(salt_hex).map_err(|e| CoreError::Validation(format!("invalid salt hex: {e}")))?;
        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|e| CoreError::Validation(format!("invalid nonce hex: {e}")))?;
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|e| CoreError::Validation(format!("invalid ciphertext hex: {e}")))?;

        let nonce = Nonce::from_slice(&nonce_bytes);
        let cipher = self.derive_cipher(&salt_bytes);
        let plaintext_bytes = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| CoreError::Internal(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext_bytes)
            .map_err(|e| CoreError::Internal(format!("invalid utf-8 plaintext: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let vault = SecureVault::from_secret("correct horse battery staple");
        let ciphertext = vault.encrypt("nutrient payload").unwrap();
        assert_ne!(ciphertext, "nutrient payload");
        assert_eq!(vault.decrypt(&ciphertext).unwrap(), "nutrient payload");
    }

    #[test]
    fn wrong_secret_fails_to_decrypt() {
        let vault_a = SecureVault::from_secret("secret-a");
        let vault_b = SecureVault::from_secret("secret-b");
        let ciphertext = vault_a.encrypt("sensitive").unwrap();
        assert!(vault_b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn same_plaintext_encrypts_differently_each_call() {
        let vault = SecureVault::from_secret("correct horse battery staple");
        let a = vault.encrypt("nutrient payload").unwrap();
        let b = vault.encrypt("nutrient payload").unwrap();
        assert_ne!(a, b, "salt and nonce must both vary per call");
        assert_ne!(a.split(':').next(), None);
        assert_ne!(a.split(':').next(), b.split(':').next(), "salts must differ");
        assert_eq!(vault.decrypt(&a).unwrap(), "nutrient payload");
        assert_eq!(vault.decrypt(&b).unwrap(), "nutrient payload");
    }
}
