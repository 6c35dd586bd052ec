//! Reversible obfuscation for stored items.
//!
//! A single 32-byte key is derived with HKDF-SHA256 from the application
//! secret; every write gets a fresh random nonce. The output is
//! `base64(nonce || ciphertext || tag)`. The secret ships with every build,
//! so this keeps tokens out of casual view of anyone reading the storage
//! files; it does not protect against someone holding the binary.

use crate::{StorageError, StorageResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

const KDF_INFO: &[u8] = b"console-storage-encryption-v1";

/// Symmetric cipher keyed by the application secret.
#[derive(Clone)]
pub struct StorageCipher {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for StorageCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCipher").finish_non_exhaustive()
    }
}

impl StorageCipher {
    /// Derive the storage key from the application secret.
    pub fn from_secret(secret: &str) -> StorageResult<Self> {
        if secret.is_empty() {
            return Err(StorageError::Encoding(
                "storage secret must not be empty".to_string(),
            ));
        }

        let hkdf = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(KDF_INFO, &mut key)
            .map_err(|e| StorageError::Encoding(format!("HKDF expand failed: {:?}", e)))?;

        Ok(Self { key })
    }

    /// Encrypt `plaintext` and return the printable form.
    pub fn seal(&self, plaintext: &str) -> StorageResult<String> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Reverse [`seal`](Self::seal). Fails on foreign, truncated or tampered input.
    pub fn open(&self, sealed: &str) -> StorageResult<String> {
        let bytes = BASE64
            .decode(sealed.trim())
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        if bytes.len() <= NONCE_SIZE {
            return Err(StorageError::Encoding(format!(
                "sealed value too short: {} bytes",
                bytes.len()
            )));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| StorageError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> StorageCipher {
        StorageCipher::from_secret("test-secret").unwrap()
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let c = cipher();
        let sealed = c.seal("{\"value\":\"token\"}").unwrap();
        assert!(!sealed.contains("token"));
        assert_eq!(c.open(&sealed).unwrap(), "{\"value\":\"token\"}");
    }

    #[test]
    fn test_nonce_differs_per_seal() {
        let c = cipher();
        assert_ne!(c.seal("same").unwrap(), c.seal("same").unwrap());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sealed = cipher().seal("secret message").unwrap();
        let other = StorageCipher::from_secret("another-secret").unwrap();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn test_plaintext_jwt_is_rejected() {
        let c = cipher();
        assert!(c
            .open("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig")
            .is_err());
    }

    #[test]
    fn test_truncated_input_rejected() {
        let c = cipher();
        assert!(c.open(&BASE64.encode([0u8; 4])).is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(StorageCipher::from_secret("").is_err());
    }
}
