//! Symmetric encryption of credential values.
//!
//! The AES-256 key is derived by hashing the process secret with SHA-256;
//! every component that touches ciphertext goes through this one derivation.
//! Rotating the process secret invalidates all stored ciphertext.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use geowatch_core::{GeoError, Result};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

pub struct VaultCipher {
    cipher: Aes256Gcm,
}

impl VaultCipher {
    pub fn from_secret(process_secret: &str) -> Self {
        let digest = Sha256::digest(process_secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// JSON-serialize then encrypt. Output is `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, value: &serde_json::Value) -> Result<String> {
        let plaintext = serde_json::to_vec(value)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| GeoError::Internal("credential encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    /// Decrypt and parse. Any decode, authentication, or UTF-8 failure maps
    /// to `Corrupt` — raw bytes are never surfaced.
    pub fn decrypt(&self, encoded: &str) -> Result<serde_json::Value> {
        let blob = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| GeoError::Corrupt("credential ciphertext is not valid base64".into()))?;
        if blob.len() <= NONCE_LEN {
            return Err(GeoError::Corrupt("credential ciphertext is truncated".into()));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| GeoError::Corrupt("credential ciphertext failed authentication".into()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|_| GeoError::Corrupt("decrypted credential is not valid JSON".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrip_preserves_value() {
        let cipher = VaultCipher::from_secret("test-secret");
        let value = json!({"api_key": "sk-12345", "note": "主账号"});
        let encoded = cipher.encrypt(&value).unwrap();
        assert_eq!(cipher.decrypt(&encoded).unwrap(), value);
    }

    #[test]
    fn ciphertext_never_contains_plaintext() {
        let cipher = VaultCipher::from_secret("test-secret");
        let encoded = cipher.encrypt(&json!("super-secret-token")).unwrap();
        assert!(!encoded.contains("super-secret-token"));
    }

    #[test]
    fn nonces_differ_per_encryption() {
        let cipher = VaultCipher::from_secret("test-secret");
        let a = cipher.encrypt(&json!("v")).unwrap();
        let b = cipher.encrypt(&json!("v")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_secret_reports_corrupt() {
        let encoded = VaultCipher::from_secret("one").encrypt(&json!("v")).unwrap();
        let err = VaultCipher::from_secret("two").decrypt(&encoded).unwrap_err();
        assert!(matches!(err, GeoError::Corrupt(_)));
    }

    #[test]
    fn garbage_reports_corrupt() {
        let cipher = VaultCipher::from_secret("s");
        assert!(matches!(cipher.decrypt("!!"), Err(GeoError::Corrupt(_))));
        assert!(matches!(cipher.decrypt("aGVsbG8"), Err(GeoError::Corrupt(_))));
    }
}
