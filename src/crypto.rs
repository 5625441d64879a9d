//! At-rest encryption for info request responses.
//!
//! AES-256-GCM with the key derived as SHA-256 of the configured secret.
//! Ciphertext is stored as `enc:v1:` + base64(nonce || ciphertext).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::error::{PlaneError, Result};

const PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBox(..)")
    }
}

impl SecretBox {
    pub fn new(secret: &str) -> Result<Self> {
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| PlaneError::Crypto(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn is_sealed(text: &str) -> bool {
        text.starts_with(PREFIX)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| PlaneError::Crypto(format!("encryption failed: {}", e)))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", PREFIX, STANDARD.encode(&combined)))
    }

    /// Decrypt sealed text; anything without the prefix is returned as-is.
    pub fn open(&self, text: &str) -> Result<String> {
        let Some(encoded) = text.strip_prefix(PREFIX) else {
            return Ok(text.to_string());
        };
        let combined = STANDARD
            .decode(encoded)
            .map_err(|e| PlaneError::Crypto(format!("invalid base64: {}", e)))?;
        if combined.len() <= NONCE_LEN {
            return Err(PlaneError::Crypto("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| PlaneError::Crypto(format!("decryption failed: {}", e)))?;
        String::from_utf8(plaintext).map_err(|e| PlaneError::Crypto(format!("invalid utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_open() {
        let sb = SecretBox::new("hunter2").unwrap();
        let sealed = sb.seal(r#"{"token":"abc"}"#).unwrap();
        assert!(SecretBox::is_sealed(&sealed));
        assert!(!sealed.contains("abc"));
        assert_eq!(sb.open(&sealed).unwrap(), r#"{"token":"abc"}"#);
    }

    #[test]
    fn test_random_nonce_differs() {
        let sb = SecretBox::new("hunter2").unwrap();
        assert_ne!(sb.seal("same").unwrap(), sb.seal("same").unwrap());
    }

    #[test]
    fn test_plaintext_passes_through() {
        let sb = SecretBox::new("hunter2").unwrap();
        assert_eq!(sb.open(r#"{"a":"b"}"#).unwrap(), r#"{"a":"b"}"#);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = SecretBox::new("one").unwrap().seal("secret").unwrap();
        let err = SecretBox::new("two").unwrap().open(&sealed).unwrap_err();
        assert!(matches!(err, PlaneError::Crypto(_)));
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let sb = SecretBox::new("k").unwrap();
        let short = format!("{}{}", PREFIX, STANDARD.encode(b"short"));
        assert!(sb.open(&short).is_err());
    }
}
