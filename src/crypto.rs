//! Symmetric encryption for stored API keys.
//!
//! Ciphertexts are `v1:` followed by base64(nonce || ciphertext || tag) using
//! AES-256-GCM with a process-wide key.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

const CIPHERTEXT_PREFIX: &str = "v1:";
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext is malformed: {0}")]
    Malformed(&'static str),

    /// Tag verification failed: the ciphertext was tampered with or was
    /// produced under a different key.
    #[error("ciphertext failed authentication")]
    Authentication,

    #[error("decrypted value is not valid UTF-8")]
    Utf8,

    #[error("encryption failed")]
    Encrypt,
}

#[derive(Clone)]
pub struct EncryptionService {
    cipher: Aes256Gcm,
    fingerprint: String,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl EncryptionService {
    /// Build from the configured key material.
    ///
    /// 64 hex characters are used as the raw 256-bit key; anything else is
    /// treated as a passphrase and hashed with SHA-256.
    pub fn from_key_material(material: &str) -> Self {
        let material = material.trim();
        let key_bytes: [u8; 32] = match hex::decode(material) {
            Ok(bytes) if bytes.len() == 32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&bytes);
                key
            }
            _ => {
                tracing::warn!("ENCRYPTION_KEY is not 64 hex chars, deriving key with SHA-256");
                Sha256::digest(material.as_bytes()).into()
            }
        };

        let fingerprint = hex::encode(&Sha256::digest(key_bytes)[..4]);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);

        Self {
            cipher: Aes256Gcm::new(key),
            fingerprint,
        }
    }

    /// Short, non-reversible identifier of the active key, safe to log.
    pub fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&sealed);

        Ok(format!("{CIPHERTEXT_PREFIX}{}", BASE64.encode(payload)))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let encoded = ciphertext
            .strip_prefix(CIPHERTEXT_PREFIX)
            .ok_or(CryptoError::Malformed("unknown version prefix"))?;
        let payload = BASE64
            .decode(encoded)
            .map_err(|_| CryptoError::Malformed("invalid base64"))?;

        if payload.len() < NONCE_LEN + 16 {
            return Err(CryptoError::Malformed("payload too short"));
        }

        let (nonce, sealed) = payload.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
    }
}

/// Fixed-format display preview of a plaintext key, e.g. "sk-pro...wxyz".
/// Short keys are fully masked.
pub fn preview_key(plain: &str) -> String {
    let chars: Vec<char> = plain.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> EncryptionService {
        EncryptionService::from_key_material(&"ab".repeat(32))
    }

    #[test]
    fn round_trips_plain_empty_and_unicode() {
        let svc = service();
        for value in ["sk-test", "", "clé 🔑 ключ", "a\nb\tc"] {
            let sealed = svc.encrypt(value).unwrap();
            assert!(sealed.starts_with("v1:"));
            assert_eq!(svc.decrypt(&sealed).unwrap(), value);
        }
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let svc = service();
        assert_ne!(svc.encrypt("same").unwrap(), svc.encrypt("same").unwrap());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let svc = service();
        let sealed = svc.encrypt("sk-secret-value").unwrap();
        let mut payload = BASE64.decode(&sealed[3..]).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let tampered = format!("v1:{}", BASE64.encode(payload));

        assert!(matches!(svc.decrypt(&tampered), Err(CryptoError::Authentication)));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = service().encrypt("sk-secret-value").unwrap();
        let other = EncryptionService::from_key_material("a different passphrase");
        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::Authentication)));
    }

    #[test]
    fn malformed_inputs_are_typed_errors() {
        let svc = service();
        assert!(matches!(svc.decrypt("plain"), Err(CryptoError::Malformed(_))));
        assert!(matches!(svc.decrypt("v1:!!!"), Err(CryptoError::Malformed(_))));
        assert!(matches!(svc.decrypt("v1:AAAA"), Err(CryptoError::Malformed(_))));
    }

    #[test]
    fn passphrase_and_hex_keys_have_stable_fingerprints() {
        let a = EncryptionService::from_key_material("passphrase");
        let b = EncryptionService::from_key_material("passphrase");
        assert_eq!(a.key_fingerprint(), b.key_fingerprint());
        assert_eq!(a.key_fingerprint().len(), 8);
        assert_ne!(a.key_fingerprint(), service().key_fingerprint());
    }

    #[test]
    fn preview_shows_first_six_and_last_four() {
        assert_eq!(preview_key("sk-proj-abcdefghwxyz"), "sk-pro...wxyz");
        assert_eq!(preview_key("short"), "****");
    }
}
