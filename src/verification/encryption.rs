//! Account number encryption for the write path.
//!
//! AES-256-GCM-SIV with a key derived from the configured secret via
//! HKDF-SHA256. Output is `hex(nonce || ciphertext)`. Without a secret the
//! encryptor is disabled and [`AccountEncryptor::encrypt`] returns `None`;
//! verification never depends on it.

use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use tracing::{info, warn};

/// Domain separation for the derived key.
const HKDF_INFO: &[u8] = b"payee-verify/account-number/v1";

/// AES-GCM-SIV nonce size in bytes.
const NONCE_LEN: usize = 12;

/// Encrypts raw account numbers before persistence.
pub struct AccountEncryptor {
    cipher: Option<Aes256GcmSiv>,
}

impl std::fmt::Debug for AccountEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountEncryptor")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl AccountEncryptor {
    /// Create an encryptor from the configured secret.
    ///
    /// A missing or blank secret yields a disabled encryptor.
    #[must_use]
    pub fn new(secret: Option<&str>) -> Self {
        let Some(secret) = secret.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("No encryption key configured - account numbers will be stored unencrypted");
            return Self::disabled();
        };

        let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = [0u8; 32];
        if hk.expand(HKDF_INFO, &mut key).is_err() {
            warn!("Failed to derive encryption key - encryption disabled");
            return Self::disabled();
        }

        match Aes256GcmSiv::new_from_slice(&key) {
            Ok(cipher) => {
                info!("Account number encryption enabled");
                Self {
                    cipher: Some(cipher),
                }
            }
            Err(e) => {
                warn!("Invalid encryption key length: {e} - encryption disabled");
                Self::disabled()
            }
        }
    }

    /// An encryptor that never encrypts.
    #[must_use]
    pub fn disabled() -> Self {
        Self { cipher: None }
    }

    /// Returns true if a key is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt an account number.
    ///
    /// Returns `None` when disabled or on cipher failure.
    #[must_use]
    pub fn encrypt(&self, raw_account_number: &str) -> Option<String> {
        let cipher = self.cipher.as_ref()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        match cipher.encrypt(nonce, raw_account_number.as_bytes()) {
            Ok(ciphertext) => {
                let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
                out.extend_from_slice(&nonce_bytes);
                out.extend_from_slice(&ciphertext);
                Some(hex::encode(out))
            }
            Err(e) => {
                warn!("Account number encryption failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn decrypt(encryptor: &AccountEncryptor, encoded: &str) -> Option<String> {
        let bytes = hex::decode(encoded).ok()?;
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plain = encryptor
            .cipher
            .as_ref()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()?;
        String::from_utf8(plain).ok()
    }

    #[test]
    fn test_disabled_without_key() {
        assert!(!AccountEncryptor::new(None).is_enabled());
        assert!(!AccountEncryptor::new(Some("  ")).is_enabled());
        assert_eq!(AccountEncryptor::disabled().encrypt("1234567890"), None);
    }

    #[test]
    fn test_encrypt_round_trip() {
        let encryptor = AccountEncryptor::new(Some("correct horse battery staple"));
        assert!(encryptor.is_enabled());

        let encoded = encryptor.encrypt("1234567890123").expect("encrypted");
        assert!(!encoded.contains("1234567890123"));
        assert_eq!(
            decrypt(&encryptor, &encoded).as_deref(),
            Some("1234567890123")
        );
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let encryptor = AccountEncryptor::new(Some("secret"));
        let a = encryptor.encrypt("1234567890123").expect("encrypted");
        let b = encryptor.encrypt("1234567890123").expect("encrypted");
        assert_ne!(a, b);
    }

    #[test]
    fn test_other_key_cannot_decrypt() {
        let encoded = AccountEncryptor::new(Some("key-one"))
            .encrypt("1234567890123")
            .expect("encrypted");
        let other = AccountEncryptor::new(Some("key-two"));
        assert_eq!(decrypt(&other, &encoded), None);
    }

    #[test]
    fn test_debug_hides_key() {
        let encryptor = AccountEncryptor::new(Some("secret"));
        assert_eq!(
            format!("{encryptor:?}"),
            "AccountEncryptor { enabled: true }"
        );
    }
}
