//! Encrypted persistence adapter.
//!
//! Records are sealed with AES-256-GCM under a key derived from a passphrase:
//! - PBKDF2-HMAC-SHA256, 100,000 iterations by default
//! - Key derived on first use and cached for the adapter's lifetime
//! - Fresh random 96-bit nonce per write
//! - Stored as `base64(nonce || ciphertext)`
//!
//! The plaintext is the same tagged [`Envelope`] record the plain adapter
//! writes.
//!
//! The default salt, [`FIXED_SALT`], is shared by every installation. That
//! makes precomputed attacks against common passphrases cheaper. It is kept
//! so existing records stay readable. A deployment can supply its own salt
//! through [`KeyDerivation`], at the cost of losing access to records written
//! under the old one.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use zeroize::Zeroizing;

use crate::adapter::{log_failure, PersistenceAdapter};
use crate::envelope::Envelope;
use crate::error::{Result, StateError};
use crate::medium::StorageMedium;

/// Default PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Application-wide salt used when none is configured.
pub const FIXED_SALT: &[u8] = b"univrs-store/encrypted-adapter/v1";

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Password-based key derivation parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDerivation {
    pub iterations: u32,
    pub salt: Vec<u8>,
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_KDF_ITERATIONS,
            salt: FIXED_SALT.to_vec(),
        }
    }
}

impl KeyDerivation {
    /// Derive a 256-bit key from `passphrase`. This is deliberately slow.
    pub fn derive(&self, passphrase: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(passphrase, &self.salt, self.iterations, &mut key[..]);
        key
    }
}

/// Passphrase and key derivation settings for encrypted persistence.
#[derive(Clone)]
pub struct EncryptionConfig {
    pub passphrase: Zeroizing<String>,
    pub key_derivation: KeyDerivation,
}

impl EncryptionConfig {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
            key_derivation: KeyDerivation::default(),
        }
    }

    pub fn with_key_derivation(mut self, key_derivation: KeyDerivation) -> Self {
        self.key_derivation = key_derivation;
        self
    }
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("passphrase", &"<redacted>")
            .field("key_derivation", &self.key_derivation)
            .finish()
    }
}

/// Adapter that encrypts [`Envelope`] records with AES-256-GCM.
pub struct EncryptedAdapter {
    medium: Option<Arc<dyn StorageMedium>>,
    config: EncryptionConfig,
    cipher: OnceCell<Aes256Gcm>,
    derivations: AtomicUsize,
}

impl EncryptedAdapter {
    /// Create an adapter over `medium`; `None` models an unavailable medium.
    ///
    /// No key is derived until the first operation that needs one.
    pub fn new(config: EncryptionConfig, medium: Option<Arc<dyn StorageMedium>>) -> Self {
        Self {
            medium,
            config,
            cipher: OnceCell::new(),
            derivations: AtomicUsize::new(0),
        }
    }

    /// Whether a storage medium is present.
    pub fn is_available(&self) -> bool {
        self.medium.is_some()
    }

    /// Whether the key has been derived yet.
    pub fn is_key_derived(&self) -> bool {
        self.cipher.initialized()
    }

    /// Number of times the key has been derived. Never exceeds one.
    pub fn derivation_count(&self) -> usize {
        self.derivations.load(Ordering::Relaxed)
    }

    fn medium(&self) -> Result<&dyn StorageMedium> {
        self.medium.as_deref().ok_or(StateError::MediumUnavailable)
    }

    async fn cipher(&self) -> Result<&Aes256Gcm> {
        self.cipher
            .get_or_try_init(|| async {
                let passphrase = self.config.passphrase.clone();
                let key_derivation = self.config.key_derivation.clone();
                let key = tokio::task::spawn_blocking(move || {
                    key_derivation.derive(passphrase.as_bytes())
                })
                .await
                .map_err(|e| StateError::Crypto(format!("key derivation task failed: {}", e)))?;

                self.derivations.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "derived encryption key ({} iterations)",
                    self.config.key_derivation.iterations
                );

                Aes256Gcm::new_from_slice(&key[..])
                    .map_err(|e| StateError::Crypto(format!("invalid key: {}", e)))
            })
            .await
    }

    /// Seal `value` into the base64 record written to the medium.
    pub async fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let plaintext = Envelope::wrap(value)?.to_record()?;
        let cipher = self.cipher().await?;

        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| StateError::Crypto(format!("failed to generate nonce: {}", e)))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| StateError::Crypto(format!("AES-GCM encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    /// Open a base64 record produced by [`encrypt`](Self::encrypt).
    pub async fn decrypt<T: DeserializeOwned>(&self, record: &str) -> Result<T> {
        let sealed = STANDARD
            .decode(record.trim())
            .map_err(|e| StateError::Crypto(format!("invalid base64: {}", e)))?;
        if sealed.len() < NONCE_LEN {
            return Err(StateError::Crypto(format!(
                "record is {} bytes, shorter than the nonce",
                sealed.len()
            )));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

        let cipher = self.cipher().await?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| {
                    StateError::Crypto(
                        "authentication failed: wrong passphrase or tampered record".to_string(),
                    )
                })?,
        );

        let record = std::str::from_utf8(&plaintext)
            .map_err(|e| StateError::Deserialization(e.to_string()))?;
        Envelope::from_record(record)?.open()
    }

    /// Load and decrypt the record under `key`.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(record) = self.medium()?.get_item(key).await? else {
            return Ok(None);
        };
        self.decrypt(&record).await.map(Some)
    }

    /// Encrypt and store `value` under `key`.
    pub async fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let medium = self.medium()?;
        let record = self.encrypt(value).await?;
        medium.set_item(key, &record).await
    }

    /// Remove the record under `key`.
    pub async fn try_delete(&self, key: &str) -> Result<()> {
        self.medium()?.remove_item(key).await
    }
}

#[async_trait]
impl PersistenceAdapter for EncryptedAdapter {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        self.try_get(key).await.unwrap_or_else(|err| {
            log_failure("load", key, &err);
            None
        })
    }

    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T) {
        if let Err(err) = self.try_set(key, value).await {
            log_failure("save", key, &err);
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(err) = self.try_delete(key).await {
            log_failure("delete", key, &err);
        }
    }
}
