//! Persistence adapters - typed, best-effort access to a storage medium.
//!
//! An adapter turns a value into a tagged [`Envelope`] record (optionally
//! encrypted) and hands it to the host [`StorageMedium`]. Adapter operations
//! never fail from the caller's point of view: a missing medium, a corrupt
//! record or a failed decryption all read back as "nothing stored", and
//! failed writes are logged and dropped. The `try_*` methods expose the
//! underlying [`StateError`] for callers that want it.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::{EncryptedAdapter, EncryptionConfig};
use crate::envelope::Envelope;
use crate::error::{Result, StateError};
use crate::medium::StorageMedium;

/// Get, set and delete a named record in a storage medium.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Load the record under `key`.
    ///
    /// Returns `None` if the key is missing, the medium is unavailable, or
    /// the record cannot be decoded.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T>;

    /// Store `value` under `key`. Failures are logged, not returned.
    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T);

    /// Remove the record under `key`. Failures are logged, not returned.
    async fn delete(&self, key: &str);
}

/// Log an absorbed adapter failure.
pub(crate) fn log_failure(operation: &str, key: &str, err: &StateError) {
    match err {
        StateError::MediumUnavailable => {
            debug!("skipping {} for '{}': storage medium unavailable", operation, key)
        }
        err => warn!("persistence {} for '{}' failed: {}", operation, key, err),
    }
}

/// Which adapter a store persists through.
#[derive(Clone, Debug, Default)]
pub enum PersistenceConfig {
    /// Tagged envelope records, stored as-is.
    #[default]
    Plain,
    /// Tagged envelope records, encrypted under a passphrase-derived key.
    Encrypted(EncryptionConfig),
}

impl PersistenceConfig {
    /// Encrypted persistence with default key derivation.
    pub fn encrypted(passphrase: impl Into<String>) -> Self {
        Self::Encrypted(EncryptionConfig::new(passphrase))
    }
}

/// Unencrypted adapter writing [`Envelope`] records.
#[derive(Clone, Default)]
pub struct PlainAdapter {
    medium: Option<Arc<dyn StorageMedium>>,
}

impl PlainAdapter {
    /// Create an adapter over `medium`; `None` models an unavailable medium.
    pub fn new(medium: Option<Arc<dyn StorageMedium>>) -> Self {
        Self { medium }
    }

    /// Whether a storage medium is present.
    pub fn is_available(&self) -> bool {
        self.medium.is_some()
    }

    fn medium(&self) -> Result<&dyn StorageMedium> {
        self.medium.as_deref().ok_or(StateError::MediumUnavailable)
    }

    /// Load and decode the record under `key`.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(record) = self.medium()?.get_item(key).await? else {
            return Ok(None);
        };
        Envelope::from_record(&record)?.open().map(Some)
    }

    /// Encode and store `value` under `key`.
    pub async fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let medium = self.medium()?;
        let record = Envelope::wrap(value)?.to_record()?;
        medium.set_item(key, &record).await
    }

    /// Remove the record under `key`.
    pub async fn try_delete(&self, key: &str) -> Result<()> {
        self.medium()?.remove_item(key).await
    }
}

#[async_trait]
impl PersistenceAdapter for PlainAdapter {
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

/// The adapter a store owns, selected from a [`PersistenceConfig`].
pub enum Adapter {
    Plain(PlainAdapter),
    Encrypted(EncryptedAdapter),
}

impl Adapter {
    /// Build the adapter described by `config` over `medium`.
    pub fn new(config: PersistenceConfig, medium: Option<Arc<dyn StorageMedium>>) -> Self {
        match config {
            PersistenceConfig::Plain => Adapter::Plain(PlainAdapter::new(medium)),
            PersistenceConfig::Encrypted(config) => {
                Adapter::Encrypted(EncryptedAdapter::new(config, medium))
            }
        }
    }

    /// Whether records are encrypted at rest.
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Adapter::Encrypted(_))
    }
}

#[async_trait]
impl PersistenceAdapter for Adapter {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        match self {
            Adapter::Plain(adapter) => adapter.get(key).await,
            Adapter::Encrypted(adapter) => adapter.get(key).await,
        }
    }

    async fn set<T: Serialize + Sync>(&self, key: &str, value: &T) {
        match self {
            Adapter::Plain(adapter) => adapter.set(key, value).await,
            Adapter::Encrypted(adapter) => adapter.set(key, value).await,
        }
    }

    async fn delete(&self, key: &str) {
        match self {
            Adapter::Plain(adapter) => adapter.delete(key).await,
            Adapter::Encrypted(adapter) => adapter.delete(key).await,
        }
    }
}
