//! StorageMedium trait - the host key/value capability persistence writes to.
//!
//! A medium stores opaque strings under string keys, the way a browser's
//! `localStorage` does. Typing, tagging and encryption all happen above it in
//! the [`adapter`](crate::adapter) layer.

use async_trait::async_trait;

use crate::error::{Result, StateError};

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// Validate that a key is well-formed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StateError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(StateError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// A string-keyed, string-valued persistent store provided by the host.
///
/// Implementations should be cheap to share; the persistence adapters hold
/// them behind an `Arc`.
#[async_trait]
pub trait StorageMedium: Send + Sync {
    /// Read the record stored under `key`.
    ///
    /// Returns `None` if the key does not exist.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous record.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove the record under `key`.
    ///
    /// Returns `Ok(())` if the key was removed or didn't exist.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Check if a key exists.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get_item(key).await?.is_some())
    }
}
