//! In-memory storage medium.
//!
//! This medium is NOT durable - data is lost on process exit.
//! Use for testing, development, and sessions that only need to survive a
//! store being rebuilt within one process.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::medium::{validate_key, StorageMedium};

/// In-memory implementation of StorageMedium.
///
/// Clones share the same underlying map, so one handle can be given to a
/// [`Store`](crate::Store) while another inspects what was written.
#[derive(Clone)]
pub struct MemoryMedium {
    data: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryMedium {
    /// Create a new empty in-memory medium.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Get the number of records in the medium.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the medium is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clear all records.
    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// List stored keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Read a raw record without going through the async interface.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Write a raw record without going through the async interface.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageMedium for MemoryMedium {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.data.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.data.write().remove(key);
        Ok(())
    }
}
