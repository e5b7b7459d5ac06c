//! # univrs-store
//!
//! Reactive state container with debounced, optionally encrypted persistence.
//!
//! A [`Store`] holds one typed value and notifies subscribed listeners
//! whenever it changes. Given a storage key, it also:
//!
//! - **Loads** a previously persisted value on construction
//! - **Coalesces writes**: a burst of mutations produces one write after a
//!   quiet interval (300 ms by default)
//! - **Preserves types** through a string-only medium with tagged envelopes
//! - **Encrypts at rest** with AES-256-GCM when a passphrase is configured
//!
//! ## Media
//!
//! - [`MemoryMedium`]: In-process map (testing and ephemeral sessions)
//! - [`SqliteMedium`]: Embedded SQLite file (durable, native hosts)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use univrs_store::Store;
//!
//! let store = Store::new(0);
//! let subscription = store.subscribe_fn(|count| println!("count = {}", count));
//!
//! store.update(|n| n + 1);
//! assert_eq!(store.get_state(), 1);
//!
//! subscription.unsubscribe();
//! ```
//!
//! ## Persisted, Encrypted State
//!
//! ```rust,no_run
//! use serde::{Deserialize, Serialize};
//! use univrs_store::{SqliteMedium, Store, StoreOptions};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Settings {
//!     theme: String,
//!     volume: u8,
//! }
//!
//! #[tokio::main]
//! async fn main() -> univrs_store::Result<()> {
//!     let medium = SqliteMedium::open("settings.db").await?;
//!
//!     let store = Store::create(
//!         Settings { theme: "light".to_string(), volume: 5 },
//!         StoreOptions::new()
//!             .with_storage_key("settings")
//!             .with_medium(medium)
//!             .with_passphrase("correct horse battery staple"),
//!     );
//!     store.ready().await;
//!
//!     store.set(serde_json::json!({ "theme": "dark" }))?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod crypto;
pub mod debounce;
pub mod envelope;
pub mod error;
pub mod medium;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod watch;

// Re-export main types
pub use adapter::{Adapter, PersistenceAdapter, PersistenceConfig, PlainAdapter};
pub use crypto::{EncryptedAdapter, EncryptionConfig, KeyDerivation, FIXED_SALT};
pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
pub use envelope::{Envelope, ValueKind};
pub use error::{Result, StateError};
pub use medium::{StorageMedium, MAX_KEY_LENGTH};
pub use memory::MemoryMedium;
pub use sqlite::SqliteMedium;
pub use store::{Store, StoreOptions};
pub use watch::{Listener, Subscription, SubscriptionId};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::adapter::{PersistenceAdapter, PersistenceConfig};
    pub use crate::crypto::EncryptionConfig;
    pub use crate::error::{Result, StateError};
    pub use crate::medium::StorageMedium;
    pub use crate::memory::MemoryMedium;
    pub use crate::sqlite::SqliteMedium;
    pub use crate::store::{Store, StoreOptions};
    pub use crate::watch::{Listener, Subscription};
}
