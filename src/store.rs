//! Store - a reactive state container with debounced persistence.
//!
//! A [`Store`] owns one value. Mutations replace it, synchronously notify
//! every subscribed listener, and, when a storage key is configured, arm a
//! debounced write through the store's persistence [`Adapter`].
//!
//! With a storage key, construction also spawns a load of any previously
//! persisted value. When that load resolves the loaded value replaces the
//! in-memory one and listeners registered at that moment are notified. A
//! listener subscribed before the load completes therefore sees the initial
//! value (and anything derived from it) first, then the loaded value. A
//! listener subscribed afterwards never sees the initial value.
//!
//! Persistence is best effort: failures are logged and the in-memory value
//! stays authoritative. Writes pending when the last handle is dropped are
//! lost. Two stores sharing a storage key overwrite each other's records
//! without coordination.

use parking_lot::{ReentrantMutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::adapter::{Adapter, PersistenceAdapter, PersistenceConfig};
use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use crate::error::{Result, StateError};
use crate::medium::StorageMedium;
use crate::watch::{Listener, ListenerRegistry, Subscription};

/// Construction options for a [`Store`].
#[derive(Clone)]
pub struct StoreOptions {
    /// Record name in the medium. `None` disables persistence entirely.
    pub storage_key: Option<String>,
    /// Host medium. `None` means the host has no persistent storage.
    pub medium: Option<Arc<dyn StorageMedium>>,
    /// Plain or encrypted records.
    pub persistence: PersistenceConfig,
    /// Quiet interval before a write.
    pub debounce: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            storage_key: None,
            medium: None,
            persistence: PersistenceConfig::Plain,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn with_medium(mut self, medium: impl StorageMedium + 'static) -> Self {
        self.medium = Some(Arc::new(medium));
        self
    }

    pub fn with_shared_medium(mut self, medium: Arc<dyn StorageMedium>) -> Self {
        self.medium = Some(medium);
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    /// Encrypt records under `passphrase` with default key derivation.
    pub fn with_passphrase(self, passphrase: impl Into<String>) -> Self {
        self.with_persistence(PersistenceConfig::encrypted(passphrase))
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("storage_key", &self.storage_key)
            .field("medium", &self.medium.is_some())
            .field("persistence", &self.persistence)
            .field("debounce", &self.debounce)
            .finish()
    }
}

struct Persistence {
    key: String,
    adapter: Adapter,
    debouncer: Debouncer,
    runtime: Handle,
    // Serializes the startup load and every write, in spawn order.
    io: Mutex<()>,
    // Bumped by `clear_persisted`; writes armed under an older value are dropped.
    generation: AtomicU64,
}

struct Inner<T> {
    // Held from read through notify so each mutation is atomic. Reentrant so
    // a listener may mutate the store on the same thread.
    mutation: ReentrantMutex<()>,
    state: RwLock<T>,
    initial: T,
    listeners: ListenerRegistry<T>,
    persistence: Option<Persistence>,
    loaded: watch::Sender<bool>,
}

impl<T: Clone> Inner<T> {
    fn replace(&self, value: T) {
        let _mutation = self.mutation.lock();
        *self.state.write() = value.clone();
        self.listeners.notify(&value);
    }

    /// Compute and commit the next value under the mutation lock.
    fn mutate<E, F>(&self, next: F) -> std::result::Result<(), E>
    where
        F: FnOnce(&T) -> std::result::Result<T, E>,
    {
        let _mutation = self.mutation.lock();
        let current = self.state.read().clone();
        self.replace(next(&current)?);
        Ok(())
    }
}

/// A reactive state container.
///
/// Cloning a `Store` yields another handle to the same state.
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Store<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create an in-memory store with no persistence.
    pub fn new(initial: T) -> Self {
        Self::create(initial, StoreOptions::default())
    }

    /// Create a store.
    ///
    /// With a storage key, this must be called from within a tokio runtime;
    /// otherwise persistence is disabled and a warning is logged.
    pub fn create(initial: T, options: StoreOptions) -> Self {
        let StoreOptions {
            storage_key,
            medium,
            persistence: config,
            debounce,
        } = options;

        let persistence = storage_key.and_then(|key| match Handle::try_current() {
            Ok(runtime) => Some(Persistence {
                adapter: Adapter::new(config, medium),
                debouncer: Debouncer::new(debounce, runtime.clone()),
                runtime,
                key,
                io: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
            Err(_) => {
                warn!("no tokio runtime available, persistence for '{}' disabled", key);
                None
            }
        });

        let (loaded, _) = watch::channel(persistence.is_none());
        let store = Self {
            inner: Arc::new(Inner {
                mutation: ReentrantMutex::new(()),
                state: RwLock::new(initial.clone()),
                initial,
                listeners: ListenerRegistry::new(),
                persistence,
                loaded,
            }),
        };
        store.spawn_load();
        store
    }

    fn spawn_load(&self) {
        let Some(persistence) = &self.inner.persistence else {
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        persistence.runtime.spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let Some(persistence) = inner.persistence.as_ref() else {
                return;
            };

            let loaded = {
                let _io = persistence.io.lock().await;
                persistence.adapter.get::<T>(&persistence.key).await
            };

            match loaded {
                Some(value) => {
                    debug!("loaded persisted state for '{}'", persistence.key);
                    inner.replace(value);
                }
                None => debug!("no persisted state for '{}'", persistence.key),
            }
            inner.loaded.send_replace(true);
        });
    }

    /// Get a clone of the current state.
    pub fn get_state(&self) -> T {
        self.inner.state.read().clone()
    }

    /// Read state without cloning.
    ///
    /// `f` must not mutate this store.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        f(&self.inner.state.read())
    }

    /// The value the store was constructed with.
    pub fn initial_state(&self) -> &T {
        &self.inner.initial
    }

    /// Replace the state with `updater(current)`.
    ///
    /// Concurrent updates from other handles are serialized, so none is lost.
    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.inner
            .mutate(|current| Ok::<T, Infallible>(updater(current)))
            .unwrap_or_else(|never| match never {});
        self.schedule_write();
    }

    /// Shallow-merge the fields of `partial` into the current state.
    ///
    /// # Errors
    ///
    /// * [`StateError::ContractViolation`] - if the state or `partial` is not
    ///   a record, or the merged record no longer fits `T`. The state is left
    ///   unchanged and no listener is notified.
    pub fn set<P: Serialize>(&self, partial: P) -> Result<()> {
        let patch = serde_json::to_value(partial).map_err(|e| {
            StateError::ContractViolation(format!("partial is not representable: {}", e))
        })?;
        let patch = match patch {
            Value::Object(patch) => patch,
            other => {
                return Err(StateError::ContractViolation(format!(
                    "set() expects a record of fields, got {}",
                    describe(&other)
                )))
            }
        };

        self.inner.mutate(|current| {
            let mut fields = match serde_json::to_value(current) {
                Ok(Value::Object(fields)) => fields,
                Ok(other) => {
                    return Err(StateError::ContractViolation(format!(
                        "set() merges fields into a record, but the state is {}",
                        describe(&other)
                    )))
                }
                Err(e) => {
                    return Err(StateError::ContractViolation(format!(
                        "state is not representable: {}",
                        e
                    )))
                }
            };

            fields.extend(patch);
            serde_json::from_value(Value::Object(fields)).map_err(|e| {
                StateError::ContractViolation(format!("merged fields do not fit the state: {}", e))
            })
        })?;

        self.schedule_write();
        Ok(())
    }

    /// Restore the value the store was constructed with.
    pub fn reset(&self) {
        self.commit(self.inner.initial.clone());
    }

    /// Register a listener, called with the new state after every change.
    ///
    /// Registering the same `Arc` twice yields a single registration.
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription<T> {
        self.inner.listeners.subscribe(listener)
    }

    /// Register a closure as a new listener.
    pub fn subscribe_fn<F>(&self, listener: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(listener))
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// The configured storage key, if persistence is enabled.
    pub fn storage_key(&self) -> Option<&str> {
        self.inner.persistence.as_ref().map(|p| p.key.as_str())
    }

    /// Whether records are encrypted at rest.
    pub fn is_encrypted(&self) -> bool {
        self.inner
            .persistence
            .as_ref()
            .is_some_and(|p| p.adapter.is_encrypted())
    }

    /// Wait until the startup load has completed.
    ///
    /// Resolves immediately for stores without persistence.
    pub async fn ready(&self) {
        let mut loaded = self.inner.loaded.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = loaded.wait_for(|loaded| *loaded).await;
    }

    /// Whether a debounced write is armed and has not fired yet.
    pub fn has_pending_write(&self) -> bool {
        self.inner
            .persistence
            .as_ref()
            .is_some_and(|p| p.debouncer.is_pending())
    }

    /// Cancel any pending write and delete the persisted record.
    ///
    /// The in-memory state is untouched.
    pub async fn clear_persisted(&self) {
        let Some(persistence) = &self.inner.persistence else {
            return;
        };
        persistence.debouncer.cancel();
        persistence.generation.fetch_add(1, Ordering::SeqCst);

        let _io = persistence.io.lock().await;
        persistence.adapter.delete(&persistence.key).await;
        debug!("cleared persisted state for '{}'", persistence.key);
    }

    fn commit(&self, value: T) {
        self.inner.replace(value);
        self.schedule_write();
    }

    fn schedule_write(&self) {
        let Some(persistence) = &self.inner.persistence else {
            return;
        };

        let weak = Arc::downgrade(&self.inner);
        let runtime = persistence.runtime.clone();
        let generation = persistence.generation.load(Ordering::SeqCst);
        persistence.debouncer.arm(move || {
            // Spawned separately so re-arming never aborts a write in flight.
            if let Some(inner) = weak.upgrade() {
                runtime.spawn(write_current(inner, generation));
            }
        });
    }
}

async fn write_current<T>(inner: Arc<Inner<T>>, generation: u64)
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    let Some(persistence) = inner.persistence.as_ref() else {
        return;
    };

    let _io = persistence.io.lock().await;
    if persistence.generation.load(Ordering::SeqCst) != generation {
        debug!("dropping write for '{}' armed before clear", persistence.key);
        return;
    }
    let value = inner.state.read().clone();
    persistence.adapter.set(&persistence.key, &value).await;
    debug!("persisted state for '{}'", persistence.key);
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a record",
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.state.read())
            .field(
                "storage_key",
                &self.inner.persistence.as_ref().map(|p| &p.key),
            )
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}
