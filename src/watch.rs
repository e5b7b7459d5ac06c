//! Listener registry for reactive state updates.
//!
//! Listeners live in an arena keyed by subscription id. A notification pass
//! walks a snapshot of the arena and re-checks membership before each call,
//! so a listener unsubscribed mid-pass is skipped and one subscribed mid-pass
//! waits for the next pass. No lock is held while a listener runs.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// A callback invoked with the new state after every change.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifier of one registration in a [`ListenerRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Slots<T> {
    next_id: u64,
    listeners: BTreeMap<SubscriptionId, Listener<T>>,
}

/// Arena of listeners keyed by [`SubscriptionId`].
pub struct ListenerRegistry<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> ListenerRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                listeners: BTreeMap::new(),
            })),
        }
    }

    /// Register a listener.
    ///
    /// Registering the same `Arc` again returns a handle to the existing
    /// registration instead of adding a second one.
    pub fn subscribe(&self, listener: Listener<T>) -> Subscription<T> {
        let mut slots = self.slots.lock();

        let existing = slots
            .listeners
            .iter()
            .find(|(_, registered)| Arc::ptr_eq(registered, &listener))
            .map(|(id, _)| *id);

        let id = match existing {
            Some(id) => id,
            None => {
                let id = SubscriptionId(slots.next_id);
                slots.next_id += 1;
                slots.listeners.insert(id, listener);
                id
            }
        };

        Subscription {
            id,
            slots: Arc::downgrade(&self.slots),
        }
    }

    /// Remove a registration. Returns true if it was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.slots.lock().listeners.remove(&id).is_some()
    }

    /// Check whether a registration is still live.
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.slots.lock().listeners.contains_key(&id)
    }

    /// Get the number of registered listeners.
    pub fn len(&self) -> usize {
        self.slots.lock().listeners.len()
    }

    /// Check if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().listeners.is_empty()
    }

    /// Invoke every registered listener once with `value`.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<(SubscriptionId, Listener<T>)> = self
            .slots
            .lock()
            .listeners
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            if self.contains(id) {
                listener(value);
            }
        }
    }
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to one listener registration.
///
/// Dropping the handle leaves the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription<T> {
    id: SubscriptionId,
    slots: Weak<Mutex<Slots<T>>>,
}

impl<T> Subscription<T> {
    /// The registration this handle refers to.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the registration. Returns true if it was still registered.
    pub fn unsubscribe(self) -> bool {
        match self.slots.upgrade() {
            Some(slots) => slots.lock().listeners.remove(&self.id).is_some(),
            None => false,
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
