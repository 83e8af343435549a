//! Keyed store capability consumed by the session attribute layer.
//!
//! A [`Store`] is a typed view over one entry kind of a distributed key-value
//! service. Listeners register per store, so a listener only ever sees events for
//! the entry kind it was registered against.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::types::Result;

mod mem;

pub use mem::{MemStore, MemStoreOptions, StoreStats};

/// How a write or removal interacts with prior values and listeners.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum AccessMode {
    /// Returns the previous value and notifies listeners.
    #[default]
    Normal,
    /// Skips reading the previous value; listeners are still notified.
    WriteOnly,
    /// Skips reading the previous value and suppresses change notifications.
    Silent,
}

impl AccessMode {
    /// Whether the caller expects the previous value back.
    pub fn returns_previous(self) -> bool {
        matches!(self, AccessMode::Normal)
    }

    /// Whether `modified`/`removed` notifications are delivered.
    pub fn notifies(self) -> bool {
        !matches!(self, AccessMode::Silent)
    }
}

/// Static properties of a store.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StoreProperties {
    /// The store is durable and never passivates; evicted entries are reloaded
    /// without passivation or activation events.
    pub persistent: bool,
}

impl StoreProperties {
    /// Whether the store is durable and non-passivating.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

/// Typed keyed store.
///
/// Single-key operations are atomic. [`Store::get_all`] is not atomic across keys.
pub trait Store<K, V>: Send + Sync {
    /// Reads one entry, activating it if it was passivated.
    fn get(&self, key: &K) -> Result<Option<V>>;

    /// Reads many entries in one round trip. Missing keys are absent from the result.
    fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>>;

    /// Writes an entry. Returns the previous value only in [`AccessMode::Normal`].
    fn put(&self, key: K, value: V, mode: AccessMode) -> Result<Option<V>>;

    /// Removes an entry. Returns the previous value only in [`AccessMode::Normal`].
    fn remove(&self, key: &K, mode: AccessMode) -> Result<Option<V>>;

    /// Moves an entry out of primary memory.
    fn evict(&self, key: &K) -> Result<()>;

    /// Subscribes `listener` to this store's events.
    fn register(&self, listener: Arc<dyn StoreListener<K, V>>) -> ListenerRegistration;

    /// Returns the store's properties.
    fn properties(&self) -> StoreProperties;
}

/// Receiver of store events. Every callback defaults to a no-op.
///
/// Callbacks run on a store notification thread and must not block on long work.
pub trait StoreListener<K, V>: Send + Sync {
    /// An entry is about to leave primary memory.
    fn pre_passivate(&self, _key: &K, _value: &V) {}

    /// An entry has left primary memory.
    fn post_passivate(&self, _key: &K) {}

    /// A passivated entry was restored to primary memory.
    fn post_activate(&self, _key: &K, _value: &V) {}

    /// An entry was created or overwritten.
    fn modified(&self, _key: &K, _value: &V) {}

    /// An entry was removed.
    fn removed(&self, _key: &K) {}
}

/// Handle returned by [`Store::register`]. Closing it unregisters the listener.
///
/// `close` is idempotent and may race with other `close` calls; the handle also
/// closes itself on drop.
pub struct ListenerRegistration {
    unregister: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerRegistration {
    /// Builds a registration that runs `unregister` exactly once.
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Mutex::new(Some(Box::new(unregister))),
        }
    }

    /// Unregisters the listener.
    pub fn close(&self) {
        let action = self.unregister.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether [`ListenerRegistration::close`] has already run.
    pub fn is_closed(&self) -> bool {
        self.unregister.lock().is_none()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.close();
    }
}

/// Listener list shared by store implementations.
///
/// Holds weak references; the strong reference lives in the registration handle,
/// so a leaked listener disappears once its handle is gone.
pub struct ListenerSet<K, V> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Weak<dyn StoreListener<K, V>>)>>,
}

impl<K: 'static, V: 'static> ListenerSet<K, V> {
    /// Creates an empty listener set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        })
    }

    /// Adds `listener` and returns the handle that removes it again.
    pub fn register(self: &Arc<Self>, listener: Arc<dyn StoreListener<K, V>>) -> ListenerRegistration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, Arc::downgrade(&listener)));
        trace!(listener = id, "store.listener.registered");
        let set: Weak<Self> = Arc::downgrade(self);
        ListenerRegistration::new(move || {
            // Keeps the listener alive until it is unlinked.
            let _listener = listener;
            if let Some(set) = set.upgrade() {
                set.entries.lock().retain(|(entry, _)| *entry != id);
            }
            trace!(listener = id, "store.listener.closed");
        })
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Whether no live listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of live listeners. Callers notify outside of any store lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn StoreListener<K, V>>> {
        let mut entries = self.entries.lock();
        let mut live = Vec::with_capacity(entries.len());
        entries.retain(|(_, weak)| {
            if let Some(listener) = weak.upgrade() {
                live.push(listener);
                true
            } else {
                false
            }
        });
        live
    }
}
