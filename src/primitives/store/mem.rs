use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Result, SessionError};

use super::{AccessMode, ListenerRegistration, ListenerSet, Store, StoreListener, StoreProperties};

/// Configuration for a [`MemStore`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MemStoreOptions {
    /// Number of independently locked shards.
    pub shards: usize,
    /// Maximum entries held in primary memory; `None` never evicts on its own.
    pub capacity: Option<usize>,
    /// Whether the store is durable and non-passivating.
    pub persistent: bool,
}

impl Default for MemStoreOptions {
    fn default() -> Self {
        Self {
            shards: 8,
            capacity: None,
            persistent: false,
        }
    }
}

impl MemStoreOptions {
    /// Sets the shard count.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Caps the number of entries kept in primary memory.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Marks the store as durable and non-passivating.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.shards == 0 {
            return Err(SessionError::Config("store shards must be at least 1".into()));
        }
        if self.capacity == Some(0) {
            return Err(SessionError::Config("store capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Point-in-time counters for a [`MemStore`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct StoreStats {
    /// Entries in primary memory.
    pub active: usize,
    /// Entries moved out of primary memory.
    pub passivated: usize,
    /// Passivations performed, explicit or capacity driven.
    pub passivations: u64,
    /// Passivated entries brought back by a read.
    pub activations: u64,
}

struct Shard<K: Hash + Eq, V> {
    active: LruCache<K, V>,
    passivated: FxHashMap<K, V>,
}

impl<K: Hash + Eq + Clone, V: Clone> Shard<K, V> {
    /// Inserts into primary memory. When full, the least recently used entry is
    /// moved to the passivation tier and returned.
    fn admit(&mut self, key: K, value: V) -> Option<(K, V)> {
        let mut spilled = None;
        if !self.active.contains(&key) && self.active.len() >= self.active.cap().get() {
            if let Some((old_key, old_value)) = self.active.pop_lru() {
                self.passivated.insert(old_key.clone(), old_value.clone());
                spilled = Some((old_key, old_value));
            }
        }
        self.active.put(key, value);
        spilled
    }
}

/// In-memory two-tier store: a sharded LRU primary tier plus a passivation tier.
///
/// Events are delivered on the calling thread once every shard lock is released,
/// so listeners may call back into the store.
pub struct MemStore<K: Hash + Eq, V> {
    shards: Vec<Mutex<Shard<K, V>>>,
    listeners: Arc<ListenerSet<K, V>>,
    properties: StoreProperties,
    passivations: AtomicU64,
    activations: AtomicU64,
}

impl<K, V> MemStore<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Opens an empty store.
    pub fn open(options: MemStoreOptions) -> Result<Arc<Self>> {
        options.validate()?;
        let shard_count = options.shards;
        let per_shard = options
            .capacity
            .map(|cap| NonZeroUsize::new((cap / shard_count).max(1)));
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            let active = match per_shard {
                Some(Some(cap)) => LruCache::new(cap),
                _ => LruCache::unbounded(),
            };
            shards.push(Mutex::new(Shard {
                active,
                passivated: FxHashMap::default(),
            }));
        }
        Ok(Arc::new(Self {
            shards,
            listeners: ListenerSet::new(),
            properties: StoreProperties {
                persistent: options.persistent,
            },
            passivations: AtomicU64::new(0),
            activations: AtomicU64::new(0),
        }))
    }

    /// Whether `key` is currently in primary memory.
    pub fn is_active(&self, key: &K) -> bool {
        self.shard_for(key).lock().active.contains(key)
    }

    /// Whether `key` currently sits in the passivation tier.
    pub fn is_passivated(&self, key: &K) -> bool {
        self.shard_for(key).lock().passivated.contains_key(key)
    }

    /// Whether `key` exists in either tier.
    pub fn contains(&self, key: &K) -> bool {
        let shard = self.shard_for(key).lock();
        shard.active.contains(key) || shard.passivated.contains_key(key)
    }

    /// Total entries across both tiers.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                let shard = shard.lock();
                shard.active.len() + shard.passivated.len()
            })
            .sum()
    }

    /// Whether the store holds no entry at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Returns current counters.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            passivations: self.passivations.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            ..StoreStats::default()
        };
        for shard in &self.shards {
            let shard = shard.lock();
            stats.active += shard.active.len();
            stats.passivated += shard.passivated.len();
        }
        stats
    }

    fn shard_for(&self, key: &K) -> &Mutex<Shard<K, V>> {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    fn notify_passivated(&self, entry: Option<(K, V)>) {
        let Some((key, value)) = entry else {
            return;
        };
        self.passivations.fetch_add(1, Ordering::Relaxed);
        if self.properties.persistent {
            return;
        }
        let listeners = self.listeners.snapshot();
        for listener in &listeners {
            listener.pre_passivate(&key, &value);
        }
        for listener in &listeners {
            listener.post_passivate(&key);
        }
    }

    fn notify_spilled(&self, spilled: Option<(K, V)>) {
        if spilled.is_some() {
            debug!("store.capacity.spill");
        }
        self.notify_passivated(spilled);
    }
}

impl<K, V> Store<K, V> for MemStore<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        let (activated, spilled) = {
            let mut shard = self.shard_for(key).lock();
            if let Some(value) = shard.active.get(key) {
                return Ok(Some(value.clone()));
            }
            match shard.passivated.remove(key) {
                Some(value) => {
                    let spilled = shard.admit(key.clone(), value.clone());
                    (value, spilled)
                }
                None => return Ok(None),
            }
        };
        self.activations.fetch_add(1, Ordering::Relaxed);
        if !self.properties.persistent {
            for listener in self.listeners.snapshot() {
                listener.post_activate(key, &activated);
            }
        }
        self.notify_spilled(spilled);
        Ok(Some(activated))
    }

    fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key)? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    fn put(&self, key: K, value: V, mode: AccessMode) -> Result<Option<V>> {
        let (previous, spilled) = {
            let mut shard = self.shard_for(&key).lock();
            let previous = shard
                .active
                .pop(&key)
                .or_else(|| shard.passivated.remove(&key));
            let spilled = shard.admit(key.clone(), value.clone());
            (previous, spilled)
        };
        if mode.notifies() {
            for listener in self.listeners.snapshot() {
                listener.modified(&key, &value);
            }
        }
        self.notify_spilled(spilled);
        Ok(previous.filter(|_| mode.returns_previous()))
    }

    fn remove(&self, key: &K, mode: AccessMode) -> Result<Option<V>> {
        let previous = {
            let mut shard = self.shard_for(key).lock();
            shard
                .active
                .pop(key)
                .or_else(|| shard.passivated.remove(key))
        };
        if previous.is_some() && mode.notifies() {
            for listener in self.listeners.snapshot() {
                listener.removed(key);
            }
        }
        Ok(previous.filter(|_| mode.returns_previous()))
    }

    fn evict(&self, key: &K) -> Result<()> {
        let passivated = {
            let mut shard = self.shard_for(key).lock();
            match shard.active.pop(key) {
                Some(value) => {
                    shard.passivated.insert(key.clone(), value.clone());
                    (key.clone(), value)
                }
                None => return Ok(()),
            }
        };
        self.notify_passivated(Some(passivated));
        Ok(())
    }

    fn register(&self, listener: Arc<dyn StoreListener<K, V>>) -> ListenerRegistration {
        self.listeners.register(listener)
    }

    fn properties(&self) -> StoreProperties {
        self.properties
    }
}
