//! Access protocol for the names index and the attribute store.
//!
//! Every store call the session layer makes goes through one of these wrappers,
//! which fix the access mode per operation:
//!
//! | operation                 | mode                         |
//! |---------------------------|------------------------------|
//! | validation reads          | [`AccessMode::Normal`]       |
//! | index reads before a bind | [`AccessMode::Normal`]       |
//! | names index removal       | [`AccessMode::Normal`]       |
//! | view writes and removals  | [`AccessMode::WriteOnly`]    |
//! | purge cascades            | [`AccessMode::Silent`]       |

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::primitives::store::{AccessMode, Store};
use crate::types::{
    AttributeId, AttributeKey, MetaDataKey, NamesKey, NamesMap, Result, SessionId, SessionMetaData,
};

/// Store of top-level session metadata entries.
pub type MetaDataStore = dyn Store<MetaDataKey, SessionMetaData>;

/// Store of names index entries.
pub type NamesStore = dyn Store<NamesKey, NamesMap>;

/// Store of marshalled attribute entries.
pub type AttributeStore = dyn Store<AttributeKey, Bytes>;

/// How a cascade delete reaches the attribute entries.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Deletion {
    /// Session removal; listeners are notified.
    Remove,
    /// Consistency repair or invalidation; listeners are not notified.
    Purge,
}

impl Deletion {
    fn mode(self) -> AccessMode {
        match self {
            Deletion::Remove => AccessMode::WriteOnly,
            Deletion::Purge => AccessMode::Silent,
        }
    }
}

#[derive(Clone)]
pub(crate) struct NamesIndex {
    store: Arc<NamesStore>,
}

impl NamesIndex {
    pub(crate) fn new(store: Arc<NamesStore>) -> Self {
        Self { store }
    }

    pub(crate) fn load(&self, id: &SessionId) -> Result<Option<NamesMap>> {
        self.store.get(&NamesKey(id.clone()))
    }

    pub(crate) fn store(&self, id: &SessionId, names: &NamesMap) -> Result<()> {
        self.store
            .put(NamesKey(id.clone()), names.clone(), AccessMode::WriteOnly)?;
        Ok(())
    }

    /// Adds `name` to the stored entry, starting from `local` when no entry is stored.
    /// Names bound by other views of the session since it was loaded are kept.
    /// Returns the attribute `name` was bound to before, if that was a different one.
    pub(crate) fn bind(
        &self,
        id: &SessionId,
        local: &NamesMap,
        name: &str,
        attribute: AttributeId,
    ) -> Result<Option<AttributeId>> {
        let mut names = self.load(id)?.unwrap_or_else(|| local.clone());
        let replaced = names
            .insert(name.to_owned(), attribute)
            .filter(|previous| *previous != attribute);
        self.store(id, &names)?;
        Ok(replaced)
    }

    /// Drops `name` from the stored entry, starting from `local` when no entry is stored.
    pub(crate) fn unbind(&self, id: &SessionId, local: &NamesMap, name: &str) -> Result<()> {
        let mut names = self.load(id)?.unwrap_or_else(|| local.clone());
        names.remove(name);
        self.store(id, &names)
    }

    /// Removes the entry and returns what it held.
    pub(crate) fn take(&self, id: &SessionId) -> Result<Option<NamesMap>> {
        self.store.remove(&NamesKey(id.clone()), AccessMode::Normal)
    }
}

#[derive(Clone)]
pub(crate) struct AttributeEntries {
    store: Arc<AttributeStore>,
}

impl AttributeEntries {
    pub(crate) fn new(store: Arc<AttributeStore>) -> Self {
        Self { store }
    }

    pub(crate) fn is_persistent(&self) -> bool {
        self.store.properties().is_persistent()
    }

    /// One bulk read. Not atomic across keys.
    pub(crate) fn load_all(&self, keys: &[AttributeKey]) -> Result<HashMap<AttributeKey, Bytes>> {
        self.store.get_all(keys)
    }

    pub(crate) fn store(&self, id: &SessionId, attribute: AttributeId, bytes: Bytes) -> Result<()> {
        self.store.put(
            AttributeKey::new(id.clone(), attribute),
            bytes,
            AccessMode::WriteOnly,
        )?;
        Ok(())
    }

    pub(crate) fn remove(&self, id: &SessionId, attribute: AttributeId) -> Result<()> {
        self.store
            .remove(&AttributeKey::new(id.clone(), attribute), AccessMode::WriteOnly)?;
        Ok(())
    }

    /// Deletes every entry referenced by `names`.
    pub(crate) fn delete_all(&self, id: &SessionId, names: &NamesMap, deletion: Deletion) -> Result<()> {
        let mode = deletion.mode();
        for attribute in names.values() {
            self.store
                .remove(&AttributeKey::new(id.clone(), *attribute), mode)?;
        }
        Ok(())
    }
}
