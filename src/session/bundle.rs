use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::types::{AttributeId, NamesMap};

/// Decoded attributes of one session: the names map plus one value per attribute id.
///
/// Transient. The names index and attribute entries are the durable form.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeBundle<V> {
    names: NamesMap,
    values: FxHashMap<AttributeId, V>,
}

impl<V> Default for AttributeBundle<V> {
    fn default() -> Self {
        Self {
            names: NamesMap::new(),
            values: FxHashMap::default(),
        }
    }
}

impl<V> AttributeBundle<V> {
    /// An empty bundle, as produced for a freshly created session.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(names: NamesMap, values: FxHashMap<AttributeId, V>) -> Self {
        Self { names, values }
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut NamesMap, &mut FxHashMap<AttributeId, V>) {
        (&mut self.names, &mut self.values)
    }

    /// Attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.keys().map(String::as_str)
    }

    /// The names map.
    pub fn names_map(&self) -> &NamesMap {
        &self.names
    }

    /// Storage identity bound to `name`.
    pub fn attribute_id(&self, name: &str) -> Option<AttributeId> {
        self.names.get(name).copied()
    }

    /// Decoded value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&V> {
        self.names.get(name).and_then(|id| self.values.get(id))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the session has no attribute.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of decoded values; equals [`AttributeBundle::len`] for any loaded bundle.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

impl<V: Clone> AttributeBundle<V> {
    /// Read-only snapshot of the bundle.
    pub fn immutable(&self) -> ImmutableAttributes<V> {
        ImmutableAttributes {
            inner: Arc::new(self.clone()),
        }
    }
}

/// Shared, read-only attribute snapshot handed to activation listeners.
#[derive(Clone, Debug)]
pub struct ImmutableAttributes<V> {
    inner: Arc<AttributeBundle<V>>,
}

impl<V> ImmutableAttributes<V> {
    /// Attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.names()
    }

    /// Value bound to `name` when the snapshot was taken.
    pub fn get(&self, name: &str) -> Option<&V> {
        self.inner.get(name)
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the snapshot has no attribute.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
