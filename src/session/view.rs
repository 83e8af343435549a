use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::storage::{AttributeMetrics, Immutability, Marshaller};
use crate::types::{AttributeId, Result, SessionId};

use super::activation::ActivationNotifier;
use super::bundle::AttributeBundle;
use super::index::{AttributeEntries, NamesIndex};

struct ViewState<V> {
    bundle: AttributeBundle<V>,
    /// Attributes that already raised `did_activate` through this view.
    activated: FxHashSet<AttributeId>,
}

/// Live read/write access to one session's attributes.
///
/// Reads are served from the loaded bundle. Writes go straight to the names index
/// and the attribute store through the write-only path; each attribute is its
/// own entry, so writers touching different attributes never contend in the store.
///
/// A persistent attribute store has no passivation step and raises no events.
/// For such stores this view raises the callbacks itself, on a schedule of its
/// own choosing rather than one the store drives: `did_activate` on the first
/// read of an attribute and `will_passivate` before each write-back. Provider
/// callbacks run without the view lock held but must not call back into the
/// same view.
pub struct AttributesView<V, C> {
    id: SessionId,
    names: NamesIndex,
    attributes: AttributeEntries,
    state: Mutex<ViewState<V>>,
    marshaller: Arc<dyn Marshaller<V>>,
    immutability: Arc<dyn Immutability<V>>,
    metrics: Arc<dyn AttributeMetrics>,
    notifier: Option<ActivationNotifier<V, C>>,
}

pub(crate) struct ViewParts<V, C> {
    pub(crate) names: NamesIndex,
    pub(crate) attributes: AttributeEntries,
    pub(crate) marshaller: Arc<dyn Marshaller<V>>,
    pub(crate) immutability: Arc<dyn Immutability<V>>,
    pub(crate) metrics: Arc<dyn AttributeMetrics>,
    pub(crate) notifier: Option<ActivationNotifier<V, C>>,
}

impl<V, C> AttributesView<V, C>
where
    V: Clone + PartialEq,
{
    pub(crate) fn new(id: SessionId, bundle: AttributeBundle<V>, parts: ViewParts<V, C>) -> Self {
        Self {
            id,
            names: parts.names,
            attributes: parts.attributes,
            state: Mutex::new(ViewState {
                bundle,
                activated: FxHashSet::default(),
            }),
            marshaller: parts.marshaller,
            immutability: parts.immutability,
            metrics: parts.metrics,
            notifier: parts.notifier,
        }
    }

    /// Session this view belongs to.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current attribute names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.state.lock().bundle.names().map(str::to_owned).collect()
    }

    /// Value bound to `name`, from memory.
    pub fn get(&self, name: &str) -> Option<V> {
        let (value, first_read) = {
            let mut state = self.state.lock();
            let id = state.bundle.attribute_id(name)?;
            let value = state.bundle.get(name).cloned()?;
            let first_read = self.notifier.is_some() && state.activated.insert(id);
            (value, first_read)
        };
        if first_read {
            if let Some(notifier) = &self.notifier {
                notifier.post_activate(&value);
            }
        }
        Some(value)
    }

    /// Binds `value` to `name` and writes it back. Returns the previous value.
    ///
    /// Rebinding an equal value that the immutability policy considers immutable
    /// skips the store write. A new name reaches the names index only after its
    /// attribute entry is stored, so the index never references a missing entry.
    /// If `name` is removed or rebound while the value is being written, the
    /// written entry is deleted again and the other binding stands.
    pub fn set(&self, name: &str, value: V) -> Result<Option<V>> {
        let bytes = self.marshaller.write(&value)?;
        let (bound, previous) = {
            let state = self.state.lock();
            let previous = state.bundle.get(name).cloned();
            if let Some(current) = &previous {
                if *current == value && self.immutability.is_immutable(&value) {
                    self.metrics.attribute_write_skipped();
                    return Ok(previous);
                }
            }
            (state.bundle.attribute_id(name), previous)
        };
        let attribute = bound.unwrap_or_else(AttributeId::random);

        if let Some(notifier) = &self.notifier {
            notifier.pre_passivate(&value);
        }
        self.attributes.store(&self.id, attribute, bytes)?;
        self.metrics.attribute_written();

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let (names, values) = state.bundle.parts_mut();
        match (bound, names.get(name).copied()) {
            (_, Some(current)) if current == attribute => {}
            (None, None) => {
                match self.names.bind(&self.id, names, name, attribute) {
                    Ok(Some(replaced)) => self.discard(name, replaced),
                    Ok(None) => {}
                    Err(err) => {
                        self.discard(name, attribute);
                        return Err(err);
                    }
                }
                names.insert(name.to_owned(), attribute);
            }
            _ => {
                self.discard(name, attribute);
                debug!(session = %self.id, attribute = name, "session.attributes.set_superseded");
                return Ok(previous);
            }
        }
        if self.notifier.is_some() {
            state.activated.insert(attribute);
        }
        Ok(values.insert(attribute, value))
    }

    /// Applies `mutate` to the value bound to `name` and writes it back.
    /// Returns `false` when `name` is unbound.
    pub fn update(&self, name: &str, mutate: impl FnOnce(&mut V)) -> Result<bool> {
        let current = {
            let state = self.state.lock();
            state.bundle.get(name).cloned()
        };
        let Some(mut value) = current else {
            return Ok(false);
        };
        mutate(&mut value);
        self.set(name, value)?;
        Ok(true)
    }

    /// Unbinds `name` and deletes its attribute entry. Returns the previous value.
    pub fn remove(&self, name: &str) -> Result<Option<V>> {
        let (attribute, previous) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let (names, values) = state.bundle.parts_mut();
            let Some(attribute) = names.get(name).copied() else {
                return Ok(None);
            };
            self.names.unbind(&self.id, names, name)?;
            names.remove(name);
            let previous = values.remove(&attribute);
            state.activated.remove(&attribute);
            (attribute, previous)
        };
        self.attributes.remove(&self.id, attribute)?;
        debug!(session = %self.id, attribute = name, "session.attributes.removed");
        Ok(previous)
    }

    /// Copy of the current bundle.
    pub fn snapshot(&self) -> AttributeBundle<V> {
        self.state.lock().bundle.clone()
    }

    /// Releases the view's activation notifier. Idempotent.
    pub fn close(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.close();
        }
    }

    /// Whether the view raises activation callbacks itself.
    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    /// Deletes an entry no binding references any more.
    fn discard(&self, name: &str, attribute: AttributeId) {
        if let Err(err) = self.attributes.remove(&self.id, attribute) {
            warn!(session = %self.id, attribute = name, error = %err, "session.attributes.discard_failed");
        }
    }
}
