use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking session attribute operations.
///
/// Implementations collect statistics about loads, write-backs, cascades, and
/// activation callbacks. This information is used for monitoring and for the
/// counters printed by the command line tool.
pub trait AttributeMetrics: Send + Sync {
    /// Records a completed load of a session's attributes.
    ///
    /// # Parameters
    /// * `attributes` - Number of attributes decoded.
    fn session_loaded(&self, attributes: usize);

    /// Records a load aborted because of a missing or undecodable attribute.
    fn session_corrupt(&self);

    /// Records a cascade delete of a session's entries.
    ///
    /// # Parameters
    /// * `silent` - Whether listener notifications were suppressed.
    fn session_deleted(&self, silent: bool);

    /// Records an attribute value written back to the store.
    fn attribute_written(&self);

    /// Records a write skipped because an equal immutable value was already bound.
    fn attribute_write_skipped(&self);

    /// Records an attribute eviction scheduled by the cascade.
    fn cascade_eviction(&self);

    /// Records an activation callback.
    ///
    /// # Parameters
    /// * `direction` - `"passivate"` or `"activate"`.
    fn activation_notified(&self, direction: &'static str);
}

/// A no-op implementation of [`AttributeMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl AttributeMetrics for NoopMetrics {
    fn session_loaded(&self, _attributes: usize) {}
    fn session_corrupt(&self) {}
    fn session_deleted(&self, _silent: bool) {}
    fn attribute_written(&self) {}
    fn attribute_write_skipped(&self) {}
    fn cascade_eviction(&self) {}
    fn activation_notified(&self, _direction: &'static str) {}
}

/// A thread-safe counter-based implementation of [`AttributeMetrics`].
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Sessions loaded successfully.
    pub sessions_loaded: AtomicU64,
    /// Attributes decoded across all successful loads.
    pub attributes_loaded: AtomicU64,
    /// Loads aborted because of corruption.
    pub sessions_corrupt: AtomicU64,
    /// Cascade deletes through the write-only path.
    pub sessions_removed: AtomicU64,
    /// Cascade deletes through the silent path.
    pub sessions_purged: AtomicU64,
    /// Attribute values written back.
    pub attributes_written: AtomicU64,
    /// Attribute writes skipped for immutable, unchanged values.
    pub attribute_writes_skipped: AtomicU64,
    /// Attribute evictions scheduled by the names cascade.
    pub cascade_evictions: AtomicU64,
    /// `will_passivate` callbacks delivered.
    pub passivation_notifications: AtomicU64,
    /// `did_activate` callbacks delivered.
    pub activation_notifications: AtomicU64,
}

impl CounterMetrics {
    /// Returns a plain copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_loaded: self.sessions_loaded.load(Ordering::Relaxed),
            attributes_loaded: self.attributes_loaded.load(Ordering::Relaxed),
            sessions_corrupt: self.sessions_corrupt.load(Ordering::Relaxed),
            sessions_removed: self.sessions_removed.load(Ordering::Relaxed),
            sessions_purged: self.sessions_purged.load(Ordering::Relaxed),
            attributes_written: self.attributes_written.load(Ordering::Relaxed),
            attribute_writes_skipped: self.attribute_writes_skipped.load(Ordering::Relaxed),
            cascade_evictions: self.cascade_evictions.load(Ordering::Relaxed),
            passivation_notifications: self.passivation_notifications.load(Ordering::Relaxed),
            activation_notifications: self.activation_notifications.load(Ordering::Relaxed),
        }
    }
}

impl AttributeMetrics for CounterMetrics {
    fn session_loaded(&self, attributes: usize) {
        self.sessions_loaded.fetch_add(1, Ordering::Relaxed);
        self.attributes_loaded
            .fetch_add(attributes as u64, Ordering::Relaxed);
    }

    fn session_corrupt(&self) {
        self.sessions_corrupt.fetch_add(1, Ordering::Relaxed);
    }

    fn session_deleted(&self, silent: bool) {
        if silent {
            self.sessions_purged.fetch_add(1, Ordering::Relaxed);
        } else {
            self.sessions_removed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn attribute_written(&self) {
        self.attributes_written.fetch_add(1, Ordering::Relaxed);
    }

    fn attribute_write_skipped(&self) {
        self.attribute_writes_skipped
            .fetch_add(1, Ordering::Relaxed);
    }

    fn cascade_eviction(&self) {
        self.cascade_evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn activation_notified(&self, direction: &'static str) {
        match direction {
            "passivate" => {
                self.passivation_notifications
                    .fetch_add(1, Ordering::Relaxed);
            }
            "activate" => {
                self.activation_notifications
                    .fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Plain copy of [`CounterMetrics`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Sessions loaded successfully.
    pub sessions_loaded: u64,
    /// Attributes decoded across all successful loads.
    pub attributes_loaded: u64,
    /// Loads aborted because of corruption.
    pub sessions_corrupt: u64,
    /// Cascade deletes through the write-only path.
    pub sessions_removed: u64,
    /// Cascade deletes through the silent path.
    pub sessions_purged: u64,
    /// Attribute values written back.
    pub attributes_written: u64,
    /// Attribute writes skipped for immutable, unchanged values.
    pub attribute_writes_skipped: u64,
    /// Attribute evictions scheduled by the names cascade.
    pub cascade_evictions: u64,
    /// `will_passivate` callbacks delivered.
    pub passivation_notifications: u64,
    /// `did_activate` callbacks delivered.
    pub activation_notifications: u64,
}

/// Returns the default metrics implementation wrapped in an [`Arc`].
///
/// The default implementation is [`NoopMetrics`].
pub fn default_metrics() -> Arc<dyn AttributeMetrics> {
    Arc::new(NoopMetrics)
}
