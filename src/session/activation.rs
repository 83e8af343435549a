use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::trace;

use crate::storage::AttributeMetrics;
use crate::types::{SessionId, SessionMetaData};

use super::bundle::ImmutableAttributes;

/// Read-only description of the session an activation event belongs to.
#[derive(Clone, Debug)]
pub struct ImmutableSession<V> {
    id: SessionId,
    metadata: Option<SessionMetaData>,
    attributes: Option<ImmutableAttributes<V>>,
}

impl<V> ImmutableSession<V> {
    /// Session described only by its id, as seen from store events.
    pub fn detached(id: SessionId) -> Self {
        Self {
            id,
            metadata: None,
            attributes: None,
        }
    }

    /// Session with metadata and an attribute snapshot.
    pub fn new(id: SessionId, metadata: SessionMetaData, attributes: ImmutableAttributes<V>) -> Self {
        Self {
            id,
            metadata: Some(metadata),
            attributes: Some(attributes),
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Session metadata, when known.
    pub fn metadata(&self) -> Option<&SessionMetaData> {
        self.metadata.as_ref()
    }

    /// Attribute snapshot, when known.
    pub fn attributes(&self) -> Option<&ImmutableAttributes<V>> {
        self.attributes.as_ref()
    }
}

/// Callback target for values that care about passivation.
///
/// Implementations decide per value whether it is activation-aware and ignore the
/// rest.
pub trait ActivationListenerProvider<V, C>: Send + Sync {
    /// `value` is about to leave primary storage.
    fn will_passivate(&self, session: &ImmutableSession<V>, context: &C, value: &V);

    /// `value` was restored to primary storage.
    fn did_activate(&self, session: &ImmutableSession<V>, context: &C, value: &V);
}

/// Provider for applications whose values never listen for activation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoActivationListeners;

impl<V, C> ActivationListenerProvider<V, C> for NoActivationListeners {
    fn will_passivate(&self, _session: &ImmutableSession<V>, _context: &C, _value: &V) {}
    fn did_activate(&self, _session: &ImmutableSession<V>, _context: &C, _value: &V) {}
}

/// Activation callbacks bound to one session.
///
/// Closed exactly once, explicitly or on drop; callbacks after close are dropped.
pub struct ActivationNotifier<V, C> {
    session: ImmutableSession<V>,
    context: C,
    provider: Arc<dyn ActivationListenerProvider<V, C>>,
    metrics: Arc<dyn AttributeMetrics>,
    closed: AtomicBool,
}

impl<V, C> ActivationNotifier<V, C> {
    pub(crate) fn new(
        session: ImmutableSession<V>,
        context: C,
        provider: Arc<dyn ActivationListenerProvider<V, C>>,
        metrics: Arc<dyn AttributeMetrics>,
    ) -> Self {
        trace!(session = %session.id, "session.activation.notifier_opened");
        Self {
            session,
            context,
            provider,
            metrics,
            closed: AtomicBool::new(false),
        }
    }

    /// Session this notifier is bound to.
    pub fn session(&self) -> &ImmutableSession<V> {
        &self.session
    }

    /// Delivers `will_passivate` for `value`.
    pub fn pre_passivate(&self, value: &V) {
        if self.is_closed() {
            return;
        }
        self.provider
            .will_passivate(&self.session, &self.context, value);
        self.metrics.activation_notified("passivate");
    }

    /// Delivers `did_activate` for `value`.
    pub fn post_activate(&self, value: &V) {
        if self.is_closed() {
            return;
        }
        self.provider
            .did_activate(&self.session, &self.context, value);
        self.metrics.activation_notified("activate");
    }

    /// Releases the notifier. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!(session = %self.session.id, "session.activation.notifier_closed");
        }
    }

    /// Whether the notifier was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<V, C> Drop for ActivationNotifier<V, C> {
    fn drop(&mut self) {
        self.close();
    }
}
