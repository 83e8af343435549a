//! Store subscribers that keep a session's entries moving together.
//!
//! * [`MetaDataEvictionCascade`]: metadata passivated, so passivate the names index.
//! * [`NamesEvictionCascade`]: names index passivating, so evict every attribute
//!   entry it references, one executor task per attribute.
//! * [`AttributeActivationRelay`]: attribute entry passivating or activated, so
//!   decode it and notify the activation listener provider.
//!
//! Attribute evictions never cascade upwards.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::primitives::executor::CascadeExecutor;
use crate::primitives::store::StoreListener;
use crate::storage::{AttributeMetrics, Marshaller};
use crate::types::{AttributeKey, MetaDataKey, NamesKey, NamesMap, SessionMetaData};

use super::activation::{ActivationListenerProvider, ActivationNotifier, ImmutableSession};
use super::index::{AttributeStore, NamesStore};

pub(crate) struct MetaDataEvictionCascade {
    names: Arc<NamesStore>,
}

impl MetaDataEvictionCascade {
    pub(crate) fn new(names: Arc<NamesStore>) -> Self {
        Self { names }
    }
}

impl StoreListener<MetaDataKey, SessionMetaData> for MetaDataEvictionCascade {
    fn post_passivate(&self, key: &MetaDataKey) {
        debug!(session = %key.0, "session.cascade.evict_names");
        if let Err(err) = self.names.evict(&NamesKey(key.0.clone())) {
            warn!(session = %key.0, error = %err, "session.cascade.evict_names_failed");
        }
    }
}

pub(crate) struct NamesEvictionCascade {
    attributes: Arc<AttributeStore>,
    executor: Arc<CascadeExecutor>,
    metrics: Arc<dyn AttributeMetrics>,
}

impl NamesEvictionCascade {
    pub(crate) fn new(
        attributes: Arc<AttributeStore>,
        executor: Arc<CascadeExecutor>,
        metrics: Arc<dyn AttributeMetrics>,
    ) -> Self {
        Self {
            attributes,
            executor,
            metrics,
        }
    }
}

impl StoreListener<NamesKey, NamesMap> for NamesEvictionCascade {
    fn pre_passivate(&self, key: &NamesKey, names: &NamesMap) {
        debug!(session = %key.0, attributes = names.len(), "session.cascade.evict_attributes");
        for attribute in names.values() {
            let store = Arc::clone(&self.attributes);
            let key = AttributeKey::new(key.0.clone(), *attribute);
            self.executor.execute(move || {
                if let Err(err) = store.evict(&key) {
                    warn!(attribute = %key, error = %err, "session.cascade.evict_attribute_failed");
                }
            });
            self.metrics.cascade_eviction();
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum Transition {
    Passivate,
    Activate,
}

pub(crate) struct AttributeActivationRelay<V, C> {
    marshaller: Arc<dyn Marshaller<V>>,
    provider: Arc<dyn ActivationListenerProvider<V, C>>,
    context: C,
    metrics: Arc<dyn AttributeMetrics>,
}

impl<V, C: Clone> AttributeActivationRelay<V, C> {
    pub(crate) fn new(
        marshaller: Arc<dyn Marshaller<V>>,
        provider: Arc<dyn ActivationListenerProvider<V, C>>,
        context: C,
        metrics: Arc<dyn AttributeMetrics>,
    ) -> Self {
        Self {
            marshaller,
            provider,
            context,
            metrics,
        }
    }

    fn notify(&self, transition: Transition, key: &AttributeKey, bytes: &Bytes) {
        let notifier = ActivationNotifier::new(
            ImmutableSession::detached(key.session.clone()),
            self.context.clone(),
            Arc::clone(&self.provider),
            Arc::clone(&self.metrics),
        );
        match self.marshaller.read(bytes) {
            Ok(value) => match transition {
                Transition::Passivate => notifier.pre_passivate(&value),
                Transition::Activate => notifier.post_activate(&value),
            },
            Err(err) => {
                warn!(
                    session = %key.session,
                    attribute = %key.attribute,
                    ?transition,
                    error = %err,
                    "session.activation.decode_failed"
                );
            }
        }
    }
}

impl<V, C> StoreListener<AttributeKey, Bytes> for AttributeActivationRelay<V, C>
where
    V: Send + Sync,
    C: Clone + Send + Sync,
{
    fn pre_passivate(&self, key: &AttributeKey, value: &Bytes) {
        self.notify(Transition::Passivate, key, value);
    }

    fn post_activate(&self, key: &AttributeKey, value: &Bytes) {
        self.notify(Transition::Activate, key, value);
    }
}
