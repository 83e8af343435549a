use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::primitives::executor::CascadeExecutor;
use crate::primitives::store::ListenerRegistration;
use crate::storage::{
    default_metrics, AttributeMetrics, FactoryOptions, Immutability, Marshaller, NeverImmutable,
};
use crate::types::{AttributeKey, Result, SessionError, SessionId, SessionMetaData};

use super::activation::{
    ActivationListenerProvider, ActivationNotifier, ImmutableSession, NoActivationListeners,
};
use super::bundle::{AttributeBundle, ImmutableAttributes};
use super::cascade::{AttributeActivationRelay, MetaDataEvictionCascade, NamesEvictionCascade};
use super::index::{AttributeEntries, AttributeStore, Deletion, MetaDataStore, NamesIndex, NamesStore};
use super::view::{AttributesView, ViewParts};

/// Collaborators and options needed to open a [`SessionAttributesFactory`].
pub struct AttributesFactoryConfig<V, C> {
    metadata: Arc<MetaDataStore>,
    names: Arc<NamesStore>,
    attributes: Arc<AttributeStore>,
    marshaller: Arc<dyn Marshaller<V>>,
    immutability: Arc<dyn Immutability<V>>,
    provider: Arc<dyn ActivationListenerProvider<V, C>>,
    context: C,
    options: FactoryOptions,
}

impl<V, C> AttributesFactoryConfig<V, C>
where
    V: 'static,
{
    /// Config over the three stores with default policies: nothing is immutable and
    /// no value listens for activation.
    pub fn new(
        metadata: Arc<MetaDataStore>,
        names: Arc<NamesStore>,
        attributes: Arc<AttributeStore>,
        marshaller: Arc<dyn Marshaller<V>>,
        context: C,
    ) -> Self {
        Self {
            metadata,
            names,
            attributes,
            marshaller,
            immutability: Arc::new(NeverImmutable),
            provider: Arc::new(NoActivationListeners),
            context,
            options: FactoryOptions::default(),
        }
    }

    /// Sets the immutability policy.
    pub fn immutability(mut self, immutability: Arc<dyn Immutability<V>>) -> Self {
        self.immutability = immutability;
        self
    }

    /// Sets the activation listener provider.
    pub fn provider(mut self, provider: Arc<dyn ActivationListenerProvider<V, C>>) -> Self {
        self.provider = provider;
        self
    }

    /// Sets the factory options.
    pub fn options(mut self, options: FactoryOptions) -> Self {
        self.options = options;
        self
    }
}

/// Creates, loads, and deletes fine-grained session attributes.
///
/// Each session is stored as one names index entry plus one attribute entry per
/// attribute. Opening the factory subscribes it to the three stores; closing it
/// (explicitly or on drop) unsubscribes and stops the cascade workers.
pub struct SessionAttributesFactory<V, C> {
    names: NamesIndex,
    attributes: AttributeEntries,
    marshaller: Arc<dyn Marshaller<V>>,
    immutability: Arc<dyn Immutability<V>>,
    provider: Arc<dyn ActivationListenerProvider<V, C>>,
    metrics: Arc<dyn AttributeMetrics>,
    executor: Arc<CascadeExecutor>,
    registrations: Mutex<Vec<ListenerRegistration>>,
    closed: AtomicBool,
}

impl<V, C> SessionAttributesFactory<V, C>
where
    V: Clone + PartialEq + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    /// Validates the options, starts the cascade workers, and subscribes to the stores.
    pub fn open(config: AttributesFactoryConfig<V, C>) -> Result<Self> {
        config.options.validate()?;
        let metrics = config.options.metrics.clone().unwrap_or_else(default_metrics);
        let executor = Arc::new(CascadeExecutor::spawn(
            &config.options.cascade_thread_name,
            config.options.cascade_workers,
        )?);

        let mut registrations = Vec::with_capacity(3);
        registrations.push(
            config
                .metadata
                .register(Arc::new(MetaDataEvictionCascade::new(Arc::clone(&config.names)))),
        );
        registrations.push(config.names.register(Arc::new(NamesEvictionCascade::new(
            Arc::clone(&config.attributes),
            Arc::clone(&executor),
            Arc::clone(&metrics),
        ))));
        let persistent = config.attributes.properties().is_persistent();
        if !persistent {
            registrations.push(config.attributes.register(Arc::new(
                AttributeActivationRelay::new(
                    Arc::clone(&config.marshaller),
                    Arc::clone(&config.provider),
                    config.context.clone(),
                    Arc::clone(&metrics),
                ),
            )));
        }
        debug!(
            workers = config.options.cascade_workers,
            persistent,
            listeners = registrations.len(),
            "session.factory.opened"
        );

        Ok(Self {
            names: NamesIndex::new(config.names),
            attributes: AttributeEntries::new(config.attributes),
            marshaller: config.marshaller,
            immutability: config.immutability,
            provider: config.provider,
            metrics,
            executor,
            registrations: Mutex::new(registrations),
            closed: AtomicBool::new(false),
        })
    }

    /// Empty bundle for a newly created session. Nothing is written until an
    /// attribute is set.
    pub fn create_value(&self, id: &SessionId) -> AttributeBundle<V> {
        trace!(session = %id, "session.attributes.created");
        AttributeBundle::new()
    }

    /// Loads the session's attributes. A missing or undecodable attribute makes the
    /// whole session absent and purges what is left of it.
    pub fn find_value(&self, id: &SessionId) -> Result<Option<AttributeBundle<V>>> {
        self.load(id, true)
    }

    /// Loads the session's attributes without ever modifying the stores.
    pub fn try_value(&self, id: &SessionId) -> Result<Option<AttributeBundle<V>>> {
        self.load(id, false)
    }

    /// Deletes the session's names index entry and every attribute entry it
    /// references, notifying store listeners. Always returns `true`.
    pub fn remove(&self, id: &SessionId) -> Result<bool> {
        self.delete(id, Deletion::Remove)
    }

    /// Like [`SessionAttributesFactory::remove`] but attribute deletions raise no
    /// notifications. Used for corruption repair and invalidation.
    pub fn purge(&self, id: &SessionId) -> Result<bool> {
        self.delete(id, Deletion::Purge)
    }

    /// Live view over a loaded or created bundle.
    pub fn create_attributes_view(
        &self,
        id: &SessionId,
        bundle: AttributeBundle<V>,
        metadata: &SessionMetaData,
        context: C,
    ) -> Result<AttributesView<V, C>> {
        self.ensure_open()?;
        let notifier = self.attributes.is_persistent().then(|| {
            ActivationNotifier::new(
                ImmutableSession::new(id.clone(), metadata.clone(), bundle.immutable()),
                context,
                Arc::clone(&self.provider),
                Arc::clone(&self.metrics),
            )
        });
        Ok(AttributesView::new(
            id.clone(),
            bundle,
            ViewParts {
                names: self.names.clone(),
                attributes: self.attributes.clone(),
                marshaller: Arc::clone(&self.marshaller),
                immutability: Arc::clone(&self.immutability),
                metrics: Arc::clone(&self.metrics),
                notifier,
            },
        ))
    }

    /// Read-only snapshot of `bundle`.
    pub fn create_immutable_attributes(&self, bundle: &AttributeBundle<V>) -> ImmutableAttributes<V> {
        bundle.immutable()
    }

    /// Waits until every scheduled cascade eviction ran. Returns `false` on timeout.
    pub fn await_cascade(&self, timeout: Duration) -> bool {
        self.executor.await_idle(timeout)
    }

    /// Metrics sink in use.
    pub fn metrics(&self) -> &Arc<dyn AttributeMetrics> {
        &self.metrics
    }

    fn load(&self, id: &SessionId, purge_if_invalid: bool) -> Result<Option<AttributeBundle<V>>> {
        self.ensure_open()?;
        let Some(names) = self.names.load(id)? else {
            self.metrics.session_loaded(0);
            return Ok(Some(AttributeBundle::new()));
        };

        let keys: Vec<AttributeKey> = names
            .values()
            .map(|attribute| AttributeKey::new(id.clone(), *attribute))
            .collect();
        let mut entries = self.attributes.load_all(&keys)?;

        let mut values = FxHashMap::default();
        for (name, attribute) in &names {
            let key = AttributeKey::new(id.clone(), *attribute);
            let decoded = match entries.remove(&key) {
                Some(bytes) => self.marshaller.read(&bytes),
                None => Err(SessionError::MissingEntry(key)),
            };
            match decoded {
                Ok(value) => {
                    values.insert(*attribute, value);
                }
                Err(err) => {
                    self.report_invalid(id, name, &err, purge_if_invalid);
                    self.metrics.session_corrupt();
                    if purge_if_invalid {
                        self.delete(id, Deletion::Purge)?;
                    }
                    return Ok(None);
                }
            }
        }

        self.metrics.session_loaded(names.len());
        Ok(Some(AttributeBundle::from_parts(names, values)))
    }

    fn report_invalid(&self, id: &SessionId, name: &str, err: &SessionError, purge: bool) {
        match err {
            SessionError::MissingEntry(key) => warn!(
                session = %id,
                attribute = name,
                key = %key,
                purge,
                "session.attributes.missing_entry"
            ),
            other => warn!(
                session = %id,
                attribute = name,
                error = %other,
                purge,
                "session.attributes.decode_failed"
            ),
        }
    }
}

impl<V, C> SessionAttributesFactory<V, C> {
    /// Unsubscribes from the stores and stops the cascade workers after they drain.
    /// Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let registrations = std::mem::take(&mut *self.registrations.lock());
        for registration in &registrations {
            registration.close();
        }
        self.executor.shutdown();
        debug!(listeners = registrations.len(), "session.factory.closed");
    }

    /// Whether [`SessionAttributesFactory::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::Closed("session attributes factory"));
        }
        Ok(())
    }

    fn delete(&self, id: &SessionId, deletion: Deletion) -> Result<bool> {
        self.ensure_open()?;
        let purged = deletion == Deletion::Purge;
        match self.names.take(id)? {
            Some(names) => {
                self.attributes.delete_all(id, &names, deletion)?;
                debug!(session = %id, attributes = names.len(), purged, "session.attributes.deleted");
            }
            None => trace!(session = %id, purged, "session.attributes.delete_without_index"),
        }
        self.metrics.session_deleted(purged);
        Ok(true)
    }
}

impl<V, C> Drop for SessionAttributesFactory<V, C> {
    fn drop(&mut self) {
        self.close();
    }
}
