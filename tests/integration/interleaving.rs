#![allow(missing_docs)]

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sombra_sessions::primitives::store::{
    AccessMode, ListenerRegistration, MemStore, MemStoreOptions, Store, StoreListener,
    StoreProperties,
};
use sombra_sessions::storage::{FactoryOptions, JsonMarshaller};
use sombra_sessions::types::{
    AttributeKey, MetaDataKey, NamesKey, NamesMap, Result, SessionMetaData,
};
use sombra_sessions::{
    AttributeBundle, AttributesFactoryConfig, AttributesView, SessionAttributesFactory, SessionId,
};

type Hook = Box<dyn FnOnce() + Send>;

/// Store that runs one-shot hooks around the next `put`.
struct Hooked<K: Hash + Eq, V> {
    inner: Arc<MemStore<K, V>>,
    before_put: Mutex<Option<Hook>>,
    after_put: Mutex<Option<Hook>>,
}

impl<K: Hash + Eq, V> Hooked<K, V> {
    fn new(inner: Arc<MemStore<K, V>>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            before_put: Mutex::new(None),
            after_put: Mutex::new(None),
        })
    }

    fn before_next_put(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_put.lock() = Some(Box::new(hook));
    }

    fn after_next_put(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_put.lock() = Some(Box::new(hook));
    }
}

impl<K: Hash + Eq, V> Store<K, V> for Hooked<K, V>
where
    MemStore<K, V>: Store<K, V>,
{
    fn get(&self, key: &K) -> Result<Option<V>> {
        self.inner.get(key)
    }

    fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        self.inner.get_all(keys)
    }

    fn put(&self, key: K, value: V, mode: AccessMode) -> Result<Option<V>> {
        let before = self.before_put.lock().take();
        if let Some(hook) = before {
            hook();
        }
        let previous = self.inner.put(key, value, mode)?;
        let after = self.after_put.lock().take();
        if let Some(hook) = after {
            hook();
        }
        Ok(previous)
    }

    fn remove(&self, key: &K, mode: AccessMode) -> Result<Option<V>> {
        self.inner.remove(key, mode)
    }

    fn evict(&self, key: &K) -> Result<()> {
        self.inner.evict(key)
    }

    fn register(&self, listener: Arc<dyn StoreListener<K, V>>) -> ListenerRegistration {
        self.inner.register(listener)
    }

    fn properties(&self) -> StoreProperties {
        self.inner.properties()
    }
}

struct Fixture {
    names: Arc<Hooked<NamesKey, NamesMap>>,
    attributes: Arc<Hooked<AttributeKey, Bytes>>,
    factory: Arc<SessionAttributesFactory<Value, ()>>,
}

impl Fixture {
    fn open() -> Result<Self> {
        let metadata = MemStore::<MetaDataKey, SessionMetaData>::open(MemStoreOptions::default())?;
        let names = Hooked::new(MemStore::<NamesKey, NamesMap>::open(MemStoreOptions::default())?);
        let attributes =
            Hooked::new(MemStore::<AttributeKey, Bytes>::open(MemStoreOptions::default())?);
        let factory = SessionAttributesFactory::open(
            AttributesFactoryConfig::<Value, ()>::new(
                metadata,
                names.clone(),
                attributes.clone(),
                Arc::new(JsonMarshaller::<Value>::new()),
                (),
            )
            .options(FactoryOptions::default().cascade_workers(1)),
        )?;
        Ok(Self {
            names,
            attributes,
            factory: Arc::new(factory),
        })
    }

    fn view(&self, id: &SessionId) -> Result<Arc<AttributesView<Value, ()>>> {
        let bundle = self
            .factory
            .find_value(id)?
            .unwrap_or_else(|| self.factory.create_value(id));
        Ok(Arc::new(self.factory.create_attributes_view(
            id,
            bundle,
            &SessionMetaData::new(Duration::ZERO),
            (),
        )?))
    }

    fn stored_names(&self, id: &SessionId) -> Result<Option<NamesMap>> {
        self.names.get(&NamesKey(id.clone()))
    }

    /// Runs a validating load from inside the next `put` on `store`, once it returns.
    fn load_after_next_put<K: Hash + Eq, V>(
        &self,
        store: &Hooked<K, V>,
        id: &SessionId,
    ) -> Arc<Mutex<Option<Result<Option<AttributeBundle<Value>>>>>> {
        let seen = Arc::new(Mutex::new(None));
        let factory = Arc::downgrade(&self.factory);
        let id = id.clone();
        let slot = seen.clone();
        store.after_next_put(move || {
            if let Some(factory) = factory.upgrade() {
                *slot.lock() = Some(factory.find_value(&id));
            }
        });
        seen
    }
}

fn seen_bundle(
    seen: &Mutex<Option<Result<Option<AttributeBundle<Value>>>>>,
) -> Option<AttributeBundle<Value>> {
    match seen.lock().take() {
        Some(Ok(bundle)) => bundle,
        Some(Err(err)) => panic!("load inside put failed: {err}"),
        None => panic!("hook did not run"),
    }
}

#[test]
fn load_after_the_index_write_sees_the_new_attribute() -> Result<()> {
    let fx = Fixture::open()?;
    let id = SessionId::from("S1");
    let view = fx.view(&id)?;
    let seen = fx.load_after_next_put(&fx.names, &id);

    assert_eq!(view.set("user", json!("alice"))?, None);

    let during = seen_bundle(&seen).expect("index and entry both stored");
    assert_eq!(during.get("user"), Some(&json!("alice")));
    assert!(fx.stored_names(&id)?.is_some_and(|names| names.contains_key("user")));
    assert_eq!(fx.attributes.inner.len(), 1);
    let reloaded = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(reloaded.get("user"), Some(&json!("alice")));
    Ok(())
}

#[test]
fn load_between_value_and_index_write_sees_the_old_names() -> Result<()> {
    let fx = Fixture::open()?;
    let id = SessionId::from("S1");
    let view = fx.view(&id)?;
    view.set("cart", json!([1]))?;
    let seen = fx.load_after_next_put(&fx.attributes, &id);

    view.set("user", json!("alice"))?;

    let during = seen_bundle(&seen).expect("session intact during the write");
    assert_eq!(during.len(), 1);
    assert_eq!(during.get("cart"), Some(&json!([1])));
    let reloaded = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(reloaded.len(), 2);
    assert_eq!(fx.attributes.inner.len(), 2);
    Ok(())
}

#[test]
fn remove_during_a_parked_set_leaves_no_entry_behind() -> Result<()> {
    let fx = Fixture::open()?;
    let id = SessionId::from("S1");
    let view = fx.view(&id)?;
    view.set("cart", json!([1]))?;

    let arrived = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    fx.attributes.before_next_put({
        let arrived = arrived.clone();
        let release = release.clone();
        move || {
            arrived.wait();
            release.wait();
        }
    });
    let writer = thread::spawn({
        let view = view.clone();
        move || view.set("cart", json!([1, 2]))
    });

    arrived.wait();
    assert_eq!(view.remove("cart")?, Some(json!([1])));
    release.wait();
    let previous = writer.join().expect("writer thread")?;
    assert_eq!(previous, Some(json!([1])));

    assert_eq!(fx.stored_names(&id)?, Some(NamesMap::new()));
    assert!(fx.attributes.inner.is_empty());
    assert!(view.names().is_empty());
    assert_eq!(view.snapshot().value_count(), 0);

    assert!(fx.factory.remove(&id)?);
    assert!(fx.attributes.inner.is_empty());
    Ok(())
}

#[test]
fn rebind_during_a_parked_set_keeps_the_newer_binding() -> Result<()> {
    let fx = Fixture::open()?;
    let id = SessionId::from("S1");
    let view = fx.view(&id)?;
    view.set("cart", json!([1]))?;

    let arrived = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    fx.attributes.before_next_put({
        let arrived = arrived.clone();
        let release = release.clone();
        move || {
            arrived.wait();
            release.wait();
        }
    });
    let writer = thread::spawn({
        let view = view.clone();
        move || view.set("cart", json!([1, 2]))
    });

    arrived.wait();
    view.remove("cart")?;
    view.set("cart", json!([9]))?;
    release.wait();
    writer.join().expect("writer thread")?;

    assert_eq!(view.get("cart"), Some(json!([9])));
    assert_eq!(fx.attributes.inner.len(), 1);
    let reloaded = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(reloaded.get("cart"), Some(&json!([9])));
    Ok(())
}

#[test]
fn two_views_adding_different_names_keep_both() -> Result<()> {
    let fx = Fixture::open()?;
    let id = SessionId::from("S1");
    fx.view(&id)?.set("user", json!("alice"))?;

    let first = fx.view(&id)?;
    let second = fx.view(&id)?;
    first.set("cart", json!([1]))?;
    second.set("theme", json!("dark"))?;

    let reloaded = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(reloaded.len(), 3);
    assert_eq!(reloaded.get("cart"), Some(&json!([1])));
    assert_eq!(reloaded.get("theme"), Some(&json!("dark")));
    assert_eq!(fx.attributes.inner.len(), 3);
    Ok(())
}

#[test]
fn two_views_writing_one_attribute_last_write_wins() -> Result<()> {
    let fx = Fixture::open()?;
    let id = SessionId::from("S1");
    fx.view(&id)?.set("user", json!("alice"))?;

    let first = fx.view(&id)?;
    let second = fx.view(&id)?;
    first.set("user", json!("bob"))?;
    second.set("user", json!("carol"))?;

    let reloaded = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(reloaded.get("user"), Some(&json!("carol")));
    assert_eq!(fx.attributes.inner.len(), 1);
    Ok(())
}

#[test]
fn two_views_binding_one_new_name_leave_a_single_entry() -> Result<()> {
    let fx = Fixture::open()?;
    let id = SessionId::from("S1");
    let first = fx.view(&id)?;
    let second = fx.view(&id)?;

    first.set("cart", json!([1]))?;
    second.set("cart", json!([2]))?;

    let reloaded = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.get("cart"), Some(&json!([2])));
    assert_eq!(fx.attributes.inner.len(), 1);

    assert!(fx.factory.remove(&id)?);
    assert!(fx.attributes.inner.is_empty());
    Ok(())
}
