#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use sombra_sessions::primitives::store::{
    AccessMode, ListenerRegistration, MemStore, MemStoreOptions, Store, StoreListener,
    StoreProperties,
};
use sombra_sessions::storage::{CounterMetrics, FactoryOptions, JsonMarshaller, Marshaller};
use sombra_sessions::types::{
    AttributeId, AttributeKey, MetaDataKey, NamesKey, NamesMap, Result, SessionMetaData,
};
use sombra_sessions::{AttributesFactoryConfig, SessionAttributesFactory, SessionId};

/// Attribute store that counts round trips before delegating.
struct CountingStore {
    inner: Arc<MemStore<AttributeKey, Bytes>>,
    gets: AtomicUsize,
    bulk_gets: AtomicUsize,
}

impl Store<AttributeKey, Bytes> for CountingStore {
    fn get(&self, key: &AttributeKey) -> Result<Option<Bytes>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn get_all(&self, keys: &[AttributeKey]) -> Result<HashMap<AttributeKey, Bytes>> {
        self.bulk_gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all(keys)
    }

    fn put(&self, key: AttributeKey, value: Bytes, mode: AccessMode) -> Result<Option<Bytes>> {
        self.inner.put(key, value, mode)
    }

    fn remove(&self, key: &AttributeKey, mode: AccessMode) -> Result<Option<Bytes>> {
        self.inner.remove(key, mode)
    }

    fn evict(&self, key: &AttributeKey) -> Result<()> {
        self.inner.evict(key)
    }

    fn register(
        &self,
        listener: Arc<dyn StoreListener<AttributeKey, Bytes>>,
    ) -> ListenerRegistration {
        self.inner.register(listener)
    }

    fn properties(&self) -> StoreProperties {
        self.inner.properties()
    }
}

struct Fixture {
    names: Arc<MemStore<NamesKey, NamesMap>>,
    attributes: Arc<CountingStore>,
    metrics: Arc<CounterMetrics>,
    factory: SessionAttributesFactory<Value, ()>,
}

fn fixture() -> Result<Fixture> {
    let metadata = MemStore::<MetaDataKey, SessionMetaData>::open(MemStoreOptions::default())?;
    let names = MemStore::<NamesKey, NamesMap>::open(MemStoreOptions::default())?;
    let attributes = Arc::new(CountingStore {
        inner: MemStore::<AttributeKey, Bytes>::open(MemStoreOptions::default())?,
        gets: AtomicUsize::new(0),
        bulk_gets: AtomicUsize::new(0),
    });
    let metrics = Arc::new(CounterMetrics::default());
    let factory = SessionAttributesFactory::open(
        AttributesFactoryConfig::<Value, ()>::new(
            metadata,
            names.clone(),
            attributes.clone(),
            Arc::new(JsonMarshaller::<Value>::new()),
            (),
        )
        .options(FactoryOptions::default().cascade_workers(1).metrics(metrics.clone())),
    )?;
    Ok(Fixture {
        names,
        attributes,
        metrics,
        factory,
    })
}

fn write_session(fx: &Fixture, id: &SessionId, values: &[(&str, Value)]) -> Result<()> {
    let view = fx.factory.create_attributes_view(
        id,
        fx.factory.create_value(id),
        &SessionMetaData::new(Duration::ZERO),
        (),
    )?;
    for (name, value) in values {
        view.set(name, value.clone())?;
    }
    Ok(())
}

#[test]
fn load_uses_one_bulk_read() -> Result<()> {
    let fx = fixture()?;
    let id = SessionId::from("bulk");
    let values: Vec<(String, Value)> = (0..16).map(|n| (format!("a{n}"), json!(n))).collect();
    let borrowed: Vec<(&str, Value)> = values.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    write_session(&fx, &id, &borrowed)?;

    let bundle = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(bundle.len(), 16);
    assert_eq!(fx.attributes.bulk_gets.load(Ordering::SeqCst), 1);
    assert_eq!(fx.attributes.gets.load(Ordering::SeqCst), 0);
    assert_eq!(fx.metrics.snapshot().attributes_loaded, 16);
    Ok(())
}

#[test]
fn absent_names_index_is_an_empty_session() -> Result<()> {
    let fx = fixture()?;
    let id = SessionId::from("never-written");
    assert_eq!(fx.factory.try_value(&id)?.map(|b| b.len()), Some(0));
    assert_eq!(fx.factory.find_value(&id)?.map(|b| b.len()), Some(0));
    assert_eq!(fx.attributes.bulk_gets.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn one_missing_attribute_invalidates_the_whole_session() -> Result<()> {
    let fx = fixture()?;
    let id = SessionId::from("S1");
    write_session(&fx, &id, &[("a", json!("x")), ("b", json!("y"))])?;

    let index = fx.names.get(&NamesKey(id.clone()))?.expect("index written");
    let mut broken = index.clone();
    broken.insert("ghost".into(), AttributeId::random());
    fx.names
        .put(NamesKey(id.clone()), broken.clone(), AccessMode::Silent)?;

    assert!(fx.factory.try_value(&id)?.is_none());
    assert_eq!(fx.names.get(&NamesKey(id.clone()))?, Some(broken));
    assert_eq!(fx.attributes.inner.len(), 2);

    assert!(fx.factory.find_value(&id)?.is_none());
    assert!(fx.names.get(&NamesKey(id.clone()))?.is_none());
    assert!(fx.attributes.inner.is_empty());
    assert_eq!(fx.factory.find_value(&id)?.map(|b| b.len()), Some(0));
    Ok(())
}

#[test]
fn undecodable_attribute_is_treated_like_a_missing_one() -> Result<()> {
    let fx = fixture()?;
    let id = SessionId::from("S1");
    write_session(&fx, &id, &[("a", json!([1, 2, 3]))])?;
    let index = fx.names.get(&NamesKey(id.clone()))?.expect("index written");
    let attribute = index["a"];
    let key = AttributeKey::new(id.clone(), attribute);

    let mut frame = fx.attributes.inner.get(&key)?.expect("entry").to_vec();
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    fx.attributes
        .inner
        .put(key.clone(), Bytes::from(frame), AccessMode::Silent)?;

    assert!(fx.factory.try_value(&id)?.is_none());
    assert!(fx.attributes.inner.contains(&key));
    assert!(fx.factory.find_value(&id)?.is_none());
    assert!(!fx.attributes.inner.contains(&key));
    assert_eq!(fx.metrics.snapshot().sessions_corrupt, 2);
    Ok(())
}

#[test]
fn values_decode_with_marshaller_equality() -> Result<()> {
    let fx = fixture()?;
    let id = SessionId::from("S4");
    let nested = json!({"cart": {"items": [1, 2], "total": 12.5}, "flags": [true, null]});
    write_session(&fx, &id, &[("state", nested.clone())])?;

    let bundle = fx.factory.find_value(&id)?.expect("session loads");
    let marshaller = JsonMarshaller::<Value>::new();
    let reread = marshaller.read(&marshaller.write(&nested)?)?;
    assert_eq!(bundle.get("state"), Some(&reread));
    Ok(())
}

#[test]
fn concurrent_writers_on_distinct_attributes_do_not_lose_updates() -> Result<()> {
    let fx = fixture()?;
    let id = SessionId::from("shared");
    let view = Arc::new(fx.factory.create_attributes_view(
        &id,
        fx.factory.create_value(&id),
        &SessionMetaData::new(Duration::ZERO),
        (),
    )?);

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let view = Arc::clone(&view);
            thread::spawn(move || view.set(&format!("t{n}"), json!(n)).map(|_| ()))
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread")?;
    }

    let bundle = fx.factory.find_value(&id)?.expect("session loads");
    assert_eq!(bundle.len(), 8);
    for n in 0..8 {
        assert_eq!(bundle.get(&format!("t{n}")), Some(&json!(n)));
    }
    Ok(())
}
