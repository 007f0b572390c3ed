//! In-memory informer and probe for tests.
//!
//! [`FakeInformer`] behaves like a watch that has already synced: writes go
//! straight into its cache and handlers are notified synchronously.

use crate::error::RuntimeError;
use crate::informer::{Indexer, Informer, ResourceEventHandler};
use crate::key::ObjectKey;
use crate::probe::ClusterProbe;
use async_trait::async_trait;
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

type Objects<K> = Arc<RwLock<BTreeMap<ObjectKey, Arc<K>>>>;

/// Informer over an in-memory map.
pub struct FakeInformer<K> {
    objects: Objects<K>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<K>>>>,
}

impl<K> std::fmt::Debug for FakeInformer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeInformer").finish_non_exhaustive()
    }
}

impl<K> Default for FakeInformer<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            handlers: RwLock::new(Vec::new()),
        }
    }
}

impl<K> FakeInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    /// Creates an empty informer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an informer pre-populated with `objects`, without notifying.
    pub fn with_objects(objects: impl IntoIterator<Item = K>) -> Self {
        let informer = Self::new();
        {
            let mut map = informer.objects.write().unwrap_or_else(PoisonError::into_inner);
            for obj in objects {
                if let Some(key) = ObjectKey::from_resource(&obj) {
                    map.insert(key, Arc::new(obj));
                }
            }
        }
        informer
    }

    fn handlers(&self) -> Vec<Arc<dyn ResourceEventHandler<K>>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Inserts or replaces an object and notifies handlers.
    pub fn upsert(&self, obj: K) {
        let Some(key) = ObjectKey::from_resource(&obj) else {
            return;
        };
        let previous = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::new(obj.clone()));
        for handler in self.handlers() {
            match &previous {
                Some(old) => handler.on_update(old, &obj),
                None => handler.on_add(&obj),
            }
        }
    }

    /// Removes an object and notifies handlers if it was present.
    pub fn remove(&self, obj: &K) {
        let Some(key) = ObjectKey::from_resource(obj) else {
            return;
        };
        let removed = self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        if let Some(removed) = removed {
            for handler in self.handlers() {
                handler.on_delete(&removed);
            }
        }
    }
}

struct FakeIndexer<K> {
    objects: Objects<K>,
}

impl<K: Send + Sync> Indexer<K> for FakeIndexer<K> {
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn list(&self) -> Vec<Arc<K>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl<K> Informer<K> for FakeInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<K>>) {
        let existing: Vec<Arc<K>> = self.indexer().list();
        for obj in &existing {
            handler.on_add(obj);
        }
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    async fn run(&self, stop: CancellationToken) -> Result<(), RuntimeError> {
        stop.cancelled().await;
        Ok(())
    }

    async fn wait_for_sync(&self) {}

    fn indexer(&self) -> Arc<dyn Indexer<K>> {
        Arc::new(FakeIndexer {
            objects: Arc::clone(&self.objects),
        })
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    reachable: bool,
}

impl StaticProbe {
    /// A probe that always succeeds.
    pub fn reachable() -> Self {
        Self { reachable: true }
    }

    /// A probe that always fails.
    pub fn unreachable() -> Self {
        Self { reachable: false }
    }
}

#[async_trait]
impl ClusterProbe for StaticProbe {
    async fn check(&self) -> Result<(), RuntimeError> {
        if self.reachable {
            Ok(())
        } else {
            Err(RuntimeError::Unreachable("static probe configured as unreachable".to_string()))
        }
    }
}
