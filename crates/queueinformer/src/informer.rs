//! Informers and their local caches.
//!
//! An informer keeps an eventually consistent local copy of one resource type
//! and tells registered handlers about additions, updates and deletions. The
//! cache is only written by the informer itself; everybody else reads it
//! through an [`Indexer`].
//!
//! [`KubeInformer`] is the production implementation on top of
//! `kube_runtime`'s watcher and reflector store. The watch stream is retried
//! with backoff automatically, so the informer keeps running until stopped.

use crate::error::RuntimeError;
use crate::key::ObjectKey;
use async_trait::async_trait;
use futures::StreamExt;
use kube::{Api, Resource};
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives change notifications from an informer.
///
/// Notifications are delivered after the cache reflects the change.
pub trait ResourceEventHandler<K>: Send + Sync {
    /// An object appeared.
    fn on_add(&self, _obj: &K) {}
    /// An object changed.
    fn on_update(&self, _old: &K, _new: &K) {}
    /// An object disappeared.
    fn on_delete(&self, _obj: &K) {}
}

/// Read access to an informer's local cache.
pub trait Indexer<K>: Send + Sync {
    /// Looks up an object by key.
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>>;
    /// Every cached object.
    fn list(&self) -> Vec<Arc<K>>;
}

/// Watches one resource type and maintains its local cache.
#[async_trait]
pub trait Informer<K: Send + Sync + 'static>: Send + Sync {
    /// Registers a handler for future notifications.
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<K>>);
    /// Populates the cache and emits notifications until `stop` fires.
    async fn run(&self, stop: CancellationToken) -> Result<(), RuntimeError>;
    /// Resolves once the initial list has been loaded into the cache.
    async fn wait_for_sync(&self);
    /// Read handle to the cache.
    fn indexer(&self) -> Arc<dyn Indexer<K>>;
}

/// Cache read handle over a reflector store.
#[derive(Debug, Clone)]
pub struct KubeIndexer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store: Store<K>,
}

impl<K> Indexer<K> for KubeIndexer<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, key: &ObjectKey) -> Option<Arc<K>> {
        let mut obj_ref = ObjectRef::<K>::new(key.name());
        if let Some(ns) = key.namespace() {
            obj_ref = obj_ref.within(ns);
        }
        self.store.get(&obj_ref)
    }

    fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }
}

/// How one object changed across a relist.
#[derive(Debug)]
enum Relisted<K> {
    Added(K),
    Updated(Arc<K>, K),
    Deleted(Arc<K>),
}

/// Compares the cache before a relist with the objects the relist returned.
/// Updates and additions come in relist order, deletions last.
fn diff_relist<K>(before: Vec<Arc<K>>, relisted: Vec<K>) -> Vec<Relisted<K>>
where
    K: Resource<DynamicType = ()>,
{
    let mut previous: HashMap<ObjectRef<K>, Arc<K>> = before
        .into_iter()
        .map(|obj| (ObjectRef::from_obj(obj.as_ref()), obj))
        .collect();
    let mut changes = Vec::with_capacity(relisted.len() + previous.len());
    for obj in relisted {
        match previous.remove(&ObjectRef::from_obj(&obj)) {
            Some(old) => changes.push(Relisted::Updated(old, obj)),
            None => changes.push(Relisted::Added(obj)),
        }
    }
    changes.extend(previous.into_values().map(Relisted::Deleted));
    changes
}

/// Informer backed by a kube watcher and reflector store.
pub struct KubeInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    api: Api<K>,
    config: watcher::Config,
    store: Store<K>,
    writer: Mutex<Option<Writer<K>>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<K>>>>,
}

impl<K> std::fmt::Debug for KubeInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeInformer")
            .field("kind", &K::kind(&()))
            .finish_non_exhaustive()
    }
}

impl<K> KubeInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Creates an informer for the objects visible through `api`.
    pub fn new(api: Api<K>, config: watcher::Config) -> Self {
        let writer = Writer::default();
        let store = writer.as_reader();
        Self {
            api,
            config,
            store,
            writer: Mutex::new(Some(writer)),
            handlers: RwLock::new(Vec::new()),
        }
    }

    fn handlers(&self) -> Vec<Arc<dyn ResourceEventHandler<K>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify_add(&self, obj: &K) {
        for handler in self.handlers() {
            handler.on_add(obj);
        }
    }

    fn notify_update(&self, old: &K, new: &K) {
        for handler in self.handlers() {
            handler.on_update(old, new);
        }
    }

    fn notify_delete(&self, obj: &K) {
        for handler in self.handlers() {
            handler.on_delete(obj);
        }
    }

    /// Applies one watch event to the store, then notifies handlers.
    ///
    /// Objects listed during a (re)list only become visible in the store at
    /// `InitDone`, so their notifications are held back until then.
    fn handle_event(&self, writer: &mut Writer<K>, event: watcher::Event<K>, relisted: &mut Vec<K>) {
        match &event {
            watcher::Event::Apply(obj) => {
                let previous = self.store.get(&ObjectRef::from_obj(obj));
                writer.apply_watcher_event(&event);
                match previous {
                    Some(old) => self.notify_update(&old, obj),
                    None => self.notify_add(obj),
                }
            }
            watcher::Event::Delete(obj) => {
                writer.apply_watcher_event(&event);
                self.notify_delete(obj);
            }
            watcher::Event::Init => {
                relisted.clear();
                writer.apply_watcher_event(&event);
            }
            watcher::Event::InitApply(obj) => {
                relisted.push(obj.clone());
                writer.apply_watcher_event(&event);
            }
            watcher::Event::InitDone => {
                let before = self.store.state();
                writer.apply_watcher_event(&event);

                for change in diff_relist(before, std::mem::take(relisted)) {
                    match change {
                        Relisted::Added(obj) => self.notify_add(&obj),
                        Relisted::Updated(old, obj) => self.notify_update(&old, &obj),
                        Relisted::Deleted(old) => self.notify_delete(&old),
                    }
                }
                debug!("{} informer relist complete", K::kind(&()));
            }
        }
    }
}

#[async_trait]
impl<K> Informer<K> for KubeInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn add_event_handler(&self, handler: Arc<dyn ResourceEventHandler<K>>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    async fn run(&self, stop: CancellationToken) -> Result<(), RuntimeError> {
        let kind = K::kind(&()).into_owned();
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| RuntimeError::InformerAlreadyRunning(kind.clone()))?;

        info!("Starting {} informer", kind);

        let mut stream = watcher(self.api.clone(), self.config.clone())
            .default_backoff()
            .boxed();
        let mut relisted = Vec::new();

        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(event)) => self.handle_event(&mut writer, event, &mut relisted),
                    Some(Err(e)) => warn!("{} watch error (will retry): {}", kind, e),
                    None => break,
                },
            }
        }

        info!("{} informer stopped", kind);
        Ok(())
    }

    async fn wait_for_sync(&self) {
        if let Err(e) = self.store.wait_until_ready().await {
            warn!("{} informer store writer dropped before sync: {}", K::kind(&()), e);
        }
    }

    fn indexer(&self) -> Arc<dyn Indexer<K>> {
        Arc::new(KubeIndexer {
            store: self.store.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(name: &str, version: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("operators".to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn describe(change: &Relisted<ConfigMap>) -> (String, &'static str) {
        let (obj, what) = match change {
            Relisted::Added(obj) => (obj, "added"),
            Relisted::Updated(_, obj) => (obj, "updated"),
            Relisted::Deleted(obj) => (obj.as_ref(), "deleted"),
        };
        (obj.metadata.name.clone().unwrap_or_default(), what)
    }

    #[test]
    fn test_relist_classifies_additions_updates_and_deletions() {
        let before = vec![Arc::new(config_map("kept", "1")), Arc::new(config_map("gone", "1"))];
        let relisted = vec![config_map("new", "3"), config_map("kept", "2")];

        let changes = diff_relist(before, relisted);
        let described: Vec<_> = changes.iter().map(describe).collect();
        assert_eq!(
            described,
            [
                ("new".to_string(), "added"),
                ("kept".to_string(), "updated"),
                ("gone".to_string(), "deleted"),
            ]
        );

        let Relisted::Updated(old, new) = &changes[1] else {
            panic!("expected an update, got {:?}", changes[1]);
        };
        assert_eq!(old.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(new.metadata.resource_version.as_deref(), Some("2"));
    }

    #[test]
    fn test_large_relist_matches_every_object() {
        let before: Vec<Arc<ConfigMap>> = (0..5_000)
            .map(|i| Arc::new(config_map(&format!("cm-{i}"), "1")))
            .collect();
        let relisted: Vec<ConfigMap> = (0..5_000)
            .rev()
            .map(|i| config_map(&format!("cm-{i}"), "2"))
            .collect();

        let changes = diff_relist(before, relisted);
        assert_eq!(changes.len(), 5_000);
        assert!(changes.iter().all(|c| matches!(c, Relisted::Updated(..))));
    }
}
