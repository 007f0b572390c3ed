//! Queue informers
//!
//! A [`QueueInformer`] binds one informer, one work queue and one sync
//! handler for a single kind. The informer's notifications only enqueue
//! keys; workers pull keys off the queue, read the current object from the
//! cache and hand it to the handler.

use crate::error::RuntimeError;
use crate::filter::{FilterRegistry, ResourceKind};
use crate::handler::SyncHandler;
use crate::informer::{Indexer, Informer, ResourceEventHandler};
use crate::key::ObjectKey;
use crate::ratelimiter::{ItemExponentialRateLimiter, RateLimiter};
use crate::workqueue::WorkQueue;
use async_trait::async_trait;
use kube::Resource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, Instrument};

/// Result of one pass through a sync handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Handler succeeded
    Success,
    /// Handler failed; the key was requeued with backoff
    Failure,
    /// Object was no longer in the cache
    Missing,
}

impl SyncOutcome {
    /// Label value used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Missing => "missing",
        }
    }
}

/// Hook for metrics; every method defaults to a no-op.
pub trait SyncObserver: Send + Sync {
    /// Called after every processed key.
    fn on_sync(&self, _queue: &str, _outcome: SyncOutcome, _elapsed: Duration) {}
    /// Called after every processed key with the remaining queue depth.
    fn on_queue_depth(&self, _queue: &str, _depth: usize) {}
}

/// Enqueues the key of every notified object that passes the filter.
struct EnqueueHandler<K> {
    queue: Arc<WorkQueue<ObjectKey>>,
    filter: Option<Arc<FilterRegistry>>,
    kind: ResourceKind,
    _kind: std::marker::PhantomData<fn(&K)>,
}

impl<K> EnqueueHandler<K>
where
    K: Resource<DynamicType = ()>,
{
    fn enqueue(&self, obj: &K) {
        if let Some(filter) = &self.filter
            && !filter.allows(&self.kind, obj.meta())
        {
            trace!(kind = %self.kind, name = ?obj.meta().name, "filtered out");
            return;
        }
        if let Some(key) = ObjectKey::from_resource(obj) {
            self.queue.add(key);
        }
    }
}

impl<K> ResourceEventHandler<K> for EnqueueHandler<K>
where
    K: Resource<DynamicType = ()>,
{
    fn on_add(&self, obj: &K) {
        self.enqueue(obj);
    }

    fn on_update(&self, _old: &K, new: &K) {
        self.enqueue(new);
    }

    fn on_delete(&self, obj: &K) {
        self.enqueue(obj);
    }
}

/// One informer, one queue and one handler for kind `K`.
pub struct QueueInformer<K> {
    name: String,
    queue: Arc<WorkQueue<ObjectKey>>,
    informer: Arc<dyn Informer<K>>,
    indexer: Arc<dyn Indexer<K>>,
    handler: Arc<dyn SyncHandler<K>>,
    filter: Option<Arc<FilterRegistry>>,
    observer: Option<Arc<dyn SyncObserver>>,
    resync: Option<Duration>,
    workers: usize,
}

impl<K> std::fmt::Debug for QueueInformer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueInformer")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("resync", &self.resync)
            .finish_non_exhaustive()
    }
}

impl<K> QueueInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    /// Starts building a queue informer named `name`.
    pub fn builder<I, H>(name: impl Into<String>, informer: Arc<I>, handler: H) -> QueueInformerBuilder<K>
    where
        I: Informer<K> + 'static,
        H: SyncHandler<K> + 'static,
    {
        QueueInformerBuilder {
            name: name.into(),
            informer,
            handler: Arc::new(handler),
            limiter: None,
            filter: None,
            observer: None,
            resync: None,
            workers: 1,
        }
    }

    /// Queue informer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The work queue, e.g. for enqueueing keys from other handlers.
    pub fn queue(&self) -> &Arc<WorkQueue<ObjectKey>> {
        &self.queue
    }

    /// Read handle to the informer cache.
    pub fn indexer(&self) -> Arc<dyn Indexer<K>> {
        Arc::clone(&self.indexer)
    }

    /// Number of worker tasks this queue informer runs.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Adds the key of `obj` to the queue, bypassing the filter.
    pub fn enqueue(&self, obj: &K) {
        if let Some(key) = ObjectKey::from_resource(obj) {
            self.queue.add(key);
        }
    }

    fn passes_filter(&self, obj: &K) -> bool {
        self.filter.as_ref().is_none_or(|f| f.allows_object(obj))
    }

    /// Re-enqueues every cached object that passes the filter.
    pub fn resync(&self) {
        let objects = self.indexer.list();
        debug!(queue = %self.name, count = objects.len(), "resync");
        for obj in objects.iter().filter(|o| self.passes_filter(o)) {
            self.enqueue(obj);
        }
    }

    async fn sync_key(&self, key: &ObjectKey) -> SyncOutcome {
        let Some(object) = self.indexer.get(key) else {
            debug!(queue = %self.name, %key, "object no longer cached; nothing to do");
            return SyncOutcome::Missing;
        };
        match self.handler.sync(object).await {
            Ok(()) => SyncOutcome::Success,
            Err(e) => {
                error!(queue = %self.name, %key, retries = self.queue.num_requeues(key), "sync failed: {:#}", e);
                SyncOutcome::Failure
            }
        }
    }

    /// Takes one key off the queue and processes it.
    ///
    /// Returns `false` once the queue is shut down and drained.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let started = Instant::now();
        let span = tracing::debug_span!("sync", queue = %self.name, %key);
        let outcome = self.sync_key(&key).instrument(span).await;

        match outcome {
            SyncOutcome::Success | SyncOutcome::Missing => self.queue.forget(&key),
            SyncOutcome::Failure => self.queue.add_rate_limited(key.clone()),
        }
        self.queue.done(&key);

        if let Some(observer) = &self.observer {
            observer.on_sync(&self.name, outcome, started.elapsed());
            observer.on_queue_depth(&self.name, self.queue.len());
        }
        true
    }
}

/// Builder for [`QueueInformer`].
pub struct QueueInformerBuilder<K> {
    name: String,
    informer: Arc<dyn Informer<K>>,
    handler: Arc<dyn SyncHandler<K>>,
    limiter: Option<Box<dyn RateLimiter<ObjectKey>>>,
    filter: Option<Arc<FilterRegistry>>,
    observer: Option<Arc<dyn SyncObserver>>,
    resync: Option<Duration>,
    workers: usize,
}

impl<K> std::fmt::Debug for QueueInformerBuilder<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueInformerBuilder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

struct BoxedLimiter(Box<dyn RateLimiter<ObjectKey>>);

impl RateLimiter<ObjectKey> for BoxedLimiter {
    fn when(&self, item: &ObjectKey) -> Duration {
        self.0.when(item)
    }

    fn forget(&self, item: &ObjectKey) {
        self.0.forget(item);
    }

    fn num_requeues(&self, item: &ObjectKey) -> u32 {
        self.0.num_requeues(item)
    }
}

impl<K> QueueInformerBuilder<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    /// Rate limiter for failed keys. Defaults to [`ItemExponentialRateLimiter`].
    #[must_use]
    pub fn rate_limiter(mut self, limiter: impl RateLimiter<ObjectKey> + 'static) -> Self {
        self.limiter = Some(Box::new(limiter));
        self
    }

    /// Only enqueue objects the registry allows.
    #[must_use]
    pub fn filter(mut self, registry: Arc<FilterRegistry>) -> Self {
        self.filter = Some(registry);
        self
    }

    /// Receives per-sync metrics.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Re-enqueue every cached object on this period.
    #[must_use]
    pub fn resync_period(mut self, period: Duration) -> Self {
        self.resync = (!period.is_zero()).then_some(period);
        self
    }

    /// Number of worker tasks. Defaults to one.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Wires the queue to the informer.
    pub fn build(self) -> Result<QueueInformer<K>, RuntimeError> {
        if self.workers == 0 {
            return Err(RuntimeError::NoWorkers(self.name));
        }
        let queue = Arc::new(match self.limiter {
            Some(limiter) => WorkQueue::new(self.name.clone(), BoxedLimiter(limiter)),
            None => WorkQueue::new(self.name.clone(), ItemExponentialRateLimiter::default()),
        });
        self.informer.add_event_handler(Arc::new(EnqueueHandler::<K> {
            queue: Arc::clone(&queue),
            filter: self.filter.clone(),
            kind: ResourceKind::of::<K>(),
            _kind: std::marker::PhantomData,
        }));
        let indexer = self.informer.indexer();

        Ok(QueueInformer {
            name: self.name,
            queue,
            informer: self.informer,
            indexer,
            handler: self.handler,
            filter: self.filter,
            observer: self.observer,
            resync: self.resync,
            workers: self.workers,
        })
    }
}

/// Type-erased view of a queue informer used by the operator.
#[async_trait]
pub(crate) trait Runnable: Send + Sync {
    fn name(&self) -> &str;
    fn workers(&self) -> usize;
    async fn run_informer(&self, stop: CancellationToken) -> Result<(), RuntimeError>;
    async fn wait_for_sync(&self);
    async fn run_worker(&self);
    async fn run_resync(&self, stop: CancellationToken);
    fn shut_down(&self);
}

#[async_trait]
impl<K> Runnable for QueueInformer<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn workers(&self) -> usize {
        self.workers
    }

    async fn run_informer(&self, stop: CancellationToken) -> Result<(), RuntimeError> {
        self.informer.run(stop).await
    }

    async fn wait_for_sync(&self) {
        self.informer.wait_for_sync().await;
    }

    async fn run_worker(&self) {
        while self.process_next().await {}
        debug!(queue = %self.name, "worker exiting");
    }

    async fn run_resync(&self, stop: CancellationToken) {
        let Some(period) = self.resync else {
            return;
        };
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately; the initial list already enqueued everything.
        interval.tick().await;
        loop {
            tokio::select! {
                () = stop.cancelled() => return,
                _ = interval.tick() => self.resync(),
            }
        }
    }

    fn shut_down(&self) {
        self.queue.shut_down();
    }
}
