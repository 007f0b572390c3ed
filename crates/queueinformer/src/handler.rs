//! Sync handlers
//!
//! A sync handler reconciles one object of one statically known kind. The
//! runtime never inspects the object itself; handlers get the full typed
//! object and thereby read and write access to its name, namespace, labels,
//! annotations and owner references through `kube::Resource`.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{trace, warn};

/// Reconciliation logic for one kind.
///
/// Handlers must be idempotent: the same key can be delivered again after a
/// resync or a restart without the object having changed.
#[async_trait]
pub trait SyncHandler<K: Send + Sync + 'static>: Send + Sync {
    /// Reconciles `object`. Errors are logged and the key is retried with backoff.
    async fn sync(&self, object: Arc<K>) -> anyhow::Result<()>;
}

/// Sync handler backed by an async closure.
pub struct FnHandler<F>(F);

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnHandler").finish()
    }
}

/// Wraps an async closure as a [`SyncHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F> {
    FnHandler(f)
}

#[async_trait]
impl<K, F, Fut> SyncHandler<K> for FnHandler<F>
where
    K: Send + Sync + 'static,
    F: Fn(Arc<K>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn sync(&self, object: Arc<K>) -> anyhow::Result<()> {
        (self.0)(object).await
    }
}

type ObjectPredicate<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// Invokes the inner handler only for objects passing every predicate.
pub struct FilteredHandler<K> {
    name: String,
    predicates: Vec<ObjectPredicate<K>>,
    inner: Arc<dyn SyncHandler<K>>,
}

impl<K> fmt::Debug for FilteredHandler<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredHandler")
            .field("name", &self.name)
            .field("predicates", &self.predicates.len())
            .finish_non_exhaustive()
    }
}

impl<K: Send + Sync + 'static> FilteredHandler<K> {
    /// Wraps `inner`. Without predicates every object passes.
    pub fn new(name: impl Into<String>, inner: impl SyncHandler<K> + 'static) -> Self {
        Self {
            name: name.into(),
            predicates: Vec::new(),
            inner: Arc::new(inner),
        }
    }

    /// Adds a predicate; all predicates must hold for the handler to run.
    #[must_use]
    pub fn and<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&K) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }
}

#[async_trait]
impl<K: Send + Sync + 'static> SyncHandler<K> for FilteredHandler<K> {
    async fn sync(&self, object: Arc<K>) -> anyhow::Result<()> {
        if !self.predicates.iter().all(|p| p(&object)) {
            trace!(handler = %self.name, "object filtered out");
            return Ok(());
        }
        self.inner.sync(object).await
    }
}

/// Runs several handlers for the same object, in registration order.
///
/// Every handler runs even if an earlier one fails; the first error is returned.
pub struct HandlerChain<K> {
    handlers: Vec<Arc<dyn SyncHandler<K>>>,
}

impl<K> fmt::Debug for HandlerChain<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<K: Send + Sync + 'static> Default for HandlerChain<K> {
    fn default() -> Self {
        Self { handlers: Vec::new() }
    }
}

impl<K: Send + Sync + 'static> HandlerChain<K> {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    #[must_use]
    pub fn with(mut self, handler: impl SyncHandler<K> + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Number of handlers in the chain.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the chain has no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl<K: Send + Sync + 'static> SyncHandler<K> for HandlerChain<K> {
    async fn sync(&self, object: Arc<K>) -> anyhow::Result<()> {
        let mut first_error = None;
        for handler in &self.handlers {
            if let Err(e) = handler.sync(Arc::clone(&object)).await {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!("Additional sync handler failure: {:#}", e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
