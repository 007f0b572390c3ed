//! Queue-driven controller runtime
//!
//! Building blocks for reconciling Kubernetes objects one key at a time:
//!
//! - **WorkQueue**: deduplicating FIFO of keys with per-key rate limiting and
//!   a single-flight guarantee (a key is never handed to two workers at once)
//! - **Informer**: local cache of cluster objects emitting add/update/delete
//!   notifications (backed by `kube_runtime`'s watcher and reflector)
//! - **QueueInformer**: binds one informer, one queue and one statically typed
//!   sync handler
//! - **Operator**: owns the queue informers and drives the
//!   `Created -> Running -> Stopped` lifecycle
//!
//! # Example
//!
//! ```no_run
//! use queueinformer::{handler_fn, KubeInformer, KubeProbe, Operator, QueueInformer};
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::{Api, Client};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::try_default().await?;
//! let informer = Arc::new(KubeInformer::new(
//!     Api::<ConfigMap>::all(client.clone()),
//!     Default::default(),
//! ));
//! let handler = handler_fn(|cm: Arc<ConfigMap>| async move {
//!     tracing::info!("saw {:?}", cm.metadata.name);
//!     Ok(())
//! });
//!
//! let mut operator = Operator::new("example", KubeProbe::new(client));
//! operator.register_queue_informer(QueueInformer::builder("configmaps", informer, handler).build()?)?;
//! operator.run(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod filter;
pub mod handler;
pub mod informer;
pub mod key;
pub mod operator;
pub mod probe;
pub mod queue_informer;
pub mod ratelimiter;
pub mod workqueue;

pub use backoff::delay_for_failures;
pub use error::RuntimeError;
#[cfg(any(test, feature = "test-util"))]
pub use fake::{FakeInformer, StaticProbe};
pub use filter::{FilterRegistry, FilterRegistryBuilder, Predicate, ResourceKind};
pub use handler::{handler_fn, FilteredHandler, FnHandler, HandlerChain, SyncHandler};
pub use informer::{Indexer, Informer, KubeInformer, ResourceEventHandler};
pub use key::ObjectKey;
pub use operator::Operator;
pub use probe::{ClusterProbe, KubeProbe};
pub use queue_informer::{QueueInformer, QueueInformerBuilder, SyncObserver, SyncOutcome};
pub use ratelimiter::{ItemExponentialRateLimiter, RateLimiter};
pub use workqueue::WorkQueue;
