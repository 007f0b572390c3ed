//! Runtime errors
//!
//! Errors raised by the operator runtime itself. Failures of individual
//! syncs are never turned into these: they are logged and retried by the
//! worker loop.

use thiserror::Error;

/// Errors that can occur while wiring or running the operator runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Startup connectivity check against the API server failed
    #[error("Cluster connectivity check failed: {0}")]
    Connectivity(#[source] kube::Error),

    /// Cluster reported as unreachable by a non-kube probe
    #[error("Cluster unreachable: {0}")]
    Unreachable(String),

    /// An informer was asked to run a second time
    #[error("Informer for {0} is already running")]
    InformerAlreadyRunning(String),

    /// Two queue informers were registered under the same name
    #[error("Queue informer {0} is already registered")]
    DuplicateQueueInformer(String),

    /// A queue informer was configured without workers
    #[error("Queue informer {0} needs at least one worker")]
    NoWorkers(String),
}
