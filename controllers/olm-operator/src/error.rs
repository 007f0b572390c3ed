//! Controller-specific error types.
//!
//! Errors raised while starting or wiring the OLM operator. Failures inside
//! sync handlers are `anyhow` errors and are retried by the runtime instead.

use catalog::CatalogError;
use kube::Error as KubeError;
use queueinformer::RuntimeError;
use thiserror::Error;

/// Errors that can occur in the OLM operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Operator runtime error
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Catalog could not be loaded or is malformed
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics server I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
