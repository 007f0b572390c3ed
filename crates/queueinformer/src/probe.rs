//! Startup connectivity checks.

use crate::error::RuntimeError;
use async_trait::async_trait;
use kube::Client;
use tracing::info;

/// Verifies the cluster is reachable before any informer starts.
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    /// Returns an error if the cluster cannot be reached.
    async fn check(&self) -> Result<(), RuntimeError>;
}

/// Probe asking the API server for its version.
#[derive(Clone)]
pub struct KubeProbe {
    client: Client,
}

impl std::fmt::Debug for KubeProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeProbe").finish_non_exhaustive()
    }
}

impl KubeProbe {
    /// Creates a probe using `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterProbe for KubeProbe {
    async fn check(&self) -> Result<(), RuntimeError> {
        let version = self
            .client
            .apiserver_version()
            .await
            .map_err(RuntimeError::Connectivity)?;
        info!("Connected to Kubernetes API server {}", version.git_version);
        Ok(())
    }
}
