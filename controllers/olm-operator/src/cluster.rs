//! Writes to the cluster
//!
//! Handlers never talk to the API server directly; they go through
//! [`ClusterClient`] so the reconcilers can be tested against a recording
//! fake. Metadata is written with server-side apply, one field manager per
//! concern, so each handler owns exactly the labels and annotations it sets.

use async_trait::async_trait;
use crds::{Subscription, SubscriptionStatus};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::{Api, Client, Resource};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Object whose metadata is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTarget {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl MetadataTarget {
    /// Target for a typed object; `None` if the object has no name.
    pub fn of<K: Resource<DynamicType = ()>>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        Some(Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone()?,
        })
    }
}

/// Labels and annotations owned by one field manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPatch {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl MetadataPatch {
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations.extend(annotations);
        self
    }
}

/// Cluster writes performed by the sync handlers.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Server-side applies `patch` to the metadata of `target` as `field_manager`.
    async fn apply_metadata(
        &self,
        field_manager: &str,
        target: &MetadataTarget,
        patch: &MetadataPatch,
    ) -> Result<(), kube::Error>;

    /// Replaces the status of a subscription.
    async fn patch_subscription_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SubscriptionStatus,
    ) -> Result<(), kube::Error>;
}

/// [`ClusterClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, target: &MetadataTarget) -> (Api<DynamicObject>, ApiResource) {
        let (group, version) = target
            .api_version
            .split_once('/')
            .unwrap_or(("", target.api_version.as_str()));
        let resource = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &target.kind));
        let api = match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        };
        (api, resource)
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn apply_metadata(
        &self,
        field_manager: &str,
        target: &MetadataTarget,
        patch: &MetadataPatch,
    ) -> Result<(), kube::Error> {
        let (api, resource) = self.dynamic_api(target);
        let body = json!({
            "apiVersion": resource.api_version,
            "kind": resource.kind,
            "metadata": {
                "name": target.name,
                "labels": patch.labels,
                "annotations": patch.annotations,
            },
        });
        let pp = PatchParams::apply(field_manager).force();
        api.patch(&target.name, &pp, &Patch::Apply(&body)).await?;
        debug!(
            "Applied metadata to {} {}/{} as {}",
            target.kind,
            target.namespace.as_deref().unwrap_or(""),
            target.name,
            field_manager
        );
        Ok(())
    }

    async fn patch_subscription_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SubscriptionStatus,
    ) -> Result<(), kube::Error> {
        let api: Api<Subscription> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_target_of_typed_object() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("etcd-operator".to_string()),
                namespace: Some("operators".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            MetadataTarget::of(&deployment),
            Some(MetadataTarget {
                api_version: "apps/v1".to_string(),
                kind: "Deployment".to_string(),
                namespace: Some("operators".to_string()),
                name: "etcd-operator".to_string(),
            })
        );
        assert_eq!(MetadataTarget::of(&Deployment::default()), None);
    }
}
