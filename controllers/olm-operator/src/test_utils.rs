//! Test utilities for unit testing reconcilers
//!
//! Fixtures for the OLM resources, a temporary catalog file and a recording
//! [`ClusterClient`].

use crate::cluster::{ClusterClient, MetadataPatch, MetadataTarget};
use async_trait::async_trait;
use crds::{
    ApiKind, ClusterServiceVersion, ClusterServiceVersionSpec, Subscription, SubscriptionSpec, SubscriptionStatus,
    COPIED_FROM_LABEL,
};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub const NAMESPACE: &str = "operators";

/// Declarative config for the `etcd` package, one channel
/// `singlenamespace-alpha`; each bundle provides `EtcdCluster`.
pub fn catalog_json(bundles: &[(&str, &str, Option<&str>)]) -> String {
    let mut out = String::from(
        r#"{"schema": "olm.package", "name": "etcd", "defaultChannel": "singlenamespace-alpha"}"#,
    );
    out.push('\n');
    let entries: Vec<serde_json::Value> = bundles
        .iter()
        .map(|(name, _, replaces)| match replaces {
            Some(r) => serde_json::json!({"name": name, "replaces": r}),
            None => serde_json::json!({"name": name}),
        })
        .collect();
    out.push_str(
        &serde_json::json!({
            "schema": "olm.channel",
            "package": "etcd",
            "name": "singlenamespace-alpha",
            "entries": entries,
        })
        .to_string(),
    );
    out.push('\n');
    for (name, version, _) in bundles {
        out.push_str(
            &serde_json::json!({
                "schema": "olm.bundle",
                "package": "etcd",
                "name": name,
                "image": format!("quay.io/coreos/etcd-operator:{version}"),
                "properties": [
                    {"type": "olm.package", "value": {"packageName": "etcd", "version": version}},
                    {"type": "olm.gvk", "value": {"group": "etcd.database.coreos.com", "version": "v1beta2", "kind": "EtcdCluster"}},
                ],
            })
            .to_string(),
        );
        out.push('\n');
    }
    out
}

/// A catalog file under the system temp directory, removed on drop.
#[derive(Debug)]
pub struct TempCatalog {
    path: PathBuf,
}

impl TempCatalog {
    pub fn new(name: &str, contents: &str) -> Self {
        let path = std::env::temp_dir().join(format!("olm-operator-{}-{name}.json", std::process::id()));
        let catalog = Self { path };
        catalog.write(contents);
        catalog
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, contents: &str) {
        std::fs::write(&self.path, contents).unwrap();
    }
}

impl Drop for TempCatalog {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn subscription(name: &str, package: &str) -> Subscription {
    let mut sub = Subscription::new(
        name,
        SubscriptionSpec {
            package: package.to_string(),
            channel: None,
            source: "operatorhubio-catalog".to_string(),
            source_namespace: "olm".to_string(),
            starting_csv: None,
        },
    );
    sub.metadata.namespace = Some(NAMESPACE.to_string());
    sub
}

pub fn csv(namespace: &str, name: &str, version: &str) -> ClusterServiceVersion {
    let mut csv = ClusterServiceVersion::new(
        name,
        ClusterServiceVersionSpec {
            version: version.to_string(),
            replaces: None,
            display_name: None,
            provided: vec![ApiKind {
                group: "etcd.database.coreos.com".to_string(),
                version: "v1beta2".to_string(),
                kind: "EtcdCluster".to_string(),
            }],
            required: Vec::new(),
        },
    );
    csv.metadata.namespace = Some(namespace.to_string());
    csv
}

pub fn copied_csv(namespace: &str, name: &str, from: &str) -> ClusterServiceVersion {
    let mut copy = csv(namespace, name, "0.9.4");
    copy.metadata.labels = Some(BTreeMap::from([(COPIED_FROM_LABEL.to_string(), from.to_string())]));
    copy
}

pub fn owner(csv: &str) -> OwnerReference {
    OwnerReference {
        api_version: "operators.coreos.com/v1alpha1".to_string(),
        kind: "ClusterServiceVersion".to_string(),
        name: csv.to_string(),
        uid: format!("uid-{csv}"),
        controller: Some(true),
        ..Default::default()
    }
}

pub fn config_map(namespace: &str, name: &str, owner_csv: Option<&str>, data: &[(&str, &str)]) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            owner_references: owner_csv.map(|csv| vec![owner(csv)]),
            ..Default::default()
        },
        data: Some(data.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
        ..Default::default()
    }
}

/// One recorded cluster write.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ApplyMetadata {
        field_manager: String,
        target: MetadataTarget,
        patch: MetadataPatch,
    },
    PatchStatus {
        namespace: String,
        name: String,
        status: SubscriptionStatus,
    },
}

/// Records every write; status patches fail while `fail_status` is set.
#[derive(Debug, Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    fail_status: AtomicBool,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<(String, SubscriptionStatus)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::PatchStatus { name, status, .. } => Some((name, status)),
                Call::ApplyMetadata { .. } => None,
            })
            .collect()
    }

    pub fn fail_status_patches(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterClient for RecordingClient {
    async fn apply_metadata(
        &self,
        field_manager: &str,
        target: &MetadataTarget,
        patch: &MetadataPatch,
    ) -> Result<(), kube::Error> {
        self.calls.lock().unwrap().push(Call::ApplyMetadata {
            field_manager: field_manager.to_string(),
            target: target.clone(),
            patch: patch.clone(),
        });
        Ok(())
    }

    async fn patch_subscription_status(
        &self,
        namespace: &str,
        name: &str,
        status: &SubscriptionStatus,
    ) -> Result<(), kube::Error> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(kube::Error::Service("injected status failure".into()));
        }
        self.calls.lock().unwrap().push(Call::PatchStatus {
            namespace: namespace.to_string(),
            name: name.to_string(),
            status: status.clone(),
        });
        Ok(())
    }
}
