//! Content hash labels for CSV-owned ConfigMaps
//!
//! Workloads mounting a ConfigMap can watch `olm.content-hash` to notice
//! that its payload changed. The label is rewritten only when the hash moves.

use super::owning_csv;
use crate::cluster::{ClusterClient, MetadataPatch, MetadataTarget};
use anyhow::Context;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use queueinformer::SyncHandler;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

pub const CONTENT_HASH_LABEL: &str = "olm.content-hash";
pub const FIELD_MANAGER: &str = "olm-operator-content-hash";

/// Hash of the `data` and `binaryData` of a ConfigMap, 32 hex digits.
///
/// Entries are fed in key order, tagged with the map they came from, so
/// moving a key between the two maps changes the hash.
pub fn content_hash(cm: &ConfigMap) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in cm.data.iter().flatten() {
        hasher.update(b"data\0");
        hasher.update(key.as_bytes());
        hasher.update(b"\0");
        hasher.update(value.as_bytes());
        hasher.update(b"\0");
    }
    for (key, value) in cm.binary_data.iter().flatten() {
        hasher.update(b"binaryData\0");
        hasher.update(key.as_bytes());
        hasher.update(b"\0");
        hasher.update(&value.0);
        hasher.update(b"\0");
    }
    hasher.finalize().iter().take(16).map(|b| format!("{b:02x}")).collect()
}

pub struct ContentHashLabeller {
    client: Arc<dyn ClusterClient>,
}

impl ContentHashLabeller {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SyncHandler<ConfigMap> for ContentHashLabeller {
    async fn sync(&self, cm: Arc<ConfigMap>) -> anyhow::Result<()> {
        if owning_csv(&cm.metadata).is_none() {
            return Ok(());
        }
        let hash = content_hash(&cm);
        if cm.labels().get(CONTENT_HASH_LABEL) == Some(&hash) {
            debug!("ConfigMap {} content hash is current", cm.name_any());
            return Ok(());
        }
        let Some(target) = MetadataTarget::of(cm.as_ref()) else {
            return Ok(());
        };
        let patch = MetadataPatch::default().label(CONTENT_HASH_LABEL, hash.as_str());
        self.client
            .apply_metadata(FIELD_MANAGER, &target, &patch)
            .await
            .with_context(|| format!("labelling ConfigMap {} with its content hash", target.name))?;
        info!(
            "Labelled ConfigMap {}/{} with content hash {}",
            target.namespace.as_deref().unwrap_or_default(),
            target.name,
            hash
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{config_map, Call, RecordingClient, NAMESPACE};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    const OWNER: Option<&str> = Some("etcdoperator.v0.9.4");

    #[test]
    fn test_hash_depends_on_content_only() {
        let a = config_map(NAMESPACE, "a", OWNER, &[("x", "1"), ("y", "2")]);
        let b = config_map("elsewhere", "b", None, &[("y", "2"), ("x", "1")]);
        let c = config_map(NAMESPACE, "a", OWNER, &[("x", "1"), ("y", "3")]);

        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
        assert_eq!(content_hash(&a).len(), 32);
        assert!(content_hash(&a).chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_binary_data_is_distinguished_from_data() {
        let text = config_map(NAMESPACE, "a", OWNER, &[("x", "1")]);
        let mut binary = config_map(NAMESPACE, "a", OWNER, &[]);
        binary.binary_data = Some(BTreeMap::from([("x".to_string(), ByteString(b"1".to_vec()))]));

        assert_ne!(content_hash(&text), content_hash(&binary));
    }

    #[tokio::test]
    async fn test_label_is_written_once_per_content() {
        let client = Arc::new(RecordingClient::new());
        let labeller = ContentHashLabeller::new(Arc::clone(&client) as Arc<dyn ClusterClient>);
        let mut cm = config_map(NAMESPACE, "settings", OWNER, &[("mode", "fast")]);

        labeller.sync(Arc::new(cm.clone())).await.unwrap();
        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        let Call::ApplyMetadata {
            field_manager, patch, ..
        } = &calls[0]
        else {
            panic!("expected a metadata apply");
        };
        assert_eq!(field_manager, FIELD_MANAGER);
        let written = patch.labels[CONTENT_HASH_LABEL].clone();
        assert_eq!(written, content_hash(&cm));

        cm.metadata.labels = Some(BTreeMap::from([(CONTENT_HASH_LABEL.to_string(), written)]));
        labeller.sync(Arc::new(cm.clone())).await.unwrap();
        assert_eq!(client.calls().len(), 1);

        cm.data = Some(BTreeMap::from([("mode".to_string(), "slow".to_string())]));
        labeller.sync(Arc::new(cm)).await.unwrap();
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unowned_config_map_is_ignored() {
        let client = Arc::new(RecordingClient::new());
        let labeller = ContentHashLabeller::new(Arc::clone(&client) as Arc<dyn ClusterClient>);

        labeller
            .sync(Arc::new(config_map(NAMESPACE, "settings", None, &[("a", "b")])))
            .await
            .unwrap();

        assert!(client.calls().is_empty());
    }
}
