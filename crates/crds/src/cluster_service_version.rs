//! ClusterServiceVersion CRD
//!
//! An installed bundle. Copies placed into other namespaces carry the
//! `olm.copiedFrom` label naming the namespace of the original.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label marking a copied CSV; the value is the original's namespace.
pub const COPIED_FROM_LABEL: &str = "olm.copiedFrom";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "ClusterServiceVersion",
    namespaced,
    status = "ClusterServiceVersionStatus",
    shortname = "csv",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    /// Semantic version of the bundle
    pub version: String,

    /// Bundle this one replaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// APIs served by the bundle
    #[serde(default)]
    pub provided: Vec<ApiKind>,

    /// APIs the bundle needs from others
    #[serde(default)]
    pub required: Vec<ApiKind>,
}

/// Group, version and kind of an API.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<CsvPhase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum CsvPhase {
    Pending,
    Installing,
    Succeeded,
    Failed,
}

impl ClusterServiceVersion {
    /// Namespace of the original when this CSV is a copy.
    pub fn copied_from(&self) -> Option<&str> {
        self.labels()
            .get(COPIED_FROM_LABEL)
            .map(String::as_str)
            .filter(|ns| !ns.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(labels: &[(&str, &str)]) -> ClusterServiceVersion {
        let mut csv = ClusterServiceVersion::new(
            "etcdoperator.v0.9.4",
            ClusterServiceVersionSpec {
                version: "0.9.4".to_string(),
                replaces: Some("etcdoperator.v0.9.2".to_string()),
                display_name: None,
                provided: vec![ApiKind {
                    group: "etcd.database.coreos.com".to_string(),
                    version: "v1beta2".to_string(),
                    kind: "EtcdCluster".to_string(),
                }],
                required: Vec::new(),
            },
        );
        csv.metadata.namespace = Some("team-a".to_string());
        csv.metadata.labels = Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        csv
    }

    #[test]
    fn test_copied_from_reads_label() {
        assert_eq!(csv(&[]).copied_from(), None);
        assert_eq!(csv(&[(COPIED_FROM_LABEL, "operators")]).copied_from(), Some("operators"));
        assert_eq!(csv(&[(COPIED_FROM_LABEL, "")]).copied_from(), None);
    }
}
