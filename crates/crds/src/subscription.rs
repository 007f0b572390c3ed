//! Subscription CRD
//!
//! Asks for a package to be installed from a catalog channel and kept at the
//! channel head.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set when the last resolution attempt failed.
pub const RESOLUTION_FAILED: &str = "ResolutionFailed";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "Subscription",
    namespaced,
    status = "SubscriptionStatus",
    shortname = "sub",
    printcolumn = r#"{"name":"Package","type":"string","jsonPath":".spec.package"}"#,
    printcolumn = r#"{"name":"Channel","type":"string","jsonPath":".spec.channel"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Package to install
    pub package: String,

    /// Channel to follow; the package's default channel when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Catalog source name
    #[serde(default)]
    pub source: String,

    /// Namespace of the catalog source
    #[serde(default)]
    pub source_namespace: String,

    /// Bundle to install first instead of the channel head
    #[serde(default, rename = "startingCSV", skip_serializing_if = "Option::is_none")]
    pub starting_csv: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// Where the subscription stands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SubscriptionState>,

    /// Bundle the subscription resolves to
    #[serde(default, rename = "currentCSV", skip_serializing_if = "Option::is_none")]
    pub current_csv: Option<String>,

    /// Bundle currently installed for the package
    #[serde(default, rename = "installedCSV", skip_serializing_if = "Option::is_none")]
    pub installed_csv: Option<String>,

    /// Steps still to be applied for this subscription
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned_steps: Vec<PlannedStep>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<SubscriptionCondition>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,
}

impl SubscriptionStatus {
    /// Condition of the given type, if recorded.
    pub fn condition(&self, kind: &str) -> Option<&SubscriptionCondition> {
        self.conditions.iter().find(|c| c.type_ == kind)
    }

    /// Replaces the condition of the same type, keeping its transition time
    /// when the status value did not change.
    pub fn set_condition(&mut self, mut condition: SubscriptionCondition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Steps were planned and have not been applied yet
    UpgradePending,

    /// The installed bundle is the channel head
    AtLatestKnown,

    /// Resolution failed; see the ResolutionFailed condition
    Failed,
}

/// One planned install or upgrade.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub bundle: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    /// `Install` or `Upgrade`
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionCondition {
    /// Condition type, e.g. ResolutionFailed
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub last_transition_time: chrono::DateTime<chrono::Utc>,
}

impl SubscriptionCondition {
    pub fn new(type_: &str, status: bool, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: None,
            message: None,
            last_transition_time: now,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>, message: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self.message = Some(message.into());
        self
    }
}
