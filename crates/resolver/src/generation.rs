//! Resolution output

use serde::Serialize;
use std::collections::BTreeMap;

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    /// Install a bundle of a package that is not installed
    Install,
    /// Replace the installed bundle of a package
    Upgrade,
}

/// Why a step is in the generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepReason {
    /// Demanded by a subscription (`namespace/name`)
    Subscription {
        /// Subscription key
        name: String,
    },
    /// Pulled in to satisfy a requirement of another bundle
    #[serde(rename_all = "camelCase")]
    Dependency {
        /// Bundle with the requirement
        required_by: String,
    },
}

/// One install or upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Package
    pub package: String,
    /// Channel the bundle was taken from
    pub channel: String,
    /// Bundle to install
    pub bundle: String,
    /// Bundle version
    pub version: String,
    /// Bundle this step replaces, for upgrades
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    /// Namespace to install into
    pub target_namespace: String,
    /// Install or upgrade
    pub kind: StepKind,
    /// Why
    pub reason: StepReason,
}

/// A complete, consistent set of changes.
///
/// Steps are ordered so that every bundle comes after the bundles it depends
/// on; the steps of one package are contiguous and in upgrade order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    /// Ordered steps
    pub steps: Vec<Step>,
    /// Bundle every package in scope ends up at, including unchanged ones
    pub resolved: BTreeMap<String, String>,
}

impl Generation {
    /// Whether nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps for `package`, in order.
    pub fn steps_for<'a>(&'a self, package: &'a str) -> impl Iterator<Item = &'a Step> + 'a {
        self.steps.iter().filter(move |s| s.package == package)
    }

    /// Final bundle of `package`.
    pub fn resolved_bundle(&self, package: &str) -> Option<&str> {
        self.resolved.get(package).map(String::as_str)
    }
}
