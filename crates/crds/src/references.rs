//! Object references shared by the OLM resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A namespaced object name, written `namespace/name`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedName {
    /// Namespace of the referenced object
    pub namespace: String,

    /// Name of the referenced object
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Returned when a string is not of the form `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNamespacedName(pub String);

impl fmt::Display for InvalidNamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected namespace/name, got {:?}", self.0)
    }
}

impl std::error::Error for InvalidNamespacedName {}

impl FromStr for NamespacedName {
    type Err = InvalidNamespacedName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(InvalidNamespacedName(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        let reference = NamespacedName::new("operators", "etcdoperator.v0.9.4");
        assert_eq!(reference.to_string(), "operators/etcdoperator.v0.9.4");
        assert_eq!(reference.to_string().parse::<NamespacedName>().unwrap(), reference);
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        for bad in ["", "name", "/name", "ns/", "a/b/c"] {
            assert!(bad.parse::<NamespacedName>().is_err(), "{bad} should not parse");
        }
    }
}
