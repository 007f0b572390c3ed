//! Bundle properties
//!
//! On the wire every property is `{"type": "<type>", "value": <json>}`. Known
//! types decode into typed variants; anything else is kept verbatim so a
//! catalog round-trips without loss.

use crate::error::CatalogError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `olm.package`
pub const TYPE_PACKAGE: &str = "olm.package";
/// `olm.package.required`
pub const TYPE_PACKAGE_REQUIRED: &str = "olm.package.required";
/// `olm.gvk`
pub const TYPE_GVK: &str = "olm.gvk";
/// `olm.gvk.required`
pub const TYPE_GVK_REQUIRED: &str = "olm.gvk.required";
/// `olm.channel`
pub const TYPE_CHANNEL: &str = "olm.channel";
/// `olm.skips`
pub const TYPE_SKIPS: &str = "olm.skips";
/// `olm.skipRange`
pub const TYPE_SKIP_RANGE: &str = "olm.skipRange";
/// `olm.bundle.object`
pub const TYPE_BUNDLE_OBJECT: &str = "olm.bundle.object";

/// API group, version and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Gvk {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    /// API version
    pub version: String,
    /// Kind
    pub kind: String,
}

impl Gvk {
    /// Creates a GVK from its parts.
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
    }
}

/// Value of an `olm.package` property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageProperty {
    /// Package the bundle belongs to
    pub package_name: String,
    /// Bundle version
    pub version: String,
}

/// Value of an `olm.package.required` property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequired {
    /// Required package
    pub package_name: String,
    /// Acceptable versions, e.g. `>=1.0.0 <2.0.0`
    pub version_range: String,
}

/// Value of an `olm.channel` property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProperty {
    /// Channel name
    pub channel_name: String,
    /// Ordering hint between channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

/// Value of an `olm.bundle.object` property, kept encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleObject {
    /// Inline base64 manifest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Path of the manifest inside the bundle
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// A typed bundle property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawProperty", into = "RawProperty")]
pub enum Property {
    /// Own package name and version
    Package(PackageProperty),
    /// Dependency on a version range of another package
    PackageRequired(PackageRequired),
    /// Provided API
    Gvk(Gvk),
    /// Required API
    GvkRequired(Gvk),
    /// Channel membership
    Channel(ChannelProperty),
    /// Name of a bundle this one skips
    Skips(String),
    /// Versions this bundle can upgrade from directly
    SkipRange(String),
    /// Embedded manifest
    BundleObject(BundleObject),
    /// Unrecognised type, preserved verbatim
    Other {
        /// Property type
        kind: String,
        /// Raw value
        value: serde_json::Value,
    },
}

impl Property {
    /// `olm.package` property for `package` at `version`.
    pub fn package(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Package(PackageProperty {
            package_name: package.into(),
            version: version.into(),
        })
    }

    /// `olm.package.required` property.
    pub fn package_required(package: impl Into<String>, range: impl Into<String>) -> Self {
        Self::PackageRequired(PackageRequired {
            package_name: package.into(),
            version_range: range.into(),
        })
    }

    /// Wire type of this property.
    pub fn kind(&self) -> &str {
        match self {
            Self::Package(_) => TYPE_PACKAGE,
            Self::PackageRequired(_) => TYPE_PACKAGE_REQUIRED,
            Self::Gvk(_) => TYPE_GVK,
            Self::GvkRequired(_) => TYPE_GVK_REQUIRED,
            Self::Channel(_) => TYPE_CHANNEL,
            Self::Skips(_) => TYPE_SKIPS,
            Self::SkipRange(_) => TYPE_SKIP_RANGE,
            Self::BundleObject(_) => TYPE_BUNDLE_OBJECT,
            Self::Other { kind, .. } => kind,
        }
    }
}

/// Wire form of a property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProperty {
    /// Property type
    #[serde(rename = "type")]
    pub kind: String,
    /// Property value
    pub value: serde_json::Value,
}

fn decode<T: DeserializeOwned>(kind: &str, value: serde_json::Value) -> Result<T, CatalogError> {
    serde_json::from_value(value).map_err(|source| CatalogError::InvalidProperty {
        kind: kind.to_string(),
        source,
    })
}

impl TryFrom<RawProperty> for Property {
    type Error = CatalogError;

    fn try_from(raw: RawProperty) -> Result<Self, Self::Error> {
        let RawProperty { kind, value } = raw;
        Ok(match kind.as_str() {
            TYPE_PACKAGE => Self::Package(decode(&kind, value)?),
            TYPE_PACKAGE_REQUIRED => Self::PackageRequired(decode(&kind, value)?),
            TYPE_GVK => Self::Gvk(decode(&kind, value)?),
            TYPE_GVK_REQUIRED => Self::GvkRequired(decode(&kind, value)?),
            TYPE_CHANNEL => Self::Channel(decode(&kind, value)?),
            TYPE_SKIPS => Self::Skips(decode(&kind, value)?),
            TYPE_SKIP_RANGE => Self::SkipRange(decode(&kind, value)?),
            TYPE_BUNDLE_OBJECT => Self::BundleObject(decode(&kind, value)?),
            _ => Self::Other { kind, value },
        })
    }
}

impl From<Property> for RawProperty {
    fn from(property: Property) -> Self {
        let kind = property.kind().to_string();
        // Serializing these plain structs cannot fail.
        let value = match property {
            Property::Package(v) => serde_json::to_value(v),
            Property::PackageRequired(v) => serde_json::to_value(v),
            Property::Gvk(v) | Property::GvkRequired(v) => serde_json::to_value(v),
            Property::Channel(v) => serde_json::to_value(v),
            Property::Skips(v) | Property::SkipRange(v) => Ok(serde_json::Value::String(v)),
            Property::BundleObject(v) => serde_json::to_value(v),
            Property::Other { value, .. } => Ok(value),
        }
        .unwrap_or(serde_json::Value::Null);
        Self { kind, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_properties_decode() {
        let props: Vec<Property> = serde_json::from_value(json!([
            {"type": "olm.package", "value": {"packageName": "etcd", "version": "0.9.4"}},
            {"type": "olm.gvk", "value": {"group": "etcd.database.coreos.com", "version": "v1beta2", "kind": "EtcdCluster"}},
            {"type": "olm.package.required", "value": {"packageName": "prometheus", "versionRange": ">=0.27.0"}},
            {"type": "olm.skipRange", "value": "<0.9.4"},
            {"type": "olm.skips", "value": "etcdoperator.v0.9.0"}
        ]))
        .unwrap();

        assert_eq!(props[0], Property::package("etcd", "0.9.4"));
        assert_eq!(
            props[1],
            Property::Gvk(Gvk::new("etcd.database.coreos.com", "v1beta2", "EtcdCluster"))
        );
        assert_eq!(props[2], Property::package_required("prometheus", ">=0.27.0"));
        assert_eq!(props[3], Property::SkipRange("<0.9.4".to_string()));
        assert_eq!(props[4], Property::Skips("etcdoperator.v0.9.0".to_string()));
    }

    #[test]
    fn test_unknown_property_is_preserved() {
        let raw = json!({"type": "example.com/custom", "value": {"a": [1, 2]}});
        let prop: Property = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(prop.kind(), "example.com/custom");
        assert_eq!(serde_json::to_value(&prop).unwrap(), raw);
    }

    #[test]
    fn test_malformed_known_property_is_rejected() {
        let err = serde_json::from_value::<Property>(json!({"type": "olm.gvk", "value": "nope"})).unwrap_err();
        assert!(err.to_string().contains("olm.gvk"));
    }

    #[test]
    fn test_gvk_display_and_order() {
        let a = Gvk::new("a.example.com", "v1", "Foo");
        let b = Gvk::new("b.example.com", "v1", "Bar");
        assert_eq!(a.to_string(), "a.example.com/v1, Kind=Foo");
        assert!(a < b);
    }
}
