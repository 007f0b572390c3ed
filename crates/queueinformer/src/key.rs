//! Work queue keys.

use kube::Resource;
use std::fmt;

/// Identifies one object in a queue and in an informer cache.
///
/// Two objects with the same kind, namespace and name always produce equal
/// keys, which is what lets the queue coalesce repeated notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    kind: String,
    namespace: Option<String>,
    name: String,
}

impl ObjectKey {
    /// Creates a key from its parts.
    pub fn new(kind: impl Into<String>, namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace,
            name: name.into(),
        }
    }

    /// Derives the key of a typed Kubernetes object.
    ///
    /// Returns `None` for objects that have no name yet.
    pub fn from_resource<K>(obj: &K) -> Option<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        let meta = obj.meta();
        let name = meta.name.clone()?;
        Some(Self {
            kind: K::kind(&()).into_owned(),
            namespace: meta.namespace.clone(),
            name,
        })
    }

    /// Object kind, e.g. `Subscription`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Namespace, `None` for cluster-scoped objects.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Object name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}:{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}:{}", self.kind, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn config_map(ns: &str, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_equal_objects_produce_equal_keys() {
        let a = ObjectKey::from_resource(&config_map("olm", "a"));
        let b = ObjectKey::from_resource(&config_map("olm", "a"));
        assert_eq!(a, b);
        assert_eq!(a.unwrap().to_string(), "ConfigMap:olm/a");
    }

    #[test]
    fn test_namespace_distinguishes_keys() {
        let a = ObjectKey::from_resource(&config_map("one", "a"));
        let b = ObjectKey::from_resource(&config_map("two", "a"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_cluster_scoped_key() {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("operators".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let key = ObjectKey::from_resource(&ns).unwrap();
        assert_eq!(key.namespace(), None);
        assert_eq!(key.to_string(), "Namespace:operators");
    }

    #[test]
    fn test_unnamed_object_has_no_key() {
        let cm = ConfigMap::default();
        assert!(ObjectKey::from_resource(&cm).is_none());
    }
}
