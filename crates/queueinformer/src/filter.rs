//! Resource filter registry
//!
//! Decides which objects of a given kind are worth enqueueing at all. The
//! registry is built once at startup and shared by reference with every
//! queue informer that opts into filtering:
//!
//! - predicates registered for the same kind are combined with logical AND
//! - a kind with no registered predicate is never allowed (default deny)

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Group/version/kind of a watched resource type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    /// API group, empty for the core group
    pub group: String,
    /// API version
    pub version: String,
    /// Kind
    pub kind: String,
}

impl ResourceKind {
    /// Creates a kind from its parts.
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Kind of a statically typed resource.
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Applicability check over an object's metadata.
pub type Predicate = Arc<dyn Fn(&ObjectMeta) -> bool + Send + Sync>;

/// Registry of per-kind applicability predicates.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: BTreeMap<ResourceKind, Vec<Predicate>>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<String, usize> = self
            .filters
            .iter()
            .map(|(kind, preds)| (kind.to_string(), preds.len()))
            .collect();
        f.debug_struct("FilterRegistry").field("filters", &counts).finish()
    }
}

impl FilterRegistry {
    /// Starts building a registry.
    pub fn builder() -> FilterRegistryBuilder {
        FilterRegistryBuilder::default()
    }

    /// Whether an object of `kind` with metadata `meta` passes every
    /// predicate registered for the kind. Unregistered kinds are denied.
    pub fn allows(&self, kind: &ResourceKind, meta: &ObjectMeta) -> bool {
        self.filters
            .get(kind)
            .is_some_and(|predicates| predicates.iter().all(|p| p(meta)))
    }

    /// [`FilterRegistry::allows`] for a typed object.
    pub fn allows_object<K: Resource<DynamicType = ()>>(&self, obj: &K) -> bool {
        self.allows(&ResourceKind::of::<K>(), obj.meta())
    }

    /// Kinds that have at least one registered predicate.
    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.filters.keys()
    }
}

/// Builder for [`FilterRegistry`].
#[derive(Default)]
pub struct FilterRegistryBuilder {
    filters: BTreeMap<ResourceKind, Vec<Predicate>>,
}

impl fmt::Debug for FilterRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistryBuilder").finish_non_exhaustive()
    }
}

impl FilterRegistryBuilder {
    /// Adds a predicate for the statically typed kind `K`.
    #[must_use]
    pub fn with<K, F>(self, predicate: F) -> Self
    where
        K: Resource<DynamicType = ()>,
        F: Fn(&ObjectMeta) -> bool + Send + Sync + 'static,
    {
        self.with_kind(ResourceKind::of::<K>(), predicate)
    }

    /// Adds a predicate for an explicit kind.
    #[must_use]
    pub fn with_kind<F>(mut self, kind: ResourceKind, predicate: F) -> Self
    where
        F: Fn(&ObjectMeta) -> bool + Send + Sync + 'static,
    {
        self.filters.entry(kind).or_default().push(Arc::new(predicate));
        self
    }

    /// Finishes the registry.
    pub fn build(self) -> FilterRegistry {
        FilterRegistry {
            filters: self.filters,
        }
    }
}

/// Common predicates.
pub mod predicates {
    use super::ObjectMeta;

    /// Object has an owner reference of the given kind.
    pub fn owned_by_kind(kind: &'static str) -> impl Fn(&ObjectMeta) -> bool + Send + Sync + 'static {
        move |meta| {
            meta.owner_references
                .iter()
                .flatten()
                .any(|owner| owner.kind == kind)
        }
    }

    /// Object does not carry `key=value` yet.
    pub fn lacks_label(key: &'static str, value: &'static str) -> impl Fn(&ObjectMeta) -> bool + Send + Sync + 'static {
        move |meta| {
            meta.labels
                .as_ref()
                .and_then(|labels| labels.get(key))
                .is_none_or(|v| v != value)
        }
    }
}
