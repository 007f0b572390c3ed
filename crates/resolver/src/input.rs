//! Resolver inputs: what is wanted and what is already there.

use catalog::{Bundle, CatalogError, Gvk, PackageRequired, Property};
use semver::Version;
use std::collections::BTreeMap;

/// Declared intent to track a package on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Namespace the operator is installed into
    pub namespace: String,
    /// Subscription name
    pub name: String,
    /// Package to track
    pub package: String,
    /// Channel; the package's default channel when unset
    pub channel: Option<String>,
    /// Bundle to install first instead of the channel head
    pub starting_csv: Option<String>,
}

impl SubscriptionRequest {
    /// Subscription to `package` on its default channel.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            package: package.into(),
            channel: None,
            starting_csv: None,
        }
    }

    /// Tracks `channel` instead of the default channel.
    #[must_use]
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Installs `csv` first on a fresh install.
    #[must_use]
    pub fn starting_at(mut self, csv: impl Into<String>) -> Self {
        self.starting_csv = Some(csv.into());
        self
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// A bundle that is currently installed.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledBundle {
    /// Bundle (CSV) name
    pub name: String,
    /// Package
    pub package: String,
    /// Installed version
    pub version: Version,
    /// Namespace it is installed in
    pub namespace: String,
    /// Properties it was installed with
    pub properties: Vec<Property>,
}

impl InstalledBundle {
    /// An installed bundle without properties.
    pub fn new(name: impl Into<String>, package: impl Into<String>, version: Version, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            version,
            namespace: namespace.into(),
            properties: Vec::new(),
        }
    }

    /// Records a catalog bundle as installed in `namespace`.
    pub fn from_bundle(bundle: &Bundle, namespace: impl Into<String>) -> Result<Self, CatalogError> {
        Ok(Self {
            name: bundle.name.clone(),
            package: bundle.package.clone(),
            version: bundle.version()?,
            namespace: namespace.into(),
            properties: bundle.properties.clone(),
        })
    }

    /// Appends a property.
    #[must_use]
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub(crate) fn provided_gvks(&self) -> impl Iterator<Item = &Gvk> {
        self.properties.iter().filter_map(|p| match p {
            Property::Gvk(gvk) => Some(gvk),
            _ => None,
        })
    }

    pub(crate) fn required_gvks(&self) -> impl Iterator<Item = &Gvk> {
        self.properties.iter().filter_map(|p| match p {
            Property::GvkRequired(gvk) => Some(gvk),
            _ => None,
        })
    }

    pub(crate) fn required_packages(&self) -> impl Iterator<Item = &PackageRequired> {
        self.properties.iter().filter_map(|p| match p {
            Property::PackageRequired(req) => Some(req),
            _ => None,
        })
    }
}

/// Installed bundles in scope, at most one per package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstalledState {
    by_package: BTreeMap<String, InstalledBundle>,
}

impl InstalledState {
    /// Nothing installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a bundle, replacing any other bundle of the same package.
    #[must_use]
    pub fn with(mut self, bundle: InstalledBundle) -> Self {
        self.insert(bundle);
        self
    }

    /// Adds a bundle, replacing any other bundle of the same package.
    pub fn insert(&mut self, bundle: InstalledBundle) {
        self.by_package.insert(bundle.package.clone(), bundle);
    }

    /// Installed bundle of `package`.
    pub fn get(&self, package: &str) -> Option<&InstalledBundle> {
        self.by_package.get(package)
    }

    /// Installed bundles in package order.
    pub fn iter(&self) -> impl Iterator<Item = &InstalledBundle> {
        self.by_package.values()
    }

    /// Number of installed bundles.
    pub fn len(&self) -> usize {
        self.by_package.len()
    }

    /// Whether nothing is installed.
    pub fn is_empty(&self) -> bool {
        self.by_package.is_empty()
    }
}

impl FromIterator<InstalledBundle> for InstalledState {
    fn from_iter<I: IntoIterator<Item = InstalledBundle>>(iter: I) -> Self {
        let mut state = Self::new();
        for bundle in iter {
            state.insert(bundle);
        }
        state
    }
}
