//! Catalog model
//!
//! Packages own channels, channels own bundles. A bundle that appears in
//! several channels is stored once per channel, since its upgrade edges
//! (`replaces`, `skips`, `skipRange`) are channel-specific.

use crate::error::CatalogError;
use crate::property::{Gvk, PackageProperty, PackageRequired, Property};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Package icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Icon {
    /// Base64 image data
    pub base64data: String,
    /// MIME type
    pub mediatype: String,
}

/// Image a bundle references besides its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    /// Optional image name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Image reference
    pub image: String,
}

/// One installable version of a package.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    /// Bundle name, e.g. `etcdoperator.v0.9.4`
    pub name: String,
    /// Owning package
    pub package: String,
    /// Owning channel
    pub channel: String,
    /// Bundle image
    pub image: String,
    /// Bundle this one replaces
    pub replaces: Option<String>,
    /// Bundles this one skips
    pub skips: Vec<String>,
    /// Versions this bundle upgrades from directly
    pub skip_range: Option<String>,
    /// Ordered properties
    pub properties: Vec<Property>,
    /// Related images
    pub related_images: Vec<RelatedImage>,
}

impl Bundle {
    /// Creates a bundle of `package` in `channel` at `version`.
    pub fn new(
        name: impl Into<String>,
        package: impl Into<String>,
        channel: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let package = package.into();
        Self {
            name: name.into(),
            properties: vec![Property::package(package.clone(), version)],
            package,
            channel: channel.into(),
            image: String::new(),
            replaces: None,
            skips: Vec::new(),
            skip_range: None,
            related_images: Vec::new(),
        }
    }

    /// Sets the bundle this one replaces.
    #[must_use]
    pub fn with_replaces(mut self, replaces: impl Into<String>) -> Self {
        self.replaces = Some(replaces.into());
        self
    }

    /// Adds a skipped bundle.
    #[must_use]
    pub fn with_skip(mut self, skip: impl Into<String>) -> Self {
        self.skips.push(skip.into());
        self
    }

    /// Sets the skip range.
    #[must_use]
    pub fn with_skip_range(mut self, range: impl Into<String>) -> Self {
        self.skip_range = Some(range.into());
        self
    }

    /// Appends a property.
    #[must_use]
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Sets the image.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// The `olm.package` property, if there is exactly one.
    pub fn package_property(&self) -> Result<&PackageProperty, CatalogError> {
        let mut found = self.properties.iter().filter_map(|p| match p {
            Property::Package(pkg) => Some(pkg),
            _ => None,
        });
        let first = found
            .next()
            .ok_or_else(|| CatalogError::MissingPackageProperty(self.name.clone()))?;
        if found.next().is_some() {
            return Err(CatalogError::MultiplePackageProperties(self.name.clone()));
        }
        Ok(first)
    }

    /// Bundle version from its `olm.package` property.
    pub fn version(&self) -> Result<Version, CatalogError> {
        let pkg = self.package_property()?;
        Version::parse(&pkg.version).map_err(|source| CatalogError::InvalidVersion {
            bundle: self.name.clone(),
            version: pkg.version.clone(),
            source,
        })
    }

    /// APIs this bundle provides.
    pub fn provided_gvks(&self) -> impl Iterator<Item = &Gvk> {
        self.properties.iter().filter_map(|p| match p {
            Property::Gvk(gvk) => Some(gvk),
            _ => None,
        })
    }

    /// APIs this bundle needs another bundle to provide.
    pub fn required_gvks(&self) -> impl Iterator<Item = &Gvk> {
        self.properties.iter().filter_map(|p| match p {
            Property::GvkRequired(gvk) => Some(gvk),
            _ => None,
        })
    }

    /// Packages (with version ranges) this bundle depends on.
    pub fn required_packages(&self) -> impl Iterator<Item = &PackageRequired> {
        self.properties.iter().filter_map(|p| match p {
            Property::PackageRequired(req) => Some(req),
            _ => None,
        })
    }

    /// Skip range, from the channel entry or else an `olm.skipRange` property.
    pub fn skip_range(&self) -> Option<&str> {
        self.skip_range.as_deref().or_else(|| {
            self.properties.iter().find_map(|p| match p {
                Property::SkipRange(range) => Some(range.as_str()),
                _ => None,
            })
        })
    }

    /// Skipped bundle names from the channel entry and `olm.skips` properties.
    pub fn all_skips(&self) -> BTreeSet<&str> {
        self.skips
            .iter()
            .map(String::as_str)
            .chain(self.properties.iter().filter_map(|p| match p {
                Property::Skips(name) => Some(name.as_str()),
                _ => None,
            }))
            .collect()
    }

    fn validate(&self, package: &str, channel: &str) -> Result<(), CatalogError> {
        if self.package != package || self.channel != channel {
            return Err(CatalogError::MisplacedBundle {
                bundle: self.name.clone(),
                expected: format!("{package}/{channel}"),
                found: format!("{}/{}", self.package, self.channel),
            });
        }
        let pkg = self.package_property()?;
        if pkg.package_name != package {
            return Err(CatalogError::PackagePropertyMismatch {
                bundle: self.name.clone(),
                expected: package.to_string(),
                found: pkg.package_name.clone(),
            });
        }
        self.version()?;
        for req in self.required_packages() {
            crate::version::VersionRange::parse(&req.version_range)?;
        }
        Ok(())
    }
}

/// Upgrade stream of bundles within a package.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Channel name
    pub name: String,
    /// Owning package
    pub package: String,
    /// Bundles by name
    pub bundles: BTreeMap<String, Bundle>,
}

impl Channel {
    /// Creates an empty channel.
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            bundles: BTreeMap::new(),
        }
    }

    /// Adds a bundle, stamping it with this channel's package and name.
    #[must_use]
    pub fn with_bundle(mut self, mut bundle: Bundle) -> Self {
        bundle.package.clone_from(&self.package);
        bundle.channel.clone_from(&self.name);
        self.bundles.insert(bundle.name.clone(), bundle);
        self
    }

    /// Looks up a bundle by name.
    pub fn bundle(&self, name: &str) -> Option<&Bundle> {
        self.bundles.get(name)
    }

    /// The single bundle nothing else in the channel replaces or skips.
    pub fn head(&self) -> Result<&Bundle, CatalogError> {
        let incoming: HashSet<&str> = self
            .bundles
            .values()
            .flat_map(|b| b.replaces.as_deref().into_iter().chain(b.all_skips()))
            .collect();
        let mut heads = self
            .bundles
            .values()
            .filter(|b| !incoming.contains(b.name.as_str()));

        let Some(head) = heads.next() else {
            return Err(if self.bundles.is_empty() {
                CatalogError::EmptyChannel {
                    package: self.package.clone(),
                    channel: self.name.clone(),
                }
            } else {
                CatalogError::NoHead {
                    package: self.package.clone(),
                    channel: self.name.clone(),
                }
            });
        };
        let rest: Vec<String> = heads.map(|b| b.name.clone()).collect();
        if !rest.is_empty() {
            let mut all = vec![head.name.clone()];
            all.extend(rest);
            return Err(CatalogError::MultipleHeads {
                package: self.package.clone(),
                channel: self.name.clone(),
                heads: all,
            });
        }
        Ok(head)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let head = self.head()?;

        let mut seen = HashSet::new();
        let mut current = Some(head);
        while let Some(bundle) = current {
            if !seen.insert(bundle.name.as_str()) {
                return Err(CatalogError::ReplacesCycle {
                    package: self.package.clone(),
                    channel: self.name.clone(),
                    bundle: bundle.name.clone(),
                });
            }
            current = bundle.replaces.as_deref().and_then(|r| self.bundles.get(r));
        }

        for bundle in self.bundles.values() {
            bundle.validate(&self.package, &self.name)?;
        }
        Ok(())
    }
}

/// A named operator and its channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    /// Package name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Icon
    pub icon: Option<Icon>,
    /// Name of the channel used when a subscription names none
    pub default_channel: String,
    /// Channels by name
    pub channels: BTreeMap<String, Channel>,
}

impl Package {
    /// Creates a package without channels.
    pub fn new(name: impl Into<String>, default_channel: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            icon: None,
            default_channel: default_channel.into(),
            channels: BTreeMap::new(),
        }
    }

    /// Adds a channel, stamping it and its bundles with this package's name.
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        let mut stamped = Channel::new(self.name.clone(), channel.name);
        for bundle in channel.bundles.into_values() {
            stamped = stamped.with_bundle(bundle);
        }
        self.channels.insert(stamped.name.clone(), stamped);
        self
    }

    /// Looks up a channel by name.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// The default channel, if it exists.
    pub fn default_channel(&self) -> Option<&Channel> {
        self.channels.get(&self.default_channel)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.name.is_empty() {
            return Err(CatalogError::EmptyPackageName);
        }
        if self.default_channel().is_none() {
            return Err(CatalogError::DefaultChannelMissing {
                package: self.name.clone(),
                channel: self.default_channel.clone(),
            });
        }
        for channel in self.channels.values() {
            if channel.package != self.name {
                return Err(CatalogError::UnknownPackage {
                    what: "channel",
                    name: channel.name.clone(),
                    package: channel.package.clone(),
                });
            }
            channel.validate()?;
        }
        Ok(())
    }
}

/// Immutable catalog snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    packages: BTreeMap<String, Package>,
}

impl Model {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a package.
    #[must_use]
    pub fn with_package(mut self, package: Package) -> Self {
        self.insert_package(package);
        self
    }

    /// Adds or replaces a package.
    pub fn insert_package(&mut self, package: Package) {
        self.packages.insert(package.name.clone(), package);
    }

    /// Looks up a package by name.
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Packages in name order.
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    /// Every bundle entry in package, channel, bundle name order.
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.packages
            .values()
            .flat_map(|p| p.channels.values())
            .flat_map(|c| c.bundles.values())
    }

    /// First bundle entry named `name`, in package and channel order.
    pub fn lookup_bundle(&self, name: &str) -> Option<&Bundle> {
        self.packages
            .values()
            .flat_map(|p| p.channels.values())
            .find_map(|c| c.bundles.get(name))
    }

    /// Checks the structural rules every snapshot must satisfy.
    ///
    /// Reports the first violation in package/channel/bundle name order.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for package in self.packages.values() {
            package.validate()?;
            for bundle in package.channels.values().flat_map(|c| c.bundles.values()) {
                match owners.get(bundle.name.as_str()) {
                    Some(owner) if *owner != package.name => {
                        return Err(CatalogError::DuplicateBundle {
                            bundle: bundle.name.clone(),
                            first: (*owner).to_string(),
                            second: package.name.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        owners.insert(&bundle.name, &package.name);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn etcd() -> Package {
        Package::new("etcd", "alpha").with_channel(
            Channel::new("etcd", "alpha")
                .with_bundle(Bundle::new("etcd.v1", "etcd", "alpha", "1.0.0"))
                .with_bundle(Bundle::new("etcd.v2", "etcd", "alpha", "2.0.0").with_replaces("etcd.v1"))
                .with_bundle(Bundle::new("etcd.v3", "etcd", "alpha", "3.0.0").with_replaces("etcd.v2")),
        )
    }

    #[test]
    fn test_head_is_unreplaced_bundle() {
        let pkg = etcd();
        assert_eq!(pkg.default_channel().unwrap().head().unwrap().name, "etcd.v3");
        assert!(Model::new().with_package(pkg).validate().is_ok());
    }

    #[test]
    fn test_multiple_heads_are_rejected() {
        let channel = Channel::new("p", "c")
            .with_bundle(Bundle::new("a", "p", "c", "1.0.0"))
            .with_bundle(Bundle::new("b", "p", "c", "2.0.0"));
        let err = channel.head().unwrap_err();
        assert!(matches!(err, CatalogError::MultipleHeads { heads, .. } if heads == ["a", "b"]));
    }

    #[test]
    fn test_skipped_bundle_is_not_a_head() {
        let channel = Channel::new("p", "c")
            .with_bundle(Bundle::new("a", "p", "c", "1.0.0"))
            .with_bundle(Bundle::new("c", "p", "c", "3.0.0").with_skip("a"));
        assert_eq!(channel.head().unwrap().name, "c");
    }

    #[test]
    fn test_no_head_in_cycle() {
        let channel = Channel::new("p", "c")
            .with_bundle(Bundle::new("a", "p", "c", "1.0.0").with_replaces("b"))
            .with_bundle(Bundle::new("b", "p", "c", "2.0.0").with_replaces("a"));
        assert!(matches!(channel.head(), Err(CatalogError::NoHead { .. })));
    }

    #[test]
    fn test_missing_default_channel() {
        let model = Model::new().with_package(Package::new("p", "stable").with_channel(
            Channel::new("p", "alpha").with_bundle(Bundle::new("a", "p", "alpha", "1.0.0")),
        ));
        assert!(matches!(
            model.validate(),
            Err(CatalogError::DefaultChannelMissing { channel, .. }) if channel == "stable"
        ));
    }

    #[test]
    fn test_empty_channel() {
        let model = Model::new().with_package(Package::new("p", "alpha").with_channel(Channel::new("p", "alpha")));
        assert!(matches!(model.validate(), Err(CatalogError::EmptyChannel { .. })));
    }

    #[test]
    fn test_package_property_rules() {
        let mut bundle = Bundle::new("a", "p", "c", "1.0.0");
        bundle.properties.clear();
        let model = Model::new()
            .with_package(Package::new("p", "c").with_channel(Channel::new("p", "c").with_bundle(bundle.clone())));
        assert!(matches!(model.validate(), Err(CatalogError::MissingPackageProperty(_))));

        let bundle = bundle.with_property(Property::package("other", "1.0.0"));
        let model = Model::new()
            .with_package(Package::new("p", "c").with_channel(Channel::new("p", "c").with_bundle(bundle.clone())));
        assert!(matches!(model.validate(), Err(CatalogError::PackagePropertyMismatch { .. })));

        let bundle = bundle.with_property(Property::package("p", "1.0.0"));
        assert!(matches!(bundle.package_property(), Err(CatalogError::MultiplePackageProperties(_))));
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let model = Model::new().with_package(
            Package::new("p", "c").with_channel(Channel::new("p", "c").with_bundle(Bundle::new("a", "p", "c", "one"))),
        );
        assert!(matches!(model.validate(), Err(CatalogError::InvalidVersion { .. })));
    }

    #[test]
    fn test_bundle_name_shared_by_two_packages() {
        let model = Model::new()
            .with_package(
                Package::new("p", "c").with_channel(Channel::new("p", "c").with_bundle(Bundle::new("dup", "p", "c", "1.0.0"))),
            )
            .with_package(
                Package::new("q", "c").with_channel(Channel::new("q", "c").with_bundle(Bundle::new("dup", "q", "c", "1.0.0"))),
            );
        assert!(matches!(
            model.validate(),
            Err(CatalogError::DuplicateBundle { first, second, .. }) if first == "p" && second == "q"
        ));
    }

    #[test]
    fn test_same_bundle_in_two_channels_is_fine() {
        let model = Model::new().with_package(
            Package::new("p", "stable")
                .with_channel(Channel::new("p", "stable").with_bundle(Bundle::new("a", "p", "stable", "1.0.0")))
                .with_channel(Channel::new("p", "fast").with_bundle(Bundle::new("a", "p", "fast", "1.0.0"))),
        );
        assert!(model.validate().is_ok());
        assert_eq!(model.lookup_bundle("a").unwrap().channel, "fast");
        assert_eq!(model.bundles().count(), 2);
    }

    #[test]
    fn test_property_accessors() {
        let bundle = Bundle::new("a", "p", "c", "1.2.3")
            .with_property(Property::Gvk(Gvk::new("g", "v1", "K")))
            .with_property(Property::GvkRequired(Gvk::new("h", "v1", "L")))
            .with_property(Property::package_required("q", ">=1.0.0"))
            .with_property(Property::SkipRange("<1.2.3".to_string()))
            .with_property(Property::Skips("old".to_string()));

        assert_eq!(bundle.version().unwrap(), Version::new(1, 2, 3));
        assert_eq!(bundle.provided_gvks().count(), 1);
        assert_eq!(bundle.required_gvks().next().unwrap().kind, "L");
        assert_eq!(bundle.required_packages().next().unwrap().package_name, "q");
        assert_eq!(bundle.skip_range(), Some("<1.2.3"));
        assert!(bundle.all_skips().contains("old"));
    }
}
