//! Declarative config loader
//!
//! A catalog on disk is a stream of JSON blobs, each tagged by `schema`:
//!
//! ```json
//! {"schema": "olm.package", "name": "etcd", "defaultChannel": "alpha"}
//! {"schema": "olm.channel", "package": "etcd", "name": "alpha",
//!  "entries": [{"name": "etcd.v2", "replaces": "etcd.v1"}, {"name": "etcd.v1"}]}
//! {"schema": "olm.bundle", "package": "etcd", "name": "etcd.v1", "image": "...",
//!  "properties": [{"type": "olm.package", "value": {"packageName": "etcd", "version": "1.0.0"}}]}
//! ```
//!
//! Blobs with other schemas are kept but play no part in the model.

use crate::error::CatalogError;
use crate::model::{Bundle, Channel, Icon, Model, Package, RelatedImage};
use crate::property::Property;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// `olm.package` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativePackage {
    /// Package name
    pub name: String,
    /// Default channel
    #[serde(default)]
    pub default_channel: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Icon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
}

/// Entry of an `olm.channel` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    /// Bundle name
    pub name: String,
    /// Bundle replaced by this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
    /// Bundles skipped by this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<String>,
    /// Versions this bundle upgrades from directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<String>,
}

/// `olm.channel` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeChannel {
    /// Owning package
    pub package: String,
    /// Channel name
    pub name: String,
    /// Bundles in the channel with their upgrade edges
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
}

/// `olm.bundle` blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeBundle {
    /// Owning package
    pub package: String,
    /// Bundle name
    pub name: String,
    /// Bundle image
    #[serde(default)]
    pub image: String,
    /// Properties
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Related images
    #[serde(default)]
    pub related_images: Vec<RelatedImage>,
}

#[derive(Deserialize)]
#[serde(tag = "schema")]
enum Blob {
    #[serde(rename = "olm.package")]
    Package(DeclarativePackage),
    #[serde(rename = "olm.channel")]
    Channel(DeclarativeChannel),
    #[serde(rename = "olm.bundle")]
    Bundle(DeclarativeBundle),
}

const KNOWN_SCHEMAS: [&str; 3] = ["olm.package", "olm.channel", "olm.bundle"];

/// Parsed declarative config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarativeConfig {
    /// Package blobs
    pub packages: Vec<DeclarativePackage>,
    /// Channel blobs
    pub channels: Vec<DeclarativeChannel>,
    /// Bundle blobs
    pub bundles: Vec<DeclarativeBundle>,
    /// Blobs of other schemas
    pub others: Vec<serde_json::Value>,
}

impl DeclarativeConfig {
    /// Parses a stream of JSON blobs.
    pub fn from_json_str(input: &str) -> Result<Self, CatalogError> {
        let mut config = Self::default();
        config.extend_from_str(input, "<string>")?;
        Ok(config)
    }

    fn extend_from_str(&mut self, input: &str, origin: &str) -> Result<(), CatalogError> {
        let decode_err = |source| CatalogError::Decode {
            origin: origin.to_string(),
            source,
        };
        for value in serde_json::Deserializer::from_str(input).into_iter::<serde_json::Value>() {
            let value = value.map_err(decode_err)?;
            let schema = value.get("schema").and_then(serde_json::Value::as_str);
            if !schema.is_some_and(|s| KNOWN_SCHEMAS.contains(&s)) {
                self.others.push(value);
                continue;
            }
            match serde_json::from_value::<Blob>(value).map_err(decode_err)? {
                Blob::Package(p) => self.packages.push(p),
                Blob::Channel(c) => self.channels.push(c),
                Blob::Bundle(b) => self.bundles.push(b),
            }
        }
        Ok(())
    }

    /// Loads one JSON file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let mut config = Self::default();
        config.extend_from_file(path.as_ref())?;
        Ok(config)
    }

    fn extend_from_file(&mut self, path: &Path) -> Result<(), CatalogError> {
        let input = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loading declarative config from {}", path.display());
        self.extend_from_str(&input, &path.display().to_string())
    }

    /// Loads every `*.json` file below `dir`, in path order.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let mut files = Vec::new();
        collect_json_files(dir.as_ref(), &mut files)?;
        files.sort();

        let mut config = Self::default();
        for file in &files {
            config.extend_from_file(file)?;
        }
        info!(
            "Loaded {} package(s), {} channel(s), {} bundle(s) from {} file(s) under {}",
            config.packages.len(),
            config.channels.len(),
            config.bundles.len(),
            files.len(),
            dir.as_ref().display()
        );
        Ok(config)
    }

    /// Loads a file or a directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::load_dir(path)
        } else {
            Self::load_file(path)
        }
    }

    /// Builds the model. Channel entries supply the upgrade edges; every
    /// entry must name an existing bundle of the same package.
    ///
    /// The result is not validated; call [`Model::validate`].
    pub fn to_model(&self) -> Result<Model, CatalogError> {
        let mut packages: BTreeMap<&str, Package> = BTreeMap::new();
        for p in &self.packages {
            if p.name.is_empty() {
                return Err(CatalogError::EmptyPackageName);
            }
            let mut package = Package::new(p.name.clone(), p.default_channel.clone());
            package.description.clone_from(&p.description);
            package.icon.clone_from(&p.icon);
            if packages.insert(&p.name, package).is_some() {
                return Err(CatalogError::DuplicatePackage(p.name.clone()));
            }
        }

        let mut bundles: BTreeMap<(&str, &str), &DeclarativeBundle> = BTreeMap::new();
        for b in &self.bundles {
            if !packages.contains_key(b.package.as_str()) {
                return Err(CatalogError::UnknownPackage {
                    what: "bundle",
                    name: b.name.clone(),
                    package: b.package.clone(),
                });
            }
            bundles.insert((b.package.as_str(), b.name.as_str()), b);
        }

        for c in &self.channels {
            let Some(package) = packages.get_mut(c.package.as_str()) else {
                return Err(CatalogError::UnknownPackage {
                    what: "channel",
                    name: c.name.clone(),
                    package: c.package.clone(),
                });
            };
            let mut channel = Channel::new(c.package.clone(), c.name.clone());
            for entry in &c.entries {
                let Some(decl) = bundles.get(&(c.package.as_str(), entry.name.as_str())) else {
                    return Err(CatalogError::UnknownBundle {
                        package: c.package.clone(),
                        channel: c.name.clone(),
                        bundle: entry.name.clone(),
                    });
                };
                channel = channel.with_bundle(Bundle {
                    name: decl.name.clone(),
                    package: decl.package.clone(),
                    channel: c.name.clone(),
                    image: decl.image.clone(),
                    replaces: entry.replaces.clone(),
                    skips: entry.skips.clone(),
                    skip_range: entry.skip_range.clone(),
                    properties: decl.properties.clone(),
                    related_images: decl.related_images.clone(),
                });
            }
            package.channels.insert(channel.name.clone(), channel);
        }

        let mut model = Model::new();
        for package in packages.into_values() {
            model.insert_package(package);
        }
        Ok(model)
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: dir.display().to_string(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}
