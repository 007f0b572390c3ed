//! Catalog errors

use thiserror::Error;

/// Errors raised while loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A package has no name
    #[error("package name must not be empty")]
    EmptyPackageName,

    /// Two package blobs declare the same package
    #[error("package {0} is declared more than once")]
    DuplicatePackage(String),

    /// A channel or bundle refers to a package that was never declared
    #[error("{what} {name} refers to unknown package {package}")]
    UnknownPackage {
        /// `channel` or `bundle`
        what: &'static str,
        /// Name of the referring object
        name: String,
        /// Missing package
        package: String,
    },

    /// The default channel of a package does not exist
    #[error("package {package}: default channel {channel} not found")]
    DefaultChannelMissing {
        /// Package name
        package: String,
        /// Declared default channel
        channel: String,
    },

    /// A channel has no bundles
    #[error("package {package}: channel {channel} has no bundles")]
    EmptyChannel {
        /// Package name
        package: String,
        /// Channel name
        channel: String,
    },

    /// Every bundle in the channel is replaced or skipped by another one
    #[error("package {package}: channel {channel} has no head")]
    NoHead {
        /// Package name
        package: String,
        /// Channel name
        channel: String,
    },

    /// More than one bundle in the channel is not replaced or skipped
    #[error("package {package}: channel {channel} has multiple heads: {}", heads.join(", "))]
    MultipleHeads {
        /// Package name
        package: String,
        /// Channel name
        channel: String,
        /// Candidate heads, sorted
        heads: Vec<String>,
    },

    /// Following `replaces` from the head revisits a bundle
    #[error("package {package}: channel {channel} has a replaces cycle through {bundle}")]
    ReplacesCycle {
        /// Package name
        package: String,
        /// Channel name
        channel: String,
        /// First bundle seen twice
        bundle: String,
    },

    /// A channel entry names a bundle that does not exist
    #[error("package {package}: channel {channel} lists unknown bundle {bundle}")]
    UnknownBundle {
        /// Package name
        package: String,
        /// Channel name
        channel: String,
        /// Bundle name
        bundle: String,
    },

    /// Bundle back-references do not match their position in the model
    #[error("bundle {bundle} is stored under {expected} but claims {found}")]
    MisplacedBundle {
        /// Bundle name
        bundle: String,
        /// Where the bundle is stored
        expected: String,
        /// What the bundle claims
        found: String,
    },

    /// A bundle lacks its `olm.package` property
    #[error("bundle {0} has no olm.package property")]
    MissingPackageProperty(String),

    /// A bundle carries more than one `olm.package` property
    #[error("bundle {0} has more than one olm.package property")]
    MultiplePackageProperties(String),

    /// The `olm.package` property names another package
    #[error("bundle {bundle}: olm.package property names {found}, expected {expected}")]
    PackagePropertyMismatch {
        /// Bundle name
        bundle: String,
        /// Package the bundle belongs to
        expected: String,
        /// Package named by the property
        found: String,
    },

    /// The same bundle name is used by two packages
    #[error("bundle {bundle} is provided by both {first} and {second}")]
    DuplicateBundle {
        /// Bundle name
        bundle: String,
        /// First package, in name order
        first: String,
        /// Second package
        second: String,
    },

    /// A bundle version is not valid semver
    #[error("bundle {bundle}: invalid version {version:?}: {source}")]
    InvalidVersion {
        /// Bundle name
        bundle: String,
        /// Offending version string
        version: String,
        /// Parse error
        #[source]
        source: semver::Error,
    },

    /// A version range could not be parsed
    #[error("invalid version range {range:?}: {reason}")]
    InvalidRange {
        /// Offending range
        range: String,
        /// What is wrong with it
        reason: String,
    },

    /// A known property type carries a value of the wrong shape
    #[error("invalid {kind} property: {source}")]
    InvalidProperty {
        /// Property type
        kind: String,
        /// Decode error
        #[source]
        source: serde_json::Error,
    },

    /// A declarative config blob could not be decoded
    #[error("invalid declarative config in {origin}: {source}")]
    Decode {
        /// File name or `<string>`
        origin: String,
        /// Decode error
        #[source]
        source: serde_json::Error,
    },

    /// Reading a declarative config file failed
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that could not be read
        path: String,
        /// I/O error
        #[source]
        source: std::io::Error,
    },
}
