//! Resolution errors

use catalog::{CatalogError, Gvk};
use thiserror::Error;

/// Coarse classification of a resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The catalog is structurally broken
    MalformedCatalog,
    /// Some demand cannot be met by anything in scope
    Unsatisfiable,
    /// Demands can be met individually but not together
    Conflict,
}

/// Why no generation could be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// Structural validation of the catalog failed
    #[error("malformed catalog: {0}")]
    MalformedCatalog(String),

    /// A subscription names a package the catalog does not have
    #[error("subscription {subscription}: package {package} not found in catalog")]
    UnknownPackage {
        /// `namespace/name` of the subscription
        subscription: String,
        /// Package
        package: String,
    },

    /// A subscription names a channel the package does not have
    #[error("subscription {subscription}: channel {channel} not found in package {package}")]
    UnknownChannel {
        /// `namespace/name` of the subscription
        subscription: String,
        /// Package
        package: String,
        /// Channel
        channel: String,
    },

    /// A subscription's starting CSV is not in its channel
    #[error("subscription {subscription}: bundle {bundle} not found in channel {channel}")]
    UnknownBundle {
        /// `namespace/name` of the subscription
        subscription: String,
        /// Channel
        channel: String,
        /// Bundle
        bundle: String,
    },

    /// The installed bundle has no forward path to the channel head
    #[error("package {package}: no upgrade path from installed {installed} to {head} in channel {channel}")]
    NoUpgradePath {
        /// Package
        package: String,
        /// Channel
        channel: String,
        /// Installed bundle
        installed: String,
        /// Channel head
        head: String,
    },

    /// Nothing in scope satisfies a requirement
    #[error("{required_by} requires {requirement}, which no bundle in scope satisfies")]
    Unsatisfiable {
        /// Bundle or subscription with the requirement
        required_by: String,
        /// Human-readable requirement
        requirement: String,
    },

    /// Two packages provide the same API
    #[error("{first} and {second} both provide {gvk}")]
    GvkConflict {
        /// Contended API
        gvk: Gvk,
        /// Bundle that provided it first
        first: String,
        /// Bundle that tried to provide it as well
        second: String,
    },

    /// Equally preferred candidates from different packages
    #[error("{required_by} requires {requirement}; candidates {} are equally preferred", candidates.join(", "))]
    AmbiguousProvider {
        /// Bundle with the requirement
        required_by: String,
        /// Human-readable requirement
        requirement: String,
        /// Tied candidate bundles, in name order
        candidates: Vec<String>,
    },

    /// Two subscriptions in scope target the same package
    #[error("subscriptions {first} and {second} both target package {package}")]
    SubscriptionConflict {
        /// Package
        package: String,
        /// First subscription, in name order
        first: String,
        /// Second subscription
        second: String,
    },

    /// The search visited too many states
    #[error("resolution gave up after exploring {limit} states")]
    SearchLimitExceeded {
        /// Configured limit
        limit: usize,
    },
}

impl From<CatalogError> for ResolutionError {
    fn from(err: CatalogError) -> Self {
        Self::MalformedCatalog(err.to_string())
    }
}

impl ResolutionError {
    /// Coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedCatalog(_) => ErrorKind::MalformedCatalog,
            Self::UnknownPackage { .. }
            | Self::UnknownChannel { .. }
            | Self::UnknownBundle { .. }
            | Self::NoUpgradePath { .. }
            | Self::Unsatisfiable { .. }
            | Self::SearchLimitExceeded { .. } => ErrorKind::Unsatisfiable,
            Self::GvkConflict { .. } | Self::AmbiguousProvider { .. } | Self::SubscriptionConflict { .. } => {
                ErrorKind::Conflict
            }
        }
    }

    /// Machine-readable reason for status conditions.
    pub fn reason(&self) -> &'static str {
        match self.kind() {
            ErrorKind::MalformedCatalog => "CatalogInvalid",
            ErrorKind::Unsatisfiable => "ConstraintsNotSatisfiable",
            ErrorKind::Conflict => "ConflictingConstraints",
        }
    }
}
