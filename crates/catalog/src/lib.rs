//! Operator catalog model
//!
//! In-memory graph of what a catalog offers:
//!
//! - **Package**: named operator with a default channel
//! - **Channel**: ordered upgrade stream of bundles with exactly one head
//! - **Bundle**: one installable version, linked to older bundles through
//!   `replaces`, `skips` and `skipRange` edges
//! - **Property**: typed facts about a bundle (its package and version, the
//!   APIs it provides or requires, ...)
//!
//! A [`Model`] is an immutable snapshot: it is built from a declarative
//! config stream ([`declcfg`]), validated once and replaced wholesale on
//! refresh.

pub mod declcfg;
pub mod error;
pub mod model;
pub mod property;
pub mod version;

pub use declcfg::DeclarativeConfig;
pub use error::CatalogError;
pub use model::{Bundle, Channel, Icon, Model, Package, RelatedImage};
pub use property::{
    BundleObject, ChannelProperty, Gvk, PackageProperty, PackageRequired, Property,
};
pub use version::VersionRange;
