//! Sync handlers of the OLM operator.
//!
//! - `subscription`: resolves the subscriptions of a namespace and records
//!   the outcome in their status
//! - `csv`: requeues the subscriptions of a namespace when its CSVs change
//! - `labeller`: marks CSV-owned objects with `olm.managed=true`
//! - `content_hash`: labels CSV-owned ConfigMaps with a hash of their data
//! - `alongside`: records which CSV an object was installed alongside

pub mod alongside;
pub mod content_hash;
pub mod csv;
pub mod labeller;
pub mod subscription;

pub use alongside::AlongsideAnnotator;
pub use content_hash::ContentHashLabeller;
pub use csv::RequeueSubscriptions;
pub use labeller::managed_labeller;
pub use subscription::SubscriptionSyncer;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Kind of the objects that own operator workloads.
pub const CSV_KIND: &str = "ClusterServiceVersion";

/// Owning CSV reference of an object, the controller owner first.
pub(crate) fn owning_csv(meta: &ObjectMeta) -> Option<&OwnerReference> {
    let mut owners = meta.owner_references.iter().flatten().filter(|o| o.kind == CSV_KIND);
    let first = owners.clone().next();
    owners.find(|o| o.controller == Some(true)).or(first)
}
