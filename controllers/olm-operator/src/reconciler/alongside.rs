//! Installed-alongside annotations for CSV-owned objects

use super::{owning_csv, CSV_KIND};
use crate::alongside::{from_annotations, to_annotations};
use crate::cluster::{ClusterClient, MetadataPatch, MetadataTarget};
use anyhow::Context;
use async_trait::async_trait;
use crds::{ClusterServiceVersion, NamespacedName};
use kube::{Resource, ResourceExt};
use queueinformer::{Indexer, ObjectKey, SyncHandler};
use std::sync::Arc;
use tracing::{debug, info};

pub const FIELD_MANAGER: &str = "olm-operator-alongside";

/// Records on each CSV-owned object the CSV it was installed alongside.
///
/// Ownership is followed at most two hops: from the object to its owning
/// CSV, and from a copied CSV to the original in the namespace named by its
/// `olm.copiedFrom` label.
pub struct AlongsideAnnotator {
    client: Arc<dyn ClusterClient>,
    csvs: Arc<dyn Indexer<ClusterServiceVersion>>,
}

impl AlongsideAnnotator {
    pub fn new(client: Arc<dyn ClusterClient>, csvs: Arc<dyn Indexer<ClusterServiceVersion>>) -> Self {
        Self { client, csvs }
    }

    fn cached_csv(&self, namespace: &str, name: &str) -> Option<Arc<ClusterServiceVersion>> {
        self.csvs
            .get(&ObjectKey::new(CSV_KIND, Some(namespace.to_string()), name))
    }

    /// The CSV `obj` belongs to; `None` while the original of a copy is not cached.
    pub fn authoritative_csv<K>(&self, obj: &K) -> Option<NamespacedName>
    where
        K: Resource<DynamicType = ()>,
    {
        let owner = owning_csv(obj.meta())?;
        let namespace = obj.namespace()?;
        let Some(csv) = self.cached_csv(&namespace, &owner.name) else {
            return Some(NamespacedName::new(namespace, owner.name.clone()));
        };
        match csv.copied_from() {
            None => Some(NamespacedName::new(namespace, owner.name.clone())),
            Some(origin) if self.cached_csv(origin, &owner.name).is_some() => {
                Some(NamespacedName::new(origin, owner.name.clone()))
            }
            Some(origin) => {
                debug!("Original CSV {}/{} is not cached yet", origin, owner.name);
                None
            }
        }
    }
}

#[async_trait]
impl<K> SyncHandler<K> for AlongsideAnnotator
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
{
    async fn sync(&self, obj: Arc<K>) -> anyhow::Result<()> {
        let Some(csv) = self.authoritative_csv(obj.as_ref()) else {
            return Ok(());
        };
        if from_annotations(obj.annotations()) == [csv.clone()] {
            return Ok(());
        }
        let Some(target) = MetadataTarget::of(obj.as_ref()) else {
            return Ok(());
        };
        let patch = MetadataPatch::default().annotations(to_annotations([&csv]));
        self.client
            .apply_metadata(FIELD_MANAGER, &target, &patch)
            .await
            .with_context(|| format!("annotating {} {} as installed alongside {}", target.kind, target.name, csv))?;
        info!("Annotated {} {} as installed alongside {}", target.kind, target.name, csv);
        Ok(())
    }
}
