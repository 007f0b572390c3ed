//! `olm.managed` labelling of CSV-owned objects

use super::owning_csv;
use crate::cluster::{ClusterClient, MetadataPatch, MetadataTarget};
use anyhow::Context;
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use queueinformer::filter::predicates::lacks_label;
use queueinformer::{FilteredHandler, SyncHandler};
use std::sync::Arc;
use tracing::{debug, info};

pub const MANAGED_LABEL: &str = "olm.managed";
pub const MANAGED_VALUE: &str = "true";
pub const FIELD_MANAGER: &str = "olm-operator-labeller";

/// Applies `olm.managed=true` to the object it is handed.
pub struct ManagedLabeller {
    client: Arc<dyn ClusterClient>,
}

impl ManagedLabeller {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K> SyncHandler<K> for ManagedLabeller
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
{
    async fn sync(&self, obj: Arc<K>) -> anyhow::Result<()> {
        let Some(target) = MetadataTarget::of(obj.as_ref()) else {
            debug!("Skipping unnamed {}", K::kind(&()));
            return Ok(());
        };
        let patch = MetadataPatch::default().label(MANAGED_LABEL, MANAGED_VALUE);
        self.client
            .apply_metadata(FIELD_MANAGER, &target, &patch)
            .await
            .with_context(|| format!("labelling {} {}", target.kind, obj.name_any()))?;
        info!(
            "Labelled {} {}/{} as managed",
            target.kind,
            target.namespace.as_deref().unwrap_or_default(),
            target.name
        );
        Ok(())
    }
}

/// Labeller for CSV-owned objects of kind `K` still missing the label.
pub fn managed_labeller<K>(client: Arc<dyn ClusterClient>) -> FilteredHandler<K>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
{
    let unlabelled = lacks_label(MANAGED_LABEL, MANAGED_VALUE);
    FilteredHandler::new("managed-labeller", ManagedLabeller::new(client))
        .and(|obj: &K| owning_csv(obj.meta()).is_some())
        .and(move |obj: &K| unlabelled(obj.meta()))
}
