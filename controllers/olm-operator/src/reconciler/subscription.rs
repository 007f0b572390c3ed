//! Subscription resolution
//!
//! Every sync resolves all subscriptions of the object's namespace together
//! against the installed CSVs, then writes the status of the synced
//! subscription. Resolution failures are recorded as a degraded status and
//! are not retried; failing to write the status is.

use crate::catalog_source::CatalogSnapshot;
use crate::cluster::ClusterClient;
use crate::metrics::Metrics;
use crate::reconcile_helpers::{failed_status, installed_state, resolved_status, status_changed, subscription_request};
use anyhow::Context;
use async_trait::async_trait;
use crds::{ClusterServiceVersion, Subscription};
use kube::ResourceExt;
use queueinformer::{Indexer, SyncHandler};
use resolver::{Resolver, DEFAULT_SEARCH_LIMIT};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SubscriptionSyncer {
    catalog: Arc<CatalogSnapshot>,
    subscriptions: Arc<dyn Indexer<Subscription>>,
    csvs: Arc<dyn Indexer<ClusterServiceVersion>>,
    client: Arc<dyn ClusterClient>,
    metrics: Arc<Metrics>,
    search_limit: usize,
}

impl std::fmt::Debug for SubscriptionSyncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionSyncer")
            .field("search_limit", &self.search_limit)
            .finish_non_exhaustive()
    }
}

impl SubscriptionSyncer {
    pub fn new(
        catalog: Arc<CatalogSnapshot>,
        subscriptions: Arc<dyn Indexer<Subscription>>,
        csvs: Arc<dyn Indexer<ClusterServiceVersion>>,
        client: Arc<dyn ClusterClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            subscriptions,
            csvs,
            client,
            metrics,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    #[cfg(test)]
    fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }
}

#[async_trait]
impl SyncHandler<Subscription> for SubscriptionSyncer {
    async fn sync(&self, sub: Arc<Subscription>) -> anyhow::Result<()> {
        let namespace = sub.namespace().context("subscription has no namespace")?;
        let name = sub.name_any();
        let model = self.catalog.current();

        // The synced object is authoritative over its cached copy.
        let mut peers: Vec<Arc<Subscription>> = self
            .subscriptions
            .list()
            .into_iter()
            .filter(|s| s.namespace().as_deref() == Some(namespace.as_str()) && s.name_any() != name)
            .collect();
        peers.push(Arc::clone(&sub));
        let requests: Vec<_> = peers.iter().map(|s| subscription_request(s)).collect();
        let installed = installed_state(&self.csvs.list(), &model, &namespace);

        let now = chrono::Utc::now();
        let status = match Resolver::new(&model)
            .with_limit(self.search_limit)
            .resolve(&requests, &installed)
        {
            Ok(generation) => {
                self.metrics.record_resolution("success");
                info!(
                    "Resolved {} subscription(s) in {}: {} step(s)",
                    requests.len(),
                    namespace,
                    generation.steps.len()
                );
                resolved_status(sub.status.as_ref(), &sub.spec.package, &generation, &installed, now)
            }
            Err(e) => {
                self.metrics.record_resolution(e.reason());
                warn!("Resolution failed for subscription {}/{}: {}", namespace, name, e);
                failed_status(sub.status.as_ref(), &sub.spec.package, &e, &installed, now)
            }
        };

        if !status_changed(sub.status.as_ref(), &status) {
            debug!("Subscription {}/{} status unchanged", namespace, name);
            return Ok(());
        }
        self.client
            .patch_subscription_status(&namespace, &name, &status)
            .await
            .with_context(|| format!("updating status of subscription {namespace}/{name}"))?;
        debug!("Updated subscription {}/{} status: {:?}", namespace, name, status.state);
        Ok(())
    }
}
