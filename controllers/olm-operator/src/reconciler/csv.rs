//! CSV changes feed back into subscription resolution
//!
//! The installed set of a namespace is read from its CSVs, so any CSV
//! change (including a deletion) requeues the subscriptions sharing its
//! namespace. Copied CSVs are projections of a CSV elsewhere and are skipped.

use async_trait::async_trait;
use crds::{ClusterServiceVersion, Subscription};
use kube::ResourceExt;
use queueinformer::{QueueInformer, ResourceEventHandler, SyncHandler};
use std::sync::Arc;
use tracing::debug;

pub struct RequeueSubscriptions {
    subscriptions: Arc<QueueInformer<Subscription>>,
}

impl RequeueSubscriptions {
    pub fn new(subscriptions: Arc<QueueInformer<Subscription>>) -> Self {
        Self { subscriptions }
    }

    /// Enqueues the subscriptions in the namespace of `csv`; returns how many.
    fn requeue_for(&self, csv: &ClusterServiceVersion) -> usize {
        if csv.copied_from().is_some() {
            return 0;
        }
        let Some(namespace) = csv.namespace() else {
            return 0;
        };
        let mut count = 0;
        for sub in self
            .subscriptions
            .indexer()
            .list()
            .iter()
            .filter(|s| s.namespace().as_deref() == Some(namespace.as_str()))
        {
            self.subscriptions.enqueue(sub);
            count += 1;
        }
        if count > 0 {
            debug!("CSV {}/{} changed; requeued {} subscription(s)", namespace, csv.name_any(), count);
        }
        count
    }
}

#[async_trait]
impl SyncHandler<ClusterServiceVersion> for RequeueSubscriptions {
    async fn sync(&self, csv: Arc<ClusterServiceVersion>) -> anyhow::Result<()> {
        self.requeue_for(&csv);
        Ok(())
    }
}

// Deleted CSVs never reach the sync handler, the key no longer resolves.
impl ResourceEventHandler<ClusterServiceVersion> for RequeueSubscriptions {
    fn on_delete(&self, csv: &ClusterServiceVersion) {
        self.requeue_for(csv);
    }
}
