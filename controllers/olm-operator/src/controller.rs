//! Main controller implementation.
//!
//! Builds one informer per watched kind, the filter registry deciding which
//! objects reach the queues, and one queue informer per kind:
//!
//! - `subscriptions`: resolution and status
//! - `csvs`: requeues the subscriptions of the CSV's namespace
//! - `configmaps`: managed label, content hash and alongside annotations
//! - `deployments` and `services`: managed label and alongside annotations
//!
//! The metrics server and the catalog refresh loop run next to the operator
//! and stop with it.

use crate::catalog_source::CatalogSnapshot;
use crate::cluster::{ClusterClient, KubeClusterClient};
use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::{self, HealthState, Metrics};
use crate::reconciler::{
    managed_labeller, AlongsideAnnotator, ContentHashLabeller, RequeueSubscriptions, SubscriptionSyncer, CSV_KIND,
};
use crds::{ClusterServiceVersion, Subscription};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher;
use kube::{Api, Client, Resource};
use queueinformer::filter::predicates::owned_by_kind;
use queueinformer::{
    ClusterProbe, FilterRegistry, HandlerChain, Informer, ItemExponentialRateLimiter, KubeInformer, KubeProbe,
    Operator, QueueInformer, QueueInformerBuilder,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One informer per watched kind.
pub struct Informers<S, C, M, D, V> {
    pub subscriptions: Arc<S>,
    pub csvs: Arc<C>,
    pub config_maps: Arc<M>,
    pub deployments: Arc<D>,
    pub services: Arc<V>,
}

/// Main controller for the OLM operator.
pub struct Controller {
    config: Config,
    operator: Operator,
    subscriptions: Arc<QueueInformer<Subscription>>,
    catalog: Arc<CatalogSnapshot>,
    health: Arc<HealthState>,
}

impl Controller {
    /// Connects to the cluster and loads the catalog.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing OLM operator");

        let client = Client::try_default().await?;
        let catalog = Arc::new(CatalogSnapshot::load(&config.catalog_path)?);
        let metrics = Arc::new(Metrics::new()?);

        let ns = config.namespace.as_deref();
        let informers = Informers {
            subscriptions: Arc::new(informer::<Subscription>(&client, ns)),
            csvs: Arc::new(informer::<ClusterServiceVersion>(&client, ns)),
            config_maps: Arc::new(informer::<ConfigMap>(&client, ns)),
            deployments: Arc::new(informer::<Deployment>(&client, ns)),
            services: Arc::new(informer::<Service>(&client, ns)),
        };

        Self::assemble(
            config,
            KubeProbe::new(client.clone()),
            informers,
            catalog,
            Arc::new(KubeClusterClient::new(client)),
            metrics,
        )
    }

    /// Wires handlers, filters and queue informers around `informers`.
    pub fn assemble<P, S, C, M, D, V>(
        config: Config,
        probe: P,
        informers: Informers<S, C, M, D, V>,
        catalog: Arc<CatalogSnapshot>,
        client: Arc<dyn ClusterClient>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ControllerError>
    where
        P: ClusterProbe + 'static,
        S: Informer<Subscription> + 'static,
        C: Informer<ClusterServiceVersion> + 'static,
        M: Informer<ConfigMap> + 'static,
        D: Informer<Deployment> + 'static,
        V: Informer<Service> + 'static,
    {
        // Subscriptions and CSVs always pass; workload kinds must be CSV-owned.
        let filter = Arc::new(
            FilterRegistry::builder()
                .with::<Subscription, _>(|_| true)
                .with::<ClusterServiceVersion, _>(|_| true)
                .with::<ConfigMap, _>(owned_by_kind(CSV_KIND))
                .with::<Deployment, _>(owned_by_kind(CSV_KIND))
                .with::<Service, _>(owned_by_kind(CSV_KIND))
                .build(),
        );
        let csv_indexer = informers.csvs.indexer();

        let syncer = SubscriptionSyncer::new(
            Arc::clone(&catalog),
            informers.subscriptions.indexer(),
            Arc::clone(&csv_indexer),
            Arc::clone(&client),
            Arc::clone(&metrics),
        );
        let subscriptions = Arc::new(
            tune(
                QueueInformer::builder("subscriptions", informers.subscriptions, syncer),
                &config,
                &filter,
                &metrics,
            )
            .build()?,
        );

        informers
            .csvs
            .add_event_handler(Arc::new(RequeueSubscriptions::new(Arc::clone(&subscriptions))));
        let csvs = tune(
            QueueInformer::builder(
                "csvs",
                informers.csvs,
                RequeueSubscriptions::new(Arc::clone(&subscriptions)),
            ),
            &config,
            &filter,
            &metrics,
        )
        .build()?;

        let alongside = || AlongsideAnnotator::new(Arc::clone(&client), Arc::clone(&csv_indexer));
        let config_maps = HandlerChain::new()
            .with(managed_labeller::<ConfigMap>(Arc::clone(&client)))
            .with(ContentHashLabeller::new(Arc::clone(&client)))
            .with(alongside());
        let deployments = HandlerChain::new()
            .with(managed_labeller::<Deployment>(Arc::clone(&client)))
            .with(alongside());
        let services = HandlerChain::new()
            .with(managed_labeller::<Service>(Arc::clone(&client)))
            .with(alongside());

        let mut operator = Operator::new("olm-operator", probe);
        operator.register_shared(Arc::clone(&subscriptions))?;
        operator.register_queue_informer(csvs)?;
        operator.register_queue_informer(
            tune(
                QueueInformer::builder("configmaps", informers.config_maps, config_maps),
                &config,
                &filter,
                &metrics,
            )
            .build()?,
        )?;
        operator.register_queue_informer(
            tune(
                QueueInformer::builder("deployments", informers.deployments, deployments),
                &config,
                &filter,
                &metrics,
            )
            .build()?,
        )?;
        operator.register_queue_informer(
            tune(
                QueueInformer::builder("services", informers.services, services),
                &config,
                &filter,
                &metrics,
            )
            .build()?,
        )?;
        info!("Registered {} queue informer(s)", operator.len());

        Ok(Self {
            config,
            operator,
            subscriptions,
            catalog,
            health: Arc::new(HealthState::new(metrics)),
        })
    }

    /// Runs the operator, the metrics server and the catalog refresh loop
    /// until `stop` is cancelled.
    pub async fn run(self, stop: CancellationToken) -> Result<(), ControllerError> {
        info!("Starting OLM operator");
        let background = stop.child_token();

        let server = tokio::spawn(metrics::serve(
            self.config.metrics_addr,
            Arc::clone(&self.health),
            background.clone(),
        ));
        let refresh = (!self.config.resync.is_zero()).then(|| {
            tokio::spawn(refresh_catalog(
                Arc::clone(&self.catalog),
                Arc::clone(&self.subscriptions),
                self.config.resync,
                background.clone(),
            ))
        });

        self.health.set_ready(true);
        let result = self.operator.run(stop).await;
        self.health.set_ready(false);
        background.cancel();

        if let Some(refresh) = refresh
            && let Err(e) = refresh.await
        {
            warn!("Catalog refresh task failed: {}", e);
        }
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Metrics server failed: {}", e),
            Err(e) => warn!("Metrics server task failed: {}", e),
        }

        info!("OLM operator stopped");
        result.map_err(ControllerError::from)
    }
}

/// Settings shared by every queue informer.
fn tune<K>(
    builder: QueueInformerBuilder<K>,
    config: &Config,
    filter: &Arc<FilterRegistry>,
    metrics: &Arc<Metrics>,
) -> QueueInformerBuilder<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    builder
        .rate_limiter(ItemExponentialRateLimiter::new(config.backoff_base, config.backoff_max))
        .filter(Arc::clone(filter))
        .observer(Arc::clone(metrics) as Arc<dyn queueinformer::SyncObserver>)
        .resync_period(config.resync)
        .workers(config.workers)
}

fn informer<K>(client: &Client, namespace: Option<&str>) -> KubeInformer<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    let api = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    KubeInformer::new(api, watcher::Config::default())
}

/// Re-reads the catalog every `period`; a changed catalog re-resolves every
/// subscription. A catalog that fails to load keeps the previous snapshot.
async fn refresh_catalog(
    catalog: Arc<CatalogSnapshot>,
    subscriptions: Arc<QueueInformer<Subscription>>,
    period: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the catalog was just loaded.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let snapshot = Arc::clone(&catalog);
        match tokio::task::spawn_blocking(move || snapshot.refresh()).await {
            Ok(Ok(true)) => {
                info!("Catalog changed; resyncing subscriptions");
                subscriptions.resync();
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => warn!("Catalog refresh failed, keeping previous snapshot: {}", e),
            Err(e) => warn!("Catalog refresh task failed: {}", e),
        }
    }
}
