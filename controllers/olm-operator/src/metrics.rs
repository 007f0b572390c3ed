//! Metrics and health endpoints.
//!
//! Provides:
//! - `/metrics` - Prometheus text exposition
//! - `/healthz` - liveness, always 200 while the server runs
//! - `/readyz` - 200 once the operator has started its queues

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use queueinformer::{SyncObserver, SyncOutcome};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Operator metrics.
#[derive(Clone)]
pub struct Metrics {
    syncs_total: IntCounterVec,
    sync_duration_seconds: HistogramVec,
    queue_depth: IntGaugeVec,
    resolutions_total: IntCounterVec,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let syncs_total = IntCounterVec::new(
            Opts::new("olm_syncs_total", "Processed queue keys by outcome"),
            &["queue", "outcome"],
        )?;
        registry.register(Box::new(syncs_total.clone()))?;

        let sync_duration_seconds = HistogramVec::new(
            HistogramOpts::new("olm_sync_duration_seconds", "Time spent syncing one key")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["queue"],
        )?;
        registry.register(Box::new(sync_duration_seconds.clone()))?;

        let queue_depth = IntGaugeVec::new(Opts::new("olm_queue_depth", "Keys waiting in the queue"), &["queue"])?;
        registry.register(Box::new(queue_depth.clone()))?;

        let resolutions_total = IntCounterVec::new(
            Opts::new("olm_resolutions_total", "Subscription resolutions by result"),
            &["result"],
        )?;
        registry.register(Box::new(resolutions_total.clone()))?;

        Ok(Self {
            syncs_total,
            sync_duration_seconds,
            queue_depth,
            resolutions_total,
            registry,
        })
    }

    /// Counts one resolution; `result` is `success` or a failure reason.
    pub fn record_resolution(&self, result: &str) {
        self.resolutions_total.with_label_values(&[result]).inc();
    }

    /// Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return "# Error encoding metrics\n".to_string();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl SyncObserver for Metrics {
    fn on_sync(&self, queue: &str, outcome: SyncOutcome, elapsed: Duration) {
        self.syncs_total.with_label_values(&[queue, outcome.as_str()]).inc();
        self.sync_duration_seconds
            .with_label_values(&[queue])
            .observe(elapsed.as_secs_f64());
    }

    fn on_queue_depth(&self, queue: &str, depth: usize) {
        self.queue_depth
            .with_label_values(&[queue])
            .set(i64::try_from(depth).unwrap_or(i64::MAX));
    }
}

/// Shared state of the health server.
#[derive(Debug)]
pub struct HealthState {
    ready: AtomicBool,
    pub metrics: Arc<Metrics>,
}

impl HealthState {
    /// Starts not ready.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            ready: AtomicBool::new(false),
            metrics,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode(),
    )
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serves the health and metrics endpoints on `addr` until `stop` fires.
pub async fn serve(addr: SocketAddr, state: Arc<HealthState>, stop: CancellationToken) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Starting metrics server");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_feeds_registry() {
        let metrics = Metrics::new().unwrap();
        metrics.on_sync("subscriptions", SyncOutcome::Success, Duration::from_millis(3));
        metrics.on_sync("subscriptions", SyncOutcome::Failure, Duration::from_millis(3));
        metrics.on_queue_depth("subscriptions", 7);
        metrics.record_resolution("success");

        let text = metrics.encode();
        assert!(text.contains(r#"olm_syncs_total{outcome="success",queue="subscriptions"} 1"#));
        assert!(text.contains(r#"olm_syncs_total{outcome="failure",queue="subscriptions"} 1"#));
        assert!(text.contains(r#"olm_queue_depth{queue="subscriptions"} 7"#));
        assert!(text.contains(r#"olm_resolutions_total{result="success"} 1"#));
        assert!(text.contains("olm_sync_duration_seconds_bucket"));
    }

    #[tokio::test]
    async fn test_readiness_follows_state() {
        let state = Arc::new(HealthState::new(Arc::new(Metrics::new().unwrap())));
        assert_eq!(readyz(State(Arc::clone(&state))).await.status(), StatusCode::SERVICE_UNAVAILABLE);
        state.set_ready(true);
        assert_eq!(readyz(State(Arc::clone(&state))).await.status(), StatusCode::OK);
        assert_eq!(healthz().await.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_text() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_resolution("ConstraintsNotSatisfiable");
        let state = Arc::new(HealthState::new(metrics));
        let response = metrics_handler(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; version=0.0.4; charset=utf-8"
        );
    }
}
