//! OLM Operator
//!
//! Keeps operator Subscriptions resolved against a file-based catalog:
//! - Subscription: resolves the namespace's subscriptions and records the
//!   target CSV and planned install/upgrade steps in the status
//! - ClusterServiceVersion: changes requeue the subscriptions they affect
//! - CSV-owned ConfigMaps, Deployments and Services: labelled as managed,
//!   content-hashed (ConfigMaps) and annotated with the CSV they were
//!   installed alongside

mod alongside;
mod catalog_source;
mod cluster;
mod config;
mod controller;
mod error;
mod metrics;
mod reconcile_helpers;
mod reconciler;
#[cfg(test)]
mod test_utils;

use crate::config::{Config, LogFormat};
use crate::error::ControllerError;
use controller::Controller;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Configure rustls crypto provider before any TLS connection is made
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    info!("Starting OLM operator");
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Catalog: {}", config.catalog_path.display());
    info!("  Metrics address: {}", config.metrics_addr);
    info!("  Resync period: {:?}", config.resync);
    info!("  Workers per queue: {}", config.workers);

    let stop = CancellationToken::new();
    let on_signal = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                on_signal.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let controller = Controller::new(config).await?;
    controller.run(stop).await?;

    Ok(())
}
