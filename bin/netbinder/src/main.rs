use anyhow::Result;
use hyper::StatusCode;
use kube::Client;
use overlay_core::{KubeBindingStore, KubeBoundPods};
use overlay_dataplane::OvsDataplane;
use overlay_telemetry::{logging, telemetry_response, text_response};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod metrics;
mod reconciler;
mod rules;
mod watcher;

#[cfg(test)]
mod testing;

use config::NodeConfig;
use metrics::NodeMetrics;
use reconciler::Reconciler;

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env()?;
    logging::init(config.log_format, "info,kube=warn")?;

    info!("Starting netbinder on {}...", config.hostname);
    info!(
        "  - Bridge: {} (tap {}, tunnel port {})",
        config.dataplane.bridge, config.dataplane.tap, config.dataplane.tunnel_port
    );
    info!("  - Sync interval: {:?}", config.sync_interval);

    let client = Client::try_default().await?;
    let store = Arc::new(KubeBindingStore::new(client.clone()));
    let pods = Arc::new(KubeBoundPods::new(client));
    let dataplane = Arc::new(OvsDataplane::new(config.dataplane.clone()));
    let metrics = Arc::new(NodeMetrics::new()?);
    let shutdown = CancellationToken::new();

    let registry = metrics.registry.clone();
    let telemetry = tokio::spawn(overlay_telemetry::serve(
        config.telemetry_listen,
        move |req: hyper::Request<hyper::body::Incoming>| {
            let registry = registry.clone();
            async move {
                telemetry_response(req.method(), req.uri().path(), &registry)
                    .unwrap_or_else(|| text_response(StatusCode::NOT_FOUND, "Not Found\n"))
            }
        },
        shutdown.clone(),
    ));

    let reconciler = Reconciler::new(
        config.hostname.clone(),
        pods,
        store,
        dataplane,
        metrics,
    );

    // Wire the pods already running here before watching anything
    if let Err(e) = reconciler.bootstrap().await {
        error!("Error getting list of pods: {}", e);
    }

    let reconcile = tokio::spawn(reconciler.run(config.sync_interval, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping watchers...");
    shutdown.cancel();

    if let Err(e) = reconcile.await {
        error!("Reconcile loop ended abnormally: {}", e);
    }
    if let Ok(Err(e)) = telemetry.await {
        error!("Telemetry server error: {}", e);
    }

    Ok(())
}
