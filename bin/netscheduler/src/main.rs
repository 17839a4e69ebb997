use anyhow::Result;
use kube::Client;
use overlay_core::{BindingAllocator, KubeBindingStore, NetBindingRest};
use overlay_telemetry::logging;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod api;
mod config;
mod metrics;
mod pod_controller;

use api::ApiState;
use config::SchedulerConfig;
use metrics::SchedulerMetrics;
use pod_controller::{Context, PodController};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SchedulerConfig::from_env()?;
    logging::init(config.log_format, "info,kube=warn")?;

    info!("Starting netscheduler...");
    info!("  - IP range: {}", config.ip_subnet);
    info!("  - MAC range: {}", config.mac_subnet);

    let client = Client::try_default().await?;
    let store = Arc::new(KubeBindingStore::new(client.clone()));
    let allocator = Arc::new(Mutex::new(BindingAllocator::new(
        &config.ip_subnet,
        &config.mac_subnet,
    )));
    let metrics = Arc::new(SchedulerMetrics::new()?);
    let shutdown = CancellationToken::new();

    let state = Arc::new(ApiState {
        rest: NetBindingRest::new(store.clone()),
        metrics: metrics.clone(),
    });
    let server = tokio::spawn(overlay_telemetry::serve(
        config.listen,
        move |req| api::handle(req, state.clone()),
        shutdown.clone(),
    ));

    let controller = PodController::new(Context {
        client,
        registry: store,
        allocator,
        metrics,
    });
    let controller_shutdown = shutdown.clone();
    let controller = tokio::spawn(async move {
        if let Err(e) = controller.run(controller_shutdown).await {
            error!("Pod controller error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting...");
    shutdown.cancel();

    if let Ok(Err(e)) = server.await {
        error!("HTTP server error: {}", e);
    }
    if let Err(e) = controller.await {
        error!("Pod controller ended abnormally: {}", e);
    }

    Ok(())
}
