//! Pod controller allocating a NetBinding for every pod

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Event};
use kube_runtime::Controller;
use overlay_api::NetBindingSpec;
use overlay_core::pods::pod_is_host_network;
use overlay_core::{BindingAllocator, BindingRegistry, CoreError};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::SchedulerMetrics;

/// Finalizer holding a pod until its binding is released
pub const POD_FINALIZER: &str = "overlay.io/netbinding";

#[derive(Debug)]
pub struct ReconcileError(pub String);

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reconciliation error: {}", self.0)
    }
}

impl Error for ReconcileError {}

impl From<CoreError> for ReconcileError {
    fn from(e: CoreError) -> Self {
        ReconcileError(e.to_string())
    }
}

pub struct Context {
    pub client: Client,
    pub registry: Arc<dyn BindingRegistry>,
    pub allocator: Arc<Mutex<BindingAllocator>>,
    pub metrics: Arc<SchedulerMetrics>,
}

pub struct PodController {
    ctx: Arc<Context>,
}

impl PodController {
    pub fn new(ctx: Context) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!("Starting Pod reconciliation");

        let pods: Api<Pod> = Api::all(self.ctx.client.clone());
        let mut stream = Controller::new(pods, Default::default())
            .run(reconcile, error_policy, self.ctx.clone())
            .boxed();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Pod controller shutting down");
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok((pod, _))) => debug!("Reconciled Pod {}", pod.name),
                    Some(Err(e)) => error!("Error in reconciliation stream: {}", e),
                    None => break,
                },
            }
        }

        Ok(())
    }
}

async fn reconcile(pod: Arc<Pod>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if pod_is_host_network(&pod) {
        return Ok(Action::await_change());
    }

    let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&pods, POD_FINALIZER, pod, |event| async {
        match event {
            Event::Apply(pod) => {
                bind_pod(&pod, ctx.registry.as_ref(), &ctx.allocator, &ctx.metrics).await?;
                Ok::<_, ReconcileError>(Action::await_change())
            }
            Event::Cleanup(pod) => {
                unbind_pod(&pod, ctx.registry.as_ref()).await?;
                Ok(Action::await_change())
            }
        }
    })
    .await
    .map_err(|e| ReconcileError(e.to_string()))
}

fn error_policy(pod: Arc<Pod>, e: &ReconcileError, _ctx: Arc<Context>) -> Action {
    error!(
        "Error reconciling Pod {}/{}: {}",
        pod.namespace().unwrap_or_default(),
        pod.name_any(),
        e
    );
    Action::requeue(Duration::from_secs(60))
}

/// Allocate and persist a binding unless the pod already has one.
///
/// Returns the new binding, or `None` when one existed.
pub async fn bind_pod(
    pod: &Pod,
    registry: &dyn BindingRegistry,
    allocator: &Mutex<BindingAllocator>,
    metrics: &SchedulerMetrics,
) -> overlay_core::Result<Option<NetBindingSpec>> {
    let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
    let name = pod.name_any();

    match registry.get(&namespace, &name).await {
        Ok(_) => return Ok(None),
        Err(CoreError::BindingNotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let binding = {
        let mut allocator = allocator.lock().await;
        allocator.allocate(pod)
    }
    .inspect_err(|_| metrics.allocation_failures_total.inc())?;

    registry.apply(&binding).await?;
    metrics.allocations_total.inc();

    info!(
        "Bound pod {} to {} {} (vnid {}, port {})",
        binding.key(),
        binding.ip_address,
        binding.mac_address,
        binding.vnid,
        binding.bridge_port
    );
    Ok(Some(binding))
}

/// Release the binding of a deleted pod. A missing binding is not an error.
pub async fn unbind_pod(pod: &Pod, registry: &dyn BindingRegistry) -> overlay_core::Result<()> {
    let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
    let name = pod.name_any();

    match registry.delete(&namespace, &name).await {
        Ok(()) => {
            info!("Released netbinding of pod {}/{}", namespace, name);
            Ok(())
        }
        Err(CoreError::BindingNotFound(_)) => {
            warn!("Pod {}/{} had no netbinding to release", namespace, name);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
