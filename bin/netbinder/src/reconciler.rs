//! Node reconcile loop: claims local bindings and keeps one watcher per
//! locally relevant VNID

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use overlay_api::Vnid;
use overlay_core::{BindingFeed, BindingRegistry, BindingStore, BoundPod, BoundPods, CoreError};
use overlay_dataplane::Dataplane;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::NodeMetrics;
use crate::rules::VnidRules;
use crate::watcher::WatchState;

pub struct Reconciler {
    host: String,
    pods: Arc<dyn BoundPods>,
    registry: Arc<dyn BindingRegistry>,
    feed: Arc<dyn BindingFeed>,
    dataplane: Arc<dyn Dataplane>,
    metrics: Arc<NodeMetrics>,
    retry: Duration,
    watchers: HashMap<Vnid, WatchState>,
}

impl Reconciler {
    pub fn new<S>(
        host: impl Into<String>,
        pods: Arc<dyn BoundPods>,
        store: Arc<S>,
        dataplane: Arc<dyn Dataplane>,
        metrics: Arc<NodeMetrics>,
    ) -> Self
    where
        S: BindingStore + 'static,
    {
        Self {
            host: host.into(),
            pods,
            registry: store.clone(),
            feed: store,
            dataplane,
            metrics,
            retry: Duration::from_secs(5),
            watchers: HashMap::new(),
        }
    }

    /// Delay before a watcher retries a failed subscription
    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    /// VNIDs currently watched, in order
    pub fn watched(&self) -> Vec<Vnid> {
        let mut vnids: Vec<Vnid> = self.watchers.keys().copied().collect();
        vnids.sort();
        vnids
    }

    /// Prepare the dataplane and wire every pod already running here.
    /// Does not start any watcher.
    pub async fn bootstrap(&self) -> overlay_core::Result<()> {
        if let Err(e) = self.dataplane.bootstrap().await {
            error!("Error bootstrapping dataplane: {}", e);
            self.metrics
                .dataplane_failures_total
                .inc_by(e.failure_count() as u64);
        }

        let pods = self.pods.bound_pods(&self.host).await?;
        info!("Found {} boundpods on {}", pods.len(), self.host);

        for pod in &pods {
            let binding = match self.claim(pod).await {
                Ok(binding) => binding,
                Err(e) => {
                    warn!("Error in fetching netbinding for pod {}: {}", pod.key(), e);
                    continue;
                }
            };
            match self.dataplane.set_local_network(&binding).await {
                Ok(()) => info!("Initialized network of {}", pod.key()),
                Err(e) => {
                    warn!("Error while initializing network of {}: {}", pod.key(), e);
                    self.metrics.dataplane_failures_total.inc();
                }
            }
        }
        Ok(())
    }

    /// One reconcile pass over the pods bound to this host
    pub async fn tick(&mut self) -> overlay_core::Result<()> {
        self.metrics.reconcile_ticks_total.inc();

        let pods = self.pods.bound_pods(&self.host).await?;
        debug!("Found {} boundpods on {}", pods.len(), self.host);

        for pod in &pods {
            match self.claim(pod).await {
                Ok(_) => {}
                Err(CoreError::BindingNotFound(_)) => {
                    debug!("Pod {} has no netbinding yet", pod.key())
                }
                Err(e) => warn!("Error claiming netbinding of {}: {}", pod.key(), e),
            }
        }

        self.watchers.retain(|vnid, state| {
            let finished = state.handle().is_finished();
            if finished {
                warn!("Watcher of vnid {} exited, will relaunch", vnid);
            }
            !finished
        });

        let mut observed: BTreeMap<Vnid, usize> = BTreeMap::new();
        for pod in &pods {
            *observed.entry(pod.vnid()).or_default() += 1;
        }
        for (vnid, count) in &observed {
            if !self.watchers.contains_key(vnid) {
                self.launch(*vnid, *count);
            }
        }

        // A VNID with a pod listed here stays watched even if its counter
        // has not caught up with this tick's claims yet
        let idle: Vec<Vnid> = self
            .watchers
            .iter()
            .filter(|(vnid, state)| state.local_pods() == 0 && !observed.contains_key(*vnid))
            .map(|(vnid, _)| *vnid)
            .collect();
        for vnid in idle {
            if let Some(state) = self.watchers.remove(&vnid) {
                info!("Stopping watch for vnid {}", vnid);
                state.handle().cancel();
            }
        }

        self.metrics.active_watchers.set(self.watchers.len() as i64);
        debug!("Watching vnids {:?}", self.watched());
        Ok(())
    }

    /// Tick every `interval` until `shutdown`, then stop all watchers
    pub async fn run(mut self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Error getting list of pods: {}", e);
                        self.metrics.reconcile_errors_total.inc();
                    }
                }
            }
        }
        self.shutdown().await;
    }

    /// Cancel every watcher and wait for their teardown
    pub async fn shutdown(&mut self) {
        info!("Stopping {} watchers", self.watchers.len());
        let states: Vec<WatchState> = self.watchers.drain().map(|(_, state)| state).collect();
        for state in &states {
            state.handle().cancel();
        }
        for state in states {
            state.into_handle().join().await;
        }
        self.metrics.active_watchers.set(0);
    }

    /// Make sure the pod's binding names this host as its VTEP
    async fn claim(&self, pod: &BoundPod) -> overlay_core::Result<overlay_api::NetBindingSpec> {
        let mut binding = self.registry.get(&pod.namespace, &pod.name).await?;
        if !binding.is_local_to(&self.host) {
            info!("Claiming netbinding {} for {}", binding.key(), self.host);
            binding.vtep = self.host.clone();
            self.registry.apply(&binding).await?;
        }
        Ok(binding)
    }

    fn launch(&mut self, vnid: Vnid, seed: usize) {
        info!("Launching watcher for vnid {} ({} local pods)", vnid, seed);
        let local_pods = Arc::new(AtomicUsize::new(seed));
        let rules = VnidRules::new(
            vnid,
            self.host.clone(),
            self.dataplane.clone(),
            self.metrics.clone(),
            local_pods.clone(),
        );
        let state = WatchState::spawn(self.feed.clone(), rules, local_pods, seed, self.retry);
        self.watchers.insert(vnid, state);
    }
}
