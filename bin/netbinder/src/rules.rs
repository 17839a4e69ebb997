//! Translation of one network's binding events into dataplane rules

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use overlay_api::{NetBindingSpec, Vnid};
use overlay_core::BindingEvent;
use overlay_dataplane::Dataplane;
use tracing::{debug, info, warn};

use crate::metrics::NodeMetrics;

/// Rule state of a single VNID on this node.
///
/// Pods running here are only counted: their local wiring is done at
/// bootstrap or by the runtime. Pods on other nodes get a peer rule
/// pointing at their VTEP. When the last local pod leaves, every flow of
/// the network is flushed at once.
pub struct VnidRules {
    vnid: Vnid,
    host: String,
    dataplane: Arc<dyn Dataplane>,
    metrics: Arc<NodeMetrics>,
    // Shared with the reconciler, always equal to local.len() once changed
    local_pods: Arc<AtomicUsize>,
    local: HashSet<String>,
    // Last claimed binding seen per pod key
    known: HashMap<String, NetBindingSpec>,
}

impl VnidRules {
    pub fn new(
        vnid: Vnid,
        host: impl Into<String>,
        dataplane: Arc<dyn Dataplane>,
        metrics: Arc<NodeMetrics>,
        local_pods: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            vnid,
            host: host.into(),
            dataplane,
            metrics,
            local_pods,
            local: HashSet::new(),
            known: HashMap::new(),
        }
    }

    pub fn vnid(&self) -> Vnid {
        self.vnid
    }

    pub async fn handle(&mut self, event: BindingEvent) {
        self.metrics
            .binding_events_total
            .with_label_values(&[event.kind()])
            .inc();

        match event {
            BindingEvent::Added(binding) | BindingEvent::Modified(binding) => {
                self.apply_rule(binding).await
            }
            BindingEvent::Deleted(binding) => self.remove_rule(binding).await,
            BindingEvent::Unknown(detail) => {
                warn!("Unknown event on vnid {}: {}", self.vnid, detail)
            }
        }
    }

    /// Bring the rules in line with a fresh listing: bindings that vanished
    /// since the last listing are removed, the rest are applied.
    pub async fn resync(&mut self, listed: Vec<NetBindingSpec>) {
        let present: HashSet<String> = listed.iter().map(NetBindingSpec::key).collect();
        let vanished: Vec<NetBindingSpec> = self
            .known
            .iter()
            .filter(|(key, _)| !present.contains(*key))
            .map(|(_, binding)| binding.clone())
            .collect();

        if !vanished.is_empty() {
            info!("{} bindings of vnid {} vanished while unwatched", vanished.len(), self.vnid);
        }
        for binding in vanished {
            self.remove_rule(binding).await;
        }
        for binding in listed {
            self.apply_rule(binding).await;
        }
    }

    pub async fn apply_rule(&mut self, binding: NetBindingSpec) {
        if !binding.is_claimed() {
            debug!("Netbinding {} not claimed by a node yet", binding.key());
            return;
        }
        let key = binding.key();

        if let Some(previous) = self.known.get(&key) {
            if *previous == binding {
                return;
            }
            if !previous.is_local_to(&self.host) {
                let previous = previous.clone();
                self.remove_peer(&previous).await;
            }
        }

        if binding.is_local_to(&self.host) {
            // Wired at bootstrap or by the runtime; only track it
            debug!("Tracking local pod {} on vnid {}", key, self.vnid);
            self.local.insert(key.clone());
        } else {
            if self.local.remove(&key) {
                debug!("Pod {} moved to {}", key, binding.vtep);
            }
            match self.dataplane.set_peer_network(&binding).await {
                Ok(()) => info!("Set peer network of {} via {}", key, binding.vtep),
                Err(e) => self.dataplane_failure("modifying peer network", &key, e),
            }
        }

        self.known.insert(key, binding);
        self.publish_count();
    }

    pub async fn remove_rule(&mut self, binding: NetBindingSpec) {
        let key = binding.key();
        self.known.remove(&key);

        if binding.is_local_to(&self.host) {
            self.local.remove(&key);
            self.publish_count();

            if self.local.is_empty() {
                info!("Last local pod of vnid {} gone, removing all its rules", self.vnid);
                match self.dataplane.flush_vnid(self.vnid).await {
                    // Peer rules went with the flush and must be set again
                    Ok(()) => self.known.clear(),
                    Err(e) => self.dataplane_failure("flushing vnid", &key, e),
                }
            } else if let Err(e) = self.dataplane.remove_local_network(&binding).await {
                self.dataplane_failure("removing local network", &key, e);
            }
        } else if binding.is_claimed() {
            self.remove_peer(&binding).await;
        }
    }

    /// Flush everything programmed for this network
    pub async fn teardown(&mut self) {
        if let Err(e) = self.dataplane.flush_vnid(self.vnid).await {
            self.dataplane_failure("flushing vnid", &self.vnid.to_string(), e);
        }
        self.known.clear();
        self.local.clear();
    }

    async fn remove_peer(&self, binding: &NetBindingSpec) {
        if let Err(e) = self.dataplane.remove_peer_network(binding).await {
            self.dataplane_failure("removing peer network", &binding.key(), e);
        }
    }

    fn publish_count(&self) {
        self.local_pods.store(self.local.len(), Ordering::SeqCst);
    }

    fn dataplane_failure(&self, action: &str, subject: &str, e: overlay_dataplane::DataplaneError) {
        warn!("Error while {} for {}: {}", action, subject, e);
        self.metrics.dataplane_failures_total.inc();
    }
}
