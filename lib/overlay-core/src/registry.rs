//! Binding registry contract and an in-memory implementation

use crate::event::{BindingEvent, BindingSubscription};
use crate::{CoreError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use overlay_api::{NetBindingSpec, Vnid};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Storage for NetBindings.
///
/// Writing a binding is not a passive record: nodes watching its VNID turn
/// it into dataplane rules. Bindings are addressed by the pod's namespace
/// and name. Concurrent applies for the same pod are last-write-wins.
#[async_trait]
pub trait BindingRegistry: Send + Sync {
    /// Persist `binding`, replacing any binding of the same pod
    async fn apply(&self, binding: &NetBindingSpec) -> Result<()>;

    /// Point lookup of the binding of one pod
    async fn get(&self, namespace: &str, pod_id: &str) -> Result<NetBindingSpec>;

    /// Remove the binding of one pod
    async fn delete(&self, namespace: &str, pod_id: &str) -> Result<()>;
}

/// Change feed over the bindings of one virtual network
#[async_trait]
pub trait BindingFeed: Send + Sync {
    /// List the bindings of `vnid`, then stream every change after the listed version
    async fn watch_vnid(&self, vnid: Vnid) -> Result<BindingSubscription>;
}

/// A registry that can also be watched
pub trait BindingStore: BindingRegistry + BindingFeed {}

impl<T: BindingRegistry + BindingFeed> BindingStore for T {}

const EVENT_BUFFER: usize = 1024;

/// In-process binding store with a change feed
pub struct MemoryStore {
    // Map of namespace/pod_id to binding
    bindings: Arc<RwLock<HashMap<String, NetBindingSpec>>>,
    events: broadcast::Sender<BindingEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            bindings: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Get count of stored bindings
    pub async fn binding_count(&self) -> usize {
        let bindings = self.bindings.read().await;
        bindings.len()
    }

    fn publish(&self, event: BindingEvent) {
        // No receivers simply means nobody is watching yet
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn binding_key(namespace: &str, pod_id: &str) -> String {
    format!("{}/{}", namespace, pod_id)
}

#[async_trait]
impl BindingRegistry for MemoryStore {
    async fn apply(&self, binding: &NetBindingSpec) -> Result<()> {
        let key = binding.key();
        let mut bindings = self.bindings.write().await;
        let event = match bindings.insert(key.clone(), binding.clone()) {
            Some(_) => BindingEvent::Modified(binding.clone()),
            None => BindingEvent::Added(binding.clone()),
        };
        self.publish(event);

        debug!("Applied netbinding: {}", key);
        Ok(())
    }

    async fn get(&self, namespace: &str, pod_id: &str) -> Result<NetBindingSpec> {
        let key = binding_key(namespace, pod_id);
        let bindings = self.bindings.read().await;
        bindings
            .get(&key)
            .cloned()
            .ok_or(CoreError::BindingNotFound(key))
    }

    async fn delete(&self, namespace: &str, pod_id: &str) -> Result<()> {
        let key = binding_key(namespace, pod_id);
        let mut bindings = self.bindings.write().await;
        let removed = bindings
            .remove(&key)
            .ok_or_else(|| CoreError::BindingNotFound(key.clone()))?;
        self.publish(BindingEvent::Deleted(removed));

        debug!("Deleted netbinding: {}", key);
        Ok(())
    }
}

#[async_trait]
impl BindingFeed for MemoryStore {
    async fn watch_vnid(&self, vnid: Vnid) -> Result<BindingSubscription> {
        // Subscribing under the lock keeps the snapshot and the feed gap-free
        let bindings = self.bindings.read().await;
        let initial = bindings
            .values()
            .filter(|b| b.vnid == vnid)
            .cloned()
            .collect();
        let receiver = self.events.subscribe();
        drop(bindings);

        let events = futures::stream::unfold(receiver, move |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.vnid() == Some(vnid) => return Some((event, receiver)),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Feed for vnid {} lagged by {} events, closing", vnid, skipped);
                        return None;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        Ok(BindingSubscription { initial, events })
    }
}
