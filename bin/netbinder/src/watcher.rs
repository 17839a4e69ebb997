//! One supervised watch task per VNID

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use overlay_api::Vnid;
use overlay_core::{BindingFeed, BindingSubscription};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rules::VnidRules;

/// Handle to a running watch task
pub struct WatchHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Ask the task to stop; calling it again has no effect
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to finish its teardown
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Watch task ended abnormally: {}", e);
        }
    }
}

/// What the reconciler keeps per watched VNID
pub struct WatchState {
    local_pods: Arc<AtomicUsize>,
    handle: WatchHandle,
}

impl WatchState {
    /// Spawn a watcher for the network `rules` programs, with the local pod
    /// counter starting at `seed`
    pub fn spawn(
        feed: Arc<dyn BindingFeed>,
        rules: VnidRules,
        local_pods: Arc<AtomicUsize>,
        seed: usize,
        retry: Duration,
    ) -> Self {
        local_pods.store(seed, Ordering::SeqCst);
        let token = CancellationToken::new();
        let task = tokio::spawn(watch_loop(feed, rules, token.clone(), retry));

        Self {
            local_pods,
            handle: WatchHandle { token, task },
        }
    }

    pub fn local_pods(&self) -> usize {
        self.local_pods.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> &WatchHandle {
        &self.handle
    }

    pub fn into_handle(self) -> WatchHandle {
        self.handle
    }
}

/// List-then-watch the bindings of one VNID until cancelled.
///
/// A feed that ends is relisted; a failed subscription is retried after
/// `retry`. On cancellation the network's rules are flushed.
async fn watch_loop(
    feed: Arc<dyn BindingFeed>,
    mut rules: VnidRules,
    token: CancellationToken,
    retry: Duration,
) {
    let vnid: Vnid = rules.vnid();
    info!("Launching watcher for vnid {}", vnid);

    'watch: loop {
        let subscription = tokio::select! {
            _ = token.cancelled() => break 'watch,
            subscription = feed.watch_vnid(vnid) => subscription,
        };

        let BindingSubscription { initial, mut events } = match subscription {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Error setting watch on vnid {}: {}", vnid, e);
                tokio::select! {
                    _ = token.cancelled() => break 'watch,
                    _ = tokio::time::sleep(retry) => continue 'watch,
                }
            }
        };

        debug!("Vnid {} listed {} bindings", vnid, initial.len());
        rules.resync(initial).await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break 'watch,
                event = events.next() => match event {
                    Some(event) => rules.handle(event).await,
                    None => {
                        info!("Feed of vnid {} closed, relisting", vnid);
                        continue 'watch;
                    }
                },
            }
        }
    }

    info!("Got stop signal, exiting watcher of vnid {}", vnid);
    rules.teardown().await;
}
