//! NetBinding storage on the Kubernetes API server

use crate::event::{BindingEvent, BindingSubscription};
use crate::registry::{BindingFeed, BindingRegistry};
use crate::{CoreError, Result};
use async_trait::async_trait;
use futures::{future, StreamExt};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, WatchParams};
use kube::core::WatchEvent;
use kube::Client;
use overlay_api::{NetBinding, NetBindingSpec, Vnid};
use tracing::{debug, info, warn};

/// Field manager used for server-side apply
const FIELD_MANAGER: &str = "overlay-netbinding";

/// HTTP status of an expired resource version on a watch
const GONE: u16 = 410;

/// BindingRegistry and BindingFeed backed by the NetBinding CRD.
///
/// Each binding is stored as a NetBinding named after its pod in the pod's
/// namespace and labelled with its VNID, so watches are scoped per network.
#[derive(Clone)]
pub struct KubeBindingStore {
    client: Client,
}

impl KubeBindingStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced(&self, namespace: &str) -> Api<NetBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl BindingRegistry for KubeBindingStore {
    async fn apply(&self, binding: &NetBindingSpec) -> Result<()> {
        let api = self.namespaced(&binding.namespace);
        let resource = binding.clone().into_resource();
        let params = PatchParams::apply(FIELD_MANAGER).force();

        api.patch(&binding.pod_id, &params, &Patch::Apply(&resource))
            .await?;

        debug!(
            "Applied netbinding {} (vnid {}, ip {})",
            binding.key(),
            binding.vnid,
            binding.ip_address
        );
        Ok(())
    }

    async fn get(&self, namespace: &str, pod_id: &str) -> Result<NetBindingSpec> {
        self.namespaced(namespace)
            .get_opt(pod_id)
            .await?
            .map(|binding| binding.spec)
            .ok_or_else(|| CoreError::BindingNotFound(format!("{}/{}", namespace, pod_id)))
    }

    async fn delete(&self, namespace: &str, pod_id: &str) -> Result<()> {
        match self
            .namespaced(namespace)
            .delete(pod_id, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!("Deleted netbinding {}/{}", namespace, pod_id);
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Err(CoreError::BindingNotFound(
                format!("{}/{}", namespace, pod_id),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BindingFeed for KubeBindingStore {
    async fn watch_vnid(&self, vnid: Vnid) -> Result<BindingSubscription> {
        let api: Api<NetBinding> = Api::all(self.client.clone());
        let selector = vnid.label_selector();

        let list = api
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| watch_failed(vnid, e))?;
        let version = list.metadata.resource_version.clone().unwrap_or_default();
        let initial: Vec<NetBindingSpec> = list.items.into_iter().map(|b| b.spec).collect();

        info!(
            "Set watch on vnid {} at version {} ({} bindings)",
            vnid,
            version,
            initial.len()
        );

        let events = api
            .watch(&WatchParams::default().labels(&selector), &version)
            .await
            .map_err(|e| watch_failed(vnid, e))?
            .take_while(move |item| {
                let open = match item {
                    Ok(WatchEvent::Error(e)) if e.code == GONE => {
                        info!("Watch on vnid {} expired, relisting", vnid);
                        false
                    }
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Watch on vnid {} failed: {}", vnid, e);
                        false
                    }
                };
                future::ready(open)
            })
            .filter_map(|item| future::ready(item.ok().and_then(BindingEvent::from_watch)))
            .boxed();

        Ok(BindingSubscription { initial, events })
    }
}

fn watch_failed(vnid: Vnid, e: kube::Error) -> CoreError {
    CoreError::Store(format!("cannot watch netbindings of vnid {}: {}", vnid, e))
}
