//! Discovery of the pods bound to a node

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use overlay_api::Vnid;
use tracing::debug;

use crate::Result;

/// A pod scheduled onto a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundPod {
    pub name: String,
    pub namespace: String,
}

impl BoundPod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn vnid(&self) -> Vnid {
        Vnid::from_namespace(&self.namespace)
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Source of the pods bound to a host
#[async_trait]
pub trait BoundPods: Send + Sync {
    async fn bound_pods(&self, host: &str) -> Result<Vec<BoundPod>>;
}

/// Lists pods by `spec.nodeName` on the API server
pub struct KubeBoundPods {
    client: Client,
}

impl KubeBoundPods {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BoundPods for KubeBoundPods {
    async fn bound_pods(&self, host: &str) -> Result<Vec<BoundPod>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", host));
        let list = pods.list(&params).await?;

        let bound: Vec<BoundPod> = list
            .items
            .iter()
            .filter(|pod| !pod_is_host_network(pod))
            .map(|pod| {
                BoundPod::new(
                    pod.namespace().unwrap_or_else(|| "default".to_string()),
                    pod.name_any(),
                )
            })
            .collect();

        debug!("Found {} boundpods on {}", bound.len(), host);
        Ok(bound)
    }
}

/// Host-network pods share the node's stack and never get a binding
pub fn pod_is_host_network(pod: &Pod) -> bool {
    let Some(spec) = pod.spec.as_ref() else {
        return false;
    };
    spec.host_network.unwrap_or_default()
}
