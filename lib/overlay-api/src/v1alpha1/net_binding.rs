use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::VNID_LABEL;
use crate::Vnid;

/// NetBinding assigns overlay network identity to a single pod.
///
/// The object is named after the pod and lives in the pod's namespace, so
/// there is at most one binding per pod. Writing it is what makes the
/// network exist: every node watching the binding's VNID programs its
/// dataplane from it.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "overlay.io",
    version = "v1alpha1",
    kind = "NetBinding",
    plural = "netbindings",
    namespaced,
    derive = "Default",
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".spec.ip_address"}"#,
    printcolumn = r#"{"name":"VNID","type":"integer","jsonPath":".spec.vnid"}"#,
    printcolumn = r#"{"name":"VTEP","type":"string","jsonPath":".spec.vtep"}"#,
)]
pub struct NetBindingSpec {
    /// Name of the bound pod
    pub pod_id: String,

    /// Namespace of the bound pod, the input of the VNID
    pub namespace: String,

    /// Overlay IPv4 address, dotted decimal
    pub ip_address: String,

    /// Overlay MAC address, colon separated hex
    pub mac_address: String,

    /// Virtual network the pod belongs to
    pub vnid: Vnid,

    /// Local switch port reserved for the pod
    pub bridge_port: u32,

    /// Hostname of the node running the pod (tunnel endpoint).
    /// Empty until that node claims the binding.
    #[serde(default)]
    pub vtep: String,
}

impl NetBindingSpec {
    /// Unique key of the binding, `namespace/pod_id`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.pod_id)
    }

    /// Whether a node has written its hostname into the binding yet
    pub fn is_claimed(&self) -> bool {
        !self.vtep.is_empty()
    }

    /// Whether the pod runs on `host`
    pub fn is_local_to(&self, host: &str) -> bool {
        self.vtep == host
    }

    /// Labels stored on the NetBinding object
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(VNID_LABEL.to_string(), self.vnid.to_string())])
    }

    /// Wrap this binding in a NetBinding object named after the pod
    pub fn into_resource(self) -> NetBinding {
        let name = self.pod_id.clone();
        let namespace = self.namespace.clone();
        let labels = self.labels();

        let mut binding = NetBinding::new(&name, self);
        binding.metadata.namespace = Some(namespace);
        binding.metadata.labels = Some(labels);
        binding
    }
}
