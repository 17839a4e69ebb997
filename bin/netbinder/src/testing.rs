//! Fakes shared by the netbinder tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use overlay_api::{NetBindingSpec, Vnid};
use overlay_core::{BoundPod, BoundPods};
use overlay_dataplane::{Dataplane, DataplaneError, FlowRule};

/// Records every dataplane call as a short line, e.g. `set_peer team-a/web-1 node-2`
#[derive(Default)]
pub struct RecordingDataplane {
    calls: Mutex<Vec<String>>,
    fail_peer: bool,
}

impl RecordingDataplane {
    pub fn failing_peer() -> Self {
        Self {
            fail_peer: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Dataplane for RecordingDataplane {
    async fn bootstrap(&self) -> overlay_dataplane::Result<()> {
        self.record("bootstrap".to_string());
        Ok(())
    }

    async fn set_masquerade(&self, enabled: bool) -> overlay_dataplane::Result<()> {
        self.record(format!("masquerade {}", enabled));
        Ok(())
    }

    async fn set_local_network(&self, binding: &NetBindingSpec) -> overlay_dataplane::Result<()> {
        self.record(format!("set_local {}", binding.key()));
        Ok(())
    }

    async fn remove_local_network(
        &self,
        binding: &NetBindingSpec,
    ) -> overlay_dataplane::Result<()> {
        self.record(format!("remove_local {}", binding.key()));
        Ok(())
    }

    async fn set_peer_network(&self, binding: &NetBindingSpec) -> overlay_dataplane::Result<()> {
        self.record(format!("set_peer {} {}", binding.key(), binding.vtep));
        if self.fail_peer {
            return Err(DataplaneError::CommandFailed {
                command: "pod-set-peer-network.sh".to_string(),
                code: Some(1),
                output: "no route".to_string(),
            });
        }
        Ok(())
    }

    async fn remove_peer_network(
        &self,
        binding: &NetBindingSpec,
    ) -> overlay_dataplane::Result<()> {
        self.record(format!("remove_peer {} {}", binding.key(), binding.vtep));
        Ok(())
    }

    async fn flush_vnid(&self, vnid: Vnid) -> overlay_dataplane::Result<()> {
        self.record(format!("flush {}", vnid));
        Ok(())
    }

    async fn add_flow(&self, rule: &FlowRule) -> overlay_dataplane::Result<()> {
        self.record(format!("add_flow {}", rule));
        Ok(())
    }

    async fn del_flows(&self, rule: &FlowRule) -> overlay_dataplane::Result<()> {
        self.record(format!("del_flows {}", rule.match_spec()));
        Ok(())
    }
}

/// Pod source returning whatever the test put in it
#[derive(Default)]
pub struct StaticPods {
    pods: Mutex<Vec<BoundPod>>,
}

impl StaticPods {
    pub fn set(&self, pods: Vec<BoundPod>) {
        *self.pods.lock().unwrap() = pods;
    }
}

#[async_trait]
impl BoundPods for StaticPods {
    async fn bound_pods(&self, _host: &str) -> overlay_core::Result<Vec<BoundPod>> {
        Ok(self.pods.lock().unwrap().clone())
    }
}

pub fn binding(namespace: &str, pod_id: &str, vtep: &str) -> NetBindingSpec {
    NetBindingSpec {
        pod_id: pod_id.to_string(),
        namespace: namespace.to_string(),
        ip_address: "10.246.1.3".to_string(),
        mac_address: "10:20:30:00:00:01".to_string(),
        vnid: Vnid::from_namespace(namespace),
        bridge_port: 11,
        vtep: vtep.to_string(),
    }
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
