//! Open vSwitch dataplane driven through ovs-vsctl, ovs-ofctl, ip and iptables

use async_trait::async_trait;
use overlay_api::{NetBindingSpec, Vnid};
use tracing::{debug, info, warn};

use crate::command::{CommandOutput, CommandRunner, SystemRunner};
use crate::config::DataplaneConfig;
use crate::error::{DataplaneError, Result};
use crate::flow::{self, FlowRule};
use crate::Dataplane;

const OPENFLOW_VERSION: &str = "OpenFlow13";

pub const SET_LOCAL_SCRIPT: &str = "pod-set-local-network.sh";
pub const REMOVE_LOCAL_SCRIPT: &str = "pod-remove-local-network.sh";
pub const SET_PEER_SCRIPT: &str = "pod-set-peer-network.sh";
pub const REMOVE_PEER_SCRIPT: &str = "pod-remove-peer-network.sh";

/// Dataplane programming an OVS bridge on the local host
pub struct OvsDataplane<R = SystemRunner> {
    config: DataplaneConfig,
    runner: R,
}

impl OvsDataplane<SystemRunner> {
    pub fn new(config: DataplaneConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: CommandRunner> OvsDataplane<R> {
    pub fn with_runner(config: DataplaneConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &DataplaneConfig {
        &self.config
    }

    /// Run a command, turning a non-zero exit into an error
    async fn run(&self, program: &str, args: Vec<String>) -> Result<CommandOutput> {
        let output = self.runner.run(program, &args).await?;
        let combined = output.combined();
        if !combined.is_empty() {
            debug!("Output of {}: {}", program, combined);
        }

        if output.success {
            Ok(output)
        } else {
            Err(DataplaneError::CommandFailed {
                command: format!("{} {}", program, args.join(" ")),
                code: output.exit_code,
                output: combined,
            })
        }
    }

    async fn ofctl(&self, command: &str, extra: Vec<String>) -> Result<CommandOutput> {
        let mut args = vec![
            "-O".to_string(),
            OPENFLOW_VERSION.to_string(),
            command.to_string(),
            self.config.bridge.clone(),
        ];
        args.extend(extra);
        self.run("ovs-ofctl", args).await
    }

    fn masquerade_args(&self, op: &str) -> Vec<String> {
        let range = self.config.cluster_range();
        [
            "-t",
            "nat",
            op,
            "POSTROUTING",
            "-s",
            &range,
            "!",
            "-d",
            &range,
            "-j",
            "MASQUERADE",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }
}

fn record<T>(failures: &mut Vec<String>, step: &str, result: Result<T>) {
    if let Err(e) = result {
        warn!("Bootstrap step {} failed: {}", step, e);
        failures.push(format!("{}: {}", step, e));
    }
}

fn local_args(binding: &NetBindingSpec) -> Vec<String> {
    vec![
        binding.pod_id.clone(),
        binding.ip_address.clone(),
        binding.mac_address.clone(),
        binding.vnid.to_string(),
        binding.bridge_port.to_string(),
    ]
}

fn peer_args(binding: &NetBindingSpec) -> Vec<String> {
    vec![
        binding.vtep.clone(),
        binding.ip_address.clone(),
        binding.mac_address.clone(),
        binding.vnid.to_string(),
    ]
}

#[async_trait]
impl<R: CommandRunner> Dataplane for OvsDataplane<R> {
    async fn bootstrap(&self) -> Result<()> {
        let bridge = &self.config.bridge;
        let tap = &self.config.tap;
        info!("Bootstrapping bridge {} with tap {}", bridge, tap);

        // Every step runs even when an earlier one failed
        let mut failures = Vec::new();

        let attach = self
            .run(
                "ovs-vsctl",
                vec![
                    "--may-exist".to_string(),
                    "add-port".to_string(),
                    bridge.clone(),
                    tap.clone(),
                    "--".to_string(),
                    "set".to_string(),
                    "Interface".to_string(),
                    tap.clone(),
                    format!("ofport_request={}", self.config.tap_port),
                ],
            )
            .await;
        record(&mut failures, "attaching tap", attach);

        let address = self
            .run(
                "ip",
                vec![
                    "addr".to_string(),
                    "replace".to_string(),
                    self.config.tap_address.to_string(),
                    "dev".to_string(),
                    tap.clone(),
                ],
            )
            .await;
        record(&mut failures, "addressing tap", address);

        let link = self
            .run(
                "ip",
                vec![
                    "link".to_string(),
                    "set".to_string(),
                    "dev".to_string(),
                    tap.clone(),
                    "up".to_string(),
                ],
            )
            .await;
        record(&mut failures, "bringing tap up", link);

        let reset = self.ofctl("del-flows", Vec::new()).await;
        record(&mut failures, "clearing flows", reset);
        for rule in flow::skeleton(self.config.tunnel_port, self.config.tap_port) {
            let added = self.add_flow(&rule).await;
            record(&mut failures, "installing base flow", added);
        }

        let masquerade = self.set_masquerade(true).await;
        record(&mut failures, "masquerading", masquerade);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DataplaneError::Incomplete { failures })
        }
    }

    async fn set_masquerade(&self, enabled: bool) -> Result<()> {
        // Deleting first keeps a single copy of the rule
        if let Err(e) = self.run("iptables", self.masquerade_args("-D")).await {
            debug!("No masquerade rule to remove: {}", e);
        }
        if enabled {
            self.run("iptables", self.masquerade_args("-A")).await?;
            info!("Masquerading traffic leaving {}", self.config.cluster_range());
        }
        Ok(())
    }

    async fn set_local_network(&self, binding: &NetBindingSpec) -> Result<()> {
        self.run(&self.config.script(SET_LOCAL_SCRIPT), local_args(binding))
            .await?;
        debug!("Initialized local network of {}", binding.key());
        Ok(())
    }

    async fn remove_local_network(&self, binding: &NetBindingSpec) -> Result<()> {
        self.run(&self.config.script(REMOVE_LOCAL_SCRIPT), local_args(binding))
            .await?;
        debug!("Removed local network of {}", binding.key());
        Ok(())
    }

    async fn set_peer_network(&self, binding: &NetBindingSpec) -> Result<()> {
        self.run(&self.config.script(SET_PEER_SCRIPT), peer_args(binding))
            .await?;
        debug!("Set peer network of {} via {}", binding.key(), binding.vtep);
        Ok(())
    }

    async fn remove_peer_network(&self, binding: &NetBindingSpec) -> Result<()> {
        self.run(&self.config.script(REMOVE_PEER_SCRIPT), peer_args(binding))
            .await?;
        debug!("Removed peer network of {} via {}", binding.key(), binding.vtep);
        Ok(())
    }

    async fn flush_vnid(&self, vnid: Vnid) -> Result<()> {
        info!("Removing all rules of vnid {}", vnid);
        self.del_flows(&FlowRule::network(vnid)).await
    }

    async fn add_flow(&self, rule: &FlowRule) -> Result<()> {
        self.ofctl("add-flow", vec![rule.to_string()]).await?;
        Ok(())
    }

    async fn del_flows(&self, rule: &FlowRule) -> Result<()> {
        self.ofctl("del-flows", vec![rule.match_spec()]).await?;
        Ok(())
    }
}
