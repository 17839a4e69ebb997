//! Node dataplane for the overlay network
//!
//! Programs the local bridge, flow tables and peer tunnels by invoking
//! external commands. Every operation is best effort from the caller's
//! point of view: failures are reported, never rolled back.

pub mod command;
pub mod config;
pub mod error;
pub mod flow;
pub mod ovs;

use async_trait::async_trait;
use overlay_api::{NetBindingSpec, Vnid};

pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use config::DataplaneConfig;
pub use error::{DataplaneError, Result};
pub use flow::FlowRule;
pub use ovs::OvsDataplane;

/// Operations a node needs to converge its forwarding state
#[async_trait]
pub trait Dataplane: Send + Sync {
    /// Attach the tap, install the base pipeline and masquerading
    async fn bootstrap(&self) -> Result<()>;

    async fn set_masquerade(&self, enabled: bool) -> Result<()>;

    /// Wire a pod running on this node into its network
    async fn set_local_network(&self, binding: &NetBindingSpec) -> Result<()>;

    async fn remove_local_network(&self, binding: &NetBindingSpec) -> Result<()>;

    /// Reach a pod running on the binding's VTEP through a tunnel
    async fn set_peer_network(&self, binding: &NetBindingSpec) -> Result<()>;

    async fn remove_peer_network(&self, binding: &NetBindingSpec) -> Result<()>;

    /// Remove every flow tagged with the network's cookie
    async fn flush_vnid(&self, vnid: Vnid) -> Result<()>;

    async fn add_flow(&self, rule: &FlowRule) -> Result<()>;

    async fn del_flows(&self, rule: &FlowRule) -> Result<()>;
}
