//! Node dataplane settings loaded from the environment

use std::path::PathBuf;

use ipnetwork::Ipv4Network;

use crate::error::{DataplaneError, Result};

const DEFAULT_BRIDGE: &str = "obr0";
const DEFAULT_TAP: &str = "tap1";
const DEFAULT_TAP_PORT: &str = "3";
const DEFAULT_TUNNEL_PORT: &str = "10";
const DEFAULT_TAP_ADDRESS: &str = "10.246.1.1/16";
const DEFAULT_CLUSTER_CIDR: &str = "10.246.0.0/16";

/// Bridge layout and address plan of one node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataplaneConfig {
    /// OVS bridge the pods attach to
    pub bridge: String,
    /// Internal port connecting the bridge to the host stack
    pub tap: String,
    pub tap_port: u32,
    /// Bridge port receiving traffic from peer nodes
    pub tunnel_port: u32,
    /// Host address on the tap, with prefix
    pub tap_address: Ipv4Network,
    /// Range masqueraded when leaving the overlay
    pub cluster_cidr: Ipv4Network,
    /// Directory holding the pod network scripts; empty means resolve on PATH
    pub script_dir: Option<PathBuf>,
}

impl DataplaneConfig {
    /// Load using `lookup` to resolve variables, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            bridge: get("OVERLAY_BRIDGE", DEFAULT_BRIDGE),
            tap: get("OVERLAY_TAP", DEFAULT_TAP),
            tap_port: parse("OVERLAY_TAP_PORT", &get("OVERLAY_TAP_PORT", DEFAULT_TAP_PORT))?,
            tunnel_port: parse(
                "OVERLAY_TUNNEL_PORT",
                &get("OVERLAY_TUNNEL_PORT", DEFAULT_TUNNEL_PORT),
            )?,
            tap_address: parse(
                "OVERLAY_TAP_ADDRESS",
                &get("OVERLAY_TAP_ADDRESS", DEFAULT_TAP_ADDRESS),
            )?,
            cluster_cidr: parse(
                "OVERLAY_CLUSTER_CIDR",
                &get("OVERLAY_CLUSTER_CIDR", DEFAULT_CLUSTER_CIDR),
            )?,
            script_dir: lookup("OVERLAY_SCRIPT_DIR")
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// Cluster range in canonical network form, e.g. `10.246.0.0/16`
    pub fn cluster_range(&self) -> String {
        format!("{}/{}", self.cluster_cidr.network(), self.cluster_cidr.prefix())
    }

    /// Path used to invoke a pod network script
    pub fn script(&self, name: &str) -> String {
        match &self.script_dir {
            Some(dir) => dir.join(name).to_string_lossy().to_string(),
            None => name.to_string(),
        }
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DataplaneError::InvalidConfig(format!("{}={}: {}", key, value, e)))
}
