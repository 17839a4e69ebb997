//! Binding allocation for newly scheduled pods

use kube::{Resource, ResourceExt};
use overlay_api::{NetBindingSpec, Vnid};
use tracing::{debug, warn};

use crate::subnet::{AddressFamily, Subnet};
use crate::Result;

/// IP range used when none is configured
pub const DEFAULT_IP_SUBNET: &str = "10.246.1.2/24";
/// MAC range used when none is configured
pub const DEFAULT_MAC_SUBNET: &str = "10:20:30:00:00:00/24";
/// First bridge port, reserved for the tunnel and never handed to a pod
pub const RESERVED_BRIDGE_PORT: u32 = 10;

/// Hands out complete bindings: IP, MAC, bridge port and VNID.
///
/// State lives in memory only and is not safe for concurrent use; the owner
/// must serialize calls to [`BindingAllocator::allocate`].
#[derive(Debug)]
pub struct BindingAllocator {
    ip_subnet: Subnet,
    mac_subnet: Subnet,
    bridge_ports: Vec<u32>,
}

impl BindingAllocator {
    /// Create an allocator over the given ranges. Empty strings select the
    /// defaults; malformed strings are logged and leave the range unusable.
    pub fn new(ip_range: &str, mac_range: &str) -> Self {
        let ip_range = if ip_range.is_empty() { DEFAULT_IP_SUBNET } else { ip_range };
        let mac_range = if mac_range.is_empty() { DEFAULT_MAC_SUBNET } else { mac_range };

        let mut ip_subnet = Subnet::new(AddressFamily::Ipv4);
        ip_subnet.init(ip_range);
        let mut mac_subnet = Subnet::new(AddressFamily::Mac);
        mac_subnet.init(mac_range);

        Self {
            ip_subnet,
            mac_subnet,
            bridge_ports: vec![RESERVED_BRIDGE_PORT],
        }
    }

    /// Build a binding for `pod`.
    ///
    /// The VTEP is left empty; the node that runs the pod fills it in.
    /// When either range is exhausted no bridge port is consumed.
    pub fn allocate<K: Resource>(&mut self, pod: &K) -> Result<NetBindingSpec> {
        let pod_id = pod.name_any();
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());

        let ip_address = self.ip_subnet.next_address().inspect_err(|e| {
            warn!("Error allocating IP address to pod {}/{}: {}", namespace, pod_id, e)
        })?;
        let mac_address = self.mac_subnet.next_address().inspect_err(|e| {
            warn!("Error allocating MAC address to pod {}/{}: {}", namespace, pod_id, e)
        })?;
        let bridge_port = self.next_bridge_port();
        let vnid = Vnid::from_namespace(&namespace);

        debug!(
            "Allocated {} {} port {} vnid {} to pod {}/{}",
            ip_address, mac_address, bridge_port, vnid, namespace, pod_id
        );

        Ok(NetBindingSpec {
            pod_id,
            namespace,
            ip_address,
            mac_address,
            vnid,
            bridge_port,
            vtep: String::new(),
        })
    }

    fn next_bridge_port(&mut self) -> u32 {
        let next = self.bridge_ports.last().copied().unwrap_or(RESERVED_BRIDGE_PORT) + 1;
        self.bridge_ports.push(next);
        next
    }

    /// Number of bridge ports handed out so far
    pub fn allocated_ports(&self) -> usize {
        self.bridge_ports.len() - 1
    }
}

impl Default for BindingAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_IP_SUBNET, DEFAULT_MAC_SUBNET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use k8s_openapi::api::core::v1::Pod;
    use kube::api::ObjectMeta;

    fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_allocates_complete_binding() {
        let mut allocator = BindingAllocator::default();

        let first = allocator.allocate(&pod("team-a", "web-0")).unwrap();
        assert_eq!(first.pod_id, "web-0");
        assert_eq!(first.namespace, "team-a");
        assert_eq!(first.ip_address, "10.246.1.3");
        assert_eq!(first.mac_address, "10:20:30:00:00:01");
        assert_eq!(first.bridge_port, 11);
        assert_eq!(first.vtep, "");

        let second = allocator.allocate(&pod("team-a", "web-1")).unwrap();
        assert_eq!(second.ip_address, "10.246.1.4");
        assert_eq!(second.mac_address, "10:20:30:00:00:02");
        assert_eq!(second.bridge_port, 12);
        assert_eq!(second.vnid, first.vnid);
    }

    #[test]
    fn test_vnid_depends_only_on_namespace() {
        let mut allocator = BindingAllocator::default();
        let a = allocator.allocate(&pod("team-a", "x")).unwrap();
        let b = allocator.allocate(&pod("team-b", "x")).unwrap();
        let a_again = allocator.allocate(&pod("team-a", "y")).unwrap();

        assert_eq!(a.vnid, Vnid::from_namespace("team-a"));
        assert_eq!(b.vnid, Vnid::from_namespace("team-b"));
        assert_eq!(a.vnid, a_again.vnid);
        assert_ne!(a.vnid, b.vnid);
    }

    #[test]
    fn test_empty_ranges_use_defaults() {
        let mut allocator = BindingAllocator::new("", "");
        let binding = allocator.allocate(&pod("default", "p")).unwrap();
        assert_eq!(binding.ip_address, "10.246.1.3");
        assert_eq!(binding.mac_address, "10:20:30:00:00:01");
    }

    #[test]
    fn test_missing_namespace_is_default() {
        let mut allocator = BindingAllocator::default();
        let mut orphan = pod("x", "p");
        orphan.metadata.namespace = None;
        let binding = allocator.allocate(&orphan).unwrap();
        assert_eq!(binding.namespace, "default");
        assert_eq!(binding.vnid, Vnid::from_namespace("default"));
    }

    #[test]
    fn test_exhaustion_consumes_no_bridge_port() {
        let mut allocator = BindingAllocator::new("10.246.1.253/24", "10:20:30:00:00:00/24");
        assert!(allocator.allocate(&pod("team-a", "a")).is_ok());
        assert!(allocator.allocate(&pod("team-a", "b")).is_ok());
        assert_eq!(allocator.allocated_ports(), 2);

        let err = allocator.allocate(&pod("team-a", "c")).unwrap_err();
        assert!(matches!(err, CoreError::RangeExhausted(AddressFamily::Ipv4)));
        assert_eq!(allocator.allocated_ports(), 2);
    }

    #[test]
    fn test_mac_exhaustion_propagates() {
        let mut allocator = BindingAllocator::new("10.246.1.2/24", "10:20:30:40:ff:ff/32");
        let err = allocator.allocate(&pod("team-a", "a")).unwrap_err();
        assert!(matches!(err, CoreError::RangeExhausted(AddressFamily::Mac)));
        assert_eq!(allocator.allocated_ports(), 0);
    }
}
