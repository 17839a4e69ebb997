/// API version v1alpha1 for overlay network CRDs

pub mod net_binding;

pub use net_binding::{NetBinding, NetBindingSpec};

/// API group for overlay network resources
pub const API_GROUP: &str = "overlay.io";
/// API version for overlay network resources
pub const API_VERSION: &str = "v1alpha1";
/// Plural resource name used in API paths
pub const NET_BINDING_PLURAL: &str = "netbindings";
/// Label carrying the VNID of a NetBinding, used to scope watches per network
pub const VNID_LABEL: &str = "overlay.io/vnid";
