//! Overlay network API types and CRDs for Kubernetes integration
//!
//! This library defines the resources shared by the scheduler-side allocator
//! and the per-node binder:
//! - NetBinding: the IP/MAC/VNID/bridge-port/VTEP assignment of one pod
//! - Vnid: the virtual network identifier derived from a namespace

pub mod v1alpha1;
pub mod vnid;

pub use v1alpha1::{NetBinding, NetBindingSpec};
pub use vnid::Vnid;
