//! Core overlay networking functionality
//!
//! This library provides:
//! - Subnet walking and binding allocation
//! - The binding registry contract with in-memory and Kubernetes stores
//! - A verb adapter for exposing bindings over HTTP
//! - Node pod discovery

pub mod allocator;
pub mod error;
pub mod event;
pub mod pods;
pub mod registry;
pub mod rest;
pub mod store;
pub mod subnet;

pub use allocator::BindingAllocator;
pub use error::{CoreError, Result};
pub use event::{BindingEvent, BindingEventStream, BindingSubscription};
pub use pods::{BoundPod, BoundPods, KubeBoundPods};
pub use registry::{BindingFeed, BindingRegistry, BindingStore, MemoryStore};
pub use rest::{BindingRequest, BindingResponse, NetBindingRest, Status};
pub use store::KubeBindingStore;
pub use subnet::{AddressFamily, Subnet};
