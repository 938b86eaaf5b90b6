/// Kubernetes control-plane access
pub mod api;
pub mod client;
pub mod memory;

pub use api::{CoreApi, Deletion, NodeSummary, Page, PageRequest, PodSummary, WorkloadApi};
pub use client::{connect, KubeCoreApi, KubeWorkloadApi};
pub use memory::{InMemoryCluster, Operation};
