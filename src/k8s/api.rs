/// Capability handles for talking to the control plane
use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::Serialize;

use crate::error::RemoteError;

/// A cluster node, identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub name: String,
}

/// A pod, identified by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodSummary {
    pub namespace: String,
    pub name: String,
}

/// Result of a delete request.
#[derive(Debug, Clone)]
pub enum Deletion {
    /// The server removed the object and answered with a status
    Deleted,
    /// The object still exists (finalizers or graceful termination pending)
    InProgress(DynamicObject),
}

impl Deletion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Deletion::Deleted)
    }
}

/// One chunk of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub continue_token: Option<String>,
}

/// A chunk of list results and the token for the next chunk, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub continue_token: Option<String>,
}

/// Core resources: nodes, pods and services.
#[async_trait]
pub trait CoreApi: Send + Sync {
    async fn list_nodes(&self, page: PageRequest) -> Result<Page<NodeSummary>, RemoteError>;

    /// Pods across all namespaces, single snapshot
    async fn list_pods(&self, page: PageRequest) -> Result<Page<PodSummary>, RemoteError>;

    async fn create_service(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, RemoteError>;

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<Deletion, RemoteError>;
}

/// Workload resources: deployments.
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    async fn create_deployment(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, RemoteError>;

    async fn delete_deployment(&self, namespace: &str, name: &str)
        -> Result<Deletion, RemoteError>;
}
