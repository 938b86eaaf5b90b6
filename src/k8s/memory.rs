/// In-process control plane for exercising the facade without a cluster
use async_trait::async_trait;
use kube::api::DynamicObject;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::api::{CoreApi, Deletion, NodeSummary, Page, PageRequest, PodSummary, WorkloadApi};
use crate::error::RemoteError;
use crate::manifest::ResourceKind;

/// Remote operations counted by `InMemoryCluster`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListNodes,
    ListPods,
    CreateDeployment,
    CreateService,
    DeleteDeployment,
    DeleteService,
}

type ObjectKey = (String, String);

#[derive(Debug, Default)]
struct State {
    nodes: Vec<String>,
    /// Pods with the deployment that owns them, if any
    pods: Vec<(PodSummary, Option<ObjectKey>)>,
    deployments: BTreeMap<ObjectKey, DynamicObject>,
    services: BTreeMap<ObjectKey, DynamicObject>,
    calls: HashMap<Operation, usize>,
    max_page: Option<usize>,
    fail_next: Option<RemoteError>,
    generated: u32,
}

/// A control plane held in memory.
///
/// Both capability traits are implemented on the same shared state, so a
/// clone can be handed out as the core handle and another as the workload
/// handle. Deployments do not create pods on their own; call
/// [`InMemoryCluster::reconcile`] to have pods appear for them, the way a
/// controller would some time after creation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<Mutex<State>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_node(&self, name: &str) {
        self.state().nodes.push(name.to_string());
    }

    pub fn add_pod(&self, namespace: &str, name: &str) {
        let pod = PodSummary {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.state().pods.push((pod, None));
    }

    /// Cap every list response at `size` items, as a server chunking results would
    pub fn set_max_page(&self, size: usize) {
        self.state().max_page = Some(size.max(1));
    }

    /// Fail the next remote call, whichever it is, with `err`
    pub fn fail_next(&self, err: RemoteError) {
        self.state().fail_next = Some(err);
    }

    /// Number of calls made for `op`
    pub fn calls(&self, op: Operation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    pub fn has_deployment(&self, namespace: &str, name: &str) -> bool {
        self.state()
            .deployments
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    pub fn has_service(&self, namespace: &str, name: &str) -> bool {
        self.state()
            .services
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Create the pods each deployment asks for (`spec.replicas`, default 1)
    pub fn reconcile(&self) {
        let mut state = self.state();
        let mut wanted = Vec::new();

        for (key, object) in &state.deployments {
            let replicas = object.data["spec"]["replicas"].as_u64().unwrap_or(1);
            for index in 0..replicas {
                let pod = PodSummary {
                    namespace: key.0.clone(),
                    name: pod_name(&key.1, index),
                };
                wanted.push((pod, Some(key.clone())));
            }
        }

        for entry in wanted {
            if !state.pods.iter().any(|(pod, _)| *pod == entry.0) {
                state.pods.push(entry);
            }
        }
    }

    /// Count the call and return the injected failure, if any
    fn begin(&self, op: Operation) -> Result<MutexGuard<'_, State>, RemoteError> {
        let mut state = self.state();
        *state.calls.entry(op).or_insert(0) += 1;
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

fn pod_name(deployment: &str, index: u64) -> String {
    format!("{deployment}-{index:05}")
}

fn paginate<T: Clone>(
    items: &[T],
    page: &PageRequest,
    max_page: Option<usize>,
) -> Result<Page<T>, RemoteError> {
    let start = match &page.continue_token {
        Some(token) => token.parse::<usize>().map_err(|_| {
            RemoteError::from_status(410, "Expired", format!("invalid continue token {token:?}"))
        })?,
        None => 0,
    };

    let mut size = if page.limit == 0 {
        items.len()
    } else {
        page.limit as usize
    };
    if let Some(max) = max_page {
        size = size.min(max);
    }

    let start = start.min(items.len());
    let end = (start + size).min(items.len());

    Ok(Page {
        items: items[start..end].to_vec(),
        continue_token: (end < items.len()).then(|| end.to_string()),
    })
}

/// Store a new object, enforcing the checks the API server applies on create
fn insert(
    store: &mut BTreeMap<ObjectKey, DynamicObject>,
    generated: &mut u32,
    kind: ResourceKind,
    namespace: &str,
    object: &DynamicObject,
) -> Result<DynamicObject, RemoteError> {
    if let Some(own) = object.metadata.namespace.as_deref() {
        if own != namespace {
            return Err(RemoteError::from_status(
                400,
                "BadRequest",
                format!(
                    "the namespace of the provided object ({own}) does not match the namespace sent on the request ({namespace})"
                ),
            ));
        }
    }

    let name = match (&object.metadata.name, &object.metadata.generate_name) {
        (Some(name), _) if !name.is_empty() => name.clone(),
        (_, Some(prefix)) if !prefix.is_empty() => {
            *generated += 1;
            format!("{prefix}{:05x}", *generated)
        }
        _ => {
            return Err(RemoteError::from_status(
                422,
                "Invalid",
                format!("{}: metadata.name: Required value", kind.as_str()),
            ))
        }
    };

    let key = (namespace.to_string(), name.clone());
    if store.contains_key(&key) {
        return Err(RemoteError::already_exists(kind.plural(), &name));
    }

    let mut stored = object.clone();
    stored.metadata.name = Some(name);
    stored.metadata.namespace = Some(namespace.to_string());
    store.insert(key, stored.clone());
    Ok(stored)
}

#[async_trait]
impl CoreApi for InMemoryCluster {
    async fn list_nodes(&self, page: PageRequest) -> Result<Page<NodeSummary>, RemoteError> {
        let state = self.begin(Operation::ListNodes)?;
        let nodes: Vec<NodeSummary> = state
            .nodes
            .iter()
            .map(|name| NodeSummary { name: name.clone() })
            .collect();
        paginate(&nodes, &page, state.max_page)
    }

    async fn list_pods(&self, page: PageRequest) -> Result<Page<PodSummary>, RemoteError> {
        let state = self.begin(Operation::ListPods)?;
        let pods: Vec<PodSummary> = state.pods.iter().map(|(pod, _)| pod.clone()).collect();
        paginate(&pods, &page, state.max_page)
    }

    async fn create_service(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, RemoteError> {
        let mut state = self.begin(Operation::CreateService)?;
        let State {
            services,
            generated,
            ..
        } = &mut *state;
        insert(services, generated, ResourceKind::Service, namespace, object)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<Deletion, RemoteError> {
        let mut state = self.begin(Operation::DeleteService)?;
        state
            .services
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| Deletion::Deleted)
            .ok_or_else(|| RemoteError::not_found(ResourceKind::Service.plural(), name))
    }
}

#[async_trait]
impl WorkloadApi for InMemoryCluster {
    async fn create_deployment(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, RemoteError> {
        let mut state = self.begin(Operation::CreateDeployment)?;
        let State {
            deployments,
            generated,
            ..
        } = &mut *state;
        insert(
            deployments,
            generated,
            ResourceKind::Deployment,
            namespace,
            object,
        )
    }

    async fn delete_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deletion, RemoteError> {
        let mut state = self.begin(Operation::DeleteDeployment)?;
        let key = (namespace.to_string(), name.to_string());
        if state.deployments.remove(&key).is_none() {
            return Err(RemoteError::not_found(
                ResourceKind::Deployment.plural(),
                name,
            ));
        }

        state
            .pods
            .retain(|(_, owner)| owner.as_ref() != Some(&key));
        Ok(Deletion::Deleted)
    }
}
