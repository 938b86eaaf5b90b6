/// kube-backed capability handles
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod, Service};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use tracing::debug;

use super::api::{CoreApi, Deletion, NodeSummary, Page, PageRequest, PodSummary, WorkloadApi};
use crate::error::{ConfigError, RemoteError};

/// Build a kube client bound to one context of a parsed kubeconfig
pub async fn connect(kubeconfig: Kubeconfig, context: &str) -> Result<Client, ConfigError> {
    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };

    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|e| ConfigError::Client {
            context: context.to_string(),
            message: e.to_string(),
        })?;

    debug!("Using API server {} for context {}", config.cluster_url, context);

    Client::try_from(config).map_err(|e| ConfigError::Client {
        context: context.to_string(),
        message: e.to_string(),
    })
}

fn list_params(page: &PageRequest) -> ListParams {
    let mut params = ListParams::default().limit(page.limit);
    if let Some(token) = &page.continue_token {
        params = params.continue_token(token);
    }
    params
}

fn next_token(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

/// Core resource handle (nodes, pods, services)
#[derive(Clone)]
pub struct KubeCoreApi {
    client: Client,
    services: ApiResource,
}

impl KubeCoreApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            services: ApiResource::erase::<Service>(&()),
        }
    }
}

#[async_trait]
impl CoreApi for KubeCoreApi {
    async fn list_nodes(&self, page: PageRequest) -> Result<Page<NodeSummary>, RemoteError> {
        debug!("LIST nodes (limit {})", page.limit);
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list_metadata(&list_params(&page)).await?;

        Ok(Page {
            items: list
                .items
                .iter()
                .map(|node| NodeSummary {
                    name: node.name_any(),
                })
                .collect(),
            continue_token: next_token(list.metadata.continue_),
        })
    }

    async fn list_pods(&self, page: PageRequest) -> Result<Page<PodSummary>, RemoteError> {
        debug!("LIST pods in all namespaces (limit {})", page.limit);
        let api: Api<Pod> = Api::all(self.client.clone());
        let list = api.list_metadata(&list_params(&page)).await?;

        Ok(Page {
            items: list
                .items
                .iter()
                .map(|pod| PodSummary {
                    namespace: pod.namespace().unwrap_or_default(),
                    name: pod.name_any(),
                })
                .collect(),
            continue_token: next_token(list.metadata.continue_),
        })
    }

    async fn create_service(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, RemoteError> {
        debug!("CREATE services in {}", namespace);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.services);
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<Deletion, RemoteError> {
        debug!("DELETE services/{} in {}", name, namespace);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.services);
        let result = api.delete(name, &DeleteParams::default()).await?;
        Ok(result.either(Deletion::InProgress, |_status| Deletion::Deleted))
    }
}

/// Workload resource handle (deployments)
#[derive(Clone)]
pub struct KubeWorkloadApi {
    client: Client,
    deployments: ApiResource,
}

impl KubeWorkloadApi {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            deployments: ApiResource::erase::<Deployment>(&()),
        }
    }
}

#[async_trait]
impl WorkloadApi for KubeWorkloadApi {
    async fn create_deployment(
        &self,
        namespace: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, RemoteError> {
        debug!("CREATE deployments in {}", namespace);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.deployments);
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn delete_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Deletion, RemoteError> {
        debug!("DELETE deployments/{} in {}", name, namespace);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.deployments);
        let result = api.delete(name, &DeleteParams::default()).await?;
        Ok(result.either(Deletion::InProgress, |_status| Deletion::Deleted))
    }
}
