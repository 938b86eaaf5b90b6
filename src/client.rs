//! Cluster client facade
//!
//! Each operation performs one logical request against the control plane
//! (list operations may span several chunked requests) and returns either
//! the server's object or a classified error. Nothing is logged or printed
//! here; reporting is left to the caller.
use kube::api::DynamicObject;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ConfigError, Error, RemoteError, RemoteErrorKind, Result};
use crate::k8s::{
    CoreApi, Deletion, KubeCoreApi, KubeWorkloadApi, NodeSummary, Page, PageRequest, PodSummary,
    WorkloadApi,
};
use crate::kubeconfig::{self, ClusterContext, ContextListing};
use crate::manifest::{Manifest, ResourceKind};

/// Client bound to the active context of one kubeconfig file
#[derive(Clone)]
pub struct ClusterClient {
    core: Arc<dyn CoreApi>,
    workload: Arc<dyn WorkloadApi>,
    context_path: PathBuf,
    context: ClusterContext,
    request_timeout: Duration,
    page_size: u32,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("context_path", &self.context_path)
            .field("context", &self.context.name)
            .field("request_timeout", &self.request_timeout)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl ClusterClient {
    /// Connect using the active context of `context_path` and default settings
    pub async fn new<P: AsRef<Path>>(context_path: P) -> std::result::Result<Self, ConfigError> {
        Self::with_config(context_path, &ClientConfig::default()).await
    }

    /// Connect using the active context of `context_path`
    pub async fn with_config<P: AsRef<Path>>(
        context_path: P,
        config: &ClientConfig,
    ) -> std::result::Result<Self, ConfigError> {
        let path = context_path.as_ref();
        let parsed = kubeconfig::read(path)?;
        let context = kubeconfig::current(path, &parsed)?;
        let client = crate::k8s::connect(parsed, &context.name).await?;

        let core = Arc::new(KubeCoreApi::new(client.clone()));
        let workload = Arc::new(KubeWorkloadApi::new(client));

        Ok(Self::from_handles(core, workload, path, context).configure(config))
    }

    /// Assemble a client from existing capability handles
    pub fn from_handles(
        core: Arc<dyn CoreApi>,
        workload: Arc<dyn WorkloadApi>,
        context_path: impl Into<PathBuf>,
        context: ClusterContext,
    ) -> Self {
        let defaults = ClientConfig::default();
        Self {
            core,
            workload,
            context_path: context_path.into(),
            context,
            request_timeout: Duration::from_secs(defaults.request_timeout_secs),
            page_size: defaults.page_size,
        }
    }

    /// Apply timeout and page size settings
    pub fn configure(mut self, config: &ClientConfig) -> Self {
        self.request_timeout = Duration::from_secs(config.request_timeout_secs);
        self.page_size = config.page_size.max(1);
        self
    }

    /// A client sharing the same handles with a different per-request deadline
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            request_timeout: timeout,
            ..self.clone()
        }
    }

    pub fn active_context(&self) -> &ClusterContext {
        &self.context
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Re-read every context from the kubeconfig file this client was built from
    pub fn list_contexts(&self) -> std::result::Result<ContextListing, ConfigError> {
        kubeconfig::list_contexts(&self.context_path)
    }

    /// All nodes, in server order
    pub async fn list_nodes(&self) -> std::result::Result<Vec<NodeSummary>, RemoteError> {
        self.collect(|page| self.core.list_nodes(page)).await
    }

    /// All pods in all namespaces, in server order
    pub async fn list_pods(&self) -> std::result::Result<Vec<PodSummary>, RemoteError> {
        self.collect(|page| self.core.list_pods(page)).await
    }

    /// Create a deployment from a manifest file
    pub async fn create_deployment<P: AsRef<Path>>(
        &self,
        manifest_path: P,
        namespace: &str,
    ) -> Result<DynamicObject> {
        check_namespace(namespace)?;
        let object = load_manifest(manifest_path.as_ref(), ResourceKind::Deployment)?;
        Ok(self
            .deadline(self.workload.create_deployment(namespace, &object))
            .await?)
    }

    /// Create a service from a manifest file
    pub async fn create_service<P: AsRef<Path>>(
        &self,
        manifest_path: P,
        namespace: &str,
    ) -> Result<DynamicObject> {
        check_namespace(namespace)?;
        let object = load_manifest(manifest_path.as_ref(), ResourceKind::Service)?;
        Ok(self
            .deadline(self.core.create_service(namespace, &object))
            .await?)
    }

    pub async fn delete_deployment(&self, name: &str, namespace: &str) -> Result<Deletion> {
        check_name(name)?;
        check_namespace(namespace)?;
        Ok(self
            .deadline(self.workload.delete_deployment(namespace, name))
            .await?)
    }

    pub async fn delete_service(&self, name: &str, namespace: &str) -> Result<Deletion> {
        check_name(name)?;
        check_namespace(namespace)?;
        Ok(self
            .deadline(self.core.delete_service(namespace, name))
            .await?)
    }

    async fn deadline<T, F>(&self, request: F) -> std::result::Result<T, RemoteError>
    where
        F: Future<Output = std::result::Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::transport(
                RemoteErrorKind::Timeout,
                format!(
                    "request did not complete within {:?}",
                    self.request_timeout
                ),
            )),
        }
    }

    /// Follow continuation tokens until the listing is exhausted.
    ///
    /// A token the server already handed out ends the listing with an error.
    async fn collect<T, F, Fut>(&self, mut fetch: F) -> std::result::Result<Vec<T>, RemoteError>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = std::result::Result<Page<T>, RemoteError>>,
    {
        let mut items = Vec::new();
        let mut continue_token = None;
        let mut seen = HashSet::new();

        loop {
            let page = self
                .deadline(fetch(PageRequest {
                    limit: self.page_size,
                    continue_token: continue_token.take(),
                }))
                .await?;

            items.extend(page.items);

            match page.continue_token {
                Some(token) if !token.is_empty() => {
                    if !seen.insert(token.clone()) {
                        return Err(RemoteError::transport(
                            RemoteErrorKind::Unknown,
                            format!("server repeated continue token {token:?}"),
                        ));
                    }
                    continue_token = Some(token);
                }
                _ => return Ok(items),
            }
        }
    }
}

fn load_manifest(path: &Path, kind: ResourceKind) -> Result<DynamicObject> {
    let manifest = Manifest::from_file(path)?;
    manifest.check(kind)?;
    Ok(manifest.to_object()?)
}

/// DNS-1123 label: lowercase alphanumerics and '-', 63 chars max, alphanumeric at both ends
pub fn is_valid_namespace(namespace: &str) -> bool {
    let bytes = namespace.as_bytes();
    let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes.first().is_some_and(edge_ok)
        && bytes.last().is_some_and(edge_ok)
        && bytes.iter().all(|b| edge_ok(b) || *b == b'-')
}

fn check_namespace(namespace: &str) -> Result<()> {
    if is_valid_namespace(namespace) {
        return Ok(());
    }
    Err(Error::InvalidArgument {
        field: "namespace",
        value: namespace.to_string(),
        reason: "must be a non-empty DNS-1123 label".to_string(),
    })
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument {
            field: "name",
            value: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManifestError;
    use crate::k8s::{InMemoryCluster, Operation};
    use crate::kubeconfig::tests::{write_file, TWO_CONTEXTS};
    use crate::manifest::tests::{DEPLOYMENT, SERVICE};
    use async_trait::async_trait;
    use std::io::Write;

    struct Fixture {
        cluster: InMemoryCluster,
        client: ClusterClient,
        dir: tempfile::TempDir,
        _kubeconfig: tempfile::NamedTempFile,
    }

    impl Fixture {
        fn manifest(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            file.write_all(content.as_bytes()).unwrap();
            path
        }
    }

    fn fixture() -> Fixture {
        fixture_with(TWO_CONTEXTS)
    }

    fn fixture_with(kubeconfig_text: &str) -> Fixture {
        let kubeconfig = write_file(kubeconfig_text);
        let cluster = InMemoryCluster::new();
        let context = ClusterContext {
            name: "staging".to_string(),
            cluster: Some("staging-cluster".to_string()),
            user: Some("admin".to_string()),
            namespace: None,
            active: true,
        };
        let client = ClusterClient::from_handles(
            Arc::new(cluster.clone()),
            Arc::new(cluster.clone()),
            kubeconfig.path(),
            context,
        );

        Fixture {
            cluster,
            client,
            dir: tempfile::tempdir().unwrap(),
            _kubeconfig: kubeconfig,
        }
    }

    #[test]
    fn test_namespace_validation() {
        assert!(is_valid_namespace("default"));
        assert!(is_valid_namespace("team-a1"));
        assert!(is_valid_namespace(&"a".repeat(63)));
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace(&"a".repeat(64)));
        assert!(!is_valid_namespace("-leading"));
        assert!(!is_valid_namespace("trailing-"));
        assert!(!is_valid_namespace("Upper"));
        assert!(!is_valid_namespace("dotted.name"));
    }

    #[test]
    fn test_list_contexts_marks_one_active() {
        let fx = fixture();
        let listing = fx.client.list_contexts().unwrap();
        assert_eq!(listing.contexts().len(), 2);
        assert_eq!(listing.contexts().iter().filter(|c| c.active).count(), 1);
        assert_eq!(fx.client.active_context().name, "staging");
    }

    #[test]
    fn test_list_contexts_empty_is_distinct() {
        let fx = fixture_with("apiVersion: v1\nkind: Config\ncontexts: []\n");
        let listing = fx.client.list_contexts().unwrap();
        assert!(listing.is_empty());
        assert!(listing.active().is_none());
    }

    #[tokio::test]
    async fn test_list_nodes_preserves_order_and_is_repeatable() {
        let fx = fixture();
        for name in ["cp-1", "worker-b", "worker-a"] {
            fx.cluster.add_node(name);
        }

        let first = fx.client.list_nodes().await.unwrap();
        let names: Vec<&str> = first.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["cp-1", "worker-b", "worker-a"]);

        let second = fx.client.list_nodes().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fx.cluster.calls(Operation::ListNodes), 2);
    }

    #[tokio::test]
    async fn test_list_pods_is_repeatable_across_chunks() {
        let fx = fixture();
        fx.cluster.set_max_page(2);
        fx.cluster.add_pod("kube-system", "coredns-0");
        fx.cluster.add_pod("default", "web-1");
        fx.cluster.add_pod("default", "api-0");

        let first = fx.client.list_pods().await.unwrap();
        let second = fx.client.list_pods().await.unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(first[2].name, "api-0");
        assert_eq!(fx.cluster.calls(Operation::ListPods), 4);
    }

    #[tokio::test]
    async fn test_list_pods_follows_continue_tokens() {
        let fx = fixture();
        fx.cluster.set_max_page(2);
        for i in 0..5 {
            let namespace = if i % 2 == 0 { "default" } else { "kube-system" };
            fx.cluster.add_pod(namespace, &format!("pod-{i}"));
        }

        let pods = fx.client.list_pods().await.unwrap();
        assert_eq!(pods.len(), 5);
        assert_eq!(pods[0].name, "pod-0");
        assert_eq!(pods[1].namespace, "kube-system");
        assert_eq!(pods[4].name, "pod-4");
        assert_eq!(fx.cluster.calls(Operation::ListPods), 3);
    }

    #[tokio::test]
    async fn test_page_size_setting_bounds_chunks() {
        let fx = fixture();
        for i in 0..4 {
            fx.cluster.add_node(&format!("node-{i}"));
        }
        let client = fx.client.clone().configure(&ClientConfig {
            page_size: 1,
            ..ClientConfig::default()
        });

        assert_eq!(client.list_nodes().await.unwrap().len(), 4);
        assert_eq!(fx.cluster.calls(Operation::ListNodes), 4);
    }

    #[tokio::test]
    async fn test_empty_cluster_lists_nothing() {
        let fx = fixture();
        assert!(fx.client.list_nodes().await.unwrap().is_empty());
        assert!(fx.client.list_pods().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_manifest_never_reaches_server() {
        let fx = fixture();
        let path = fx.manifest("broken.yaml", "kind: Deployment\nspec: {}\n");

        let err = fx.client.create_deployment(&path, "default").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Manifest(ManifestError::MissingField { .. })
        ));

        let err = fx
            .client
            .create_deployment(fx.dir.path().join("absent.yaml"), "default")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Manifest(ManifestError::Unreadable { .. })));

        let path = fx.manifest("not-yaml.yaml", "key: [unclosed");
        let err = fx.client.create_service(&path, "default").await.unwrap_err();
        assert!(matches!(err, Error::Manifest(ManifestError::Parse { .. })));

        assert_eq!(fx.cluster.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_server() {
        let fx = fixture();
        let path = fx.manifest("deployment.yaml", DEPLOYMENT);

        assert!(matches!(
            fx.client.create_deployment(&path, "").await,
            Err(Error::InvalidArgument { field: "namespace", .. })
        ));
        assert!(matches!(
            fx.client.delete_deployment("", "default").await,
            Err(Error::InvalidArgument { field: "name", .. })
        ));
        assert!(matches!(
            fx.client.delete_service("sample-svc", "Bad_NS").await,
            Err(Error::InvalidArgument { field: "namespace", .. })
        ));
        assert_eq!(fx.cluster.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_conflict() {
        let fx = fixture();
        let deployment = fx.manifest("deployment.yaml", DEPLOYMENT);
        let service = fx.manifest("service.yaml", SERVICE);

        let created = fx.client.create_deployment(&deployment, "default").await.unwrap();
        assert_eq!(created.metadata.name.as_deref(), Some("sample-dep"));
        assert_eq!(created.metadata.namespace.as_deref(), Some("default"));
        let err = fx.client.create_deployment(&deployment, "default").await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Conflict));

        fx.client.create_service(&service, "default").await.unwrap();
        let err = fx.client.create_service(&service, "default").await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Conflict));
        assert!(fx.cluster.has_service("default", "sample-svc"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let fx = fixture();

        let err = fx.client.delete_deployment("ghost", "default").await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::NotFound));

        let err = fx.client.delete_service("ghost", "default").await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_transport_failure_is_returned() {
        let fx = fixture();
        fx.cluster.fail_next(RemoteError::transport(
            RemoteErrorKind::Unreachable,
            "connection refused",
        ));

        let err = fx.client.list_nodes().await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unreachable);
        assert!(fx.client.list_nodes().await.is_ok());
    }

    struct Stalled;

    #[async_trait]
    impl CoreApi for Stalled {
        async fn list_nodes(
            &self,
            _page: PageRequest,
        ) -> std::result::Result<Page<NodeSummary>, RemoteError> {
            std::future::pending().await
        }

        async fn list_pods(
            &self,
            _page: PageRequest,
        ) -> std::result::Result<Page<PodSummary>, RemoteError> {
            std::future::pending().await
        }

        async fn create_service(
            &self,
            _namespace: &str,
            _object: &DynamicObject,
        ) -> std::result::Result<DynamicObject, RemoteError> {
            std::future::pending().await
        }

        async fn delete_service(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> std::result::Result<Deletion, RemoteError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_request_times_out() {
        let fx = fixture();
        let client = ClusterClient::from_handles(
            Arc::new(Stalled),
            Arc::new(fx.cluster.clone()),
            fx.client.context_path.clone(),
            fx.client.active_context().clone(),
        )
        .with_timeout(Duration::from_millis(20));

        let err = client.list_nodes().await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Timeout);

        let err = client.delete_service("web", "default").await.unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::Timeout));
    }

    /// Always answers with one node and the same continue token
    struct Looping;

    #[async_trait]
    impl CoreApi for Looping {
        async fn list_nodes(
            &self,
            _page: PageRequest,
        ) -> std::result::Result<Page<NodeSummary>, RemoteError> {
            Ok(Page {
                items: vec![NodeSummary {
                    name: "node-a".to_string(),
                }],
                continue_token: Some("again".to_string()),
            })
        }

        async fn list_pods(
            &self,
            _page: PageRequest,
        ) -> std::result::Result<Page<PodSummary>, RemoteError> {
            Ok(Page {
                items: Vec::new(),
                continue_token: Some("again".to_string()),
            })
        }

        async fn create_service(
            &self,
            _namespace: &str,
            _object: &DynamicObject,
        ) -> std::result::Result<DynamicObject, RemoteError> {
            Err(RemoteError::transport(RemoteErrorKind::Unknown, "unused"))
        }

        async fn delete_service(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> std::result::Result<Deletion, RemoteError> {
            Err(RemoteError::transport(RemoteErrorKind::Unknown, "unused"))
        }
    }

    #[tokio::test]
    async fn test_repeated_continue_token_ends_listing() {
        let fx = fixture();
        let client = ClusterClient::from_handles(
            Arc::new(Looping),
            Arc::new(fx.cluster.clone()),
            fx.client.context_path.clone(),
            fx.client.active_context().clone(),
        );

        let err = client.list_nodes().await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unknown);
        assert!(err.message.contains("again"));

        let err = client.list_pods().await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unknown);
    }

    #[tokio::test]
    async fn test_deployment_lifecycle() {
        let fx = fixture();
        fx.cluster.add_pod("kube-system", "coredns-0");
        let manifest = fx.manifest("deployment.yaml", DEPLOYMENT);

        fx.client.create_deployment(&manifest, "default").await.unwrap();

        fx.cluster.reconcile();
        let pods = fx.client.list_pods().await.unwrap();
        let names: Vec<&str> = pods.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["coredns-0", "sample-dep-00000", "sample-dep-00001"]
        );

        let deletion = fx
            .client
            .delete_deployment("sample-dep", "default")
            .await
            .unwrap();
        assert!(deletion.is_complete());
        assert!(!fx.cluster.has_deployment("default", "sample-dep"));

        let err = fx
            .client
            .delete_deployment("sample-dep", "default")
            .await
            .unwrap_err();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_new_fails_on_missing_context_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClusterClient::new(dir.path().join("config")).await.unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[tokio::test]
    async fn test_new_fails_without_contexts() {
        let file = write_file("apiVersion: v1\nkind: Config\ncontexts: []\n");
        let err = ClusterClient::new(file.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::NoContexts { .. }));
    }
}
