/// Context file reading and active-context resolution
use kube::config::Kubeconfig;
use serde::Serialize;
use std::path::Path;

use crate::error::ConfigError;

/// A named context entry from a kubeconfig file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterContext {
    pub name: String,
    /// Name of the cluster entry this context points at, if the context has a body
    pub cluster: Option<String>,
    /// Name of the user (credential) entry, if any
    pub user: Option<String>,
    /// Default namespace for this context
    pub namespace: Option<String>,
    /// Whether this is the file's `current-context`
    pub active: bool,
}

/// Outcome of listing the contexts of a kubeconfig file.
///
/// A file that parses but defines no contexts is reported as `Empty`
/// rather than as an error, so callers can tell it apart from a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextListing {
    Empty,
    Found(Vec<ClusterContext>),
}

impl ContextListing {
    pub fn contexts(&self) -> &[ClusterContext] {
        match self {
            ContextListing::Empty => &[],
            ContextListing::Found(contexts) => contexts,
        }
    }

    pub fn active(&self) -> Option<&ClusterContext> {
        self.contexts().iter().find(|c| c.active)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ContextListing::Empty)
    }
}

/// Read and parse a kubeconfig file.
///
/// Relative credential paths inside the file are resolved against its
/// directory, so the result can be handed straight to [`crate::k8s::connect`].
pub fn read(path: &Path) -> Result<Kubeconfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    if content.trim().is_empty() {
        return Err(ConfigError::Malformed {
            path: path.to_path_buf(),
            message: "file is empty".to_string(),
        });
    }

    Kubeconfig::read_from(path).map_err(|e| ConfigError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Contexts of an already parsed kubeconfig; `path` is only used for errors.
///
/// When at least one context exists, exactly one of them must be the
/// `current-context`.
pub fn contexts(path: &Path, kubeconfig: &Kubeconfig) -> Result<ContextListing, ConfigError> {
    if kubeconfig.contexts.is_empty() {
        return Ok(ContextListing::Empty);
    }

    let current = kubeconfig
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ConfigError::NoActiveContext {
            path: path.to_path_buf(),
        })?;

    if !kubeconfig.contexts.iter().any(|c| c.name == current) {
        return Err(ConfigError::UnknownContext {
            path: path.to_path_buf(),
            name: current.to_string(),
        });
    }

    let contexts = kubeconfig
        .contexts
        .iter()
        .map(|entry| {
            let body = entry.context.as_ref();
            // `user` is a plain string in some kube releases
            let user = body.and_then(|c| Option::<String>::from(c.user.clone()));
            ClusterContext {
                name: entry.name.clone(),
                cluster: body.map(|c| c.cluster.clone()).filter(|c| !c.is_empty()),
                user: user.filter(|u| !u.is_empty()),
                namespace: body.and_then(|c| c.namespace.clone()),
                active: entry.name == current,
            }
        })
        .collect();

    Ok(ContextListing::Found(contexts))
}

/// The `current-context` entry of an already parsed kubeconfig
pub fn current(path: &Path, kubeconfig: &Kubeconfig) -> Result<ClusterContext, ConfigError> {
    match contexts(path, kubeconfig)? {
        ContextListing::Empty => Err(ConfigError::NoContexts {
            path: path.to_path_buf(),
        }),
        ContextListing::Found(contexts) => contexts
            .into_iter()
            .find(|c| c.active)
            .ok_or_else(|| ConfigError::NoActiveContext {
                path: path.to_path_buf(),
            }),
    }
}

/// Read every context defined in a kubeconfig file.
pub fn list_contexts(path: &Path) -> Result<ContextListing, ConfigError> {
    contexts(path, &read(path)?)
}

/// Resolve the context a client should bind to.
pub fn active_context(path: &Path) -> Result<ClusterContext, ConfigError> {
    current(path, &read(path)?)
}
