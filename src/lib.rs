//! kubewrap - a thin, typed facade over the Kubernetes API
//!
//! Opens a kubeconfig file, binds to its active context and exposes one call
//! per operation: list contexts, list nodes, list pods, and create/delete
//! deployments and services from manifest files.
pub mod client;
pub mod config;
pub mod error;
pub mod k8s;
pub mod kubeconfig;
pub mod manifest;
pub mod utils;

pub use client::ClusterClient;
pub use config::ClientConfig;
pub use error::{ConfigError, Error, ManifestError, RemoteError, RemoteErrorKind, Result};
pub use k8s::{Deletion, InMemoryCluster, NodeSummary, PodSummary};
pub use kubeconfig::{ClusterContext, ContextListing};
pub use manifest::{Manifest, ResourceKind};
