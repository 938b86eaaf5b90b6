/// kubewrap - one-line Kubernetes operations from the command line
///
/// Each subcommand is a single call on `ClusterClient`; outcome reporting
/// (logging, exit codes) lives here rather than in the library.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kubewrap::utils::PollingConfig;
use kubewrap::{ClientConfig, ClusterClient, ContextListing, Deletion, Error};

#[derive(Parser)]
#[command(name = "kubewrap")]
#[command(
    about = "Thin Kubernetes client: list nodes and pods, create and delete deployments and services",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "kubewrap.yaml")]
    config: PathBuf,

    /// Kubeconfig file (overrides KUBECONFIG and the config file)
    #[arg(short, long)]
    kubeconfig: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List contexts in the kubeconfig file
    Contexts,

    /// List cluster nodes
    Nodes,

    /// List pods in all namespaces
    Pods,

    /// Create a deployment from a manifest file
    CreateDeployment {
        manifest: PathBuf,
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Create a service from a manifest file
    CreateService {
        manifest: PathBuf,
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Delete a deployment by name
    DeleteDeployment {
        name: String,
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Delete a service by name
    DeleteService {
        name: String,
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Generate example configuration file
    Init,

    /// Exercise every operation once against the current cluster
    Smoke {
        /// Deployment manifest
        #[arg(long, default_value = "deployment.yaml")]
        deployment: PathBuf,

        /// Service manifest
        #[arg(long, default_value = "service.yaml")]
        service: PathBuf,

        #[arg(short, long)]
        namespace: Option<String>,

        /// Seconds to wait for the deployment's pods to show up
        #[arg(long, default_value_t = 120)]
        wait_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("kubewrap={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(&cli).await {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    if let Commands::Init = cli.command {
        return init_config(cli).await;
    }

    let config =
        ClientConfig::load_or_default(&cli.config).context("Failed to load configuration")?;
    let kubeconfig = config.kubeconfig_path(cli.kubeconfig.as_deref())?;
    let client = connect(&kubeconfig, &config).await?;
    let namespace =
        |ns: &Option<String>| ns.clone().unwrap_or_else(|| config.namespace.clone());

    match &cli.command {
        Commands::Contexts => show_contexts(&client),
        Commands::Nodes => show_nodes(&client).await,
        Commands::Pods => show_pods(&client).await,
        Commands::CreateDeployment {
            manifest,
            namespace: ns,
        } => create_deployment(&client, manifest, &namespace(ns))
            .await
            .map(|_| ()),
        Commands::CreateService {
            manifest,
            namespace: ns,
        } => create_service(&client, manifest, &namespace(ns)).await.map(|_| ()),
        Commands::DeleteDeployment {
            name,
            namespace: ns,
        } => delete_deployment(&client, name, &namespace(ns)).await,
        Commands::DeleteService {
            name,
            namespace: ns,
        } => delete_service(&client, name, &namespace(ns)).await,
        Commands::Smoke {
            deployment,
            service,
            namespace: ns,
            wait_secs,
        } => smoke(&client, deployment, service, &namespace(ns), *wait_secs).await,
        Commands::Init => Ok(()),
    }
}

async fn connect(kubeconfig: &Path, config: &ClientConfig) -> Result<ClusterClient> {
    let client = ClusterClient::with_config(kubeconfig, config)
        .await
        .with_context(|| format!("Failed to load kubeconfig {}", kubeconfig.display()))?;

    let context = client.active_context();
    info!(
        "Using context {} (cluster {})",
        context.name,
        context.cluster.as_deref().unwrap_or("-")
    );
    Ok(client)
}

/// Tag a failed operation with its name and remote classification.
///
/// Failures are logged once, by `main`.
fn report<T>(operation: &str, result: kubewrap::Result<T>) -> Result<T> {
    result.map_err(|e| {
        let summary = match &e {
            Error::Remote(remote) => format!(
                "{} failed ({}, status {})",
                operation,
                remote.kind,
                remote
                    .status
                    .map_or_else(|| "none".to_string(), |s| s.to_string())
            ),
            _ => format!("{} failed", operation),
        };
        anyhow::Error::new(e).context(summary)
    })
}

fn show_contexts(client: &ClusterClient) -> Result<()> {
    match report("list contexts", client.list_contexts().map_err(Error::from))? {
        ContextListing::Empty => warn!("Cannot find any context in the kubeconfig file"),
        ContextListing::Found(contexts) => {
            info!("Contexts:");
            for ctx in contexts {
                let marker = if ctx.active { "*" } else { " " };
                info!(
                    "  {} {} (cluster: {}, user: {}, namespace: {})",
                    marker,
                    ctx.name,
                    ctx.cluster.as_deref().unwrap_or("-"),
                    ctx.user.as_deref().unwrap_or("-"),
                    ctx.namespace.as_deref().unwrap_or("default")
                );
            }
        }
    }
    Ok(())
}

async fn show_nodes(client: &ClusterClient) -> Result<()> {
    let nodes = report("list nodes", client.list_nodes().await.map_err(Error::from))?;
    info!("Nodes ({}):", nodes.len());
    for node in nodes {
        info!("  - {}", node.name);
    }
    Ok(())
}

async fn show_pods(client: &ClusterClient) -> Result<()> {
    let pods = report("list pods", client.list_pods().await.map_err(Error::from))?;
    info!("Pods ({}):", pods.len());
    for pod in pods {
        info!("  - {}/{}", pod.namespace, pod.name);
    }
    Ok(())
}

async fn create_deployment(
    client: &ClusterClient,
    manifest: &Path,
    namespace: &str,
) -> Result<String> {
    let created = report(
        "create deployment",
        client.create_deployment(manifest, namespace).await,
    )?;
    let name = created.metadata.name.unwrap_or_default();
    info!("✓ Deployment {} created in {}", name, namespace);
    Ok(name)
}

async fn create_service(
    client: &ClusterClient,
    manifest: &Path,
    namespace: &str,
) -> Result<String> {
    let created = report(
        "create service",
        client.create_service(manifest, namespace).await,
    )?;
    let name = created.metadata.name.unwrap_or_default();
    info!("✓ Service {} created in {}", name, namespace);
    Ok(name)
}

fn log_deletion(kind: &str, name: &str, deletion: &Deletion) {
    match deletion {
        Deletion::Deleted => info!("✓ {} {} deleted", kind, name),
        Deletion::InProgress(_) => info!("{} {} is being deleted", kind, name),
    }
}

async fn delete_deployment(client: &ClusterClient, name: &str, namespace: &str) -> Result<()> {
    let deletion = report(
        "delete deployment",
        client.delete_deployment(name, namespace).await,
    )?;
    log_deletion("Deployment", name, &deletion);
    Ok(())
}

async fn delete_service(client: &ClusterClient, name: &str, namespace: &str) -> Result<()> {
    let deletion = report(
        "delete service",
        client.delete_service(name, namespace).await,
    )?;
    log_deletion("Service", name, &deletion);
    Ok(())
}

/// Run every operation once, cleaning up what was created
async fn smoke(
    client: &ClusterClient,
    deployment: &Path,
    service: &Path,
    namespace: &str,
    wait_secs: u64,
) -> Result<()> {
    show_contexts(client)?;
    show_nodes(client).await?;
    show_pods(client).await?;

    let deployment_name = create_deployment(client, deployment, namespace).await?;
    let service_name = match create_service(client, service, namespace).await {
        Ok(name) => name,
        Err(e) => {
            delete_deployment(client, &deployment_name, namespace).await?;
            return Err(e);
        }
    };

    let pod_prefix = format!("{}-", deployment_name);
    let prefix = pod_prefix.as_str();
    let waiter = PollingConfig::new(
        Duration::from_secs(wait_secs),
        Duration::from_secs(2),
        format!("Waiting for pods of deployment {}", deployment_name),
    );
    let waited = waiter
        .poll(|| async move {
            let pods = client.list_pods().await?;
            let ours: Vec<String> = pods
                .into_iter()
                .filter(|p| p.namespace == namespace && p.name.starts_with(prefix))
                .map(|p| p.name)
                .collect();
            Ok((!ours.is_empty()).then_some(ours))
        })
        .await;

    if let Ok(pods) = &waited {
        info!("Deployment pods: {}", pods.join(", "));
    }

    let (deployment_result, service_result) = futures::future::join(
        delete_deployment(client, &deployment_name, namespace),
        delete_service(client, &service_name, namespace),
    )
    .await;
    deployment_result?;
    service_result?;

    waited.map(|_| ())
}

/// Initialize example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = ClientConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Point kubeconfig at your cluster's context file");
    info!("  2. List the cluster nodes:");
    info!("     kubewrap nodes");

    Ok(())
}
