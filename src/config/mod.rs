/// Configuration management for kubewrap
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tool-level client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Kubeconfig path (KUBECONFIG env var takes precedence)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Deadline for each request to the API server, in seconds
    pub request_timeout_secs: u64,

    /// Maximum items requested per list chunk
    pub page_size: u32,

    /// Namespace used when a command does not name one
    pub namespace: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            request_timeout_secs: 30,
            page_size: 500,
            namespace: "default".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }

        if self.page_size == 0 {
            anyhow::bail!("page_size must be greater than zero");
        }

        if !crate::client::is_valid_namespace(&self.namespace) {
            anyhow::bail!("Invalid namespace: {:?}", self.namespace);
        }

        Ok(())
    }

    /// Resolve the kubeconfig path: explicit override, KUBECONFIG, config file, ~/.kube/config
    pub fn kubeconfig_path(&self, explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        // KUBECONFIG may hold a list; only the first entry is used
        let from_env = std::env::var_os("KUBECONFIG").and_then(|value| {
            std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty())
        });

        from_env
            .or_else(|| self.kubeconfig.clone())
            .or_else(|| {
                std::env::var_os("HOME")
                    .map(|home| PathBuf::from(home).join(".kube").join("config"))
            })
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Kubeconfig not found. Set KUBECONFIG, pass --kubeconfig, or specify kubeconfig in config"
                )
            })
    }

    /// Generate an example configuration file
    pub fn example() -> Self {
        Self {
            kubeconfig: Some(PathBuf::from("/etc/kubernetes/admin.conf")),
            ..Self::default()
        }
    }
}
