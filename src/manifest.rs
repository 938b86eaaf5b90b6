/// Resource manifest loading and minimal structural checks
use kube::api::DynamicObject;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ManifestError;

/// Resource kinds the facade can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Deployment,
    Service,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
        }
    }

    /// Plural resource name used in API paths and messages
    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured resource document parsed from YAML or JSON.
///
/// Only `apiVersion`, `kind` and `metadata.name` (or `metadata.generateName`)
/// are inspected; the rest is passed to the API server untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    path: PathBuf,
    document: Mapping,
}

impl Manifest {
    /// Load a manifest from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Parse manifest text; `path` is only used for error reporting
    pub fn parse<P: AsRef<Path>>(path: P, content: &str) -> Result<Self, ManifestError> {
        let path = path.as_ref().to_path_buf();
        let value: Value = serde_yaml::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.clone(),
            source,
        })?;

        match value {
            Value::Mapping(document) => Ok(Self { path, document }),
            _ => Err(ManifestError::NotAMapping { path }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Mapping {
        &self.document
    }

    pub fn kind(&self) -> Option<&str> {
        self.document.get("kind").and_then(Value::as_str)
    }

    fn metadata(&self) -> Option<&Mapping> {
        self.document.get("metadata").and_then(Value::as_mapping)
    }

    /// `metadata.name`, falling back to `metadata.generateName`
    pub fn name(&self) -> Option<&str> {
        let metadata = self.metadata()?;
        ["name", "generateName"]
            .into_iter()
            .filter_map(|key| metadata.get(key).and_then(Value::as_str))
            .find(|name| !name.is_empty())
    }

    fn missing(&self, field: &'static str) -> ManifestError {
        ManifestError::MissingField {
            path: self.path.clone(),
            field,
        }
    }

    /// Check the keys the facade needs to route and identify the resource
    pub fn check(&self, expected: ResourceKind) -> Result<(), ManifestError> {
        if self.document.get("apiVersion").and_then(Value::as_str).is_none() {
            return Err(self.missing("apiVersion"));
        }

        let kind = self.kind().ok_or_else(|| self.missing("kind"))?;
        if kind != expected.as_str() {
            return Err(ManifestError::WrongKind {
                path: self.path.clone(),
                expected: expected.as_str(),
                found: kind.to_string(),
            });
        }

        if self.metadata().is_none() {
            return Err(self.missing("metadata"));
        }
        if self.name().is_none() {
            return Err(self.missing("metadata.name"));
        }

        Ok(())
    }

    /// Convert into the untyped object submitted to the API server
    pub fn to_object(&self) -> Result<DynamicObject, ManifestError> {
        let encode_err = |e: serde_json::Error| ManifestError::Encode {
            path: self.path.clone(),
            message: e.to_string(),
        };

        let json = serde_json::to_value(&self.document).map_err(encode_err)?;
        serde_json::from_value(json).map_err(encode_err)
    }
}
