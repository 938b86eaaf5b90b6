/// Error taxonomy for cluster client operations
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for facade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure a `ClusterClient` operation can return.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("invalid {field} {value:?}: {reason}")]
    InvalidArgument {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl Error {
    /// Remote failure kind, if this error came from the control plane.
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Error::Remote(err) => Some(err.kind),
            _ => None,
        }
    }
}

/// Context file could not be used.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read context file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed context file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("context file {path} defines no contexts")]
    NoContexts { path: PathBuf },

    #[error("context file {path} has no current-context set")]
    NoActiveContext { path: PathBuf },

    #[error("current-context {name:?} is not defined in {path}")]
    UnknownContext { path: PathBuf, name: String },

    #[error("cannot build client for context {context:?}: {message}")]
    Client { context: String, message: String },
}

/// Manifest file could not be turned into a submittable document.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("manifest {path} is not a mapping document")]
    NotAMapping { path: PathBuf },

    #[error("manifest {path} is missing required field `{field}`")]
    MissingField { path: PathBuf, field: &'static str },

    #[error("manifest {path} has kind {found:?}, expected {expected:?}")]
    WrongKind {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    #[error("manifest {path} cannot be encoded as an API object: {message}")]
    Encode { path: PathBuf, message: String },
}

/// Classified remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    NotFound,
    Conflict,
    InvalidSpec,
    Unauthorized,
    Unreachable,
    Timeout,
    Unknown,
}

impl RemoteErrorKind {
    /// Map an HTTP status code returned by the API server.
    pub fn from_status(code: u16) -> Self {
        match code {
            404 => RemoteErrorKind::NotFound,
            409 => RemoteErrorKind::Conflict,
            400 | 422 => RemoteErrorKind::InvalidSpec,
            401 | 403 => RemoteErrorKind::Unauthorized,
            408 | 504 => RemoteErrorKind::Timeout,
            502 | 503 => RemoteErrorKind::Unreachable,
            _ => RemoteErrorKind::Unknown,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::NotFound => write!(f, "not found"),
            RemoteErrorKind::Conflict => write!(f, "conflict"),
            RemoteErrorKind::InvalidSpec => write!(f, "invalid spec"),
            RemoteErrorKind::Unauthorized => write!(f, "unauthorized"),
            RemoteErrorKind::Unreachable => write!(f, "unreachable"),
            RemoteErrorKind::Timeout => write!(f, "timeout"),
            RemoteErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// The control plane rejected or failed to service a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote error ({kind}): {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    /// HTTP status, when the server answered at all.
    pub status: Option<u16>,
    /// Machine-readable reason, e.g. `AlreadyExists`.
    pub reason: String,
    pub message: String,
}

impl RemoteError {
    /// Build an error from a server status response.
    pub fn from_status(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::from_status(code),
            status: Some(code),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Build an error that never reached (or never heard back from) the server.
    pub fn transport(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            reason: String::new(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, name: &str) -> Self {
        Self::from_status(404, "NotFound", format!("{resource} \"{name}\" not found"))
    }

    pub fn already_exists(resource: &str, name: &str) -> Self {
        Self::from_status(
            409,
            "AlreadyExists",
            format!("{resource} \"{name}\" already exists"),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == RemoteErrorKind::Conflict
    }
}

impl From<kube::Error> for RemoteError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => {
                RemoteError::from_status(resp.code, resp.reason, resp.message)
            }
            kube::Error::HyperError(e) => {
                RemoteError::transport(RemoteErrorKind::Unreachable, e.to_string())
            }
            kube::Error::Service(e) => {
                RemoteError::transport(RemoteErrorKind::Unreachable, e.to_string())
            }
            kube::Error::Auth(e) => {
                RemoteError::transport(RemoteErrorKind::Unauthorized, e.to_string())
            }
            other => RemoteError::transport(RemoteErrorKind::Unknown, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(RemoteErrorKind::from_status(404), RemoteErrorKind::NotFound);
        assert_eq!(RemoteErrorKind::from_status(409), RemoteErrorKind::Conflict);
        assert_eq!(RemoteErrorKind::from_status(422), RemoteErrorKind::InvalidSpec);
        assert_eq!(RemoteErrorKind::from_status(400), RemoteErrorKind::InvalidSpec);
        assert_eq!(RemoteErrorKind::from_status(403), RemoteErrorKind::Unauthorized);
        assert_eq!(RemoteErrorKind::from_status(504), RemoteErrorKind::Timeout);
        assert_eq!(RemoteErrorKind::from_status(503), RemoteErrorKind::Unreachable);
        assert_eq!(RemoteErrorKind::from_status(500), RemoteErrorKind::Unknown);
    }

    #[test]
    fn test_kube_api_error_keeps_server_details() {
        let body = serde_json::json!({
            "status": "Failure",
            "message": "deployments.apps \"web\" already exists",
            "reason": "AlreadyExists",
            "code": 409,
        });
        let err = kube::Error::Api(serde_json::from_value(body).unwrap());

        let remote = RemoteError::from(err);
        assert!(remote.is_conflict());
        assert_eq!(remote.status, Some(409));
        assert_eq!(remote.reason, "AlreadyExists");
        assert!(remote.message.contains("already exists"));
    }

    #[test]
    fn test_remote_kind_on_umbrella_error() {
        let err: Error = RemoteError::not_found("deployments", "web").into();
        assert_eq!(err.remote_kind(), Some(RemoteErrorKind::NotFound));

        let err = Error::InvalidArgument {
            field: "namespace",
            value: String::new(),
            reason: "must not be empty".to_string(),
        };
        assert_eq!(err.remote_kind(), None);
    }
}
