use std::path::PathBuf;

use thiserror::Error;

/// Failures of the cluster-access layer
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No usable cluster identity: neither in-cluster nor a loadable kubeconfig
    #[error("no usable cluster configuration: {0}")]
    ConfigUnavailable(String),

    /// The discovery endpoints could not be reached
    #[error("discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// No REST mapping exists for the reference
    #[error("no resource found for {0}")]
    ResourceNotFound(String),

    /// A self-authorization check could not be completed
    #[error("authorization check failed: {0}")]
    AuthorizationUnknown(String),

    #[error("failed to serialize output: {0}")]
    SerializationFailure(String),

    /// The API server rejected or failed a request after resolution succeeded
    #[error("api request failed: {0}")]
    Api(String),

    #[error("failed to watch {path}: {message}")]
    Watch { path: PathBuf, message: String },
}

impl From<serde_yaml::Error> for ClusterError {
    fn from(err: serde_yaml::Error) -> Self {
        ClusterError::SerializationFailure(err.to_string())
    }
}

pub type Result<T, E = ClusterError> = std::result::Result<T, E>;
