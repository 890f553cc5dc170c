//! Kubernetes cluster access for kubemcp
//!
//! This crate resolves cluster configuration, maps kinds to served
//! resources through a discovery cache, lists resources with
//! authorization-aware namespace defaulting, renders kubeconfigs, and
//! watches the kubeconfig files for changes.

mod api;
mod config;
mod discovery;
mod error;
mod generation;
pub mod render;
mod watcher;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{ClusterApi, KubeApi};
pub use config::{ConfigResolver, ConfigSource, DEFAULT_USER_AGENT, InClusterProbe, ResolvedConfig};
pub use discovery::RestMapper;
pub use error::{ClusterError, Result};
pub use generation::ClientGeneration;
pub use watcher::{ReloadEvent, WatchHandle, watch_kubeconfig};

// Re-export types that are used in our public API
pub use kubemcp_types as types;
pub use kubemcp_types::{
    AccessCheck, ApiResourceEntry, ConfigSourceKind, ConnectionDescriptor, Credential,
    ResolvedResource, ResourceReference,
};
