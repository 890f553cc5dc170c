//! Shared types for kubemcp
//!
//! This crate contains data structures used across the cluster-access and
//! tool-server crates.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Resource Types
// ============================================================================

/// Caller-supplied reference to a resource type, independent of its plural name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    pub group: String,
    /// Empty means "whatever the server prefers for this group"
    pub version: String,
    pub kind: String,
}

impl ResourceReference {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Build a reference from an `apiVersion` string (`apps/v1`, or `v1` for core)
    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", api_version),
        };
        Self::new(group, version, kind)
    }

    /// The `group/version` string, `version` alone for the core group
    pub fn group_version(&self) -> String {
        group_version(&self.group, &self.version)
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}.{}", self.kind, self.group)
        } else {
            write!(f, "{}/{}", self.group_version(), self.kind)
        }
    }
}

/// A resource type as the cluster serves it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedResource {
    pub group: String,
    pub version: String,
    /// Plural resource name, e.g. `deployments`
    pub resource: String,
    pub kind: String,
    pub namespaced: bool,
}

impl ResolvedResource {
    pub fn group_version(&self) -> String {
        group_version(&self.group, &self.version)
    }
}

/// One entry of a group-version discovery document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResourceEntry {
    /// Plural resource name
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

/// Attributes for a self-authorization check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessCheck {
    pub namespace: String,
    pub verb: String,
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl AccessCheck {
    pub fn new(resource: &ResolvedResource, namespace: &str, verb: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            verb: verb.to_string(),
            group: resource.group.clone(),
            version: resource.version.clone(),
            resource: resource.resource.clone(),
        }
    }
}

fn group_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    }
}

// ============================================================================
// Connection Types
// ============================================================================

/// Where the active connection came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSourceKind {
    /// Service account mounted into the pod
    InCluster,
    /// One or more kubeconfig files on disk
    Kubeconfig,
}

/// Credential material for the API server
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    BearerToken(String),
    ClientCertificate {
        certificate: String,
        key: Option<String>,
    },
    Exec {
        command: String,
    },
    None,
}

impl Credential {
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Credential::BearerToken(token) => Some(token),
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
            Credential::ClientCertificate { .. } => f.write_str("ClientCertificate(<redacted>)"),
            Credential::Exec { command } => f.debug_struct("Exec").field("command", command).finish(),
            Credential::None => f.write_str("None"),
        }
    }
}

/// Everything needed to talk to one cluster, fixed for a client generation
#[derive(Clone, Debug)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub credential: Credential,
    pub insecure_skip_tls_verify: bool,
    pub default_namespace: String,
    pub user_agent: String,
    pub source: ConfigSourceKind,
}

impl ConnectionDescriptor {
    pub fn is_in_cluster(&self) -> bool {
        self.source == ConfigSourceKind::InCluster
    }
}
