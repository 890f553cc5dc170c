//! Discovery-backed mapping from kinds to served resources
//!
//! The cache is populated lazily. A kind missing from a cached document
//! triggers one fresh fetch of that group-version before it counts as
//! unknown. A new client generation starts with an empty mapper.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::api::ClusterApi;
use crate::error::{ClusterError, Result};
use crate::types::{ApiResourceEntry, ResolvedResource, ResourceReference};

type GroupVersionKey = (String, String);

/// Memory cache of discovery documents and resolved mappings
#[derive(Default)]
pub struct RestMapper {
    /// Resolved mappings keyed by the caller's reference
    mappings: RwLock<HashMap<ResourceReference, ResolvedResource>>,
    /// Discovery documents keyed by (group, version)
    documents: RwLock<HashMap<GroupVersionKey, Arc<Vec<ApiResourceEntry>>>>,
    /// Preferred version per group, for references without a version
    preferred: RwLock<HashMap<String, String>>,
}

impl RestMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a reference to the resource the cluster serves for it
    pub async fn resolve(
        &self,
        api: &dyn ClusterApi,
        reference: &ResourceReference,
    ) -> Result<ResolvedResource> {
        if let Some(resolved) = self.mappings.read().get(reference) {
            return Ok(resolved.clone());
        }

        let version = self.version_for(api, reference).await?;
        let (mut document, fetched) = self.document(api, &reference.group, &version).await?;
        if !fetched && !serves(&document, &reference.kind) {
            document = self.refresh(api, &reference.group, &version).await?;
        }

        let entry = document
            .iter()
            .find(|entry| entry.kind == reference.kind)
            .ok_or_else(|| ClusterError::ResourceNotFound(reference.to_string()))?;

        let resolved = ResolvedResource {
            group: reference.group.clone(),
            version,
            resource: entry.name.clone(),
            kind: entry.kind.clone(),
            namespaced: entry.namespaced,
        };

        // First insert wins if two callers raced on the same miss
        Ok(self
            .mappings
            .write()
            .entry(reference.clone())
            .or_insert(resolved)
            .clone())
    }

    /// Whether the referenced kind is namespace-scoped.
    ///
    /// A kind missing from its group-version document counts as cluster-scoped.
    pub async fn is_namespaced(
        &self,
        api: &dyn ClusterApi,
        reference: &ResourceReference,
    ) -> Result<bool> {
        let version = self.version_for(api, reference).await?;
        let (document, _) = self.document(api, &reference.group, &version).await?;

        Ok(document
            .iter()
            .find(|entry| entry.kind == reference.kind)
            .map(|entry| entry.namespaced)
            .unwrap_or(false))
    }

    /// Number of group-version documents fetched so far
    pub fn cached_documents(&self) -> usize {
        self.documents.read().len()
    }

    async fn version_for(&self, api: &dyn ClusterApi, reference: &ResourceReference) -> Result<String> {
        if !reference.version.is_empty() {
            return Ok(reference.version.clone());
        }

        if let Some(version) = self.preferred.read().get(&reference.group) {
            return Ok(version.clone());
        }

        let version = api.preferred_version(&reference.group).await?;
        Ok(self
            .preferred
            .write()
            .entry(reference.group.clone())
            .or_insert(version)
            .clone())
    }

    /// Cached document for a group-version, and whether this call fetched it
    async fn document(
        &self,
        api: &dyn ClusterApi,
        group: &str,
        version: &str,
    ) -> Result<(Arc<Vec<ApiResourceEntry>>, bool)> {
        let key = (group.to_string(), version.to_string());
        if let Some(document) = self.documents.read().get(&key) {
            return Ok((Arc::clone(document), false));
        }

        debug!(group, version, "Discovery cache miss");
        let fetched = Arc::new(api.api_resources(group, version).await?);
        Ok((
            Arc::clone(self.documents.write().entry(key).or_insert(fetched)),
            true,
        ))
    }

    /// Fetch a group-version again and replace the cached document
    async fn refresh(
        &self,
        api: &dyn ClusterApi,
        group: &str,
        version: &str,
    ) -> Result<Arc<Vec<ApiResourceEntry>>> {
        debug!(group, version, "Kind not in cached discovery document, refreshing");
        let fetched = Arc::new(api.api_resources(group, version).await?);
        self.documents
            .write()
            .insert((group.to_string(), version.to_string()), Arc::clone(&fetched));
        Ok(fetched)
    }
}

fn serves(document: &[ApiResourceEntry], kind: &str) -> bool {
    document.iter().any(|entry| entry.kind == kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;

    #[tokio::test]
    async fn test_resolve_known_kind() {
        let cluster = FakeCluster::standard();
        let mapper = RestMapper::new();

        let resolved = mapper
            .resolve(&cluster, &ResourceReference::new("apps", "v1", "Deployment"))
            .await
            .unwrap();
        assert_eq!(resolved.resource, "deployments");
        assert!(resolved.namespaced);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_not_found() {
        let cluster = FakeCluster::standard();
        let mapper = RestMapper::new();

        for reference in [
            ResourceReference::new("apps", "v1", "Widget"),
            ResourceReference::new("example.com", "v1", "Deployment"),
            ResourceReference::new("apps", "v9", "Deployment"),
        ] {
            let err = mapper.resolve(&cluster, &reference).await.unwrap_err();
            assert!(
                matches!(err, ClusterError::ResourceNotFound(_)),
                "{} gave {:?}",
                reference,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_discovery_outage_is_distinguished() {
        let cluster = FakeCluster::standard();
        cluster.set_discovery_down(true);
        let mapper = RestMapper::new();

        let err = mapper
            .resolve(&cluster, &ResourceReference::new("apps", "v1", "Deployment"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::DiscoveryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_hits_are_served_from_cache() {
        let cluster = FakeCluster::standard();
        let mapper = RestMapper::new();
        let reference = ResourceReference::new("", "v1", "Namespace");

        mapper.resolve(&cluster, &reference).await.unwrap();
        // Once cached, an outage no longer matters
        cluster.set_discovery_down(true);
        let resolved = mapper.resolve(&cluster, &reference).await.unwrap();
        assert_eq!(resolved.resource, "namespaces");
        assert!(!resolved.namespaced);
        assert_eq!(cluster.discovery_calls(), 1);
    }

    #[tokio::test]
    async fn test_kind_added_after_caching_is_found() {
        let cluster = FakeCluster::standard();
        cluster.serve_kind("example.com", "v1", "widgets", "Widget", true);
        let mapper = RestMapper::new();

        mapper
            .resolve(&cluster, &ResourceReference::new("example.com", "v1", "Widget"))
            .await
            .unwrap();
        assert_eq!(cluster.discovery_calls(), 1);

        cluster.serve_kind("example.com", "v1", "gadgets", "Gadget", false);
        let resolved = mapper
            .resolve(&cluster, &ResourceReference::new("example.com", "v1", "Gadget"))
            .await
            .unwrap();
        assert_eq!(resolved.resource, "gadgets");
        assert!(!resolved.namespaced);
        assert_eq!(cluster.discovery_calls(), 2);
        assert_eq!(mapper.cached_documents(), 1);
    }

    #[tokio::test]
    async fn test_missing_kind_refetches_once() {
        let cluster = FakeCluster::standard();
        let mapper = RestMapper::new();

        mapper
            .resolve(&cluster, &ResourceReference::new("apps", "v1", "Deployment"))
            .await
            .unwrap();
        let err = mapper
            .resolve(&cluster, &ResourceReference::new("apps", "v1", "Widget"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::ResourceNotFound(_)));
        assert_eq!(cluster.discovery_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_version_uses_preferred() {
        let cluster = FakeCluster::standard();
        let mapper = RestMapper::new();

        let resolved = mapper
            .resolve(&cluster, &ResourceReference::new("apps", "", "Deployment"))
            .await
            .unwrap();
        assert_eq!(resolved.version, "v1");
    }

    #[tokio::test]
    async fn test_unknown_kind_treated_as_cluster_scoped() {
        let cluster = FakeCluster::standard();
        let mapper = RestMapper::new();

        let namespaced = mapper
            .is_namespaced(&cluster, &ResourceReference::new("apps", "v1", "Widget"))
            .await
            .unwrap();
        assert!(!namespaced);

        let namespaced = mapper
            .is_namespaced(&cluster, &ResourceReference::new("", "v1", "Pod"))
            .await
            .unwrap();
        assert!(namespaced);
    }
}
