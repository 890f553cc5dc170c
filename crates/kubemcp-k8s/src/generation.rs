//! One consistent snapshot of connection, discovery cache and API handles

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use kube::api::DynamicObject;
use tracing::{debug, info};

use crate::api::{ClusterApi, KubeApi};
use crate::config::{ConfigResolver, ConfigSource, ResolvedConfig};
use crate::discovery::RestMapper;
use crate::error::{ClusterError, Result};
use crate::render;
use crate::types::{AccessCheck, ConnectionDescriptor, ResolvedResource, ResourceReference};

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// A complete client generation.
///
/// Immutable once built apart from lazy population of the discovery cache.
/// Reloading builds a new generation instead of touching a live one.
pub struct ClientGeneration {
    id: u64,
    created_at: DateTime<Utc>,
    descriptor: ConnectionDescriptor,
    source: ConfigSource,
    mapper: RestMapper,
    api: Arc<dyn ClusterApi>,
}

impl ClientGeneration {
    /// Assemble a generation over an existing API handle
    pub fn new(resolved: ResolvedConfig, api: Arc<dyn ClusterApi>) -> Self {
        Self {
            id: NEXT_GENERATION.fetch_add(1, Ordering::SeqCst),
            created_at: Utc::now(),
            descriptor: resolved.descriptor,
            source: resolved.source,
            mapper: RestMapper::new(),
            api,
        }
    }

    /// Resolve the configuration and connect a live client
    pub async fn connect(resolver: &ConfigResolver) -> Result<Self> {
        let resolved = resolver.resolve().await?;
        let client = kube::Client::try_from(resolved.client_config.clone())
            .map_err(|e| ClusterError::ConfigUnavailable(e.to_string()))?;

        let generation = Self::new(resolved, Arc::new(KubeApi::new(client)));
        info!(
            generation = generation.id,
            host = %generation.descriptor.host,
            namespace = %generation.descriptor.default_namespace,
            "Built client generation"
        );
        Ok(generation)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    pub fn watch_paths(&self) -> Vec<PathBuf> {
        self.source.watch_paths().to_vec()
    }

    /// Namespace of the active context
    pub fn configured_namespace(&self) -> &str {
        &self.descriptor.default_namespace
    }

    pub async fn resolve(&self, reference: &ResourceReference) -> Result<ResolvedResource> {
        self.mapper.resolve(self.api.as_ref(), reference).await
    }

    pub async fn is_namespaced(&self, reference: &ResourceReference) -> Result<bool> {
        self.mapper.is_namespaced(self.api.as_ref(), reference).await
    }

    /// List instances, defaulting the namespace when the caller may list there.
    ///
    /// An empty namespace on a namespaced kind becomes the configured namespace
    /// only if a self-check allows listing in it; otherwise it stays empty.
    pub async fn list(
        &self,
        reference: &ResourceReference,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>> {
        let resolved = self.resolve(reference).await?;
        let namespaced = self.is_namespaced(reference).await.unwrap_or(false);

        let mut namespace = namespace.to_string();
        if namespaced && namespace.is_empty() {
            let configured = self.configured_namespace();
            if self.can_list_in(&resolved, configured).await {
                namespace = configured.to_string();
            }
        }

        debug!(resource = %resolved.resource, namespace = %namespace, "Listing resources");
        self.api.list(&resolved, &namespace).await
    }

    /// Listing rendered as YAML
    pub async fn resources_list(
        &self,
        reference: &ResourceReference,
        namespace: &str,
    ) -> Result<String> {
        let items = self.list(reference, namespace).await?;
        render::marshal(items)
    }

    pub async fn namespaces_list(&self) -> Result<String> {
        self.resources_list(&ResourceReference::new("", "v1", "Namespace"), "")
            .await
    }

    /// Render the active configuration, synthesized when running in-cluster
    pub fn configuration_view(&self, minify: bool) -> Result<String> {
        let config = match &self.source {
            ConfigSource::InCluster => render::synthesize_in_cluster(&self.descriptor),
            ConfigSource::Kubeconfig { kubeconfig, .. } => kubeconfig.clone(),
        };
        let config = if minify {
            render::minify(&config)?
        } else {
            config
        };
        render::marshal(render::to_external(config))
    }

    async fn can_list_in(&self, resource: &ResolvedResource, namespace: &str) -> bool {
        match self
            .api
            .review_access(&AccessCheck::new(resource, namespace, "list"))
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                debug!(error = %e, "Access review failed, assuming not authorized");
                false
            }
        }
    }
}

impl std::fmt::Debug for ClientGeneration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientGeneration")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
