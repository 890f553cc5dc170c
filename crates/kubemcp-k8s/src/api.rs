//! The slice of the Kubernetes API the core depends on

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::Api;
use kube::api::{DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;

use crate::error::{ClusterError, Result};
use crate::types::{AccessCheck, ApiResourceEntry, ResolvedResource};

/// Cluster capabilities called through a fixed contract.
///
/// Everything the core knows about discovery, listing and authorization goes
/// through here, so a generation can be assembled over a fake in tests.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Discovery document for one group-version, subresources excluded
    async fn api_resources(&self, group: &str, version: &str) -> Result<Vec<ApiResourceEntry>>;

    /// Server-preferred version of a group
    async fn preferred_version(&self, group: &str) -> Result<String>;

    /// List instances; an empty namespace lists across all namespaces
    async fn list(&self, resource: &ResolvedResource, namespace: &str)
    -> Result<Vec<DynamicObject>>;

    /// Ask whether the caller's own identity may perform the check
    async fn review_access(&self, check: &AccessCheck) -> Result<bool>;
}

/// [`ClusterApi`] backed by a live `kube::Client`
#[derive(Clone)]
pub struct KubeApi {
    client: kube::Client,
}

impl KubeApi {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

/// Map a discovery failure: a 404 means the group-version does not exist
fn discovery_error(err: kube::Error, what: &str) -> ClusterError {
    match err {
        kube::Error::Api(response) if response.code == 404 => {
            ClusterError::ResourceNotFound(what.to_string())
        }
        other => ClusterError::DiscoveryUnavailable(format!("{}: {}", what, other)),
    }
}

#[async_trait]
impl ClusterApi for KubeApi {
    async fn api_resources(&self, group: &str, version: &str) -> Result<Vec<ApiResourceEntry>> {
        let list = if group.is_empty() {
            self.client.list_core_api_resources(version).await
        } else {
            self.client
                .list_api_group_resources(&format!("{}/{}", group, version))
                .await
        };
        let list = list.map_err(|e| discovery_error(e, &format!("{}/{}", group, version)))?;

        Ok(list
            .resources
            .into_iter()
            .filter(|r| !r.name.contains('/'))
            .map(|r| ApiResourceEntry {
                name: r.name,
                kind: r.kind,
                namespaced: r.namespaced,
                verbs: r.verbs,
            })
            .collect())
    }

    async fn preferred_version(&self, group: &str) -> Result<String> {
        if group.is_empty() {
            let versions = self
                .client
                .list_core_api_versions()
                .await
                .map_err(|e| discovery_error(e, "core api"))?;
            return versions
                .versions
                .into_iter()
                .next()
                .ok_or_else(|| ClusterError::ResourceNotFound("core api versions".to_string()));
        }

        let groups = self
            .client
            .list_api_groups()
            .await
            .map_err(|e| discovery_error(e, "api groups"))?;
        groups
            .groups
            .into_iter()
            .find(|g| g.name == group)
            .and_then(|g| {
                g.preferred_version
                    .map(|v| v.version)
                    .or_else(|| g.versions.into_iter().next().map(|v| v.version))
            })
            .ok_or_else(|| ClusterError::ResourceNotFound(format!("api group {}", group)))
    }

    async fn list(
        &self,
        resource: &ResolvedResource,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>> {
        let api_resource = ApiResource {
            group: resource.group.clone(),
            version: resource.version.clone(),
            api_version: resource.group_version(),
            kind: resource.kind.clone(),
            plural: resource.resource.clone(),
        };

        let api: Api<DynamicObject> = if resource.namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.client.clone(), namespace, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        };

        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::Api(e.to_string()))?;
        Ok(list.items)
    }

    async fn review_access(&self, check: &AccessCheck) -> Result<bool> {
        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    namespace: Some(check.namespace.clone()),
                    verb: Some(check.verb.clone()),
                    group: Some(check.group.clone()),
                    version: Some(check.version.clone()),
                    resource: Some(check.resource.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());
        let response = api
            .create(&PostParams::default(), &review)
            .await
            .map_err(|e| ClusterError::AuthorizationUnknown(e.to_string()))?;

        Ok(response.status.map(|s| s.allowed).unwrap_or(false))
    }
}
