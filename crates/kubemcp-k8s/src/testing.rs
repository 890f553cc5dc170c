//! In-memory [`ClusterApi`] for tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use kube::api::DynamicObject;
use parking_lot::Mutex;
use serde_json::json;

use crate::api::ClusterApi;
use crate::error::{ClusterError, Result};
use crate::types::{AccessCheck, ApiResourceEntry, ResolvedResource};

/// A scripted cluster: discovery documents, objects, and access grants
#[derive(Default)]
pub struct FakeCluster {
    documents: Mutex<HashMap<(String, String), Vec<ApiResourceEntry>>>,
    preferred: HashMap<String, String>,
    objects: Mutex<Vec<(String, DynamicObject)>>,
    /// (namespace, resource) pairs the caller may list
    grants: Mutex<HashSet<(String, String)>>,
    discovery_down: AtomicBool,
    review_broken: AtomicBool,
    discovery_calls: AtomicUsize,
    listed_namespaces: Mutex<Vec<String>>,
}

fn entry(name: &str, kind: &str, namespaced: bool) -> ApiResourceEntry {
    ApiResourceEntry {
        name: name.to_string(),
        kind: kind.to_string(),
        namespaced,
        verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
    }
}

impl FakeCluster {
    /// Core v1 (namespaces, pods, nodes) and apps/v1 (deployments)
    pub fn standard() -> Self {
        let mut documents = HashMap::new();
        documents.insert(
            (String::new(), "v1".to_string()),
            vec![
                entry("namespaces", "Namespace", false),
                entry("pods", "Pod", true),
                entry("nodes", "Node", false),
            ],
        );
        documents.insert(
            ("apps".to_string(), "v1".to_string()),
            vec![entry("deployments", "Deployment", true)],
        );

        let mut preferred = HashMap::new();
        preferred.insert(String::new(), "v1".to_string());
        preferred.insert("apps".to_string(), "v1".to_string());

        Self {
            documents: Mutex::new(documents),
            preferred,
            ..Default::default()
        }
    }

    /// Add an object of `resource`; `namespace` may be empty for cluster-scoped kinds
    pub fn add_object(&self, resource: &str, api_version: &str, kind: &str, name: &str, namespace: &str) {
        let mut metadata = json!({
            "name": name,
            "resourceVersion": "1",
            "managedFields": [{
                "manager": "kubectl-client-side-apply",
                "operation": "Update",
                "apiVersion": api_version,
            }],
        });
        if !namespace.is_empty() {
            metadata["namespace"] = json!(namespace);
        }

        let object: DynamicObject = serde_json::from_value(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": metadata,
        }))
        .expect("valid object");

        self.objects.lock().push((resource.to_string(), object));
    }

    /// Serve an extra kind, as installing a CRD would
    pub fn serve_kind(&self, group: &str, version: &str, resource: &str, kind: &str, namespaced: bool) {
        self.documents
            .lock()
            .entry((group.to_string(), version.to_string()))
            .or_default()
            .push(entry(resource, kind, namespaced));
    }

    /// Let the caller list `resource` in `namespace`
    pub fn grant(&self, namespace: &str, resource: &str) {
        self.grants
            .lock()
            .insert((namespace.to_string(), resource.to_string()));
    }

    pub fn set_discovery_down(&self, down: bool) {
        self.discovery_down.store(down, Ordering::SeqCst);
    }

    /// Make every access review fail instead of answering
    pub fn set_review_broken(&self, broken: bool) {
        self.review_broken.store(broken, Ordering::SeqCst);
    }

    pub fn discovery_calls(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    /// Namespaces passed to `list`, in call order
    pub fn listed_namespaces(&self) -> Vec<String> {
        self.listed_namespaces.lock().clone()
    }

    fn check_discovery(&self) -> Result<()> {
        if self.discovery_down.load(Ordering::SeqCst) {
            return Err(ClusterError::DiscoveryUnavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn api_resources(&self, group: &str, version: &str) -> Result<Vec<ApiResourceEntry>> {
        self.check_discovery()?;
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .get(&(group.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::ResourceNotFound(format!("{}/{}", group, version)))
    }

    async fn preferred_version(&self, group: &str) -> Result<String> {
        self.check_discovery()?;
        self.preferred
            .get(group)
            .cloned()
            .ok_or_else(|| ClusterError::ResourceNotFound(format!("api group {}", group)))
    }

    async fn list(&self, resource: &ResolvedResource, namespace: &str) -> Result<Vec<DynamicObject>> {
        self.listed_namespaces.lock().push(namespace.to_string());
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|(r, _)| *r == resource.resource)
            .filter(|(_, o)| namespace.is_empty() || o.metadata.namespace.as_deref() == Some(namespace))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn review_access(&self, check: &AccessCheck) -> Result<bool> {
        if self.review_broken.load(Ordering::SeqCst) {
            return Err(ClusterError::AuthorizationUnknown("forbidden".to_string()));
        }
        Ok(check.verb == "list"
            && self
                .grants
                .lock()
                .contains(&(check.namespace.clone(), check.resource.clone())))
    }
}
