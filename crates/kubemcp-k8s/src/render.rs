//! Rendering of configurations and listed objects

use kube::api::DynamicObject;
use kube::config::{
    AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde::Serialize;

use crate::error::{ClusterError, Result};
use crate::types::ConnectionDescriptor;

const SYNTHETIC_CLUSTER: &str = "cluster";
const SYNTHETIC_USER: &str = "user";
const SYNTHETIC_CONTEXT: &str = "context";

/// Clears server bookkeeping before a payload leaves the process
pub trait Redact {
    fn redact(&mut self);
}

impl Redact for DynamicObject {
    fn redact(&mut self) {
        self.metadata.managed_fields = None;
    }
}

impl<T: Redact> Redact for Vec<T> {
    fn redact(&mut self) {
        self.iter_mut().for_each(Redact::redact);
    }
}

impl Redact for Kubeconfig {
    // A kubeconfig never carries server-populated metadata
    fn redact(&mut self) {}
}

/// Redact and serialize to YAML
pub fn marshal<T: Redact + Serialize>(mut value: T) -> Result<String> {
    value.redact();
    Ok(serde_yaml::to_string(&value)?)
}

/// Reduce a configuration to its current context and the entries it references
pub fn minify(config: &Kubeconfig) -> Result<Kubeconfig> {
    let current = config
        .current_context
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ClusterError::SerializationFailure(
                "current-context must exist in order to minify".to_string(),
            )
        })?;

    let context = config
        .contexts
        .iter()
        .find(|c| c.name == current)
        .ok_or_else(|| {
            ClusterError::SerializationFailure(format!("cannot locate context {}", current))
        })?;
    let body = context.context.as_ref();
    let cluster_name = body.map(|c| c.cluster.as_str()).unwrap_or_default();
    let user_name = body.and_then(|c| c.user.as_deref()).unwrap_or_default();

    // An empty reference is left out; only a dangling name is an error
    let clusters = if cluster_name.is_empty() {
        Vec::new()
    } else {
        let cluster = config
            .clusters
            .iter()
            .find(|c| c.name == cluster_name)
            .ok_or_else(|| {
                ClusterError::SerializationFailure(format!("cannot locate cluster {}", cluster_name))
            })?;
        vec![cluster.clone()]
    };
    let auth_infos = if user_name.is_empty() {
        Vec::new()
    } else {
        let user = config
            .auth_infos
            .iter()
            .find(|a| a.name == user_name)
            .ok_or_else(|| {
                ClusterError::SerializationFailure(format!("cannot locate user {}", user_name))
            })?;
        vec![user.clone()]
    };

    Ok(Kubeconfig {
        clusters,
        auth_infos,
        contexts: vec![context.clone()],
        current_context: Some(current.to_string()),
        ..config.clone()
    })
}

/// Single-cluster configuration describing an in-cluster connection
pub fn synthesize_in_cluster(descriptor: &ConnectionDescriptor) -> Kubeconfig {
    Kubeconfig {
        clusters: vec![NamedCluster {
            name: SYNTHETIC_CLUSTER.to_string(),
            cluster: Some(Cluster {
                server: Some(descriptor.host.clone()),
                insecure_skip_tls_verify: Some(descriptor.insecure_skip_tls_verify),
                ..Default::default()
            }),
        }],
        auth_infos: vec![NamedAuthInfo {
            name: SYNTHETIC_USER.to_string(),
            auth_info: Some(AuthInfo {
                token: descriptor
                    .credential
                    .bearer_token()
                    .map(|token| token.to_string().into()),
                ..Default::default()
            }),
        }],
        contexts: vec![NamedContext {
            name: SYNTHETIC_CONTEXT.to_string(),
            context: Some(Context {
                cluster: SYNTHETIC_CLUSTER.to_string(),
                user: Some(SYNTHETIC_USER.to_string()),
                namespace: Some(descriptor.default_namespace.clone()),
                ..Default::default()
            }),
        }],
        current_context: Some(SYNTHETIC_CONTEXT.to_string()),
        ..Default::default()
    }
}

/// Stamp the versioned external schema header
pub fn to_external(mut config: Kubeconfig) -> Kubeconfig {
    config.api_version = Some("v1".to_string());
    config.kind = Some("Config".to_string());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfigSourceKind, Credential};

    const TWO_CONTEXTS: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://dev.example.com
- name: prod-cluster
  cluster:
    server: https://prod.example.com
contexts:
- name: dev
  context:
    cluster: dev-cluster
    user: dev-user
- name: prod
  context:
    cluster: prod-cluster
    user: prod-user
users:
- name: dev-user
  user:
    token: dev-token
- name: prod-user
  user:
    token: prod-token
"#;

    #[test]
    fn test_minify_keeps_only_current_context() {
        let config = Kubeconfig::from_yaml(TWO_CONTEXTS).unwrap();
        let minified = minify(&config).unwrap();

        assert_eq!(minified.contexts.len(), 1);
        assert_eq!(minified.clusters.len(), 1);
        assert_eq!(minified.auth_infos.len(), 1);
        assert_eq!(minified.contexts[0].name, "dev");
        assert_eq!(minified.clusters[0].name, "dev-cluster");
        assert_eq!(minified.auth_infos[0].name, "dev-user");
    }

    #[test]
    fn test_minify_without_current_context_fails() {
        let mut config = Kubeconfig::from_yaml(TWO_CONTEXTS).unwrap();
        config.current_context = None;
        assert!(matches!(
            minify(&config),
            Err(ClusterError::SerializationFailure(_))
        ));
    }

    #[test]
    fn test_minify_dangling_cluster_fails() {
        let mut config = Kubeconfig::from_yaml(TWO_CONTEXTS).unwrap();
        config.clusters.retain(|c| c.name != "dev-cluster");
        assert!(minify(&config).is_err());
    }

    #[test]
    fn test_minify_context_without_user() {
        let config = Kubeconfig::from_yaml(
            r#"
current-context: anon
clusters:
- name: c
  cluster:
    server: https://anon.example.com
contexts:
- name: anon
  context:
    cluster: c
users: []
"#,
        )
        .unwrap();

        let minified = minify(&config).unwrap();
        assert_eq!(minified.contexts.len(), 1);
        assert_eq!(minified.clusters.len(), 1);
        assert!(minified.auth_infos.is_empty());
    }

    #[test]
    fn test_minify_dangling_user_fails() {
        let mut config = Kubeconfig::from_yaml(TWO_CONTEXTS).unwrap();
        config.auth_infos.retain(|a| a.name != "dev-user");
        assert!(matches!(
            minify(&config),
            Err(ClusterError::SerializationFailure(_))
        ));
    }

    #[test]
    fn test_synthesized_config_minifies_cleanly() {
        let descriptor = ConnectionDescriptor {
            host: "https://kubernetes.default.svc".to_string(),
            credential: Credential::BearerToken("sa-token".to_string()),
            insecure_skip_tls_verify: false,
            default_namespace: "monitoring".to_string(),
            user_agent: "test".to_string(),
            source: ConfigSourceKind::InCluster,
        };

        let config = synthesize_in_cluster(&descriptor);
        let minified = minify(&config).unwrap();
        assert_eq!(minified.contexts.len(), 1);

        let text = marshal(to_external(minified)).unwrap();
        assert!(text.contains("https://kubernetes.default.svc"));
        assert!(text.contains("current-context: context"));
    }

    #[test]
    fn test_marshal_strips_managed_fields() {
        let object: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": "default",
                "managedFields": [{"manager": "kube-apiserver", "operation": "Update"}],
            },
        }))
        .unwrap();

        let text = marshal(vec![object]).unwrap();
        assert!(text.contains("name: default"));
        assert!(!text.contains("managedFields"));
    }
}
