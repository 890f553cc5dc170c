//! Resolve a cluster connection from a kubeconfig or the in-cluster identity

use std::path::PathBuf;
use std::sync::Arc;

use http::HeaderValue;
use http::header::USER_AGENT;
use kube::config::{AuthInfo, KubeConfigOptions, Kubeconfig};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::error::{ClusterError, Result};
use crate::types::{ConfigSourceKind, ConnectionDescriptor, Credential};

/// User agent sent when the configuration does not set one
pub const DEFAULT_USER_AGENT: &str = concat!("kubemcp/", env!("CARGO_PKG_VERSION"));

/// Probe for an in-cluster service account identity
pub type InClusterProbe = Arc<dyn Fn() -> Option<kube::Config> + Send + Sync>;

/// Where the active configuration was loaded from
#[derive(Clone, Debug)]
pub enum ConfigSource {
    InCluster,
    Kubeconfig {
        /// The merged raw configuration, as loaded
        kubeconfig: Kubeconfig,
        /// Files consulted, in precedence order
        paths: Vec<PathBuf>,
    },
}

impl ConfigSource {
    pub fn kind(&self) -> ConfigSourceKind {
        match self {
            ConfigSource::InCluster => ConfigSourceKind::InCluster,
            ConfigSource::Kubeconfig { .. } => ConfigSourceKind::Kubeconfig,
        }
    }

    /// Files a watcher should follow; empty in pure in-cluster mode
    pub fn watch_paths(&self) -> &[PathBuf] {
        match self {
            ConfigSource::InCluster => &[],
            ConfigSource::Kubeconfig { paths, .. } => paths,
        }
    }
}

/// Output of [`ConfigResolver::resolve`]
#[derive(Clone)]
pub struct ResolvedConfig {
    pub descriptor: ConnectionDescriptor,
    pub client_config: kube::Config,
    pub source: ConfigSource,
}

/// Loads connection settings following kubectl's precedence rules
#[derive(Clone)]
pub struct ConfigResolver {
    explicit_path: Option<PathBuf>,
    in_cluster: InClusterProbe,
}

impl ConfigResolver {
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        Self {
            explicit_path,
            in_cluster: Arc::new(|| kube::Config::incluster_dns().ok()),
        }
    }

    /// Replace the in-cluster probe
    pub fn with_in_cluster_probe(
        mut self,
        probe: impl Fn() -> Option<kube::Config> + Send + Sync + 'static,
    ) -> Self {
        self.in_cluster = Arc::new(probe);
        self
    }

    /// Kubeconfig files in the order they are consulted
    pub fn loading_precedence(&self) -> Vec<PathBuf> {
        if let Some(path) = &self.explicit_path {
            return vec![path.clone()];
        }

        if let Some(value) = std::env::var_os("KUBECONFIG") {
            let paths: Vec<PathBuf> = std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            if !paths.is_empty() {
                return paths;
            }
        }

        dirs::home_dir()
            .map(|home| vec![home.join(".kube").join("config")])
            .unwrap_or_default()
    }

    /// Resolve the connection for a new client generation
    pub async fn resolve(&self) -> Result<ResolvedConfig> {
        // An explicit kubeconfig is authoritative
        if self.explicit_path.is_none() {
            if let Some(config) = (self.in_cluster)() {
                info!(host = %config.cluster_url, "Using in-cluster configuration");
                return Ok(finish(config, ConfigSource::InCluster));
            }
        }

        let paths = self.loading_precedence();
        let kubeconfig = load_kubeconfig(&paths, self.explicit_path.is_some())?;
        let config =
            kube::Config::from_custom_kubeconfig(kubeconfig.clone(), &KubeConfigOptions::default())
                .await
                .map_err(|e| ClusterError::ConfigUnavailable(e.to_string()))?;

        info!(
            host = %config.cluster_url,
            context = kubeconfig.current_context.as_deref().unwrap_or_default(),
            "Loaded kubeconfig"
        );
        Ok(finish(config, ConfigSource::Kubeconfig { kubeconfig, paths }))
    }
}

/// Read and merge kubeconfig files; missing files are skipped unless explicit
fn load_kubeconfig(paths: &[PathBuf], explicit: bool) -> Result<Kubeconfig> {
    let mut merged: Option<Kubeconfig> = None;

    for path in paths {
        if !explicit && !path.exists() {
            debug!(path = %path.display(), "Skipping missing kubeconfig");
            continue;
        }

        let next = Kubeconfig::read_from(path).map_err(|e| {
            ClusterError::ConfigUnavailable(format!("{}: {}", path.display(), e))
        })?;

        merged = Some(match merged {
            None => next,
            Some(current) => current
                .merge(next)
                .map_err(|e| ClusterError::ConfigUnavailable(e.to_string()))?,
        });
    }

    merged.ok_or_else(|| {
        ClusterError::ConfigUnavailable(
            "not running in a cluster and no kubeconfig file found".to_string(),
        )
    })
}

fn finish(mut config: kube::Config, source: ConfigSource) -> ResolvedConfig {
    let user_agent = match config.headers.iter().find(|(name, _)| *name == USER_AGENT) {
        Some((_, value)) => value.to_str().unwrap_or(DEFAULT_USER_AGENT).to_string(),
        None => {
            config
                .headers
                .push((USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT)));
            DEFAULT_USER_AGENT.to_string()
        }
    };

    let descriptor = ConnectionDescriptor {
        host: config.cluster_url.to_string().trim_end_matches('/').to_string(),
        credential: credential_from(&config.auth_info),
        insecure_skip_tls_verify: config.accept_invalid_certs,
        default_namespace: config.default_namespace.clone(),
        user_agent,
        source: source.kind(),
    };

    ResolvedConfig {
        descriptor,
        client_config: config,
        source,
    }
}

fn credential_from(auth: &AuthInfo) -> Credential {
    if let Some(token) = &auth.token {
        return Credential::BearerToken(token.expose_secret().to_string());
    }

    // In-cluster identities reference the projected token file
    if let Some(file) = &auth.token_file {
        if let Ok(token) = std::fs::read_to_string(file) {
            return Credential::BearerToken(token.trim().to_string());
        }
    }

    if let Some(certificate) = auth
        .client_certificate_data
        .clone()
        .or_else(|| auth.client_certificate.clone())
    {
        let key = auth
            .client_key_data
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .or_else(|| auth.client_key.clone());
        return Credential::ClientCertificate { certificate, key };
    }

    if let Some(command) = auth.exec.as_ref().and_then(|e| e.command.clone()) {
        return Credential::Exec { command };
    }

    Credential::None
}
