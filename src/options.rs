//! Command line and config file options

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use kubemcp_server::{DEFAULT_RELOAD_DEBOUNCE, ServeOptions};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_LEVEL: &str = "info";

/// kubemcp - A Model Context Protocol server for Kubernetes
#[derive(Parser, Debug)]
#[command(name = "kubemcp")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the kubeconfig file (defaults to KUBECONFIG, then ~/.kube/config)
    #[arg(long, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Serve streamable HTTP on this port instead of stdio (0 means stdio)
    #[arg(long, visible_alias = "sse-port", value_name = "PORT")]
    pub port: Option<u16>,

    /// Public base URL the HTTP endpoint is advertised under
    #[arg(long, visible_alias = "sse-base-url", value_name = "URL")]
    pub base_url: Option<String>,

    /// TOML config file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level or filter directive, overridden by RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Colour log output
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub log_color: Option<bool>,
}

/// Contents of the optional TOML config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub kubeconfig: Option<PathBuf>,
    pub port: Option<u16>,
    pub base_url: Option<String>,
    pub log: LogConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: Option<String>,
    pub color: Option<bool>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Effective settings after merging the file and the command line
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub kubeconfig: Option<PathBuf>,
    pub port: u16,
    pub base_url: Option<String>,
    pub log_level: String,
    pub log_color: bool,
}

impl Settings {
    pub fn load(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: Args, file: FileConfig) -> Result<Self> {
        let settings = Self {
            kubeconfig: args.kubeconfig.or(file.kubeconfig),
            port: args.port.or(file.port).unwrap_or(0),
            base_url: args.base_url.or(file.base_url),
            log_level: args
                .log_level
                .or(file.log.level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_color: args.log_color.or(file.log.color).unwrap_or(false),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("base URL must start with http:// or https://, got {}", url);
            }
        }
        EnvFilter::try_new(&self.log_level)
            .with_context(|| format!("invalid log level {}", self.log_level))?;
        Ok(())
    }

    pub fn serve_options(&self) -> ServeOptions {
        ServeOptions {
            port: self.port,
            base_url: self.base_url.clone(),
            reload_debounce: DEFAULT_RELOAD_DEBOUNCE,
        }
    }
}
