mod options;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kubemcp_k8s::ConfigResolver;
use kubemcp_server::{KubeGenerationFactory, ToolServer};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use options::{Args, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(args)?;

    // stdout carries the stdio protocol, so logs go to stderr
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(settings.log_color)
        .with_writer(std::io::stderr)
        .init();

    let result = run(settings).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(settings: Settings) -> Result<()> {
    let resolver = ConfigResolver::new(settings.kubeconfig.clone());
    let factory = Arc::new(KubeGenerationFactory::new(resolver));

    let server = ToolServer::start(factory, settings.serve_options())
        .await
        .context("failed to initialize Kubernetes client")?;
    if let Some(endpoint) = server.advertised_endpoint() {
        info!(endpoint = %endpoint, port = settings.port, "MCP endpoint");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    server.serve(cancel).await
}

/// Cancel `token` on Ctrl-C or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                return;
            }
        }
        _ = terminate => {}
    }

    info!("Shutdown requested");
    token.cancel();
}
