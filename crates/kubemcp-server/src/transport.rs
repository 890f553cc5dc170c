//! Transports: stdio and streamable HTTP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rmcp::ServiceExt;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::{StreamableHttpServerConfig, StreamableHttpService};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handler::KubeMcp;

/// Route the streamable HTTP endpoint is mounted under
pub const MCP_PATH: &str = "/mcp";

/// How long open HTTP streams may keep the server alive after shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Serve one client over stdin/stdout until it disconnects or `cancel` fires
pub async fn serve_stdio(handler: KubeMcp, cancel: CancellationToken) -> anyhow::Result<()> {
    info!("Serving MCP over stdio");

    let service = handler
        .serve_with_ct(rmcp::transport::stdio(), cancel)
        .await
        .context("failed to start stdio transport")?;

    let reason = service
        .waiting()
        .await
        .context("stdio transport task failed")?;
    debug!(?reason, "stdio transport stopped");
    Ok(())
}

/// Streamable HTTP router; every client session shares the session channel
pub fn router(handler: KubeMcp, config: StreamableHttpServerConfig) -> axum::Router {
    let service = StreamableHttpService::new(
        move || Ok(handler.clone()),
        Arc::new(LocalSessionManager::default()),
        config,
    );
    axum::Router::new().nest_service(MCP_PATH, service)
}

/// Loopback hosts plus the host of the advertised endpoint are accepted
fn http_config(endpoint: &str, cancel: CancellationToken) -> StreamableHttpServerConfig {
    let mut hosts = vec!["localhost".to_string(), "127.0.0.1".to_string(), "::1".to_string()];
    if let Some(authority) = authority(endpoint) {
        let host = authority.rsplit_once(':').map_or(authority, |(host, _port)| host);
        for name in [host, authority] {
            if !hosts.iter().any(|h| h == name) {
                hosts.push(name.to_string());
            }
        }
    }

    StreamableHttpServerConfig::default()
        .with_allowed_hosts(hosts)
        .with_cancellation_token(cancel)
}

/// `host[:port]` part of an http(s) URL
fn authority(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    (!authority.is_empty()).then_some(authority)
}

/// Serve streamable HTTP on all interfaces until `cancel` fires
pub async fn serve_http(
    handler: KubeMcp,
    port: u16,
    endpoint: &str,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, endpoint = %endpoint, "Serving MCP over streamable HTTP");

    let router = router(handler, http_config(endpoint, cancel.child_token()));
    let shutdown = cancel.clone();
    let server = async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    };
    let deadline = async {
        cancel.cancelled().await;
        tokio::time::sleep(SHUTDOWN_GRACE).await;
    };

    tokio::select! {
        result = server => result.context("HTTP transport failed")?,
        _ = deadline => warn!("HTTP streams still open after shutdown grace period, closing"),
    }
    debug!("HTTP transport stopped");
    Ok(())
}
