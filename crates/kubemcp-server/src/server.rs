//! Tool server lifecycle

use std::sync::Arc;
use std::time::Duration;

use kubemcp_k8s::{ClusterError, ReloadEvent};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handler::KubeMcp;
use crate::session::{Session, SessionReceiver};
use crate::supervisor::{DEFAULT_RELOAD_DEBOUNCE, GenerationFactory, ReloadSupervisor};
use crate::transport::{self, MCP_PATH};

/// Lifecycle state of a [`ToolServer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Ready,
    Serving,
    Stopped,
}

/// Transport selection and reload tuning
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// 0 serves stdio; anything else serves streamable HTTP on that port
    pub port: u16,
    /// Public URL the HTTP endpoint is reachable under
    pub base_url: Option<String>,
    pub reload_debounce: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            port: 0,
            base_url: None,
            reload_debounce: DEFAULT_RELOAD_DEBOUNCE,
        }
    }
}

impl ServeOptions {
    pub fn is_http(&self) -> bool {
        self.port != 0
    }
}

pub struct ToolServer {
    options: ServeOptions,
    sessions: SessionReceiver,
    state: Arc<RwLock<ServerState>>,
    reload: mpsc::Sender<ReloadEvent>,
    supervisor: Option<JoinHandle<()>>,
    supervisor_cancel: CancellationToken,
}

impl ToolServer {
    /// Build the first generation, publish its catalog and start watching.
    ///
    /// Failing to build the first generation is fatal.
    pub async fn start(
        factory: Arc<dyn GenerationFactory>,
        options: ServeOptions,
    ) -> Result<Self, ClusterError> {
        let state = Arc::new(RwLock::new(ServerState::Uninitialized));

        let generation = factory.build().await?;
        let paths = generation.watch_paths();
        info!(
            generation = generation.id(),
            source = ?generation.descriptor().source,
            "Initial client generation ready"
        );

        let (publisher, sessions) = watch::channel(Session::new(generation));
        let mut supervisor = ReloadSupervisor::new(factory, publisher, options.reload_debounce);
        supervisor.install_watch(&paths);
        let reload = supervisor.trigger();

        let supervisor_cancel = CancellationToken::new();
        let supervisor = tokio::spawn(supervisor.run(supervisor_cancel.clone()));

        *state.write() = ServerState::Ready;
        Ok(Self {
            options,
            sessions,
            state,
            reload,
            supervisor: Some(supervisor),
            supervisor_cancel,
        })
    }

    pub fn state(&self) -> ServerState {
        *self.state.read()
    }

    /// Protocol handler bound to the session channel
    pub fn handler(&self) -> KubeMcp {
        KubeMcp::new(self.sessions.clone())
    }

    /// The currently published session
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.sessions.borrow())
    }

    /// Receiver notified whenever a reload publishes a new session
    pub fn subscribe(&self) -> SessionReceiver {
        self.sessions.clone()
    }

    /// Sender that requests a reload, as a kubeconfig change would
    pub fn reload_trigger(&self) -> mpsc::Sender<ReloadEvent> {
        self.reload.clone()
    }

    /// URL clients should use for the HTTP endpoint; `None` for stdio
    pub fn advertised_endpoint(&self) -> Option<String> {
        if !self.options.is_http() {
            return None;
        }
        let base = match &self.options.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.options.port),
        };
        Some(format!("{}{}", base, MCP_PATH))
    }

    /// Serve the configured transport until it ends or `cancel` fires, then stop
    pub async fn serve(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        *self.state.write() = ServerState::Serving;

        let handler = self.handler();
        let result = match self.advertised_endpoint() {
            Some(endpoint) => {
                transport::serve_http(handler, self.options.port, &endpoint, cancel).await
            }
            None => transport::serve_stdio(handler, cancel).await,
        };

        self.shutdown().await;
        result
    }

    /// Stop the reload supervisor and close its watch. Idempotent.
    pub async fn shutdown(&mut self) {
        self.supervisor_cancel.cancel();
        if let Some(task) = self.supervisor.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Reload supervisor task ended abnormally");
            }
        }
        *self.state.write() = ServerState::Stopped;
        info!("Server stopped");
    }
}
