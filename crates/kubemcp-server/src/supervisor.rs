//! Reload supervisor: rebuilds the client generation when kubeconfig changes

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kubemcp_k8s::{
    ClientGeneration, ClusterError, ConfigResolver, ReloadEvent, WatchHandle, watch_kubeconfig,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{Session, SessionPublisher};

/// Quiet period after the first change event before rebuilding
pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_millis(200);

const RELOAD_CHANNEL_CAPACITY: usize = 16;

/// Builds a fresh client generation from the current configuration
#[async_trait]
pub trait GenerationFactory: Send + Sync {
    async fn build(&self) -> Result<ClientGeneration, ClusterError>;
}

/// Resolves configuration and connects a live client on every build
pub struct KubeGenerationFactory {
    resolver: ConfigResolver,
}

impl KubeGenerationFactory {
    pub fn new(resolver: ConfigResolver) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl GenerationFactory for KubeGenerationFactory {
    async fn build(&self) -> Result<ClientGeneration, ClusterError> {
        ClientGeneration::connect(&self.resolver).await
    }
}

/// Owns the active watch handle and serializes rebuilds.
///
/// Events are coalesced: after the first event the supervisor waits for
/// the debounce period, drains whatever else queued up, then rebuilds once.
pub struct ReloadSupervisor {
    factory: Arc<dyn GenerationFactory>,
    publisher: SessionPublisher,
    events_tx: mpsc::Sender<ReloadEvent>,
    events_rx: mpsc::Receiver<ReloadEvent>,
    watch: Option<WatchHandle>,
    debounce: Duration,
}

impl ReloadSupervisor {
    pub fn new(
        factory: Arc<dyn GenerationFactory>,
        publisher: SessionPublisher,
        debounce: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(RELOAD_CHANNEL_CAPACITY);
        Self {
            factory,
            publisher,
            events_tx,
            events_rx,
            watch: None,
            debounce,
        }
    }

    /// Sender that triggers a reload, as a file change would
    pub fn trigger(&self) -> mpsc::Sender<ReloadEvent> {
        self.events_tx.clone()
    }

    /// Replace the watch subscriptions with ones for `paths`.
    ///
    /// The previous handle is closed before the new one is opened. A watch
    /// that cannot be established is logged and leaves reloading disabled
    /// until the next successful rebuild.
    pub fn install_watch(&mut self, paths: &[PathBuf]) {
        if let Some(previous) = self.watch.take() {
            previous.close();
        }

        match watch_kubeconfig(paths, self.events_tx.clone()) {
            Ok(handle) => {
                if handle.is_active() {
                    info!(paths = ?handle.paths(), "Watching kubeconfig for changes");
                }
                self.watch = Some(handle);
            }
            Err(e) => warn!(error = %e, "Kubeconfig watch unavailable"),
        }
    }

    /// Process reload events until cancelled, then close the watch
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.events_rx.recv() => {
                    let Some(event) = event else { break };
                    debug!(paths = ?event.paths, "Kubeconfig changed");

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.debounce) => {}
                    }
                    while self.events_rx.try_recv().is_ok() {}

                    if let Err(e) = self.reload().await {
                        warn!(error = %e, "Kubeconfig reload failed, keeping previous configuration");
                    }
                }
            }
        }

        if let Some(watch) = self.watch.take() {
            watch.close();
        }
        debug!("Reload supervisor stopped");
    }

    /// Build and publish a new generation; the current one stays on failure
    async fn reload(&mut self) -> Result<(), ClusterError> {
        let generation = self.factory.build().await?;
        let paths = generation.watch_paths();
        info!(
            generation = generation.id(),
            created_at = %generation.created_at(),
            "Reloaded kubeconfig"
        );

        self.install_watch(&paths);
        self.publisher.send_replace(Session::new(generation));
        Ok(())
    }
}
