//! The published pairing of a client generation and its tool catalog

use std::sync::Arc;

use kubemcp_k8s::ClientGeneration;
use tokio::sync::watch;

use crate::catalog::ToolCatalog;

/// What an in-flight call holds on to.
///
/// A call that started against one session finishes against it even if a
/// reload publishes a newer one meanwhile.
pub struct Session {
    generation: Arc<ClientGeneration>,
    catalog: ToolCatalog,
}

impl Session {
    pub fn new(generation: ClientGeneration) -> Arc<Self> {
        let generation = Arc::new(generation);
        let catalog = ToolCatalog::for_generation(&generation);
        Arc::new(Self {
            generation,
            catalog,
        })
    }

    pub fn generation(&self) -> &Arc<ClientGeneration> {
        &self.generation
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation.id())
            .field("tools", &self.catalog.names())
            .finish()
    }
}

/// Sending half; the reload supervisor owns it
pub type SessionPublisher = watch::Sender<Arc<Session>>;

/// Receiving half; cloned into every protocol handler
pub type SessionReceiver = watch::Receiver<Arc<Session>>;
