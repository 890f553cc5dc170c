//! MCP tool server for kubemcp
//!
//! Publishes the Kubernetes tools of the current client generation over
//! stdio or streamable HTTP, and swaps in a rebuilt generation whenever
//! the kubeconfig files change.

pub mod catalog;
mod handler;
mod server;
mod session;
mod supervisor;
pub mod transport;

pub use catalog::{ToolCatalog, text_result};
pub use handler::{KubeMcp, SERVER_NAME};
pub use server::{ServeOptions, ServerState, ToolServer};
pub use session::{Session, SessionPublisher, SessionReceiver};
pub use supervisor::{
    DEFAULT_RELOAD_DEBOUNCE, GenerationFactory, KubeGenerationFactory, ReloadSupervisor,
};
