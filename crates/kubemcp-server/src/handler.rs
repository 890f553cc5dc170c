//! MCP protocol handler

use std::future::Future;
use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use tracing::debug;

use crate::session::{Session, SessionReceiver};

pub const SERVER_NAME: &str = "kubemcp";

const INSTRUCTIONS: &str = "Kubernetes tools for the cluster selected by the active kubeconfig \
context or the in-cluster service account. Use configuration_view to see the active \
configuration, namespace_list to see namespaces, and resources_list to list any kind.";

/// Dispatches tool calls to whichever session is current when the call arrives
#[derive(Clone)]
pub struct KubeMcp {
    sessions: SessionReceiver,
}

impl KubeMcp {
    pub fn new(sessions: SessionReceiver) -> Self {
        Self { sessions }
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.sessions.borrow())
    }
}

impl ServerHandler for KubeMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(INSTRUCTIONS)
            .with_server_info(Implementation::new(SERVER_NAME, env!("CARGO_PKG_VERSION")))
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let session = self.session();
        async move { Ok(ListToolsResult::with_all_items(session.catalog().tools())) }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let session = self.session();
        async move {
            debug!(
                tool = %request.name,
                generation = session.generation().id(),
                "Tool call"
            );
            let Some(call) = session.catalog().call(&request.name, request.arguments) else {
                return Err(McpError::invalid_params(
                    format!("unknown tool: {}", request.name),
                    None,
                ));
            };
            Ok(call.await)
        }
    }
}
