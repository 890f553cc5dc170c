//! The tool catalog, rebuilt for every client generation

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use kubemcp_k8s::{ClientGeneration, ResourceReference};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub const CONFIGURATION_VIEW: &str = "configuration_view";
pub const NAMESPACE_LIST: &str = "namespace_list";
pub const RESOURCES_LIST: &str = "resources_list";

type ToolHandler = Arc<dyn Fn(JsonObject) -> BoxFuture<'static, CallToolResult> + Send + Sync>;

// ============================================================================
// Tool Arguments
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConfigurationViewArgs {
    #[schemars(
        description = "Return a minified version of the configuration. If set to true, keeps only the current-context and the relevant pieces of the configuration for that context. If set to false, all contexts, clusters, auth-infos, and users are returned in the configuration. (Optional, default true)"
    )]
    #[serde(default)]
    pub minified: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NamespaceListArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResourcesListArgs {
    #[schemars(description = "apiVersion of the resources, e.g. v1 or apps/v1")]
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    #[schemars(description = "kind of the resources, e.g. Pod or Deployment")]
    pub kind: String,

    #[schemars(
        description = "Namespace to list from. When omitted the configured namespace is used if you may list there, otherwise all namespaces"
    )]
    #[serde(default)]
    pub namespace: Option<String>,
}

// ============================================================================
// Catalog
// ============================================================================

/// One published tool and the handler bound to a generation
pub struct ToolEntry {
    tool: Tool,
    handler: ToolHandler,
}

impl ToolEntry {
    /// Build an entry whose arguments deserialize into `A`.
    ///
    /// Arguments that do not deserialize produce an error result without
    /// reaching the handler.
    fn new<A, F, Fut>(name: &'static str, description: &'static str, handler: F) -> Self
    where
        A: DeserializeOwned + JsonSchema,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let schema = schemars::schema_for!(A);
        let input_schema = Arc::new(schema.as_object().cloned().unwrap_or_default());

        let handler: ToolHandler = Arc::new(move |arguments: JsonObject| {
            match serde_json::from_value::<A>(serde_json::Value::Object(arguments)) {
                Ok(args) => handler(args).map(text_result).boxed(),
                Err(e) => {
                    let message = format!("invalid arguments for {}: {}", name, e);
                    futures::future::ready(CallToolResult::error(vec![Content::text(message)]))
                        .boxed()
                }
            }
        });

        Self {
            tool: Tool::new(Cow::Borrowed(name), Cow::Borrowed(description), input_schema),
            handler,
        }
    }

    pub fn tool(&self) -> &Tool {
        &self.tool
    }
}

/// Text result with the error flag set according to the outcome
pub fn text_result(result: Result<String, String>) -> CallToolResult {
    match result {
        Ok(content) => CallToolResult::success(vec![Content::text(content)]),
        Err(message) => CallToolResult::error(vec![Content::text(message)]),
    }
}

/// Ordered tool set whose handlers close over one generation
pub struct ToolCatalog {
    entries: Vec<ToolEntry>,
}

impl ToolCatalog {
    pub fn for_generation(generation: &Arc<ClientGeneration>) -> Self {
        Self {
            entries: vec![
                configuration_view(Arc::clone(generation)),
                namespace_list(Arc::clone(generation)),
                resources_list(Arc::clone(generation)),
            ],
        }
    }

    pub fn tools(&self) -> Vec<Tool> {
        self.entries.iter().map(|e| e.tool.clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.tool.name.as_ref()).collect()
    }

    /// Start a call; `None` when no tool has this name
    pub fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Option<BoxFuture<'static, CallToolResult>> {
        let entry = self.entries.iter().find(|e| e.tool.name == name)?;
        Some((entry.handler)(arguments.unwrap_or_default()))
    }
}

fn configuration_view(generation: Arc<ClientGeneration>) -> ToolEntry {
    ToolEntry::new(
        CONFIGURATION_VIEW,
        "Get the current Kubernetes configuration content as a kubeconfig YAML",
        move |args: ConfigurationViewArgs| {
            let generation = Arc::clone(&generation);
            async move {
                generation
                    .configuration_view(args.minified.unwrap_or(true))
                    .map_err(|e| format!("failed to get configuration: {}", e))
            }
        },
    )
}

fn namespace_list(generation: Arc<ClientGeneration>) -> ToolEntry {
    ToolEntry::new(
        NAMESPACE_LIST,
        "List all the kubernetes namespaces in the current cluster",
        move |_: NamespaceListArgs| {
            let generation = Arc::clone(&generation);
            async move {
                generation
                    .namespaces_list()
                    .await
                    .map_err(|e| format!("failed to list namespaces: {}", e))
            }
        },
    )
}

fn resources_list(generation: Arc<ClientGeneration>) -> ToolEntry {
    ToolEntry::new(
        RESOURCES_LIST,
        "List kubernetes resources of the given apiVersion and kind in the current cluster",
        move |args: ResourcesListArgs| {
            let generation = Arc::clone(&generation);
            async move {
                let reference = ResourceReference::from_api_version(&args.api_version, args.kind);
                generation
                    .resources_list(&reference, args.namespace.as_deref().unwrap_or_default())
                    .await
                    .map_err(|e| format!("failed to list resources: {}", e))
            }
        },
    )
}
