use std::sync::Arc;

use kubemcp_k8s::testing::FakeCluster;
use kubemcp_k8s::types::{ConfigSourceKind, ConnectionDescriptor, Credential};
use kubemcp_k8s::{ClientGeneration, ConfigSource, ResolvedConfig};
use kubemcp_server::catalog::{CONFIGURATION_VIEW, NAMESPACE_LIST, RESOURCES_LIST};
use kubemcp_server::{KubeMcp, Session};
use rmcp::model::{CallToolRequestParams, ErrorCode};
use rmcp::service::RunningService;
use rmcp::{RoleClient, ServiceError, ServiceExt};
use tokio::sync::watch;

fn handler(cluster: Arc<FakeCluster>) -> (watch::Sender<Arc<Session>>, KubeMcp) {
    let resolved = ResolvedConfig {
        descriptor: ConnectionDescriptor {
            host: "https://kubernetes.default.svc".to_string(),
            credential: Credential::BearerToken("sa-token".to_string()),
            insecure_skip_tls_verify: false,
            default_namespace: "default".to_string(),
            user_agent: "test".to_string(),
            source: ConfigSourceKind::InCluster,
        },
        client_config: kube::Config::new("https://kubernetes.default.svc".parse().unwrap()),
        source: ConfigSource::InCluster,
    };
    let (publisher, sessions) = watch::channel(Session::new(ClientGeneration::new(resolved, cluster)));
    (publisher, KubeMcp::new(sessions))
}

/// Connect a client to `handler` over an in-memory pipe
async fn connect(handler: KubeMcp) -> RunningService<RoleClient, ()> {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        if let Ok(service) = handler.serve(server_io).await {
            let _ = service.waiting().await;
        }
    });
    ().serve(client_io).await.unwrap()
}

#[tokio::test]
async fn test_list_tools_over_protocol() {
    let (_publisher, handler) = handler(Arc::new(FakeCluster::standard()));
    let client = connect(handler).await;

    let names: Vec<String> = client
        .list_all_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|tool| tool.name.to_string())
        .collect();
    assert_eq!(names, vec![CONFIGURATION_VIEW, NAMESPACE_LIST, RESOURCES_LIST]);

    client.cancel().await.unwrap();
}

#[tokio::test]
async fn test_unknown_tool_is_invalid_params() {
    let (_publisher, handler) = handler(Arc::new(FakeCluster::standard()));
    let client = connect(handler).await;

    let err = client
        .call_tool(CallToolRequestParams::new("pods_delete"))
        .await
        .unwrap_err();
    match err {
        ServiceError::McpError(data) => {
            assert_eq!(data.code, ErrorCode::INVALID_PARAMS);
            assert!(data.message.contains("pods_delete"));
        }
        other => panic!("expected a protocol error, got {:?}", other),
    }

    client.cancel().await.unwrap();
}

#[tokio::test]
async fn test_tool_failure_is_a_result_not_a_protocol_error() {
    let cluster = Arc::new(FakeCluster::standard());
    cluster.set_discovery_down(true);
    let (_publisher, handler) = handler(cluster);
    let client = connect(handler).await;

    let result = client
        .call_tool(CallToolRequestParams::new(NAMESPACE_LIST))
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(true));

    let malformed = serde_json::json!({"minified": 3});
    let result = client
        .call_tool(
            CallToolRequestParams::new(CONFIGURATION_VIEW)
                .with_arguments(malformed.as_object().cloned().unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(true));

    client.cancel().await.unwrap();
}
