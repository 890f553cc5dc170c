use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kubemcp_k8s::testing::FakeCluster;
use kubemcp_k8s::{ClientGeneration, ClusterError, ConfigResolver, ReloadEvent};
use kubemcp_server::catalog::CONFIGURATION_VIEW;
use kubemcp_server::{GenerationFactory, ServeOptions, ServerState, ToolServer};
use tokio_util::sync::CancellationToken;

fn kubeconfig(namespace: &str) -> String {
    format!(
        r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
- name: dev-cluster
  cluster:
    server: https://dev.example.com
contexts:
- name: dev
  context:
    cluster: dev-cluster
    user: dev-user
    namespace: {namespace}
users:
- name: dev-user
  user:
    token: dev-token
"#
    )
}

/// Resolves a real kubeconfig file but talks to a fake cluster
struct FileFactory {
    resolver: ConfigResolver,
    cluster: Arc<FakeCluster>,
    builds: AtomicUsize,
}

impl FileFactory {
    fn new(path: &Path) -> Arc<Self> {
        Arc::new(Self {
            resolver: ConfigResolver::new(Some(path.to_path_buf())),
            cluster: Arc::new(FakeCluster::standard()),
            builds: AtomicUsize::new(0),
        })
    }

    fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationFactory for FileFactory {
    async fn build(&self) -> Result<ClientGeneration, ClusterError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let resolved = self.resolver.resolve().await?;
        Ok(ClientGeneration::new(resolved, self.cluster.clone()))
    }
}

fn write_config(dir: &tempfile::TempDir, namespace: &str) -> PathBuf {
    let path = dir.path().join("config");
    std::fs::write(&path, kubeconfig(namespace)).unwrap();
    path
}

fn options() -> ServeOptions {
    ServeOptions {
        reload_debounce: Duration::from_millis(50),
        ..Default::default()
    }
}

async fn wait_for_namespace(server: &ToolServer, namespace: &str) {
    let mut sessions = server.subscribe();
    tokio::time::timeout(Duration::from_secs(10), async {
        while sessions.borrow().generation().configured_namespace() != namespace {
            sessions.changed().await.unwrap();
        }
    })
    .await
    .expect("generation was not swapped in time");
}

async fn wait_for_builds(factory: &FileFactory, builds: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while factory.builds() < builds {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("rebuild did not happen in time");
}

#[tokio::test]
async fn test_start_fails_without_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let factory = FileFactory::new(&dir.path().join("missing"));

    let result = ToolServer::start(factory, options()).await;
    assert!(matches!(result, Err(ClusterError::ConfigUnavailable(_))));
}

#[tokio::test]
async fn test_start_publishes_first_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "alpha");
    let factory = FileFactory::new(&path);

    let server = ToolServer::start(factory.clone(), options()).await.unwrap();
    assert_eq!(server.state(), ServerState::Ready);
    assert_eq!(server.session().generation().configured_namespace(), "alpha");
    assert_eq!(factory.builds(), 1);
    assert_eq!(server.advertised_endpoint(), None);
}

#[tokio::test]
async fn test_burst_of_events_rebuilds_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "alpha");
    let factory = FileFactory::new(&path);
    let server = ToolServer::start(factory.clone(), options()).await.unwrap();
    let first = server.session().generation().id();

    let trigger = server.reload_trigger();
    for _ in 0..3 {
        trigger
            .try_send(ReloadEvent {
                paths: vec![path.clone()],
            })
            .unwrap();
    }

    wait_for_builds(&factory, 2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(factory.builds(), 2);
    assert!(server.session().generation().id() > first);
}

#[tokio::test]
async fn test_back_to_back_writes_rebuild_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "alpha");
    let factory = FileFactory::new(&path);
    let options = ServeOptions {
        reload_debounce: Duration::from_millis(300),
        ..Default::default()
    };
    let server = ToolServer::start(factory.clone(), options).await.unwrap();

    for namespace in ["beta", "gamma", "delta"] {
        std::fs::write(&path, kubeconfig(namespace)).unwrap();
    }

    wait_for_namespace(&server, "delta").await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(factory.builds(), 2);
    assert_eq!(server.session().generation().configured_namespace(), "delta");
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "alpha");
    let factory = FileFactory::new(&path);
    let server = ToolServer::start(factory.clone(), options()).await.unwrap();
    let before = server.session().generation().id();

    std::fs::write(&path, "clusters: [not, a, kubeconfig").unwrap();
    server
        .reload_trigger()
        .send(ReloadEvent {
            paths: vec![path.clone()],
        })
        .await
        .unwrap();

    wait_for_builds(&factory, 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let session = server.session();
    assert_eq!(session.generation().id(), before);
    assert_eq!(session.generation().configured_namespace(), "alpha");
}

#[tokio::test]
async fn test_file_change_swaps_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "alpha");
    let server = ToolServer::start(FileFactory::new(&path), options())
        .await
        .unwrap();

    let stale = server.session();
    std::fs::write(&path, kubeconfig("beta")).unwrap();
    wait_for_namespace(&server, "beta").await;

    let fresh = server.session();
    let view = fresh
        .catalog()
        .call(CONFIGURATION_VIEW, None)
        .unwrap()
        .await;
    let text = serde_json::to_value(&view.content).unwrap()[0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(text.contains("namespace: beta"));

    // A session taken before the swap still answers from its own generation
    assert_eq!(stale.generation().configured_namespace(), "alpha");
}

#[tokio::test]
async fn test_serve_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "alpha");
    let options = ServeOptions {
        port: free_port(),
        base_url: Some("https://mcp.example.com/".to_string()),
        ..options()
    };
    let server = ToolServer::start(FileFactory::new(&path), options)
        .await
        .unwrap();
    assert_eq!(
        server.advertised_endpoint().as_deref(),
        Some("https://mcp.example.com/mcp")
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn(server.serve(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "alpha");
    let mut server = ToolServer::start(FileFactory::new(&path), options())
        .await
        .unwrap();

    server.shutdown().await;
    server.shutdown().await;
    assert_eq!(server.state(), ServerState::Stopped);
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
