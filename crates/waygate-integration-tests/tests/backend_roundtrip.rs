//! Supervisor + router round trips against a real child process.

use waygate_core::ServerId;
use waygate_mcp::{BackendConfig, BackendState, BackendSupervisor, RequestRouter};

fn fake_backend() -> BackendConfig {
    init_logs();
    BackendConfig::new(env!("CARGO_BIN_EXE_fake-backend"))
}

/// Honor `RUST_LOG` when debugging these tests.
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn server(name: &str) -> ServerId {
    ServerId::new(name).expect("valid server id")
}

#[tokio::test]
async fn test_spawn_handshake_and_ready() {
    let (supervisor, _events) = BackendSupervisor::new();
    supervisor.configure(server("fake"), fake_backend());

    supervisor.start(&server("fake")).await.expect("start");
    assert_eq!(
        supervisor.state_of(&server("fake")),
        Some(BackendState::Ready)
    );
    assert_eq!(supervisor.ready_servers().len(), 1);

    supervisor.stop_all().await;
    assert!(supervisor.ready_servers().is_empty());
}

#[tokio::test]
async fn test_list_tools_prefixes_names() {
    let (supervisor, _events) = BackendSupervisor::new();
    supervisor.configure(server("fake"), fake_backend());
    supervisor.start(&server("fake")).await.expect("start");

    let router = RequestRouter::new(std::sync::Arc::clone(&supervisor));
    let tools = router.list_tools().await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "fake__log");
    assert_eq!(tools[0].server, "fake");
    assert_eq!(
        tools[0].description.as_deref(),
        Some("Echo the arguments back")
    );

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_call_tool_rewrites_prefix_and_returns_result_unmodified() {
    let (supervisor, _events) = BackendSupervisor::new();
    supervisor.configure(server("fake"), fake_backend());
    supervisor.start(&server("fake")).await.expect("start");

    let router = RequestRouter::new(std::sync::Arc::clone(&supervisor));
    let result = router
        .call_tool("fake__log", serde_json::json!({"message": "hello"}))
        .await
        .expect("call");

    // The backend saw the native name and echoed the arguments.
    let text = result["content"][0]["text"].as_str().expect("text block");
    assert!(text.starts_with("logged:"));
    assert!(text.contains("hello"));
    assert_eq!(result["isError"], false);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_upstream_error_is_surfaced() {
    let (supervisor, _events) = BackendSupervisor::new();
    supervisor.configure(server("fake"), fake_backend());
    supervisor.start(&server("fake")).await.expect("start");

    let router = RequestRouter::new(std::sync::Arc::clone(&supervisor));
    let err = router
        .call_tool("fake__missing", serde_json::json!({}))
        .await
        .expect_err("unknown native tool");
    assert!(matches!(
        err,
        waygate_mcp::McpError::UpstreamRpc { code: -32602, .. }
    ));

    supervisor.stop_all().await;
}

#[tokio::test]
async fn test_fan_out_tolerates_failed_backend() {
    let (supervisor, _events) = BackendSupervisor::new();
    supervisor.configure(server("fake"), fake_backend());
    supervisor.configure(server("ghost"), BackendConfig::new("/nonexistent/waygate-ghost"));

    supervisor.start(&server("fake")).await.expect("start");
    assert!(supervisor.start(&server("ghost")).await.is_err());

    // The failed backend contributes zero tools, never failing the
    // aggregate.
    let router = RequestRouter::new(std::sync::Arc::clone(&supervisor));
    let tools = router.list_tools().await;
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "fake__log");

    supervisor.stop_all().await;
}
