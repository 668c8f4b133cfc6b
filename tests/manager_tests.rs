//! Connection-manager behavior through the public `TransportFactory` seam.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcp_link::mcp_client::{
    CallToolResult, ClientOptions, ConnectionState, HttpHeaders, InMemoryErrorCollector,
    McpClient, McpConfig, McpError, McpHub, McpSession, McpToolDefinition, McpTransport,
    RemoteServerConfig, Secret, ServerConfig, ServerKind, StdioServerConfig, TransportFactory,
};
use serde_json::json;

const TIMEOUT: Duration = Duration::from_secs(5);

// ─── Stub Transport ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Stub {
    tools: Mutex<Vec<String>>,
    fail_open: AtomicBool,
    fail_call: AtomicBool,
    fail_stdio_build: AtomicBool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    calls: AtomicUsize,
    lists: AtomicUsize,
    builds: AtomicUsize,
    headers: Mutex<Vec<HttpHeaders>>,
}

impl Stub {
    fn with_tools(names: &[&str]) -> Arc<Self> {
        let stub = Self::default();
        stub.set_tools(names);
        Arc::new(stub)
    }

    fn set_tools(&self, names: &[&str]) {
        *self.tools.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    fn io_ops(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
            + self.closes.load(Ordering::SeqCst)
            + self.calls.load(Ordering::SeqCst)
            + self.lists.load(Ordering::SeqCst)
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct StubFactory(Arc<Stub>);

impl TransportFactory for StubFactory {
    fn stdio(&self, config: &StdioServerConfig) -> Result<Box<dyn McpTransport>, McpError> {
        self.0.builds.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_stdio_build.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionError {
                server: config.display_name(),
                reason: "command not found".into(),
            });
        }
        Ok(Box::new(StubTransport(self.0.clone())))
    }

    fn http(
        &self,
        _kind: ServerKind,
        _url: &str,
        headers: HttpHeaders,
    ) -> Result<Box<dyn McpTransport>, McpError> {
        self.0.builds.fetch_add(1, Ordering::SeqCst);
        self.0.headers.lock().unwrap().push(headers);
        Ok(Box::new(StubTransport(self.0.clone())))
    }
}

struct StubTransport(Arc<Stub>);

#[async_trait]
impl McpTransport for StubTransport {
    async fn open(&self) -> Result<Box<dyn McpSession>, McpError> {
        self.0.opens.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_open.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionError {
                server: "stub".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(StubSession(self.0.clone())))
    }
}

struct StubSession(Arc<Stub>);

#[async_trait]
impl McpSession for StubSession {
    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.0.lists.fetch_add(1, Ordering::SeqCst);
        let tools = self.0.tools.lock().unwrap().clone();
        Ok(tools
            .into_iter()
            .map(|name| McpToolDefinition {
                description: format!("{name} tool"),
                name,
                input_schema: json!({"type": "object"}),
            })
            .collect())
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_call.load(Ordering::SeqCst) {
            return Err(McpError::ProtocolError {
                server: "stub".into(),
                reason: "connection reset".into(),
            });
        }
        Ok(CallToolResult {
            content: vec![json!({"type": "text", "text": format!("{name}:{arguments}")})],
            structured_content: None,
            is_error: false,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), McpError> {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn manager(
    stub: &Arc<Stub>,
    options: ClientOptions,
) -> (McpClient, Arc<InMemoryErrorCollector>) {
    let collector = Arc::new(InMemoryErrorCollector::new());
    let client = McpClient::new(options, collector.clone())
        .with_transport_factory(Arc::new(StubFactory(stub.clone())));
    (client, collector)
}

fn shttp(url: &str, api_key: Option<&str>) -> ServerConfig {
    ServerConfig::StreamableHttp(RemoteServerConfig::new(url, api_key.map(Secret::from)))
}

async fn connected(
    stub: &Arc<Stub>,
    options: ClientOptions,
) -> (McpClient, Arc<InMemoryErrorCollector>) {
    let (client, collector) = manager(stub, options);
    client
        .connect_http(&shttp("http://localhost:9000/mcp", None), None, TIMEOUT)
        .await
        .unwrap();
    (client, collector)
}

// ─── Discovery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_discovers_tools_in_order() {
    let stub = Stub::with_tools(&["search", "fetch", "summarize"]);
    let (client, collector) = connected(&stub, ClientOptions::default()).await;

    assert_eq!(client.tool_names().await, vec!["search", "fetch", "summarize"]);
    assert_eq!(client.state().await, ConnectionState::Connected);
    // Discovery uses its own scoped session.
    assert_eq!(stub.opens(), 1);
    assert_eq!(stub.closes(), 1);
    assert!(!client.has_open_session().await);
    assert!(!collector.has_errors());
}

#[tokio::test]
async fn test_reconnect_with_new_connect_replaces_registry() {
    let stub = Stub::with_tools(&["a", "b"]);
    let (client, _) = connected(&stub, ClientOptions::default()).await;

    stub.set_tools(&["c"]);
    client
        .connect_http(&shttp("http://localhost:9001/mcp", None), None, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(client.tool_names().await, vec!["c"]);
    assert!(!client.has_tool("a").await);
    assert_eq!(
        client.server_name().await.as_deref(),
        Some("http://localhost:9001/mcp")
    );
}

#[tokio::test]
async fn test_new_connect_closes_held_session() {
    let stub = Stub::with_tools(&["a"]);
    let (client, _) = connected(&stub, ClientOptions::default()).await;
    client.call_tool("a", json!({})).await.unwrap();
    assert!(client.has_open_session().await);
    let closes_before = stub.closes();

    client
        .connect_http(&shttp("http://localhost:9000/mcp", None), None, TIMEOUT)
        .await
        .unwrap();

    // Held session plus the discovery session.
    assert_eq!(stub.closes(), closes_before + 2);
    assert!(!client.has_open_session().await);
}

#[tokio::test]
async fn test_ephemeral_connect_stays_disconnected() {
    let stub = Stub::with_tools(&["a"]);
    let (client, _) = connected(&stub, ClientOptions::ephemeral()).await;
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert_eq!(client.tool_count().await, 1);
}

// ─── Invocation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_tool_does_no_io() {
    let stub = Stub::with_tools(&["a"]);
    let (client, collector) = connected(&stub, ClientOptions::default()).await;
    let before = stub.io_ops();

    let err = client.call_tool("missing", json!({})).await.unwrap_err();

    assert!(matches!(err, McpError::ToolNotFound { ref name } if name == "missing"));
    assert_eq!(stub.io_ops(), before);
    assert!(!collector.has_errors());
}

#[tokio::test]
async fn test_persistent_session_is_opened_once_and_reused() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = connected(&stub, ClientOptions::default()).await;
    let opens_after_discovery = stub.opens();

    for i in 0..3 {
        let result = client.call_tool("echo", json!({"i": i})).await.unwrap();
        assert_eq!(result.text(), format!("echo:{{\"i\":{i}}}"));
    }

    assert_eq!(stub.opens(), opens_after_discovery + 1);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
    assert!(client.has_open_session().await);
    assert_eq!(client.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_persistent_failure_marks_broken_then_reopens() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, collector) = connected(&stub, ClientOptions::default()).await;
    client.call_tool("echo", json!({})).await.unwrap();
    let opens = stub.opens();
    let closes = stub.closes();

    stub.fail_call.store(true, Ordering::SeqCst);
    let err = client.call_tool("echo", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::ProtocolError { .. }));
    assert_eq!(client.state().await, ConnectionState::Broken);
    assert!(!client.has_open_session().await);
    assert_eq!(stub.closes(), closes + 1);

    stub.fail_call.store(false, Ordering::SeqCst);
    client.call_tool("echo", json!({})).await.unwrap();
    assert_eq!(stub.opens(), opens + 1);
    assert_eq!(client.state().await, ConnectionState::Connected);

    // Call-time failures are never collected.
    assert!(!collector.has_errors());
}

#[tokio::test]
async fn test_persistent_open_failure_sets_broken() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = connected(&stub, ClientOptions::default()).await;

    stub.fail_open.store(true, Ordering::SeqCst);
    let err = client.call_tool("echo", json!({})).await.unwrap_err();

    assert!(matches!(err, McpError::ConnectionError { .. }));
    assert_eq!(client.state().await, ConnectionState::Broken);
    assert!(!client.has_open_session().await);
}

#[tokio::test]
async fn test_failure_limit_stops_reopening_until_reconnect() {
    let stub = Stub::with_tools(&["echo"]);
    let options = ClientOptions {
        max_consecutive_failures: Some(2),
        ..ClientOptions::default()
    };
    let (client, _) = connected(&stub, options).await;

    stub.fail_open.store(true, Ordering::SeqCst);
    for _ in 0..2 {
        assert!(matches!(
            client.call_tool("echo", json!({})).await,
            Err(McpError::ConnectionError { .. })
        ));
    }

    let opens = stub.opens();
    let err = client.call_tool("echo", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::FailureLimitReached { failures: 2, .. }));
    assert_eq!(stub.opens(), opens);

    stub.fail_open.store(false, Ordering::SeqCst);
    client.reconnect().await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Connected);
    client.call_tool("echo", json!({})).await.unwrap();
}

#[tokio::test]
async fn test_call_errors_do_not_exhaust_failure_limit() {
    let stub = Stub::with_tools(&["echo"]);
    let options = ClientOptions {
        max_consecutive_failures: Some(3),
        ..ClientOptions::default()
    };
    let (client, _) = connected(&stub, options).await;

    stub.fail_call.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        let err = client.call_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::ProtocolError { .. }));
        assert_eq!(client.state().await, ConnectionState::Broken);
    }

    // The server is healthy again: the next call reopens instead of refusing.
    stub.fail_call.store(false, Ordering::SeqCst);
    let opens = stub.opens();
    let result = client.call_tool("echo", json!({})).await.unwrap();
    assert_eq!(result.text(), "echo:{}");
    assert_eq!(stub.opens(), opens + 1);
    assert_eq!(client.state().await, ConnectionState::Connected);
}

#[tokio::test]
async fn test_successful_open_resets_failure_count() {
    let stub = Stub::with_tools(&["echo"]);
    let options = ClientOptions {
        max_consecutive_failures: Some(2),
        ..ClientOptions::default()
    };
    let (client, _) = connected(&stub, options).await;

    stub.fail_open.store(true, Ordering::SeqCst);
    assert!(client.call_tool("echo", json!({})).await.is_err());
    stub.fail_open.store(false, Ordering::SeqCst);
    client.call_tool("echo", json!({})).await.unwrap();

    // Break the session: the budget is whole again, so two opens are tried.
    stub.fail_call.store(true, Ordering::SeqCst);
    assert!(client.call_tool("echo", json!({})).await.is_err());
    stub.fail_call.store(false, Ordering::SeqCst);
    stub.fail_open.store(true, Ordering::SeqCst);
    for _ in 0..2 {
        assert!(matches!(
            client.call_tool("echo", json!({})).await,
            Err(McpError::ConnectionError { .. })
        ));
    }
    assert!(matches!(
        client.call_tool("echo", json!({})).await,
        Err(McpError::FailureLimitReached { failures: 2, .. })
    ));
}

#[tokio::test]
async fn test_unlimited_failures_keep_retrying() {
    let stub = Stub::with_tools(&["echo"]);
    let options = ClientOptions {
        max_consecutive_failures: None,
        ..ClientOptions::default()
    };
    let (client, _) = connected(&stub, options).await;

    stub.fail_open.store(true, Ordering::SeqCst);
    let opens = stub.opens();
    for _ in 0..5 {
        assert!(client.call_tool("echo", json!({})).await.is_err());
    }
    assert_eq!(stub.opens(), opens + 5);
}

#[tokio::test]
async fn test_ephemeral_opens_and_closes_every_call() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = connected(&stub, ClientOptions::ephemeral()).await;
    let opens = stub.opens();
    let closes = stub.closes();

    client.call_tool("echo", json!({})).await.unwrap();
    client.call_tool("echo", json!({})).await.unwrap();
    assert_eq!(stub.opens(), opens + 2);
    assert_eq!(stub.closes(), closes + 2);

    stub.fail_call.store(true, Ordering::SeqCst);
    assert!(client.call_tool("echo", json!({})).await.is_err());
    assert_eq!(stub.opens(), opens + 3);
    assert_eq!(stub.closes(), closes + 3);
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = connected(&stub, ClientOptions::default()).await;
    client.call_tool("echo", json!({})).await.unwrap();
    let closes = stub.closes();

    client.disconnect().await;
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert_eq!(stub.closes(), closes + 1);

    client.disconnect().await;
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert_eq!(stub.closes(), closes + 1);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_holds_session() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = connected(&stub, ClientOptions::default()).await;
    client.disconnect().await;

    client.reconnect().await.unwrap();
    assert_eq!(client.state().await, ConnectionState::Connected);
    assert!(client.has_open_session().await);

    // Already connected: no extra open.
    let opens = stub.opens();
    client.reconnect().await.unwrap();
    assert_eq!(stub.opens(), opens);
}

#[tokio::test]
async fn test_reconnect_is_noop_in_ephemeral_mode() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = connected(&stub, ClientOptions::ephemeral()).await;
    let opens = stub.opens();
    client.reconnect().await.unwrap();
    assert_eq!(stub.opens(), opens);
    assert_eq!(client.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_failure_is_not_collected() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, collector) = connected(&stub, ClientOptions::default()).await;
    client.disconnect().await;

    stub.fail_open.store(true, Ordering::SeqCst);
    let err = client.reconnect().await.unwrap_err();
    assert!(matches!(err, McpError::ConnectionError { .. }));
    assert_eq!(client.state().await, ConnectionState::Disconnected);
    assert!(!collector.has_errors());
}

// ─── Connect Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_url_fails_before_transport_construction() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, collector) = manager(&stub, ClientOptions::default());

    let err = client
        .connect_http(&shttp("", Some("key")), Some("conv"), TIMEOUT)
        .await
        .unwrap_err();

    assert!(matches!(err, McpError::ConfigError { .. }));
    assert_eq!(stub.builds.load(Ordering::SeqCst), 0);
    assert!(!collector.has_errors());
}

#[tokio::test]
async fn test_http_connect_failure_is_collected_and_reraised() {
    let stub = Stub::with_tools(&["echo"]);
    stub.fail_open.store(true, Ordering::SeqCst);
    let (client, collector) = manager(&stub, ClientOptions::default());

    let server = ServerConfig::Sse(RemoteServerConfig::new("http://localhost:9000/sse", None));
    let err = client.connect(&server, None, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, McpError::ConnectionError { .. }));

    let records = collector.errors();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].server_name, "http://localhost:9000/sse");
    assert_eq!(records[0].server_type, ServerKind::Sse);
    assert!(records[0]
        .error_message
        .starts_with("Error connecting to http://localhost:9000/sse"));
    assert_eq!(client.tool_count().await, 0);
}

#[tokio::test]
async fn test_failed_stdio_connect_records_once() {
    let stub = Stub::with_tools(&["echo"]);
    stub.fail_stdio_build.store(true, Ordering::SeqCst);
    let (client, collector) = manager(&stub, ClientOptions::default());

    let server = StdioServerConfig::new("uvx", vec!["mcp-server-fetch".into()]);
    assert!(client.connect_stdio(&server, TIMEOUT).await.is_err());

    let records = collector.errors();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].server_type, ServerKind::Stdio);
    assert_eq!(records[0].server_name, "uvx mcp-server-fetch");
}

#[tokio::test]
async fn test_named_stdio_server_uses_name_in_record() {
    let stub = Stub::with_tools(&["echo"]);
    stub.fail_open.store(true, Ordering::SeqCst);
    let (client, collector) = manager(&stub, ClientOptions::default());

    let mut server = StdioServerConfig::new("uvx", vec!["mcp-server-fetch".into()]);
    server.name = Some("fetch".into());
    assert!(client.connect_stdio(&server, TIMEOUT).await.is_err());

    assert_eq!(collector.errors()[0].server_name, "fetch");
}

// ─── Headers ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_connect_passes_auth_headers() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = manager(&stub, ClientOptions::default());

    client
        .connect_http(
            &shttp("http://localhost:9000/mcp", Some("K")),
            Some("conv-1"),
            TIMEOUT,
        )
        .await
        .unwrap();

    let headers = stub.headers.lock().unwrap()[0].clone();
    assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer K"));
    assert_eq!(headers.get("s").map(String::as_str), Some("K"));
    assert_eq!(headers.get("X-Session-API-Key").map(String::as_str), Some("K"));
    assert_eq!(
        headers
            .get("X-OpenHands-ServerConversation-ID")
            .map(String::as_str),
        Some("conv-1")
    );
}

#[tokio::test]
async fn test_http_connect_without_key_sends_no_headers() {
    let stub = Stub::with_tools(&["echo"]);
    let (client, _) = manager(&stub, ClientOptions::default());

    client
        .connect_http(&shttp("http://localhost:9000/mcp", None), Some("conv-1"), TIMEOUT)
        .await
        .unwrap();

    assert!(stub.headers.lock().unwrap()[0].is_empty());
}

// ─── Hub ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hub_routes_calls_and_keeps_partial_startup() {
    let stub = Stub::with_tools(&["echo", "search"]);
    let config: McpConfig = serde_json::from_value(json!({
        "shttp_servers": ["http://localhost:9000/mcp"],
        "stdio_servers": [{"command": "uvx", "args": ["broken-server"]}]
    }))
    .unwrap();
    stub.fail_stdio_build.store(true, Ordering::SeqCst);
    let collector = Arc::new(InMemoryErrorCollector::new());

    let (hub, failures) = McpHub::connect_all_with_factory(
        &config,
        collector.clone(),
        None,
        Arc::new(StubFactory(stub.clone())),
    )
    .await
    .unwrap();

    assert_eq!(hub.client_count(), 1);
    assert_eq!(hub.tool_count(), 2);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "uvx broken-server");
    assert_eq!(collector.error_count(), 1);
    assert_eq!(hub.owner_of("search"), Some("http://localhost:9000/mcp"));

    let result = hub.call_tool("search", json!({"q": "rust"})).await.unwrap();
    assert_eq!(result.text(), r#"search:{"q":"rust"}"#);

    let err = hub.call_tool("missing", json!({})).await.unwrap_err();
    assert!(matches!(err, McpError::ToolNotFound { .. }));

    hub.disconnect_all().await;
}

#[tokio::test]
async fn test_hub_first_owner_wins_on_duplicate_tool() {
    let stub = Stub::with_tools(&["echo"]);
    let config: McpConfig = serde_json::from_value(json!({
        "sse_servers": ["http://localhost:9000/sse"],
        "shttp_servers": ["http://localhost:9001/mcp"]
    }))
    .unwrap();

    let (hub, failures) = McpHub::connect_all_with_factory(
        &config,
        Arc::new(InMemoryErrorCollector::new()),
        None,
        Arc::new(StubFactory(stub.clone())),
    )
    .await
    .unwrap();

    assert!(failures.is_empty());
    assert_eq!(hub.client_count(), 2);
    assert_eq!(hub.tool_count(), 1);
    assert_eq!(hub.owner_of("echo"), Some("http://localhost:9000/sse"));
}

#[tokio::test]
async fn test_hub_reconnect_clears_failure_limit() {
    let stub = Stub::with_tools(&["echo"]);
    let config: McpConfig = serde_json::from_value(json!({
        "shttp_servers": ["http://localhost:9000/mcp"],
        "client": {"max_consecutive_failures": 1}
    }))
    .unwrap();

    let (hub, _) = McpHub::connect_all_with_factory(
        &config,
        Arc::new(InMemoryErrorCollector::new()),
        None,
        Arc::new(StubFactory(stub.clone())),
    )
    .await
    .unwrap();

    stub.fail_open.store(true, Ordering::SeqCst);
    assert!(hub.call_tool("echo", json!({})).await.is_err());
    assert!(matches!(
        hub.call_tool("echo", json!({})).await,
        Err(McpError::FailureLimitReached { .. })
    ));

    stub.fail_open.store(false, Ordering::SeqCst);
    hub.reconnect("http://localhost:9000/mcp").await.unwrap();
    hub.call_tool("echo", json!({})).await.unwrap();

    let err = hub.reconnect("http://localhost:9999/mcp").await.unwrap_err();
    assert!(matches!(err, McpError::ConfigError { .. }));
}

#[tokio::test]
async fn test_hub_rejects_invalid_config_before_connecting() {
    let stub = Stub::with_tools(&["echo"]);
    let config: McpConfig = serde_json::from_value(json!({
        "shttp_servers": ["http://localhost:9000/mcp", "http://localhost:9000/mcp"]
    }))
    .unwrap();

    let result = McpHub::connect_all_with_factory(
        &config,
        Arc::new(InMemoryErrorCollector::new()),
        None,
        Arc::new(StubFactory(stub.clone())),
    )
    .await;

    assert!(matches!(result, Err(McpError::ConfigError { .. })));
    assert_eq!(stub.builds.load(Ordering::SeqCst), 0);
}
