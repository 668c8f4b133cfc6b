//! MCP Client — connection manager and invocation engine for one server.
//!
//! A client owns exactly one transport at a time. `connect_*` builds the
//! transport, runs discovery in a short-lived session and fills the tool
//! registry. `call_tool` then either reuses one lazily opened session
//! (persistent mode) or opens and closes a session around every call
//! (ephemeral mode).
//!
//! Connection state:
//!
//! ```text
//! Disconnected --connect--> Connected --call fails--> Broken
//!      ^                        ^                        |
//!      |                        +---- lazy reopen -------+
//!      +------------- disconnect() from any state -------+
//! ```
//!
//! All state lives behind one async mutex, so concurrent callers on the same
//! client are serialized: at most one open/call/mark-broken sequence runs at a
//! time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::collector::{ErrorCollector, ErrorRecord};
use super::config::{
    ClientOptions, PersistenceMode, ServerConfig, ServerKind, StdioServerConfig,
};
use super::errors::McpError;
use super::registry::ToolRegistry;
use super::secrets::Secret;
use super::transport::{
    build_http_headers, DefaultTransportFactory, McpSession, McpTransport, TransportFactory,
};
use super::types::{CallToolResult, McpToolDefinition};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Upper bound on closing a session (process exit, HTTP DELETE).
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

// ─── State ───────────────────────────────────────────────────────────────────

/// Observable connection state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Broken,
}

/// Internal link state; only `Connected` can own a session.
enum Link {
    Disconnected,
    /// Logically connected. Holds the session once a persistent call opened it.
    Connected(Option<Box<dyn McpSession>>),
    Broken,
}

impl Link {
    fn state(&self) -> ConnectionState {
        match self {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connected(_) => ConnectionState::Connected,
            Link::Broken => ConnectionState::Broken,
        }
    }

    fn holds_session(&self) -> bool {
        matches!(self, Link::Connected(Some(_)))
    }
}

#[derive(Debug, Clone)]
struct ServerIdentity {
    name: String,
    kind: ServerKind,
}

struct Inner {
    transport: Option<Box<dyn McpTransport>>,
    server: Option<ServerIdentity>,
    link: Link,
    registry: ToolRegistry,
    /// Timeout of the most recent connect, inherited by calls and reopens.
    timeout: Duration,
    /// Persistent opens that failed in a row since the last successful one.
    consecutive_failures: u32,
}

impl Inner {
    fn server_name(&self) -> String {
        self.server
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Connection manager for a single MCP server.
pub struct McpClient {
    id: Uuid,
    options: ClientOptions,
    collector: Arc<dyn ErrorCollector>,
    factory: Arc<dyn TransportFactory>,
    inner: Mutex<Inner>,
}

impl McpClient {
    /// Create a disconnected client that reports connect failures to `collector`.
    pub fn new(options: ClientOptions, collector: Arc<dyn ErrorCollector>) -> Self {
        Self {
            id: Uuid::new_v4(),
            options,
            collector,
            factory: Arc::new(DefaultTransportFactory),
            inner: Mutex::new(Inner {
                transport: None,
                server: None,
                link: Link::Disconnected,
                registry: ToolRegistry::new(),
                timeout: super::config::DEFAULT_TIMEOUT,
                consecutive_failures: 0,
            }),
        }
    }

    /// Replace the factory used to build transports.
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Unique id of this client instance (for log correlation).
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // ─── Status ──────────────────────────────────────────────────────────

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.link.state()
    }

    /// Whether a persistent session is currently held open.
    pub async fn has_open_session(&self) -> bool {
        self.inner.lock().await.link.holds_session()
    }

    /// Name of the connected server (url or command line), if any.
    pub async fn server_name(&self) -> Option<String> {
        self.inner.lock().await.server.as_ref().map(|s| s.name.clone())
    }

    /// Discovered tools in server order.
    pub async fn tools(&self) -> Vec<McpToolDefinition> {
        self.inner.lock().await.registry.tools().to_vec()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .registry
            .tool_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.inner.lock().await.registry.contains(name)
    }

    pub async fn tool_count(&self) -> usize {
        self.inner.lock().await.registry.len()
    }

    // ─── Connecting ──────────────────────────────────────────────────────

    /// Connect to any configured server kind.
    pub async fn connect(
        &self,
        server: &ServerConfig,
        conversation_id: Option<&str>,
        timeout: Duration,
    ) -> Result<(), McpError> {
        match server {
            ServerConfig::Stdio(stdio) => self.connect_stdio(stdio, timeout).await,
            ServerConfig::Sse(_) | ServerConfig::StreamableHttp(_) => {
                self.connect_http(server, conversation_id, timeout).await
            }
        }
    }

    /// Connect to an SSE or streamable-HTTP server and discover its tools.
    ///
    /// Failures after argument validation are logged, recorded to the error
    /// collector and returned unchanged. There is no retry.
    pub async fn connect_http(
        &self,
        server: &ServerConfig,
        conversation_id: Option<&str>,
        timeout: Duration,
    ) -> Result<(), McpError> {
        let (kind, remote) = match server {
            ServerConfig::Sse(remote) => (ServerKind::Sse, remote),
            ServerConfig::StreamableHttp(remote) => (ServerKind::Shttp, remote),
            ServerConfig::Stdio(_) => {
                return Err(McpError::ConfigError {
                    reason: "connect_http requires an SSE or streamable HTTP server".into(),
                })
            }
        };

        if remote.url.trim().is_empty() {
            return Err(McpError::ConfigError {
                reason: "Server URL is required.".into(),
            });
        }

        let headers = build_http_headers(
            remote.api_key.as_ref().map(Secret::expose),
            conversation_id,
        );
        let identity = ServerIdentity {
            name: remote.url.clone(),
            kind,
        };

        let result = match self.factory.http(kind, &remote.url, headers) {
            Ok(transport) => self.establish(identity.clone(), transport, timeout).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            let error_msg = match e {
                McpError::ServerError { .. } => {
                    format!("McpError connecting to {}: {e}", identity.name)
                }
                _ => format!("Error connecting to {}: {e}", identity.name),
            };
            self.record_connect_failure(&identity, error_msg, e);
        }
        result
    }

    /// Spawn a stdio server and discover its tools.
    pub async fn connect_stdio(
        &self,
        server: &StdioServerConfig,
        timeout: Duration,
    ) -> Result<(), McpError> {
        let identity = ServerIdentity {
            name: server.display_name(),
            kind: ServerKind::Stdio,
        };

        let result = match self.factory.stdio(server) {
            Ok(transport) => self.establish(identity.clone(), transport, timeout).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            let error_msg = format!("Failed to connect to stdio server {}: {e}", identity.name);
            self.record_connect_failure(&identity, error_msg, e);
        }
        result
    }

    fn record_connect_failure(&self, identity: &ServerIdentity, error_msg: String, error: &McpError) {
        tracing::error!(
            server = %identity.name,
            kind = %identity.kind,
            client = %self.id,
            error = %error,
            "{error_msg}"
        );
        self.collector.add_error(ErrorRecord::new(
            identity.name.clone(),
            identity.kind,
            error_msg,
            error.to_string(),
        ));
    }

    /// Install a new transport and run discovery.
    ///
    /// Any previously held session is closed and the registry is cleared
    /// first; the manager restarts from `Disconnected`.
    async fn establish(
        &self,
        identity: ServerIdentity,
        transport: Box<dyn McpTransport>,
        timeout: Duration,
    ) -> Result<(), McpError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Link::Connected(Some(old)) = std::mem::replace(&mut inner.link, Link::Disconnected) {
            close_quietly(old, &inner.server_name()).await;
        }
        inner.registry.clear();
        inner.consecutive_failures = 0;
        inner.timeout = timeout;
        inner.server = Some(identity.clone());
        let transport = &**inner.transport.insert(transport);

        let outcome = tokio::time::timeout(timeout, discover(transport, &identity.name)).await;
        let tools = match outcome {
            Ok(Ok(tools)) => tools,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(McpError::timeout("connect", timeout)),
        };

        inner.registry.replace(tools);
        if self.options.persistence == PersistenceMode::Persistent {
            inner.link = Link::Connected(None);
        }

        tracing::info!(
            server = %identity.name,
            kind = %identity.kind,
            client = %self.id,
            tools = ?inner.registry.tool_names(),
            "Connected to server with tools"
        );
        Ok(())
    }

    /// Re-open the persistent session after a failure or `disconnect()`.
    ///
    /// A no-op without a transport, in ephemeral mode, or when already
    /// connected. Open failures are logged and returned, never collected.
    pub async fn reconnect(&self) -> Result<(), McpError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(transport) = inner.transport.as_deref() else {
            tracing::debug!(client = %self.id, "reconnect skipped: no transport assigned");
            return Ok(());
        };
        if self.options.persistence == PersistenceMode::Ephemeral {
            tracing::debug!(client = %self.id, "reconnect skipped: ephemeral mode");
            return Ok(());
        }
        if matches!(inner.link, Link::Connected(_)) {
            return Ok(());
        }

        let server = inner.server_name();
        match open_session(transport, inner.timeout, &server).await {
            Ok(session) => {
                inner.link = Link::Connected(Some(session));
                inner.consecutive_failures = 0;
                tracing::info!(server = %server, "Successfully reconnected to MCP server");
                Ok(())
            }
            Err(e) => {
                tracing::error!(server = %server, error = %e, "Failed to reconnect to MCP server");
                Err(e)
            }
        }
    }

    /// Close any held persistent session and force `Disconnected`.
    ///
    /// Never fails: close errors are logged as warnings.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        let previous = std::mem::replace(&mut inner.link, Link::Disconnected);
        if let Link::Connected(Some(session)) = previous {
            let server = inner.server_name();
            match close_session(session).await {
                Ok(()) => tracing::info!(server = %server, "Disconnected from MCP server"),
                Err(e) => tracing::warn!(server = %server, error = %e, "Error during disconnect"),
            }
        }
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Call a discovered tool.
    ///
    /// Unknown names fail with `ToolNotFound` before any I/O.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if !inner.registry.contains(name) {
            return Err(McpError::ToolNotFound {
                name: name.to_string(),
            });
        }
        if inner.transport.is_none() {
            return Err(McpError::SessionUnavailable);
        }

        let start = Instant::now();
        let result = match self.options.persistence {
            PersistenceMode::Persistent => self.call_persistent(inner, name, arguments).await,
            PersistenceMode::Ephemeral => {
                let server = inner.server_name();
                match inner.transport.as_deref() {
                    Some(transport) => {
                        call_ephemeral(transport, &server, inner.timeout, name, arguments).await
                    }
                    None => Err(McpError::SessionUnavailable),
                }
            }
        };
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(output) => tracing::debug!(
                server = %inner.server_name(),
                tool = name,
                elapsed_ms,
                is_error = output.is_error,
                "tool call finished"
            ),
            Err(e) if e.is_local() => tracing::debug!(
                server = %inner.server_name(),
                tool = name,
                error = %e,
                "tool call refused"
            ),
            Err(e) => tracing::warn!(
                server = %inner.server_name(),
                tool = name,
                elapsed_ms,
                error = %e,
                "Error calling tool"
            ),
        }
        result
    }

    /// Persistent path: reuse the held session, lazily reopening it.
    async fn call_persistent(
        &self,
        inner: &mut Inner,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let server = inner.server_name();
        let Some(transport) = inner.transport.as_deref() else {
            return Err(McpError::SessionUnavailable);
        };

        let held = match std::mem::replace(&mut inner.link, Link::Broken) {
            Link::Connected(Some(session)) => Some(session),
            previous => {
                inner.link = previous;
                None
            }
        };

        let mut session = match held {
            Some(session) => session,
            None => {
                if let Some(limit) = self.options.max_consecutive_failures {
                    if inner.consecutive_failures >= limit {
                        return Err(McpError::FailureLimitReached {
                            server,
                            failures: inner.consecutive_failures,
                        });
                    }
                }

                tracing::info!(server = %server, "Establishing persistent connection to MCP server");
                match open_session(transport, inner.timeout, &server).await {
                    Ok(session) => {
                        tracing::info!(server = %server, "Persistent connection established");
                        inner.consecutive_failures = 0;
                        session
                    }
                    Err(e) => {
                        tracing::error!(
                            server = %server,
                            error = %e,
                            "Failed to establish persistent connection"
                        );
                        inner.link = Link::Broken;
                        inner.consecutive_failures += 1;
                        return Err(e);
                    }
                }
            }
        };

        tracing::debug!(server = %server, tool = name, "Calling tool with persistent connection");
        let timeout = inner.timeout;
        let outcome = tokio::time::timeout(timeout, session.call_tool(name, arguments))
            .await
            .unwrap_or_else(|_| Err(McpError::timeout(format!("tools/call '{name}'"), timeout)));

        match outcome {
            Ok(result) => {
                inner.link = Link::Connected(Some(session));
                Ok(result)
            }
            Err(e) => {
                // The session may be unusable; drop it so the next call reopens.
                // Only failed opens count toward the failure limit.
                inner.link = Link::Broken;
                close_quietly(session, &server).await;
                Err(e)
            }
        }
    }
}

/// Ephemeral path: open, call, always close.
async fn call_ephemeral(
    transport: &dyn McpTransport,
    server: &str,
    timeout: Duration,
    name: &str,
    arguments: serde_json::Value,
) -> Result<CallToolResult, McpError> {
    let mut session = open_session(transport, timeout, server).await?;
    let result = tokio::time::timeout(timeout, session.call_tool(name, arguments))
        .await
        .unwrap_or_else(|_| Err(McpError::timeout(format!("tools/call '{name}'"), timeout)));
    close_quietly(session, server).await;
    result
}

// ─── Session Helpers ─────────────────────────────────────────────────────────

/// Scoped discovery: open, list tools, close.
async fn discover(
    transport: &dyn McpTransport,
    server: &str,
) -> Result<Vec<McpToolDefinition>, McpError> {
    let mut session = transport.open().await?;
    let listed = session.list_tools().await;
    close_quietly(session, server).await;
    listed
}

/// Open a session; a timeout counts as a connection failure.
async fn open_session(
    transport: &dyn McpTransport,
    timeout: Duration,
    server: &str,
) -> Result<Box<dyn McpSession>, McpError> {
    match tokio::time::timeout(timeout, transport.open()).await {
        Ok(result) => result,
        Err(_) => Err(McpError::ConnectionError {
            server: server.to_string(),
            reason: format!("open timed out after {}ms", timeout.as_millis()),
        }),
    }
}

async fn close_session(session: Box<dyn McpSession>) -> Result<(), McpError> {
    tokio::time::timeout(CLOSE_TIMEOUT, session.close())
        .await
        .unwrap_or_else(|_| Err(McpError::timeout("close", CLOSE_TIMEOUT)))
}

async fn close_quietly(session: Box<dyn McpSession>, server: &str) {
    if let Err(e) = close_session(session).await {
        tracing::warn!(server = %server, error = %e, "failed to close MCP session");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
