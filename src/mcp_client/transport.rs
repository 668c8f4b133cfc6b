//! Transport capability — how the client talks to a server.
//!
//! A transport is a factory for sessions: `open()` establishes the channel
//! (spawns a process, opens an SSE stream, starts a streamable-HTTP session)
//! and performs the MCP handshake; the returned session lists and calls tools
//! until it is closed. Concrete transports live in `stdio`, `sse` and `http`;
//! they only implement the JSON-RPC channel, and `RpcSession` layers the MCP
//! methods on top.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::config::{ServerKind, StdioServerConfig};
use super::errors::McpError;
use super::types::{
    initialize_params, CallToolResult, InitializeResult, JsonRpcResponse, ListToolsResult,
    McpToolDefinition,
};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Capability Traits ───────────────────────────────────────────────────────

/// An openable connection to one MCP server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Establish the channel and complete the `initialize` handshake.
    async fn open(&self) -> Result<Box<dyn McpSession>, McpError>;
}

/// An open, initialized session.
#[async_trait]
pub trait McpSession: Send {
    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError>;

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError>;

    /// Release the channel. Must be called exactly once per `open()`.
    async fn close(self: Box<Self>) -> Result<(), McpError>;
}

/// Builds transports from configuration. Replaceable for tests.
pub trait TransportFactory: Send + Sync {
    fn stdio(&self, config: &StdioServerConfig) -> Result<Box<dyn McpTransport>, McpError>;

    /// `kind` is `Sse` or `Shttp`.
    fn http(
        &self,
        kind: ServerKind,
        url: &str,
        headers: HttpHeaders,
    ) -> Result<Box<dyn McpTransport>, McpError>;
}

/// Factory for the built-in stdio, SSE and streamable-HTTP transports.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn stdio(&self, config: &StdioServerConfig) -> Result<Box<dyn McpTransport>, McpError> {
        Ok(Box::new(super::stdio::StdioTransport::new(config.clone())))
    }

    fn http(
        &self,
        kind: ServerKind,
        url: &str,
        headers: HttpHeaders,
    ) -> Result<Box<dyn McpTransport>, McpError> {
        match kind {
            ServerKind::Shttp => Ok(Box::new(super::http::StreamableHttpTransport::new(
                url, &headers,
            )?)),
            ServerKind::Sse => Ok(Box::new(super::sse::SseTransport::new(url, &headers)?)),
            ServerKind::Stdio => Err(McpError::ConfigError {
                reason: "stdio servers have no HTTP transport".into(),
            }),
        }
    }
}

// ─── HTTP Headers ────────────────────────────────────────────────────────────

/// Header name → value, sorted for stable logging.
pub type HttpHeaders = BTreeMap<String, String>;

/// Header carrying the conversation id to the remote runtime.
pub const CONVERSATION_ID_HEADER: &str = "X-OpenHands-ServerConversation-ID";

/// Build the auth headers for an HTTP server.
///
/// The key is sent three ways: `Authorization: Bearer`, `s` (read by the
/// action execution server's MCP router) and `X-Session-API-Key` (read by the
/// remote runtime). Without a key nothing is sent, not even the conversation
/// id.
pub fn build_http_headers(api_key: Option<&str>, conversation_id: Option<&str>) -> HttpHeaders {
    let mut headers = HttpHeaders::new();
    let Some(key) = api_key.filter(|k| !k.is_empty()) else {
        return headers;
    };

    headers.insert("Authorization".to_string(), format!("Bearer {key}"));
    headers.insert("s".to_string(), key.to_string());
    headers.insert("X-Session-API-Key".to_string(), key.to_string());

    if let Some(id) = conversation_id.filter(|id| !id.is_empty()) {
        headers.insert(CONVERSATION_ID_HEADER.to_string(), id.to_string());
    }

    headers
}

/// Convert headers into a `reqwest` header map.
pub(crate) fn to_header_map(headers: &HttpHeaders) -> Result<reqwest::header::HeaderMap, McpError> {
    let mut map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            McpError::ConfigError {
                reason: format!("invalid header name '{name}': {e}"),
            }
        })?;
        let mut value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
            McpError::ConfigError {
                reason: format!("invalid value for header '{name}': {e}"),
            }
        })?;
        value.set_sensitive(true);
        map.insert(name, value);
    }
    Ok(map)
}

// ─── JSON-RPC Channel ────────────────────────────────────────────────────────

/// A raw JSON-RPC request/response channel to one server.
#[async_trait]
pub(crate) trait RpcChannel: Send {
    /// Server label for error messages.
    fn server(&self) -> &str;

    /// Send a request and wait for the matching response.
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification (no response expected).
    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError>;

    async fn shutdown(&mut self) -> Result<(), McpError>;
}

/// MCP methods on top of a JSON-RPC channel.
pub(crate) struct RpcSession<C> {
    channel: C,
}

impl<C: RpcChannel> RpcSession<C> {
    /// Run the `initialize` handshake on a freshly opened channel.
    ///
    /// Any failure here is an open failure and is reported as
    /// `ConnectionError`; the channel is shut down before returning it.
    pub(crate) async fn initialize(mut channel: C) -> Result<Self, McpError> {
        match handshake(&mut channel).await {
            Ok(init) => {
                let info = init.server_info.as_ref();
                tracing::debug!(
                    server = %channel.server(),
                    server_name = ?info.and_then(|i| i.name.as_deref()),
                    server_version = ?info.and_then(|i| i.version.as_deref()),
                    protocol = ?init.protocol_version,
                    "MCP session initialized"
                );
                Ok(Self { channel })
            }
            Err(e) => {
                let server = channel.server().to_string();
                let _ = channel.shutdown().await;
                Err(open_failure(&server, e))
            }
        }
    }

    async fn call(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let response = self.channel.request(method, params).await?;
        extract_result(response)
    }
}

async fn handshake<C: RpcChannel>(channel: &mut C) -> Result<InitializeResult, McpError> {
    let response = channel
        .request("initialize", Some(initialize_params()))
        .await?;
    let result = extract_result(response)?;
    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
            server: channel.server().to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;
    channel.notify("notifications/initialized", None).await?;
    Ok(init)
}

#[async_trait]
impl<C: RpcChannel + 'static> McpSession for RpcSession<C> {
    async fn list_tools(&mut self) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.call("tools/list", params).await?;
            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
                    server: self.channel.server().to_string(),
                    reason: format!("failed to parse tools/list response: {e}"),
                })?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.call("tools/call", Some(params)).await?;
        serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
            server: self.channel.server().to_string(),
            reason: format!("failed to parse tools/call response: {e}"),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), McpError> {
        let mut this = *self;
        this.channel.shutdown().await
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

/// Reclassify a failure that happened while opening a session.
pub(crate) fn open_failure(server: &str, error: McpError) -> McpError {
    match error {
        McpError::ConnectionError { .. }
        | McpError::Timeout { .. }
        | McpError::ConfigError { .. } => error,
        other => McpError::ConnectionError {
            server: server.to_string(),
            reason: other.to_string(),
        },
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
