//! MCP Client — connection management and tool invocation for MCP servers.
//!
//! This module handles:
//! - Stdio, SSE and streamable-HTTP transports behind one `McpTransport` seam
//! - JSON-RPC 2.0 framing and the MCP `initialize` handshake
//! - Tool discovery into a per-client registry
//! - Persistent (reused) and ephemeral (per-call) sessions
//! - Structured reporting of connect failures to an error collector
//! - A hub that connects many servers and routes tool calls by name

pub mod client;
pub mod collector;
pub mod config;
pub mod errors;
pub mod http;
pub mod hub;
pub mod registry;
pub mod secrets;
pub mod sse;
pub mod stdio;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{ConnectionState, McpClient};
pub use collector::{ErrorCollector, ErrorRecord, InMemoryErrorCollector};
pub use config::{
    load_mcp_config, ClientOptions, McpConfig, PersistenceMode, RemoteServerConfig,
    ServerConfig, ServerKind, StdioServerConfig,
};
pub use errors::McpError;
pub use hub::McpHub;
pub use registry::ToolRegistry;
pub use secrets::Secret;
pub use transport::{
    build_http_headers, DefaultTransportFactory, HttpHeaders, McpSession, McpTransport,
    TransportFactory,
};
pub use types::{CallToolResult, McpToolDefinition};
