//! MCP client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Configuration is missing a required field or is malformed.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },

    /// The transport could not be opened (spawn, HTTP connect, handshake).
    #[error("connection to '{server}' failed: {reason}")]
    ConnectionError {
        server: String,
        reason: String,
    },

    /// I/O or framing failure on an already-open session.
    #[error("protocol error for server '{server}': {reason}")]
    ProtocolError {
        server: String,
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Tool not found in the registry.
    #[error("tool '{name}' not found")]
    ToolNotFound {
        name: String,
    },

    /// No transport has been assigned yet (no successful `connect_*`).
    #[error("client session is not available")]
    SessionUnavailable,

    /// An operation did not finish within the configured timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    /// Too many persistent opens failed in a row.
    #[error("server '{server}' failed to open {failures} times in a row; reconnect required")]
    FailureLimitReached {
        server: String,
        failures: u32,
    },
}

impl McpError {
    /// Whether this error was raised locally, without talking to a server.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            McpError::ConfigError { .. }
                | McpError::ToolNotFound { .. }
                | McpError::SessionUnavailable
                | McpError::FailureLimitReached { .. }
        )
    }

    pub(crate) fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        McpError::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}
