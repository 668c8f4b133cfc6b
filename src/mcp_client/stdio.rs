//! Stdio transport — an MCP server as a child process.
//!
//! Each `open()` spawns the configured command and speaks line-delimited
//! JSON-RPC over its stdin/stdout. Closing the session closes stdin and waits
//! for the process to exit, killing it after a grace period. The child is also
//! killed if the session is dropped without being closed.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::config::StdioServerConfig;
use super::errors::McpError;
use super::transport::{next_request_id, McpSession, McpTransport, RpcChannel, RpcSession};
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Transport ───────────────────────────────────────────────────────────────

/// Spawns a fresh server process for every session.
pub struct StdioTransport {
    config: StdioServerConfig,
    server_name: String,
}

impl StdioTransport {
    pub fn new(config: StdioServerConfig) -> Self {
        let server_name = config.display_name();
        Self {
            config,
            server_name,
        }
    }

    fn spawn(&self) -> Result<StdioChannel, McpError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        cmd.envs(&self.config.env);

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::ConnectionError {
            server: self.server_name.clone(),
            reason: format!("failed to spawn '{}': {e}", self.config.command),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::ConnectionError {
            server: self.server_name.clone(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| McpError::ConnectionError {
            server: self.server_name.clone(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let server = self.server_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server, stderr = %line, "server stderr");
                }
            })
        });

        tracing::debug!(
            server = %self.server_name,
            pid = ?child.id(),
            "spawned MCP server process"
        );

        Ok(StdioChannel {
            server_name: self.server_name.clone(),
            child,
            writer: Some(stdin),
            reader: BufReader::new(stdout),
            stderr_task,
        })
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn open(&self) -> Result<Box<dyn McpSession>, McpError> {
        let channel = self.spawn()?;
        let session = RpcSession::initialize(channel).await?;
        Ok(Box::new(session))
    }
}

// ─── Channel ─────────────────────────────────────────────────────────────────

/// JSON-RPC over a child process's stdio.
struct StdioChannel {
    server_name: String,
    child: Child,
    /// `None` once stdin has been closed for shutdown.
    writer: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<()>>,
}

impl StdioChannel {
    fn protocol_error(&self, reason: String) -> McpError {
        McpError::ProtocolError {
            server: self.server_name.clone(),
            reason,
        }
    }

    async fn write_line(&mut self, mut json: String) -> Result<(), McpError> {
        json.push('\n');
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.protocol_error("stdin already closed".into()));
        };
        if let Err(e) = writer.write_all(json.as_bytes()).await {
            return Err(self.protocol_error(format!("failed to write to stdin: {e}")));
        }
        if let Err(e) = writer.flush().await {
            return Err(self.protocol_error(format!("failed to flush stdin: {e}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RpcChannel for StdioChannel {
    fn server(&self) -> &str {
        &self.server_name
    }

    /// Write one line of JSON, then read lines until the matching response.
    ///
    /// Non-JSON lines, notifications and responses to other ids are skipped.
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)
            .map_err(|e| self.protocol_error(format!("failed to serialize request: {e}")))?;
        self.write_line(json).await?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = match self.reader.read_line(&mut line_buf).await {
                Ok(n) => n,
                Err(e) => {
                    return Err(self.protocol_error(format!("failed to read from stdout: {e}")))
                }
            };

            if bytes_read == 0 {
                return Err(self.protocol_error(
                    "server stdout closed (process may have exited)".into(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.answers(id) || resp.is_unattributed_error() => return Ok(resp),
                Ok(_) => continue,
                Err(_) => {
                    tracing::trace!(server = %self.server_name, line = %trimmed, "skipping non-response line");
                    continue;
                }
            }
        }
    }

    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notification).map_err(|e| {
            self.protocol_error(format!("failed to serialize notification: {e}"))
        })?;
        self.write_line(json).await
    }

    /// Close stdin, wait for exit, force-kill after `SHUTDOWN_TIMEOUT`.
    async fn shutdown(&mut self) -> Result<(), McpError> {
        drop(self.writer.take());

        let result = match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.server_name, %status, "MCP server exited");
                Ok(())
            }
            Ok(Err(e)) => Err(self.protocol_error(format!("failed to wait for exit: {e}"))),
            Err(_) => {
                tracing::warn!(
                    server = %self.server_name,
                    "server did not exit after stdin closed, killing"
                );
                self.child
                    .kill()
                    .await
                    .map_err(|e| self.protocol_error(format!("failed to kill process: {e}")))
            }
        };

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        result
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
