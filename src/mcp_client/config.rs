//! Server configuration: the three transport kinds and the config file.
//!
//! A config file lists servers per kind (`sse_servers`, `shttp_servers`,
//! `stdio_servers`) plus a `client` section with connection policy. JSON and
//! YAML are both accepted; `${VAR}` and `${VAR:-default}` are interpolated
//! before parsing.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::McpError;
use super::secrets::Secret;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default connect/discover/call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive persistent failures tolerated before reopen is refused.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

// ─── Server Kinds ────────────────────────────────────────────────────────────

/// Transport kind of a configured server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    Stdio,
    Sse,
    Shttp,
}

impl ServerKind {
    /// Label used in error records and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Stdio => "stdio",
            ServerKind::Sse => "sse",
            ServerKind::Shttp => "shttp",
        }
    }
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A process-based MCP server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StdioServerConfig {
    /// Optional display name; defaults to the command line.
    #[serde(default)]
    pub name: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl StdioServerConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: None,
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    /// Human-readable server name: the configured name, else `command args…`.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// An HTTP-based MCP server (SSE or streamable HTTP).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RemoteServerEntry")]
pub struct RemoteServerConfig {
    pub url: String,
    pub api_key: Option<Secret>,
}

impl RemoteServerConfig {
    pub fn new(url: impl Into<String>, api_key: Option<Secret>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

/// On-disk form: a bare url string or a full object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RemoteServerEntry {
    Url(String),
    Full {
        url: String,
        #[serde(default)]
        api_key: Option<Secret>,
    },
}

impl From<RemoteServerEntry> for RemoteServerConfig {
    fn from(entry: RemoteServerEntry) -> Self {
        match entry {
            RemoteServerEntry::Url(url) => Self { url, api_key: None },
            RemoteServerEntry::Full { url, api_key } => Self { url, api_key },
        }
    }
}

/// A single server to connect to.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerConfig {
    Stdio(StdioServerConfig),
    Sse(RemoteServerConfig),
    StreamableHttp(RemoteServerConfig),
}

impl ServerConfig {
    pub fn kind(&self) -> ServerKind {
        match self {
            ServerConfig::Stdio(_) => ServerKind::Stdio,
            ServerConfig::Sse(_) => ServerKind::Sse,
            ServerConfig::StreamableHttp(_) => ServerKind::Shttp,
        }
    }

    /// Name used in logs and error records (url for remote servers).
    pub fn display_name(&self) -> String {
        match self {
            ServerConfig::Stdio(cfg) => cfg.display_name(),
            ServerConfig::Sse(cfg) | ServerConfig::StreamableHttp(cfg) => cfg.url.clone(),
        }
    }
}

// ─── Client Policy ───────────────────────────────────────────────────────────

/// How tool invocations use the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    /// Open one session lazily and reuse it across calls.
    #[default]
    Persistent,
    /// Open and close a session around every call.
    Ephemeral,
}

/// Per-manager connection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub persistence: PersistenceMode,
    /// `None` retries lazily forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            persistence: PersistenceMode::Persistent,
            max_consecutive_failures: Some(DEFAULT_MAX_CONSECUTIVE_FAILURES),
        }
    }
}

impl ClientOptions {
    pub fn ephemeral() -> Self {
        Self {
            persistence: PersistenceMode::Ephemeral,
            ..Self::default()
        }
    }
}

/// The `client` section of the config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_persistent")]
    pub persistent: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: Option<u32>,
}

fn default_persistent() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}
fn default_max_failures() -> Option<u32> {
    Some(DEFAULT_MAX_CONSECUTIVE_FAILURES)
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            persistent: default_persistent(),
            timeout_secs: default_timeout_secs(),
            max_consecutive_failures: default_max_failures(),
        }
    }
}

impl ClientSettings {
    pub fn options(&self) -> ClientOptions {
        ClientOptions {
            persistence: if self.persistent {
                PersistenceMode::Persistent
            } else {
                PersistenceMode::Ephemeral
            },
            max_consecutive_failures: self.max_consecutive_failures,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─── Config File ─────────────────────────────────────────────────────────────

/// Top-level MCP configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub sse_servers: Vec<RemoteServerConfig>,
    #[serde(default)]
    pub shttp_servers: Vec<RemoteServerConfig>,
    #[serde(default)]
    pub stdio_servers: Vec<StdioServerConfig>,
}

impl McpConfig {
    /// All configured servers: sse, then shttp, then stdio.
    pub fn servers(&self) -> Vec<ServerConfig> {
        self.sse_servers
            .iter()
            .cloned()
            .map(ServerConfig::Sse)
            .chain(
                self.shttp_servers
                    .iter()
                    .cloned()
                    .map(ServerConfig::StreamableHttp),
            )
            .chain(self.stdio_servers.iter().cloned().map(ServerConfig::Stdio))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sse_servers.is_empty() && self.shttp_servers.is_empty() && self.stdio_servers.is_empty()
    }

    /// Reject empty or non-http urls, empty commands and duplicate servers.
    pub fn validate(&self) -> Result<(), McpError> {
        for (kind, servers) in [
            (ServerKind::Sse, &self.sse_servers),
            (ServerKind::Shttp, &self.shttp_servers),
        ] {
            let mut seen = HashSet::new();
            for server in servers {
                validate_url(&server.url)?;
                if !seen.insert(server.url.as_str()) {
                    return Err(McpError::ConfigError {
                        reason: format!("duplicate {kind} server url: {}", server.url),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for server in &self.stdio_servers {
            if server.command.trim().is_empty() {
                return Err(McpError::ConfigError {
                    reason: "stdio server command must not be empty".into(),
                });
            }
            let name = server.display_name();
            if !seen.insert(name.clone()) {
                return Err(McpError::ConfigError {
                    reason: format!("duplicate stdio server: {name}"),
                });
            }
        }

        Ok(())
    }
}

fn validate_url(url: &str) -> Result<(), McpError> {
    if url.trim().is_empty() {
        return Err(McpError::ConfigError {
            reason: "server URL is required".into(),
        });
    }
    let parsed = reqwest::Url::parse(url).map_err(|e| McpError::ConfigError {
        reason: format!("invalid server URL '{url}': {e}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(McpError::ConfigError {
            reason: format!("unsupported URL scheme '{other}' in '{url}'"),
        }),
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Default config location: `<config_dir>/mcp-link/mcp.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mcp-link").join("mcp.json"))
}

/// Load, interpolate, parse and validate a config file.
///
/// `.yaml` / `.yml` files are parsed as YAML, everything else as JSON.
pub fn load_mcp_config(path: &Path) -> Result<McpConfig, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| McpError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let interpolated = interpolate_env_vars(&raw);

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let mut config: McpConfig = if is_yaml {
        serde_yaml::from_str(&interpolated).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?
    } else {
        serde_json::from_str(&interpolated).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?
    };

    for server in &mut config.stdio_servers {
        server.command = expand_tilde(&server.command);
    }

    config.validate()?;

    tracing::info!(
        path = %path.display(),
        sse = config.sse_servers.len(),
        shttp = config.shttp_servers.len(),
        stdio = config.stdio_servers.len(),
        "loaded MCP config"
    );

    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((var_name, default)) => {
            std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
        }
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
