//! MCP Hub — one client per configured server, with tool-call routing.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::client::McpClient;
use super::collector::ErrorCollector;
use super::config::{McpConfig, ServerConfig};
use super::errors::McpError;
use super::transport::{DefaultTransportFactory, TransportFactory};
use super::types::{CallToolResult, McpToolDefinition};

struct HubEntry {
    name: String,
    client: McpClient,
}

/// Connected clients plus a routing table from tool name to owning client.
pub struct McpHub {
    entries: Vec<HubEntry>,
    tools: Vec<McpToolDefinition>,
    routes: HashMap<String, usize>,
}

impl McpHub {
    /// Connect every configured server concurrently.
    ///
    /// Returns the hub of successful clients and the servers that failed to
    /// connect (partial startup is OK). An invalid config fails up front with
    /// `ConfigError`, before any server is contacted.
    pub async fn connect_all(
        config: &McpConfig,
        collector: Arc<dyn ErrorCollector>,
        conversation_id: Option<&str>,
    ) -> Result<(Self, Vec<(String, McpError)>), McpError> {
        Self::connect_all_with_factory(
            config,
            collector,
            conversation_id,
            Arc::new(DefaultTransportFactory),
        )
        .await
    }

    /// Same as [`McpHub::connect_all`] with a custom transport factory.
    pub async fn connect_all_with_factory(
        config: &McpConfig,
        collector: Arc<dyn ErrorCollector>,
        conversation_id: Option<&str>,
        factory: Arc<dyn TransportFactory>,
    ) -> Result<(Self, Vec<(String, McpError)>), McpError> {
        config.validate()?;
        let options = config.client.options();
        let timeout = config.client.timeout();

        let attempts = config.servers().into_iter().map(|server: ServerConfig| {
            let client = McpClient::new(options.clone(), collector.clone())
                .with_transport_factory(factory.clone());
            async move {
                let name = server.display_name();
                let result = client.connect(&server, conversation_id, timeout).await;
                (name, client, result)
            }
        });

        let mut entries = Vec::new();
        let mut failures = Vec::new();
        for (name, client, result) in join_all(attempts).await {
            match result {
                Ok(()) => entries.push(HubEntry { name, client }),
                Err(e) => failures.push((name, e)),
            }
        }

        let hub = Self::from_entries(entries).await;
        tracing::info!(
            clients = hub.client_count(),
            tools = hub.tool_count(),
            failed = failures.len(),
            "MCP hub ready"
        );
        Ok((hub, failures))
    }

    async fn from_entries(entries: Vec<HubEntry>) -> Self {
        let mut tools = Vec::new();
        let mut routes = HashMap::new();

        for (idx, entry) in entries.iter().enumerate() {
            for tool in entry.client.tools().await {
                if let Some(&owner) = routes.get(&tool.name) {
                    let owner: &HubEntry = &entries[owner];
                    tracing::warn!(
                        tool = %tool.name,
                        owner = %owner.name,
                        ignored = %entry.name,
                        "tool offered by more than one server, keeping the first"
                    );
                    continue;
                }
                routes.insert(tool.name.clone(), idx);
                tools.push(tool);
            }
        }

        Self {
            entries,
            tools,
            routes,
        }
    }

    /// Aggregated tools in server order.
    pub fn tools(&self) -> &[McpToolDefinition] {
        &self.tools
    }

    /// Tool names grouped by server, in connect order.
    pub async fn tools_by_server(&self) -> Vec<(String, Vec<String>)> {
        let mut grouped = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            grouped.push((entry.name.clone(), entry.client.tool_names().await));
        }
        grouped
    }

    /// Name of the server that owns `tool`.
    pub fn owner_of(&self, tool: &str) -> Option<&str> {
        self.routes
            .get(tool)
            .map(|&idx| self.entries[idx].name.as_str())
    }

    /// Route a tool call to the client that owns it.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let idx = self.routes.get(name).ok_or_else(|| McpError::ToolNotFound {
            name: name.to_string(),
        })?;
        self.entries[*idx].client.call_tool(name, arguments).await
    }

    /// Re-open the persistent session of one server, clearing its failure count.
    pub async fn reconnect(&self, server: &str) -> Result<(), McpError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.name == server)
            .ok_or_else(|| McpError::ConfigError {
                reason: format!("no connected server named '{server}'"),
            })?;
        entry.client.reconnect().await
    }

    pub fn client_count(&self) -> usize {
        self.entries.len()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Disconnect every client.
    pub async fn disconnect_all(&self) {
        join_all(self.entries.iter().map(|entry| entry.client.disconnect())).await;
        tracing::info!(clients = self.entries.len(), "MCP hub disconnected");
    }
}
