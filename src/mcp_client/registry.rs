//! Tool registry — the tools discovered from one MCP server.
//!
//! Ordered by discovery, unique by name, and replaced wholesale on every
//! successful discovery (never merged).

use std::collections::HashMap;

use super::types::McpToolDefinition;

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Ordered `tool name → definition` mapping.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<McpToolDefinition>,
    /// `tool_name → index into tools`.
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a discovery result, preserving server order.
    ///
    /// A name reported twice keeps its first position and the later
    /// definition.
    pub fn from_discovery(tools: Vec<McpToolDefinition>) -> Self {
        let mut registry = Self::new();
        for tool in tools {
            match registry.index.get(&tool.name) {
                Some(&pos) => {
                    tracing::warn!(tool = %tool.name, "server reported duplicate tool name");
                    registry.tools[pos] = tool;
                }
                None => {
                    registry.index.insert(tool.name.clone(), registry.tools.len());
                    registry.tools.push(tool);
                }
            }
        }
        registry
    }

    /// Replace the whole registry with a fresh discovery result.
    pub fn replace(&mut self, tools: Vec<McpToolDefinition>) {
        *self = Self::from_discovery(tools);
    }

    pub fn clear(&mut self) {
        self.tools.clear();
        self.index.clear();
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&McpToolDefinition> {
        self.index.get(name).map(|&pos| &self.tools[pos])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All tool definitions in discovery order.
    pub fn tools(&self) -> &[McpToolDefinition] {
        &self.tools
    }

    /// All tool names in discovery order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
