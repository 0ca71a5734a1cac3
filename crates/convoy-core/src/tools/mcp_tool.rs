use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::mcp_client::ToolTransport;
use super::{Tool, ToolHandler, ToolRegistry, ToolSpec};
use crate::errors::AgentError;

/// Registry proxy for one tool living behind a `ToolTransport`.
pub struct McpTool {
    transport: Arc<dyn ToolTransport>,
    spec: ToolSpec,
}

impl McpTool {
    pub fn new(transport: Arc<dyn ToolTransport>, spec: ToolSpec) -> Self {
        Self { transport, spec }
    }
}

#[async_trait]
impl ToolHandler for McpTool {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        self.transport
            .call_tool(&self.spec.name, arguments)
            .await
            .map_err(|e| match e {
                AgentError::ToolError { .. } => e,
                other => AgentError::ToolError {
                    tool_name: self.spec.name.clone(),
                    message: format!("MCP tool execution failed: {}", other),
                },
            })
    }
}

impl Tool for McpTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }
}

pub struct McpToolFactory {
    transport: Arc<dyn ToolTransport>,
}

impl McpToolFactory {
    pub fn new(transport: Arc<dyn ToolTransport>) -> Self {
        Self { transport }
    }

    /// Proxies for the remote tools; an empty `allowed` list keeps all of them.
    pub async fn discover_tools(&self, allowed: &[String]) -> Result<Vec<McpTool>, AgentError> {
        let specs = self.transport.list_tools().await.map_err(|e| AgentError::ToolError {
            tool_name: "mcp_discovery".to_string(),
            message: format!("Failed to discover MCP tools: {}", e),
        })?;

        Ok(specs
            .into_iter()
            .filter(|spec| allowed.is_empty() || allowed.iter().any(|name| name == &spec.name))
            .map(|spec| McpTool::new(self.transport.clone(), spec))
            .collect())
    }

    /// Register the remote tools, returning how many were added.
    ///
    /// All or nothing: on any rejected tool `registry` is left unchanged.
    pub async fn register_all(&self, registry: &mut ToolRegistry, allowed: &[String]) -> Result<usize, AgentError> {
        let tools = self.discover_tools(allowed).await?;
        let count = tools.len();
        let mut staged = registry.clone();
        for tool in tools {
            staged.register_tool(tool)?;
        }
        *registry = staged;
        log::info!("Registered {} MCP tools", count);
        Ok(count)
    }

    pub async fn create_registry(&self) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        self.register_all(&mut registry, &[]).await?;
        Ok(registry)
    }
}
