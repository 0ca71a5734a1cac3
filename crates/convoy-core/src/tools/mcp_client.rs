//! Remote tool transport
//!
//! A `ToolTransport` is anything that can list tools and run them somewhere
//! else, in practice an MCP server. The wire protocol stays behind the trait;
//! the registry only ever sees `ToolSpec`s and JSON results.
//!
//! `ResourceTransport` covers the rest of what an MCP server publishes:
//! readable resources and prompt templates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Mutex;

use crate::core_types::Message;
use crate::errors::AgentError;
use crate::tools::travel::CityWeatherTool;
use crate::tools::ToolSpec;

#[async_trait]
pub trait ToolTransport: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError>;
    async fn call_tool(&self, tool_name: &str, arguments: Map<String, Value>) -> Result<Value, AgentError>;
    async fn is_connected(&self) -> bool;
}

/// A resource listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    pub description: Option<String>,
    pub mime_type: Option<String>,
}

/// One block of a read resource. Binary blobs stay base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceContent {
    Text {
        uri: String,
        mime_type: Option<String>,
        text: String,
    },
    Blob {
        uri: String,
        mime_type: Option<String>,
        blob: String,
    },
}

impl ResourceContent {
    pub fn text(&self) -> Option<&str> {
        match self {
            ResourceContent::Text { text, .. } => Some(text),
            ResourceContent::Blob { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptArgumentInfo {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInfo {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<PromptArgumentInfo>,
}

/// A prompt rendered by the server, ready to seed a conversation.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub description: Option<String>,
    pub messages: Vec<Message>,
}

#[async_trait]
pub trait ResourceTransport: Send + Sync {
    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, AgentError>;
    /// URI templates of parameterized resources, such as `file://documents/{name}`.
    async fn list_resource_templates(&self) -> Result<Vec<String>, AgentError>;
    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContent>, AgentError>;
    async fn list_prompts(&self) -> Result<Vec<PromptInfo>, AgentError>;
    async fn get_prompt(&self, name: &str, arguments: Map<String, Value>) -> Result<RenderedPrompt, AgentError>;
}

const DOCUMENTS_PREFIX: &str = "file://documents/";

/// In-memory transport mirroring the weather and hello-world demo servers. Records every tool call.
pub struct MockToolTransport {
    connected: bool,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MockToolTransport {
    pub fn new() -> Self {
        Self {
            connected: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_connection_status(connected: bool) -> Self {
        Self {
            connected,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for MockToolTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolTransport for MockToolTransport {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        if !self.connected {
            return Err(AgentError::MCPError("Not connected".to_string()));
        }

        Ok(vec![
            ToolSpec::new(
                "get_weather",
                "Get the current weather for a specified city.",
                json!({
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                }),
            ),
            ToolSpec::new(
                "add",
                "Add two numbers",
                json!({
                    "type": "object",
                    "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                    "required": ["a", "b"]
                }),
            ),
        ])
    }

    async fn call_tool(&self, tool_name: &str, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        if !self.connected {
            return Err(AgentError::MCPError("Not connected".to_string()));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((tool_name.to_string(), arguments.clone()));
        }

        match tool_name {
            "get_weather" => {
                let city = arguments.get("city").and_then(|c| c.as_str()).unwrap_or_default();
                Ok(Value::String(CityWeatherTool::lookup(city).to_string()))
            }
            "add" => {
                let a = arguments.get("a").and_then(|v| v.as_i64()).unwrap_or_default();
                let b = arguments.get("b").and_then(|v| v.as_i64()).unwrap_or_default();
                Ok(Value::String((a + b).to_string()))
            }
            other => Err(AgentError::ToolError {
                tool_name: other.to_string(),
                message: format!("Unknown tool: {}", other),
            }),
        }
    }

    async fn is_connected(&self) -> bool {
        self.connected
    }
}

impl MockToolTransport {
    fn ensure_connected(&self) -> Result<(), AgentError> {
        if self.connected {
            Ok(())
        } else {
            Err(AgentError::MCPError("Not connected".to_string()))
        }
    }
}

#[async_trait]
impl ResourceTransport for MockToolTransport {
    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, AgentError> {
        self.ensure_connected()?;
        Ok(vec![ResourceInfo {
            uri: format!("{}hello.txt", DOCUMENTS_PREFIX),
            name: "read_hello".to_string(),
            description: Some("A static hello file.".to_string()),
            mime_type: Some("text/plain".to_string()),
        }])
    }

    async fn list_resource_templates(&self) -> Result<Vec<String>, AgentError> {
        self.ensure_connected()?;
        Ok(vec![format!("{}{{name}}", DOCUMENTS_PREFIX)])
    }

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContent>, AgentError> {
        self.ensure_connected()?;
        let text = match uri.strip_prefix(DOCUMENTS_PREFIX) {
            Some("hello.txt") => "Hello, static file!".to_string(),
            Some(name) if !name.is_empty() => format!("Dynamic content of {}", name),
            _ => return Err(AgentError::MCPError(format!("Unknown resource: {}", uri))),
        };
        Ok(vec![ResourceContent::Text {
            uri: uri.to_string(),
            mime_type: Some("text/plain".to_string()),
            text,
        }])
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>, AgentError> {
        self.ensure_connected()?;
        Ok(vec![PromptInfo {
            name: "review_code".to_string(),
            description: Some("Code Review".to_string()),
            arguments: vec![PromptArgumentInfo {
                name: "code".to_string(),
                description: None,
                required: true,
            }],
        }])
    }

    async fn get_prompt(&self, name: &str, arguments: Map<String, Value>) -> Result<RenderedPrompt, AgentError> {
        self.ensure_connected()?;
        if name != "review_code" {
            return Err(AgentError::MCPError(format!("Unknown prompt: {}", name)));
        }
        let code = arguments
            .get("code")
            .and_then(|c| c.as_str())
            .ok_or_else(|| AgentError::MCPError("Missing required argument: code".to_string()))?;
        Ok(RenderedPrompt {
            description: Some("Code Review".to_string()),
            messages: vec![Message::user(format!("Please review this code:\n\n{}", code))],
        })
    }
}
