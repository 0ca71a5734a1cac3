//! MCP client built on `rmcp`.
//!
//! The server is either spawned from a `McpCommand` and spoken to over stdio,
//! or reached over streamable HTTP at a URL. Either way the session is kept
//! alive until the client is disconnected or dropped.

use async_trait::async_trait;
use rmcp::{
    model::{
        CallToolRequestParam, Content, GetPromptRequestParam, Prompt, PromptMessage, PromptMessageContent,
        PromptMessageRole, RawContent, ReadResourceRequestParam, Resource, ResourceContents, Tool,
    },
    service::{DynService, RunningService, ServiceExt},
    transport::{StreamableHttpClientTransport, TokioChildProcess},
    RoleClient,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::RwLock;

use super::mcp_client::{
    PromptArgumentInfo, PromptInfo, RenderedPrompt, ResourceContent, ResourceInfo, ResourceTransport, ToolTransport,
};
use super::ToolSpec;
use crate::config::{McpCommand, McpServerConfig};
use crate::core_types::Message;
use crate::errors::AgentError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Where the demo servers listen when run with the streamable-http transport.
pub const DEFAULT_MCP_URL: &str = "http://127.0.0.1:8080/mcp";

type ClientService = RunningService<RoleClient, Box<dyn DynService<RoleClient>>>;

pub struct RMCPClient {
    name: String,
    service: Option<ClientService>,
    connected: RwLock<bool>,
    server_info: Option<String>,
    request_timeout: Duration,
}

impl RMCPClient {
    pub async fn new(command: &str, args: &[&str]) -> Result<Self, AgentError> {
        let mcp_command = McpCommand {
            run: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        Self::connect(command, &mcp_command, DEFAULT_REQUEST_TIMEOUT).await
    }

    pub async fn connect(name: &str, mcp_command: &McpCommand, request_timeout: Duration) -> Result<Self, AgentError> {
        log::info!(
            "Starting MCP server '{}' with command: {} {:?}",
            name,
            mcp_command.run,
            mcp_command.args
        );

        let mut cmd = Command::new(&mcp_command.run);
        cmd.args(&mcp_command.args);

        if let Some(working_dir) = &mcp_command.working_dir {
            log::debug!("Setting working directory: {}", working_dir.display());
            cmd.current_dir(working_dir);
        }

        for (key, value) in &mcp_command.env {
            log::debug!("Setting environment variable {} for MCP server '{}'", key, name);
            cmd.env(key, value);
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| AgentError::MCPError(format!("Failed to create transport: {}", e)))?;

        let service_handler: Box<dyn DynService<RoleClient>> = Box::new(());
        let service = Self::initialize(name, request_timeout, service_handler.serve(transport)).await?;
        Ok(Self::from_service(name, service, request_timeout))
    }

    /// Connect to a server speaking streamable HTTP, e.g. `http://127.0.0.1:8080/mcp`.
    pub async fn connect_url(name: &str, url: &str, request_timeout: Duration) -> Result<Self, AgentError> {
        log::info!("Connecting to MCP server '{}' at {}", name, url);

        let transport = StreamableHttpClientTransport::from_uri(url.to_string());
        let service_handler: Box<dyn DynService<RoleClient>> = Box::new(());
        let service = Self::initialize(name, request_timeout, service_handler.serve(transport)).await?;
        Ok(Self::from_service(name, service, request_timeout))
    }

    async fn initialize<E: std::fmt::Display>(
        name: &str,
        request_timeout: Duration,
        handshake: impl Future<Output = Result<ClientService, E>>,
    ) -> Result<ClientService, AgentError> {
        tokio::time::timeout(request_timeout, handshake)
            .await
            .map_err(|_| {
                AgentError::MCPError(format!(
                    "Timed out after {:?} initializing MCP server '{}'",
                    request_timeout, name
                ))
            })?
            .map_err(|e| {
                log::error!("MCP initialize request to '{}' failed: {}", name, e);
                AgentError::MCPError(format!("Failed to create service: {}", e))
            })
    }

    fn from_service(name: &str, service: ClientService, request_timeout: Duration) -> Self {
        let server_info = Some(format!("{:?}", service.peer_info()));
        log::info!("Connected to MCP server '{}'", name);
        log::debug!("Server info: {:?}", server_info);

        Self {
            name: name.to_string(),
            service: Some(service),
            connected: RwLock::new(true),
            server_info,
            request_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_info(&self) -> Option<&str> {
        self.server_info.as_deref()
    }

    pub async fn disconnect(&mut self) -> Result<(), AgentError> {
        if let Some(service) = self.service.take() {
            service
                .cancel()
                .await
                .map_err(|e| AgentError::MCPError(format!("Failed to cancel service: {}", e)))?;
        }
        *self.connected.write().await = false;
        log::info!("Disconnected from MCP server '{}'", self.name);
        Ok(())
    }

    async fn running_service(&self) -> Result<&ClientService, AgentError> {
        if !*self.connected.read().await {
            return Err(AgentError::MCPError(format!("MCP server '{}' is not connected", self.name)));
        }
        self.service
            .as_ref()
            .ok_or_else(|| AgentError::MCPError("Service not available".to_string()))
    }

    /// Await one MCP request under the request timeout.
    async fn request<T, E: std::fmt::Display>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, E>>,
    ) -> Result<T, AgentError> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| {
                log::error!("MCP {} on '{}' timed out after {:?}", operation, self.name, self.request_timeout);
                AgentError::MCPError(format!("Timeout waiting for {} response", operation))
            })?
            .map_err(|e| AgentError::MCPError(format!("{} failed: {}", operation, e)))
    }
}

fn convert_tool(tool: &Tool) -> ToolSpec {
    ToolSpec::new(
        tool.name.to_string(),
        tool.description.as_ref().map(|d| d.as_ref()).unwrap_or(""),
        Value::Object(tool.input_schema.as_ref().clone()),
    )
}

/// Flatten MCP content blocks into one JSON string value.
fn content_to_value(content: &[Content]) -> Value {
    if content.is_empty() {
        return Value::String("Tool executed successfully (no content returned)".to_string());
    }

    let parts: Vec<String> = content
        .iter()
        .map(|c| match &c.raw {
            RawContent::Text(text_content) => text_content.text.clone(),
            RawContent::Image(image_content) => format!(
                "Image ({}, {} bytes)",
                image_content.mime_type,
                image_content.data.len()
            ),
            RawContent::Resource(resource_content) => match &resource_content.resource {
                ResourceContents::TextResourceContents { uri, .. } => format!("Resource: {}", uri),
                ResourceContents::BlobResourceContents { uri, .. } => format!("Resource: {}", uri),
            },
            RawContent::Audio(audio_content) => format!(
                "Audio ({}, {} bytes)",
                audio_content.mime_type,
                audio_content.data.len()
            ),
        })
        .collect();

    Value::String(parts.join("\n"))
}

fn convert_resource(resource: &Resource) -> ResourceInfo {
    ResourceInfo {
        uri: resource.raw.uri.clone(),
        name: resource.raw.name.clone(),
        description: resource.raw.description.clone(),
        mime_type: resource.raw.mime_type.clone(),
    }
}

fn convert_resource_contents(contents: ResourceContents) -> ResourceContent {
    match contents {
        ResourceContents::TextResourceContents { uri, mime_type, text } => ResourceContent::Text { uri, mime_type, text },
        ResourceContents::BlobResourceContents { uri, mime_type, blob } => ResourceContent::Blob { uri, mime_type, blob },
    }
}

fn convert_prompt(prompt: &Prompt) -> PromptInfo {
    PromptInfo {
        name: prompt.name.clone(),
        description: prompt.description.clone(),
        arguments: prompt
            .arguments
            .iter()
            .flatten()
            .map(|arg| PromptArgumentInfo {
                name: arg.name.clone(),
                description: arg.description.clone(),
                required: arg.required.unwrap_or(false),
            })
            .collect(),
    }
}

/// Prompt messages become user or assistant messages; non-text content is summarized.
fn convert_prompt_message(message: PromptMessage) -> Message {
    let content = match message.content {
        PromptMessageContent::Text { text } => text,
        PromptMessageContent::Image { image } => format!("Image ({}, {} bytes)", image.mime_type, image.data.len()),
        PromptMessageContent::Resource { resource } => match &resource.resource {
            ResourceContents::TextResourceContents { text, .. } => text.clone(),
            ResourceContents::BlobResourceContents { uri, .. } => format!("Resource: {}", uri),
        },
    };
    match message.role {
        PromptMessageRole::User => Message::user(content),
        PromptMessageRole::Assistant => Message::assistant(content),
    }
}

#[async_trait]
impl ToolTransport for RMCPClient {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, AgentError> {
        let service = self.running_service().await?;

        let tools_response = self.request("list_tools", service.list_tools(Default::default())).await?;

        let tools: Vec<ToolSpec> = tools_response.tools.iter().map(convert_tool).collect();
        log::debug!("Listed {} tools from MCP server '{}'", tools.len(), self.name);
        Ok(tools)
    }

    async fn call_tool(&self, tool_name: &str, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        let service = self.running_service().await?;

        let request = CallToolRequestParam {
            name: tool_name.to_string().into(),
            arguments: Some(arguments),
        };

        let result = tokio::time::timeout(self.request_timeout, service.call_tool(request))
            .await
            .map_err(|_| AgentError::MCPError(format!("Timeout calling tool '{}'", tool_name)))?
            .map_err(|e| AgentError::MCPError(format!("Failed to call tool '{}': {}", tool_name, e)))?;

        let value = content_to_value(&result.content);
        if result.is_error.unwrap_or(false) {
            return Err(AgentError::ToolError {
                tool_name: tool_name.to_string(),
                message: value.as_str().unwrap_or_default().to_string(),
            });
        }

        log::debug!("Tool '{}' executed on MCP server '{}'", tool_name, self.name);
        Ok(value)
    }

    async fn is_connected(&self) -> bool {
        *self.connected.read().await && self.service.is_some()
    }
}

#[async_trait]
impl ResourceTransport for RMCPClient {
    async fn list_resources(&self) -> Result<Vec<ResourceInfo>, AgentError> {
        let service = self.running_service().await?;
        let resources = self.request("list_resources", service.list_all_resources()).await?;
        log::debug!("Listed {} resources from MCP server '{}'", resources.len(), self.name);
        Ok(resources.iter().map(convert_resource).collect())
    }

    async fn list_resource_templates(&self) -> Result<Vec<String>, AgentError> {
        let service = self.running_service().await?;
        let templates = self
            .request("list_resource_templates", service.list_resource_templates(Default::default()))
            .await?;
        Ok(templates
            .resource_templates
            .iter()
            .map(|t| t.raw.uri_template.clone())
            .collect())
    }

    async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContent>, AgentError> {
        let service = self.running_service().await?;
        let request = ReadResourceRequestParam { uri: uri.to_string() };
        let result = self.request("read_resource", service.read_resource(request)).await?;
        Ok(result.contents.into_iter().map(convert_resource_contents).collect())
    }

    async fn list_prompts(&self) -> Result<Vec<PromptInfo>, AgentError> {
        let service = self.running_service().await?;
        let prompts = self.request("list_prompts", service.list_all_prompts()).await?;
        Ok(prompts.iter().map(convert_prompt).collect())
    }

    async fn get_prompt(&self, name: &str, arguments: Map<String, Value>) -> Result<RenderedPrompt, AgentError> {
        let service = self.running_service().await?;
        let request = GetPromptRequestParam {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let result = self.request("get_prompt", service.get_prompt(request)).await?;
        Ok(RenderedPrompt {
            description: result.description,
            messages: result.messages.into_iter().map(convert_prompt_message).collect(),
        })
    }
}

impl Drop for RMCPClient {
    fn drop(&mut self) {
        if let Some(service) = self.service.take() {
            // Drop cannot await, so cancellation runs on the runtime.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = service.cancel().await {
                        log::warn!("Failed to cancel MCP service during drop: {}", e);
                    }
                });
            }
        }
    }
}

pub struct RMCPClientFactory;

impl RMCPClientFactory {
    pub async fn create_client_from_config(server: &McpServerConfig) -> Result<RMCPClient, AgentError> {
        let timeout = Duration::from_secs(server.timeout);
        match &server.url {
            Some(url) => RMCPClient::connect_url(&server.name, url, timeout).await,
            None => RMCPClient::connect(&server.name, &server.command, timeout).await,
        }
    }

    /// Connect every enabled server; servers that fail to start are logged and skipped.
    pub async fn create_client_collection(servers: &[McpServerConfig]) -> Vec<RMCPClient> {
        let mut clients = Vec::new();
        for server in servers.iter().filter(|s| s.enabled) {
            match Self::create_client_from_config(server).await {
                Ok(client) => clients.push(client),
                Err(e) => log::warn!("Failed to start MCP server '{}': {}", server.name, e),
            }
        }
        log::info!("Connected {} of {} MCP servers", clients.len(), servers.len());
        clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::RawTextContent;
    use serde_json::json;
    use std::borrow::Cow;
    use std::sync::Arc;

    #[test]
    fn test_tool_conversion() {
        let rmcp_tool = Tool {
            name: Cow::from("get_weather"),
            description: Some(Cow::from("Get the current weather for a specified city.")),
            input_schema: Arc::new(
                json!({
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                })
                .as_object()
                .unwrap()
                .clone(),
            ),
            annotations: None,
        };

        let spec = convert_tool(&rmcp_tool);
        assert_eq!(spec.name, "get_weather");
        assert_eq!(spec.description, "Get the current weather for a specified city.");
        assert_eq!(spec.required_fields, vec!["city"]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_text_content_is_joined() {
        let content: Vec<Content> = ["Sunny", "25°C"]
            .iter()
            .map(|t| Content {
                raw: RawContent::Text(RawTextContent { text: t.to_string() }),
                annotations: None,
            })
            .collect();
        assert_eq!(content_to_value(&content), json!("Sunny\n25°C"));
        assert!(content_to_value(&[]).as_str().unwrap().contains("no content"));
    }

    #[tokio::test]
    async fn test_connect_to_missing_binary_fails() {
        let command = McpCommand {
            run: "convoy-definitely-not-a-real-mcp-server".to_string(),
            ..Default::default()
        };
        let result = RMCPClient::connect("missing", &command, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(AgentError::MCPError(_))));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_url_fails() {
        let result = RMCPClient::connect_url("nowhere", "http://127.0.0.1:9/mcp", Duration::from_secs(2)).await;
        assert!(matches!(result, Err(AgentError::MCPError(_))));
    }

    #[test]
    fn test_prompt_conversion() {
        let prompt = Prompt::new(
            "review_code",
            Some("Code Review"),
            Some(vec![rmcp::model::PromptArgument {
                name: "code".to_string(),
                description: None,
                required: Some(true),
            }]),
        );
        let info = convert_prompt(&prompt);
        assert_eq!(info.name, "review_code");
        assert_eq!(info.arguments.len(), 1);
        assert!(info.arguments[0].required);

        let message = convert_prompt_message(PromptMessage::new_text(
            PromptMessageRole::User,
            "Please review this code",
        ));
        assert_eq!(message.role, crate::core_types::Role::User);
        assert_eq!(message.content, "Please review this code");
    }

    #[test]
    fn test_resource_contents_conversion() {
        let converted = convert_resource_contents(ResourceContents::text("Hello, static file!", "file://documents/hello.txt"));
        assert_eq!(converted.text(), Some("Hello, static file!"));
        let blob = convert_resource_contents(ResourceContents::BlobResourceContents {
            uri: "file://documents/logo.png".to_string(),
            mime_type: Some("image/png".to_string()),
            blob: "aGk=".to_string(),
        });
        assert_eq!(blob.text(), None);
    }

    #[tokio::test]
    async fn test_collection_skips_failed_servers() {
        let servers = vec![McpServerConfig {
            name: "broken".to_string(),
            command: McpCommand {
                run: "convoy-definitely-not-a-real-mcp-server".to_string(),
                ..Default::default()
            },
            url: None,
            tools: Vec::new(),
            timeout: 2,
            enabled: true,
        }];
        let clients = RMCPClientFactory::create_client_collection(&servers).await;
        assert!(clients.is_empty());
    }
}
