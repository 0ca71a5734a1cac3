use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::core_types::{Message, ModelTurn, Role, ToolCallRequest, Usage};
use crate::errors::AgentError;
use crate::llm::{ModelRequest, LLM};

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2025-01-01-preview";

/// Where requests go and how they authenticate.
#[derive(Debug, Clone, PartialEq)]
enum Endpoint {
    /// `{api_base}/chat/completions` with a bearer token.
    OpenAI { api_base: String },
    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=..`
    /// with an `api-key` header.
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

/// Chat-completions client for OpenAI and Azure OpenAI deployments.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    endpoint: Endpoint,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: Endpoint::OpenAI {
                api_base: DEFAULT_OPENAI_BASE.to_string(),
            },
            model,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Client for an Azure OpenAI deployment; the deployment name doubles as the model.
    pub fn azure(api_key: String, endpoint: String, deployment: String, api_version: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: deployment.clone(),
            endpoint: Endpoint::Azure {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                deployment,
                api_version,
            },
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_api_base(mut self, api_base: String) -> Self {
        self.endpoint = Endpoint::OpenAI {
            api_base: api_base.trim_end_matches('/').to_string(),
        };
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAI { api_base } => format!("{}/chat/completions", api_base),
            Endpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, deployment, api_version
            ),
        }
    }

    fn build_request_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": self.format_messages(&request.messages),
        });

        if let Some(temp) = self.temperature {
            body["temperature"] = temp.into();
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        if !request.tools.is_empty() {
            log::debug!(
                "Advertising {} tools: {}",
                request.tools.len(),
                request
                    .tools
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let formatted_tools: Vec<Value> = request.tools.iter().map(|t| t.to_openai_tool()).collect();
            body["tools"] = formatted_tools.into();
            body["tool_choice"] = request.tool_choice.to_openai_value();
        }

        body
    }

    fn format_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let mut message = json!({
                    "role": msg.role.as_str(),
                    "content": msg.content
                });

                if let Some(name) = &msg.name {
                    if msg.role != Role::Tool {
                        message["name"] = json!(sanitize_name(name));
                    }
                }

                if let Role::Tool = msg.role {
                    if let Some(tool_call_id) = &msg.tool_call_id {
                        message["tool_call_id"] = json!(tool_call_id);
                    }
                }

                if let Role::Assistant = msg.role {
                    if msg.has_tool_calls() {
                        let formatted_tool_calls: Vec<Value> = msg
                            .tool_calls()
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.raw_arguments
                                    }
                                })
                            })
                            .collect();
                        message["tool_calls"] = json!(formatted_tool_calls);
                        if msg.content.is_empty() {
                            message["content"] = Value::Null;
                        }
                    }
                }

                message
            })
            .collect()
    }

    fn parse_response(&self, response: Value) -> Result<ModelTurn, AgentError> {
        let choices = response["choices"]
            .as_array()
            .ok_or_else(|| AgentError::ParsingError("No choices in response".to_string()))?;

        let choice = choices
            .first()
            .ok_or_else(|| AgentError::ParsingError("Empty choices array".to_string()))?;
        let message = &choice["message"];

        let content = message["content"].as_str().map(|s| s.to_string());

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let Some(function) = call["function"].as_object() else {
                    log::warn!("Skipping tool call without a function object: {}", call);
                    continue;
                };
                let Some(name) = function.get("name").and_then(|n| n.as_str()) else {
                    log::warn!("Skipping tool call without a function name: {}", call);
                    continue;
                };
                // Arguments stay raw; decoding failures are reported per call by the dispatcher.
                let raw_arguments = match function.get("arguments") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                let id = call["id"]
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

                tool_calls.push(ToolCallRequest::new(id, name, raw_arguments));
            }
        }

        if content.is_none() && tool_calls.is_empty() {
            return Err(AgentError::ParsingError(
                "Response has neither content nor tool calls".to_string(),
            ));
        }

        let usage = response
            .get("usage")
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

        Ok(ModelTurn {
            message: Message::assistant_with_tool_calls(content.unwrap_or_default(), tool_calls),
            finish_reason: choice["finish_reason"].as_str().map(|s| s.to_string()),
            usage,
        })
    }
}

/// OpenAI restricts `name` to `^[a-zA-Z0-9_-]+$`.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl LLM for OpenAIClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelTurn, AgentError> {
        let url = self.url();
        let body = self.build_request_body(&request);

        log::debug!("Chat completions request to {} ({} messages)", url, request.messages.len());
        log::trace!("Request body: {}", body);

        let builder = self.client.post(&url).header("Content-Type", "application/json");
        let builder = match &self.endpoint {
            Endpoint::OpenAI { .. } => builder.header("Authorization", format!("Bearer {}", self.api_key)),
            Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
        };

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ModelCall(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| AgentError::ModelCall(format!("Failed to read response: {}", e)))?;

        log::debug!("Chat completions response ({}): {}", status, response_text);

        if !status.is_success() {
            return Err(AgentError::ModelCall(format!(
                "API request failed with status {}: {}",
                status, response_text
            )));
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| AgentError::ParsingError(format!("Invalid JSON response: {}", e)))?;

        self.parse_response(response_json)
    }
}

/// Create an OpenAI client from configuration
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    let api_key = config.resolve_api_key()?;
    let mut client = OpenAIClient::new(api_key, config.model.clone());
    if let Some(base_url) = &config.base_url {
        client = client.with_api_base(base_url.clone());
    }
    Ok(Arc::new(apply_parameters(client, config)))
}

/// Create a client for an Azure OpenAI deployment
pub fn create_azure_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    let api_key = config.resolve_api_key()?;
    let endpoint = config
        .endpoint
        .clone()
        .ok_or_else(|| AgentError::ConfigError("Azure provider requires 'endpoint'".to_string()))?;
    let deployment = config.deployment.clone().unwrap_or_else(|| config.model.clone());
    let api_version = config
        .api_version
        .clone()
        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());

    let client = OpenAIClient::azure(api_key, endpoint, deployment, api_version);
    Ok(Arc::new(apply_parameters(client, config)))
}

/// Create an OpenAI-compatible client for custom endpoints
pub fn create_custom_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    let base_url = config
        .base_url
        .clone()
        .ok_or_else(|| AgentError::ConfigError("Custom provider requires 'base_url'".to_string()))?;
    // Local OpenAI-compatible servers often run without a key.
    let api_key = config.resolve_api_key().unwrap_or_default();
    let client = OpenAIClient::new(api_key, config.model.clone()).with_api_base(base_url);
    Ok(Arc::new(apply_parameters(client, config)))
}

fn apply_parameters(mut client: OpenAIClient, config: &LlmConfig) -> OpenAIClient {
    if let Some(temperature) = config.parameters.temperature {
        client = client.with_temperature(temperature);
    }
    if let Some(max_tokens) = config.parameters.max_tokens {
        client = client.with_max_tokens(max_tokens);
    }
    client
}
