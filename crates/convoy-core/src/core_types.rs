//! Core type definitions exchanged between the conversation loop and the model
//!
//! The shapes follow OpenAI's chat-completions tool calling format: an assistant
//! message carries zero or more tool call requests whose arguments are a raw
//! JSON string, and every tool result goes back as a `tool` message linked to
//! its request by id.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One tool invocation requested by the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Arguments exactly as the model produced them. Not guaranteed to be valid JSON.
    pub raw_arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, raw_arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }

    /// Build a request from an already structured argument mapping.
    pub fn from_arguments(id: impl Into<String>, name: impl Into<String>, arguments: &Map<String, Value>) -> Self {
        let raw = Value::Object(arguments.clone()).to_string();
        Self::new(id, name, raw)
    }
}

/// Outcome of one tool invocation. Exactly one of `output` / `error` is meaningful:
/// a failed call always carries `output == Value::Null`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCallResult {
    pub request_id: String,
    pub name: String,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    pub fn success(request: &ToolCallRequest, output: Value) -> Self {
        Self {
            request_id: request.id.clone(),
            name: request.name.clone(),
            output,
            error: None,
        }
    }

    pub fn failure(request: &ToolCallRequest, error: impl ToString) -> Self {
        Self {
            request_id: request.id.clone(),
            name: request.name.clone(),
            output: Value::Null,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text placed in the tool message sent back to the model.
    pub fn content(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        match &self.output {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Speaker name; set on messages authored by a named team participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let mut message = Self::plain(Role::Assistant, content);
        if !tool_calls.is_empty() {
            message.tool_calls = Some(tool_calls);
        }
        message
    }

    pub fn tool(result: &ToolCallResult) -> Self {
        let mut message = Self::plain(Role::Tool, result.content());
        message.tool_call_id = Some(result.request_id.clone());
        message
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One response from the remote model: an assistant message plus metadata.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelTurn {
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(content),
            finish_reason: Some("stop".to_string()),
            usage: None,
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            message: Message::assistant_with_tool_calls(content, tool_calls),
            finish_reason: Some("tool_calls".to_string()),
            usage: None,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        self.message.tool_calls()
    }
}
