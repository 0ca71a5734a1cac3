//! Remote model abstraction.
//!
//! The conversation loop only needs one operation from the model: given the
//! history, the available tools and a tool-choice directive, return one
//! assistant turn. Providers live under `providers`; `ScriptedModelClient`
//! replays canned turns for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core_types::{Message, ModelTurn};
use crate::errors::AgentError;
use crate::tools::ToolSpec;

pub mod providers;
pub mod scripted;

pub use scripted::ScriptedModelClient;

/// How the model is allowed to use the advertised tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    /// The model must call the named tool.
    Forced(String),
}

impl ToolChoice {
    pub fn to_openai_value(&self) -> Value {
        match self {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Forced(name) => json!({
                "type": "function",
                "function": {"name": name}
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
}

impl ModelRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }
}

#[async_trait]
pub trait LLM: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelTurn, AgentError>;
}

/// Run one model call on its own task, raced against `cancel` and an optional deadline.
///
/// The in-flight call is aborted as soon as either fires.
pub async fn generate_guarded(
    llm: Arc<dyn LLM>,
    request: ModelRequest,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<ModelTurn, AgentError> {
    let mut task = tokio::spawn(async move { llm.generate(request).await });
    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            task.abort();
            Err(AgentError::Cancelled)
        }
        _ = deadline => {
            task.abort();
            Err(AgentError::ModelTimeout {
                seconds: timeout.map(|t| t.as_secs()).unwrap_or_default(),
            })
        }
        joined = &mut task => match joined {
            Ok(result) => result,
            Err(e) => Err(AgentError::ModelCall(format!("Model task failed: {}", e))),
        },
    }
}
