use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{AgentReply, ChatParticipant};
use crate::core_types::{Message, Role};
use crate::errors::AgentError;
use crate::llm::LLM;
use crate::session::{ConversationSession, SessionConfig};
use crate::tools::ToolRegistry;

/// Model-backed team member with its own system message and tools.
///
/// Each turn replays the shared thread into a fresh `ConversationSession`:
/// the agent's own earlier replies as assistant messages, everything else as
/// named user messages. The session's tool traffic is returned as inner
/// messages and never enters the shared thread.
pub struct AssistantAgent {
    name: String,
    description: String,
    system_message: String,
    llm: Arc<dyn LLM>,
    registry: Arc<ToolRegistry>,
    config: SessionConfig,
}

impl AssistantAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_message: impl Into<String>,
        llm: Arc<dyn LLM>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_message: system_message.into(),
            llm,
            registry: Arc::new(ToolRegistry::new()),
            config: SessionConfig::default(),
        }
    }

    pub fn with_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    fn build_history(&self, thread: &[Message]) -> Vec<Message> {
        let mut history = Vec::with_capacity(thread.len() + 1);
        history.push(Message::system(self.system_message.clone()));
        for message in thread {
            let own = message.role == Role::Assistant && message.name.as_deref() == Some(self.name.as_str());
            let replayed = if own {
                Message::assistant(message.content.clone())
            } else {
                Message::user(message.content.clone())
            };
            history.push(match &message.name {
                Some(name) => replayed.with_name(name.clone()),
                None => replayed,
            });
        }
        history
    }
}

#[async_trait]
impl ChatParticipant for AssistantAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn respond(&self, thread: &[Message], cancel: CancellationToken) -> Result<AgentReply, AgentError> {
        let history = self.build_history(thread);
        let seeded = history.len();

        let mut session = ConversationSession::from_history(self.llm.clone(), self.registry.clone(), self.config.clone(), history)
            .with_speaker(self.name.clone())
            .with_cancellation(cancel);
        let outcome = session.run().await?;
        log::debug!("Agent '{}' finished its turn: {}", self.name, outcome.stop_reason);

        let produced = session.into_history().split_off(seeded);
        let content = outcome.final_response.unwrap_or_default();
        let inner_messages = match produced.last() {
            Some(last) if last.role == Role::Assistant && !last.has_tool_calls() => {
                produced[..produced.len() - 1].to_vec()
            }
            _ => produced,
        };

        Ok(AgentReply {
            message: Message::assistant(content).with_name(self.name.clone()),
            inner_messages,
        })
    }
}
