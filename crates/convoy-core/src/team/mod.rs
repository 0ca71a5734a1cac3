//! Multi-agent group chat.
//!
//! Several named participants share one thread. Before every turn a selector
//! model call picks who speaks next; the chosen participant's reply is appended
//! under its name and the shared termination policy is checked after each
//! appended message. Progress can be streamed to the caller over a channel.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core_types::Message;
use crate::errors::AgentError;
use crate::llm::LLM;
use crate::termination::{TerminationPolicy, TerminationState};

pub mod assistant;
pub mod selector;
pub mod user_proxy;

pub use assistant::AssistantAgent;
pub use selector::{Candidate, SpeakerSelector};
pub use user_proxy::{HumanInput, LineInput, ScriptedInput, StdinInput, UserProxyAgent};

pub const DEFAULT_TERMINATION_KEYWORD: &str = "TERMINATE";
pub const DEFAULT_MAX_MESSAGES: usize = 30;

/// A participant's contribution to one turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Appended to the shared thread.
    pub message: Message,
    /// Tool calls and results produced while answering; streamed but not shared.
    pub inner_messages: Vec<Message>,
}

#[async_trait]
pub trait ChatParticipant: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn respond(&self, thread: &[Message], cancel: CancellationToken) -> Result<AgentReply, AgentError>;
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub messages: Vec<Message>,
    pub stop_reason: String,
}

#[derive(Debug, Clone)]
pub enum TeamEvent {
    /// A message appended to the shared thread, including the task itself.
    Message(Message),
    /// Tool traffic of the participant currently speaking.
    Inner { source: String, message: Message },
    Completed(TaskResult),
}

pub struct SelectorGroupChat {
    participants: Vec<Arc<dyn ChatParticipant>>,
    selector: SpeakerSelector,
    termination: TerminationPolicy,
    max_turns: Option<usize>,
    cancel: CancellationToken,
}

impl SelectorGroupChat {
    pub fn new(participants: Vec<Arc<dyn ChatParticipant>>, selector_llm: Arc<dyn LLM>) -> Result<Self, AgentError> {
        if participants.is_empty() {
            return Err(AgentError::TeamError("A team needs at least one participant".to_string()));
        }
        let mut seen = HashSet::new();
        for participant in &participants {
            if !seen.insert(participant.name().to_string()) {
                return Err(AgentError::TeamError(format!(
                    "Duplicate participant name: {}",
                    participant.name()
                )));
            }
        }

        Ok(Self {
            participants,
            selector: SpeakerSelector::new(selector_llm),
            termination: TerminationPolicy::KeywordMatch(DEFAULT_TERMINATION_KEYWORD.to_string())
                | TerminationPolicy::MessageCountLimit(DEFAULT_MAX_MESSAGES),
            max_turns: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_termination(mut self, policy: TerminationPolicy) -> Self {
        self.termination = policy;
        self
    }

    pub fn with_repeated_speaker(mut self, allow: bool) -> Self {
        self.selector = self.selector.with_repeated_speaker(allow);
        self
    }

    /// Deadline for each speaker-selection model call.
    pub fn with_selector_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.selector = self.selector.with_timeout(timeout);
        self
    }

    pub fn with_max_turns(mut self, max_turns: Option<usize>) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name()).collect()
    }

    pub async fn run(&self, task: impl Into<String>) -> Result<TaskResult, AgentError> {
        self.execute(task.into(), None).await
    }

    /// Like `run`, also sending every event to `events`. A dropped receiver does not stop the run.
    pub async fn run_stream(&self, task: impl Into<String>, events: mpsc::Sender<TeamEvent>) -> Result<TaskResult, AgentError> {
        self.execute(task.into(), Some(events)).await
    }

    async fn execute(&self, task: String, events: Option<mpsc::Sender<TeamEvent>>) -> Result<TaskResult, AgentError> {
        let roster: Vec<Candidate> = self
            .participants
            .iter()
            .map(|p| Candidate {
                name: p.name().to_string(),
                description: p.description().to_string(),
            })
            .collect();

        let mut thread: Vec<Message> = Vec::new();
        let mut state = TerminationState::new();
        let mut previous: Option<usize> = None;
        let mut turns = 0usize;

        let task_message = Message::user(task).with_name("user");
        log::info!("Team run started with {} participants", self.participants.len());
        self.append(&mut thread, task_message, &events).await;

        let stop_reason = loop {
            if state.update(&self.termination, &thread) {
                break state.reason.clone().unwrap_or_default();
            }
            if let Some(limit) = self.max_turns {
                if turns >= limit {
                    break format!("Maximum number of turns {} reached.", limit);
                }
            }
            if self.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let index = self.selector.select(&roster, &thread, previous, &self.cancel).await?;
            let speaker = &self.participants[index];
            log::info!("Selected next speaker: {}", speaker.name());

            let reply = speaker.respond(&thread, self.cancel.child_token()).await?;
            for inner in reply.inner_messages {
                send(
                    &events,
                    TeamEvent::Inner {
                        source: speaker.name().to_string(),
                        message: inner,
                    },
                )
                .await;
            }
            self.append(&mut thread, reply.message, &events).await;

            previous = Some(index);
            turns += 1;
        };

        log::info!("Team run finished: {}", stop_reason);
        let result = TaskResult {
            messages: thread,
            stop_reason,
        };
        send(&events, TeamEvent::Completed(result.clone())).await;
        Ok(result)
    }

    async fn append(&self, thread: &mut Vec<Message>, message: Message, events: &Option<mpsc::Sender<TeamEvent>>) {
        thread.push(message.clone());
        send(events, TeamEvent::Message(message)).await;
    }
}

async fn send(events: &Option<mpsc::Sender<TeamEvent>>, event: TeamEvent) {
    if let Some(tx) = events {
        if tx.send(event).await.is_err() {
            log::debug!("Team event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{ModelTurn, Role};
    use crate::llm::ScriptedModelClient;

    struct EchoParticipant {
        name: String,
        reply: String,
    }

    #[async_trait]
    impl ChatParticipant for EchoParticipant {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "echoes"
        }

        async fn respond(&self, _thread: &[Message], _cancel: CancellationToken) -> Result<AgentReply, AgentError> {
            Ok(AgentReply {
                message: Message::assistant(self.reply.clone()).with_name(self.name.clone()),
                inner_messages: Vec::new(),
            })
        }
    }

    fn echo(name: &str, reply: &str) -> Arc<dyn ChatParticipant> {
        Arc::new(EchoParticipant {
            name: name.to_string(),
            reply: reply.to_string(),
        })
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let selector = Arc::new(ScriptedModelClient::new(vec![]));
        let err = SelectorGroupChat::new(vec![echo("a", "x"), echo("a", "y")], selector).err().unwrap();
        assert!(matches!(err, AgentError::TeamError(_)));
    }

    #[tokio::test]
    async fn test_keyword_ends_run() {
        let selector = Arc::new(ScriptedModelClient::new(vec![
            ModelTurn::text("writer"),
            ModelTurn::text("boss"),
        ]));
        let team = SelectorGroupChat::new(vec![echo("writer", "draft"), echo("boss", "TERMINATE")], selector).unwrap();

        let result = team.run("write").await.unwrap();
        let speakers: Vec<Option<&str>> = result.messages.iter().map(|m| m.name.as_deref()).collect();
        assert_eq!(speakers, vec![Some("user"), Some("writer"), Some("boss")]);
        assert_eq!(result.stop_reason, "Text 'TERMINATE' mentioned");
    }

    #[tokio::test]
    async fn test_message_limit_counts_task() {
        let selector = Arc::new(ScriptedModelClient::new(vec![ModelTurn::text("a"), ModelTurn::text("b")]));
        let team = SelectorGroupChat::new(vec![echo("a", "1"), echo("b", "2")], selector)
            .unwrap()
            .with_termination(TerminationPolicy::MessageCountLimit(3));

        let result = team.run("go").await.unwrap();
        assert_eq!(result.messages.len(), 3);
        assert!(result.stop_reason.contains("3"));
    }

    #[tokio::test]
    async fn test_stream_emits_messages_then_completion() {
        let selector = Arc::new(ScriptedModelClient::new(vec![ModelTurn::text("only")]));
        let team = SelectorGroupChat::new(vec![echo("only", "TERMINATE"), echo("other", "x")], selector).unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let result = team.run_stream("task", tx).await.unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], TeamEvent::Message(m) if m.role == Role::User));
        assert!(matches!(&events[2], TeamEvent::Completed(r) if r.messages.len() == result.messages.len()));
    }

    #[tokio::test]
    async fn test_max_turns() {
        let selector = Arc::new(ScriptedModelClient::new(vec![ModelTurn::text("a"), ModelTurn::text("b")]));
        let team = SelectorGroupChat::new(vec![echo("a", "1"), echo("b", "2")], selector)
            .unwrap()
            .with_max_turns(Some(2));
        let result = team.run("go").await.unwrap();
        assert_eq!(result.messages.len(), 3);
        assert_eq!(result.stop_reason, "Maximum number of turns 2 reached.");
    }

    #[tokio::test]
    async fn test_cancelled_team() {
        let selector = Arc::new(ScriptedModelClient::new(vec![]));
        let team = SelectorGroupChat::new(vec![echo("a", "1"), echo("b", "2")], selector).unwrap();
        team.cancellation_token().cancel();
        assert!(matches!(team.run("go").await, Err(AgentError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_during_speaker_selection() {
        let selector = Arc::new(ScriptedModelClient::new(vec![ModelTurn::text("a")]).with_delay(Duration::from_secs(3)));
        let team = SelectorGroupChat::new(vec![echo("a", "1"), echo("b", "2")], selector.clone())
            .unwrap()
            .with_selector_timeout(None);
        let token = team.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(1), team.run("go")).await;
        assert!(matches!(result, Ok(Err(AgentError::Cancelled))));
        assert_eq!(selector.call_count(), 1);
    }

    #[tokio::test]
    async fn test_selector_timeout_aborts_run() {
        let selector = Arc::new(ScriptedModelClient::new(vec![ModelTurn::text("a")]).with_delay(Duration::from_secs(3)));
        let team = SelectorGroupChat::new(vec![echo("a", "1"), echo("b", "2")], selector)
            .unwrap()
            .with_selector_timeout(Some(Duration::from_millis(20)));
        let err = team.run("go").await.unwrap_err();
        assert!(matches!(err, AgentError::ModelTimeout { .. }));
    }

    #[tokio::test]
    async fn test_selector_model_error_aborts_run() {
        let selector = Arc::new(ScriptedModelClient::with_results(vec![Err(AgentError::ModelCall(
            "bad gateway".to_string(),
        ))]));
        let (tx, mut rx) = mpsc::channel(16);
        let team = SelectorGroupChat::new(vec![echo("a", "1"), echo("b", "2")], selector).unwrap();
        let err = team.run_stream("go", tx).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelCall(_)));

        // only the task was appended before the failure
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
    }
}
