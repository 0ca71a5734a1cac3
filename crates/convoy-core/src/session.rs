//! A single model-driven conversation with tool dispatch.
//!
//! The session owns an append-only history. Each iteration calls the model
//! once; when the reply requests tools they are dispatched and their results
//! appended as tool messages before the model is called again. The session
//! ends when a reply carries no tool calls, the termination policy fires, the
//! iteration ceiling is reached, or the model call fails.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core_types::{Message, ModelTurn, Role};
use crate::dispatch::DispatchLoop;
use crate::errors::AgentError;
use crate::llm::{generate_guarded, ModelRequest, ToolChoice, LLM};
use crate::termination::{TerminationPolicy, TerminationState};
use crate::tools::ToolRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingModel,
    DispatchingTools,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without requesting tools.
    NoToolCalls,
    /// The termination policy fired.
    Termination(String),
    MaxIterations,
    ModelCallFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoToolCalls => write!(f, "model replied without tool calls"),
            StopReason::Termination(reason) => write!(f, "{}", reason),
            StopReason::MaxIterations => write!(f, "maximum iterations reached"),
            StopReason::ModelCallFailed(reason) => write!(f, "model call failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    /// Model calls allowed per run.
    pub max_iterations: usize,
    pub model_timeout: Option<Duration>,
    pub tool_timeout: Option<Duration>,
    /// Directive for the first model call; later calls use `Auto` when this is `Forced`.
    pub tool_choice: ToolChoice,
    pub parallel_tool_calls: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are an AI assistant that helps people find information.".to_string(),
            max_iterations: 10,
            model_timeout: Some(Duration::from_secs(60)),
            tool_timeout: Some(Duration::from_secs(30)),
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub final_response: Option<String>,
    pub stop_reason: StopReason,
    pub iterations: usize,
}

pub struct ConversationSession {
    llm: Arc<dyn LLM>,
    dispatcher: DispatchLoop,
    config: SessionConfig,
    policy: TerminationPolicy,
    termination: TerminationState,
    history: Vec<Message>,
    state: SessionState,
    stop_reason: Option<StopReason>,
    iterations: usize,
    speaker: Option<String>,
    cancel: CancellationToken,
}

impl ConversationSession {
    /// Seed a session with the configured system prompt and the first user message.
    pub fn new(
        llm: Arc<dyn LLM>,
        registry: Arc<ToolRegistry>,
        config: SessionConfig,
        user_message: impl Into<String>,
    ) -> Self {
        let history = vec![Message::system(config.system_prompt.clone()), Message::user(user_message)];
        Self::from_history(llm, registry, config, history)
    }

    /// Start from an existing history. The caller supplies any system message.
    pub fn from_history(
        llm: Arc<dyn LLM>,
        registry: Arc<ToolRegistry>,
        config: SessionConfig,
        history: Vec<Message>,
    ) -> Self {
        let dispatcher = DispatchLoop::new(registry)
            .with_parallelism(config.parallel_tool_calls)
            .with_tool_timeout(config.tool_timeout);
        Self {
            llm,
            dispatcher,
            config,
            policy: TerminationPolicy::never(),
            termination: TerminationState::new(),
            history,
            state: SessionState::AwaitingModel,
            stop_reason: None,
            iterations: 0,
            speaker: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_termination(mut self, policy: TerminationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Name attached to every assistant message this session appends.
    pub fn with_speaker(mut self, name: impl Into<String>) -> Self {
        self.speaker = Some(name.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn into_history(self) -> Vec<Message> {
        self.history
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn termination_state(&self) -> &TerminationState {
        &self.termination
    }

    /// Content of the latest assistant message.
    pub fn final_response(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Run iterations until the session terminates.
    pub async fn run(&mut self) -> Result<SessionOutcome, AgentError> {
        self.ensure_active()?;
        log::info!("Session started with {} messages", self.history.len());

        while self.state != SessionState::Terminated {
            self.step().await?;
        }

        let stop_reason = self.stop_reason.clone().unwrap_or(StopReason::NoToolCalls);
        log::info!("Session finished after {} iterations: {}", self.iterations, stop_reason);
        Ok(SessionOutcome {
            final_response: self.final_response().map(|s| s.to_string()),
            stop_reason,
            iterations: self.iterations,
        })
    }

    /// One iteration: a model call, then dispatch of any requested tools.
    pub async fn step(&mut self) -> Result<SessionState, AgentError> {
        self.ensure_active()?;

        if self.iterations >= self.config.max_iterations {
            log::warn!("Session reached max_iterations ({})", self.config.max_iterations);
            self.terminate(StopReason::MaxIterations);
            return Ok(self.state);
        }

        let request = ModelRequest::new(self.history.clone())
            .with_tools(self.dispatcher.registry().describe_all())
            .with_tool_choice(self.tool_choice_for_call());

        let turn = match self.call_model(request).await {
            Ok(turn) => turn,
            Err(e) => {
                log::error!("Model call failed: {}", e);
                self.terminate(StopReason::ModelCallFailed(e.to_string()));
                return Err(e);
            }
        };
        self.iterations += 1;

        let mut message = turn.message;
        if let Some(speaker) = &self.speaker {
            message.name = Some(speaker.clone());
        }
        let requests = message.tool_calls().to_vec();
        self.history.push(message);

        if requests.is_empty() {
            log::debug!("Model replied without tool calls");
            let reason = if self.termination.update(&self.policy, &self.history) {
                self.termination.reason.clone().map(StopReason::Termination)
            } else {
                None
            };
            self.terminate(reason.unwrap_or(StopReason::NoToolCalls));
            return Ok(self.state);
        }

        self.state = SessionState::DispatchingTools;
        log::info!("Model requested {} tool calls", requests.len());
        let results = self.dispatcher.dispatch(&requests).await;
        if results.len() != requests.len() {
            let err = AgentError::TerminationPolicyViolation(format!(
                "dispatch returned {} results for {} requests",
                results.len(),
                requests.len()
            ));
            self.terminate(StopReason::Termination(err.to_string()));
            return Err(err);
        }
        self.history.extend(results.iter().map(Message::tool));
        self.state = SessionState::AwaitingModel;

        if self.termination.update(&self.policy, &self.history) {
            let reason = self.termination.reason.clone().unwrap_or_default();
            self.terminate(StopReason::Termination(reason));
        }
        Ok(self.state)
    }

    fn ensure_active(&self) -> Result<(), AgentError> {
        if self.state == SessionState::Terminated {
            let reason = self
                .stop_reason
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "terminated".to_string());
            return Err(AgentError::SessionTerminated(reason));
        }
        Ok(())
    }

    fn terminate(&mut self, reason: StopReason) {
        self.state = SessionState::Terminated;
        self.stop_reason = Some(reason);
    }

    fn tool_choice_for_call(&self) -> ToolChoice {
        match &self.config.tool_choice {
            ToolChoice::Forced(_) if self.iterations > 0 => ToolChoice::Auto,
            other => other.clone(),
        }
    }

    async fn call_model(&self, request: ModelRequest) -> Result<ModelTurn, AgentError> {
        generate_guarded(self.llm.clone(), request, self.config.model_timeout, &self.cancel).await
    }
}
