use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core_types::ModelTurn;
use crate::errors::AgentError;
use crate::llm::{ModelRequest, LLM};

/// Model client that replays a fixed queue of turns and records every request.
///
/// When the queue is exhausted every further call fails with `AgentError::ModelCall`.
#[derive(Clone, Default)]
pub struct ScriptedModelClient {
    turns: Arc<Mutex<VecDeque<Result<ModelTurn, AgentError>>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    delay: Option<Duration>,
}

impl ScriptedModelClient {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self::with_results(turns.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ModelTurn, AgentError>>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(VecDeque::from(results))),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, turn: ModelTurn) {
        if let Ok(mut turns) = self.turns.lock() {
            turns.push_back(Ok(turn));
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LLM for ScriptedModelClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelTurn, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .turns
            .lock()
            .map_err(|_| AgentError::ModelCall("scripted client lock poisoned".to_string()))?
            .pop_front();

        match next {
            Some(result) => result,
            None => Err(AgentError::ModelCall("scripted client has no more turns".to_string())),
        }
    }
}
