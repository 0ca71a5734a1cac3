use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;

use super::{AgentReply, ChatParticipant};
use crate::core_types::Message;
use crate::errors::AgentError;

/// Source of human replies for the user-proxy participant.
#[async_trait]
pub trait HumanInput: Send + Sync {
    async fn read_input(&self, prompt: &str) -> Result<String, AgentError>;
}

/// Reads one line per turn from a buffered reader kept for the input's lifetime,
/// so lines buffered ahead of the current turn are not lost.
pub struct LineInput<R> {
    lines: tokio::sync::Mutex<Lines<R>>,
}

/// Line input over standard input.
pub type StdinInput = LineInput<BufReader<Stdin>>;

impl<R: AsyncBufRead + Unpin> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: tokio::sync::Mutex::new(reader.lines()),
        }
    }
}

impl LineInput<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> HumanInput for LineInput<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn read_input(&self, prompt: &str) -> Result<String, AgentError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        match self.lines.lock().await.next_line().await? {
            Some(line) => Ok(line),
            None => Err(AgentError::TeamError("Standard input closed".to_string())),
        }
    }
}

/// Replays canned answers; fails once they run out.
#[derive(Default)]
pub struct ScriptedInput {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedInput {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl HumanInput for ScriptedInput {
    async fn read_input(&self, _prompt: &str) -> Result<String, AgentError> {
        self.answers
            .lock()
            .map_err(|_| AgentError::TeamError("Scripted input lock poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| AgentError::TeamError("No more scripted user input".to_string()))
    }
}

/// Team participant that hands the turn to a human.
pub struct UserProxyAgent {
    name: String,
    description: String,
    input: Arc<dyn HumanInput>,
}

impl UserProxyAgent {
    pub fn new(name: impl Into<String>, input: Arc<dyn HumanInput>) -> Self {
        Self {
            name: name.into(),
            description: "A human user".to_string(),
            input,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl ChatParticipant for UserProxyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn respond(&self, _thread: &[Message], cancel: CancellationToken) -> Result<AgentReply, AgentError> {
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            text = self.input.read_input("Enter your response: ") => text?,
        };
        Ok(AgentReply {
            message: Message::user(text).with_name(self.name.clone()),
            inner_messages: Vec::new(),
        })
    }
}
