//! Next-speaker selection for the group chat.

use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core_types::Message;
use crate::errors::AgentError;
use crate::llm::{generate_guarded, ModelRequest, ToolChoice, LLM};

/// Name and description of one participant, as shown to the selector model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub description: String,
}

pub struct SpeakerSelector {
    llm: Arc<dyn LLM>,
    allow_repeated_speaker: bool,
    timeout: Option<Duration>,
}

impl SpeakerSelector {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self {
            llm,
            allow_repeated_speaker: false,
            timeout: Some(Duration::from_secs(60)),
        }
    }

    /// Deadline for each selector model call; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_repeated_speaker(mut self, allow: bool) -> Self {
        self.allow_repeated_speaker = allow;
        self
    }

    pub fn allows_repeated_speaker(&self) -> bool {
        self.allow_repeated_speaker
    }

    /// Index into `roster` of the participant that speaks next.
    ///
    /// A model failure, timeout or cancellation is returned as an error.
    pub async fn select(
        &self,
        roster: &[Candidate],
        thread: &[Message],
        previous: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<usize, AgentError> {
        if roster.is_empty() {
            return Err(AgentError::TeamError("No participants to select from".to_string()));
        }

        let eligible = self.eligible(roster.len(), previous);
        if eligible.len() == 1 {
            return Ok(eligible[0]);
        }

        let prompt = selector_prompt(roster, &eligible, thread);
        let request = ModelRequest::new(vec![Message::system(prompt)]).with_tool_choice(ToolChoice::None);
        let turn = generate_guarded(self.llm.clone(), request, self.timeout, cancel).await?;
        let answer = turn.message.content;
        log::debug!("Selector answered: {}", answer);

        match parse_selection(&answer, roster, &eligible) {
            Some(index) => Ok(index),
            None => {
                let fallback = round_robin(&eligible, previous);
                log::warn!(
                    "Could not find a participant name in selector answer {:?}; falling back to '{}'",
                    answer,
                    roster[fallback].name
                );
                Ok(fallback)
            }
        }
    }

    fn eligible(&self, roster_len: usize, previous: Option<usize>) -> Vec<usize> {
        match previous {
            Some(prev) if !self.allow_repeated_speaker && roster_len > 1 => {
                (0..roster_len).filter(|&i| i != prev).collect()
            }
            _ => (0..roster_len).collect(),
        }
    }
}

pub fn selector_prompt(roster: &[Candidate], eligible: &[usize], thread: &[Message]) -> String {
    let roles = roster
        .iter()
        .map(|c| format!("{}: {}", c.name, c.description))
        .collect::<Vec<_>>()
        .join("\n");
    let participants = format!(
        "[{}]",
        eligible
            .iter()
            .map(|&i| format!("'{}'", roster[i].name))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let history = thread
        .iter()
        .map(|m| format!("{}: {}", m.name.as_deref().unwrap_or(m.role.as_str()), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are in a role play game. The following roles are available:\n{roles}.\n\
         Read the following conversation. Then select the next role from {participants} to play. Only return the role.\n\n\
         {history}\n\n\
         Read the above conversation. Then select the next role from {participants} to play. Only return the role."
    )
}

/// Exact name first, otherwise the eligible name mentioned earliest in the answer.
pub fn parse_selection(answer: &str, roster: &[Candidate], eligible: &[usize]) -> Option<usize> {
    let trimmed = answer.trim().trim_matches(|c: char| c == '\'' || c == '"' || c == '`' || c == '.');
    if let Some(&index) = eligible.iter().find(|&&i| roster[i].name == trimmed) {
        return Some(index);
    }

    eligible
        .iter()
        .filter_map(|&i| {
            let pattern = format!(r"\b{}\b", regex::escape(&roster[i].name));
            let re = Regex::new(&pattern).ok()?;
            re.find(answer).map(|m| (m.start(), i))
        })
        .min()
        .map(|(_, i)| i)
}

fn round_robin(eligible: &[usize], previous: Option<usize>) -> usize {
    match previous {
        Some(prev) => eligible
            .iter()
            .copied()
            .find(|&i| i > prev)
            .unwrap_or(eligible[0]),
        None => eligible[0],
    }
}
