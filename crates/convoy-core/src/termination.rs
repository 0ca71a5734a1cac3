//! Conditions that end a conversation.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

use crate::core_types::{Message, Role};

/// Message-count ceiling, keyword match, or any combination of them joined with `|`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Terminal once the history holds at least this many messages.
    MessageCountLimit(usize),
    /// Terminal once any assistant message contains the token (case-sensitive).
    KeywordMatch(String),
    /// Terminal when any member is.
    Any(Vec<TerminationPolicy>),
}

impl TerminationPolicy {
    /// A policy that never fires on its own.
    pub fn never() -> Self {
        TerminationPolicy::Any(Vec::new())
    }

    pub fn evaluate(&self, history: &[Message]) -> bool {
        self.stop_reason(history).is_some()
    }

    /// Which primitive fired, described for the caller.
    pub fn stop_reason(&self, history: &[Message]) -> Option<String> {
        match self {
            TerminationPolicy::MessageCountLimit(limit) => (history.len() >= *limit)
                .then(|| format!("Maximum number of messages {} reached, current message count: {}", limit, history.len())),
            TerminationPolicy::KeywordMatch(token) => history
                .iter()
                .any(|m| m.role == Role::Assistant && m.content.contains(token.as_str()))
                .then(|| format!("Text '{}' mentioned", token)),
            TerminationPolicy::Any(policies) => policies.iter().find_map(|p| p.stop_reason(history)),
        }
    }

    fn into_members(self) -> Vec<TerminationPolicy> {
        match self {
            TerminationPolicy::Any(policies) => policies,
            other => vec![other],
        }
    }
}

impl BitOr for TerminationPolicy {
    type Output = TerminationPolicy;

    fn bitor(self, rhs: TerminationPolicy) -> TerminationPolicy {
        let mut members = self.into_members();
        members.extend(rhs.into_members());
        TerminationPolicy::Any(members)
    }
}

/// Running view of a policy over a growing history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationState {
    pub message_count: usize,
    /// Set once any assistant message has carried a termination keyword.
    pub last_seen_keyword_hit: bool,
    pub terminal: bool,
    pub reason: Option<String>,
}

impl TerminationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the state from the history; returns whether it is terminal.
    /// Once terminal it stays terminal.
    pub fn update(&mut self, policy: &TerminationPolicy, history: &[Message]) -> bool {
        self.message_count = history.len();
        self.last_seen_keyword_hit |= keyword_hit(policy, history);
        if !self.terminal {
            if let Some(reason) = policy.stop_reason(history) {
                log::info!("Termination condition met: {}", reason);
                self.terminal = true;
                self.reason = Some(reason);
            }
        }
        self.terminal
    }
}

/// Whether an assistant message contains any keyword of the policy.
fn keyword_hit(policy: &TerminationPolicy, history: &[Message]) -> bool {
    match policy {
        TerminationPolicy::MessageCountLimit(_) => false,
        TerminationPolicy::KeywordMatch(token) => history
            .iter()
            .any(|m| m.role == Role::Assistant && m.content.contains(token.as_str())),
        TerminationPolicy::Any(policies) => policies.iter().any(|p| keyword_hit(p, history)),
    }
}
