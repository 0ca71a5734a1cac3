//! Tool-calling conversations and multi-agent team chat over hosted language models.
//!
//! The pieces, bottom-up:
//!
//! - **Tools**: `ToolRegistry` maps tool names to a JSON-Schema `ToolSpec` and a
//!   handler. Handlers run in-process or proxy a remote MCP server.
//! - **Dispatch**: `DispatchLoop` turns the tool calls of one model turn into
//!   results, decoding and validating arguments and mapping every failure to
//!   an error result instead of aborting the turn.
//! - **Sessions**: `ConversationSession` alternates model calls and dispatch
//!   until the model stops asking for tools, a `TerminationPolicy` fires or
//!   the iteration cap is reached.
//! - **Teams**: `SelectorGroupChat` lets several named participants share one
//!   thread, with a model call choosing who speaks next.

pub mod config;
pub mod core_types;
pub mod dispatch;
pub mod errors;
pub mod executors;
pub mod factory;
pub mod llm;
pub mod session;
pub mod team;
pub mod termination;
pub mod tools;

pub use config::{ConfigBuilder, ConfigLoader, ConvoyConfig};
pub use core_types::{Message, ModelTurn, Role, ToolCallRequest, ToolCallResult};
pub use dispatch::DispatchLoop;
pub use errors::{AgentError, DispatchError};
pub use executors::CodeExecutor;
pub use factory::AgentFactory;
pub use llm::{ModelRequest, ToolChoice, LLM};
pub use session::{ConversationSession, SessionConfig, SessionOutcome, SessionState, StopReason};
pub use team::{SelectorGroupChat, TaskResult, TeamEvent};
pub use termination::{TerminationPolicy, TerminationState};
pub use tools::{ToolRegistry, ToolSpec};

#[cfg(test)]
pub mod test_utils;
