//! Error types for the tool-calling loop
//!
//! Two layers of failure exist. `AgentError` covers everything that is surfaced
//! to the caller of a session, registry or loader: model call failures,
//! configuration problems, transport errors. `DispatchError` covers the
//! per-call failures that the dispatch loop recovers from locally and reports
//! back to the model as a tool message.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Model call failed: {0}")]
    ModelCall(String),
    #[error("Model call timed out after {seconds}s")]
    ModelTimeout { seconds: u64 },
    #[error("Model call was cancelled")]
    Cancelled,
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid tool spec for '{tool_name}': {message}")]
    InvalidToolSpec { tool_name: String, message: String },
    #[error("Tool execution failed for '{tool_name}': {message}")]
    ToolError { tool_name: String, message: String },
    #[error("Code execution failed: {0}")]
    CodeExecutionError(String),
    #[error("MCP client error: {0}")]
    MCPError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Session already terminated: {0}")]
    SessionTerminated(String),
    #[error("Termination policy violation: {0}")]
    TerminationPolicyViolation(String),
    #[error("Team error: {0}")]
    TeamError(String),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl AgentError {
    /// Whether the error belongs to the remote model call category, which is
    /// fatal to the owning session.
    pub fn is_model_call_error(&self) -> bool {
        matches!(
            self,
            AgentError::ModelCall(_)
                | AgentError::ModelTimeout { .. }
                | AgentError::Cancelled
                | AgentError::ParsingError(_)
        )
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::ModelCall(err.to_string())
    }
}

/// Failure of a single tool call inside a dispatch batch.
///
/// The `Display` text is exactly what ends up in `ToolCallResult::error` and in
/// the tool message returned to the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("invalid arguments")]
    ArgumentDecode { details: String },
    #[error("invalid arguments: {0}")]
    ArgumentValidation(String),
    #[error("unknown tool")]
    UnknownTool,
    #[error("{0}")]
    HandlerExecution(String),
}

impl From<AgentError> for DispatchError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::UnknownTool(_) => DispatchError::UnknownTool,
            AgentError::ToolError { message, .. } => DispatchError::HandlerExecution(message),
            other => DispatchError::HandlerExecution(other.to_string()),
        }
    }
}

// Errors raised by code executors
#[derive(Error, Debug)]
pub enum CodeExecutorError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("I/O error during code execution: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Script execution timed out after {0}s")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_display_matches_result_text() {
        let decode = DispatchError::ArgumentDecode {
            details: "expected value at line 1 column 1".to_string(),
        };
        assert_eq!(decode.to_string(), "invalid arguments");
        assert_eq!(DispatchError::UnknownTool.to_string(), "unknown tool");
        assert_eq!(
            DispatchError::ArgumentValidation("\"location\" is a required property".to_string())
                .to_string(),
            "invalid arguments: \"location\" is a required property"
        );
    }

    #[test]
    fn test_tool_error_converts_to_handler_execution() {
        let err = AgentError::ToolError {
            tool_name: "bookHotel".to_string(),
            message: "no rooms left".to_string(),
        };
        assert_eq!(
            DispatchError::from(err),
            DispatchError::HandlerExecution("no rooms left".to_string())
        );
    }

    #[test]
    fn test_model_call_category() {
        assert!(AgentError::ModelTimeout { seconds: 5 }.is_model_call_error());
        assert!(AgentError::Cancelled.is_model_call_error());
        assert!(!AgentError::UnknownTool("x".to_string()).is_model_call_error());
    }
}
