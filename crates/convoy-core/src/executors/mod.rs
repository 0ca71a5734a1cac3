//! Code execution environments.
//!
//! The team chat's orchestrator saves its work by running short scripts. A
//! `CodeExecutor` receives a language tag and source text and reports what the
//! process printed and how it exited.

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::CodeExecutorError;

pub mod local;

pub use local::LocalCommandExecutor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute_code(&self, language: &str, code: &str) -> Result<ExecutionResult, CodeExecutorError>;
}
