use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::errors::AgentError;
use crate::executors::CodeExecutor;
use crate::tools::{Tool, ToolHandler, ToolSpec};

/// Exposes a `CodeExecutor` to the model as the `execute_python` tool.
pub struct CodeExecutionTool {
    executor: Arc<dyn CodeExecutor>,
}

impl CodeExecutionTool {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ToolHandler for CodeExecutionTool {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        let code = arguments
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::ToolError {
                tool_name: "execute_python".to_string(),
                message: "Missing or invalid 'code' parameter".to_string(),
            })?;

        let result = self
            .executor
            .execute_code("python", code)
            .await
            .map_err(|e| AgentError::ToolError {
                tool_name: "execute_python".to_string(),
                message: AgentError::CodeExecutionError(e.to_string()).to_string(),
            })?;

        Ok(json!({
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exit_code": result.exit_code,
            "success": result.success()
        }))
    }
}

impl Tool for CodeExecutionTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "execute_python",
            "Execute Python code in the working directory and return its output.",
            json!({
                "type": "object",
                "properties": {
                    "code": {"type": "string", "description": "Python source to execute"}
                },
                "required": ["code"]
            }),
        )
    }
}
