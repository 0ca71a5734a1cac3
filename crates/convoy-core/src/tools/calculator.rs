//! Integer addition, the smallest useful tool for wiring checks.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::errors::AgentError;
use crate::tools::{Tool, ToolHandler, ToolSpec};

pub struct AddTool;

impl AddTool {
    pub fn new() -> Self {
        Self
    }

    fn operand(arguments: &Map<String, Value>, key: &str) -> Result<i64, AgentError> {
        arguments
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AgentError::ToolError {
                tool_name: "add".to_string(),
                message: format!("Missing or invalid integer parameter '{}'", key),
            })
    }
}

impl Default for AddTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for AddTool {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        let a = Self::operand(&arguments, "a")?;
        let b = Self::operand(&arguments, "b")?;
        let sum = a.checked_add(b).ok_or_else(|| AgentError::ToolError {
            tool_name: "add".to_string(),
            message: "Integer overflow".to_string(),
        })?;
        log::info!("add: {} + {} = {}", a, b, sum);
        Ok(json!(sum))
    }
}

impl Tool for AddTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "add",
            "Add two numbers",
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "integer"},
                    "b": {"type": "integer"}
                },
                "required": ["a", "b"]
            }),
        )
    }
}
