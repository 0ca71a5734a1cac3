//! Tool registry and handler contracts
//!
//! A tool is a named local operation the model may ask to run. The registry
//! maps each name to its declared `ToolSpec` and a handler implementing
//! `ToolHandler`. Handlers are registered once at startup and the registry is
//! then shared read-only (behind an `Arc`) by every session that dispatches
//! tool calls against it. Handlers may be in-process functions or proxies to a
//! remote MCP server; dispatch treats both identically.

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::errors::{AgentError, DispatchError};

pub mod arguments;
pub mod calculator;
pub mod code_execution;
pub mod mcp_client;
pub mod mcp_tool;
pub mod rmcp_client;
pub mod travel;

pub use calculator::AddTool;
pub use code_execution::CodeExecutionTool;
pub use mcp_client::{
    MockToolTransport, PromptArgumentInfo, PromptInfo, RenderedPrompt, ResourceContent, ResourceInfo, ResourceTransport,
    ToolTransport,
};
pub use mcp_tool::{McpTool, McpToolFactory};
pub use rmcp_client::{RMCPClient, RMCPClientFactory, DEFAULT_MCP_URL};
pub use travel::{BookHotelTool, CityWeatherTool, GetWeatherTool, SearchFlightTool};

/// Declared interface of a tool, as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl ToolSpec {
    /// Build a spec, taking the required fields from the schema's `required` array.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameter_schema: Value) -> Self {
        let mut required_fields: Vec<String> = Vec::new();
        if let Some(required) = parameter_schema.get("required").and_then(|r| r.as_array()) {
            for field in required.iter().filter_map(|f| f.as_str()) {
                if !required_fields.iter().any(|existing| existing == field) {
                    required_fields.push(field.to_string());
                }
            }
        }
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
            required_fields,
        }
    }

    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.parameter_schema.get("properties").and_then(|p| p.as_object())
    }

    /// Every required field must be declared as a property.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::InvalidToolSpec {
                tool_name: self.name.clone(),
                message: "tool name must not be empty".to_string(),
            });
        }
        let missing: Vec<&str> = self
            .required_fields
            .iter()
            .filter(|field| !self.properties().is_some_and(|props| props.contains_key(field.as_str())))
            .map(|field| field.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::InvalidToolSpec {
                tool_name: self.name.clone(),
                message: format!("required fields not declared as properties: {}", missing.join(", ")),
            });
        }
        Ok(())
    }

    /// The JSON schema sent to the model, with `required` taken from `required_fields`.
    pub fn parameters(&self) -> Value {
        let mut schema = match &self.parameter_schema {
            Value::Object(map) => map.clone(),
            _ => {
                let mut map = Map::new();
                map.insert("type".to_string(), json!("object"));
                map.insert("properties".to_string(), json!({}));
                map
            }
        };
        if self.required_fields.is_empty() {
            schema.remove("required");
        } else {
            schema.insert("required".to_string(), json!(self.required_fields));
        }
        Value::Object(schema)
    }

    /// OpenAI `tools` array entry.
    pub fn to_openai_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters()
            }
        })
    }
}

/// Executes one tool call with already decoded arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError>;
}

/// A handler that also knows its own spec.
pub trait Tool: ToolHandler {
    fn spec(&self) -> ToolSpec;
}

/// Adapter turning an async closure into a `ToolHandler`.
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, AgentError>> + Send,
{
    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, AgentError> {
        (self.func)(arguments).await
    }
}

pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AgentError>> + Send + 'static,
{
    Arc::new(FnHandler { func })
}

#[derive(Clone)]
struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
    validator: Option<Arc<JSONSchema>>,
}

impl RegisteredTool {
    fn new(spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Self {
        let validator = match JSONSchema::compile(&spec.parameters()) {
            Ok(compiled) => Some(Arc::new(compiled)),
            Err(e) => {
                log::warn!(
                    "Parameter schema of tool '{}' does not compile ({}); arguments will not be validated",
                    spec.name,
                    e
                );
                None
            }
        };
        Self {
            spec,
            handler,
            validator,
        }
    }
}

/// Insertion-ordered mapping from tool name to spec and handler.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Result<(), AgentError> {
        if self.index.contains_key(&spec.name) {
            return Err(AgentError::DuplicateTool(spec.name));
        }
        spec.validate()?;
        log::debug!("Registering tool '{}'", spec.name);
        self.index.insert(spec.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool::new(spec, handler));
        Ok(())
    }

    pub fn register_tool<T: Tool + 'static>(&mut self, tool: T) -> Result<(), AgentError> {
        let spec = tool.spec();
        self.register(spec, Arc::new(tool))
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ToolHandler>, AgentError> {
        self.index
            .get(name)
            .map(|&i| self.tools[i].handler.clone())
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.tools[i].spec)
    }

    /// Specs in registration order.
    pub fn describe_all(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    pub fn to_openai_tools(&self) -> Vec<Value> {
        self.tools.iter().map(|t| t.spec.to_openai_tool()).collect()
    }

    /// Fill declared defaults for omitted fields, then check the arguments
    /// against the tool's parameter schema.
    pub fn prepare_arguments(
        &self,
        name: &str,
        mut arguments: Map<String, Value>,
    ) -> Result<Map<String, Value>, DispatchError> {
        let tool = self
            .index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or(DispatchError::UnknownTool)?;

        arguments::apply_defaults(&tool.spec, &mut arguments);
        if let Some(validator) = &tool.validator {
            arguments::validate(validator, &arguments)?;
        }
        Ok(arguments)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.spec.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// A registry holding only `names`, in the order given.
    pub fn subset(&self, names: &[String]) -> Result<ToolRegistry, AgentError> {
        let mut subset = ToolRegistry::new();
        for name in names {
            let tool = self
                .index
                .get(name)
                .map(|&i| self.tools[i].clone())
                .ok_or_else(|| AgentError::UnknownTool(name.clone()))?;
            if subset.index.contains_key(name) {
                return Err(AgentError::DuplicateTool(name.clone()));
            }
            subset.index.insert(name.clone(), subset.tools.len());
            subset.tools.push(tool);
        }
        Ok(subset)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Tool factory for the demo tools shipped with the crate
pub struct ToolFactory;

impl ToolFactory {
    /// getWeather, searchFlight and bookHotel.
    pub fn create_travel_registry() -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        Self::register_travel_tools(&mut registry)?;
        Ok(registry)
    }

    pub fn register_travel_tools(registry: &mut ToolRegistry) -> Result<(), AgentError> {
        registry.register_tool(GetWeatherTool::new())?;
        registry.register_tool(SearchFlightTool::new())?;
        registry.register_tool(BookHotelTool::new())?;
        Ok(())
    }

    /// get_weather(city) and add(a, b).
    pub fn register_demo_tools(registry: &mut ToolRegistry) -> Result<(), AgentError> {
        registry.register_tool(CityWeatherTool::new())?;
        registry.register_tool(AddTool::new())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_spec(name: &str) -> ToolSpec {
        ToolSpec::new(
            name,
            "Echo the input back",
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        )
    }

    fn echo_handler() -> Arc<dyn ToolHandler> {
        handler_fn(|args| async move { Ok(Value::Object(args)) })
    }

    #[test]
    fn test_tool_registry_creation() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec("echo"), echo_handler()).unwrap();

        let err = registry.register(echo_spec("echo"), echo_handler()).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_rejects_undeclared_required_field() {
        let mut registry = ToolRegistry::new();
        let spec = ToolSpec::new(
            "broken",
            "Requires a field it never declares",
            json!({"type": "object", "properties": {"a": {"type": "string"}}, "required": ["b"]}),
        );
        let err = registry.register(spec, echo_handler()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidToolSpec { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.resolve("missing").err().unwrap();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_resolve_twice_behaves_identically() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_spec("echo"), echo_handler()).unwrap();

        let first = registry.resolve("echo").unwrap();
        let second = registry.resolve("echo").unwrap();
        let args = json!({"text": "hi"}).as_object().unwrap().clone();

        assert_eq!(
            first.invoke(args.clone()).await.unwrap(),
            second.invoke(args).await.unwrap()
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_describe_all_is_insertion_ordered_and_stable() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(echo_spec(name), echo_handler()).unwrap();
        }
        let names: Vec<String> = registry.describe_all().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(registry.describe_all(), registry.describe_all());
        assert_eq!(registry.to_openai_tools(), registry.to_openai_tools());
    }

    #[test]
    fn test_openai_tool_format() {
        let tool = echo_spec("echo").to_openai_tool();
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["function"]["name"], "echo");
        assert_eq!(tool["function"]["parameters"]["required"], json!(["text"]));
    }

    #[test]
    fn test_prepare_arguments_applies_defaults() {
        let registry = ToolFactory::create_travel_registry().unwrap();
        let args = json!({"location": "Paris"}).as_object().unwrap().clone();
        let prepared = registry.prepare_arguments("getWeather", args).unwrap();
        assert_eq!(prepared["unit"], "celsius");
    }

    #[test]
    fn test_prepare_arguments_reports_missing_required() {
        let registry = ToolFactory::create_travel_registry().unwrap();
        let err = registry.prepare_arguments("bookHotel", Map::new()).unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentValidation(_)));
        assert!(err.to_string().starts_with("invalid arguments"));
    }

    #[test]
    fn test_tool_factory_registries() {
        let mut registry = ToolFactory::create_travel_registry().unwrap();
        ToolFactory::register_demo_tools(&mut registry).unwrap();
        assert_eq!(
            registry.names(),
            vec!["getWeather", "searchFlight", "bookHotel", "get_weather", "add"]
        );
    }

    #[test]
    fn test_subset_keeps_requested_tools() {
        let registry = ToolFactory::create_travel_registry().unwrap();
        let subset = registry
            .subset(&["bookHotel".to_string(), "getWeather".to_string()])
            .unwrap();
        assert_eq!(subset.names(), vec!["bookHotel", "getWeather"]);
        assert!(subset.prepare_arguments("getWeather", Map::new()).is_err());

        let err = registry.subset(&["execute_python".to_string()]).err().unwrap();
        assert!(matches!(err, AgentError::UnknownTool(_)));
    }
}
