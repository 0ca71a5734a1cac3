//! Configuration type definitions
//!
//! Every section is optional in YAML and falls back to the defaults below, so
//! a minimal file only needs an `llm` block.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AgentError;
use crate::llm::ToolChoice;
use crate::session::SessionConfig;
use crate::termination::TerminationPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConvoyConfig {
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub termination: TerminationConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
    #[serde(default)]
    pub team: Option<TeamConfig>,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    /// OpenAI-compatible base URL (`custom`, or an `openai` proxy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Azure resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Azure deployment name; defaults to `model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub parameters: ModelParameters,
    #[serde(default)]
    pub auth: LlmAuth,
}

impl LlmConfig {
    /// The configured key, or the value of `api_key_env`.
    pub fn resolve_api_key(&self) -> Result<String, AgentError> {
        self.auth
            .api_key
            .clone()
            .or_else(|| {
                self.auth
                    .api_key_env
                    .as_ref()
                    .and_then(|env_var| std::env::var(env_var).ok())
            })
            .ok_or_else(|| {
                AgentError::ConfigError(format!(
                    "No API key found for {:?} provider. Set api_key or api_key_env",
                    self.provider
                ))
            })
    }
}

/// LLM provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Azure,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmAuth {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Seconds; 0 disables the timeout.
    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
    /// Seconds; 0 disables the timeout.
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    #[serde(default)]
    pub parallel_tool_calls: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
            model_timeout_secs: default_model_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            tool_choice: ToolChoice::Auto,
            parallel_tool_calls: false,
        }
    }
}

impl SessionSettings {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            system_prompt: self.system_prompt.clone(),
            max_iterations: self.max_iterations,
            model_timeout: seconds(self.model_timeout_secs),
            tool_timeout: seconds(self.tool_timeout_secs),
            tool_choice: self.tool_choice.clone(),
            parallel_tool_calls: self.parallel_tool_calls,
        }
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Termination for single sessions; unset fields do not participate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TerminationConfig {
    #[serde(default)]
    pub max_messages: Option<usize>,
    #[serde(default)]
    pub keyword: Option<String>,
}

impl TerminationConfig {
    pub fn to_policy(&self) -> TerminationPolicy {
        let mut policy = TerminationPolicy::never();
        if let Some(limit) = self.max_messages {
            policy = policy | TerminationPolicy::MessageCountLimit(limit);
        }
        if let Some(keyword) = &self.keyword {
            policy = policy | TerminationPolicy::KeywordMatch(keyword.clone());
        }
        policy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// getWeather, searchFlight and bookHotel.
    #[serde(default = "default_true")]
    pub travel: bool,
    /// get_weather(city) and add(a, b).
    #[serde(default)]
    pub demo: bool,
    #[serde(default)]
    pub code_execution: Option<CodeExecutionConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            travel: true,
            demo: false,
            code_execution: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeExecutionConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_code_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_python")]
    pub python: String,
}

impl Default for CodeExecutionConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            timeout_secs: default_code_timeout(),
            python: default_python(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    /// Child process speaking MCP over stdio. Exactly one of `command` and `url` is set.
    #[serde(default)]
    pub command: McpCommand,
    /// Streamable HTTP endpoint, e.g. `http://127.0.0.1:8080/mcp`.
    #[serde(default)]
    pub url: Option<String>,
    /// Tools to register from this server; empty registers all of them.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_mcp_timeout")]
    pub timeout: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpCommand {
    pub run: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub agents: Vec<TeamAgentConfig>,
    #[serde(default = "default_true")]
    pub include_user_proxy: bool,
    #[serde(default = "default_user_proxy_name")]
    pub user_proxy_name: String,
    #[serde(default = "default_true")]
    pub allow_repeated_speaker: bool,
    #[serde(default = "default_team_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_termination_keyword")]
    pub keyword: String,
    #[serde(default)]
    pub max_turns: Option<usize>,
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamAgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_message: String,
    /// Names of tools, local or from MCP servers, this agent may call.
    #[serde(default)]
    pub tools: Vec<String>,
}

impl TeamAgentConfig {
    fn new(name: &str, description: &str, system_message: &str, tools: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            system_message: system_message.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl TeamConfig {
    pub fn termination_policy(&self) -> TerminationPolicy {
        TerminationPolicy::KeywordMatch(self.keyword.clone()) | TerminationPolicy::MessageCountLimit(self.max_messages)
    }

    /// Journalism team: a writer, a researcher, an editor, a fact checker and an
    /// orchestrator that saves the approved article with `execute_python`.
    pub fn journalism() -> Self {
        Self {
            agents: vec![
                TeamAgentConfig::new(
                    "writer_assistant",
                    "A high-quality journalist agent who excels at writing a first draft of an article as well as revising the article based on feedback from the other agents",
                    "You are a high-quality journalist agent who excels at writing a first draft of an article as well as revising the article based on feedback from the other agents.  Do not just write bullet points on how you would write the article, but actually write it.  You can also ask for research to be conducted on certain topics.",
                    &[],
                ),
                TeamAgentConfig::new(
                    "web_search_agent",
                    "An agent who can search the web to conduct research and answer open questions",
                    "You are an agent who can search the web to conduct research and answer open questions.  You should return a list of entries with text, url, and title for each entry. Never reply with Terminate, just return the list of entries.",
                    &[],
                ),
                TeamAgentConfig::new(
                    "editor",
                    "An expert editor of written articles who can read an article and make suggestions for improvements",
                    "You are an expert editor.  You carefully read an article and make suggestions for improvements and suggest additional topics that should be researched to improve the article quality.",
                    &[],
                ),
                TeamAgentConfig::new(
                    "verifier_agent",
                    "A responsible agent who will verify the facts and ensure that the article is accurate and well-written",
                    "Ensure article accuracy and approve or reject with reasons. Explicitly approve or reject the article based on accuracy, giving your reasoning. You can ask for rewrites if you find inaccuracies.",
                    &[],
                ),
                TeamAgentConfig::new(
                    "orchestrator_agent",
                    "Team leader who verifies when the article is complete and meets all requirements",
                    "You are a leading a journalism team that conducts research to craft high-quality articles. If the article isn't well written, ask the writer for a rewrite. any article needs to be reviewed by the editor, and has been fact-checked and approved by the verifier agent, and approved by the user, then create python code to store the article to a file locally in markdown. once executed reply 'TERMINATE'.  Otherwise state what condition has not yet been met.",
                    &["execute_python"],
                ),
            ],
            include_user_proxy: true,
            user_proxy_name: default_user_proxy_name(),
            allow_repeated_speaker: true,
            max_messages: default_team_max_messages(),
            keyword: default_termination_keyword(),
            max_turns: None,
            task: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default = "default_env_files")]
    pub env_files: Vec<PathBuf>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
            env_files: default_env_files(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl ConvoyConfig {
    pub fn validate(&self) -> Result<(), AgentError> {
        if let Some(llm) = &self.llm {
            if llm.model.trim().is_empty() {
                return Err(AgentError::ConfigError("LLM model cannot be empty".to_string()));
            }
        }

        if self.session.max_iterations == 0 {
            return Err(AgentError::ConfigError(
                "session.max_iterations must be greater than 0".to_string(),
            ));
        }

        if self.termination.max_messages == Some(0) {
            return Err(AgentError::ConfigError(
                "termination.max_messages must be greater than 0".to_string(),
            ));
        }
        if matches!(&self.termination.keyword, Some(k) if k.is_empty()) {
            return Err(AgentError::ConfigError("termination.keyword cannot be empty".to_string()));
        }

        let mut server_names = std::collections::HashSet::new();
        for server in &self.mcp_servers {
            if server.name.is_empty() {
                return Err(AgentError::ConfigError("MCP server name cannot be empty".to_string()));
            }
            if !server_names.insert(server.name.as_str()) {
                return Err(AgentError::ConfigError(format!(
                    "Duplicate MCP server name: {}",
                    server.name
                )));
            }
            let has_command = !server.command.run.trim().is_empty();
            match (&server.url, has_command) {
                (Some(_), true) => {
                    return Err(AgentError::ConfigError(format!(
                        "MCP server '{}' sets both a command and a url",
                        server.name
                    )));
                }
                (Some(url), false) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                    return Err(AgentError::ConfigError(format!(
                        "MCP server '{}' url must start with http:// or https://",
                        server.name
                    )));
                }
                (None, false) => {
                    return Err(AgentError::ConfigError(format!(
                        "MCP server '{}' has an empty command",
                        server.name
                    )));
                }
                _ => {}
            }
        }

        if let Some(team) = &self.team {
            if team.agents.is_empty() {
                return Err(AgentError::ConfigError("team.agents cannot be empty".to_string()));
            }
            if team.max_messages == 0 {
                return Err(AgentError::ConfigError(
                    "team.max_messages must be greater than 0".to_string(),
                ));
            }
            let mut names = std::collections::HashSet::new();
            if team.include_user_proxy {
                names.insert(team.user_proxy_name.as_str());
            }
            for agent in &team.agents {
                if agent.name.trim().is_empty() {
                    return Err(AgentError::ConfigError("Team agent name cannot be empty".to_string()));
                }
                if !names.insert(agent.name.as_str()) {
                    return Err(AgentError::ConfigError(format!(
                        "Duplicate team participant name: {}",
                        agent.name
                    )));
                }
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(AgentError::ConfigError(format!("Invalid log level: {}", other))),
        }
    }
}

fn default_system_prompt() -> String {
    "You are an AI assistant that helps people find information.".to_string()
}

fn default_max_iterations() -> usize {
    10
}

fn default_model_timeout() -> u64 {
    60
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("coding")
}

fn default_code_timeout() -> u64 {
    60
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_mcp_timeout() -> u64 {
    30
}

fn default_user_proxy_name() -> String {
    "User".to_string()
}

fn default_team_max_messages() -> usize {
    30
}

fn default_termination_keyword() -> String {
    "TERMINATE".to_string()
}

fn default_env_files() -> Vec<PathBuf> {
    vec![PathBuf::from(".env")]
}

fn default_log_level() -> String {
    "info".to_string()
}
