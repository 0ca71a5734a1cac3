//! Builds sessions and teams from a `ConvoyConfig`

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CodeExecutionConfig, ConfigLoader, ConvoyConfig, TeamConfig};
use crate::errors::AgentError;
use crate::executors::LocalCommandExecutor;
use crate::llm::{providers::create_llm_client, LLM};
use crate::session::ConversationSession;
use crate::team::{AssistantAgent, ChatParticipant, HumanInput, SelectorGroupChat, UserProxyAgent};
use crate::tools::{CodeExecutionTool, McpToolFactory, RMCPClientFactory, ToolFactory, ToolRegistry, ToolTransport};

pub const CODE_EXECUTION_TOOL: &str = "execute_python";

pub struct AgentFactory;

impl AgentFactory {
    /// The configured model client, or Azure OpenAI from the environment when
    /// the configuration has no `llm` section.
    pub fn configure_llm(config: &ConvoyConfig) -> Result<Arc<dyn LLM>, AgentError> {
        match &config.llm {
            Some(llm_config) => create_llm_client(llm_config),
            None => {
                log::info!("No llm section configured; reading Azure OpenAI settings from the environment");
                let from_env = ConfigLoader::from_env()?;
                let llm_config = from_env
                    .llm
                    .ok_or_else(|| AgentError::ConfigError("No LLM configuration available".to_string()))?;
                create_llm_client(&llm_config)
            }
        }
    }

    /// Local tools per `tools`, then every tool of each enabled MCP server.
    /// Servers that fail to start or list their tools are skipped.
    pub async fn configure_tools(config: &ConvoyConfig) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();

        if config.tools.travel {
            ToolFactory::register_travel_tools(&mut registry)?;
        }
        if config.tools.demo {
            ToolFactory::register_demo_tools(&mut registry)?;
        }
        if let Some(code_config) = &config.tools.code_execution {
            Self::register_code_execution(&mut registry, code_config)?;
        }

        let clients = RMCPClientFactory::create_client_collection(&config.mcp_servers).await;
        for client in clients {
            let allowed = config
                .mcp_servers
                .iter()
                .find(|s| s.name == client.name())
                .map(|s| s.tools.clone())
                .unwrap_or_default();
            let server_name = client.name().to_string();
            let transport: Arc<dyn ToolTransport> = Arc::new(client);
            match McpToolFactory::new(transport).register_all(&mut registry, &allowed).await {
                Ok(count) => log::info!("MCP server '{}' contributed {} tools", server_name, count),
                Err(e) => log::warn!("Skipping tools of MCP server '{}': {}", server_name, e),
            }
        }

        log::info!("Tool registry ready: {}", registry.names().join(", "));
        Ok(registry)
    }

    fn register_code_execution(registry: &mut ToolRegistry, config: &CodeExecutionConfig) -> Result<(), AgentError> {
        let executor = LocalCommandExecutor::new(config.work_dir.clone(), Duration::from_secs(config.timeout_secs))
            .with_python(config.python.clone());
        registry.register_tool(CodeExecutionTool::new(Arc::new(executor)))
    }

    pub async fn create_session(config: &ConvoyConfig, user_message: impl Into<String>) -> Result<ConversationSession, AgentError> {
        let llm = Self::configure_llm(config)?;
        Self::create_session_with_llm(config, llm, user_message).await
    }

    pub async fn create_session_with_llm(
        config: &ConvoyConfig,
        llm: Arc<dyn LLM>,
        user_message: impl Into<String>,
    ) -> Result<ConversationSession, AgentError> {
        let registry = Arc::new(Self::configure_tools(config).await?);
        Ok(ConversationSession::new(llm, registry, config.session.to_session_config(), user_message)
            .with_termination(config.termination.to_policy()))
    }

    pub async fn create_team(config: &ConvoyConfig, input: Arc<dyn HumanInput>) -> Result<SelectorGroupChat, AgentError> {
        let llm = Self::configure_llm(config)?;
        Self::create_team_with_llm(config, llm, input).await
    }

    /// One assistant per configured agent, each limited to the tools it names,
    /// plus the user proxy. The same model client drives the agents and the
    /// speaker selection. Without a `team` section the journalism preset is used.
    pub async fn create_team_with_llm(
        config: &ConvoyConfig,
        llm: Arc<dyn LLM>,
        input: Arc<dyn HumanInput>,
    ) -> Result<SelectorGroupChat, AgentError> {
        let team = config.team.clone().unwrap_or_else(TeamConfig::journalism);

        let mut registry = Self::configure_tools(config).await?;
        let wants_code = team.agents.iter().any(|a| a.tools.iter().any(|t| t == CODE_EXECUTION_TOOL));
        if wants_code && !registry.contains(CODE_EXECUTION_TOOL) {
            Self::register_code_execution(&mut registry, &CodeExecutionConfig::default())?;
        }

        let session_config = config.session.to_session_config();
        let mut participants: Vec<Arc<dyn ChatParticipant>> = Vec::new();
        for agent in &team.agents {
            let tools = registry.subset(&agent.tools).map_err(|e| {
                AgentError::ConfigError(format!("Agent '{}' references an unavailable tool: {}", agent.name, e))
            })?;
            participants.push(Arc::new(
                AssistantAgent::new(&agent.name, &agent.description, &agent.system_message, llm.clone())
                    .with_tools(Arc::new(tools))
                    .with_session_config(session_config.clone()),
            ));
        }
        if team.include_user_proxy {
            participants.push(Arc::new(UserProxyAgent::new(&team.user_proxy_name, input)));
        }

        Ok(SelectorGroupChat::new(participants, llm)?
            .with_termination(team.termination_policy())
            .with_repeated_speaker(team.allow_repeated_speaker)
            .with_selector_timeout(session_config.model_timeout)
            .with_max_turns(team.max_turns))
    }

    /// The team's configured task, or the journalism opener dated today.
    pub fn team_task(config: &ConvoyConfig) -> String {
        config
            .team
            .as_ref()
            .and_then(|t| t.task.clone())
            .unwrap_or_else(|| {
                format!(
                    "Ask the user to describe the article they want. Today's date is {}",
                    Local::now().format("%Y-%m-%d")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBuilder, TeamAgentConfig};
    use crate::core_types::{ModelTurn, ToolCallRequest};
    use crate::llm::ScriptedModelClient;
    use crate::session::StopReason;
    use crate::team::ScriptedInput;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_configure_tools_from_flags() {
        let dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .demo_tools(true)
            .code_execution(dir.path())
            .build()
            .unwrap();
        let registry = AgentFactory::configure_tools(&config).await.unwrap();
        assert_eq!(
            registry.names(),
            vec!["getWeather", "searchFlight", "bookHotel", "get_weather", "add", "execute_python"]
        );
    }

    #[tokio::test]
    async fn test_session_from_config_runs_tools() {
        let config = ConfigBuilder::new().travel_tools(false).demo_tools(true).build().unwrap();
        let llm = Arc::new(ScriptedModelClient::new(vec![
            ModelTurn::with_tool_calls("", vec![ToolCallRequest::new("c1", "add", r#"{"a": 2, "b": 3}"#)]),
            ModelTurn::text("2 + 3 = 5"),
        ]));

        let mut session = AgentFactory::create_session_with_llm(&config, llm, "What is 2 + 3?")
            .await
            .unwrap();
        let outcome = session.run().await.unwrap();
        assert_eq!(outcome.final_response.as_deref(), Some("2 + 3 = 5"));
        assert_eq!(outcome.stop_reason, StopReason::NoToolCalls);
        assert_eq!(session.history()[3].content, "5");
    }

    #[tokio::test]
    async fn test_team_from_config() {
        let team = TeamConfig {
            agents: vec![TeamAgentConfig {
                name: "writer".to_string(),
                description: "Writes".to_string(),
                system_message: "You write.".to_string(),
                tools: vec!["getWeather".to_string()],
            }],
            task: Some("Write about tides".to_string()),
            ..TeamConfig::journalism()
        };
        let config = ConfigBuilder::new().team(team).build().unwrap();
        let llm = Arc::new(ScriptedModelClient::new(vec![]));

        let chat = AgentFactory::create_team_with_llm(&config, llm, Arc::new(ScriptedInput::new(Vec::<String>::new())))
            .await
            .unwrap();
        assert_eq!(chat.participant_names(), vec!["writer", "User"]);
        assert_eq!(AgentFactory::team_task(&config), "Write about tides");
    }

    #[tokio::test]
    async fn test_team_with_unknown_tool_is_config_error() {
        let mut team = TeamConfig::journalism();
        team.agents[0].tools = vec!["no_such_tool".to_string()];
        let config = ConfigBuilder::new().team(team).build().unwrap();
        let llm = Arc::new(ScriptedModelClient::new(vec![]));

        let err = AgentFactory::create_team_with_llm(&config, llm, Arc::new(ScriptedInput::default()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_journalism_preset_gets_code_execution() {
        let config = ConfigBuilder::new().build().unwrap();
        let llm = Arc::new(ScriptedModelClient::new(vec![]));
        let chat = AgentFactory::create_team_with_llm(&config, llm, Arc::new(ScriptedInput::default()))
            .await
            .unwrap();
        assert_eq!(chat.participant_names().len(), 6);
        assert!(AgentFactory::team_task(&config).starts_with("Ask the user to describe the article they want."));
    }
}
