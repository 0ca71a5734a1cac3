//! Fluent construction of a `ConvoyConfig` in code

use crate::config::types::*;
use crate::errors::AgentError;
use crate::llm::ToolChoice;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: ConvoyConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ConvoyConfig {
                llm: Some(LlmConfig {
                    provider: LlmProvider::OpenAI,
                    model: "gpt-4.1-mini".to_string(),
                    base_url: None,
                    endpoint: None,
                    deployment: None,
                    api_version: None,
                    parameters: ModelParameters::default(),
                    auth: LlmAuth::default(),
                }),
                ..Default::default()
            },
        }
    }

    pub fn llm(mut self, llm: LlmConfig) -> Self {
        self.config.llm = Some(llm);
        self
    }

    pub fn openai(mut self, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.llm = Some(LlmConfig {
            provider: LlmProvider::OpenAI,
            model: model.into(),
            base_url: None,
            endpoint: None,
            deployment: None,
            api_version: None,
            parameters: ModelParameters::default(),
            auth: LlmAuth {
                api_key: Some(api_key.into()),
                ..Default::default()
            },
        });
        self
    }

    pub fn azure(
        mut self,
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let deployment = deployment.into();
        self.config.llm = Some(LlmConfig {
            provider: LlmProvider::Azure,
            model: deployment.clone(),
            base_url: None,
            endpoint: Some(endpoint.into()),
            deployment: Some(deployment),
            api_version: None,
            parameters: ModelParameters::default(),
            auth: LlmAuth {
                api_key: Some(api_key.into()),
                ..Default::default()
            },
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        if let Some(llm) = self.config.llm.as_mut() {
            llm.parameters.temperature = Some(temperature);
        }
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.session.system_prompt = prompt.into();
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.session.max_iterations = max_iterations;
        self
    }

    pub fn tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.config.session.tool_choice = tool_choice;
        self
    }

    pub fn parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.config.session.parallel_tool_calls = parallel;
        self
    }

    pub fn max_messages(mut self, limit: usize) -> Self {
        self.config.termination.max_messages = Some(limit);
        self
    }

    pub fn termination_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.config.termination.keyword = Some(keyword.into());
        self
    }

    pub fn travel_tools(mut self, enabled: bool) -> Self {
        self.config.tools.travel = enabled;
        self
    }

    pub fn demo_tools(mut self, enabled: bool) -> Self {
        self.config.tools.demo = enabled;
        self
    }

    pub fn code_execution(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.config.tools.code_execution = Some(CodeExecutionConfig {
            work_dir: work_dir.into(),
            ..Default::default()
        });
        self
    }

    pub fn mcp_server(mut self, server: McpServerConfig) -> Self {
        self.config.mcp_servers.push(server);
        self
    }

    pub fn team(mut self, team: TeamConfig) -> Self {
        self.config.team = Some(team);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn build(self) -> Result<ConvoyConfig, AgentError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
