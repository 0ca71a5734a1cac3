//! LLM provider implementations
//!
//! Every supported provider speaks the chat-completions protocol, so they all
//! share `OpenAIClient` and differ only in URL layout and authentication.

use std::sync::Arc;

use crate::config::{LlmConfig, LlmProvider};
use crate::errors::AgentError;
use crate::llm::LLM;

pub mod openai;

pub use openai::OpenAIClient;

/// Create an LLM client based on the provider configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, AgentError> {
    validate_provider_config(config)?;
    log::info!("Creating {:?} client for model '{}'", config.provider, config.model);
    match config.provider {
        LlmProvider::OpenAI => openai::create_client(config),
        LlmProvider::Azure => openai::create_azure_client(config),
        LlmProvider::Custom => openai::create_custom_client(config),
    }
}

/// Validate provider-specific configuration
pub fn validate_provider_config(config: &LlmConfig) -> Result<(), AgentError> {
    if config.model.trim().is_empty() {
        return Err(AgentError::ConfigError("LLM model must not be empty".to_string()));
    }
    match config.provider {
        LlmProvider::OpenAI => {
            if config.auth.api_key.is_none() && config.auth.api_key_env.is_none() {
                return Err(AgentError::ConfigError(
                    "OpenAI provider requires either 'api_key' or 'api_key_env'".to_string(),
                ));
            }
        }
        LlmProvider::Azure => {
            if config.endpoint.as_deref().map_or(true, |e| e.trim().is_empty()) {
                return Err(AgentError::ConfigError(
                    "Azure provider requires a non-empty 'endpoint'".to_string(),
                ));
            }
            if config.auth.api_key.is_none() && config.auth.api_key_env.is_none() {
                return Err(AgentError::ConfigError(
                    "Azure provider requires either 'api_key' or 'api_key_env'".to_string(),
                ));
            }
        }
        LlmProvider::Custom => {
            if config.base_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(AgentError::ConfigError(
                    "Custom provider requires a valid 'base_url'".to_string(),
                ));
            }
        }
    }
    Ok(())
}
