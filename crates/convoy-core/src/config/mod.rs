//! Configuration for sessions, tools, MCP servers and teams
//!
//! Configuration is read from YAML (`ConfigLoader::from_file`), from the Azure
//! OpenAI environment variables (`ConfigLoader::from_env`) or assembled in code
//! with `ConfigBuilder`.

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::ConfigBuilder;
pub use loader::*;
pub use types::*;


use crate::errors::AgentError;
use std::path::Path;

pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<ConvoyConfig, AgentError> {
    ConfigLoader::from_file(path).await
}

pub fn config() -> ConfigBuilder {
    ConfigBuilder::new()
}

pub fn validate_config(config: &ConvoyConfig) -> Result<(), AgentError> {
    config.validate()
}
