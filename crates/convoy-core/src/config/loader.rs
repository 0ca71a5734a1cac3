//! Loading configuration from YAML and the process environment

use crate::config::types::*;
use crate::errors::AgentError;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::llm::providers::openai::DEFAULT_AZURE_API_VERSION;

pub const AZURE_ENDPOINT_ENV: &str = "AZURE_OPENAI_API_ENDPOINT";
pub const AZURE_API_KEY_ENV: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_API_VERSION_ENV: &str = "AZURE_OPENAI_API_VERSION";
pub const DEPLOYMENT_ENV: &str = "MODEL_DEPLOYMENT_NAME";
pub const DEFAULT_DEPLOYMENT: &str = "gpt-4.1";

pub struct ConfigLoader;

impl ConfigLoader {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<ConvoyConfig, AgentError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            AgentError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        log::debug!("Loaded config file {}", path.display());
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<ConvoyConfig, AgentError> {
        let mut config: ConvoyConfig = serde_yaml::from_str(content)
            .map_err(|e| AgentError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        Self::resolve_environment(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Azure OpenAI settings from `AZURE_OPENAI_API_ENDPOINT`, `AZURE_OPENAI_API_KEY`,
    /// `MODEL_DEPLOYMENT_NAME` and `AZURE_OPENAI_API_VERSION`; everything else defaulted.
    ///
    /// `./.env` is loaded first when present.
    pub fn from_env() -> Result<ConvoyConfig, AgentError> {
        Self::from_env_files(&EnvironmentConfig::default().env_files)
    }

    /// Like `from_env`, loading the given env files before reading any variable.
    pub fn from_env_files(env_files: &[PathBuf]) -> Result<ConvoyConfig, AgentError> {
        let environment = EnvironmentConfig {
            env_files: env_files.to_vec(),
            ..Default::default()
        };
        Self::load_env_files(&environment)?;

        let endpoint = env::var(AZURE_ENDPOINT_ENV)
            .map_err(|_| AgentError::ConfigError(format!("{} is not set", AZURE_ENDPOINT_ENV)))?;
        let deployment = env::var(DEPLOYMENT_ENV).unwrap_or_else(|_| DEFAULT_DEPLOYMENT.to_string());
        let api_version =
            env::var(AZURE_API_VERSION_ENV).unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string());

        let mut config = ConvoyConfig {
            llm: Some(LlmConfig {
                provider: LlmProvider::Azure,
                model: deployment.clone(),
                base_url: None,
                endpoint: Some(endpoint),
                deployment: Some(deployment),
                api_version: Some(api_version),
                parameters: ModelParameters::default(),
                auth: LlmAuth {
                    api_key_env: Some(AZURE_API_KEY_ENV.to_string()),
                    ..Default::default()
                },
            }),
            environment,
            ..Default::default()
        };

        Self::resolve_settings(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn resolve_environment(config: &mut ConvoyConfig) -> Result<(), AgentError> {
        Self::load_env_files(&config.environment)?;
        Self::resolve_settings(config);
        Ok(())
    }

    /// Env files first, then explicit `variables`, which win.
    fn load_env_files(environment: &EnvironmentConfig) -> Result<(), AgentError> {
        for env_file in &environment.env_files {
            if env_file.exists() {
                Self::load_env_file(env_file)?;
            }
        }

        for (key, value) in &environment.variables {
            env::set_var(key, value);
        }
        Ok(())
    }

    fn resolve_settings(config: &mut ConvoyConfig) {
        if let Some(llm) = config.llm.as_mut() {
            Self::resolve_llm_auth(llm);
        }

        for server in &mut config.mcp_servers {
            Self::resolve_mcp_env(&mut server.command.env);
        }
    }

    fn load_env_file<P: AsRef<Path>>(path: P) -> Result<(), AgentError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AgentError::ConfigError(format!("Failed to read env file {}: {}", path.as_ref().display(), e))
        })?;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                env::set_var(key.trim(), value);
            }
        }

        Ok(())
    }

    /// `api_key_env` wins; with neither key nor variable configured the
    /// provider's conventional variable is tried.
    fn resolve_llm_auth(llm: &mut LlmConfig) {
        let auth = &mut llm.auth;
        if let Some(env_var) = &auth.api_key_env {
            if let Ok(api_key) = env::var(env_var) {
                auth.api_key = Some(api_key);
            }
        }

        if auth.api_key.is_none() && auth.api_key_env.is_none() {
            let conventional = match llm.provider {
                LlmProvider::Azure => AZURE_API_KEY_ENV,
                LlmProvider::OpenAI | LlmProvider::Custom => "OPENAI_API_KEY",
            };
            if let Ok(api_key) = env::var(conventional) {
                auth.api_key = Some(api_key);
            }
        }
    }

    /// Values written as `$NAME` are replaced by that variable when it is set.
    fn resolve_mcp_env(env_vars: &mut HashMap<String, String>) {
        for value in env_vars.values_mut() {
            if let Some(name) = value.strip_prefix('$') {
                if let Ok(resolved) = env::var(name) {
                    *value = resolved;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
llm:
  provider: openai
  model: gpt-4.1-mini
  auth:
    api_key: sk-file
session:
  max_iterations: 4
"#
        )
        .unwrap();

        let config = ConfigLoader::from_file(file.path()).await.unwrap();
        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::OpenAI);
        assert_eq!(llm.auth.api_key.as_deref(), Some("sk-file"));
        assert_eq!(config.session.max_iterations, 4);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = ConfigLoader::from_file("/nonexistent/convoy.yaml").await.unwrap_err();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    #[serial]
    fn test_mcp_env_resolution() {
        env::set_var("CONVOY_TEST_TOKEN", "secret");
        let config = ConfigLoader::from_str(
            r#"
mcp_servers:
  - name: weather
    command:
      run: weather-server
      env:
        TOKEN: $CONVOY_TEST_TOKEN
        PLAIN: value
        MISSING: $CONVOY_TEST_UNSET
"#,
        )
        .unwrap();
        let env_vars = &config.mcp_servers[0].command.env;
        assert_eq!(env_vars["TOKEN"], "secret");
        assert_eq!(env_vars["PLAIN"], "value");
        assert_eq!(env_vars["MISSING"], "$CONVOY_TEST_UNSET");
        env::remove_var("CONVOY_TEST_TOKEN");
    }

    #[test]
    #[serial]
    fn test_env_file_loaded() {
        let mut env_file = NamedTempFile::new().unwrap();
        writeln!(env_file, "# comment\nCONVOY_TEST_FROM_FILE=\"from-file\"").unwrap();
        let yaml = format!(
            "environment:\n  env_files:\n    - {}\n",
            env_file.path().display()
        );

        ConfigLoader::from_str(&yaml).unwrap();
        assert_eq!(env::var("CONVOY_TEST_FROM_FILE").unwrap(), "from-file");
        env::remove_var("CONVOY_TEST_FROM_FILE");
    }

    #[test]
    #[serial]
    fn test_from_env_builds_azure_config() {
        env::set_var(AZURE_ENDPOINT_ENV, "https://example.openai.azure.com");
        env::set_var(AZURE_API_KEY_ENV, "azure-key");
        env::remove_var(DEPLOYMENT_ENV);
        env::remove_var(AZURE_API_VERSION_ENV);

        let config = ConfigLoader::from_env().unwrap();
        let llm = config.llm.unwrap();
        assert_eq!(llm.provider, LlmProvider::Azure);
        assert_eq!(llm.deployment.as_deref(), Some(DEFAULT_DEPLOYMENT));
        assert_eq!(llm.api_version.as_deref(), Some("2025-01-01-preview"));
        assert_eq!(llm.auth.api_key.as_deref(), Some("azure-key"));

        env::remove_var(AZURE_ENDPOINT_ENV);
        env::remove_var(AZURE_API_KEY_ENV);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_dotenv_before_variables() {
        env::remove_var(AZURE_ENDPOINT_ENV);
        env::remove_var(AZURE_API_KEY_ENV);
        env::remove_var(DEPLOYMENT_ENV);
        env::remove_var(AZURE_API_VERSION_ENV);

        let mut env_file = NamedTempFile::new().unwrap();
        writeln!(
            env_file,
            "AZURE_OPENAI_API_ENDPOINT=https://dotenv.openai.azure.com\nAZURE_OPENAI_API_KEY=dotenv-key\nMODEL_DEPLOYMENT_NAME=gpt-4o"
        )
        .unwrap();

        let config = ConfigLoader::from_env_files(&[env_file.path().to_path_buf()]).unwrap();
        let llm = config.llm.unwrap();
        assert_eq!(llm.endpoint.as_deref(), Some("https://dotenv.openai.azure.com"));
        assert_eq!(llm.deployment.as_deref(), Some("gpt-4o"));
        assert_eq!(llm.auth.api_key.as_deref(), Some("dotenv-key"));

        env::remove_var(AZURE_ENDPOINT_ENV);
        env::remove_var(AZURE_API_KEY_ENV);
        env::remove_var(DEPLOYMENT_ENV);
    }

    #[test]
    #[serial]
    fn test_from_env_requires_endpoint() {
        env::remove_var(AZURE_ENDPOINT_ENV);
        assert!(matches!(ConfigLoader::from_env(), Err(AgentError::ConfigError(_))));
    }
}
