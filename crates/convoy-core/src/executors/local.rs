use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

use super::{CodeExecutor, ExecutionResult};
use crate::errors::CodeExecutorError;

/// Runs scripts with interpreters installed on the host, inside a working directory.
pub struct LocalCommandExecutor {
    work_dir: PathBuf,
    timeout: Duration,
    python: String,
}

impl LocalCommandExecutor {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout,
            python: "python3".to_string(),
        }
    }

    pub fn with_python(mut self, interpreter: impl Into<String>) -> Self {
        self.python = interpreter.into();
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn interpreter(&self, language: &str) -> Result<(String, &'static str), CodeExecutorError> {
        match language.to_lowercase().as_str() {
            "python" | "python3" | "py" => Ok((self.python.clone(), "py")),
            "sh" | "shell" => Ok(("sh".to_string(), "sh")),
            "bash" => Ok(("bash".to_string(), "sh")),
            other => Err(CodeExecutorError::UnsupportedLanguage(other.to_string())),
        }
    }
}

#[async_trait]
impl CodeExecutor for LocalCommandExecutor {
    async fn execute_code(&self, language: &str, code: &str) -> Result<ExecutionResult, CodeExecutorError> {
        let (program, extension) = self.interpreter(language)?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let script_name = format!("tmp_code_{}.{}", Uuid::new_v4().simple(), extension);
        let script_path = self.work_dir.join(&script_name);
        tokio::fs::write(&script_path, code).await?;

        log::debug!("Running {} script {:?} in {:?}", program, script_name, self.work_dir);

        let child = Command::new(&program)
            .arg(&script_name)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let outcome = match child {
            Ok(child) => match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(output) => output.map_err(CodeExecutorError::from),
                Err(_) => {
                    log::warn!("Script {} timed out after {:?}", script_name, self.timeout);
                    Err(CodeExecutorError::Timeout(self.timeout.as_secs()))
                }
            },
            Err(e) => Err(CodeExecutorError::from(e)),
        };

        if let Err(e) = tokio::fs::remove_file(&script_path).await {
            log::debug!("Could not remove {:?}: {}", script_path, e);
        }

        let output = outcome?;
        Ok(ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
