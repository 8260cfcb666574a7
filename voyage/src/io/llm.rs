//! Language-model collaborator.
//!
//! The model is any command that reads a prompt on stdin and writes the
//! completion to stdout. Failures come back as [`CollaboratorError`] so the
//! executor can classify them.

use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::errors::CollaboratorError;
use crate::io::config::LlmConfig;
use crate::io::process::{Exit, run_with_deadline};

/// Which prompt a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Intent,
    Planner,
    Synthesis,
}

impl PromptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptKind::Intent => "intent",
            PromptKind::Planner => "planner",
            PromptKind::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub kind: PromptKind,
    pub prompt: String,
}

pub trait LanguageModel {
    fn generate(&self, request: &GenerateRequest) -> Result<String, CollaboratorError>;
}

/// Model backed by an external command with a wall-clock deadline.
#[derive(Debug, Clone)]
pub struct CommandModel {
    config: LlmConfig,
}

impl CommandModel {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

impl LanguageModel for CommandModel {
    #[instrument(skip_all, fields(kind = %request.kind))]
    fn generate(&self, request: &GenerateRequest) -> Result<String, CollaboratorError> {
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(CollaboratorError::Unknown(
                "no model command configured (set llm.command)".to_string(),
            ));
        };
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let run = run_with_deadline(
            program,
            args,
            request.prompt.as_bytes(),
            timeout,
            self.config.output_limit_bytes,
        )
        .map_err(spawn_error)?;

        match run.exit {
            Exit::DeadlineExceeded => {
                warn!(timeout_secs = timeout.as_secs(), "model call exceeded deadline");
                return Err(CollaboratorError::Timeout(format!(
                    "{} call exceeded {}s",
                    request.kind,
                    timeout.as_secs()
                )));
            }
            Exit::Finished(status) if !status.success() => {
                return Err(CollaboratorError::Unknown(format!(
                    "{program} exited with {:?}: {}",
                    status.code(),
                    run.stderr.last_line()
                )));
            }
            Exit::Finished(_) => {}
        }
        let text = run.stdout.text();
        if text.trim().is_empty() {
            return Err(CollaboratorError::Parse(format!(
                "{} call returned no output",
                request.kind
            )));
        }
        debug!(bytes = text.len(), "model call completed");
        Ok(text)
    }
}

/// A missing model binary will not appear on retry; other plumbing failures
/// might.
fn spawn_error(err: anyhow::Error) -> CollaboratorError {
    let message = format!("{err:#}");
    match err.downcast_ref::<io::Error>() {
        Some(io_err) if io_err.kind() == io::ErrorKind::NotFound => CollaboratorError::Unknown(message),
        _ => CollaboratorError::ConnectionFailure(message),
    }
}
