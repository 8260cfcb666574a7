//! Typed error boundaries of the orchestration core.
//!
//! [`CollaboratorError`] is what tools, the language model, and artifact
//! writers report back to the executor; it is always caught and classified.
//! [`InvariantViolation`] is the Logic tier: a bug in the orchestration itself.
//! It is never classified, never triaged, and aborts the run.

use thiserror::Error;

use crate::core::types::{StepStatus, TerminationReason};

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    /// A referenced entity could not be resolved. `argument` names the input
    /// that referred to it, when known.
    #[error("not found: {message}")]
    NotFound {
        argument: Option<String>,
        message: String,
    },
    #[error("invalid argument: {message}")]
    InvalidArgument {
        argument: Option<String>,
        message: String,
    },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("resource error: {0}")]
    Resource(String),
    #[error("{0}")]
    Unknown(String),
}

impl CollaboratorError {
    pub fn not_found(argument: &str, message: impl Into<String>) -> Self {
        CollaboratorError::NotFound {
            argument: Some(argument.to_string()),
            message: message.into(),
        }
    }

    pub fn invalid_argument(argument: &str, message: impl Into<String>) -> Self {
        CollaboratorError::InvalidArgument {
            argument: Some(argument.to_string()),
            message: message.into(),
        }
    }

    /// The input argument this error refers to, if any.
    pub fn argument(&self) -> Option<&str> {
        match self {
            CollaboratorError::NotFound { argument, .. }
            | CollaboratorError::InvalidArgument { argument, .. } => argument.as_deref(),
            _ => None,
        }
    }
}

/// Orchestration invariant broken. Fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("orchestrator invoked while step '{0}' is in progress")]
    StepInFlight(String),
    #[error("run already terminated ({0})")]
    AlreadyTerminated(TerminationReason),
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("unknown step '{0}'")]
    UnknownStep(String),
    #[error("step '{id}' cannot move from {from} to {to}")]
    IllegalTransition {
        id: String,
        from: StepStatus,
        to: StepStatus,
    },
    #[error("step '{0}' exceeded its retry bound")]
    RetryBoundExceeded(String),
    #[error("{0} is write-once and was already set")]
    WriteOnce(String),
    #[error("inconsistent run state: {0}")]
    InconsistentState(String),
}
