//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between the planner, orchestrator,
//! executor, triage, and evaluator. They must not depend on external state or
//! I/O and must serialize identically across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Execution status of a single plan step.
///
/// Transitions are monotone: `pending → in_progress → {completed | blocked |
/// failed | invalid}`. The only way back to `pending` is a triage retry from
/// `blocked` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
    Failed,
    Invalid,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
            StepStatus::Failed => "failed",
            StepStatus::Invalid => "invalid",
        }
    }

    /// True for the statuses the executor reports when a step did not complete.
    pub fn is_unsuccessful(self) -> bool {
        matches!(
            self,
            StepStatus::Blocked | StepStatus::Failed | StepStatus::Invalid
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run stopped. Write-once on [`crate::core::state::RunState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    #[default]
    None,
    Finalized,
    MaxIters,
    UserInputRequired,
}

impl TerminationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::None => "none",
            TerminationReason::Finalized => "finalized",
            TerminationReason::MaxIters => "max_iters",
            TerminationReason::UserInputRequired => "user_input_required",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != TerminationReason::None
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator decision for the next loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Execute the step with this id.
    RunStep(String),
    /// No pending work remains; run the finalize path.
    Finalize,
    /// The loop guard tripped.
    Abort,
}

/// Severity tier assigned to a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Core input is unusable; the run cannot proceed without the user.
    Blocking,
    /// A primary tool or synthesis failed.
    Major,
    /// An enrichment tool failed.
    Minor,
}

/// Failure taxonomy at the executor boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    TransientNetwork,
    Structural,
    MissingTool,
    Resource,
    Unknown,
}

impl ErrorClass {
    pub fn is_transient(self) -> bool {
        self == ErrorClass::TransientNetwork
    }
}

/// Issue triage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AskUser,
    Skip,
    Retry,
}

/// Audit record attached to a step for every triage decision taken on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageRecord {
    /// `attempt_count` of the step when the failure was triaged.
    pub attempt: u32,
    pub tier: Tier,
    pub class: ErrorClass,
    pub decision: Decision,
    /// Decision-table row that matched.
    pub reason: String,
    /// Rendered collaborator error.
    pub error: String,
}

/// Kind of document kept by the memory collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Profile,
    Preference,
    TripSummary,
    ToolOutput,
    Note,
}

/// A ranked snippet returned from memory retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHit {
    pub id: String,
    pub text: String,
    pub kind: MemoryKind,
    pub score: f64,
}

/// Overall verdict produced by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Good,
    NeedsWork,
    Failed,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Good => "good",
            OverallStatus::NeedsWork => "needs_work",
            OverallStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
