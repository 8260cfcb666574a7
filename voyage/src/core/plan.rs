//! Plan and step model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::InvariantViolation;
use crate::core::invariants::validate_plan;
use crate::core::types::{StepStatus, TriageRecord};

/// Automatic retries allowed per step.
pub const MAX_RETRIES: u32 = 1;

/// What a step does. Tool bindings only exist on [`StepKind::ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    RetrieveContext {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
    },
    ToolCall {
        tool_name: String,
        #[serde(default)]
        tool_args: Map<String, Value>,
    },
    Synthesize,
}

impl StepKind {
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::RetrieveContext { .. } => "RETRIEVE_CONTEXT",
            StepKind::ToolCall { .. } => "TOOL_CALL",
            StepKind::Synthesize => "SYNTHESIZE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triage: Vec<TriageRecord>,
}

impl Step {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            status: StepStatus::Pending,
            attempt_count: 0,
            notes: None,
            triage: Vec::new(),
        }
    }

    pub fn tool(
        id: impl Into<String>,
        title: impl Into<String>,
        tool_name: &str,
        tool_args: Map<String, Value>,
    ) -> Self {
        Self::new(
            id,
            title,
            StepKind::ToolCall {
                tool_name: tool_name.to_string(),
                tool_args,
            },
        )
    }

    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            StepKind::ToolCall { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }

    pub fn is_synthesis(&self) -> bool {
        matches!(self.kind, StepKind::Synthesize)
    }
}

/// Which planner stage produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Llm,
    Deterministic,
}

/// Ordered list of steps a run must execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub source: PlanSource,
    pub steps: Vec<Step>,
}

impl Plan {
    /// Build a plan, rejecting step lists that break the plan invariants.
    pub fn new(source: PlanSource, steps: Vec<Step>) -> Result<Self, InvariantViolation> {
        let plan = Self { source, steps };
        let errors = validate_plan(&plan);
        if !errors.is_empty() {
            return Err(InvariantViolation::InvalidPlan(errors.join("; ")));
        }
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|step| step.id == id)
    }

    pub fn in_progress(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::InProgress)
    }

    pub fn first_pending(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Pending)
    }

    /// Steps that ended without output (skipped or abandoned).
    pub fn absent_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|step| step.status.is_unsuccessful())
    }
}
