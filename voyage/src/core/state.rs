//! The single mutable record threaded through every node of a run.
//!
//! Write-once fields (`termination_reason`, `final_answer`, `calendar`,
//! `evaluation`, individual `tool_results` entries) are private and only
//! reachable through setters that refuse a second write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::constraints::TripConstraints;
use crate::core::errors::InvariantViolation;
use crate::core::evaluator::Evaluation;
use crate::core::plan::Plan;
use crate::core::types::{ContextHit, TerminationReason};

/// A labelled outbound link produced by a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// Structured output of a completed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub summary: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub data: Value,
}

impl ToolResult {
    /// True when the tool reported figures from a priced data source.
    pub fn is_priced(&self) -> bool {
        self.data
            .get("priced")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Output recorded for a completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    Context { query: String, hits: usize },
    Tool(ToolResult),
    Synthesis { draft: String },
}

/// Calendar file written on the finalize path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarArtifact {
    pub path: String,
    pub ics: String,
    pub event_count: usize,
}

/// Per-run counters reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub node_transitions: u32,
    pub tool_calls: u32,
    pub tool_errors: u32,
    pub llm_calls: u32,
    pub llm_errors: u32,
    pub retrievals: u32,
    pub retries: u32,
    pub skips: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub constraints: TripConstraints,
    pub context_hits: Vec<ContextHit>,
    pub plan: Plan,
    tool_results: BTreeMap<String, StepOutput>,
    pub iteration_count: u32,
    pub current_step: Option<String>,
    termination_reason: TerminationReason,
    pub clarifying_questions: Vec<String>,
    pub warnings: Vec<String>,
    final_answer: Option<String>,
    calendar: Option<CalendarArtifact>,
    evaluation: Option<Evaluation>,
    pub counters: RunCounters,
}

impl RunState {
    pub fn new(
        run_id: impl Into<String>,
        user_id: impl Into<String>,
        constraints: TripConstraints,
        plan: Plan,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            user_id: user_id.into(),
            query: None,
            constraints,
            context_hits: Vec::new(),
            plan,
            tool_results: BTreeMap::new(),
            iteration_count: 0,
            current_step: None,
            termination_reason: TerminationReason::None,
            clarifying_questions: Vec::new(),
            warnings: Vec::new(),
            final_answer: None,
            calendar: None,
            evaluation: None,
            counters: RunCounters::default(),
        }
    }

    pub fn termination_reason(&self) -> TerminationReason {
        self.termination_reason
    }

    pub fn is_terminated(&self) -> bool {
        self.termination_reason.is_terminal()
    }

    /// Fail if the run already terminated.
    pub fn ensure_running(&self) -> Result<(), InvariantViolation> {
        if self.is_terminated() {
            return Err(InvariantViolation::AlreadyTerminated(
                self.termination_reason,
            ));
        }
        Ok(())
    }

    /// Set the termination reason. Write-once.
    pub fn terminate(&mut self, reason: TerminationReason) -> Result<(), InvariantViolation> {
        self.ensure_running()?;
        self.termination_reason = reason;
        self.current_step = None;
        Ok(())
    }

    pub fn tool_results(&self) -> &BTreeMap<String, StepOutput> {
        &self.tool_results
    }

    /// Append a step output. Each step id may be written once.
    pub fn record_output(
        &mut self,
        step_id: &str,
        output: StepOutput,
    ) -> Result<(), InvariantViolation> {
        if self.tool_results.contains_key(step_id) {
            return Err(InvariantViolation::WriteOnce(format!(
                "tool_results['{step_id}']"
            )));
        }
        self.tool_results.insert(step_id.to_string(), output);
        Ok(())
    }

    /// Completed tool outputs keyed by tool name, in plan order.
    pub fn tool_outputs(&self) -> Vec<&ToolResult> {
        self.plan
            .steps
            .iter()
            .filter_map(|step| match self.tool_results.get(&step.id) {
                Some(StepOutput::Tool(result)) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Draft written by the synthesis step, if it completed.
    pub fn synthesis_draft(&self) -> Option<&str> {
        self.tool_results.values().find_map(|output| match output {
            StepOutput::Synthesis { draft } => Some(draft.as_str()),
            _ => None,
        })
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn set_final_answer(&mut self, answer: String) -> Result<(), InvariantViolation> {
        if self.final_answer.is_some() {
            return Err(InvariantViolation::WriteOnce("final_answer".to_string()));
        }
        self.final_answer = Some(answer);
        Ok(())
    }

    pub fn calendar(&self) -> Option<&CalendarArtifact> {
        self.calendar.as_ref()
    }

    pub fn record_calendar(&mut self, artifact: CalendarArtifact) -> Result<(), InvariantViolation> {
        if self.calendar.is_some() {
            return Err(InvariantViolation::WriteOnce("artifact_path".to_string()));
        }
        self.calendar = Some(artifact);
        Ok(())
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    /// Store the evaluation. Requires a terminated run other than
    /// `user_input_required`; write-once.
    pub fn record_evaluation(&mut self, evaluation: Evaluation) -> Result<(), InvariantViolation> {
        if self.evaluation.is_some() {
            return Err(InvariantViolation::WriteOnce("evaluation".to_string()));
        }
        match self.termination_reason {
            TerminationReason::Finalized | TerminationReason::MaxIters => {
                self.evaluation = Some(evaluation);
                Ok(())
            }
            other => Err(InvariantViolation::AlreadyTerminated(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::deterministic_state;

    #[test]
    fn termination_is_write_once() {
        let mut state = deterministic_state();
        state.terminate(TerminationReason::Finalized).expect("first");
        let err = state
            .terminate(TerminationReason::MaxIters)
            .expect_err("second write");
        assert_eq!(
            err,
            InvariantViolation::AlreadyTerminated(TerminationReason::Finalized)
        );
        assert_eq!(state.termination_reason(), TerminationReason::Finalized);
    }

    #[test]
    fn tool_results_are_append_only() {
        let mut state = deterministic_state();
        let output = StepOutput::Context {
            query: "q".to_string(),
            hits: 0,
        };
        state.record_output("s1", output.clone()).expect("first");
        assert!(matches!(
            state.record_output("s1", output),
            Err(InvariantViolation::WriteOnce(_))
        ));
    }

    #[test]
    fn final_answer_cannot_be_overwritten() {
        let mut state = deterministic_state();
        state.set_final_answer("a".to_string()).expect("first");
        assert!(state.set_final_answer("b".to_string()).is_err());
        assert_eq!(state.final_answer(), Some("a"));
    }
}
