//! Runs the in-flight step against its collaborator and records the result.
//!
//! The executor never decides what happens after a failure. It marks the
//! step `invalid` (the request itself was wrong) or `blocked` (the
//! collaborator could not serve it) and hands the error to triage.

use tracing::{debug, instrument, warn};

use crate::controller::Collaborators;
use crate::core::classifier::error_class;
use crate::core::errors::{CollaboratorError, InvariantViolation};
use crate::core::plan::StepKind;
use crate::core::responder::absent_step_titles;
use crate::core::state::{RunState, StepOutput};
use crate::core::state_update::{complete_step, fail_step};
use crate::core::types::{ContextHit, ErrorClass, StepStatus};
use crate::io::llm::{GenerateRequest, PromptKind};
use crate::io::memory::MemoryQuery;
use crate::io::prompt::PromptBuilder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Completed,
    Failed {
        status: StepStatus,
        error: CollaboratorError,
    },
}

/// Status a failed step takes for `err`.
pub fn failure_status(err: &CollaboratorError) -> StepStatus {
    match error_class(err) {
        ErrorClass::Structural | ErrorClass::MissingTool => StepStatus::Invalid,
        _ => StepStatus::Blocked,
    }
}

fn default_retrieval_query(state: &RunState) -> String {
    let mut parts: Vec<&str> = state.constraints.destinations.iter().map(String::as_str).collect();
    parts.extend(state.constraints.interests.iter().map(String::as_str));
    if parts.is_empty() {
        state.query.as_deref().unwrap_or("trip").to_string()
    } else {
        parts.join(" ")
    }
}

/// Merge `fresh` into `hits`: one entry per id (highest score kept), best first.
pub fn merge_hits(hits: &mut Vec<ContextHit>, fresh: Vec<ContextHit>) {
    for hit in fresh {
        match hits.iter_mut().find(|existing| existing.id == hit.id) {
            Some(existing) if existing.score < hit.score => *existing = hit,
            Some(_) => {}
            None => hits.push(hit),
        }
    }
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Execute the in-flight step `step_id`.
#[instrument(skip_all, fields(step_id = step_id))]
pub fn execute_step(
    state: &mut RunState,
    step_id: &str,
    collab: &Collaborators<'_>,
    prompts: &PromptBuilder,
    retrieval_k: usize,
) -> Result<StepResult, InvariantViolation> {
    let kind = state
        .plan
        .step(step_id)
        .map(|step| step.kind.clone())
        .ok_or_else(|| InvariantViolation::UnknownStep(step_id.to_string()))?;

    let outcome = match kind {
        StepKind::RetrieveContext { query } => {
            let text = query.unwrap_or_else(|| default_retrieval_query(state));
            state.counters.retrievals += 1;
            let fresh = collab.memory.retrieve(&MemoryQuery {
                user_id: &state.user_id,
                run_id: &state.run_id,
                text: &text,
                k: retrieval_k,
            });
            let hits = fresh.len();
            merge_hits(&mut state.context_hits, fresh);
            Ok(StepOutput::Context { query: text, hits })
        }
        StepKind::ToolCall {
            tool_name,
            tool_args,
        } => {
            state.counters.tool_calls += 1;
            collab
                .tools
                .call(&tool_name, &tool_args)
                .map(StepOutput::Tool)
                .inspect_err(|_| state.counters.tool_errors += 1)
        }
        StepKind::Synthesize => {
            let absent = absent_step_titles(state);
            match prompts.synthesis(state, &absent) {
                Ok(prompt) => {
                    state.counters.llm_calls += 1;
                    collab
                        .model
                        .generate(&GenerateRequest {
                            kind: PromptKind::Synthesis,
                            prompt,
                        })
                        .map(|draft| StepOutput::Synthesis { draft })
                        .inspect_err(|_| state.counters.llm_errors += 1)
                }
                Err(err) => Err(CollaboratorError::Unknown(format!(
                    "render synthesis prompt: {err:#}"
                ))),
            }
        }
    };

    match outcome {
        Ok(output) => {
            complete_step(state, step_id, output)?;
            debug!("step completed");
            Ok(StepResult::Completed)
        }
        Err(error) => {
            let status = failure_status(&error);
            warn!(%error, status = %status, "step failed");
            fail_step(state, step_id, status)?;
            Ok(StepResult::Failed { status, error })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog;
    use crate::core::plan::{Plan, PlanSource, Step};
    use crate::core::state_update::apply_next_action;
    use crate::core::types::{MemoryKind, NextAction};
    use crate::test_support::{
        Scripted, ScriptedTools, StaticMemory, deterministic_state, sample_constraints, synth_step,
    };

    fn hit(id: &str, score: f64) -> ContextHit {
        ContextHit {
            id: id.to_string(),
            text: format!("note {id}"),
            kind: MemoryKind::Note,
            score,
        }
    }

    fn start(state: &mut RunState, id: &str) {
        apply_next_action(state, &NextAction::RunStep(id.to_string())).expect("start step");
    }

    #[test]
    fn merge_hits_dedupes_and_orders() {
        let mut hits = vec![hit("a", 0.2), hit("b", 0.9)];
        merge_hits(&mut hits, vec![hit("a", 0.7), hit("c", 0.1), hit("b", 0.5)]);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(hits[1].score, 0.7);
    }

    #[test]
    fn tool_step_records_result() {
        let scripted = Scripted::default();
        let mut state = deterministic_state();
        start(&mut state, "step-1");
        let result = execute_step(
            &mut state,
            "step-1",
            &scripted.collaborators(),
            &PromptBuilder::default(),
            5,
        )
        .expect("execute");
        assert_eq!(result, StepResult::Completed);
        assert_eq!(state.counters.tool_calls, 1);
        assert!(matches!(state.tool_results().get("step-1"), Some(StepOutput::Tool(_))));
        assert_eq!(state.current_step, None);
    }

    /// Verifies a not-found tool error marks the step invalid, a timeout blocked.
    #[test]
    fn failure_status_follows_error_class() {
        let scripted = Scripted {
            tools: ScriptedTools::new()
                .failing(
                    catalog::FLIGHTS,
                    vec![CollaboratorError::not_found("destination", "Atlantis")],
                )
                .failing(
                    catalog::HOTELS,
                    vec![CollaboratorError::Timeout("hotels".to_string())],
                ),
            ..Scripted::default()
        };
        let mut state = deterministic_state();
        start(&mut state, "step-1");
        let result = execute_step(&mut state, "step-1", &scripted.collaborators(), &PromptBuilder::default(), 5)
            .expect("execute");
        assert!(matches!(result, StepResult::Failed { status: StepStatus::Invalid, .. }));
        assert_eq!(state.plan.steps[0].status, StepStatus::Invalid);

        // Put the flights step out of the way so hotels can run.
        state.plan.steps[0].status = StepStatus::Blocked;
        start(&mut state, "step-2");
        let result = execute_step(&mut state, "step-2", &scripted.collaborators(), &PromptBuilder::default(), 5)
            .expect("execute");
        assert!(matches!(result, StepResult::Failed { status: StepStatus::Blocked, .. }));
        assert_eq!(state.counters.tool_errors, 2);
    }

    #[test]
    fn retrieval_merges_hits_and_never_fails() {
        let scripted = Scripted {
            memory: StaticMemory::new(vec![hit("m1", 0.8)]),
            ..Scripted::default()
        };
        let plan = Plan::new(
            PlanSource::Llm,
            vec![
                Step::new("r1", "Recall preferences", StepKind::RetrieveContext { query: None }),
                synth_step("s1"),
            ],
        )
        .expect("plan");
        let mut state = RunState::new("run", "tester", sample_constraints(), plan);
        state.context_hits.push(hit("m0", 0.3));
        start(&mut state, "r1");
        let result = execute_step(&mut state, "r1", &scripted.collaborators(), &PromptBuilder::default(), 5)
            .expect("execute");
        assert_eq!(result, StepResult::Completed);
        assert_eq!(state.context_hits[0].id, "m1");
        assert_eq!(state.counters.retrievals, 1);
        assert_eq!(
            state.tool_results().get("r1"),
            Some(&StepOutput::Context {
                query: "Tokyo food temples".to_string(),
                hits: 1
            })
        );
    }

    #[test]
    fn synthesis_prompt_lists_absent_steps() {
        let scripted = Scripted::default();
        let mut state = deterministic_state();
        for step in state.plan.steps.iter_mut().filter(|s| !s.is_synthesis()) {
            step.status = StepStatus::Blocked;
        }
        let synth_id = state.plan.steps.last().expect("synthesis").id.clone();
        start(&mut state, &synth_id);
        let result = execute_step(&mut state, &synth_id, &scripted.collaborators(), &PromptBuilder::default(), 5)
            .expect("execute");
        assert_eq!(result, StepResult::Completed);
        let requests = scripted.model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("- Get weather summary"));
        assert!(state.synthesis_draft().is_some());
    }
}
