//! Structural invariants over plans and run state.

use std::collections::HashSet;

use crate::core::plan::{MAX_RETRIES, Plan};
use crate::core::state::RunState;
use crate::core::types::{StepStatus, TerminationReason};

/// Check plan invariants:
/// - At least one step
/// - No duplicate or empty ids
/// - Exactly one `SYNTHESIZE` step, placed last
/// - At most one step `in_progress`
/// - `attempt_count <= MAX_RETRIES`
pub fn validate_plan(plan: &Plan) -> Vec<String> {
    let mut errors = Vec::new();
    if plan.steps.is_empty() {
        errors.push("plan has no steps".to_string());
        return errors;
    }

    let mut seen = HashSet::new();
    for step in &plan.steps {
        if step.id.trim().is_empty() {
            errors.push("step id must be non-empty".to_string());
        } else if !seen.insert(step.id.as_str()) {
            errors.push(format!("duplicate step id '{}'", step.id));
        }
        if step.attempt_count > MAX_RETRIES {
            errors.push(format!(
                "{}: attempt_count {} exceeds retry bound {}",
                step.id, step.attempt_count, MAX_RETRIES
            ));
        }
    }

    let synth_positions: Vec<usize> = plan
        .steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.is_synthesis())
        .map(|(idx, _)| idx)
        .collect();
    match synth_positions.as_slice() {
        [] => errors.push("plan must contain a SYNTHESIZE step".to_string()),
        [idx] if *idx + 1 == plan.steps.len() => {}
        [_] => errors.push("SYNTHESIZE step must be last".to_string()),
        _ => errors.push(format!(
            "plan must contain exactly one SYNTHESIZE step (found {})",
            synth_positions.len()
        )),
    }

    let in_flight = plan
        .steps
        .iter()
        .filter(|step| step.status == StepStatus::InProgress)
        .count();
    if in_flight > 1 {
        errors.push(format!("{in_flight} steps are in_progress (at most 1)"));
    }

    errors
}

/// Check run-level invariants on top of [`validate_plan`]:
/// - Every tool result belongs to a completed step
/// - Evaluation only exists on finalized or loop-guarded runs
/// - Nothing is in flight once the run terminated
pub fn validate_run_state(state: &RunState) -> Vec<String> {
    let mut errors = validate_plan(&state.plan);

    for step_id in state.tool_results().keys() {
        match state.plan.step(step_id) {
            Some(step) if step.status == StepStatus::Completed => {}
            Some(step) => errors.push(format!(
                "tool result for '{}' but step is {}",
                step_id, step.status
            )),
            None => errors.push(format!("tool result for unknown step '{step_id}'")),
        }
    }

    let termination = state.termination_reason();
    if state.evaluation().is_some()
        && !matches!(
            termination,
            TerminationReason::Finalized | TerminationReason::MaxIters
        )
    {
        errors.push(format!("evaluation present on a {termination} run"));
    }
    if termination.is_terminal()
        && let Some(step) = state.plan.in_progress()
    {
        errors.push(format!(
            "step '{}' still in_progress after termination",
            step.id
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{PlanSource, Step, StepKind};

    fn retrieve(id: &str) -> Step {
        Step::new(id, id, StepKind::RetrieveContext { query: None })
    }

    fn synth(id: &str) -> Step {
        Step::new(id, id, StepKind::Synthesize)
    }

    #[test]
    fn validate_plan_accepts_well_formed_plan() {
        let plan = Plan {
            source: PlanSource::Deterministic,
            steps: vec![retrieve("a"), synth("b")],
        };
        assert!(validate_plan(&plan).is_empty());
    }

    #[test]
    fn validate_plan_reports_every_problem() {
        let mut dup = retrieve("a");
        dup.attempt_count = 2;
        let mut busy = retrieve("c");
        busy.status = StepStatus::InProgress;
        let mut busy2 = retrieve("d");
        busy2.status = StepStatus::InProgress;
        let plan = Plan {
            source: PlanSource::Llm,
            steps: vec![synth("s"), retrieve("a"), dup, busy, busy2],
        };

        let errors = validate_plan(&plan);
        assert!(errors.iter().any(|err| err.contains("duplicate step id 'a'")));
        assert!(errors.iter().any(|err| err.contains("exceeds retry bound")));
        assert!(errors.iter().any(|err| err.contains("must be last")));
        assert!(errors.iter().any(|err| err.contains("in_progress")));
    }

    #[test]
    fn validate_plan_rejects_two_synthesis_steps() {
        let plan = Plan {
            source: PlanSource::Llm,
            steps: vec![synth("a"), synth("b")],
        };
        let errors = validate_plan(&plan);
        assert_eq!(
            errors,
            vec!["plan must contain exactly one SYNTHESIZE step (found 2)".to_string()]
        );
    }
}
