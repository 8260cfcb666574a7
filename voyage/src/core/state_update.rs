//! Controller-owned state transitions for plan steps.
//!
//! Every status change goes through [`transition`], which enforces the step
//! status machine. No step may change once the run has terminated.

use crate::core::errors::InvariantViolation;
use crate::core::plan::{MAX_RETRIES, Step};
use crate::core::state::{RunState, StepOutput};
use crate::core::types::{Decision, NextAction, StepStatus, TerminationReason, TriageRecord};

/// True if the status machine allows `from -> to`.
pub fn transition_allowed(from: StepStatus, to: StepStatus) -> bool {
    use StepStatus as S;
    matches!(
        (from, to),
        (S::Pending, S::InProgress)
            | (S::InProgress, S::Completed | S::Blocked | S::Failed | S::Invalid)
            | (S::Blocked | S::Invalid, S::Blocked | S::Failed)
            | (S::Blocked | S::Failed, S::Pending)
    )
}

fn transition(step: &mut Step, to: StepStatus) -> Result<(), InvariantViolation> {
    if !transition_allowed(step.status, to) {
        return Err(InvariantViolation::IllegalTransition {
            id: step.id.clone(),
            from: step.status,
            to,
        });
    }
    step.status = to;
    Ok(())
}

fn running_step<'a>(
    state: &'a mut RunState,
    step_id: &str,
) -> Result<&'a mut Step, InvariantViolation> {
    state.ensure_running()?;
    state
        .plan
        .step_mut(step_id)
        .ok_or_else(|| InvariantViolation::UnknownStep(step_id.to_string()))
}

/// Apply an orchestrator decision to the run state.
pub fn apply_next_action(
    state: &mut RunState,
    action: &NextAction,
) -> Result<(), InvariantViolation> {
    match action {
        NextAction::RunStep(step_id) => {
            let step = running_step(state, step_id)?;
            transition(step, StepStatus::InProgress)?;
            state.current_step = Some(step_id.clone());
            Ok(())
        }
        NextAction::Finalize => state.terminate(TerminationReason::Finalized),
        NextAction::Abort => state.terminate(TerminationReason::MaxIters),
    }
}

/// Mark the in-flight step completed and record its output.
pub fn complete_step(
    state: &mut RunState,
    step_id: &str,
    output: StepOutput,
) -> Result<(), InvariantViolation> {
    let step = running_step(state, step_id)?;
    transition(step, StepStatus::Completed)?;
    state.record_output(step_id, output)?;
    state.current_step = None;
    Ok(())
}

/// Mark the in-flight step as not completed (`blocked` or `invalid`).
pub fn fail_step(
    state: &mut RunState,
    step_id: &str,
    status: StepStatus,
) -> Result<(), InvariantViolation> {
    let step = running_step(state, step_id)?;
    transition(step, status)?;
    state.current_step = None;
    Ok(())
}

/// Apply a triage decision to a failed step.
///
/// - `Retry` returns the step to `pending` and consumes its retry.
/// - `Skip` leaves the step `blocked`.
/// - `AskUser` marks the step `failed` and terminates the run.
pub fn apply_triage(
    state: &mut RunState,
    step_id: &str,
    record: TriageRecord,
) -> Result<Decision, InvariantViolation> {
    let decision = record.decision;
    let step = running_step(state, step_id)?;
    step.triage.push(record);

    match decision {
        Decision::Retry => {
            if step.attempt_count >= MAX_RETRIES {
                return Err(InvariantViolation::RetryBoundExceeded(step.id.clone()));
            }
            transition(step, StepStatus::Pending)?;
            step.attempt_count += 1;
            state.counters.retries += 1;
        }
        Decision::Skip => {
            if step.status != StepStatus::Blocked {
                transition(step, StepStatus::Blocked)?;
            }
            state.counters.skips += 1;
        }
        Decision::AskUser => {
            transition(step, StepStatus::Failed)?;
            state.terminate(TerminationReason::UserInputRequired)?;
        }
    }
    Ok(decision)
}
