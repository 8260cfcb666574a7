//! Deterministic step selection and loop guard.

use crate::core::errors::InvariantViolation;
use crate::core::plan::Plan;
use crate::core::types::NextAction;

/// Decide what the controller does next.
///
/// - A step already `in_progress` is an invariant violation.
/// - `iteration_count >= max_iters` aborts, even with pending work left.
/// - Otherwise the first `pending` step in plan order runs.
/// - With nothing pending, the run finalizes.
pub fn select_next(
    plan: &Plan,
    iteration_count: u32,
    max_iters: u32,
) -> Result<NextAction, InvariantViolation> {
    if let Some(step) = plan.in_progress() {
        return Err(InvariantViolation::StepInFlight(step.id.clone()));
    }
    if iteration_count >= max_iters {
        return Ok(NextAction::Abort);
    }
    Ok(match plan.first_pending() {
        Some(step) => NextAction::RunStep(step.id.clone()),
        None => NextAction::Finalize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StepStatus;
    use crate::test_support::deterministic_plan;

    #[test]
    fn selects_first_pending_in_plan_order() {
        let mut plan = deterministic_plan();
        plan.steps[0].status = StepStatus::Completed;
        plan.steps[1].status = StepStatus::Blocked;
        let next = select_next(&plan, 2, 20).expect("select");
        assert_eq!(next, NextAction::RunStep(plan.steps[2].id.clone()));
    }

    #[test]
    fn finalizes_when_nothing_pending() {
        let mut plan = deterministic_plan();
        for step in &mut plan.steps {
            step.status = StepStatus::Completed;
        }
        plan.steps[1].status = StepStatus::Blocked;
        assert_eq!(select_next(&plan, 5, 20).expect("select"), NextAction::Finalize);
    }

    #[test]
    fn aborts_at_budget_with_pending_steps() {
        let plan = deterministic_plan();
        assert_eq!(select_next(&plan, 20, 20).expect("select"), NextAction::Abort);
    }

    #[test]
    fn step_in_flight_is_a_violation() {
        let mut plan = deterministic_plan();
        plan.steps[0].status = StepStatus::InProgress;
        let err = select_next(&plan, 0, 20).expect_err("in flight");
        assert_eq!(err, InvariantViolation::StepInFlight(plan.steps[0].id.clone()));
    }
}
