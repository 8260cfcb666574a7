//! Expectation checks against a finished run.
//!
//! Case expectations are checked first; the loop bounds every run must honor
//! are always appended.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use voyage::controller::RunOutcome;
use voyage::core::budget;
use voyage::core::plan::MAX_RETRIES;
use voyage::core::types::{OverallStatus, StepStatus, TerminationReason};

use crate::case::Expectations;

/// Collected check outcomes for a run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Judgment {
    pub checks: Vec<CheckOutcome>,
}

impl Judgment {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(CheckOutcome::passed)
    }
}

/// Result of a single check.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckOutcome {
    Termination {
        expected: TerminationReason,
        actual: TerminationReason,
        passed: bool,
    },
    OverallStatus {
        expected: OverallStatus,
        actual: Option<OverallStatus>,
        passed: bool,
    },
    BlockedSteps {
        expected: usize,
        actual: usize,
        passed: bool,
    },
    MaxAttempts {
        limit: u32,
        actual: u32,
        passed: bool,
    },
    /// No step was retried more than the retry budget allows.
    RetryBound { actual: u32, passed: bool },
    /// The loop never exceeded its iteration budget.
    IterationBound {
        limit: u32,
        actual: u32,
        passed: bool,
    },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        match self {
            CheckOutcome::Termination { passed, .. }
            | CheckOutcome::OverallStatus { passed, .. }
            | CheckOutcome::BlockedSteps { passed, .. }
            | CheckOutcome::MaxAttempts { passed, .. }
            | CheckOutcome::RetryBound { passed, .. }
            | CheckOutcome::IterationBound { passed, .. } => *passed,
        }
    }

    /// Stable label used to aggregate pass rates across runs.
    pub fn label(&self) -> String {
        match self {
            CheckOutcome::Termination { expected, .. } => format!("termination({expected})"),
            CheckOutcome::OverallStatus { expected, .. } => format!("overall_status({expected})"),
            CheckOutcome::BlockedSteps { expected, .. } => format!("blocked_steps({expected})"),
            CheckOutcome::MaxAttempts { limit, .. } => format!("max_attempts({limit})"),
            CheckOutcome::RetryBound { .. } => "retry_bound".to_string(),
            CheckOutcome::IterationBound { .. } => "iteration_bound".to_string(),
        }
    }
}

/// Check `outcome` against `expect` and the loop bounds.
#[instrument(skip_all)]
pub fn judge(expect: &Expectations, outcome: &RunOutcome, configured_max_iters: u32) -> Judgment {
    let mut checks = Vec::new();

    let actual = outcome.termination_reason();
    checks.push(CheckOutcome::Termination {
        expected: expect.termination,
        actual,
        passed: actual == expect.termination,
    });

    if let Some(expected) = expect.overall_status {
        let actual = outcome.evaluation().map(|e| e.overall_status);
        checks.push(CheckOutcome::OverallStatus {
            expected,
            actual,
            passed: actual == Some(expected),
        });
    }

    let state = outcome.state();
    let steps = state.map(|s| s.plan.steps.as_slice()).unwrap_or_default();
    let max_attempts = steps.iter().map(|s| s.attempt_count).max().unwrap_or(0);

    if let Some(expected) = expect.blocked_steps {
        let actual = steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Blocked | StepStatus::Invalid))
            .count();
        checks.push(CheckOutcome::BlockedSteps {
            expected,
            actual,
            passed: actual == expected,
        });
    }

    if let Some(limit) = expect.max_attempts {
        checks.push(CheckOutcome::MaxAttempts {
            limit,
            actual: max_attempts,
            passed: max_attempts <= limit,
        });
    }

    if let Some(state) = state {
        checks.push(CheckOutcome::RetryBound {
            actual: max_attempts,
            passed: max_attempts <= MAX_RETRIES,
        });
        let limit = budget::max_iters(state.plan.len(), configured_max_iters);
        checks.push(CheckOutcome::IterationBound {
            limit,
            actual: state.iteration_count,
            passed: state.iteration_count <= limit,
        });
    }

    for check in &checks {
        debug!(check = %check.label(), passed = check.passed(), "check result");
    }
    Judgment { checks }
}
