//! Issue triage: one decision table keyed by (tier, error class, attempt count).

use crate::core::classifier::ClassifiedError;
use crate::core::constraints::ConstraintField;
use crate::core::errors::CollaboratorError;
use crate::core::plan::{MAX_RETRIES, Step};
use crate::core::types::{Decision, ErrorClass, Tier, TriageRecord};

#[derive(Debug, Clone, Copy)]
enum Attempts {
    Any,
    /// The step has not been retried yet.
    First,
    /// The step already used its retry.
    Exhausted,
}

impl Attempts {
    fn matches(self, attempt_count: u32) -> bool {
        match self {
            Attempts::Any => true,
            Attempts::First => attempt_count == 0,
            Attempts::Exhausted => attempt_count >= MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    name: &'static str,
    tier: Tier,
    /// `None` matches every class.
    classes: Option<&'static [ErrorClass]>,
    attempts: Attempts,
    decision: Decision,
}

/// Rows are evaluated top to bottom; the first match wins.
const DECISION_TABLE: [Rule; 6] = [
    Rule {
        name: "blocking",
        tier: Tier::Blocking,
        classes: None,
        attempts: Attempts::Any,
        decision: Decision::AskUser,
    },
    Rule {
        name: "major-transient-first-attempt",
        tier: Tier::Major,
        classes: Some(&[ErrorClass::TransientNetwork]),
        attempts: Attempts::First,
        decision: Decision::Retry,
    },
    Rule {
        name: "major-structural",
        tier: Tier::Major,
        classes: Some(&[ErrorClass::Structural, ErrorClass::MissingTool]),
        attempts: Attempts::Any,
        decision: Decision::Skip,
    },
    Rule {
        name: "major-after-retry",
        tier: Tier::Major,
        classes: None,
        attempts: Attempts::Exhausted,
        decision: Decision::Skip,
    },
    Rule {
        name: "major",
        tier: Tier::Major,
        classes: None,
        attempts: Attempts::Any,
        decision: Decision::AskUser,
    },
    Rule {
        name: "minor",
        tier: Tier::Minor,
        classes: None,
        attempts: Attempts::Any,
        decision: Decision::Skip,
    },
];

/// Look up the decision for a classified failure.
///
/// Returns the decision and the name of the matching row.
pub fn decide(tier: Tier, class: ErrorClass, attempt_count: u32) -> (Decision, &'static str) {
    DECISION_TABLE
        .iter()
        .find(|rule| {
            rule.tier == tier
                && rule.classes.is_none_or(|classes| classes.contains(&class))
                && rule.attempts.matches(attempt_count)
        })
        .map_or((Decision::AskUser, "unmatched"), |rule| {
            (rule.decision, rule.name)
        })
}

/// Triage a failed step and produce the audit record to attach to it.
pub fn triage(classified: &ClassifiedError, step: &Step) -> TriageRecord {
    let (decision, rule) = decide(classified.tier, classified.class, step.attempt_count);
    TriageRecord {
        attempt: step.attempt_count,
        tier: classified.tier,
        class: classified.class,
        decision,
        reason: rule.to_string(),
        error: classified.message.clone(),
    }
}

/// Question put to the user when a failure of `step` ends the run.
pub fn clarifying_question(step: &Step, err: &CollaboratorError) -> String {
    let field = err.argument().and_then(|arg| {
        ConstraintField::ALL
            .into_iter()
            .find(|field| field.argument() == Some(arg))
    });
    match field {
        Some(field) => format!(
            "We could not use the {} you gave ({err}). Could you confirm or correct it?",
            field.token()
        ),
        None => format!(
            "\"{}\" could not be completed ({err}). Should the plan continue without it, or would you like to adjust the request?",
            step.title
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{synth_step, tool_step};

    #[test]
    fn question_names_the_offending_constraint() {
        let err = CollaboratorError::not_found("destination", "no such place 'Atlantis'");
        let question = clarifying_question(&tool_step("s1", "flights_search_links"), &err);
        assert!(question.starts_with("We could not use the destination you gave"));
        assert!(question.contains("Atlantis"));

        let question = clarifying_question(
            &synth_step("s2"),
            &CollaboratorError::Timeout("model".to_string()),
        );
        assert!(question.contains("\"Synthesize itinerary\" could not be completed"));
    }

    #[test]
    fn blocking_always_asks_user() {
        for class in [ErrorClass::TransientNetwork, ErrorClass::Structural] {
            for attempt in [0, 1] {
                assert_eq!(decide(Tier::Blocking, class, attempt).0, Decision::AskUser);
            }
        }
    }

    #[test]
    fn major_transient_retries_once_then_skips() {
        assert_eq!(
            decide(Tier::Major, ErrorClass::TransientNetwork, 0),
            (Decision::Retry, "major-transient-first-attempt")
        );
        assert_eq!(
            decide(Tier::Major, ErrorClass::TransientNetwork, 1),
            (Decision::Skip, "major-after-retry")
        );
    }

    #[test]
    fn major_unknown_asks_user_on_first_failure() {
        assert_eq!(
            decide(Tier::Major, ErrorClass::Unknown, 0),
            (Decision::AskUser, "major")
        );
        assert_eq!(decide(Tier::Major, ErrorClass::Resource, 0).0, Decision::AskUser);
    }

    #[test]
    fn major_structural_skips() {
        assert_eq!(decide(Tier::Major, ErrorClass::Structural, 0).0, Decision::Skip);
        assert_eq!(decide(Tier::Major, ErrorClass::MissingTool, 0).0, Decision::Skip);
    }

    #[test]
    fn minor_never_retries() {
        for class in [
            ErrorClass::TransientNetwork,
            ErrorClass::Structural,
            ErrorClass::MissingTool,
            ErrorClass::Resource,
            ErrorClass::Unknown,
        ] {
            assert_eq!(decide(Tier::Minor, class, 0).0, Decision::Skip);
        }
    }

    #[test]
    fn retry_only_on_first_attempt() {
        for tier in [Tier::Blocking, Tier::Major, Tier::Minor] {
            for class in [ErrorClass::TransientNetwork, ErrorClass::Unknown] {
                assert_ne!(decide(tier, class, 1).0, Decision::Retry);
            }
        }
    }
}
