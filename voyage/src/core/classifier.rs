//! Deterministic classification of collaborator failures.
//!
//! Classification assigns the error class (what went wrong) and the tier
//! (how much it matters for this run). Both feed the triage decision table.

use crate::core::catalog;
use crate::core::constraints::CORE_ARGUMENTS;
use crate::core::errors::CollaboratorError;
use crate::core::plan::{MAX_RETRIES, Step, StepKind};
use crate::core::types::{ErrorClass, Tier};

/// A collaborator error with its class and tier resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub tier: Tier,
    pub message: String,
}

pub fn error_class(err: &CollaboratorError) -> ErrorClass {
    match err {
        CollaboratorError::Timeout(_) | CollaboratorError::ConnectionFailure(_) => {
            ErrorClass::TransientNetwork
        }
        CollaboratorError::UnknownTool(_) => ErrorClass::MissingTool,
        CollaboratorError::NotFound { .. }
        | CollaboratorError::InvalidArgument { .. }
        | CollaboratorError::Parse(_) => ErrorClass::Structural,
        CollaboratorError::Resource(_) => ErrorClass::Resource,
        CollaboratorError::Unknown(_) => ErrorClass::Unknown,
    }
}

/// Classify a failure of `step` (as it was when it failed).
///
/// Tier rules:
/// - Blocking: the error names a core input, a synthesis step failed after
///   its retry, or a resource error hit synthesis.
/// - Major: primary tools, synthesis, and resource errors elsewhere.
/// - Minor: enrichment tools and retrieval.
pub fn classify(err: &CollaboratorError, step: &Step) -> ClassifiedError {
    let class = error_class(err);
    let touches_core_input = class == ErrorClass::Structural
        && err
            .argument()
            .is_some_and(|arg| CORE_ARGUMENTS.contains(&arg));

    let tier = if touches_core_input {
        Tier::Blocking
    } else {
        match &step.kind {
            StepKind::Synthesize => {
                if step.attempt_count >= MAX_RETRIES || class == ErrorClass::Resource {
                    Tier::Blocking
                } else {
                    Tier::Major
                }
            }
            StepKind::ToolCall { tool_name, .. } => {
                let base = catalog::lookup(tool_name).map_or(Tier::Minor, |spec| spec.tier);
                if class == ErrorClass::Resource {
                    Tier::Major
                } else {
                    base
                }
            }
            StepKind::RetrieveContext { .. } => Tier::Minor,
        }
    };

    ClassifiedError {
        class,
        tier,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{synth_step, tool_step};

    #[test]
    fn enrichment_timeout_is_minor_transient() {
        let step = tool_step("w", catalog::WEATHER);
        let classified = classify(&CollaboratorError::Timeout("5s".to_string()), &step);
        assert_eq!(classified.class, ErrorClass::TransientNetwork);
        assert_eq!(classified.tier, Tier::Minor);
    }

    #[test]
    fn unresolvable_destination_is_blocking() {
        let step = tool_step("f", catalog::FLIGHTS);
        let err = CollaboratorError::not_found("destination", "no such place 'Atlantis'");
        let classified = classify(&err, &step);
        assert_eq!(classified.class, ErrorClass::Structural);
        assert_eq!(classified.tier, Tier::Blocking);
    }

    #[test]
    fn non_core_invalid_argument_keeps_tool_tier() {
        let step = tool_step("h", catalog::HOTELS);
        let err = CollaboratorError::invalid_argument("neighborhood", "unknown district");
        assert_eq!(classify(&err, &step).tier, Tier::Major);
    }

    #[test]
    fn synthesis_escalates_after_retry() {
        let mut step = synth_step("s");
        let err = CollaboratorError::Timeout("llm".to_string());
        assert_eq!(classify(&err, &step).tier, Tier::Major);
        step.attempt_count = 1;
        assert_eq!(classify(&err, &step).tier, Tier::Blocking);
    }

    #[test]
    fn unknown_tool_is_missing_tool() {
        let step = tool_step("x", "teleport");
        let classified = classify(&CollaboratorError::UnknownTool("teleport".to_string()), &step);
        assert_eq!(classified.class, ErrorClass::MissingTool);
        assert_eq!(classified.tier, Tier::Minor);
    }
}
