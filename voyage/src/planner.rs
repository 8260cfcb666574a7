//! Plan construction: model planner first, deterministic planner on rejection.

use tracing::{debug, instrument, warn};

use crate::core::constraints::TripConstraints;
use crate::core::intake::blocking_questions;
use crate::core::plan::Plan;
use crate::core::plan_builder::{decode_llm_plan, deterministic_plan};
use crate::core::state::RunCounters;
use crate::core::types::ContextHit;
use crate::io::llm::{GenerateRequest, LanguageModel, PromptKind};
use crate::io::prompt::PromptBuilder;

/// The constraints cannot be planned on until the user answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeedsClarification {
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Planned {
    pub plan: Plan,
    /// Reasons the model plan was rejected, when the fallback was used.
    pub rejected: Option<Vec<String>>,
}

/// Build the run plan for normalized `constraints`.
///
/// Any model failure or rejected model plan falls back to the deterministic
/// planner; the rejection reasons are returned for the event log.
#[instrument(skip_all, fields(hits = hits.len()))]
pub fn build_plan(
    constraints: &TripConstraints,
    hits: &[ContextHit],
    model: &dyn LanguageModel,
    prompts: &PromptBuilder,
    counters: &mut RunCounters,
) -> Result<Planned, NeedsClarification> {
    let questions = blocking_questions(constraints);
    if !questions.is_empty() {
        return Err(NeedsClarification { questions });
    }

    let attempt = match prompts.planner(constraints, hits) {
        Ok(prompt) => {
            counters.llm_calls += 1;
            match model.generate(&GenerateRequest {
                kind: PromptKind::Planner,
                prompt,
            }) {
                Ok(raw) => decode_llm_plan(&raw),
                Err(err) => {
                    counters.llm_errors += 1;
                    Err(vec![format!("model call failed: {err}")])
                }
            }
        }
        Err(err) => Err(vec![format!("render planner prompt: {err:#}")]),
    };

    match attempt {
        Ok(plan) => {
            debug!(steps = plan.len(), "model plan accepted");
            Ok(Planned {
                plan,
                rejected: None,
            })
        }
        Err(errors) => {
            warn!(errors = ?errors, "model plan rejected; using deterministic planner");
            Ok(Planned {
                plan: deterministic_plan(constraints),
                rejected: Some(errors),
            })
        }
    }
}
