//! Free-text request parsing into raw trip constraints.
//!
//! The model is asked for a JSON object matching the constraints schema.
//! When the call fails or the reply does not validate, a pattern-based
//! extractor reads what it can straight from the request.

use std::sync::LazyLock;

use jsonschema::Validator;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::constraints::{Pace, TripConstraints};
use crate::core::plan_builder::unfence;
use crate::core::state::RunCounters;
use crate::io::llm::{GenerateRequest, LanguageModel, PromptKind};
use crate::io::prompt::PromptBuilder;

const CONSTRAINTS_SCHEMA: &str = include_str!("../schemas/trip_constraints.schema.json");

static CONSTRAINTS_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(CONSTRAINTS_SCHEMA).expect("constraints schema is valid json");
    jsonschema::validator_for(&schema).expect("constraints schema compiles")
});

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid date regex"));
static DESTINATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[Tt]o\s+([A-Z][\p{L}'.-]*(?:\s+[A-Z][\p{L}'.-]*)*)")
        .expect("valid destination regex")
});
static ORIGIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[Ff]rom\s+([A-Z][\p{L}'.-]*(?:\s+[A-Z][\p{L}'.-]*)*)")
        .expect("valid origin regex")
});
static TRAVELERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s+(?:people|persons|travell?ers|adults|guests)\b")
        .expect("valid travelers regex")
});
static BUDGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s?(\d[\d,]*(?:\.\d+)?)|(\d[\d,]*(?:\.\d+)?)\s*(?:usd|dollars)\b")
        .expect("valid budget regex")
});
static PACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(relaxed|balanced|packed)\b").expect("valid pace regex")
});

/// Where the parsed constraints came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIntent {
    pub constraints: TripConstraints,
    pub source: IntentSource,
    /// Why the model reply was not used, when it was not.
    pub problems: Vec<String>,
}

fn decode_constraints(raw: &str) -> Result<TripConstraints, Vec<String>> {
    let value: Value = serde_json::from_str(unfence(raw))
        .map_err(|err| vec![format!("malformed JSON: {err}")])?;
    let errors: Vec<String> = CONSTRAINTS_VALIDATOR
        .iter_errors(&value)
        .map(|err| format!("schema: {err}"))
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(value).map_err(|err| vec![format!("decode: {err}")])
}

fn query_dates(query: &str) -> Vec<String> {
    DATE_RE
        .captures_iter(query)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .take(2)
        .collect()
}

fn capture(re: &Regex, query: &str) -> Option<String> {
    re.captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Extract what the request states explicitly.
pub fn extract_constraints(query: &str) -> TripConstraints {
    let mut dates = query_dates(query).into_iter();
    let budget_usd = BUDGET_RE.captures(query).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
    });
    let pace = capture(&PACE_RE, query).and_then(|word| match word.to_lowercase().as_str() {
        "relaxed" => Some(Pace::Relaxed),
        "balanced" => Some(Pace::Balanced),
        "packed" => Some(Pace::Packed),
        _ => None,
    });
    TripConstraints {
        origin: capture(&ORIGIN_RE, query),
        destinations: capture(&DESTINATION_RE, query).into_iter().collect(),
        start_date: dates.next(),
        end_date: dates.next(),
        budget_usd,
        travelers: capture(&TRAVELERS_RE, query).and_then(|n| n.parse().ok()),
        pace,
        ..TripConstraints::default()
    }
}

/// Parse `query` into raw constraints, preferring the model.
///
/// Dates the model left out are filled from ISO dates written in the request.
#[instrument(skip_all, fields(query_len = query.len()))]
pub fn parse_intent(
    query: &str,
    model: &dyn LanguageModel,
    prompts: &PromptBuilder,
    counters: &mut RunCounters,
) -> ParsedIntent {
    let reply = match prompts.intent(query) {
        Ok(prompt) => {
            counters.llm_calls += 1;
            model
                .generate(&GenerateRequest {
                    kind: PromptKind::Intent,
                    prompt,
                })
                .map_err(|err| {
                    counters.llm_errors += 1;
                    vec![format!("model call failed: {err}")]
                })
        }
        Err(err) => Err(vec![format!("render intent prompt: {err:#}")]),
    };

    match reply.and_then(|raw| decode_constraints(&raw)) {
        Ok(mut constraints) => {
            let mut dates = query_dates(query).into_iter();
            if constraints.start_date.is_none() {
                constraints.start_date = dates.next();
            }
            if constraints.end_date.is_none() {
                constraints.end_date = dates.next();
            }
            debug!("intent parsed by model");
            ParsedIntent {
                constraints,
                source: IntentSource::Model,
                problems: Vec::new(),
            }
        }
        Err(problems) => {
            warn!(problems = ?problems, "intent model unusable; extracting from request text");
            ParsedIntent {
                constraints: extract_constraints(query),
                source: IntentSource::Fallback,
                problems,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::CollaboratorError;
    use crate::test_support::ScriptedModel;

    const QUERY: &str = "Plan a relaxed trip to Kyoto from SFO 2026-05-10 to 2026-05-14 for 2 people, budget $3,000";

    #[test]
    fn extractor_reads_explicit_fields() {
        let constraints = extract_constraints(QUERY);
        assert_eq!(constraints.destinations, vec!["Kyoto"]);
        assert_eq!(constraints.origin.as_deref(), Some("SFO"));
        assert_eq!(constraints.start_date.as_deref(), Some("2026-05-10"));
        assert_eq!(constraints.end_date.as_deref(), Some("2026-05-14"));
        assert_eq!(constraints.travelers, Some(2));
        assert_eq!(constraints.budget_usd, Some(3000.0));
        assert_eq!(constraints.pace, Some(Pace::Relaxed));
    }

    #[test]
    fn extractor_leaves_unstated_fields_empty() {
        let constraints = extract_constraints("somewhere warm please");
        assert_eq!(constraints, TripConstraints::default());
    }

    /// Verifies a schema-valid model reply is used and missing dates come from the text.
    #[test]
    fn model_reply_is_preferred() {
        let model = ScriptedModel::new().push(
            PromptKind::Intent,
            Ok("```json\n{\"destinations\": [\"Osaka\"], \"origin\": null}\n```".to_string()),
        );
        let mut counters = RunCounters::default();
        let parsed = parse_intent(QUERY, &model, &PromptBuilder::default(), &mut counters);
        assert_eq!(parsed.source, IntentSource::Model);
        assert_eq!(parsed.constraints.destinations, vec!["Osaka"]);
        assert_eq!(parsed.constraints.origin, None);
        assert_eq!(parsed.constraints.start_date.as_deref(), Some("2026-05-10"));
        assert_eq!(counters.llm_calls, 1);
        assert_eq!(counters.llm_errors, 0);
    }

    #[test]
    fn schema_violation_falls_back() {
        let model = ScriptedModel::new().push(
            PromptKind::Intent,
            Ok("{\"destination\": \"Osaka\"}".to_string()),
        );
        let mut counters = RunCounters::default();
        let parsed = parse_intent(QUERY, &model, &PromptBuilder::default(), &mut counters);
        assert_eq!(parsed.source, IntentSource::Fallback);
        assert!(parsed.problems[0].starts_with("schema:"));
        assert_eq!(parsed.constraints.destinations, vec!["Kyoto"]);
    }

    #[test]
    fn model_failure_is_counted_and_falls_back() {
        let model = ScriptedModel::new().push(
            PromptKind::Intent,
            Err(CollaboratorError::Timeout("intent".to_string())),
        );
        let mut counters = RunCounters::default();
        let parsed = parse_intent(QUERY, &model, &PromptBuilder::default(), &mut counters);
        assert_eq!(parsed.source, IntentSource::Fallback);
        assert_eq!(counters.llm_errors, 1);
        assert!(parsed.problems[0].contains("timed out"));
    }
}
