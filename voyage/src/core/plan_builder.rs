//! The two planner stages: schema-validated decode of model output and the
//! deterministic constructor it falls back to.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::core::catalog::{self, check_binding};
use crate::core::constraints::TripConstraints;
use crate::core::plan::{Plan, PlanSource, Step, StepKind};

/// Longest plan accepted from the model, synthesis included.
pub const MAX_PLAN_STEPS: usize = 12;

const SYNTHESIS_TITLE: &str = "Synthesize itinerary and recommendations";

pub const PLANNER_SCHEMA: &str = include_str!("../../schemas/planner_output.schema.json");

static PLANNER_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PLANNER_SCHEMA).expect("planner schema is valid json");
    jsonschema::validator_for(&schema).expect("planner schema compiles")
});

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    plan: Vec<PlannedStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum PlannedStepType {
    RetrieveContext,
    ToolCall,
    Synthesize,
}

#[derive(Debug, Deserialize)]
struct PlannedStep {
    title: String,
    step_type: PlannedStepType,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    tool_args: Option<Map<String, Value>>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

fn step_id(index: usize) -> String {
    format!("step-{}", index + 1)
}

/// Strip a Markdown code fence around a JSON payload, if present.
pub fn unfence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn without_nulls(args: Map<String, Value>) -> Map<String, Value> {
    args.into_iter().filter(|(_, value)| !value.is_null()).collect()
}

/// Decode model planner output into a plan.
///
/// Rejections carry every problem found: malformed JSON, schema violations,
/// unknown tools, missing required arguments, oversize or empty plans.
/// Stray synthesis steps are dropped and one is appended last.
pub fn decode_llm_plan(raw: &str) -> Result<Plan, Vec<String>> {
    let value: Value = serde_json::from_str(unfence(raw))
        .map_err(|err| vec![format!("malformed JSON: {err}")])?;
    let schema_errors: Vec<String> = PLANNER_VALIDATOR
        .iter_errors(&value)
        .map(|err| format!("schema: {err}"))
        .collect();
    if !schema_errors.is_empty() {
        return Err(schema_errors);
    }
    let output: PlannerOutput =
        serde_json::from_value(value).map_err(|err| vec![format!("decode: {err}")])?;

    let mut errors = Vec::new();
    let mut steps = Vec::new();
    let mut synthesis_title = None;
    for item in output.plan {
        let kind = match item.step_type {
            PlannedStepType::Synthesize => {
                synthesis_title = Some(item.title);
                continue;
            }
            PlannedStepType::RetrieveContext => StepKind::RetrieveContext {
                query: item.query.filter(|q| !q.trim().is_empty()),
            },
            PlannedStepType::ToolCall => {
                let tool_name = item.tool_name.unwrap_or_default();
                let tool_args = without_nulls(item.tool_args.unwrap_or_default());
                errors.extend(check_binding(&tool_name, &tool_args));
                StepKind::ToolCall {
                    tool_name,
                    tool_args,
                }
            }
        };
        let mut step = Step::new(step_id(steps.len()), item.title, kind);
        step.notes = item.notes.filter(|n| !n.trim().is_empty());
        steps.push(step);
    }
    steps.push(Step::new(
        step_id(steps.len()),
        synthesis_title.unwrap_or_else(|| SYNTHESIS_TITLE.to_string()),
        StepKind::Synthesize,
    ));
    if steps.len() > MAX_PLAN_STEPS {
        errors.push(format!(
            "plan has {} steps (max {MAX_PLAN_STEPS})",
            steps.len()
        ));
    }
    if steps.len() == 1 {
        errors.push("plan has no work steps before synthesis".to_string());
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    Plan::new(PlanSource::Llm, steps).map_err(|err| vec![err.to_string()])
}

fn args(pairs: &[(&str, Option<Value>)]) -> Map<String, Value> {
    pairs
        .iter()
        .filter_map(|(key, value)| value.clone().map(|value| (key.to_string(), value)))
        .collect()
}

/// Fixed plan: flights, lodging, things to do, and weather link tools for the
/// primary destination, then synthesis. Without a destination only the
/// synthesis step remains.
pub fn deterministic_plan(constraints: &TripConstraints) -> Plan {
    let mut steps = Vec::new();
    if let Some(destination) = constraints.primary_destination() {
        let destination = Some(json!(destination));
        let origin = constraints.origin.as_deref().map(|o| json!(o));
        let start = constraints.start_date.as_deref().map(|d| json!(d));
        let end = constraints.end_date.as_deref().map(|d| json!(d));
        let travelers = constraints.travelers.map(|t| json!(t));
        let interests = (!constraints.interests.is_empty()).then(|| json!(constraints.interests));

        let bindings = [
            (
                "Get flight search links",
                catalog::FLIGHTS,
                args(&[
                    ("origin", origin),
                    ("destination", destination.clone()),
                    ("start_date", start.clone()),
                    ("travelers", travelers.clone()),
                ]),
            ),
            (
                "Get hotel search links",
                catalog::HOTELS,
                args(&[
                    ("destination", destination.clone()),
                    ("start_date", start.clone()),
                    ("end_date", end.clone()),
                    ("travelers", travelers),
                ]),
            ),
            (
                "Get things-to-do discovery links",
                catalog::THINGS_TO_DO,
                args(&[("destination", destination.clone()), ("interests", interests)]),
            ),
            (
                "Get weather summary",
                catalog::WEATHER,
                args(&[
                    ("destination", destination),
                    ("start_date", start),
                    ("end_date", end),
                ]),
            ),
        ];
        for (title, tool, tool_args) in bindings {
            steps.push(Step::tool(step_id(steps.len()), title, tool, tool_args));
        }
    }
    steps.push(Step::new(
        step_id(steps.len()),
        SYNTHESIS_TITLE,
        StepKind::Synthesize,
    ));
    Plan {
        source: PlanSource::Deterministic,
        steps,
    }
}
