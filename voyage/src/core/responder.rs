//! Final answer assembly on the finalize path.
//!
//! Takes the synthesis draft (if any) and makes the answer structurally
//! complete: disclaimer exactly once, missing constraints disclosed, every
//! required section present, prices redacted. Sections whose steps were
//! skipped get an explicit "unavailable" note instead of invented content.

use chrono::Days;

use crate::core::catalog::{self, ToolSpec};
use crate::core::constraints::TripConstraints;
use crate::core::evaluator::{DISCLAIMER, redact_prices};
use crate::core::links::{self, extract_urls};
use crate::core::markdown::{normalize_headings, section_body, set_section};
use crate::core::plan::Step;
use crate::core::state::{Link, RunState, ToolResult};
use crate::core::types::{StepStatus, TerminationReason};

const MAX_GENERATED_DAYS: u64 = 10;

const BUDGET_SPLIT: &str = "- Heuristic split: flights 35–55%, lodging 25–40%, food and activities 15–30%, local transit 5–10%.";

/// How a tool-backed section is filled.
enum SectionSource<'a> {
    /// The tool completed; use its output.
    Completed(Vec<&'a ToolResult>),
    /// The tool was planned but skipped or abandoned.
    Unavailable(&'a Step),
    /// The tool was planned but the run stopped before reaching it.
    NotReached(&'a Step),
    /// The plan never bound this tool.
    NotPlanned,
}

fn section_source<'a>(state: &'a RunState, spec: &ToolSpec) -> SectionSource<'a> {
    let steps: Vec<&Step> = state
        .plan
        .steps
        .iter()
        .filter(|step| step.tool_name() == Some(spec.name))
        .collect();
    if steps.is_empty() {
        return SectionSource::NotPlanned;
    }
    let completed: Vec<&ToolResult> = state
        .tool_outputs()
        .into_iter()
        .filter(|result| result.tool_name == spec.name)
        .collect();
    if !completed.is_empty() {
        return SectionSource::Completed(completed);
    }
    match steps.iter().find(|step| step.status.is_unsuccessful()) {
        Some(step) => SectionSource::Unavailable(step),
        None => SectionSource::NotReached(steps[0]),
    }
}

fn links_markdown(links: &[Link]) -> String {
    links
        .iter()
        .filter(|link| !link.url.is_empty())
        .map(|link| format!("- [{}]({})", link.label, link.url))
        .collect::<Vec<_>>()
        .join("\n")
}

fn unavailable_note(step: &Step) -> String {
    let reason = step
        .triage
        .last()
        .map(|record| format!(" ({})", record.error))
        .unwrap_or_default();
    format!(
        "- Unavailable: \"{}\" did not complete{reason}. Nothing was substituted for it.",
        step.title
    )
}

fn not_reached_note(step: &Step) -> String {
    format!(
        "- Not reached: the run stopped before \"{}\" could execute.",
        step.title
    )
}

/// Draft prose for a section, without lines carrying links.
fn draft_prose(answer: &str, title: &str) -> Option<String> {
    let body = section_body(answer, title)?;
    let prose: Vec<&str> = body
        .lines()
        .filter(|line| extract_urls(line).is_empty())
        .filter(|line| !line.to_lowercase().contains("not available"))
        .collect();
    let prose = prose.join("\n").trim().to_string();
    (!prose.is_empty()).then_some(prose)
}

fn completed_body(answer: &str, title: &str, results: &[&ToolResult]) -> String {
    let mut pieces = Vec::new();
    if let Some(prose) = draft_prose(answer, title) {
        pieces.push(prose);
    }
    for result in results {
        if !result.summary.trim().is_empty() {
            pieces.push(format!("- {}", result.summary.trim()));
        }
        let links = links_markdown(&result.links);
        if !links.is_empty() {
            pieces.push(format!("Search links:\n{links}"));
        }
    }
    pieces.join("\n\n")
}

fn default_links(constraints: &TripConstraints, spec: &ToolSpec) -> Vec<Link> {
    let Some(destination) = constraints.primary_destination() else {
        return Vec::new();
    };
    let start = constraints.start_date.as_deref();
    let end = constraints.end_date.as_deref();
    match spec.name {
        catalog::FLIGHTS => links::flight_links(constraints.origin.as_deref(), destination, start),
        catalog::HOTELS => links::lodging_links(destination, start, end),
        catalog::THINGS_TO_DO => links::things_to_do_links(destination, &constraints.interests),
        catalog::WEATHER => links::weather_links(destination, start),
        catalog::DISTANCE => constraints
            .origin
            .as_deref()
            .map(|origin| vec![links::directions_link(origin, destination, "transit")])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn fallback_body(state: &RunState, answer: &str, spec: &ToolSpec) -> String {
    let links = links_markdown(&default_links(&state.constraints, spec));
    let prose = draft_prose(answer, spec.section);
    match (prose, spec.name) {
        (Some(prose), _) if links.is_empty() => prose,
        (Some(prose), _) => format!("{prose}\n\nSearch links:\n{links}"),
        (None, catalog::DISTANCE) => {
            let mut body = "- Use Google Maps for live routing and travel time between stops.\n- Prefer public transit or walking in city centers; rideshare or taxi late at night.\n- Build buffer time for traffic and station navigation.".to_string();
            if !links.is_empty() {
                body.push('\n');
                body.push_str(&links);
            }
            body
        }
        (None, catalog::WEATHER) if !links.is_empty() => {
            format!("- Seasonal guidance: check typical weather for your dates.\n{links}")
        }
        (None, _) if !links.is_empty() => format!("Search links:\n{links}"),
        (None, _) => "- Provide a destination to generate search links.".to_string(),
    }
}

fn fill_tool_sections(state: &RunState, mut answer: String) -> String {
    for spec in &catalog::TOOL_CATALOG {
        let body = match section_source(state, spec) {
            SectionSource::Completed(results) => completed_body(&answer, spec.section, &results),
            SectionSource::Unavailable(step) => unavailable_note(step),
            SectionSource::NotReached(step) => not_reached_note(step),
            SectionSource::NotPlanned => fallback_body(state, &answer, spec),
        };
        if !body.trim().is_empty() {
            answer = set_section(&answer, spec.section, &body);
        }
    }
    answer
}

fn fill_assumptions(state: &RunState, answer: String) -> String {
    let existing = section_body(&answer, "Assumptions").unwrap_or_default();
    let lower = existing.to_lowercase();
    let mut lines: Vec<String> = existing
        .lines()
        .map(str::to_string)
        .filter(|line| !line.trim().is_empty())
        .collect();
    for field in state.constraints.missing_fields() {
        if !lower.contains(field.token()) {
            lines.push(format!("- {}: not provided", field.token()));
        }
    }
    for warning in &state.warnings {
        if !lower.contains(&warning.to_lowercase()) {
            lines.push(format!("- {warning}"));
        }
    }
    if lines.is_empty() {
        lines.push("- All requested constraints were provided.".to_string());
    }
    set_section(&answer, "Assumptions", &lines.join("\n"))
}

fn day_by_day(constraints: &TripConstraints) -> String {
    let destination = constraints
        .primary_destination()
        .unwrap_or("your destination");
    let Some((start, end)) = constraints.date_range() else {
        return [
            format!("- Day 1: Arrival, neighborhood walk, and an evening food stop in {destination}."),
            "- Day 2: Top sights in the morning, a museum or garden in the afternoon, a market in the evening.".to_string(),
            "- Day 3: Day trip or nature walk, then local cuisine.".to_string(),
        ]
        .join("\n");
    };
    let total_days = u64::try_from((end - start).num_days()).unwrap_or(0) + 1;
    let mut lines = Vec::new();
    for offset in 0..total_days.min(MAX_GENERATED_DAYS) {
        let Some(day) = start.checked_add_days(Days::new(offset)) else {
            break;
        };
        lines.push(format!(
            "- Day {} ({day}): Morning / Afternoon / Evening activities in {destination}.",
            offset + 1
        ));
    }
    if total_days > MAX_GENERATED_DAYS {
        lines.push(format!(
            "- Remaining days: follow a similar pattern (total {total_days} days)."
        ));
    }
    lines.join("\n")
}

fn budget_body(constraints: &TripConstraints) -> String {
    let travelers = constraints.travelers.unwrap_or(1).max(1);
    let opener = if constraints.budget_usd.is_some() {
        format!("- Plan against your stated total budget for {travelers} traveler(s).")
    } else {
        "- Share a budget to tailor the itinerary and tradeoffs.".to_string()
    };
    format!("{opener}\n{BUDGET_SPLIT}\n- No live prices are quoted; validate with the links above.")
}

fn calendar_body(constraints: &TripConstraints) -> String {
    match constraints.date_range() {
        Some((start, end)) => format!(
            "- An `.ics` itinerary calendar is exported with this plan ({start} to {end}, one all-day event per day)."
        ),
        None => "- Provide valid start and end dates to get an `.ics` itinerary calendar.".to_string(),
    }
}

fn summary_body(constraints: &TripConstraints) -> String {
    let destination = constraints
        .primary_destination()
        .unwrap_or("your destination");
    match (
        constraints.start_date.as_deref(),
        constraints.end_date.as_deref(),
    ) {
        (Some(start), Some(end)) => format!("Trip to {destination} from {start} to {end}."),
        _ => format!("Trip to {destination}."),
    }
}

fn run_status(state: &RunState) -> String {
    let mut lines =
        vec!["- Completion not reached: the run stopped at the iteration limit.".to_string()];
    for step in &state.plan.steps {
        lines.push(format!("- {} [{}]", step.title, step.status));
    }
    lines.join("\n")
}

fn is_empty_section(answer: &str, title: &str) -> bool {
    section_body(answer, title).is_none_or(|body| {
        body.is_empty() || body.to_lowercase().contains("not available")
    })
}

/// Assemble the final answer from the run state.
pub fn assemble_answer(state: &RunState) -> String {
    let constraints = &state.constraints;
    let draft = state.synthesis_draft().unwrap_or_default().trim();
    let mut answer = if draft.is_empty() {
        format!("# Trip plan\n\n## Summary\n{}\n", summary_body(constraints))
    } else {
        normalize_headings(draft)
    };
    answer = answer.replace(DISCLAIMER, "");

    if is_empty_section(&answer, "Summary") {
        answer = set_section(&answer, "Summary", &summary_body(constraints));
    }
    answer = fill_assumptions(state, answer);
    answer = fill_tool_sections(state, answer);
    if is_empty_section(&answer, "Day-by-day") {
        answer = set_section(&answer, "Day-by-day", &day_by_day(constraints));
    }
    if is_empty_section(&answer, "Budget") {
        answer = set_section(&answer, "Budget", &budget_body(constraints));
    }
    answer = set_section(&answer, "Calendar", &calendar_body(constraints));
    if state.termination_reason() == TerminationReason::MaxIters {
        answer = set_section(&answer, "Run status", &run_status(state));
    }

    if !state.tool_outputs().iter().any(|result| result.is_priced()) {
        answer = redact_prices(&answer);
    }
    format!("{}\n\n{DISCLAIMER}\n", answer.trim())
}

/// Steps the synthesis call should be told are missing.
pub fn absent_step_titles(state: &RunState) -> Vec<String> {
    state
        .plan
        .steps
        .iter()
        .filter(|step| step.status.is_unsuccessful() || step.status == StepStatus::Pending)
        .filter(|step| !step.is_synthesis())
        .map(|step| step.title.clone())
        .collect()
}
