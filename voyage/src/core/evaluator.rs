//! Post-hoc hard gates and rubric scoring over a finished run.
//!
//! The evaluator is a pure function of the run state: the same state always
//! yields the same gates, scores, and verdict. It never fails; absent or
//! ambiguous inputs fail their gate instead.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::calendar::event_start_dates;
use crate::core::constraints::TripConstraints;
use crate::core::links::{extract_urls, link_problem};
use crate::core::markdown::{has_section, section_body};
use crate::core::state::RunState;
use crate::core::types::{OverallStatus, TerminationReason};

/// Disclaimer every final answer carries exactly once.
pub const DISCLAIMER: &str =
    "Note: Visa/health requirements vary; verify with official sources (this is not legal advice).";

/// Sections a complete answer contains, in presentation order.
pub const REQUIRED_SECTIONS: [&str; 9] = [
    "Summary",
    "Assumptions",
    "Flights",
    "Lodging",
    "Day-by-day",
    "Transit",
    "Weather",
    "Budget",
    "Calendar",
];

pub const GATE_ASSUMPTIONS: &str = "assumption_coverage";
pub const GATE_PRICES: &str = "no_fabricated_prices";
pub const GATE_LINKS: &str = "link_validity";
pub const GATE_CALENDAR: &str = "calendar_consistency";
pub const GATE_DISCLAIMER: &str = "disclaimer_once";

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\$\s?\d+|USD\s?\d+|\d+\s?USD|€\s?\d+|\d+\s?EUR)").expect("valid price regex")
});
static PRICE_WORD_THEN_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(price|prices|cost|costs|fare|fares)\b.{0,25}\d").expect("valid regex")
});
static DIGIT_THEN_PRICE_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d.{0,25}\b(price|prices|cost|costs|fare|fares)\b").expect("valid regex")
});
static TIME_MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2}:\d{2}|morning|afternoon|evening)\b").expect("valid time regex")
});
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s+").expect("valid bullet regex"));
static EXPORT_CLAIM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bexported\b").expect("valid export regex"));

/// Replace currency amounts with a neutral marker.
pub fn redact_prices(text: &str) -> String {
    PRICE_RE.replace_all(text, "[amount removed]").into_owned()
}

/// Outcome of one hard gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub detail: String,
}

impl GateResult {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub hard_gates: BTreeMap<String, GateResult>,
    pub rubric: BTreeMap<String, f64>,
    pub rubric_mean: f64,
    pub threshold: f64,
    pub overall_status: OverallStatus,
    pub notes: Vec<String>,
}

impl Evaluation {
    pub fn all_gates_passed(&self) -> bool {
        self.hard_gates.values().all(|gate| gate.passed)
    }

    pub fn failed_gates(&self) -> Vec<&str> {
        self.hard_gates
            .iter()
            .filter(|(_, gate)| !gate.passed)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Evaluation settings taken from the agent configuration.
#[derive(Debug, Clone, Copy)]
pub struct EvalSettings<'a> {
    pub threshold: f64,
    pub allowed_domains: &'a [String],
}

/// Score a terminated run.
pub fn evaluate(state: &RunState, settings: &EvalSettings<'_>) -> Evaluation {
    let answer = state.final_answer().unwrap_or_default();
    let constraints = &state.constraints;

    let mut hard_gates = BTreeMap::new();
    hard_gates.insert(
        GATE_ASSUMPTIONS.to_string(),
        assumption_coverage(constraints, answer),
    );
    hard_gates.insert(GATE_PRICES.to_string(), no_fabricated_prices(state, answer));
    hard_gates.insert(
        GATE_LINKS.to_string(),
        link_validity(answer, settings.allowed_domains),
    );
    hard_gates.insert(GATE_CALENDAR.to_string(), calendar_consistency(state, answer));
    hard_gates.insert(GATE_DISCLAIMER.to_string(), disclaimer_once(answer));

    let mut rubric = BTreeMap::new();
    rubric.insert("relevance".to_string(), relevance(constraints, answer));
    rubric.insert("feasibility".to_string(), feasibility(answer));
    rubric.insert("completeness".to_string(), completeness(answer));
    rubric.insert("specificity".to_string(), specificity(answer));
    rubric.insert("coherence".to_string(), coherence(constraints, answer));

    let rubric_mean = rubric.values().sum::<f64>() / rubric.len() as f64;
    let all_gates = hard_gates.values().all(|gate| gate.passed);
    let overall_status = if !all_gates {
        OverallStatus::Failed
    } else if rubric_mean < settings.threshold
        || state.termination_reason() == TerminationReason::MaxIters
    {
        // An incomplete plan is never rated good.
        OverallStatus::NeedsWork
    } else {
        OverallStatus::Good
    };

    let mut notes: Vec<String> = hard_gates
        .iter()
        .filter(|(_, gate)| !gate.passed)
        .map(|(name, gate)| format!("{name}: {}", gate.detail))
        .collect();
    if state.termination_reason() == TerminationReason::MaxIters {
        notes.push("Run stopped at the iteration limit before the plan completed.".to_string());
    }
    notes.push(format!(
        "Average rubric score: {rubric_mean:.2} (threshold {:.2}).",
        settings.threshold
    ));

    Evaluation {
        hard_gates,
        rubric,
        rubric_mean,
        threshold: settings.threshold,
        overall_status,
        notes,
    }
}

fn assumption_coverage(constraints: &TripConstraints, answer: &str) -> GateResult {
    let missing = constraints.missing_fields();
    if answer.trim().is_empty() {
        return GateResult::fail("no final answer");
    }
    if missing.is_empty() {
        return GateResult::pass("all constraints supplied");
    }
    let Some(body) = section_body(answer, "Assumptions") else {
        return GateResult::fail("missing Assumptions section");
    };
    let body = body.to_lowercase();
    let undisclosed: Vec<&str> = missing
        .iter()
        .map(|field| field.token())
        .filter(|token| !body.contains(token))
        .collect();
    if undisclosed.is_empty() {
        GateResult::pass(format!("{} missing field(s) disclosed", missing.len()))
    } else {
        GateResult::fail(format!("undisclosed: {}", undisclosed.join(", ")))
    }
}

fn no_fabricated_prices(state: &RunState, answer: &str) -> GateResult {
    if answer.trim().is_empty() {
        return GateResult::fail("no final answer");
    }
    if state.tool_outputs().iter().any(|result| result.is_priced()) {
        return GateResult::pass("priced data source present");
    }
    let hit = PRICE_RE
        .find(answer)
        .or_else(|| PRICE_WORD_THEN_DIGIT_RE.find(answer))
        .or_else(|| DIGIT_THEN_PRICE_WORD_RE.find(answer));
    match hit {
        Some(found) => GateResult::fail(format!("price claim '{}'", found.as_str().trim())),
        None => GateResult::pass("no price claims"),
    }
}

fn link_validity(answer: &str, allowed: &[String]) -> GateResult {
    if answer.trim().is_empty() {
        return GateResult::fail("no final answer");
    }
    let urls = extract_urls(answer);
    let problems: Vec<String> = urls
        .iter()
        .filter_map(|url| link_problem(url, allowed))
        .collect();
    if problems.is_empty() {
        GateResult::pass(format!("{} link(s) valid", urls.len()))
    } else {
        GateResult::fail(problems.join("; "))
    }
}

fn calendar_consistency(state: &RunState, answer: &str) -> GateResult {
    let claimed = section_body(answer, "Calendar").is_some_and(|body| EXPORT_CLAIM_RE.is_match(&body));
    let Some(artifact) = state.calendar() else {
        return if claimed {
            GateResult::fail("calendar export claimed but no artifact was written")
        } else {
            GateResult::pass("no calendar claimed")
        };
    };

    let dates = event_start_dates(&artifact.ics);
    if dates.is_empty() {
        return GateResult::fail("calendar has no events");
    }
    if dates.iter().any(Option::is_none) {
        return GateResult::fail("calendar event without a valid start date");
    }
    let mut dates: Vec<_> = dates.into_iter().flatten().collect();
    let Some((start, end)) = state.constraints.date_range() else {
        return GateResult::fail("calendar exists but the trip has no valid date range");
    };
    if let Some(outside) = dates.iter().find(|date| **date < start || **date > end) {
        return GateResult::fail(format!("event on {outside} outside {start}..{end}"));
    }
    dates.sort();
    dates.dedup();
    let expected_days = (end - start).num_days() + 1;
    if dates.len() as i64 != expected_days {
        return GateResult::fail(format!(
            "{} distinct event day(s) for a {expected_days}-day trip",
            dates.len()
        ));
    }
    GateResult::pass(format!("{expected_days} day(s) covered"))
}

fn disclaimer_once(answer: &str) -> GateResult {
    match answer.matches(DISCLAIMER).count() {
        1 => GateResult::pass("disclaimer present once"),
        0 => GateResult::fail("disclaimer missing"),
        n => GateResult::fail(format!("disclaimer repeated {n} times")),
    }
}

fn relevance(constraints: &TripConstraints, answer: &str) -> f64 {
    let interests: Vec<String> = constraints
        .interests
        .iter()
        .map(|interest| interest.trim().to_lowercase())
        .filter(|interest| !interest.is_empty())
        .collect();
    if interests.is_empty() {
        return 3.5;
    }
    let text = answer.to_lowercase();
    let hits = interests
        .iter()
        .filter(|interest| text.contains(interest.as_str()))
        .count();
    let denominator = interests.len().clamp(1, 5) as f64;
    (2.0 + 3.0 * (hits as f64 / denominator)).clamp(0.0, 5.0)
}

fn feasibility(answer: &str) -> f64 {
    let text = answer.to_lowercase();
    if ["travel time", "transit", "distance"]
        .iter()
        .any(|needle| text.contains(needle))
    {
        4.0
    } else {
        3.0
    }
}

fn completeness(answer: &str) -> f64 {
    let found = REQUIRED_SECTIONS
        .iter()
        .filter(|section| has_section(answer, section))
        .count();
    5.0 * found as f64 / REQUIRED_SECTIONS.len() as f64
}

fn specificity(answer: &str) -> f64 {
    let time_mentions = TIME_MENTION_RE.find_iter(answer).count() as f64;
    let bullets = BULLET_RE.find_iter(answer).count() as f64;
    let score = (time_mentions / 6.0 * 2.5).min(2.5) + (bullets / 20.0 * 2.5).min(2.5);
    score.clamp(0.0, 5.0)
}

fn coherence(constraints: &TripConstraints, answer: &str) -> f64 {
    let text = answer.to_lowercase();
    let mut score: f64 = 5.0;
    let destinations: Vec<String> = constraints
        .destinations
        .iter()
        .map(|dest| dest.trim().to_lowercase())
        .filter(|dest| !dest.is_empty())
        .collect();
    if !destinations.is_empty() && !destinations.iter().any(|dest| text.contains(dest.as_str())) {
        score -= 2.0;
    }
    for value in [
        constraints.start_date.as_deref(),
        constraints.end_date.as_deref(),
        constraints.origin.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        if !text.contains(&value.trim().to_lowercase()) {
            score -= 1.0;
        }
    }
    score.clamp(0.0, 5.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::links::DEFAULT_ALLOWED_DOMAINS;
    use crate::core::state::CalendarArtifact;
    use crate::test_support::{deterministic_state, good_answer};

    fn allowed() -> Vec<String> {
        DEFAULT_ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect()
    }

    fn finished(answer: &str) -> RunState {
        let mut state = deterministic_state();
        state
            .terminate(TerminationReason::Finalized)
            .expect("terminate");
        state.set_final_answer(answer.to_string()).expect("answer");
        state
    }

    fn run(state: &RunState) -> Evaluation {
        let domains = allowed();
        evaluate(
            state,
            &EvalSettings {
                threshold: 3.5,
                allowed_domains: &domains,
            },
        )
    }

    #[test]
    fn good_answer_passes_every_gate() {
        let state = finished(&good_answer());
        let evaluation = run(&state);
        assert!(evaluation.all_gates_passed(), "{:?}", evaluation.notes);
        assert_eq!(evaluation.overall_status, OverallStatus::Good);
    }

    #[test]
    fn missing_answer_fails_gates() {
        let mut state = deterministic_state();
        state
            .terminate(TerminationReason::MaxIters)
            .expect("terminate");
        let evaluation = run(&state);
        assert_eq!(evaluation.overall_status, OverallStatus::Failed);
        assert!(!evaluation.hard_gates[GATE_DISCLAIMER].passed);
        assert!(!evaluation.hard_gates[GATE_ASSUMPTIONS].passed);
        assert!(evaluation.notes.iter().any(|note| note.contains("iteration limit")));
    }

    #[test]
    fn loop_guarded_run_is_at_best_needs_work() {
        let mut state = deterministic_state();
        state
            .terminate(TerminationReason::MaxIters)
            .expect("terminate");
        state.set_final_answer(good_answer()).expect("answer");
        let evaluation = run(&state);
        assert!(evaluation.all_gates_passed(), "{:?}", evaluation.notes);
        assert_eq!(evaluation.overall_status, OverallStatus::NeedsWork);
    }

    #[test]
    fn duplicated_disclaimer_fails() {
        let answer = format!("{}\n{DISCLAIMER}\n", good_answer());
        let evaluation = run(&finished(&answer));
        assert!(!evaluation.hard_gates[GATE_DISCLAIMER].passed);
        assert_eq!(evaluation.overall_status, OverallStatus::Failed);
    }

    #[test]
    fn quoted_price_fails_without_priced_source() {
        let answer = good_answer().replace("- Heuristic split", "- Flights cost about 450\n- Heuristic split");
        let evaluation = run(&finished(&answer));
        assert!(!evaluation.hard_gates[GATE_PRICES].passed);

        let answer = good_answer().replace("- Heuristic split", "- Hotels from $120 a night\n- Heuristic split");
        assert!(!run(&finished(&answer)).hard_gates[GATE_PRICES].passed);
    }

    #[test]
    fn off_list_link_fails() {
        let answer = good_answer().replace(
            "## Transit\n",
            "## Transit\n- [Deals](https://cheap-travel.example/tokyo)\n",
        );
        let evaluation = run(&finished(&answer));
        let gate = &evaluation.hard_gates[GATE_LINKS];
        assert!(!gate.passed);
        assert!(gate.detail.contains("cheap-travel.example"));
    }

    #[test]
    fn undisclosed_missing_field_fails() {
        let mut state = deterministic_state();
        state.constraints.budget_usd = None;
        state
            .terminate(TerminationReason::Finalized)
            .expect("terminate");
        state
            .set_final_answer(good_answer().replace("- budget: not provided\n", ""))
            .expect("answer");
        let evaluation = run(&state);
        let gate = &evaluation.hard_gates[GATE_ASSUMPTIONS];
        assert!(!gate.passed);
        assert_eq!(gate.detail, "undisclosed: budget");
    }

    #[test]
    fn calendar_claim_without_artifact_fails() {
        let answer = good_answer().replace(
            "- No calendar export.",
            "- An `.ics` itinerary calendar was exported.",
        );
        let evaluation = run(&finished(&answer));
        assert!(!evaluation.hard_gates[GATE_CALENDAR].passed);
    }

    #[test]
    fn calendar_must_cover_each_trip_day() {
        let mut state = finished(&good_answer());
        let ics = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nDTSTART;VALUE=DATE:20260401\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        state
            .record_calendar(CalendarArtifact {
                path: "x.ics".to_string(),
                ics: ics.to_string(),
                event_count: 1,
            })
            .expect("calendar");
        let gate = &run(&state).hard_gates[GATE_CALENDAR];
        assert!(!gate.passed);
        assert!(gate.detail.contains("3-day trip"), "{}", gate.detail);
    }

    #[test]
    fn redact_prices_clears_the_gate() {
        let answer = good_answer().replace("- Heuristic split", "- Hotels from $120 a night\n- Heuristic split");
        let evaluation = run(&finished(&redact_prices(&answer)));
        assert!(evaluation.hard_gates[GATE_PRICES].passed);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let state = finished(&good_answer());
        assert_eq!(run(&state), run(&state));
    }

    #[test]
    fn thin_answer_needs_work() {
        let answer = format!(
            "## Summary\nTokyo.\n## Assumptions\n- budget: not provided\n\n{DISCLAIMER}\n"
        );
        let evaluation = run(&finished(&answer));
        assert!(evaluation.all_gates_passed(), "{:?}", evaluation.notes);
        assert_eq!(evaluation.overall_status, OverallStatus::NeedsWork);
    }
}
