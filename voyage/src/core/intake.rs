//! Constraint normalization before planning.
//!
//! Intake trims and validates the raw constraints, fills gaps from memory
//! hits, and decides whether the run can start at all. When core input is
//! unusable it returns clarifying questions instead of constraints to plan on.

use crate::core::constraints::{TripConstraints, parse_iso_date};
use crate::core::types::{ContextHit, MemoryKind};

const MAX_QUESTIONS: usize = 4;

pub const DESTINATION_QUESTION: &str = "Where do you want to travel (destination city/country)?";

/// Result of normalizing raw constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeReport {
    pub constraints: TripConstraints,
    pub warnings: Vec<String>,
    /// Non-empty when the run cannot proceed without the user.
    pub questions: Vec<String>,
}

impl IntakeReport {
    pub fn needs_clarification(&self) -> bool {
        !self.questions.is_empty()
    }
}

/// Stable profile fields remembered from earlier runs.
#[derive(Debug, Default, PartialEq)]
struct Remembered {
    origin: Option<String>,
    interests: Vec<String>,
}

fn prefixed_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    let value = text[prefix.len()..].trim();
    (!value.is_empty()).then_some(value)
}

fn remembered(hits: &[ContextHit]) -> Remembered {
    let mut out = Remembered::default();
    for hit in hits {
        let text = hit.text.trim();
        match hit.kind {
            MemoryKind::Profile if out.origin.is_none() => {
                out.origin = prefixed_value(text, "home origin:").map(str::to_string);
            }
            MemoryKind::Preference if out.interests.is_empty() => {
                if let Some(raw) = prefixed_value(text, "user interests:") {
                    out.interests = split_list(raw);
                }
            }
            _ => {}
        }
    }
    out
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn dedupe_case_insensitive(items: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out = Vec::new();
    for item in items {
        let item = item.trim().to_string();
        let key = item.to_lowercase();
        if item.is_empty() || seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(item);
    }
    out
}

/// Questions that must be answered before a plan can be built: a missing
/// destination or a supplied date that is not a valid ISO date.
pub fn blocking_questions(constraints: &TripConstraints) -> Vec<String> {
    let mut questions = Vec::new();
    if constraints.primary_destination().is_none() {
        questions.push(DESTINATION_QUESTION.to_string());
    }
    for (label, value) in [
        ("start", constraints.start_date.as_deref()),
        ("end", constraints.end_date.as_deref()),
    ] {
        if let Some(raw) = value
            && parse_iso_date(raw).is_none()
        {
            questions.push(format!(
                "Your {label} date '{raw}' looks invalid. Please provide the {label} date as YYYY-MM-DD."
            ));
        }
    }
    questions
}

/// Normalize `raw` using prior context `hits`.
///
/// Asks for clarification when the destination is missing or a supplied date
/// is not a valid ISO date. Swapped dates, unusable traveler counts, and
/// unusable budgets are corrected with a warning instead.
pub fn normalize(raw: TripConstraints, hits: &[ContextHit]) -> IntakeReport {
    let mut constraints = raw;
    let mut warnings = Vec::new();

    constraints.origin = clean(constraints.origin.take());
    constraints.start_date = clean(constraints.start_date.take());
    constraints.end_date = clean(constraints.end_date.take());
    constraints.destinations = dedupe_case_insensitive(std::mem::take(&mut constraints.destinations));
    constraints.interests = dedupe_case_insensitive(std::mem::take(&mut constraints.interests));

    let mut questions = blocking_questions(&constraints);

    let start = constraints.start_date.as_deref().and_then(parse_iso_date);
    let end = constraints.end_date.as_deref().and_then(parse_iso_date);
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        constraints.start_date = Some(end.to_string());
        constraints.end_date = Some(start.to_string());
        warnings.push("Swapped start/end dates because the end date was earlier than the start date.".to_string());
    }

    if constraints.travelers == Some(0) {
        constraints.travelers = None;
        warnings.push("Ignored a traveler count of 0.".to_string());
    }
    if let Some(budget) = constraints.budget_usd
        && (!budget.is_finite() || budget < 0.0)
    {
        constraints.budget_usd = None;
        warnings.push("Ignored a negative or non-numeric budget.".to_string());
    }

    let memory = remembered(hits);
    if let Some(origin) = memory.origin {
        match constraints.origin.as_deref() {
            None => {
                constraints.notes.push("Filled origin from memory.".to_string());
                constraints.origin = Some(origin);
            }
            Some(current) if !current.eq_ignore_ascii_case(&origin) => {
                warnings.push(format!(
                    "Saved origin '{origin}' differs from request '{current}'; using request origin."
                ));
            }
            Some(_) => {}
        }
    }
    if constraints.interests.is_empty() && !memory.interests.is_empty() {
        constraints.interests = memory.interests;
        constraints.notes.push("Filled interests from memory.".to_string());
    }

    questions.truncate(MAX_QUESTIONS);
    IntakeReport {
        constraints,
        warnings,
        questions,
    }
}
