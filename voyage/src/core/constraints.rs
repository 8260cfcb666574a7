//! Trip constraints and the fields the evaluator expects to see covered.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CONSONANT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[bcdfghjklmnpqrstvwxyz]{6,}").expect("valid consonant regex"));

/// Requested travel pace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pace {
    Relaxed,
    Balanced,
    Packed,
}

/// Parsed user constraints. Written once by intake, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripConstraints {
    pub origin: Option<String>,
    pub destinations: Vec<String>,
    /// ISO `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// ISO `YYYY-MM-DD`.
    pub end_date: Option<String>,
    pub budget_usd: Option<f64>,
    pub travelers: Option<u32>,
    pub interests: Vec<String>,
    pub pace: Option<Pace>,
    pub notes: Vec<String>,
}

/// A constraint the final answer must either honor or disclose as assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintField {
    Destination,
    StartDate,
    EndDate,
    Origin,
    Budget,
    Travelers,
}

impl ConstraintField {
    pub const ALL: [ConstraintField; 6] = [
        ConstraintField::Destination,
        ConstraintField::StartDate,
        ConstraintField::EndDate,
        ConstraintField::Origin,
        ConstraintField::Budget,
        ConstraintField::Travelers,
    ];

    /// Lowercase token used in the Assumptions section.
    pub fn token(self) -> &'static str {
        match self {
            ConstraintField::Destination => "destination",
            ConstraintField::StartDate => "start date",
            ConstraintField::EndDate => "end date",
            ConstraintField::Origin => "origin",
            ConstraintField::Budget => "budget",
            ConstraintField::Travelers => "travelers",
        }
    }

    /// Tool argument name that carries this field, if any.
    pub fn argument(self) -> Option<&'static str> {
        match self {
            ConstraintField::Destination => Some("destination"),
            ConstraintField::StartDate => Some("start_date"),
            ConstraintField::EndDate => Some("end_date"),
            ConstraintField::Origin => Some("origin"),
            ConstraintField::Budget | ConstraintField::Travelers => None,
        }
    }
}

/// Tool arguments that carry core input. Errors naming one of these make the
/// run unable to proceed without the user.
pub const CORE_ARGUMENTS: [&str; 4] = ["destination", "origin", "start_date", "end_date"];

impl TripConstraints {
    pub fn primary_destination(&self) -> Option<&str> {
        self.destinations
            .iter()
            .map(String::as_str)
            .find(|dest| !dest.trim().is_empty())
    }

    pub fn is_supplied(&self, field: ConstraintField) -> bool {
        match field {
            ConstraintField::Destination => self.primary_destination().is_some(),
            ConstraintField::StartDate => non_empty(self.start_date.as_deref()),
            ConstraintField::EndDate => non_empty(self.end_date.as_deref()),
            ConstraintField::Origin => non_empty(self.origin.as_deref()),
            ConstraintField::Budget => self.budget_usd.is_some(),
            ConstraintField::Travelers => self.travelers.is_some(),
        }
    }

    /// Fields not supplied, in the fixed order of [`ConstraintField::ALL`].
    pub fn missing_fields(&self) -> Vec<ConstraintField> {
        ConstraintField::ALL
            .into_iter()
            .filter(|field| !self.is_supplied(*field))
            .collect()
    }

    /// Parsed trip date range, ordered, when both dates are valid.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = parse_iso_date(self.start_date.as_deref()?)?;
        let end = parse_iso_date(self.end_date.as_deref()?)?;
        Some(if end < start { (end, start) } else { (start, end) })
    }
}

/// Parse an ISO `YYYY-MM-DD` date.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Below this share of vowels a long single token is taken for gibberish.
/// `Christchurch` sits at 0.17.
const MIN_VOWEL_RATIO: f64 = 0.15;

/// Whether `name` could plausibly name a place.
///
/// Rejects names with digits, and long single tokens that are nearly all
/// consonants (keyboard mashing such as `Xzzqwrtplkk`). Short codes like
/// `SFO` and multi-word names always pass.
pub fn looks_like_place(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || name.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let single_token = !name.contains([' ', ',', '-']);
    if !single_token || name.chars().count() < 10 {
        return true;
    }
    let letters: Vec<char> = name.chars().filter(|c| c.is_alphabetic()).collect();
    let vowels = letters
        .iter()
        .filter(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
        .count();
    let vowel_ratio = vowels as f64 / letters.len().max(1) as f64;
    vowel_ratio >= MIN_VOWEL_RATIO && !CONSONANT_RUN_RE.is_match(name)
}

fn non_empty(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_follow_fixed_order() {
        let constraints = TripConstraints {
            destinations: vec!["Lisbon".to_string()],
            travelers: Some(2),
            ..TripConstraints::default()
        };
        assert_eq!(
            constraints.missing_fields(),
            vec![
                ConstraintField::StartDate,
                ConstraintField::EndDate,
                ConstraintField::Origin,
                ConstraintField::Budget,
            ]
        );
    }

    #[test]
    fn blank_destination_is_not_supplied() {
        let constraints = TripConstraints {
            destinations: vec!["  ".to_string()],
            ..TripConstraints::default()
        };
        assert!(!constraints.is_supplied(ConstraintField::Destination));
    }

    #[test]
    fn date_range_orders_swapped_dates() {
        let constraints = TripConstraints {
            start_date: Some("2026-05-10".to_string()),
            end_date: Some("2026-05-07".to_string()),
            ..TripConstraints::default()
        };
        let (start, end) = constraints.date_range().expect("range");
        assert_eq!(start.to_string(), "2026-05-07");
        assert_eq!(end.to_string(), "2026-05-10");
    }

    #[test]
    fn invalid_date_yields_no_range() {
        let constraints = TripConstraints {
            start_date: Some("2026-02-30".to_string()),
            end_date: Some("2026-03-02".to_string()),
            ..TripConstraints::default()
        };
        assert!(constraints.date_range().is_none());
    }

    #[test]
    fn place_names_pass_the_plausibility_check() {
        for name in ["Tokyo", "SFO", "San Francisco", "Rio de Janeiro", "Christchurch", "Reykjavik"] {
            assert!(looks_like_place(name), "{name}");
        }
    }

    /// Verifies digits and keyboard mashing are not taken for places.
    #[test]
    fn gibberish_fails_the_plausibility_check() {
        for name in ["42", "Paris 2", "", "Xzzqwrtplkk", "asdfghjklqwe"] {
            assert!(!looks_like_place(name), "{name:?}");
        }
    }
}
