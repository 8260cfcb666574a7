//! Static catalog of the tools a plan may bind.

use serde_json::{Map, Value};

use crate::core::constraints::{looks_like_place, parse_iso_date};
use crate::core::types::Tier;

/// Signature and role of a plannable tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    /// Tier a failure of this tool is triaged at.
    pub tier: Tier,
    /// Answer section the tool's output feeds.
    pub section: &'static str,
}

pub const FLIGHTS: &str = "flights_search_links";
pub const HOTELS: &str = "hotels_search_links";
pub const THINGS_TO_DO: &str = "things_to_do_links";
pub const WEATHER: &str = "weather_summary";
pub const DISTANCE: &str = "distance_and_time";

/// Modes accepted by [`DISTANCE`].
pub const TRAVEL_MODES: [&str; 4] = ["driving", "walking", "bicycling", "transit"];

pub const TOOL_CATALOG: [ToolSpec; 5] = [
    ToolSpec {
        name: FLIGHTS,
        required: &["destination"],
        optional: &["origin", "start_date", "travelers"],
        tier: Tier::Major,
        section: "Flights",
    },
    ToolSpec {
        name: HOTELS,
        required: &["destination"],
        optional: &["start_date", "end_date", "travelers", "neighborhood"],
        tier: Tier::Major,
        section: "Lodging",
    },
    ToolSpec {
        name: THINGS_TO_DO,
        required: &["destination"],
        optional: &["interests"],
        tier: Tier::Minor,
        section: "Things to do",
    },
    ToolSpec {
        name: WEATHER,
        required: &["destination"],
        optional: &["start_date", "end_date"],
        tier: Tier::Minor,
        section: "Weather",
    },
    ToolSpec {
        name: DISTANCE,
        required: &["origin", "destination"],
        optional: &["mode"],
        tier: Tier::Minor,
        section: "Transit",
    },
];

pub fn lookup(name: &str) -> Option<&'static ToolSpec> {
    TOOL_CATALOG.iter().find(|spec| spec.name == name)
}

/// Names of all catalogued tools, in catalog order.
pub fn tool_names() -> Vec<&'static str> {
    TOOL_CATALOG.iter().map(|spec| spec.name).collect()
}

/// Check a tool binding against its catalog signature.
///
/// Returns a list of stable error messages (empty on success). Extra
/// arguments are tolerated; required ones must be present and non-empty, and
/// every catalogued argument that is present must have the shape the tool
/// reads.
pub fn check_binding(tool_name: &str, args: &Map<String, Value>) -> Vec<String> {
    let Some(spec) = lookup(tool_name) else {
        return vec![format!("unknown tool '{tool_name}'")];
    };
    let mut errors: Vec<String> = spec
        .required
        .iter()
        .filter(|arg| !argument_present(args.get(**arg)))
        .map(|arg| format!("{tool_name}: missing required argument '{arg}'"))
        .collect();
    for arg in spec.required.iter().chain(spec.optional) {
        let Some(value) = args.get(*arg).filter(|v| argument_present(Some(*v))) else {
            continue;
        };
        if let Some(problem) = argument_problem(arg, value) {
            errors.push(format!("{tool_name}: argument '{arg}' {problem}"));
        }
    }
    errors
}

/// What is wrong with a present argument value, if anything.
fn argument_problem(arg: &str, value: &Value) -> Option<String> {
    match (arg, value) {
        ("origin" | "destination", Value::String(place)) => (!looks_like_place(place))
            .then(|| format!("'{}' does not look like a place", place.trim())),
        ("start_date" | "end_date", Value::String(raw)) => parse_iso_date(raw)
            .is_none()
            .then(|| format!("must be YYYY-MM-DD, got '{raw}'")),
        ("mode", Value::String(mode)) => (!TRAVEL_MODES.contains(&mode.trim()))
            .then(|| format!("must be one of {}, got '{mode}'", TRAVEL_MODES.join(", "))),
        ("neighborhood", Value::String(_)) => None,
        ("neighborhood" | "origin" | "destination" | "start_date" | "end_date" | "mode", other) => {
            Some(format!("must be a string, got {other}"))
        }
        ("travelers", Value::Number(n)) => n
            .as_u64()
            .is_none_or(|count| count == 0)
            .then(|| format!("must be a positive integer, got {n}")),
        ("travelers", other) => Some(format!("must be a positive integer, got {other}")),
        ("interests", Value::String(_)) => None,
        ("interests", Value::Array(items)) => (!items.iter().all(Value::is_string))
            .then(|| "must list strings".to_string()),
        ("interests", other) => Some(format!("must be a list, got {other}")),
        _ => None,
    }
}

fn argument_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn primary_tools_are_major() {
        assert_eq!(lookup(FLIGHTS).expect("flights").tier, Tier::Major);
        assert_eq!(lookup(HOTELS).expect("hotels").tier, Tier::Major);
        assert_eq!(lookup(WEATHER).expect("weather").tier, Tier::Minor);
    }

    #[test]
    fn check_binding_reports_unknown_tool() {
        let errors = check_binding("book_flight", &Map::new());
        assert_eq!(errors, vec!["unknown tool 'book_flight'".to_string()]);
    }

    #[test]
    fn check_binding_requires_non_empty_arguments() {
        let errors = check_binding(DISTANCE, &args(json!({"origin": "", "destination": "Kyoto"})));
        assert_eq!(
            errors,
            vec!["distance_and_time: missing required argument 'origin'".to_string()]
        );
        assert!(check_binding(WEATHER, &args(json!({"destination": "Kyoto", "extra": 1}))).is_empty());
    }

    /// Verifies values the tools would reject fail the binding check.
    #[test]
    fn check_binding_rejects_misshapen_values() {
        let errors = check_binding(
            WEATHER,
            &args(json!({"destination": "Oslo", "start_date": "next week"})),
        );
        assert_eq!(
            errors,
            vec!["weather_summary: argument 'start_date' must be YYYY-MM-DD, got 'next week'".to_string()]
        );

        let errors = check_binding(FLIGHTS, &args(json!({"destination": 42, "travelers": 0})));
        assert_eq!(
            errors,
            vec![
                "flights_search_links: argument 'destination' must be a string, got 42".to_string(),
                "flights_search_links: argument 'travelers' must be a positive integer, got 0".to_string(),
            ]
        );

        let errors = check_binding(
            DISTANCE,
            &args(json!({"origin": "Xzzqwrtplkk", "destination": "Kyoto", "mode": "teleport"})),
        );
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors[0].contains("'origin' 'Xzzqwrtplkk' does not look like a place"));
        assert!(errors[1].contains("'mode' must be one of"));
    }

    #[test]
    fn check_binding_accepts_tool_shapes() {
        let binding = args(json!({
            "destination": "Tokyo",
            "start_date": "2026-04-01",
            "end_date": "2026-04-03",
            "travelers": 2,
            "neighborhood": "Shinjuku",
        }));
        assert!(check_binding(HOTELS, &binding).is_empty());
        assert!(check_binding(THINGS_TO_DO, &args(json!({"destination": "Rome", "interests": "food, art"}))).is_empty());
    }
}
