//! Tool collaborator: the catalogued link tools behind a call interface.
//!
//! The built-in tools are deterministic link builders; they never fetch
//! prices or availability.

use serde_json::{Map, Value, json};
use tracing::{debug, instrument};

use crate::core::catalog;
use crate::core::constraints::{looks_like_place, parse_iso_date};
use crate::core::errors::CollaboratorError;
use crate::core::links;
use crate::core::state::ToolResult;

pub trait ToolBox {
    fn call(&self, tool_name: &str, args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError>;
}

/// Built-in link tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkTools;

fn optional_str<'a>(
    args: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, CollaboratorError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim())),
        Some(other) => Err(CollaboratorError::invalid_argument(
            name,
            format!("'{name}' must be a string, got {other}"),
        )),
    }
}

/// A place argument; names that cannot be a real place are not found.
fn optional_place<'a>(
    args: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, CollaboratorError> {
    let place = optional_str(args, name)?;
    if let Some(place) = place
        && !looks_like_place(place)
    {
        return Err(CollaboratorError::not_found(
            name,
            format!("'{place}' does not look like a real place"),
        ));
    }
    Ok(place)
}

fn required_place<'a>(
    args: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a str, CollaboratorError> {
    optional_place(args, name)?
        .ok_or_else(|| CollaboratorError::invalid_argument(name, format!("'{name}' is required")))
}

fn optional_date<'a>(
    args: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, CollaboratorError> {
    let Some(raw) = optional_str(args, name)? else {
        return Ok(None);
    };
    if parse_iso_date(raw).is_none() {
        return Err(CollaboratorError::invalid_argument(
            name,
            format!("'{name}' must be YYYY-MM-DD, got '{raw}'"),
        ));
    }
    Ok(Some(raw))
}

fn string_list(args: &Map<String, Value>, name: &str) -> Result<Vec<String>, CollaboratorError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    CollaboratorError::invalid_argument(name, format!("'{name}' must list strings"))
                })
            })
            .collect(),
        Some(Value::String(raw)) => Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()),
        Some(other) => Err(CollaboratorError::invalid_argument(
            name,
            format!("'{name}' must be a list, got {other}"),
        )),
    }
}

impl LinkTools {
    fn flights(args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        let destination = required_place(args, "destination")?;
        let origin = optional_place(args, "origin")?;
        let start = optional_date(args, "start_date")?;
        Ok(ToolResult {
            tool_name: catalog::FLIGHTS.to_string(),
            summary: "Flight search links; fares and availability are not fetched.".to_string(),
            links: links::flight_links(origin, destination, start),
            data: json!({ "origin": origin, "destination": destination }),
        })
    }

    fn hotels(args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        let destination = required_place(args, "destination")?;
        let start = optional_date(args, "start_date")?;
        let end = optional_date(args, "end_date")?;
        let place = match optional_str(args, "neighborhood")? {
            Some(area) => format!("{area}, {destination}"),
            None => destination.to_string(),
        };
        Ok(ToolResult {
            tool_name: catalog::HOTELS.to_string(),
            summary: "Lodging search links; rates and availability are not fetched.".to_string(),
            links: links::lodging_links(&place, start, end),
            data: json!({ "destination": place }),
        })
    }

    fn things_to_do(args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        let destination = required_place(args, "destination")?;
        let interests = string_list(args, "interests")?;
        let summary = if interests.is_empty() {
            format!("Discovery links for {destination}.")
        } else {
            format!("Discovery links for {destination} around {}.", interests.join(", "))
        };
        Ok(ToolResult {
            tool_name: catalog::THINGS_TO_DO.to_string(),
            summary,
            links: links::things_to_do_links(destination, &interests),
            data: json!({ "interests": interests }),
        })
    }

    fn weather(args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        let destination = required_place(args, "destination")?;
        let start = optional_date(args, "start_date")?;
        optional_date(args, "end_date")?;
        Ok(ToolResult {
            tool_name: catalog::WEATHER.to_string(),
            summary: format!(
                "Seasonal guidance: check the typical weather in {destination} for your dates and pack layers."
            ),
            links: links::weather_links(destination, start),
            data: Value::Null,
        })
    }

    fn distance(args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        let origin = required_place(args, "origin")?;
        let destination = required_place(args, "destination")?;
        let mode = optional_str(args, "mode")?.unwrap_or("transit");
        if !catalog::TRAVEL_MODES.contains(&mode) {
            return Err(CollaboratorError::invalid_argument(
                "mode",
                format!("unsupported travel mode '{mode}'"),
            ));
        }
        Ok(ToolResult {
            tool_name: catalog::DISTANCE.to_string(),
            summary: "Directions link; exact travel time is not computed.".to_string(),
            links: vec![links::directions_link(origin, destination, mode)],
            data: json!({ "mode": mode }),
        })
    }
}

impl ToolBox for LinkTools {
    #[instrument(skip_all, fields(tool = tool_name))]
    fn call(&self, tool_name: &str, args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        let result = match tool_name {
            catalog::FLIGHTS => Self::flights(args),
            catalog::HOTELS => Self::hotels(args),
            catalog::THINGS_TO_DO => Self::things_to_do(args),
            catalog::WEATHER => Self::weather(args),
            catalog::DISTANCE => Self::distance(args),
            other => Err(CollaboratorError::UnknownTool(other.to_string())),
        }?;
        debug!(links = result.links.len(), "tool call completed");
        Ok(result)
    }
}
