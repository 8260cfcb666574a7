//! Itinerary calendar (`.ics`) rendering and parsing.
//!
//! One all-day event per trip day, start to end inclusive.

use std::sync::LazyLock;

use chrono::{DateTime, Days, NaiveDate, Utc};
use regex::Regex;

const PRODID: &str = "-//voyage//itinerary//EN";
const MAX_DAY_TITLES: usize = 21;

static DAY_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^#+[ \t]*Day[ \t]*(\d+)[ \t]*[:\-]?[ \t]*(.*)$").expect("valid day heading regex")
});

/// A single all-day calendar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub date: NaiveDate,
    pub summary: String,
}

/// Build one event per day in `[start, end]`.
///
/// Day titles are used in order; missing titles repeat the last one, or fall
/// back to "Trip day N" when none are given.
pub fn itinerary_events(
    trip_name: &str,
    start: NaiveDate,
    end: NaiveDate,
    day_titles: &[String],
) -> Vec<CalendarEvent> {
    let (start, end) = if end < start { (end, start) } else { (start, end) };
    let mut events = Vec::new();
    let mut date = start;
    let mut idx = 0usize;
    while date <= end {
        let title = day_titles
            .get(idx)
            .or_else(|| day_titles.last())
            .cloned()
            .unwrap_or_else(|| format!("Trip day {}", idx + 1));
        events.push(CalendarEvent {
            date,
            summary: format!("{trip_name}: {title}"),
        });
        idx += 1;
        match date.checked_add_days(Days::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }
    events
}

/// Render events as an iCalendar document (CRLF line endings).
pub fn render_ics(events: &[CalendarEvent], uid_prefix: &str, stamp: DateTime<Utc>) -> String {
    let stamp = stamp.format("%Y%m%dT%H%M%SZ").to_string();
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
        "CALSCALE:GREGORIAN".to_string(),
    ];
    for (idx, event) in events.iter().enumerate() {
        let next_day = event
            .date
            .checked_add_days(Days::new(1))
            .unwrap_or(event.date);
        lines.push("BEGIN:VEVENT".to_string());
        lines.push(format!("UID:{uid_prefix}-{}@voyage", idx + 1));
        lines.push(format!("DTSTAMP:{stamp}"));
        lines.push(format!("DTSTART;VALUE=DATE:{}", event.date.format("%Y%m%d")));
        lines.push(format!("DTEND;VALUE=DATE:{}", next_day.format("%Y%m%d")));
        lines.push(format!("SUMMARY:{}", escape_text(&event.summary)));
        lines.push("END:VEVENT".to_string());
    }
    lines.push("END:VCALENDAR".to_string());
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

/// Start dates of every `VEVENT` in `ics`. Events without a parseable
/// `DTSTART` are reported as `None`.
pub fn event_start_dates(ics: &str) -> Vec<Option<NaiveDate>> {
    let mut dates = Vec::new();
    let mut in_event = false;
    let mut current: Option<NaiveDate> = None;
    for line in ics.lines().map(str::trim_end) {
        match line {
            "BEGIN:VEVENT" => {
                in_event = true;
                current = None;
            }
            "END:VEVENT" if in_event => {
                dates.push(current);
                in_event = false;
            }
            _ if in_event && line.starts_with("DTSTART") => {
                current = line
                    .rsplit_once(':')
                    .and_then(|(_, value)| {
                        NaiveDate::parse_from_str(value.get(..8).unwrap_or(value), "%Y%m%d").ok()
                    });
            }
            _ => {}
        }
    }
    dates
}

/// Day titles from `# Day N: title` headings in a drafted answer.
pub fn extract_day_titles(answer: &str) -> Vec<String> {
    DAY_HEADING_RE
        .captures_iter(answer)
        .map(|caps| {
            let title = caps.get(2).map_or("", |m| m.as_str().trim());
            if title.is_empty() {
                format!("Day {}", &caps[1])
            } else {
                title.to_string()
            }
        })
        .take(MAX_DAY_TITLES)
        .collect()
}

/// File name for a trip's calendar artifact.
pub fn artifact_file_name(destination: &str, start: NaiveDate) -> String {
    format!("{}-{}-itinerary.ics", slug(destination), start)
}

fn slug(text: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for ch in text.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out.truncate(60);
    if out.is_empty() {
        "trip".to_string()
    } else {
        out
    }
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
