//! Deterministic search-link builders and link validation.
//!
//! Links are the only external references the agent emits; it never quotes
//! live prices or availability.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::core::state::Link;

/// Domains emitted links may point to. Subdomains are allowed.
pub const DEFAULT_ALLOWED_DOMAINS: [&str; 8] = [
    "google.com",
    "skyscanner.com",
    "booking.com",
    "airbnb.com",
    "expedia.com",
    "kayak.com",
    "hotels.com",
    "momondo.com",
];

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)>"\]]+"#).expect("valid url regex"));

fn quote(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

fn link(label: &str, url: String) -> Link {
    Link {
        label: label.to_string(),
        url,
    }
}

fn google_search(label: &str, query: &str) -> Link {
    link(label, format!("https://www.google.com/search?q={}", quote(query)))
}

fn maps_search(label: &str, query: &str) -> Link {
    link(
        label,
        format!(
            "https://www.google.com/maps/search/?api=1&query={}",
            quote(query)
        ),
    )
}

pub fn flight_links(origin: Option<&str>, destination: &str, start_date: Option<&str>) -> Vec<Link> {
    let route = match origin {
        Some(origin) => format!("{origin} to {destination}"),
        None => format!("to {destination}"),
    };
    let when = start_date.map(|d| format!(" on {d}")).unwrap_or_default();
    let query = format!("flights {route}{when}");
    vec![
        link(
            "Google Flights",
            format!(
                "https://www.google.com/travel/flights?q={}",
                quote(&format!("Flights {route}{when}"))
            ),
        ),
        link(
            "Skyscanner",
            format!(
                "https://www.skyscanner.com/transport/flights/?q={}",
                quote(&format!("{route}{when}"))
            ),
        ),
        google_search("Kayak", &format!("site:kayak.com {query}")),
        google_search("Expedia", &format!("site:expedia.com {query}")),
    ]
}

pub fn lodging_links(
    destination: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Vec<Link> {
    let when = match (start_date, end_date) {
        (Some(start), Some(end)) => format!(" {start} to {end}"),
        (Some(start), None) => format!(" from {start}"),
        _ => String::new(),
    };
    vec![
        link(
            "Booking.com",
            format!(
                "https://www.booking.com/searchresults.html?ss={}",
                quote(&format!("Hotels in {destination}{when}"))
            ),
        ),
        link(
            "Airbnb",
            format!("https://www.airbnb.com/s/{}/homes", quote(destination)),
        ),
        google_search(
            "Hotels.com",
            &format!("site:hotels.com hotels in {destination}{when}"),
        ),
        maps_search("Google Maps (hotels)", &format!("Hotels in {destination}")),
    ]
}

pub fn things_to_do_links(destination: &str, interests: &[String]) -> Vec<Link> {
    let mut links = vec![maps_search(
        "Google Maps (things to do)",
        &format!("Things to do in {destination}"),
    )];
    for interest in interests.iter().take(5) {
        links.push(maps_search(
            &format!("Google Maps ({interest})"),
            &format!("{interest} in {destination}"),
        ));
    }
    links
}

pub fn weather_links(destination: &str, start_date: Option<&str>) -> Vec<Link> {
    let query = match start_date {
        Some(date) => format!("{destination} weather {date}"),
        None => format!("{destination} weather"),
    };
    vec![google_search("Weather search", &query)]
}

pub fn directions_link(origin: &str, destination: &str, mode: &str) -> Link {
    link(
        "Google Maps (directions)",
        format!(
            "https://www.google.com/maps/dir/?api=1&origin={}&destination={}&travelmode={}",
            quote(origin),
            quote(destination),
            quote(mode)
        ),
    )
}

/// All http(s) URLs appearing in `text`, in order.
pub fn extract_urls(text: &str) -> Vec<&str> {
    URL_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// True if `host` is one of `allowed` or a subdomain of one.
pub fn host_allowed<S: AsRef<str>>(host: &str, allowed: &[S]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    allowed.iter().any(|domain| {
        let domain = domain.as_ref().to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

/// Describe why `raw` is not an acceptable link, or `None` if it is.
pub fn link_problem<S: AsRef<str>>(raw: &str, allowed: &[S]) -> Option<String> {
    let parsed = match Url::parse(raw) {
        Ok(parsed) => parsed,
        Err(err) => return Some(format!("{raw}: {err}")),
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return Some(format!("{raw}: unsupported scheme '{}'", parsed.scheme()));
    }
    match parsed.host_str() {
        None | Some("") => Some(format!("{raw}: missing host")),
        Some(host) if !host_allowed(host, allowed) => {
            Some(format!("{raw}: domain '{host}' is not allow-listed"))
        }
        Some(_) => None,
    }
}
