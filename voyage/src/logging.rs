//! Diagnostic tracing on stderr.
//!
//! This is for whoever is debugging a run and is filtered by `RUST_LOG`.
//! The product records of a run (`io/events`, `io/run_log`) are written
//! regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the stderr subscriber with the [`DEFAULT_DIRECTIVE`] fallback.
///
/// ```bash
/// RUST_LOG=voyage=debug voyage plan --constraints trip.toml
/// ```
pub fn init() {
    init_with_default(DEFAULT_DIRECTIVE);
}

/// Install the stderr subscriber, falling back to `default_directive`.
///
/// Binaries built on this crate pick their own default (the eval harness
/// reports case progress at `info`).
pub fn init_with_default(default_directive: &str) {
    tracing_subscriber::registry()
        .with(filter_from(std::env::var("RUST_LOG").ok().as_deref(), default_directive))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn filter_from(env: Option<&str>, default_directive: &str) -> EnvFilter {
    env.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(default_directive))
}
