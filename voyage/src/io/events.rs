//! Structured run events appended to `runtime/logs/events.jsonl`.
//!
//! Events are product output, separate from `tracing` diagnostics. Sinks
//! never fail the run: write errors are logged and dropped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::core::state::RunCounters;
use crate::core::types::{OverallStatus, TerminationReason, TriageRecord};

/// Graph node an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Intake,
    Planner,
    Orchestrator,
    Executor,
    Triage,
    Responder,
    Calendar,
    Evaluator,
    MemoryWriter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    NodeEnter {
        node: Node,
        iteration: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
    },
    NodeExit {
        node: Node,
        iteration: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        step_id: Option<String>,
        outcome: String,
    },
    Triage {
        step_id: String,
        record: TriageRecord,
    },
    PlannerFallback {
        errors: Vec<String>,
    },
    Summary {
        termination_reason: TerminationReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        overall_status: Option<OverallStatus>,
        iterations: u32,
        counters: RunCounters,
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    pub run_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl RunEvent {
    pub fn new(run_id: &str, kind: EventKind) -> Self {
        Self {
            run_id: run_id.to_string(),
            kind,
        }
    }
}

pub trait EventSink {
    fn emit(&self, event: &RunEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RunEvent) {}
}

/// Appends one JSON object per line, stamped with the write time.
#[derive(Debug, Clone)]
pub struct JsonlEventSink {
    path: PathBuf,
}

#[derive(Serialize)]
struct Stamped<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a RunEvent,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, event: &RunEvent) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(&Stamped {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        })?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl EventSink for JsonlEventSink {
    fn emit(&self, event: &RunEvent) {
        if let Err(err) = self.append(event) {
            warn!(path = %self.path.display(), err = %err, "dropping run event");
        }
    }
}
