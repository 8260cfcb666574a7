//! Memory collaborator: an append-only JSONL store with keyword retrieval.
//!
//! Profile, preference, and trip-summary records are visible to every run of
//! the same user; tool outputs only to the run that wrote them. Concurrent
//! runs append independently (last writer wins on read order).

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::state::{RunState, StepOutput};
use crate::core::types::{ContextHit, MemoryKind};

/// Floor score for stable profile records so intake always sees them.
const PROFILE_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub user_id: String,
    pub run_id: String,
    pub kind: MemoryKind,
    pub text: String,
    pub created_at: String,
}

impl MemoryRecord {
    pub fn new(user_id: &str, run_id: &str, kind: MemoryKind, text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            run_id: run_id.to_string(),
            kind,
            text,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryQuery<'a> {
    pub user_id: &'a str,
    pub run_id: &'a str,
    pub text: &'a str,
    pub k: usize,
}

pub trait MemoryStore {
    /// Ranked hits for `query`. Never fails; problems degrade to fewer hits.
    fn retrieve(&self, query: &MemoryQuery<'_>) -> Vec<ContextHit>;
    fn write(&self, record: &MemoryRecord) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct JsonlMemory {
    path: PathBuf,
}

impl JsonlMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<MemoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        let mut records = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(line = idx + 1, err = %err, "skipping unreadable memory record"),
            }
        }
        Ok(records)
    }
}

fn keywords(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

fn visible(record: &MemoryRecord, query: &MemoryQuery<'_>) -> bool {
    record.user_id == query.user_id
        && (record.kind != MemoryKind::ToolOutput || record.run_id == query.run_id)
}

/// Rank `records` for `query`: keyword overlap, with a floor for profile
/// and preference records, newest first on ties.
pub fn rank(records: &[MemoryRecord], query: &MemoryQuery<'_>) -> Vec<ContextHit> {
    let wanted = keywords(query.text);
    let mut scored: Vec<(f64, &MemoryRecord)> = records
        .iter()
        .filter(|record| visible(record, query))
        .filter_map(|record| {
            let overlap = if wanted.is_empty() {
                0.0
            } else {
                let have = keywords(&record.text);
                wanted.intersection(&have).count() as f64 / wanted.len() as f64
            };
            let score = match record.kind {
                MemoryKind::Profile | MemoryKind::Preference => overlap.max(PROFILE_FLOOR),
                _ => overlap,
            };
            (score > 0.0).then_some((score, record))
        })
        .collect();
    scored.sort_by(|(a, ra), (b, rb)| {
        b.total_cmp(a)
            .then_with(|| rb.created_at.cmp(&ra.created_at))
            .then_with(|| ra.id.cmp(&rb.id))
    });
    let mut seen = BTreeSet::new();
    scored
        .into_iter()
        .filter(|(_, record)| seen.insert(record.text.clone()))
        .take(query.k)
        .map(|(score, record)| ContextHit {
            id: record.id.clone(),
            text: record.text.clone(),
            kind: record.kind,
            score,
        })
        .collect()
}

impl MemoryStore for JsonlMemory {
    fn retrieve(&self, query: &MemoryQuery<'_>) -> Vec<ContextHit> {
        match self.load() {
            Ok(records) => {
                let hits = rank(&records, query);
                debug!(hits = hits.len(), "memory retrieval");
                hits
            }
            Err(err) => {
                warn!(err = %err, "memory retrieval degraded to empty");
                Vec::new()
            }
        }
    }

    fn write(&self, record: &MemoryRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(record).context("serialize memory record")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", self.path.display()))
    }
}

/// Memories a finished run leaves behind: stable profile fields, a trip
/// summary, and the run's tool outputs.
pub fn run_memories(state: &RunState) -> Vec<(MemoryKind, String)> {
    let constraints = &state.constraints;
    let mut out = Vec::new();
    if !constraints.interests.is_empty() {
        out.push((
            MemoryKind::Preference,
            format!("User interests: {}", constraints.interests.join(", ")),
        ));
    }
    if let Some(origin) = constraints.origin.as_deref() {
        out.push((MemoryKind::Profile, format!("Home origin: {origin}")));
    }
    let summary = json!({
        "query": state.query,
        "constraints": constraints,
        "termination_reason": state.termination_reason(),
        "overall_status": state.evaluation().map(|e| e.overall_status),
    });
    out.push((MemoryKind::TripSummary, format!("Trip summary: {summary}")));
    for step in &state.plan.steps {
        if let Some(StepOutput::Tool(result)) = state.tool_results().get(&step.id) {
            out.push((
                MemoryKind::ToolOutput,
                format!("Tool output: {} {}", result.tool_name, result.summary),
            ));
        }
    }
    out
}
