//! On-disk layout of eval results.
//!
//! Each run gets `eval/results/<case_id>/<eval_run_id>/` holding
//! `meta.json`, `events.jsonl`, `checks.json` (unless the run aborted) and
//! `run.json` (when the controller produced a run state).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use voyage::controller::RunOutcome;
use voyage::core::errors::InvariantViolation;
use voyage::core::types::{OverallStatus, TerminationReason};
use voyage::io::events::RunEvent;

use crate::outcome::Outcome;

/// Metadata for an eval run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvalMeta {
    pub case_id: String,
    pub eval_run_id: String,
    /// SHA-256 of the case file, to tell apart runs of an edited case.
    pub case_hash: String,
    pub voyage_run_id: Option<String>,
    pub outcome: Option<Outcome>,
    pub termination: Option<TerminationReason>,
    pub overall_status: Option<OverallStatus>,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    #[serde(default)]
    pub tool_calls: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    /// Why the run aborted, and anything that could not be written.
    pub errors: Vec<String>,
}

impl EvalMeta {
    pub fn new(
        case_id: &str,
        eval_run_id: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id: case_id.to_string(),
            eval_run_id: eval_run_id.to_string(),
            case_hash: String::new(),
            voyage_run_id: None,
            outcome: None,
            termination: None,
            overall_status: None,
            start_time: started_at.to_rfc3339(),
            end_time: finished_at.to_rfc3339(),
            duration_secs: (finished_at - started_at).num_milliseconds() as f64 / 1000.0,
            tool_calls: Vec::new(),
            questions: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn hash_case(&mut self, case_path: &Path) {
        match file_sha256(case_path) {
            Ok(hash) => self.case_hash = hash,
            Err(err) => self.errors.push(format!("case hash: {err:#}")),
        }
    }

    pub fn record_run(&mut self, result: Result<&RunOutcome, &InvariantViolation>) {
        match result {
            Ok(outcome) => {
                self.voyage_run_id = outcome.state().map(|state| state.run_id.clone());
                self.termination = Some(outcome.termination_reason());
                self.overall_status = outcome.evaluation().map(|e| e.overall_status);
                self.questions = outcome.questions().to_vec();
            }
            Err(err) => self.errors.push(format!("run aborted: {err}")),
        }
    }
}

/// One run's results directory.
#[derive(Debug, Clone)]
pub struct ResultsDir {
    path: PathBuf,
}

impl ResultsDir {
    pub fn create(base: &Path, case_id: &str, eval_run_id: &str) -> Result<Self> {
        let path = base.join(case_id).join(eval_run_id);
        fs::create_dir_all(&path)
            .with_context(|| format!("create results dir {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.path.join(name);
        let contents = serde_json::to_string_pretty(value)
            .with_context(|| format!("serialize {name}"))?;
        fs::write(&path, format!("{contents}\n"))
            .with_context(|| format!("write {}", path.display()))
    }

    pub fn write_events(&self, events: &[RunEvent]) -> Result<()> {
        let mut lines = String::new();
        for event in events {
            lines.push_str(&serde_json::to_string(event).context("serialize event")?);
            lines.push('\n');
        }
        let path = self.path.join("events.jsonl");
        fs::write(&path, lines).with_context(|| format!("write {}", path.display()))
    }

    /// Write the run state and event stream. Failures land in `meta.errors`
    /// so `meta.json` is still written afterwards.
    pub fn capture_run(
        &self,
        meta: &mut EvalMeta,
        outcome: Option<&RunOutcome>,
        events: &[RunEvent],
    ) {
        if let Some(state) = outcome.and_then(RunOutcome::state)
            && let Err(err) = self.write_json("run.json", state)
        {
            meta.errors.push(format!("run.json: {err:#}"));
        }
        if let Err(err) = self.write_events(events) {
            meta.errors.push(format!("events.jsonl: {err:#}"));
        }
        if !meta.errors.is_empty() {
            warn!(errors = ?meta.errors, "run capture had errors");
        }
        debug!(dir = %self.path.display(), "run captured");
    }
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&contents)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use voyage::controller::{self, RunInput};
    use voyage::test_support::{Scripted, sample_constraints, test_settings};

    fn read_meta(dir: &ResultsDir) -> EvalMeta {
        let contents = fs::read_to_string(dir.path().join("meta.json")).expect("meta");
        serde_json::from_str(&contents).expect("parse meta")
    }

    #[test]
    fn results_dir_nests_case_and_run() {
        let temp = tempdir().expect("tempdir");
        let dir = ResultsDir::create(temp.path(), "case", "run-1").expect("create");
        assert_eq!(dir.path(), temp.path().join("case").join("run-1"));
        assert!(dir.path().is_dir());
    }

    #[test]
    fn captures_state_events_and_meta() {
        let temp = tempdir().expect("tempdir");
        let case_path = temp.path().join("case.toml");
        fs::write(&case_path, "[case]\nid = 'case'\n").expect("case");

        let scripted = Scripted::default();
        let outcome = controller::run(
            "run-capture",
            RunInput::Constraints(sample_constraints()),
            &test_settings(),
            &scripted.collaborators(),
        )
        .expect("run");
        let events = scripted.events.events();

        let dir = ResultsDir::create(&temp.path().join("results"), "case", "eval-1").expect("dir");
        let mut meta = EvalMeta::new("case", "eval-1", Utc::now(), Utc::now());
        meta.hash_case(&case_path);
        meta.record_run(Ok(&outcome));
        dir.capture_run(&mut meta, Some(&outcome), &events);
        meta.outcome = Some(Outcome::Success);
        dir.write_json("meta.json", &meta).expect("write meta");

        assert!(dir.path().join("run.json").exists());
        let lines = fs::read_to_string(dir.path().join("events.jsonl")).expect("events");
        assert_eq!(lines.lines().count(), events.len());

        let meta = read_meta(&dir);
        assert_eq!(meta.outcome, Some(Outcome::Success));
        assert_eq!(meta.voyage_run_id.as_deref(), Some("run-capture"));
        assert_eq!(meta.termination, Some(TerminationReason::Finalized));
        assert_eq!(meta.case_hash.len(), 64);
        assert!(meta.errors.is_empty());
    }

    /// Verifies an aborted run still gets a meta file naming the failure.
    #[test]
    fn aborted_run_records_error() {
        let temp = tempdir().expect("tempdir");
        let dir = ResultsDir::create(temp.path(), "case", "eval-2").expect("dir");
        let mut meta = EvalMeta::new("case", "eval-2", Utc::now(), Utc::now());
        meta.hash_case(&temp.path().join("missing.toml"));
        let violation = InvariantViolation::InconsistentState("two steps in progress".to_string());
        meta.record_run(Err(&violation));
        dir.capture_run(&mut meta, None, &[]);
        dir.write_json("meta.json", &meta).expect("write meta");

        assert!(!dir.path().join("run.json").exists());
        let meta = read_meta(&dir);
        assert_eq!(meta.errors.len(), 2);
        assert!(meta.errors[1].contains("two steps in progress"));
        assert_eq!(meta.termination, None);
    }
}
