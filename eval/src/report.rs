//! Aggregation over the captured runs of one case.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use voyage::core::types::TerminationReason;

use crate::judge::Judgment;
use crate::outcome::Outcome;
use crate::results::EvalMeta;

/// One captured run. `judgment` is absent when the run aborted.
#[derive(Debug)]
pub struct RunRow {
    pub dir: PathBuf,
    pub meta: EvalMeta,
    pub judgment: Option<Judgment>,
}

/// Every readable run of a case, plus the directories that were skipped.
#[derive(Debug, Default)]
pub struct CaseReport {
    pub rows: Vec<RunRow>,
    pub skipped: Vec<String>,
}

impl CaseReport {
    pub fn runs(&self) -> usize {
        self.rows.len()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.rows
            .iter()
            .filter(|row| row.meta.outcome.unwrap_or(Outcome::Error) == outcome)
            .count()
    }

    pub fn mean_duration_secs(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let total: f64 = self.rows.iter().map(|row| row.meta.duration_secs).sum();
        Some(total / self.rows.len() as f64)
    }

    /// Runs per termination reason; aborted runs are listed as `aborted`.
    pub fn terminations(&self) -> BTreeMap<&'static str, usize> {
        tally(self.rows.iter().map(|row| {
            row.meta
                .termination
                .map_or("aborted", TerminationReason::as_str)
        }))
    }

    /// Runs per overall status; runs that were never evaluated are `unrated`.
    pub fn overall_statuses(&self) -> BTreeMap<&'static str, usize> {
        tally(
            self.rows
                .iter()
                .map(|row| row.meta.overall_status.map_or("unrated", |s| s.as_str())),
        )
    }

    /// `(passed, total)` per check label.
    pub fn check_pass_rates(&self) -> BTreeMap<String, (usize, usize)> {
        let mut rates: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let checks = self
            .rows
            .iter()
            .filter_map(|row| row.judgment.as_ref())
            .flat_map(|judgment| &judgment.checks);
        for check in checks {
            let (passed, total) = rates.entry(check.label()).or_default();
            *passed += usize::from(check.passed());
            *total += 1;
        }
        rates
    }
}

fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<&'a str, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    counts
}

/// Load every run directory under `case_results_dir`, oldest first.
///
/// Runs whose `meta.json` or `checks.json` cannot be read are skipped with a
/// note instead of failing the report.
pub fn load_case_report(case_results_dir: &Path) -> Result<CaseReport> {
    let mut report = CaseReport::default();
    if !case_results_dir.exists() {
        return Ok(report);
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(case_results_dir)
        .with_context(|| format!("read {}", case_results_dir.display()))?
    {
        let path = entry.context("read results entry")?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    for dir in dirs {
        match load_row(&dir) {
            Ok(row) => report.rows.push(row),
            Err(err) => report.skipped.push(format!("{}: {err:#}", dir.display())),
        }
    }
    Ok(report)
}

fn load_row(dir: &Path) -> Result<RunRow> {
    let meta = read_json(&dir.join("meta.json"))?;
    let checks = dir.join("checks.json");
    let judgment = if checks.exists() {
        Some(read_json(&checks)?)
    } else {
        None
    };
    Ok(RunRow {
        dir: dir.to_path_buf(),
        meta,
        judgment,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
