//! CLI command implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::case::{CaseFile, discover_cases};
use crate::outcome::Outcome;
use crate::report::load_case_report;
use crate::run::run_case;

fn cases_dir(repo_root: &Path) -> PathBuf {
    repo_root.join("eval").join("cases")
}

fn results_base(repo_root: &Path) -> PathBuf {
    repo_root.join("eval").join("results")
}

/// List all available cases.
pub fn list_cases(repo_root: &Path) -> Result<()> {
    for case in discover_cases(&cases_dir(repo_root))? {
        println!("{}  {}", case.case.id, case.case.description);
    }
    Ok(())
}

/// Run one case, or every case, `runs` times each. Returns true when every
/// run succeeded.
pub fn run_cases(repo_root: &Path, case_id: Option<&str>, runs: u32) -> Result<bool> {
    let selected: Vec<(PathBuf, CaseFile)> = match case_id {
        Some(case_id) => {
            let case_path = cases_dir(repo_root).join(format!("{case_id}.toml"));
            if !case_path.exists() {
                bail!("case {} not found at {}", case_id, case_path.display());
            }
            let case = CaseFile::load(&case_path).context("load case")?;
            vec![(case_path, case)]
        }
        None => discover_cases(&cases_dir(repo_root))?
            .into_iter()
            .map(|case| {
                let path = cases_dir(repo_root).join(format!("{}.toml", case.case.id));
                (path, case)
            })
            .collect(),
    };
    if selected.is_empty() {
        bail!("no cases found in {}", cases_dir(repo_root).display());
    }

    info!(cases = selected.len(), runs, "starting runs");
    let mut all_succeeded = true;
    for (case_path, case) in &selected {
        for run_num in 1..=runs {
            debug!(case_id = %case.case.id, run_num, runs, "starting run");
            let outcome = run_case(&results_base(repo_root), case_path, case)
                .with_context(|| format!("run case {}", case.case.id))?;
            all_succeeded &= outcome.outcome == Outcome::Success;
            println!(
                "run: case={} eval_run_id={} outcome={:?} results={}",
                case.case.id,
                outcome.eval_run_id,
                outcome.outcome,
                outcome.results_dir.display()
            );
        }
    }
    Ok(all_succeeded)
}

/// Show aggregated results for a case.
pub fn report_case(repo_root: &Path, case_id: &str) -> Result<()> {
    let report = load_case_report(&results_base(repo_root).join(case_id))?;
    println!("report: case={case_id} runs={}", report.runs());
    println!(
        "report: success={} fail={} error={}",
        report.count(Outcome::Success),
        report.count(Outcome::Fail),
        report.count(Outcome::Error)
    );
    if let Some(mean) = report.mean_duration_secs() {
        println!("report: mean_duration_secs={mean:.3}");
    }
    for (termination, count) in report.terminations() {
        println!("report: termination {termination} {count}");
    }
    for (status, count) in report.overall_statuses() {
        println!("report: overall_status {status} {count}");
    }
    for (label, (passed, total)) in report.check_pass_rates() {
        println!("report: check {label} {passed}/{total}");
    }
    for row in report.rows.iter().filter(|row| row.meta.outcome != Some(Outcome::Success)) {
        println!("report: not passing {}", row.dir.display());
    }
    for skipped in &report.skipped {
        eprintln!("warning: skipped {skipped}");
    }
    Ok(())
}

/// Remove results for a case.
pub fn clean_case(repo_root: &Path, case_id: &str) -> Result<()> {
    let case_results = results_base(repo_root).join(case_id);
    if case_results.exists() {
        std::fs::remove_dir_all(&case_results)
            .with_context(|| format!("remove {}", case_results.display()))?;
    }
    println!("clean: case={} results={}", case_id, case_results.display());
    Ok(())
}
