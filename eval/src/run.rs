//! Case execution orchestration.
//!
//! Builds scripted collaborators from the case, runs the controller
//! in-process, then judges and captures the result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, instrument};
use voyage::controller::{self, Collaborators, RunInput, RunSettings};
use voyage::io::config::AgentConfig;
use voyage::io::llm::PromptKind;
use voyage::test_support::{RecordingArtifacts, RecordingSink, ScriptedModel, StaticMemory};

use crate::case::{CaseFile, parse_model_outcome};
use crate::faults::FaultTools;
use crate::judge::judge;
use crate::outcome::{Outcome, classify_outcome};
use crate::results::{EvalMeta, ResultsDir};

/// Result of running a single case.
#[derive(Debug)]
pub struct RunOutcome {
    /// Unique identifier for this eval run.
    pub eval_run_id: String,
    /// Path to the results directory.
    pub results_dir: PathBuf,
    /// Classified outcome.
    pub outcome: Outcome,
}

/// Run settings for `case`: agent defaults with the case overrides applied.
pub fn case_settings(case: &CaseFile) -> RunSettings {
    let mut settings = RunSettings::from_config(&AgentConfig::default());
    settings.user_id = format!("eval-{}", case.case.id);
    if let Some(max_iters) = case.config.max_iters {
        settings.max_iters = max_iters;
    }
    if let Some(threshold) = case.config.eval_threshold {
        settings.eval_threshold = threshold;
    }
    settings
}

fn scripted_model(case: &CaseFile) -> Result<ScriptedModel> {
    let mut model = ScriptedModel::new();
    if let Some(planner) = &case.llm.planner {
        model = model.push(PromptKind::Planner, Ok(planner.clone()));
    }
    for outcome in &case.llm.synthesis {
        model = model.push(PromptKind::Synthesis, parse_model_outcome(outcome)?);
    }
    Ok(model)
}

/// Run a case end-to-end: collaborators, controller run, checks, result capture.
#[instrument(skip_all, fields(case_id = %case.case.id))]
pub fn run_case(results_base: &Path, case_path: &Path, case: &CaseFile) -> Result<RunOutcome> {
    info!("case run started");
    let model = scripted_model(case).context("script model")?;
    let tools = FaultTools::new(&case.faults, case.case.seed).context("build fault tools")?;
    let memory = StaticMemory::default();
    let events = RecordingSink::default();
    let artifacts = RecordingArtifacts::default();
    let collab = Collaborators {
        model: &model,
        tools: &tools,
        memory: &memory,
        events: &events,
        artifacts: &artifacts,
    };
    let settings = case_settings(case);

    let started_at = Utc::now();
    let eval_run_id = format!("eval-{}", started_at.format("%Y%m%d_%H%M%S%3f"));
    let result = controller::run(
        &controller::new_run_id(),
        RunInput::Constraints(case.constraints.clone()),
        &settings,
        &collab,
    );
    let finished_at = Utc::now();

    let dir = ResultsDir::create(results_base, &case.case.id, &eval_run_id)?;
    let mut meta = EvalMeta::new(&case.case.id, &eval_run_id, started_at, finished_at);
    meta.hash_case(case_path);
    meta.tool_calls = tools.calls();
    meta.record_run(result.as_ref());
    dir.capture_run(&mut meta, result.as_ref().ok(), &events.events());

    let judgment = result
        .as_ref()
        .ok()
        .map(|outcome| judge(&case.expect, outcome, settings.max_iters));
    if let Some(judgment) = &judgment {
        dir.write_json("checks.json", judgment).context("write checks")?;
    }
    let outcome = classify_outcome(judgment.as_ref());
    meta.outcome = Some(outcome);
    dir.write_json("meta.json", &meta).context("write meta")?;
    let results_dir = dir.path().to_path_buf();

    info!(outcome = ?outcome, results_dir = %results_dir.display(), "case run complete");
    Ok(RunOutcome {
        eval_run_id,
        results_dir,
        outcome,
    })
}
