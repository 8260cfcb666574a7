//! Per-run product logs under `runtime/runs/<run_id>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::state::RunState;

#[derive(Debug, Clone)]
pub struct RunLogPaths {
    pub dir: PathBuf,
    pub state_path: PathBuf,
    pub answer_path: PathBuf,
    pub evaluation_path: PathBuf,
}

impl RunLogPaths {
    pub fn new(runs_dir: &Path, run_id: &str) -> Self {
        let dir = runs_dir.join(run_id);
        Self {
            state_path: dir.join("state.json"),
            answer_path: dir.join("answer.md"),
            evaluation_path: dir.join("evaluation.json"),
            dir,
        }
    }
}

/// Write the run's final state, answer, and evaluation. Files for absent
/// pieces are not created.
pub fn write_run_log(runs_dir: &Path, state: &RunState) -> Result<RunLogPaths> {
    let paths = RunLogPaths::new(runs_dir, &state.run_id);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;

    write_json(&paths.state_path, state)?;
    if let Some(answer) = state.final_answer() {
        write_text(&paths.answer_path, answer)?;
    }
    if let Some(evaluation) = state.evaluation() {
        write_json(&paths.evaluation_path, evaluation)?;
    }
    debug!(dir = %paths.dir.display(), "run log written");
    Ok(paths)
}

/// Load a run state previously written by [`write_run_log`].
pub fn load_run_state(path: &Path) -> Result<RunState> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run state {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse run state {}", path.display()))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}
