//! Agent configuration stored as TOML (default `voyage.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::links::DEFAULT_ALLOWED_DOMAINS;

pub const DEFAULT_CONFIG_FILE: &str = "voyage.toml";

/// Agent configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on orchestration iterations. The effective bound is also
    /// capped by the plan length.
    pub max_iters: u32,

    /// Rubric mean below which a run is rated `needs_work`.
    pub eval_threshold: f64,

    /// Hits requested per memory retrieval.
    pub retrieval_k: usize,

    /// Root for event logs, run logs, and calendar artifacts.
    pub runtime_dir: PathBuf,

    /// Append-only JSONL memory store. Relative paths resolve against
    /// `runtime_dir`.
    pub memory_path: PathBuf,

    pub user_id: String,

    /// Domains emitted links may point to (subdomains allowed).
    pub allowed_domains: Vec<String>,

    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LlmConfig {
    /// Command that reads a prompt on stdin and prints the completion on
    /// stdout (e.g. `["ollama","run","llama3.1"]`). Empty disables the model:
    /// intent parsing and planning fall back to their deterministic paths,
    /// but synthesis has none, so the run stops and asks for input.
    pub command: Vec<String>,

    /// Wall-clock deadline per model call.
    pub timeout_secs: u64,

    /// Truncate model stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            output_limit_bytes: 200_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eval_threshold: 3.5,
            retrieval_k: 5,
            runtime_dir: PathBuf::from("runtime"),
            memory_path: PathBuf::from("memory/memory.jsonl"),
            user_id: "local".to_string(),
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|domain| domain.to_string())
                .collect(),
            llm: LlmConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iters == 0 {
            return Err(anyhow!("max_iters must be > 0"));
        }
        if !(0.0..=5.0).contains(&self.eval_threshold) {
            return Err(anyhow!("eval_threshold must be within 0..=5"));
        }
        if self.retrieval_k == 0 {
            return Err(anyhow!("retrieval_k must be > 0"));
        }
        if self.user_id.trim().is_empty() {
            return Err(anyhow!("user_id must be non-empty"));
        }
        if self.allowed_domains.iter().any(|d| d.trim().is_empty()) {
            return Err(anyhow!("allowed_domains must not contain empty entries"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if self.llm.output_limit_bytes == 0 {
            return Err(anyhow!("llm.output_limit_bytes must be > 0"));
        }
        if self.llm.command.first().is_some_and(|cmd| cmd.trim().is_empty()) {
            return Err(anyhow!("llm.command must start with a program name"));
        }
        Ok(())
    }

    pub fn memory_file(&self) -> PathBuf {
        if self.memory_path.is_absolute() {
            self.memory_path.clone()
        } else {
            self.runtime_dir.join(&self.memory_path)
        }
    }

    pub fn events_file(&self) -> PathBuf {
        self.runtime_dir.join("logs").join("events.jsonl")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.runtime_dir.join("runs")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.runtime_dir.join("artifacts")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` to `path` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
