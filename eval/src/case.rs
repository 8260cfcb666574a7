//! Case file parsing and validation.
//!
//! Cases are TOML files describing a trip request, the collaborator faults
//! to inject, and the expected run outcome. See `eval/cases/` for examples.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use voyage::core::catalog;
use voyage::core::constraints::TripConstraints;
use voyage::core::errors::CollaboratorError;
use voyage::core::types::{OverallStatus, TerminationReason};

/// A parsed case file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CaseFile {
    pub case: CaseMeta,
    pub constraints: TripConstraints,
    #[serde(default)]
    pub config: CaseConfig,
    #[serde(default)]
    pub llm: LlmScript,
    #[serde(default)]
    pub faults: Vec<Fault>,
    pub expect: Expectations,
}

/// Case metadata.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    pub description: String,
    /// Seed for probabilistic faults.
    #[serde(default)]
    pub seed: u64,
}

/// Overrides applied on top of the default run settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CaseConfig {
    pub max_iters: Option<u32>,
    pub eval_threshold: Option<f64>,
}

/// Scripted model replies.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LlmScript {
    /// Raw planner output. Absent means every planner call fails.
    pub planner: Option<String>,
    /// Synthesis outcomes in call order: `timeout`, `connection`, `parse`, or
    /// `text:<body>`. Calls past the end get a well-formed draft.
    #[serde(default)]
    pub synthesis: Vec<String>,
}

/// Injected failures for one tool.
///
/// `errors` fail the first calls in order. After they run out, each call
/// fails with the last of them with `probability`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Fault {
    pub tool: String,
    pub errors: Vec<String>,
    #[serde(default)]
    pub probability: f64,
}

/// What the run must look like when it stops.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Expectations {
    pub termination: TerminationReason,
    pub overall_status: Option<OverallStatus>,
    /// Number of steps left `blocked` or `invalid`.
    pub blocked_steps: Option<usize>,
    /// Upper bound on any step's retry count.
    pub max_attempts: Option<u32>,
}

impl CaseFile {
    /// Load and validate a case file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("case {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let case: CaseFile = toml::from_str(contents).context("parse case")?;
        case.validate()?;
        Ok(case)
    }

    fn validate(&self) -> Result<()> {
        validate_case_id(&self.case.id)?;
        if self.case.description.trim().is_empty() {
            bail!("case.description must be non-empty");
        }
        if self.config.max_iters == Some(0) {
            bail!("config.max_iters must be > 0");
        }
        if let Some(threshold) = self.config.eval_threshold
            && !(0.0..=5.0).contains(&threshold)
        {
            bail!("config.eval_threshold must be within 0..=5");
        }
        for (index, outcome) in self.llm.synthesis.iter().enumerate() {
            parse_model_outcome(outcome).with_context(|| format!("llm.synthesis[{index}]"))?;
        }
        for (index, fault) in self.faults.iter().enumerate() {
            fault
                .validate()
                .with_context(|| format!("faults[{index}] invalid"))?;
        }
        if self.expect.termination == TerminationReason::None {
            bail!("expect.termination must name a terminal reason");
        }
        Ok(())
    }
}

impl Fault {
    fn validate(&self) -> Result<()> {
        if catalog::lookup(&self.tool).is_none() {
            bail!("unknown tool '{}'", self.tool);
        }
        if self.errors.is_empty() {
            bail!("errors must be a non-empty array");
        }
        for error in &self.errors {
            parse_fault(error)?;
        }
        if !(0.0..=1.0).contains(&self.probability) {
            bail!("probability must be within 0..=1");
        }
        Ok(())
    }
}

/// Parse a fault name into the error the tool reports.
///
/// Accepted: `timeout`, `connection`, `parse`, `resource`, `unknown`,
/// `missing_tool`, `not_found:<argument>`, `invalid:<argument>`.
pub fn parse_fault(name: &str) -> Result<CollaboratorError> {
    let injected = || format!("injected {name}");
    let err = match name.split_once(':') {
        Some(("not_found", argument)) => CollaboratorError::not_found(argument, injected()),
        Some(("invalid", argument)) => CollaboratorError::invalid_argument(argument, injected()),
        Some(_) => return Err(anyhow!("unknown fault '{name}'")),
        None => match name {
            "timeout" => CollaboratorError::Timeout(injected()),
            "connection" => CollaboratorError::ConnectionFailure(injected()),
            "parse" => CollaboratorError::Parse(injected()),
            "resource" => CollaboratorError::Resource(injected()),
            "unknown" => CollaboratorError::Unknown(injected()),
            "missing_tool" => CollaboratorError::UnknownTool(injected()),
            _ => return Err(anyhow!("unknown fault '{name}'")),
        },
    };
    Ok(err)
}

/// Parse a scripted model outcome: `text:<body>` or a transport fault.
pub fn parse_model_outcome(outcome: &str) -> Result<Result<String, CollaboratorError>> {
    if let Some(body) = outcome.strip_prefix("text:") {
        return Ok(Ok(body.to_string()));
    }
    match outcome {
        "timeout" | "connection" | "parse" => parse_fault(outcome).map(Err),
        _ => Err(anyhow!(
            "model outcome must be timeout, connection, parse, or text:<body>, got '{outcome}'"
        )),
    }
}

/// Discover and load all case files from a directory.
///
/// Returns cases sorted by id. Each file must be named `<id>.toml`.
pub fn discover_cases(dir: &Path) -> Result<Vec<CaseFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read cases dir {}", dir.display()))? {
        let entry = entry.context("read case entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        let case = CaseFile::load(&path)?;
        if path.file_stem().and_then(|stem| stem.to_str()) != Some(case.case.id.as_str()) {
            bail!("case file {} must be named {}.toml", path.display(), case.case.id);
        }
        cases.push(case);
    }
    cases.sort_by(|left, right| left.case.id.cmp(&right.case.id));
    Ok(cases)
}

fn validate_case_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("case.id must be non-empty");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("case.id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[case]
id = "weather-flaky"
description = "weather times out half the time"
seed = 11

[constraints]
destinations = ["Tokyo"]
start_date = "2026-04-01"
end_date = "2026-04-03"
"#;

    #[test]
    fn parses_valid_case() {
        let input = format!(
            "{BASE}
[config]
max_iters = 12

[llm]
synthesis = [\"timeout\", \"text:## Summary\"]

[[faults]]
tool = \"weather_summary\"
errors = [\"timeout\", \"not_found:destination\"]
probability = 0.5

[expect]
termination = \"finalized\"
overall_status = \"needs_work\"
max_attempts = 1
"
        );
        let case = CaseFile::parse_str(&input).expect("case parses");
        assert_eq!(case.case.id, "weather-flaky");
        assert_eq!(case.case.seed, 11);
        assert_eq!(case.constraints.destinations, vec!["Tokyo".to_string()]);
        assert_eq!(case.faults[0].probability, 0.5);
        assert_eq!(case.expect.termination, TerminationReason::Finalized);
        assert_eq!(case.expect.overall_status, Some(OverallStatus::NeedsWork));
        assert!(case.llm.planner.is_none());
    }

    #[test]
    fn rejects_unknown_tool_and_fault() {
        let unknown_tool = format!(
            "{BASE}
[[faults]]
tool = \"book_hotel\"
errors = [\"timeout\"]

[expect]
termination = \"finalized\"
"
        );
        let err = CaseFile::parse_str(&unknown_tool).expect_err("unknown tool");
        assert!(format!("{err:#}").contains("unknown tool 'book_hotel'"));

        let unknown_fault = format!(
            "{BASE}
[[faults]]
tool = \"weather_summary\"
errors = [\"meltdown\"]

[expect]
termination = \"finalized\"
"
        );
        let err = CaseFile::parse_str(&unknown_fault).expect_err("unknown fault");
        assert!(format!("{err:#}").contains("unknown fault 'meltdown'"));
    }

    #[test]
    fn rejects_invalid_id() {
        let input = BASE.replace("weather-flaky", "Bad/Id")
            + "\n[expect]\ntermination = \"finalized\"\n";
        let err = CaseFile::parse_str(&input).expect_err("invalid id");
        assert!(err.to_string().contains("case.id"));
    }

    #[test]
    fn fault_names_map_to_error_taxonomy() {
        assert!(matches!(
            parse_fault("timeout").expect("timeout"),
            CollaboratorError::Timeout(_)
        ));
        let err = parse_fault("not_found:destination").expect("not found");
        assert_eq!(err.argument(), Some("destination"));
        assert!(matches!(
            parse_fault("missing_tool").expect("missing tool"),
            CollaboratorError::UnknownTool(_)
        ));
        assert_eq!(
            parse_model_outcome("text:hello").expect("text"),
            Ok("hello".to_string())
        );
        assert!(parse_model_outcome("resource").is_err());
    }
}
