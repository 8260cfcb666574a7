//! Prompt builder for the intent, planner, and synthesis model calls.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! When a rendered prompt exceeds the byte budget, droppable sections go
//! first, then the last section is truncated.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::catalog::TOOL_CATALOG;
use crate::core::constraints::TripConstraints;
use crate::core::evaluator::{DISCLAIMER, REQUIRED_SECTIONS};
use crate::core::plan_builder::MAX_PLAN_STEPS;
use crate::core::state::{Link, RunState, StepOutput};
use crate::core::types::ContextHit;

const INTENT_TEMPLATE: &str = include_str!("prompts/intent.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const SYNTHESIZE_TEMPLATE: &str = include_str!("prompts/synthesize.md");
const CONSTRAINTS_SCHEMA: &str = include_str!("../../schemas/trip_constraints.schema.json");

/// Default prompt budget in bytes.
pub const DEFAULT_PROMPT_BUDGET: usize = 24_000;

#[derive(Debug, Clone, Serialize)]
struct ToolContext {
    name: &'static str,
    required: &'static [&'static str],
    optional: &'static [&'static str],
}

#[derive(Debug, Clone, Serialize)]
struct ResultContext<'a> {
    title: &'a str,
    tool_name: &'a str,
    summary: &'a str,
    links: &'a [Link],
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("intent", INTENT_TEMPLATE)
            .expect("intent template should be valid");
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("synthesize", SYNTHESIZE_TEMPLATE)
            .expect("synthesize template should be valid");
        Self { env }
    }

    fn render_intent(&self, query: &str) -> Result<String> {
        let template = self.env.get_template("intent")?;
        Ok(template.render(context! {
            schema => CONSTRAINTS_SCHEMA.trim(),
            query => query.trim(),
        })?)
    }

    fn render_planner(&self, constraints: &TripConstraints, hits: &[ContextHit]) -> Result<String> {
        let tools: Vec<ToolContext> = TOOL_CATALOG
            .iter()
            .map(|spec| ToolContext {
                name: spec.name,
                required: spec.required,
                optional: spec.optional,
            })
            .collect();
        let template = self.env.get_template("planner")?;
        Ok(template.render(context! {
            max_steps => MAX_PLAN_STEPS,
            tools => tools,
            constraints => serde_json::to_string_pretty(constraints)?,
            context => hits.iter().map(|hit| hit.text.as_str()).collect::<Vec<_>>(),
        })?)
    }

    fn render_synthesis(&self, state: &RunState, absent: &[String]) -> Result<String> {
        let results: Vec<ResultContext<'_>> = state
            .plan
            .steps
            .iter()
            .filter_map(|step| match state.tool_results().get(&step.id) {
                Some(StepOutput::Tool(result)) => Some(ResultContext {
                    title: &step.title,
                    tool_name: &result.tool_name,
                    summary: &result.summary,
                    links: &result.links,
                }),
                _ => None,
            })
            .collect();
        let template = self.env.get_template("synthesize")?;
        Ok(template.render(context! {
            sections => REQUIRED_SECTIONS,
            disclaimer => DISCLAIMER,
            constraints => serde_json::to_string_pretty(&state.constraints)?,
            results => results,
            absent => absent,
            warnings => &state.warnings,
            context => state.context_hits.iter().map(|hit| hit.text.as_str()).collect::<Vec<_>>(),
        })?)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("valid section regex")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                caps.get(1)?.as_str().to_string(),
                caps.get(2)?.as_str() == "required",
            ))
        })
        .collect();

    let mut sections = Vec::new();
    for (idx, (_, start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(idx + 1)
            .map_or(rendered.len(), |(next_start, ..)| *next_start);
        let content = rendered[*start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

fn truncate_at_boundary(text: &mut String, max: usize) {
    let mut cut = max.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

/// Drop droppable sections (context first, then warnings) until the prompt
/// fits, then truncate the last section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in ["context", "warnings"] {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let other_len: usize = sections
        .iter()
        .rev()
        .skip(1)
        .map(|s| s.content.len())
        .sum();
    let allowed = budget.saturating_sub(other_len);
    if let Some(last) = sections.last_mut()
        && last.content.len() > allowed
    {
        let before_len = last.content.len();
        if allowed > 12 {
            truncate_at_boundary(&mut last.content, allowed - 12);
            last.content.push_str("\n[truncated]");
        } else {
            truncate_at_boundary(&mut last.content, allowed);
        }
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_BUDGET)
    }
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    fn fit(&self, rendered: &str) -> String {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        render_sections(&sections)
    }

    pub fn intent(&self, query: &str) -> Result<String> {
        Ok(self.fit(&PromptEngine::new().render_intent(query)?))
    }

    pub fn planner(&self, constraints: &TripConstraints, hits: &[ContextHit]) -> Result<String> {
        Ok(self.fit(&PromptEngine::new().render_planner(constraints, hits)?))
    }

    /// Synthesis prompt; `absent` lists the titles of steps that produced
    /// no output.
    pub fn synthesis(&self, state: &RunState, absent: &[String]) -> Result<String> {
        Ok(self.fit(&PromptEngine::new().render_synthesis(state, absent)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MemoryKind;
    use crate::test_support::{deterministic_state, sample_constraints};

    fn hit(text: &str) -> ContextHit {
        ContextHit {
            id: text.to_string(),
            text: text.to_string(),
            kind: MemoryKind::Note,
            score: 1.0,
        }
    }

    /// Verifies the planner prompt lists every catalog tool and the constraints.
    #[test]
    fn planner_prompt_lists_tools() {
        let prompt = PromptBuilder::default()
            .planner(&sample_constraints(), &[hit("Home origin: SFO")])
            .expect("render");
        for spec in &TOOL_CATALOG {
            assert!(prompt.contains(spec.name), "missing {}", spec.name);
        }
        assert!(prompt.contains("distance_and_time(required: origin, destination; optional: mode)"));
        assert!(prompt.contains("\"Tokyo\""));
        assert!(prompt.contains("Saved memory hits: 1"));
        assert!(!prompt.contains("section:"));
    }

    #[test]
    fn synthesis_prompt_names_absent_steps() {
        let state = deterministic_state();
        let absent = vec!["Get weather summary".to_string()];
        let prompt = PromptBuilder::default()
            .synthesis(&state, &absent)
            .expect("render");
        assert!(prompt.contains("<absent>"));
        assert!(prompt.contains("- Get weather summary"));
        assert!(prompt.contains(DISCLAIMER));
        assert!(prompt.contains("No tool results are available."));
    }

    #[test]
    fn synthesis_prompt_omits_empty_absent_list() {
        let prompt = PromptBuilder::default()
            .synthesis(&deterministic_state(), &[])
            .expect("render");
        assert!(!prompt.contains("<absent>"));
    }

    /// Verifies budget enforcement drops memory context before required sections.
    #[test]
    fn budget_drops_context_first() {
        let hits: Vec<ContextHit> = (0..40).map(|i| hit(&format!("memory note {i} {}", "x".repeat(40)))).collect();
        let full = PromptBuilder::new(100_000)
            .planner(&sample_constraints(), &hits)
            .expect("render");
        assert!(full.contains("<context>"));

        let tight = PromptBuilder::new(full.len() - 200)
            .planner(&sample_constraints(), &hits)
            .expect("render");
        assert!(!tight.contains("<context>"));
        assert!(tight.contains("<contract>"));
        assert!(tight.contains("<tools>"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut text = "héllo".to_string();
        truncate_at_boundary(&mut text, 2);
        assert_eq!(text, "h");
    }
}
