//! The bounded run loop: intake, planning, orchestrate/execute/triage, and
//! the finalize path (responder, calendar, evaluator, memory writer).
//!
//! The controller is the only writer of [`RunState`]. Collaborators are
//! passed in as trait objects so runs can be scripted in tests and in the
//! evaluation harness.

use std::cell::Cell;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::budget::max_iters;
use crate::core::calendar::{artifact_file_name, extract_day_titles, itinerary_events, render_ics};
use crate::core::classifier::classify;
use crate::core::constraints::TripConstraints;
use crate::core::errors::InvariantViolation;
use crate::core::evaluator::{EvalSettings, Evaluation, evaluate};
use crate::core::intake::normalize;
use crate::core::invariants::validate_run_state;
use crate::core::responder::assemble_answer;
use crate::core::selector::select_next;
use crate::core::state::{CalendarArtifact, RunCounters, RunState};
use crate::core::state_update::{apply_next_action, apply_triage};
use crate::core::triage::{clarifying_question, triage};
use crate::core::types::{Decision, NextAction, TerminationReason};
use crate::executor::{StepResult, execute_step, merge_hits};
use crate::intent::parse_intent;
use crate::io::calendar::ArtifactWriter;
use crate::io::config::AgentConfig;
use crate::io::events::{EventKind, EventSink, Node, RunEvent};
use crate::io::llm::LanguageModel;
use crate::io::memory::{MemoryQuery, MemoryRecord, MemoryStore, run_memories};
use crate::io::prompt::{DEFAULT_PROMPT_BUDGET, PromptBuilder};
use crate::io::tools::ToolBox;
use crate::planner::{NeedsClarification, build_plan};

/// External collaborators of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub model: &'a dyn LanguageModel,
    pub tools: &'a dyn ToolBox,
    pub memory: &'a dyn MemoryStore,
    pub events: &'a dyn EventSink,
    pub artifacts: &'a dyn ArtifactWriter,
}

/// Per-run limits and thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub user_id: String,
    pub max_iters: u32,
    pub eval_threshold: f64,
    pub retrieval_k: usize,
    pub allowed_domains: Vec<String>,
    pub prompt_budget: usize,
}

impl RunSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            max_iters: config.max_iters,
            eval_threshold: config.eval_threshold,
            retrieval_k: config.retrieval_k,
            allowed_domains: config.allowed_domains.clone(),
            prompt_budget: DEFAULT_PROMPT_BUDGET,
        }
    }
}

/// What the user handed in.
#[derive(Debug, Clone, PartialEq)]
pub enum RunInput {
    Constraints(TripConstraints),
    Query(String),
}

/// Intake stopped the run before a plan existed.
#[derive(Debug, Clone, PartialEq)]
pub struct Clarification {
    pub run_id: String,
    pub constraints: TripConstraints,
    pub questions: Vec<String>,
    pub warnings: Vec<String>,
    pub counters: RunCounters,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    NeedsClarification(Clarification),
    /// The loop ran; the state carries the termination reason.
    Ran(Box<RunState>),
}

impl RunOutcome {
    pub fn termination_reason(&self) -> TerminationReason {
        match self {
            RunOutcome::NeedsClarification(_) => TerminationReason::UserInputRequired,
            RunOutcome::Ran(state) => state.termination_reason(),
        }
    }

    pub fn questions(&self) -> &[String] {
        match self {
            RunOutcome::NeedsClarification(clarification) => &clarification.questions,
            RunOutcome::Ran(state) => &state.clarifying_questions,
        }
    }

    pub fn state(&self) -> Option<&RunState> {
        match self {
            RunOutcome::NeedsClarification(_) => None,
            RunOutcome::Ran(state) => Some(state),
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.state().and_then(RunState::evaluation)
    }
}

/// Timestamped run id, e.g. `20260401T120000Z-1a2b3c4d`.
pub fn new_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}

/// Event emitter bound to one run; counts node transitions.
struct Events<'a> {
    sink: &'a dyn EventSink,
    run_id: &'a str,
    transitions: Cell<u32>,
}

impl<'a> Events<'a> {
    fn new(sink: &'a dyn EventSink, run_id: &'a str) -> Self {
        Self {
            sink,
            run_id,
            transitions: Cell::new(0),
        }
    }

    fn emit(&self, kind: EventKind) {
        self.sink.emit(&RunEvent::new(self.run_id, kind));
    }

    fn enter(&self, node: Node, iteration: u32, step_id: Option<&str>) {
        self.transitions.set(self.transitions.get() + 1);
        self.emit(EventKind::NodeEnter {
            node,
            iteration,
            step_id: step_id.map(str::to_string),
        });
    }

    fn exit(&self, node: Node, iteration: u32, step_id: Option<&str>, outcome: impl Into<String>) {
        self.emit(EventKind::NodeExit {
            node,
            iteration,
            step_id: step_id.map(str::to_string),
            outcome: outcome.into(),
        });
    }

    fn summary(&self, state: Option<&RunState>, counters: RunCounters, started: Instant) {
        self.emit(EventKind::Summary {
            termination_reason: state.map_or(TerminationReason::UserInputRequired, RunState::termination_reason),
            overall_status: state.and_then(RunState::evaluation).map(|e| e.overall_status),
            iterations: state.map_or(0, |s| s.iteration_count),
            counters,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        });
    }
}

fn action_label(action: &NextAction) -> &'static str {
    match action {
        NextAction::RunStep(_) => "run_step",
        NextAction::Finalize => "finalize",
        NextAction::Abort => "abort",
    }
}

fn decision_label(decision: Decision) -> &'static str {
    match decision {
        Decision::AskUser => "ask_user",
        Decision::Skip => "skip",
        Decision::Retry => "retry",
    }
}

fn intake_query_text(constraints: &TripConstraints, query: Option<&str>) -> String {
    if let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) {
        return query.to_string();
    }
    let parts: Vec<&str> = constraints
        .destinations
        .iter()
        .chain(&constraints.interests)
        .map(String::as_str)
        .collect();
    if parts.is_empty() {
        "travel preferences".to_string()
    } else {
        parts.join(" ")
    }
}

/// Run one request to termination.
///
/// Collaborator failures never escape: they are classified and triaged.
/// An [`InvariantViolation`] is a bug in the orchestration and aborts the run.
#[instrument(skip_all, fields(run_id = run_id))]
pub fn run(
    run_id: &str,
    input: RunInput,
    settings: &RunSettings,
    collab: &Collaborators<'_>,
) -> Result<RunOutcome, InvariantViolation> {
    let started = Instant::now();
    let prompts = PromptBuilder::new(settings.prompt_budget);
    let events = Events::new(collab.events, run_id);
    let mut counters = RunCounters::default();

    events.enter(Node::Intake, 0, None);
    let (raw, query) = match input {
        RunInput::Constraints(constraints) => (constraints, None),
        RunInput::Query(query) => {
            let parsed = parse_intent(&query, collab.model, &prompts, &mut counters);
            (parsed.constraints, Some(query))
        }
    };
    counters.retrievals += 1;
    let hits = collab.memory.retrieve(&MemoryQuery {
        user_id: &settings.user_id,
        run_id,
        text: &intake_query_text(&raw, query.as_deref()),
        k: settings.retrieval_k,
    });
    let report = normalize(raw, &hits);
    if report.needs_clarification() {
        events.exit(Node::Intake, 0, None, "needs_clarification");
        counters.node_transitions = events.transitions.get();
        events.summary(None, counters, started);
        info!(questions = report.questions.len(), "intake needs clarification");
        return Ok(RunOutcome::NeedsClarification(Clarification {
            run_id: run_id.to_string(),
            constraints: report.constraints,
            questions: report.questions,
            warnings: report.warnings,
            counters,
        }));
    }
    events.exit(Node::Intake, 0, None, "ok");

    events.enter(Node::Planner, 0, None);
    let planned = match build_plan(&report.constraints, &hits, collab.model, &prompts, &mut counters) {
        Ok(planned) => planned,
        Err(NeedsClarification { questions }) => {
            events.exit(Node::Planner, 0, None, "needs_clarification");
            counters.node_transitions = events.transitions.get();
            events.summary(None, counters, started);
            return Ok(RunOutcome::NeedsClarification(Clarification {
                run_id: run_id.to_string(),
                constraints: report.constraints,
                questions,
                warnings: report.warnings,
                counters,
            }));
        }
    };
    if let Some(errors) = &planned.rejected {
        events.emit(EventKind::PlannerFallback {
            errors: errors.clone(),
        });
    }
    let source = if planned.rejected.is_some() { "deterministic" } else { "llm" };
    events.exit(Node::Planner, 0, None, source);

    let mut state = RunState::new(run_id, &settings.user_id, report.constraints, planned.plan);
    state.query = query;
    state.warnings = report.warnings;
    merge_hits(&mut state.context_hits, hits);
    state.counters = counters;

    let bound = max_iters(state.plan.len(), settings.max_iters);
    run_loop(&mut state, bound, settings, collab, &prompts, &events)?;
    if matches!(
        state.termination_reason(),
        TerminationReason::Finalized | TerminationReason::MaxIters
    ) {
        finalize(&mut state, settings, collab, &events)?;
    }

    state.counters.node_transitions = events.transitions.get();
    let problems = validate_run_state(&state);
    if !problems.is_empty() {
        return Err(InvariantViolation::InconsistentState(problems.join("; ")));
    }
    events.summary(Some(&state), state.counters, started);
    info!(
        termination = %state.termination_reason(),
        iterations = state.iteration_count,
        "run finished"
    );
    Ok(RunOutcome::Ran(Box::new(state)))
}

fn run_loop(
    state: &mut RunState,
    bound: u32,
    settings: &RunSettings,
    collab: &Collaborators<'_>,
    prompts: &PromptBuilder,
    events: &Events<'_>,
) -> Result<(), InvariantViolation> {
    loop {
        let iteration = state.iteration_count;
        events.enter(Node::Orchestrator, iteration, None);
        let action = select_next(&state.plan, iteration, bound)?;
        apply_next_action(state, &action)?;
        let step_id = match action {
            NextAction::RunStep(step_id) => step_id,
            other => {
                events.exit(Node::Orchestrator, iteration, None, action_label(&other));
                if other == NextAction::Abort {
                    warn!(bound, "iteration bound reached with work left");
                }
                return Ok(());
            }
        };
        events.exit(Node::Orchestrator, iteration, Some(&step_id), "run_step");

        state.iteration_count += 1;
        let iteration = state.iteration_count;
        events.enter(Node::Executor, iteration, Some(&step_id));
        let (status, error) = match execute_step(state, &step_id, collab, prompts, settings.retrieval_k)? {
            StepResult::Completed => {
                events.exit(Node::Executor, iteration, Some(&step_id), "completed");
                continue;
            }
            StepResult::Failed { status, error } => (status, error),
        };
        events.exit(Node::Executor, iteration, Some(&step_id), status.as_str());

        events.enter(Node::Triage, iteration, Some(&step_id));
        let step = state
            .plan
            .step(&step_id)
            .cloned()
            .ok_or_else(|| InvariantViolation::UnknownStep(step_id.clone()))?;
        let record = triage(&classify(&error, &step), &step);
        events.emit(EventKind::Triage {
            step_id: step_id.clone(),
            record: record.clone(),
        });
        let decision = apply_triage(state, &step_id, record)?;
        events.exit(Node::Triage, iteration, Some(&step_id), decision_label(decision));
        if decision == Decision::AskUser {
            state.clarifying_questions.push(clarifying_question(&step, &error));
            return Ok(());
        }
    }
}

/// Responder, calendar export, evaluation, memory write, in that order.
fn finalize(
    state: &mut RunState,
    settings: &RunSettings,
    collab: &Collaborators<'_>,
    events: &Events<'_>,
) -> Result<(), InvariantViolation> {
    let iteration = state.iteration_count;

    events.enter(Node::Responder, iteration, None);
    let answer = assemble_answer(state);
    state.set_final_answer(answer)?;
    events.exit(Node::Responder, iteration, None, "answer_ready");

    events.enter(Node::Calendar, iteration, None);
    let outcome = export_calendar(state, collab.artifacts)?;
    events.exit(Node::Calendar, iteration, None, outcome);

    events.enter(Node::Evaluator, iteration, None);
    let evaluation = evaluate(
        state,
        &EvalSettings {
            threshold: settings.eval_threshold,
            allowed_domains: &settings.allowed_domains,
        },
    );
    let status = evaluation.overall_status;
    state.record_evaluation(evaluation)?;
    events.exit(Node::Evaluator, iteration, None, status.as_str());

    events.enter(Node::MemoryWriter, iteration, None);
    let written = write_memories(state, collab.memory);
    events.exit(Node::MemoryWriter, iteration, None, format!("{written} written"));
    Ok(())
}

fn export_calendar(
    state: &mut RunState,
    artifacts: &dyn ArtifactWriter,
) -> Result<&'static str, InvariantViolation> {
    let Some((start, end)) = state.constraints.date_range() else {
        return Ok("skipped");
    };
    let destination = state
        .constraints
        .primary_destination()
        .unwrap_or("Trip")
        .to_string();
    let titles = extract_day_titles(
        state
            .synthesis_draft()
            .or(state.final_answer())
            .unwrap_or_default(),
    );
    let calendar_events = itinerary_events(&format!("{destination} trip"), start, end, &titles);
    let ics = render_ics(&calendar_events, &state.run_id, Utc::now());
    match artifacts.write_artifact(&artifact_file_name(&destination, start), &ics) {
        Ok(path) => {
            state.record_calendar(CalendarArtifact {
                path,
                ics,
                event_count: calendar_events.len(),
            })?;
            Ok("exported")
        }
        Err(err) => {
            warn!(error = %err, "calendar export failed");
            state.warnings.push(format!("Calendar export failed: {err}"));
            Ok("failed")
        }
    }
}

/// Fire-and-forget memory write; failures are logged, never raised.
fn write_memories(state: &RunState, memory: &dyn MemoryStore) -> usize {
    let mut written = 0;
    for (kind, text) in run_memories(state) {
        let record = MemoryRecord::new(&state.user_id, &state.run_id, kind, text);
        match memory.write(&record) {
            Ok(()) => written += 1,
            Err(err) => warn!(error = %format!("{err:#}"), "memory write failed"),
        }
    }
    written
}
