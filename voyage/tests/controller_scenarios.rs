//! End-to-end controller runs against scripted collaborators.
//!
//! Each test drives a full run (intake through memory write) and checks the
//! terminal state, the triage trail, and the evaluation.

use voyage::controller::{RunInput, RunOutcome, run};
use voyage::core::catalog;
use voyage::core::constraints::TripConstraints;
use voyage::core::errors::{CollaboratorError, InvariantViolation};
use voyage::core::evaluator::GATE_CALENDAR;
use voyage::core::intake::DESTINATION_QUESTION;
use voyage::core::plan::{MAX_RETRIES, PlanSource};
use voyage::core::state::RunState;
use voyage::core::state_update::apply_next_action;
use voyage::core::types::{
    ContextHit, Decision, MemoryKind, NextAction, OverallStatus, StepStatus, TerminationReason,
    Tier,
};
use voyage::io::events::EventKind;
use voyage::io::llm::PromptKind;
use voyage::test_support::{
    RecordingArtifacts, Scripted, ScriptedModel, ScriptedTools, StaticMemory, sample_constraints,
    test_settings,
};

fn run_constraints(scripted: &Scripted, constraints: TripConstraints) -> RunOutcome {
    run(
        "run-scenario",
        RunInput::Constraints(constraints),
        &test_settings(),
        &scripted.collaborators(),
    )
    .expect("run should not violate invariants")
}

fn ran(outcome: &RunOutcome) -> &RunState {
    outcome.state().expect("run reached the loop")
}

fn timeout(what: &str) -> CollaboratorError {
    CollaboratorError::Timeout(format!("{what} timed out"))
}

const MINOR_TOOLS_PLAN: &str = r#"{"plan": [
    {"title": "Find things to do", "step_type": "TOOL_CALL", "tool_name": "things_to_do_links",
     "tool_args": {"destination": "Tokyo", "interests": ["food", "temples"]}},
    {"title": "Check the weather", "step_type": "TOOL_CALL", "tool_name": "weather_summary",
     "tool_args": {"destination": "Tokyo", "start_date": "2026-04-01"}},
    {"title": "Airport transfer", "step_type": "TOOL_CALL", "tool_name": "distance_and_time",
     "tool_args": {"origin": "Haneda Airport", "destination": "Shinjuku"}},
    {"title": "Write the itinerary", "step_type": "SYNTHESIZE"}
]}"#;

/// Verifies three minor tools that all time out are skipped and the run still finalizes.
#[test]
fn minor_tool_timeouts_are_skipped() {
    let scripted = Scripted {
        model: ScriptedModel::new().push(PromptKind::Planner, Ok(MINOR_TOOLS_PLAN.to_string())),
        tools: ScriptedTools::new()
            .always_failing(catalog::THINGS_TO_DO, timeout("things"))
            .always_failing(catalog::WEATHER, timeout("weather"))
            .always_failing(catalog::DISTANCE, timeout("distance")),
        ..Scripted::default()
    };
    let outcome = run_constraints(&scripted, sample_constraints());
    let state = ran(&outcome);

    assert_eq!(state.plan.source, PlanSource::Llm);
    assert_eq!(state.termination_reason(), TerminationReason::Finalized);
    let statuses: Vec<StepStatus> = state.plan.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Blocked,
            StepStatus::Blocked,
            StepStatus::Blocked,
            StepStatus::Completed
        ]
    );
    for step in state.plan.steps.iter().filter(|s| !s.is_synthesis()) {
        assert_eq!(step.attempt_count, 0, "minor steps are never retried");
        assert_eq!(step.triage.len(), 1);
        assert_eq!(step.triage[0].decision, Decision::Skip);
    }
    assert_eq!(scripted.tools.calls().len(), 3);
    assert_eq!(state.counters.skips, 3);

    let evaluation = state.evaluation().expect("evaluated");
    assert!(evaluation.hard_gates["assumption_coverage"].passed);
    let answer = state.final_answer().expect("answer");
    assert!(answer.contains("Unavailable: \"Check the weather\" did not complete"));
}

/// Verifies a blocking first-step failure stops the run before anything else executes.
#[test]
fn blocking_first_step_asks_user() {
    let scripted = Scripted {
        tools: ScriptedTools::new().failing(
            catalog::FLIGHTS,
            vec![CollaboratorError::not_found(
                "destination",
                "cannot resolve 'Tokyo'",
            )],
        ),
        ..Scripted::default()
    };
    let outcome = run_constraints(&scripted, sample_constraints());
    let state = ran(&outcome);

    assert_eq!(state.termination_reason(), TerminationReason::UserInputRequired);
    assert_eq!(scripted.tools.calls(), vec![catalog::FLIGHTS.to_string()]);
    assert_eq!(state.plan.steps[0].status, StepStatus::Failed);
    assert!(
        state.plan.steps[1..]
            .iter()
            .all(|step| step.status == StepStatus::Pending)
    );
    assert_eq!(state.iteration_count, 1);
    assert!(state.final_answer().is_none());
    assert!(state.evaluation().is_none());
    assert_eq!(outcome.questions().len(), 1);
    assert!(outcome.questions()[0].contains("destination"));
    assert!(scripted.memory.written().is_empty());
}

/// Verifies schema-invalid planner output falls back to the deterministic template.
#[test]
fn invalid_planner_output_falls_back() {
    let scripted = Scripted {
        model: ScriptedModel::new().push(
            PromptKind::Planner,
            Ok(r#"{"links": "not-a-list"}"#.to_string()),
        ),
        ..Scripted::default()
    };
    let outcome = run_constraints(&scripted, sample_constraints());
    let state = ran(&outcome);

    assert_eq!(state.plan.source, PlanSource::Deterministic);
    let synth_steps = state.plan.steps.iter().filter(|s| s.is_synthesis()).count();
    assert_eq!(synth_steps, 1);
    let tools: Vec<&str> = state.plan.steps.iter().filter_map(|s| s.tool_name()).collect();
    assert_eq!(
        tools,
        vec![
            catalog::FLIGHTS,
            catalog::HOTELS,
            catalog::THINGS_TO_DO,
            catalog::WEATHER
        ]
    );
    assert_eq!(state.termination_reason(), TerminationReason::Finalized);
    assert!(
        scripted
            .events
            .events()
            .iter()
            .any(|event| matches!(&event.kind, EventKind::PlannerFallback { errors } if !errors.is_empty()))
    );
}

/// Verifies a planner binding with unusable values is replaced by the
/// deterministic plan instead of stopping the run on a core argument.
#[test]
fn misshapen_planner_arguments_fall_back() {
    let plan = r#"{"plan": [
        {"title": "Flights", "step_type": "TOOL_CALL", "tool_name": "flights_search_links",
         "tool_args": {"destination": "Tokyo", "start_date": "next week"}},
        {"title": "Hotels", "step_type": "TOOL_CALL", "tool_name": "hotels_search_links",
         "tool_args": {"destination": 42}},
        {"title": "Write the itinerary", "step_type": "SYNTHESIZE"}
    ]}"#;
    let scripted = Scripted {
        model: ScriptedModel::new().push(PromptKind::Planner, Ok(plan.to_string())),
        ..Scripted::default()
    };
    let outcome = run_constraints(&scripted, sample_constraints());
    let state = ran(&outcome);

    assert_eq!(state.plan.source, PlanSource::Deterministic);
    assert_eq!(state.termination_reason(), TerminationReason::Finalized);
    assert!(outcome.questions().is_empty());
    assert!(
        state
            .plan
            .steps
            .iter()
            .all(|step| step.status == StepStatus::Completed)
    );
    let events = scripted.events.events();
    let fallback_errors = events
        .iter()
        .find_map(|event| match &event.kind {
            EventKind::PlannerFallback { errors } => Some(errors.clone()),
            _ => None,
        })
        .expect("planner fallback event");
    assert!(
        fallback_errors.iter().any(|err| err.contains("'start_date' must be YYYY-MM-DD")),
        "{fallback_errors:?}"
    );
    assert!(
        fallback_errors.iter().any(|err| err.contains("'destination' must be a string")),
        "{fallback_errors:?}"
    );
}

/// Verifies a destination that cannot be a real place stops the run with a
/// question about the destination.
#[test]
fn implausible_destination_asks_user() {
    let scripted = Scripted::default();
    let constraints = TripConstraints {
        destinations: vec!["Xzzqwrtplkk".to_string()],
        ..sample_constraints()
    };
    let outcome = run_constraints(&scripted, constraints);
    let state = ran(&outcome);

    assert_eq!(state.termination_reason(), TerminationReason::UserInputRequired);
    assert_eq!(scripted.tools.calls(), vec![catalog::FLIGHTS.to_string()]);
    let flights = &state.plan.steps[0];
    assert_eq!(flights.status, StepStatus::Failed);
    assert_eq!(flights.triage.len(), 1);
    assert_eq!(flights.triage[0].tier, Tier::Blocking);
    assert_eq!(flights.triage[0].decision, Decision::AskUser);
    assert_eq!(outcome.questions().len(), 1);
    assert!(outcome.questions()[0].contains("the destination you gave"));
    assert!(outcome.questions()[0].contains("Xzzqwrtplkk"));
    assert!(state.final_answer().is_none());
}

/// Verifies the loop guard aborts with pending work and the run is still evaluated.
#[test]
fn loop_guard_aborts_and_still_evaluates() {
    let scripted = Scripted::default();
    let settings = voyage::controller::RunSettings {
        max_iters: 2,
        ..test_settings()
    };
    let outcome = run(
        "run-guard",
        RunInput::Constraints(sample_constraints()),
        &settings,
        &scripted.collaborators(),
    )
    .expect("run");
    let state = ran(&outcome);

    assert_eq!(state.termination_reason(), TerminationReason::MaxIters);
    assert_eq!(state.iteration_count, 2);
    let pending = state
        .plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .count();
    assert_eq!(pending, 3);
    let evaluation = state.evaluation().expect("evaluation is not skipped");
    assert_ne!(evaluation.overall_status, OverallStatus::Good);
    assert!(
        state
            .final_answer()
            .expect("answer")
            .contains("Completion not reached")
    );
    assert_eq!(scripted.model.calls(PromptKind::Synthesis), 0);
}

/// Verifies a synthesis timeout is retried once, then escalated to the user.
#[test]
fn synthesis_timeout_retries_then_asks_user() {
    let scripted = Scripted {
        model: ScriptedModel::new()
            .push(PromptKind::Synthesis, Err(timeout("synthesis")))
            .push(PromptKind::Synthesis, Err(timeout("synthesis"))),
        ..Scripted::default()
    };
    let outcome = run_constraints(&scripted, sample_constraints());
    let state = ran(&outcome);

    assert_eq!(state.termination_reason(), TerminationReason::UserInputRequired);
    let synth = state.plan.steps.last().expect("synthesis step");
    assert_eq!(synth.attempt_count, 1);
    assert_eq!(synth.status, StepStatus::Failed);
    let decisions: Vec<Decision> = synth.triage.iter().map(|r| r.decision).collect();
    assert_eq!(decisions, vec![Decision::Retry, Decision::AskUser]);
    assert_eq!(scripted.model.calls(PromptKind::Synthesis), 2);
    assert_eq!(state.counters.retries, 1);
    assert_eq!(scripted.events.triage_events().len(), 2);
}

/// Verifies the happy path produces a good evaluation, a calendar, and memories.
#[test]
fn happy_path_finalizes_with_artifacts() {
    let scripted = Scripted::default();
    let outcome = run_constraints(&scripted, sample_constraints());
    let state = ran(&outcome);

    assert_eq!(state.termination_reason(), TerminationReason::Finalized);
    assert!(state.plan.steps.iter().all(|s| s.status == StepStatus::Completed));
    let evaluation = state.evaluation().expect("evaluation");
    assert!(evaluation.all_gates_passed(), "{:?}", evaluation.notes);
    assert_eq!(evaluation.overall_status, OverallStatus::Good);

    let calendar = state.calendar().expect("calendar");
    assert_eq!(calendar.event_count, 3);
    let written = scripted.artifacts.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0, "tokyo-2026-04-01-itinerary.ics");

    let kinds: Vec<MemoryKind> = scripted.memory.written().iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&MemoryKind::Profile));
    assert!(kinds.contains(&MemoryKind::Preference));
    assert!(kinds.contains(&MemoryKind::TripSummary));
    assert_eq!(
        kinds.iter().filter(|k| **k == MemoryKind::ToolOutput).count(),
        4
    );

    let events = scripted.events.events();
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(EventKind::Summary {
            termination_reason: TerminationReason::Finalized,
            overall_status: Some(OverallStatus::Good),
            ..
        })
    ));
}

/// Verifies a failed calendar write leaves the export claim unbacked and fails the gate.
#[test]
fn calendar_write_failure_fails_the_gate() {
    let scripted = Scripted {
        artifacts: RecordingArtifacts::failing(),
        ..Scripted::default()
    };
    let outcome = run_constraints(&scripted, sample_constraints());
    let state = ran(&outcome);

    assert_eq!(state.termination_reason(), TerminationReason::Finalized);
    assert!(state.calendar().is_none());
    assert!(state.warnings.iter().any(|w| w.starts_with("Calendar export failed")));
    let evaluation = state.evaluation().expect("evaluation");
    assert!(!evaluation.hard_gates[GATE_CALENDAR].passed);
    assert_eq!(evaluation.overall_status, OverallStatus::Failed);
}

#[test]
fn memory_write_failure_does_not_fail_the_run() {
    let scripted = Scripted {
        memory: StaticMemory::default().failing_writes(),
        ..Scripted::default()
    };
    let outcome = run_constraints(&scripted, sample_constraints());
    assert_eq!(outcome.termination_reason(), TerminationReason::Finalized);
    assert!(outcome.evaluation().is_some());
}

#[test]
fn missing_destination_needs_clarification_before_planning() {
    let scripted = Scripted::default();
    let constraints = TripConstraints {
        destinations: Vec::new(),
        ..sample_constraints()
    };
    let outcome = run_constraints(&scripted, constraints);

    let RunOutcome::NeedsClarification(clarification) = &outcome else {
        panic!("expected clarification");
    };
    assert_eq!(clarification.questions, vec![DESTINATION_QUESTION.to_string()]);
    assert_eq!(outcome.termination_reason(), TerminationReason::UserInputRequired);
    assert!(scripted.tools.calls().is_empty());
    assert_eq!(scripted.model.calls(PromptKind::Planner), 0);
    assert!(matches!(
        scripted.events.events().last().map(|e| &e.kind),
        Some(EventKind::Summary { .. })
    ));
}

/// Verifies a remembered home origin fills a request that left it out.
#[test]
fn remembered_origin_fills_constraints() {
    let scripted = Scripted {
        memory: StaticMemory::new(vec![ContextHit {
            id: "m1".to_string(),
            text: "Home origin: Oakland".to_string(),
            kind: MemoryKind::Profile,
            score: 0.5,
        }]),
        ..Scripted::default()
    };
    let constraints = TripConstraints {
        origin: None,
        ..sample_constraints()
    };
    let outcome = run_constraints(&scripted, constraints);
    let state = ran(&outcome);
    assert_eq!(state.constraints.origin.as_deref(), Some("Oakland"));
    assert_eq!(state.context_hits.len(), 1);
}

#[test]
fn free_text_request_runs_through_fallback_intent() {
    let scripted = Scripted::default();
    let outcome = run(
        "run-query",
        RunInput::Query("A food trip to Kyoto from SFO 2026-05-10 to 2026-05-12".to_string()),
        &test_settings(),
        &scripted.collaborators(),
    )
    .expect("run");
    let state = ran(&outcome);
    assert_eq!(state.constraints.destinations, vec!["Kyoto"]);
    assert_eq!(state.query.as_deref(), Some("A food trip to Kyoto from SFO 2026-05-10 to 2026-05-12"));
    assert_eq!(state.termination_reason(), TerminationReason::Finalized);
    // Intent and planner both failed over to their deterministic paths.
    assert_eq!(state.counters.llm_errors, 2);
}

/// Verifies termination, the retry bound, and the iteration bound across fault mixes.
#[test]
fn every_fault_mix_terminates_within_bounds() {
    let faults = [
        timeout("t"),
        CollaboratorError::ConnectionFailure("refused".to_string()),
        CollaboratorError::UnknownTool("gone".to_string()),
        CollaboratorError::Resource("disk".to_string()),
        CollaboratorError::Unknown("boom".to_string()),
        CollaboratorError::invalid_argument("travelers", "bad count"),
    ];
    for fault in &faults {
        for tool in catalog::tool_names() {
            let scripted = Scripted {
                tools: ScriptedTools::new().always_failing(tool, fault.clone()),
                ..Scripted::default()
            };
            let outcome = run_constraints(&scripted, sample_constraints());
            let Some(state) = outcome.state() else {
                panic!("constraints are plannable");
            };
            assert!(state.is_terminated(), "{tool} / {fault}");
            let bound = 2 * state.plan.len() as u32 + 1;
            assert!(state.iteration_count <= bound);
            assert!(state.plan.steps.iter().all(|s| s.attempt_count <= MAX_RETRIES));
            assert!(state.plan.in_progress().is_none());
        }
    }
}

/// Verifies a terminated run refuses further orchestration.
#[test]
fn terminated_run_rejects_orchestration() {
    let scripted = Scripted::default();
    let outcome = run_constraints(&scripted, sample_constraints());
    let mut state = ran(&outcome).clone();
    let before = state.plan.clone();
    let err = apply_next_action(&mut state, &NextAction::RunStep("step-1".to_string()))
        .expect_err("terminated");
    assert_eq!(
        err,
        InvariantViolation::AlreadyTerminated(TerminationReason::Finalized)
    );
    assert_eq!(state.plan, before);
}
