//! Test-only builders and scripted collaborators.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use serde_json::{Map, Value, json};

use crate::controller::{Collaborators, RunSettings};
use crate::core::catalog;
use crate::core::constraints::TripConstraints;
use crate::core::errors::CollaboratorError;
use crate::core::evaluator::DISCLAIMER;
use crate::core::links::DEFAULT_ALLOWED_DOMAINS;
use crate::core::plan::{Plan, Step, StepKind};
use crate::core::plan_builder;
use crate::core::state::{RunState, ToolResult};
use crate::core::types::ContextHit;
use crate::io::calendar::ArtifactWriter;
use crate::io::events::{EventKind, EventSink, RunEvent};
use crate::io::llm::{GenerateRequest, LanguageModel, PromptKind};
use crate::io::memory::{MemoryQuery, MemoryRecord, MemoryStore};
use crate::io::tools::{LinkTools, ToolBox};

/// Tokyo, 2026-04-01..2026-04-03, two travelers from SFO, no budget.
pub fn sample_constraints() -> TripConstraints {
    TripConstraints {
        origin: Some("SFO".to_string()),
        destinations: vec!["Tokyo".to_string()],
        start_date: Some("2026-04-01".to_string()),
        end_date: Some("2026-04-03".to_string()),
        budget_usd: None,
        travelers: Some(2),
        interests: vec!["food".to_string(), "temples".to_string()],
        pace: None,
        notes: Vec::new(),
    }
}

/// The deterministic planner's plan for [`sample_constraints`]: four link
/// tools, then synthesis.
pub fn deterministic_plan() -> Plan {
    plan_builder::deterministic_plan(&sample_constraints())
}

/// A fresh run over [`deterministic_plan`].
pub fn deterministic_state() -> RunState {
    RunState::new("run-test", "tester", sample_constraints(), deterministic_plan())
}

/// A pending tool step bound to `tool_name` for Tokyo.
pub fn tool_step(id: &str, tool_name: &str) -> Step {
    let args = json!({"destination": "Tokyo"})
        .as_object()
        .cloned()
        .unwrap_or_default();
    Step::tool(id, format!("{tool_name} step"), tool_name, args)
}

pub fn synth_step(id: &str) -> Step {
    Step::new(id, "Synthesize itinerary", StepKind::Synthesize)
}

pub fn weather_step_index(state: &RunState) -> usize {
    state
        .plan
        .steps
        .iter()
        .position(|step| step.tool_name() == Some(catalog::WEATHER))
        .expect("plan has a weather step")
}

/// A complete answer for [`sample_constraints`] that passes every gate.
pub fn good_answer() -> String {
    format!(
        "# Tokyo trip plan

## Summary
- Three days in Tokyo from 2026-04-01 to 2026-04-03 for two travelers flying from SFO.
- Focus: food and temples at a balanced pace.

## Assumptions
- budget: not provided
- Travel dates are fixed.

## Flights
- Compare nonstop options from SFO on the first morning of the trip.
- [Google Flights](https://www.google.com/travel/flights?q=Flights+SFO+to+Tokyo)
- [Skyscanner](https://www.skyscanner.com/transport/flights/?q=SFO+to+Tokyo)

## Lodging
- Stay near a central transit hub such as Shinjuku or Ueno.
- [Booking.com](https://www.booking.com/searchresults.html?ss=Hotels+in+Tokyo)

## Day-by-day
### Day 1: Arrival and Asakusa
- Morning: land and store bags at the hotel.
- Afternoon: Senso-ji temple and Nakamise street snacks.
- Evening: food crawl in an izakaya alley.
### Day 2: Temples and gardens
- Morning: Meiji Jingu shrine walk.
- Afternoon: Shinjuku Gyoen garden.
- Evening: ramen tasting in Shinjuku.
### Day 3: Markets and departure
- Morning: Tsukiji outer market food stalls.
- Afternoon: Zojo-ji temple, then head to the airport.
- Evening: depart Tokyo.

## Transit
- Use a prepaid IC card for trains and buses; allow travel time between neighborhoods.
- [Directions](https://www.google.com/maps/dir/?api=1&origin=Shinjuku&destination=Asakusa&travelmode=transit)

## Weather
- Early April is usually mild with cherry blossoms; pack layers.
- [Weather search](https://www.google.com/search?q=Tokyo+weather+april)

## Budget
- No budget was provided.
- Heuristic split: flights 35-55%, lodging 25-40%, food and activities 15-30%, local transit 5-10%.

## Calendar
- No calendar export.

{DISCLAIMER}
"
    )
}

/// Run settings with default limits and the default allow-list.
pub fn test_settings() -> RunSettings {
    RunSettings {
        user_id: "tester".to_string(),
        max_iters: 20,
        eval_threshold: 3.5,
        retrieval_k: 5,
        allowed_domains: DEFAULT_ALLOWED_DOMAINS
            .iter()
            .map(|domain| domain.to_string())
            .collect(),
        prompt_budget: crate::io::prompt::DEFAULT_PROMPT_BUDGET,
    }
}

enum ToolScript {
    Queue(VecDeque<CollaboratorError>),
    Always(CollaboratorError),
}

/// Built-in link tools with scripted failures per tool name.
pub struct ScriptedTools {
    scripts: Mutex<BTreeMap<String, ToolScript>>,
    calls: Mutex<Vec<String>>,
    priced: bool,
}

impl Default for ScriptedTools {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTools {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            priced: false,
        }
    }

    /// Fail the next calls of `tool` with `errors`, in order, then succeed.
    pub fn failing(self, tool: &str, errors: Vec<CollaboratorError>) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(tool.to_string(), ToolScript::Queue(errors.into()));
        self
    }

    /// Fail every call of `tool` with `error`.
    pub fn always_failing(self, tool: &str, error: CollaboratorError) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(tool.to_string(), ToolScript::Always(error));
        self
    }

    /// Mark successful results as coming from a priced data source.
    pub fn priced(mut self) -> Self {
        self.priced = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls().iter().filter(|name| *name == tool).count()
    }

    fn next_failure(&self, tool: &str) -> Option<CollaboratorError> {
        let mut scripts = self.scripts.lock().expect("scripts lock");
        match scripts.get_mut(tool)? {
            ToolScript::Queue(queue) => queue.pop_front(),
            ToolScript::Always(err) => Some(err.clone()),
        }
    }
}

impl ToolBox for ScriptedTools {
    fn call(&self, tool_name: &str, args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(tool_name.to_string());
        if let Some(err) = self.next_failure(tool_name) {
            return Err(err);
        }
        let mut result = LinkTools.call(tool_name, args)?;
        if self.priced {
            result.data = json!({"priced": true});
        }
        Ok(result)
    }
}

/// Language model with scripted responses per prompt kind.
///
/// Unscripted synthesis calls return [`good_answer`]; other unscripted calls
/// fail with a connection error.
pub struct ScriptedModel {
    scripts: Mutex<BTreeMap<PromptKind, VecDeque<Result<String, CollaboratorError>>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(BTreeMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(self, kind: PromptKind, outcome: Result<String, CollaboratorError>) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .entry(kind)
            .or_default()
            .push_back(outcome);
        self
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        self.requests().iter().filter(|r| r.kind == kind).count()
    }
}

impl LanguageModel for ScriptedModel {
    fn generate(&self, request: &GenerateRequest) -> Result<String, CollaboratorError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let scripted = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(&request.kind)
            .and_then(VecDeque::pop_front);
        match (scripted, request.kind) {
            (Some(outcome), _) => outcome,
            (None, PromptKind::Synthesis) => Ok(good_answer()),
            (None, kind) => Err(CollaboratorError::ConnectionFailure(format!(
                "no scripted {kind} response"
            ))),
        }
    }
}

/// Memory returning fixed hits and recording writes.
pub struct StaticMemory {
    hits: Vec<ContextHit>,
    written: Mutex<Vec<MemoryRecord>>,
    fail_writes: bool,
}

impl Default for StaticMemory {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StaticMemory {
    pub fn new(hits: Vec<ContextHit>) -> Self {
        Self {
            hits,
            written: Mutex::new(Vec::new()),
            fail_writes: false,
        }
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn written(&self) -> Vec<MemoryRecord> {
        self.written.lock().expect("written lock").clone()
    }
}

impl MemoryStore for StaticMemory {
    fn retrieve(&self, query: &MemoryQuery<'_>) -> Vec<ContextHit> {
        self.hits.iter().take(query.k).cloned().collect()
    }

    fn write(&self, record: &MemoryRecord) -> anyhow::Result<()> {
        if self.fail_writes {
            anyhow::bail!("memory store unavailable");
        }
        self.written
            .lock()
            .expect("written lock")
            .push(record.clone());
        Ok(())
    }
}

/// Event sink keeping every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn triage_events(&self) -> Vec<RunEvent> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event.kind, EventKind::Triage { .. }))
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &RunEvent) {
        self.events.lock().expect("events lock").push(event.clone());
    }
}

/// Artifact writer keeping files in memory, optionally failing every write.
#[derive(Default)]
pub struct RecordingArtifacts {
    written: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingArtifacts {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn written(&self) -> Vec<(String, String)> {
        self.written.lock().expect("written lock").clone()
    }
}

impl ArtifactWriter for RecordingArtifacts {
    fn write_artifact(&self, file_name: &str, contents: &str) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Resource(format!("disk full writing {file_name}")));
        }
        self.written
            .lock()
            .expect("written lock")
            .push((file_name.to_string(), contents.to_string()));
        Ok(format!("artifacts/{file_name}"))
    }
}

/// One scripted instance of every collaborator.
#[derive(Default)]
pub struct Scripted {
    pub model: ScriptedModel,
    pub tools: ScriptedTools,
    pub memory: StaticMemory,
    pub events: RecordingSink,
    pub artifacts: RecordingArtifacts,
}

impl Scripted {
    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            model: &self.model,
            tools: &self.tools,
            memory: &self.memory,
            events: &self.events,
            artifacts: &self.artifacts,
        }
    }
}
