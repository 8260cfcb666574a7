//! Tool box that injects case faults in front of the built-in link tools.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use tracing::debug;
use voyage::core::errors::CollaboratorError;
use voyage::core::state::ToolResult;
use voyage::io::tools::{LinkTools, ToolBox};

use crate::case::{Fault, parse_fault};

struct ToolFaults {
    queued: VecDeque<CollaboratorError>,
    /// Error repeated after the queue drains, with its probability.
    tail: Option<(CollaboratorError, f64)>,
}

pub struct FaultTools {
    faults: Mutex<BTreeMap<String, ToolFaults>>,
    rng: Mutex<StdRng>,
    calls: Mutex<Vec<String>>,
}

impl FaultTools {
    pub fn new(faults: &[Fault], seed: u64) -> Result<Self> {
        let mut by_tool = BTreeMap::new();
        for fault in faults {
            let queued = fault
                .errors
                .iter()
                .map(String::as_str)
                .map(parse_fault)
                .collect::<Result<VecDeque<_>>>()?;
            let tail = queued
                .back()
                .filter(|_| fault.probability > 0.0)
                .map(|err| (err.clone(), fault.probability));
            by_tool.insert(fault.tool.clone(), ToolFaults { queued, tail });
        }
        Ok(Self {
            faults: Mutex::new(by_tool),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Tool names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_failure(&self, tool: &str) -> Option<CollaboratorError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = faults.get_mut(tool)?;
        if let Some(err) = entry.queued.pop_front() {
            return Some(err);
        }
        let (err, probability) = entry.tail.as_ref()?;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_bool(*probability).then(|| err.clone())
    }
}

impl ToolBox for FaultTools {
    fn call(&self, tool_name: &str, args: &Map<String, Value>) -> Result<ToolResult, CollaboratorError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tool_name.to_string());
        if let Some(err) = self.next_failure(tool_name) {
            debug!(tool = tool_name, %err, "injected fault");
            return Err(err);
        }
        LinkTools.call(tool_name, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> Map<String, Value> {
        let Value::Object(map) = json!({"destination": "Tokyo"}) else {
            panic!("object");
        };
        map
    }

    fn fault(tool: &str, errors: &[&str], probability: f64) -> Fault {
        Fault {
            tool: tool.to_string(),
            errors: errors.iter().map(|e| e.to_string()).collect(),
            probability,
        }
    }

    #[test]
    fn queued_errors_fail_first_calls_then_succeed() {
        let tools = FaultTools::new(&[fault("weather_summary", &["timeout", "parse"], 0.0)], 1)
            .expect("tools");
        assert!(matches!(
            tools.call("weather_summary", &args()),
            Err(CollaboratorError::Timeout(_))
        ));
        assert!(matches!(
            tools.call("weather_summary", &args()),
            Err(CollaboratorError::Parse(_))
        ));
        assert!(tools.call("weather_summary", &args()).is_ok());
        assert!(tools.call("things_to_do_links", &args()).is_ok());
        assert_eq!(tools.calls().len(), 4);
    }

    #[test]
    fn certain_tail_fault_repeats() {
        let tools =
            FaultTools::new(&[fault("hotels_search_links", &["resource"], 1.0)], 3).expect("tools");
        for _ in 0..4 {
            assert!(matches!(
                tools.call("hotels_search_links", &args()),
                Err(CollaboratorError::Resource(_))
            ));
        }
    }

    /// Verifies the same seed yields the same fault pattern.
    #[test]
    fn probabilistic_faults_are_seeded() {
        let pattern = |seed| {
            let tools = FaultTools::new(&[fault("weather_summary", &["timeout"], 0.5)], seed)
                .expect("tools");
            (0..16)
                .map(|_| tools.call("weather_summary", &args()).is_err())
                .collect::<Vec<_>>()
        };
        assert_eq!(pattern(42), pattern(42));
    }
}
