//! Deterministic, pure logic shared by the orchestration core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod calendar;
pub mod catalog;
pub mod classifier;
pub mod constraints;
pub mod errors;
pub mod evaluator;
pub mod intake;
pub mod invariants;
pub mod links;
pub mod markdown;
pub mod plan;
pub mod plan_builder;
pub mod responder;
pub mod selector;
pub mod state;
pub mod state_update;
pub mod triage;
pub mod types;
