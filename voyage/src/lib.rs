//! Bounded, auditable travel-planning orchestration.
//!
//! A run turns trip constraints (or a free-text request) into a plan of
//! tool and synthesis steps, executes them one at a time under an iteration
//! bound, triages every collaborator failure through a fixed decision table,
//! and finishes with an assembled answer, a calendar artifact, and a scored
//! evaluation.
//!
//! - **[`core`]**: Pure, deterministic logic (plans, selection, triage,
//!   state transitions, answer assembly, evaluation). No I/O.
//! - **[`io`]**: Side-effecting collaborators (model command, link tools,
//!   memory store, event and run logs, calendar files, configuration).
//!
//! Orchestration modules ([`intent`], [`planner`], [`executor`],
//! [`controller`]) wire core logic to the collaborators.

pub mod controller;
pub mod core;
pub mod executor;
pub mod exit_codes;
pub mod intent;
pub mod io;
pub mod logging;
pub mod planner;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
