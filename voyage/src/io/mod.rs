//! Side-effecting collaborators: model, tools, memory, event and run logs,
//! calendar artifacts, configuration, and process execution.

pub mod calendar;
pub mod config;
pub mod events;
pub mod llm;
pub mod memory;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod tools;
