mod case;
mod cli;
mod faults;
mod judge;
mod outcome;
mod report;
mod results;
mod run;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "eval", version, about = "Scenario harness for the voyage controller")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the cases under eval/cases.
    List,
    /// Run one case, or all of them, and judge each run.
    Run {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        case_id: Option<String>,
        #[arg(long)]
        all: bool,
        /// Repetitions per case.
        #[arg(long, default_value_t = 1)]
        runs: u32,
    },
    /// Summarize the captured runs of a case.
    Report { case_id: String },
    /// Delete the captured runs of a case.
    Clean { case_id: String },
}

fn main() -> Result<ExitCode> {
    voyage::logging::init_with_default("warn,eval=info");

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;
    match cli.command {
        Command::List => cli::list_cases(&repo_root)?,
        Command::Run { case_id, runs, .. } => {
            if !cli::run_cases(&repo_root, case_id.as_deref(), runs)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Report { case_id } => cli::report_case(&repo_root, &case_id)?,
        Command::Clean { case_id } => cli::clean_case(&repo_root, &case_id)?,
    }
    Ok(ExitCode::SUCCESS)
}
