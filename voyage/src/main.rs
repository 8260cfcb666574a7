//! `voyage` command line: plan trips, scaffold config, check plan files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use voyage::controller::{self, Collaborators, RunInput, RunOutcome, RunSettings};
use voyage::core::constraints::TripConstraints;
use voyage::core::invariants::validate_plan;
use voyage::core::plan_builder::decode_llm_plan;
use voyage::core::types::{OverallStatus, TerminationReason};
use voyage::exit_codes;
use voyage::io::calendar::DirArtifactWriter;
use voyage::io::config::{AgentConfig, DEFAULT_CONFIG_FILE, load_config, write_config};
use voyage::io::events::JsonlEventSink;
use voyage::io::llm::CommandModel;
use voyage::io::memory::JsonlMemory;
use voyage::io::run_log::write_run_log;
use voyage::io::tools::LinkTools;
use voyage::logging;

#[derive(Parser)]
#[command(
    name = "voyage",
    version,
    about = "Bounded, auditable travel-planning agent"
)]
struct Cli {
    /// Agent configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file and create the runtime directories.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan a trip from constraints or a free-text request.
    Plan(PlanArgs),
    /// Check a planner output file against the schema, catalog, and plan invariants.
    ValidatePlan {
        /// JSON file in planner output format.
        file: PathBuf,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PlanArgs {
    /// Trip constraints file (`.toml`, otherwise JSON).
    #[arg(long)]
    constraints: Option<PathBuf>,

    /// Free-text trip request.
    #[arg(long)]
    query: Option<String>,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Plan(args) => cmd_plan(&cli.config, args),
        Command::ValidatePlan { file } => cmd_validate_plan(&file),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    let config = AgentConfig::default();
    write_config(config_path, &config)?;
    for dir in [config.runs_dir(), config.artifacts_dir()] {
        fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    }
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn read_constraints(path: &Path) -> Result<TripConstraints> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&raw).with_context(|| format!("parse constraints {}", path.display()))
    } else {
        serde_json::from_str(&raw).with_context(|| format!("parse constraints {}", path.display()))
    }
}

fn cmd_plan(config_path: &Path, args: PlanArgs) -> Result<i32> {
    let config = load_config(config_path)?;
    let input = match (args.constraints, args.query) {
        (Some(path), _) => RunInput::Constraints(read_constraints(&path)?),
        (None, Some(query)) => RunInput::Query(query),
        (None, None) => bail!("either --constraints or --query is required"),
    };

    let model = CommandModel::new(config.llm.clone());
    let memory = JsonlMemory::new(config.memory_file());
    let events = JsonlEventSink::new(config.events_file());
    let artifacts = DirArtifactWriter::new(config.artifacts_dir());
    let collab = Collaborators {
        model: &model,
        tools: &LinkTools,
        memory: &memory,
        events: &events,
        artifacts: &artifacts,
    };

    let run_id = controller::new_run_id();
    let outcome = controller::run(
        &run_id,
        input,
        &RunSettings::from_config(&config),
        &collab,
    )
    .context("orchestration invariant violated")?;

    if let Some(state) = outcome.state() {
        let paths = write_run_log(&config.runs_dir(), state)?;
        eprintln!("run log: {}", paths.dir.display());
    }
    report(&outcome);
    Ok(exit_code(&outcome))
}

fn report(outcome: &RunOutcome) {
    match outcome.state().and_then(|state| state.final_answer()) {
        Some(answer) => println!("{answer}"),
        None => {
            println!("More information is needed:");
            for question in outcome.questions() {
                println!("- {question}");
            }
        }
    }
    if let Some(state) = outcome.state() {
        if let Some(calendar) = state.calendar() {
            eprintln!("calendar: {}", calendar.path);
        }
        for warning in &state.warnings {
            eprintln!("warning: {warning}");
        }
    }
    if let Some(evaluation) = outcome.evaluation() {
        eprintln!(
            "evaluation: {} (rubric mean {:.2}, threshold {:.2})",
            evaluation.overall_status, evaluation.rubric_mean, evaluation.threshold
        );
        for gate in evaluation.failed_gates() {
            eprintln!("failed gate: {gate}");
        }
    }
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome.termination_reason() {
        TerminationReason::UserInputRequired => exit_codes::USER_INPUT_REQUIRED,
        TerminationReason::MaxIters => exit_codes::MAX_ITERS,
        TerminationReason::Finalized => match outcome.evaluation().map(|e| e.overall_status) {
            Some(OverallStatus::Good) => exit_codes::OK,
            _ => exit_codes::EVALUATION_FAILED,
        },
        TerminationReason::None => exit_codes::INVALID,
    }
}

fn cmd_validate_plan(path: &Path) -> Result<i32> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let plan = match decode_llm_plan(&raw) {
        Ok(plan) => plan,
        Err(errors) => {
            eprintln!("plan rejected:\n- {}", errors.join("\n- "));
            return Ok(exit_codes::INVALID);
        }
    };
    let errors = validate_plan(&plan);
    if !errors.is_empty() {
        eprintln!("invariant violations:\n- {}", errors.join("\n- "));
        return Ok(exit_codes::INVALID);
    }
    for step in &plan.steps {
        println!("{} {} {}", step.id, step.kind.label(), step.title);
    }
    Ok(exit_codes::OK)
}
