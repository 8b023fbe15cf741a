//! Headless siege runner.
//!
//! This binary runs the siege without a front end, controlled via JSON on
//! stdin/stdout. Designed for external controllers, CI testing, and
//! determinism verification.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read commands from stdin
//! cargo run -p siege_headless -- run --scenario scenarios/standard.ron
//!
//! # Play a scenario to the end and print the final status
//! cargo run -p siege_headless -- simulate --scenario scenarios/standard.ron --ticks 2000
//!
//! # Verify determinism
//! cargo run -p siege_headless -- verify --scenario scenarios/standard.ron --runs 5
//!
//! # Check a scenario file for problems
//! cargo run -p siege_headless -- validate scenarios/standard.ron
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON commands, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Debug information
//!
//! See the protocol module for command/response format.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use siege_headless::{
    batch::{simulate, verify_determinism},
    runner::{HeadlessConfig, HeadlessRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "siege_headless")]
#[command(about = "Headless siege runner for controller testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive session on stdin/stdout
    Run {
        /// Scenario file to load (the standard siege if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Config file replacing the scenario's config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output status after every tick command
        #[arg(long)]
        auto_state: bool,
    },

    /// Play a scenario to the end and print the final status as JSON
    Simulate {
        /// Scenario file to load (the standard siege if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Config file replacing the scenario's config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Tick limit (the scenario's own limit if omitted)
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Verify determinism by playing the same scenario several times
    Verify {
        /// Scenario file to load (the standard siege if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Tick limit (the scenario's own limit if omitted)
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Parse a scenario file and report problems
    Validate {
        /// Scenario file to check
        file: PathBuf,

        /// Config file to check along with it
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for protocol)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let command = cli.command.unwrap_or(Commands::Run {
        scenario: None,
        config: None,
        auto_state: false,
    });

    match command {
        Commands::Run {
            scenario,
            config,
            auto_state,
        } => cmd_run(HeadlessConfig {
            auto_state_output: auto_state,
            scenario_path: scenario,
            config_path: config,
        }),
        Commands::Simulate {
            scenario,
            config,
            ticks,
        } => cmd_simulate(
            HeadlessConfig {
                scenario_path: scenario,
                config_path: config,
                ..Default::default()
            },
            ticks,
        ),
        Commands::Verify {
            scenario,
            runs,
            ticks,
        } => cmd_verify(
            HeadlessConfig {
                scenario_path: scenario,
                ..Default::default()
            },
            runs,
            ticks,
        ),
        Commands::Validate { file, config } => cmd_validate(HeadlessConfig {
            scenario_path: Some(file),
            config_path: config,
            ..Default::default()
        }),
    }
}

fn cmd_run(config: HeadlessConfig) -> ExitCode {
    tracing::info!("Starting interactive session");

    let runner = match HeadlessRunner::with_config(config) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Failed to start session: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runner.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Session I/O failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load(config: &HeadlessConfig) -> Option<Scenario> {
    match config.load_scenario() {
        Ok(scenario) => Some(scenario),
        Err(e) => {
            eprintln!("Failed to load scenario: {e}");
            None
        }
    }
}

fn cmd_simulate(config: HeadlessConfig, ticks: Option<u64>) -> ExitCode {
    let Some(scenario) = load(&config) else {
        return ExitCode::FAILURE;
    };
    tracing::info!(scenario = %scenario.name, "Simulating");

    match simulate(&scenario, ticks) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize result: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("Failed to build scenario: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_verify(config: HeadlessConfig, runs: u32, ticks: Option<u64>) -> ExitCode {
    let Some(scenario) = load(&config) else {
        return ExitCode::FAILURE;
    };
    tracing::info!(scenario = %scenario.name, runs, "Verifying determinism");

    match verify_determinism(&scenario, runs, ticks) {
        Ok(report) if report.is_deterministic() => {
            eprintln!(
                "PASS: All {} runs produced identical results over {} ticks",
                report.runs, report.ticks
            );
            ExitCode::SUCCESS
        }
        Ok(report) => {
            eprintln!(
                "FAIL: Non-determinism detected at tick {}",
                report.first_divergence.unwrap_or_default()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Failed to build scenario: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_validate(config: HeadlessConfig) -> ExitCode {
    let Some(scenario) = load(&config) else {
        return ExitCode::FAILURE;
    };

    let problems = scenario.problems();
    if problems.is_empty() {
        eprintln!(
            "OK: '{}' with {} structures, {} defenders, {} waves",
            scenario.name,
            scenario.structures.len(),
            scenario.defenders.len(),
            scenario.spawns.len()
        );
        ExitCode::SUCCESS
    } else {
        for problem in &problems {
            eprintln!("problem: {problem}");
        }
        ExitCode::FAILURE
    }
}
