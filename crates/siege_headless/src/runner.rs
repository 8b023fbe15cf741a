//! Headless runner implementation.
//!
//! One runner owns one [`Simulation`] and answers protocol commands
//! against it. [`HeadlessRunner::run`] wires it to stdin/stdout;
//! [`HeadlessRunner::run_session`] takes any reader and writer so sessions
//! can be driven from tests.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use siege_core::config::SimulationConfig;
use siege_core::error::GameError;
use siege_core::simulation::Simulation;
use thiserror::Error;

use crate::protocol::{Command, Response};
use crate::scenario::{Scenario, ScenarioError};

/// Why a runner could not be set up.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The scenario could not be loaded or built.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// The config override could not be loaded.
    #[error(transparent)]
    Config(#[from] GameError),
}

/// Headless runner configuration.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConfig {
    /// Output status after every tick command (vs only on query).
    pub auto_state_output: bool,
    /// Scenario file to load on startup; the standard siege otherwise.
    pub scenario_path: Option<PathBuf>,
    /// Config file replacing the scenario's own config.
    pub config_path: Option<PathBuf>,
}

impl HeadlessConfig {
    /// Load the scenario this config points at, with the config override
    /// applied.
    pub fn load_scenario(&self) -> Result<Scenario, RunnerError> {
        let mut scenario = match &self.scenario_path {
            Some(path) => Scenario::load(path)?,
            None => Scenario::standard(),
        };
        if let Some(path) = &self.config_path {
            scenario.config = SimulationConfig::load(path)?;
        }
        Ok(scenario)
    }
}

/// Headless runner for externally controlled sieges.
pub struct HeadlessRunner {
    config: HeadlessConfig,
    sim: Simulation,
}

impl HeadlessRunner {
    /// Create a runner with custom configuration, building its scenario.
    pub fn with_config(config: HeadlessConfig) -> Result<Self, RunnerError> {
        let scenario = config.load_scenario()?;
        let sim = scenario.build()?;
        Ok(Self { config, sim })
    }

    /// Create a runner around an existing simulation.
    pub fn from_simulation(sim: Simulation, config: HeadlessConfig) -> Self {
        Self { config, sim }
    }

    /// The simulation being driven.
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Answer one command.
    pub fn handle(&mut self, command: &Command) -> Vec<Response> {
        match command {
            Command::Tick { count } => self.handle_tick(*count),
            Command::Order { order } => match self.sim.apply_order(*order) {
                Ok(()) => vec![Response::ack(command.name())],
                Err(err) => vec![Response::error(err.to_string(), Some(command.name()))],
            },
            Command::Status => vec![Response::Status(self.sim.status())],
            Command::Hash => vec![Response::StateHash {
                tick: self.sim.get_tick(),
                hash: self.sim.state_hash(),
            }],
            Command::Quit => vec![Response::Bye],
        }
    }

    fn handle_tick(&mut self, count: u32) -> Vec<Response> {
        if self.sim.outcome().is_over() {
            return vec![Response::error("The siege is already decided", Some("tick"))];
        }

        let mut responses = vec![Response::ack("tick")];
        let mut decided = None;
        for _ in 0..count {
            let events = self.sim.tick();
            if !events.switches.is_empty() || !events.deaths.is_empty() {
                tracing::debug!(
                    tick = self.sim.get_tick(),
                    switches = events.switches.len(),
                    reversions = events.reversions.len(),
                    deaths = events.deaths.len(),
                    "Tick events"
                );
            }
            if let Some(outcome) = events.outcome {
                decided = Some(outcome);
                break;
            }
        }

        if self.config.auto_state_output {
            responses.push(Response::Status(self.sim.status()));
        }
        if let Some(outcome) = decided {
            responses.push(Response::GameOver {
                outcome,
                tick: self.sim.get_tick(),
                time_ms: self.sim.time_ms(),
            });
        }
        responses
    }

    /// Answer one raw input line. Returns the responses and whether the
    /// session should end.
    pub fn handle_line(&mut self, line: &str) -> (Vec<Response>, bool) {
        let line = line.trim();
        if line.is_empty() {
            return (Vec::new(), false);
        }
        match Command::from_json(line) {
            Ok(command) => {
                let quit = matches!(command, Command::Quit);
                (self.handle(&command), quit)
            }
            Err(e) => (vec![Response::error(format!("Parse error: {e}"), None)], false),
        }
    }

    /// Run a whole session: announce readiness, then answer every line of
    /// `input` until `quit` or end of input.
    pub fn run_session<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        write!(output, "{}", Response::ready(self.sim.get_tick()).to_json_line())?;
        output.flush()?;

        for line in input.lines() {
            let (responses, quit) = self.handle_line(&line?);
            for response in responses {
                write!(output, "{}", response.to_json_line())?;
            }
            output.flush()?;
            if quit {
                tracing::info!("Session ended by controller");
                return Ok(());
            }
        }

        tracing::info!("Input closed, ending session");
        Ok(())
    }

    /// Run the headless session on stdin/stdout.
    pub fn run(mut self) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.run_session(stdin.lock(), stdout.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siege_core::components::EnemyKind;
    use siege_core::math::Vec2Fixed;
    use siege_core::orders::Order;
    use siege_core::status::GameOutcome;
    use siege_core::structures::{AttackableType, Structure, StructureKind};

    fn parse_output(output: &[u8]) -> Vec<serde_json::Value> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_session_flow() {
        let mut runner = HeadlessRunner::with_config(HeadlessConfig::default()).unwrap();
        let input = concat!(
            r#"{"cmd":"tick","count":5}"#,
            "\n",
            "\n",
            r#"{"cmd":"hash"}"#,
            "\n",
            r#"{"cmd":"status"}"#,
            "\n",
            r#"{"cmd":"quit"}"#,
            "\n",
            r#"{"cmd":"tick"}"#,
            "\n",
        );
        let mut output = Vec::new();
        runner.run_session(input.as_bytes(), &mut output).unwrap();

        let lines = parse_output(&output);
        let types: Vec<&str> = lines.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["ready", "ack", "state_hash", "status", "bye"]);
        assert_eq!(lines[2]["tick"], 5);
        assert_eq!(lines[3]["time_ms"], 250);
        assert_eq!(runner.simulation().get_tick(), 5);
    }

    #[test]
    fn test_bad_input_reports_error_and_continues() {
        let mut runner = HeadlessRunner::with_config(HeadlessConfig::default()).unwrap();

        let (responses, quit) = runner.handle_line("{nonsense");
        assert!(!quit);
        assert!(matches!(&responses[..], [Response::Error { cmd: None, .. }]));

        let (responses, _) = runner.handle_line(r#"{"cmd":"tick"}"#);
        assert!(matches!(&responses[..], [Response::Ack { .. }]));
    }

    #[test]
    fn test_rejected_order_is_an_error_response() {
        let mut runner = HeadlessRunner::with_config(HeadlessConfig::default()).unwrap();
        let responses = runner.handle(&Command::Order {
            order: Order::AttackTarget {
                unit: 9_999,
                target: 1,
            },
        });
        match &responses[..] {
            [Response::Error { message, cmd }] => {
                assert_eq!(cmd.as_deref(), Some("order"));
                assert!(message.contains("9999"));
            }
            other => panic!("unexpected responses: {other:?}"),
        }
    }

    #[test]
    fn test_auto_state_and_game_over() {
        let mut sim = Simulation::new();
        sim.spawn_structure(
            Structure::new(StructureKind::Barracks)
                .with_attackable(AttackableType::Auto)
                .critical(),
            Vec2Fixed::from_ints(0, 0),
            1,
        );
        sim.spawn_enemy(EnemyKind::Brute, Vec2Fixed::from_ints(5, 0));

        let config = HeadlessConfig {
            auto_state_output: true,
            ..Default::default()
        };
        let mut runner = HeadlessRunner::from_simulation(sim, config);

        let responses = runner.handle(&Command::Tick { count: 10 });
        assert!(matches!(responses[0], Response::Ack { .. }));
        assert!(matches!(responses[1], Response::Status(_)));
        assert!(matches!(
            responses[2],
            Response::GameOver {
                outcome: GameOutcome::Defeat,
                tick: 1,
                ..
            }
        ));

        let responses = runner.handle(&Command::Tick { count: 1 });
        assert!(matches!(&responses[..], [Response::Error { .. }]));
    }

    #[test]
    fn test_config_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "(target_switch: (enabled: false))").unwrap();

        let config = HeadlessConfig {
            config_path: Some(path),
            ..Default::default()
        };
        let scenario = config.load_scenario().unwrap();
        assert!(!scenario.config.target_switch.enabled);

        let missing = HeadlessConfig {
            config_path: Some(dir.path().join("missing.ron")),
            ..Default::default()
        };
        assert!(matches!(
            missing.load_scenario(),
            Err(RunnerError::Config(GameError::DataReadError { .. }))
        ));
    }
}
