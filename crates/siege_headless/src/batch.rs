//! Non-interactive runs: play a scenario to the end, or play it several
//! times side by side to check determinism.
//!
//! Verification runs are spread over threads with rayon; each run keeps
//! its per-tick state hashes so the first divergent tick can be reported.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use siege_core::simulation::Simulation;
use siege_core::status::{GameOutcome, GameStatus};
use tracing::{info, warn};

use crate::scenario::{Scenario, ScenarioError};

/// Result of playing one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// How it ended; `in_progress` if the tick limit was hit first.
    pub outcome: GameOutcome,
    /// Ticks actually simulated.
    pub ticks: u64,
    /// Total target switches over the run.
    pub switches: u32,
    /// Total reversions over the run.
    pub reversions: u32,
    /// Total deaths over the run.
    pub deaths: u32,
    /// Final snapshot.
    pub status: GameStatus,
}

/// Play `sim` until it is decided or `max_ticks` have passed.
pub fn run_to_completion(sim: &mut Simulation, max_ticks: u64) -> RunSummary {
    let mut switches = 0;
    let mut reversions = 0;
    let mut deaths = 0;

    while sim.get_tick() < max_ticks && !sim.outcome().is_over() {
        let events = sim.tick();
        switches += events.switches.len() as u32;
        reversions += events.reversions.len() as u32;
        deaths += events.deaths.len() as u32;
    }

    let status = sim.status();
    info!(
        outcome = ?status.outcome,
        ticks = status.tick,
        switches,
        reversions,
        deaths,
        "Run finished"
    );
    RunSummary {
        outcome: status.outcome,
        ticks: status.tick,
        switches,
        reversions,
        deaths,
        status,
    }
}

/// Build and play a scenario. `max_ticks` overrides the scenario's limit.
pub fn simulate(scenario: &Scenario, max_ticks: Option<u64>) -> Result<RunSummary, ScenarioError> {
    let mut sim = scenario.build()?;
    Ok(run_to_completion(
        &mut sim,
        max_ticks.unwrap_or(scenario.max_ticks),
    ))
}

/// Result of a determinism check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Number of runs compared.
    pub runs: u32,
    /// Ticks simulated by the reference run.
    pub ticks: u64,
    /// Final state hash of each run.
    pub final_hashes: Vec<u64>,
    /// First tick at which some run disagreed with the first, if any.
    pub first_divergence: Option<u64>,
}

impl VerifyReport {
    /// Whether every run produced the same history.
    pub fn is_deterministic(&self) -> bool {
        self.first_divergence.is_none()
    }
}

fn hash_history(scenario: &Scenario, max_ticks: u64) -> Result<Vec<u64>, ScenarioError> {
    let mut sim = scenario.build()?;
    let mut hashes = vec![sim.state_hash()];
    while sim.get_tick() < max_ticks && !sim.outcome().is_over() {
        sim.tick();
        hashes.push(sim.state_hash());
    }
    Ok(hashes)
}

/// Play `scenario` `runs` times in parallel and compare every tick's hash.
pub fn verify_determinism(
    scenario: &Scenario,
    runs: u32,
    max_ticks: Option<u64>,
) -> Result<VerifyReport, ScenarioError> {
    let max_ticks = max_ticks.unwrap_or(scenario.max_ticks);
    let histories = (0..runs.max(1))
        .into_par_iter()
        .map(|_| hash_history(scenario, max_ticks))
        .collect::<Result<Vec<_>, _>>()?;

    let reference = &histories[0];
    let first_divergence = histories[1..]
        .iter()
        .filter_map(|history| {
            let common = reference.len().min(history.len());
            (0..common)
                .find(|&tick| reference[tick] != history[tick])
                .or((reference.len() != history.len()).then_some(common))
        })
        .min()
        .map(|tick| tick as u64);

    if let Some(tick) = first_divergence {
        warn!(tick, "Runs diverged");
    }

    Ok(VerifyReport {
        runs: histories.len() as u32,
        ticks: reference.len() as u64 - 1,
        final_hashes: histories
            .iter()
            .filter_map(|history| history.last().copied())
            .collect(),
        first_divergence,
    })
}
