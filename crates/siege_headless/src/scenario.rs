//! Scenario loading and configuration.
//!
//! Scenarios define the starting layout of a siege for headless runs: the
//! simulation config, the structures and friendly units already on the
//! field, and the enemy waves that will arrive.

use std::path::Path;

use serde::{Deserialize, Serialize};
use siege_core::components::{EnemyKind, EntityId};
use siege_core::config::SimulationConfig;
use siege_core::math::Vec2Fixed;
use siege_core::simulation::{ScheduledSpawn, Simulation, TICK_RATE};
use siege_core::structures::{AttackableType, Structure, StructureKind};
use thiserror::Error;

/// Default time limit: ten minutes of game time.
pub const DEFAULT_MAX_TICKS: u64 = 10 * 60 * TICK_RATE as u64;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The scenario parsed but describes an impossible layout.
    #[error("Invalid scenario: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Simulation settings.
    #[serde(default)]
    pub config: SimulationConfig,
    /// Structures on the field at the start.
    #[serde(default)]
    pub structures: Vec<StructurePlacement>,
    /// Free friendly units at the start.
    #[serde(default)]
    pub defenders: Vec<DefenderPlacement>,
    /// Enemy arrivals.
    #[serde(default)]
    pub spawns: Vec<SpawnWave>,
    /// Give up after this many ticks.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

fn default_max_ticks() -> u64 {
    DEFAULT_MAX_TICKS
}

impl Default for Scenario {
    fn default() -> Self {
        Self::standard()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// A small siege: one crystal behind a gate, a crewed tower, an
    /// unmanned cannon and three waves.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            name: "Standard Siege".to_string(),
            description: "Crystal behind a gate, three enemy waves".to_string(),
            config: SimulationConfig::default(),
            structures: vec![
                StructurePlacement::new(StructureKind::Barracks, 400, 0, 1_000)
                    .critical()
                    .with_attackable(AttackableType::Auto),
                StructurePlacement::new(StructureKind::Cannon, 380, 30, 300),
                StructurePlacement::new(StructureKind::Tower, 340, -40, 250).crewed(),
                StructurePlacement::new(StructureKind::Gate, 300, 0, 800),
            ],
            defenders: vec![DefenderPlacement::new(320, 10)],
            spawns: vec![
                SpawnWave::new(EnemyKind::Grunt, 0, 0, 0, 4),
                SpawnWave::new(EnemyKind::Archer, 0, 40, 2_000, 3),
                SpawnWave::new(EnemyKind::Brute, 0, -20, 5_000, 1),
            ],
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }

    /// Every problem that would make [`Scenario::build`] fail or produce a
    /// siege that can never be decided.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (index, placement) in self.structures.iter().enumerate() {
            let kind = placement.kind.as_str();
            if placement.max_health == 0 {
                problems.push(format!("structure {index} ({kind}) has no health"));
            }
            let attackable = placement
                .attackable
                .unwrap_or_else(|| placement.kind.default_attackable());
            if placement.crewed && attackable != AttackableType::WithUnit {
                problems.push(format!(
                    "structure {index} ({kind}) is crewed but does not take a unit"
                ));
            }
        }
        if !self.structures.iter().any(|s| s.critical) {
            problems.push("no critical structure, the siege cannot be lost".to_string());
        }
        if self.spawns.iter().all(|wave| wave.count == 0) {
            problems.push("no enemies are ever spawned, the siege cannot be won".to_string());
        }
        if self.max_ticks == 0 {
            problems.push("max_ticks is zero".to_string());
        }

        problems
    }

    /// Check the scenario for problems.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ScenarioError::Invalid(problems))
        }
    }

    /// Build a ready-to-run simulation from this scenario.
    ///
    /// Structures are spawned first, in file order, then their crews, then
    /// the free defenders; enemy waves are scheduled.
    pub fn build(&self) -> Result<Simulation, ScenarioError> {
        self.validate()?;

        let mut sim = Simulation::with_config(self.config.clone());

        let mut crewed: Vec<(EntityId, Vec2Fixed)> = Vec::new();
        for placement in &self.structures {
            let position = placement.position();
            let id = sim.spawn_structure(placement.structure(), position, placement.max_health);
            if placement.crewed {
                crewed.push((id, position));
            }
        }

        for (structure_id, position) in crewed {
            let unit = sim.spawn_defender(position);
            let deployed = sim
                .get_entity_mut(structure_id)
                .and_then(|entity| entity.structure.as_mut())
                .map(|structure| structure.deploy(unit));
            match deployed {
                Some(Ok(())) => {
                    if let Some(entity) = sim.get_entity_mut(unit) {
                        entity.deployed_in = Some(structure_id);
                    }
                }
                Some(Err(err)) => {
                    return Err(ScenarioError::Invalid(vec![format!(
                        "cannot crew structure {structure_id}: {err}"
                    )]));
                }
                None => {}
            }
        }

        for defender in &self.defenders {
            sim.spawn_defender(defender.position());
        }

        let mut spawns = Vec::new();
        for wave in &self.spawns {
            for _ in 0..wave.count {
                spawns.push(ScheduledSpawn {
                    at_ms: wave.at_ms,
                    kind: wave.kind,
                    position: wave.position(),
                });
            }
        }
        sim.set_pending_spawns(spawns);

        tracing::info!(
            scenario = %self.name,
            entities = sim.entities().len(),
            pending = sim.pending_spawns().len(),
            "Scenario built"
        );
        Ok(sim)
    }
}

/// Placement of a structure at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructurePlacement {
    /// Structure kind.
    pub kind: StructureKind,
    /// Position (x, y).
    pub position: (i32, i32),
    /// Starting (and maximum) health.
    pub max_health: u32,
    /// Losing this structure loses the game.
    #[serde(default)]
    pub critical: bool,
    /// Overrides the kind's default deployment gate.
    #[serde(default)]
    pub attackable: Option<AttackableType>,
    /// Start with a friendly unit already deployed inside.
    #[serde(default)]
    pub crewed: bool,
}

impl StructurePlacement {
    /// Create a new structure placement.
    #[must_use]
    pub fn new(kind: StructureKind, x: i32, y: i32, max_health: u32) -> Self {
        Self {
            kind,
            position: (x, y),
            max_health,
            critical: false,
            attackable: None,
            crewed: false,
        }
    }

    /// Mark as critical.
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Override the deployment gate.
    #[must_use]
    pub fn with_attackable(mut self, attackable: AttackableType) -> Self {
        self.attackable = Some(attackable);
        self
    }

    /// Start with a unit inside.
    #[must_use]
    pub fn crewed(mut self) -> Self {
        self.crewed = true;
        self
    }

    fn position(&self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.position.0, self.position.1)
    }

    fn structure(&self) -> Structure {
        let mut structure = Structure::new(self.kind);
        if let Some(attackable) = self.attackable {
            structure = structure.with_attackable(attackable);
        }
        if self.critical {
            structure = structure.critical();
        }
        structure
    }
}

/// Placement of a free friendly unit at scenario start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DefenderPlacement {
    /// Position (x, y).
    pub position: (i32, i32),
}

impl DefenderPlacement {
    /// Create a new defender placement.
    #[must_use]
    pub fn new(x: i32, y: i32) -> Self {
        Self { position: (x, y) }
    }

    fn position(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.position.0, self.position.1)
    }
}

/// A group of identical enemies arriving together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SpawnWave {
    /// Enemy kind.
    pub kind: EnemyKind,
    /// Spawn point (x, y).
    pub position: (i32, i32),
    /// Arrival time in simulation milliseconds.
    pub at_ms: u64,
    /// Number of enemies.
    #[serde(default = "default_wave_count")]
    pub count: u32,
}

fn default_wave_count() -> u32 {
    1
}

impl SpawnWave {
    /// Create a new wave.
    #[must_use]
    pub fn new(kind: EnemyKind, x: i32, y: i32, at_ms: u64, count: u32) -> Self {
        Self {
            kind,
            position: (x, y),
            at_ms,
            count,
        }
    }

    fn position(self) -> Vec2Fixed {
        Vec2Fixed::from_ints(self.position.0, self.position.1)
    }
}
