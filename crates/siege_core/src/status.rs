//! Read-only snapshots of the game for the outside world.
//!
//! [`GameStatus`] is what a host page asks for when it wants to know what is
//! going on: it is plain data with floating-point coordinates and string
//! kinds, meant for JSON rather than for feeding back into the simulation.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Team};

/// How the siege is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    /// Still being fought.
    #[default]
    InProgress,
    /// Every enemy wave has been beaten.
    Victory,
    /// A critical structure fell.
    Defeat,
}

impl GameOutcome {
    /// Whether the game has been decided.
    #[must_use]
    pub const fn is_over(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// One entity as seen from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStatus {
    /// Entity id.
    pub id: EntityId,
    /// Side it fights for.
    pub team: Team,
    /// `"unit"`, an enemy kind such as `"grunt"`, or a structure kind such as `"cannon"`.
    pub kind: String,
    /// World x coordinate.
    pub x: f64,
    /// World y coordinate.
    pub y: f64,
    /// Current health.
    pub health: u32,
    /// Maximum health.
    pub max_health: u32,
    /// What it is attacking, if anything.
    pub target: Option<EntityId>,
    /// Whether it is chasing an attacker it switched to.
    pub pursuing: bool,
    /// The standing order it is carrying out, if any.
    pub command: Option<String>,
    /// Structure this unit is deployed in.
    pub deployed_in: Option<EntityId>,
    /// Unit deployed in this structure.
    pub deployed_unit: Option<EntityId>,
    /// Losing this structure loses the game.
    pub critical: bool,
}

/// Snapshot of the whole game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStatus {
    /// Current tick.
    pub tick: u64,
    /// Simulated time in milliseconds.
    pub time_ms: u64,
    /// Win/loss state.
    pub outcome: GameOutcome,
    /// Every living entity, in id order.
    pub entities: Vec<EntityStatus>,
    /// Friendly units that died and can be revived.
    pub fallen: Vec<EntityId>,
    /// Enemies still alive.
    pub enemies_remaining: usize,
    /// Enemies scheduled but not yet spawned.
    pub pending_spawns: usize,
    /// Deterministic hash of the full simulation state.
    pub state_hash: u64,
}

impl GameStatus {
    /// Look up one entity by id.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntityStatus> {
        self.entities.iter().find(|e| e.id == id)
    }
}
