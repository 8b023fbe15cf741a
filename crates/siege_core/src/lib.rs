//! # Siege Core
//!
//! Deterministic simulation core for Crystal Siege, a base-defence game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No network or stdin/stdout IO
//! - No system randomness
//! - No floating-point math inside the simulation (uses fixed-point)
//!
//! The interesting part is how enemies pick and change targets: an enemy
//! that gets hit may turn on its attacker, subject to a per-kind
//! [`config::ResolvedSwitchPolicy`], and gives up the chase once the
//! attacker gets away. Defensive structures only count as targets once a
//! friendly unit has been deployed into them.
//!
//! ## Crate Structure
//!
//! - [`components`] - ECS component definitions
//! - [`structures`] - Structures and their deployment slots
//! - [`config`] - Target-switch policy and enemy profiles
//! - [`targeting`] - Switch, reversion and acquisition decisions
//! - [`systems`] - Movement, combat and health systems
//! - [`orders`] - Player orders for friendly units
//! - [`simulation`] - Core simulation loop
//! - [`status`] - Read-only game snapshots
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod components;
pub mod config;
pub mod error;
pub mod math;
pub mod orders;
pub mod simulation;
pub mod status;
pub mod structures;
pub mod systems;
pub mod targeting;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::{
        resolve_policy, EnemyProfile, ResolvedSwitchPolicy, SimulationConfig, TargetSwitchConfig,
        TargetSwitchOverride,
    };
    pub use crate::error::{GameError, Result};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::orders::{Order, OrderError};
    pub use crate::simulation::{ScheduledSpawn, Simulation, TickEvents};
    pub use crate::status::{GameOutcome, GameStatus};
    pub use crate::structures::{AttackableType, DeployError, Structure, StructureKind};
    pub use crate::targeting::{SwitchEvaluation, SwitchReason};
}
