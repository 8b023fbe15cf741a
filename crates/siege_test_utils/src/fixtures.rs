//! Test fixtures and helpers.
//!
//! Pre-built sieges and entity configurations for consistent testing.

use fixed::types::I32F32;
use siege_core::components::{EnemyKind, EntityId};
use siege_core::math::Vec2Fixed;
use siege_core::simulation::{ScheduledSpawn, Simulation};
use siege_core::structures::{AttackableType, Structure, StructureKind};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a world point from whole-number coordinates.
#[must_use]
pub fn point(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// The crystal: a critical structure that is always a valid target.
#[must_use]
pub fn crystal() -> Structure {
    Structure::new(StructureKind::Barracks)
        .with_attackable(AttackableType::Auto)
        .critical()
}

/// Entity ids of a [`standard_siege`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiegeIds {
    /// The critical crystal.
    pub crystal: EntityId,
    /// Unmanned cannon next to the crystal.
    pub cannon: EntityId,
    /// Manned tower covering the approach.
    pub tower: EntityId,
    /// Gate in front of the base.
    pub gate: EntityId,
    /// Unit crewing the tower.
    pub gunner: EntityId,
    /// Free unit standing by the gate.
    pub guard: EntityId,
}

/// A small base on the right of the map with three waves coming from the left.
///
/// Layout: crystal at (400, 0), cannon at (380, 30), tower at (340, -40) with
/// a unit inside, gate at (300, 0), a second unit at (320, 10). Waves of
/// grunts, archers and a brute arrive at 0 ms, 2 s and 5 s.
#[must_use]
pub fn standard_siege() -> (Simulation, SiegeIds) {
    let mut sim = Simulation::new();

    let crystal_id = sim.spawn_structure(crystal(), point(400, 0), 1000);
    let cannon = sim.spawn_structure(Structure::new(StructureKind::Cannon), point(380, 30), 300);

    let gunner = sim.spawn_defender(point(340, -40));
    let mut tower = Structure::new(StructureKind::Tower);
    tower
        .deploy(gunner)
        .expect("a fresh tower takes a unit");
    let tower_id = sim.spawn_structure(tower, point(340, -40), 250);
    if let Some(unit) = sim.get_entity_mut(gunner) {
        unit.deployed_in = Some(tower_id);
    }

    let gate = sim.spawn_structure(Structure::new(StructureKind::Gate), point(300, 0), 600);
    let guard = sim.spawn_defender(point(320, 10));

    let mut waves = Vec::new();
    for i in 0..4 {
        waves.push(ScheduledSpawn {
            at_ms: 0,
            kind: EnemyKind::Grunt,
            position: point(0, i * 20 - 30),
        });
    }
    for i in 0..3 {
        waves.push(ScheduledSpawn {
            at_ms: 2_000,
            kind: EnemyKind::Archer,
            position: point(0, i * 25 - 25),
        });
    }
    waves.push(ScheduledSpawn {
        at_ms: 5_000,
        kind: EnemyKind::Brute,
        position: point(0, 0),
    });
    sim.set_pending_spawns(waves);

    (
        sim,
        SiegeIds {
            crystal: crystal_id,
            cannon,
            tower: tower_id,
            gate,
            gunner,
            guard,
        },
    )
}

/// One enemy of `kind` at the origin, busy with a wall right next to it,
/// and a friendly unit `distance` units away (at least 2) on its flank.
///
/// The unit only opens fire when `distance` is within its attack range.
/// Returns the simulation and the ids of `(enemy, wall, defender)`.
#[must_use]
pub fn ambush(kind: EnemyKind, distance: i32) -> (Simulation, EntityId, EntityId, EntityId) {
    let mut sim = Simulation::new();
    let wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(1, 0), 5_000);
    let enemy = sim.spawn_enemy(kind, point(0, 0));
    let defender = sim.spawn_defender(point(0, distance.max(2)));
    (sim, enemy, wall, defender)
}
