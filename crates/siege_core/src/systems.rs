//! Simulation systems.
//!
//! Systems contain the logic that processes components.
//! Each system should do one thing well.
//!
//! All systems are pure functions that operate on component data.
//! They use fixed-point math for deterministic simulation. The
//! [`crate::simulation::Simulation`] gathers component borrows in entity id
//! order and feeds them through these functions.

use crate::components::{CombatStats, EntityId, Health, Movement, Position, Velocity};
use crate::math::Vec2Fixed;

/// Updates entity positions based on their velocities.
///
/// This is the core movement integration step. Each entity's position
/// is updated by adding its velocity (which represents units per tick).
pub fn movement_system(entities: &mut [(EntityId, &mut Position, &Velocity)]) {
    for (_entity_id, position, velocity) in entities.iter_mut() {
        position.value = position.value + velocity.value;
    }
}

/// Turns movement destinations into velocities.
///
/// Each entity heads straight for its destination at its movement speed
/// and never overshoots: on the final tick the velocity is exactly the
/// remaining offset. Entities without a destination, or already on it,
/// stop.
pub fn steering_system(entities: &mut [(EntityId, &Position, &Movement, &mut Velocity)]) {
    for (_entity_id, position, movement, velocity) in entities.iter_mut() {
        velocity.value = match movement.destination {
            Some(destination) if destination != position.value => {
                position.value.step_towards(destination, movement.speed) - position.value
            }
            _ => Vec2Fixed::ZERO,
        };
    }
}

/// Processes health and identifies dead entities for removal.
///
/// Scans all entities with health components and returns a list of
/// entity IDs that should be removed (health <= 0).
pub fn health_system(entities: &[(EntityId, &Health)]) -> Vec<EntityId> {
    entities
        .iter()
        .filter(|(_id, health)| health.is_dead())
        .map(|(id, _)| *id)
        .collect()
}

/// Position lookup helper for combat system.
pub struct PositionLookup<'a> {
    positions: &'a [(EntityId, Position)],
}

impl<'a> PositionLookup<'a> {
    /// Create a new position lookup from a slice of entity positions.
    ///
    /// The slice must be sorted by entity id.
    pub fn new(positions: &'a [(EntityId, Position)]) -> Self {
        Self { positions }
    }

    /// Get the position of an entity by ID.
    pub fn get(&self, entity_id: EntityId) -> Option<Position> {
        self.positions
            .binary_search_by_key(&entity_id, |(id, _)| *id)
            .ok()
            .map(|index| self.positions[index].1)
    }
}

/// Result of combat processing for a single attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageEvent {
    /// The entity dealing damage.
    pub attacker: EntityId,
    /// The entity receiving damage.
    pub target: EntityId,
    /// Amount of damage dealt.
    pub damage: u32,
    /// Whether the hit was fatal.
    pub killed: bool,
}

/// Apply a hit to `health` and record who dealt it.
///
/// The record is overwritten by every hit, so when several attackers land
/// in the same tick only the last one is remembered. Returns the damage
/// actually applied.
pub fn record_damage(health: &mut Health, source: EntityId, amount: u32, now_ms: u64) -> u32 {
    let actual = health.apply_damage(amount);
    health.record_hit(source, now_ms, actual);
    actual
}

/// Resolve one attacker's swing at its target.
///
/// Ticks the attacker's cooldown down, then, if the target is within
/// range and the weapon is ready, damages the target, records the hit and
/// restarts the cooldown.
pub fn resolve_attack(
    attacker: (EntityId, Position, &mut CombatStats),
    target: (EntityId, Position, &mut Health),
    now_ms: u64,
) -> Option<DamageEvent> {
    let (attacker_id, attacker_pos, stats) = attacker;
    let (target_id, target_pos, health) = target;

    stats.tick_cooldown();

    if health.is_dead() || !attacker_pos.value.within(target_pos.value, stats.range) {
        return None;
    }
    if !stats.can_attack() {
        return None;
    }

    let damage = record_damage(health, attacker_id, stats.damage, now_ms);
    stats.reset_cooldown();

    Some(DamageEvent {
        attacker: attacker_id,
        target: target_id,
        damage,
        killed: health.is_dead(),
    })
}
