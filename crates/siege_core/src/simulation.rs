//! Core simulation loop.
//!
//! The simulation runs at a fixed tick rate and processes all game logic
//! deterministically. It owns every entity of the siege (enemies, friendly
//! units and structures) and runs the systems in a fixed order each tick.
//!
//! # Determinism
//!
//! All operations in this module are fully deterministic:
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - No system randomness
//! - Consistent iteration order (sorted entity IDs)
//! - Same inputs always produce same outputs
//!
//! # Example
//!
//! ```
//! use siege_core::components::EnemyKind;
//! use siege_core::math::Vec2Fixed;
//! use siege_core::orders::Order;
//! use siege_core::simulation::Simulation;
//! use siege_core::structures::{Structure, StructureKind};
//!
//! let mut sim = Simulation::new();
//! let cannon = sim.spawn_structure(Structure::new(StructureKind::Cannon), Vec2Fixed::from_ints(0, 0), 300);
//! let gunner = sim.spawn_defender(Vec2Fixed::from_ints(10, 0));
//! sim.spawn_enemy(EnemyKind::Grunt, Vec2Fixed::from_ints(200, 0));
//!
//! sim.apply_order(Order::DeploymentTarget { unit: gunner, structure: cannon }).unwrap();
//! for _ in 0..10 {
//!     sim.tick();
//! }
//! assert_eq!(sim.get_entity(gunner).unwrap().deployed_in, Some(cannon));
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{
    AttackTarget, CombatStats, Command, EnemyKind, EntityId, Health, Movement, Position, Team,
    Velocity,
};
use crate::config::{PolicyTable, SimulationConfig};
use crate::error::{GameError, Result};
use crate::math::{Fixed, Vec2Fixed};
use crate::orders::{Order, OrderError};
use crate::status::{EntityStatus, GameOutcome, GameStatus};
use crate::structures::{Structure, StructureKind};
use crate::systems::{
    health_system, movement_system, resolve_attack, steering_system, DamageEvent, PositionLookup,
};
use crate::targeting::{
    acquire_target, apply_switch, evaluate_reversion, evaluate_switch, ReversionContext,
    ReversionDecision, SwitchContext, TargetCandidate,
};

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// Duration of one tick in milliseconds.
pub const TICK_DURATION_MS: u32 = 1000 / TICK_RATE;

/// Health of a standard friendly unit.
pub const DEFENDER_HEALTH: u32 = 100;

/// Movement speed of a standard friendly unit, in units per tick.
pub const DEFENDER_SPEED: i32 = 3;

/// Combat stats of a standard friendly unit.
#[must_use]
pub fn defender_combat_stats() -> CombatStats {
    CombatStats::new(12, Fixed::from_num(40), 15)
}

/// An entity with optional components.
///
/// Entities are composed of optional components. Only components that are
/// `Some` are active for this entity. This allows flexible entity composition
/// without a full ECS framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier for this entity.
    pub id: EntityId,
    /// Side this entity fights for.
    pub team: Team,
    /// World position (required for most entities).
    pub position: Option<Position>,
    /// Velocity for movement.
    pub velocity: Option<Velocity>,
    /// Health for damageable entities.
    pub health: Option<Health>,
    /// Movement capabilities.
    pub movement: Option<Movement>,
    /// Attack target tracking.
    pub attack_target: Option<AttackTarget>,
    /// Combat statistics.
    pub combat_stats: Option<CombatStats>,
    /// Enemy archetype; set for every attacker unit.
    pub enemy_kind: Option<EnemyKind>,
    /// Structure data; set for every structure.
    pub structure: Option<Structure>,
    /// Standing order for a friendly unit.
    pub command: Option<Command>,
    /// Structure this unit is deployed in.
    pub deployed_in: Option<EntityId>,
    /// Where a friendly unit comes back when revived.
    pub home: Option<Vec2Fixed>,
}

impl Entity {
    /// Create a new entity with the given ID and no components.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            team: Team::Defender,
            position: None,
            velocity: None,
            health: None,
            movement: None,
            attack_target: None,
            combat_stats: None,
            enemy_kind: None,
            structure: None,
            command: None,
            deployed_in: None,
            home: None,
        }
    }

    /// Whether the entity has health and it has run out.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.health.is_some_and(|h| h.is_dead())
    }

    /// Whether this is a mobile friendly unit that takes orders.
    #[must_use]
    pub fn is_friendly_unit(&self) -> bool {
        self.team == Team::Defender && self.structure.is_none() && self.movement.is_some()
    }

    /// Whether enemies may attack this entity.
    ///
    /// Friendly units qualify unless they sit inside a structure; structures
    /// qualify according to their deployment gate.
    #[must_use]
    pub fn is_enemy_target(&self) -> bool {
        if self.team != Team::Defender || self.is_dead() || self.position.is_none() {
            return false;
        }
        match self.structure {
            Some(structure) => structure.is_targetable(),
            None => self.deployed_in.is_none(),
        }
    }

    fn kind_name(&self) -> &'static str {
        if let Some(kind) = self.enemy_kind {
            kind.as_str()
        } else if let Some(structure) = self.structure {
            structure.kind.as_str()
        } else {
            "unit"
        }
    }
}

/// Parameters for spawning a new entity.
///
/// Use this struct to specify which components the new entity should have.
/// All fields are optional - only provide the components you need.
#[derive(Debug, Clone, Default)]
pub struct EntitySpawnParams {
    /// Side the entity fights for.
    pub team: Team,
    /// Initial position in world space.
    pub position: Option<Vec2Fixed>,
    /// Maximum health (entity starts at full health).
    pub health: Option<u32>,
    /// Movement speed (units per tick).
    pub movement: Option<Fixed>,
    /// Combat statistics.
    pub combat_stats: Option<CombatStats>,
    /// Enemy archetype.
    pub enemy_kind: Option<EnemyKind>,
    /// Structure data.
    pub structure: Option<Structure>,
}

/// An enemy waiting to enter the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledSpawn {
    /// Simulation time at which the enemy appears.
    pub at_ms: u64,
    /// What kind of enemy.
    pub kind: EnemyKind,
    /// Where it appears.
    pub position: Vec2Fixed,
}

/// Storage for all entities in the simulation.
///
/// Uses a `HashMap` for O(1) entity lookup by ID, with deterministic
/// iteration via sorted keys when processing systems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStorage {
    /// Map of entity ID to entity data.
    entities: HashMap<EntityId, Entity>,
    /// Next entity ID to assign.
    next_id: EntityId,
}

impl EntityStorage {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a new entity and return its ID.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    /// Put a previously removed entity back under its own ID.
    pub fn reinsert(&mut self, entity: Entity) {
        self.next_id = self.next_id.max(entity.id + 1);
        self.entities.insert(entity.id, entity);
    }

    /// Remove an entity by ID.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get sorted entity IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over all entities (not in deterministic order).
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entities.iter()
    }
}

/// An enemy turned on the entity that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSwitch {
    /// The enemy.
    pub unit: EntityId,
    /// What it was attacking before.
    pub from: Option<EntityId>,
    /// The attacker it now chases.
    pub to: EntityId,
    /// How threatening the attacker scored.
    pub priority: u32,
}

/// An enemy gave up chasing an attacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetReversion {
    /// The enemy.
    pub unit: EntityId,
    /// Whether it went back to its old target or picked a new one.
    pub decision: ReversionDecision,
    /// What it attacks now.
    pub target: Option<EntityId>,
}

/// Events generated during a simulation tick.
///
/// These events can be used by the game layer to trigger effects,
/// sounds, animations, etc.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Damage events from combat.
    pub damage_events: Vec<DamageEvent>,
    /// Enemies that switched to their attacker.
    pub switches: Vec<TargetSwitch>,
    /// Enemies that stopped pursuing.
    pub reversions: Vec<TargetReversion>,
    /// Units that entered a structure, as `(unit, structure)`.
    pub deployments: Vec<(EntityId, EntityId)>,
    /// Entities that died this tick.
    pub deaths: Vec<EntityId>,
    /// Entities spawned this tick.
    pub spawned: Vec<EntityId>,
    /// Set on the tick the game is decided.
    pub outcome: Option<GameOutcome>,
}

/// The core siege simulation.
///
/// This struct owns all game state and provides methods to advance the
/// simulation deterministically.
///
/// # System Execution Order
///
/// Each tick, systems run in this order:
/// 1. **Spawning** - Scheduled enemies whose time has come enter the field
/// 2. **Acquisition** - Idle entities pick a target
/// 3. **Combat** - Attacks land, damage sources are recorded
/// 4. **Target switching** - Damaged enemies may turn on their attacker
/// 5. **Reversion** - Pursuing enemies may give up the chase
/// 6. **Steering and movement** - Destinations become velocities, positions update
/// 7. **Deployment** - Units that reached their structure get in
/// 8. **Health** - Dead entities are removed, structures eject their crew
/// 9. **Outcome** - Victory or defeat is decided
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    /// Current simulation tick.
    tick: u64,
    /// Configuration the simulation was built with.
    config: SimulationConfig,
    /// Target-switch policies resolved from `config`.
    policies: PolicyTable,
    /// All entities in the simulation.
    entities: EntityStorage,
    /// Friendly units that died, kept for revival.
    fallen: BTreeMap<EntityId, Entity>,
    /// Enemies still to spawn, ordered by time.
    pending_spawns: Vec<ScheduledSpawn>,
    /// Total enemies spawned so far.
    enemies_spawned: u64,
    /// Win/loss state.
    outcome: GameOutcome,
}

impl Simulation {
    /// Create a new empty simulation with the default configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use siege_core::simulation::Simulation;
    ///
    /// let sim = Simulation::new();
    /// assert_eq!(sim.get_tick(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SimulationConfig::default())
    }

    /// Create a new empty simulation.
    ///
    /// Target-switch policies for every enemy kind are resolved here, once.
    #[must_use]
    pub fn with_config(config: SimulationConfig) -> Self {
        let policies = PolicyTable::from_config(&config);
        Self {
            tick: 0,
            config,
            policies,
            entities: EntityStorage::new(),
            fallen: BTreeMap::new(),
            pending_spawns: Vec::new(),
            enemies_spawned: 0,
            outcome: GameOutcome::InProgress,
        }
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Simulated time at the start of the current tick, in milliseconds.
    #[must_use]
    pub const fn time_ms(&self) -> u64 {
        self.tick * TICK_DURATION_MS as u64
    }

    /// The configuration this simulation runs with.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The resolved target-switch policies.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Get a reference to the entity storage.
    #[must_use]
    pub fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Get a mutable entity by ID.
    ///
    /// Intended for scenario setup and tests; changes bypass every rule the
    /// systems enforce.
    pub fn get_entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Friendly units waiting to be revived.
    #[must_use]
    pub fn fallen(&self) -> &BTreeMap<EntityId, Entity> {
        &self.fallen
    }

    /// Win/loss state.
    #[must_use]
    pub const fn outcome(&self) -> GameOutcome {
        self.outcome
    }

    /// Enemies still waiting to spawn.
    #[must_use]
    pub fn pending_spawns(&self) -> &[ScheduledSpawn] {
        &self.pending_spawns
    }

    /// Schedule an enemy to appear at `spawn.at_ms`.
    pub fn schedule_spawn(&mut self, spawn: ScheduledSpawn) {
        let index = self.pending_spawns.partition_point(|s| s.at_ms <= spawn.at_ms);
        self.pending_spawns.insert(index, spawn);
    }

    /// Replace the spawn schedule.
    pub fn set_pending_spawns(&mut self, mut spawns: Vec<ScheduledSpawn>) {
        spawns.sort_by_key(|s| s.at_ms);
        self.pending_spawns = spawns;
    }

    /// Advance the simulation by one tick.
    ///
    /// Runs all systems in deterministic order and increments the tick
    /// counter. Once the game is decided the simulation is frozen: the tick
    /// counter stops and no events are produced.
    ///
    /// # Example
    ///
    /// ```
    /// use siege_core::simulation::Simulation;
    ///
    /// let mut sim = Simulation::new();
    /// let events = sim.tick();
    /// assert!(events.deaths.is_empty());
    /// assert_eq!(sim.get_tick(), 1);
    /// ```
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        if self.outcome.is_over() {
            return events;
        }

        let now_ms = self.time_ms();

        // 1. Spawning
        events.spawned = self.run_spawn_system(now_ms);

        // Get sorted entity IDs for deterministic processing
        let entity_ids = self.entities.sorted_ids();

        // 2. Acquisition
        self.run_acquisition_system(&entity_ids);

        // 3. Combat
        events.damage_events = self.run_combat_system(&entity_ids, now_ms);

        // 4. Target switching
        events.switches = self.run_target_switch_system(&entity_ids, now_ms);

        // 5. Reversion
        events.reversions = self.run_reversion_system(&entity_ids, now_ms);

        // 6. Steering and movement
        self.run_steering_system(&entity_ids);
        self.run_movement_system(&entity_ids);

        // 7. Deployment
        events.deployments = self.run_deployment_system(&entity_ids);

        // 8. Health
        events.deaths = self.run_health_system(&entity_ids);
        let lost_critical = self.remove_dead(&events.deaths);

        // 9. Outcome
        events.outcome = self.update_outcome(lost_critical);

        self.tick += 1;

        #[cfg(feature = "debug-validation")]
        if let Err(err) = self.validate_deployments() {
            tracing::error!(tick = self.tick, error = %err, "Deployment bookkeeping broken");
        }

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::trace!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    fn run_spawn_system(&mut self, now_ms: u64) -> Vec<EntityId> {
        let due = self
            .pending_spawns
            .partition_point(|spawn| spawn.at_ms <= now_ms);
        let spawns: Vec<ScheduledSpawn> = self.pending_spawns.drain(..due).collect();
        spawns
            .into_iter()
            .map(|spawn| self.spawn_enemy(spawn.kind, spawn.position))
            .collect()
    }

    /// Everything enemies may currently attack.
    fn enemy_target_candidates(&self, entity_ids: &[EntityId]) -> Vec<TargetCandidate> {
        entity_ids
            .iter()
            .filter_map(|&id| self.entities.get(id))
            .filter(|entity| entity.is_enemy_target())
            .filter_map(|entity| {
                entity.position.map(|pos| TargetCandidate {
                    id: entity.id,
                    position: pos.value,
                    structure: entity.structure.map(|s| s.kind),
                })
            })
            .collect()
    }

    /// Every living enemy, as seen by the defence.
    fn defender_target_candidates(&self, entity_ids: &[EntityId]) -> Vec<TargetCandidate> {
        entity_ids
            .iter()
            .filter_map(|&id| self.entities.get(id))
            .filter(|entity| entity.enemy_kind.is_some() && !entity.is_dead())
            .filter_map(|entity| {
                entity.position.map(|pos| TargetCandidate {
                    id: entity.id,
                    position: pos.value,
                    structure: None,
                })
            })
            .collect()
    }

    /// Position of `id` if enemies may attack it.
    fn enemy_target_position(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.entities
            .get(id)
            .filter(|entity| entity.is_enemy_target())
            .and_then(|entity| entity.position)
            .map(|pos| pos.value)
    }

    /// Position of `id` if it is a living enemy.
    fn enemy_position(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.entities
            .get(id)
            .filter(|entity| entity.enemy_kind.is_some() && !entity.is_dead())
            .and_then(|entity| entity.position)
            .map(|pos| pos.value)
    }

    /// Position of `id` if it exists and is alive.
    fn living_position(&self, id: EntityId) -> Option<Vec2Fixed> {
        self.entities
            .get(id)
            .filter(|entity| !entity.is_dead())
            .and_then(|entity| entity.position)
            .map(|pos| pos.value)
    }

    /// Give idle enemies, active structures and idle friendly units a target.
    fn run_acquisition_system(&mut self, entity_ids: &[EntityId]) {
        let enemy_targets = self.enemy_target_candidates(entity_ids);
        let defender_targets = self.defender_target_candidates(entity_ids);

        for &id in entity_ids {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let (Some(position), Some(attack_target), Some(stats)) =
                (entity.position, entity.attack_target, entity.combat_stats)
            else {
                continue;
            };
            if entity.is_dead() || entity.deployed_in.is_some() {
                continue;
            }

            let in_range = |target: EntityId| {
                self.enemy_position(target)
                    .is_some_and(|pos| position.value.within(pos, stats.range))
            };

            let new_target = if let Some(kind) = entity.enemy_kind {
                if attack_target.is_pursuing()
                    || attack_target
                        .target
                        .is_some_and(|t| self.enemy_target_position(t).is_some())
                {
                    continue;
                }
                let profile = self.config.profile_for(kind);
                acquire_target(
                    position.value,
                    &enemy_targets,
                    &profile.structure_priority,
                    None,
                )
            } else if let Some(structure) = entity.structure {
                if !structure.is_active() {
                    None
                } else if attack_target.target.is_some_and(in_range) {
                    continue;
                } else {
                    acquire_target(position.value, &defender_targets, &[], Some(stats.range))
                }
            } else {
                match entity.command {
                    Some(Command::Attack(target)) => {
                        self.enemy_position(target).map(|_| target)
                    }
                    Some(Command::MoveTo(_) | Command::Deploy(_)) => None,
                    Some(Command::Guard(_)) | None => {
                        if attack_target.target.is_some_and(in_range) {
                            continue;
                        }
                        acquire_target(position.value, &defender_targets, &[], Some(stats.range))
                    }
                }
            };

            if new_target != attack_target.target {
                if let Some(target) = self
                    .entities
                    .get_mut(id)
                    .and_then(|e| e.attack_target.as_mut())
                {
                    target.target = new_target;
                }
            }
        }
    }

    /// Run the combat system on all applicable entities.
    fn run_combat_system(&mut self, entity_ids: &[EntityId], now_ms: u64) -> Vec<DamageEvent> {
        // Build position lookup
        let positions: Vec<(EntityId, Position)> = entity_ids
            .iter()
            .filter_map(|&id| {
                self.entities
                    .get(id)
                    .and_then(|e| e.position.map(|p| (id, p)))
            })
            .collect();
        let pos_lookup = PositionLookup::new(&positions);

        let mut all_damage_events = Vec::new();

        // Process attackers one at a time to avoid borrow issues
        for &attacker_id in entity_ids {
            let attacker_data = {
                let Some(entity) = self.entities.get(attacker_id) else {
                    continue;
                };
                if entity.is_dead()
                    || entity.deployed_in.is_some()
                    || entity.structure.is_some_and(|s| !s.is_active())
                {
                    continue;
                }
                let (Some(position), Some(attack_target), Some(combat_stats)) =
                    (entity.position, entity.attack_target, entity.combat_stats)
                else {
                    continue;
                };
                (
                    position,
                    attack_target,
                    combat_stats,
                    entity.enemy_kind.is_some(),
                )
            };

            let (position, mut attack_target, mut combat_stats, is_enemy) = attacker_data;

            let target = attack_target
                .target
                .filter(|&t| {
                    if is_enemy {
                        self.enemy_target_position(t).is_some()
                    } else {
                        self.enemy_position(t).is_some()
                    }
                })
                .and_then(|t| pos_lookup.get(t).map(|p| (t, p)));

            match target {
                Some((target_id, target_pos)) => {
                    let target_health = self
                        .entities
                        .get_mut(target_id)
                        .and_then(|e| e.health.as_mut());
                    match target_health {
                        Some(health) => {
                            if let Some(event) = resolve_attack(
                                (attacker_id, position, &mut combat_stats),
                                (target_id, target_pos, health),
                                now_ms,
                            ) {
                                if event.killed {
                                    attack_target.clear();
                                }
                                all_damage_events.push(event);
                            }
                        }
                        None => combat_stats.tick_cooldown(),
                    }
                }
                None => {
                    // Target gone, dead or no longer attackable
                    attack_target.clear();
                    combat_stats.tick_cooldown();
                }
            }

            // Update attacker's components
            if let Some(entity) = self.entities.get_mut(attacker_id) {
                entity.attack_target = Some(attack_target);
                entity.combat_stats = Some(combat_stats);
            }
        }

        all_damage_events
    }

    /// Let every damaged enemy decide whether to turn on its attacker.
    fn run_target_switch_system(
        &mut self,
        entity_ids: &[EntityId],
        now_ms: u64,
    ) -> Vec<TargetSwitch> {
        let mut switches = Vec::new();

        for &id in entity_ids {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let (Some(kind), Some(position), Some(health), Some(attack_target), Some(stats)) = (
                entity.enemy_kind,
                entity.position,
                entity.health,
                entity.attack_target,
                entity.combat_stats,
            ) else {
                continue;
            };
            let Some(damage) = health.last_damage else {
                continue;
            };
            if health.is_dead() {
                continue;
            }

            let policy = self.policies.get(kind);
            let attacker_position = self.enemy_target_position(damage.source);
            let ctx = SwitchContext {
                now_ms,
                position: position.value,
                attack_range: stats.range,
                current_target: attack_target.target,
                last_switch_ms: attack_target.last_switch_ms,
                damage: Some(damage),
                attacker_position,
            };
            let evaluation = evaluate_switch(&ctx, &policy);
            tracing::debug!(
                unit = id,
                attacker = damage.source,
                reason = ?evaluation.reason,
                priority = evaluation.priority,
                "Target switch evaluated"
            );

            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            match (evaluation.new_target, attacker_position) {
                (Some(attacker), Some(attacker_pos)) if evaluation.should_switch => {
                    if let (Some(target), Some(health)) =
                        (entity.attack_target.as_mut(), entity.health.as_mut())
                    {
                        apply_switch(
                            target,
                            entity.movement.as_mut(),
                            health,
                            attacker,
                            attacker_pos,
                            now_ms,
                        );
                    }
                    switches.push(TargetSwitch {
                        unit: id,
                        from: attack_target.target,
                        to: attacker,
                        priority: evaluation.priority,
                    });
                }
                _ if !evaluation.reason.retains_record() => {
                    if let Some(health) = entity.health.as_mut() {
                        health.last_damage = None;
                    }
                }
                _ => {}
            }
        }

        switches
    }

    /// Let pursuing enemies give up on attackers that got away.
    fn run_reversion_system(
        &mut self,
        entity_ids: &[EntityId],
        now_ms: u64,
    ) -> Vec<TargetReversion> {
        let enemy_targets = self.enemy_target_candidates(entity_ids);
        let mut reversions = Vec::new();

        for &id in entity_ids {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let (Some(kind), Some(position), Some(attack_target), Some(stats)) = (
                entity.enemy_kind,
                entity.position,
                entity.attack_target,
                entity.combat_stats,
            ) else {
                continue;
            };
            if !attack_target.is_pursuing() || entity.is_dead() {
                continue;
            }

            let policy = self.policies.get(kind);
            let ctx = ReversionContext {
                now_ms,
                last_check_ms: attack_target.last_reversion_check_ms,
                position: position.value,
                attack_range: stats.range,
                pursued_position: attack_target
                    .target
                    .and_then(|t| self.enemy_target_position(t)),
                original_target: attack_target.original_target,
                original_valid: attack_target
                    .original_target
                    .is_some_and(|t| self.enemy_target_position(t).is_some()),
            };

            let decision = evaluate_reversion(&ctx, &policy);
            let new_target = match decision {
                ReversionDecision::NotDue => continue,
                ReversionDecision::KeepPursuing => {
                    if let Some(target) = self
                        .entities
                        .get_mut(id)
                        .and_then(|e| e.attack_target.as_mut())
                    {
                        target.last_reversion_check_ms = now_ms;
                    }
                    continue;
                }
                ReversionDecision::RestoreOriginal(original) => Some(original),
                ReversionDecision::Reacquire => {
                    let profile = self.config.profile_for(kind);
                    acquire_target(
                        position.value,
                        &enemy_targets,
                        &profile.structure_priority,
                        None,
                    )
                }
            };

            tracing::debug!(unit = id, ?decision, target = ?new_target, "Pursuit ended");
            if let Some(target) = self
                .entities
                .get_mut(id)
                .and_then(|e| e.attack_target.as_mut())
            {
                target.end_pursuit(new_target);
                target.last_reversion_check_ms = now_ms;
            }
            reversions.push(TargetReversion {
                unit: id,
                decision,
                target: new_target,
            });
        }

        reversions
    }

    /// Where a mobile entity wants to go this tick, and whether its standing
    /// order is finished.
    fn desired_destination(&self, entity: &Entity, position: Vec2Fixed) -> (Option<Vec2Fixed>, bool) {
        let range = entity.combat_stats.map_or(Fixed::ZERO, |s| s.range);
        let target = entity.attack_target.and_then(|t| t.target);

        if entity.enemy_kind.is_some() {
            let destination = target
                .and_then(|t| self.living_position(t))
                .filter(|&pos| !position.within(pos, range));
            return (destination, false);
        }

        match entity.command {
            Some(Command::MoveTo(point)) => {
                if point == position {
                    (None, true)
                } else {
                    (Some(point), false)
                }
            }
            Some(Command::Attack(enemy)) => match self.enemy_position(enemy) {
                Some(pos) if position.within(pos, range) => (None, false),
                Some(pos) => (Some(pos), false),
                None => (None, true),
            },
            Some(Command::Deploy(structure)) => match self.living_position(structure) {
                Some(pos) => (Some(pos), false),
                None => (None, true),
            },
            Some(Command::Guard(structure)) => match self.living_position(structure) {
                Some(_) if target.is_some() => (None, false),
                Some(pos) => (Some(pos), false),
                None => (None, true),
            },
            None => (None, false),
        }
    }

    /// Point every mobile entity at its destination.
    fn run_steering_system(&mut self, entity_ids: &[EntityId]) {
        for &id in entity_ids {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let Some(position) = entity.position else {
                continue;
            };
            if entity.movement.is_none() {
                continue;
            }
            let (destination, finished) = if entity.deployed_in.is_some() || entity.is_dead() {
                (None, false)
            } else {
                self.desired_destination(entity, position.value)
            };

            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            if finished {
                tracing::debug!(unit = id, command = ?entity.command, "Order finished");
                entity.command = None;
            }
            if let (Some(movement), Some(velocity)) =
                (entity.movement.as_mut(), entity.velocity.as_mut())
            {
                movement.destination = destination;
                let mut single = vec![(id, &position, &*movement, velocity)];
                steering_system(&mut single);
            }
        }
    }

    /// Run the movement system on all applicable entities.
    fn run_movement_system(&mut self, entity_ids: &[EntityId]) {
        for &id in entity_ids {
            if let Some(entity) = self.entities.get_mut(id) {
                if let (Some(position), Some(velocity)) =
                    (entity.position.as_mut(), entity.velocity.as_ref())
                {
                    let mut single = vec![(id, position, velocity)];
                    movement_system(&mut single);
                }
            }
        }
    }

    /// Deploy units that reached the structure they were sent to.
    fn run_deployment_system(&mut self, entity_ids: &[EntityId]) -> Vec<(EntityId, EntityId)> {
        let mut deployments = Vec::new();

        for &id in entity_ids {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let (Some(Command::Deploy(structure_id)), Some(position)) =
                (entity.command, entity.position)
            else {
                continue;
            };
            if self.living_position(structure_id) != Some(position.value) {
                continue;
            }

            let result = self
                .entities
                .get_mut(structure_id)
                .and_then(|e| e.structure.as_mut())
                .map(|structure| structure.deploy(id));

            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            entity.command = None;
            if let Some(movement) = entity.movement.as_mut() {
                movement.destination = None;
            }
            entity.velocity = Some(Velocity::ZERO);

            match result {
                Some(Ok(())) => {
                    entity.deployed_in = Some(structure_id);
                    if let Some(target) = entity.attack_target.as_mut() {
                        target.reset();
                    }
                    tracing::debug!(unit = id, structure = structure_id, "Unit deployed");
                    deployments.push((id, structure_id));
                }
                Some(Err(err)) => {
                    tracing::warn!(unit = id, structure = structure_id, error = %err, "Deployment refused");
                }
                None => {}
            }
        }

        deployments
    }

    /// Run the health system and return dead entity IDs.
    fn run_health_system(&self, entity_ids: &[EntityId]) -> Vec<EntityId> {
        let healths: Vec<(EntityId, &Health)> = entity_ids
            .iter()
            .filter_map(|&id| {
                self.entities
                    .get(id)
                    .and_then(|e| e.health.as_ref().map(|h| (id, h)))
            })
            .collect();
        health_system(&healths)
    }

    /// Remove dead entities. Returns whether a critical structure was lost.
    fn remove_dead(&mut self, dead: &[EntityId]) -> bool {
        let mut lost_critical = false;

        for &id in dead {
            let Some(mut entity) = self.entities.remove(id) else {
                continue;
            };

            if let Some(structure) = entity.structure {
                if let Some(crew) = structure.deployed_unit_id() {
                    if let Some(unit) = self.entities.get_mut(crew) {
                        unit.deployed_in = None;
                    }
                    tracing::debug!(structure = id, unit = crew, "Crew ejected from destroyed structure");
                }
                if structure.critical {
                    lost_critical = true;
                }
            }

            if let Some(structure_id) = entity.deployed_in.take() {
                if let Some(structure) = self
                    .entities
                    .get_mut(structure_id)
                    .and_then(|e| e.structure.as_mut())
                {
                    structure.undeploy();
                }
            }

            if entity.is_friendly_unit() {
                entity.command = None;
                entity.velocity = Some(Velocity::ZERO);
                self.fallen.insert(id, entity);
            }
        }

        lost_critical
    }

    fn update_outcome(&mut self, lost_critical: bool) -> Option<GameOutcome> {
        let outcome = if lost_critical {
            GameOutcome::Defeat
        } else if self.enemies_spawned > 0
            && self.pending_spawns.is_empty()
            && !self.entities.iter().any(|(_, e)| e.enemy_kind.is_some())
        {
            GameOutcome::Victory
        } else {
            return None;
        };

        self.outcome = outcome;
        tracing::info!(tick = self.tick, ?outcome, "Game decided");
        Some(outcome)
    }

    /// Spawn a new entity with the specified components.
    ///
    /// Positioned entities get a zero velocity, and entities with combat
    /// stats get an empty attack target.
    pub fn spawn_entity(&mut self, params: EntitySpawnParams) -> EntityId {
        let mut entity = Entity::new(0); // ID will be assigned by storage
        entity.team = params.team;

        if let Some(pos) = params.position {
            entity.position = Some(Position::new(pos));
            entity.velocity = Some(Velocity::ZERO);
        }

        if let Some(max_health) = params.health {
            entity.health = Some(Health::new(max_health));
        }

        if let Some(speed) = params.movement {
            entity.movement = Some(Movement::new(speed));
        }

        if let Some(stats) = params.combat_stats {
            entity.combat_stats = Some(stats);
            entity.attack_target = Some(AttackTarget::new());
        }

        entity.enemy_kind = params.enemy_kind;
        entity.structure = params.structure;
        if entity.is_friendly_unit() {
            entity.home = params.position;
        }

        self.entities.insert(entity)
    }

    /// Spawn an enemy using its configured profile.
    pub fn spawn_enemy(&mut self, kind: EnemyKind, position: Vec2Fixed) -> EntityId {
        let profile = self.config.profile_for(kind);
        self.enemies_spawned += 1;
        let id = self.spawn_entity(EntitySpawnParams {
            team: Team::Attacker,
            position: Some(position),
            health: Some(profile.max_health),
            movement: Some(Fixed::saturating_from_num(profile.speed)),
            combat_stats: Some(profile.combat_stats()),
            enemy_kind: Some(kind),
            structure: None,
        });
        tracing::debug!(id, kind = kind.as_str(), "Enemy spawned");
        id
    }

    /// Spawn a structure.
    ///
    /// Cannons and towers get a weapon; everything else is passive.
    pub fn spawn_structure(
        &mut self,
        structure: Structure,
        position: Vec2Fixed,
        max_health: u32,
    ) -> EntityId {
        let combat_stats = match structure.kind {
            StructureKind::Cannon => Some(CombatStats::new(40, Fixed::from_num(120), 40)),
            StructureKind::Tower => Some(CombatStats::new(15, Fixed::from_num(100), 20)),
            StructureKind::Gate | StructureKind::Wall | StructureKind::Barracks => None,
        };
        self.spawn_entity(EntitySpawnParams {
            team: Team::Defender,
            position: Some(position),
            health: Some(max_health),
            combat_stats,
            structure: Some(structure),
            ..Default::default()
        })
    }

    /// Spawn a standard friendly unit.
    pub fn spawn_defender(&mut self, position: Vec2Fixed) -> EntityId {
        self.spawn_entity(EntitySpawnParams {
            team: Team::Defender,
            position: Some(position),
            health: Some(DEFENDER_HEALTH),
            movement: Some(Fixed::from_num(DEFENDER_SPEED)),
            combat_stats: Some(defender_combat_stats()),
            ..Default::default()
        })
    }

    /// Remove an entity from the simulation.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the entity doesn't exist.
    pub fn despawn_entity(&mut self, id: EntityId) -> Result<()> {
        let entity = self
            .entities
            .remove(id)
            .ok_or(GameError::EntityNotFound(id))?;
        if let Some(crew) = entity.structure.and_then(|s| s.deployed_unit_id()) {
            if let Some(unit) = self.entities.get_mut(crew) {
                unit.deployed_in = None;
            }
        }
        if let Some(structure_id) = entity.deployed_in {
            self.eject(structure_id);
        }
        Ok(())
    }

    /// Empty a structure's deployment slot and free its crew.
    fn eject(&mut self, structure_id: EntityId) {
        let crew = self
            .entities
            .get_mut(structure_id)
            .and_then(|e| e.structure.as_mut())
            .and_then(Structure::undeploy);
        if let Some(unit) = crew.and_then(|id| self.entities.get_mut(id)) {
            unit.deployed_in = None;
        }
    }

    /// Apply a player order between ticks.
    ///
    /// A deployed unit that is sent anywhere else leaves its structure first.
    ///
    /// # Errors
    ///
    /// Returns an [`OrderError`] (wrapped in [`GameError::Order`]) when the
    /// order cannot be carried out; the simulation is left unchanged.
    pub fn apply_order(&mut self, order: Order) -> Result<()> {
        let result = self.try_apply_order(order);
        match &result {
            Ok(()) => tracing::debug!(order = order.name(), unit = order.unit(), "Order applied"),
            Err(err) => {
                tracing::warn!(order = order.name(), unit = order.unit(), error = %err, "Order rejected");
            }
        }
        result.map_err(GameError::from)
    }

    fn try_apply_order(&mut self, order: Order) -> std::result::Result<(), OrderError> {
        if self.outcome.is_over() {
            return Err(OrderError::GameOver);
        }

        if let Order::ReviveUnit { unit } = order {
            return self.revive(unit);
        }

        let unit = order.unit();
        let entity = self
            .entities
            .get(unit)
            .ok_or(OrderError::UnknownUnit(unit))?;
        if !entity.is_friendly_unit() {
            return Err(OrderError::NotCommandable(unit));
        }
        let unit_position = entity.position.map(|p| p.value).unwrap_or_default();
        let deployed_in = entity.deployed_in;

        let (command, target) = match order {
            Order::AttackTarget { target, .. } => {
                if self.enemy_position(target).is_none() {
                    return Err(OrderError::InvalidTarget { unit, target });
                }
                (Command::Attack(target), Some(target))
            }
            Order::DeploymentTarget { structure, .. } => {
                if deployed_in == Some(structure) {
                    return Ok(());
                }
                let slot = self
                    .entities
                    .get(structure)
                    .filter(|e| e.team == Team::Defender && !e.is_dead())
                    .and_then(|e| e.structure)
                    .ok_or(OrderError::InvalidTarget {
                        unit,
                        target: structure,
                    })?;
                let mut probe = slot;
                probe
                    .deploy(unit)
                    .map_err(|reason| OrderError::NotDeployable { structure, reason })?;
                (Command::Deploy(structure), None)
            }
            Order::DefenseCrystal { .. } => {
                let crystal = self
                    .nearest_critical_structure(unit_position)
                    .ok_or(OrderError::NoCriticalStructure)?;
                (Command::Guard(crystal), None)
            }
            Order::ReviveUnit { .. } => return Err(OrderError::NotCommandable(unit)),
        };

        if let Some(structure_id) = deployed_in {
            self.eject(structure_id);
        }
        if let Some(entity) = self.entities.get_mut(unit) {
            entity.command = Some(command);
            if let Some(attack_target) = entity.attack_target.as_mut() {
                attack_target.target = target;
            }
        }
        Ok(())
    }

    fn nearest_critical_structure(&self, from: Vec2Fixed) -> Option<EntityId> {
        self.entities
            .sorted_ids()
            .into_iter()
            .filter_map(|id| self.entities.get(id))
            .filter(|e| e.structure.is_some_and(|s| s.critical) && !e.is_dead())
            .filter_map(|e| e.position.map(|p| (e.id, from.distance_squared(p.value))))
            .min_by_key(|&(id, dist_sq)| (dist_sq, id))
            .map(|(id, _)| id)
    }

    fn revive(&mut self, unit: EntityId) -> std::result::Result<(), OrderError> {
        let Some(mut entity) = self.fallen.remove(&unit) else {
            return Err(if self.entities.contains(unit) {
                OrderError::NotFallen(unit)
            } else {
                OrderError::UnknownUnit(unit)
            });
        };

        if let Some(health) = entity.health.as_mut() {
            health.restore_full();
        }
        if let Some(home) = entity.home {
            entity.position = Some(Position::new(home));
        }
        if let Some(movement) = entity.movement.as_mut() {
            movement.destination = None;
        }
        if let Some(target) = entity.attack_target.as_mut() {
            target.reset();
        }
        if let Some(stats) = entity.combat_stats.as_mut() {
            stats.cooldown_remaining = 0;
        }
        entity.velocity = Some(Velocity::ZERO);
        entity.command = None;
        entity.deployed_in = None;

        self.entities.reinsert(entity);
        Ok(())
    }

    /// Check that every deployment slot and every deployed unit agree.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] naming the first mismatch found.
    pub fn validate_deployments(&self) -> Result<()> {
        for id in self.entities.sorted_ids() {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            if let Some(crew) = entity.structure.and_then(|s| s.deployed_unit_id()) {
                let back = self.entities.get(crew).and_then(|u| u.deployed_in);
                if back != Some(id) {
                    return Err(GameError::InvalidState(format!(
                        "Structure {id} holds unit {crew}, which is not deployed in it"
                    )));
                }
            }
            if let Some(structure_id) = entity.deployed_in {
                let back = self
                    .entities
                    .get(structure_id)
                    .and_then(|s| s.structure)
                    .and_then(|s| s.deployed_unit_id());
                if back != Some(id) {
                    return Err(GameError::InvalidState(format!(
                        "Unit {id} claims structure {structure_id}, whose slot disagrees"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build a snapshot of the game for the outside world.
    #[must_use]
    pub fn status(&self) -> GameStatus {
        let entities: Vec<EntityStatus> = self
            .entities
            .sorted_ids()
            .into_iter()
            .filter_map(|id| self.entities.get(id))
            .map(|entity| {
                let position = entity.position.map(|p| p.value).unwrap_or_default();
                let health = entity.health.unwrap_or_else(|| Health::new(0));
                let target = entity.attack_target.unwrap_or_default();
                EntityStatus {
                    id: entity.id,
                    team: entity.team,
                    kind: entity.kind_name().to_string(),
                    x: position.x.to_num::<f64>(),
                    y: position.y.to_num::<f64>(),
                    health: health.current,
                    max_health: health.max,
                    target: target.target,
                    pursuing: target.is_pursuing(),
                    command: entity.command.map(|c| c.name().to_string()),
                    deployed_in: entity.deployed_in,
                    deployed_unit: entity.structure.and_then(|s| s.deployed_unit_id()),
                    critical: entity.structure.is_some_and(|s| s.critical),
                }
            })
            .collect();

        let enemies_remaining = entities.iter().filter(|e| e.team == Team::Attacker).count();

        GameStatus {
            tick: self.tick,
            time_ms: self.time_ms(),
            outcome: self.outcome,
            entities,
            fallen: self.fallen.keys().copied().collect(),
            enemies_remaining,
            pending_spawns: self.pending_spawns.len(),
            state_hash: self.state_hash(),
        }
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Used for determinism checks: two simulations fed the same inputs
    /// must produce the same hash on every tick.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        // Hash tick
        self.tick.hash(&mut hasher);
        self.outcome.hash(&mut hasher);
        self.enemies_spawned.hash(&mut hasher);
        self.pending_spawns.len().hash(&mut hasher);

        // Hash entities in deterministic order
        let ids = self.entities.sorted_ids();
        ids.len().hash(&mut hasher);

        for id in ids {
            if let Some(entity) = self.entities.get(id) {
                id.hash(&mut hasher);
                entity.team.hash(&mut hasher);

                // Hash position
                if let Some(ref pos) = entity.position {
                    pos.value.hash(&mut hasher);
                }

                // Hash health and the recorded attacker
                if let Some(ref health) = entity.health {
                    health.current.hash(&mut hasher);
                    health.max.hash(&mut hasher);
                    if let Some(record) = health.last_damage {
                        record.source.hash(&mut hasher);
                        record.at_ms.hash(&mut hasher);
                        record.amount.hash(&mut hasher);
                    }
                }

                // Hash targeting state
                if let Some(ref target) = entity.attack_target {
                    target.target.hash(&mut hasher);
                    target.pursuing.hash(&mut hasher);
                    target.original_target.hash(&mut hasher);
                    target.last_switch_ms.hash(&mut hasher);
                    target.last_reversion_check_ms.hash(&mut hasher);
                }

                if let Some(ref stats) = entity.combat_stats {
                    stats.cooldown_remaining.hash(&mut hasher);
                }

                if let Some(ref structure) = entity.structure {
                    structure.deployed_unit_id().hash(&mut hasher);
                }

                entity.command.hash(&mut hasher);
                entity.deployed_in.hash(&mut hasher);
            }
        }

        for id in self.fallen.keys() {
            id.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the simulation state to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid simulation.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize simulation: {e}")))
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TargetSwitchConfig, TargetSwitchOverride};
    use crate::structures::AttackableType;

    fn point(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn target_of(sim: &Simulation, id: EntityId) -> AttackTarget {
        sim.get_entity(id).unwrap().attack_target.unwrap()
    }

    fn position_of(sim: &Simulation, id: EntityId) -> Vec2Fixed {
        sim.get_entity(id).unwrap().position.unwrap().value
    }

    #[test]
    fn test_simulation_new() {
        let sim = Simulation::new();
        assert_eq!(sim.get_tick(), 0);
        assert_eq!(sim.time_ms(), 0);
        assert!(sim.entities.is_empty());
        assert_eq!(sim.outcome(), GameOutcome::InProgress);
    }

    #[test]
    fn test_spawn_entity() {
        let mut sim = Simulation::new();
        let id = sim.spawn_entity(EntitySpawnParams {
            position: Some(point(10, 20)),
            health: Some(100),
            ..Default::default()
        });

        assert_eq!(id, 1);
        let entity = sim.get_entity(id).unwrap();
        assert_eq!(entity.position.unwrap().value.x, Fixed::from_num(10));
        assert_eq!(entity.health.unwrap().current, 100);
    }

    #[test]
    fn test_spawn_enemy_uses_profile() {
        let mut sim = Simulation::new();
        let id = sim.spawn_enemy(EnemyKind::Brute, point(0, 0));
        let entity = sim.get_entity(id).unwrap();

        assert_eq!(entity.team, Team::Attacker);
        assert_eq!(entity.health.unwrap().max, 200);
        assert_eq!(entity.combat_stats.unwrap().damage, 20);
    }

    #[test]
    fn test_despawn_entity() {
        let mut sim = Simulation::new();
        let id = sim.spawn_entity(EntitySpawnParams::default());

        assert!(sim.despawn_entity(id).is_ok());
        assert!(sim.get_entity(id).is_none());
        assert!(sim.despawn_entity(id).is_err());
    }

    #[test]
    fn test_tick_increments() {
        let mut sim = Simulation::new();
        sim.tick();
        assert_eq!(sim.get_tick(), 1);
        assert_eq!(sim.time_ms(), 50);

        sim.tick();
        assert_eq!(sim.get_tick(), 2);
    }

    #[test]
    fn test_enemy_acquires_and_walks_to_nearest_target() {
        let mut sim = Simulation::new();
        let near = sim.spawn_structure(Structure::new(StructureKind::Wall), point(50, 0), 500);
        let _far = sim.spawn_structure(Structure::new(StructureKind::Wall), point(300, 0), 500);
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));

        sim.tick();

        assert_eq!(target_of(&sim, enemy).target, Some(near));
        assert_eq!(position_of(&sim, enemy), point(2, 0));
    }

    #[test]
    fn test_enemy_prefers_priority_structure() {
        let mut sim = Simulation::new();
        let _wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(20, 0), 500);
        let gate = sim.spawn_structure(Structure::new(StructureKind::Gate), point(200, 0), 500);
        let brute = sim.spawn_enemy(EnemyKind::Brute, point(0, 0));

        sim.tick();

        assert_eq!(target_of(&sim, brute).target, Some(gate));
    }

    #[test]
    fn test_unmanned_cannon_is_ignored() {
        let mut sim = Simulation::new();
        let cannon = sim.spawn_structure(Structure::new(StructureKind::Cannon), point(10, 0), 300);
        let wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(100, 0), 500);
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));

        sim.tick();
        assert_eq!(target_of(&sim, enemy).target, Some(wall));
        assert!(sim.get_entity(cannon).unwrap().attack_target.unwrap().target.is_none());
    }

    #[test]
    fn test_deployment_order_walks_and_deploys() {
        let mut sim = Simulation::new();
        let cannon = sim.spawn_structure(Structure::new(StructureKind::Cannon), point(30, 0), 300);
        let unit = sim.spawn_defender(point(0, 0));

        sim.apply_order(Order::DeploymentTarget {
            unit,
            structure: cannon,
        })
        .unwrap();

        let mut deployed_on = None;
        for _ in 0..20 {
            let events = sim.tick();
            if !events.deployments.is_empty() {
                deployed_on = Some(events.deployments[0]);
                break;
            }
        }

        assert_eq!(deployed_on, Some((unit, cannon)));
        assert_eq!(sim.get_entity(unit).unwrap().deployed_in, Some(cannon));
        let structure = sim.get_entity(cannon).unwrap().structure.unwrap();
        assert_eq!(structure.deployed_unit_id(), Some(unit));
        assert!(sim.validate_deployments().is_ok());
    }

    #[test]
    fn test_deploy_into_occupied_structure_rejected() {
        let mut sim = Simulation::new();
        let mut tower = Structure::new(StructureKind::Tower);
        let first = sim.spawn_defender(point(0, 0));
        tower.deploy(first).unwrap();
        let tower_id = sim.spawn_structure(tower, point(0, 0), 200);
        sim.get_entity_mut(first).unwrap().deployed_in = Some(tower_id);
        let second = sim.spawn_defender(point(5, 5));

        let err = sim
            .apply_order(Order::DeploymentTarget {
                unit: second,
                structure: tower_id,
            })
            .unwrap_err();

        assert!(matches!(
            err,
            GameError::Order(OrderError::NotDeployable { .. })
        ));
        let structure = sim.get_entity(tower_id).unwrap().structure.unwrap();
        assert_eq!(structure.deployed_unit_id(), Some(first));
    }

    #[test]
    fn test_deploy_into_wall_rejected() {
        let mut sim = Simulation::new();
        let wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(10, 0), 500);
        let unit = sim.spawn_defender(point(0, 0));

        let err = sim
            .apply_order(Order::DeploymentTarget {
                unit,
                structure: wall,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::Order(OrderError::NotDeployable { .. })
        ));
        assert!(sim.get_entity(unit).unwrap().command.is_none());
    }

    #[test]
    fn test_orders_to_enemies_rejected() {
        let mut sim = Simulation::new();
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));

        let err = sim
            .apply_order(Order::DefenseCrystal { unit: enemy })
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::Order(OrderError::NotCommandable(_))
        ));

        let err = sim
            .apply_order(Order::DefenseCrystal { unit: 99 })
            .unwrap_err();
        assert!(matches!(err, GameError::Order(OrderError::UnknownUnit(99))));
    }

    #[test]
    fn test_attack_order_leaves_structure() {
        let mut sim = Simulation::new();
        let mut cannon = Structure::new(StructureKind::Cannon);
        let unit = sim.spawn_defender(point(0, 0));
        cannon.deploy(unit).unwrap();
        let cannon_id = sim.spawn_structure(cannon, point(0, 0), 300);
        sim.get_entity_mut(unit).unwrap().deployed_in = Some(cannon_id);
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(500, 0));

        sim.apply_order(Order::AttackTarget {
            unit,
            target: enemy,
        })
        .unwrap();

        assert!(sim.get_entity(unit).unwrap().deployed_in.is_none());
        let structure = sim.get_entity(cannon_id).unwrap().structure.unwrap();
        assert!(!structure.has_deployed_unit());
        assert!(sim.validate_deployments().is_ok());
    }

    #[test]
    fn test_damaged_enemy_switches_to_attacker() {
        let mut sim = Simulation::new();
        let wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(15, 0), 500);
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
        let defender = sim.spawn_defender(point(0, 20));

        let mut switched = None;
        for _ in 0..5 {
            let events = sim.tick();
            if let Some(switch) = events.switches.first() {
                switched = Some(*switch);
                break;
            }
        }

        let switch = switched.expect("enemy should turn on the defender");
        assert_eq!(switch.unit, enemy);
        assert_eq!(switch.from, Some(wall));
        assert_eq!(switch.to, defender);

        let target = target_of(&sim, enemy);
        assert!(target.is_pursuing());
        assert_eq!(target.original_target, Some(wall));
        assert!(sim.get_entity(enemy).unwrap().health.unwrap().last_damage.is_none());
    }

    #[test]
    fn test_disabled_switching_keeps_target() {
        let config = SimulationConfig {
            target_switch: TargetSwitchConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut sim = Simulation::with_config(config);
        let wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(15, 0), 500);
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
        sim.spawn_defender(point(0, 20));

        for _ in 0..5 {
            assert!(sim.tick().switches.is_empty());
        }
        assert_eq!(target_of(&sim, enemy).target, Some(wall));
    }

    #[test]
    fn test_per_kind_override_disables_switching() {
        let mut config = SimulationConfig::default();
        config.overrides.insert(
            EnemyKind::SiegeRam,
            TargetSwitchOverride {
                enabled: Some(false),
                ..Default::default()
            },
        );
        let mut sim = Simulation::with_config(config);
        let gate = sim.spawn_structure(Structure::new(StructureKind::Gate), point(300, 0), 500);
        let ram = sim.spawn_enemy(EnemyKind::SiegeRam, point(0, 0));
        sim.spawn_defender(point(0, 20));

        for _ in 0..5 {
            assert!(sim.tick().switches.is_empty());
        }
        assert_eq!(target_of(&sim, ram).target, Some(gate));
        assert!(sim.get_entity(ram).unwrap().health.unwrap().last_damage.is_none());
        assert!(sim.policies().get(EnemyKind::Grunt).enabled);
    }

    #[test]
    fn test_enemy_reverts_when_attacker_escapes() {
        let mut sim = Simulation::new();
        let wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(15, 0), 500);
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
        let defender = sim.spawn_defender(point(0, 20));

        sim.tick();
        assert_eq!(target_of(&sim, enemy).target, Some(defender));

        // The defender is carried far out of pursuit range.
        sim.get_entity_mut(defender).unwrap().position = Some(Position::new(point(0, 900)));

        let mut reverted = None;
        for _ in 0..20 {
            if let Some(r) = sim.tick().reversions.first() {
                reverted = Some(*r);
                break;
            }
        }

        let reversion = reverted.expect("enemy should give up the chase");
        assert_eq!(reversion.decision, ReversionDecision::RestoreOriginal(wall));
        let target = target_of(&sim, enemy);
        assert_eq!(target.target, Some(wall));
        assert!(!target.is_pursuing());
        assert!(target.original_target.is_none());
    }

    #[test]
    fn test_destroyed_structure_ejects_crew() {
        let mut sim = Simulation::new();
        let mut tower = Structure::new(StructureKind::Tower);
        let unit = sim.spawn_defender(point(0, 0));
        tower.deploy(unit).unwrap();
        let tower_id = sim.spawn_structure(tower, point(0, 0), 10);
        sim.get_entity_mut(unit).unwrap().deployed_in = Some(tower_id);

        sim.get_entity_mut(tower_id).unwrap().health.as_mut().unwrap().current = 0;
        let events = sim.tick();

        assert!(events.deaths.contains(&tower_id));
        assert!(sim.get_entity(unit).unwrap().deployed_in.is_none());
        assert!(sim.validate_deployments().is_ok());
    }

    #[test]
    fn test_losing_critical_structure_is_defeat() {
        let mut sim = Simulation::new();
        let core = Structure::new(StructureKind::Barracks)
            .with_attackable(AttackableType::Auto)
            .critical();
        let core_id = sim.spawn_structure(core, point(0, 0), 10);
        sim.get_entity_mut(core_id).unwrap().health.as_mut().unwrap().current = 0;

        let events = sim.tick();
        assert_eq!(events.outcome, Some(GameOutcome::Defeat));
        assert_eq!(sim.outcome(), GameOutcome::Defeat);

        // Frozen once decided.
        let tick = sim.get_tick();
        sim.tick();
        assert_eq!(sim.get_tick(), tick);
        let err = sim
            .apply_order(Order::DefenseCrystal { unit: 1 })
            .unwrap_err();
        assert!(matches!(err, GameError::Order(OrderError::GameOver)));
    }

    #[test]
    fn test_victory_after_last_enemy_dies() {
        let mut sim = Simulation::new();
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
        sim.get_entity_mut(enemy).unwrap().health.as_mut().unwrap().current = 0;

        let events = sim.tick();
        assert_eq!(events.outcome, Some(GameOutcome::Victory));
    }

    #[test]
    fn test_no_victory_while_spawns_pending() {
        let mut sim = Simulation::new();
        let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
        sim.schedule_spawn(ScheduledSpawn {
            at_ms: 100,
            kind: EnemyKind::Archer,
            position: point(50, 50),
        });
        sim.get_entity_mut(enemy).unwrap().health.as_mut().unwrap().current = 0;

        assert_eq!(sim.tick().outcome, None);
        assert_eq!(sim.tick().outcome, None);
        let events = sim.tick();
        assert_eq!(events.spawned.len(), 1);
        assert!(sim.pending_spawns().is_empty());
    }

    #[test]
    fn test_fallen_unit_revives_at_home() {
        let mut sim = Simulation::new();
        let unit = sim.spawn_defender(point(5, 5));
        sim.get_entity_mut(unit).unwrap().position = Some(Position::new(point(80, 80)));
        sim.get_entity_mut(unit).unwrap().health.as_mut().unwrap().current = 0;

        sim.tick();
        assert!(sim.get_entity(unit).is_none());
        assert!(sim.fallen().contains_key(&unit));
        assert_eq!(sim.status().fallen, vec![unit]);

        sim.apply_order(Order::ReviveUnit { unit }).unwrap();
        let entity = sim.get_entity(unit).unwrap();
        assert_eq!(entity.health.unwrap().current, DEFENDER_HEALTH);
        assert_eq!(entity.position.unwrap().value, point(5, 5));
        assert!(sim.fallen().is_empty());

        let err = sim.apply_order(Order::ReviveUnit { unit }).unwrap_err();
        assert!(matches!(err, GameError::Order(OrderError::NotFallen(_))));
    }

    #[test]
    fn test_defense_crystal_guards_nearest_critical() {
        let mut sim = Simulation::new();
        let far = sim.spawn_structure(
            Structure::new(StructureKind::Gate).critical(),
            point(500, 0),
            1000,
        );
        let near = sim.spawn_structure(
            Structure::new(StructureKind::Gate).critical(),
            point(50, 0),
            1000,
        );
        let unit = sim.spawn_defender(point(0, 0));

        sim.apply_order(Order::DefenseCrystal { unit }).unwrap();
        assert_eq!(sim.get_entity(unit).unwrap().command, Some(Command::Guard(near)));
        assert_ne!(near, far);

        sim.tick();
        assert!(position_of(&sim, unit).x > Fixed::ZERO);
    }

    #[test]
    fn test_status_snapshot() {
        let mut sim = Simulation::new();
        let cannon = sim.spawn_structure(Structure::new(StructureKind::Cannon), point(10, 20), 300);
        let enemy = sim.spawn_enemy(EnemyKind::Archer, point(200, 0));

        let status = sim.status();
        assert_eq!(status.entities.len(), 2);
        assert_eq!(status.enemies_remaining, 1);
        let cannon_status = status.entity(cannon).unwrap();
        assert_eq!(cannon_status.kind, "cannon");
        assert!((cannon_status.y - 20.0).abs() < f64::EPSILON);
        assert_eq!(status.entity(enemy).unwrap().kind, "archer");
        assert_eq!(status.state_hash, sim.state_hash());
    }

    #[test]
    fn test_deterministic_hash() {
        fn build() -> Simulation {
            let mut sim = Simulation::new();
            sim.spawn_structure(Structure::new(StructureKind::Gate), point(200, 0), 400);
            sim.spawn_defender(point(40, 0));
            sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
            sim.spawn_enemy(EnemyKind::Archer, point(0, 30));
            sim
        }

        let mut sim1 = build();
        let mut sim2 = build();
        for _ in 0..100 {
            sim1.tick();
            sim2.tick();
            assert_eq!(sim1.state_hash(), sim2.state_hash());
        }
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut sim = Simulation::new();
        sim.spawn_structure(Structure::new(StructureKind::Wall), point(42, 24), 75);
        sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
        sim.tick();

        let bytes = sim.serialize().unwrap();
        let restored = Simulation::deserialize(&bytes).unwrap();

        assert_eq!(sim.get_tick(), restored.get_tick());
        assert_eq!(sim.state_hash(), restored.state_hash());
    }

    #[test]
    fn test_health_system_removes_dead() {
        let mut sim = Simulation::new();
        let id = sim.spawn_entity(EntitySpawnParams {
            position: Some(Vec2Fixed::ZERO),
            health: Some(10),
            ..Default::default()
        });

        sim.get_entity_mut(id).unwrap().health.as_mut().unwrap().current = 0;

        let events = sim.tick();
        assert!(events.deaths.contains(&id));
        assert!(sim.get_entity(id).is_none());
    }
}
