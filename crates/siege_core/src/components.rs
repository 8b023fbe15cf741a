//! ECS component definitions.
//!
//! Components are pure data with no simulation behaviour. Every entity in
//! the siege is composed of these components; systems in
//! [`crate::systems`] and [`crate::targeting`] read and mutate them.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities.
pub type EntityId = u64;

/// Which side of the siege an entity fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    /// The player's base: structures, deployable units and the crystal.
    #[default]
    Defender,
    /// Enemy waves advancing on the base.
    Attacker,
}

/// Enemy unit archetypes.
///
/// Used as the typed key for per-kind target-switch overrides and enemy
/// profiles. Unknown kinds cannot be expressed, so every lookup either hits
/// an explicit entry or falls back to the global default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    /// Basic melee infantry.
    #[default]
    Grunt,
    /// Ranged skirmisher.
    Archer,
    /// Slow, heavily armoured bruiser.
    Brute,
    /// Structure breaker that ignores units when it can.
    SiegeRam,
}

impl EnemyKind {
    /// All enemy kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Grunt, Self::Archer, Self::Brute, Self::SiegeRam];

    /// Stable snake_case name used in logs and status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grunt => "grunt",
            Self::Archer => "archer",
            Self::Brute => "brute",
            Self::SiegeRam => "siege_ram",
        }
    }
}

/// Position component in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// World position.
    pub value: Vec2Fixed,
}

impl Position {
    /// Create a new position at the given coordinates.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self { value }
    }
}

/// Velocity component for moving entities, in world units per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Velocity {
    /// Velocity vector (units per tick).
    pub value: Vec2Fixed,
}

impl Velocity {
    /// Zero velocity (stationary).
    pub const ZERO: Self = Self {
        value: Vec2Fixed::ZERO,
    };

    /// Create a new velocity.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self { value }
    }

    /// Check if the entity is stationary.
    #[must_use]
    pub fn is_stationary(&self) -> bool {
        self.value == Vec2Fixed::ZERO
    }
}

/// Movement component for mobile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Movement speed in units per tick.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Where the unit is currently heading (if anywhere).
    pub destination: Option<Vec2Fixed>,
}

impl Movement {
    /// Create a movement component with no destination.
    #[must_use]
    pub const fn new(speed: Fixed) -> Self {
        Self {
            speed,
            destination: None,
        }
    }
}

/// The most recent hit an entity took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageRecord {
    /// Entity that dealt the damage.
    pub source: EntityId,
    /// Simulation time of the hit in milliseconds.
    pub at_ms: u64,
    /// Damage actually applied.
    pub amount: u32,
}

/// Health component for damageable entities.
///
/// Besides hit points it carries the last damage source, which is the sole
/// input that triggers target-switch evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
    /// Last recorded hit, consumed by target-switch evaluation.
    pub last_damage: Option<DamageRecord>,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self {
            current: max,
            max,
            last_damage: None,
        }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current -= actual;
        actual
    }

    /// Record who hit this entity and when.
    ///
    /// Overwrites any earlier record, so several hits in one frame leave
    /// only the last attacker behind.
    pub fn record_hit(&mut self, source: EntityId, at_ms: u64, amount: u32) {
        self.last_damage = Some(DamageRecord {
            source,
            at_ms,
            amount,
        });
    }

    /// Heal back to full and forget any recorded attacker.
    pub fn restore_full(&mut self) {
        self.current = self.max;
        self.last_damage = None;
    }
}

/// Combat stats component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    /// Damage per attack.
    pub damage: u32,
    /// Attack range in world units.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Attack cooldown in ticks.
    pub attack_cooldown: u32,
    /// Current cooldown remaining.
    pub cooldown_remaining: u32,
}

impl CombatStats {
    /// Create new combat stats, ready to fire.
    #[must_use]
    pub const fn new(damage: u32, range: Fixed, attack_cooldown: u32) -> Self {
        Self {
            damage,
            range,
            attack_cooldown,
            cooldown_remaining: 0,
        }
    }

    /// Check if ready to attack.
    #[must_use]
    pub const fn can_attack(&self) -> bool {
        self.cooldown_remaining == 0
    }

    /// Reset cooldown after attacking.
    pub fn reset_cooldown(&mut self) {
        self.cooldown_remaining = self.attack_cooldown;
    }

    /// Tick down the cooldown by one.
    pub fn tick_cooldown(&mut self) {
        self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
    }
}

impl Default for CombatStats {
    fn default() -> Self {
        Self::new(10, Fixed::from_num(20), 20)
    }
}

/// Component tracking what an entity is attacking.
///
/// While `pursuing` is set the entity is chasing an attacker it switched to,
/// and `original_target` holds whatever it was engaged with before (possibly
/// nothing). The reversion check uses both to go back to what it was doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttackTarget {
    /// The entity currently being attacked or chased.
    pub target: Option<EntityId>,
    /// Whether the current target is an attacker the entity switched to.
    pub pursuing: bool,
    /// Target held before the switch that started the current pursuit.
    pub original_target: Option<EntityId>,
    /// Simulation time of the last target switch.
    pub last_switch_ms: Option<u64>,
    /// Simulation time of the last reversion check.
    pub last_reversion_check_ms: u64,
}

impl AttackTarget {
    /// Create a new attack target component with no target.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            target: None,
            pursuing: false,
            original_target: None,
            last_switch_ms: None,
            last_reversion_check_ms: 0,
        }
    }

    /// Create with a specific target.
    #[must_use]
    pub const fn with_target(target: EntityId) -> Self {
        let mut this = Self::new();
        this.target = Some(target);
        this
    }

    /// Whether the entity is currently chasing an attacker it switched to.
    #[must_use]
    pub const fn is_pursuing(&self) -> bool {
        self.pursuing
    }

    /// Leave pursuit mode and engage `target` instead.
    pub fn end_pursuit(&mut self, target: Option<EntityId>) {
        self.target = target;
        self.pursuing = false;
        self.original_target = None;
    }

    /// Clear the current target.
    pub fn clear(&mut self) {
        self.target = None;
    }

    /// Drop every piece of targeting state, keeping nothing from the past.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// A standing instruction for a defending unit.
///
/// Enemies never carry commands; they are driven entirely by target
/// acquisition and switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Walk to a point and stop.
    MoveTo(Vec2Fixed),
    /// Chase and attack a specific entity until it dies.
    Attack(EntityId),
    /// Walk to a structure and deploy into it on arrival.
    Deploy(EntityId),
    /// Walk to a structure and defend it from nearby enemies.
    Guard(EntityId),
}

impl Command {
    /// Short name used in logs and status output.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MoveTo(_) => "move_to",
            Self::Attack(_) => "attack",
            Self::Deploy(_) => "deploy",
            Self::Guard(_) => "guard",
        }
    }
}
