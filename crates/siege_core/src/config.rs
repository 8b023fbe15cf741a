//! Simulation configuration and target-switch policy resolution.
//!
//! Configuration is plain data loaded from RON. Raw values may be missing or
//! nonsensical (a negative cooldown, a zero pursuit range); all defaulting
//! happens in one place, [`resolve_policy`], which produces a
//! [`ResolvedSwitchPolicy`] the targeting logic can trust without further
//! checks.
//!
//! # Example RON
//!
//! ```ron
//! SimulationConfig(
//!     target_switch: TargetSwitchConfig(
//!         enabled: true,
//!         cooldown_ms: 2000,
//!         pursuit_range_percent: 150,
//!     ),
//!     overrides: {
//!         siege_ram: TargetSwitchOverride(enabled: Some(false)),
//!     },
//! )
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::components::{CombatStats, EnemyKind};
use crate::error::{GameError, Result};
use crate::math::{percent_of, Fixed};
use crate::structures::StructureKind;

/// Cooldown between two switches when the configured value is unusable.
pub const DEFAULT_SWITCH_COOLDOWN_MS: u64 = 2000;

/// Pursuit range, as a percentage of attack range, when the configured value
/// is unusable.
pub const DEFAULT_PURSUIT_RANGE_PERCENT: u32 = 150;

/// Interval between reversion checks when the configured value is unusable.
pub const DEFAULT_REVERT_CHECK_INTERVAL_MS: u64 = 500;

/// Global target-switch settings as written in a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSwitchConfig {
    /// Master switch for the whole feature.
    pub enabled: bool,
    /// Minimum time between two switches of the same unit.
    pub cooldown_ms: i64,
    /// How far a unit will chase an attacker, as a percentage of its attack range.
    pub pursuit_range_percent: i32,
    /// Minimum switch priority an attacker must reach.
    pub threat_threshold: u32,
    /// How often a pursuing unit checks whether to give up the chase.
    pub revert_check_interval_ms: i64,
}

impl Default for TargetSwitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_ms: DEFAULT_SWITCH_COOLDOWN_MS as i64,
            pursuit_range_percent: DEFAULT_PURSUIT_RANGE_PERCENT as i32,
            threat_threshold: 0,
            revert_check_interval_ms: DEFAULT_REVERT_CHECK_INTERVAL_MS as i64,
        }
    }
}

/// Per-enemy-kind overrides. `None` fields inherit the global value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSwitchOverride {
    /// Disable switching for this kind (cannot re-enable a globally disabled feature).
    pub enabled: Option<bool>,
    /// Cooldown override.
    pub cooldown_ms: Option<i64>,
    /// Pursuit range override.
    pub pursuit_range_percent: Option<i32>,
    /// Threat threshold override.
    pub threat_threshold: Option<u32>,
    /// Reversion check interval override.
    pub revert_check_interval_ms: Option<i64>,
}

/// A fully-resolved target-switch policy. Every value is usable as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSwitchPolicy {
    /// Whether switching is allowed at all.
    pub enabled: bool,
    /// Minimum time between switches, strictly positive.
    pub cooldown_ms: u64,
    /// Pursuit range as a percentage of attack range, strictly positive.
    pub pursuit_range_percent: u32,
    /// Minimum switch priority.
    pub threat_threshold: u32,
    /// Reversion check interval, strictly positive.
    pub revert_check_interval_ms: u64,
}

impl ResolvedSwitchPolicy {
    /// Maximum chase distance for a unit with the given attack range.
    #[must_use]
    pub fn pursuit_range(&self, attack_range: Fixed) -> Fixed {
        percent_of(attack_range, self.pursuit_range_percent)
    }
}

impl Default for ResolvedSwitchPolicy {
    fn default() -> Self {
        resolve_policy(&TargetSwitchConfig::default(), None)
    }
}

/// Merge global settings with an optional override and normalize the result.
///
/// - switching is on only if both the global flag and the override allow it;
/// - a non-positive cooldown becomes [`DEFAULT_SWITCH_COOLDOWN_MS`];
/// - a non-positive pursuit percentage becomes [`DEFAULT_PURSUIT_RANGE_PERCENT`];
/// - a non-positive check interval becomes [`DEFAULT_REVERT_CHECK_INTERVAL_MS`].
#[must_use]
pub fn resolve_policy(
    global: &TargetSwitchConfig,
    overrides: Option<&TargetSwitchOverride>,
) -> ResolvedSwitchPolicy {
    let overrides = overrides.copied().unwrap_or_default();

    let enabled = global.enabled && overrides.enabled.unwrap_or(true);
    let cooldown_ms = overrides.cooldown_ms.unwrap_or(global.cooldown_ms);
    let pursuit = overrides
        .pursuit_range_percent
        .unwrap_or(global.pursuit_range_percent);
    let interval = overrides
        .revert_check_interval_ms
        .unwrap_or(global.revert_check_interval_ms);

    ResolvedSwitchPolicy {
        enabled,
        cooldown_ms: positive_or("cooldown_ms", cooldown_ms, DEFAULT_SWITCH_COOLDOWN_MS),
        pursuit_range_percent: positive_or(
            "pursuit_range_percent",
            i64::from(pursuit),
            u64::from(DEFAULT_PURSUIT_RANGE_PERCENT),
        ) as u32,
        threat_threshold: overrides.threat_threshold.unwrap_or(global.threat_threshold),
        revert_check_interval_ms: positive_or(
            "revert_check_interval_ms",
            interval,
            DEFAULT_REVERT_CHECK_INTERVAL_MS,
        ),
    }
}

fn positive_or(field: &'static str, value: i64, default: u64) -> u64 {
    if value > 0 {
        value as u64
    } else {
        tracing::debug!(field, value, default, "Normalizing non-positive policy value");
        default
    }
}

/// Stats and preferences for one kind of enemy.
///
/// Distances and speeds are whole world units so config files stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyProfile {
    /// Maximum health points.
    pub max_health: u32,
    /// Movement speed in world units per tick.
    pub speed: u32,
    /// Damage per attack.
    pub damage: u32,
    /// Attack range in world units.
    pub attack_range: u32,
    /// Ticks between attacks.
    pub attack_cooldown_ticks: u32,
    /// Structure kinds this enemy prefers to attack, most preferred first.
    #[serde(default)]
    pub structure_priority: Vec<StructureKind>,
}

impl EnemyProfile {
    /// Built-in profile for an enemy kind.
    #[must_use]
    pub fn builtin(kind: EnemyKind) -> Self {
        match kind {
            EnemyKind::Grunt => Self {
                max_health: 60,
                speed: 2,
                damage: 8,
                attack_range: 15,
                attack_cooldown_ticks: 20,
                structure_priority: Vec::new(),
            },
            EnemyKind::Archer => Self {
                max_health: 40,
                speed: 2,
                damage: 6,
                attack_range: 80,
                attack_cooldown_ticks: 25,
                structure_priority: vec![StructureKind::Tower],
            },
            EnemyKind::Brute => Self {
                max_health: 200,
                speed: 1,
                damage: 20,
                attack_range: 15,
                attack_cooldown_ticks: 40,
                structure_priority: vec![StructureKind::Gate, StructureKind::Wall],
            },
            EnemyKind::SiegeRam => Self {
                max_health: 300,
                speed: 1,
                damage: 50,
                attack_range: 20,
                attack_cooldown_ticks: 60,
                structure_priority: vec![
                    StructureKind::Gate,
                    StructureKind::Cannon,
                    StructureKind::Tower,
                    StructureKind::Wall,
                ],
            },
        }
    }

    /// Combat component for a freshly spawned enemy.
    #[must_use]
    pub fn combat_stats(&self) -> CombatStats {
        CombatStats::new(
            self.damage,
            Fixed::saturating_from_num(self.attack_range),
            self.attack_cooldown_ticks,
        )
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Global target-switch settings.
    pub target_switch: TargetSwitchConfig,
    /// Per-kind target-switch overrides.
    pub overrides: BTreeMap<EnemyKind, TargetSwitchOverride>,
    /// Per-kind enemy stats; kinds not listed use [`EnemyProfile::builtin`].
    pub enemy_profiles: BTreeMap<EnemyKind, EnemyProfile>,
}

impl SimulationConfig {
    /// Parse a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DataParseError`] if the text is not a valid config.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load a configuration from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| GameError::DataReadError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        ron::from_str(&contents).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Resolved policy for an enemy kind, falling back to the global settings.
    #[must_use]
    pub fn policy_for(&self, kind: EnemyKind) -> ResolvedSwitchPolicy {
        resolve_policy(&self.target_switch, self.overrides.get(&kind))
    }

    /// Profile for an enemy kind, falling back to the built-in one.
    #[must_use]
    pub fn profile_for(&self, kind: EnemyKind) -> EnemyProfile {
        self.enemy_profiles
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| EnemyProfile::builtin(kind))
    }
}

/// Policies resolved once per simulation, one per enemy kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    policies: BTreeMap<EnemyKind, ResolvedSwitchPolicy>,
}

impl PolicyTable {
    /// Resolve every enemy kind's policy from a configuration.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        let policies = EnemyKind::ALL
            .iter()
            .map(|&kind| (kind, config.policy_for(kind)))
            .collect();
        Self { policies }
    }

    /// Policy for an enemy kind.
    #[must_use]
    pub fn get(&self, kind: EnemyKind) -> ResolvedSwitchPolicy {
        self.policies.get(&kind).copied().unwrap_or_default()
    }
}
