//! Defensive structures and their deployment slots.
//!
//! A structure can host one friendly unit. Whether a structure needs that
//! unit to function is decided by its [`AttackableType`]:
//!
//! | Attackable type | Deployable | Targetable by enemies | Active (fires) |
//! |-----------------|------------|-----------------------|----------------|
//! | `WithUnit`      | yes        | only while occupied   | only while occupied |
//! | `Auto`          | no         | always                | always         |
//! | `None`          | no         | never                 | never          |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::EntityId;

/// Number of units a deployment slot can hold.
pub const MAX_DEPLOYED_UNITS: u8 = 1;

/// Kinds of defensive structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    /// Heavy gun emplacement, crewed by a deployed unit.
    Cannon,
    /// Archer tower, crewed by a deployed unit.
    Tower,
    /// Fortified gate, always standing in the way.
    Gate,
    /// Wall segment, always standing in the way.
    Wall,
    /// Troop housing behind the lines; never a valid target.
    Barracks,
}

impl StructureKind {
    /// How this kind of structure is gated when nothing overrides it.
    #[must_use]
    pub const fn default_attackable(self) -> AttackableType {
        match self {
            Self::Cannon | Self::Tower => AttackableType::WithUnit,
            Self::Gate | Self::Wall => AttackableType::Auto,
            Self::Barracks => AttackableType::None,
        }
    }

    /// Stable snake_case name used in logs and status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cannon => "cannon",
            Self::Tower => "tower",
            Self::Gate => "gate",
            Self::Wall => "wall",
            Self::Barracks => "barracks",
        }
    }
}

/// Gates deployment, targetability and activity of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackableType {
    /// Needs a deployed unit to be active or attackable.
    WithUnit,
    /// Always active, never takes a unit.
    Auto,
    /// Never active and never a valid target.
    None,
}

/// Why a deployment was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeployError {
    /// The structure does not accept units at all.
    #[error("structure does not accept deployed units ({0:?})")]
    NotDeployable(AttackableType),
    /// The slot is already taken.
    #[error("deployment slot already occupied by unit {occupant}")]
    SlotOccupied {
        /// Unit currently in the slot.
        occupant: EntityId,
    },
}

/// Structure component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    /// What kind of structure this is.
    pub kind: StructureKind,
    /// Deployment and targeting gate.
    pub attackable: AttackableType,
    /// Losing this structure loses the game.
    pub critical: bool,
    deployed_unit: Option<EntityId>,
}

impl Structure {
    /// Create a non-critical structure gated by its kind's default.
    #[must_use]
    pub const fn new(kind: StructureKind) -> Self {
        Self {
            kind,
            attackable: kind.default_attackable(),
            critical: false,
            deployed_unit: None,
        }
    }

    /// Builder method to override the attackable type.
    #[must_use]
    pub const fn with_attackable(mut self, attackable: AttackableType) -> Self {
        self.attackable = attackable;
        self
    }

    /// Builder method to mark the structure as critical for loss.
    #[must_use]
    pub const fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Whether a unit could be deployed right now.
    ///
    /// Always false for `Auto` and `None` structures, whatever the slot holds.
    #[must_use]
    pub const fn can_deploy(&self) -> bool {
        matches!(self.attackable, AttackableType::WithUnit) && self.deployed_unit.is_none()
    }

    /// Deploy `unit` into the slot.
    ///
    /// On failure the slot is left untouched.
    pub fn deploy(&mut self, unit: EntityId) -> Result<(), DeployError> {
        if !matches!(self.attackable, AttackableType::WithUnit) {
            return Err(DeployError::NotDeployable(self.attackable));
        }
        if let Some(occupant) = self.deployed_unit {
            return Err(DeployError::SlotOccupied { occupant });
        }
        self.deployed_unit = Some(unit);
        Ok(())
    }

    /// Empty the slot, returning whoever was in it. Safe on an empty slot.
    pub fn undeploy(&mut self) -> Option<EntityId> {
        self.deployed_unit.take()
    }

    /// Whether a unit currently occupies the slot.
    #[must_use]
    pub const fn has_deployed_unit(&self) -> bool {
        self.deployed_unit.is_some()
    }

    /// The unit currently occupying the slot.
    #[must_use]
    pub const fn deployed_unit_id(&self) -> Option<EntityId> {
        self.deployed_unit
    }

    /// Capacity of the deployment slot.
    #[must_use]
    pub const fn max_units(&self) -> u8 {
        MAX_DEPLOYED_UNITS
    }

    /// Whether enemies may pick this structure as a target.
    #[must_use]
    pub const fn is_targetable(&self) -> bool {
        match self.attackable {
            AttackableType::WithUnit => self.deployed_unit.is_some(),
            AttackableType::Auto => true,
            AttackableType::None => false,
        }
    }

    /// Whether the structure's own weapons are manned.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_targetable()
    }
}
