//! Player orders.
//!
//! Orders are what the outside world (a player, or the natural-language
//! order translator) asks friendly units to do. They are applied between
//! ticks through [`crate::simulation::Simulation::apply_order`]; an order
//! that cannot be carried out is rejected with an [`OrderError`] and leaves
//! the simulation untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::EntityId;
use crate::structures::DeployError;

/// An instruction for a friendly unit.
///
/// Serialized with an internal `type` tag:
///
/// ```json
/// {"type": "deployment_target", "unit": 4, "structure": 2}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Order {
    /// Chase and attack a specific enemy.
    AttackTarget {
        /// Unit receiving the order.
        unit: EntityId,
        /// Enemy to attack.
        target: EntityId,
    },
    /// Walk to a structure and deploy into it.
    DeploymentTarget {
        /// Unit receiving the order.
        unit: EntityId,
        /// Structure to crew.
        structure: EntityId,
    },
    /// Fall back and guard the nearest critical structure.
    DefenseCrystal {
        /// Unit receiving the order.
        unit: EntityId,
    },
    /// Bring a fallen unit back at its home position.
    ReviveUnit {
        /// The fallen unit.
        unit: EntityId,
    },
}

impl Order {
    /// The unit the order is addressed to.
    #[must_use]
    pub const fn unit(&self) -> EntityId {
        match *self {
            Self::AttackTarget { unit, .. }
            | Self::DeploymentTarget { unit, .. }
            | Self::DefenseCrystal { unit }
            | Self::ReviveUnit { unit } => unit,
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AttackTarget { .. } => "attack_target",
            Self::DeploymentTarget { .. } => "deployment_target",
            Self::DefenseCrystal { .. } => "defense_crystal",
            Self::ReviveUnit { .. } => "revive_unit",
        }
    }
}

/// Why an order was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrderError {
    /// No living entity with this id.
    #[error("unknown unit {0}")]
    UnknownUnit(EntityId),

    /// The entity exists but does not take orders (an enemy or a structure).
    #[error("entity {0} cannot be commanded")]
    NotCommandable(EntityId),

    /// The order names a target that cannot be used for it.
    #[error("entity {target} is not a valid target for unit {unit}")]
    InvalidTarget {
        /// Unit the order was addressed to.
        unit: EntityId,
        /// Offending target.
        target: EntityId,
    },

    /// The structure would refuse the unit.
    #[error("cannot deploy into structure {structure}: {reason}")]
    NotDeployable {
        /// Structure named by the order.
        structure: EntityId,
        /// What the deployment slot said.
        reason: DeployError,
    },

    /// There is no critical structure left to defend.
    #[error("no critical structure to defend")]
    NoCriticalStructure,

    /// Only fallen units can be revived.
    #[error("unit {0} has not fallen")]
    NotFallen(EntityId),

    /// The game has already been decided.
    #[error("game is over")]
    GameOver,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::AttackableType;

    #[test]
    fn test_order_json_shape() {
        let order: Order =
            serde_json::from_str(r#"{"type":"deployment_target","unit":4,"structure":2}"#)
                .unwrap();
        assert_eq!(
            order,
            Order::DeploymentTarget {
                unit: 4,
                structure: 2
            }
        );
        assert_eq!(order.unit(), 4);
        assert_eq!(order.name(), "deployment_target");

        let json = serde_json::to_string(&Order::ReviveUnit { unit: 9 }).unwrap();
        assert_eq!(json, r#"{"type":"revive_unit","unit":9}"#);
    }

    #[test]
    fn test_unknown_order_type_rejected() {
        let result: Result<Order, _> = serde_json::from_str(r#"{"type":"retreat","unit":1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = OrderError::NotDeployable {
            structure: 3,
            reason: DeployError::NotDeployable(AttackableType::Auto),
        };
        assert!(err.to_string().contains("structure 3"));
        assert_eq!(OrderError::NotFallen(5).to_string(), "unit 5 has not fallen");
    }
}
