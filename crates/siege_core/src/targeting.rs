//! Enemy targeting decisions.
//!
//! Three pieces of logic live here, all pure functions over component data:
//!
//! - [`evaluate_switch`]: after taking damage, should an enemy turn on its
//!   attacker? Governed by a [`ResolvedSwitchPolicy`] (cooldown, pursuit
//!   range, threat threshold).
//! - [`evaluate_reversion`]: while chasing an attacker, should the enemy give
//!   up and go back to what it was doing?
//! - [`acquire_target`]: standard nearest-target selection, used for idle
//!   units and as the fallback when reversion has nothing to return to.
//!
//! The simulation gathers the inputs, calls these, and applies the results
//! with [`apply_switch`] and friends.

use serde::{Deserialize, Serialize};

use crate::components::{AttackTarget, DamageRecord, EntityId, Health, Movement};
use crate::config::ResolvedSwitchPolicy;
use crate::math::{Fixed, Vec2Fixed};
use crate::structures::StructureKind;

/// Largest proximity bonus an attacker standing right next to the unit earns.
pub const MAX_PROXIMITY_BONUS: u32 = 100;

/// Why a switch evaluation came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    /// Switching is turned off globally or for this enemy kind.
    Disabled,
    /// No attacker recorded, or it no longer exists.
    NoAttacker,
    /// Too soon after the previous switch.
    Cooldown,
    /// The attacker is beyond pursuit range.
    OutOfRange,
    /// The attacker is already the current target.
    AlreadyTargeting,
    /// The attacker is not threatening enough to be worth chasing.
    BelowThreshold,
    /// Switch to the attacker.
    SwitchApproved,
}

impl SwitchReason {
    /// Whether the damage record should stay around for another look.
    ///
    /// Only a cooldown rejection keeps it; every other outcome consumes it.
    #[must_use]
    pub const fn retains_record(self) -> bool {
        matches!(self, Self::Cooldown)
    }
}

/// Result of a target-switch evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchEvaluation {
    /// Whether the unit should switch.
    pub should_switch: bool,
    /// The attacker to switch to, when approved.
    pub new_target: Option<EntityId>,
    /// Why.
    pub reason: SwitchReason,
    /// How threatening the attacker is; zero when it was never scored.
    pub priority: u32,
}

impl SwitchEvaluation {
    const fn rejected(reason: SwitchReason, priority: u32) -> Self {
        Self {
            should_switch: false,
            new_target: None,
            reason,
            priority,
        }
    }

    const fn approved(target: EntityId, priority: u32) -> Self {
        Self {
            should_switch: true,
            new_target: Some(target),
            reason: SwitchReason::SwitchApproved,
            priority,
        }
    }
}

/// Everything [`evaluate_switch`] needs to know about one enemy.
#[derive(Debug, Clone, Copy)]
pub struct SwitchContext {
    /// Current simulation time.
    pub now_ms: u64,
    /// Where the enemy stands.
    pub position: Vec2Fixed,
    /// The enemy's attack range.
    pub attack_range: Fixed,
    /// Target the enemy is currently engaged with.
    pub current_target: Option<EntityId>,
    /// When the enemy last switched targets.
    pub last_switch_ms: Option<u64>,
    /// The hit that triggered this evaluation.
    pub damage: Option<DamageRecord>,
    /// Where the attacker stands, or `None` if it is gone or dead.
    pub attacker_position: Option<Vec2Fixed>,
}

/// Decide whether an enemy should switch to the entity that last hit it.
///
/// Rules, first match wins:
/// 1. switching disabled → [`SwitchReason::Disabled`]
/// 2. no live attacker → [`SwitchReason::NoAttacker`]
/// 3. within cooldown of the last switch → [`SwitchReason::Cooldown`]
/// 4. attacker beyond pursuit range → [`SwitchReason::OutOfRange`]
/// 5. attacker already targeted → [`SwitchReason::AlreadyTargeting`]
/// 6. priority below threat threshold → [`SwitchReason::BelowThreshold`]
/// 7. otherwise → [`SwitchReason::SwitchApproved`]
#[must_use]
pub fn evaluate_switch(ctx: &SwitchContext, policy: &ResolvedSwitchPolicy) -> SwitchEvaluation {
    if !policy.enabled {
        return SwitchEvaluation::rejected(SwitchReason::Disabled, 0);
    }

    let (Some(damage), Some(attacker_position)) = (ctx.damage, ctx.attacker_position) else {
        return SwitchEvaluation::rejected(SwitchReason::NoAttacker, 0);
    };

    if let Some(last_switch) = ctx.last_switch_ms {
        if ctx.now_ms.saturating_sub(last_switch) < policy.cooldown_ms {
            return SwitchEvaluation::rejected(SwitchReason::Cooldown, 0);
        }
    }

    let pursuit_range = policy.pursuit_range(ctx.attack_range);
    if !ctx.position.within(attacker_position, pursuit_range) {
        return SwitchEvaluation::rejected(SwitchReason::OutOfRange, 0);
    }

    if ctx.current_target == Some(damage.source) {
        return SwitchEvaluation::rejected(SwitchReason::AlreadyTargeting, 0);
    }

    let priority = switch_priority(
        damage.amount,
        ctx.position.distance(attacker_position),
        pursuit_range,
    );
    if priority < policy.threat_threshold {
        return SwitchEvaluation::rejected(SwitchReason::BelowThreshold, priority);
    }

    SwitchEvaluation::approved(damage.source, priority)
}

/// Score an attacker: the damage it just dealt plus a bonus for being close.
///
/// The bonus falls linearly from [`MAX_PROXIMITY_BONUS`] at zero distance to
/// nothing at the edge of pursuit range.
#[must_use]
pub fn switch_priority(damage: u32, distance: Fixed, pursuit_range: Fixed) -> u32 {
    let bonus = if pursuit_range <= Fixed::ZERO || distance >= pursuit_range {
        0
    } else {
        let slack = (pursuit_range - distance) / pursuit_range;
        (slack * Fixed::from_num(MAX_PROXIMITY_BONUS)).to_num::<u32>()
    };
    damage.saturating_add(bonus)
}

/// Apply an approved switch to an enemy's components.
///
/// Remembers the pre-switch target (unless a chase is already under way),
/// points the enemy at the attacker, heads for it, stamps the switch time and
/// consumes the damage record so the same hit cannot trigger again.
pub fn apply_switch(
    attack_target: &mut AttackTarget,
    movement: Option<&mut Movement>,
    health: &mut Health,
    attacker: EntityId,
    attacker_position: Vec2Fixed,
    now_ms: u64,
) {
    if !attack_target.pursuing {
        attack_target.original_target = attack_target.target;
        attack_target.pursuing = true;
    }
    attack_target.target = Some(attacker);
    attack_target.last_switch_ms = Some(now_ms);
    attack_target.last_reversion_check_ms = now_ms;

    if let Some(movement) = movement {
        movement.destination = Some(attacker_position);
    }

    health.last_damage = None;
}

/// Outcome of a reversion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversionDecision {
    /// The check interval has not elapsed yet.
    NotDue,
    /// Keep chasing the attacker.
    KeepPursuing,
    /// Go back to the remembered target.
    RestoreOriginal(EntityId),
    /// The remembered target is no good; pick a new one the standard way.
    Reacquire,
}

/// Everything [`evaluate_reversion`] needs to know about one pursuing enemy.
#[derive(Debug, Clone, Copy)]
pub struct ReversionContext {
    /// Current simulation time.
    pub now_ms: u64,
    /// When the enemy last ran this check.
    pub last_check_ms: u64,
    /// Where the enemy stands.
    pub position: Vec2Fixed,
    /// The enemy's attack range.
    pub attack_range: Fixed,
    /// Where the pursued attacker stands, or `None` if it is gone or dead.
    pub pursued_position: Option<Vec2Fixed>,
    /// The target held before the switch, if there was one.
    pub original_target: Option<EntityId>,
    /// Whether that target still exists, is alive and can be attacked.
    pub original_valid: bool,
}

/// Decide whether a pursuing enemy should give up the chase.
///
/// A vanished attacker ends the chase immediately. Otherwise the distance is
/// only checked every `revert_check_interval_ms`.
#[must_use]
pub fn evaluate_reversion(
    ctx: &ReversionContext,
    policy: &ResolvedSwitchPolicy,
) -> ReversionDecision {
    let give_up = match ctx.pursued_position {
        None => true,
        Some(pursued) => {
            if ctx.now_ms.saturating_sub(ctx.last_check_ms) < policy.revert_check_interval_ms {
                return ReversionDecision::NotDue;
            }
            !ctx
                .position
                .within(pursued, policy.pursuit_range(ctx.attack_range))
        }
    };

    match ctx.original_target {
        _ if !give_up => ReversionDecision::KeepPursuing,
        Some(original) if ctx.original_valid => ReversionDecision::RestoreOriginal(original),
        _ => ReversionDecision::Reacquire,
    }
}

/// A potential target for [`acquire_target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCandidate {
    /// Candidate entity.
    pub id: EntityId,
    /// Where it stands.
    pub position: Vec2Fixed,
    /// Its structure kind, if it is a structure.
    pub structure: Option<StructureKind>,
}

/// Pick the best target from `candidates`.
///
/// Candidates whose structure kind appears earlier in `preference` win;
/// anything not listed (including plain units) ranks after every listed
/// kind. Within a rank the nearest candidate wins, then the lowest id.
/// Candidates farther than `max_range` are ignored.
#[must_use]
pub fn acquire_target(
    from: Vec2Fixed,
    candidates: &[TargetCandidate],
    preference: &[StructureKind],
    max_range: Option<Fixed>,
) -> Option<EntityId> {
    candidates
        .iter()
        .filter(|c| max_range.map_or(true, |range| from.within(c.position, range)))
        .min_by_key(|c| {
            let rank = c
                .structure
                .and_then(|kind| preference.iter().position(|&p| p == kind))
                .unwrap_or(preference.len());
            (rank, from.distance_squared(c.position), c.id)
        })
        .map(|c| c.id)
}
