//! Target switching, reversion and deployment behaviour, checked through the
//! public API.

use proptest::prelude::*;
use siege_core::components::{AttackTarget, DamageRecord, EnemyKind, EntityId, Position};
use siege_core::config::{
    resolve_policy, SimulationConfig, TargetSwitchConfig, DEFAULT_SWITCH_COOLDOWN_MS,
};
use siege_core::math::{Fixed, Vec2Fixed};
use siege_core::simulation::Simulation;
use siege_core::structures::{AttackableType, Structure, StructureKind};
use siege_core::targeting::{evaluate_switch, ReversionDecision, SwitchContext, SwitchReason};
use siege_core::structures::DeployError;
use siege_test_utils::determinism::strategies::{
    arb_attack_range, arb_attackable_type, arb_cooldown_setting, arb_damage_record,
    arb_pursuit_setting, arb_structure_kind,
};
use siege_test_utils::fixtures::{ambush, point};

fn context(
    now_ms: u64,
    last_switch_ms: Option<u64>,
    attack_range: Fixed,
    attacker_position: Vec2Fixed,
    damage: DamageRecord,
) -> SwitchContext {
    SwitchContext {
        now_ms,
        position: Vec2Fixed::ZERO,
        attack_range,
        current_target: Some(1),
        last_switch_ms,
        damage: Some(damage),
        attacker_position: Some(attacker_position),
    }
}

proptest! {
    #[test]
    fn prop_switch_blocked_during_cooldown(
        cooldown in arb_cooldown_setting(),
        elapsed_fraction in 0u64..1000,
        last_switch in 0u64..1_000_000,
        range in arb_attack_range(),
        damage in arb_damage_record(2),
    ) {
        let policy = resolve_policy(
            &TargetSwitchConfig { cooldown_ms: cooldown, ..Default::default() },
            None,
        );
        let elapsed = policy.cooldown_ms * elapsed_fraction / 1000;
        let ctx = context(
            last_switch + elapsed,
            Some(last_switch),
            range,
            Vec2Fixed::ZERO,
            damage,
        );

        let eval = evaluate_switch(&ctx, &policy);
        prop_assert!(!eval.should_switch);
        prop_assert_eq!(eval.reason, SwitchReason::Cooldown);
    }

    #[test]
    fn prop_switch_blocked_beyond_pursuit_range(
        pursuit in arb_pursuit_setting(),
        range in arb_attack_range(),
        beyond in 1i32..500,
        last_switch in proptest::option::of(0u64..1_000),
        damage in arb_damage_record(2),
    ) {
        let policy = resolve_policy(
            &TargetSwitchConfig { pursuit_range_percent: pursuit, ..Default::default() },
            None,
        );
        let pursuit_range = policy.pursuit_range(range);
        let attacker = Vec2Fixed::new(pursuit_range + Fixed::from_num(beyond), Fixed::ZERO);
        let ctx = context(1_000_000, last_switch, range, attacker, damage);

        let eval = evaluate_switch(&ctx, &policy);
        prop_assert!(!eval.should_switch);
        prop_assert_eq!(eval.reason, SwitchReason::OutOfRange);
    }

    #[test]
    fn prop_non_positive_settings_use_defaults(
        cooldown in -10_000i64..=0,
        pursuit in -500i32..=0,
    ) {
        let policy = resolve_policy(
            &TargetSwitchConfig {
                cooldown_ms: cooldown,
                pursuit_range_percent: pursuit,
                ..Default::default()
            },
            None,
        );
        prop_assert_eq!(policy.cooldown_ms, DEFAULT_SWITCH_COOLDOWN_MS);
        prop_assert_eq!(policy.pursuit_range(Fixed::from_num(100)), Fixed::from_num(150));
    }

    #[test]
    fn prop_second_deploy_keeps_first_unit(first in 1u64..10_000, offset in 1u64..10_000) {
        let second = first + offset;
        let mut structure = Structure::new(StructureKind::Cannon);

        prop_assert!(structure.deploy(first).is_ok());
        prop_assert_eq!(structure.deployed_unit_id(), Some(first));
        prop_assert!(structure.deploy(second).is_err());
        prop_assert_eq!(structure.deployed_unit_id(), Some(first));
    }

    #[test]
    fn prop_only_unit_structures_take_a_unit(
        kind in arb_structure_kind(),
        attackable in arb_attackable_type(),
        unit in 1u64..10_000,
    ) {
        let mut structure = Structure::new(kind).with_attackable(attackable);
        let result = structure.deploy(unit);

        if attackable == AttackableType::WithUnit {
            prop_assert!(result.is_ok());
            prop_assert_eq!(structure.deployed_unit_id(), Some(unit));
        } else {
            prop_assert_eq!(result, Err(DeployError::NotDeployable(attackable)));
            prop_assert_eq!(structure.deployed_unit_id(), None);
        }
    }

    #[test]
    fn prop_auto_and_none_never_deployable(occupied in any::<bool>(), unit in 1u64..10_000) {
        for attackable in [AttackableType::Auto, AttackableType::None] {
            let mut structure = Structure::new(StructureKind::Tower);
            if occupied {
                structure.deploy(unit).unwrap();
            }
            let structure = structure.with_attackable(attackable);
            prop_assert!(!structure.can_deploy());
        }
    }
}

#[test]
fn test_cooldown_of_minus_five_is_two_seconds() {
    let policy = resolve_policy(
        &TargetSwitchConfig {
            cooldown_ms: -5,
            ..Default::default()
        },
        None,
    );
    assert_eq!(policy.cooldown_ms, 2000);
}

#[test]
fn test_pursuit_of_minus_one_is_one_and_a_half_ranges() {
    let policy = resolve_policy(
        &TargetSwitchConfig {
            pursuit_range_percent: -1,
            ..Default::default()
        },
        None,
    );
    assert_eq!(policy.pursuit_range(Fixed::from_num(100)), Fixed::from_num(150));
}

fn attack_target(sim: &Simulation, id: EntityId) -> AttackTarget {
    sim.get_entity(id).unwrap().attack_target.unwrap()
}

/// Tick until the enemy gives up its chase, returning the decision.
fn run_until_reversion(sim: &mut Simulation, enemy: EntityId) -> ReversionDecision {
    for _ in 0..40 {
        let events = sim.tick();
        if let Some(reversion) = events.reversions.iter().find(|r| r.unit == enemy) {
            return reversion.decision;
        }
    }
    panic!("enemy {enemy} never stopped pursuing");
}

#[test]
fn test_reversion_restores_original_target() {
    let (mut sim, enemy, wall, defender) = ambush(EnemyKind::Grunt, 20);

    let events = sim.tick();
    assert_eq!(events.switches.len(), 1);
    assert_eq!(attack_target(&sim, enemy).target, Some(defender));
    assert_eq!(attack_target(&sim, enemy).original_target, Some(wall));

    sim.get_entity_mut(defender).unwrap().position = Some(Position::new(point(0, 900)));

    assert_eq!(
        run_until_reversion(&mut sim, enemy),
        ReversionDecision::RestoreOriginal(wall)
    );
    let target = attack_target(&sim, enemy);
    assert_eq!(target.target, Some(wall));
    assert!(!target.is_pursuing());
}

#[test]
fn test_reversion_falls_back_to_acquisition() {
    let (mut sim, enemy, wall, defender) = ambush(EnemyKind::Grunt, 20);
    let gate = sim.spawn_structure(Structure::new(StructureKind::Gate), point(0, -300), 800);

    sim.tick();
    assert_eq!(attack_target(&sim, enemy).target, Some(defender));

    sim.despawn_entity(wall).unwrap();
    sim.get_entity_mut(defender).unwrap().position = Some(Position::new(point(0, 900)));

    assert_eq!(run_until_reversion(&mut sim, enemy), ReversionDecision::Reacquire);
    let target = attack_target(&sim, enemy);
    assert_eq!(target.target, Some(gate));
    assert!(!target.is_pursuing());
}

#[test]
fn test_attacker_beyond_pursuit_range_is_ignored() {
    // Grunt pursuit range is 22.5; the defender's gun reaches 40.
    let (mut sim, enemy, wall, _defender) = ambush(EnemyKind::Grunt, 30);

    let events = sim.tick();
    assert_eq!(events.damage_events.iter().filter(|e| e.target == enemy).count(), 1);
    assert!(events.switches.is_empty());

    let entity = sim.get_entity(enemy).unwrap();
    assert_eq!(entity.attack_target.unwrap().target, Some(wall));
    assert!(entity.health.unwrap().last_damage.is_none());
}

#[test]
fn test_last_attacker_in_a_tick_wins() {
    let (mut sim, enemy, _wall, first) = ambush(EnemyKind::Grunt, 20);
    let second = sim.spawn_defender(point(0, -20));

    let events = sim.tick();
    let hits: Vec<EntityId> = events
        .damage_events
        .iter()
        .filter(|e| e.target == enemy)
        .map(|e| e.attacker)
        .collect();
    assert_eq!(hits, vec![first, second]);

    assert_eq!(events.switches.len(), 1);
    assert_eq!(events.switches[0].to, second);
}

#[test]
fn test_deployed_unit_cannot_be_chased() {
    let (mut sim, enemy, wall, defender) = ambush(EnemyKind::Grunt, 20);
    sim.tick();
    assert_eq!(attack_target(&sim, enemy).target, Some(defender));

    // The defender hides inside a tower far away.
    let mut tower = Structure::new(StructureKind::Tower);
    tower.deploy(defender).unwrap();
    let tower_id = sim.spawn_structure(tower, point(0, 900), 300);
    {
        let unit = sim.get_entity_mut(defender).unwrap();
        unit.deployed_in = Some(tower_id);
        unit.position = Some(Position::new(point(0, 900)));
    }

    let events = sim.tick();
    let reversion = events
        .reversions
        .iter()
        .find(|r| r.unit == enemy)
        .expect("a hidden attacker ends the chase at once");
    assert_eq!(reversion.decision, ReversionDecision::RestoreOriginal(wall));
}

#[test]
fn test_hit_during_cooldown_is_kept_until_it_expires() {
    let (mut sim, enemy, _wall, first) = ambush(EnemyKind::Grunt, 20);

    let events = sim.tick();
    assert_eq!(events.switches.len(), 1);
    assert_eq!(events.switches[0].to, first);

    // The first unit fires again at ticks 15 and 30.
    for _ in 1..35 {
        assert!(sim.tick().switches.is_empty());
    }

    let grunt_at = sim.get_entity(enemy).unwrap().position.unwrap().value;
    let second = sim.spawn_defender(grunt_at - point(0, 15));

    // Tick 35 is at 1750 ms, still inside the 2000 ms cooldown.
    let events = sim.tick();
    assert!(events
        .damage_events
        .iter()
        .any(|e| e.target == enemy && e.attacker == second));
    assert!(events.switches.is_empty());

    for tick in 36..40 {
        let record = sim.get_entity(enemy).unwrap().health.unwrap().last_damage;
        assert_eq!(record.map(|r| r.source), Some(second), "record lost before tick {tick}");
        assert!(sim.tick().switches.is_empty());
    }

    // Tick 40 is the first one past the cooldown.
    let events = sim.tick();
    assert_eq!(events.switches.len(), 1);
    assert_eq!(events.switches[0].from, Some(first));
    assert_eq!(events.switches[0].to, second);
    assert_eq!(attack_target(&sim, enemy).target, Some(second));
    assert!(sim.get_entity(enemy).unwrap().health.unwrap().last_damage.is_none());
}

#[test]
fn test_far_spawn_walks_straight_at_its_target() {
    let mut sim = Simulation::new();
    let wall = sim.spawn_structure(Structure::new(StructureKind::Wall), point(0, 0), 500);
    let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(50_000, 0));

    for _ in 0..3 {
        sim.tick();
    }

    assert_eq!(attack_target(&sim, enemy).target, Some(wall));
    let position = sim.get_entity(enemy).unwrap().position.unwrap().value;
    let epsilon = Fixed::from_num(1) / Fixed::from_num(1000);
    assert!((position.x - Fixed::from_num(49_994)).abs() < epsilon);
    assert_eq!(position.y, Fixed::ZERO);
}

#[test]
fn test_huge_pursuit_setting_still_switches() {
    let config = SimulationConfig {
        target_switch: TargetSwitchConfig {
            pursuit_range_percent: 1_000_000_000,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut sim = Simulation::with_config(config);
    sim.spawn_structure(Structure::new(StructureKind::Wall), point(1, 0), 5_000);
    let enemy = sim.spawn_enemy(EnemyKind::Grunt, point(0, 0));
    let defender = sim.spawn_defender(point(0, 35));

    let mut switched = Vec::new();
    for _ in 0..5 {
        switched.extend(sim.tick().switches);
    }

    assert_eq!(switched.len(), 1);
    assert_eq!(switched[0].to, defender);
    assert_eq!(attack_target(&sim, enemy).target, Some(defender));
}
