//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays, save games and the headless `verify` command all assume the
//! simulation is 100% deterministic. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`siege_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted entity ID order.
//!
//! - **System randomness**: The simulation has none.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual system determinism (movement, combat, etc.)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full sieges are reproducible
//! 4. **Parallel tests**: Running N simulations on threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use siege_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a [`Simulation`] `runs` times from the same setup and compare the
/// final state hashes.
pub fn verify_simulation_runs<F>(setup_fn: F, runs: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        runs,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
}

/// Simplified determinism verification for `Simulation` type.
///
/// Runs the simulation twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_simulation_runs(setup_fn, 2, num_ticks).is_deterministic
}

/// Run N simulations on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows up under thread scheduling or
/// memory layout differences.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// Useful for debugging non-determinism by finding exactly when
/// simulations start to differ.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    // Check initial state
    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            tracing::warn!(tick, "Simulations diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that serialization round-trip preserves simulation state exactly,
/// and that the restored simulation keeps running in lockstep with the
/// original.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();

    for _ in 0..num_ticks {
        sim.tick();
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };

    if sim.state_hash() != restored.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        sim.tick();
        restored.tick();
    }

    sim.state_hash() == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for simulation testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use siege_core::components::{DamageRecord, EnemyKind, EntityId};
    use siege_core::math::{Fixed, Vec2Fixed};
    use siege_core::structures::{AttackableType, StructureKind};

    /// Generate a fixed-point number in a reasonable range for positions.
    ///
    /// Range: -2000 to 2000 (typical map size)
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-2000i32..2000i32).prop_map(Fixed::from_num)
    }

    /// Generate a fixed-point 2D vector for positions.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate attack range in fixed-point.
    pub fn arb_attack_range() -> impl Strategy<Value = Fixed> {
        (1i32..200i32).prop_map(Fixed::from_num)
    }

    /// Generate damage values (1-100).
    pub fn arb_damage() -> impl Strategy<Value = u32> {
        1u32..100u32
    }

    /// Generate a raw cooldown setting, including nonsense values.
    pub fn arb_cooldown_setting() -> impl Strategy<Value = i64> {
        prop_oneof![-10_000i64..=0, 1i64..20_000]
    }

    /// Generate a raw pursuit-range setting, including nonsense values.
    pub fn arb_pursuit_setting() -> impl Strategy<Value = i32> {
        prop_oneof![-500i32..=0, 1i32..500]
    }

    /// Generate a recorded hit from `source`.
    pub fn arb_damage_record(source: EntityId) -> impl Strategy<Value = DamageRecord> {
        (0u64..100_000, arb_damage()).prop_map(move |(at_ms, amount)| DamageRecord {
            source,
            at_ms,
            amount,
        })
    }

    /// Generate any enemy kind.
    pub fn arb_enemy_kind() -> impl Strategy<Value = EnemyKind> {
        prop::sample::select(EnemyKind::ALL.to_vec())
    }

    /// Generate any structure kind.
    pub fn arb_structure_kind() -> impl Strategy<Value = StructureKind> {
        prop::sample::select(vec![
            StructureKind::Cannon,
            StructureKind::Tower,
            StructureKind::Gate,
            StructureKind::Wall,
            StructureKind::Barracks,
        ])
    }

    /// Generate any attackable type.
    pub fn arb_attackable_type() -> impl Strategy<Value = AttackableType> {
        prop::sample::select(vec![
            AttackableType::WithUnit,
            AttackableType::Auto,
            AttackableType::None,
        ])
    }

    /// Parameters for spawning a test enemy.
    #[derive(Debug, Clone)]
    pub struct TestEnemyParams {
        /// Enemy kind.
        pub kind: EnemyKind,
        /// Spawn position.
        pub position: Vec2Fixed,
    }

    /// Generate a list of enemies to spawn.
    pub fn arb_enemy_list(max_enemies: usize) -> impl Strategy<Value = Vec<TestEnemyParams>> {
        proptest::collection::vec(
            (arb_enemy_kind(), arb_vec2_position())
                .prop_map(|(kind, position)| TestEnemyParams { kind, position }),
            1..max_enemies,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{ambush, point, standard_siege};
    use proptest::prelude::*;
    use siege_core::components::EnemyKind;
    use siege_core::orders::Order;
    use siege_core::structures::{Structure, StructureKind};

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_empty_simulation_determinism() {
        assert!(verify_simulation_determinism(Simulation::new, 100));
    }

    #[test]
    fn test_standard_siege_determinism() {
        let result = verify_simulation_runs(|| standard_siege().0, 3, 400);
        result.assert_deterministic();
    }

    #[test]
    fn test_siege_with_orders_determinism() {
        let setup = || {
            let (mut sim, ids) = standard_siege();
            sim.apply_order(Order::DeploymentTarget {
                unit: ids.guard,
                structure: ids.cannon,
            })
            .unwrap();
            sim
        };
        assert_eq!(find_first_divergence(setup, 300), None);
    }

    #[test]
    fn test_parallel_sieges_match() {
        let result = run_parallel_simulations(|| standard_siege().0, 4, 200);
        result.assert_deterministic();
        assert_eq!(result.hashes.len(), 4);
    }

    #[test]
    fn test_serialization_preserves_siege() {
        assert!(verify_serialization_determinism(
            || standard_siege().0,
            100
        ));
    }

    #[test]
    fn test_ambush_fixture_layout() {
        let (sim, enemy, wall, defender) = ambush(EnemyKind::Grunt, 10);
        let status = sim.status();
        assert_eq!(status.entities.len(), 3);
        assert!(status.entity(enemy).is_some());
        assert!(status.entity(wall).is_some());
        assert!((status.entity(defender).unwrap().y - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u64, 2u32)), compute_hash(&(1u64, 2u32)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_random_sieges_are_deterministic(enemies in arb_enemy_list(12)) {
            let setup = || {
                let mut sim = Simulation::new();
                sim.spawn_structure(Structure::new(StructureKind::Gate), point(0, 0), 800);
                sim.spawn_defender(point(30, 30));
                for enemy in &enemies {
                    sim.spawn_enemy(enemy.kind, enemy.position);
                }
                sim
            };
            prop_assert!(verify_simulation_determinism(setup, 60));
        }
    }
}
