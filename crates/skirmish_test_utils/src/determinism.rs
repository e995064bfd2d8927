//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! An authoritative server must be able to replay a match from its input
//! log and land on the same state. Sources of non-determinism include:
//!
//! - **Floating-point math**: timers are whole milliseconds and multipliers
//!   use [`skirmish_core::math::Fixed`].
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Entities live in ordered maps and are visited by ascending id.
//!
//! - **Same-tick ordering**: inputs are validated and applied in arrival
//!   order, never grouped by player or kind.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: ledger, queue and stage machine behavior in isolation
//! 2. **Property tests**: random input scripts must still produce identical
//!    hashes
//! 3. **Integration tests**: full match scenarios are reproducible
//! 4. **Parallel tests**: running N simulations on threads all match

use std::thread;

use skirmish_core::command::TickInput;
use skirmish_core::simulation::Simulation;
use tracing::warn;

use crate::fixtures::step;

/// Inputs to submit before each tick; entry `i` is consumed by tick `i`.
pub type InputScript = Vec<Vec<TickInput>>;

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

/// Submit the script entry for the simulation's current tick, then tick.
///
/// # Panics
///
/// Panics on a fatal simulation error.
pub fn step_scripted(sim: &mut Simulation, script: &[Vec<TickInput>]) {
    let tick = usize::try_from(sim.current_tick()).unwrap_or(usize::MAX);
    if let Some(inputs) = script.get(tick) {
        for input in inputs {
            sim.submit_input(*input);
        }
    }
    step(sim);
}

/// Run `setup` twice, feeding `script`, and compare final hashes.
///
/// Runs for at least as many ticks as the script has entries.
pub fn verify_simulation_determinism<F>(setup_fn: F, script: &[Vec<TickInput>], num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let ticks = num_ticks.max(script.len() as u64);
    let result = verify_determinism(
        2,
        ticks,
        &setup_fn,
        |sim| step_scripted(sim, script),
        Simulation::state_hash,
    );
    result.is_deterministic
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run N simulations on scoped threads, each fed the same script.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(
    setup_fn: F,
    script: &[Vec<TickInput>],
    num_sims: usize,
    num_ticks: u64,
) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        step_scripted(&mut sim, script);
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(hash) => hash,
                Err(_) => panic!("simulation thread panicked"),
            })
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, script: &[Vec<TickInput>], num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        step_scripted(&mut sim1, script);
        step_scripted(&mut sim2, script);

        if sim1.state_hash() != sim2.state_hash() {
            warn!(tick, "Simulations diverged");
            return Some(tick);
        }
    }

    None
}

/// Verify that a serialization round-trip preserves state and future
/// behavior exactly.
pub fn verify_serialization_determinism<F>(setup_fn: F, script: &[Vec<TickInput>], num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        step_scripted(&mut sim, script);
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(sim.config().clone(), &bytes) else {
        return false;
    };
    if restored.state_hash() != sim.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        step_scripted(&mut sim, script);
        step_scripted(&mut restored, script);
    }
    restored.state_hash() == sim.state_hash()
}

/// Proptest strategies for simulation inputs.
///
/// Ids are drawn from small ranges so that generated commands hit real
/// entities most of the time and dangling references some of the time.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::command::{ClientCommand, CommandRequest, TickInput};
    use skirmish_core::components::{BuildingId, PlayerId, Stance, UnitId};
    use skirmish_core::economy::{ResourceKind, Resources};
    use skirmish_core::math::{Fixed, Vec2Fixed};

    use super::InputScript;

    /// Generate a fixed-point coordinate.
    ///
    /// Range: -500 to 500
    pub fn arb_coordinate() -> impl Strategy<Value = Fixed> {
        (-500i32..500i32).prop_map(Fixed::from_num)
    }

    /// Generate a position.
    pub fn arb_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_coordinate(), arb_coordinate()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a resource kind.
    pub fn arb_resource_kind() -> impl Strategy<Value = ResourceKind> {
        prop_oneof![Just(ResourceKind::Feedstock), Just(ResourceKind::Energy)]
    }

    /// Generate a resource amount with each kind below `max`.
    pub fn arb_resources(max: u32) -> impl Strategy<Value = Resources> {
        (0..max, 0..max).prop_map(|(feedstock, energy)| Resources::new(feedstock, energy))
    }

    /// Generate a health delta.
    pub fn arb_health_delta() -> impl Strategy<Value = i32> {
        -6i32..=6i32
    }

    /// Generate a stance.
    pub fn arb_stance() -> impl Strategy<Value = Stance> {
        prop_oneof![
            Just(Stance::Aggressive),
            Just(Stance::Defensive),
            Just(Stance::HoldGround),
        ]
    }

    /// Generate a player id in `1..=max_player`.
    pub fn arb_player(max_player: u32) -> impl Strategy<Value = PlayerId> {
        (1..=max_player).prop_map(PlayerId)
    }

    /// Generate a client command referencing small id ranges.
    pub fn arb_client_command(
        max_player: u32,
        max_building: u64,
        max_unit: u64,
    ) -> impl Strategy<Value = ClientCommand> {
        prop_oneof![
            1 => Just(ClientCommand::StartMatch),
            4 => (1..=max_building).prop_map(|b| ClientCommand::SpawnFromBuilding {
                building: BuildingId(b),
            }),
            2 => (arb_position(), arb_player(max_player))
                .prop_map(|(position, owner)| ClientCommand::DirectSpawn { position, owner }),
            2 => (1..=max_unit, arb_stance()).prop_map(|(u, stance)| ClientCommand::SetStance {
                unit: UnitId(u),
                stance,
            }),
            1 => (1..=max_building, arb_position()).prop_map(|(b, position)| {
                ClientCommand::SetRallyPoint {
                    building: BuildingId(b),
                    position,
                }
            }),
        ]
    }

    /// Generate one tick input.
    pub fn arb_tick_input(
        max_player: u32,
        max_building: u64,
        max_unit: u64,
    ) -> impl Strategy<Value = TickInput> {
        prop_oneof![
            4 => (arb_player(max_player), arb_client_command(max_player, max_building, max_unit))
                .prop_map(|(issuer, command)| TickInput::Command(CommandRequest::new(issuer, command))),
            1 => (1..=max_unit, arb_health_delta())
                .prop_map(|(u, delta)| TickInput::HealthDelta { unit: UnitId(u), delta }),
        ]
    }

    /// Generate an input script of up to `ticks` ticks with up to
    /// `per_tick` inputs each, for a two-player match.
    pub fn arb_input_script(ticks: usize, per_tick: usize) -> impl Strategy<Value = InputScript> {
        proptest::collection::vec(
            proptest::collection::vec(arb_tick_input(2, 3, 8), 0..per_tick),
            1..ticks,
        )
    }

    /// A single ledger operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LedgerOp {
        /// `reserve(kind, amount)`.
        Reserve(ResourceKind, u32),
        /// `commit(kind, amount)`.
        Commit(ResourceKind, u32),
        /// `release(kind, amount)`.
        Release(ResourceKind, u32),
        /// `deposit(kind, amount)`.
        Deposit(ResourceKind, u32),
    }

    /// Generate a ledger operation with amounts below 200.
    pub fn arb_ledger_op() -> impl Strategy<Value = LedgerOp> {
        (arb_resource_kind(), 0u32..200u32, 0u8..4u8).prop_map(|(kind, amount, op)| match op {
            0 => LedgerOp::Reserve(kind, amount),
            1 => LedgerOp::Commit(kind, amount),
            2 => LedgerOp::Release(kind, amount),
            _ => LedgerOp::Deposit(kind, amount),
        })
    }
}
