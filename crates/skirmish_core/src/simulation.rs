//! Core simulation loop.
//!
//! The simulation is advanced one tick at a time by a single scheduler.
//! Each tick runs the same fixed pipeline:
//!
//! 1. Drain the inbox and validate it into a [`MutationLog`].
//! 2. Apply the log to the live state (the only commit point for client
//!    intent).
//! 3. Count production queues down; commit and spawn finished units.
//! 4. Tick despawn countdowns, apply accumulated health deltas, refresh
//!    speed multipliers.
//! 5. Recompute player standings and run the match phase machine.
//!
//! # Determinism
//!
//! - No floating-point math: timers are integer milliseconds, multipliers
//!   are fixed-point via [`Fixed`](crate::math::Fixed)
//! - Entities are stored in ordered maps and always visited by ascending id
//! - Same inputs in the same ticks always produce the same
//!   [`state_hash`](Simulation::state_hash)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use skirmish_core::prelude::*;
//!
//! let config = GameConfig::from_ron_str(
//!     r#"GameConfigData(units: [(id: "scout", cost: (feedstock: 30), build_time_ms: 100)])"#,
//!     "inline",
//! )
//! .unwrap();
//! let mut sim = Simulation::new(Arc::new(config));
//! sim.connect_player(PlayerId(1)).unwrap();
//! let barracks = sim
//!     .place_building(PlayerId(1), Vec2Fixed::from_ints(5, 5), "scout")
//!     .unwrap();
//!
//! sim.submit(CommandRequest::new(
//!     PlayerId(1),
//!     ClientCommand::SpawnFromBuilding { building: barracks },
//! ));
//! sim.tick(TICK_DURATION_MS).unwrap();
//! sim.tick(TICK_DURATION_MS).unwrap();
//!
//! assert_eq!(sim.world().units.len(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{self, CommandRequest, Rejection, TickInput};
use crate::components::{BuildingId, PlayerId, UnitId};
use crate::config::GameConfig;
use crate::economy::{ResourceKind, Resources};
use crate::error::{GameError, Result};
use crate::health::StageTransition;
use crate::match_state::{MatchEvent, MatchPhase, MatchState, PlayerStanding};
use crate::math::{Millis, Vec2Fixed};
use crate::mutation::MutationLog;
use crate::player::Player;
use crate::production::Building;
use crate::snapshot::StateSnapshot;
use crate::unit::Unit;
use crate::world::World;

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// Duration of one tick in milliseconds.
pub const TICK_DURATION_MS: Millis = 1000 / TICK_RATE;

/// A production that finished this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionComplete {
    /// Building that produced the unit.
    pub building: BuildingId,
    /// Player who paid.
    pub owner: PlayerId,
    /// The new unit.
    pub unit: UnitId,
    /// Resources committed.
    pub cost: Resources,
}

/// Everything observable that happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Tick these events belong to.
    pub tick: u64,
    /// Buildings that accepted a production this tick, once per entry.
    pub queued: Vec<BuildingId>,
    /// Units created this tick, direct spawns and productions alike.
    pub spawned: Vec<UnitId>,
    /// Productions that finished.
    pub productions_completed: Vec<ProductionComplete>,
    /// Health stage changes.
    pub transitions: Vec<StageTransition>,
    /// Units removed after their despawn countdown.
    pub despawned: Vec<UnitId>,
    /// Inputs that failed validation.
    pub rejections: Vec<Rejection>,
    /// Match phase events.
    pub match_events: Vec<MatchEvent>,
}

/// Anything the hosting server can do to a simulation between ticks.
///
/// Recorded by replays so that lifecycle changes made mid-match are
/// reproduced along with client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Queue an input for the next tick.
    Input(TickInput),
    /// [`Simulation::connect_player`].
    Connect(PlayerId),
    /// [`Simulation::disconnect_player`].
    Disconnect(PlayerId),
    /// [`Simulation::place_building`].
    PlaceBuilding {
        /// Owning player.
        owner: PlayerId,
        /// World position.
        position: Vec2Fixed,
        /// Unit type key.
        unit_type: String,
    },
    /// [`Simulation::destroy_building`].
    DestroyBuilding(BuildingId),
    /// [`Simulation::grant_resources`].
    Grant {
        /// Receiving player.
        player: PlayerId,
        /// Income.
        amount: Resources,
    },
    /// [`Simulation::reset_match`].
    ResetMatch,
}

/// The authoritative game simulation.
#[derive(Debug, Clone)]
pub struct Simulation {
    tick: u64,
    world: World,
    match_state: MatchState,
    config: Arc<GameConfig>,
    /// Inputs received since the last tick, in arrival order.
    inbox: Vec<TickInput>,
}

/// Serializable part of a [`Simulation`]; the configuration is supplied
/// separately on restore.
#[derive(Serialize, Deserialize)]
struct SavedState {
    tick: u64,
    world: World,
    match_state: MatchState,
    inbox: Vec<TickInput>,
}

impl Simulation {
    /// Create an empty simulation in `WaitingForPlayers`.
    #[must_use]
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self {
            tick: 0,
            world: World::new(),
            match_state: MatchState::new(),
            config,
            inbox: Vec::new(),
        }
    }

    /// Number of ticks run so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Live entity store.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Match phase machine.
    #[must_use]
    pub const fn match_state(&self) -> &MatchState {
        &self.match_state
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<GameConfig> {
        &self.config
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.world.players.get(&id)
    }

    /// Look up a building.
    #[must_use]
    pub fn building(&self, id: BuildingId) -> Option<&Building> {
        self.world.buildings.get(id)
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.world.units.get(id)
    }

    /// Inputs waiting for the next tick.
    #[must_use]
    pub fn pending_inputs(&self) -> &[TickInput] {
        &self.inbox
    }

    /// Queue a client request for the next tick.
    pub fn submit(&mut self, request: CommandRequest) {
        self.inbox.push(TickInput::Command(request));
    }

    /// Queue a server-side health delta for the next tick.
    pub fn submit_health_delta(&mut self, unit: UnitId, delta: i32) {
        self.inbox.push(TickInput::HealthDelta { unit, delta });
    }

    /// Queue a raw input. Replays go through this.
    pub fn submit_input(&mut self, input: TickInput) {
        self.inbox.push(input);
    }

    /// Perform a server action.
    ///
    /// # Errors
    ///
    /// Same as the lifecycle method the action maps to.
    pub fn perform(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Input(input) => {
                self.submit_input(*input);
                Ok(())
            }
            Action::Connect(player) => self.connect_player(*player),
            Action::Disconnect(player) => self.disconnect_player(*player),
            Action::PlaceBuilding {
                owner,
                position,
                unit_type,
            } => self.place_building(*owner, *position, unit_type).map(|_| ()),
            Action::DestroyBuilding(building) => self.destroy_building(*building),
            Action::Grant { player, amount } => self.grant_resources(*player, *amount),
            Action::ResetMatch => {
                self.reset_match();
                Ok(())
            }
        }
    }

    /// Advance the simulation by one tick of `elapsed` milliseconds.
    ///
    /// # Errors
    ///
    /// Only internal invariant violations are returned
    /// ([`GameError::LedgerViolation`], [`GameError::InvariantViolation`]).
    /// Invalid client input is reported in [`TickEvents::rejections`].
    pub fn tick(&mut self, elapsed: Millis) -> Result<TickEvents> {
        let mut events = TickEvents {
            tick: self.tick,
            ..TickEvents::default()
        };

        // 1. Ingestion
        let inputs = std::mem::take(&mut self.inbox);
        let mut log = MutationLog::new();
        events.rejections =
            command::ingest(&inputs, &self.world, &self.match_state, &self.config, &mut log);

        // 2. Commit point
        log.apply(
            &mut self.world,
            &mut self.match_state,
            &self.config,
            self.tick,
            &mut events,
        )?;

        // 3. Production
        self.run_production_system(elapsed, &mut events)?;

        // 4. Health
        self.run_health_system(elapsed, &mut events);

        // 5. Match phase
        let standings = self.refresh_standings();
        let end_grace = self.config.rules().end_grace_ms;
        events
            .match_events
            .extend(self.match_state.evaluate(&standings, elapsed, end_grace));

        self.tick += 1;

        #[cfg(any(debug_assertions, feature = "hash-trace"))]
        {
            let hash = self.state_hash();
            debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        Ok(events)
    }

    fn run_production_system(&mut self, elapsed: Millis, events: &mut TickEvents) -> Result<()> {
        let tick = self.tick;
        let stage = self.config.rules().default_stage;

        let finished: Vec<_> = self
            .world
            .buildings
            .iter_mut()
            .filter_map(|(_, building)| building.queue.advance(elapsed))
            .collect();

        for done in finished {
            let player = self.world.players.get_mut(&done.owner).ok_or_else(|| {
                GameError::InvariantViolation {
                    tick,
                    detail: format!("production owner {:?} is not connected", done.owner),
                }
            })?;
            player
                .ledger
                .commit_cost(&done.reserved)
                .map_err(|source| GameError::LedgerViolation { tick, source })?;
            player.score = player.score.saturating_add(done.reserved.total());

            let unit = self
                .world
                .units
                .insert_with(|_| Unit::new(done.owner, done.spawn_position, stage));
            debug!(building = ?done.building, ?unit, owner = ?done.owner, "Production complete");

            events.spawned.push(unit);
            events.productions_completed.push(ProductionComplete {
                building: done.building,
                owner: done.owner,
                unit,
                cost: done.reserved,
            });
        }
        Ok(())
    }

    fn run_health_system(&mut self, elapsed: Millis, events: &mut TickEvents) {
        // Countdowns armed this tick start running on the next one.
        self.world.units.retain(|&id, unit| {
            if unit.health.tick_despawn(elapsed) {
                events.despawned.push(id);
                false
            } else {
                true
            }
        });

        let despawn_delay = self.config.rules().despawn_delay_ms;
        let table = self.config.health_table();
        for (&id, unit) in self.world.units.iter_mut() {
            if let Some(transition) = unit.health.apply_pending(id, despawn_delay) {
                if transition.is_death() {
                    debug!(unit = ?id, owner = ?unit.owner, "Unit died");
                }
                events.transitions.push(transition);
            }
            unit.refresh_speed(table);
        }
    }

    fn refresh_standings(&mut self) -> Vec<PlayerStanding> {
        let counts = self.world.alive_unit_counts();
        let floor = self.config.minimum_cost();
        self.world
            .players
            .values_mut()
            .map(|player| {
                player.alive_units = counts.get(&player.id).copied().unwrap_or(0);
                player.can_afford_cheapest = floor.is_affordable(&player.ledger.available());
                PlayerStanding {
                    player: player.id,
                    alive_units: player.alive_units,
                    can_afford_cheapest: player.can_afford_cheapest,
                }
            })
            .collect()
    }

    /// Register a newly connected player with the starting balance.
    ///
    /// Players joining after the match has started get gameplay enabled
    /// but are not participants of the running match.
    pub fn connect_player(&mut self, id: PlayerId) -> Result<()> {
        if self.world.players.contains_key(&id) {
            return Err(GameError::DuplicatePlayer(id));
        }
        let mut player = Player::new(id, self.config.rules().starting_resources);
        player.gameplay_enabled = self.match_state.phase() != MatchPhase::WaitingForPlayers;
        player.can_afford_cheapest = self
            .config
            .minimum_cost()
            .is_affordable(&player.ledger.available());
        self.world.players.insert(id, player);
        info!(player = ?id, "Player connected");
        Ok(())
    }

    /// Remove a player, their buildings (releasing every reservation) and
    /// their units.
    pub fn disconnect_player(&mut self, id: PlayerId) -> Result<()> {
        if !self.world.players.contains_key(&id) {
            return Err(GameError::UnknownPlayer(id));
        }
        for building in self.world.buildings_of(id) {
            self.destroy_building(building)?;
        }
        self.world.units.retain(|_, unit| unit.owner != id);

        if let Some(player) = self.world.players.remove(&id) {
            if player.ledger.reserved() != Resources::ZERO {
                warn!(player = ?id, reserved = ?player.ledger.reserved(), "Disconnected with reservations outstanding");
            }
        }
        info!(player = ?id, "Player disconnected");
        Ok(())
    }

    /// Place an idle production building for `owner`.
    pub fn place_building(
        &mut self,
        owner: PlayerId,
        position: Vec2Fixed,
        unit_type: &str,
    ) -> Result<BuildingId> {
        if !self.world.players.contains_key(&owner) {
            return Err(GameError::UnknownPlayer(owner));
        }
        let production = *self
            .config
            .unit(unit_type)
            .ok_or_else(|| GameError::UnknownUnitType(unit_type.to_owned()))?;
        let max_queue_len = self.config.rules().max_queue_len;
        let id = self.world.buildings.insert_with(|_| {
            Building::new(owner, position, unit_type, production, max_queue_len)
        });
        debug!(building = ?id, ?owner, unit_type, "Building placed");
        Ok(id)
    }

    /// Destroy a building, cancelling its queue.
    ///
    /// Every queued production releases its reservation, in enqueue order,
    /// before the building is removed.
    pub fn destroy_building(&mut self, id: BuildingId) -> Result<()> {
        let tick = self.tick;
        let building = self
            .world
            .buildings
            .get_mut(id)
            .ok_or(GameError::UnknownBuilding(id))?;
        let owner = building.owner;
        let cancelled = building.queue.drain_all();

        if !cancelled.is_empty() {
            let player =
                self.world
                    .players
                    .get_mut(&owner)
                    .ok_or_else(|| GameError::InvariantViolation {
                        tick,
                        detail: format!("building {id:?} owned by unknown player {owner:?}"),
                    })?;
            for production in &cancelled {
                player
                    .ledger
                    .release_cost(&production.reserved)
                    .map_err(|source| GameError::LedgerViolation { tick, source })?;
            }
        }

        self.world.buildings.remove(id);
        debug!(building = ?id, cancelled = cancelled.len(), "Building destroyed");
        Ok(())
    }

    /// Credit income to a player's balance.
    pub fn grant_resources(&mut self, id: PlayerId, amount: Resources) -> Result<()> {
        let player = self
            .world
            .players
            .get_mut(&id)
            .ok_or(GameError::UnknownPlayer(id))?;
        for kind in ResourceKind::ALL {
            player.ledger.deposit(kind, amount.get(kind));
        }
        Ok(())
    }

    /// Return the match to `WaitingForPlayers` and disable gameplay.
    ///
    /// Entities, balances and scores are kept.
    pub fn reset_match(&mut self) {
        self.match_state.reset();
        for player in self.world.players.values_mut() {
            player.gameplay_enabled = false;
        }
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Used for desync detection and replay verification. Two simulations
    /// with identical state will produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);

        self.world.players.len().hash(&mut hasher);
        for (id, player) in &self.world.players {
            id.hash(&mut hasher);
            player.ledger.balance().hash(&mut hasher);
            player.ledger.reserved().hash(&mut hasher);
            player.score.hash(&mut hasher);
            player.gameplay_enabled.hash(&mut hasher);
        }

        self.world.buildings.len().hash(&mut hasher);
        for (id, building) in self.world.buildings.iter() {
            id.hash(&mut hasher);
            building.owner.hash(&mut hasher);
            building.position.hash_bits(&mut hasher);
            if let Some(rally) = building.rally_point {
                rally.hash_bits(&mut hasher);
            }
            building.queue.len().hash(&mut hasher);
            for entry in building.queue.iter() {
                entry.remaining.hash(&mut hasher);
                entry.reserved.hash(&mut hasher);
                entry.spawn_position.hash_bits(&mut hasher);
            }
        }

        self.world.units.len().hash(&mut hasher);
        for (id, unit) in self.world.units.iter() {
            id.hash(&mut hasher);
            unit.owner.hash(&mut hasher);
            unit.position.hash_bits(&mut hasher);
            unit.stance.hash(&mut hasher);
            unit.health.stage().hash(&mut hasher);
            unit.health.despawn_timer().hash(&mut hasher);
            unit.speed_multiplier.to_bits().hash(&mut hasher);
        }

        self.match_state.phase().hash(&mut hasher);
        self.match_state.start_timer().hash(&mut hasher);
        self.match_state.end_timer().hash(&mut hasher);
        self.match_state.outcome().hash(&mut hasher);
        self.match_state.participants().hash(&mut hasher);

        hasher.finish()
    }

    /// Capture a publishable view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(self)
    }

    /// Serialize the simulation state (without configuration) to bytes.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let saved = SavedState {
            tick: self.tick,
            world: self.world.clone(),
            match_state: self.match_state.clone(),
            inbox: self.inbox.clone(),
        };
        bincode::serialize(&saved).map_err(|e| GameError::Serialization(e.to_string()))
    }

    /// Restore a simulation from [`serialize`](Self::serialize) output.
    ///
    /// # Errors
    /// Returns an error if deserialization fails.
    pub fn deserialize(config: Arc<GameConfig>, data: &[u8]) -> Result<Self> {
        let saved: SavedState =
            bincode::deserialize(data).map_err(|e| GameError::Serialization(e.to_string()))?;
        Ok(Self {
            tick: saved.tick,
            world: saved.world,
            match_state: saved.match_state,
            config,
            inbox: saved.inbox,
        })
    }
}
