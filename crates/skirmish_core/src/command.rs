//! Client commands and their validation.
//!
//! Ingestion walks the tick's inputs in arrival order and turns each one
//! into either exactly one [`Mutation`] or a [`Rejection`]. Validation reads
//! the pre-tick state through a small overlay that tracks what earlier
//! inputs in the same tick have already claimed (reservations, queue slots,
//! a match start). Two spawn requests racing for the same resources are
//! therefore serialized by arrival order, and the second one sees the first
//! one's reservation. Nothing in the live state is touched here; that
//! happens when the [`MutationLog`] is applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::components::{BuildingId, PlayerId, Stance, UnitId};
use crate::config::GameConfig;
use crate::economy::ResourceLedger;
use crate::match_state::{MatchPhase, MatchState};
use crate::math::Vec2Fixed;
use crate::mutation::{Mutation, MutationLog};
use crate::world::World;

/// Intent submitted by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    /// Start the match from the lobby.
    StartMatch,
    /// Queue one unit at a building.
    SpawnFromBuilding {
        /// Building to produce at.
        building: BuildingId,
    },
    /// Create a unit immediately, without a building or a cost.
    DirectSpawn {
        /// Where to put it.
        position: Vec2Fixed,
        /// Player who will own it.
        owner: PlayerId,
    },
    /// Change a unit's stance.
    SetStance {
        /// Target unit.
        unit: UnitId,
        /// New stance.
        stance: Stance,
    },
    /// Change where a building's units appear.
    SetRallyPoint {
        /// Target building.
        building: BuildingId,
        /// New rally point.
        position: Vec2Fixed,
    },
}

/// A command tagged with the player who sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Authenticated sender.
    pub issuer: PlayerId,
    /// What they asked for.
    pub command: ClientCommand,
}

impl CommandRequest {
    /// Tag `command` with `issuer`.
    #[must_use]
    pub const fn new(issuer: PlayerId, command: ClientCommand) -> Self {
        Self { issuer, command }
    }
}

/// Anything that can enter the tick's mutation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickInput {
    /// A client command.
    Command(CommandRequest),
    /// A server-authoritative health change (from combat resolution).
    HealthDelta {
        /// Unit hit or healed.
        unit: UnitId,
        /// Stage steps; negative is damage.
        delta: i32,
    },
}

/// Why an input produced no mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum RejectReason {
    /// The cost could not be reserved.
    #[error("insufficient resources")]
    InsufficientResources,
    /// The issuer does not own the target.
    #[error("issuer does not own the target")]
    UnauthorizedIssuer,
    /// The target does not exist (never did, or was destroyed).
    #[error("unknown or destroyed target")]
    InvalidReference,
    /// The command is not valid in the current match phase.
    #[error("command not valid in the current match phase")]
    InvalidPhaseForCommand,
    /// The building's production queue is already full.
    #[error("production queue is full")]
    QueueFull,
    /// The command is switched off by the match rules.
    #[error("command disabled by match rules")]
    Disabled,
}

/// A dropped input, reported for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// The input that was dropped.
    pub input: TickInput,
    /// Why.
    pub reason: RejectReason,
}

/// Validates inputs for one tick against the pre-tick state.
struct Validator<'a> {
    world: &'a World,
    config: &'a GameConfig,
    /// Phase as it will be once earlier accepted inputs are applied.
    phase: MatchPhase,
    /// Ledgers with this tick's accepted reservations already taken out.
    ledgers: BTreeMap<PlayerId, ResourceLedger>,
    /// Queue slots claimed this tick, per building.
    claimed_slots: BTreeMap<BuildingId, usize>,
}

impl<'a> Validator<'a> {
    fn new(world: &'a World, match_state: &MatchState, config: &'a GameConfig) -> Self {
        Self {
            world,
            config,
            phase: match_state.phase(),
            ledgers: BTreeMap::new(),
            claimed_slots: BTreeMap::new(),
        }
    }

    fn validate(&mut self, input: &TickInput) -> Result<Mutation, RejectReason> {
        match *input {
            TickInput::Command(request) => self.validate_command(request),
            TickInput::HealthDelta { unit, delta } => {
                if !self.world.units.contains(unit) {
                    return Err(RejectReason::InvalidReference);
                }
                Ok(Mutation::AdjustHealth { unit, delta })
            }
        }
    }

    fn validate_command(&mut self, request: CommandRequest) -> Result<Mutation, RejectReason> {
        let issuer = request.issuer;
        if !self.world.players.contains_key(&issuer) {
            return Err(RejectReason::UnauthorizedIssuer);
        }

        match request.command {
            ClientCommand::StartMatch => {
                if self.phase != MatchPhase::WaitingForPlayers {
                    return Err(RejectReason::InvalidPhaseForCommand);
                }
                self.phase = MatchPhase::GameActive;
                Ok(Mutation::StartMatch { issuer })
            }

            ClientCommand::SpawnFromBuilding { building } => {
                let Some(record) = self.world.buildings.get(building) else {
                    return Err(RejectReason::InvalidReference);
                };
                if record.owner != issuer {
                    return Err(RejectReason::UnauthorizedIssuer);
                }

                let claimed = self.claimed_slots.get(&building).copied().unwrap_or(0);
                if record.queue.len() + claimed >= record.queue.max_len() {
                    return Err(RejectReason::QueueFull);
                }

                let cost = record.production.cost;
                let live = self
                    .world
                    .players
                    .get(&issuer)
                    .map(|p| p.ledger)
                    .ok_or(RejectReason::UnauthorizedIssuer)?;
                self.ledgers
                    .entry(issuer)
                    .or_insert(live)
                    .reserve_cost(&cost)
                    .map_err(|_| RejectReason::InsufficientResources)?;

                *self.claimed_slots.entry(building).or_insert(0) += 1;
                Ok(Mutation::EnqueueProduction {
                    building,
                    owner: issuer,
                    cost,
                    build_time: record.production.build_time,
                })
            }

            ClientCommand::DirectSpawn { position, owner } => {
                if !self.config.rules().allow_direct_spawn {
                    return Err(RejectReason::Disabled);
                }
                if !self.world.players.contains_key(&owner) {
                    return Err(RejectReason::InvalidReference);
                }
                if self.phase != MatchPhase::GameActive {
                    return Err(RejectReason::InvalidPhaseForCommand);
                }
                Ok(Mutation::SpawnUnit { owner, position })
            }

            ClientCommand::SetStance { unit, stance } => {
                let Some(record) = self.world.units.get(unit) else {
                    return Err(RejectReason::InvalidReference);
                };
                if record.owner != issuer {
                    return Err(RejectReason::UnauthorizedIssuer);
                }
                Ok(Mutation::SetStance { unit, stance })
            }

            ClientCommand::SetRallyPoint { building, position } => {
                let Some(record) = self.world.buildings.get(building) else {
                    return Err(RejectReason::InvalidReference);
                };
                if record.owner != issuer {
                    return Err(RejectReason::UnauthorizedIssuer);
                }
                Ok(Mutation::SetRallyPoint { building, position })
            }
        }
    }
}

/// Validate `inputs` in order, appending one record per accepted input.
///
/// Returns the rejected inputs. Rejections never touch `log` or any state.
pub fn ingest(
    inputs: &[TickInput],
    world: &World,
    match_state: &MatchState,
    config: &GameConfig,
    log: &mut MutationLog,
) -> Vec<Rejection> {
    let mut validator = Validator::new(world, match_state, config);
    let mut rejections = Vec::new();

    for input in inputs {
        match validator.validate(input) {
            Ok(mutation) => log.push(mutation),
            Err(reason) => {
                debug!(?input, %reason, "Input rejected");
                rejections.push(Rejection {
                    input: *input,
                    reason,
                });
            }
        }
    }

    rejections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameConfigData, MatchRules, UnitProductionData};
    use crate::economy::Resources;
    use crate::health::HealthStage;
    use crate::player::Player;
    use crate::production::Building;
    use crate::unit::Unit;

    const P1: PlayerId = PlayerId(1);
    const P2: PlayerId = PlayerId(2);

    fn config(allow_direct_spawn: bool) -> GameConfig {
        GameConfig::from_data(GameConfigData {
            health_stages: Vec::new(),
            minimum_cost: None,
            units: vec![UnitProductionData {
                id: "rifle_squad".into(),
                cost: Resources::new(60, 0),
                build_time_ms: 5000,
            }],
            rules: MatchRules {
                max_queue_len: 3,
                allow_direct_spawn,
                ..MatchRules::default()
            },
        })
        .unwrap()
    }

    fn world(config: &GameConfig, p1_feedstock: u32) -> (World, BuildingId, UnitId) {
        let mut world = World::new();
        world
            .players
            .insert(P1, Player::new(P1, Resources::new(p1_feedstock, 0)));
        world
            .players
            .insert(P2, Player::new(P2, Resources::new(500, 0)));
        let production = *config.unit("rifle_squad").unwrap();
        let building = world.buildings.insert_with(|_| {
            Building::new(P1, Vec2Fixed::ZERO, "rifle_squad", production, 3)
        });
        let unit = world
            .units
            .insert_with(|_| Unit::new(P1, Vec2Fixed::ZERO, HealthStage::Healthy));
        (world, building, unit)
    }

    fn cmd(issuer: PlayerId, command: ClientCommand) -> TickInput {
        TickInput::Command(CommandRequest::new(issuer, command))
    }

    fn run(
        inputs: &[TickInput],
        world: &World,
        state: &MatchState,
        config: &GameConfig,
    ) -> (MutationLog, Vec<Rejection>) {
        let mut log = MutationLog::new();
        let rejections = ingest(inputs, world, state, config, &mut log);
        (log, rejections)
    }

    #[test]
    fn test_same_tick_spawns_cannot_double_spend() {
        let config = config(true);
        let (world, building, _) = world(&config, 100);
        let spawn = cmd(P1, ClientCommand::SpawnFromBuilding { building });

        let (log, rejections) = run(&[spawn, spawn], &world, &MatchState::new(), &config);
        assert_eq!(log.len(), 1);
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].reason, RejectReason::InsufficientResources);
        // Validation never touches the live ledger.
        assert_eq!(world.players[&P1].ledger.reserved(), Resources::ZERO);
    }

    #[test]
    fn test_queue_slots_claimed_within_tick() {
        let config = config(true);
        let (world, building, _) = world(&config, 1000);
        let spawn = cmd(P1, ClientCommand::SpawnFromBuilding { building });

        let (log, rejections) = run(&[spawn; 4], &world, &MatchState::new(), &config);
        assert_eq!(log.len(), 3);
        assert_eq!(rejections[0].reason, RejectReason::QueueFull);
    }

    #[test]
    fn test_spawn_requires_ownership() {
        let config = config(true);
        let (world, building, _) = world(&config, 1000);
        let (log, rejections) = run(
            &[cmd(P2, ClientCommand::SpawnFromBuilding { building })],
            &world,
            &MatchState::new(),
            &config,
        );
        assert!(log.is_empty());
        assert_eq!(rejections[0].reason, RejectReason::UnauthorizedIssuer);
    }

    #[test]
    fn test_unknown_targets_are_invalid_references() {
        let config = config(true);
        let (world, _, _) = world(&config, 1000);
        let inputs = [
            cmd(P1, ClientCommand::SpawnFromBuilding { building: BuildingId(99) }),
            cmd(
                P1,
                ClientCommand::SetStance {
                    unit: UnitId(99),
                    stance: Stance::Defensive,
                },
            ),
            TickInput::HealthDelta {
                unit: UnitId(99),
                delta: -1,
            },
        ];
        let (log, rejections) = run(&inputs, &world, &MatchState::new(), &config);
        assert!(log.is_empty());
        assert!(rejections
            .iter()
            .all(|r| r.reason == RejectReason::InvalidReference));
    }

    #[test]
    fn test_unknown_issuer_is_unauthorized() {
        let config = config(true);
        let (world, _, _) = world(&config, 1000);
        let (_, rejections) = run(
            &[cmd(PlayerId(42), ClientCommand::StartMatch)],
            &world,
            &MatchState::new(),
            &config,
        );
        assert_eq!(rejections[0].reason, RejectReason::UnauthorizedIssuer);
    }

    #[test]
    fn test_start_match_once_then_direct_spawn_allowed() {
        let config = config(true);
        let (world, _, _) = world(&config, 1000);
        let direct = cmd(
            P2,
            ClientCommand::DirectSpawn {
                position: Vec2Fixed::from_ints(1, 1),
                owner: P1,
            },
        );
        // Before the start command in the same tick: wrong phase.
        let inputs = [
            direct,
            cmd(P1, ClientCommand::StartMatch),
            cmd(P2, ClientCommand::StartMatch),
            direct,
        ];
        let (log, rejections) = run(&inputs, &world, &MatchState::new(), &config);
        assert_eq!(log.len(), 2);
        let reasons: Vec<_> = rejections.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::InvalidPhaseForCommand,
                RejectReason::InvalidPhaseForCommand
            ]
        );
    }

    #[test]
    fn test_direct_spawn_needs_known_owner() {
        let config = config(true);
        let (world, _, _) = world(&config, 1000);
        let mut state = MatchState::new();
        state.start(P1, vec![P1, P2], 0);
        let (_, rejections) = run(
            &[cmd(
                P1,
                ClientCommand::DirectSpawn {
                    position: Vec2Fixed::ZERO,
                    owner: PlayerId(9),
                },
            )],
            &world,
            &state,
            &config,
        );
        assert_eq!(rejections[0].reason, RejectReason::InvalidReference);
    }

    #[test]
    fn test_direct_spawn_can_be_disabled() {
        let config = config(false);
        let (world, _, _) = world(&config, 1000);
        let mut state = MatchState::new();
        state.start(P1, vec![P1, P2], 0);
        let (_, rejections) = run(
            &[cmd(
                P1,
                ClientCommand::DirectSpawn {
                    position: Vec2Fixed::ZERO,
                    owner: P1,
                },
            )],
            &world,
            &state,
            &config,
        );
        assert_eq!(rejections[0].reason, RejectReason::Disabled);
    }

    #[test]
    fn test_stance_and_rally_require_ownership() {
        let config = config(true);
        let (world, building, unit) = world(&config, 1000);
        let inputs = [
            cmd(P2, ClientCommand::SetStance { unit, stance: Stance::HoldGround }),
            cmd(
                P2,
                ClientCommand::SetRallyPoint {
                    building,
                    position: Vec2Fixed::ZERO,
                },
            ),
            cmd(P1, ClientCommand::SetStance { unit, stance: Stance::HoldGround }),
        ];
        let (log, rejections) = run(&inputs, &world, &MatchState::new(), &config);
        assert_eq!(log.len(), 1);
        assert_eq!(rejections.len(), 2);
        assert!(rejections
            .iter()
            .all(|r| r.reason == RejectReason::UnauthorizedIssuer));
    }
}
