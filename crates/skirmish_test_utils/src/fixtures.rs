//! Test fixtures and helpers.
//!
//! Pre-built configurations and match setups for consistent testing.

use std::sync::Arc;

use fixed::types::I32F32;
use skirmish_core::command::{ClientCommand, CommandRequest};
use skirmish_core::components::{BuildingId, PlayerId};
use skirmish_core::config::{GameConfig, GameConfigData, MatchRules};
use skirmish_core::error::Result;
use skirmish_core::math::{Millis, Vec2Fixed};
use skirmish_core::simulation::{Simulation, TickEvents, TICK_DURATION_MS};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// First player in every fixture.
pub const P1: PlayerId = PlayerId(1);

/// Second player in every fixture.
pub const P2: PlayerId = PlayerId(2);

/// Unit type every fixture building produces.
pub const RIFLE_SQUAD: &str = "rifle_squad";

/// Cheaper unit type, the default elimination floor.
pub const SCOUT: &str = "scout";

/// Standard configuration used across tests.
///
/// - `rifle_squad`: 60 feedstock / 10 energy, 5 s
/// - `scout`: 30 feedstock, 2 s
/// - start grace 1 s, end grace 1 s, despawn delay 500 ms
/// - starting balance 200 feedstock / 50 energy
pub const STANDARD_CONFIG: &str = r#"
GameConfigData(
    health_stages: [
        (stage: Dead, speed_percent: 0),
        (stage: Critical, speed_percent: 40),
        (stage: Wounded, speed_percent: 60),
        (stage: Grazed, speed_percent: 85),
        (stage: Healthy, speed_percent: 100),
    ],
    units: [
        (id: "rifle_squad", cost: (feedstock: 60, energy: 10), build_time_ms: 5000),
        (id: "scout", cost: (feedstock: 30), build_time_ms: 2000),
    ],
    rules: (
        start_grace_ms: 1000,
        end_grace_ms: 1000,
        despawn_delay_ms: 500,
        max_queue_len: 5,
        starting_resources: (feedstock: 200, energy: 50),
    ),
)
"#;

/// Parse [`STANDARD_CONFIG`].
///
/// # Panics
///
/// Panics if the fixture does not parse.
#[must_use]
pub fn standard_config() -> Arc<GameConfig> {
    match GameConfig::from_ron_str(STANDARD_CONFIG, "standard") {
        Ok(config) => Arc::new(config),
        Err(e) => panic!("standard fixture config is invalid: {e}"),
    }
}

/// [`STANDARD_CONFIG`] with adjusted match rules.
///
/// # Panics
///
/// Panics if the adjusted rules are rejected.
#[must_use]
pub fn config_with_rules(adjust: impl FnOnce(&mut MatchRules)) -> Arc<GameConfig> {
    let mut data: GameConfigData = match ron::from_str(STANDARD_CONFIG) {
        Ok(data) => data,
        Err(e) => panic!("standard fixture config is invalid: {e}"),
    };
    adjust(&mut data.rules);
    match GameConfig::from_data(data) {
        Ok(config) => Arc::new(config),
        Err(e) => panic!("adjusted fixture config is invalid: {e}"),
    }
}

/// Two connected players, each with one `rifle_squad` building.
#[derive(Debug, Clone)]
pub struct TwoPlayerMatch {
    /// The simulation.
    pub sim: Simulation,
    /// Building owned by [`P1`] at (10, 10).
    pub p1_barracks: BuildingId,
    /// Building owned by [`P2`] at (90, 90).
    pub p2_barracks: BuildingId,
}

impl TwoPlayerMatch {
    /// Set up the match with the standard configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(standard_config())
    }

    /// Set up the match with a custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration has no `rifle_squad` unit.
    #[must_use]
    pub fn with_config(config: Arc<GameConfig>) -> Self {
        let mut sim = Simulation::new(config);
        match place_two_players(&mut sim) {
            Ok((p1_barracks, p2_barracks)) => Self {
                sim,
                p1_barracks,
                p2_barracks,
            },
            Err(e) => panic!("two-player fixture failed: {e}"),
        }
    }

    /// Queue a start request from [`P1`].
    pub fn start(&mut self) {
        self.sim.submit(request(P1, ClientCommand::StartMatch));
    }
}

fn place_two_players(sim: &mut Simulation) -> Result<(BuildingId, BuildingId)> {
    sim.connect_player(P1)?;
    sim.connect_player(P2)?;
    let p1 = sim.place_building(P1, Vec2Fixed::from_ints(10, 10), RIFLE_SQUAD)?;
    let p2 = sim.place_building(P2, Vec2Fixed::from_ints(90, 90), RIFLE_SQUAD)?;
    Ok((p1, p2))
}

impl Default for TwoPlayerMatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a request.
#[must_use]
pub fn request(issuer: PlayerId, command: ClientCommand) -> CommandRequest {
    CommandRequest::new(issuer, command)
}

/// Run one standard-length tick.
///
/// # Panics
///
/// Panics on a fatal simulation error.
pub fn step(sim: &mut Simulation) -> TickEvents {
    match sim.tick(TICK_DURATION_MS) {
        Ok(events) => events,
        Err(e) => panic!("tick {} failed: {e}", sim.current_tick()),
    }
}

/// Run `ticks` standard-length ticks and collect their events.
pub fn run_ticks(sim: &mut Simulation, ticks: usize) -> Vec<TickEvents> {
    (0..ticks).map(|_| step(sim)).collect()
}

/// Run standard-length ticks covering `duration` milliseconds.
pub fn run_for(sim: &mut Simulation, duration: Millis) -> Vec<TickEvents> {
    let ticks = duration.div_ceil(TICK_DURATION_MS);
    run_ticks(sim, ticks as usize)
}
