//! The server tick loop.
//!
//! [`GameServer`] owns the simulation. Everything else talks to it through
//! a cloneable [`ServerHandle`]: actions go in over an mpsc inbox that is
//! drained between ticks, and the latest [`StateSnapshot`] comes back over a
//! watch channel.

use std::sync::Arc;
use std::time::Duration;

use skirmish_core::prelude::*;
use std::result::Result;
use skirmish_core::replay::Replay;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{LoadedConfig, ServerConfig, ServerError};

/// Messages accepted by the server loop.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    /// Perform an action before the next tick.
    Perform(Action),
    /// Stop the loop before the next tick.
    Shutdown,
}

/// Why the server loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured tick limit was reached.
    TickLimit,
    /// A [`ServerMessage::Shutdown`] arrived.
    Shutdown,
    /// Every [`ServerHandle`] was dropped.
    InboxClosed,
    /// The match reached [`MatchPhase::GameEnded`].
    MatchEnded,
}

/// Final state of a finished run.
#[derive(Debug)]
pub struct ServerSummary {
    /// Why the loop stopped.
    pub reason: StopReason,
    /// Ticks completed.
    pub ticks: u64,
    /// Final state hash.
    pub final_hash: u64,
    /// Final snapshot.
    pub snapshot: StateSnapshot,
    /// Recorded replay, if recording was enabled.
    pub replay: Option<Replay>,
}

/// Client side of a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    inbox: mpsc::Sender<ServerMessage>,
    snapshots: watch::Receiver<StateSnapshot>,
}

impl ServerHandle {
    /// Queue an action for the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Stopped`] if the loop has exited.
    pub async fn perform(&self, action: Action) -> Result<(), ServerError> {
        self.inbox
            .send(ServerMessage::Perform(action))
            .await
            .map_err(|_| ServerError::Stopped)
    }

    /// Queue a client command for the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Stopped`] if the loop has exited.
    pub async fn submit(&self, request: CommandRequest) -> Result<(), ServerError> {
        self.perform(Action::Input(TickInput::Command(request))).await
    }

    /// Ask the loop to stop.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Stopped`] if the loop has already exited.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        self.inbox
            .send(ServerMessage::Shutdown)
            .await
            .map_err(|_| ServerError::Stopped)
    }

    /// Most recently published snapshot.
    #[must_use]
    pub fn latest(&self) -> StateSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StateSnapshot> {
        self.snapshots.clone()
    }
}

/// A single-match server.
#[derive(Debug)]
pub struct GameServer {
    sim: Simulation,
    inbox: mpsc::Receiver<ServerMessage>,
    snapshots: watch::Sender<StateSnapshot>,
    tick_ms: Millis,
    paced: bool,
    max_ticks: Option<u64>,
    replay: Option<Replay>,
}

impl GameServer {
    /// Build a server and the handle used to drive it.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid tick rate or if replay recording
    /// cannot capture the initial state.
    pub fn new(
        settings: &ServerConfig,
        loaded: &LoadedConfig,
    ) -> Result<(Self, ServerHandle), ServerError> {
        let tick_ms = settings.tick_ms()?;
        let sim = Simulation::new(Arc::clone(&loaded.config));

        let replay = if settings.record_replay {
            Some(Replay::new(
                loaded.label.clone(),
                loaded.source.clone(),
                tick_ms,
                &sim,
            )?)
        } else {
            None
        };

        let (inbox_tx, inbox) = mpsc::channel(settings.inbox_capacity.max(1));
        let (snapshots, snapshot_rx) = watch::channel(sim.snapshot());

        let server = Self {
            sim,
            inbox,
            snapshots,
            tick_ms,
            paced: settings.paced,
            max_ticks: settings.max_ticks,
            replay,
        };
        let handle = ServerHandle {
            inbox: inbox_tx,
            snapshots: snapshot_rx,
        };
        Ok((server, handle))
    }

    /// Run ticks until a stop condition is met.
    ///
    /// # Errors
    ///
    /// Returns the first fatal simulation error. The match cannot continue
    /// after one.
    pub async fn run(mut self) -> Result<ServerSummary, ServerError> {
        info!(
            tick_ms = self.tick_ms,
            max_ticks = ?self.max_ticks,
            paced = self.paced,
            "Server loop starting"
        );

        let mut ticker = self.paced.then(|| {
            let mut ticker = interval(Duration::from_millis(u64::from(self.tick_ms)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        let reason = loop {
            if self
                .max_ticks
                .is_some_and(|limit| self.sim.current_tick() >= limit)
            {
                break StopReason::TickLimit;
            }

            wait_for_tick(ticker.as_mut()).await;

            if let Some(reason) = self.drain_inbox()? {
                break reason;
            }

            let events = self.sim.tick(self.tick_ms)?;
            if !events.rejections.is_empty() || !events.match_events.is_empty() {
                debug!(
                    tick = events.tick,
                    rejections = events.rejections.len(),
                    match_events = events.match_events.len(),
                    "Tick complete"
                );
            }
            self.snapshots.send_replace(self.sim.snapshot());

            if self.sim.match_state().phase() == MatchPhase::GameEnded {
                break StopReason::MatchEnded;
            }
        };

        let ticks = self.sim.current_tick();
        let final_hash = self.sim.state_hash();
        if let Some(replay) = &mut self.replay {
            replay.finalize(ticks, final_hash);
        }
        info!(?reason, ticks, final_hash, "Server loop stopped");

        Ok(ServerSummary {
            reason,
            ticks,
            final_hash,
            snapshot: self.sim.snapshot(),
            replay: self.replay,
        })
    }

    /// Apply every queued message.
    fn drain_inbox(&mut self) -> Result<Option<StopReason>, ServerError> {
        loop {
            match self.inbox.try_recv() {
                Ok(ServerMessage::Perform(action)) => self.perform(action)?,
                Ok(ServerMessage::Shutdown) => return Ok(Some(StopReason::Shutdown)),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Ok(Some(StopReason::InboxClosed)),
            }
        }
    }

    fn perform(&mut self, action: Action) -> Result<(), ServerError> {
        let result = self.sim.perform(&action);
        if let Some(replay) = &mut self.replay {
            replay.record(self.sim.current_tick(), action);
        }
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(tick = self.sim.current_tick(), error = %e, "Action failed");
                Ok(())
            }
        }
    }
}

async fn wait_for_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}

#[cfg(test)]
mod tests {
    use skirmish_core::replay::ReplayPlayer;

    use super::*;
    use crate::bootstrap_actions;

    const CONFIG: &str = r#"GameConfigData(
        units: [(id: "scout", cost: (feedstock: 30), build_time_ms: 500)],
        rules: (start_grace_ms: 3000),
    )"#;

    const BROKE_CONFIG: &str = r#"GameConfigData(
        units: [(id: "scout", cost: (feedstock: 30), build_time_ms: 500)],
        rules: (
            start_grace_ms: 100,
            end_grace_ms: 100,
            starting_resources: (feedstock: 0, energy: 0),
        ),
    )"#;

    fn loaded(source: &str) -> LoadedConfig {
        LoadedConfig {
            config: Arc::new(GameConfig::from_ron_str(source, "inline").unwrap()),
            source: source.to_owned(),
            label: "inline".to_owned(),
        }
    }

    fn unpaced(max_ticks: u64) -> ServerConfig {
        ServerConfig {
            max_ticks: Some(max_ticks),
            paced: false,
            record_replay: true,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_runs_to_tick_limit() {
        let config = loaded(CONFIG);
        let (server, handle) = GameServer::new(&unpaced(40), &config).unwrap();
        for action in bootstrap_actions(&config.config, 2) {
            handle.perform(action).await.unwrap();
        }
        handle
            .submit(CommandRequest::new(
                PlayerId(1),
                ClientCommand::SpawnFromBuilding {
                    building: BuildingId(1),
                },
            ))
            .await
            .unwrap();

        let summary = server.run().await.unwrap();
        assert_eq!(summary.reason, StopReason::TickLimit);
        assert_eq!(summary.ticks, 40);
        assert_eq!(summary.snapshot.players.len(), 2);
        assert_eq!(summary.snapshot.units.len(), 1);
        assert_eq!(summary.snapshot.match_state.phase, MatchPhase::GameActive);
        assert_eq!(handle.latest(), summary.snapshot);

        let replay = summary.replay.unwrap();
        assert_eq!(replay.record_count(), 6);
        let mut player = ReplayPlayer::new(replay).unwrap();
        player.verify().unwrap();
        assert_eq!(player.simulation().state_hash(), summary.final_hash);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let config = loaded(CONFIG);
        let (server, handle) = GameServer::new(&unpaced(40), &config).unwrap();
        handle.perform(Action::Connect(PlayerId(1))).await.unwrap();
        handle.shutdown().await.unwrap();

        let summary = server.run().await.unwrap();
        assert_eq!(summary.reason, StopReason::Shutdown);
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.snapshot.players.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_handles_stop_the_loop() {
        let config = loaded(CONFIG);
        let (server, handle) = GameServer::new(&unpaced(40), &config).unwrap();
        handle.perform(Action::Connect(PlayerId(1))).await.unwrap();
        drop(handle);

        let summary = server.run().await.unwrap();
        assert_eq!(summary.reason, StopReason::InboxClosed);
        assert_eq!(summary.snapshot.players.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_actions_are_not_fatal() {
        let config = loaded(CONFIG);
        let (server, handle) = GameServer::new(&unpaced(3), &config).unwrap();
        handle.perform(Action::Connect(PlayerId(1))).await.unwrap();
        handle.perform(Action::Connect(PlayerId(1))).await.unwrap();
        handle
            .perform(Action::DestroyBuilding(BuildingId(9)))
            .await
            .unwrap();

        let summary = server.run().await.unwrap();
        assert_eq!(summary.reason, StopReason::TickLimit);
        assert_eq!(summary.snapshot.players.len(), 1);
        assert_eq!(summary.replay.unwrap().record_count(), 3);
    }

    #[tokio::test]
    async fn test_stops_when_match_ends() {
        let config = loaded(BROKE_CONFIG);
        let (server, handle) = GameServer::new(&unpaced(1000), &config).unwrap();
        handle.perform(Action::Connect(PlayerId(1))).await.unwrap();
        handle.perform(Action::Connect(PlayerId(2))).await.unwrap();
        handle
            .submit(CommandRequest::new(PlayerId(2), ClientCommand::StartMatch))
            .await
            .unwrap();
        let snapshots = handle.subscribe();

        let summary = server.run().await.unwrap();
        assert_eq!(summary.reason, StopReason::MatchEnded);
        assert!(summary.ticks < 1000);
        assert_eq!(summary.snapshot.match_state.phase, MatchPhase::GameEnded);
        assert_eq!(summary.snapshot.match_state.outcome, Some(MatchOutcome::Draw));
        assert_eq!(snapshots.borrow().tick, summary.ticks);
    }

    #[test]
    fn test_rejects_bad_tick_rate() {
        let settings = ServerConfig {
            tick_rate: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            GameServer::new(&settings, &loaded(CONFIG)),
            Err(ServerError::InvalidTickRate(0))
        ));
    }
}
