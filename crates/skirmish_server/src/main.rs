//! Skirmish Dedicated Server

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use skirmish_core::replay::{Replay, ReplayPlayer};
use skirmish_server::{
    bootstrap_actions, load_config, GameServer, ServerConfig, ServerError, ServerSummary,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Headless authoritative server for skirmish matches
#[derive(Parser, Debug)]
#[command(name = "skirmish-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Host a match
    Run {
        /// RON game configuration
        #[arg(short, long, default_value = "config/default.ron")]
        config: PathBuf,

        /// Ticks per second
        #[arg(long, default_value_t = skirmish_core::simulation::TICK_RATE)]
        tick_rate: u32,

        /// Stop after this many ticks
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Seat this many players and start the match
        #[arg(short, long, default_value = "2")]
        players: u32,

        /// Run ticks back to back instead of in real time
        #[arg(long)]
        fast: bool,

        /// Save a replay to file
        #[arg(long)]
        save: Option<PathBuf>,

        /// Write the final snapshot as JSON to file instead of stdout
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Check a RON game configuration
    Validate {
        /// Configuration file
        #[arg(required = true)]
        config: PathBuf,
    },

    /// Re-run a replay and check its final state
    Verify {
        /// Replay file
        #[arg(required = true)]
        replay: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let result = match args.command {
        Commands::Run {
            config,
            tick_rate,
            ticks,
            players,
            fast,
            save,
            snapshot,
        } => {
            let settings = ServerConfig {
                config_path: config,
                tick_rate,
                max_ticks: ticks,
                paced: !fast,
                record_replay: save.is_some(),
                ..ServerConfig::default()
            };
            run(settings, players, save, snapshot).await
        }
        Commands::Validate { config } => validate(&config),
        Commands::Verify { replay } => verify(&replay),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    settings: ServerConfig,
    players: u32,
    save: Option<PathBuf>,
    snapshot: Option<PathBuf>,
) -> Result<(), ServerError> {
    let loaded = load_config(&settings.config_path)?;
    tracing::info!(config = %loaded.label, players, "Starting skirmish server");

    let (server, handle) = GameServer::new(&settings, &loaded)?;
    for action in bootstrap_actions(&loaded.config, players) {
        handle.perform(action).await?;
    }

    let summary = server.run().await?;
    drop(handle);
    report(&summary, save.as_deref(), snapshot.as_deref())
}

fn report(
    summary: &ServerSummary,
    save: Option<&Path>,
    snapshot: Option<&Path>,
) -> Result<(), ServerError> {
    if let (Some(path), Some(replay)) = (save, &summary.replay) {
        replay.save(path)?;
        eprintln!("Replay saved to {}", path.display());
    }

    let json = serde_json::to_string_pretty(&summary.snapshot)?;
    match snapshot {
        Some(path) => std::fs::write(path, json).map_err(|source| ServerError::Io {
            path: path.to_path_buf(),
            source,
        })?,
        None => println!("{json}"),
    }

    eprintln!(
        "Stopped after {} ticks ({:?}), state hash {:016x}",
        summary.ticks, summary.reason, summary.final_hash
    );
    Ok(())
}

fn validate(path: &Path) -> Result<(), ServerError> {
    let loaded = load_config(path)?;
    let rules = loaded.config.rules();
    println!("{} is valid", loaded.label);
    for id in loaded.config.unit_ids() {
        if let Some(unit) = loaded.config.unit(id) {
            println!(
                "  unit {id}: {} feedstock, {} energy, {} ms",
                unit.cost.feedstock, unit.cost.energy, unit.build_time
            );
        }
    }
    println!(
        "  start grace {} ms, end grace {} ms, despawn delay {} ms, queue length {}",
        rules.start_grace_ms, rules.end_grace_ms, rules.despawn_delay_ms, rules.max_queue_len
    );
    if loaded.config.health_table().is_none() {
        println!("  no health stage table; speed multipliers stay at 1");
    }
    Ok(())
}

fn verify(path: &Path) -> Result<(), ServerError> {
    let replay = Replay::load(path)?;
    let ticks = replay.final_tick;
    let mut player = ReplayPlayer::new(replay)?;
    player.verify()?;
    println!("Replay verified: {ticks} ticks reproduce the recorded state");
    Ok(())
}
