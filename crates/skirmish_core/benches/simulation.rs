//! Simulation benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skirmish_core::prelude::*;
use skirmish_test_utils::fixtures::{request, standard_config, RIFLE_SQUAD, SCOUT};

/// A match with `players` players, each owning four busy buildings and a
/// field of units taking damage.
fn crowded_match(players: u32) -> Simulation {
    let mut sim = Simulation::new(standard_config());
    for p in 1..=players {
        let id = PlayerId(p);
        sim.connect_player(id).unwrap();
        sim.grant_resources(id, Resources::new(100_000, 100_000)).unwrap();
        for b in 0..4 {
            let kind = if b % 2 == 0 { RIFLE_SQUAD } else { SCOUT };
            let position = Vec2Fixed::from_ints(p as i32 * 100, b * 10);
            let building = sim.place_building(id, position, kind).unwrap();
            for _ in 0..5 {
                sim.submit(request(id, ClientCommand::SpawnFromBuilding { building }));
            }
        }
    }
    sim.submit(request(PlayerId(1), ClientCommand::StartMatch));
    for p in 1..=players {
        for i in 0..50 {
            sim.submit(request(
                PlayerId(p),
                ClientCommand::DirectSpawn {
                    position: Vec2Fixed::from_ints(i, p as i32),
                    owner: PlayerId(p),
                },
            ));
        }
    }
    sim.tick(TICK_DURATION_MS).unwrap();
    sim
}

/// Runs simulation benchmarks for the skirmish_core crate.
pub fn simulation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for players in [2u32, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(players), &players, |b, &players| {
            let base = crowded_match(players);
            let units: Vec<UnitId> = base.world().units.ids();
            b.iter_batched(
                || base.clone(),
                |mut sim| {
                    for (i, unit) in units.iter().enumerate() {
                        let delta = if i % 3 == 0 { -1 } else { 1 };
                        sim.submit_health_delta(*unit, delta);
                    }
                    black_box(sim.tick(TICK_DURATION_MS).unwrap())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();

    c.bench_function("state_hash", |b| {
        let sim = crowded_match(8);
        b.iter(|| black_box(sim.state_hash()));
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
