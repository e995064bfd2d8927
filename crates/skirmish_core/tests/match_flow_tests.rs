//! Match flow tests.
//!
//! Phase progression, win and draw detection, and the interplay between
//! health, despawn and elimination.

use skirmish_core::prelude::*;
use skirmish_test_utils::fixtures::{
    config_with_rules, request, run_for, run_ticks, step, TwoPlayerMatch, P1, P2,
};

/// Both players start with nothing, so only units keep them in the match.
fn broke_match() -> TwoPlayerMatch {
    TwoPlayerMatch::with_config(config_with_rules(|rules| {
        rules.starting_resources = Resources::ZERO;
    }))
}

fn phase_history(events: &[TickEvents]) -> Vec<MatchPhase> {
    events
        .iter()
        .flat_map(|e| e.match_events.iter())
        .filter_map(|event| match event {
            MatchEvent::PhaseChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

fn declared(events: &[TickEvents]) -> Vec<MatchOutcome> {
    events
        .iter()
        .flat_map(|e| e.match_events.iter())
        .filter_map(|event| match event {
            MatchEvent::VictoryDeclared(outcome) => Some(*outcome),
            _ => None,
        })
        .collect()
}

fn direct_spawn(sim: &mut Simulation, owner: PlayerId) {
    sim.submit(request(
        owner,
        ClientCommand::DirectSpawn {
            position: Vec2Fixed::from_ints(50, 50),
            owner,
        },
    ));
}

#[test]
fn start_match_enables_gameplay_for_everyone() {
    let mut fixture = TwoPlayerMatch::new();
    fixture.sim.submit(request(P2, ClientCommand::StartMatch));
    fixture.sim.submit(request(P1, ClientCommand::StartMatch));

    let events = step(&mut fixture.sim);
    assert_eq!(events.match_events[0], MatchEvent::MatchStarted { issuer: P2 });
    assert_eq!(events.rejections.len(), 1);
    assert_eq!(
        events.rejections[0].reason,
        RejectReason::InvalidPhaseForCommand
    );
    assert!(fixture.sim.player(P1).unwrap().gameplay_enabled);
    assert!(fixture.sim.player(P2).unwrap().gameplay_enabled);
    assert_eq!(fixture.sim.match_state().participants(), &[P1, P2]);
}

#[test]
fn direct_spawn_requires_active_match() {
    let mut fixture = TwoPlayerMatch::new();
    direct_spawn(&mut fixture.sim, P1);
    let events = step(&mut fixture.sim);
    assert_eq!(
        events.rejections[0].reason,
        RejectReason::InvalidPhaseForCommand
    );
    assert!(fixture.sim.world().units.is_empty());

    fixture.start();
    direct_spawn(&mut fixture.sim, P1);
    let events = step(&mut fixture.sim);
    assert!(events.rejections.is_empty());
    assert_eq!(events.spawned.len(), 1);
}

#[test]
fn eliminated_players_draw_after_grace_period() {
    let mut fixture = broke_match();
    fixture.start();

    let events = run_for(&mut fixture.sim, 3000);
    assert_eq!(
        phase_history(&events),
        vec![
            MatchPhase::GameActive,
            MatchPhase::GameEnding,
            MatchPhase::GameEnded,
        ]
    );
    assert_eq!(declared(&events), vec![MatchOutcome::Draw]);
    assert_eq!(fixture.sim.match_state().winner(), None);
}

#[test]
fn no_decision_during_start_grace() {
    let mut fixture = broke_match();
    fixture.start();

    // 1000 ms grace: the first check runs on the 21st tick.
    let events = run_ticks(&mut fixture.sim, 20);
    assert_eq!(phase_history(&events), vec![MatchPhase::GameActive]);
    assert_eq!(fixture.sim.match_state().start_timer(), 0);

    let events = run_ticks(&mut fixture.sim, 1);
    assert_eq!(phase_history(&events), vec![MatchPhase::GameEnding]);
}

#[test]
fn player_who_can_still_afford_a_unit_wins() {
    let mut fixture = broke_match();
    fixture.sim.grant_resources(P1, Resources::new(30, 0)).unwrap();
    fixture.start();

    let events = run_for(&mut fixture.sim, 3000);
    assert_eq!(declared(&events), vec![MatchOutcome::Winner(P1)]);
    assert_eq!(fixture.sim.match_state().winner(), Some(P1));
    assert_eq!(fixture.sim.match_state().phase(), MatchPhase::GameEnded);
}

#[test]
fn killed_army_hands_victory_to_opponent() {
    let mut fixture = broke_match();
    fixture.start();
    direct_spawn(&mut fixture.sim, P1);
    direct_spawn(&mut fixture.sim, P2);
    let spawned = step(&mut fixture.sim).spawned;
    let p2_unit = spawned[1];

    run_for(&mut fixture.sim, 1500);
    assert_eq!(fixture.sim.match_state().phase(), MatchPhase::GameActive);

    fixture.sim.submit_health_delta(p2_unit, -2);
    fixture.sim.submit_health_delta(p2_unit, -3);
    let events = step(&mut fixture.sim);
    assert_eq!(events.transitions.len(), 1);
    assert!(events.transitions[0].is_death());

    // A dead unit no longer counts, even before it despawns.
    assert_eq!(fixture.sim.player(P2).unwrap().alive_units, 0);
    assert_eq!(fixture.sim.match_state().winner(), Some(P1));
    assert_eq!(fixture.sim.match_state().phase(), MatchPhase::GameEnding);

    let events = run_for(&mut fixture.sim, 1000);
    assert!(events.iter().any(|e| e.despawned == vec![p2_unit]));
    assert_eq!(declared(&events), vec![MatchOutcome::Winner(P1)]);
}

#[test]
fn disconnected_participant_loses() {
    let mut fixture = TwoPlayerMatch::new();
    fixture.start();
    run_for(&mut fixture.sim, 1000);

    fixture.sim.disconnect_player(P2).unwrap();
    let events = run_for(&mut fixture.sim, 1500);
    assert_eq!(declared(&events), vec![MatchOutcome::Winner(P1)]);
}

#[test]
fn reset_allows_a_new_match() {
    let mut fixture = broke_match();
    fixture.start();
    run_for(&mut fixture.sim, 3000);
    assert_eq!(fixture.sim.match_state().phase(), MatchPhase::GameEnded);

    // Terminal until reset.
    fixture.start();
    let events = step(&mut fixture.sim);
    assert_eq!(
        events.rejections[0].reason,
        RejectReason::InvalidPhaseForCommand
    );

    fixture.sim.reset_match();
    assert_eq!(
        fixture.sim.match_state().phase(),
        MatchPhase::WaitingForPlayers
    );
    assert!(!fixture.sim.player(P1).unwrap().gameplay_enabled);

    fixture.start();
    let events = step(&mut fixture.sim);
    assert_eq!(phase_history(std::slice::from_ref(&events)), vec![MatchPhase::GameActive]);
}
