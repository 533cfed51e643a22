//! Match flow over a full session: start gating, countdown, goal,
//! results, restart.

use std::collections::BTreeMap;

use tantrumn::config::GoalZone;
use tantrumn::game::services::ServiceCall;
use tantrumn::game::state::{MatchPhase, MovementMode, PlayerGameState};
use tantrumn::{GameConfig, InputFrame, PlayerId, Session, Vec3};

fn player(n: u8) -> PlayerId {
    PlayerId::new([n; 16])
}

fn idle(session: &mut Session, ticks: u32) {
    for _ in 0..ticks {
        session.step(&BTreeMap::new()).unwrap();
    }
}

fn step(session: &mut Session, inputs: &[(PlayerId, InputFrame)]) {
    let inputs: BTreeMap<PlayerId, InputFrame> = inputs.iter().copied().collect();
    session.step(&inputs).unwrap();
}

fn phase(session: &Session) -> MatchPhase {
    session.authority().world.phase
}

fn countdowns(session: &Session, id: PlayerId) -> usize {
    session
        .services(&id)
        .unwrap()
        .calls
        .iter()
        .filter(|c| matches!(c, ServiceCall::Countdown(..)))
        .count()
}

/// Two runners; the goal sits between their lanes.
fn race_config() -> GameConfig {
    let mut config = GameConfig::default();
    config.match_flow.expected_players = 2;
    config.match_flow.countdown_duration = 0.0;
    config.match_flow.goal = Some(GoalZone { center: Vec3::new(900.0, -200.0, 0.0), radius: 300.0 });
    config
}

const RUN: InputFrame = InputFrame::with_movement(127, 0);

#[test]
fn test_two_of_three_keeps_waiting() {
    let mut session: Session = Session::new(GameConfig::default());
    session.join(player(1)).unwrap();
    session.join(player(2)).unwrap();
    idle(&mut session, 30);

    assert_eq!(phase(&session), MatchPhase::Waiting);
    assert_eq!(countdowns(&session, player(1)), 0);
    assert_eq!(countdowns(&session, player(2)), 0);
}

#[test]
fn test_ai_and_spectators_do_not_fill_the_match() {
    let mut session: Session = Session::new(GameConfig::default());
    session.join(player(1)).unwrap();
    session.join(player(2)).unwrap();
    session.add_ai(player(10)).unwrap();
    session.join_spectator(player(20)).unwrap();
    idle(&mut session, 30);

    assert_eq!(phase(&session), MatchPhase::Waiting);
    assert_eq!(countdowns(&session, player(20)), 0);
}

#[test]
fn test_three_of_three_counts_down_then_plays() {
    let mut session: Session = Session::new(GameConfig::default());
    for n in 1..=3 {
        session.join(player(n)).unwrap();
    }
    idle(&mut session, 10);

    assert!(matches!(phase(&session), MatchPhase::Countdown { .. }));
    for n in 1..=3 {
        assert_eq!(countdowns(&session, player(n)), 1);
    }

    // Input is ignored until the match plays
    for _ in 0..20 {
        step(&mut session, &[(player(1), RUN)]);
    }
    let c = session.authority().world.character(&player(1)).unwrap();
    assert_eq!(c.position.x, 0.0);

    idle(&mut session, 240);
    assert_eq!(phase(&session), MatchPhase::Playing);
    for n in 1..=3 {
        let observer = session.observer(&player(n)).unwrap();
        assert_eq!(observer.world.phase, MatchPhase::Playing);
        let status = observer.world.character(&player(n)).unwrap().status;
        assert_eq!(status.game_state, PlayerGameState::Playing);
    }
    assert!(session.converged());
}

#[test]
fn test_first_to_goal_wins_and_match_completes() {
    let (a, b) = (player(1), player(2));
    let mut session: Session = Session::new(race_config());
    session.join(a).unwrap();
    session.join(b).unwrap();
    idle(&mut session, 8);
    assert_eq!(phase(&session), MatchPhase::Playing);

    // a gets a head start
    for _ in 0..20 {
        step(&mut session, &[(a, RUN)]);
    }
    for _ in 0..200 {
        step(&mut session, &[(a, RUN), (b, RUN)]);
    }
    idle(&mut session, 10);

    assert_eq!(phase(&session), MatchPhase::Complete);
    assert_eq!(session.authority().game_mode().results(), &[a, b]);

    let winner = session.authority().world.character(&a).unwrap().status;
    assert!(winner.is_winner);
    assert_eq!(winner.game_state, PlayerGameState::Finished);
    assert!(!session.authority().world.character(&b).unwrap().status.is_winner);

    let observer = session.observer(&a).unwrap();
    let local = observer.world.character(&a).unwrap();
    assert_eq!(local.movement.mode, MovementMode::Disabled);
    let services = session.services(&a).unwrap();
    assert!(services.calls.contains(&ServiceCall::ShowResults(a)));
    assert!(session.converged());
}

#[test]
fn test_retry_restarts_the_level() {
    let (a, b) = (player(1), player(2));
    let mut session: Session = Session::new(race_config());
    session.join(a).unwrap();
    session.join(b).unwrap();
    session.add_ai(player(10)).unwrap();
    idle(&mut session, 8);

    // Retry is ignored while still racing
    step(&mut session, &[(a, InputFrame::new().holding(InputFrame::FLAG_RETRY))]);
    idle(&mut session, 10);
    assert_eq!(phase(&session), MatchPhase::Playing);

    for _ in 0..220 {
        step(&mut session, &[(a, RUN), (b, RUN)]);
    }
    idle(&mut session, 10);
    assert_eq!(phase(&session), MatchPhase::Complete);

    step(&mut session, &[(b, InputFrame::new().holding(InputFrame::FLAG_RETRY))]);
    idle(&mut session, 10);

    assert_eq!(phase(&session), MatchPhase::Playing);
    assert!(session.authority().game_mode().results().is_empty());
    assert!(session.authority().world.character(&player(10)).is_none());

    let spawn = session.authority().world.spawn_point(0);
    assert_eq!(session.authority().world.character(&a).unwrap().position, spawn);

    for id in [a, b] {
        let services = session.services(&id).unwrap();
        assert!(services.calls.contains(&ServiceCall::ClearResults(id)));
        let observer = session.observer(&id).unwrap();
        assert!(observer.world.character(&player(10)).is_none());
        let status = observer.world.character(&id).unwrap().status;
        assert_eq!(status.game_state, PlayerGameState::Playing);
        assert!(!status.is_winner);
    }
    assert!(session.converged());
}

#[test]
fn test_leaving_player_is_despawned_everywhere() {
    let (a, b) = (player(1), player(2));
    let mut session: Session = Session::new(race_config());
    session.join(a).unwrap();
    session.join(b).unwrap();
    idle(&mut session, 8);

    session.leave(b).unwrap();
    idle(&mut session, 5);

    assert!(session.authority().world.character(&b).is_none());
    assert!(session.observer(&a).unwrap().world.character(&b).is_none());
    assert!(session.converged());
}
