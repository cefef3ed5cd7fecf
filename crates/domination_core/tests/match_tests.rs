//! End-to-end match scenarios.

use std::sync::Arc;
use std::time::Duration;

use domination_core::prelude::*;
use domination_core::objects::ObjectKind;
use domination_core::simulation::EndReason;
use domination_test_utils::determinism::{find_first_divergence, find_replay_divergence, strategies};
use domination_test_utils::fixtures::{
    failing_factory, field, noop_factory, quick_settings, scripted_factory, sleepy_factory,
    FinalizeLog, AMMO_FIELD, CORRIDOR_FIELD, CRUMB_FIELD,
};
use domination_test_utils::proptest::prelude::*;

const SHOOTING_FIELD: &str = "\
w w w w w w w
w R _ A _ B w
w _ _ _ _ _ w
w w w w w w w
";

fn ammo_objects(game: &Game) -> usize {
    game.objects()
        .iter()
        .filter(|o| matches!(o.kind, ObjectKind::Ammo(_)))
        .count()
}

#[test]
fn test_noop_match_is_a_draw_after_ten_steps() {
    let mut game = Game::new(
        quick_settings(10),
        field(CORRIDOR_FIELD),
        noop_factory(),
        noop_factory(),
    )
    .unwrap();
    let stats = game.run().unwrap().clone();

    assert_eq!(game.state(), GameState::Ended);
    assert_eq!(stats.steps, 10);
    assert_eq!((stats.score_red, stats.score_blue), (1, 1));
    assert_eq!(stats.score, 0.5);
    assert!(!stats.error_red && !stats.error_blue);
    assert_eq!(stats.to_string(), "10 steps. Score: 1-1.");
}

#[test]
fn test_ammo_is_picked_up_once() {
    let settings = Settings {
        ammo_rate: 1000,
        ammo_amount: 3,
        ..quick_settings(8)
    };
    let mut game = Game::new(
        settings,
        field(AMMO_FIELD),
        scripted_factory(vec![Action::new(0.0, 20.0, false)]),
        noop_factory(),
    )
    .unwrap();
    game.setup().unwrap();
    assert_eq!(ammo_objects(&game), 1);

    let mut pickups = 0;
    while game.state() != GameState::Ended {
        pickups += game.step().unwrap().pickups.len();
    }

    assert_eq!(pickups, 1);
    assert_eq!(ammo_objects(&game), 0);
    assert_eq!(game.tank_states()[0].ammo, 3);
    assert_eq!(game.stats().ammo_red, 1);
    assert_eq!(game.stats().ammo_blue, 0);
}

#[test]
fn test_shot_sends_target_to_respawn() {
    let settings = Settings {
        ammo_rate: 1000,
        spawn_time: 10,
        end_condition: EndCondition::NONE,
        ..quick_settings(3)
    };
    let mut game = Game::new(
        settings,
        field(SHOOTING_FIELD),
        scripted_factory(vec![
            Action::new(0.0, 20.0, false),
            Action::new(0.0, 0.0, true),
        ]),
        noop_factory(),
    )
    .unwrap();

    let first = game.step().unwrap();
    assert!(first.shots.is_empty());
    assert_eq!(game.tank_states()[0].ammo, 3);

    let second = game.step().unwrap();
    let blue = game.tank_states()[1];
    assert_eq!(second.shots.len(), 1);
    assert_eq!(second.shots[0].hit, Some(blue.id));
    assert_eq!(second.respawns, vec![blue.id]);
    assert_eq!(blue.respawn_in, 10);
    assert_eq!(game.tank_states()[0].ammo, 2);

    game.step().unwrap();
    assert_eq!(game.tank_states()[1].respawn_in, 9);
}

#[test]
fn test_slow_agent_gets_noop() {
    let settings = Settings {
        think_time: 0.005,
        ..quick_settings(3)
    };
    let mut game = Game::new(
        settings,
        field(CORRIDOR_FIELD),
        sleepy_factory(Duration::from_millis(30)),
        noop_factory(),
    )
    .unwrap();
    game.setup().unwrap();
    let before = game.tank_states()[0];

    let stats = game.run().unwrap().clone();
    let after = game.tank_states()[0];

    assert_eq!(stats.timeouts_red, 3);
    assert_eq!(stats.timeouts_blue, 0);
    assert!(!stats.error_red);
    assert_eq!(after.position, before.position);
    assert_eq!(after.angle, before.angle);
    assert!(game.log().iter().any(|line| line.contains("timed out")));
}

#[test]
fn test_failing_agent_flags_its_side() {
    let mut game = Game::new(
        quick_settings(5),
        field(CORRIDOR_FIELD),
        failing_factory(),
        noop_factory(),
    )
    .unwrap();
    let stats = game.run().unwrap().clone();

    assert_eq!(game.state(), GameState::Ended);
    assert_eq!(stats.steps, 5);
    assert!(stats.error_red);
    assert!(!stats.error_blue);
    assert!(game.log().iter().any(|line| line.contains("division by zero")));
    assert!(game.log().iter().any(|line| line.contains("finalize failed")));
}

#[test]
fn test_interrupt_finalizes_agents() {
    let probe = FinalizeLog::default();
    let mut game = Game::new(
        quick_settings(50),
        field(CORRIDOR_FIELD),
        probe.factory(),
        probe.factory(),
    )
    .unwrap();
    let handle = game.interrupt_handle();
    for _ in 0..3 {
        game.step().unwrap();
    }
    handle.interrupt();
    let stats = game.run().unwrap().clone();

    assert_eq!(game.state(), GameState::Interrupt);
    assert!(stats.interrupted);
    assert_eq!(stats.steps, 3);
    assert_eq!(probe.calls(), 2);
    assert_eq!(probe.flags(), vec![true, true]);
}

#[test]
fn test_normal_end_finalizes_with_false() {
    let probe = FinalizeLog::default();
    let mut game = Game::new(
        quick_settings(2),
        field(CORRIDOR_FIELD),
        probe.factory(),
        noop_factory(),
    )
    .unwrap();
    game.run().unwrap();
    assert_eq!(probe.flags(), vec![false]);
}

#[test]
fn test_replay_reproduces_match() {
    let make = || {
        Game::new(
            Settings {
                ammo_rate: 5,
                end_condition: EndCondition::NONE,
                ..quick_settings(30)
            },
            field(SHOOTING_FIELD),
            scripted_factory(vec![
                Action::new(0.0, 20.0, false),
                Action::new(0.0, 0.0, true),
                Action::new(1.0, 30.0, true),
                Action::new(-0.3, 40.0, false),
                Action::new(2.0, -10.0, true),
            ]),
            scripted_factory(vec![Action::new(3.0, 25.0, true); 6]),
        )
        .unwrap()
        .with_recording()
    };
    assert_eq!(find_replay_divergence(make()), None);
    assert_eq!(find_first_divergence(make, 30), None);
}

#[test]
fn test_replay_file_roundtrip() {
    let mut game = Game::new(
        quick_settings(12),
        field(AMMO_FIELD),
        scripted_factory(vec![Action::new(0.2, 15.0, true); 12]),
        noop_factory(),
    )
    .unwrap()
    .with_recording();
    game.run().unwrap();
    let final_hash = game.state_hash();
    let replay = game.take_replay().unwrap();
    assert_eq!(replay.final_hash, final_hash);
    assert_eq!(replay.duration(), 12);
    assert_eq!(replay.name_red, "scripted");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("match.replay");
    replay.save(&path).unwrap();
    let loaded = ReplayData::load(&path).unwrap();

    let mut again = Game::from_replay(loaded).unwrap();
    again.run().unwrap();
    assert_eq!(again.state_hash(), final_hash);
    assert_eq!(again.scores(), game.scores());
}

#[test]
fn test_score_end_condition_on_owned_point() {
    // Red drives onto the point; with max_score 2 one owned step ends it.
    let text = "\
w w w w w w w
w R C _ _ B w
w _ _ _ _ _ w
w w w w w w w
";
    let mut game = Game::new(
        quick_settings(20),
        field(text),
        scripted_factory(vec![Action::new(0.0, 10.0, false)]),
        noop_factory(),
    )
    .unwrap();
    let stats = game.run().unwrap().clone();
    assert_eq!(game.state(), GameState::Ended);
    assert!(stats.steps < 20);
    assert_eq!((stats.score_red, stats.score_blue), (2, 0));
    assert_eq!(stats.score, 1.0);
}

#[test]
fn test_crumbs_end_condition_without_crumbs() {
    let settings = Settings {
        end_condition: EndCondition::CRUMBS,
        ..quick_settings(10)
    };
    let mut game = Game::new(settings, field(CORRIDOR_FIELD), noop_factory(), noop_factory())
        .unwrap();
    let mut reason = None;
    while reason.is_none() {
        reason = game.step().unwrap().end;
    }
    assert_eq!(reason, Some(EndReason::Crumbs));
    assert_eq!(game.stats().steps, 1);
}

#[test]
fn test_crumbs_are_collected() {
    let settings = Settings {
        end_condition: EndCondition::CRUMBS | EndCondition::SCORE,
        ..quick_settings(6)
    };
    let mut script = vec![Action::new(0.455, 20.0, false)];
    script.extend(std::iter::repeat(Action::new(0.0, 20.0, false)).take(5));
    let mut game = Game::new(
        settings,
        field(CRUMB_FIELD),
        scripted_factory(script),
        noop_factory(),
    )
    .unwrap();
    let stats = game.run().unwrap().clone();
    assert_eq!(stats.steps, 6);
    assert!(stats.crumbs_red > 0);
}

#[test]
fn test_invalid_settings_rejected() {
    let settings = Settings {
        max_score: 3,
        ..quick_settings(10)
    };
    let err = Game::new(settings, field(CORRIDOR_FIELD), noop_factory(), noop_factory())
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidSettings(_)));
}

#[test]
fn test_field_without_spawns_fails_setup() {
    let mut game = Game::new(
        quick_settings(10),
        field("w w w\nw _ w\nw w w\n"),
        noop_factory(),
        noop_factory(),
    )
    .unwrap();
    assert!(matches!(game.setup(), Err(GameError::InvalidState(_))));
}

#[test]
fn test_generated_field_match() {
    let settings = Settings {
        num_agents: 3,
        think_time: 1.0,
        max_steps: 20,
        ..Settings::default()
    };
    let config = FieldGeneratorConfig::from_settings(&settings).with_seed(7);
    let generated = Arc::new(generate(&config).unwrap());
    let mut game = Game::new(settings, generated, noop_factory(), noop_factory()).unwrap();
    game.setup().unwrap();
    assert_eq!(game.tank_states().len(), 6);
    let stats = game.run().unwrap();
    assert_eq!(stats.steps, 20);
}

#[test]
fn test_field_known_controls_context() {
    use std::sync::Mutex;

    let seen: Arc<Mutex<Vec<bool>>> = Arc::default();
    let record = Arc::clone(&seen);
    let factory = NamedFactory::new("ctx", move |ctx: AgentContext| -> Box<dyn Agent> {
        if let Ok(mut v) = record.lock() {
            v.push(ctx.field.is_some());
        }
        Box::new(NoOpAgent)
    });
    let factory: Arc<dyn AgentFactory> = Arc::new(factory);

    for known in [true, false] {
        let settings = Settings {
            field_known: known,
            ..quick_settings(1)
        };
        let mut game = Game::new(settings, field(CORRIDOR_FIELD), Arc::clone(&factory), noop_factory())
            .unwrap();
        game.setup().unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_match_always_terminates(settings in strategies::arb_settings()) {
        let steps = settings.max_steps;
        let mut game = Game::new(settings, field(CORRIDOR_FIELD), noop_factory(), noop_factory())
            .unwrap();
        let stats = game.run().unwrap().clone();
        prop_assert!(game.state().is_terminal());
        prop_assert!(stats.steps <= steps);
        prop_assert!((0.0..=1.0).contains(&stats.score));
    }

    #[test]
    fn prop_scripted_replay_is_exact(
        red in strategies::arb_script(10),
        blue in strategies::arb_script(10),
    ) {
        let game = Game::new(
            Settings { ammo_rate: 3, ..quick_settings(15) },
            field(SHOOTING_FIELD),
            scripted_factory(red),
            scripted_factory(blue),
        )
        .unwrap()
        .with_recording();
        prop_assert_eq!(find_replay_divergence(game), None);
    }
}
