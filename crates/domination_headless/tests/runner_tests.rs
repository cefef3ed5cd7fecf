//! Match runner and batch integration tests.

use std::sync::Arc;

use domination_core::prelude::*;
use domination_headless::agents;
use domination_headless::batch::{run_batch, verify_determinism, BatchConfig, BatchResults};
use domination_headless::match_runner::{build_game, play, run_match, MatchConfig};
use domination_headless::{InMemorySink, RankingSink, Winner};
use domination_test_utils::fixtures::{failing_factory, field, noop_factory, quick_settings, CORRIDOR_FIELD};

fn short_settings() -> Settings {
    Settings {
        max_steps: 20,
        num_agents: 2,
        think_time: 1.0,
        ..Settings::default()
    }
}

#[test]
fn test_noop_match_result_is_a_draw() {
    let config = MatchConfig::new(quick_settings(10), noop_factory(), noop_factory())
        .with_field(field(CORRIDOR_FIELD));
    let result = run_match(&config).unwrap();

    assert_eq!(result.winner, Winner::Draw);
    assert_eq!(result.score, 0.5);
    assert_eq!((result.score_red, result.score_blue), (1, 1));
    assert_eq!(result.steps, 10);
    assert!(!result.interrupted);
    assert!(!result.error_red && !result.error_blue);
    assert_eq!((result.red.as_str(), result.blue.as_str()), ("noop", "noop"));

    let stats: GameStats = serde_json::from_str(&result.stats).unwrap();
    assert_eq!(stats.steps, 10);
}

#[test]
fn test_capture_agent_beats_noop() {
    let config = MatchConfig::new(
        quick_settings(30),
        agents::factory("capture", 0).unwrap(),
        noop_factory(),
    )
    .with_field(field(CORRIDOR_FIELD));
    let result = run_match(&config).unwrap();

    assert_eq!(result.winner, Winner::Red);
    assert_eq!((result.score_red, result.score_blue), (2, 0));
    assert!(result.steps < 30);
}

#[test]
fn test_faulty_side_is_reported() {
    let config = MatchConfig::new(quick_settings(5), noop_factory(), failing_factory())
        .with_field(field(CORRIDOR_FIELD));
    let result = run_match(&config).unwrap();

    assert!(!result.error_red);
    assert!(result.error_blue);
    assert!(result.log.contains("division by zero"));

    let mut sink = InMemorySink::new();
    sink.submit(&result).unwrap();
    assert_eq!(sink.standings()["failing"].errors, 1);
}

#[test]
fn test_recorded_match_replays_to_same_hash() {
    let settings = Settings {
        seed: 11,
        ..short_settings()
    };
    let config = MatchConfig::new(
        settings,
        agents::factory("random", 3).unwrap(),
        agents::factory("capture", 0).unwrap(),
    )
    .with_recording();
    let mut result = run_match(&config).unwrap();
    let replay = result.replay.take().unwrap();
    assert_eq!(replay.final_hash, result.state_hash);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.replay");
    replay.save(&path).unwrap();

    let mut game = Game::from_replay(ReplayData::load(&path).unwrap()).unwrap();
    let replayed = play(&mut game).unwrap();
    assert_eq!(replayed.state_hash, result.state_hash);
    assert_eq!(replayed.score, result.score);
}

#[test]
fn test_unfinished_game_has_no_result() {
    let config = MatchConfig::new(quick_settings(10), noop_factory(), noop_factory())
        .with_field(field(CORRIDOR_FIELD));
    let mut game = build_game(&config).unwrap();
    game.step().unwrap();
    assert!(domination_headless::MatchResult::from_game(&mut game, 0.0).is_err());
}

#[test]
fn test_generated_field_is_seeded() {
    let settings = Settings {
        seed: 5,
        ..short_settings()
    };
    let a = domination_headless::match_runner::generated_field(&settings).unwrap();
    let b = domination_headless::match_runner::generated_field(&settings).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.red_spawns.len(), 2);
}

#[test]
fn test_batch_runs_and_saves() {
    let config = BatchConfig {
        parallel_games: 2,
        ..BatchConfig::new("capture", "random", 4).with_settings(short_settings())
    }
    .with_seed(100);
    let results = run_batch(config);

    assert!(results.errors.is_empty());
    assert_eq!(results.games.len(), 4);
    let s = &results.summary;
    assert_eq!(s.games, 4);
    assert_eq!(s.red_wins + s.blue_wins + s.draws, 4);
    assert!((0.0..=1.0).contains(&s.mean_score));
    let rates: f64 = s.win_rates.values().sum();
    assert!((rates - 1.0).abs() < 1e-9);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("batch_results.json");
    results.save(&path).unwrap();
    let loaded = BatchResults::load(&path).unwrap();
    assert_eq!(loaded.summary.games, 4);
    assert_eq!(loaded.summary.red_wins, results.summary.red_wins);
    assert_eq!(loaded.games.len(), 4);
    assert!(loaded.games.iter().all(|g| g.replay.is_none()));
}

#[test]
fn test_batch_match_is_deterministic() {
    let config = BatchConfig::new("random", "capture", 1)
        .with_settings(short_settings())
        .with_seed(42);
    assert!(verify_determinism(&config, 0, 2).unwrap());
}

#[test]
fn test_fixed_field_config_is_shared() {
    let shared: Arc<Field> = field(CORRIDOR_FIELD);
    let config = MatchConfig::new(quick_settings(3), noop_factory(), noop_factory())
        .with_field(Arc::clone(&shared));
    let game = build_game(&config).unwrap();
    assert_eq!(game.field(), shared.as_ref());
}
