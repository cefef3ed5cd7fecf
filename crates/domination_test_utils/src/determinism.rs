//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a match produces identical results
//! given identical inputs, and that a recorded replay reproduces the match
//! it was recorded from.
//!
//! # Testing Strategy
//!
//! Sources of non-determinism the harness is meant to catch:
//!
//! - **HashMap iteration order**: the default hasher is randomized, so the
//!   engine always iterates objects in id order.
//!
//! - **Unseeded randomness**: fountain spread must come from the match's
//!   seeded RNG only.
//!
//! - **Wall-clock effects**: think-time timeouts depend on the machine, so
//!   determinism checks use a generous think budget or replays, which never
//!   time out.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use domination_core::simulation::{Game, TankSnapshot};

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated.
    pub steps: u32,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic match).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the match was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Match is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a state machine multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps to simulate per run
/// * `setup` - Function to create the initial state
/// * `step` - Function to advance the state by one step
/// * `hash` - Function to compute the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u32,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..steps {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Play `steps` steps of a game, stopping early if the match ends.
fn advance(game: &mut Game, steps: u32) {
    for _ in 0..steps {
        if game.state().is_terminal() || game.step().is_err() {
            break;
        }
    }
}

/// Run two identically set up games and compare final state hashes.
pub fn verify_game_determinism<F>(setup_fn: F, steps: u32) -> bool
where
    F: Fn() -> Game,
{
    verify_determinism(2, steps, &setup_fn, |g| advance(g, 1), Game::state_hash).is_deterministic
}

/// Compare two games step by step, finding the first divergence.
///
/// # Returns
///
/// `None` if the games stay identical, `Some(step)` if they diverge at that
/// step.
pub fn find_first_divergence<F>(setup_fn: F, steps: u32) -> Option<u32>
where
    F: Fn() -> Game,
{
    let mut a = setup_fn();
    let mut b = setup_fn();
    if a.setup().is_err() || b.setup().is_err() {
        return Some(0);
    }
    if a.state_hash() != b.state_hash() {
        return Some(0);
    }

    for step in 1..=steps {
        advance(&mut a, 1);
        advance(&mut b, 1);
        if a.state_hash() != b.state_hash() {
            return Some(step);
        }
        if a.state().is_terminal() && b.state().is_terminal() {
            break;
        }
    }
    None
}

/// Per-step tank snapshots of a full match, starting after setup.
///
/// # Panics
///
/// Panics if the game cannot be set up or stepped.
#[must_use]
pub fn record_trajectory(game: &mut Game) -> Vec<Vec<TankSnapshot>> {
    game.setup().expect("game setup failed");
    let mut frames = vec![game.tank_states()];
    while !game.state().is_terminal() {
        game.step().expect("game step failed");
        frames.push(game.tank_states());
    }
    frames
}

/// Play a recording game to the end, replay it, and return the first step
/// at which the replay's tanks differ from the original's.
///
/// # Panics
///
/// Panics if the game was not built with recording enabled.
pub fn find_replay_divergence(mut game: Game) -> Option<usize> {
    let original = record_trajectory(&mut game);
    let replay = game.take_replay().expect("game was not recording");
    let mut replayed_game = Game::from_replay(replay).expect("replay settings invalid");
    let replayed = record_trajectory(&mut replayed_game);

    if original.len() != replayed.len() {
        return Some(original.len().min(replayed.len()));
    }
    original
        .iter()
        .zip(&replayed)
        .position(|(a, b)| a != b)
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for engine inputs.
pub mod strategies {
    use proptest::prelude::*;

    use domination_core::agent::Action;
    use domination_core::settings::{CaptureMode, Settings};

    /// Any finite action, including out-of-range turns and speeds.
    pub fn arb_action() -> impl Strategy<Value = Action> {
        (-10.0f64..10.0, -100.0f64..100.0, any::<bool>())
            .prop_map(|(turn, speed, shoot)| Action::new(turn, speed, shoot))
    }

    /// A short script of actions.
    pub fn arb_script(len: usize) -> impl Strategy<Value = Vec<Action>> {
        prop::collection::vec(arb_action(), 1..=len)
    }

    /// Capture mode.
    pub fn arb_capture_mode() -> impl Strategy<Value = CaptureMode> {
        prop_oneof![
            Just(CaptureMode::Neutral),
            Just(CaptureMode::First),
            Just(CaptureMode::Majority),
        ]
    }

    /// Valid settings for short matches with a generous think budget.
    pub fn arb_settings() -> impl Strategy<Value = Settings> {
        (1u32..40, 1i64..50, arb_capture_mode(), any::<u64>(), 1usize..4).prop_map(
            |(max_steps, half_score, capture_mode, seed, num_agents)| Settings {
                max_steps,
                max_score: half_score * 2,
                capture_mode,
                seed,
                num_agents,
                think_time: 5.0,
                ..Settings::default()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_determinism_counter() {
        let result = verify_determinism(3, 10, || 0u64, |s| *s += 2, |s| *s);
        result.assert_deterministic();
        assert_eq!(result.hashes, vec![20, 20, 20]);
        assert_eq!(result.unique_hashes().len(), 1);
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1, "a")), compute_hash(&(1, "a")));
        assert_ne!(compute_hash(&1), compute_hash(&2));
    }
}
