//! Batch match runner for tournaments and agent comparison.
//!
//! Runs many independent matches in parallel using rayon. Game `i` uses
//! seed `seed_start + i` for both its generated field and its object RNG,
//! so a batch is reproducible as long as no agent times out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use domination_core::settings::Settings;

use crate::agents;
use crate::error::{MatchError, Result};
use crate::match_runner::{run_match, MatchConfig, MatchResult, Winner};

/// Configuration for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Built-in agent playing red.
    pub red: String,
    /// Built-in agent playing blue.
    pub blue: String,
    /// Number of matches.
    pub game_count: u32,
    /// Worker threads (0 = rayon default).
    pub parallel_games: u32,
    /// Seed of the first match.
    pub seed_start: u64,
    /// Settings shared by every match; the seed is overridden per match.
    pub settings: Settings,
    /// Output directory for results.
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            red: "capture".to_string(),
            blue: "random".to_string(),
            game_count: 100,
            parallel_games: 0,
            seed_start: 0,
            settings: Settings::default(),
            output_dir: PathBuf::from("results"),
        }
    }
}

impl BatchConfig {
    /// `game_count` matches of `red` against `blue`.
    pub fn new(red: &str, blue: &str, game_count: u32) -> Self {
        Self {
            red: red.to_string(),
            blue: blue.to_string(),
            game_count,
            ..Default::default()
        }
    }

    /// Set shared settings.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Set seed start.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set output directory.
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }
}

/// Error during a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Game index.
    pub game_index: u32,
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Aggregate over the matches of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Matches completed.
    pub games: u32,
    /// Red wins.
    pub red_wins: u32,
    /// Blue wins.
    pub blue_wins: u32,
    /// Draws.
    pub draws: u32,
    /// Matches with a red agent fault.
    pub red_errors: u32,
    /// Matches with a blue agent fault.
    pub blue_errors: u32,
    /// Mean normalized red score.
    pub mean_score: f64,
    /// Mean match length in steps.
    pub mean_steps: f64,
    /// Win rate per side ("red", "blue", "draw").
    pub win_rates: BTreeMap<String, f64>,
}

impl BatchSummary {
    /// Summarize finished matches.
    pub fn from_games(games: &[MatchResult]) -> Self {
        let mut summary = Self {
            games: games.len() as u32,
            ..Self::default()
        };
        if games.is_empty() {
            return summary;
        }
        for game in games {
            match game.winner {
                Winner::Red => summary.red_wins += 1,
                Winner::Blue => summary.blue_wins += 1,
                Winner::Draw => summary.draws += 1,
            }
            summary.red_errors += u32::from(game.error_red);
            summary.blue_errors += u32::from(game.error_blue);
            summary.mean_score += game.score;
            summary.mean_steps += f64::from(game.steps);
        }
        let n = f64::from(summary.games);
        summary.mean_score /= n;
        summary.mean_steps /= n;
        summary.win_rates = [
            ("red", summary.red_wins),
            ("blue", summary.blue_wins),
            ("draw", summary.draws),
        ]
        .into_iter()
        .map(|(side, count)| (side.to_string(), f64::from(count) / n))
        .collect();
        summary
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual match results, in game order.
    pub games: Vec<MatchResult>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Errors encountered.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MatchError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| MatchError::io(path, e))
    }

    /// Load results from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| MatchError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Run match `index` of a batch.
pub fn run_single_game(config: &BatchConfig, index: u32) -> Result<MatchResult> {
    let seed = config.seed_start.wrapping_add(u64::from(index));
    let settings = Settings {
        seed,
        ..config.settings.clone()
    };
    let red = agents::factory(&config.red, seed)?;
    let blue = agents::factory(&config.blue, seed.rotate_left(32))?;
    run_match(&MatchConfig::new(settings, red, blue))
}

/// Run a batch of matches.
pub fn run_batch(config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    let completed = AtomicU32::new(0);

    info!(
        red = %config.red,
        blue = %config.blue,
        games = config.game_count,
        "Starting batch run"
    );

    let play_all = || -> Vec<Result<MatchResult>> {
        (0..config.game_count)
            .into_par_iter()
            .map(|i| {
                let result = run_single_game(&config, i);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % 10 == 0 {
                    debug!("Progress: {}/{}", done, config.game_count);
                }
                result
            })
            .collect()
    };

    let outcomes = if config.parallel_games > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build()
        {
            Ok(pool) => pool.install(play_all),
            Err(e) => {
                warn!(error = %e, "Failed to build thread pool, using the global one");
                play_all()
            }
        }
    } else {
        play_all()
    };

    let mut games = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();
    for (i, outcome) in (0u32..).zip(outcomes) {
        match outcome {
            Ok(result) => games.push(result),
            Err(e) => {
                warn!("Game {} failed: {}", i, e);
                errors.push(BatchError {
                    game_index: i,
                    seed: config.seed_start.wrapping_add(u64::from(i)),
                    message: e.to_string(),
                });
            }
        }
    }

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        "Batch complete: {} games in {:.1}s ({:.1} games/sec)",
        games.len(),
        duration_seconds,
        games.len() as f64 / duration_seconds.max(0.001)
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Run match `index` of `config` several times and compare state hashes.
pub fn verify_determinism(config: &BatchConfig, index: u32, runs: u32) -> Result<bool> {
    let mut hashes = Vec::with_capacity(runs as usize);
    for _ in 0..runs {
        hashes.push(run_single_game(config, index)?.state_hash);
    }
    Ok(hashes.windows(2).all(|w| w[0] == w[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_nothing() {
        let summary = BatchSummary::from_games(&[]);
        assert_eq!(summary.games, 0);
        assert!(summary.win_rates.is_empty());
    }

    #[test]
    fn test_unknown_agent_fails_each_game() {
        let config = BatchConfig::new("capture", "sniper", 3);
        let results = run_batch(config);
        assert!(results.games.is_empty());
        assert_eq!(results.errors.len(), 3);
        assert_eq!(results.errors[2].seed, 2);
        assert!(results.errors[0].message.contains("sniper"));
    }
}
