//! Single match execution and result handoff.
//!
//! A [`MatchConfig`] names the settings, the field and both teams' agent
//! factories. [`run_match`] plays it to the end and packs what a ranking
//! service needs into a [`MatchResult`]: normalized score, raw scores,
//! per-side error flags, the match log capped at [`MAX_LOG_BYTES`] and the
//! statistics as an opaque JSON blob.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use domination_core::agent::AgentFactory;
use domination_core::field::Field;
use domination_core::field_generator::{generate, FieldGeneratorConfig};
use domination_core::replay::ReplayData;
use domination_core::settings::Settings;
use domination_core::simulation::{Game, GameState};

use crate::error::{MatchError, Result};

/// Largest match log handed to a ranking sink, in bytes.
pub const MAX_LOG_BYTES: usize = 16 * 1024;

/// Appended to a log that was cut at [`MAX_LOG_BYTES`].
pub const LOG_TRUNCATED_MARKER: &str = "\n== LOG TRUNCATED ==\n";

/// Normalized scores within this distance of 0.5 count as a draw.
pub const DRAW_MARGIN: f64 = 0.001;

/// Everything needed to play one match.
#[derive(Clone)]
pub struct MatchConfig {
    /// Match settings.
    pub settings: Settings,
    /// Field to play on. Generated from the settings when `None`.
    pub field: Option<Arc<Field>>,
    /// Red team's agents.
    pub red: Arc<dyn AgentFactory>,
    /// Blue team's agents.
    pub blue: Arc<dyn AgentFactory>,
    /// Keep a replay of the match.
    pub record: bool,
}

impl MatchConfig {
    /// Config for a match on a generated field.
    pub fn new(settings: Settings, red: Arc<dyn AgentFactory>, blue: Arc<dyn AgentFactory>) -> Self {
        Self {
            settings,
            field: None,
            red,
            blue,
            record: false,
        }
    }

    /// Play on a fixed field.
    pub fn with_field(mut self, field: Arc<Field>) -> Self {
        self.field = Some(field);
        self
    }

    /// Record a replay.
    pub fn with_recording(mut self) -> Self {
        self.record = true;
        self
    }
}

impl std::fmt::Debug for MatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchConfig")
            .field("settings", &self.settings)
            .field("fixed_field", &self.field.is_some())
            .field("red", &self.red.name())
            .field("blue", &self.blue.name())
            .field("record", &self.record)
            .finish()
    }
}

/// Match outcome from the red team's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    /// Red scored more.
    Red,
    /// Blue scored more.
    Blue,
    /// Within [`DRAW_MARGIN`] of an even split.
    Draw,
}

impl Winner {
    /// Outcome for a normalized red score.
    pub fn from_score(score: f64) -> Self {
        if score > 0.5 + DRAW_MARGIN {
            Self::Red
        } else if score < 0.5 - DRAW_MARGIN {
            Self::Blue
        } else {
            Self::Draw
        }
    }
}

/// What a finished match hands to the ranking side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Red agent name.
    pub red: String,
    /// Blue agent name.
    pub blue: String,
    /// Normalized red score in `[0, 1]`.
    pub score: f64,
    /// Final red score.
    pub score_red: i64,
    /// Final blue score.
    pub score_blue: i64,
    /// A red agent faulted.
    pub error_red: bool,
    /// A blue agent faulted.
    pub error_blue: bool,
    /// Outcome derived from `score`.
    pub winner: Winner,
    /// Steps played.
    pub steps: u32,
    /// Stopped by an interrupt.
    pub interrupted: bool,
    /// Final state hash.
    pub state_hash: u64,
    /// Match log, capped at [`MAX_LOG_BYTES`].
    pub log: String,
    /// Serialized statistics.
    pub stats: String,
    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
    /// Replay, when the match was recorded.
    #[serde(skip)]
    pub replay: Option<ReplayData>,
}

impl MatchResult {
    /// Collect the result of a finished game.
    pub fn from_game(game: &mut Game, duration_seconds: f64) -> Result<Self> {
        if !game.state().is_terminal() {
            return Err(domination_core::error::GameError::InvalidState(format!(
                "match still {:?}",
                game.state()
            ))
            .into());
        }
        let stats = game.stats().clone();
        let [red, blue] = game.names().clone();
        Ok(Self {
            red,
            blue,
            score: stats.score,
            score_red: stats.score_red,
            score_blue: stats.score_blue,
            error_red: stats.error_red,
            error_blue: stats.error_blue,
            winner: Winner::from_score(stats.score),
            steps: stats.steps,
            interrupted: game.state() == GameState::Interrupt,
            state_hash: game.state_hash(),
            log: truncate_log(&game.log_text()),
            stats: serde_json::to_string(&stats)?,
            duration_seconds,
            replay: game.take_replay(),
        })
    }
}

/// Cap `text` at [`MAX_LOG_BYTES`], cutting on a character boundary and
/// appending [`LOG_TRUNCATED_MARKER`].
pub fn truncate_log(text: &str) -> String {
    if text.len() <= MAX_LOG_BYTES {
        return text.to_string();
    }
    let mut end = MAX_LOG_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + LOG_TRUNCATED_MARKER.len());
    out.push_str(&text[..end]);
    out.push_str(LOG_TRUNCATED_MARKER);
    out
}

/// Field described by `settings`, generated with `settings.seed`.
pub fn generated_field(settings: &Settings) -> Result<Field> {
    let config = FieldGeneratorConfig::from_settings(settings).with_seed(settings.seed);
    Ok(generate(&config)?)
}

/// Build the game for `config` without playing it.
pub fn build_game(config: &MatchConfig) -> Result<Game> {
    let field = match &config.field {
        Some(field) => Arc::clone(field),
        None => Arc::new(generated_field(&config.settings)?),
    };
    let game = Game::new(
        config.settings.clone(),
        field,
        Arc::clone(&config.red),
        Arc::clone(&config.blue),
    )?;
    Ok(if config.record { game.with_recording() } else { game })
}

/// Play a match to the end.
pub fn run_match(config: &MatchConfig) -> Result<MatchResult> {
    let mut game = build_game(config)?;
    play(&mut game)
}

/// Play an already built game to the end.
pub fn play(game: &mut Game) -> Result<MatchResult> {
    let start = Instant::now();
    debug!(red = %game.names()[0], blue = %game.names()[1], "Playing match");
    game.run()?;
    let result = MatchResult::from_game(game, start.elapsed().as_secs_f64())?;
    info!(
        red = %result.red,
        blue = %result.blue,
        score = result.score,
        steps = result.steps,
        winner = ?result.winner,
        "Match finished"
    );
    Ok(result)
}

/// Receiver of finished matches, e.g. a rating service.
pub trait RankingSink {
    /// Record one result.
    fn submit(&mut self, result: &MatchResult) -> Result<()>;
}

/// Win/draw/loss record of one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    /// Matches won.
    pub wins: u32,
    /// Matches drawn.
    pub draws: u32,
    /// Matches lost.
    pub losses: u32,
    /// Matches in which the agent faulted.
    pub errors: u32,
}

impl Standing {
    /// Three points per win, one per draw.
    pub const fn points(&self) -> u32 {
        self.wins * 3 + self.draws
    }
}

/// Sink that keeps every result in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    /// Submitted results in order.
    pub results: Vec<MatchResult>,
}

impl InMemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standings per agent name.
    pub fn standings(&self) -> BTreeMap<String, Standing> {
        let mut table: BTreeMap<String, Standing> = BTreeMap::new();
        for r in &self.results {
            let (red_outcome, blue_outcome) = match r.winner {
                Winner::Red => (Outcome::Win, Outcome::Loss),
                Winner::Blue => (Outcome::Loss, Outcome::Win),
                Winner::Draw => (Outcome::Draw, Outcome::Draw),
            };
            table.entry(r.red.clone()).or_default().record(red_outcome, r.error_red);
            table.entry(r.blue.clone()).or_default().record(blue_outcome, r.error_blue);
        }
        table
    }
}

impl RankingSink for InMemorySink {
    fn submit(&mut self, result: &MatchResult) -> Result<()> {
        if !(0.0..=1.0).contains(&result.score) {
            return Err(MatchError::Sink(format!("score {} out of range", result.score)));
        }
        self.results.push(result.clone());
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Standing {
    fn record(&mut self, outcome: Outcome, error: bool) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Loss => self.losses += 1,
        }
        if error {
            self.errors += 1;
        }
    }
}
