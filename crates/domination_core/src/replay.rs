//! Replay recording and playback data.
//!
//! A replay stores the settings, the field and every tank's action for every
//! step. Feeding it back into [`Game::from_replay`](crate::simulation::Game::from_replay)
//! reproduces the recorded match step for step: replayed tanks consume their
//! queued actions instead of calling a delegate.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::agent::Action;
use crate::error::{GameError, Result};
use crate::field::Field;
use crate::objects::Team;
use crate::settings::Settings;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Everything needed to re-run a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayData {
    /// Replay format version.
    pub version: u32,
    /// Match settings; `max_steps` is the number of steps played.
    pub settings: Settings,
    /// Field the match was played on.
    pub field: Field,
    /// Red agent name.
    pub name_red: String,
    /// Blue agent name.
    pub name_blue: String,
    /// Per red tank, the action taken each step.
    pub actions_red: Vec<Vec<Action>>,
    /// Per blue tank, the action taken each step.
    pub actions_blue: Vec<Vec<Action>>,
    /// State hash at the end of the recorded match.
    pub final_hash: u64,
}

impl ReplayData {
    /// Action lists for one side.
    #[must_use]
    pub fn actions(&self, team: Team) -> &[Vec<Action>] {
        match team {
            Team::Red => &self.actions_red,
            Team::Blue => &self.actions_blue,
            Team::Neutral => &[],
        }
    }

    /// Steps recorded.
    #[must_use]
    pub const fn duration(&self) -> u32 {
        self.settings.max_steps
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::Replay(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes).map_err(|e| GameError::io(&path, e))
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if reading, deserialization or the version check
    /// fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| GameError::io(&path, e))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::Replay(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::Replay(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReplayData {
        ReplayData {
            version: REPLAY_VERSION,
            settings: Settings {
                max_steps: 2,
                ..Settings::default()
            },
            field: "w w w\nR _ B\nw w w\n".parse().unwrap(),
            name_red: "red".to_string(),
            name_blue: "blue".to_string(),
            actions_red: vec![vec![Action::new(0.1, 2.0, false), Action::NOOP]],
            actions_blue: vec![vec![Action::NOOP, Action::new(0.0, 0.0, true)]],
            final_hash: 42,
        }
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("match.replay");
        let replay = sample();
        replay.save(&path).unwrap();
        let loaded = ReplayData::load(&path).unwrap();
        assert_eq!(loaded, replay);
        assert_eq!(loaded.duration(), 2);
        assert!(loaded.actions(Team::Blue)[0][1].shoot);
    }

    #[test]
    fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.replay");
        let mut replay = sample();
        replay.version = REPLAY_VERSION + 1;
        replay.save(&path).unwrap();
        assert!(matches!(ReplayData::load(&path), Err(GameError::Replay(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplayData::load(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, GameError::Io { .. }));
    }
}
