//! Match statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::objects::Team;

/// Running counters for one match, finalized by `Game::end`.
///
/// Timing fields are wall-clock measurements and differ between runs of the
/// same match; everything else is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStats {
    /// Final red score.
    pub score_red: i64,
    /// Final blue score.
    pub score_blue: i64,
    /// `score_red / (score_red + score_blue)`.
    pub score: f64,
    /// Steps played.
    pub steps: u32,
    /// Crumbs picked up by red.
    pub crumbs_red: u32,
    /// Crumbs picked up by blue.
    pub crumbs_blue: u32,
    /// Ammo packs picked up by red.
    pub ammo_red: u32,
    /// Ammo packs picked up by blue.
    pub ammo_blue: u32,
    /// Red decisions discarded for exceeding the think budget.
    pub timeouts_red: u32,
    /// Blue decisions discarded for exceeding the think budget.
    pub timeouts_blue: u32,
    /// A red delegate returned a fault.
    pub error_red: bool,
    /// A blue delegate returned a fault.
    pub error_blue: bool,
    /// The match was stopped from outside.
    pub interrupted: bool,
    /// Seconds spent in object updates.
    pub update_time: f64,
    /// Seconds spent in red decision calls.
    pub think_time_red: f64,
    /// Seconds spent in blue decision calls.
    pub think_time_blue: f64,
    /// Seconds spent in physics substeps.
    pub physics_time: f64,
    /// Tanks per team, for per-tank averages.
    pub tanks_per_team: usize,
}

impl GameStats {
    /// Normalized score from raw scores. Both zero counts as a draw.
    #[must_use]
    pub fn normalized_score(red: i64, blue: i64) -> f64 {
        let total = red + blue;
        if total == 0 {
            0.5
        } else {
            red as f64 / total as f64
        }
    }

    /// Average seconds of thinking per tank per step for `team`.
    #[must_use]
    pub fn think_time_per_tank(&self, team: Team) -> f64 {
        let total = match team {
            Team::Red => self.think_time_red,
            Team::Blue => self.think_time_blue,
            Team::Neutral => return 0.0,
        };
        let calls = self.steps as usize * self.tanks_per_team;
        if calls == 0 {
            0.0
        } else {
            total / calls as f64
        }
    }

    pub(crate) fn count_pickup(&mut self, team: Team, crumb: bool) {
        let counter = match (team, crumb) {
            (Team::Red, true) => &mut self.crumbs_red,
            (Team::Blue, true) => &mut self.crumbs_blue,
            (Team::Red, false) => &mut self.ammo_red,
            (Team::Blue, false) => &mut self.ammo_blue,
            (Team::Neutral, _) => return,
        };
        *counter += 1;
    }

    pub(crate) fn count_timeout(&mut self, team: Team) {
        match team {
            Team::Red => self.timeouts_red += 1,
            Team::Blue => self.timeouts_blue += 1,
            Team::Neutral => {}
        }
    }

    pub(crate) fn flag_error(&mut self, team: Team) {
        match team {
            Team::Red => self.error_red = true,
            Team::Blue => self.error_blue = true,
            Team::Neutral => {}
        }
    }

    pub(crate) fn add_think_time(&mut self, team: Team, seconds: f64) {
        match team {
            Team::Red => self.think_time_red += seconds,
            Team::Blue => self.think_time_blue += seconds,
            Team::Neutral => {}
        }
    }
}

impl fmt::Display for GameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} steps. Score: {}-{}.",
            self.steps, self.score_red, self.score_blue
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_score() {
        assert_eq!(GameStats::normalized_score(1, 1), 0.5);
        assert_eq!(GameStats::normalized_score(3, 1), 0.75);
        assert_eq!(GameStats::normalized_score(0, 0), 0.5);
    }

    #[test]
    fn test_display() {
        let stats = GameStats {
            steps: 10,
            score_red: 1,
            score_blue: 1,
            ..GameStats::default()
        };
        assert_eq!(stats.to_string(), "10 steps. Score: 1-1.");
    }

    #[test]
    fn test_counters_per_side() {
        let mut stats = GameStats::default();
        stats.count_pickup(Team::Red, true);
        stats.count_pickup(Team::Blue, false);
        stats.count_timeout(Team::Blue);
        stats.flag_error(Team::Red);
        assert_eq!((stats.crumbs_red, stats.ammo_blue), (1, 1));
        assert_eq!((stats.timeouts_red, stats.timeouts_blue), (0, 1));
        assert!(stats.error_red && !stats.error_blue);
    }

    #[test]
    fn test_think_time_average() {
        let stats = GameStats {
            steps: 10,
            tanks_per_team: 2,
            think_time_red: 2.0,
            ..GameStats::default()
        };
        assert!((stats.think_time_per_tank(Team::Red) - 0.1).abs() < 1e-12);
        assert_eq!(stats.think_time_per_tank(Team::Blue), 0.0);
    }
}
