//! Control point capture state machine.
//!
//! A control point keeps its owner plus a three-slot tally (red, blue,
//! neutral) of touches during the current step. The tally is cleared at the
//! start of every step; ownership persists.

use serde::{Deserialize, Serialize};

use crate::objects::Team;
use crate::settings::CaptureMode;

/// Ownership and per-step touch tally of a control point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPointState {
    /// Current owner.
    pub team: Team,
    /// Touches this step, indexed by [`Team::index`].
    pub tally: [u32; 3],
}

impl Default for ControlPointState {
    fn default() -> Self {
        Self {
            team: Team::Neutral,
            tally: [0; 3],
        }
    }
}

impl ControlPointState {
    /// Register a touch by a tank of `team`.
    pub fn touch(&mut self, team: Team, mode: CaptureMode) {
        match mode {
            CaptureMode::Neutral => {
                if self.tally[self.team.index()] > 0 && self.team != team {
                    self.team = Team::Neutral;
                } else {
                    self.team = team;
                    self.tally[team.index()] += 1;
                }
            }
            CaptureMode::First => {
                if self.tally[self.team.index()] == 0 {
                    self.team = team;
                    self.tally[team.index()] += 1;
                }
            }
            CaptureMode::Majority => {
                self.tally[team.index()] += 1;
                let mine = self.tally[team.index()];
                let owner = self.tally[self.team.index()];
                if self.team != team && mine == owner {
                    self.team = Team::Neutral;
                } else if mine > owner {
                    self.team = team;
                }
            }
        }
    }

    /// Clear the per-step tally.
    pub fn reset_tally(&mut self) {
        self.tally = [0; 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_mode_capture_and_contest() {
        let mut cp = ControlPointState::default();
        cp.touch(Team::Red, CaptureMode::Neutral);
        assert_eq!(cp.team, Team::Red);
        // Blue touching while red has touched this step neutralizes.
        cp.touch(Team::Blue, CaptureMode::Neutral);
        assert_eq!(cp.team, Team::Neutral);

        // Next step: uncontested blue capture.
        cp.reset_tally();
        cp.touch(Team::Blue, CaptureMode::Neutral);
        assert_eq!(cp.team, Team::Blue);
    }

    #[test]
    fn test_neutral_mode_keeps_owner_across_steps() {
        let mut cp = ControlPointState::default();
        cp.touch(Team::Red, CaptureMode::Neutral);
        cp.reset_tally();
        // Owner's tally is zero, so an enemy touch captures outright.
        cp.touch(Team::Blue, CaptureMode::Neutral);
        assert_eq!(cp.team, Team::Blue);
    }

    #[test]
    fn test_first_claim_wins_the_step() {
        let mut cp = ControlPointState::default();
        cp.touch(Team::Blue, CaptureMode::First);
        cp.touch(Team::Red, CaptureMode::First);
        cp.touch(Team::Red, CaptureMode::First);
        assert_eq!(cp.team, Team::Blue);
        cp.reset_tally();
        cp.touch(Team::Red, CaptureMode::First);
        assert_eq!(cp.team, Team::Red);
    }

    #[test]
    fn test_majority_flip_and_tie() {
        let mut cp = ControlPointState::default();
        cp.touch(Team::Red, CaptureMode::Majority);
        cp.touch(Team::Red, CaptureMode::Majority);
        assert_eq!(cp.team, Team::Red);

        cp.touch(Team::Blue, CaptureMode::Majority);
        assert_eq!(cp.team, Team::Red);
        // Tie with the owner.
        cp.touch(Team::Blue, CaptureMode::Majority);
        assert_eq!(cp.team, Team::Neutral);
        // Blue now exceeds the neutral tally.
        cp.touch(Team::Blue, CaptureMode::Majority);
        assert_eq!(cp.team, Team::Blue);
    }

    #[test]
    fn test_majority_overtake_from_red() {
        let mut cp = ControlPointState {
            team: Team::Red,
            tally: [1, 0, 0],
        };
        cp.touch(Team::Blue, CaptureMode::Majority);
        assert_eq!(cp.team, Team::Neutral);
        cp.touch(Team::Blue, CaptureMode::Majority);
        assert_eq!(cp.team, Team::Blue);
        assert_eq!(cp.tally, [1, 2, 0]);
    }
}
