//! Per-match settings.
//!
//! Settings are plain data: they are loaded from RON or built in code and
//! then checked with [`Settings::validate`]. The engine refuses to construct
//! a match from settings that do not validate.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::BitOr;
use std::path::Path;
use std::time::Duration;

use crate::error::{GameError, Result};

/// How touching tanks change control point ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CaptureMode {
    /// Captured by whichever team touches it; contested touches neutralize.
    #[default]
    Neutral,
    /// The first team to touch it in a step keeps it for that step.
    First,
    /// The team with more touches in a step takes it; ties neutralize.
    Majority,
}

/// Conditions that end a match before `max_steps`.
///
/// Flags combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndCondition(u8);

impl EndCondition {
    /// Play until `max_steps`.
    pub const NONE: Self = Self(0);
    /// End when either side's score reaches exactly zero.
    pub const SCORE: Self = Self(1);
    /// End when no crumbs remain on the field.
    pub const CRUMBS: Self = Self(2);

    /// Whether every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for EndCondition {
    fn default() -> Self {
        Self::SCORE
    }
}

impl BitOr for EndCondition {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Immutable configuration of a single match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of steps before the match ends.
    pub max_steps: u32,
    /// Combined score pool; each side starts with half. Must be even.
    pub max_score: i64,
    /// Maximum absolute turn per step (radians).
    pub max_turn: f64,
    /// Maximum forward distance per step.
    pub max_speed: f64,
    /// Length of a shot.
    pub max_range: f64,
    /// Half-width of the square a tank can see around itself.
    pub max_see: f64,
    /// Whether agents receive the field geometry at construction.
    pub field_known: bool,
    /// Steps an ammo fountain waits before refilling.
    pub ammo_rate: i32,
    /// Ammo granted per pickup.
    pub ammo_amount: u32,
    /// Steps a shot tank waits before respawning.
    pub spawn_time: i32,
    /// Generated field width in tiles. Must be odd.
    pub field_width: usize,
    /// Generated field height in tiles.
    pub field_height: usize,
    /// Tile edge length in world units.
    pub tilesize: f64,
    /// Wall-clock budget for one observe + act cycle, in seconds.
    pub think_time: f64,
    /// Control point capture rule.
    pub capture_mode: CaptureMode,
    /// Early end conditions.
    pub end_condition: EndCondition,
    /// Tanks per team.
    pub num_agents: usize,
    /// Seed for in-match randomness (crumb spread).
    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_steps: 500,
            max_score: 1000,
            max_turn: PI / 3.0,
            max_speed: 40.0,
            max_range: 60.0,
            max_see: 100.0,
            field_known: true,
            ammo_rate: 20,
            ammo_amount: 3,
            spawn_time: 10,
            field_width: 47,
            field_height: 32,
            tilesize: 16.0,
            think_time: 0.010,
            capture_mode: CaptureMode::Neutral,
            end_condition: EndCondition::SCORE,
            num_agents: 5,
            seed: 0,
        }
    }
}

impl Settings {
    /// Check every constraint, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(GameError::InvalidSettings(msg));
        if self.max_score <= 0 || self.max_score % 2 != 0 {
            return fail(format!(
                "max_score must be a positive even number, got {}",
                self.max_score
            ));
        }
        if self.field_width % 2 != 1 {
            return fail(format!("field_width must be odd, got {}", self.field_width));
        }
        if self.field_height < 3 {
            return fail(format!(
                "field_height must be at least 3, got {}",
                self.field_height
            ));
        }
        if self.max_steps == 0 {
            return fail("max_steps must be at least 1".to_string());
        }
        if self.num_agents == 0 {
            return fail("num_agents must be at least 1".to_string());
        }
        if !(self.tilesize.is_finite() && self.tilesize > 0.0) {
            return fail(format!("tilesize must be positive, got {}", self.tilesize));
        }
        if !(self.think_time.is_finite() && self.think_time > 0.0) {
            return fail(format!(
                "think_time must be positive, got {}",
                self.think_time
            ));
        }
        for (name, value) in [
            ("max_turn", self.max_turn),
            ("max_speed", self.max_speed),
            ("max_range", self.max_range),
            ("max_see", self.max_see),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return fail(format!("{name} must be finite and non-negative, got {value}"));
            }
        }
        if self.spawn_time < 0 {
            return fail(format!(
                "spawn_time must be non-negative, got {}",
                self.spawn_time
            ));
        }
        Ok(())
    }

    /// Consume and return the settings if they validate.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Wall-clock budget for one decision.
    #[must_use]
    pub fn think_budget(&self) -> Duration {
        Duration::from_secs_f64(self.think_time)
    }

    /// Parse settings from RON text. Missing fields take their defaults.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let settings: Self = ron::from_str(text)
            .map_err(|e| GameError::InvalidSettings(format!("Failed to parse settings: {e}")))?;
        settings.validated()
    }

    /// Load and validate settings from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| GameError::io(&path, e))?;
        Self::from_ron_str(&text)
    }

    /// Render as pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::InvalidSettings(format!("Failed to serialize settings: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.max_steps, 500);
        assert_eq!(settings.max_score, 1000);
        assert_eq!(settings.end_condition, EndCondition::SCORE);
    }

    #[test]
    fn test_odd_max_score_rejected() {
        let settings = Settings {
            max_score: 999,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(GameError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_even_field_width_rejected() {
        let settings = Settings {
            field_width: 48,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(GameError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_end_condition_flags_combine() {
        let both = EndCondition::SCORE | EndCondition::CRUMBS;
        assert!(both.contains(EndCondition::SCORE));
        assert!(both.contains(EndCondition::CRUMBS));
        assert!(!EndCondition::SCORE.contains(EndCondition::CRUMBS));
        assert!(!EndCondition::NONE.contains(EndCondition::SCORE));
    }

    #[test]
    fn test_ron_roundtrip_with_partial_input() {
        let settings = Settings::from_ron_str("(max_steps: 20, capture_mode: Majority)").unwrap();
        assert_eq!(settings.max_steps, 20);
        assert_eq!(settings.capture_mode, CaptureMode::Majority);
        assert_eq!(settings.max_score, 1000);

        let text = settings.to_ron_string().unwrap();
        assert_eq!(Settings::from_ron_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_ron_invalid_values_rejected() {
        assert!(Settings::from_ron_str("(field_width: 10)").is_err());
        assert!(Settings::from_ron_str("(not valid").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("match.ron");
        std::fs::write(&path, "(max_score: 40, think_time: 0.5)").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.max_score, 40);
        assert!(Settings::load(dir.path().join("missing.ron")).is_err());
    }

    proptest! {
        #[test]
        fn prop_score_and_width_parity(score in 1i64..5000, width in 3usize..101) {
            let settings = Settings { max_score: score, field_width: width, ..Settings::default() };
            let ok = settings.validate().is_ok();
            prop_assert_eq!(ok, score % 2 == 0 && width % 2 == 1);
        }
    }
}
