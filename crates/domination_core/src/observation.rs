//! Per-tank observations.
//!
//! An [`Observation`] is built fresh for every tank every step and handed to
//! its agent by shared reference. It is fully determined by the simulation
//! state at the moment it is built.

use serde::{Deserialize, Serialize};

use crate::field::Field;
use crate::math::Vec2;
use crate::objects::{PickupKind, Team};

/// Integer world location (truncated toward zero).
pub type Loc = (i32, i32);

/// An enemy tank within sight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeenTank {
    /// Centre location.
    pub loc: Loc,
    /// Orientation in radians.
    pub angle: f64,
}

/// A control point and its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPointInfo {
    /// Centre location.
    pub loc: Loc,
    /// Current owner.
    pub team: Team,
}

/// A pickup within sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupInfo {
    /// Centre location.
    pub loc: Loc,
    /// Ammo or crumb.
    pub kind: PickupKind,
}

/// What a tank knows at the start of its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Current step (1-based).
    pub step: u32,
    /// Own centre location.
    pub loc: Loc,
    /// Own orientation.
    pub angle: f64,
    /// Own ammo.
    pub ammo: u32,
    /// `-1` while alive, otherwise steps until respawn.
    pub respawn_in: i32,
    /// `(red, blue)` scores.
    pub score: (i64, i64),
    /// Collided with a tank or wall during the previous step.
    pub collided: bool,
    /// Friendly tanks within sight (excluding self).
    pub friends: Vec<Loc>,
    /// Enemy tanks within sight.
    pub foes: Vec<SeenTank>,
    /// Every control point on the field.
    pub control_points: Vec<ControlPointInfo>,
    /// Pickups within sight.
    pub objects: Vec<PickupInfo>,
    /// Local wall grid centred on the tank's tile, `[row][column]`.
    pub walls: Vec<Vec<bool>>,
    /// Tank is selected in the UI.
    pub selected: bool,
    /// World position clicked this step, if any.
    pub clicked: Option<(f64, f64)>,
    /// Keys pressed this step.
    pub keys: Vec<String>,
}

/// Tiles from the centre tile to the edge of the local wall grid.
#[must_use]
pub fn local_grid_range(max_see: f64, tilesize: f64) -> usize {
    ((max_see / 2.0 + 1.0) / tilesize).floor() as usize
}

/// Wall grid of `(2r + 1)^2` tiles around the tile containing `center`,
/// where `r` is [`local_grid_range`]. Tiles outside the field count as
/// walls.
#[must_use]
pub fn local_wall_grid(field: &Field, center: Vec2, max_see: f64) -> Vec<Vec<bool>> {
    let range = local_grid_range(max_see, field.tilesize) as i64;
    let (gx, gy) = field.tile_at(center);
    (-range..=range)
        .map(|dy| {
            (-range..=range)
                .map(|dx| field.is_wall(gx + dx, gy + dy))
                .collect()
        })
        .collect()
}
