//! Field model: tile grid, spawns, objectives and derived geometry.
//!
//! # Text format
//!
//! One row per line, one space-separated token per tile:
//!
//! | token | meaning |
//! |-------|---------|
//! | `w` | wall |
//! | `_` | empty |
//! | `C` | control point |
//! | `R` | red spawn (facing right) |
//! | `B` | blue spawn (facing left) |
//! | `A` | ammo fountain |
//! | `F` | crumb fountain |
//!
//! Tokens are case-insensitive when parsing. The dump written by
//! [`Field`]'s `Display` impl parses back into the same field.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use crate::error::{GameError, Result};
use crate::math::{rects_merge, Rect, Vec2};
use crate::navigation::{NavMesh, NavMeshConfig, TileGrid};
use crate::objects::{
    FountainState, GameObject, Team, AMMO_FOUNTAIN_SIZE, CONTROL_POINT_SIZE, CRUMB_FOUNTAIN_SIZE,
    TANK_SPAWN_SIZE,
};

/// Tile size assumed when parsing text without an explicit one.
pub const DEFAULT_TILESIZE: f64 = 16.0;

/// Orientation of red spawns.
pub const RED_SPAWN_ANGLE: f64 = 0.0;
/// Orientation of blue spawns.
pub const BLUE_SPAWN_ANGLE: f64 = -PI;

/// A spawn tile and the orientation of tanks spawned there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    /// Tile column.
    pub x: usize,
    /// Tile row.
    pub y: usize,
    /// Orientation in radians.
    pub angle: f64,
}

/// Auxiliary object placed on a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementKind {
    /// Ammo fountain.
    AmmoFountain,
    /// Crumb fountain.
    CrumbFountain,
}

impl PlacementKind {
    const fn token(self) -> &'static str {
        match self {
            Self::AmmoFountain => "A",
            Self::CrumbFountain => "F",
        }
    }

    const fn size(self) -> f64 {
        match self {
            Self::AmmoFountain => AMMO_FOUNTAIN_SIZE,
            Self::CrumbFountain => CRUMB_FOUNTAIN_SIZE,
        }
    }
}

/// An auxiliary placement: tile plus type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Tile column.
    pub x: usize,
    /// Tile row.
    pub y: usize,
    /// What to place.
    pub kind: PlacementKind,
}

/// Objects instantiated from a field, grouped in the order the simulation
/// adds them.
#[derive(Debug, Clone)]
pub struct FieldObjects {
    /// One wall per merged wall rectangle.
    pub walls: Vec<GameObject>,
    /// Neutral control points.
    pub control_points: Vec<GameObject>,
    /// Red then blue spawn markers.
    pub spawns: Vec<GameObject>,
    /// Fountains.
    pub fountains: Vec<GameObject>,
}

/// The playing field. Immutable once a match starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Width in tiles.
    pub width: usize,
    /// Height in tiles.
    pub height: usize,
    /// Tile edge length in world units.
    pub tilesize: f64,
    /// Wall grid, `[row][column]`.
    pub walls: TileGrid,
    /// Red spawn tiles.
    pub red_spawns: Vec<SpawnPoint>,
    /// Blue spawn tiles.
    pub blue_spawns: Vec<SpawnPoint>,
    /// Control point tiles (column, row).
    pub control_points: Vec<(usize, usize)>,
    /// Fountain placements.
    pub placements: Vec<Placement>,
    /// Wall tiles merged into rectangles (derived).
    pub wall_rects: Vec<Rect>,
    /// Navigation mesh (derived).
    pub nav_mesh: NavMesh,
}

impl Field {
    /// Empty field with no walls or objects.
    #[must_use]
    pub fn new(width: usize, height: usize, tilesize: f64) -> Self {
        Self {
            width,
            height,
            tilesize,
            walls: vec![vec![false; width]; height],
            red_spawns: Vec::new(),
            blue_spawns: Vec::new(),
            control_points: Vec::new(),
            placements: Vec::new(),
            wall_rects: Vec::new(),
            nav_mesh: NavMesh::default(),
        }
    }

    /// Whether tile (column, row) is a wall. Out-of-range tiles are walls.
    #[must_use]
    pub fn is_wall(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 {
            return true;
        }
        self.walls
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
            .unwrap_or(true)
    }

    /// Tile containing world point `p`.
    #[must_use]
    pub fn tile_at(&self, p: Vec2) -> (i64, i64) {
        (
            (p.x / self.tilesize).floor() as i64,
            (p.y / self.tilesize).floor() as i64,
        )
    }

    /// World rectangle of the whole field.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(
            0.0,
            0.0,
            self.width as f64 * self.tilesize,
            self.height as f64 * self.tilesize,
        )
    }

    /// World position of a tile's top-left corner, shifted so an object of
    /// `size` is centred on the tile.
    #[must_use]
    pub fn centered_on_tile(&self, x: usize, y: usize, size: f64) -> Vec2 {
        let offset = (self.tilesize - size) / 2.0;
        Vec2::new(
            x as f64 * self.tilesize + offset,
            y as f64 * self.tilesize + offset,
        )
    }

    /// Centre of a tile.
    #[must_use]
    pub fn tile_center(&self, x: usize, y: usize) -> Vec2 {
        Vec2::new(
            (x as f64 + 0.5) * self.tilesize,
            (y as f64 + 0.5) * self.tilesize,
        )
    }

    /// Recompute merged wall rectangles and the navigation mesh.
    pub fn rebuild_derived(&mut self) {
        let ts = self.tilesize;
        let tiles: Vec<Rect> = self
            .walls
            .iter()
            .enumerate()
            .flat_map(|(j, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, &wall)| wall)
                    .map(move |(i, _)| Rect::new(i as f64 * ts, j as f64 * ts, ts, ts))
            })
            .collect();
        self.wall_rects = rects_merge(&tiles);

        let mandatory: Vec<Vec2> = self
            .control_points
            .iter()
            .map(|&(x, y)| self.tile_center(x, y))
            .chain(self.placements.iter().map(|p| self.tile_center(p.x, p.y)))
            .collect();
        self.nav_mesh = NavMesh::build(
            &self.wall_rects,
            self.bounds(),
            NavMeshConfig::for_tilesize(ts),
            &mandatory,
        );
    }

    /// Instantiate the field's static objects.
    ///
    /// `ammo_rate` is the refill delay given to ammo fountains.
    #[must_use]
    pub fn objects(&self, ammo_rate: i32) -> FieldObjects {
        let walls = self.wall_rects.iter().map(|&r| GameObject::wall(r)).collect();
        let control_points = self
            .control_points
            .iter()
            .map(|&(x, y)| GameObject::control_point(self.centered_on_tile(x, y, CONTROL_POINT_SIZE)))
            .collect();
        let spawns = self
            .red_spawns
            .iter()
            .map(|s| (s, Team::Red))
            .chain(self.blue_spawns.iter().map(|s| (s, Team::Blue)))
            .map(|(s, team)| {
                GameObject::tank_spawn(
                    self.centered_on_tile(s.x, s.y, TANK_SPAWN_SIZE),
                    team,
                    s.angle,
                )
            })
            .collect();
        let fountains = self
            .placements
            .iter()
            .map(|p| {
                let state = match p.kind {
                    PlacementKind::AmmoFountain => FountainState::ammo(ammo_rate),
                    PlacementKind::CrumbFountain => FountainState::crumbs(),
                };
                GameObject::fountain(self.centered_on_tile(p.x, p.y, p.kind.size()), state)
            })
            .collect();
        FieldObjects {
            walls,
            control_points,
            spawns,
            fountains,
        }
    }

    /// Parse the text format with an explicit tile size.
    pub fn parse(text: &str, tilesize: f64) -> Result<Self> {
        let rows: Vec<(usize, Vec<&str>)> = text
            .lines()
            .enumerate()
            .map(|(n, line)| (n + 1, line.split_whitespace().collect::<Vec<_>>()))
            .filter(|(_, tokens)| !tokens.is_empty())
            .collect();
        let Some((_, first)) = rows.first() else {
            return Err(GameError::FieldParse {
                line: 1,
                message: "field is empty".to_string(),
            });
        };
        let width = first.len();
        let mut field = Self::new(width, rows.len(), tilesize);

        for (y, (line, tokens)) in rows.iter().enumerate() {
            if tokens.len() != width {
                return Err(GameError::FieldParse {
                    line: *line,
                    message: format!("expected {width} tiles, found {}", tokens.len()),
                });
            }
            for (x, token) in tokens.iter().enumerate() {
                match token.to_ascii_lowercase().as_str() {
                    "w" => field.walls[y][x] = true,
                    "_" => {}
                    "c" => field.control_points.push((x, y)),
                    "r" => field.red_spawns.push(SpawnPoint {
                        x,
                        y,
                        angle: RED_SPAWN_ANGLE,
                    }),
                    "b" => field.blue_spawns.push(SpawnPoint {
                        x,
                        y,
                        angle: BLUE_SPAWN_ANGLE,
                    }),
                    "a" => field.placements.push(Placement {
                        x,
                        y,
                        kind: PlacementKind::AmmoFountain,
                    }),
                    "f" => field.placements.push(Placement {
                        x,
                        y,
                        kind: PlacementKind::CrumbFountain,
                    }),
                    other => {
                        return Err(GameError::FieldParse {
                            line: *line,
                            message: format!("unknown tile '{other}' at column {}", x + 1),
                        })
                    }
                }
            }
        }
        field.rebuild_derived();
        Ok(field)
    }

    /// Token for a tile in the text format.
    fn token_at(&self, x: usize, y: usize) -> &'static str {
        if self.control_points.contains(&(x, y)) {
            "C"
        } else if self.red_spawns.iter().any(|s| s.x == x && s.y == y) {
            "R"
        } else if self.blue_spawns.iter().any(|s| s.x == x && s.y == y) {
            "B"
        } else if let Some(p) = self.placements.iter().find(|p| p.x == x && p.y == y) {
            p.kind.token()
        } else if self.walls[y][x] {
            "w"
        } else {
            "_"
        }
    }
}

impl FromStr for Field {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, DEFAULT_TILESIZE)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for y in 0..self.height {
            let row: Vec<&str> = (0..self.width).map(|x| self.token_at(x, y)).collect();
            writeln!(f, "{}", row.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "\
w w w w w w w
w R _ C _ B w
w _ A w A _ w
w w w w w w w
";

    #[test]
    fn test_parse_small_field() {
        let field: Field = SMALL.parse().unwrap();
        assert_eq!((field.width, field.height), (7, 4));
        assert_eq!(field.red_spawns.len(), 1);
        assert_eq!(field.blue_spawns[0].angle, BLUE_SPAWN_ANGLE);
        assert_eq!(field.control_points, vec![(3, 1)]);
        assert_eq!(field.placements.len(), 2);
        assert!(field.is_wall(3, 2));
        assert!(!field.is_wall(1, 1));
        assert!(field.is_wall(-1, 0));
        assert!(field.is_wall(7, 1));
    }

    #[test]
    fn test_dump_roundtrip() {
        let field: Field = SMALL.parse().unwrap();
        assert_eq!(field.to_string(), SMALL);
        let again: Field = field.to_string().parse().unwrap();
        assert_eq!(again, field);
    }

    #[test]
    fn test_parse_errors_report_line() {
        let err = "w w\nw\n".parse::<Field>().unwrap_err();
        assert!(matches!(err, GameError::FieldParse { line: 2, .. }));
        let err = "w x w\n".parse::<Field>().unwrap_err();
        assert!(matches!(err, GameError::FieldParse { line: 1, .. }));
        assert!("\n\n".parse::<Field>().is_err());
    }

    #[test]
    fn test_wall_rects_are_merged() {
        let field: Field = SMALL.parse().unwrap();
        let covered: f64 = field.wall_rects.iter().map(|r| r.w * r.h).sum();
        let tiles = field.walls.iter().flatten().filter(|&&w| w).count();
        assert_eq!(covered, tiles as f64 * 256.0);
        assert!(field.wall_rects.len() < tiles);
    }

    #[test]
    fn test_objects_are_centered_on_tiles() {
        let field: Field = SMALL.parse().unwrap();
        let objects = field.objects(20);
        let cp = &objects.control_points[0];
        assert_eq!(cp.center(), field.tile_center(3, 1));
        assert_eq!(objects.spawns.len(), 2);
        assert_eq!(objects.fountains.len(), 2);
        assert_eq!(objects.walls.len(), field.wall_rects.len());
    }
}
