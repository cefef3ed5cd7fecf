//! Procedural field generation.
//!
//! Fields are generated for the left half and mirrored across the vertical
//! axis so both teams face the same layout:
//!
//! 1. Spawns, control points and ammo fountains are placed on the left half
//!    and mirrored.
//! 2. Random grid-aligned wall segments are added to a half-map until the
//!    fill target is met or too many candidates were rejected. A candidate is
//!    kept only if, after mirroring, every spawn and objective is reachable
//!    from the first red spawn.
//! 3. The half-map is mirrored, walls under objects are cleared and the
//!    derived geometry is built.
//!
//! Generation is fully determined by [`FieldGeneratorConfig::seed`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GameError, Result};
use crate::field::{Field, Placement, PlacementKind, SpawnPoint, BLUE_SPAWN_ANGLE, RED_SPAWN_ANGLE};
use crate::navigation::{reachable, TileGrid};
use crate::settings::Settings;

/// Rejected wall candidates tolerated before giving up on the fill target.
pub const MAX_FAILED_WALLS: u32 = 100;
/// Hard cap on wall candidates, accepted or not.
pub const MAX_WALL_ATTEMPTS: u32 = 10_000;

/// Field generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldGeneratorConfig {
    /// Width in tiles.
    pub width: usize,
    /// Height in tiles.
    pub height: usize,
    /// Tile size in world units.
    pub tilesize: f64,
    /// Spawn tiles per team.
    pub num_spawns: usize,
    /// Control points in total.
    pub num_points: usize,
    /// Ammo fountains in total (rounded down to pairs).
    pub num_ammo: usize,
    /// Target fraction of the field covered by walls.
    pub wall_fill: f64,
    /// Inclusive range of wall segment lengths in tiles.
    pub wall_len: (usize, usize),
    /// Wall segment thickness in tiles.
    pub wall_width: usize,
    /// Probability that a segment is horizontal.
    pub wall_orientation: f64,
    /// Segments are snapped to multiples of this many tiles.
    pub wall_gridsize: usize,
    /// Random seed for deterministic generation.
    pub seed: u64,
}

impl Default for FieldGeneratorConfig {
    fn default() -> Self {
        Self {
            width: 39,
            height: 24,
            tilesize: 16.0,
            num_spawns: 5,
            num_points: 3,
            num_ammo: 6,
            wall_fill: 0.4,
            wall_len: (4, 4),
            wall_width: 4,
            wall_orientation: 0.5,
            wall_gridsize: 4,
            seed: 0,
        }
    }
}

impl FieldGeneratorConfig {
    /// Dimensions and spawn count taken from match settings.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            width: settings.field_width,
            height: settings.field_height,
            tilesize: settings.tilesize,
            num_spawns: settings.num_agents,
            ..Self::default()
        }
    }

    /// Set the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the wall fill target.
    #[must_use]
    pub fn with_wall_fill(mut self, fill: f64) -> Self {
        self.wall_fill = fill.clamp(0.0, 1.0);
        self
    }

    /// Check the layout fits the field.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(GameError::InvalidSettings(msg));
        if self.width < 9 || self.height < 8 {
            return fail(format!(
                "field must be at least 9x8 tiles, got {}x{}",
                self.width, self.height
            ));
        }
        if self.num_spawns.div_ceil(2) + 2 > self.height {
            return fail(format!(
                "{} spawns do not fit in {} rows",
                self.num_spawns, self.height
            ));
        }
        if self.wall_gridsize == 0 || self.wall_width == 0 || self.wall_len.0 > self.wall_len.1 {
            return fail("wall dimensions must be positive and ordered".to_string());
        }
        if !(self.tilesize.is_finite() && self.tilesize > 0.0) {
            return fail(format!("tilesize must be positive, got {}", self.tilesize));
        }
        Ok(())
    }
}

/// Generate a field.
pub fn generate(config: &FieldGeneratorConfig) -> Result<Field> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut field = Field::new(config.width, config.height, config.tilesize);

    place_objects(config, &mut rng, &mut field);
    let half = create_wall_map(config, &mut rng, &field);
    field.walls = reflect_tilemap(&half, config.width);
    clear_walls_under_objects(&mut field);

    #[cfg(feature = "debug-validation")]
    debug_assert!(
        required_reachable(&field.walls, &field),
        "generated field has unreachable objectives"
    );

    field.rebuild_derived();
    debug!(
        seed = config.seed,
        wall_rects = field.wall_rects.len(),
        waypoints = field.nav_mesh.len(),
        "Generated field"
    );
    Ok(field)
}

/// Uniform integer in `lo..=hi`, or `lo` when the range is empty.
fn rand_between(rng: &mut ChaCha8Rng, lo: usize, hi: usize) -> usize {
    if hi <= lo {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

fn place_objects(config: &FieldGeneratorConfig, rng: &mut ChaCha8Rng, field: &mut Field) {
    let (w, h) = (config.width, config.height);
    let mirror = |x: usize| w - 1 - x;

    for i in 0..config.num_spawns {
        let (x, y) = (2 + i % 2, 1 + i / 2);
        field.red_spawns.push(SpawnPoint {
            x,
            y,
            angle: RED_SPAWN_ANGLE,
        });
        field.blue_spawns.push(SpawnPoint {
            x: mirror(x),
            y,
            angle: BLUE_SPAWN_ANGLE,
        });
    }

    let mut points = Vec::new();
    if config.num_points % 2 == 1 {
        points.push((w / 2, rand_between(rng, 3, h / 2 + 1)));
    }
    for pair in 0..config.num_points / 2 {
        let left = if pair == 0 {
            ((w - 1) / 4, h - 4)
        } else {
            (rand_between(rng, 3, w / 2 - 1), rand_between(rng, 3, h - 2))
        };
        points.push(left);
        points.push((mirror(left.0), left.1));
    }
    // Keep the left-mid-right ordering of the classic three-point layout.
    points.sort_by_key(|&(x, y)| (x, y));
    field.control_points = points;

    for _ in 0..config.num_ammo / 2 {
        let x = rand_between(rng, 3, w / 2 - 1);
        let y = rand_between(rng, 5, h - 2);
        for x in [x, mirror(x)] {
            field.placements.push(Placement {
                x,
                y,
                kind: PlacementKind::AmmoFountain,
            });
        }
    }
}

/// Tiles that must stay reachable from the first red spawn.
fn required_tiles(field: &Field) -> Vec<(usize, usize)> {
    field
        .red_spawns
        .iter()
        .chain(&field.blue_spawns)
        .map(|s| (s.x, s.y))
        .chain(field.control_points.iter().copied())
        .chain(field.placements.iter().map(|p| (p.x, p.y)))
        .collect()
}

fn required_reachable(walls: &[Vec<bool>], field: &Field) -> bool {
    let Some(start) = field.red_spawns.first() else {
        return true;
    };
    let seen = reachable(walls, (start.x, start.y));
    required_tiles(field)
        .iter()
        .all(|&(x, y)| seen.get(y).and_then(|row| row.get(x)).copied() == Some(true))
}

fn create_wall_map(config: &FieldGeneratorConfig, rng: &mut ChaCha8Rng, field: &Field) -> TileGrid {
    let (w, h) = (config.width, config.height);
    let half_w = (0.5 + w as f64 / 2.0) as usize;

    let mut half: TileGrid = (0..h)
        .map(|j| {
            if j == 0 || j == h - 1 {
                vec![true; half_w]
            } else {
                let mut row = vec![false; half_w];
                row[0] = true;
                row
            }
        })
        .collect();

    let min_filled = 0.5 * (h * w) as f64 * config.wall_fill;
    let filled = |grid: &TileGrid| grid.iter().flatten().filter(|&&t| t).count() as f64;
    let mut failed = 0;
    let mut attempts = 0;

    while filled(&half) < min_filled && failed < MAX_FAILED_WALLS && attempts < MAX_WALL_ATTEMPTS {
        attempts += 1;
        let length = rand_between(rng, config.wall_len.0, config.wall_len.1);
        let (sec_w, sec_h) = if rng.gen::<f64>() < config.wall_orientation {
            (length, config.wall_width)
        } else {
            (config.wall_width, length)
        };
        if sec_w + 1 > half_w || sec_h + 2 > h {
            failed += 1;
            continue;
        }
        let grid = config.wall_gridsize;
        let x = rand_between(rng, 1, half_w - sec_w) / grid * grid;
        let y = rand_between(rng, 1, h - sec_h - 1) / grid * grid;

        let mut candidate = half.clone();
        for row in candidate.iter_mut().skip(y).take(sec_h) {
            for tile in row.iter_mut().skip(x).take(sec_w) {
                *tile = true;
            }
        }
        if required_reachable(&reflect_tilemap(&candidate, w), field) {
            half = candidate;
        } else {
            failed += 1;
        }
    }

    if failed >= MAX_FAILED_WALLS {
        debug!(
            seed = config.seed,
            filled = filled(&half),
            target = min_filled,
            "Wall placement retry budget exhausted"
        );
    }
    half
}

/// Mirror a half-width tile map across the vertical axis into `width`
/// columns.
#[must_use]
pub fn reflect_tilemap(half: &[Vec<bool>], width: usize) -> TileGrid {
    half.iter()
        .map(|row| {
            (0..width)
                .map(|i| {
                    let src = if i < width / 2 { i } else { width - 1 - i };
                    row.get(src).copied().unwrap_or(true)
                })
                .collect()
        })
        .collect()
}

/// Clear walls under spawns (and the tile each spawn faces), the 3x3 block
/// around each control point and under every placement.
pub fn clear_walls_under_objects(field: &mut Field) {
    fn clear(field: &mut Field, x: i64, y: i64) {
        if x < 0 || y < 0 {
            return;
        }
        if let Some(tile) = field
            .walls
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            *tile = false;
        }
    }

    let spawns: Vec<SpawnPoint> = field.red_spawns.iter().chain(&field.blue_spawns).copied().collect();
    for s in spawns {
        let (x, y) = (s.x as f64, s.y as f64);
        clear(field, s.x as i64, s.y as i64);
        // Truncation toward zero, so a left-facing spawn clears x - 1.
        let front_x = (x + s.angle.cos() + 0.5) as i64;
        let front_y = (y + s.angle.sin() + 0.5) as i64;
        clear(field, front_x, front_y);
    }
    for (x, y) in field.control_points.clone() {
        for dy in -1..=1 {
            for dx in -1..=1 {
                clear(field, x as i64 + dx, y as i64 + dy);
            }
        }
    }
    for p in field.placements.clone() {
        clear(field, p.x as i64, p.y as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_config() {
        let config = FieldGeneratorConfig::default();
        assert_eq!((config.width, config.height), (39, 24));
        assert_eq!(config.num_spawns, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_determinism() {
        let config = FieldGeneratorConfig::default().with_seed(42);
        let a = generate(&config).unwrap();
        let b = generate(&config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds() {
        let a = generate(&FieldGeneratorConfig::default().with_seed(1)).unwrap();
        let b = generate(&FieldGeneratorConfig::default().with_seed(2)).unwrap();
        assert_ne!(a.walls, b.walls);
    }

    #[test]
    fn test_mirror_symmetry() {
        let field = generate(&FieldGeneratorConfig::default().with_seed(7)).unwrap();
        for row in &field.walls {
            for x in 0..field.width {
                assert_eq!(row[x], row[field.width - 1 - x]);
            }
        }
        for (r, b) in field.red_spawns.iter().zip(&field.blue_spawns) {
            assert_eq!(b.x, field.width - 1 - r.x);
            assert_eq!(b.y, r.y);
        }
    }

    #[test]
    fn test_classic_layout() {
        let field = generate(&FieldGeneratorConfig::default().with_seed(3)).unwrap();
        assert_eq!(field.red_spawns.len(), 5);
        assert_eq!((field.red_spawns[0].x, field.red_spawns[0].y), (2, 1));
        assert_eq!((field.red_spawns[4].x, field.red_spawns[4].y), (2, 3));
        assert_eq!(field.control_points.len(), 3);
        assert_eq!(field.control_points[0], (9, 20));
        assert_eq!(field.control_points[1].0, 19);
        assert_eq!(field.control_points[2], (29, 20));
        assert_eq!(field.placements.len(), 6);
    }

    #[test]
    fn test_border_is_walled() {
        let field = generate(&FieldGeneratorConfig::default().with_seed(11)).unwrap();
        assert!(field.walls[0].iter().all(|&t| t));
        assert!(field.walls[field.height - 1].iter().all(|&t| t));
        assert!(field.walls.iter().all(|row| row[0] && row[field.width - 1]));
    }

    #[test]
    fn test_zero_fill_has_only_border() {
        let field = generate(&FieldGeneratorConfig::default().with_wall_fill(0.0)).unwrap();
        let interior = field.walls[1..field.height - 1]
            .iter()
            .flat_map(|row| &row[1..field.width - 1])
            .filter(|&&t| t)
            .count();
        assert_eq!(interior, 0);
    }

    #[test]
    fn test_reflect_tilemap_odd_width() {
        let half = vec![vec![true, false, false]];
        assert_eq!(
            reflect_tilemap(&half, 5),
            vec![vec![true, false, false, false, true]]
        );
    }

    #[test]
    fn test_too_small_field_rejected() {
        let config = FieldGeneratorConfig {
            width: 5,
            ..FieldGeneratorConfig::default()
        };
        assert!(generate(&config).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_objectives_reachable(seed in any::<u64>()) {
            let field = generate(&FieldGeneratorConfig::default().with_seed(seed)).unwrap();
            prop_assert!(required_reachable(&field.walls, &field));
            for (x, y) in required_tiles(&field) {
                prop_assert!(!field.walls[y][x]);
            }
        }
    }
}
