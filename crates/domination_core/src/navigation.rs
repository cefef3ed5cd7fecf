//! Navigation helpers: tile reachability and a waypoint navigation mesh.
//!
//! The field generator uses [`reachable`] to reject wall layouts that cut
//! objectives off from the spawns. Agents that know the field use
//! [`NavMesh::find_path`] to route around walls.
//!
//! ## Mesh construction
//!
//! Waypoints sit diagonally outside every corner of every merged wall
//! rectangle, `clearance` away from it. Candidates outside the field or
//! inside another wall's clearance zone are dropped, and candidates closer
//! than `simplify_distance` to an existing waypoint are merged into it.
//! Mandatory waypoints (objectives) are always kept. Two waypoints are
//! connected when the straight segment between them keeps `clearance / 2`
//! away from every wall.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use crate::error::{GameError, Result};
use crate::math::{line_intersects_rect, Rect, Vec2};

/// Fraction of a tile within which nearby waypoints are merged.
pub const MESH_SIMPLIFY: f64 = 0.3;

/// Wall grid indexed `[row][column]`; `true` is a wall.
pub type TileGrid = Vec<Vec<bool>>;

/// Tiles reachable from `start` (column, row) through 4-connected free tiles.
///
/// The result has the same shape as `grid`. A walled or out-of-range start
/// reaches nothing.
#[must_use]
pub fn reachable(grid: &[Vec<bool>], start: (usize, usize)) -> Vec<Vec<bool>> {
    let mut seen: Vec<Vec<bool>> = grid.iter().map(|row| vec![false; row.len()]).collect();
    let (sx, sy) = start;
    if grid.get(sy).and_then(|row| row.get(sx)).copied() != Some(false) {
        return seen;
    }
    let mut queue = VecDeque::new();
    seen[sy][sx] = true;
    queue.push_back(start);
    while let Some((x, y)) = queue.pop_front() {
        let neighbors = [
            (x.wrapping_sub(1), y),
            (x + 1, y),
            (x, y.wrapping_sub(1)),
            (x, y + 1),
        ];
        for (nx, ny) in neighbors {
            if grid.get(ny).and_then(|row| row.get(nx)).copied() == Some(false) && !seen[ny][nx] {
                seen[ny][nx] = true;
                queue.push_back((nx, ny));
            }
        }
    }
    seen
}

/// Parameters for [`NavMesh::build`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavMeshConfig {
    /// Distance kept between waypoints and walls.
    pub clearance: f64,
    /// Waypoints closer than this are merged.
    pub simplify_distance: f64,
}

impl NavMeshConfig {
    /// Defaults for a field with the given tile size: half a tile of
    /// clearance (a tank's radius on standard fields).
    #[must_use]
    pub fn for_tilesize(tilesize: f64) -> Self {
        Self {
            clearance: tilesize / 2.0,
            simplify_distance: MESH_SIMPLIFY * tilesize,
        }
    }
}

/// Directed, weighted link between two waypoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavEdge {
    /// Target waypoint index.
    pub to: usize,
    /// Euclidean length.
    pub cost: f64,
}

/// Waypoint graph over the free space of a field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavMesh {
    /// Waypoint positions.
    pub nodes: Vec<Vec2>,
    /// Outgoing edges per waypoint.
    pub edges: Vec<Vec<NavEdge>>,
    obstacles: Vec<Rect>,
    link_margin: f64,
}

impl NavMesh {
    /// Build a mesh around `walls` inside `bounds`.
    #[must_use]
    pub fn build(walls: &[Rect], bounds: Rect, config: NavMeshConfig, mandatory: &[Vec2]) -> Self {
        let c = config.clearance;
        let inner = Rect::new(
            bounds.x + c,
            bounds.y + c,
            (bounds.w - 2.0 * c).max(0.0),
            (bounds.h - 2.0 * c).max(0.0),
        );
        let mut nodes: Vec<Vec2> = mandatory.to_vec();

        for wall in walls {
            let corners = [
                Vec2::new(wall.x - c, wall.y - c),
                Vec2::new(wall.right() + c, wall.y - c),
                Vec2::new(wall.x - c, wall.bottom() + c),
                Vec2::new(wall.right() + c, wall.bottom() + c),
            ];
            for p in corners {
                let inside_field = p.x >= inner.x
                    && p.x <= inner.right()
                    && p.y >= inner.y
                    && p.y <= inner.bottom();
                if !inside_field {
                    continue;
                }
                if walls.iter().any(|w| w.inflate(c).contains_strict(p)) {
                    continue;
                }
                if nodes
                    .iter()
                    .any(|n| n.distance(p) < config.simplify_distance)
                {
                    continue;
                }
                nodes.push(p);
            }
        }

        let mut mesh = Self {
            edges: vec![Vec::new(); nodes.len()],
            nodes,
            obstacles: walls.to_vec(),
            link_margin: c / 2.0,
        };
        for i in 0..mesh.nodes.len() {
            for j in (i + 1)..mesh.nodes.len() {
                let (a, b) = (mesh.nodes[i], mesh.nodes[j]);
                if mesh.is_clear(a, b, mesh.link_margin) {
                    let cost = a.distance(b);
                    mesh.edges[i].push(NavEdge { to: j, cost });
                    mesh.edges[j].push(NavEdge { to: i, cost });
                }
            }
        }
        mesh
    }

    /// Number of waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the mesh has no waypoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the segment `a -> b` stays `margin` away from every wall.
    #[must_use]
    pub fn is_clear(&self, a: Vec2, b: Vec2, margin: f64) -> bool {
        self.obstacles
            .iter()
            .all(|w| line_intersects_rect(a, b, &w.inflate(margin)).is_none())
    }

    /// Shortest waypoint route from `start` to `goal`.
    ///
    /// The returned path excludes `start` and ends with `goal`. A direct line
    /// of sight yields `[goal]`.
    pub fn find_path(&self, start: Vec2, goal: Vec2) -> Result<Vec<Vec2>> {
        if self.is_clear(start, goal, 0.0) {
            return Ok(vec![goal]);
        }

        let n = self.nodes.len();
        let start_idx = n;
        let goal_idx = n + 1;
        let from_start: Vec<bool> = self.nodes.iter().map(|&p| self.is_clear(start, p, 0.0)).collect();
        let to_goal: Vec<bool> = self.nodes.iter().map(|&p| self.is_clear(p, goal, 0.0)).collect();
        let position = |i: usize| match i {
            i if i == start_idx => start,
            i if i == goal_idx => goal,
            i => self.nodes[i],
        };

        let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
        let mut came_from: Vec<Option<usize>> = vec![None; n + 2];
        let mut g_score: Vec<f64> = vec![f64::INFINITY; n + 2];

        g_score[start_idx] = 0.0;
        open_set.push(AStarNode {
            index: start_idx,
            f_score: start.distance(goal),
        });

        while let Some(current) = open_set.pop() {
            if current.index == goal_idx {
                return Ok(reconstruct_path(&came_from, goal_idx, position));
            }
            let current_g = g_score[current.index];
            if current.f_score > current_g + position(current.index).distance(goal) {
                // Stale heap entry.
                continue;
            }

            let mut neighbors: Vec<(usize, f64)> = Vec::new();
            if current.index == start_idx {
                for (j, _) in from_start.iter().enumerate().filter(|(_, &ok)| ok) {
                    neighbors.push((j, start.distance(self.nodes[j])));
                }
            } else {
                neighbors.extend(self.edges[current.index].iter().map(|e| (e.to, e.cost)));
                if to_goal[current.index] {
                    neighbors.push((goal_idx, self.nodes[current.index].distance(goal)));
                }
            }

            for (next, cost) in neighbors {
                let tentative_g = current_g + cost;
                if tentative_g < g_score[next] {
                    came_from[next] = Some(current.index);
                    g_score[next] = tentative_g;
                    open_set.push(AStarNode {
                        index: next,
                        f_score: tentative_g + position(next).distance(goal),
                    });
                }
            }
        }

        Err(GameError::NoPath {
            from_x: start.x,
            from_y: start.y,
            to_x: goal.x,
            to_y: goal.y,
        })
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy)]
struct AStarNode {
    index: usize,
    f_score: f64,
}

impl PartialEq for AStarNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AStarNode {}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f_score; lower index wins ties so runs are reproducible.
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Walk `came_from` back from the goal; the start itself is not included.
fn reconstruct_path(
    came_from: &[Option<usize>],
    goal: usize,
    position: impl Fn(usize) -> Vec2,
) -> Vec<Vec2> {
    let mut path = vec![position(goal)];
    let mut current = goal;
    while let Some(prev) = came_from[current] {
        if came_from[prev].is_none() {
            break;
        }
        path.push(position(prev));
        current = prev;
    }
    path.reverse();
    path
}
