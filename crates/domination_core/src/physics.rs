//! Collision detection and positional correction.
//!
//! The solver is iterative: movables are integrated by their per-substep
//! delta, then overlapping solid pairs are pushed apart, deepest first,
//! until nothing overlaps or [`SIMULATION_MAXITER`] passes are spent.
//! Candidate pairs come from a sweep-and-prune broadphase over two lists
//! sorted by x: movables (re-sorted every pass) and statics (sorted on
//! insertion, never move).

use std::collections::BTreeSet;

use crate::math::{line_intersects_circ, line_intersects_rect, Rect, Vec2};
use crate::objects::{GameObject, ObjectId, ObjectStorage, Shape};

/// Physics substeps per simulation step.
pub const SIMULATION_SUBSTEPS: u32 = 10;
/// Correction passes per substep.
pub const SIMULATION_MAXITER: u32 = 10;
/// Penetrations shallower than this are left alone.
pub const MIN_PENETRATION: f64 = 1.0;

/// Overlap between two objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Separation {
    /// Penetration depth.
    pub depth: f64,
    /// Displacement of the first object that resolves the overlap.
    pub correction: Vec2,
}

impl Separation {
    fn flipped(self) -> Self {
        Self {
            depth: self.depth,
            correction: -self.correction,
        }
    }
}

/// Overlap between `a` and `b` at their solver positions, if any.
///
/// Circle pairs separate along the centre line. Rectangle pairs separate
/// along the axis of least overlap. A circle whose centre lies in a corner
/// region of a rectangle separates from that corner; otherwise mixed pairs
/// are treated as rectangles.
#[must_use]
pub fn compute_separation(a: &GameObject, b: &GameObject) -> Option<Separation> {
    separation_between(a.shape, a.sim_rect(), b.shape, b.sim_rect())
}

/// Shape-level form of [`compute_separation`].
#[must_use]
pub fn separation_between(sa: Shape, ra: Rect, sb: Shape, rb: Rect) -> Option<Separation> {
    match (sa, sb) {
        (Shape::Circle, Shape::Circle) => {
            circle_vs_circle(ra.center(), ra.w / 2.0, rb.center(), rb.w / 2.0)
        }
        (Shape::Rect, Shape::Rect) => rect_vs_rect(&ra, &rb),
        (Shape::Rect, Shape::Circle) => rect_vs_circle(&ra, &rb),
        (Shape::Circle, Shape::Rect) => rect_vs_circle(&rb, &ra).map(Separation::flipped),
    }
}

fn circle_vs_circle(c1: Vec2, r1: f64, c2: Vec2, r2: f64) -> Option<Separation> {
    let d = c1 - c2;
    let reach = r1 + r2;
    let ds = d.length_squared();
    if ds >= reach * reach {
        return None;
    }
    if ds == 0.0 {
        return Some(Separation {
            depth: 0.0,
            correction: Vec2::ZERO,
        });
    }
    let dist = ds.sqrt();
    let depth = reach - dist;
    Some(Separation {
        depth,
        correction: d * (depth / dist),
    })
}

fn rect_vs_rect(a: &Rect, b: &Rect) -> Option<Separation> {
    let push_left = a.right() - b.x;
    let push_right = b.right() - a.x;
    let push_up = a.bottom() - b.y;
    let push_down = b.bottom() - a.y;
    if push_left <= 0.0 || push_right <= 0.0 || push_up <= 0.0 || push_down <= 0.0 {
        return None;
    }
    let mut best = (push_left, Vec2::new(-push_left, 0.0));
    for candidate in [
        (push_right, Vec2::new(push_right, 0.0)),
        (push_up, Vec2::new(0.0, -push_up)),
        (push_down, Vec2::new(0.0, push_down)),
    ] {
        if candidate.0 < best.0 {
            best = candidate;
        }
    }
    Some(Separation {
        depth: best.0,
        correction: best.1,
    })
}

/// Separation for a rectangle against a circle; the correction moves the
/// rectangle.
fn rect_vs_circle(rect: &Rect, circle: &Rect) -> Option<Separation> {
    let c = circle.center();
    let corner_x = if c.x < rect.x {
        Some(rect.x)
    } else if c.x > rect.right() {
        Some(rect.right())
    } else {
        None
    };
    let corner_y = if c.y < rect.y {
        Some(rect.y)
    } else if c.y > rect.bottom() {
        Some(rect.bottom())
    } else {
        None
    };
    match (corner_x, corner_y) {
        // The corner behaves as a zero-radius circle owned by the rectangle.
        (Some(x), Some(y)) => circle_vs_circle(Vec2::new(x, y), 0.0, c, circle.w / 2.0),
        _ => rect_vs_rect(rect, circle),
    }
}

/// An overlapping solid pair found during a solver pass.
#[derive(Debug, Clone, Copy)]
struct Collision {
    a: ObjectId,
    b: ObjectId,
    separation: Separation,
}

/// A segment hit produced by [`Broadphase::raycast`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Segment parameter of the hit in `[0, 1]`.
    pub t: f64,
    /// Hit point.
    pub point: Vec2,
    /// Object hit.
    pub object: ObjectId,
}

/// Sorted object lists for sweep-and-prune.
#[derive(Debug, Clone, Default)]
pub struct Broadphase {
    movables: Vec<ObjectId>,
    statics: Vec<ObjectId>,
}

fn sort_key(storage: &ObjectStorage, id: ObjectId) -> f64 {
    storage.get(id).map_or(f64::INFINITY, |o| o.body.position.x)
}

impl Broadphase {
    /// Empty broadphase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a physical object. Non-physical objects are ignored.
    pub fn insert(&mut self, storage: &ObjectStorage, id: ObjectId) {
        let Some(obj) = storage.get(id) else {
            return;
        };
        if !obj.physical {
            return;
        }
        if obj.movable {
            self.movables.push(id);
            self.sort_movables(storage);
        } else {
            let x = obj.body.position.x;
            let at = self.statics.partition_point(|&s| {
                let sx = sort_key(storage, s);
                sx < x || (sx == x && s < id)
            });
            self.statics.insert(at, id);
        }
    }

    /// Stop tracking an object.
    pub fn remove(&mut self, id: ObjectId) {
        self.movables.retain(|&m| m != id);
        self.statics.retain(|&s| s != id);
    }

    /// Tracked movables, sorted by x as of the last sort.
    #[must_use]
    pub fn movables(&self) -> &[ObjectId] {
        &self.movables
    }

    /// Re-sort movables by solver x (ties by id).
    pub fn sort_movables(&mut self, storage: &ObjectStorage) {
        self.movables.sort_by(|&a, &b| {
            sort_key(storage, a)
                .total_cmp(&sort_key(storage, b))
                .then(a.cmp(&b))
        });
    }

    /// Physical objects whose bounding box touches `bounds`.
    #[must_use]
    pub fn query(&self, storage: &ObjectStorage, bounds: Rect, solid_only: bool) -> Vec<ObjectId> {
        let mut found = Vec::new();
        for list in [&self.movables, &self.statics] {
            for &id in list {
                let Some(obj) = storage.get(id) else {
                    continue;
                };
                let r = obj.sim_rect();
                if r.x > bounds.right() {
                    break;
                }
                if r.right() < bounds.x || r.bottom() < bounds.y || r.y > bounds.bottom() {
                    continue;
                }
                if solid_only && !obj.solid {
                    continue;
                }
                found.push(id);
            }
        }
        found
    }

    /// Solid objects crossed by the segment `p0 -> p1`, nearest first.
    #[must_use]
    pub fn raycast(
        &self,
        storage: &ObjectStorage,
        p0: Vec2,
        p1: Vec2,
        exclude: Option<ObjectId>,
    ) -> Vec<RayHit> {
        let bounds = Rect::new(
            p0.x.min(p1.x),
            p0.y.min(p1.y),
            (p1.x - p0.x).abs(),
            (p1.y - p0.y).abs(),
        );
        let mut hits: Vec<RayHit> = self
            .query(storage, bounds, true)
            .into_iter()
            .filter(|&id| Some(id) != exclude)
            .filter_map(|id| {
                let obj = storage.get(id)?;
                let r = obj.sim_rect();
                let hit = match obj.shape {
                    Shape::Circle => line_intersects_circ(p0, p1, r.center(), r.w / 2.0),
                    Shape::Rect => line_intersects_rect(p0, p1, &r),
                };
                hit.map(|(t, point)| RayHit {
                    t,
                    point,
                    object: id,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.t.total_cmp(&b.t).then(a.object.cmp(&b.object)));
        hits
    }

    /// Integrate movables by one substep delta and mark them moved.
    pub fn integrate(&self, storage: &mut ObjectStorage) {
        for &id in &self.movables {
            if let Some(obj) = storage.get_mut(id) {
                obj.body.position += obj.body.delta;
                obj.body.moved = true;
            }
        }
    }

    /// Run correction passes until nothing solid overlaps or the pass
    /// budget is spent.
    ///
    /// Returns every overlapping pair seen, solid or not, as `(low, high)`
    /// ids.
    pub fn resolve(&mut self, storage: &mut ObjectStorage) -> BTreeSet<(ObjectId, ObjectId)> {
        let mut pairs = BTreeSet::new();
        for _ in 0..SIMULATION_MAXITER {
            self.sort_movables(storage);
            let mut collisions = self.find_collisions(storage, &mut pairs);
            if collisions.is_empty() {
                break;
            }
            collisions.sort_by(|x, y| {
                y.separation
                    .depth
                    .total_cmp(&x.separation.depth)
                    .then(x.a.cmp(&y.a))
                    .then(x.b.cmp(&y.b))
            });
            apply_corrections(storage, &collisions);
        }
        pairs
    }

    fn find_collisions(
        &self,
        storage: &mut ObjectStorage,
        pairs: &mut BTreeSet<(ObjectId, ObjectId)>,
    ) -> Vec<Collision> {
        let mut collisions = Vec::new();
        let mut record = |a: &GameObject, b: &GameObject, collisions: &mut Vec<Collision>| {
            if let Some(separation) = compute_separation(a, b) {
                pairs.insert((a.id.min(b.id), a.id.max(b.id)));
                if a.solid && b.solid {
                    collisions.push(Collision {
                        a: a.id,
                        b: b.id,
                        separation,
                    });
                }
            }
        };

        let mut marker = 0;
        for (i, &a_id) in self.movables.iter().enumerate() {
            let Some(a) = storage.get(a_id) else {
                continue;
            };
            let ra = a.sim_rect();

            for &b_id in &self.movables[i + 1..] {
                let Some(b) = storage.get(b_id) else {
                    continue;
                };
                if !a.body.moved && !b.body.moved {
                    continue;
                }
                let rb = b.sim_rect();
                if rb.x >= ra.right() {
                    break;
                }
                if rb.y < ra.bottom() && ra.y < rb.bottom() {
                    record(a, b, &mut collisions);
                }
            }

            if a.body.moved {
                let mut in_prefix = true;
                for (k, &s_id) in self.statics.iter().enumerate().skip(marker) {
                    let Some(s) = storage.get(s_id) else {
                        continue;
                    };
                    let rs = s.sim_rect();
                    if rs.right() <= ra.x {
                        // Statics entirely left of this movable are left of
                        // every later one too.
                        if in_prefix {
                            marker = k + 1;
                        }
                        continue;
                    }
                    in_prefix = false;
                    if rs.x >= ra.right() {
                        break;
                    }
                    if rs.y < ra.bottom() && ra.y < rs.bottom() {
                        record(a, s, &mut collisions);
                    }
                }
            }
        }

        for &id in &self.movables {
            if let Some(obj) = storage.get_mut(id) {
                obj.body.moved = false;
            }
        }
        collisions
    }
}

fn apply_corrections(storage: &mut ObjectStorage, collisions: &[Collision]) {
    let state = |storage: &ObjectStorage, id| {
        storage
            .get(id)
            .map_or((true, false), |o| (o.body.moved, o.movable))
    };
    for c in collisions {
        if c.separation.depth < MIN_PENETRATION {
            break;
        }
        let (a_moved, a_movable) = state(storage, c.a);
        let (b_moved, b_movable) = state(storage, c.b);
        if a_moved || b_moved {
            continue;
        }
        let correction = c.separation.correction;
        let (share_a, share_b) = match (a_movable, b_movable) {
            (true, true) => (correction * 0.5, correction * -0.5),
            (true, false) => (correction, Vec2::ZERO),
            (false, true) => (Vec2::ZERO, -correction),
            (false, false) => continue,
        };
        for (id, share, movable) in [(c.a, share_a, a_movable), (c.b, share_b, b_movable)] {
            if !movable {
                continue;
            }
            if let Some(obj) = storage.get_mut(id) {
                obj.body.position += share;
                obj.body.moved = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Team;
    use proptest::prelude::*;

    fn circle_at(center: Vec2) -> GameObject {
        GameObject::tank(center - Vec2::new(8.0, 8.0), 0.0, Team::Red, 0)
    }

    #[test]
    fn test_circle_separation_along_centers() {
        let a = circle_at(Vec2::new(0.0, 0.0));
        let b = circle_at(Vec2::new(10.0, 0.0));
        let sep = compute_separation(&a, &b).unwrap();
        assert!((sep.depth - 6.0).abs() < 1e-9);
        assert!((sep.correction.x + 6.0).abs() < 1e-9);
        assert!(sep.correction.y.abs() < 1e-9);
    }

    #[test]
    fn test_touching_circles_do_not_collide() {
        let a = circle_at(Vec2::new(0.0, 0.0));
        let b = circle_at(Vec2::new(16.0, 0.0));
        assert!(compute_separation(&a, &b).is_none());
    }

    #[test]
    fn test_coincident_circles_have_zero_correction() {
        let a = circle_at(Vec2::new(5.0, 5.0));
        let sep = compute_separation(&a, &a.clone()).unwrap();
        assert_eq!(sep.depth, 0.0);
        assert_eq!(sep.correction, Vec2::ZERO);
    }

    #[test]
    fn test_rect_vertical_overlap() {
        let a = GameObject::wall(Rect::new(0.0, 0.0, 16.0, 16.0));
        let b = GameObject::wall(Rect::new(0.0, 11.0, 16.0, 16.0));
        let sep = compute_separation(&a, &b).unwrap();
        assert_eq!(sep.depth, 5.0);
        assert_eq!(sep.correction, Vec2::new(0.0, -5.0));
    }

    #[test]
    fn test_rects_without_overlap() {
        let a = GameObject::wall(Rect::new(0.0, 0.0, 16.0, 16.0));
        let b = GameObject::wall(Rect::new(16.0, 0.0, 16.0, 16.0));
        assert!(compute_separation(&a, &b).is_none());
    }

    #[test]
    fn test_circle_in_corner_region() {
        let wall = GameObject::wall(Rect::new(0.0, 0.0, 16.0, 16.0));
        // Centre diagonally past the bottom-right corner, 5 units away.
        let tank = circle_at(Vec2::new(19.0, 20.0));
        let sep = compute_separation(&tank, &wall).unwrap();
        assert!((sep.depth - 3.0).abs() < 1e-9);
        // Pushed further away from the corner.
        assert!(sep.correction.x > 0.0 && sep.correction.y > 0.0);

        let far = circle_at(Vec2::new(24.0, 24.0));
        assert!(compute_separation(&far, &wall).is_none());
    }

    #[test]
    fn test_circle_beside_rect_uses_box() {
        let wall = GameObject::wall(Rect::new(0.0, 0.0, 16.0, 64.0));
        let tank = circle_at(Vec2::new(20.0, 30.0));
        let sep = compute_separation(&tank, &wall).unwrap();
        assert_eq!(sep.depth, 4.0);
        assert_eq!(sep.correction, Vec2::new(4.0, 0.0));
    }

    #[test]
    fn test_resolve_pushes_tank_out_of_wall() {
        let mut storage = ObjectStorage::new();
        let mut bp = Broadphase::new();
        let wall = storage.insert(GameObject::wall(Rect::new(32.0, 0.0, 16.0, 64.0)));
        let tank = storage.insert(GameObject::tank(Vec2::new(20.0, 20.0), 0.0, Team::Red, 0));
        bp.insert(&storage, wall);
        bp.insert(&storage, tank);
        bp.integrate(&mut storage);
        let pairs = bp.resolve(&mut storage);
        assert!(pairs.contains(&(wall, tank)));
        let pos = storage.get(tank).unwrap().body.position;
        assert_eq!(pos, Vec2::new(16.0, 20.0));
    }

    #[test]
    fn test_resolve_splits_between_movables() {
        let mut storage = ObjectStorage::new();
        let mut bp = Broadphase::new();
        let a = storage.insert(GameObject::tank(Vec2::new(100.0, 100.0), 0.0, Team::Red, 0));
        let b = storage.insert(GameObject::tank(Vec2::new(110.0, 100.0), 0.0, Team::Blue, 0));
        bp.insert(&storage, a);
        bp.insert(&storage, b);
        bp.integrate(&mut storage);
        bp.resolve(&mut storage);
        let pa = storage.get(a).unwrap().body.position;
        let pb = storage.get(b).unwrap().body.position;
        assert!((pa.x - 97.0).abs() < 1e-9);
        assert!((pb.x - 113.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_solid_pairs_reported_but_not_moved() {
        let mut storage = ObjectStorage::new();
        let mut bp = Broadphase::new();
        let cp = storage.insert(GameObject::control_point(Vec2::new(100.0, 100.0)));
        let tank = storage.insert(GameObject::tank(Vec2::new(104.0, 104.0), 0.0, Team::Red, 0));
        bp.insert(&storage, cp);
        bp.insert(&storage, tank);
        bp.integrate(&mut storage);
        let pairs = bp.resolve(&mut storage);
        assert_eq!(pairs.len(), 1);
        assert_eq!(storage.get(tank).unwrap().body.position, Vec2::new(104.0, 104.0));
    }

    #[test]
    fn test_raycast_nearest_first() {
        let mut storage = ObjectStorage::new();
        let mut bp = Broadphase::new();
        let near = storage.insert(GameObject::wall(Rect::new(20.0, -8.0, 8.0, 16.0)));
        let far = storage.insert(GameObject::wall(Rect::new(40.0, -8.0, 8.0, 16.0)));
        let ghost = storage.insert(GameObject::control_point(Vec2::new(5.0, -12.0)));
        for id in [near, far, ghost] {
            bp.insert(&storage, id);
        }
        let hits = bp.raycast(&storage, Vec2::ZERO, Vec2::new(60.0, 0.0), None);
        let ids: Vec<_> = hits.iter().map(|h| h.object).collect();
        assert_eq!(ids, vec![near, far]);
        assert!((hits[0].point.x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_query_bounds() {
        let mut storage = ObjectStorage::new();
        let mut bp = Broadphase::new();
        let a = storage.insert(GameObject::wall(Rect::new(0.0, 0.0, 16.0, 16.0)));
        let b = storage.insert(GameObject::wall(Rect::new(100.0, 0.0, 16.0, 16.0)));
        let spawn = storage.insert(GameObject::tank_spawn(Vec2::ZERO, Team::Red, 0.0));
        for id in [a, b, spawn] {
            bp.insert(&storage, id);
        }
        let found = bp.query(&storage, Rect::new(10.0, 10.0, 20.0, 20.0), false);
        assert_eq!(found, vec![a]);
    }

    proptest! {
        #[test]
        fn prop_circle_depth_matches_distance(
            x in -50.0f64..50.0,
            y in -50.0f64..50.0,
        ) {
            let a = circle_at(Vec2::ZERO);
            let b = circle_at(Vec2::new(x, y));
            let dist = Vec2::new(x, y).length();
            match compute_separation(&a, &b) {
                Some(sep) if dist > 0.0 => {
                    prop_assert!(dist < 16.0);
                    prop_assert!((sep.depth - (16.0 - dist)).abs() < 1e-9);
                    prop_assert!((sep.correction.length() - sep.depth).abs() < 1e-9);
                }
                Some(_) => prop_assert_eq!(dist, 0.0),
                None => prop_assert!(dist >= 16.0),
            }
        }
    }
}
