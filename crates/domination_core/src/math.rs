//! Geometry utilities for the simulation.
//!
//! Positions are continuous world coordinates (`f64`) with the origin in the
//! top-left corner of the field, x growing right and y growing down. Angles
//! are radians, 0 facing +x, increasing clockwise on screen.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// 2D vector in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Vec2 {
    /// Zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle`.
    #[must_use]
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Length.
    #[must_use]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (other - self).length()
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Angle of this vector measured from +x.
    #[must_use]
    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Whether both components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Truncate both components toward zero, the way observations report
    /// locations.
    #[must_use]
    pub fn to_loc(self) -> (i32, i32) {
        (self.x as i32, self.y as i32)
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

/// Axis-aligned rectangle: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge.
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Centre point.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Whether `p` lies strictly inside the rectangle.
    #[must_use]
    pub fn contains_strict(&self, p: Vec2) -> bool {
        p.x > self.x && p.x < self.right() && p.y > self.y && p.y < self.bottom()
    }

    /// Whether two rectangles overlap with positive area.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Grow the rectangle by `margin` on every side.
    #[must_use]
    pub fn inflate(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.w + 2.0 * margin,
            self.h + 2.0 * margin,
        )
    }
}

/// Normalize an angle into `[-PI, PI)`.
#[must_use]
pub fn angle_fix(theta: f64) -> f64 {
    (theta + PI).rem_euclid(2.0 * PI) - PI
}

/// Intersect the segment `p0 -> p1` with `rect`.
///
/// Returns the segment parameter `t` in `[0, 1]` of the entry point and the
/// point itself. A segment starting inside the rectangle hits at `t = 0`.
#[must_use]
pub fn line_intersects_rect(p0: Vec2, p1: Vec2, rect: &Rect) -> Option<(f64, Vec2)> {
    let d = p1 - p0;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    // Liang-Barsky clipping against the four edges.
    let edges = [
        (-d.x, p0.x - rect.x),
        (d.x, rect.right() - p0.x),
        (-d.y, p0.y - rect.y),
        (d.y, rect.bottom() - p0.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                if r > t1 {
                    return None;
                }
                t0 = t0.max(r);
            } else {
                if r < t0 {
                    return None;
                }
                t1 = t1.min(r);
            }
        }
    }
    Some((t0, p0 + d * t0))
}

/// Intersect the segment `p0 -> p1` with the circle at `center`.
///
/// Same conventions as [`line_intersects_rect`].
#[must_use]
pub fn line_intersects_circ(p0: Vec2, p1: Vec2, center: Vec2, radius: f64) -> Option<(f64, Vec2)> {
    let d = p1 - p0;
    let f = p0 - center;
    let c = f.length_squared() - radius * radius;
    if c <= 0.0 {
        return Some((0.0, p0));
    }
    let a = d.length_squared();
    if a == 0.0 {
        return None;
    }
    let b = 2.0 * f.dot(d);
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let t = (-b - disc.sqrt()) / (2.0 * a);
    if (0.0..=1.0).contains(&t) {
        Some((t, p0 + d * t))
    } else {
        None
    }
}

/// Merge touching rectangles into larger ones.
///
/// Rows of equal height are merged horizontally first, then columns of equal
/// width are merged vertically. Intended for tile-aligned input; the output
/// order is deterministic (sorted by x, then y).
#[must_use]
pub fn rects_merge(rects: &[Rect]) -> Vec<Rect> {
    let mut rows: Vec<Rect> = rects.to_vec();
    rows.sort_by(|a, b| {
        a.y.total_cmp(&b.y)
            .then(a.h.total_cmp(&b.h))
            .then(a.x.total_cmp(&b.x))
    });
    let mut horizontal: Vec<Rect> = Vec::with_capacity(rows.len());
    for r in rows {
        match horizontal.last_mut() {
            Some(last) if last.y == r.y && last.h == r.h && last.right() == r.x => {
                last.w += r.w;
            }
            _ => horizontal.push(r),
        }
    }

    horizontal.sort_by(|a, b| {
        a.x.total_cmp(&b.x)
            .then(a.w.total_cmp(&b.w))
            .then(a.y.total_cmp(&b.y))
    });
    let mut merged: Vec<Rect> = Vec::with_capacity(horizontal.len());
    for r in horizontal {
        match merged.last_mut() {
            Some(last) if last.x == r.x && last.w == r.w && last.bottom() == r.y => {
                last.h += r.h;
            }
            _ => merged.push(r),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_angle_fix_range() {
        for k in -20..20 {
            let a = angle_fix(f64::from(k) * 0.7);
            assert!((-PI..PI).contains(&a), "{a} out of range");
        }
        assert!((angle_fix(2.0 * PI + 0.5) - 0.5).abs() < 1e-9);
        assert!((angle_fix(-0.25) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_line_hits_rect_entry_point() {
        let rect = Rect::new(10.0, -5.0, 10.0, 10.0);
        let (t, p) = line_intersects_rect(Vec2::ZERO, Vec2::new(40.0, 0.0), &rect).unwrap();
        assert!((t - 0.25).abs() < 1e-12);
        assert!((p.x - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_line_misses_rect() {
        let rect = Rect::new(10.0, 5.0, 10.0, 10.0);
        assert!(line_intersects_rect(Vec2::ZERO, Vec2::new(40.0, 0.0), &rect).is_none());
        // Segment ends before the rectangle.
        let rect = Rect::new(50.0, -5.0, 10.0, 10.0);
        assert!(line_intersects_rect(Vec2::ZERO, Vec2::new(40.0, 0.0), &rect).is_none());
    }

    #[test]
    fn test_line_hits_circle() {
        let (t, p) =
            line_intersects_circ(Vec2::ZERO, Vec2::new(100.0, 0.0), Vec2::new(50.0, 0.0), 10.0)
                .unwrap();
        assert!((t - 0.4).abs() < 1e-12);
        assert!((p.x - 40.0).abs() < 1e-9);
        assert!(line_intersects_circ(
            Vec2::ZERO,
            Vec2::new(100.0, 0.0),
            Vec2::new(50.0, 20.0),
            10.0
        )
        .is_none());
    }

    #[test]
    fn test_line_starting_inside_circle() {
        let hit = line_intersects_circ(Vec2::new(1.0, 1.0), Vec2::new(100.0, 0.0), Vec2::ZERO, 5.0);
        assert_eq!(hit.map(|(t, _)| t), Some(0.0));
    }

    #[test]
    fn test_rects_merge_block() {
        let tiles: Vec<Rect> = (0..3)
            .flat_map(|i| (0..2).map(move |j| Rect::new(f64::from(i) * 16.0, f64::from(j) * 16.0, 16.0, 16.0)))
            .collect();
        let merged = rects_merge(&tiles);
        assert_eq!(merged, vec![Rect::new(0.0, 0.0, 48.0, 32.0)]);
    }

    #[test]
    fn test_rects_merge_keeps_gaps() {
        let tiles = vec![
            Rect::new(0.0, 0.0, 16.0, 16.0),
            Rect::new(32.0, 0.0, 16.0, 16.0),
            Rect::new(0.0, 16.0, 16.0, 16.0),
        ];
        let merged = rects_merge(&tiles);
        assert_eq!(
            merged,
            vec![Rect::new(0.0, 0.0, 16.0, 32.0), Rect::new(32.0, 0.0, 16.0, 16.0)]
        );
    }

    #[test]
    fn test_vec2_ops() {
        let a = Vec2::new(3.0, 4.0);
        assert_eq!(a.length(), 5.0);
        assert_eq!(a + a, Vec2::new(6.0, 8.0));
        assert_eq!(a - a, Vec2::ZERO);
        assert_eq!(-a * 2.0, Vec2::new(-6.0, -8.0));
        assert_eq!(Vec2::new(12.9, -3.7).to_loc(), (12, -3));
    }
}
