//! 2D segment/circle/AABB geometry helpers
//!
//! Foundation for the collision system: everything here is a pure function
//! of its arguments.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Bounding box of a segment
    pub fn of_segment(a: Vec2, b: Vec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Bounding box of a circle
    pub fn of_circle(center: Vec2, r: f32) -> Self {
        Self {
            min: center - Vec2::splat(r),
            max: center + Vec2::splat(r),
        }
    }

    pub fn expand_to(&mut self, p: Vec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow uniformly in all directions
    pub fn inflate(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }
}

/// Closest point to `p` on segment `a`-`b`
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Shortest distance between segments `a1`-`a2` and `b1`-`b2`.
///
/// Zero when the segments cross.
pub fn segment_segment_distance(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> f32 {
    if intersect_segment_segment(a1, a2, b1, b2).is_some() {
        return 0.0;
    }
    let d1 = (closest_point_on_segment(a1, b1, b2) - a1).length();
    let d2 = (closest_point_on_segment(a2, b1, b2) - a2).length();
    let d3 = (closest_point_on_segment(b1, a1, a2) - b1).length();
    let d4 = (closest_point_on_segment(b2, a1, a2) - b2).length();
    d1.min(d2).min(d3).min(d4)
}

/// Up to two intersection points of segment `a`-`b` with a circle
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentCircleHits {
    pub count: usize,
    pub points: [Vec2; 2],
}

/// Intersect segment `a`-`b` with the circle at `center`, radius `r`.
///
/// Solves |a + t*(b-a) - center|² = r² for t in [0, 1].
pub fn intersect_segment_circle(center: Vec2, r: f32, a: Vec2, b: Vec2) -> SegmentCircleHits {
    let mut hits = SegmentCircleHits {
        count: 0,
        points: [Vec2::ZERO; 2],
    };

    let d = b - a;
    let f = a - center;

    let qa = d.length_squared();
    if qa < 1e-12 {
        return hits;
    }
    let qb = 2.0 * f.dot(d);
    let qc = f.length_squared() - r * r;

    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return hits;
    }

    let sqrt_disc = disc.sqrt();
    for t in [(-qb - sqrt_disc) / (2.0 * qa), (-qb + sqrt_disc) / (2.0 * qa)] {
        if (0.0..=1.0).contains(&t) {
            hits.points[hits.count] = a + d * t;
            hits.count += 1;
        }
    }
    // tangent touch: both roots coincide, report one point
    if hits.count == 2 && sqrt_disc < 1e-6 {
        hits.count = 1;
    }
    hits
}

/// Intersection point of segments `a1`-`a2` and `b1`-`b2`, if any.
///
/// Collinear overlap reports no single point and returns `None`.
pub fn intersect_segment_segment(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> Option<Vec2> {
    let r = a2 - a1;
    let s = b2 - b1;
    let denom = r.perp_dot(s);
    if denom.abs() < 1e-10 {
        return None;
    }
    let q = b1 - a1;
    let t = q.perp_dot(s) / denom;
    let u = q.perp_dot(r) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(a1 + r * t)
    } else {
        None
    }
}

/// Does the disk at `center` with radius `r` touch segment `a`-`b`?
pub fn circle_touches_segment(center: Vec2, r: f32, a: Vec2, b: Vec2) -> bool {
    (closest_point_on_segment(center, a, b) - center).length_squared() <= r * r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_point_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec2::new(-5.0, 3.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec2::new(15.0, 3.0), a, b), b);
        assert_eq!(
            closest_point_on_segment(Vec2::new(5.0, 3.0), a, b),
            Vec2::new(5.0, 0.0)
        );
    }

    #[test]
    fn test_segment_circle_two_hits() {
        let hits = intersect_segment_circle(
            Vec2::ZERO,
            1.0,
            Vec2::new(-2.0, 0.0),
            Vec2::new(2.0, 0.0),
        );
        assert_eq!(hits.count, 2);
        assert!((hits.points[0] - Vec2::new(-1.0, 0.0)).length() < 1e-5);
        assert!((hits.points[1] - Vec2::new(1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_segment_circle_miss() {
        let hits = intersect_segment_circle(
            Vec2::ZERO,
            1.0,
            Vec2::new(-2.0, 2.0),
            Vec2::new(2.0, 2.0),
        );
        assert_eq!(hits.count, 0);
    }

    #[test]
    fn test_segment_circle_clips_to_segment_range() {
        // circle ahead of the segment's reach
        let hits = intersect_segment_circle(
            Vec2::new(10.0, 0.0),
            1.0,
            Vec2::new(0.0, 0.0),
            Vec2::new(5.0, 0.0),
        );
        assert_eq!(hits.count, 0);
    }

    #[test]
    fn test_segment_segment_cross() {
        let p = intersect_segment_segment(
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(0.0, 1.0),
        );
        assert!((p.expect("segments cross") - Vec2::ZERO).length() < 1e-6);
    }

    #[test]
    fn test_segment_segment_parallel() {
        let p = intersect_segment_segment(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
        );
        assert!(p.is_none());
    }

    #[test]
    fn test_segment_segment_distance() {
        let d = segment_segment_distance(
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(3.0, 2.0),
            Vec2::new(7.0, 2.0),
        );
        assert!((d - 2.0).abs() < 1e-5);

        let d = segment_segment_distance(
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
            Vec2::new(1.0, -1.0),
        );
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::new(Vec2::ZERO, Vec2::new(2.0, 2.0));
        let b = Aabb::new(Vec2::new(1.0, 1.0), Vec2::new(3.0, 3.0));
        let c = Aabb::new(Vec2::new(5.0, 5.0), Vec2::new(6.0, 6.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
