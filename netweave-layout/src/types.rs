//! Geometry primitives shared by placement, routing and verification.
//!
//! Sheet coordinates are millimetres, x grows rightward and y grows
//! downward.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Point on the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Whether two points coincide within `tol` on both axes.
    pub fn near(self, other: Point, tol: f64) -> bool {
        (self.x - other.x).abs() <= tol && (self.y - other.y).abs() <= tol
    }

    pub fn manhattan(self, other: Point) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Axis-aligned rectangle anchored at its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle of size `w`×`h` centred on `c`.
    pub fn centered(c: Point, w: f64, h: f64) -> Self {
        Self::new(c.x - w / 2.0, c.y - h / 2.0, w, h)
    }

    /// Smallest rectangle containing both corners.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let (x0, x1) = minmax(a.x, b.x);
        let (y0, y1) = minmax(a.y, b.y);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Interiors intersect. Rectangles that merely share an edge do not
    /// overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Closed containment (edges included).
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Open containment: `p` lies strictly inside.
    pub fn strictly_contains(&self, p: Point) -> bool {
        p.x > self.x && p.x < self.right() && p.y > self.y && p.y < self.bottom()
    }

    /// Grow by `pad` on every side.
    pub fn inflate(&self, pad: f64) -> Rect {
        Rect::new(self.x - pad, self.y - pad, self.w + 2.0 * pad, self.h + 2.0 * pad)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.w, self.h)
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Whether the axis-aligned segment `a`–`b` passes through the open
    /// interior.
    pub fn crossed_by(&self, a: Point, b: Point) -> bool {
        if (a.y - b.y).abs() < 1e-9 {
            let (x0, x1) = minmax(a.x, b.x);
            a.y > self.y && a.y < self.bottom() && x0 < self.right() && x1 > self.x
        } else if (a.x - b.x).abs() < 1e-9 {
            let (y0, y1) = minmax(a.y, b.y);
            a.x > self.x && a.x < self.right() && y0 < self.bottom() && y1 > self.y
        } else {
            // Diagonal fallback wires: sample along the segment.
            (0..=32).any(|i| {
                let t = i as f64 / 32.0;
                self.strictly_contains(Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t))
            })
        }
    }
}

pub fn minmax(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Whether `p` lies on segment `a`–`b` within `tol`.
pub fn point_on_segment(p: Point, a: Point, b: Point, tol: f64) -> bool {
    let (x0, x1) = minmax(a.x, b.x);
    let (y0, y1) = minmax(a.y, b.y);
    if p.x < x0 - tol || p.x > x1 + tol || p.y < y0 - tol || p.y > y1 + tol {
        return false;
    }
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx.hypot(dy);
    if len < 1e-12 {
        return p.near(a, tol);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len <= tol
}

/// Snap a coordinate to the nearest multiple of `pitch`.
pub fn snap(v: f64, pitch: f64) -> f64 {
    if pitch <= 0.0 {
        v
    } else {
        (v / pitch).round() * pitch
    }
}

pub fn snap_point(p: Point, pitch: f64) -> Point {
    Point::new(snap(p.x, pitch), snap(p.y, pitch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_rects_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&b.translate(-0.1, 0.0)));
    }

    #[test]
    fn strict_containment_excludes_edges() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains_point(Point::new(0.0, 5.0)));
        assert!(!r.strictly_contains(Point::new(0.0, 5.0)));
        assert!(r.strictly_contains(Point::new(0.1, 5.0)));
    }

    #[test]
    fn segment_crossing() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.crossed_by(Point::new(-5.0, 5.0), Point::new(15.0, 5.0)));
        assert!(!r.crossed_by(Point::new(-5.0, 10.0), Point::new(15.0, 10.0)));
        assert!(!r.crossed_by(Point::new(-5.0, 5.0), Point::new(0.0, 5.0)));
    }

    #[test]
    fn point_on_segment_tolerance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert!(point_on_segment(Point::new(5.0, 0.005), a, b, 0.01));
        assert!(!point_on_segment(Point::new(5.0, 0.5), a, b, 0.01));
        assert!(!point_on_segment(Point::new(10.5, 0.0), a, b, 0.01));
    }

    #[test]
    fn snapping() {
        assert!((snap(3.9, 1.27) - 3.81).abs() < 1e-9);
        assert_eq!(snap_point(Point::new(0.6, -0.7), 1.27), Point::new(0.0, -1.27));
    }
}
