//! Geometric clean-up passes shared by placement and assembly.
//!
//! - Separating fixed siblings that overlap by uniformly scaling their
//!   positions about the cluster origin.
//! - A crossing count over finished wire segments, reported in the
//!   generation summary.

use crate::types::*;
use thiserror::Error;

/// Rounds of scaling attempted before giving up on fixed siblings.
const MAX_SCALE_ROUNDS: usize = 16;

/// Margin applied on top of the exact separating factor so boxes end up
/// apart rather than edge to edge.
const SCALE_MARGIN: f64 = 1.001;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    #[error("fixed positions of {first} and {second} coincide; scaling cannot separate them")]
    Coincident { first: String, second: String },
    #[error("separating fixed parts in {cluster} needs a scale of {scale:.3}, above the limit of {limit}")]
    ScaleTooLarge { cluster: String, scale: f64, limit: f64 },
}

/// Why [`separate_fixed`] gave up, by child index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleFailure {
    Coincident(usize, usize),
    TooLarge(f64),
}

/// Scale `origins` about `(0, 0)` until no two boxes overlap.
///
/// `local[i]` is child `i`'s box relative to its own origin (rotation
/// already applied). Returns the total factor applied, `1.0` when nothing
/// overlapped. On failure `origins` is left untouched.
pub fn separate_fixed(origins: &mut [Point], local: &[Rect], max_scale: f64) -> Result<f64, ScaleFailure> {
    let mut scaled: Vec<Point> = origins.to_vec();
    let mut total = 1.0;

    for _ in 0..MAX_SCALE_ROUNDS {
        let boxes: Vec<Rect> = scaled
            .iter()
            .zip(local)
            .map(|(o, r)| r.translate(o.x, o.y))
            .collect();

        let mut factor: f64 = 1.0;
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                if !boxes[i].overlaps(&boxes[j]) {
                    continue;
                }
                if scaled[i].near(scaled[j], 1e-9) {
                    return Err(ScaleFailure::Coincident(i, j));
                }
                factor = factor.max(pair_factor(&boxes[i], &boxes[j]));
            }
        }
        if factor <= 1.0 {
            origins.copy_from_slice(&scaled);
            return Ok(total);
        }

        let factor = factor * SCALE_MARGIN;
        total *= factor;
        if total > max_scale {
            return Err(ScaleFailure::TooLarge(total));
        }
        for o in &mut scaled {
            o.x *= factor;
            o.y *= factor;
        }
    }
    Err(ScaleFailure::TooLarge(total))
}

/// Smallest factor that pulls two overlapping boxes apart along their
/// cheaper axis.
fn pair_factor(a: &Rect, b: &Rect) -> f64 {
    let (ca, cb) = (a.center(), b.center());
    let need_x = (a.w + b.w) / 2.0;
    let need_y = (a.h + b.h) / 2.0;
    let dx = (ca.x - cb.x).abs();
    let dy = (ca.y - cb.y).abs();
    let fx = if dx > 1e-9 { need_x / dx } else { f64::INFINITY };
    let fy = if dy > 1e-9 { need_y / dy } else { f64::INFINITY };
    fx.min(fy)
}

/// Number of proper crossings between horizontal and vertical segments.
pub fn count_crossings(segments: &[(Point, Point)]) -> usize {
    let mut crossings = 0;
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let (a1, a2) = segments[i];
            let (b1, b2) = segments[j];
            if segments_cross(a1, a2, b1, b2) {
                crossings += 1;
            }
        }
    }
    crossings
}

fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let a_horiz = (a1.y - a2.y).abs() < 1e-6;
    let b_horiz = (b1.y - b2.y).abs() < 1e-6;
    let a_vert = (a1.x - a2.x).abs() < 1e-6;
    let b_vert = (b1.x - b2.x).abs() < 1e-6;

    let ((h1, h2), (v1, v2)) = if a_horiz && b_vert {
        ((a1, a2), (b1, b2))
    } else if b_horiz && a_vert {
        ((b1, b2), (a1, a2))
    } else {
        return false;
    };

    let (h_min_x, h_max_x) = minmax(h1.x, h2.x);
    let (v_min_y, v_max_y) = minmax(v1.y, v2.y);
    v1.x > h_min_x && v1.x < h_max_x && h1.y > v_min_y && h1.y < v_max_y
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_boxes(n: usize) -> Vec<Rect> {
        vec![Rect::centered(Point::default(), 4.0, 4.0); n]
    }

    #[test]
    fn separated_boxes_are_left_alone() {
        let mut origins = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let total = separate_fixed(&mut origins, &unit_boxes(2), 10.0).unwrap();
        assert_eq!(total, 1.0);
        assert_eq!(origins[1], Point::new(10.0, 0.0));
    }

    #[test]
    fn overlapping_boxes_scale_apart() {
        let mut origins = vec![Point::new(1.0, 0.0), Point::new(3.0, 1.0)];
        let local = unit_boxes(2);
        let total = separate_fixed(&mut origins, &local, 10.0).unwrap();
        assert!(total > 1.0);
        let a = local[0].translate(origins[0].x, origins[0].y);
        let b = local[1].translate(origins[1].x, origins[1].y);
        assert!(!a.overlaps(&b));
        // Uniform scaling keeps the ratio between coordinates.
        assert!((origins[1].x / origins[0].x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn coincident_positions_fail() {
        let mut origins = vec![Point::new(5.0, 5.0), Point::new(5.0, 5.0)];
        let err = separate_fixed(&mut origins, &unit_boxes(2), 10.0).unwrap_err();
        assert_eq!(err, ScaleFailure::Coincident(0, 1));
        assert_eq!(origins[0], Point::new(5.0, 5.0));
    }

    #[test]
    fn scale_limit_is_enforced() {
        let mut origins = vec![Point::new(0.1, 0.0), Point::new(0.2, 0.0)];
        let err = separate_fixed(&mut origins, &unit_boxes(2), 10.0).unwrap_err();
        assert!(matches!(err, ScaleFailure::TooLarge(s) if s > 10.0));
    }

    #[test]
    fn segments_cross_perpendicular() {
        let h = (Point::new(0.0, 5.0), Point::new(10.0, 5.0));
        let v = (Point::new(5.0, 0.0), Point::new(5.0, 10.0));
        let miss = (Point::new(12.0, 0.0), Point::new(12.0, 10.0));
        assert_eq!(count_crossings(&[h, v]), 1);
        assert_eq!(count_crossings(&[h, miss]), 0);
        assert_eq!(count_crossings(&[h, (Point::new(0.0, 7.0), Point::new(10.0, 7.0))]), 0);
    }
}
