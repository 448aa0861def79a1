//! Force-directed layout for the children of one cluster.
//!
//! A Fruchterman–Reingold style simulation: every pair of children repels
//! with an inverse-square force scaled by how much room their boxes need,
//! connected children attract like springs once they are further apart than
//! that ideal distance, and a weak gravity pulls everything toward the
//! cluster origin. Velocities are damped and each step's displacement is
//! capped. Start positions are evenly spaced on a circle by index, so the
//! result is fully deterministic for a given iteration count.

use crate::config::PlacementConfig;
use crate::types::{Point, Rect};
use std::f64::consts::TAU;

#[derive(Debug, Clone)]
struct SimNode {
    center: Point,
    velocity: Point,
    half_diag: f64,
    fixed: bool,
}

/// Run the simulation. `footprints[i]` is child `i`'s box relative to its
/// origin, `origins[i]` its current origin (used as-is for fixed children).
/// Returns the new origin of every child.
pub fn force_layout(
    footprints: &[Rect],
    origins: &[Point],
    fixed: &[bool],
    weights: &[Vec<f64>],
    config: &PlacementConfig,
) -> Vec<Point> {
    let n = footprints.len();
    if n == 0 {
        return Vec::new();
    }

    let perimeter: f64 = footprints.iter().map(|f| f.w.max(f.h) + config.spacing).sum();
    let radius = perimeter / TAU;

    let mut nodes: Vec<SimNode> = (0..n)
        .map(|i| {
            let fp = footprints[i];
            let center = if fixed[i] {
                let c = fp.center();
                Point::new(origins[i].x + c.x, origins[i].y + c.y)
            } else {
                let angle = TAU * i as f64 / n as f64;
                Point::new(radius * angle.cos(), radius * angle.sin())
            };
            SimNode {
                center,
                velocity: Point::default(),
                half_diag: fp.w.hypot(fp.h) / 2.0,
                fixed: fixed[i],
            }
        })
        .collect();

    let max_step = config.spacing.max(1.0) * 4.0;
    for _ in 0..config.iterations {
        let mut forces = vec![Point::default(); n];
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = nodes[j].center.x - nodes[i].center.x;
                let dy = nodes[j].center.y - nodes[i].center.y;
                let dist = dx.hypot(dy).max(1e-3);
                let (ux, uy) = (dx / dist, dy / dist);
                let ideal = nodes[i].half_diag + nodes[j].half_diag + config.spacing;

                let mut f = -config.repulsion * (ideal / dist).powi(2) / ideal.max(1.0);
                if weights[i][j] > 0.0 && dist > ideal {
                    f += config.attraction * weights[i][j] * (dist - ideal);
                }
                forces[i].x += f * ux;
                forces[i].y += f * uy;
                forces[j].x -= f * ux;
                forces[j].y -= f * uy;
            }
        }

        for (node, force) in nodes.iter_mut().zip(&forces) {
            if node.fixed {
                continue;
            }
            let fx = force.x - config.gravity * node.center.x;
            let fy = force.y - config.gravity * node.center.y;
            node.velocity.x = (node.velocity.x + fx) * config.damping;
            node.velocity.y = (node.velocity.y + fy) * config.damping;
            let speed = node.velocity.x.hypot(node.velocity.y);
            if speed > max_step {
                node.velocity.x *= max_step / speed;
                node.velocity.y *= max_step / speed;
            }
            node.center.x += node.velocity.x;
            node.center.y += node.velocity.y;
        }
    }

    nodes
        .iter()
        .zip(footprints)
        .map(|(node, fp)| {
            let c = fp.center();
            Point::new(node.center.x - c.x, node.center.y - c.y)
        })
        .collect()
}
