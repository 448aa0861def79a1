//! Row/column grid layout for the children of one cluster.
//!
//! Children are ordered so that strongly connected siblings end up next to
//! each other, then dealt into a grid of `ceil(sqrt(n))` columns. Every
//! column is as wide as its widest child and every row as tall as its
//! tallest; children are centred in their cell.

use crate::types::{Point, Rect};

/// Grid dimensions for `n` children as `(columns, rows)`. Columns win
/// whenever the square root is not exact.
pub fn grid_shape(n: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let mut cols = (n as f64).sqrt().ceil() as usize;
    // Guard against sqrt rounding for perfect squares.
    while cols > 1 && (cols - 1) * (cols - 1) >= n {
        cols -= 1;
    }
    let rows = n.div_ceil(cols);
    (cols, rows)
}

/// Greedy chain through the weight matrix: start at child 0, then keep
/// picking the unvisited child most connected to the previous pick. Ties go
/// to the lower index, so the order is deterministic.
pub fn connectivity_order(weights: &[Vec<f64>]) -> Vec<usize> {
    let n = weights.len();
    let mut order = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    let mut current = 0;
    for _ in 0..n {
        if visited[current] {
            match (0..n).find(|&i| !visited[i]) {
                Some(i) => current = i,
                None => break,
            }
        }
        visited[current] = true;
        order.push(current);

        let mut best: Option<(usize, f64)> = None;
        for (j, &w) in weights[current].iter().enumerate() {
            if visited[j] || w <= 0.0 {
                continue;
            }
            if best.map_or(true, |(_, bw)| w > bw) {
                best = Some((j, w));
            }
        }
        if let Some((j, _)) = best {
            current = j;
        }
    }
    order
}

/// Grid placement. `footprints[i]` is child `i`'s box relative to its own
/// origin; the result is each child's new origin, with the grid's top-left
/// corner at `(0, 0)`.
pub fn grid_layout(footprints: &[Rect], order: &[usize], spacing: f64) -> Vec<Point> {
    let (cols, rows) = grid_shape(order.len());
    let mut col_widths = vec![0.0f64; cols];
    let mut row_heights = vec![0.0f64; rows];
    for (slot, &child) in order.iter().enumerate() {
        let (r, c) = (slot / cols, slot % cols);
        col_widths[c] = col_widths[c].max(footprints[child].w);
        row_heights[r] = row_heights[r].max(footprints[child].h);
    }

    let col_x = running_offsets(&col_widths, spacing);
    let row_y = running_offsets(&row_heights, spacing);

    let mut out = vec![Point::default(); footprints.len()];
    for (slot, &child) in order.iter().enumerate() {
        let (r, c) = (slot / cols, slot % cols);
        let cell_center = Point::new(col_x[c] + col_widths[c] / 2.0, row_y[r] + row_heights[r] / 2.0);
        let fp = footprints[child].center();
        out[child] = Point::new(cell_center.x - fp.x, cell_center.y - fp.y);
    }
    out
}

fn running_offsets(sizes: &[f64], spacing: f64) -> Vec<f64> {
    let mut acc = 0.0;
    sizes
        .iter()
        .map(|s| {
            let start = acc;
            acc += s + spacing;
            start
        })
        .collect()
}
