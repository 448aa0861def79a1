//! Obstacle-aware grid router.
//!
//! Routes one connection at a time on a 4-connected grid with a fixed
//! pitch. Both endpoints are snapped to the grid; A* then searches over
//! `(cell, incoming direction)` states so that every change of direction
//! can be charged a turn penalty, which biases the result toward long
//! straight runs. Cells strictly inside a padded obstacle are blocked,
//! except a cell that coincides with the requested (unsnapped) start or
//! end point. Wires already drawn for other nets are kept out of the
//! search through an [`Occupancy`]: a route may cross such a wire at right
//! angles but never runs along it, turns on it or ends on it.

use crate::config::RouterConfig;
use crate::symbols::SymbolSource;
use crate::types::*;
use netweave::model::{ComponentId, NetId};
use netweave::Netlist;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("no path from {from} to {to}")]
    NoPath { from: Point, to: Point },
    #[error("routing region of {cells} cells exceeds the limit of {limit}")]
    GridTooLarge { cells: usize, limit: usize },
}

const DIRS: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

const HORIZONTAL: u8 = 1;
const VERTICAL: u8 = 2;

fn axis_of(dir: (i64, i64)) -> u8 {
    if dir.0 != 0 {
        HORIZONTAL
    } else {
        VERTICAL
    }
}

/// Grid cells taken by drawn wires, with the axes they are taken along.
///
/// Cells inside a straight run carry the run's axis only; segment ends
/// carry both, so no other net can form a junction there.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    pitch: f64,
    cells: HashMap<(i64, i64), Vec<(NetId, u8)>>,
}

impl Occupancy {
    pub fn new(pitch: f64) -> Self {
        Self {
            pitch,
            cells: HashMap::new(),
        }
    }

    /// Record an axis-aligned segment of `net`. Segments off the grid or
    /// off-axis are ignored.
    pub fn add_segment(&mut self, net: NetId, a: Point, b: Point) {
        if self.pitch <= 0.0 || a.near(b, 1e-9) {
            return;
        }
        let on_grid = |v: f64| ((v / self.pitch).round() * self.pitch - v).abs() <= 1e-6;
        let (axis, fixed, lo, hi) = if (a.y - b.y).abs() <= 1e-9 {
            (HORIZONTAL, a.y, a.x.min(b.x), a.x.max(b.x))
        } else if (a.x - b.x).abs() <= 1e-9 {
            (VERTICAL, a.x, a.y.min(b.y), a.y.max(b.y))
        } else {
            return;
        };
        if !on_grid(fixed) {
            return;
        }
        let k = (fixed / self.pitch).round() as i64;
        let first = (lo / self.pitch - 1e-6).ceil() as i64;
        let last = (hi / self.pitch + 1e-6).floor() as i64;
        for i in first..=last {
            let along = i as f64 * self.pitch;
            let bits = if (along - lo).abs() <= 1e-6 || (along - hi).abs() <= 1e-6 {
                HORIZONTAL | VERTICAL
            } else {
                axis
            };
            let cell = if axis == HORIZONTAL { (i, k) } else { (k, i) };
            self.cells.entry(cell).or_default().push((net, bits));
        }
    }

    /// Axes taken at `cell` by nets other than `net`.
    pub fn foreign(&self, cell: (i64, i64), net: NetId) -> u8 {
        self.cells
            .get(&cell)
            .map(|taken| {
                taken
                    .iter()
                    .filter(|(n, _)| *n != net)
                    .fold(0, |acc, (_, bits)| acc | bits)
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridState {
    x: usize,
    y: usize,
    dir: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct GridEntry {
    est: u32,
    cost: u32,
    state: GridState,
}

// Min-heap on the estimate; remaining fields only make pops deterministic.
impl Ord for GridEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .est
            .cmp(&self.est)
            .then_with(|| other.cost.cmp(&self.cost))
            .then_with(|| self.state.y.cmp(&other.state.y))
            .then_with(|| self.state.x.cmp(&other.state.x))
            .then_with(|| self.state.dir.cmp(&other.state.dir))
    }
}

impl PartialOrd for GridEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Grid router configured once per generation pass.
#[derive(Debug, Clone)]
pub struct Router {
    pitch: f64,
    turn_penalty: u32,
    margin_cells: i64,
    max_cells: usize,
}

impl Router {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            pitch: if config.pitch > 0.0 { config.pitch } else { 1.27 },
            turn_penalty: config.turn_penalty,
            margin_cells: config.margin_cells as i64,
            max_cells: config.max_cells,
        }
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Rectilinear path from `start` to `end` around `obstacles` (already
    /// padded). The first and last points are the grid-snapped endpoints;
    /// interior collinear points are removed.
    pub fn route(&self, start: Point, end: Point, obstacles: &[Rect]) -> Result<Vec<Point>, RouteError> {
        self.search(start, end, obstacles, None)
    }

    /// Like [`Router::route`], keeping clear of the wires other nets have
    /// already taken in `occupancy`.
    pub fn route_net(
        &self,
        start: Point,
        end: Point,
        obstacles: &[Rect],
        occupancy: &Occupancy,
        net: NetId,
    ) -> Result<Vec<Point>, RouteError> {
        self.search(start, end, obstacles, Some((occupancy, net)))
    }

    fn search(
        &self,
        start: Point,
        end: Point,
        obstacles: &[Rect],
        keepout: Option<(&Occupancy, NetId)>,
    ) -> Result<Vec<Point>, RouteError> {
        let (sx, sy) = self.cell_of(start);
        let (ex, ey) = self.cell_of(end);
        if (sx, sy) == (ex, ey) {
            return Ok(vec![self.point_of(sx, sy)]);
        }

        // Region: endpoints plus every obstacle, with a free margin.
        let mut min = (sx.min(ex), sy.min(ey));
        let mut max = (sx.max(ex), sy.max(ey));
        for r in obstacles {
            min.0 = min.0.min((r.x / self.pitch).floor() as i64);
            min.1 = min.1.min((r.y / self.pitch).floor() as i64);
            max.0 = max.0.max((r.right() / self.pitch).ceil() as i64);
            max.1 = max.1.max((r.bottom() / self.pitch).ceil() as i64);
        }
        let base = (min.0 - self.margin_cells, min.1 - self.margin_cells);
        let cols = (max.0 + self.margin_cells - base.0 + 1) as usize;
        let rows = (max.1 + self.margin_cells - base.1 + 1) as usize;
        let cells = cols.saturating_mul(rows);
        if cells > self.max_cells {
            return Err(RouteError::GridTooLarge {
                cells,
                limit: self.max_cells,
            });
        }

        let start_cell = ((sx - base.0) as usize, (sy - base.1) as usize);
        let end_cell = ((ex - base.0) as usize, (ey - base.1) as usize);
        let blocked = self.blocked_cells(obstacles, base, cols, rows, [start, end]);
        let taken: Vec<u8> = match keepout {
            Some((occupancy, net)) if !occupancy.is_empty() => (0..cells)
                .map(|i| {
                    let cell = ((i % cols) as i64 + base.0, (i / cols) as i64 + base.1);
                    occupancy.foreign(cell, net)
                })
                .collect(),
            _ => vec![0; cells],
        };

        let states = cells * 4;
        let mut best_cost = vec![u32::MAX; states];
        let mut prev: Vec<Option<GridState>> = vec![None; states];
        let mut heap = BinaryHeap::new();
        let state_index = |s: &GridState| (s.y * cols + s.x) * 4 + s.dir as usize;

        for dir in 0..4u8 {
            let state = GridState {
                x: start_cell.0,
                y: start_cell.1,
                dir,
            };
            best_cost[state_index(&state)] = 0;
            heap.push(GridEntry { est: 0, cost: 0, state });
        }

        let mut end_state = None;
        while let Some(GridEntry { cost, state, .. }) = heap.pop() {
            if cost != best_cost[state_index(&state)] {
                continue;
            }
            if (state.x, state.y) == end_cell {
                end_state = Some(state);
                break;
            }
            // Crossing another net's wire: no turning on it.
            let crossing = (state.x, state.y) != start_cell && taken[state.y * cols + state.x] != 0;
            for (dir, &(dx, dy)) in DIRS.iter().enumerate() {
                if crossing && state.dir != dir as u8 {
                    continue;
                }
                let nx = state.x as i64 + dx;
                let ny = state.y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= cols as i64 || ny >= rows as i64 {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if blocked[ny * cols + nx] {
                    continue;
                }
                if (nx, ny) != end_cell && taken[ny * cols + nx] & axis_of((dx, dy)) != 0 {
                    continue;
                }
                let mut next_cost = cost.saturating_add(1);
                if state.dir != dir as u8 {
                    next_cost = next_cost.saturating_add(self.turn_penalty);
                }
                let next = GridState {
                    x: nx,
                    y: ny,
                    dir: dir as u8,
                };
                let idx = state_index(&next);
                if next_cost >= best_cost[idx] {
                    continue;
                }
                best_cost[idx] = next_cost;
                prev[idx] = Some(state);
                let manhattan = (nx.abs_diff(end_cell.0) + ny.abs_diff(end_cell.1)) as u32;
                heap.push(GridEntry {
                    est: next_cost.saturating_add(manhattan),
                    cost: next_cost,
                    state: next,
                });
            }
        }

        let Some(mut cur) = end_state else {
            log::debug!("router: open set exhausted between {start} and {end}");
            return Err(RouteError::NoPath { from: start, to: end });
        };
        let mut cells_on_path = vec![(cur.x, cur.y)];
        while let Some(p) = prev[state_index(&cur)] {
            cells_on_path.push((p.x, p.y));
            cur = p;
        }
        cells_on_path.reverse();

        let points: Vec<Point> = cells_on_path
            .into_iter()
            .map(|(x, y)| self.point_of(x as i64 + base.0, y as i64 + base.1))
            .collect();
        Ok(compress_path(&points))
    }

    fn cell_of(&self, p: Point) -> (i64, i64) {
        ((p.x / self.pitch).round() as i64, (p.y / self.pitch).round() as i64)
    }

    fn point_of(&self, ix: i64, iy: i64) -> Point {
        Point::new(ix as f64 * self.pitch, iy as f64 * self.pitch)
    }

    fn blocked_cells(
        &self,
        obstacles: &[Rect],
        base: (i64, i64),
        cols: usize,
        rows: usize,
        exempt: [Point; 2],
    ) -> Vec<bool> {
        let mut blocked = vec![false; cols * rows];
        for r in obstacles {
            let x0 = ((r.x / self.pitch).floor() as i64 - base.0).max(0) as usize;
            let y0 = ((r.y / self.pitch).floor() as i64 - base.1).max(0) as usize;
            let x1 = (((r.right() / self.pitch).ceil() as i64 - base.0).max(0) as usize).min(cols - 1);
            let y1 = (((r.bottom() / self.pitch).ceil() as i64 - base.1).max(0) as usize).min(rows - 1);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let p = self.point_of(x as i64 + base.0, y as i64 + base.1);
                    if r.strictly_contains(p) && !exempt.iter().any(|e| e.near(p, 1e-6)) {
                        blocked[y * cols + x] = true;
                    }
                }
            }
        }
        blocked
    }
}

/// Drop interior points that are collinear with both neighbours, and
/// repeated points.
pub fn compress_path(points: &[Point]) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    out.push(points[0]);
    for idx in 1..points.len() - 1 {
        let prev = out[out.len() - 1];
        let curr = points[idx];
        if curr.near(prev, 1e-9) {
            continue;
        }
        let next = points[idx + 1];
        let vertical = (prev.x - curr.x).abs() <= 1e-9 && (next.x - curr.x).abs() <= 1e-9;
        let horizontal = (prev.y - curr.y).abs() <= 1e-9 && (next.y - curr.y).abs() <= 1e-9;
        if vertical || horizontal {
            continue;
        }
        out.push(curr);
    }
    let last = points[points.len() - 1];
    if !last.near(out[out.len() - 1], 1e-9) {
        out.push(last);
    }
    out
}

/// Padded component boxes, built once per generation pass and tied to the
/// netlist epoch they were computed from.
#[derive(Debug, Clone)]
pub struct ObstacleMap {
    epoch: u64,
    padding: f64,
    boxes: Vec<(ComponentId, Rect)>,
}

impl ObstacleMap {
    pub fn build(netlist: &Netlist, symbols: &dyn SymbolSource, padding: f64) -> Self {
        let boxes = netlist
            .components
            .iter()
            .filter(|c| !c.marker)
            .filter_map(|c| {
                let at = netlist.absolute_placement(c.id)?;
                Some((c.id, symbols.bounding_box(&c.symbol, &at).inflate(padding)))
            })
            .collect::<Vec<_>>();
        log::debug!("obstacle cache: {} boxes at epoch {}", boxes.len(), netlist.epoch());
        Self {
            epoch: netlist.epoch(),
            padding,
            boxes,
        }
    }

    /// Whether positions changed since the cache was built.
    pub fn is_stale(&self, netlist: &Netlist) -> bool {
        self.epoch != netlist.epoch()
    }

    /// Rebuild when stale; returns whether a rebuild happened.
    pub fn refresh(&mut self, netlist: &Netlist, symbols: &dyn SymbolSource) -> bool {
        if !self.is_stale(netlist) {
            return false;
        }
        *self = Self::build(netlist, symbols, self.padding);
        true
    }

    pub fn boxes(&self) -> Vec<Rect> {
        self.boxes.iter().map(|(_, r)| *r).collect()
    }

    pub fn get(&self, component: ComponentId) -> Option<&Rect> {
        self.boxes.iter().find(|(c, _)| *c == component).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(&RouterConfig::default())
    }

    fn assert_rectilinear(path: &[Point]) {
        for seg in path.windows(2) {
            assert!(
                (seg[0].x - seg[1].x).abs() < 1e-9 || (seg[0].y - seg[1].y).abs() < 1e-9,
                "diagonal segment {:?}",
                seg
            );
        }
    }

    #[test]
    fn straight_run() {
        let path = router()
            .route(Point::new(0.0, 0.0), Point::new(12.7, 0.0), &[])
            .unwrap();
        assert_eq!(path.len(), 2);
        assert!(path[1].near(Point::new(12.7, 0.0), 1e-9));
    }

    #[test]
    fn single_turn_when_unobstructed() {
        let path = router()
            .route(Point::new(0.0, 0.0), Point::new(5.08, 7.62), &[])
            .unwrap();
        assert_eq!(path.len(), 3);
        assert_rectilinear(&path);
    }

    #[test]
    fn endpoints_are_snapped() {
        let r = router();
        let path = r
            .route(Point::new(0.3, 0.2), Point::new(10.0, 4.9), &[])
            .unwrap();
        assert_eq!(path[0], Point::new(0.0, 0.0));
        let last = path[path.len() - 1];
        assert!(last.near(Point::new(8.0 * 1.27, 4.0 * 1.27), 1e-9));
    }

    #[test]
    fn detours_around_obstacle() {
        let wall = Rect::new(4.0, -10.0, 4.0, 20.0);
        let path = router()
            .route(Point::new(0.0, 0.0), Point::new(12.7, 0.0), &[wall])
            .unwrap();
        assert!(path.len() > 2);
        assert_rectilinear(&path);
        for p in &path {
            assert!(!wall.strictly_contains(*p));
        }
        for seg in path.windows(2) {
            assert!(!wall.crossed_by(seg[0], seg[1]));
        }
    }

    #[test]
    fn enclosed_goal_has_no_path() {
        let end = Point::new(25.4, 0.0);
        let boxed = Rect::centered(end, 10.0, 10.0);
        let err = router().route(Point::new(0.0, 0.0), end, &[boxed]).unwrap_err();
        assert!(matches!(err, RouteError::NoPath { .. }));
    }

    #[test]
    fn off_grid_endpoint_does_not_free_its_snapped_cell() {
        // 10.0 snaps to 10.16, which lies inside the box; 10.0 itself does not.
        let end = Point::new(10.0, 0.0);
        let neighbour = Rect::new(10.05, -5.0, 10.0, 10.0);
        assert!(!neighbour.strictly_contains(end));
        let err = router().route(Point::new(0.0, 0.0), end, &[neighbour]).unwrap_err();
        assert!(matches!(err, RouteError::NoPath { .. }));

        // Exactly on the grid the endpoint keeps its cell open.
        let on_grid = Point::new(8.0 * 1.27, 0.0);
        let path = router().route(Point::new(0.0, 0.0), on_grid, &[neighbour]).unwrap();
        assert!(path[path.len() - 1].near(on_grid, 1e-9));
    }

    #[test]
    fn foreign_wires_are_crossed_never_followed() {
        let (mine, theirs) = (NetId(0), NetId(1));
        let (start, end) = (Point::new(0.0, 0.0), Point::new(12.7, 0.0));

        // A perpendicular run of another net is simply crossed.
        let mut occupancy = Occupancy::new(1.27);
        occupancy.add_segment(theirs, Point::new(5.08, -10.16), Point::new(5.08, 10.16));
        let path = router().route_net(start, end, &[], &occupancy, mine).unwrap();
        assert_eq!(path.len(), 2);
        assert!(path[1].near(end, 1e-9));

        // A collinear run forces a detour that never touches it.
        let (a, b) = (Point::new(2.54, 0.0), Point::new(10.16, 0.0));
        let mut occupancy = Occupancy::new(1.27);
        occupancy.add_segment(theirs, a, b);
        let path = router().route_net(start, end, &[], &occupancy, mine).unwrap();
        assert!(path.len() > 2);
        assert_rectilinear(&path);
        for p in &path {
            assert!(!point_on_segment(*p, a, b, 1e-6), "{p} lies on the other net");
        }
        for seg in path.windows(2) {
            for q in [a, b] {
                assert!(!point_on_segment(q, seg[0], seg[1], 1e-6), "{q} lies on the route");
            }
        }

        // The same run on our own net is reused.
        let path = router().route_net(start, end, &[], &occupancy, theirs).unwrap();
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn segment_ends_block_both_axes() {
        let net = NetId(1);
        let mut occupancy = Occupancy::new(1.27);
        occupancy.add_segment(net, Point::new(0.0, 0.0), Point::new(0.0, 3.81));
        assert_eq!(occupancy.foreign((0, 0), NetId(0)), HORIZONTAL | VERTICAL);
        assert_eq!(occupancy.foreign((0, 1), NetId(0)), VERTICAL);
        assert_eq!(occupancy.foreign((0, 3), NetId(0)), HORIZONTAL | VERTICAL);
        assert_eq!(occupancy.foreign((0, 1), net), 0);
        // Off-grid segments are not tracked.
        occupancy.add_segment(net, Point::new(0.3, 0.0), Point::new(0.3, 5.08));
        assert_eq!(occupancy.foreign((0, 2), NetId(0)), VERTICAL);
    }

    #[test]
    fn oversized_region_is_refused() {
        let config = RouterConfig {
            max_cells: 100,
            ..RouterConfig::default()
        };
        let err = Router::new(&config)
            .route(Point::new(0.0, 0.0), Point::new(100.0, 100.0), &[])
            .unwrap_err();
        assert!(matches!(err, RouteError::GridTooLarge { limit: 100, .. }));
    }

    #[test]
    fn compress_drops_collinear_points() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(2.0, 2.0),
        ];
        assert_eq!(
            compress_path(&pts),
            vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0), Point::new(2.0, 2.0)]
        );
    }
}
