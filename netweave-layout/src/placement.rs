//! Hierarchical placement.
//!
//! Places every component of a drained [`Netlist`] by laying out the
//! containment hierarchy bottom-up and then resolving positions top-down:
//!
//! 1. Components with at least one connected pin take part in clustered
//!    placement; the rest are mechanical parts, flowed in rows below the
//!    electrical block once it is finished. Do-Not-Connect markers are
//!    never placed.
//! 2. Each leaf gets its symbol box plus a routing corridor that grows with
//!    the number of nets the component touches.
//! 3. Each cluster arranges its children (grid or force strategy). Fixed
//!    children are never moved except to separate overlapping fixed
//!    siblings, which scales all fixed positions of the cluster uniformly.
//! 4. Absolute positions are converted back into each component's
//!    parent-relative local position.

use crate::config::{PlacementConfig, PlacementStrategy};
use crate::force::force_layout;
use crate::graph::ConnectionGraph;
use crate::groups::{ClusterKind, ClusterTree, NodeId, NodeKind};
use crate::layering::{connectivity_order, grid_layout};
use crate::optimize::{separate_fixed, PlacementError, ScaleFailure};
use crate::symbols::{place_bounds, SymbolSource};
use crate::types::*;
use netweave::model::{ComponentId, Placement};
use netweave::Netlist;

/// Outcome of [`place`].
#[derive(Debug, Clone, Default)]
pub struct PlacementReport {
    /// Components placed through the cluster tree.
    pub electrical: usize,
    /// Components flowed below the electrical block.
    pub mechanical: usize,
    /// `[placement]` messages for fixed overlaps that could not be resolved.
    pub errors: Vec<String>,
}

/// Place every component of `netlist` in place.
pub fn place(netlist: &mut Netlist, symbols: &dyn SymbolSource, config: &PlacementConfig) -> PlacementReport {
    let mut electrical = Vec::new();
    let mut mechanical = Vec::new();
    for comp in &netlist.components {
        if comp.marker {
            continue;
        }
        if netlist.is_electrical(comp.id) {
            electrical.push(comp.id);
        } else {
            mechanical.push(comp.id);
        }
    }

    let graph = ConnectionGraph::from_netlist(netlist);
    let mut tree = ClusterTree::build(netlist, &electrical);
    let mut moved = vec![false; tree.nodes.len()];
    let mut report = PlacementReport {
        electrical: electrical.len(),
        mechanical: mechanical.len(),
        errors: Vec::new(),
    };

    let order = tree.post_order();
    for &id in &order {
        match tree.nodes[id].kind {
            NodeKind::Leaf(c) => {
                let corridor = (config.corridor_per_net * netlist.connected_net_count(c) as f64)
                    .min(config.max_corridor);
                let bounds = symbols
                    .local_bounds(&netlist.component(c).symbol)
                    .inflate(corridor);
                let node = &mut tree.nodes[id];
                node.corridor = corridor;
                node.bounds = bounds;
            }
            NodeKind::Cluster(_) => {
                layout_cluster(&mut tree, id, netlist, &graph, config, &mut moved, &mut report.errors)
            }
        }
    }

    // Top-down: absolute frame of every node.
    let mut frames = vec![Placement::default(); tree.nodes.len()];
    for &id in order.iter().rev() {
        let node = &tree.nodes[id];
        if let Some(parent) = node.parent {
            frames[id] = frames[parent].compose(&Placement::new(node.offset.x, node.offset.y, node.rotation));
        }
    }

    // Composables first (they are stored parents-first), so that component
    // frames below read the updated positions.
    for (id, node) in tree.nodes.iter().enumerate() {
        if let NodeKind::Cluster(ClusterKind::Composable(cid)) = node.kind {
            if node.fixed && !moved[id] {
                continue;
            }
            let parent_frame = match netlist.composable(cid).parent {
                Some(p) => netlist.composable_frame(p),
                None => Placement::default(),
            };
            netlist.set_composable_position(cid, parent_frame.localize(&frames[id]));
        }
    }

    for (id, node) in tree.nodes.iter().enumerate() {
        let NodeKind::Leaf(c) = node.kind else {
            continue;
        };
        let group_moved = node
            .parent
            .map(|p| matches!(tree.nodes[p].kind, NodeKind::Cluster(ClusterKind::Group(_))) && moved[p])
            .unwrap_or(false);
        if node.fixed && !moved[id] && !group_moved {
            continue;
        }
        let mut abs = frames[id];
        if !node.fixed {
            abs.x = snap(abs.x, config.grid_snap);
            abs.y = snap(abs.y, config.grid_snap);
        }
        let local = netlist.parent_frame(c).localize(&abs);
        netlist.set_position(c, local);
    }

    place_mechanical(netlist, symbols, config, &electrical, &mechanical);

    log::info!(
        "placed {} electrical and {} mechanical components ({} clusters)",
        report.electrical,
        report.mechanical,
        tree.nodes.iter().filter(|n| !n.is_leaf()).count()
    );
    report
}

/// Box of a node relative to its own origin, with its rotation applied.
fn local_footprint(tree: &ClusterTree, id: NodeId) -> Rect {
    let node = tree.node(id);
    place_bounds(&node.bounds, &Placement::new(0.0, 0.0, node.rotation))
}

fn layout_cluster(
    tree: &mut ClusterTree,
    id: NodeId,
    netlist: &Netlist,
    graph: &ConnectionGraph,
    config: &PlacementConfig,
    moved: &mut [bool],
    errors: &mut Vec<String>,
) {
    let children = tree.nodes[id].children.clone();
    let n = children.len();

    if n == 1 {
        let child = children[0];
        if !tree.nodes[child].fixed {
            tree.nodes[child].offset = Point::default();
        }
    } else if n > 1 {
        let local: Vec<Rect> = children.iter().map(|&c| local_footprint(tree, c)).collect();
        let fixed: Vec<bool> = children.iter().map(|&c| tree.nodes[c].fixed).collect();
        let groups: Vec<_> = children
            .iter()
            .map(|&c| graph.nets_of_group(&tree.leaves(c)))
            .collect();
        let weights = ConnectionGraph::weight_matrix(&groups);

        log::debug!(
            "cluster {}: {} children, {} fixed",
            tree.label(netlist, id),
            n,
            fixed.iter().filter(|&&f| f).count()
        );

        separate_fixed_children(tree, id, &children, &local, &fixed, netlist, config, moved, errors);

        match config.strategy {
            PlacementStrategy::Grid => grid_children(tree, &children, &local, &fixed, &weights, config),
            PlacementStrategy::Force => {
                let origins: Vec<Point> = children.iter().map(|&c| tree.nodes[c].offset).collect();
                let out = force_layout(&local, &origins, &fixed, &weights, config);
                for (i, &c) in children.iter().enumerate() {
                    if !fixed[i] {
                        tree.nodes[c].offset = out[i];
                    }
                }
            }
        }
    }

    tree.nodes[id].bounds = children
        .iter()
        .map(|&c| tree.footprint(c))
        .reduce(|a, b| a.union(&b))
        .unwrap_or_default();
}

#[allow(clippy::too_many_arguments)]
fn separate_fixed_children(
    tree: &mut ClusterTree,
    id: NodeId,
    children: &[NodeId],
    local: &[Rect],
    fixed: &[bool],
    netlist: &Netlist,
    config: &PlacementConfig,
    moved: &mut [bool],
    errors: &mut Vec<String>,
) {
    let idx: Vec<usize> = (0..children.len()).filter(|&i| fixed[i]).collect();
    if idx.len() < 2 {
        return;
    }
    let mut origins: Vec<Point> = idx.iter().map(|&i| tree.nodes[children[i]].offset).collect();
    let boxes: Vec<Rect> = idx.iter().map(|&i| local[i]).collect();

    match separate_fixed(&mut origins, &boxes, config.max_fixed_scale) {
        Ok(scale) if scale > 1.0 => {
            log::info!("scaled fixed positions in {} by {:.3}", tree.label(netlist, id), scale);
            for (k, &i) in idx.iter().enumerate() {
                let c = children[i];
                tree.nodes[c].offset = origins[k];
                moved[c] = true;
            }
        }
        Ok(_) => {}
        Err(failure) => {
            let err = match failure {
                ScaleFailure::Coincident(a, b) => PlacementError::Coincident {
                    first: tree.label(netlist, children[idx[a]]),
                    second: tree.label(netlist, children[idx[b]]),
                },
                ScaleFailure::TooLarge(scale) => PlacementError::ScaleTooLarge {
                    cluster: tree.label(netlist, id),
                    scale,
                    limit: config.max_fixed_scale,
                },
            };
            log::warn!("{err}");
            errors.push(format!("[placement] {err}"));
        }
    }
}

/// Grid strategy: free children fill a grid to the right of the fixed ones.
fn grid_children(
    tree: &mut ClusterTree,
    children: &[NodeId],
    local: &[Rect],
    fixed: &[bool],
    weights: &[Vec<f64>],
    config: &PlacementConfig,
) {
    let free: Vec<usize> = (0..children.len()).filter(|&i| !fixed[i]).collect();
    if free.is_empty() {
        return;
    }
    let sub: Vec<Vec<f64>> = free
        .iter()
        .map(|&i| free.iter().map(|&j| weights[i][j]).collect())
        .collect();
    let order = connectivity_order(&sub);
    let boxes: Vec<Rect> = free.iter().map(|&i| local[i]).collect();
    let origins = grid_layout(&boxes, &order, config.spacing);

    let anchor = children
        .iter()
        .zip(fixed)
        .filter(|(_, f)| **f)
        .map(|(&c, _)| tree.footprint(c))
        .reduce(|a, b| a.union(&b))
        .map(|r| Point::new(r.right() + config.spacing, r.y))
        .unwrap_or_default();

    for (k, &i) in free.iter().enumerate() {
        tree.nodes[children[i]].offset = origins[k].offset(anchor.x, anchor.y);
    }
}

/// Row-major flow of unplaced mechanical parts below-left of the electrical
/// block.
fn place_mechanical(
    netlist: &mut Netlist,
    symbols: &dyn SymbolSource,
    config: &PlacementConfig,
    electrical: &[ComponentId],
    mechanical: &[ComponentId],
) {
    let pending: Vec<ComponentId> = mechanical
        .iter()
        .copied()
        .filter(|&c| !netlist.component(c).fixed)
        .collect();
    if pending.is_empty() {
        return;
    }

    let block = electrical
        .iter()
        .filter_map(|&c| {
            let at = netlist.absolute_placement(c)?;
            Some(symbols.bounding_box(&netlist.component(c).symbol, &at))
        })
        .reduce(|a, b| a.union(&b));
    let anchor = block
        .map(|r| Point::new(r.x, r.bottom() + config.spacing))
        .unwrap_or_default();

    let boxes: Vec<Rect> = pending
        .iter()
        .map(|&c| symbols.local_bounds(&netlist.component(c).symbol))
        .collect();
    let order: Vec<usize> = (0..pending.len()).collect();
    let origins = grid_layout(&boxes, &order, config.spacing);

    for (&c, origin) in pending.iter().zip(origins) {
        let abs = snap_point(origin.offset(anchor.x, anchor.y), config.grid_snap);
        let local = netlist.parent_frame(c).localize(&Placement::at(abs.x, abs.y));
        netlist.set_position(c, local);
        log::debug!("mechanical {} at ({:.2}, {:.2})", netlist.component(c).reference, abs.x, abs.y);
    }
}
