//! Cluster tree construction.
//!
//! Placement works on a tree that mirrors the containment hierarchy:
//! composables become clusters, components become leaves, and each `group`
//! tag adds one synthetic cluster level under the component's parent. Nodes
//! live in a flat arena and refer to each other by index.

use crate::types::{Point, Rect};
use netweave::model::{ComponentId, ComposableId};
use netweave::Netlist;
use std::collections::HashMap;

pub type NodeId = usize;

/// What a cluster stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterKind {
    Root,
    Composable(ComposableId),
    /// Synthetic level for a `group` tag.
    Group(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Leaf(ComponentId),
    Cluster(ClusterKind),
}

#[derive(Debug, Clone)]
pub struct ClusterNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Origin of this node in its parent cluster's frame.
    pub offset: Point,
    pub rotation: f64,
    /// Extent around the node's own origin at zero rotation, corridor
    /// padding included.
    pub bounds: Rect,
    /// Routing-corridor padding already folded into `bounds`.
    pub corridor: f64,
    /// Position supplied by the author; layout must not move it.
    pub fixed: bool,
}

impl ClusterNode {
    fn new(kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            offset: Point::default(),
            rotation: 0.0,
            bounds: Rect::default(),
            corridor: 0.0,
            fixed: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }
}

#[derive(Debug, Clone)]
pub struct ClusterTree {
    pub nodes: Vec<ClusterNode>,
    pub root: NodeId,
}

impl ClusterTree {
    /// Build the tree for `members` (components taking part in clustered
    /// placement).
    pub fn build(netlist: &Netlist, members: &[ComponentId]) -> Self {
        let mut tree = Self {
            nodes: vec![ClusterNode::new(NodeKind::Cluster(ClusterKind::Root), None)],
            root: 0,
        };

        // Composables are registered parents-first, so a single pass sees
        // every parent before its children.
        let mut composable_node: HashMap<ComposableId, NodeId> = HashMap::new();
        for comp in &netlist.composables {
            let parent = comp
                .parent
                .and_then(|p| composable_node.get(&p).copied())
                .unwrap_or(tree.root);
            let id = tree.push(NodeKind::Cluster(ClusterKind::Composable(comp.id)), parent);
            if let Some(at) = comp.position {
                let node = &mut tree.nodes[id];
                node.offset = Point::new(at.x, at.y);
                node.rotation = at.rotation;
                node.fixed = comp.fixed;
            }
            composable_node.insert(comp.id, id);
        }

        let mut group_node: HashMap<(NodeId, String), NodeId> = HashMap::new();
        for &cid in members {
            let comp = netlist.component(cid);
            let mut parent = comp
                .parent
                .and_then(|p| composable_node.get(&p).copied())
                .unwrap_or(tree.root);
            if let Some(group) = &comp.group {
                parent = match group_node.get(&(parent, group.clone())) {
                    Some(&id) => id,
                    None => {
                        let id = tree.push(NodeKind::Cluster(ClusterKind::Group(group.clone())), parent);
                        group_node.insert((parent, group.clone()), id);
                        id
                    }
                };
            }
            let leaf = tree.push(NodeKind::Leaf(cid), parent);
            if let Some(at) = comp.position {
                let node = &mut tree.nodes[leaf];
                node.offset = Point::new(at.x, at.y);
                node.rotation = at.rotation;
                node.fixed = comp.fixed;
            }
        }

        // A group level has no frame of its own: it sits at its parent's
        // origin whenever a member is pinned there.
        for id in group_node.into_values() {
            if tree.nodes[id].children.iter().any(|&c| tree.nodes[c].fixed) {
                tree.nodes[id].fixed = true;
            }
        }
        tree
    }

    fn push(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(ClusterNode::new(kind, Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &ClusterNode {
        &self.nodes[id]
    }

    /// Every node, children before their parent.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    /// Leaf components below `id`, in tree order.
    pub fn leaves(&self, id: NodeId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            match &self.nodes[n].kind {
                NodeKind::Leaf(c) => out.push(*c),
                NodeKind::Cluster(_) => stack.extend(self.nodes[n].children.iter().rev()),
            }
        }
        out
    }

    /// Bounding box of a node in its parent's frame.
    pub fn footprint(&self, id: NodeId) -> Rect {
        let node = &self.nodes[id];
        crate::symbols::place_bounds(
            &node.bounds,
            &netweave::Placement::new(node.offset.x, node.offset.y, node.rotation),
        )
    }

    /// Human-readable name for log and error messages.
    pub fn label(&self, netlist: &Netlist, id: NodeId) -> String {
        match &self.nodes[id].kind {
            NodeKind::Leaf(c) => netlist.component(*c).reference.clone(),
            NodeKind::Cluster(ClusterKind::Root) => "<root>".into(),
            NodeKind::Cluster(ClusterKind::Composable(c)) => netlist.composable(*c).name.clone(),
            NodeKind::Cluster(ClusterKind::Group(g)) => format!("group {g}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netweave::context::BuildContext;
    use netweave::model::{ComponentSpec, Placement};

    #[test]
    fn mirrors_containment_and_groups() {
        let mut ctx = BuildContext::new("t");
        let amp = ctx.add_composable("amp", None, None).unwrap();
        let r1 = ctx
            .add_component(ComponentSpec::new("Device:R", "R1").parent(amp).group("bias"))
            .unwrap();
        let r2 = ctx
            .add_component(ComponentSpec::new("Device:R", "R2").parent(amp).group("bias"))
            .unwrap();
        let c1 = ctx
            .add_component(ComponentSpec::new("Device:C", "C1").parent(amp))
            .unwrap();
        let j1 = ctx
            .add_component(ComponentSpec::new("Connector:Conn_01x02", "J1").at(Placement::at(0.0, 0.0)))
            .unwrap();
        let netlist = ctx.drain();
        let tree = ClusterTree::build(&netlist, &[r1, r2, c1, j1]);

        let root = tree.node(tree.root);
        assert_eq!(root.children.len(), 2); // amp, J1
        let amp_node = root.children[0];
        assert_eq!(
            tree.node(amp_node).kind,
            NodeKind::Cluster(ClusterKind::Composable(amp))
        );
        // bias group + C1
        assert_eq!(tree.node(amp_node).children.len(), 2);
        assert_eq!(tree.leaves(amp_node), vec![r1, r2, c1]);
        assert!(tree.node(root.children[1]).fixed);

        let order = tree.post_order();
        assert_eq!(order.last(), Some(&tree.root));
        let pos = |id: NodeId| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(amp_node) > pos(tree.node(amp_node).children[0]));
    }
}
