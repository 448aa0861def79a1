//! Connectivity graph used to weigh placement decisions.
//!
//! Components are nodes; two components are adjacent when they share a net
//! that actually connects something (two or more functional pins). The
//! weight between two groups of components is the number of such nets they
//! have in common.

use netweave::model::{ComponentId, NetId};
use netweave::Netlist;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct ConnectionGraph {
    /// Connecting nets per component index.
    nets_of: Vec<BTreeSet<NetId>>,
    /// Functional member components per net index.
    members: Vec<BTreeSet<ComponentId>>,
}

impl ConnectionGraph {
    /// Build the graph from a drained netlist. Do-Not-Connect markers and
    /// single-pin nets never create adjacency.
    pub fn from_netlist(netlist: &Netlist) -> Self {
        let mut nets_of = vec![BTreeSet::new(); netlist.components.len()];
        let mut members = vec![BTreeSet::new(); netlist.nets.len()];
        for net in &netlist.nets {
            let pins: Vec<_> = netlist.functional_pins(net.id).collect();
            if pins.len() < 2 {
                continue;
            }
            for pin in pins {
                let owner = netlist.pin(pin).component;
                nets_of[owner.0].insert(net.id);
                members[net.id.0].insert(owner);
            }
        }
        Self { nets_of, members }
    }

    /// Connecting nets touched by `component`.
    pub fn nets_of(&self, component: ComponentId) -> &BTreeSet<NetId> {
        &self.nets_of[component.0]
    }

    /// Components sharing at least one connecting net with `component`.
    pub fn neighbors(&self, component: ComponentId) -> BTreeSet<ComponentId> {
        let mut out = BTreeSet::new();
        for net in self.nets_of(component) {
            out.extend(self.members[net.0].iter().copied());
        }
        out.remove(&component);
        out
    }

    /// Union of the connecting nets of a set of components.
    pub fn nets_of_group(&self, components: &[ComponentId]) -> BTreeSet<NetId> {
        components
            .iter()
            .flat_map(|&c| self.nets_of(c).iter().copied())
            .collect()
    }

    /// Symmetric matrix of shared-net counts between groups; the diagonal
    /// is zero.
    pub fn weight_matrix(groups: &[BTreeSet<NetId>]) -> Vec<Vec<f64>> {
        let n = groups.len();
        let mut w = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let shared = groups[i].intersection(&groups[j]).count() as f64;
                w[i][j] = shared;
                w[j][i] = shared;
            }
        }
        w
    }
}
