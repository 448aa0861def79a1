//! Immutable snapshot of a finished build.
//!
//! Produced by [`BuildContext::drain`](crate::context::BuildContext::drain)
//! and consumed by the layout stages. Positions are the only thing that may
//! change afterwards; every change bumps [`Netlist::epoch`] so caches keyed
//! on geometry can tell they are stale.

use crate::model::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct Netlist {
    pub name: String,
    pub components: Vec<Component>,
    pub pins: Vec<Pin>,
    pub nets: Vec<Net>,
    pub composables: Vec<Composable>,
    epoch: u64,
}

impl Netlist {
    pub fn new(
        name: String,
        components: Vec<Component>,
        pins: Vec<Pin>,
        nets: Vec<Net>,
        composables: Vec<Composable>,
    ) -> Self {
        Self {
            name,
            components,
            pins,
            nets,
            composables,
            epoch: 0,
        }
    }

    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.0]
    }

    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id.0]
    }

    pub fn net(&self, id: NetId) -> &Net {
        &self.nets[id.0]
    }

    pub fn composable(&self, id: ComposableId) -> &Composable {
        &self.composables[id.0]
    }

    pub fn find_component(&self, reference: &str) -> Option<ComponentId> {
        self.components
            .iter()
            .find(|c| c.reference == reference)
            .map(|c| c.id)
    }

    pub fn find_pin(&self, reference: &str, key: &str) -> Option<PinId> {
        let comp = self.find_component(reference)?;
        self.components[comp.0].pins.get(key)
    }

    /// `REF.KEY` label for messages.
    pub fn pin_label(&self, pin: PinId) -> String {
        let p = self.pin(pin);
        format!("{}.{}", self.component(p.component).reference, p.key)
    }

    /// Display name of a net, falling back to KiCad's auto-naming scheme.
    pub fn net_name(&self, id: NetId) -> String {
        let net = self.net(id);
        if let Some(name) = &net.name {
            return name.clone();
        }
        let first_real = net
            .pins
            .iter()
            .map(|&p| self.pin(p))
            .find(|p| !self.component(p.component).marker);
        match first_real {
            Some(p) if self.is_dnc_net(id) => format!(
                "unconnected-({}-Pad{})",
                self.component(p.component).reference,
                p.key
            ),
            Some(p) => format!("Net-({}-Pad{})", self.component(p.component).reference, p.key),
            None => format!("Net-{}", id.0),
        }
    }

    /// Whether a net carries a Do-Not-Connect marker.
    pub fn is_dnc_net(&self, id: NetId) -> bool {
        self.net(id)
            .pins
            .iter()
            .any(|&p| self.component(self.pin(p).component).marker)
    }

    /// Functional (non-marker) pins of a net in declaration order.
    pub fn functional_pins(&self, id: NetId) -> impl Iterator<Item = PinId> + '_ {
        self.net(id)
            .pins
            .iter()
            .copied()
            .filter(move |&p| !self.component(self.pin(p).component).marker)
    }

    /// Distinct nets touched by a component's pins.
    pub fn connected_net_count(&self, id: ComponentId) -> usize {
        self.component(id)
            .pins
            .iter()
            .filter_map(|p| self.pin(p).net)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Whether any pin of the component is on a net.
    pub fn is_electrical(&self, id: ComponentId) -> bool {
        self.component(id)
            .pins
            .iter()
            .any(|p| self.pin(p).net.is_some())
    }

    /// Ancestor composables, innermost first.
    pub fn ancestors(&self, parent: Option<ComposableId>) -> Vec<ComposableId> {
        let mut chain = Vec::new();
        let mut cur = parent;
        while let Some(id) = cur {
            if chain.contains(&id) {
                break;
            }
            chain.push(id);
            cur = self.composable(id).parent;
        }
        chain
    }

    /// Absolute frame of a composable. Unplaced composables sit at their
    /// parent's origin.
    pub fn composable_frame(&self, id: ComposableId) -> Placement {
        let mut frame = Placement::default();
        for anc in self.ancestors(Some(id)).into_iter().rev() {
            let local = self.composable(anc).position.unwrap_or_default();
            frame = frame.compose(&local);
        }
        frame
    }

    /// Frame a component's local position is expressed in.
    pub fn parent_frame(&self, id: ComponentId) -> Placement {
        match self.component(id).parent {
            Some(parent) => self.composable_frame(parent),
            None => Placement::default(),
        }
    }

    /// Absolute position and rotation, or `None` while unplaced.
    ///
    /// Rotation composes additively up the containment chain; each local
    /// offset is rotated by the parent's accumulated rotation.
    pub fn absolute_placement(&self, id: ComponentId) -> Option<Placement> {
        let local = self.component(id).position?;
        Some(self.parent_frame(id).compose(&local))
    }

    pub fn set_position(&mut self, id: ComponentId, placement: Placement) {
        self.components[id.0].position = Some(placement);
        self.epoch += 1;
    }

    pub fn set_composable_position(&mut self, id: ComposableId, placement: Placement) {
        self.composables[id.0].position = Some(placement);
        self.epoch += 1;
    }

    /// Monotonic counter bumped by every position change.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
