//! Build-scoped registry and connection bookkeeping.
//!
//! A [`BuildContext`] is handed to every constructor. It owns the arenas for
//! components, pins, nets and composables, enforces the Do-Not-Connect rules
//! on every tie, and is drained into an immutable [`Netlist`] once the circuit
//! description is complete. Each build owns its own context, so concurrent
//! builds never share state.

use crate::error::ConnectError;
use crate::model::*;
use crate::netlist::Netlist;
use crate::PinResolver;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Symbol id given to Do-Not-Connect marker parts.
pub const NO_CONNECT_SYMBOL: &str = "netweave:NoConnect";

/// The other side of a [`BuildContext::tie`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tie {
    Pin(PinId),
    Net(NetId),
}

impl From<PinId> for Tie {
    fn from(pin: PinId) -> Self {
        Tie::Pin(pin)
    }
}

impl From<NetId> for Tie {
    fn from(net: NetId) -> Self {
        Tie::Net(net)
    }
}

/// Shared pin-key canonicalizer.
#[derive(Clone)]
struct Resolver(Arc<dyn PinResolver + Send + Sync>);

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolver")
    }
}

/// Registry for one schematic build.
#[derive(Debug, Default)]
pub struct BuildContext {
    name: String,
    resolver: Option<Resolver>,
    components: Vec<Component>,
    pins: Vec<Pin>,
    /// Retired (merged-away) nets leave a `None` behind so ids stay stable.
    nets: Vec<Option<Net>>,
    composables: Vec<Composable>,
}

impl BuildContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Reset the registry for a fresh build.
    pub fn start(&mut self) {
        self.components.clear();
        self.pins.clear();
        self.nets.clear();
        self.composables.clear();
    }

    /// Move everything registered so far into a [`Netlist`], leaving the
    /// context empty. Retired nets are dropped and net ids compacted.
    pub fn drain(&mut self) -> Netlist {
        let mut remap: Vec<Option<NetId>> = vec![None; self.nets.len()];
        let mut nets = Vec::new();
        for (old, slot) in self.nets.drain(..).enumerate() {
            if let Some(mut net) = slot {
                let id = NetId(nets.len());
                remap[old] = Some(id);
                net.id = id;
                nets.push(net);
            }
        }

        let mut pins = std::mem::take(&mut self.pins);
        for pin in &mut pins {
            pin.net = pin.net.and_then(|n| remap[n.0]);
        }

        let mut composables = std::mem::take(&mut self.composables);
        for comp in &mut composables {
            comp.ports = std::mem::take(&mut comp.ports)
                .into_iter()
                .filter_map(|(name, net)| remap[net.0].map(|n| (name, n)))
                .collect();
            if let Some(iface) = comp.interface.as_mut() {
                iface.ports.retain_mut(|(_, net)| match remap[net.0] {
                    Some(n) => {
                        *net = n;
                        true
                    }
                    None => false,
                });
                iface.bridged = iface.bridged.iter().filter_map(|n| remap[n.0]).collect();
            }
        }

        let netlist = Netlist::new(
            self.name.clone(),
            std::mem::take(&mut self.components),
            pins,
            nets,
            composables,
        );
        log::debug!(
            "drained build {:?}: {} components, {} nets",
            self.name,
            netlist.components.len(),
            netlist.nets.len()
        );
        self.start();
        netlist
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    pub fn add_component(&mut self, spec: ComponentSpec) -> Result<ComponentId, ConnectError> {
        if let Some(parent) = spec.parent {
            self.composable_ref(parent)?;
        }
        let id = ComponentId(self.components.len());
        let fixed = spec.position.is_some();
        self.components.push(Component {
            id,
            symbol: spec.symbol,
            reference: spec.reference,
            value: spec.value,
            footprint: spec.footprint,
            position: spec.position,
            fixed,
            parent: spec.parent,
            group: spec.group,
            marker: false,
            pins: PinAccessor::default(),
        });
        if let Some(parent) = spec.parent {
            self.composables[parent.0].children.push(Child::Component(id));
        }
        Ok(id)
    }

    pub fn add_composable(
        &mut self,
        name: impl Into<String>,
        parent: Option<ComposableId>,
        position: Option<Placement>,
    ) -> Result<ComposableId, ConnectError> {
        if let Some(parent) = parent {
            self.composable_ref(parent)?;
        }
        let id = ComposableId(self.composables.len());
        self.composables.push(Composable {
            id,
            name: name.into(),
            position,
            fixed: position.is_some(),
            parent,
            children: Vec::new(),
            ports: BTreeMap::new(),
            interface: None,
        });
        if let Some(parent) = parent {
            self.composables[parent.0].children.push(Child::Composable(id));
        }
        Ok(id)
    }

    pub fn add_net(&mut self, name: Option<&str>) -> NetId {
        let id = NetId(self.nets.len());
        self.nets.push(Some(Net {
            id,
            name: name.map(str::to_string),
            pins: Vec::new(),
            power: false,
        }));
        id
    }

    /// Flag a net as power-class regardless of its name.
    pub fn set_power(&mut self, net: NetId, power: bool) -> Result<(), ConnectError> {
        self.live_net_mut(net)?.power = power;
        Ok(())
    }

    /// Canonicalize every pin key through `resolver` (number before name),
    /// the same way circuit files are.
    pub fn set_pin_resolver(&mut self, resolver: Arc<dyn PinResolver + Send + Sync>) {
        self.resolver = Some(Resolver(resolver));
    }

    /// Look up (creating on first access) the pin `key` of `component`.
    pub fn pin(&mut self, component: ComponentId, key: &str) -> Result<PinId, ConnectError> {
        let next = PinId(self.pins.len());
        let comp = self
            .components
            .get_mut(component.0)
            .ok_or(ConnectError::UnknownComponent(component.0))?;
        let canonical = self
            .resolver
            .as_ref()
            .and_then(|r| r.0.pin_number(&comp.symbol, key));
        let key = canonical.as_deref().unwrap_or(key);
        let id = comp.pins.get_or_insert_with(key, || next);
        if id == next {
            self.pins.push(Pin {
                id,
                component,
                key: key.to_string(),
                net: None,
                dnc: false,
            });
        }
        Ok(id)
    }

    /// Assign to a component pin: the write is a [`tie`](Self::tie) in
    /// disguise, never a raw field update.
    pub fn connect(
        &mut self,
        component: ComponentId,
        key: &str,
        target: impl Into<Tie>,
    ) -> Result<NetId, ConnectError> {
        let pin = self.pin(component, key)?;
        match target.into() {
            Tie::Net(net) => {
                self.tie(net, Tie::Pin(pin))?;
                Ok(net)
            }
            Tie::Pin(other) => self.tie_pins(pin, other),
        }
    }

    // -----------------------------------------------------------------------
    // Ties
    // -----------------------------------------------------------------------

    /// Add a pin to `net`, or merge another net into it.
    ///
    /// Idempotent when the pin is already on `net`. Every Do-Not-Connect
    /// check runs before any state changes.
    pub fn tie(&mut self, net: NetId, target: Tie) -> Result<(), ConnectError> {
        self.live_net(net)?;
        match target {
            Tie::Pin(pin) => {
                let p = self.pin_ref(pin)?;
                if p.net == Some(net) {
                    return Ok(());
                }
                if p.dnc {
                    return Err(ConnectError::AlreadyDnc {
                        pin: self.pin_label(pin),
                    });
                }
                if let Some(other) = p.net {
                    return self.merge(net, other);
                }
                let mut members = self.live_net(net)?.pins.clone();
                members.push(pin);
                self.check_dnc_invariant(net, &members)?;
                self.pins[pin.0].net = Some(net);
                self.live_net_mut(net)?.pins.push(pin);
                Ok(())
            }
            Tie::Net(other) => self.merge(net, other),
        }
    }

    /// Tie two pins together, creating an implicit net when neither is
    /// connected yet. Returns the net both end up on.
    pub fn tie_pins(&mut self, a: PinId, b: PinId) -> Result<NetId, ConnectError> {
        let (na, nb) = (self.pin_ref(a)?.net, self.pin_ref(b)?.net);
        for pin in [a, b] {
            if self.pins[pin.0].dnc {
                return Err(ConnectError::AlreadyDnc {
                    pin: self.pin_label(pin),
                });
            }
        }
        match (na, nb) {
            (Some(net), _) => {
                self.tie(net, Tie::Pin(b))?;
                Ok(net)
            }
            (None, Some(net)) => {
                self.tie(net, Tie::Pin(a))?;
                Ok(net)
            }
            (None, None) => {
                let net = self.add_net(None);
                self.tie(net, Tie::Pin(a))?;
                self.tie(net, Tie::Pin(b))?;
                Ok(net)
            }
        }
    }

    /// Mark a pin as intentionally unconnected.
    ///
    /// A single-pin marker part is created and tied to the pin; afterwards the
    /// pin refuses every further tie. Returns the marker component.
    pub fn dnc(&mut self, pin: PinId, reason: Option<&str>) -> Result<ComponentId, ConnectError> {
        let p = self.pin_ref(pin)?.clone();
        if p.dnc {
            return Err(ConnectError::AlreadyDnc {
                pin: self.pin_label(pin),
            });
        }
        let owner = self.components[p.component.0].reference.clone();
        let mut spec = ComponentSpec::new(NO_CONNECT_SYMBOL, format!("{owner}_{}_nc", p.key));
        spec.value = reason.map(str::to_string);
        let marker = self.add_component(spec)?;
        self.components[marker.0].marker = true;
        let marker_pin = self.pin(marker, "1")?;

        let rollback = |ctx: &mut Self| {
            ctx.components.pop();
            ctx.pins.pop();
        };
        let result = match p.net {
            Some(net) => self.tie(net, Tie::Pin(marker_pin)),
            None => self.tie_pins(pin, marker_pin).map(|_| ()),
        };
        if let Err(e) = result {
            rollback(self);
            return Err(e);
        }
        self.pins[pin.0].dnc = true;
        log::debug!("{} marked Do-Not-Connect", self.pin_label(pin));
        Ok(marker)
    }

    /// Expose `net` as a named port of `composable`.
    pub fn expose(
        &mut self,
        composable: ComposableId,
        name: impl Into<String>,
        net: NetId,
    ) -> Result<(), ConnectError> {
        self.live_net(net)?;
        self.composable_ref(composable)?;
        self.composables[composable.0].ports.insert(name.into(), net);
        Ok(())
    }

    /// Interface of a composable: computed on first request, then cached.
    pub fn interface(&mut self, composable: ComposableId) -> Result<&Interface, ConnectError> {
        self.composable_ref(composable)?;
        if self.composables[composable.0].interface.is_none() {
            let iface = self.compute_interface(composable);
            self.composables[composable.0].interface = Some(iface);
        }
        Ok(self.composables[composable.0]
            .interface
            .get_or_insert_with(Interface::default))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn net_of(&self, pin: PinId) -> Option<NetId> {
        self.pins.get(pin.0).and_then(|p| p.net)
    }

    pub fn net(&self, net: NetId) -> Result<&Net, ConnectError> {
        self.live_net(net)
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0)
    }

    pub fn component_pin(&self, pin: PinId) -> Option<&Pin> {
        self.pins.get(pin.0)
    }

    pub fn find_component(&self, reference: &str) -> Option<ComponentId> {
        self.components
            .iter()
            .find(|c| c.reference == reference)
            .map(|c| c.id)
    }

    /// Number of live (not merged-away) nets.
    pub fn live_net_count(&self) -> usize {
        self.nets.iter().filter(|n| n.is_some()).count()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn merge(&mut self, into: NetId, from: NetId) -> Result<(), ConnectError> {
        if into == from {
            return Ok(());
        }
        let mut members = self.live_net(into)?.pins.clone();
        members.extend(self.live_net(from)?.pins.iter().copied());
        self.check_dnc_invariant(into, &members)?;

        let retired = self.nets[from.0].take().ok_or(ConnectError::RetiredNet(from.0))?;
        for &pin in &retired.pins {
            self.pins[pin.0].net = Some(into);
        }
        let target = self.live_net_mut(into)?;
        target.power |= retired.power;
        if target.name.is_none() {
            target.name = retired.name;
        }
        target.pins.extend(retired.pins);
        Ok(())
    }

    fn check_dnc_invariant(&self, net: NetId, members: &[PinId]) -> Result<(), ConnectError> {
        let mut markers = 0;
        let mut functional = 0;
        for &pin in members {
            if self.components[self.pins[pin.0].component.0].marker {
                markers += 1;
            } else {
                functional += 1;
            }
        }
        if markers > 0 && functional > 1 {
            return Err(ConnectError::DncConflict {
                net: self.net_label(net),
            });
        }
        Ok(())
    }

    fn compute_interface(&self, composable: ComposableId) -> Interface {
        let mut inside: HashSet<ComponentId> = HashSet::new();
        let mut stack = vec![composable];
        while let Some(c) = stack.pop() {
            for child in &self.composables[c.0].children {
                match *child {
                    Child::Component(id) => {
                        inside.insert(id);
                    }
                    Child::Composable(id) => stack.push(id),
                }
            }
        }

        let mut bridged = Vec::new();
        for net in self.nets.iter().flatten() {
            let mut has_inside = false;
            let mut has_outside = false;
            for &pin in &net.pins {
                let owner = &self.components[self.pins[pin.0].component.0];
                if owner.marker {
                    continue;
                }
                if inside.contains(&owner.id) {
                    has_inside = true;
                } else {
                    has_outside = true;
                }
            }
            if has_inside && has_outside {
                bridged.push(net.id);
            }
        }

        Interface {
            ports: self.composables[composable.0]
                .ports
                .iter()
                .map(|(name, net)| (name.clone(), *net))
                .collect(),
            bridged,
        }
    }

    fn live_net(&self, net: NetId) -> Result<&Net, ConnectError> {
        match self.nets.get(net.0) {
            Some(Some(n)) => Ok(n),
            Some(None) => Err(ConnectError::RetiredNet(net.0)),
            None => Err(ConnectError::UnknownNet(net.0)),
        }
    }

    fn live_net_mut(&mut self, net: NetId) -> Result<&mut Net, ConnectError> {
        match self.nets.get_mut(net.0) {
            Some(Some(n)) => Ok(n),
            Some(None) => Err(ConnectError::RetiredNet(net.0)),
            None => Err(ConnectError::UnknownNet(net.0)),
        }
    }

    fn pin_ref(&self, pin: PinId) -> Result<&Pin, ConnectError> {
        self.pins.get(pin.0).ok_or(ConnectError::UnknownPin(pin.0))
    }

    fn composable_ref(&self, id: ComposableId) -> Result<&Composable, ConnectError> {
        self.composables
            .get(id.0)
            .ok_or(ConnectError::UnknownComposable(id.0))
    }

    fn pin_label(&self, pin: PinId) -> String {
        let p = &self.pins[pin.0];
        format!("{}.{}", self.components[p.component.0].reference, p.key)
    }

    fn net_label(&self, net: NetId) -> String {
        match self.nets.get(net.0) {
            Some(Some(Net { name: Some(name), .. })) => name.clone(),
            _ => format!("#{}", net.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_resistors(ctx: &mut BuildContext) -> (ComponentId, ComponentId) {
        let r1 = ctx.add_component(ComponentSpec::new("Device:R", "R1")).unwrap();
        let r2 = ctx.add_component(ComponentSpec::new("Device:R", "R2")).unwrap();
        (r1, r2)
    }

    #[test]
    fn tie_is_idempotent() {
        let mut ctx = BuildContext::new("t");
        let (r1, _) = two_resistors(&mut ctx);
        let net = ctx.add_net(Some("SIG"));
        let p = ctx.pin(r1, "1").unwrap();
        ctx.tie(net, Tie::Pin(p)).unwrap();
        ctx.tie(net, Tie::Pin(p)).unwrap();
        assert_eq!(ctx.net(net).unwrap().pins, vec![p]);
    }

    #[test]
    fn merge_retires_source_net() {
        let mut ctx = BuildContext::new("t");
        let (r1, r2) = two_resistors(&mut ctx);
        let a = ctx.add_net(Some("A"));
        let b = ctx.add_net(None);
        ctx.connect(r1, "1", a).unwrap();
        ctx.connect(r2, "1", b).unwrap();
        assert_eq!(ctx.live_net_count(), 2);

        ctx.tie(a, Tie::Net(b)).unwrap();
        assert_eq!(ctx.live_net_count(), 1);
        assert_eq!(ctx.net(a).unwrap().pins.len(), 2);
        assert!(matches!(ctx.net(b), Err(ConnectError::RetiredNet(_))));
        let p2 = ctx.pin(r2, "1").unwrap();
        assert_eq!(ctx.net_of(p2), Some(a));
    }

    #[test]
    fn pin_to_pin_creates_implicit_net() {
        let mut ctx = BuildContext::new("t");
        let (r1, r2) = two_resistors(&mut ctx);
        let p2 = ctx.pin(r2, "2").unwrap();
        let net = ctx.connect(r1, "2", p2).unwrap();
        assert_eq!(ctx.net(net).unwrap().pins.len(), 2);
        assert_eq!(ctx.net(net).unwrap().name, None);
    }

    #[test]
    fn pin_access_is_side_effect_free_on_nets() {
        let mut ctx = BuildContext::new("t");
        let (r1, _) = two_resistors(&mut ctx);
        let p = ctx.pin(r1, "1").unwrap();
        assert_eq!(ctx.pin(r1, "1").unwrap(), p);
        assert_eq!(ctx.net_of(p), None);
        assert_eq!(ctx.live_net_count(), 0);
    }

    #[test]
    fn dnc_latches_pin() {
        let mut ctx = BuildContext::new("t");
        let (r1, _) = two_resistors(&mut ctx);
        let p = ctx.pin(r1, "2").unwrap();
        let marker = ctx.dnc(p, Some("spare")).unwrap();
        assert!(ctx.component(marker).unwrap().marker);
        assert_eq!(ctx.component(marker).unwrap().reference, "R1_2_nc");

        let net = ctx.add_net(Some("X"));
        let err = ctx.tie(net, Tie::Pin(p)).unwrap_err();
        assert!(err.to_string().contains("already marked Do-Not-Connect"));
        assert!(matches!(ctx.dnc(p, None), Err(ConnectError::AlreadyDnc { .. })));
    }

    #[test]
    fn dnc_net_accepts_only_one_functional_pin() {
        let mut ctx = BuildContext::new("t");
        let (r1, r2) = two_resistors(&mut ctx);
        let p1 = ctx.pin(r1, "1").unwrap();
        let p2 = ctx.pin(r2, "1").unwrap();
        let net = ctx.add_net(None);
        ctx.tie(net, Tie::Pin(p1)).unwrap();
        ctx.dnc(p1, None).unwrap();
        assert!(matches!(
            ctx.tie(net, Tie::Pin(p2)),
            Err(ConnectError::DncConflict { .. })
        ));
        assert_eq!(ctx.net_of(p2), None);
    }

    #[test]
    fn dnc_rejected_on_shared_net_leaves_no_marker() {
        let mut ctx = BuildContext::new("t");
        let (r1, r2) = two_resistors(&mut ctx);
        let net = ctx.add_net(Some("SIG"));
        ctx.connect(r1, "1", net).unwrap();
        ctx.connect(r2, "1", net).unwrap();
        let p1 = ctx.pin(r1, "1").unwrap();
        assert!(ctx.dnc(p1, None).is_err());
        assert!(ctx.find_component("R1_1_nc").is_none());
        assert!(!ctx.component_pin(p1).unwrap().dnc);
    }

    #[test]
    fn interface_is_cached() {
        let mut ctx = BuildContext::new("t");
        let sub = ctx.add_composable("filter", None, None).unwrap();
        let inner = ctx
            .add_component(ComponentSpec::new("Device:C", "C1").parent(sub))
            .unwrap();
        let outer = ctx.add_component(ComponentSpec::new("Device:R", "R1")).unwrap();
        let net = ctx.add_net(Some("OUT"));
        ctx.connect(inner, "1", net).unwrap();
        ctx.connect(outer, "1", net).unwrap();
        ctx.expose(sub, "out", net).unwrap();

        let iface = ctx.interface(sub).unwrap().clone();
        assert_eq!(iface.bridged, vec![net]);
        assert_eq!(iface.ports, vec![("out".to_string(), net)]);

        let late = ctx.add_net(Some("LATE"));
        ctx.connect(inner, "2", late).unwrap();
        ctx.connect(outer, "2", late).unwrap();
        assert_eq!(ctx.interface(sub).unwrap().bridged, vec![net]);
    }

    #[test]
    fn drain_compacts_and_resets() {
        let mut ctx = BuildContext::new("t");
        let (r1, r2) = two_resistors(&mut ctx);
        let a = ctx.add_net(Some("A"));
        let b = ctx.add_net(Some("B"));
        ctx.connect(r1, "1", a).unwrap();
        ctx.connect(r2, "1", b).unwrap();
        ctx.tie(b, Tie::Net(a)).unwrap();

        let netlist = ctx.drain();
        assert_eq!(netlist.nets.len(), 1);
        assert_eq!(netlist.nets[0].id, NetId(0));
        assert!(netlist.pins.iter().all(|p| p.net == Some(NetId(0))));
        assert_eq!(ctx.live_net_count(), 0);
        assert!(ctx.find_component("R1").is_none());
    }

    #[test]
    fn programmatic_pins_use_the_resolver() {
        struct GroundIsFour;
        impl PinResolver for GroundIsFour {
            fn pin_number(&self, symbol: &str, key: &str) -> Option<String> {
                (symbol == "amp" && (key == "GND" || key == "4")).then(|| "4".to_string())
            }
        }
        let mut ctx = BuildContext::new("t");
        ctx.set_pin_resolver(Arc::new(GroundIsFour));
        let u1 = ctx.add_component(ComponentSpec::new("amp", "U1")).unwrap();
        let by_name = ctx.pin(u1, "GND").unwrap();
        assert_eq!(ctx.pin(u1, "4").unwrap(), by_name);
        assert_eq!(ctx.pin_label(by_name), "U1.4");

        // The same keys written in a circuit file land on the same pin.
        let yaml = "name: t\ncomponents:\n  - {ref: U1, symbol: amp}\nnets:\n  - {name: GND, pins: [U1.GND]}\n";
        let def = crate::CircuitDef::from_yaml(yaml).unwrap();
        ctx.start();
        def.build(&mut ctx, &GroundIsFour).unwrap();
        let u1 = ctx.find_component("U1").unwrap();
        let from_file = ctx.pin(u1, "GND").unwrap();
        assert!(ctx.net_of(from_file).is_some());
        assert_eq!(ctx.drain().pins.len(), 1);
    }
}
