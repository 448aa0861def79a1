//! Schematic assembly.
//!
//! Turns a placed netlist into a [`SchematicDocument`]: one symbol instance
//! per component, a no-connect flag per Do-Not-Connect pin, and wires.
//! Power-class nets get a short escape wire and a power symbol per pin;
//! every other net gets escape wires plus a routed connection between each
//! consecutive pair of pins. Every escape wire is laid down before any
//! routing so that routes keep clear of other nets' stubs, and each route
//! in turn is kept clear of by the nets routed after it. Wire segments are
//! deduplicated at the end.

use crate::config::SynthConfig;
use crate::optimize::count_crossings;
use crate::routing::{compress_path, ObstacleMap, Occupancy, Router};
use crate::symbols::{PinGeometry, SymbolSource};
use crate::types::*;
use netweave::model::{normalize_degrees, rotate_sheet, ComponentId, NetId, PinId, Placement};
use netweave::Netlist;
use std::collections::HashSet;

/// Absolute location of one pin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinPoint {
    pub pin: PinId,
    pub component: ComponentId,
    pub at: Point,
    /// Unit vector pointing away from the symbol body.
    pub outward: Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wire {
    pub net: NetId,
    pub a: Point,
    pub b: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInstance {
    pub component: ComponentId,
    pub reference: String,
    pub lib_id: String,
    pub value: String,
    pub footprint: String,
    pub at: Placement,
    /// Pin numbers drawn by the symbol.
    pub pins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerSymbol {
    pub net: NetId,
    pub lib_id: String,
    /// Net name shown as the symbol value.
    pub value: String,
    pub at: Placement,
    /// Persisted-id key, `{ref}_{pin}_pwr`.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NoConnect {
    pub at: Point,
    /// Persisted-id key, `{ref}_{pin}_nc`.
    pub key: String,
}

/// Pin-to-pin polyline of one routed connection.
#[derive(Debug, Clone, PartialEq)]
pub struct NetRoute {
    pub net: NetId,
    pub from: PinId,
    pub to: PinId,
    pub path: Vec<Point>,
    /// The router failed and a direct line was drawn instead.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchematicDocument {
    pub name: String,
    pub paper: String,
    pub symbols: Vec<SymbolInstance>,
    pub power: Vec<PowerSymbol>,
    pub wires: Vec<Wire>,
    pub no_connects: Vec<NoConnect>,
    pub routes: Vec<NetRoute>,
}

/// Ground-like net names.
pub fn is_ground_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.contains("GND") || upper == "VSS" || upper == "0V"
}

/// Supply-like net names: ground, `V{CC,DD,EE,SS,BAT}…`, and signed or
/// voltage-style names such as `+5V`, `-12V` or `3V3`.
pub fn is_power_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    if is_ground_name(&upper) {
        return true;
    }
    if ["VCC", "VDD", "VEE", "VSS", "VBAT"].iter().any(|p| upper.starts_with(p)) {
        return true;
    }
    let body = upper.trim_start_matches(['+', '-']);
    let signed = body.len() < upper.len();
    let digits_then_v = body.starts_with(|c: char| c.is_ascii_digit())
        && body.contains('V')
        && body.chars().all(|c| c.is_ascii_digit() || c == 'V' || c == '.');
    digits_then_v || (signed && body.starts_with(|c: char| c.is_ascii_digit()))
}

/// Whether `net` is drawn with power symbols instead of routed wires.
pub fn is_power_net(netlist: &Netlist, net: NetId) -> bool {
    let n = netlist.net(net);
    n.power || n.name.as_deref().is_some_and(is_power_name)
}

/// Absolute position and outward direction of a symbol pin.
pub fn pin_point(at: &Placement, geom: &PinGeometry) -> (Point, Point) {
    let (ox, oy) = geom.sheet_offset();
    let (dx, dy) = rotate_sheet(ox, oy, at.rotation);
    let (ux, uy) = rotate_sheet(1.0, 0.0, geom.outward_angle() + at.rotation);
    (Point::new(at.x + dx, at.y + dy), Point::new(ux, uy))
}

/// Resolve every pin of every placed component, indexed by pin id.
///
/// Pins whose symbol has no matching geometry sit on the component origin
/// and are reported.
pub fn resolve_pins(netlist: &Netlist, symbols: &dyn SymbolSource, errors: &mut Vec<String>) -> Vec<Option<PinPoint>> {
    let mut out = vec![None; netlist.pins.len()];
    for comp in &netlist.components {
        if comp.marker {
            continue;
        }
        let Some(at) = netlist.absolute_placement(comp.id) else {
            continue;
        };
        let geometry = symbols.geometry(&comp.symbol);
        for pin in comp.pins.iter() {
            let key = &netlist.pin(pin).key;
            let (point, outward) = match geometry.and_then(|g| g.find_pin(key)) {
                Some(g) => pin_point(&at, g),
                None => {
                    errors.push(format!(
                        "[verify] no geometry for pin {} of {}",
                        netlist.pin_label(pin),
                        comp.symbol
                    ));
                    (Point::new(at.x, at.y), Point::new(0.0, -1.0))
                }
            };
            out[pin.0] = Some(PinPoint {
                pin,
                component: comp.id,
                at: point,
                outward,
            });
        }
    }
    out
}

/// Assembly state for one generation pass.
pub struct Assembler<'a> {
    netlist: &'a Netlist,
    symbols: &'a dyn SymbolSource,
    config: &'a SynthConfig,
    router: Router,
    obstacles: ObstacleMap,
    occupancy: Occupancy,
    pins: Vec<Option<PinPoint>>,
    pub errors: Vec<String>,
}

impl<'a> Assembler<'a> {
    pub fn new(netlist: &'a Netlist, symbols: &'a dyn SymbolSource, config: &'a SynthConfig) -> Self {
        let mut errors = Vec::new();
        let pins = resolve_pins(netlist, symbols, &mut errors);
        let router = Router::new(&config.router);
        Self {
            netlist,
            symbols,
            config,
            occupancy: Occupancy::new(router.pitch()),
            router,
            obstacles: ObstacleMap::build(netlist, symbols, config.router.obstacle_padding),
            pins,
            errors,
        }
    }

    pub fn pins(&self) -> &[Option<PinPoint>] {
        &self.pins
    }

    fn escape_point(&self, p: &PinPoint) -> Point {
        let d = self.config.router.escape.distance(self.router.pitch());
        Point::new(p.at.x + p.outward.x * d, p.at.y + p.outward.y * d)
    }

    /// Build the document. Errors found along the way accumulate in
    /// [`Assembler::errors`].
    pub fn assemble(&mut self) -> SchematicDocument {
        let mut doc = SchematicDocument {
            name: self.netlist.name.clone(),
            paper: self.config.assembly.paper.clone(),
            ..Default::default()
        };

        if self.config.assembly.emit_symbols {
            doc.symbols = self.symbol_instances();
        }
        doc.no_connects = self.no_connects();

        if self.config.assembly.emit_wires {
            let netlist = self.netlist;
            self.obstacles.refresh(netlist, self.symbols);
            let boxes = self.obstacles.boxes();
            let nets: Vec<(NetId, Vec<PinPoint>)> = netlist
                .nets
                .iter()
                .filter(|net| !netlist.is_dnc_net(net.id))
                .map(|net| {
                    let members = netlist
                        .functional_pins(net.id)
                        .filter_map(|p| self.pins[p.0])
                        .collect::<Vec<_>>();
                    (net.id, members)
                })
                .filter(|(_, members)| !members.is_empty())
                .collect();
            for (net, members) in &nets {
                for m in members {
                    let esc = self.escape_point(m);
                    self.occupancy.add_segment(*net, m.at, esc);
                }
            }
            for (net, members) in &nets {
                if is_power_net(netlist, *net) {
                    self.wire_power_net(*net, members, &mut doc);
                } else {
                    self.wire_signal_net(*net, members, &boxes, &mut doc);
                }
            }
            let before = doc.wires.len();
            doc.wires = dedup_wires(doc.wires);
            let segments: Vec<(Point, Point)> = doc.wires.iter().map(|w| (w.a, w.b)).collect();
            log::info!(
                "assembled {} wires ({} duplicates dropped, {} crossings), {} power symbols",
                doc.wires.len(),
                before - doc.wires.len(),
                count_crossings(&segments),
                doc.power.len()
            );
        }
        doc
    }

    fn symbol_instances(&self) -> Vec<SymbolInstance> {
        self.netlist
            .components
            .iter()
            .filter(|c| !c.marker)
            .filter_map(|c| {
                let at = self.netlist.absolute_placement(c.id)?;
                let pins = match self.symbols.geometry(&c.symbol) {
                    Some(g) => g.pins.iter().map(|p| p.number.clone()).collect(),
                    None => c.pins.iter().map(|p| self.netlist.pin(p).key.clone()).collect(),
                };
                Some(SymbolInstance {
                    component: c.id,
                    reference: c.reference.clone(),
                    lib_id: c.symbol.clone(),
                    value: c.value.clone().unwrap_or_else(|| "~".into()),
                    footprint: c.footprint.clone().unwrap_or_default(),
                    at,
                    pins,
                })
            })
            .collect()
    }

    fn no_connects(&self) -> Vec<NoConnect> {
        self.netlist
            .pins
            .iter()
            .filter(|p| p.dnc)
            .filter_map(|p| {
                let point = self.pins[p.id.0]?;
                Some(NoConnect {
                    at: point.at,
                    key: format!("{}_{}_nc", self.netlist.component(p.component).reference, p.key),
                })
            })
            .collect()
    }

    fn wire_power_net(&mut self, net: NetId, members: &[PinPoint], doc: &mut SchematicDocument) {
        let name = self.netlist.net_name(net);
        let lib_id = if is_ground_name(&name) { "power:GND" } else { "power:VCC" };
        // Direction from the power pin toward its body, library degrees.
        let body_angle = self
            .symbols
            .geometry(lib_id)
            .and_then(|g| g.pins.first())
            .map(|p| p.angle)
            .unwrap_or(if lib_id == "power:GND" { 270.0 } else { 90.0 });

        for m in members {
            let esc = self.escape_point(m);
            doc.wires.push(Wire { net, a: m.at, b: esc });
            let outward = (-m.outward.y).atan2(m.outward.x).to_degrees();
            let pin = self.netlist.pin(m.pin);
            doc.power.push(PowerSymbol {
                net,
                lib_id: lib_id.to_string(),
                value: name.clone(),
                at: Placement::new(esc.x, esc.y, normalize_degrees((outward - body_angle).round())),
                key: format!("{}_{}_pwr", self.netlist.component(pin.component).reference, pin.key),
            });
        }
        log::debug!("power net {name}: {} pins as {lib_id}", members.len());
    }

    fn wire_signal_net(&mut self, net: NetId, members: &[PinPoint], boxes: &[Rect], doc: &mut SchematicDocument) {
        for m in members {
            let esc = self.escape_point(m);
            doc.wires.push(Wire { net, a: m.at, b: esc });
        }

        for pair in members.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let (ea, eb) = (self.escape_point(&from), self.escape_point(&to));
            let (route, fallback) = match self.router.route_net(ea, eb, boxes, &self.occupancy, net) {
                Ok(path) => (join_escapes(ea, &path, eb), false),
                Err(e) => {
                    let msg = format!(
                        "[router] net {} ({} to {}): {e}; drew a direct line",
                        self.netlist.net_name(net),
                        self.netlist.pin_label(from.pin),
                        self.netlist.pin_label(to.pin)
                    );
                    log::warn!("{msg}");
                    self.errors.push(msg);
                    (vec![ea, eb], true)
                }
            };
            for seg in route.windows(2) {
                self.occupancy.add_segment(net, seg[0], seg[1]);
                doc.wires.push(Wire { net, a: seg[0], b: seg[1] });
            }

            let mut path = Vec::with_capacity(route.len() + 2);
            path.push(from.at);
            path.extend(route);
            path.push(to.at);
            doc.routes.push(NetRoute {
                net,
                from: from.pin,
                to: to.pin,
                path: compress_path(&path),
                fallback,
            });
        }
    }
}

/// Attach the escape points to a router path that starts and ends on the
/// grid, with an axis-aligned jog where an escape point is off-grid.
fn join_escapes(ea: Point, path: &[Point], eb: Point) -> Vec<Point> {
    let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
        return vec![ea, eb];
    };
    let mut out = Vec::with_capacity(path.len() + 4);
    out.push(ea);
    if !ea.near(first, 1e-9) {
        out.push(Point::new(first.x, ea.y));
        out.push(first);
    }
    if path.len() > 2 {
        out.extend_from_slice(&path[1..path.len() - 1]);
    }
    if !eb.near(last, 1e-9) {
        out.push(last);
        out.push(Point::new(last.x, eb.y));
    }
    out.push(eb);
    compress_path(&out)
}

fn round_key(v: f64) -> i64 {
    (v * 1e4).round() as i64
}

/// Canonical dedup key of a segment: endpoints ordered by x then y, rounded
/// to four decimals.
pub fn wire_key(a: Point, b: Point) -> (i64, i64, i64, i64) {
    let ka = (round_key(a.x), round_key(a.y));
    let kb = (round_key(b.x), round_key(b.y));
    if ka <= kb {
        (ka.0, ka.1, kb.0, kb.1)
    } else {
        (kb.0, kb.1, ka.0, ka.1)
    }
}

/// Drop repeated and zero-length segments, keeping first occurrences.
pub fn dedup_wires(wires: Vec<Wire>) -> Vec<Wire> {
    let mut seen = HashSet::new();
    wires
        .into_iter()
        .filter(|w| w.a != w.b)
        .filter(|w| seen.insert(wire_key(w.a, w.b)))
        .collect()
}
