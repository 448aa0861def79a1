//! Post-hoc geometric audit of a generated schematic.
//!
//! Nothing here fails fast: every finding becomes one message in the
//! generation error list, prefixed `[overlap]` or `[verify]`.

use crate::assembly::{PinPoint, Wire};
use crate::symbols::SymbolSource;
use crate::types::*;
use netweave::model::ComponentId;
use netweave::Netlist;

/// Absolute boxes of all placed, non-marker components.
fn placed_boxes(netlist: &Netlist, symbols: &dyn SymbolSource, padding: f64) -> Vec<(ComponentId, Rect)> {
    netlist
        .components
        .iter()
        .filter(|c| !c.marker)
        .filter_map(|c| {
            let at = netlist.absolute_placement(c.id)?;
            Some((c.id, symbols.bounding_box(&c.symbol, &at).inflate(padding)))
        })
        .collect()
}

/// Report every pair of overlapping component boxes.
pub fn check_overlaps(netlist: &Netlist, symbols: &dyn SymbolSource, padding: f64) -> Vec<String> {
    let boxes = placed_boxes(netlist, symbols, padding);
    let mut errors = Vec::new();
    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            if boxes[i].1.overlaps(&boxes[j].1) {
                errors.push(format!(
                    "[overlap] {} and {} overlap",
                    netlist.component(boxes[i].0).reference,
                    netlist.component(boxes[j].0).reference
                ));
            }
        }
    }
    errors
}

/// Check wires against component bodies and pin coordinates:
///
/// - a wire may cross a component body only when it touches one of that
///   component's own pins;
/// - a wire never touches a pin of another net;
/// - every pin on a (non Do-Not-Connect) net is touched by a wire of its
///   net;
/// - no wire ends on a wire of another net.
pub fn check_wires(
    netlist: &Netlist,
    symbols: &dyn SymbolSource,
    pins: &[Option<PinPoint>],
    wires: &[Wire],
    tolerance: f64,
) -> Vec<String> {
    let boxes = placed_boxes(netlist, symbols, 0.0);
    let resolved: Vec<&PinPoint> = pins.iter().flatten().collect();
    let touches = |p: &PinPoint, w: &Wire| point_on_segment(p.at, w.a, w.b, tolerance);
    let mut errors = Vec::new();

    for w in wires {
        let net_name = netlist.net_name(w.net);
        for (comp, rect) in &boxes {
            if !rect.crossed_by(w.a, w.b) {
                continue;
            }
            let own_pin = resolved.iter().any(|p| p.component == *comp && touches(p, w));
            if !own_pin {
                errors.push(format!(
                    "[verify] wire {}-{} of net {} crosses {}",
                    w.a,
                    w.b,
                    net_name,
                    netlist.component(*comp).reference
                ));
            }
        }
        for p in &resolved {
            let pin_net = netlist.pin(p.pin).net;
            if pin_net != Some(w.net) && touches(p, w) {
                let other = match pin_net {
                    Some(n) => format!("net {}", netlist.net_name(n)),
                    None => "no net".to_string(),
                };
                errors.push(format!(
                    "[verify] wire {}-{} of net {} touches pin {} on {}",
                    w.a,
                    w.b,
                    net_name,
                    netlist.pin_label(p.pin),
                    other
                ));
            }
        }
    }

    for (i, w) in wires.iter().enumerate() {
        for other in wires[i + 1..].iter().filter(|o| o.net != w.net) {
            let joint = [w.a, w.b]
                .into_iter()
                .find(|&p| point_on_segment(p, other.a, other.b, tolerance))
                .or_else(|| {
                    [other.a, other.b]
                        .into_iter()
                        .find(|&p| point_on_segment(p, w.a, w.b, tolerance))
                });
            if let Some(at) = joint {
                errors.push(format!(
                    "[verify] wire {}-{} of net {} joins net {} at {}",
                    w.a,
                    w.b,
                    netlist.net_name(w.net),
                    netlist.net_name(other.net),
                    at
                ));
            }
        }
    }

    for p in &resolved {
        let Some(net) = netlist.pin(p.pin).net else {
            continue;
        };
        if netlist.is_dnc_net(net) {
            continue;
        }
        if !wires.iter().any(|w| w.net == net && touches(p, w)) {
            errors.push(format!(
                "[verify] pin {} of net {} is not reached by any wire",
                netlist.pin_label(p.pin),
                netlist.net_name(net)
            ));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::resolve_pins;
    use crate::symbols::SymbolLibrary;
    use netweave::context::BuildContext;
    use netweave::model::{ComponentSpec, NetId, Placement};

    fn two_resistors(second: Placement) -> Netlist {
        let mut ctx = BuildContext::new("t");
        let r1 = ctx
            .add_component(ComponentSpec::new("Device:R", "R1").at(Placement::at(0.0, 0.0)))
            .unwrap();
        let r2 = ctx
            .add_component(ComponentSpec::new("Device:R", "R2").at(second))
            .unwrap();
        let p = ctx.pin(r2, "1").unwrap();
        ctx.connect(r1, "2", p).unwrap();
        // Left floating.
        ctx.pin(r1, "1").unwrap();
        ctx.drain()
    }

    #[test]
    fn overlaps_are_reported_once_per_pair() {
        let lib = SymbolLibrary::builtin();
        let netlist = two_resistors(Placement::at(0.0, 0.0));
        let errors = check_overlaps(&netlist, &lib, 0.0);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("R1") && errors[0].contains("R2"));

        let apart = two_resistors(Placement::at(20.32, 0.0));
        assert!(check_overlaps(&apart, &lib, 0.0).is_empty());
    }

    #[test]
    fn wire_findings() {
        let lib = SymbolLibrary::builtin();
        let netlist = two_resistors(Placement::at(10.16, 0.0));
        let mut errors = Vec::new();
        let pins = resolve_pins(&netlist, &lib, &mut errors);
        assert!(errors.is_empty());
        let net = NetId(0);

        // R1.2 at (0, 3.81) to R2.1 at (10.16, -3.81), around both bodies.
        let good = vec![
            Wire { net, a: Point::new(0.0, 3.81), b: Point::new(0.0, 6.35) },
            Wire { net, a: Point::new(0.0, 6.35), b: Point::new(5.08, 6.35) },
            Wire { net, a: Point::new(5.08, 6.35), b: Point::new(5.08, -6.35) },
            Wire { net, a: Point::new(5.08, -6.35), b: Point::new(10.16, -6.35) },
            Wire { net, a: Point::new(10.16, -6.35), b: Point::new(10.16, -3.81) },
        ];
        assert!(check_wires(&netlist, &lib, &pins, &good, 0.01).is_empty());

        // Straight through R1's body, touching R1.1 which is on no net.
        let bad = vec![Wire { net, a: Point::new(0.0, 3.81), b: Point::new(0.0, -6.35) }];
        let findings = check_wires(&netlist, &lib, &pins, &bad, 0.01);
        assert!(findings.iter().any(|e| e.contains("touches pin R1.1")), "{findings:?}");
        assert!(findings.iter().any(|e| e.contains("R2.1") && e.contains("not reached")));

        // Nothing drawn at all.
        let findings = check_wires(&netlist, &lib, &pins, &[], 0.01);
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn wires_of_different_nets_must_not_join() {
        let lib = SymbolLibrary::builtin();
        let mut ctx = BuildContext::new("t");
        ctx.add_component(ComponentSpec::new("Device:R", "R1").at(Placement::at(0.0, 0.0)))
            .unwrap();
        let a = ctx.add_net(Some("A"));
        let b = ctx.add_net(Some("B"));
        let netlist = ctx.drain();
        let pins = resolve_pins(&netlist, &lib, &mut Vec::new());

        // B ends in the middle of A's run.
        let tee = vec![
            Wire { net: b, a: Point::new(15.24, 5.08), b: Point::new(15.24, 0.0) },
            Wire { net: a, a: Point::new(10.16, 0.0), b: Point::new(20.32, 0.0) },
        ];
        let findings = check_wires(&netlist, &lib, &pins, &tee, 0.01);
        assert_eq!(findings.len(), 1, "{findings:?}");
        assert!(findings[0].contains("of net B joins net A"));

        // A plain crossing is not a connection.
        let cross = vec![
            Wire { net: a, a: Point::new(10.16, 0.0), b: Point::new(20.32, 0.0) },
            Wire { net: b, a: Point::new(15.24, 5.08), b: Point::new(15.24, -5.08) },
        ];
        assert!(check_wires(&netlist, &lib, &pins, &cross, 0.01).is_empty());
    }
}
