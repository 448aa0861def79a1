//! KiCad netlist export.
//!
//! Produces the `(export (version "E") ...)` netlist KiCad's PCB editor
//! imports, so the same circuit definition drives both the schematic and
//! board layout.

use crate::model::NetId;
use crate::netlist::Netlist;
use crate::sexpr::{format_sexpr, Sexpr};

const GENERATOR: &str = "netweave";

/// Split `Lib:Part` into its halves; bare ids have an empty library.
fn lib_part(symbol: &str) -> (&str, &str) {
    symbol.split_once(':').unwrap_or(("", symbol))
}

fn comp_record(netlist: &Netlist, index: usize) -> Sexpr {
    let comp = &netlist.components[index];
    let (lib, part) = lib_part(&comp.symbol);
    let mut items = vec![
        Sexpr::pair_str("ref", &comp.reference),
        Sexpr::pair_str("value", comp.value.as_deref().unwrap_or("~")),
    ];
    if let Some(fp) = &comp.footprint {
        items.push(Sexpr::pair_str("footprint", fp));
    }
    items.push(Sexpr::list(
        "libsource",
        vec![Sexpr::pair_str("lib", lib), Sexpr::pair_str("part", part)],
    ));
    Sexpr::list("comp", items)
}

fn net_record(netlist: &Netlist, net: NetId, code: usize) -> Sexpr {
    let mut items = vec![
        Sexpr::pair_str("code", code.to_string()),
        Sexpr::pair_str("name", netlist.net_name(net)),
    ];
    for pin in netlist.functional_pins(net) {
        let p = netlist.pin(pin);
        items.push(Sexpr::list(
            "node",
            vec![
                Sexpr::pair_str("ref", &netlist.component(p.component).reference),
                Sexpr::pair_str("pin", &p.key),
            ],
        ));
    }
    Sexpr::list("net", items)
}

/// Build the netlist document. Do-Not-Connect markers are schematic-only
/// and never appear as components; nets without functional pins are
/// skipped.
pub fn export_netlist(netlist: &Netlist) -> Sexpr {
    let design = Sexpr::list(
        "design",
        vec![
            Sexpr::pair_str("source", format!("{}.kicad_sch", netlist.name)),
            Sexpr::pair_str("tool", GENERATOR),
        ],
    );

    let components = netlist
        .components
        .iter()
        .filter(|c| !c.marker)
        .map(|c| comp_record(netlist, c.id.0))
        .collect();

    let mut nets = Vec::new();
    for net in &netlist.nets {
        if netlist.functional_pins(net.id).next().is_none() {
            continue;
        }
        nets.push(net_record(netlist, net.id, nets.len() + 1));
    }

    Sexpr::list(
        "export",
        vec![
            Sexpr::pair_str("version", "E"),
            design,
            Sexpr::list("components", components),
            Sexpr::list("nets", nets),
        ],
    )
}

/// Export a built circuit to KiCad netlist text.
pub fn export_kicad_netlist(netlist: &Netlist) -> String {
    format_sexpr(&export_netlist(netlist))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildContext;
    use crate::model::ComponentSpec;
    use crate::sexpr::parse;

    fn divider() -> Netlist {
        let mut ctx = BuildContext::new("divider");
        let r1 = ctx
            .add_component(ComponentSpec::new("Device:R", "R1").value("10k"))
            .unwrap();
        let r2 = ctx
            .add_component(
                ComponentSpec::new("Device:R", "R2")
                    .value("4.7k")
                    .footprint("Resistor_SMD:R_0603_1608Metric"),
            )
            .unwrap();
        let mid = ctx.add_net(Some("MID"));
        ctx.connect(r1, "2", mid).unwrap();
        ctx.connect(r2, "1", mid).unwrap();
        let spare = ctx.pin(r2, "2").unwrap();
        ctx.dnc(spare, None).unwrap();
        ctx.drain()
    }

    #[test]
    fn export_divider() {
        let text = export_kicad_netlist(&divider());
        assert!(text.starts_with("(export\n  (version \"E\")"));
        assert!(text.contains("(comp (ref \"R2\") (value \"4.7k\") (footprint \"Resistor_SMD:R_0603_1608Metric\") (libsource (lib \"Device\") (part \"R\")))"));
        assert!(text.contains("(node (ref \"R1\") (pin \"2\"))"));
        assert!(!text.contains("_nc"));
    }

    #[test]
    fn nets_are_numbered_from_one() {
        let doc = parse(&export_kicad_netlist(&divider())).unwrap();
        let nets: Vec<&Sexpr> = doc.child("nets").unwrap().children("net").collect();
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].child("code").unwrap().value_str(), Some("1"));
        assert_eq!(nets[0].child("name").unwrap().value_str(), Some("MID"));
        assert_eq!(
            nets[1].child("name").unwrap().value_str(),
            Some("unconnected-(R2-Pad2)")
        );
    }

    #[test]
    fn bare_symbol_has_no_library() {
        assert_eq!(lib_part("Device:R"), ("Device", "R"));
        assert_eq!(lib_part("custom"), ("", "custom"));
    }
}
