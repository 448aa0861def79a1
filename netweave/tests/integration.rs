//! Cross-module tests: connectivity rules, circuit files and document
//! round-trips.

use netweave::context::{BuildContext, Tie};
use netweave::error::ConnectError;
use netweave::kicad::export_kicad_netlist;
use netweave::model::{ComponentSpec, PinId};
use netweave::sexpr::{format_sexpr, parse};
use netweave::CircuitDef;
use std::collections::BTreeSet;

fn two_resistors(ctx: &mut BuildContext) -> (netweave::ComponentId, netweave::ComponentId) {
    let r1 = ctx.add_component(ComponentSpec::new("Device:R", "R1")).unwrap();
    let r2 = ctx.add_component(ComponentSpec::new("Device:R", "R2")).unwrap();
    (r1, r2)
}

// ---------------------------------------------------------------------------
// Net merging
// ---------------------------------------------------------------------------

#[test]
fn merge_unions_pins_and_retires_one_net() {
    let mut ctx = BuildContext::new("merge");
    let (r1, r2) = two_resistors(&mut ctx);
    let r3 = ctx.add_component(ComponentSpec::new("Device:R", "R3")).unwrap();

    let a = ctx.add_net(Some("A"));
    let b = ctx.add_net(Some("B"));
    ctx.connect(r1, "1", a).unwrap();
    ctx.connect(r2, "1", a).unwrap();
    ctx.connect(r2, "2", b).unwrap();
    ctx.connect(r3, "1", b).unwrap();

    let mut expected: BTreeSet<PinId> = ctx.net(a).unwrap().pins.iter().copied().collect();
    expected.extend(ctx.net(b).unwrap().pins.iter().copied());
    let before = ctx.live_net_count();

    ctx.tie(a, Tie::Net(b)).unwrap();

    let merged: BTreeSet<PinId> = ctx.net(a).unwrap().pins.iter().copied().collect();
    assert_eq!(merged, expected);
    assert_eq!(ctx.live_net_count(), before - 1);
    assert_eq!(ctx.net(b), Err(ConnectError::RetiredNet(b.0)));
    for pin in merged {
        assert_eq!(ctx.net_of(pin), Some(a));
    }
}

#[test]
fn merging_through_a_shared_pin() {
    let mut ctx = BuildContext::new("chain");
    let (r1, r2) = two_resistors(&mut ctx);
    let p1 = ctx.pin(r1, "1").unwrap();
    let p2 = ctx.pin(r2, "1").unwrap();
    let n1 = ctx.add_net(None);
    let n2 = ctx.add_net(None);
    ctx.tie(n1, p1.into()).unwrap();
    ctx.tie(n2, p2.into()).unwrap();

    // Tying a pin that already sits on another net merges the two.
    ctx.tie(n1, p2.into()).unwrap();
    assert_eq!(ctx.net_of(p2), Some(n1));
    assert_eq!(ctx.live_net_count(), 1);
}

// ---------------------------------------------------------------------------
// Do-Not-Connect
// ---------------------------------------------------------------------------

#[test]
fn dnc_pin_refuses_later_ties() {
    let mut ctx = BuildContext::new("dnc");
    let (r1, r2) = two_resistors(&mut ctx);
    let spare = ctx.pin(r1, "2").unwrap();
    ctx.dnc(spare, Some("unused")).unwrap();

    let net = ctx.add_net(Some("SIG"));
    let err = ctx.tie(net, spare.into()).unwrap_err();
    assert!(err.to_string().contains("already marked Do-Not-Connect"));

    let other = ctx.pin(r2, "1").unwrap();
    assert!(matches!(
        ctx.tie_pins(other, spare),
        Err(ConnectError::AlreadyDnc { .. })
    ));
}

#[test]
fn connecting_to_a_dnc_pin_names_the_marked_pin() {
    let mut ctx = BuildContext::new("dnc");
    let (r1, r2) = two_resistors(&mut ctx);
    let spare = ctx.pin(r1, "2").unwrap();
    ctx.dnc(spare, None).unwrap();

    // The fresh pin is not connected yet, the marked one already is.
    let err = ctx.connect(r2, "1", Tie::Pin(spare)).unwrap_err();
    assert!(err.to_string().contains("already marked Do-Not-Connect"));
    assert!(err.to_string().contains("R1"));

    let fresh = ctx.pin(r2, "2").unwrap();
    assert!(matches!(
        ctx.tie_pins(spare, fresh),
        Err(ConnectError::AlreadyDnc { .. })
    ));
    assert_eq!(ctx.net_of(fresh), None);
}

#[test]
fn dnc_net_takes_one_functional_pin_only() {
    let mut ctx = BuildContext::new("dnc");
    let (r1, r2) = two_resistors(&mut ctx);
    // The marker plus exactly one functional pin is allowed.
    let spare = ctx.pin(r1, "1").unwrap();
    ctx.dnc(spare, None).unwrap();
    let dnc_net = ctx.net_of(spare).unwrap();
    assert_eq!(ctx.net(dnc_net).unwrap().pins.len(), 2);

    let err = ctx.connect(r2, "1", dnc_net).unwrap_err();
    assert!(matches!(err, ConnectError::DncConflict { .. }));
    // Nothing moved.
    assert_eq!(ctx.net(dnc_net).unwrap().pins.len(), 2);
    let rejected = ctx.pin(r2, "1").unwrap();
    assert!(ctx.net_of(rejected).is_none());
}

#[test]
fn dnc_rejected_on_busy_net() {
    let mut ctx = BuildContext::new("dnc");
    let (r1, r2) = two_resistors(&mut ctx);
    let p = ctx.pin(r1, "1").unwrap();
    ctx.connect(r2, "1", p).unwrap();
    let nets_before = ctx.live_net_count();

    assert!(matches!(ctx.dnc(p, None), Err(ConnectError::DncConflict { .. })));
    assert_eq!(ctx.live_net_count(), nets_before);
    let netlist = ctx.drain();
    assert_eq!(netlist.components.len(), 2);
    assert!(!netlist.pin(p).dnc);
}

// ---------------------------------------------------------------------------
// Circuit files
// ---------------------------------------------------------------------------

#[test]
fn circuit_file_to_netlist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("amp.yaml");
    std::fs::write(
        &path,
        r#"
name: amp
components:
  - {ref: J1, symbol: "Connector:Conn_01x02"}
  - {ref: R1, symbol: "Device:R", value: 1k}
  - {ref: C1, symbol: "Device:C", value: 100n}
nets:
  - {name: IN, pins: [J1.1, R1.1]}
  - {name: OUT, pins: [R1.2, C1.1]}
  - {name: GND, power: true, pins: [J1.2, C1.2]}
"#,
    )
    .unwrap();

    let def = CircuitDef::load(&path).unwrap();
    let mut ctx = BuildContext::new(&def.name);
    def.build(&mut ctx, &netweave::circuit::LiteralPins).unwrap();
    let netlist = ctx.drain();

    let gnd = netlist.nets.iter().find(|n| n.name.as_deref() == Some("GND")).unwrap();
    assert!(gnd.power);
    let text = export_kicad_netlist(&netlist);
    assert!(text.contains("(name \"OUT\")"));
    assert!(text.contains("(node (ref \"C1\") (pin \"2\"))"));
}

#[test]
fn missing_circuit_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = CircuitDef::load(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(err.to_string().starts_with("Failed to read circuit file"));
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[test]
fn netlist_document_round_trip_is_stable() {
    let mut ctx = BuildContext::new("rt");
    let (r1, r2) = two_resistors(&mut ctx);
    let p = ctx.pin(r2, "1").unwrap();
    ctx.connect(r1, "2", p).unwrap();
    let text = export_kicad_netlist(&ctx.drain());

    let once = format_sexpr(&parse(&text).unwrap());
    let twice = format_sexpr(&parse(&once).unwrap());
    assert_eq!(text, once);
    assert_eq!(once, twice);
}
