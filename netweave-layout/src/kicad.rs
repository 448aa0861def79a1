//! KiCad schematic (`.kicad_sch`) writer.
//!
//! Converts an assembled [`SchematicDocument`] into the S-expression tree
//! KiCad reads. Identifiers come from the persisted [`IdMap`], so writing
//! the same circuit twice produces the same UUIDs.

use crate::assembly::{PowerSymbol, SchematicDocument, SymbolInstance};
use crate::ids::{wire_key, IdMap};
use crate::symbols::{SymbolGeometry, SymbolSource};
use netweave::sexpr::{format_sexpr, Sexpr};
use std::collections::BTreeSet;

const FILE_VERSION: f64 = 20231120.0;
const GENERATOR: &str = "netweave";
const FONT_SIZE: f64 = 1.27;
const LABEL_OFFSET: f64 = 5.08;

fn yes_no(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

fn at(x: f64, y: f64, rotation: f64) -> Sexpr {
    Sexpr::list("at", vec![Sexpr::num(x), Sexpr::num(y), Sexpr::num(rotation)])
}

fn uuid(ids: &mut IdMap, key: &str) -> Sexpr {
    Sexpr::pair_sym("uuid", ids.id(key).to_string())
}

fn effects(hide: bool) -> Sexpr {
    let mut items = vec![Sexpr::list(
        "font",
        vec![Sexpr::list("size", vec![Sexpr::num(FONT_SIZE), Sexpr::num(FONT_SIZE)])],
    )];
    if hide {
        items.push(Sexpr::sym("hide"));
    }
    Sexpr::list("effects", items)
}

fn property(key: &str, value: &str, x: f64, y: f64, hide: bool) -> Sexpr {
    Sexpr::list(
        "property",
        vec![
            Sexpr::string(key),
            Sexpr::string(value),
            at(x, y, 0.0),
            effects(hide),
        ],
    )
}

/// Library definition of one symbol, drawn from its resolved geometry.
fn lib_symbol(id: &str, geometry: Option<&SymbolGeometry>) -> Sexpr {
    let name = id.rsplit(':').next().unwrap_or(id);
    let mut items = vec![Sexpr::string(id)];
    let power = geometry.is_some_and(|g| g.power);
    if power {
        items.push(Sexpr::list("power", vec![]));
    }
    items.push(Sexpr::pair_sym("in_bom", yes_no(!power)));
    items.push(Sexpr::pair_sym("on_board", yes_no(!power)));

    if let Some(g) = geometry {
        if let Some(body) = g.body {
            // Stored in the sheet frame; libraries are y-up.
            items.push(Sexpr::list(
                "symbol",
                vec![
                    Sexpr::string(format!("{name}_0_1")),
                    Sexpr::list(
                        "rectangle",
                        vec![
                            Sexpr::list("start", vec![Sexpr::num(body.x), Sexpr::num(-body.y)]),
                            Sexpr::list("end", vec![Sexpr::num(body.right()), Sexpr::num(-body.bottom())]),
                            Sexpr::list(
                                "stroke",
                                vec![Sexpr::list("width", vec![Sexpr::num(0.254)]), Sexpr::pair_sym("type", "default")],
                            ),
                            Sexpr::list("fill", vec![Sexpr::pair_sym("type", "none")]),
                        ],
                    ),
                ],
            ));
        }
        let pins = g
            .pins
            .iter()
            .map(|p| {
                Sexpr::list(
                    "pin",
                    vec![
                        Sexpr::sym(if power { "power_in" } else { "passive" }),
                        Sexpr::sym("line"),
                        at(p.x, p.y, p.angle),
                        Sexpr::list("length", vec![Sexpr::num(p.length)]),
                        Sexpr::list("name", vec![Sexpr::string(&p.name), effects(false)]),
                        Sexpr::list("number", vec![Sexpr::string(&p.number), effects(false)]),
                    ],
                )
            })
            .collect::<Vec<_>>();
        let mut unit = vec![Sexpr::string(format!("{name}_1_1"))];
        unit.extend(pins);
        items.push(Sexpr::list("symbol", unit));
    }
    Sexpr::list("symbol", items)
}

fn symbol_instance(sym: &SymbolInstance, project: &str, sheet: &str, ids: &mut IdMap) -> Sexpr {
    let (x, y) = (sym.at.x, sym.at.y);
    let mut items = vec![
        Sexpr::pair_str("lib_id", &sym.lib_id),
        at(x, y, sym.at.rotation),
        Sexpr::list("unit", vec![Sexpr::num(1.0)]),
        Sexpr::pair_sym("in_bom", "yes"),
        Sexpr::pair_sym("on_board", "yes"),
        Sexpr::pair_sym("dnp", "no"),
        uuid(ids, &sym.reference),
        property("Reference", &sym.reference, x, y - LABEL_OFFSET, false),
        property("Value", &sym.value, x, y + LABEL_OFFSET, false),
        property("Footprint", &sym.footprint, x, y + 2.0 * LABEL_OFFSET, true),
    ];
    for pin in &sym.pins {
        items.push(Sexpr::list(
            "pin",
            vec![
                Sexpr::string(pin),
                uuid(ids, &format!("{}_{}", sym.reference, pin)),
            ],
        ));
    }
    items.push(instances(project, sheet, &sym.reference));
    Sexpr::list("symbol", items)
}

fn power_instance(ps: &PowerSymbol, reference: &str, project: &str, sheet: &str, ids: &mut IdMap) -> Sexpr {
    let (x, y) = (ps.at.x, ps.at.y);
    Sexpr::list(
        "symbol",
        vec![
            Sexpr::pair_str("lib_id", &ps.lib_id),
            at(x, y, ps.at.rotation),
            Sexpr::list("unit", vec![Sexpr::num(1.0)]),
            Sexpr::pair_sym("in_bom", "no"),
            Sexpr::pair_sym("on_board", "no"),
            Sexpr::pair_sym("dnp", "no"),
            uuid(ids, &ps.key),
            property("Reference", reference, x, y - LABEL_OFFSET, true),
            property("Value", &ps.value, x, y + LABEL_OFFSET, false),
            Sexpr::list(
                "pin",
                vec![Sexpr::string("1"), uuid(ids, &format!("{}_1", ps.key))],
            ),
            instances(project, sheet, reference),
        ],
    )
}

fn instances(project: &str, sheet: &str, reference: &str) -> Sexpr {
    Sexpr::list(
        "instances",
        vec![Sexpr::list(
            "project",
            vec![
                Sexpr::string(project),
                Sexpr::list(
                    "path",
                    vec![
                        Sexpr::string(format!("/{sheet}")),
                        Sexpr::pair_str("reference", reference),
                        Sexpr::list("unit", vec![Sexpr::num(1.0)]),
                    ],
                ),
            ],
        )],
    )
}

/// Build the `kicad_sch` tree.
pub fn schematic_sexpr(doc: &SchematicDocument, symbols: &dyn SymbolSource, ids: &mut IdMap) -> Sexpr {
    let sheet = ids.id("sheet").to_string();
    let mut items = vec![
        Sexpr::list("version", vec![Sexpr::num(FILE_VERSION)]),
        Sexpr::pair_str("generator", GENERATOR),
        Sexpr::pair_sym("uuid", sheet.clone()),
        Sexpr::pair_str("paper", &doc.paper),
    ];

    let lib_ids: BTreeSet<&str> = doc
        .symbols
        .iter()
        .map(|s| s.lib_id.as_str())
        .chain(doc.power.iter().map(|p| p.lib_id.as_str()))
        .collect();
    items.push(Sexpr::list(
        "lib_symbols",
        lib_ids
            .iter()
            .map(|id| lib_symbol(id, symbols.geometry(id)))
            .collect(),
    ));

    for wire in &doc.wires {
        items.push(Sexpr::list(
            "wire",
            vec![
                Sexpr::list(
                    "pts",
                    vec![
                        Sexpr::list("xy", vec![Sexpr::num(wire.a.x), Sexpr::num(wire.a.y)]),
                        Sexpr::list("xy", vec![Sexpr::num(wire.b.x), Sexpr::num(wire.b.y)]),
                    ],
                ),
                Sexpr::list(
                    "stroke",
                    vec![Sexpr::list("width", vec![Sexpr::num(0.0)]), Sexpr::pair_sym("type", "default")],
                ),
                uuid(ids, &wire_key(wire.a, wire.b)),
            ],
        ));
    }

    for nc in &doc.no_connects {
        items.push(Sexpr::list(
            "no_connect",
            vec![at(nc.at.x, nc.at.y, 0.0), uuid(ids, &nc.key)],
        ));
    }

    for sym in &doc.symbols {
        items.push(symbol_instance(sym, &doc.name, &sheet, ids));
    }
    for (i, ps) in doc.power.iter().enumerate() {
        let reference = format!("#PWR{:02}", i + 1);
        items.push(power_instance(ps, &reference, &doc.name, &sheet, ids));
    }

    items.push(Sexpr::list(
        "sheet_instances",
        vec![Sexpr::list(
            "path",
            vec![Sexpr::string("/"), Sexpr::pair_str("page", "1")],
        )],
    ));
    Sexpr::list("kicad_sch", items)
}

/// Render the schematic file contents.
pub fn write_schematic(doc: &SchematicDocument, symbols: &dyn SymbolSource, ids: &mut IdMap) -> String {
    format_sexpr(&schematic_sexpr(doc, symbols, ids))
}
