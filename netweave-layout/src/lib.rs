//! Schematic layout engine for netweave circuits.
//!
//! Takes a drained [`netweave::Netlist`] and turns it into a positioned,
//! wired KiCad schematic.
//!
//! # Pipeline
//!
//! ```text
//! Netlist
//!   → ConnectionGraph    (component ↔ net adjacency)
//!   → ClusterTree        (composable hierarchy, bottom-up)
//!   → Placement          (grid or force layout per cluster, fixed-part scaling)
//!   → Assembly           (symbol instances, escape wires, A* routes, power symbols)
//!   → Verification       (overlaps, wire/body and wire/pin audits)
//!   → SchematicDocument  (written as `.kicad_sch`)
//! ```
//!
//! Problems found along the way never abort generation: they are collected
//! as prefixed messages in [`Generation::errors`] and the artifacts are
//! still produced.

pub mod assembly;
pub mod config;
pub mod force;
pub mod graph;
pub mod groups;
pub mod ids;
pub mod kicad;
pub mod layering;
pub mod optimize;
pub mod placement;
pub mod routing;
pub mod symbols;
pub mod types;
pub mod verify;

use assembly::{Assembler, SchematicDocument};
use config::SynthConfig;
use netweave::Netlist;
use symbols::SymbolSource;

pub use config::ConfigError;
pub use ids::{IdMap, IdMapError};
pub use symbols::{SymbolError, SymbolLibrary};

/// Result of one generation pass.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The netlist with every non-marker component placed.
    pub netlist: Netlist,
    pub document: SchematicDocument,
    /// `[placement]`, `[router]`, `[overlap]` and `[verify]` findings.
    pub errors: Vec<String>,
}

impl Generation {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Render the schematic, drawing identifiers from `ids`.
    pub fn schematic(&self, symbols: &dyn SymbolSource, ids: &mut IdMap) -> String {
        kicad::write_schematic(&self.document, symbols, ids)
    }

    /// Render the KiCad netlist of the placed circuit.
    pub fn kicad_netlist(&self) -> String {
        netweave::kicad::export_kicad_netlist(&self.netlist)
    }
}

/// Place, assemble and verify `netlist`.
pub fn generate(mut netlist: Netlist, symbols: &dyn SymbolSource, config: &SynthConfig) -> Generation {
    let report = placement::place(&mut netlist, symbols, &config.placement);
    let mut errors = report.errors;

    let (document, pins, assembly_errors) = {
        let mut assembler = Assembler::new(&netlist, symbols, config);
        let document = assembler.assemble();
        let pins = assembler.pins().to_vec();
        (document, pins, std::mem::take(&mut assembler.errors))
    };
    errors.extend(assembly_errors);
    errors.extend(verify::check_overlaps(&netlist, symbols, config.assembly.overlap_padding));
    if config.assembly.emit_wires {
        errors.extend(verify::check_wires(
            &netlist,
            symbols,
            &pins,
            &document.wires,
            config.assembly.touch_tolerance,
        ));
    }

    if errors.is_empty() {
        log::info!(
            "generated {}: {} symbols, {} wires",
            netlist.name,
            document.symbols.len(),
            document.wires.len()
        );
    } else {
        log::warn!("generated {} with {} problems", netlist.name, errors.len());
    }
    Generation {
        netlist,
        document,
        errors,
    }
}
