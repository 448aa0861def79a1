//! netweave: describe a circuit as components, pins and nets, and compile
//! it into a KiCad schematic.
//!
//! # Modules
//!
//! - [`model`]: components, pins, nets and composables in typed arenas
//! - [`context`]: build-scoped registry enforcing connection rules
//! - [`netlist`]: immutable snapshot consumed by layout
//! - [`circuit`]: YAML circuit definitions replayed into a build context
//! - [`sexpr`]: S-expression document model, formatter and parser
//! - [`kicad`]: KiCad netlist export

pub mod circuit;
pub mod context;
pub mod error;
pub mod kicad;
pub mod model;
pub mod netlist;
pub mod sexpr;

pub use circuit::CircuitDef;
pub use context::{BuildContext, Tie};
pub use error::{CircuitError, ConnectError, SexprError};
pub use model::{
    Child, Component, ComponentId, ComponentSpec, Composable, ComposableId, Interface, Net, NetId,
    Pin, PinId, Placement,
};
pub use netlist::Netlist;
pub use sexpr::Sexpr;

/// Maps a pin key as written by a circuit author to the symbol's pin
/// number.
///
/// Numbers win over names: a key is first matched against pin numbers and
/// only then against pin names, so several pins sharing a name (e.g. two
/// `GND` pins) never collide.
pub trait PinResolver {
    /// Canonical pin number for `key` on `symbol`, or `None` when the
    /// symbol is unknown or has no such pin.
    fn pin_number(&self, symbol: &str, key: &str) -> Option<String>;
}
