//! Connectivity data model: components, pins, nets and composables.
//!
//! Everything is stored in flat arenas owned by a
//! [`BuildContext`](crate::context::BuildContext) and addressed by typed
//! indices, so "which net is this pin on" is an indexed lookup and nothing
//! holds a pointer back into its container.

use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(
    /// Index of a [`Component`].
    ComponentId
);
arena_id!(
    /// Index of a [`Pin`].
    PinId
);
arena_id!(
    /// Index of a [`Net`].
    NetId
);
arena_id!(
    /// Index of a [`Composable`].
    ComposableId
);

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// A local position plus rotation (degrees, counter-clockwise as seen on the
/// sheet). Sheet coordinates grow rightward in x and downward in y.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
}

impl Placement {
    pub fn new(x: f64, y: f64, rotation: f64) -> Self {
        Self { x, y, rotation }
    }

    pub fn at(x: f64, y: f64) -> Self {
        Self::new(x, y, 0.0)
    }

    /// Rotate a sheet-frame offset by this placement's rotation.
    pub fn rotate_offset(&self, dx: f64, dy: f64) -> (f64, f64) {
        rotate_sheet(dx, dy, self.rotation)
    }

    /// Resolve `local` (expressed in this placement's frame) into the frame
    /// this placement itself lives in.
    pub fn compose(&self, local: &Placement) -> Placement {
        let (dx, dy) = self.rotate_offset(local.x, local.y);
        Placement {
            x: self.x + dx,
            y: self.y + dy,
            rotation: normalize_degrees(self.rotation + local.rotation),
        }
    }

    /// Express the absolute `abs` in this placement's frame. Inverse of
    /// [`Placement::compose`].
    pub fn localize(&self, abs: &Placement) -> Placement {
        let (dx, dy) = rotate_sheet(abs.x - self.x, abs.y - self.y, -self.rotation);
        Placement {
            x: dx,
            y: dy,
            rotation: normalize_degrees(abs.rotation - self.rotation),
        }
    }
}

/// Normalize an angle into `[0, 360)`.
pub fn normalize_degrees(deg: f64) -> f64 {
    let r = deg.rem_euclid(360.0);
    if (r - 360.0).abs() < 1e-9 {
        0.0
    } else {
        r
    }
}

/// Counter-clockwise (visual) rotation of a y-down offset.
///
/// Quarter turns use exact tables so that repeated composition never drifts
/// off the schematic grid.
pub fn rotate_sheet(dx: f64, dy: f64, deg: f64) -> (f64, f64) {
    let r = normalize_degrees(deg);
    let quarter = r / 90.0;
    if (quarter - quarter.round()).abs() < 1e-9 {
        return match quarter.round() as i64 % 4 {
            0 => (dx, dy),
            1 => (dy, -dx),
            2 => (-dx, -dy),
            _ => (-dy, dx),
        };
    }
    let (s, c) = r.to_radians().sin_cos();
    (dx * c + dy * s, -dx * s + dy * c)
}

// ---------------------------------------------------------------------------
// Pins and nets
// ---------------------------------------------------------------------------

/// One electrical contact of a component.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub id: PinId,
    pub component: ComponentId,
    /// Pin number or name as written by the circuit author.
    pub key: String,
    /// Net membership. A pin is on at most one net.
    pub net: Option<NetId>,
    /// Latched once the pin is explicitly marked Do-Not-Connect.
    pub dnc: bool,
}

/// A set of electrically identical pins, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub id: NetId,
    pub name: Option<String>,
    pub pins: Vec<PinId>,
    /// Explicit power-class flag (name heuristics also apply).
    pub power: bool,
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Lazily populated map from pin key to [`PinId`].
///
/// Reading a key that has never been seen creates the pin; writing goes
/// through [`BuildContext::connect`](crate::context::BuildContext::connect)
/// so net bookkeeping stays consistent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinAccessor {
    keys: BTreeMap<String, PinId>,
    order: Vec<PinId>,
}

impl PinAccessor {
    pub fn get(&self, key: &str) -> Option<PinId> {
        self.keys.get(key).copied()
    }

    pub(crate) fn get_or_insert_with(&mut self, key: &str, mint: impl FnOnce() -> PinId) -> PinId {
        if let Some(&id) = self.keys.get(key) {
            return id;
        }
        let id = mint();
        self.keys.insert(key.to_string(), id);
        self.order.push(id);
        id
    }

    /// Pins in the order they were first touched.
    pub fn iter(&self) -> impl Iterator<Item = PinId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A placed circuit element.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: ComponentId,
    /// Symbol library id, e.g. `Device:R`.
    pub symbol: String,
    /// Reference designator, e.g. `R1`.
    pub reference: String,
    pub value: Option<String>,
    pub footprint: Option<String>,
    /// Local position in the parent's frame; `None` until placed.
    pub position: Option<Placement>,
    /// Whether `position` was supplied by the author.
    pub fixed: bool,
    pub parent: Option<ComposableId>,
    /// Layout clustering tag.
    pub group: Option<String>,
    /// Single-pin Do-Not-Connect marker created by `dnc()`.
    pub marker: bool,
    pub pins: PinAccessor,
}

/// Parameters for a new [`Component`].
#[derive(Debug, Clone, Default)]
pub struct ComponentSpec {
    pub symbol: String,
    pub reference: String,
    pub value: Option<String>,
    pub footprint: Option<String>,
    pub position: Option<Placement>,
    pub parent: Option<ComposableId>,
    pub group: Option<String>,
}

impl ComponentSpec {
    pub fn new(symbol: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            reference: reference.into(),
            ..Default::default()
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn footprint(mut self, footprint: impl Into<String>) -> Self {
        self.footprint = Some(footprint.into());
        self
    }

    pub fn at(mut self, placement: Placement) -> Self {
        self.position = Some(placement);
        self
    }

    pub fn parent(mut self, parent: ComposableId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Composables
// ---------------------------------------------------------------------------

/// A child slot of a [`Composable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Child {
    Component(ComponentId),
    Composable(ComposableId),
}

/// The externally visible connections of a composable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interface {
    /// Explicitly exposed ports, by name.
    pub ports: Vec<(String, NetId)>,
    /// Nets joining a descendant pin to a pin outside the composable.
    pub bridged: Vec<NetId>,
}

/// A named, reusable sub-circuit.
#[derive(Debug, Clone, PartialEq)]
pub struct Composable {
    pub id: ComposableId,
    pub name: String,
    pub position: Option<Placement>,
    pub fixed: bool,
    pub parent: Option<ComposableId>,
    pub children: Vec<Child>,
    pub ports: BTreeMap<String, NetId>,
    pub(crate) interface: Option<Interface>,
}

impl Composable {
    /// The cached interface, if it has been computed.
    pub fn cached_interface(&self) -> Option<&Interface> {
        self.interface.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_turns_are_exact() {
        assert_eq!(rotate_sheet(1.0, 0.0, 90.0), (0.0, -1.0));
        assert_eq!(rotate_sheet(1.0, 0.0, 180.0), (-1.0, -0.0));
        assert_eq!(rotate_sheet(0.0, -3.81, 90.0), (-3.81, 0.0));
        assert_eq!(rotate_sheet(2.0, 1.0, -90.0), (-1.0, 2.0));
    }

    #[test]
    fn compose_then_localize_is_identity() {
        let parent = Placement::new(10.0, 5.0, 90.0);
        let local = Placement::new(2.54, -1.27, 180.0);
        let abs = parent.compose(&local);
        assert_eq!(abs.rotation, 270.0);
        let back = parent.localize(&abs);
        assert!((back.x - local.x).abs() < 1e-9);
        assert!((back.y - local.y).abs() < 1e-9);
        assert_eq!(back.rotation, 180.0);
    }

    #[test]
    fn pin_accessor_creates_once() {
        let mut acc = PinAccessor::default();
        let mut next = 0;
        let a = acc.get_or_insert_with("1", || {
            next += 1;
            PinId(7)
        });
        let b = acc.get_or_insert_with("1", || {
            next += 1;
            PinId(8)
        });
        assert_eq!(a, b);
        assert_eq!(next, 1);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.get("2"), None);
    }
}
