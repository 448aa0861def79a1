//! Symbol geometry: pin offsets and body extents per symbol id.
//!
//! Geometry follows KiCad library conventions: offsets are millimetres with
//! y pointing **up**, and a pin's `at` is its connection point with the
//! angle pointing from that point toward the body. Everything handed out by
//! this module for layout is converted to the y-down sheet frame.
//!
//! Symbols may `extends` another symbol: the derived symbol inherits the
//! base's pins (overriding by number) and body. Inheritance is resolved in
//! dependency order so every base is complete before anything derived from
//! it is built.

use crate::types::{Point, Rect};
use netweave::model::{rotate_sheet, Placement};
use netweave::PinResolver;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Side of the square assumed for symbols the library does not know.
pub const DEFAULT_SYMBOL_SIZE: f64 = 10.16;

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Failed to read symbol library: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Symbol {symbol} extends unknown symbol {base}")]
    UnknownBase { symbol: String, base: String },
    #[error("Symbol inheritance cycle through {0}")]
    InheritanceCycle(String),
}

// ---------------------------------------------------------------------------
// Definitions (file format)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinDef {
    pub number: String,
    #[serde(default)]
    pub name: String,
    /// `[x, y, angle]` in library coordinates.
    pub at: [f64; 3],
    #[serde(default = "default_pin_length")]
    pub length: f64,
}

fn default_pin_length() -> f64 { 2.54 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolDef {
    pub id: String,
    #[serde(default)]
    pub extends: Option<String>,
    /// `[x0, y0, x1, y1]` in library coordinates.
    #[serde(default)]
    pub body: Option<[f64; 4]>,
    #[serde(default)]
    pub pins: Vec<PinDef>,
    #[serde(default)]
    pub power: bool,
}

// ---------------------------------------------------------------------------
// Resolved geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PinGeometry {
    pub number: String,
    pub name: String,
    /// Connection point, library frame (y up).
    pub x: f64,
    pub y: f64,
    /// Direction from the connection point toward the body, degrees.
    pub angle: f64,
    pub length: f64,
}

impl PinGeometry {
    /// Offset of the connection point from the symbol origin, sheet frame.
    pub fn sheet_offset(&self) -> (f64, f64) {
        (self.x, -self.y)
    }

    /// Direction pointing away from the body, degrees.
    pub fn outward_angle(&self) -> f64 {
        self.angle + 180.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolGeometry {
    pub id: String,
    pub pins: Vec<PinGeometry>,
    /// Body outline at zero rotation, sheet frame.
    pub body: Option<Rect>,
    pub power: bool,
}

impl SymbolGeometry {
    /// Pin addressed by `key`: pin numbers are matched before pin names.
    pub fn find_pin(&self, key: &str) -> Option<&PinGeometry> {
        self.pins
            .iter()
            .find(|p| p.number == key)
            .or_else(|| self.pins.iter().find(|p| p.name == key))
    }

    /// Body plus pin tips at zero rotation, relative to the symbol origin.
    pub fn local_bounds(&self) -> Rect {
        let mut bounds = self.body;
        for pin in &self.pins {
            let (x, y) = pin.sheet_offset();
            let tip = Rect::new(x, y, 0.0, 0.0);
            bounds = Some(match bounds {
                Some(b) => b.union(&tip),
                None => tip,
            });
        }
        bounds.unwrap_or_else(default_bounds)
    }
}

fn default_bounds() -> Rect {
    Rect::centered(Point::default(), DEFAULT_SYMBOL_SIZE, DEFAULT_SYMBOL_SIZE)
}

/// Rotate a zero-rotation box and move it to `at`.
pub fn place_bounds(local: &Rect, at: &Placement) -> Rect {
    let corners = [
        (local.x, local.y),
        (local.right(), local.y),
        (local.x, local.bottom()),
        (local.right(), local.bottom()),
    ];
    let mut out: Option<Rect> = None;
    for (cx, cy) in corners {
        let (dx, dy) = rotate_sheet(cx, cy, at.rotation);
        let corner = Rect::new(at.x + dx, at.y + dy, 0.0, 0.0);
        out = Some(match out {
            Some(r) => r.union(&corner),
            None => corner,
        });
    }
    out.unwrap_or_default()
}

/// Source of symbol geometry.
pub trait SymbolSource {
    fn geometry(&self, symbol: &str) -> Option<&SymbolGeometry>;

    /// Local bounds of `symbol`, or a conservative default box when the
    /// symbol is unknown.
    fn local_bounds(&self, symbol: &str) -> Rect {
        match self.geometry(symbol) {
            Some(g) => g.local_bounds(),
            None => default_bounds(),
        }
    }

    /// Sheet-frame bounding box of `symbol` placed at `at`.
    fn bounding_box(&self, symbol: &str, at: &Placement) -> Rect {
        place_bounds(&self.local_bounds(symbol), at)
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SymbolLibrary {
    symbols: BTreeMap<String, SymbolGeometry>,
}

impl SymbolSource for SymbolLibrary {
    fn geometry(&self, symbol: &str) -> Option<&SymbolGeometry> {
        self.symbols.get(symbol)
    }
}

impl PinResolver for SymbolLibrary {
    fn pin_number(&self, symbol: &str, key: &str) -> Option<String> {
        self.geometry(symbol)?.find_pin(key).map(|p| p.number.clone())
    }
}

/// Depth-first dependency ordering of symbol definitions, bases first.
struct DepOrderer<'a> {
    defs: &'a BTreeMap<&'a str, &'a SymbolDef>,
    stack: Vec<&'a str>,
    seen: HashSet<&'a str>,
    pending: HashSet<&'a str>,
}

impl<'a> DepOrderer<'a> {
    fn order(defs: &'a BTreeMap<&'a str, &'a SymbolDef>) -> Result<Vec<&'a str>, SymbolError> {
        let mut this = Self {
            defs,
            stack: Vec::with_capacity(defs.len()),
            seen: HashSet::new(),
            pending: HashSet::new(),
        };
        for &id in defs.keys() {
            this.push(id)?;
        }
        Ok(this.stack)
    }

    fn push(&mut self, id: &'a str) -> Result<(), SymbolError> {
        if self.seen.contains(id) {
            return Ok(());
        }
        if !self.pending.insert(id) {
            return Err(SymbolError::InheritanceCycle(id.to_string()));
        }
        let def = self.defs[id];
        if let Some(base) = def.extends.as_deref() {
            let (&base, _) = self.defs.get_key_value(base).ok_or_else(|| {
                SymbolError::UnknownBase {
                    symbol: id.to_string(),
                    base: base.to_string(),
                }
            })?;
            self.push(base)?;
        }
        self.pending.remove(id);
        self.seen.insert(id);
        self.stack.push(id);
        Ok(())
    }
}

fn body_rect(body: [f64; 4]) -> Rect {
    // Library y-up to sheet y-down.
    Rect::from_corners(Point::new(body[0], -body[1]), Point::new(body[2], -body[3]))
}

impl SymbolLibrary {
    /// Resolve a set of definitions.
    pub fn from_defs(defs: &[SymbolDef]) -> Result<Self, SymbolError> {
        let by_id: BTreeMap<&str, &SymbolDef> = defs.iter().map(|d| (d.id.as_str(), d)).collect();
        let order = DepOrderer::order(&by_id)?;

        let mut symbols: BTreeMap<String, SymbolGeometry> = BTreeMap::new();
        for id in order {
            let def = by_id[id];
            let mut geom = match def.extends.as_deref().and_then(|b| symbols.get(b)) {
                Some(base) => SymbolGeometry {
                    id: id.to_string(),
                    ..base.clone()
                },
                None => SymbolGeometry {
                    id: id.to_string(),
                    pins: Vec::new(),
                    body: None,
                    power: false,
                },
            };
            if let Some(body) = def.body {
                geom.body = Some(body_rect(body));
            }
            geom.power |= def.power;
            for pin in &def.pins {
                let resolved = PinGeometry {
                    number: pin.number.clone(),
                    name: pin.name.clone(),
                    x: pin.at[0],
                    y: pin.at[1],
                    angle: pin.at[2],
                    length: pin.length,
                };
                match geom.pins.iter_mut().find(|p| p.number == pin.number) {
                    Some(existing) => *existing = resolved,
                    None => geom.pins.push(resolved),
                }
            }
            symbols.insert(id.to_string(), geom);
        }
        log::debug!("resolved {} symbols", symbols.len());
        Ok(Self { symbols })
    }

    /// The symbols shipped with netweave.
    pub fn builtin() -> Self {
        match Self::from_defs(&builtin_defs()) {
            Ok(lib) => lib,
            Err(e) => {
                log::error!("builtin symbol library is inconsistent: {e}");
                Self::default()
            }
        }
    }

    /// Builtin symbols plus (and overridden by) the definitions in `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SymbolError> {
        let contents = std::fs::read_to_string(path)?;
        let extra: Vec<SymbolDef> = serde_yaml::from_str(&contents)?;
        let mut defs = builtin_defs();
        defs.retain(|d| !extra.iter().any(|e| e.id == d.id));
        defs.extend(extra);
        Self::from_defs(&defs)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Builtin symbols
// ---------------------------------------------------------------------------

fn pin(number: &str, name: &str, x: f64, y: f64, angle: f64, length: f64) -> PinDef {
    PinDef {
        number: number.into(),
        name: name.into(),
        at: [x, y, angle],
        length,
    }
}

fn symbol(id: &str, body: [f64; 4], pins: Vec<PinDef>) -> SymbolDef {
    SymbolDef {
        id: id.into(),
        extends: None,
        body: Some(body),
        pins,
        power: false,
    }
}

fn connector(n: usize) -> SymbolDef {
    let pins = (0..n)
        .map(|i| {
            let y = 2.54 - 2.54 * i as f64;
            pin(&(i + 1).to_string(), &format!("Pin_{}", i + 1), -5.08, y, 0.0, 3.81)
        })
        .collect();
    let bottom = 2.54 - 2.54 * (n as f64 - 1.0) - 1.27;
    symbol(
        &format!("Connector:Conn_01x{n:02}"),
        [-1.27, 3.81, 1.27, bottom],
        pins,
    )
}

fn builtin_defs() -> Vec<SymbolDef> {
    let two_terminal = |id: &str, half_w: f64, half_h: f64, length: f64| {
        symbol(
            id,
            [-half_w, half_h, half_w, -half_h],
            vec![
                pin("1", "~", 0.0, 3.81, 270.0, length),
                pin("2", "~", 0.0, -3.81, 90.0, length),
            ],
        )
    };

    let mut defs = vec![
        two_terminal("Device:R", 1.016, 2.54, 1.27),
        two_terminal("Device:C", 2.032, 0.762, 2.794),
        two_terminal("Device:L", 1.016, 2.54, 1.27),
        symbol(
            "Device:D",
            [-1.27, 1.27, 1.27, -1.27],
            vec![
                pin("1", "K", -3.81, 0.0, 0.0, 2.54),
                pin("2", "A", 3.81, 0.0, 180.0, 2.54),
            ],
        ),
        SymbolDef {
            id: "Device:LED".into(),
            extends: Some("Device:D".into()),
            body: Some([-1.27, 1.778, 1.27, -1.27]),
            pins: Vec::new(),
            power: false,
        },
        symbol(
            "Amplifier_Operational:OpAmp_Dual",
            [-7.62, 5.08, 7.62, -5.08],
            vec![
                pin("1", "OUTA", -10.16, 3.81, 0.0, 2.54),
                pin("2", "-INA", -10.16, 1.27, 0.0, 2.54),
                pin("3", "+INA", -10.16, -1.27, 0.0, 2.54),
                pin("4", "V-", -10.16, -3.81, 0.0, 2.54),
                pin("5", "+INB", 10.16, -3.81, 180.0, 2.54),
                pin("6", "-INB", 10.16, -1.27, 180.0, 2.54),
                pin("7", "OUTB", 10.16, 1.27, 180.0, 2.54),
                pin("8", "V+", 10.16, 3.81, 180.0, 2.54),
            ],
        ),
    ];
    defs.extend([2, 3, 4].map(connector));

    for (id, body, angle) in [
        ("power:GND", [-1.27, 0.0, 1.27, -2.54], 270.0),
        ("power:VCC", [-1.27, 2.54, 1.27, 0.0], 90.0),
    ] {
        let name = id.trim_start_matches("power:");
        defs.push(SymbolDef {
            power: true,
            ..symbol(id, body, vec![pin("1", name, 0.0, 0.0, angle, 0.0)])
        });
    }
    defs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn builtin_library_resolves() {
        let lib = SymbolLibrary::builtin();
        assert_eq!(lib.len(), 11);
        let led = lib.geometry("Device:LED").unwrap();
        assert_eq!(led.pins.len(), 2);
        assert_eq!(led.find_pin("A").unwrap().number, "2");
        assert!(lib.geometry("power:GND").unwrap().power);
    }

    #[test]
    fn numbers_win_over_names() {
        let defs = vec![symbol(
            "X:Reg",
            [-2.54, 2.54, 2.54, -2.54],
            vec![
                pin("1", "GND", -5.08, 0.0, 0.0, 2.54),
                pin("2", "1", 5.08, 0.0, 180.0, 2.54),
                pin("3", "GND", 0.0, -5.08, 90.0, 2.54),
            ],
        )];
        let lib = SymbolLibrary::from_defs(&defs).unwrap();
        assert_eq!(lib.pin_number("X:Reg", "1").as_deref(), Some("1"));
        assert_eq!(lib.pin_number("X:Reg", "GND").as_deref(), Some("1"));
        assert_eq!(lib.pin_number("X:Reg", "3").as_deref(), Some("3"));
        assert_eq!(lib.pin_number("X:Nope", "1"), None);
    }

    #[test]
    fn derived_pins_override_by_number() {
        let mut child = symbol("B", [-1.0, 1.0, 1.0, -1.0], vec![pin("2", "OUT", 9.0, 0.0, 180.0, 1.0)]);
        child.extends = Some("A".into());
        let base = symbol(
            "A",
            [-5.0, 5.0, 5.0, -5.0],
            vec![pin("1", "IN", -7.0, 0.0, 0.0, 2.0), pin("2", "X", 7.0, 0.0, 180.0, 2.0)],
        );
        // Derived listed first: ordering must still build the base first.
        let lib = SymbolLibrary::from_defs(&[child, base]).unwrap();
        let b = lib.geometry("B").unwrap();
        assert_eq!(b.pins.len(), 2);
        assert_eq!(b.find_pin("2").unwrap().name, "OUT");
        assert_eq!(b.body, Some(Rect::new(-1.0, -1.0, 2.0, 2.0)));
    }

    #[test]
    fn inheritance_errors() {
        let mut a = symbol("A", [0.0; 4], vec![]);
        a.extends = Some("B".into());
        let mut b = symbol("B", [0.0; 4], vec![]);
        b.extends = Some("A".into());
        assert!(matches!(
            SymbolLibrary::from_defs(&[a.clone(), b]),
            Err(SymbolError::InheritanceCycle(_))
        ));
        assert!(matches!(
            SymbolLibrary::from_defs(&[a]),
            Err(SymbolError::UnknownBase { .. })
        ));
    }

    #[test]
    fn bounds_cover_pin_tips() {
        let lib = SymbolLibrary::builtin();
        let r = lib.local_bounds("Device:R");
        assert_relative_eq!(r.x, -1.016, epsilon = 1e-9);
        assert_relative_eq!(r.y, -3.81, epsilon = 1e-9);
        assert_relative_eq!(r.h, 7.62, epsilon = 1e-9);

        let rotated = lib.bounding_box("Device:R", &Placement::new(10.0, 20.0, 90.0));
        assert_relative_eq!(rotated.w, 7.62, epsilon = 1e-9);
        assert_relative_eq!(rotated.h, 2.032, epsilon = 1e-9);
        assert_relative_eq!(rotated.center().x, 10.0, epsilon = 1e-9);
        assert_relative_eq!(rotated.center().y, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn unknown_and_pinless_symbols() {
        let lib = SymbolLibrary::from_defs(&[symbol("M:Hole", [-1.5, 1.5, 1.5, -1.5], vec![])]).unwrap();
        let hole = lib.local_bounds("M:Hole");
        assert_relative_eq!(hole.w, 3.0);
        let unknown = lib.local_bounds("M:Missing");
        assert_relative_eq!(unknown.w, DEFAULT_SYMBOL_SIZE);
        assert_relative_eq!(unknown.center().x, 0.0);
    }

    #[test]
    fn load_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.yaml");
        std::fs::write(
            &path,
            "- id: Device:R\n  body: [-2, 2, 2, -2]\n  pins:\n    - {number: '1', at: [0, 5.08, 270]}\n    - {number: '2', at: [0, -5.08, 90]}\n",
        )
        .unwrap();
        let lib = SymbolLibrary::load(&path).unwrap();
        assert_eq!(lib.len(), 11);
        assert_relative_eq!(lib.local_bounds("Device:R").h, 10.16);
    }
}
