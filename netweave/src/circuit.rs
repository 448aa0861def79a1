//! Circuit definition files.
//!
//! A YAML description of components, nets, composables and Do-Not-Connect
//! markers, replayed against a [`BuildContext`] through the same calls a
//! programmatic circuit description would make.

use crate::context::BuildContext;
use crate::error::CircuitError;
use crate::model::*;
use crate::PinResolver;
use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, rest, verify},
    sequence::separated_pair,
    IResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CircuitDef {
    pub name: String,
    #[serde(default)]
    pub composables: Vec<ComposableDef>,
    #[serde(default)]
    pub components: Vec<ComponentDef>,
    #[serde(default)]
    pub nets: Vec<NetDef>,
    #[serde(default)]
    pub dnc: Vec<DncDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComposableDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// `[x, y]` or `[x, y, rotation]` in the parent's frame.
    #[serde(default)]
    pub at: Option<Vec<f64>>,
    /// Port name to a pin reference whose net is exposed.
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentDef {
    #[serde(rename = "ref")]
    pub reference: String,
    pub symbol: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub footprint: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub at: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub power: bool,
    pub pins: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DncDef {
    pub pin: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Pin keys are taken exactly as written.
pub struct LiteralPins;

impl PinResolver for LiteralPins {
    fn pin_number(&self, _symbol: &str, _key: &str) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Pin references
// ---------------------------------------------------------------------------

fn designator(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)
}

/// `R1.2` or `U1.IN+`
fn pin_ref(input: &str) -> IResult<&str, (&str, &str)> {
    all_consuming(separated_pair(
        designator,
        char('.'),
        verify(rest, |key: &str| !key.is_empty()),
    ))(input)
}

/// Split `REF.KEY` into its two halves.
pub fn parse_pin_ref(text: &str) -> Result<(&str, &str), CircuitError> {
    pin_ref(text.trim())
        .map(|(_, parts)| parts)
        .map_err(|_| CircuitError::BadPinRef(text.to_string()))
}

fn placement(owner: &str, at: &Option<Vec<f64>>) -> Result<Option<Placement>, CircuitError> {
    match at.as_deref() {
        None => Ok(None),
        Some([x, y]) => Ok(Some(Placement::at(*x, *y))),
        Some([x, y, r]) => Ok(Some(Placement::new(*x, *y, *r))),
        Some(_) => Err(CircuitError::BadPosition(owner.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Loading and building
// ---------------------------------------------------------------------------

impl CircuitDef {
    pub fn load(path: &Path) -> Result<Self, CircuitError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, CircuitError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Replay the definition into `ctx`. Pin keys are canonicalized through
    /// `pins` (number before name) so that `U1.GND` and `U1.4` address the
    /// same pin when the symbol says they are.
    pub fn build(&self, ctx: &mut BuildContext, pins: &dyn PinResolver) -> Result<(), CircuitError> {
        let composables = self.build_composables(ctx)?;

        let mut refs: HashMap<&str, ComponentId> = HashMap::new();
        for def in &self.components {
            if refs.contains_key(def.reference.as_str()) {
                return Err(CircuitError::DuplicateRef(def.reference.clone()));
            }
            let mut spec = ComponentSpec::new(&def.symbol, &def.reference);
            spec.value = def.value.clone();
            spec.footprint = def.footprint.clone();
            spec.group = def.group.clone();
            spec.position = placement(&def.reference, &def.at)?;
            if let Some(parent) = &def.parent {
                let id = composables
                    .get(parent.as_str())
                    .ok_or_else(|| CircuitError::UnknownComposable(parent.clone()))?;
                spec.parent = Some(*id);
            }
            refs.insert(&def.reference, ctx.add_component(spec)?);
        }

        let lookup = |ctx: &mut BuildContext, text: &str| -> Result<PinId, CircuitError> {
            let (reference, key) = parse_pin_ref(text)?;
            let comp = *refs
                .get(reference)
                .ok_or_else(|| CircuitError::UnknownRef(text.to_string()))?;
            let symbol = ctx
                .component(comp)
                .map(|c| c.symbol.clone())
                .unwrap_or_default();
            let key = pins.pin_number(&symbol, key).unwrap_or_else(|| key.to_string());
            Ok(ctx.pin(comp, &key)?)
        };

        for def in &self.nets {
            let net = ctx.add_net(def.name.as_deref());
            ctx.set_power(net, def.power)?;
            for text in &def.pins {
                let pin = lookup(ctx, text)?;
                ctx.tie(net, pin.into())?;
            }
        }

        for def in &self.composables {
            let Some(&id) = composables.get(def.name.as_str()) else {
                continue;
            };
            for (port, text) in &def.ports {
                let pin = lookup(ctx, text)?;
                let net = match ctx.net_of(pin) {
                    Some(net) => net,
                    None => {
                        let net = ctx.add_net(Some(port));
                        ctx.tie(net, pin.into())?;
                        net
                    }
                };
                ctx.expose(id, port.clone(), net)?;
            }
        }

        for def in &self.dnc {
            let pin = lookup(ctx, &def.pin)?;
            ctx.dnc(pin, def.reason.as_deref())?;
        }

        log::info!(
            "built {:?}: {} components, {} nets, {} composables",
            self.name,
            self.components.len(),
            ctx.live_net_count(),
            composables.len()
        );
        Ok(())
    }

    /// Register composables parents-first.
    fn build_composables(
        &self,
        ctx: &mut BuildContext,
    ) -> Result<HashMap<&str, ComposableId>, CircuitError> {
        let mut built: HashMap<&str, ComposableId> = HashMap::new();
        let mut pending: Vec<&ComposableDef> = self.composables.iter().collect();
        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();
            for def in pending {
                let parent = match &def.parent {
                    None => None,
                    Some(p) => match built.get(p.as_str()) {
                        Some(id) => Some(*id),
                        None => {
                            waiting.push(def);
                            continue;
                        }
                    },
                };
                let at = placement(&def.name, &def.at)?;
                let id = ctx.add_composable(&def.name, parent, at)?;
                built.insert(&def.name, id);
            }
            if waiting.len() == before {
                let stuck = waiting[0];
                let parent = stuck.parent.clone().unwrap_or_default();
                let declared = self.composables.iter().any(|c| c.name == parent);
                return Err(if declared {
                    CircuitError::ContainmentCycle(stuck.name.clone())
                } else {
                    CircuitError::UnknownComposable(parent)
                });
            }
            pending = waiting;
        }
        Ok(built)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
