//! YAML-based synthesis configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration.
//!
//! ```yaml
//! placement:
//!   strategy: grid        # or `force`
//!   spacing: 5.08
//! router:
//!   pitch: 1.27
//!   turn_penalty: 4
//!   escape:
//!     mode: fixed
//!     distance: 2.54
//! assembly:
//!   emit_wires: true
//!   paper: A4
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// How a cluster arranges its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Row/column grid with `ceil(sqrt(n))` columns.
    #[default]
    Grid,
    /// Force-directed simulation.
    Force,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    #[serde(default)]
    pub strategy: PlacementStrategy,
    /// Force-simulation steps.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Gap between sibling bounding boxes.
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    /// Routing-corridor padding added per connected net.
    #[serde(default = "default_corridor_per_net")]
    pub corridor_per_net: f64,
    #[serde(default = "default_max_corridor")]
    pub max_corridor: f64,
    /// Largest uniform scale tolerated when separating fixed siblings.
    #[serde(default = "default_max_fixed_scale")]
    pub max_fixed_scale: f64,
    /// Final positions snap to this pitch (0 disables).
    #[serde(default = "default_grid_snap")]
    pub grid_snap: f64,
    #[serde(default = "default_repulsion")]
    pub repulsion: f64,
    #[serde(default = "default_attraction")]
    pub attraction: f64,
    #[serde(default = "default_gravity")]
    pub gravity: f64,
    #[serde(default = "default_damping")]
    pub damping: f64,
}

fn default_iterations() -> usize { 300 }
fn default_spacing() -> f64 { 5.08 }
fn default_corridor_per_net() -> f64 { 0.635 }
fn default_max_corridor() -> f64 { 5.08 }
fn default_max_fixed_scale() -> f64 { 10.0 }
fn default_grid_snap() -> f64 { 1.27 }
fn default_repulsion() -> f64 { 100.0 }
fn default_attraction() -> f64 { 0.05 }
fn default_gravity() -> f64 { 0.01 }
fn default_damping() -> f64 { 0.85 }

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            strategy: PlacementStrategy::default(),
            iterations: default_iterations(),
            spacing: default_spacing(),
            corridor_per_net: default_corridor_per_net(),
            max_corridor: default_max_corridor(),
            max_fixed_scale: default_max_fixed_scale(),
            grid_snap: default_grid_snap(),
            repulsion: default_repulsion(),
            attraction: default_attraction(),
            gravity: default_gravity(),
            damping: default_damping(),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// How far escape wires lead away from a pin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EscapeModel {
    /// A fixed sheet distance.
    Fixed { distance: f64 },
    /// A whole number of router grid cells.
    PitchRelative { cells: u32 },
}

impl Default for EscapeModel {
    fn default() -> Self {
        EscapeModel::Fixed { distance: 2.54 }
    }
}

impl EscapeModel {
    pub fn distance(&self, pitch: f64) -> f64 {
        match *self {
            EscapeModel::Fixed { distance } => distance,
            EscapeModel::PitchRelative { cells } => f64::from(cells) * pitch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_pitch")]
    pub pitch: f64,
    /// Extra cost for every change of direction.
    #[serde(default = "default_turn_penalty")]
    pub turn_penalty: u32,
    /// Clearance kept around component bodies.
    #[serde(default = "default_obstacle_padding")]
    pub obstacle_padding: f64,
    /// Free cells around the routing region.
    #[serde(default = "default_margin_cells")]
    pub margin_cells: usize,
    /// Routing regions larger than this are refused.
    #[serde(default = "default_max_cells")]
    pub max_cells: usize,
    #[serde(default)]
    pub escape: EscapeModel,
}

fn default_pitch() -> f64 { 1.27 }
fn default_turn_penalty() -> u32 { 4 }
fn default_obstacle_padding() -> f64 { 0.635 }
fn default_margin_cells() -> usize { 10 }
fn default_max_cells() -> usize { 4_000_000 }

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pitch: default_pitch(),
            turn_penalty: default_turn_penalty(),
            obstacle_padding: default_obstacle_padding(),
            margin_cells: default_margin_cells(),
            max_cells: default_max_cells(),
            escape: EscapeModel::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_true")]
    pub emit_wires: bool,
    #[serde(default = "default_true")]
    pub emit_symbols: bool,
    /// Padding applied to bounding boxes in the overlap check.
    #[serde(default)]
    pub overlap_padding: f64,
    /// Distance within which a wire counts as touching a pin.
    #[serde(default = "default_touch_tolerance")]
    pub touch_tolerance: f64,
    #[serde(default = "default_paper")]
    pub paper: String,
}

fn default_true() -> bool { true }
fn default_touch_tolerance() -> f64 { 0.01 }
fn default_paper() -> String { "A4".into() }

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            emit_wires: true,
            emit_symbols: true,
            overlap_padding: 0.0,
            touch_tolerance: default_touch_tolerance(),
            paper: default_paper(),
        }
    }
}

impl SynthConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }
}
