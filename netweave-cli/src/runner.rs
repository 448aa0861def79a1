//! Synthesis orchestration.
//!
//! [`SynthRunner`] loads a circuit definition, its configuration and symbol
//! library, replays the circuit into a fresh build context and runs the
//! layout pipeline. `synth` writes the artifacts; `validate` only reports.
//!
//! ```rust,ignore
//! use netweave_cli::runner::{SynthOptions, SynthRunner};
//!
//! let runner = SynthRunner::new(SynthOptions {
//!     circuit: "circuits/divider.yaml".into(),
//!     out_dir: "build".into(),
//!     ..SynthOptions::default()
//! })?;
//! let report = runner.synth()?;
//! report.print_summary();
//! ```

use crate::report::SynthReport;
use netweave::context::BuildContext;
use netweave::error::CircuitError;
use netweave::CircuitDef;
use netweave_layout::config::SynthConfig;
use netweave_layout::{generate, ConfigError, Generation, IdMap, IdMapError, SymbolError, SymbolLibrary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_CONFIG: &str = "netweave.yaml";
pub const DEFAULT_IDS: &str = "ids.json";

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to load circuit: {0}")]
    CircuitError(#[from] CircuitError),
    #[error("Failed to load config: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Failed to load symbols: {0}")]
    SymbolError(#[from] SymbolError),
    #[error("Id map error: {0}")]
    IdMapError(#[from] IdMapError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Synthesis options, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    /// Circuit definition (YAML).
    pub circuit: PathBuf,
    /// Directory receiving the schematic, netlist and id map.
    pub out_dir: PathBuf,
    /// Configuration file; defaults apply when it does not exist.
    pub config: Option<PathBuf>,
    /// Extra symbol definitions layered over the builtin library.
    pub symbols: Option<PathBuf>,
    /// Id map location, `<out_dir>/ids.json` by default.
    pub ids: Option<PathBuf>,
    pub no_wires: bool,
    pub no_symbols: bool,
}

pub struct SynthRunner {
    options: SynthOptions,
    config: SynthConfig,
    library: Arc<SymbolLibrary>,
    circuit: CircuitDef,
}

impl SynthRunner {
    pub fn new(options: SynthOptions) -> Result<Self, RunnerError> {
        let mut config = match &options.config {
            Some(path) => SynthConfig::load_or_default(path)?,
            None => SynthConfig::default(),
        };
        if options.no_wires {
            config.assembly.emit_wires = false;
        }
        if options.no_symbols {
            config.assembly.emit_symbols = false;
        }

        let library = match &options.symbols {
            Some(path) => SymbolLibrary::load(path)?,
            None => SymbolLibrary::builtin(),
        };
        let circuit = CircuitDef::load(&options.circuit)?;
        log::debug!(
            "loaded {} ({} components, {} nets)",
            circuit.name,
            circuit.components.len(),
            circuit.nets.len()
        );

        Ok(Self {
            options,
            config,
            library: Arc::new(library),
            circuit,
        })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn ids_path(&self) -> PathBuf {
        self.options
            .ids
            .clone()
            .unwrap_or_else(|| self.options.out_dir.join(DEFAULT_IDS))
    }

    /// Build the circuit and run placement, assembly and verification.
    pub fn generate(&self) -> Result<Generation, RunnerError> {
        let mut ctx = BuildContext::new(&self.circuit.name);
        ctx.start();
        ctx.set_pin_resolver(self.library.clone());
        self.circuit.build(&mut ctx, &*self.library)?;
        Ok(generate(ctx.drain(), &*self.library, &self.config))
    }

    /// Generate and report without writing anything.
    pub fn validate(&self) -> Result<SynthReport, RunnerError> {
        let generation = self.generate()?;
        Ok(SynthReport::new(&self.options.circuit, &generation))
    }

    /// Generate and write `<name>.kicad_sch`, `<name>.net` and the id map.
    /// Artifacts are written even when the generation has errors.
    pub fn synth(&self) -> Result<SynthReport, RunnerError> {
        let generation = self.generate()?;
        let out_dir = &self.options.out_dir;
        std::fs::create_dir_all(out_dir)?;

        let ids_path = self.ids_path();
        let mut ids = IdMap::load_or_new(&ids_path)?;
        let name = &generation.netlist.name;

        let schematic = out_dir.join(format!("{name}.kicad_sch"));
        write(&schematic, &generation.schematic(&*self.library, &mut ids))?;
        let netlist = out_dir.join(format!("{name}.net"));
        write(&netlist, &generation.kicad_netlist())?;
        if let Some(parent) = ids_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        ids.save(&ids_path)?;
        log::info!("wrote {} ({} ids)", schematic.display(), ids.len());

        let mut report = SynthReport::new(&self.options.circuit, &generation);
        report.artifacts = vec![schematic, netlist, ids_path];
        Ok(report)
    }
}

fn write(path: &Path, contents: &str) -> Result<(), RunnerError> {
    std::fs::write(path, contents)?;
    log::debug!("wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// Write the default configuration to `path`.
pub fn init_config(path: &Path) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SynthConfig::default().save(path)?;
    Ok(())
}
