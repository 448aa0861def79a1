//! netweave: compile circuit definitions into KiCad schematics.
//!
//! # Usage
//!
//! ```bash
//! # Place, route and write build/divider.kicad_sch + build/divider.net
//! netweave synth circuits/divider.yaml -o build
//!
//! # Placement and symbols only, for debugging layouts
//! netweave synth circuits/divider.yaml --no-wires
//!
//! # Run the pipeline and print the report without writing anything
//! netweave validate circuits/divider.yaml
//!
//! # Write the default configuration
//! netweave init
//! ```

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use netweave_cli::runner::{init_config, SynthOptions, SynthRunner, DEFAULT_CONFIG};
use netweave_cli::SynthReport;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "netweave")]
#[command(about = "Compile circuit definitions into placed, wired KiCad schematics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct SynthArgs {
    /// Circuit definition (YAML)
    circuit: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Path to configuration YAML
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Extra symbol definitions (YAML)
    #[arg(long)]
    symbols: Option<PathBuf>,

    /// Persisted id map (defaults to <output>/ids.json)
    #[arg(long)]
    ids: Option<PathBuf>,

    /// Do not emit wires
    #[arg(long)]
    no_wires: bool,

    /// Do not emit symbol instances
    #[arg(long)]
    no_symbols: bool,

    /// Output JSON report path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl SynthArgs {
    fn options(&self) -> SynthOptions {
        SynthOptions {
            circuit: self.circuit.clone(),
            out_dir: self.output.clone(),
            config: Some(self.config.clone()),
            symbols: self.symbols.clone(),
            ids: self.ids.clone(),
            no_wires: self.no_wires,
            no_symbols: self.no_symbols,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the schematic and netlist for a circuit
    Synth(SynthArgs),

    /// Run placement and verification, print the report, write nothing
    Validate(SynthArgs),

    /// Write the default configuration
    Init {
        /// Where to write it
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match &cli.command {
        Commands::Synth(args) => run(args, true),
        Commands::Validate(args) => run(args, false),
        Commands::Init { output, force } => init(output, *force),
    }
}

fn run(args: &SynthArgs, write: bool) -> anyhow::Result<()> {
    println!(
        "{} {} {}",
        "▶".blue(),
        if write { "Synthesizing" } else { "Validating" },
        args.circuit.display()
    );

    if !args.config.exists() {
        println!("  {} Config not found, using defaults", "⚠".yellow());
    }

    let runner = SynthRunner::new(args.options())?;
    let report: SynthReport = if write { runner.synth()? } else { runner.validate()? };
    report.print_summary();

    if let Some(ref path) = args.report {
        report.save_json(path)?;
        println!("Report saved to: {}", path.display());
    }

    // Artifacts are already on disk; problems only change the exit code.
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn init(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }
    init_config(output)?;
    println!("{} Created default config at: {}", "✓".green(), output.display());
    println!("\nEdit this file to tune placement, routing and assembly.");
    Ok(())
}
