//! Synthesis report generation and display.
//!
//! # JSON Format
//!
//! The JSON output includes the circuit name and source, entity counts,
//! the collected error list with per-category totals, and the paths of
//! every artifact written.

use netweave_layout::Generation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Error categories, by message prefix.
pub const CATEGORIES: &[&str] = &["placement", "router", "overlap", "verify"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthReport {
    pub circuit: String,
    pub source: PathBuf,
    pub components: usize,
    pub nets: usize,
    pub symbols: usize,
    pub wires: usize,
    pub power_symbols: usize,
    pub no_connects: usize,
    /// Routed connections that fell back to a direct line.
    pub fallbacks: usize,
    pub errors: Vec<String>,
    pub artifacts: Vec<PathBuf>,
}

impl SynthReport {
    pub fn new(source: &Path, generation: &Generation) -> Self {
        let doc = &generation.document;
        Self {
            circuit: generation.netlist.name.clone(),
            source: source.to_path_buf(),
            components: generation.netlist.components.iter().filter(|c| !c.marker).count(),
            nets: generation.netlist.nets.len(),
            symbols: doc.symbols.len(),
            wires: doc.wires.len(),
            power_symbols: doc.power.len(),
            no_connects: doc.no_connects.len(),
            fallbacks: doc.routes.iter().filter(|r| r.fallback).count(),
            errors: generation.errors.clone(),
            artifacts: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error count per category; messages without a known prefix count as
    /// `other`.
    pub fn error_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.errors {
            let category = CATEGORIES
                .iter()
                .find(|c| e.starts_with(&format!("[{c}]")))
                .copied()
                .unwrap_or("other");
            *counts.entry(category).or_insert(0) += 1;
        }
        counts
    }

    /// Save report to JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Print human-readable summary to terminal.
    pub fn print_summary(&self) {
        use colored::Colorize;

        println!("\n{}", "═".repeat(60).bold());
        println!("{}", format!(" NETWEAVE · {} ", self.circuit).bold().on_blue());
        println!("{}", "═".repeat(60).bold());
        println!("Source:     {}", self.source.display().to_string().dimmed());
        println!(
            "Parts:      {} components, {} nets",
            self.components, self.nets
        );
        println!(
            "Drawn:      {} symbols, {} wires, {} power symbols, {} no-connects",
            self.symbols, self.wires, self.power_symbols, self.no_connects
        );
        if self.fallbacks > 0 {
            println!("Fallbacks:  {}", self.fallbacks.to_string().yellow());
        }

        for path in &self.artifacts {
            println!("  {} {}", "✓".green(), path.display());
        }

        println!("{}", "─".repeat(60));
        if self.is_clean() {
            println!("{}", "CLEAN".green().bold());
            return;
        }

        let counts = self
            .error_counts()
            .into_iter()
            .map(|(c, n)| format!("{c}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{} ({})", format!("{} PROBLEMS", self.errors.len()).red().bold(), counts);
        for e in &self.errors {
            println!("  {} {}", "✗".red(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(errors: &[&str]) -> SynthReport {
        SynthReport {
            circuit: "t".into(),
            source: "t.yaml".into(),
            components: 0,
            nets: 0,
            symbols: 0,
            wires: 0,
            power_symbols: 0,
            no_connects: 0,
            fallbacks: 0,
            errors: errors.iter().map(|e| e.to_string()).collect(),
            artifacts: Vec::new(),
        }
    }

    #[test]
    fn errors_are_counted_by_prefix() {
        let r = report(&[
            "[overlap] R1 and R2 overlap",
            "[verify] pin R1.1 of net A is not reached by any wire",
            "[verify] wire (0.00, 0.00)-(1.27, 0.00) of net A crosses U1",
            "something else",
        ]);
        let counts = r.error_counts();
        assert_eq!(counts["overlap"], 1);
        assert_eq!(counts["verify"], 2);
        assert_eq!(counts["other"], 1);
        assert!(!counts.contains_key("router"));
        assert!(!r.is_clean());
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/report.json");
        let r = report(&["[router] net A: no path"]);
        r.save_json(&path).unwrap();
        let back: SynthReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.errors, r.errors);
    }
}
