//! # netweave command-line library
//!
//! The pieces behind the `netweave` binary, usable on their own:
//!
//! - [`runner`] loads a circuit file, configuration and symbol library,
//!   runs the layout pipeline and writes `<name>.kicad_sch`, `<name>.net`
//!   and the persisted id map;
//! - [`report`] summarises a run for the terminal or as JSON.
//!
//! ```toml
//! [dependencies]
//! netweave-cli = { path = "../netweave-cli" }
//! ```

pub mod report;
pub mod runner;

pub use report::SynthReport;
pub use runner::{RunnerError, SynthOptions, SynthRunner};
