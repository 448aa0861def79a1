//! Error types for connectivity construction and circuit loading.

use thiserror::Error;

/// Connectivity violations.
///
/// These indicate a logic error in whatever is building the circuit and are
/// raised at the offending call, never deferred to layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("pin {pin} is already marked Do-Not-Connect")]
    AlreadyDnc { pin: String },
    #[error("net {net} contains a Do-Not-Connect marker and cannot hold more than one functional pin")]
    DncConflict { net: String },
    #[error("unknown component id {0}")]
    UnknownComponent(usize),
    #[error("unknown pin id {0}")]
    UnknownPin(usize),
    #[error("unknown composable id {0}")]
    UnknownComposable(usize),
    #[error("unknown net id {0}")]
    UnknownNet(usize),
    #[error("net {0} was merged into another net and can no longer be used")]
    RetiredNet(usize),
}

/// Failures while loading a circuit definition file.
#[derive(Error, Debug)]
pub enum CircuitError {
    #[error("Failed to read circuit file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("Invalid pin reference {0:?} (expected REF.PIN)")]
    BadPinRef(String),
    #[error("Pin reference {0:?} names an unknown component")]
    UnknownRef(String),
    #[error("Duplicate reference designator {0}")]
    DuplicateRef(String),
    #[error("Unknown composable {0}")]
    UnknownComposable(String),
    #[error("Composable containment cycle through {0}")]
    ContainmentCycle(String),
    #[error("Position for {0} must be [x, y] or [x, y, rotation]")]
    BadPosition(String),
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// S-expression parse failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SexprError {
    #[error("S-expression syntax error near {context:?}")]
    Syntax { context: String },
    #[error("Trailing input after document: {0:?}")]
    Trailing(String),
}
