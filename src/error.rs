// SPDX-License-Identifier: Apache-2.0

use crate::sat::SatError;

#[derive(Debug)]
pub enum ModIdError {
    /// Identification was requested on an empty gate list.
    EmptyGates,
    UnknownGateType(String),
    UnknownGate(String),
    UnknownNet(String),
    MissingPin {
        gate: String,
        pin: String,
    },
    PinAlreadyConnected {
        gate: String,
        pin: String,
    },
    /// A gate-level function could not be turned into a word-level
    /// expression, e.g. because of a combinational loop.
    Expression(String),
    Solver(SatError),
    /// Two verified candidates claimed the same control assignment.
    MergeConflict(String),
    Materialization(String),
}

impl std::fmt::Display for ModIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModIdError::EmptyGates => write!(f, "no gates to analyze"),
            ModIdError::UnknownGateType(t) => write!(f, "unknown gate type: {t}"),
            ModIdError::UnknownGate(g) => write!(f, "unknown gate: {g}"),
            ModIdError::UnknownNet(n) => write!(f, "unknown net: {n}"),
            ModIdError::MissingPin { gate, pin } => {
                write!(f, "gate '{gate}' has no pin '{pin}'")
            }
            ModIdError::PinAlreadyConnected { gate, pin } => {
                write!(f, "pin '{pin}' of gate '{gate}' is already connected")
            }
            ModIdError::Expression(msg) => write!(f, "could not build expression: {msg}"),
            ModIdError::Solver(e) => write!(f, "solver failure: {e}"),
            ModIdError::MergeConflict(msg) => write!(f, "cannot merge candidates: {msg}"),
            ModIdError::Materialization(msg) => write!(f, "cannot create module: {msg}"),
        }
    }
}

impl std::error::Error for ModIdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModIdError::Solver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SatError> for ModIdError {
    fn from(e: SatError) -> Self {
        ModIdError::Solver(e)
    }
}
