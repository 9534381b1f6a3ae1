//! Error types.
//!
//! Two layers:
//! - [`EngineError`] is what the engine returns when it rejects a mutation.
//!   The binding layer never swallows it; it is wrapped and propagated.
//! - [`BindingError`] adds the usage errors of the binding layer itself.

use std::fmt;

use crate::types::CellId;

/// A mutation or query rejected by the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineError {
    /// No object with this id exists.
    UnknownCell(CellId),
    /// An object with this id already exists.
    DuplicateId(CellId),
    /// A terminal references something the engine cannot connect to.
    InvalidTerminal(String),
    /// A shape setter name the object does not support.
    UnknownSetter { cell: CellId, setter: String },
    /// Any other engine-specific rejection.
    Rejected(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownCell(id) => write!(f, "unknown cell `{id}`"),
            EngineError::DuplicateId(id) => write!(f, "a cell with id `{id}` already exists"),
            EngineError::InvalidTerminal(reason) => write!(f, "invalid edge terminal: {reason}"),
            EngineError::UnknownSetter { cell, setter } => {
                write!(f, "cell `{cell}` has no setter `{setter}`")
            }
            EngineError::Rejected(reason) => write!(f, "engine rejected mutation: {reason}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Errors raised by the binding layer.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingError {
    /// A binding was mounted outside of any graph provider scope.
    MissingGraphProvider,
    /// The engine has not been attached yet.
    EngineNotReady,
    /// A cell that cannot act as a group received children.
    NotAGroup(CellId),
    /// The graph binding was already disposed.
    Disposed,
    /// Propagated engine rejection.
    Engine(EngineError),
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingError::MissingGraphProvider => {
                f.write_str("cell binding used outside of a graph binding scope")
            }
            BindingError::EngineNotReady => f.write_str("graph engine is not attached yet"),
            BindingError::NotAGroup(id) => write!(f, "cell `{id}` cannot contain child cells"),
            BindingError::Disposed => f.write_str("graph binding already disposed"),
            BindingError::Engine(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for BindingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BindingError::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for BindingError {
    fn from(err: EngineError) -> Self {
        BindingError::Engine(err)
    }
}

pub type Result<T, E = BindingError> = std::result::Result<T, E>;
