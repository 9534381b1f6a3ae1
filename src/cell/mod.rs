//! Cells - descriptors, kinds, and the binding that reconciles them.
//!
//! - [`descriptor`] - property bags and handler maps
//! - [`terminal`] - edge terminal normalization
//! - [`kind`] - node / edge / shape creation and property → setter tables
//! - [`binding`] - [`CellBinding`], the generic reconciler
//! - [`group`] - parent / child embedding
//! - [`handle`] - an owned engine object

pub mod binding;
pub mod descriptor;
pub mod group;
pub mod handle;
pub mod kind;
pub mod terminal;

pub use binding::{CellBinding, EdgeBinding, Factory, NodeBinding, ShapeBinding, default_factory};
pub use descriptor::{
    CellProps, CellReadyCallback, Descriptor, EdgeDescriptor, EdgeProps, HasCellProps,
    NodeDescriptor, NodeProps,
};
pub use group::CellContext;
pub use handle::CellHandle;
pub use kind::{
    CellKind, EDGE_LABEL_PATH, EdgeKind, NodeKind, SetterCall, ShapeKind, diff_cell,
    setter_options,
};
pub use terminal::{CellTerminal, Terminal, TerminalData};
