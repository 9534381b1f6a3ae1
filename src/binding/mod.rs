//! Binding infrastructure shared by every cell binding.
//!
//! - [`ReadyNotifier`] - queue listeners until the engine exists
//! - [`DelegationRegistry`] - one engine subscription per event name,
//!   O(1) dispatch per cell
//! - [`CellEvent`] / [`EventStore`] - event routing and stable handler wrappers
//! - [`GraphContext`] - what all bindings of one graph share
//! - scope - provider stacks (`provide_graph`, `current_graph`, ...)
//! - [`GraphBinding`] - the root that attaches the engine

mod context;
mod delegation;
pub mod events;
mod graph;
mod ready;
mod scope;

pub use context::{CellListener, GraphContext};
pub use delegation::DelegationRegistry;
pub use events::{CellEvent, EventRoute, EventStore, normalize_event_name};
pub use graph::GraphBinding;
pub use ready::{ReadyListener, ReadyNotifier};
pub use scope::{
    current_graph, current_parent, pop_graph_context, pop_parent_context, provide_graph,
    provide_parent, push_graph_context, push_parent_context,
};
