//! Engine - the imperative graph/diagram engine the bindings drive.
//!
//! The engine owns all visual object state. Bindings only talk to it through
//! the [`Engine`] trait:
//! - create / remove nodes and edges
//! - apply a [`Mutation`] to one object, tagged with [`MutationOptions`]
//! - subscribe to events at graph scope or object scope
//! - geometry queries (bounding boxes, local → viewport transform)
//!
//! Every mutation echoes its options on the change events it produces. That
//! is what lets a binding drop the echo of its own setter calls.
//!
//! [`MemoryEngine`] is a complete headless implementation with a call log.

mod memory;

pub use memory::*;

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::cell::{EdgeProps, NodeProps, TerminalData};
use crate::error::EngineError;
use crate::types::{CellId, MutationOptions, Point, Rect, Size};

/// Shared handle to the engine. All bindings of one graph share it.
pub type EngineHandle = Rc<dyn Engine>;

/// Engine event callback.
pub type EventHandler = Rc<dyn Fn(&EngineEvent)>;

/// Handle of an engine subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

// =============================================================================
// Events
// =============================================================================

/// An event emitted by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineEvent {
    /// Event name, e.g. `cell:click`, `change:position`, `scale`.
    pub name: String,
    /// Object the event is about, if any.
    pub target: Option<CellId>,
    /// Options of the mutation that caused the event.
    pub options: MutationOptions,
    /// Event-specific payload (new value, pointer position, ...).
    pub payload: Value,
}

impl EngineEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            options: MutationOptions::user(),
            payload: Value::Null,
        }
    }

    pub fn with_target(mut self, target: impl Into<CellId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_options(mut self, options: MutationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// True if a binding caused this event through its own setter call.
    pub fn is_own_echo(&self) -> bool {
        self.options.is_own_echo()
    }
}

// =============================================================================
// Mutations
// =============================================================================

/// One imperative setter call on one object.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Merge attributes (selector → SVG attributes).
    Attrs(Value),
    /// Write one nested attribute, e.g. `text/text`.
    AttrByPath { path: String, value: Value },
    ZIndex(i32),
    Visible(bool),
    /// Replace the payload data.
    Data(Value),
    /// Set tools; `None` removes them.
    Tools(Option<Value>),
    Size(Size),
    /// Position takes x and y separately.
    Position { x: f64, y: f64 },
    Rotate { angle: f64, absolute: bool },
    Source(TerminalData),
    Target(TerminalData),
    /// Set the router; `None` removes it.
    Router(Option<Value>),
    /// Set the connector; `None` removes it.
    Connector(Option<Value>),
    Vertices(Vec<Point>),
    Labels(Vec<Value>),
    /// Shape-specific setter, called by name.
    Custom { setter: String, value: Value },
    AddChild(CellId),
    RemoveChild(CellId),
}

impl Mutation {
    /// Name of the property this mutation changes, as used in `change:<name>`
    /// events.
    pub fn property(&self) -> &str {
        match self {
            Mutation::Attrs(_) | Mutation::AttrByPath { .. } => "attrs",
            Mutation::ZIndex(_) => "zIndex",
            Mutation::Visible(_) => "visible",
            Mutation::Data(_) => "data",
            Mutation::Tools(_) => "tools",
            Mutation::Size(_) => "size",
            Mutation::Position { .. } => "position",
            Mutation::Rotate { .. } => "angle",
            Mutation::Source(_) => "source",
            Mutation::Target(_) => "target",
            Mutation::Router(_) => "router",
            Mutation::Connector(_) => "connector",
            Mutation::Vertices(_) => "vertices",
            Mutation::Labels(_) => "labels",
            Mutation::Custom { setter, .. } => setter,
            Mutation::AddChild(_) | Mutation::RemoveChild(_) => "children",
        }
    }
}

// =============================================================================
// Engine Trait
// =============================================================================

/// The imperative engine, as seen by the binding layer.
///
/// Methods take `&self`: engines use interior mutability because event
/// handlers re-enter them synchronously. Implementations must not hold
/// internal borrows while invoking handlers.
pub trait Engine {
    /// Create a node. Returns the id (the descriptor's, or a generated one).
    fn add_node(&self, props: &NodeProps, options: MutationOptions) -> Result<CellId, EngineError>;

    /// Create an edge. Terminals are already normalized.
    fn add_edge(&self, props: &EdgeProps, options: MutationOptions) -> Result<CellId, EngineError>;

    /// Remove an object and every object-scoped subscription on it.
    fn remove_cell(&self, id: &CellId, options: MutationOptions) -> Result<(), EngineError>;

    /// True while the object exists.
    fn contains(&self, id: &CellId) -> bool;

    /// Apply one setter call.
    fn mutate(&self, id: &CellId, mutation: Mutation, options: MutationOptions)
    -> Result<(), EngineError>;

    /// The object's own visibility flag.
    fn is_visible(&self, id: &CellId) -> Option<bool>;

    /// Subscribe at graph scope.
    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId;

    /// Subscribe at object scope.
    fn subscribe_cell(
        &self,
        id: &CellId,
        event: &str,
        handler: EventHandler,
    ) -> Result<SubscriptionId, EngineError>;

    /// Drop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, subscription: SubscriptionId);

    /// Local-space bounding box of the given objects.
    fn bounding_box_of(&self, ids: &[CellId]) -> Option<Rect>;

    /// Map a local-space rectangle through the current camera transform.
    fn local_to_viewport(&self, rect: Rect) -> Rect;
}

impl fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Engine")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_property_names() {
        assert_eq!(Mutation::Position { x: 1.0, y: 2.0 }.property(), "position");
        assert_eq!(Mutation::Rotate { angle: 90.0, absolute: true }.property(), "angle");
        assert_eq!(
            Mutation::AttrByPath { path: "text/text".into(), value: Value::Null }.property(),
            "attrs"
        );
        assert_eq!(
            Mutation::Custom { setter: "setRx".into(), value: Value::Null }.property(),
            "setRx"
        );
    }

    #[test]
    fn test_event_echo_follows_options() {
        let event = EngineEvent::new("change:position").with_target("n1");
        assert!(!event.is_own_echo());
        let echo = event.with_options(MutationOptions::component());
        assert!(echo.is_own_echo());
    }
}
