//! Descriptors - the declarative input of a binding.
//!
//! A descriptor is a flat property bag plus a handler map. Every property is
//! independently optional: `None` means "not controlled by this descriptor",
//! never "reset". The property bags are serde types so a declarative tree
//! can be loaded from data; handlers are attached in code.
//!
//! # Example
//!
//! ```ignore
//! let node = NodeDescriptor::node("n1")
//!     .position(10.0, 20.0)
//!     .size(120.0, 40.0)
//!     .attrs(json!({ "body": { "fill": "#fff" } }))
//!     .on(CellEvent::Click, |evt| println!("clicked {:?}", evt.target));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::terminal::{Terminal, TerminalData};
use crate::binding::CellEvent;
use crate::engine::{EngineEvent, EventHandler};
use crate::types::{CellId, Point, Size};

/// Callback run once the engine object exists.
pub type CellReadyCallback = Rc<dyn Fn(&CellId)>;

// =============================================================================
// Property Bags
// =============================================================================

/// Properties every cell kind has.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CellProps {
    /// Stable identity; generated by the engine when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<CellId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// Free-form payload data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
}

/// Node properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeProps {
    #[serde(flatten)]
    pub cell: CellProps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    /// Absolute rotation in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    /// Shape-specific properties, keyed by property name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, Value>,
}

/// Edge properties. Terminals are stored already normalized.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeProps {
    #[serde(flatten)]
    pub cell: CellProps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TerminalData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TerminalData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertices: Option<Vec<Point>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Value>>,
    /// Shorthand for the `text/text` attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Access to the shared part of a property bag.
pub trait HasCellProps {
    fn cell(&self) -> &CellProps;
    fn cell_mut(&mut self) -> &mut CellProps;
}

impl HasCellProps for CellProps {
    fn cell(&self) -> &CellProps {
        self
    }

    fn cell_mut(&mut self) -> &mut CellProps {
        self
    }
}

impl HasCellProps for NodeProps {
    fn cell(&self) -> &CellProps {
        &self.cell
    }

    fn cell_mut(&mut self) -> &mut CellProps {
        &mut self.cell
    }
}

impl HasCellProps for EdgeProps {
    fn cell(&self) -> &CellProps {
        &self.cell
    }

    fn cell_mut(&mut self) -> &mut CellProps {
        &mut self.cell
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Declarative description of one engine object.
#[derive(Clone)]
pub struct Descriptor<P> {
    pub props: P,
    /// Handler per semantic event.
    pub handlers: HashMap<CellEvent, EventHandler>,
    pub on_cell_ready: Option<CellReadyCallback>,
}

pub type NodeDescriptor = Descriptor<NodeProps>;
pub type EdgeDescriptor = Descriptor<EdgeProps>;

impl<P: Default> Default for Descriptor<P> {
    fn default() -> Self {
        Self::from_props(P::default())
    }
}

impl<P> Descriptor<P> {
    pub fn from_props(props: P) -> Self {
        Self {
            props,
            handlers: HashMap::new(),
            on_cell_ready: None,
        }
    }

    /// Attach a handler for a semantic event.
    pub fn on(mut self, event: CellEvent, handler: impl Fn(&EngineEvent) + 'static) -> Self {
        self.handlers.insert(event, Rc::new(handler));
        self
    }

    /// Attach a handler by its declarative prop name (`onClick`,
    /// `onChange$Position`). Names that are not handler props are ignored.
    pub fn on_prop(self, prop: &str, handler: impl Fn(&EngineEvent) + 'static) -> Self {
        match CellEvent::from_prop_name(prop) {
            Some(event) => self.on(event, handler),
            None => self,
        }
    }

    pub fn on_cell_ready(mut self, callback: impl Fn(&CellId) + 'static) -> Self {
        self.on_cell_ready = Some(Rc::new(callback));
        self
    }
}

impl<P: HasCellProps> Descriptor<P> {
    pub fn id(&self) -> Option<&CellId> {
        self.props.cell().id.as_ref()
    }

    pub fn with_id(mut self, id: impl Into<CellId>) -> Self {
        self.props.cell_mut().id = Some(id.into());
        self
    }

    pub fn shape(mut self, shape: impl Into<String>) -> Self {
        self.props.cell_mut().shape = Some(shape.into());
        self
    }

    pub fn attrs(mut self, attrs: Value) -> Self {
        self.props.cell_mut().attrs = Some(attrs);
        self
    }

    pub fn z_index(mut self, z_index: i32) -> Self {
        self.props.cell_mut().z_index = Some(z_index);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.props.cell_mut().visible = Some(visible);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.props.cell_mut().data = Some(data);
        self
    }

    pub fn tools(mut self, tools: Value) -> Self {
        self.props.cell_mut().tools = Some(tools);
        self
    }
}

impl Descriptor<NodeProps> {
    pub fn node(id: impl Into<CellId>) -> Self {
        Self::default().with_id(id)
    }

    pub fn position(mut self, x: f64, y: f64) -> Self {
        self.props.position = Some(Point::new(x, y));
        self
    }

    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.props.size = Some(Size::new(width, height));
        self
    }

    pub fn angle(mut self, angle: f64) -> Self {
        self.props.angle = Some(angle);
        self
    }

    /// Set a shape-specific property.
    pub fn custom(mut self, name: impl Into<String>, value: Value) -> Self {
        self.props.custom.insert(name.into(), value);
        self
    }
}

impl Descriptor<EdgeProps> {
    pub fn edge(id: impl Into<CellId>) -> Self {
        Self::default().with_id(id)
    }

    pub fn source(mut self, source: impl Into<Terminal>) -> Self {
        self.props.source = Some(TerminalData::from(source.into()));
        self
    }

    pub fn target(mut self, target: impl Into<Terminal>) -> Self {
        self.props.target = Some(TerminalData::from(target.into()));
        self
    }

    pub fn router(mut self, router: Value) -> Self {
        self.props.router = Some(router);
        self
    }

    pub fn connector(mut self, connector: Value) -> Self {
        self.props.connector = Some(connector);
        self
    }

    pub fn vertices(mut self, vertices: Vec<Point>) -> Self {
        self.props.vertices = Some(vertices);
        self
    }

    pub fn labels(mut self, labels: Vec<Value>) -> Self {
        self.props.labels = Some(labels);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.props.label = Some(label.into());
        self
    }
}

impl<P: fmt::Debug> fmt::Debug for Descriptor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("Descriptor")
            .field("props", &self.props)
            .field("handlers", &events)
            .field("on_cell_ready", &self.on_cell_ready.is_some())
            .finish()
    }
}
