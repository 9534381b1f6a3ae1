//! Cell kinds - how each object kind is created and which setters run when
//! its properties change.
//!
//! Every watched property is independently optional. `None` means "this
//! descriptor does not control it": no setter runs, whatever the previous
//! value was. The exceptions are properties the engine can drop:
//! - `tools`, `router`, `connector` going from set to unset are removed
//! - `vertices`, `labels` going from set to unset are cleared
//!
//! [`ShapeKind`] extends the node table with `(property, setter)` pairs, so a
//! new shape only needs a table, not a new binding.

use std::fmt;

use serde_json::Value;

use super::descriptor::{CellProps, EdgeProps, HasCellProps, NodeProps};
use crate::engine::{EngineHandle, Mutation};
use crate::error::EngineError;
use crate::types::{CellId, MutationOptions, PropMask};

/// A setter call produced by a diff, tagged with the property it belongs to.
pub type SetterCall = (PropMask, Mutation);

/// One kind of engine object.
pub trait CellKind: 'static {
    type Props: HasCellProps + Clone + Default + PartialEq + fmt::Debug + 'static;

    fn name(&self) -> &str;

    /// Create the engine object described by `props`.
    fn create(
        &self,
        props: &Self::Props,
        engine: &EngineHandle,
        options: MutationOptions,
    ) -> Result<CellId, EngineError>;

    /// Setter calls that turn an object showing `prev` into one showing
    /// `next`, in application order.
    fn diff(&self, prev: &Self::Props, next: &Self::Props, out: &mut Vec<SetterCall>);

    /// Whether bindings of this kind accept child cells.
    fn can_be_parent(&self) -> bool {
        false
    }

    /// Whether bindings of this kind embed into an enclosing parent cell.
    fn can_be_child(&self) -> bool {
        false
    }
}

// =============================================================================
// Diff Helpers
// =============================================================================

/// Setter for a plain controlled property: runs when set and changed.
fn controlled<T: PartialEq>(
    prev: &Option<T>,
    next: &Option<T>,
    mask: PropMask,
    out: &mut Vec<SetterCall>,
    setter: impl FnOnce(&T) -> Mutation,
) {
    if let Some(value) = next
        && prev.as_ref() != Some(value)
    {
        out.push((mask, setter(value)));
    }
}

/// Setter for a removable property: also runs (with `None`) when unset
/// after having been set.
fn removable(
    prev: &Option<Value>,
    next: &Option<Value>,
    mask: PropMask,
    out: &mut Vec<SetterCall>,
    setter: impl FnOnce(Option<Value>) -> Mutation,
) {
    match (prev, next) {
        (_, Some(value)) if prev.as_ref() != Some(value) => {
            out.push((mask, setter(Some(value.clone()))))
        }
        (Some(_), None) => out.push((mask, setter(None))),
        _ => {}
    }
}

/// Setter for a list property: unset after set clears the list.
fn clearable<T: PartialEq + Clone>(
    prev: &Option<Vec<T>>,
    next: &Option<Vec<T>>,
    mask: PropMask,
    out: &mut Vec<SetterCall>,
    setter: impl FnOnce(Vec<T>) -> Mutation,
) {
    match (prev, next) {
        (_, Some(list)) if prev.as_ref() != Some(list) => out.push((mask, setter(list.clone()))),
        (Some(list), None) if !list.is_empty() => out.push((mask, setter(Vec::new()))),
        _ => {}
    }
}

/// Options a binding applies `mutation` with.
///
/// Attribute bags merge into the object's attributes: attributes written
/// through other properties (the edge `label`) and engine defaults stay.
pub fn setter_options(mutation: &Mutation) -> MutationOptions {
    match mutation {
        Mutation::Attrs(_) => MutationOptions::component().deep(),
        _ => MutationOptions::component(),
    }
}

/// Properties every cell kind shares.
pub fn diff_cell(prev: &CellProps, next: &CellProps, out: &mut Vec<SetterCall>) {
    controlled(&prev.attrs, &next.attrs, PropMask::ATTRS, out, |v| Mutation::Attrs(v.clone()));
    controlled(&prev.z_index, &next.z_index, PropMask::Z_INDEX, out, |v| Mutation::ZIndex(*v));
    controlled(&prev.visible, &next.visible, PropMask::VISIBLE, out, |v| Mutation::Visible(*v));
    controlled(&prev.data, &next.data, PropMask::DATA, out, |v| Mutation::Data(v.clone()));
    removable(&prev.tools, &next.tools, PropMask::TOOLS, out, Mutation::Tools);
}

fn diff_node(prev: &NodeProps, next: &NodeProps, out: &mut Vec<SetterCall>) {
    diff_cell(&prev.cell, &next.cell, out);
    controlled(&prev.size, &next.size, PropMask::SIZE, out, |v| Mutation::Size(*v));
    controlled(&prev.position, &next.position, PropMask::POSITION, out, |p| {
        Mutation::Position { x: p.x, y: p.y }
    });
    controlled(&prev.angle, &next.angle, PropMask::ANGLE, out, |angle| Mutation::Rotate {
        angle: *angle,
        absolute: true,
    });
}

// =============================================================================
// Node
// =============================================================================

/// Plain node: attributes, z-index, visibility, data, tools, size,
/// position, absolute angle. Nodes can contain other nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeKind;

impl CellKind for NodeKind {
    type Props = NodeProps;

    fn name(&self) -> &str {
        "node"
    }

    fn create(
        &self,
        props: &NodeProps,
        engine: &EngineHandle,
        options: MutationOptions,
    ) -> Result<CellId, EngineError> {
        engine.add_node(props, options)
    }

    fn diff(&self, prev: &NodeProps, next: &NodeProps, out: &mut Vec<SetterCall>) {
        diff_node(prev, next, out);
    }

    fn can_be_parent(&self) -> bool {
        true
    }

    fn can_be_child(&self) -> bool {
        true
    }
}

// =============================================================================
// Edge
// =============================================================================

/// Edge between two terminals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeKind;

/// Attribute path the `label` shorthand writes to.
pub const EDGE_LABEL_PATH: &str = "text/text";

impl CellKind for EdgeKind {
    type Props = EdgeProps;

    fn name(&self) -> &str {
        "edge"
    }

    fn create(
        &self,
        props: &EdgeProps,
        engine: &EngineHandle,
        options: MutationOptions,
    ) -> Result<CellId, EngineError> {
        engine.add_edge(props, options)
    }

    fn diff(&self, prev: &EdgeProps, next: &EdgeProps, out: &mut Vec<SetterCall>) {
        diff_cell(&prev.cell, &next.cell, out);
        controlled(&prev.source, &next.source, PropMask::SOURCE, out, |t| {
            Mutation::Source(t.clone())
        });
        controlled(&prev.target, &next.target, PropMask::TARGET, out, |t| {
            Mutation::Target(t.clone())
        });
        controlled(&prev.label, &next.label, PropMask::LABEL, out, |label| Mutation::AttrByPath {
            path: EDGE_LABEL_PATH.to_string(),
            value: Value::String(label.clone()),
        });
        removable(&prev.router, &next.router, PropMask::ROUTER, out, Mutation::Router);
        removable(&prev.connector, &next.connector, PropMask::CONNECTOR, out, Mutation::Connector);
        clearable(&prev.vertices, &next.vertices, PropMask::VERTICES, out, Mutation::Vertices);
        clearable(&prev.labels, &next.labels, PropMask::LABELS, out, Mutation::Labels);
    }
}

// =============================================================================
// Shape
// =============================================================================

/// A node shape with extra `(property, setter)` pairs.
///
/// Shape properties live in [`NodeProps::custom`] under the property name;
/// the engine receives them through the named setter, both at creation and
/// on change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeKind {
    shape: String,
    properties: Vec<(String, String)>,
    groupable: bool,
}

impl ShapeKind {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            properties: Vec::new(),
            groupable: true,
        }
    }

    /// Watch `property` and apply it with `setter`.
    pub fn property(mut self, property: impl Into<String>, setter: impl Into<String>) -> Self {
        self.properties.push((property.into(), setter.into()));
        self
    }

    /// Whether shapes of this kind may contain child cells.
    pub fn groupable(mut self, groupable: bool) -> Self {
        self.groupable = groupable;
        self
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    fn diff_custom(&self, prev: &NodeProps, next: &NodeProps, out: &mut Vec<SetterCall>) {
        for (property, setter) in &self.properties {
            controlled(
                &prev.custom.get(property),
                &next.custom.get(property),
                PropMask::CUSTOM,
                out,
                |value| Mutation::Custom {
                    setter: setter.clone(),
                    value: (*value).clone(),
                },
            );
        }
    }
}

impl CellKind for ShapeKind {
    type Props = NodeProps;

    fn name(&self) -> &str {
        &self.shape
    }

    fn create(
        &self,
        props: &NodeProps,
        engine: &EngineHandle,
        options: MutationOptions,
    ) -> Result<CellId, EngineError> {
        let mut base = props.clone();
        base.cell.shape.get_or_insert_with(|| self.shape.clone());
        base.custom.clear();
        let id = engine.add_node(&base, options)?;

        let mut calls = Vec::new();
        self.diff_custom(&NodeProps::default(), props, &mut calls);
        for (_, mutation) in calls {
            engine.mutate(&id, mutation, options)?;
        }
        Ok(id)
    }

    fn diff(&self, prev: &NodeProps, next: &NodeProps, out: &mut Vec<SetterCall>) {
        diff_node(prev, next, out);
        self.diff_custom(prev, next, out);
    }

    fn can_be_parent(&self) -> bool {
        self.groupable
    }

    fn can_be_child(&self) -> bool {
        true
    }
}
