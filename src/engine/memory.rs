//! MemoryEngine - headless in-memory engine.
//!
//! Keeps every object's properties in plain maps, logs every call made by the
//! binding layer, and emits the same event families a real diagram engine
//! does:
//! - object scope: `change:<prop>` and `change:*`
//! - graph scope: `cell:change:<prop>`, `node:change:<prop>` / `edge:change:<prop>`,
//!   `cell:added`, `cell:removed`, camera `scale` / `translate` / `resize`
//!
//! Interactions (`click`, `mouseenter`, ...) are injected with
//! [`MemoryEngine::interact`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::{Map, Value, json};

use super::{Engine, EngineEvent, EventHandler, Mutation, SubscriptionId};
use crate::cell::{EdgeProps, NodeProps, TerminalData};
use crate::error::EngineError;
use crate::types::{Affine, CellId, MutationOptions, Point, Rect, Size};

/// Object kind as stored by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellType {
    Node,
    Edge,
}

impl CellType {
    fn prefix(self) -> &'static str {
        match self {
            CellType::Node => "node",
            CellType::Edge => "edge",
        }
    }
}

/// Full state of one engine object.
#[derive(Clone, Debug, PartialEq)]
pub struct CellRecord {
    pub id: CellId,
    pub kind: CellType,
    /// Creation serial. Two records with different serials are different
    /// engine objects even if they share an id.
    pub serial: u64,
    pub shape: Option<String>,
    pub attrs: Value,
    pub z_index: i32,
    pub visible: bool,
    pub data: Value,
    pub tools: Option<Value>,
    pub position: Point,
    pub size: Size,
    pub angle: f64,
    pub source: Option<TerminalData>,
    pub target: Option<TerminalData>,
    pub router: Option<Value>,
    pub connector: Option<Value>,
    pub vertices: Vec<Point>,
    pub labels: Vec<Value>,
    pub custom: BTreeMap<String, Value>,
    pub parent: Option<CellId>,
    pub children: Vec<CellId>,
}

impl CellRecord {
    fn new(id: CellId, kind: CellType, serial: u64) -> Self {
        Self {
            id,
            kind,
            serial,
            shape: None,
            attrs: Value::Object(Map::new()),
            z_index: 0,
            visible: true,
            data: Value::Null,
            tools: None,
            position: Point::ZERO,
            size: Size::ZERO,
            angle: 0.0,
            source: None,
            target: None,
            router: None,
            connector: None,
            vertices: Vec::new(),
            labels: Vec::new(),
            custom: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Local-space box of a node.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }
}

/// One call made against the engine, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    AddNode(CellId),
    AddEdge(CellId),
    Remove(CellId),
    Mutate {
        cell: CellId,
        mutation: Mutation,
        options: MutationOptions,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Scope {
    Graph,
    Cell(CellId),
}

struct Listener {
    scope: Scope,
    event: String,
    handler: EventHandler,
}

#[derive(Default)]
struct MemoryState {
    cells: HashMap<CellId, CellRecord>,
    listeners: BTreeMap<u64, Listener>,
    calls: Vec<EngineCall>,
    /// Registered shapes and their custom setter names.
    shapes: HashMap<String, Vec<String>>,
    next_serial: u64,
    next_subscription: u64,
    transform: Affine,
    viewport: Size,
}

/// In-memory [`Engine`].
pub struct MemoryEngine {
    state: RefCell<MemoryState>,
    bbox_queries: Cell<usize>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(MemoryState {
                transform: Affine::IDENTITY,
                viewport: Size::new(800.0, 600.0),
                ..Default::default()
            }),
            bbox_queries: Cell::new(0),
        }
    }

    /// Register a shape and the custom setters its objects accept.
    pub fn register_shape(&self, name: &str, setters: &[&str]) {
        self.state.borrow_mut().shapes.insert(
            name.to_string(),
            setters.iter().map(|s| s.to_string()).collect(),
        );
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn cell(&self, id: &CellId) -> Option<CellRecord> {
        self.state.borrow().cells.get(id).cloned()
    }

    pub fn cell_count(&self) -> usize {
        self.state.borrow().cells.len()
    }

    /// Creation serial of the live object with this id.
    pub fn serial(&self, id: &CellId) -> Option<u64> {
        self.state.borrow().cells.get(id).map(|cell| cell.serial)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Mutations applied to `id`, in order.
    pub fn mutations_of(&self, id: &CellId) -> Vec<Mutation> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                EngineCall::Mutate { cell, mutation, .. } if cell == id => Some(mutation.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many times an object with this id was created.
    pub fn creations_of(&self, id: &CellId) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| {
                matches!(call, EngineCall::AddNode(c) | EngineCall::AddEdge(c) if c == id)
            })
            .count()
    }

    pub fn removals_of(&self, id: &CellId) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| matches!(call, EngineCall::Remove(c) if c == id))
            .count()
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn graph_listener_count(&self, event: &str) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|l| l.scope == Scope::Graph && l.event == event)
            .count()
    }

    pub fn cell_listener_count(&self, id: &CellId) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|l| matches!(&l.scope, Scope::Cell(cell) if cell == id))
            .count()
    }

    pub fn bbox_queries(&self) -> usize {
        self.bbox_queries.get()
    }

    pub fn transform(&self) -> Affine {
        self.state.borrow().transform
    }

    // =========================================================================
    // Event Injection
    // =========================================================================

    /// Dispatch a graph-scope event.
    pub fn emit(&self, event: &EngineEvent) {
        self.dispatch(&Scope::Graph, event);
    }

    /// Dispatch an object-scope event to listeners of `id`.
    pub fn emit_cell(&self, id: &CellId, event: &EngineEvent) {
        self.dispatch(&Scope::Cell(id.clone()), event);
    }

    /// Simulate a user interaction on an object: `cell:<name>` and
    /// `node:<name>` / `edge:<name>` at graph scope, `<name>` on the object.
    pub fn interact(&self, id: &CellId, name: &str) {
        let Some(kind) = self.state.borrow().cells.get(id).map(|cell| cell.kind) else {
            return;
        };
        let event = |full: String| EngineEvent::new(full).with_target(id.clone());
        self.emit(&event(format!("cell:{name}")));
        self.emit(&event(format!("{}:{name}", kind.prefix())));
        self.emit_cell(id, &event(name.to_string()));
    }

    /// Zoom the camera around the origin.
    pub fn zoom(&self, factor: f64) {
        let transform = {
            let mut state = self.state.borrow_mut();
            state.transform = Affine::scale(factor) * state.transform;
            state.transform
        };
        let payload = json!({ "coeffs": transform.as_coeffs() });
        self.emit(&EngineEvent::new("scale").with_payload(payload));
    }

    /// Pan the camera.
    pub fn translate(&self, dx: f64, dy: f64) {
        let transform = {
            let mut state = self.state.borrow_mut();
            state.transform = Affine::translate((dx, dy)) * state.transform;
            state.transform
        };
        self.emit(
            &EngineEvent::new("translate").with_payload(json!({ "coeffs": transform.as_coeffs() })),
        );
    }

    pub fn resize(&self, width: f64, height: f64) {
        self.state.borrow_mut().viewport = Size::new(width, height);
        let payload = json!({ "width": width, "height": height });
        self.emit(&EngineEvent::new("resize").with_payload(payload));
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn dispatch(&self, scope: &Scope, event: &EngineEvent) {
        // Snapshot, then call without holding the borrow: handlers re-enter.
        let matching: Vec<(u64, EventHandler)> = self
            .state
            .borrow()
            .listeners
            .iter()
            .filter(|(_, l)| &l.scope == scope && l.event == event.name)
            .map(|(id, l)| (*id, l.handler.clone()))
            .collect();
        for (id, handler) in matching {
            // Skip listeners removed by an earlier handler of this dispatch.
            if self.state.borrow().listeners.contains_key(&id) {
                handler(event);
            }
        }
    }

    fn add_listener(&self, scope: Scope, event: &str, handler: EventHandler) -> SubscriptionId {
        let mut state = self.state.borrow_mut();
        let id = state.next_subscription;
        state.next_subscription += 1;
        state.listeners.insert(
            id,
            Listener {
                scope,
                event: event.to_string(),
                handler,
            },
        );
        SubscriptionId(id)
    }

    fn insert(&self, id: Option<&CellId>, kind: CellType) -> Result<CellRecord, EngineError> {
        let mut state = self.state.borrow_mut();
        let serial = state.next_serial;
        state.next_serial += 1;
        let id = match id {
            Some(id) if state.cells.contains_key(id) => {
                return Err(EngineError::DuplicateId(id.clone()));
            }
            Some(id) => id.clone(),
            None => CellId::new(format!("cell-{serial}")),
        };
        Ok(CellRecord::new(id, kind, serial))
    }

    fn check_terminal(&self, terminal: &TerminalData) -> Result<(), EngineError> {
        match terminal.cell() {
            Some(cell) if !self.state.borrow().cells.contains_key(cell) => Err(
                EngineError::InvalidTerminal(format!("cell `{cell}` does not exist")),
            ),
            _ => Ok(()),
        }
    }

    fn emit_added(&self, record: &CellRecord, options: MutationOptions) {
        if options.silent {
            return;
        }
        let event = |name: String| {
            EngineEvent::new(name)
                .with_target(record.id.clone())
                .with_options(options)
        };
        self.emit(&event("cell:added".into()));
        self.emit(&event(format!("{}:added", record.kind.prefix())));
    }

    fn emit_change(&self, id: &CellId, kind: CellType, property: &str, options: MutationOptions) {
        let event = |name: String| {
            EngineEvent::new(name)
                .with_target(id.clone())
                .with_options(options)
                .with_payload(Value::String(property.to_string()))
        };
        self.emit_cell(id, &event(format!("change:{property}")));
        self.emit_cell(id, &event("change:*".into()));
        self.emit(&event(format!("cell:change:{property}")));
        self.emit(&event(format!("{}:change:{property}", kind.prefix())));
    }

    fn terminal_point(state: &MemoryState, terminal: &TerminalData) -> Option<Point> {
        match terminal {
            TerminalData::Point(point) => Some(*point),
            TerminalData::Cell(terminal) => {
                state.cells.get(&terminal.cell).map(|cell| cell.bounds().center())
            }
        }
    }

    fn record_bounds(state: &MemoryState, record: &CellRecord) -> Option<Rect> {
        match record.kind {
            CellType::Node => Some(record.bounds()),
            CellType::Edge => {
                let points: Vec<Point> = record
                    .source
                    .iter()
                    .chain(record.target.iter())
                    .filter_map(|t| Self::terminal_point(state, t))
                    .chain(record.vertices.iter().copied())
                    .collect();
                let first = points.first()?;
                Some(
                    points
                        .iter()
                        .fold(Rect::from_points(*first, *first), |acc, p| acc.union_pt(*p)),
                )
            }
        }
    }
}

fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch,
    }
}

fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut node = root;
    let mut segments = path.split('/').peekable();
    while let Some(segment) = segments.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else { return };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        node = map.entry(segment.to_string()).or_insert(Value::Null);
    }
}

impl Engine for MemoryEngine {
    fn add_node(&self, props: &NodeProps, options: MutationOptions) -> Result<CellId, EngineError> {
        let mut record = self.insert(props.cell.id.as_ref(), CellType::Node)?;
        record.shape = props.cell.shape.clone();
        if let Some(attrs) = &props.cell.attrs {
            record.attrs = attrs.clone();
        }
        record.z_index = props.cell.z_index.unwrap_or(0);
        record.visible = props.cell.visible.unwrap_or(true);
        record.data = props.cell.data.clone().unwrap_or(Value::Null);
        record.tools = props.cell.tools.clone();
        record.position = props.position.unwrap_or(Point::ZERO);
        record.size = props.size.unwrap_or(Size::ZERO);
        record.angle = props.angle.unwrap_or(0.0);
        record.custom = props.custom.clone();

        let id = record.id.clone();
        {
            let mut state = self.state.borrow_mut();
            state.calls.push(EngineCall::AddNode(id.clone()));
            state.cells.insert(id.clone(), record.clone());
        }
        self.emit_added(&record, options);
        Ok(id)
    }

    fn add_edge(&self, props: &EdgeProps, options: MutationOptions) -> Result<CellId, EngineError> {
        for terminal in props.source.iter().chain(props.target.iter()) {
            self.check_terminal(terminal)?;
        }
        let mut record = self.insert(props.cell.id.as_ref(), CellType::Edge)?;
        record.shape = props.cell.shape.clone();
        if let Some(attrs) = &props.cell.attrs {
            record.attrs = attrs.clone();
        }
        if let Some(label) = &props.label {
            set_path(&mut record.attrs, "text/text", Value::String(label.clone()));
        }
        record.z_index = props.cell.z_index.unwrap_or(0);
        record.visible = props.cell.visible.unwrap_or(true);
        record.data = props.cell.data.clone().unwrap_or(Value::Null);
        record.tools = props.cell.tools.clone();
        record.source = props.source.clone();
        record.target = props.target.clone();
        record.router = props.router.clone();
        record.connector = props.connector.clone();
        record.vertices = props.vertices.clone().unwrap_or_default();
        record.labels = props.labels.clone().unwrap_or_default();

        let id = record.id.clone();
        {
            let mut state = self.state.borrow_mut();
            state.calls.push(EngineCall::AddEdge(id.clone()));
            state.cells.insert(id.clone(), record.clone());
        }
        self.emit_added(&record, options);
        Ok(id)
    }

    fn remove_cell(&self, id: &CellId, options: MutationOptions) -> Result<(), EngineError> {
        let record = {
            let mut state = self.state.borrow_mut();
            let record = state
                .cells
                .remove(id)
                .ok_or_else(|| EngineError::UnknownCell(id.clone()))?;
            state.calls.push(EngineCall::Remove(id.clone()));
            if let Some(parent) = record.parent.as_ref().and_then(|p| state.cells.get_mut(p)) {
                parent.children.retain(|child| child != id);
            }
            for child in &record.children {
                if let Some(child) = state.cells.get_mut(child) {
                    child.parent = None;
                }
            }
            record
        };

        if !options.silent {
            let event = |name: String| {
                EngineEvent::new(name)
                    .with_target(id.clone())
                    .with_options(options)
            };
            self.emit_cell(id, &event("removed".into()));
            self.emit(&event("cell:removed".into()));
            self.emit(&event(format!("{}:removed", record.kind.prefix())));
        }

        self.state
            .borrow_mut()
            .listeners
            .retain(|_, l| !matches!(&l.scope, Scope::Cell(cell) if cell == id));
        Ok(())
    }

    fn contains(&self, id: &CellId) -> bool {
        self.state.borrow().cells.contains_key(id)
    }

    fn mutate(
        &self,
        id: &CellId,
        mutation: Mutation,
        options: MutationOptions,
    ) -> Result<(), EngineError> {
        if let Mutation::Source(terminal) | Mutation::Target(terminal) = &mutation {
            self.check_terminal(terminal)?;
        }
        let property = mutation.property().to_string();
        let kind = {
            let mut state = self.state.borrow_mut();
            let MemoryState { cells, shapes, .. } = &mut *state;

            if let Mutation::AddChild(child) = &mutation {
                if !cells.contains_key(child) {
                    return Err(EngineError::UnknownCell(child.clone()));
                }
                if let Some(old_parent) = cells.get(child).and_then(|c| c.parent.clone())
                    && let Some(old_parent) = cells.get_mut(&old_parent)
                {
                    old_parent.children.retain(|c| c != child);
                }
                if let Some(child) = cells.get_mut(child) {
                    child.parent = Some(id.clone());
                }
            }
            if let Mutation::RemoveChild(child) = &mutation
                && let Some(child) = cells.get_mut(child)
                && child.parent.as_ref() == Some(id)
            {
                child.parent = None;
            }

            let record = cells
                .get_mut(id)
                .ok_or_else(|| EngineError::UnknownCell(id.clone()))?;
            match mutation.clone() {
                Mutation::Attrs(attrs) if options.deep => merge(&mut record.attrs, attrs),
                Mutation::Attrs(attrs) => record.attrs = attrs,
                Mutation::AttrByPath { path, value } => set_path(&mut record.attrs, &path, value),
                Mutation::ZIndex(z) => record.z_index = z,
                Mutation::Visible(visible) => record.visible = visible,
                Mutation::Data(data) => record.data = data,
                Mutation::Tools(tools) => record.tools = tools,
                Mutation::Size(size) => record.size = size,
                Mutation::Position { x, y } => record.position = Point::new(x, y),
                Mutation::Rotate { angle, absolute } => {
                    record.angle = if absolute { angle } else { record.angle + angle };
                }
                Mutation::Source(terminal) => record.source = Some(terminal),
                Mutation::Target(terminal) => record.target = Some(terminal),
                Mutation::Router(router) => record.router = router,
                Mutation::Connector(connector) => record.connector = connector,
                Mutation::Vertices(vertices) => record.vertices = vertices,
                Mutation::Labels(labels) => record.labels = labels,
                Mutation::Custom { setter, value } => {
                    let known = record
                        .shape
                        .as_ref()
                        .and_then(|shape| shapes.get(shape))
                        .is_some_and(|setters| setters.contains(&setter));
                    if !known {
                        return Err(EngineError::UnknownSetter {
                            cell: id.clone(),
                            setter,
                        });
                    }
                    record.custom.insert(setter, value);
                }
                Mutation::AddChild(child) => {
                    if !record.children.contains(&child) {
                        record.children.push(child);
                    }
                }
                Mutation::RemoveChild(child) => record.children.retain(|c| c != &child),
            }
            let kind = record.kind;
            state.calls.push(EngineCall::Mutate {
                cell: id.clone(),
                mutation,
                options,
            });
            kind
        };

        if !options.silent {
            self.emit_change(id, kind, &property, options);
        }
        Ok(())
    }

    fn is_visible(&self, id: &CellId) -> Option<bool> {
        self.state.borrow().cells.get(id).map(|cell| cell.visible)
    }

    fn subscribe(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        self.add_listener(Scope::Graph, event, handler)
    }

    fn subscribe_cell(
        &self,
        id: &CellId,
        event: &str,
        handler: EventHandler,
    ) -> Result<SubscriptionId, EngineError> {
        if !self.contains(id) {
            return Err(EngineError::UnknownCell(id.clone()));
        }
        Ok(self.add_listener(Scope::Cell(id.clone()), event, handler))
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        self.state.borrow_mut().listeners.remove(&subscription.0);
    }

    fn bounding_box_of(&self, ids: &[CellId]) -> Option<Rect> {
        self.bbox_queries.set(self.bbox_queries.get() + 1);
        let state = self.state.borrow();
        ids.iter()
            .filter_map(|id| state.cells.get(id))
            .filter_map(|record| Self::record_bounds(&state, record))
            .reduce(|acc, rect| acc.union(rect))
    }

    fn local_to_viewport(&self, rect: Rect) -> Rect {
        self.state.borrow().transform.transform_rect_bbox(rect)
    }
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryEngine")
            .field("cells", &state.cells.len())
            .field("listeners", &state.listeners.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellProps, CellTerminal};
    use std::rc::Rc;

    fn node(id: &str, x: f64, y: f64, w: f64, h: f64) -> NodeProps {
        NodeProps {
            cell: CellProps {
                id: Some(id.into()),
                ..Default::default()
            },
            position: Some(Point::new(x, y)),
            size: Some(Size::new(w, h)),
            ..Default::default()
        }
    }

    fn recorder(
        engine: &MemoryEngine,
        scope: Option<&CellId>,
        event: &str,
    ) -> Rc<RefCell<Vec<EngineEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let handler: EventHandler =
            Rc::new(move |e: &EngineEvent| seen_clone.borrow_mut().push(e.clone()));
        match scope {
            Some(id) => {
                engine.subscribe_cell(id, event, handler).unwrap();
            }
            None => {
                engine.subscribe(event, handler);
            }
        }
        seen
    }

    #[test]
    fn test_add_node_and_generated_ids() {
        let engine = MemoryEngine::new();
        let id = engine
            .add_node(&node("n1", 0.0, 0.0, 10.0, 10.0), MutationOptions::user())
            .unwrap();
        assert_eq!(id, CellId::from("n1"));

        let generated = engine.add_node(&NodeProps::default(), MutationOptions::user()).unwrap();
        assert_ne!(generated, id);
        assert_eq!(engine.cell_count(), 2);

        let dup = engine.add_node(&node("n1", 0.0, 0.0, 1.0, 1.0), MutationOptions::user());
        assert_eq!(dup, Err(EngineError::DuplicateId("n1".into())));
    }

    #[test]
    fn test_mutation_echoes_options_on_change_events() {
        let engine = MemoryEngine::new();
        let id = engine
            .add_node(&node("n1", 0.0, 0.0, 10.0, 10.0), MutationOptions::user())
            .unwrap();
        let own = recorder(&engine, Some(&id), "change:position");
        let any = recorder(&engine, Some(&id), "change:*");
        let graph = recorder(&engine, None, "node:change:position");

        engine
            .mutate(&id, Mutation::Position { x: 5.0, y: 6.0 }, MutationOptions::component())
            .unwrap();

        assert_eq!(engine.cell(&id).unwrap().position, Point::new(5.0, 6.0));
        assert_eq!(own.borrow().len(), 1);
        assert!(own.borrow()[0].is_own_echo());
        assert_eq!(any.borrow().len(), 1);
        assert_eq!(graph.borrow()[0].target, Some(id));
    }

    #[test]
    fn test_silent_mutation_emits_nothing() {
        let engine = MemoryEngine::new();
        let id = engine
            .add_node(&node("n1", 0.0, 0.0, 10.0, 10.0), MutationOptions::user())
            .unwrap();
        let any = recorder(&engine, Some(&id), "change:*");
        engine.mutate(&id, Mutation::ZIndex(4), MutationOptions::user().silent()).unwrap();
        assert!(any.borrow().is_empty());
        assert_eq!(engine.cell(&id).unwrap().z_index, 4);
    }

    #[test]
    fn test_attr_path_and_deep_merge() {
        let engine = MemoryEngine::new();
        let id = engine.add_node(&node("n1", 0.0, 0.0, 1.0, 1.0), MutationOptions::user()).unwrap();
        engine
            .mutate(
                &id,
                Mutation::Attrs(json!({ "body": { "fill": "red" } })),
                MutationOptions::user(),
            )
            .unwrap();
        engine
            .mutate(
                &id,
                Mutation::AttrByPath { path: "text/text".into(), value: json!("hi") },
                MutationOptions::user(),
            )
            .unwrap();
        engine
            .mutate(
                &id,
                Mutation::Attrs(json!({ "body": { "stroke": "blue" } })),
                MutationOptions::user().deep(),
            )
            .unwrap();
        assert_eq!(
            engine.cell(&id).unwrap().attrs,
            json!({ "body": { "fill": "red", "stroke": "blue" }, "text": { "text": "hi" } })
        );
    }

    #[test]
    fn test_invalid_terminal_is_rejected() {
        let engine = MemoryEngine::new();
        let props = EdgeProps {
            source: Some(TerminalData::Cell(CellTerminal::new("missing"))),
            target: Some(TerminalData::Point(Point::new(1.0, 1.0))),
            ..Default::default()
        };
        assert!(matches!(
            engine.add_edge(&props, MutationOptions::user()),
            Err(EngineError::InvalidTerminal(_))
        ));
    }

    #[test]
    fn test_custom_setter_requires_registered_shape() {
        let engine = MemoryEngine::new();
        engine.register_shape("rect", &["setRx"]);
        let mut props = node("r1", 0.0, 0.0, 1.0, 1.0);
        props.cell.shape = Some("rect".into());
        let id = engine.add_node(&props, MutationOptions::user()).unwrap();

        engine
            .mutate(
                &id,
                Mutation::Custom { setter: "setRx".into(), value: json!(4) },
                MutationOptions::user(),
            )
            .unwrap();
        assert_eq!(engine.cell(&id).unwrap().custom.get("setRx"), Some(&json!(4)));

        let err = engine
            .mutate(
                &id,
                Mutation::Custom { setter: "setRy".into(), value: json!(4) },
                MutationOptions::user(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownSetter { .. }));
    }

    #[test]
    fn test_remove_drops_cell_listeners() {
        let engine = MemoryEngine::new();
        let id = engine.add_node(&node("n1", 0.0, 0.0, 1.0, 1.0), MutationOptions::user()).unwrap();
        let _ = recorder(&engine, Some(&id), "change:*");
        assert_eq!(engine.cell_listener_count(&id), 1);
        engine.remove_cell(&id, MutationOptions::user()).unwrap();
        assert_eq!(engine.cell_listener_count(&id), 0);
        assert!(!engine.contains(&id));
        assert_eq!(
            engine.remove_cell(&id, MutationOptions::user()),
            Err(EngineError::UnknownCell(id))
        );
    }

    #[test]
    fn test_bounding_box_and_camera() {
        let engine = MemoryEngine::new();
        let a = engine
            .add_node(&node("a", 0.0, 0.0, 10.0, 10.0), MutationOptions::user())
            .unwrap();
        let b = engine
            .add_node(&node("b", 20.0, 20.0, 10.0, 10.0), MutationOptions::user())
            .unwrap();

        let bbox = engine.bounding_box_of(&[a.clone(), b]).unwrap();
        assert_eq!(bbox, Rect::new(0.0, 0.0, 30.0, 30.0));

        engine.zoom(2.0);
        engine.translate(5.0, 0.0);
        let local = engine.bounding_box_of(&[a]).unwrap();
        assert_eq!(engine.local_to_viewport(local), Rect::new(5.0, 0.0, 25.0, 20.0));
        assert_eq!(engine.bbox_queries(), 2);
    }

    #[test]
    fn test_handler_may_unsubscribe_peer_mid_dispatch() {
        let engine = Rc::new(MemoryEngine::new());
        let hits = Rc::new(Cell::new(0));
        let peer: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));

        let engine_clone = engine.clone();
        let peer_clone = peer.clone();
        engine.subscribe(
            "scale",
            Rc::new(move |_: &crate::engine::EngineEvent| {
                if let Some(id) = peer_clone.get() {
                    engine_clone.unsubscribe(id);
                }
            }),
        );
        let hits_clone = hits.clone();
        let on_scale: EventHandler =
            Rc::new(move |_: &EngineEvent| hits_clone.set(hits_clone.get() + 1));
        peer.set(Some(engine.subscribe("scale", on_scale)));

        engine.zoom(1.5);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_interact_emits_all_scopes() {
        let engine = MemoryEngine::new();
        let id = engine.add_node(&node("n1", 0.0, 0.0, 1.0, 1.0), MutationOptions::user()).unwrap();
        let cell_scope = recorder(&engine, None, "cell:click");
        let node_scope = recorder(&engine, None, "node:click");
        let own = recorder(&engine, Some(&id), "click");

        engine.interact(&id, "click");
        assert_eq!(cell_scope.borrow().len(), 1);
        assert_eq!(node_scope.borrow().len(), 1);
        assert_eq!(own.borrow().len(), 1);
    }
}
