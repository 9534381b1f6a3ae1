//! Event routing and the per-binding event store.
//!
//! # Routing table
//!
//! Some interaction events only exist at graph scope in the engine (pointer
//! events, highlight, embedding). Handlers for those go through the
//! [`DelegationRegistry`](super::DelegationRegistry); everything else is
//! subscribed directly on the object. The split is a closed enum matched at
//! compile time, see [`CellEvent::route`].
//!
//! # Event store
//!
//! [`EventStore`] keeps the latest handler per event and hands out one stable
//! wrapper per event. Replacing a handler on update swaps what the wrapper
//! calls without touching the engine subscription. Wrappers drop events that
//! are the echo of a binding's own mutation, and everything after dispose.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::engine::{EngineEvent, EventHandler};

// =============================================================================
// Cell Events
// =============================================================================

/// Semantic event a cell descriptor can handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellEvent {
    Click,
    Dblclick,
    Contextmenu,
    Mousedown,
    Mousemove,
    Mouseup,
    Mouseover,
    Mouseout,
    Mouseenter,
    Mouseleave,
    Mousewheel,
    Highlight,
    Unhighlight,
    Embed,
    Embedding,
    Embedded,
    /// Any object-scope event, by normalized name (`change:position`, `removed`).
    Other(String),
}

/// Where a handler for an event must be attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventRoute {
    /// Through the delegation registry, under this graph-scope event name.
    Delegated(&'static str),
    /// Directly on the object, under this name.
    Direct(String),
}

impl CellEvent {
    /// Parse a normalized event name.
    pub fn parse(name: &str) -> Self {
        match name {
            "click" => CellEvent::Click,
            "dblclick" => CellEvent::Dblclick,
            "contextmenu" => CellEvent::Contextmenu,
            "mousedown" => CellEvent::Mousedown,
            "mousemove" => CellEvent::Mousemove,
            "mouseup" => CellEvent::Mouseup,
            "mouseover" => CellEvent::Mouseover,
            "mouseout" => CellEvent::Mouseout,
            "mouseenter" => CellEvent::Mouseenter,
            "mouseleave" => CellEvent::Mouseleave,
            "mousewheel" => CellEvent::Mousewheel,
            "highlight" => CellEvent::Highlight,
            "unhighlight" => CellEvent::Unhighlight,
            "embed" => CellEvent::Embed,
            "embedding" => CellEvent::Embedding,
            "embedded" => CellEvent::Embedded,
            other => CellEvent::Other(other.to_string()),
        }
    }

    /// Parse a declarative handler prop name such as `onClick` or
    /// `onChange$Position`.
    pub fn from_prop_name(prop: &str) -> Option<Self> {
        normalize_event_name(prop).map(|name| Self::parse(&name))
    }

    pub fn route(&self) -> EventRoute {
        match self {
            CellEvent::Click => EventRoute::Delegated("cell:click"),
            CellEvent::Dblclick => EventRoute::Delegated("cell:dblclick"),
            CellEvent::Contextmenu => EventRoute::Delegated("cell:contextmenu"),
            CellEvent::Mousedown => EventRoute::Delegated("cell:mousedown"),
            CellEvent::Mousemove => EventRoute::Delegated("cell:mousemove"),
            CellEvent::Mouseup => EventRoute::Delegated("cell:mouseup"),
            CellEvent::Mouseover => EventRoute::Delegated("cell:mouseover"),
            CellEvent::Mouseout => EventRoute::Delegated("cell:mouseout"),
            CellEvent::Mouseenter => EventRoute::Delegated("cell:mouseenter"),
            CellEvent::Mouseleave => EventRoute::Delegated("cell:mouseleave"),
            CellEvent::Mousewheel => EventRoute::Delegated("cell:mousewheel"),
            CellEvent::Highlight => EventRoute::Delegated("cell:highlight"),
            CellEvent::Unhighlight => EventRoute::Delegated("cell:unhighlight"),
            CellEvent::Embed => EventRoute::Delegated("node:embed"),
            CellEvent::Embedding => EventRoute::Delegated("node:embedding"),
            CellEvent::Embedded => EventRoute::Delegated("node:embedded"),
            CellEvent::Other(name) => EventRoute::Direct(name.clone()),
        }
    }

    pub fn is_delegated(&self) -> bool {
        matches!(self.route(), EventRoute::Delegated(_))
    }
}

impl fmt::Display for CellEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.route() {
            EventRoute::Delegated(name) => f.write_str(name),
            EventRoute::Direct(name) => f.write_str(&name),
        }
    }
}

/// Normalize a handler prop name into an engine event name.
///
/// `onClick` → `click`, `onNode$Change$Position` → `node:change:position`.
/// Returns `None` for anything that is not `on` followed by an uppercase
/// letter.
pub fn normalize_event_name(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    if !rest.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return None;
    }
    let parts: Vec<String> = rest.split('$').map(lower_first).collect();
    Some(parts.join(":"))
}

fn lower_first(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Event Store
// =============================================================================

struct StoreInner<K> {
    handlers: RefCell<HashMap<K, EventHandler>>,
    attached: RefCell<HashSet<K>>,
    disposed: Cell<bool>,
}

/// Latest handlers of one binding, behind stable wrappers.
pub struct EventStore<K = CellEvent> {
    inner: Rc<StoreInner<K>>,
}

impl<K> Clone for EventStore<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K: Clone + Eq + Hash + 'static> Default for EventStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash + 'static> EventStore<K> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StoreInner {
                handlers: RefCell::new(HashMap::new()),
                attached: RefCell::new(HashSet::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Replace the handler set with the descriptor's current one.
    pub fn accept(&self, handlers: &HashMap<K, EventHandler>) {
        *self.inner.handlers.borrow_mut() = handlers.clone();
    }

    /// Set or replace a single handler.
    pub fn set(&self, key: K, handler: EventHandler) {
        self.inner.handlers.borrow_mut().insert(key, handler);
    }

    pub fn remove(&self, key: &K) {
        self.inner.handlers.borrow_mut().remove(key);
    }

    /// Remove the handler for `key` and forget its wrapper, so a later
    /// handler is returned by [`take_unattached`](Self::take_unattached)
    /// again. Returns whether a wrapper was attached.
    pub fn detach(&self, key: &K) -> bool {
        self.inner.handlers.borrow_mut().remove(key);
        self.inner.attached.borrow_mut().remove(key)
    }

    pub fn has_handler(&self, key: &K) -> bool {
        self.inner.handlers.borrow().contains_key(key)
    }

    /// Events that have a handler but no wrapper attached yet. They are
    /// marked attached; the caller must subscribe their wrappers.
    pub fn take_unattached(&self) -> Vec<K> {
        let handlers = self.inner.handlers.borrow();
        let mut attached = self.inner.attached.borrow_mut();
        let fresh: Vec<K> = handlers
            .keys()
            .filter(|key| !attached.contains(*key))
            .cloned()
            .collect();
        attached.extend(fresh.iter().cloned());
        fresh
    }

    /// Forget which wrappers were attached; the next
    /// [`take_unattached`](Self::take_unattached) returns every handler.
    pub fn reset_attached(&self) {
        self.inner.attached.borrow_mut().clear();
    }

    /// Stable wrapper for `key`. It calls whatever handler is current at
    /// dispatch time and ignores own echoes.
    pub fn wrapper(&self, key: K) -> EventHandler {
        let weak: Weak<StoreInner<K>> = Rc::downgrade(&self.inner);
        Rc::new(move |event: &EngineEvent| {
            let Some(inner) = weak.upgrade() else { return };
            if inner.disposed.get() || event.is_own_echo() {
                return;
            }
            // Clone out so the handler may update this store re-entrantly.
            let handler = inner.handlers.borrow().get(&key).cloned();
            if let Some(handler) = handler {
                handler(event);
            }
        })
    }

    /// Stop delivering events. Wrappers still subscribed become no-ops.
    pub fn dispose(&self) {
        self.inner.disposed.set(true);
        self.inner.handlers.borrow_mut().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

impl<K> fmt::Debug for EventStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStore")
            .field("handlers", &self.inner.handlers.borrow().len())
            .field("attached", &self.inner.attached.borrow().len())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}
