//! Cell Binding - the generic reconciler.
//!
//! Keeps one [`Descriptor`] and one engine object in sync:
//!
//! 1. `mount` registers with the graph's ready notifier
//! 2. once the engine exists, the handle is taken from the recycle cache
//!    (same id, within the grace period) or created by the factory
//! 3. handlers are attached: coarse-grained events through the delegation
//!    registry, everything else directly on the object
//! 4. `update` diffs the new descriptor against what was last applied and
//!    calls only the setters whose property changed, tagged as
//!    component-origin so the engine's echo is not taken for a user edit
//! 5. `unmount` releases every subscription and parks the handle in the
//!    recycle cache (or disposes it)
//!
//! Work done in a deferred ready callback cannot return errors to anyone.
//! Such errors are logged, parked, and returned by the next `update`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::descriptor::{Descriptor, EdgeDescriptor, HasCellProps, NodeDescriptor};
use super::group::CellContext;
use super::handle::{Applied, CellHandle};
use super::kind::{CellKind, EdgeKind, NodeKind, SetterCall, ShapeKind, setter_options};
use crate::binding::events::{EventRoute, EventStore};
use crate::binding::{GraphContext, current_graph, current_parent, provide_parent};
use crate::dispose::{Cleanup, Disposer};
use crate::engine::EngineHandle;
use crate::error::{BindingError, EngineError, Result};
use crate::types::{CellId, MutationOptions, PropMask};

/// Creates the engine object for a descriptor.
pub type Factory<P> = Rc<dyn Fn(&P, &EngineHandle) -> std::result::Result<CellHandle, EngineError>>;

pub type NodeBinding = CellBinding<NodeKind>;
pub type EdgeBinding = CellBinding<EdgeKind>;
pub type ShapeBinding = CellBinding<ShapeKind>;

/// Factory that creates through the kind and removes from the engine on
/// dispose.
pub fn default_factory<K: CellKind>(kind: Rc<K>) -> Factory<K::Props> {
    Rc::new(move |props: &K::Props, engine: &EngineHandle| {
        let id = kind.create(props, engine, MutationOptions::component())?;
        Ok(CellHandle::removing(id, engine.clone()))
    })
}

struct Live<P> {
    handle: CellHandle,
    /// Props as last applied to the engine object.
    applied: P,
    /// Subscriptions, delegations and embedding of this incarnation.
    disposer: Disposer,
}

struct BindingInner<K: CellKind> {
    kind: Rc<K>,
    context: GraphContext,
    parent: Option<CellContext>,
    /// Provided to bindings mounted inside this one.
    group: CellContext,
    factory: Factory<K::Props>,
    descriptor: RefCell<Descriptor<K::Props>>,
    events: EventStore,
    live: RefCell<Option<Live<K::Props>>>,
    ready_cleanup: RefCell<Option<Cleanup>>,
    error: RefCell<Option<BindingError>>,
    /// The ready callback ran (successfully or not).
    attempted: Cell<bool>,
    applying: Cell<bool>,
    dirty: Cell<bool>,
    unmounted: Cell<bool>,
}

/// Binding of one declarative descriptor to one engine object.
pub struct CellBinding<K: CellKind> {
    inner: Rc<BindingInner<K>>,
}

impl CellBinding<NodeKind> {
    /// Mount a node binding in the current graph scope.
    pub fn node(descriptor: NodeDescriptor) -> Result<Self> {
        Self::mount(NodeKind, descriptor)
    }
}

impl CellBinding<EdgeKind> {
    /// Mount an edge binding in the current graph scope.
    pub fn edge(descriptor: EdgeDescriptor) -> Result<Self> {
        Self::mount(EdgeKind, descriptor)
    }
}

impl<K: CellKind> CellBinding<K> {
    /// Mount in the current graph scope with the kind's own factory.
    pub fn mount(kind: K, descriptor: Descriptor<K::Props>) -> Result<Self> {
        let kind = Rc::new(kind);
        let factory = default_factory(kind.clone());
        Self::mount_rc(kind, descriptor, factory)
    }

    /// Mount in the current graph scope with a custom factory.
    pub fn mount_with(
        kind: K,
        descriptor: Descriptor<K::Props>,
        factory: Factory<K::Props>,
    ) -> Result<Self> {
        Self::mount_rc(Rc::new(kind), descriptor, factory)
    }

    fn mount_rc(
        kind: Rc<K>,
        descriptor: Descriptor<K::Props>,
        factory: Factory<K::Props>,
    ) -> Result<Self> {
        let context = current_graph()?;
        if context.is_disposed() {
            return Err(BindingError::Disposed);
        }
        let parent = current_parent().filter(|_| kind.can_be_child());
        let group = CellContext::new(kind.can_be_parent(), descriptor.id().cloned());
        let events = EventStore::new();
        events.accept(&descriptor.handlers);

        let inner = Rc::new(BindingInner {
            kind,
            context: context.clone(),
            parent,
            group,
            factory,
            descriptor: RefCell::new(descriptor),
            events,
            live: RefCell::new(None),
            ready_cleanup: RefCell::new(None),
            error: RefCell::new(None),
            attempted: Cell::new(false),
            applying: Cell::new(false),
            dirty: Cell::new(false),
            unmounted: Cell::new(false),
        });

        let weak = Rc::downgrade(&inner);
        let cleanup = context.on_ready(move |engine| {
            if let Some(inner) = weak.upgrade() {
                inner.attempted.set(true);
                let result = inner.create(engine);
                inner.park_error(result);
            }
        });
        *inner.ready_cleanup.borrow_mut() = Some(cleanup);
        Ok(Self { inner })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Id of the engine object, once it exists.
    pub fn cell_id(&self) -> Option<CellId> {
        self.inner.live.borrow().as_ref().map(|live| live.handle.id().clone())
    }

    pub fn is_created(&self) -> bool {
        self.inner.live.borrow().is_some()
    }

    pub fn is_unmounted(&self) -> bool {
        self.inner.unmounted.get()
    }

    pub fn kind(&self) -> &K {
        &self.inner.kind
    }

    pub fn descriptor(&self) -> Descriptor<K::Props> {
        self.inner.descriptor.borrow().clone()
    }

    /// Context children of this binding embed into.
    pub fn children_context(&self) -> &CellContext {
        &self.inner.group
    }

    /// Run `f` with this binding as the parent of every binding it mounts.
    pub fn provide_children<R>(&self, f: impl FnOnce() -> R) -> R {
        provide_parent(&self.inner.group, f)
    }

    /// Take the error parked by a deferred callback, if any.
    pub fn take_error(&self) -> Option<BindingError> {
        self.inner.error.borrow_mut().take()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Apply a new descriptor. Returns the properties whose setters ran.
    ///
    /// Before the engine object exists the descriptor is only stored; the
    /// object is created from the latest one. If creation already failed,
    /// it is retried with the new descriptor. An update issued from inside
    /// a setter's synchronous event is folded into the running update.
    pub fn update(&self, descriptor: Descriptor<K::Props>) -> Result<PropMask> {
        let inner = &self.inner;
        if inner.unmounted.get() {
            return Err(BindingError::Disposed);
        }
        inner.events.accept(&descriptor.handlers);
        *inner.descriptor.borrow_mut() = descriptor;

        if let Some(err) = self.take_error() {
            return Err(err);
        }
        if inner.live.borrow().is_none() {
            if inner.attempted.get()
                && let Some(engine) = inner.context.engine()
            {
                inner.create(&engine)?;
            }
            return Ok(PropMask::empty());
        }
        if inner.applying.get() {
            inner.dirty.set(true);
            return Ok(PropMask::empty());
        }

        let mut changed = PropMask::empty();
        loop {
            inner.applying.set(true);
            let result = inner.reconcile();
            inner.applying.set(false);
            match result {
                Ok(mask) => changed |= mask,
                Err(err) => {
                    inner.dirty.set(false);
                    return Err(err);
                }
            }
            if !inner.dirty.replace(false) {
                break;
            }
        }
        Ok(changed)
    }

    /// Tear down. The handle goes to the recycle cache (or is disposed).
    /// Idempotent.
    pub fn unmount(&self) {
        let inner = &self.inner;
        if inner.unmounted.replace(true) {
            return;
        }
        let ready = inner.ready_cleanup.borrow_mut().take();
        if let Some(cleanup) = ready {
            cleanup();
        }
        inner.events.dispose();
        inner.teardown();
    }
}

impl<K: CellKind> BindingInner<K> {
    fn park_error(&self, result: Result<()>) {
        if let Err(err) = result {
            tracing::warn!(kind = self.kind.name(), error = %err, "deferred binding work failed");
            *self.error.borrow_mut() = Some(err);
        }
    }

    /// Props to create or sync with: the descriptor plus configured defaults.
    fn effective_props(&self) -> K::Props {
        let mut props = self.descriptor.borrow().props.clone();
        props
            .cell_mut()
            .z_index
            .get_or_insert(self.context.config().default_z_index);
        props
    }

    fn create(&self, engine: &EngineHandle) -> Result<()> {
        if self.unmounted.get() || self.live.borrow().is_some() {
            return Ok(());
        }
        let props = self.effective_props();

        let handle = match self.reclaim(&props)? {
            Some(handle) => handle,
            None => {
                let handle = (self.factory)(&props, engine)?;
                tracing::debug!(cell = %handle.id(), kind = self.kind.name(), "cell created");
                handle
            }
        };
        let id = handle.id().clone();

        *self.live.borrow_mut() = Some(Live {
            handle,
            applied: props,
            disposer: Disposer::new(),
        });
        if let Err(err) = self.connect(&id, engine) {
            self.abort();
            return Err(err);
        }

        self.context.notify_cell_ready(&id);
        let callback = self.descriptor.borrow().on_cell_ready.clone();
        if let Some(callback) = callback {
            callback(&id);
        }
        Ok(())
    }

    /// Take back a parked handle with the descriptor's id, brought up to
    /// date with `props`.
    fn reclaim(&self, props: &K::Props) -> Result<Option<CellHandle>> {
        let Some(id) = props.cell().id.as_ref() else { return Ok(None) };
        let Some(mut handle) = self.context.reuse_as(id, self.kind.name()) else {
            return Ok(None);
        };
        let snapshot = handle
            .applied
            .take()
            .and_then(|applied| applied.props.downcast::<K::Props>().ok());
        let Some(snapshot) = snapshot else {
            handle.dispose();
            return Ok(None);
        };

        let mut calls = Vec::new();
        self.kind.diff(&snapshot, props, &mut calls);
        if let Err(err) = apply_calls(handle.engine(), handle.id(), calls) {
            handle.dispose();
            return Err(err.into());
        }
        Ok(Some(handle))
    }

    /// Embed into the parent, attach handlers, take queued children.
    fn connect(&self, id: &CellId, engine: &EngineHandle) -> Result<()> {
        if let Some(parent) = &self.parent {
            let cleanup = parent.add_child(id)?;
            self.push_cleanup(cleanup);
        }
        self.attach_events()?;
        if self.kind.can_be_parent() {
            self.group.parent_ready(id, engine)?;
        }
        Ok(())
    }

    /// Undo a create that failed half way. The object is removed, never
    /// recycled, and was never announced.
    fn abort(&self) {
        let Some(live) = self.live.borrow_mut().take() else { return };
        live.disposer.release();
        self.events.reset_attached();
        if self.kind.can_be_parent() {
            self.group.parent_gone();
        }
        tracing::debug!(
            cell = %live.handle.id(),
            kind = self.kind.name(),
            "cell creation rolled back"
        );
        live.handle.dispose();
    }

    /// Diff the descriptor against the last applied props and run setters.
    fn reconcile(&self) -> Result<PropMask> {
        let next = self.effective_props();
        let (engine, id, prev) = {
            let live = self.live.borrow();
            let Some(live) = live.as_ref() else {
                return Ok(PropMask::empty());
            };
            (live.handle.engine().clone(), live.handle.id().clone(), live.applied.clone())
        };

        // A different id is a different object.
        if let Some(next_id) = next.cell().id.as_ref()
            && next_id != &id
        {
            self.teardown();
            self.create(&engine)?;
            return Ok(PropMask::all());
        }

        let mut calls = Vec::new();
        self.kind.diff(&prev, &next, &mut calls);
        let changed = apply_calls(&engine, &id, calls)?;
        if let Some(live) = self.live.borrow_mut().as_mut() {
            live.applied = next;
        }
        self.attach_events()?;
        Ok(changed)
    }

    /// Subscribe wrappers for handlers that have none yet.
    fn attach_events(&self) -> Result<()> {
        let (engine, id) = {
            let live = self.live.borrow();
            let Some(live) = live.as_ref() else { return Ok(()) };
            (live.handle.engine().clone(), live.handle.id().clone())
        };
        for event in self.events.take_unattached() {
            let wrapper = self.events.wrapper(event.clone());
            let cleanup: Cleanup = match event.route() {
                EventRoute::Delegated(name) => self.context.delegate(name, wrapper, &id)?,
                EventRoute::Direct(name) => {
                    let subscription = engine.subscribe_cell(&id, &name, wrapper)?;
                    let engine = engine.clone();
                    Box::new(move || engine.unsubscribe(subscription))
                }
            };
            self.push_cleanup(cleanup);
        }
        Ok(())
    }

    fn push_cleanup(&self, cleanup: Cleanup) {
        let orphan = match self.live.borrow().as_ref() {
            Some(live) => {
                live.disposer.push(cleanup);
                None
            }
            None => Some(cleanup),
        };
        if let Some(cleanup) = orphan {
            cleanup();
        }
    }

    /// Release the live incarnation, if any.
    fn teardown(&self) {
        let Some(live) = self.live.borrow_mut().take() else { return };
        live.disposer.release();
        self.events.reset_attached();

        let mut handle = live.handle;
        let id = handle.id().clone();
        if self.kind.can_be_parent() {
            self.group.parent_gone();
        }
        self.context.notify_cell_destroyed(&id);
        handle.applied = Some(Applied {
            kind: self.kind.name().to_string(),
            props: Box::new(live.applied),
        });
        self.context.recycle(id, handle);
    }
}

/// Run setter calls in order. Returns the properties they touched.
fn apply_calls(
    engine: &EngineHandle,
    id: &CellId,
    calls: Vec<SetterCall>,
) -> std::result::Result<PropMask, EngineError> {
    let mut changed = PropMask::empty();
    for (mask, mutation) in calls {
        let options = setter_options(&mutation);
        engine.mutate(id, mutation, options)?;
        changed |= mask;
    }
    Ok(changed)
}

impl<K: CellKind> fmt::Debug for CellBinding<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellBinding")
            .field("kind", &self.inner.kind.name())
            .field("cell", &self.cell_id())
            .field("unmounted", &self.inner.unmounted.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{CellEvent, GraphBinding};
    use crate::cell::{EdgeDescriptor, NodeDescriptor, NodeProps};
    use crate::config::BindingConfig;
    use crate::engine::{CellType, Engine, EngineCall, MemoryEngine, Mutation};
    use crate::scheduler::ManualScheduler;
    use crate::types::Point;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        scheduler: Rc<ManualScheduler>,
        engine: Rc<MemoryEngine>,
        graph: GraphBinding,
    }

    fn setup() -> Fixture {
        let scheduler = Rc::new(ManualScheduler::new());
        let engine = Rc::new(MemoryEngine::new());
        let graph = GraphBinding::new(scheduler.clone(), BindingConfig::default());
        graph.attach_engine(engine.clone()).unwrap();
        Fixture { scheduler, engine, graph }
    }

    fn counter() -> (Rc<Cell<usize>>, impl Fn(&crate::engine::EngineEvent) + 'static) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        (count, move |_: &crate::engine::EngineEvent| count_clone.set(count_clone.get() + 1))
    }

    #[test]
    fn test_mount_outside_graph_scope_fails() {
        let err = NodeBinding::node(NodeDescriptor::node("n1")).unwrap_err();
        assert_eq!(err, BindingError::MissingGraphProvider);
    }

    #[test]
    fn test_created_one_tick_after_mount() {
        let fx = setup();
        let node = fx.graph.provide(|| NodeBinding::node(NodeDescriptor::node("n1"))).unwrap();
        assert!(!node.is_created());

        fx.scheduler.run_ticks();
        assert_eq!(node.cell_id(), Some("n1".into()));
        assert_eq!(fx.engine.cell(&"n1".into()).unwrap().z_index, 1);
    }

    #[test]
    fn test_update_only_calls_changed_setters() {
        let fx = setup();
        let base = NodeDescriptor::node("n1")
            .position(0.0, 0.0)
            .attrs(json!({ "body": { "fill": "red" } }));
        let node = fx.graph.provide(|| NodeBinding::node(base.clone())).unwrap();
        fx.scheduler.run_ticks();
        let serial = fx.engine.serial(&"n1".into());
        fx.engine.clear_calls();

        let changed = node.update(base.position(10.0, 20.0)).unwrap();
        assert_eq!(changed, PropMask::POSITION);
        assert_eq!(
            fx.engine.mutations_of(&"n1".into()),
            vec![Mutation::Position { x: 10.0, y: 20.0 }]
        );
        assert_eq!(fx.engine.serial(&"n1".into()), serial);
    }

    #[test]
    fn test_update_before_creation_uses_latest_descriptor() {
        let fx = setup();
        let node = fx.graph.provide(|| NodeBinding::node(NodeDescriptor::node("n1"))).unwrap();
        node.update(NodeDescriptor::node("n1").position(5.0, 5.0)).unwrap();

        fx.scheduler.run_ticks();
        assert_eq!(fx.engine.cell(&"n1".into()).unwrap().position, Point::new(5.0, 5.0));
        assert!(fx.engine.mutations_of(&"n1".into()).is_empty());
    }

    #[test]
    fn test_delegated_and_direct_handlers() {
        let fx = setup();
        let (clicks, on_click) = counter();
        let (moves, on_move) = counter();
        let _node = fx
            .graph
            .provide(|| {
                NodeBinding::node(
                    NodeDescriptor::node("n1")
                        .on(CellEvent::Click, on_click)
                        .on_prop("onChange$Position", on_move),
                )
            })
            .unwrap();
        fx.scheduler.run_ticks();

        fx.engine.interact(&"n1".into(), "click");
        fx.engine
            .mutate(&"n1".into(), Mutation::Position { x: 1.0, y: 1.0 }, MutationOptions::user())
            .unwrap();
        assert_eq!(clicks.get(), 1);
        assert_eq!(moves.get(), 1);
        assert_eq!(fx.engine.graph_listener_count("cell:click"), 1);
    }

    #[test]
    fn test_own_setter_echo_is_ignored() {
        let fx = setup();
        let (moves, on_move) = counter();
        let base = NodeDescriptor::node("n1").on_prop("onChange$Position", on_move);
        let node = fx.graph.provide(|| NodeBinding::node(base.clone())).unwrap();
        fx.scheduler.run_ticks();

        node.update(base.position(3.0, 4.0)).unwrap();
        assert_eq!(moves.get(), 0);
    }

    #[test]
    fn test_reentrant_update_is_folded() {
        let fx = setup();
        let slot: Rc<RefCell<Option<Rc<NodeBinding>>>> = Rc::new(RefCell::new(None));
        let node = Rc::new(
            fx.graph
                .provide(|| NodeBinding::node(NodeDescriptor::node("n1")))
                .unwrap(),
        );
        *slot.borrow_mut() = Some(node.clone());
        fx.scheduler.run_ticks();

        // A user-side listener that answers every z-index change with a
        // position update on the same binding.
        let slot_clone = slot.clone();
        fx.engine
            .subscribe_cell(
                &"n1".into(),
                "change:zIndex",
                Rc::new(move |_: &crate::engine::EngineEvent| {
                    if let Some(node) = slot_clone.borrow().as_ref() {
                        let next = NodeDescriptor::node("n1").z_index(5).position(7.0, 7.0);
                        let _ = node.update(next);
                    }
                }),
            )
            .unwrap();
        fx.engine.clear_calls();

        let changed = node.update(NodeDescriptor::node("n1").z_index(5)).unwrap();
        assert_eq!(changed, PropMask::Z_INDEX | PropMask::POSITION);
        assert_eq!(
            fx.engine.mutations_of(&"n1".into()),
            vec![Mutation::ZIndex(5), Mutation::Position { x: 7.0, y: 7.0 }]
        );
        slot.borrow_mut().take();
    }

    #[test]
    fn test_engine_rejection_propagates() {
        let fx = setup();
        let edge = fx
            .graph
            .provide(|| {
                EdgeBinding::edge(EdgeDescriptor::edge("e1").source([0.0, 0.0]).target([1.0, 1.0]))
            })
            .unwrap();
        fx.scheduler.run_ticks();

        let err = edge
            .update(EdgeDescriptor::edge("e1").source("missing").target([1.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, BindingError::Engine(EngineError::InvalidTerminal(_))));
    }

    #[test]
    fn test_deferred_creation_error_is_returned_by_next_update() {
        let fx = setup();
        let edge = fx
            .graph
            .provide(|| {
                EdgeBinding::edge(EdgeDescriptor::edge("e1").source("ghost").target([1.0, 1.0]))
            })
            .unwrap();
        fx.scheduler.run_ticks();
        assert!(!edge.is_created());

        let err = edge.update(EdgeDescriptor::edge("e1")).unwrap_err();
        assert!(matches!(err, BindingError::Engine(EngineError::InvalidTerminal(_))));

        // Retried with the corrected descriptor.
        let fixed = EdgeDescriptor::edge("e1").source([0.0, 0.0]).target([1.0, 1.0]);
        assert_eq!(edge.update(fixed), Ok(PropMask::empty()));
        assert!(edge.is_created());
        assert_eq!(fx.engine.creations_of(&"e1".into()), 1);
    }

    #[test]
    fn test_unmount_is_idempotent() {
        let fx = setup();
        let config = BindingConfig::default().with_recycle(false);
        let graph = GraphBinding::new(fx.scheduler.clone(), config);
        graph.attach_engine(fx.engine.clone()).unwrap();
        let node = graph
            .provide(|| NodeBinding::node(NodeDescriptor::node("n1").on(CellEvent::Click, |_| {})))
            .unwrap();
        fx.scheduler.run_ticks();

        node.unmount();
        node.unmount();
        assert_eq!(fx.engine.removals_of(&"n1".into()), 1);
        assert_eq!(fx.engine.listener_count(), 0);
        assert_eq!(node.update(NodeDescriptor::node("n1")), Err(BindingError::Disposed));
    }

    #[test]
    fn test_unmount_before_ready_creates_nothing() {
        let fx = setup();
        let node = fx.graph.provide(|| NodeBinding::node(NodeDescriptor::node("n1"))).unwrap();
        node.unmount();
        fx.scheduler.run_ticks();
        assert_eq!(fx.engine.creations_of(&"n1".into()), 0);
    }

    #[test]
    fn test_remount_reuses_recycled_handle() {
        let fx = setup();
        let descriptor = NodeDescriptor::node("n1").position(1.0, 1.0);
        let first = fx.graph.provide(|| NodeBinding::node(descriptor.clone())).unwrap();
        fx.scheduler.run_ticks();
        first.unmount();
        assert_eq!(fx.engine.is_visible(&"n1".into()), Some(false));

        let second = fx
            .graph
            .provide(|| NodeBinding::node(descriptor.clone().position(2.0, 2.0)))
            .unwrap();
        fx.scheduler.run_ticks();
        assert!(second.is_created());
        assert_eq!(fx.engine.creations_of(&"n1".into()), 1);
        assert_eq!(fx.engine.is_visible(&"n1".into()), Some(true));
        assert_eq!(fx.engine.cell(&"n1".into()).unwrap().position, Point::new(2.0, 2.0));

        fx.scheduler.advance(Duration::from_secs(1));
        assert!(fx.engine.contains(&"n1".into()));
    }

    #[test]
    fn test_custom_factory() {
        let fx = setup();
        let made = Rc::new(Cell::new(0));
        let made_clone = made.clone();
        let factory: Factory<NodeProps> = Rc::new(move |props: &NodeProps, engine: &EngineHandle| {
            made_clone.set(made_clone.get() + 1);
            let id = engine.add_node(props, MutationOptions::component())?;
            Ok(CellHandle::removing(id, engine.clone()))
        });
        let _node = fx
            .graph
            .provide(|| NodeBinding::mount_with(NodeKind, NodeDescriptor::node("n1"), factory))
            .unwrap();
        fx.scheduler.run_ticks();
        assert_eq!(made.get(), 1);
    }

    #[test]
    fn test_children_embed_into_parent() {
        let fx = setup();
        let group = fx.graph.provide(|| NodeBinding::node(NodeDescriptor::node("g"))).unwrap();
        let child = fx
            .graph
            .provide(|| group.provide_children(|| NodeBinding::node(NodeDescriptor::node("c"))))
            .unwrap();
        fx.scheduler.run_ticks();

        assert_eq!(fx.engine.cell(&"g".into()).unwrap().children, vec![CellId::from("c")]);
        child.unmount();
        assert!(fx.engine.cell(&"g".into()).unwrap().children.is_empty());
    }

    #[test]
    fn test_non_group_shape_rejects_children() {
        let fx = setup();
        fx.engine.register_shape("label", &[]);
        let text = fx
            .graph
            .provide(|| {
                let kind = ShapeKind::new("label").groupable(false);
                ShapeBinding::mount(kind, NodeDescriptor::node("t"))
            })
            .unwrap();
        let announced = Rc::new(Cell::new(false));
        let announced_clone = announced.clone();
        let child = fx
            .graph
            .provide(|| {
                text.provide_children(|| {
                    NodeBinding::node(
                        NodeDescriptor::node("c").on_cell_ready(move |_| announced_clone.set(true)),
                    )
                })
            })
            .unwrap();
        fx.scheduler.run_ticks();

        assert_eq!(child.take_error(), Some(BindingError::NotAGroup("t".into())));
        // Creation is rolled back: no object, nothing announced.
        assert!(!child.is_created());
        assert!(!fx.engine.contains(&"c".into()));
        assert!(!fx.graph.context().is_live(&"c".into()));
        assert!(!announced.get());
        assert_eq!(fx.engine.removals_of(&"c".into()), 1);
        assert!(fx.graph.context().recycle_cache().is_empty());
    }

    #[test]
    fn test_recycled_handle_of_other_kind_is_not_reused() {
        let fx = setup();
        let node = fx.graph.provide(|| NodeBinding::node(NodeDescriptor::node("x"))).unwrap();
        fx.scheduler.run_ticks();
        node.unmount();
        assert!(fx.graph.context().recycle_cache().contains(&"x".into()));

        let edge = fx
            .graph
            .provide(|| {
                EdgeBinding::edge(EdgeDescriptor::edge("x").source([0.0, 0.0]).target([1.0, 1.0]))
            })
            .unwrap();
        fx.scheduler.run_ticks();

        assert!(edge.is_created());
        assert_eq!(edge.take_error(), None);
        assert_eq!(fx.engine.cell(&"x".into()).unwrap().kind, CellType::Edge);
        assert_eq!(fx.engine.creations_of(&"x".into()), 2);
        assert_eq!(fx.engine.removals_of(&"x".into()), 1);
    }

    #[test]
    fn test_edges_mounted_in_group_are_not_embedded() {
        let fx = setup();
        let group = fx.graph.provide(|| NodeBinding::node(NodeDescriptor::node("g"))).unwrap();
        let _edge = fx
            .graph
            .provide(|| {
                group.provide_children(|| {
                    let edge = EdgeDescriptor::edge("e").source([0.0, 0.0]).target([1.0, 1.0]);
                    EdgeBinding::edge(edge)
                })
            })
            .unwrap();
        fx.scheduler.run_ticks();
        assert!(fx.engine.cell(&"g".into()).unwrap().children.is_empty());
    }

    #[test]
    fn test_on_cell_ready_callback() {
        let fx = setup();
        let seen = Rc::new(RefCell::new(None));
        let seen_clone = seen.clone();
        let _node = fx
            .graph
            .provide(|| {
                NodeBinding::node(
                    NodeDescriptor::node("n1")
                        .on_cell_ready(move |id| *seen_clone.borrow_mut() = Some(id.clone())),
                )
            })
            .unwrap();
        fx.scheduler.run_ticks();
        assert_eq!(*seen.borrow(), Some(CellId::from("n1")));
    }

    #[test]
    fn test_handler_added_on_update_is_attached() {
        let fx = setup();
        let (clicks, on_click) = counter();
        let node = fx.graph.provide(|| NodeBinding::node(NodeDescriptor::node("n1"))).unwrap();
        fx.scheduler.run_ticks();
        assert_eq!(fx.engine.graph_listener_count("cell:click"), 0);

        node.update(NodeDescriptor::node("n1").on(CellEvent::Click, on_click)).unwrap();
        fx.engine.interact(&"n1".into(), "click");
        assert_eq!(clicks.get(), 1);
        assert!(
            !fx.engine
                .calls()
                .iter()
                .any(|call| matches!(call, EngineCall::Mutate { .. }))
        );
    }
}
