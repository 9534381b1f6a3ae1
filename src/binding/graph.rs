//! Graph Binding - the root of a bound diagram.
//!
//! Owns the [`GraphContext`] every cell binding under it shares, receives the
//! engine once it is constructed, and carries graph-level handlers
//! (`scale`, `node:moved`, `selection:changed`, ...).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::context::GraphContext;
use super::events::EventStore;
use super::scope::provide_graph;
use crate::config::BindingConfig;
use crate::dispose::Cleanup;
use crate::engine::{EngineEvent, EngineHandle};
use crate::error::Result;
use crate::scheduler::Scheduler;

/// Root binding of one engine instance.
pub struct GraphBinding {
    context: GraphContext,
    events: EventStore<String>,
    /// Engine subscription per graph-level event.
    subscriptions: RefCell<HashMap<String, Cleanup>>,
}

impl GraphBinding {
    pub fn new(scheduler: Rc<dyn Scheduler>, config: BindingConfig) -> Self {
        Self {
            context: GraphContext::new(scheduler, config),
            events: EventStore::new(),
            subscriptions: RefCell::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &GraphContext {
        &self.context
    }

    pub fn engine(&self) -> Option<EngineHandle> {
        self.context.engine()
    }

    /// Handle a graph-scope engine event. Replaces any earlier handler for
    /// the same event; works before and after the engine is attached.
    pub fn on(&self, event: &str, handler: impl Fn(&EngineEvent) + 'static) {
        self.events.set(event.to_string(), Rc::new(handler));
        if let Some(engine) = self.context.engine() {
            self.attach_events(&engine);
        }
    }

    /// Stop handling `event` and drop its engine subscription.
    pub fn off(&self, event: &str) {
        self.events.detach(&event.to_string());
        let subscription = self.subscriptions.borrow_mut().remove(event);
        if let Some(unsubscribe) = subscription {
            unsubscribe();
        }
    }

    /// The engine has been constructed. Cell bindings mounted so far are
    /// created on the next tick.
    ///
    /// Attaching a second engine is ignored with a warning.
    pub fn attach_engine(&self, engine: EngineHandle) -> Result<()> {
        if !self.context.attach(engine.clone())? {
            tracing::warn!("graph engine attached twice, keeping the first one");
            return Ok(());
        }
        tracing::debug!("graph engine attached");
        self.attach_events(&engine);
        Ok(())
    }

    /// Run `f` (typically: mount cell bindings) inside this graph's scope.
    pub fn provide<R>(&self, f: impl FnOnce() -> R) -> R {
        provide_graph(&self.context, f)
    }

    /// Tear down graph handlers, parked cells and pending listeners.
    /// Idempotent.
    pub fn dispose(&self) {
        self.events.dispose();
        let subscriptions: Vec<Cleanup> =
            self.subscriptions.borrow_mut().drain().map(|(_, cleanup)| cleanup).collect();
        for unsubscribe in subscriptions {
            unsubscribe();
        }
        self.context.dispose();
    }

    fn attach_events(&self, engine: &EngineHandle) {
        for event in self.events.take_unattached() {
            let subscription = engine.subscribe(&event, self.events.wrapper(event.clone()));
            let engine = engine.clone();
            let unsubscribe: Cleanup = Box::new(move || engine.unsubscribe(subscription));
            self.subscriptions.borrow_mut().insert(event, unsubscribe);
        }
    }
}

impl fmt::Debug for GraphBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphBinding")
            .field("context", &self.context)
            .field("events", &self.events)
            .field("subscriptions", &self.subscriptions.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, MemoryEngine, Mutation};
    use crate::cell::{CellProps, NodeProps};
    use crate::scheduler::ManualScheduler;
    use crate::types::MutationOptions;
    use std::cell::Cell;

    fn setup() -> (Rc<MemoryEngine>, GraphBinding) {
        let scheduler = Rc::new(ManualScheduler::new());
        (Rc::new(MemoryEngine::new()), GraphBinding::new(scheduler, BindingConfig::default()))
    }

    fn counter() -> (Rc<Cell<usize>>, impl Fn(&EngineEvent) + 'static) {
        let count = Rc::new(Cell::new(0));
        let count_clone = count.clone();
        (count, move |_: &EngineEvent| count_clone.set(count_clone.get() + 1))
    }

    #[test]
    fn test_handlers_registered_before_attach() {
        let (engine, graph) = setup();
        let (scales, on_scale) = counter();
        graph.on("scale", on_scale);
        assert_eq!(engine.graph_listener_count("scale"), 0);

        graph.attach_engine(engine.clone()).unwrap();
        engine.zoom(2.0);
        assert_eq!(scales.get(), 1);
    }

    #[test]
    fn test_replacing_handler_keeps_one_subscription() {
        let (engine, graph) = setup();
        graph.attach_engine(engine.clone()).unwrap();
        let (first, on_first) = counter();
        let (second, on_second) = counter();
        graph.on("translate", on_first);
        graph.on("translate", on_second);

        engine.translate(1.0, 1.0);
        assert_eq!(engine.graph_listener_count("translate"), 1);
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn test_graph_handlers_skip_component_echo() {
        let (engine, graph) = setup();
        graph.attach_engine(engine.clone()).unwrap();
        let (moves, on_move) = counter();
        graph.on("node:change:position", on_move);

        let props = NodeProps {
            cell: CellProps { id: Some("n1".into()), ..Default::default() },
            ..Default::default()
        };
        let id = engine.add_node(&props, MutationOptions::user()).unwrap();
        engine
            .mutate(&id, Mutation::Position { x: 1.0, y: 1.0 }, MutationOptions::component())
            .unwrap();
        engine.mutate(&id, Mutation::Position { x: 2.0, y: 1.0 }, MutationOptions::user()).unwrap();
        assert_eq!(moves.get(), 1);
    }

    #[test]
    fn test_second_engine_is_ignored() {
        let (engine, graph) = setup();
        graph.attach_engine(engine.clone()).unwrap();
        graph.attach_engine(Rc::new(MemoryEngine::new())).unwrap();
        let current = graph.engine().unwrap();
        assert!(Rc::ptr_eq(&current, &(engine as EngineHandle)));
    }

    #[test]
    fn test_off_unsubscribes_and_on_resubscribes() {
        let (engine, graph) = setup();
        graph.attach_engine(engine.clone()).unwrap();
        let (first, on_first) = counter();
        graph.on("scale", on_first);
        assert_eq!(engine.graph_listener_count("scale"), 1);

        graph.off("scale");
        assert_eq!(engine.graph_listener_count("scale"), 0);
        engine.zoom(2.0);
        assert_eq!(first.get(), 0);

        graph.off("scale");
        let (second, on_second) = counter();
        graph.on("scale", on_second);
        assert_eq!(engine.graph_listener_count("scale"), 1);
        engine.zoom(3.0);
        assert_eq!(first.get(), 0);
        assert_eq!(second.get(), 1);
    }

    #[test]
    fn test_off_before_attach() {
        let (engine, graph) = setup();
        let (scales, on_scale) = counter();
        graph.on("scale", on_scale);
        graph.off("scale");

        graph.attach_engine(engine.clone()).unwrap();
        assert_eq!(engine.graph_listener_count("scale"), 0);
        engine.zoom(2.0);
        assert_eq!(scales.get(), 0);
    }

    #[test]
    fn test_dispose_unsubscribes() {
        let (engine, graph) = setup();
        let (_, on_scale) = counter();
        graph.on("scale", on_scale);
        graph.attach_engine(engine.clone()).unwrap();

        graph.dispose();
        graph.dispose();
        assert_eq!(engine.listener_count(), 0);
    }
}
