//! Graph Context - what every binding under one graph shares.
//!
//! - the ready notifier (the engine, once constructed)
//! - the delegation registry (created when the engine is attached)
//! - the recycle cache
//! - cell lifecycle listeners (ready / destroyed, optionally watching one id)

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use super::delegation::DelegationRegistry;
use super::ready::ReadyNotifier;
use crate::cell::CellHandle;
use crate::config::BindingConfig;
use crate::dispose::{Cleanup, noop};
use crate::engine::{EngineHandle, EventHandler};
use crate::error::{BindingError, Result};
use crate::recycle::RecycleCache;
use crate::scheduler::Scheduler;
use crate::types::CellId;

/// Cell lifecycle callback.
pub type CellListener = Rc<dyn Fn(&CellId)>;

struct Watcher {
    watch: Option<CellId>,
    listener: CellListener,
}

#[derive(Default)]
struct Lifecycle {
    ready: BTreeMap<u64, Watcher>,
    destroyed: BTreeMap<u64, Watcher>,
    live: HashSet<CellId>,
    next_id: u64,
}

struct ContextInner {
    config: BindingConfig,
    scheduler: Rc<dyn Scheduler>,
    ready: ReadyNotifier<EngineHandle>,
    delegation: RefCell<Option<Rc<DelegationRegistry>>>,
    recycle: RecycleCache,
    lifecycle: RefCell<Lifecycle>,
    disposed: Cell<bool>,
}

/// Shared state of one graph binding. Cheap to clone.
#[derive(Clone)]
pub struct GraphContext {
    inner: Rc<ContextInner>,
}

impl GraphContext {
    pub fn new(scheduler: Rc<dyn Scheduler>, config: BindingConfig) -> Self {
        let recycle = RecycleCache::new(scheduler.clone(), config.recycle_policy());
        Self {
            inner: Rc::new(ContextInner {
                ready: ReadyNotifier::new(scheduler.clone()),
                delegation: RefCell::new(None),
                recycle,
                lifecycle: RefCell::new(Lifecycle::default()),
                disposed: Cell::new(false),
                config,
                scheduler,
            }),
        }
    }

    pub fn config(&self) -> &BindingConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// The engine, once attached.
    pub fn engine(&self) -> Option<EngineHandle> {
        self.inner.ready.value()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    // =========================================================================
    // Ready
    // =========================================================================

    /// Run `listener` with the engine one tick after it is attached (or one
    /// tick from now if it already is). Returns its cleanup.
    pub fn on_ready(&self, listener: impl FnOnce(&EngineHandle) + 'static) -> Cleanup {
        if self.is_disposed() {
            return noop();
        }
        self.inner.ready.on_ready(listener)
    }

    /// Make `engine` available to every binding. Returns `false` if an
    /// engine was already attached.
    pub(crate) fn attach(&self, engine: EngineHandle) -> Result<bool> {
        if self.is_disposed() {
            return Err(BindingError::Disposed);
        }
        if self.inner.ready.is_ready() {
            return Ok(false);
        }
        let registry = DelegationRegistry::new(engine.clone());
        *self.inner.delegation.borrow_mut() = Some(Rc::new(registry));
        Ok(self.inner.ready.fire(engine))
    }

    // =========================================================================
    // Delegation
    // =========================================================================

    /// Route the graph-scope `event` for `cell` to `handler`.
    pub fn delegate(&self, event: &str, handler: EventHandler, cell: &CellId) -> Result<Cleanup> {
        let registry = self
            .inner
            .delegation
            .borrow()
            .clone()
            .ok_or(BindingError::EngineNotReady)?;
        Ok(registry.delegate(event, handler, cell))
    }

    /// The delegation registry, once the engine is attached.
    pub fn delegation(&self) -> Option<Rc<DelegationRegistry>> {
        self.inner.delegation.borrow().clone()
    }

    // =========================================================================
    // Recycle
    // =========================================================================

    /// Park an unmounted cell's handle (or dispose it, per policy).
    pub fn recycle(&self, id: CellId, handle: CellHandle) -> bool {
        if self.is_disposed() {
            handle.dispose();
            return false;
        }
        self.inner.recycle.recycle(id, handle)
    }

    /// Take back a parked handle.
    pub fn reuse(&self, id: &CellId) -> Option<CellHandle> {
        self.inner.recycle.reuse(id)
    }

    /// Take back a handle parked by a cell of `kind`.
    pub fn reuse_as(&self, id: &CellId, kind: &str) -> Option<CellHandle> {
        self.inner.recycle.reuse_as(id, kind)
    }

    pub fn recycle_cache(&self) -> &RecycleCache {
        &self.inner.recycle
    }

    // =========================================================================
    // Cell Lifecycle
    // =========================================================================

    /// Listen for cells becoming ready. With `watch`, only that cell is
    /// reported, and the listener runs immediately if it is already live.
    pub fn on_cell_ready(
        &self,
        listener: impl Fn(&CellId) + 'static,
        watch: Option<CellId>,
    ) -> Cleanup {
        let listener: CellListener = Rc::new(listener);
        let already_live = watch
            .as_ref()
            .filter(|id| self.inner.lifecycle.borrow().live.contains(*id))
            .cloned();
        let cleanup = self.add_watcher(true, watch, listener.clone());
        if let Some(id) = already_live {
            listener(&id);
        }
        cleanup
    }

    /// Listen for cells being destroyed (disposed or recycled).
    pub fn on_cell_destroyed(
        &self,
        listener: impl Fn(&CellId) + 'static,
        watch: Option<CellId>,
    ) -> Cleanup {
        self.add_watcher(false, watch, Rc::new(listener))
    }

    pub fn is_live(&self, id: &CellId) -> bool {
        self.inner.lifecycle.borrow().live.contains(id)
    }

    pub(crate) fn notify_cell_ready(&self, id: &CellId) {
        let listeners = {
            let mut lifecycle = self.inner.lifecycle.borrow_mut();
            lifecycle.live.insert(id.clone());
            matching(&lifecycle.ready, id)
        };
        for listener in listeners {
            listener(id);
        }
    }

    pub(crate) fn notify_cell_destroyed(&self, id: &CellId) {
        let listeners = {
            let mut lifecycle = self.inner.lifecycle.borrow_mut();
            if !lifecycle.live.remove(id) {
                return;
            }
            matching(&lifecycle.destroyed, id)
        };
        for listener in listeners {
            listener(id);
        }
    }

    fn add_watcher(&self, ready: bool, watch: Option<CellId>, listener: CellListener) -> Cleanup {
        let id = {
            let mut lifecycle = self.inner.lifecycle.borrow_mut();
            let id = lifecycle.next_id;
            lifecycle.next_id += 1;
            let watchers = if ready {
                &mut lifecycle.ready
            } else {
                &mut lifecycle.destroyed
            };
            watchers.insert(id, Watcher { watch, listener });
            id
        };
        let weak: Weak<ContextInner> = Rc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut lifecycle = inner.lifecycle.borrow_mut();
                if ready {
                    lifecycle.ready.remove(&id);
                } else {
                    lifecycle.destroyed.remove(&id);
                }
            }
        })
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Dispose parked handles, drop delegations and pending listeners.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.recycle.clear();
        let registry = self.inner.delegation.borrow_mut().take();
        if let Some(registry) = registry {
            registry.clear();
        }
        self.inner.ready.reset();
        let mut lifecycle = self.inner.lifecycle.borrow_mut();
        lifecycle.ready.clear();
        lifecycle.destroyed.clear();
        tracing::debug!("graph context disposed");
    }
}

fn matching(watchers: &BTreeMap<u64, Watcher>, id: &CellId) -> Vec<CellListener> {
    watchers
        .values()
        .filter(|w| w.watch.as_ref().is_none_or(|watch| watch == id))
        .map(|w| w.listener.clone())
        .collect()
}

impl fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphContext")
            .field("ready", &self.inner.ready.is_ready())
            .field("live", &self.inner.lifecycle.borrow().live.len())
            .field("recycle", &self.inner.recycle)
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::scheduler::ManualScheduler;

    fn setup() -> (Rc<ManualScheduler>, GraphContext) {
        let scheduler = Rc::new(ManualScheduler::new());
        let context = GraphContext::new(scheduler.clone(), BindingConfig::default());
        (scheduler, context)
    }

    fn log() -> (Rc<RefCell<Vec<String>>>, impl Fn(&CellId) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        (log, move |id: &CellId| log_clone.borrow_mut().push(id.to_string()))
    }

    #[test]
    fn test_delegate_requires_engine() {
        let (_, context) = setup();
        let noop = || -> EventHandler { Rc::new(|_: &crate::engine::EngineEvent| {}) };
        let result = context.delegate("cell:click", noop(), &"n1".into());
        assert!(matches!(result, Err(BindingError::EngineNotReady)));

        context.attach(Rc::new(MemoryEngine::new())).unwrap();
        assert!(context.delegate("cell:click", noop(), &"n1".into()).is_ok());
    }

    #[test]
    fn test_attach_twice_is_refused() {
        let (_, context) = setup();
        assert_eq!(context.attach(Rc::new(MemoryEngine::new())), Ok(true));
        assert_eq!(context.attach(Rc::new(MemoryEngine::new())), Ok(false));
    }

    #[test]
    fn test_watched_ready_listener() {
        let (_, context) = setup();
        let (seen, listener) = log();
        let _cleanup = context.on_cell_ready(listener, Some("b".into()));

        context.notify_cell_ready(&"a".into());
        context.notify_cell_ready(&"b".into());
        assert_eq!(*seen.borrow(), vec!["b"]);
    }

    #[test]
    fn test_watching_live_cell_fires_immediately() {
        let (_, context) = setup();
        context.notify_cell_ready(&"a".into());

        let (seen, listener) = log();
        let _cleanup = context.on_cell_ready(listener, Some("a".into()));
        assert_eq!(*seen.borrow(), vec!["a"]);
    }

    #[test]
    fn test_destroyed_listener_and_cleanup() {
        let (_, context) = setup();
        let (seen, listener) = log();
        let cleanup = context.on_cell_destroyed(listener, None);

        context.notify_cell_ready(&"a".into());
        context.notify_cell_destroyed(&"a".into());
        context.notify_cell_destroyed(&"a".into());
        assert_eq!(*seen.borrow(), vec!["a"]);

        cleanup();
        context.notify_cell_ready(&"b".into());
        context.notify_cell_destroyed(&"b".into());
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (scheduler, context) = setup();
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();
        let _cleanup = context.on_ready(move |_| fired_clone.set(true));

        context.dispose();
        context.dispose();
        assert_eq!(context.attach(Rc::new(MemoryEngine::new())), Err(BindingError::Disposed));
        scheduler.run_ticks();
        assert!(!fired.get());
    }
}
