//! Ready Notifier - the "engine is constructed" transition.
//!
//! Bindings mount before the engine exists, in the same commit as the engine,
//! or long after it. [`ReadyNotifier::on_ready`] covers all three:
//! - before [`fire`](ReadyNotifier::fire): the listener is queued
//! - at `fire`: every queued listener is dispatched on the *next* tick, so
//!   siblings registering later in the same commit are never skipped
//! - after `fire`: the listener is dispatched on the next tick
//!
//! Each listener runs at most once. Its cleanup removes it if it has not run
//! yet and is a no-op afterwards.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dispose::Cleanup;
use crate::scheduler::Scheduler;

/// One-shot ready callback.
pub type ReadyListener<T> = Box<dyn FnOnce(&T)>;

struct ReadyState<T> {
    value: Option<T>,
    /// Listeners not yet run, in registration order.
    queued: BTreeMap<u64, ReadyListener<T>>,
    next_id: u64,
}

/// Queues listeners until a value (the engine) is available.
pub struct ReadyNotifier<T> {
    state: Rc<RefCell<ReadyState<T>>>,
    scheduler: Rc<dyn Scheduler>,
}

impl<T: Clone + 'static> ReadyNotifier<T> {
    pub fn new(scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ReadyState {
                value: None,
                queued: BTreeMap::new(),
                next_id: 0,
            })),
            scheduler,
        }
    }

    /// Register a ready listener. Returns its cleanup.
    pub fn on_ready<F>(&self, listener: F) -> Cleanup
    where
        F: FnOnce(&T) + 'static,
    {
        let (id, ready) = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            state.queued.insert(id, Box::new(listener));
            (id, state.value.is_some())
        };

        if ready {
            self.schedule_flush(vec![id]);
        }

        let weak = Rc::downgrade(&self.state);
        Box::new(move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().queued.remove(&id);
            }
        })
    }

    /// Mark the value as available and dispatch queued listeners next tick.
    ///
    /// Returns `false` (and does nothing) if already fired.
    pub fn fire(&self, value: T) -> bool {
        let ids: Vec<u64> = {
            let mut state = self.state.borrow_mut();
            if state.value.is_some() {
                return false;
            }
            state.value = Some(value);
            state.queued.keys().copied().collect()
        };
        self.schedule_flush(ids);
        true
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().value.is_some()
    }

    pub fn value(&self) -> Option<T> {
        self.state.borrow().value.clone()
    }

    /// Listeners registered and not yet run.
    pub fn pending(&self) -> usize {
        self.state.borrow().queued.len()
    }

    /// Drop every queued listener and the value.
    pub fn reset(&self) {
        let mut state = self.state.borrow_mut();
        state.queued.clear();
        state.value = None;
    }

    fn schedule_flush(&self, ids: Vec<u64>) {
        let weak = Rc::downgrade(&self.state);
        self.scheduler.next_tick(Box::new(move || flush(&weak, ids)));
    }
}

fn flush<T: Clone>(state: &Weak<RefCell<ReadyState<T>>>, ids: Vec<u64>) {
    let Some(state) = state.upgrade() else { return };
    for id in ids {
        // Re-borrow per listener: a listener may register or dispose others.
        let next = {
            let mut state = state.borrow_mut();
            let listener = state.queued.remove(&id);
            listener.zip(state.value.clone())
        };
        if let Some((listener, value)) = next {
            listener(&value);
        }
    }
}

impl<T> fmt::Debug for ReadyNotifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ReadyNotifier")
            .field("ready", &state.value.is_some())
            .field("queued", &state.queued.len())
            .finish()
    }
}
