//! Recycle Cache.
//!
//! When a binding unmounts, its handle can be parked here instead of being
//! disposed. A binding that mounts with the same id within the grace period
//! takes the handle back, so a list reorder (unmount + remount of the same
//! item) keeps the engine object and everything the engine tracks on it.
//!
//! How long a handle may stay parked is decided by a [`RecyclePolicy`].
//! Parked handles are hidden; expired ones are disposed by a sweep timer that
//! keeps rescheduling itself while entries remain.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::cell::CellHandle;
use crate::scheduler::{Scheduler, TimerId};
use crate::types::CellId;

// =============================================================================
// Policies
// =============================================================================

/// Decides whether, and for how long, an unmounted handle is parked.
pub trait RecyclePolicy {
    /// Grace period for `id`. `None` disposes the handle right away.
    fn grace_period(&self, id: &CellId) -> Option<Duration>;
}

/// Park every handle for a fixed grace period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepAlive {
    pub grace: Duration,
}

impl KeepAlive {
    pub const DEFAULT_GRACE: Duration = Duration::from_millis(300);

    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new(Self::DEFAULT_GRACE)
    }
}

impl RecyclePolicy for KeepAlive {
    fn grace_period(&self, _id: &CellId) -> Option<Duration> {
        Some(self.grace)
    }
}

/// Never park; unmount always disposes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NeverRecycle;

impl RecyclePolicy for NeverRecycle {
    fn grace_period(&self, _id: &CellId) -> Option<Duration> {
        None
    }
}

// =============================================================================
// Cache
// =============================================================================

struct Parked {
    handle: CellHandle,
    expires: Duration,
}

/// Pending sweep timer and the clock time it fires at.
struct Sweep {
    timer: TimerId,
    due: Duration,
}

#[derive(Default)]
struct CacheState {
    parked: HashMap<CellId, Parked>,
    sweep: Option<Sweep>,
}

struct Shared {
    state: RefCell<CacheState>,
    scheduler: Rc<dyn Scheduler>,
    policy: Rc<dyn RecyclePolicy>,
}

/// Handles parked after unmount, keyed by cell id.
#[derive(Clone)]
pub struct RecycleCache {
    shared: Rc<Shared>,
}

impl RecycleCache {
    pub fn new(scheduler: Rc<dyn Scheduler>, policy: Rc<dyn RecyclePolicy>) -> Self {
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(CacheState::default()),
                scheduler,
                policy,
            }),
        }
    }

    /// Park `handle` under `id`, or dispose it if the policy says so.
    ///
    /// Returns `true` if the handle was parked. A handle already parked
    /// under the same id is disposed first.
    pub fn recycle(&self, id: CellId, mut handle: CellHandle) -> bool {
        let Some(grace) = self.shared.policy.grace_period(&id) else {
            handle.dispose();
            return false;
        };

        handle.park();
        let expires = self.shared.scheduler.now() + grace;
        let replaced = self
            .shared
            .state
            .borrow_mut()
            .parked
            .insert(id.clone(), Parked { handle, expires });
        if let Some(previous) = replaced {
            previous.handle.dispose();
        }
        tracing::debug!(cell = %id, grace_ms = grace.as_millis() as u64, "cell recycled");

        // Policies may grant per-id graces: keep the timer on the earliest expiry.
        let stale = {
            let mut state = self.shared.state.borrow_mut();
            match &state.sweep {
                Some(sweep) if sweep.due <= expires => None,
                _ => Some(state.sweep.take()),
            }
        };
        if let Some(stale) = stale {
            if let Some(sweep) = stale {
                self.shared.scheduler.clear_timeout(sweep.timer);
            }
            schedule_sweep(&self.shared, expires);
        }
        true
    }

    /// Take back the handle parked under `id`.
    ///
    /// A handle whose engine object is gone is disposed and `None` is
    /// returned.
    pub fn reuse(&self, id: &CellId) -> Option<CellHandle> {
        self.take(id, |_| true)
    }

    /// Like [`reuse`](Self::reuse), but only for a handle parked by a cell
    /// of `kind`. A handle of another kind is disposed: its id is about to
    /// be taken by a new object.
    pub fn reuse_as(&self, id: &CellId, kind: &str) -> Option<CellHandle> {
        self.take(id, |handle| handle.kind() == Some(kind))
    }

    fn take(&self, id: &CellId, accept: impl FnOnce(&CellHandle) -> bool) -> Option<CellHandle> {
        let parked = self.shared.state.borrow_mut().parked.remove(id)?;
        let mut handle = parked.handle;
        if !handle.is_alive() {
            tracing::debug!(cell = %id, "recycled cell vanished, disposing");
            handle.dispose();
            return None;
        }
        if !accept(&handle) {
            tracing::debug!(
                cell = %id,
                kind = ?handle.kind(),
                "recycled cell of another kind, disposing"
            );
            handle.dispose();
            return None;
        }
        handle.unpark();
        tracing::debug!(cell = %id, "cell reused");
        Some(handle)
    }

    pub fn contains(&self, id: &CellId) -> bool {
        self.shared.state.borrow().parked.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.shared.state.borrow().parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every parked handle and stop the sweep timer.
    pub fn clear(&self) {
        let (handles, sweep) = {
            let mut state = self.shared.state.borrow_mut();
            let handles: Vec<CellHandle> =
                state.parked.drain().map(|(_, parked)| parked.handle).collect();
            (handles, state.sweep.take())
        };
        if let Some(sweep) = sweep {
            self.shared.scheduler.clear_timeout(sweep.timer);
        }
        for handle in handles {
            handle.dispose();
        }
    }
}

fn schedule_sweep(shared: &Rc<Shared>, due: Duration) {
    let weak: Weak<Shared> = Rc::downgrade(shared);
    let delay = due.saturating_sub(shared.scheduler.now());
    let timer = shared
        .scheduler
        .set_timeout(delay, Box::new(move || sweep(&weak)));
    shared.state.borrow_mut().sweep = Some(Sweep { timer, due });
}

fn sweep(shared: &Weak<Shared>) {
    let Some(shared) = shared.upgrade() else { return };
    let now = shared.scheduler.now();
    let (expired, next) = {
        let mut state = shared.state.borrow_mut();
        state.sweep = None;
        let expired_ids: Vec<CellId> = state
            .parked
            .iter()
            .filter(|(_, parked)| parked.expires <= now)
            .map(|(id, _)| id.clone())
            .collect();
        let expired: Vec<CellHandle> = expired_ids
            .iter()
            .filter_map(|id| state.parked.remove(id))
            .map(|parked| parked.handle)
            .collect();
        let next = state.parked.values().map(|parked| parked.expires).min();
        (expired, next)
    };

    for handle in expired {
        tracing::debug!(cell = %handle.id(), "recycle grace elapsed");
        handle.dispose();
    }
    if let Some(next) = next {
        schedule_sweep(&shared, next);
    }
}

impl fmt::Debug for RecycleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        let mut ids: Vec<_> = state.parked.keys().collect();
        ids.sort();
        f.debug_struct("RecycleCache")
            .field("parked", &ids)
            .field("sweep_pending", &state.sweep.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellProps, NodeProps};
    use crate::engine::{Engine, EngineHandle, MemoryEngine};
    use crate::scheduler::ManualScheduler;
    use crate::types::MutationOptions;

    fn setup(
        policy: Rc<dyn RecyclePolicy>,
    ) -> (Rc<ManualScheduler>, Rc<MemoryEngine>, RecycleCache) {
        let scheduler = Rc::new(ManualScheduler::new());
        let engine = Rc::new(MemoryEngine::new());
        let cache = RecycleCache::new(scheduler.clone(), policy);
        (scheduler, engine, cache)
    }

    fn handle(engine: &Rc<MemoryEngine>, id: &str) -> CellHandle {
        let props = NodeProps {
            cell: CellProps {
                id: Some(id.into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let id = engine.add_node(&props, MutationOptions::user()).unwrap();
        let engine: EngineHandle = engine.clone();
        CellHandle::removing(id, engine)
    }

    #[test]
    fn test_reuse_within_grace() {
        let (scheduler, engine, cache) = setup(Rc::new(KeepAlive::default()));
        let id = CellId::from("n1");
        assert!(cache.recycle(id.clone(), handle(&engine, "n1")));
        assert_eq!(engine.is_visible(&id), Some(false));

        scheduler.advance(Duration::from_millis(299));
        let reused = cache.reuse(&id).unwrap();
        assert_eq!(reused.id(), &id);
        assert_eq!(engine.is_visible(&id), Some(true));
        assert_eq!(engine.removals_of(&id), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_handles_are_disposed() {
        let (scheduler, engine, cache) = setup(Rc::new(KeepAlive::default()));
        let id = CellId::from("n1");
        cache.recycle(id.clone(), handle(&engine, "n1"));

        scheduler.advance(Duration::from_millis(300));
        assert!(!engine.contains(&id));
        assert!(cache.reuse(&id).is_none());
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_sweep_reschedules_for_later_entries() {
        let (scheduler, engine, cache) = setup(Rc::new(KeepAlive::default()));
        cache.recycle("a".into(), handle(&engine, "a"));
        scheduler.advance(Duration::from_millis(200));
        cache.recycle("b".into(), handle(&engine, "b"));

        scheduler.advance(Duration::from_millis(100));
        assert!(!engine.contains(&"a".into()));
        assert!(engine.contains(&"b".into()));
        assert_eq!(scheduler.pending_timers(), 1);

        scheduler.advance(Duration::from_millis(200));
        assert!(!engine.contains(&"b".into()));
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_never_recycle_disposes_immediately() {
        let (scheduler, engine, cache) = setup(Rc::new(NeverRecycle));
        let id = CellId::from("n1");
        assert!(!cache.recycle(id.clone(), handle(&engine, "n1")));
        assert!(!engine.contains(&id));
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_vanished_handle_is_not_reused() {
        let (_scheduler, engine, cache) = setup(Rc::new(KeepAlive::default()));
        let id = CellId::from("n1");
        cache.recycle(id.clone(), handle(&engine, "n1"));
        engine.remove_cell(&id, MutationOptions::user()).unwrap();

        assert!(cache.reuse(&id).is_none());
        assert_eq!(engine.removals_of(&id), 1);
    }

    #[test]
    fn test_clear_disposes_everything() {
        let (scheduler, engine, cache) = setup(Rc::new(KeepAlive::default()));
        cache.recycle("a".into(), handle(&engine, "a"));
        cache.recycle("b".into(), handle(&engine, "b"));

        cache.clear();
        assert_eq!(engine.cell_count(), 0);
        assert_eq!(scheduler.pending_timers(), 0);
        cache.clear();
    }

    #[test]
    fn test_custom_policy_per_id() {
        struct OnlyNodes;
        impl RecyclePolicy for OnlyNodes {
            fn grace_period(&self, id: &CellId) -> Option<Duration> {
                id.as_str().starts_with('n').then_some(Duration::from_millis(10))
            }
        }

        let (_scheduler, engine, cache) = setup(Rc::new(OnlyNodes));
        assert!(cache.recycle("n1".into(), handle(&engine, "n1")));
        assert!(!cache.recycle("e1".into(), handle(&engine, "e1")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_shorter_grace_rearms_sweep() {
        struct ByPrefix;
        impl RecyclePolicy for ByPrefix {
            fn grace_period(&self, id: &CellId) -> Option<Duration> {
                let ms = if id.as_str().starts_with("slow") { 500 } else { 10 };
                Some(Duration::from_millis(ms))
            }
        }

        let (scheduler, engine, cache) = setup(Rc::new(ByPrefix));
        cache.recycle("slow".into(), handle(&engine, "slow"));
        cache.recycle("fast".into(), handle(&engine, "fast"));
        assert_eq!(scheduler.pending_timers(), 1);

        scheduler.advance(Duration::from_millis(10));
        assert!(!engine.contains(&"fast".into()));
        assert!(engine.contains(&"slow".into()));
        assert_eq!(scheduler.pending_timers(), 1);

        scheduler.advance(Duration::from_millis(490));
        assert!(!engine.contains(&"slow".into()));
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_recycle_and_reuse_are_logged() {
        let (_scheduler, engine, cache) = setup(Rc::new(KeepAlive::default()));
        cache.recycle("n1".into(), handle(&engine, "n1"));
        let _ = cache.reuse(&"n1".into());
        assert!(logs_contain("cell recycled"));
        assert!(logs_contain("cell reused"));
    }
}
