//! Overlay Position Sync.
//!
//! Keeps a viewport-space box aligned with one engine object so declarative
//! content can be drawn on top of it. The box is recomputed when:
//! - the object changes (`change:*` on the object)
//! - the camera changes (`scale`, `resize`, `translate` on the graph)
//!
//! Every trigger goes through one [`FrameDebounce`]: any number of triggers
//! before a frame boundary produce one recomputation, which reads the final
//! state. The result is written to a signal; [`OverlaySync::render`] runs a
//! view effect against it.
//!
//! The target is found through the graph's cell lifecycle notifications,
//! never by polling. While it does not exist the position is `None` and the
//! overlay renders nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use spark_signals::{Signal, effect, signal};

use crate::binding::GraphContext;
use crate::dispose::{Cleanup, Disposer};
use crate::engine::{EngineEvent, EventHandler};
use crate::scheduler::{FrameId, Scheduler};
use crate::types::{CellId, Rect};

/// Graph events that move every object on screen.
pub const CAMERA_EVENTS: [&str; 3] = ["scale", "resize", "translate"];

/// Object event fired on any property change.
pub const ANY_CHANGE_EVENT: &str = "change:*";

// =============================================================================
// Overlay Box
// =============================================================================

/// Viewport-space placement of an overlay.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OverlayBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Mirrors the target's own visibility flag.
    pub visible: bool,
}

impl OverlayBox {
    pub fn from_rect(rect: Rect, visible: bool) -> Self {
        Self {
            x: rect.x0,
            y: rect.y0,
            width: rect.width(),
            height: rect.height(),
            visible,
        }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

// =============================================================================
// Frame Debounce
// =============================================================================

struct DebounceShared {
    scheduler: Rc<dyn Scheduler>,
    pending: Cell<Option<FrameId>>,
    task: Rc<dyn Fn()>,
}

/// Collapses any number of triggers into one run on the next frame.
#[derive(Clone)]
pub struct FrameDebounce {
    shared: Rc<DebounceShared>,
}

impl FrameDebounce {
    pub fn new(scheduler: Rc<dyn Scheduler>, task: impl Fn() + 'static) -> Self {
        Self {
            shared: Rc::new(DebounceShared {
                scheduler,
                pending: Cell::new(None),
                task: Rc::new(task),
            }),
        }
    }

    /// Request a run on the next frame. No-op if one is already requested.
    pub fn schedule(&self) {
        schedule(&self.shared);
    }

    /// Event handler that schedules a run.
    pub fn trigger(&self) -> EventHandler {
        let weak: Weak<DebounceShared> = Rc::downgrade(&self.shared);
        Rc::new(move |_: &EngineEvent| {
            if let Some(shared) = weak.upgrade() {
                schedule(&shared);
            }
        })
    }

    pub fn is_pending(&self) -> bool {
        self.shared.pending.get().is_some()
    }

    /// Drop a requested run.
    pub fn cancel(&self) {
        if let Some(frame) = self.shared.pending.take() {
            self.shared.scheduler.cancel_frame(frame);
        }
    }
}

fn schedule(shared: &Rc<DebounceShared>) {
    if shared.pending.get().is_some() {
        return;
    }
    let weak = Rc::downgrade(shared);
    let frame = shared.scheduler.request_frame(Box::new(move || {
        let Some(shared) = weak.upgrade() else { return };
        shared.pending.set(None);
        (shared.task)();
    }));
    shared.pending.set(Some(frame));
}

impl fmt::Debug for FrameDebounce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDebounce")
            .field("pending", &self.is_pending())
            .finish()
    }
}

// =============================================================================
// Overlay Sync
// =============================================================================

struct OverlayInner {
    context: GraphContext,
    target: CellId,
    position: Signal<Option<OverlayBox>>,
    debounce: FrameDebounce,
    /// Lifecycle listeners, for the overlay's whole life.
    tracking: Disposer,
    /// Engine subscriptions of the current target incarnation.
    attached: RefCell<Option<Disposer>>,
    recomputes: Cell<u64>,
}

/// Tracks the viewport box of one engine object.
pub struct OverlaySync {
    inner: Rc<OverlayInner>,
}

impl OverlaySync {
    /// Start tracking `target` in `context`'s graph.
    pub fn track(context: &GraphContext, target: impl Into<CellId>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<OverlayInner>| {
            let weak = weak.clone();
            let debounce = FrameDebounce::new(context.scheduler().clone(), move || {
                if let Some(inner) = weak.upgrade() {
                    inner.recompute();
                }
            });
            OverlayInner {
                context: context.clone(),
                target: target.into(),
                position: signal(None),
                debounce,
                tracking: Disposer::new(),
                attached: RefCell::new(None),
                recomputes: Cell::new(0),
            }
        });

        let weak = Rc::downgrade(&inner);
        let destroyed = context.on_cell_destroyed(
            move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.detach();
                }
            },
            Some(inner.target.clone()),
        );
        inner.tracking.push(destroyed);

        // Registered last: fires right away if the target is already live.
        let weak = Rc::downgrade(&inner);
        let ready = context.on_cell_ready(
            move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.attach();
                }
            },
            Some(inner.target.clone()),
        );
        inner.tracking.push(ready);

        Self { inner }
    }

    pub fn target(&self) -> &CellId {
        &self.inner.target
    }

    /// The position store.
    pub fn position(&self) -> Signal<Option<OverlayBox>> {
        self.inner.position.clone()
    }

    pub fn current(&self) -> Option<OverlayBox> {
        self.inner.position.get()
    }

    /// Number of recomputations so far.
    pub fn recompute_count(&self) -> u64 {
        self.inner.recomputes.get()
    }

    /// Run `view` now and whenever the position changes. `None` means the
    /// overlay must render nothing. Returns the cleanup that stops it.
    pub fn render(&self, view: impl Fn(Option<OverlayBox>) + 'static) -> Cleanup {
        let position = self.inner.position.clone();
        let stop = effect(move || view(position.get()));
        Box::new(stop)
    }

    /// Stop tracking. Idempotent.
    pub fn dispose(&self) {
        self.inner.tracking.release();
        self.inner.detach();
    }
}

impl OverlayInner {
    fn attach(self: &Rc<Self>) {
        let Some(engine) = self.context.engine() else { return };
        let previous = self.attached.borrow_mut().take();
        if let Some(previous) = previous {
            previous.release();
        }

        let subscriptions = Disposer::new();
        let trigger = self.debounce.trigger();
        match engine.subscribe_cell(&self.target, ANY_CHANGE_EVENT, trigger.clone()) {
            Ok(subscription) => {
                let engine = engine.clone();
                subscriptions.push_fn(move || engine.unsubscribe(subscription));
            }
            Err(err) => {
                tracing::warn!(
                    cell = %self.target,
                    error = %err,
                    "overlay target not subscribable"
                );
            }
        }
        for event in CAMERA_EVENTS {
            let subscription = engine.subscribe(event, trigger.clone());
            let engine = engine.clone();
            subscriptions.push_fn(move || engine.unsubscribe(subscription));
        }
        *self.attached.borrow_mut() = Some(subscriptions);

        // First placement does not wait for a frame.
        self.debounce.cancel();
        self.recompute();
    }

    fn detach(&self) {
        self.debounce.cancel();
        let attached = self.attached.borrow_mut().take();
        if let Some(attached) = attached {
            attached.release();
        }
        self.position.set(None);
    }

    fn recompute(&self) {
        self.recomputes.set(self.recomputes.get() + 1);
        let placed = self.context.engine().and_then(|engine| {
            let visible = engine.is_visible(&self.target)?;
            let local = engine.bounding_box_of(std::slice::from_ref(&self.target))?;
            Some(OverlayBox::from_rect(engine.local_to_viewport(local), visible))
        });
        tracing::trace!(cell = %self.target, placed = placed.is_some(), "overlay recomputed");
        self.position.set(placed);
    }
}

impl fmt::Debug for OverlaySync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlaySync")
            .field("target", &self.inner.target)
            .field("position", &self.inner.position.get())
            .field("recomputes", &self.inner.recomputes.get())
            .finish()
    }
}
