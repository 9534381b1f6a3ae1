//! Scheduler - the host's tick / animation-frame / timer source.
//!
//! The binding layer never runs anything in parallel. It only defers work:
//! - one tick (ready dispatch, so sibling registrations of the same commit
//!   are in place before anyone receives the engine)
//! - to the next animation frame (coalesced overlay geometry)
//! - after a delay (recycle grace period)
//!
//! Hosts implement [`Scheduler`] on top of their event loop. [`ManualScheduler`]
//! is a deterministic implementation driven explicitly, used by tests and by
//! hosts that already own a frame loop and just want to pump it.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = Rc::new(ManualScheduler::new());
//! let binding = GraphBinding::new(scheduler.clone(), BindingConfig::default());
//!
//! // In the host loop:
//! scheduler.run_ticks();
//! scheduler.run_frame();
//! scheduler.advance(Duration::from_millis(16));
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Deferred unit of work.
pub type Task = Box<dyn FnOnce()>;

/// Handle of a requested animation frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(u64);

/// Handle of a pending timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Host scheduling primitives.
pub trait Scheduler {
    /// Run `task` on the next scheduling tick (after the current commit).
    fn next_tick(&self, task: Task);

    /// Run `task` before the next frame is painted.
    fn request_frame(&self, task: Task) -> FrameId;

    /// Cancel a frame callback. Unknown or already-run ids are ignored.
    fn cancel_frame(&self, id: FrameId);

    /// Run `task` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a timeout. Unknown or already-fired ids are ignored.
    fn clear_timeout(&self, id: TimerId);

    /// Monotonic time since the scheduler started.
    fn now(&self) -> Duration;
}

// =============================================================================
// Manual Scheduler
// =============================================================================

struct Timer {
    id: TimerId,
    due: Duration,
    task: Task,
}

#[derive(Default)]
struct SchedulerState {
    ticks: VecDeque<Task>,
    frames: Vec<(FrameId, Task)>,
    timers: Vec<Timer>,
    now: Duration,
    next_id: u64,
    frames_run: u64,
}

impl SchedulerState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Deterministic scheduler pumped by its owner.
///
/// Tasks never run while the internal state is borrowed, so any task may
/// schedule more work.
#[derive(Default)]
pub struct ManualScheduler {
    state: RefCell<SchedulerState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued ticks until none are left, including ticks queued while
    /// running. Returns how many ran.
    pub fn run_ticks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.state.borrow_mut().ticks.pop_front();
            let Some(task) = task else { break };
            task();
            ran += 1;
        }
        ran
    }

    /// Run one animation frame: pending ticks first, then every frame callback
    /// requested before the frame started, then ticks queued by them.
    ///
    /// Callbacks requested during the frame wait for the next one.
    pub fn run_frame(&self) -> usize {
        self.run_ticks();
        let frames = {
            let mut state = self.state.borrow_mut();
            state.frames_run += 1;
            std::mem::take(&mut state.frames)
        };
        let ran = frames.len();
        for (_, task) in frames {
            task();
        }
        self.run_ticks();
        ran
    }

    /// Move the clock forward, firing due timers in deadline order.
    pub fn advance(&self, by: Duration) {
        let target = self.state.borrow().now + by;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.id.0))
                    .map(|(idx, _)| idx);
                match due {
                    Some(idx) => {
                        let timer = state.timers.remove(idx);
                        state.now = state.now.max(timer.due);
                        Some(timer.task)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            let Some(task) = next else { break };
            task();
            self.run_ticks();
        }
    }

    /// Run ticks and frames until neither is pending. Timers are left alone.
    pub fn flush(&self) {
        loop {
            self.run_ticks();
            if self.state.borrow().frames.is_empty() {
                break;
            }
            self.run_frame();
        }
    }

    pub fn pending_ticks(&self) -> usize {
        self.state.borrow().ticks.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Number of frames run so far.
    pub fn frames_run(&self) -> u64 {
        self.state.borrow().frames_run
    }
}

impl Scheduler for ManualScheduler {
    fn next_tick(&self, task: Task) {
        self.state.borrow_mut().ticks.push_back(task);
    }

    fn request_frame(&self, task: Task) -> FrameId {
        let mut state = self.state.borrow_mut();
        let id = FrameId(state.next_id());
        state.frames.push((id, task));
        id
    }

    fn cancel_frame(&self, id: FrameId) {
        self.state.borrow_mut().frames.retain(|(frame, _)| *frame != id);
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.borrow_mut();
        let id = TimerId(state.next_id());
        let due = state.now + delay;
        state.timers.push(Timer { id, due, task });
        id
    }

    fn clear_timeout(&self, id: TimerId) {
        self.state.borrow_mut().timers.retain(|timer| timer.id != id);
    }

    fn now(&self) -> Duration {
        self.state.borrow().now
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("ticks", &state.ticks.len())
            .field("frames", &state.frames.len())
            .field("timers", &state.timers.len())
            .finish()
    }
}
