//! Disposers.
//!
//! Every subscription, timer and pending registration hands back a
//! [`Cleanup`]. Components collect them in a [`Disposer`] and release the
//! whole bag on unmount. Releasing is idempotent.

use std::cell::RefCell;
use std::fmt;

/// Cleanup function returned by registrations.
///
/// Call it to undo the registration.
pub type Cleanup = Box<dyn FnOnce()>;

/// A cleanup that does nothing.
pub fn noop() -> Cleanup {
    Box::new(|| {})
}

/// A bag of cleanups released together, most recent first.
///
/// Pushing after the bag was released runs the cleanup immediately, so a late
/// registration from a deferred callback can never leak.
#[derive(Default)]
pub struct Disposer {
    cleanups: RefCell<Vec<Cleanup>>,
    released: std::cell::Cell<bool>,
}

impl Disposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, cleanup: Cleanup) {
        if self.released.get() {
            cleanup();
            return;
        }
        self.cleanups.borrow_mut().push(cleanup);
    }

    pub fn push_fn(&self, cleanup: impl FnOnce() + 'static) {
        self.push(Box::new(cleanup));
    }

    pub fn len(&self) -> usize {
        self.cleanups.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Run all cleanups. A second call is a no-op.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        // Cleanups may push more cleanups (which run immediately now), so the
        // list is taken out before any of them runs.
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("pending", &self.len())
            .field("released", &self.released.get())
            .finish()
    }
}
