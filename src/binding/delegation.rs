//! Event Delegation Registry.
//!
//! Maps event name → (cell id → handler), backed by one graph-scope engine
//! subscription per event name. The dispatcher reads `event.target` and
//! calls the matching handler, so dispatch stays O(1) however many cells are
//! bound.
//!
//! The engine subscription for an event name lives exactly as long as at
//! least one cell delegates that event: removing the last entry unsubscribes,
//! and the next delegation subscribes again.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dispose::Cleanup;
use crate::engine::{EngineEvent, EngineHandle, EventHandler, SubscriptionId};
use crate::types::CellId;

struct Route {
    subscription: SubscriptionId,
    /// Handler per cell, with the token of the delegation that installed it.
    targets: HashMap<CellId, (u64, EventHandler)>,
}

#[derive(Default)]
struct Routes {
    by_event: HashMap<String, Route>,
    next_token: u64,
}

/// Per-object dispatch for graph-scope events.
pub struct DelegationRegistry {
    engine: EngineHandle,
    routes: Rc<RefCell<Routes>>,
}

impl DelegationRegistry {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            routes: Rc::new(RefCell::new(Routes::default())),
        }
    }

    /// Route `event` fired for `cell` to `handler`. Returns its cleanup.
    ///
    /// Delegating the same `(event, cell)` again replaces the handler; the
    /// replaced delegation's cleanup then does nothing.
    pub fn delegate(&self, event: &str, handler: EventHandler, cell: &CellId) -> Cleanup {
        let needs_subscription = !self.routes.borrow().by_event.contains_key(event);
        if needs_subscription {
            let subscription = self
                .engine
                .subscribe(event, dispatcher(Rc::downgrade(&self.routes), event.to_string()));
            tracing::trace!(event, "delegation subscribed");
            self.routes.borrow_mut().by_event.insert(
                event.to_string(),
                Route {
                    subscription,
                    targets: HashMap::new(),
                },
            );
        }

        let token = {
            let mut routes = self.routes.borrow_mut();
            let token = routes.next_token;
            routes.next_token += 1;
            if let Some(route) = routes.by_event.get_mut(event) {
                route.targets.insert(cell.clone(), (token, handler));
            }
            token
        };

        let weak = Rc::downgrade(&self.routes);
        let engine = self.engine.clone();
        let event = event.to_string();
        let cell = cell.clone();
        Box::new(move || {
            let Some(routes) = weak.upgrade() else { return };
            let emptied = {
                let mut routes = routes.borrow_mut();
                let Some(route) = routes.by_event.get_mut(&event) else { return };
                match route.targets.get(&cell) {
                    Some((current, _)) if *current == token => {
                        route.targets.remove(&cell);
                    }
                    _ => return,
                }
                if route.targets.is_empty() {
                    routes.by_event.remove(&event).map(|route| route.subscription)
                } else {
                    None
                }
            };
            if let Some(subscription) = emptied {
                engine.unsubscribe(subscription);
                tracing::trace!(event = %event, "delegation unsubscribed");
            }
        })
    }

    /// Number of live engine subscriptions held by this registry.
    pub fn subscription_count(&self) -> usize {
        self.routes.borrow().by_event.len()
    }

    /// Number of cells delegating `event`.
    pub fn delegate_count(&self, event: &str) -> usize {
        self.routes
            .borrow()
            .by_event
            .get(event)
            .map_or(0, |route| route.targets.len())
    }

    /// Drop every route and its engine subscription.
    pub fn clear(&self) {
        let subscriptions: Vec<SubscriptionId> = self
            .routes
            .borrow_mut()
            .by_event
            .drain()
            .map(|(_, route)| route.subscription)
            .collect();
        for subscription in subscriptions {
            self.engine.unsubscribe(subscription);
        }
    }
}

fn dispatcher(routes: Weak<RefCell<Routes>>, event_name: String) -> EventHandler {
    Rc::new(move |event: &EngineEvent| {
        let Some(routes) = routes.upgrade() else { return };
        let Some(target) = event.target.as_ref() else { return };
        // Unknown targets are expected: the engine may still report on a cell
        // whose binding was torn down in the same tick.
        let handler = routes
            .borrow()
            .by_event
            .get(&event_name)
            .and_then(|route| route.targets.get(target))
            .map(|(_, handler)| handler.clone());
        if let Some(handler) = handler {
            tracing::trace!(event = %event_name, cell = %target, "delegated dispatch");
            handler(event);
        }
    })
}

impl fmt::Debug for DelegationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let routes = self.routes.borrow();
        let mut events: Vec<_> = routes
            .by_event
            .iter()
            .map(|(name, route)| (name.clone(), route.targets.len()))
            .collect();
        events.sort();
        f.debug_struct("DelegationRegistry").field("events", &events).finish()
    }
}
