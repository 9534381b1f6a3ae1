//! Provider scope - which graph (and which parent cell) a binding belongs to.
//!
//! Bindings do not take their graph as an argument: like nested component
//! creation, they pick up the innermost provider on the current thread.
//! Mounting a binding outside any graph scope is a usage error and fails
//! immediately with [`BindingError::MissingGraphProvider`].

use std::cell::RefCell;

use super::context::GraphContext;
use crate::cell::CellContext;
use crate::error::{BindingError, Result};

thread_local! {
    /// Stack of graph providers for nested mounting.
    static GRAPH_STACK: RefCell<Vec<GraphContext>> = const { RefCell::new(Vec::new()) };

    /// Stack of parent cells for nested (embedded) cells.
    static PARENT_STACK: RefCell<Vec<CellContext>> = const { RefCell::new(Vec::new()) };
}

// =============================================================================
// Graph Scope
// =============================================================================

pub fn push_graph_context(context: GraphContext) {
    GRAPH_STACK.with(|stack| stack.borrow_mut().push(context));
}

pub fn pop_graph_context() {
    GRAPH_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// Innermost graph provider.
pub fn current_graph() -> Result<GraphContext> {
    GRAPH_STACK
        .with(|stack| stack.borrow().last().cloned())
        .ok_or(BindingError::MissingGraphProvider)
}

/// Run `f` with `context` as the current graph provider.
pub fn provide_graph<R>(context: &GraphContext, f: impl FnOnce() -> R) -> R {
    push_graph_context(context.clone());
    let _guard = PopGuard(pop_graph_context);
    f()
}

// =============================================================================
// Parent Scope
// =============================================================================

pub fn push_parent_context(parent: CellContext) {
    PARENT_STACK.with(|stack| stack.borrow_mut().push(parent));
}

pub fn pop_parent_context() {
    PARENT_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// Innermost parent cell, if any.
pub fn current_parent() -> Option<CellContext> {
    PARENT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Run `f` with `parent` as the current parent cell.
pub fn provide_parent<R>(parent: &CellContext, f: impl FnOnce() -> R) -> R {
    push_parent_context(parent.clone());
    let _guard = PopGuard(pop_parent_context);
    f()
}

/// Pops on drop, so a panicking `f` does not leave a stale provider behind.
struct PopGuard(fn());

impl Drop for PopGuard {
    fn drop(&mut self) {
        (self.0)();
    }
}
