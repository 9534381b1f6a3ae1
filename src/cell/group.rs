//! Grouping - parent cells and their embedded children.
//!
//! A binding that can contain other cells provides a [`CellContext`] to the
//! bindings mounted inside it. Children register once their own engine
//! object exists; if the parent's object does not exist yet, they are queued
//! and embedded as soon as it does.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dispose::Cleanup;
use crate::engine::{EngineHandle, Mutation};
use crate::error::{BindingError, Result};
use crate::types::{CellId, MutationOptions};

struct GroupInner {
    can_parent: bool,
    owner: RefCell<Option<CellId>>,
    engine: RefCell<Option<EngineHandle>>,
    ready: Cell<bool>,
    queued: RefCell<Vec<CellId>>,
    children: RefCell<Vec<CellId>>,
}

/// Parent side of cell embedding. Cheap to clone.
#[derive(Clone)]
pub struct CellContext {
    inner: Rc<GroupInner>,
}

impl CellContext {
    pub fn new(can_parent: bool, owner: Option<CellId>) -> Self {
        Self {
            inner: Rc::new(GroupInner {
                can_parent,
                owner: RefCell::new(owner),
                engine: RefCell::new(None),
                ready: Cell::new(false),
                queued: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Id of the parent cell, once known.
    pub fn owner(&self) -> Option<CellId> {
        self.inner.owner.borrow().clone()
    }

    pub fn can_have_children(&self) -> bool {
        self.inner.can_parent
    }

    /// Embedded children.
    pub fn children(&self) -> Vec<CellId> {
        self.inner.children.borrow().clone()
    }

    /// Children waiting for the parent to exist.
    pub fn queued(&self) -> Vec<CellId> {
        self.inner.queued.borrow().clone()
    }

    /// Embed `child`. Returns the cleanup that detaches it again.
    pub fn add_child(&self, child: &CellId) -> Result<Cleanup> {
        if !self.inner.can_parent {
            let owner = self.owner().unwrap_or_else(|| CellId::new("(unnamed)"));
            return Err(BindingError::NotAGroup(owner));
        }

        if self.inner.ready.get() {
            self.embed(child)?;
        } else {
            self.inner.queued.borrow_mut().push(child.clone());
        }

        let weak: Weak<GroupInner> = Rc::downgrade(&self.inner);
        let child = child.clone();
        Ok(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                detach(&inner, &child);
            }
        }))
    }

    /// The parent's engine object exists: embed every queued child.
    pub(crate) fn parent_ready(&self, id: &CellId, engine: &EngineHandle) -> Result<()> {
        *self.inner.owner.borrow_mut() = Some(id.clone());
        *self.inner.engine.borrow_mut() = Some(engine.clone());
        self.inner.ready.set(true);

        let queued = std::mem::take(&mut *self.inner.queued.borrow_mut());
        let mut pending = queued.into_iter();
        while let Some(child) = pending.next() {
            if let Err(err) = self.embed(&child) {
                // Not embedded yet: keep waiting.
                let mut queue = self.inner.queued.borrow_mut();
                queue.push(child);
                queue.extend(pending);
                return Err(err);
            }
        }
        Ok(())
    }

    /// The parent's engine object is gone. Children stay registered and are
    /// embedded again if the parent comes back.
    pub(crate) fn parent_gone(&self) {
        self.inner.ready.set(false);
        self.inner.engine.borrow_mut().take();
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        self.inner.queued.borrow_mut().extend(children);
    }

    fn embed(&self, child: &CellId) -> Result<()> {
        let (engine, owner) = match (self.inner.engine.borrow().clone(), self.owner()) {
            (Some(engine), Some(owner)) => (engine, owner),
            _ => return Err(BindingError::EngineNotReady),
        };
        engine.mutate(&owner, Mutation::AddChild(child.clone()), MutationOptions::component())?;
        self.inner.children.borrow_mut().push(child.clone());
        Ok(())
    }
}

fn detach(inner: &GroupInner, child: &CellId) {
    inner.queued.borrow_mut().retain(|c| c != child);
    let embedded = {
        let mut children = inner.children.borrow_mut();
        let before = children.len();
        children.retain(|c| c != child);
        children.len() != before
    };
    if !embedded {
        return;
    }
    let engine = inner.engine.borrow().clone();
    let owner = inner.owner.borrow().clone();
    if let (Some(engine), Some(owner)) = (engine, owner)
        && engine.contains(&owner)
        && engine.contains(child)
        && let Err(err) = engine.mutate(
            &owner,
            Mutation::RemoveChild(child.clone()),
            MutationOptions::component(),
        )
    {
        tracing::warn!(parent = %owner, cell = %child, error = %err, "detaching child failed");
    }
}

impl fmt::Debug for CellContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellContext")
            .field("owner", &self.inner.owner.borrow())
            .field("ready", &self.inner.ready.get())
            .field("children", &self.inner.children.borrow().len())
            .field("queued", &self.inner.queued.borrow().len())
            .finish()
    }
}
