//! Engine object handle.

use std::any::Any;
use std::fmt;

use crate::dispose::Cleanup;
use crate::engine::{EngineHandle, Mutation};
use crate::types::{CellId, MutationOptions};

/// Props last applied to an object, tagged with the kind that applied them.
pub(crate) struct Applied {
    pub(crate) kind: String,
    pub(crate) props: Box<dyn Any>,
}

/// An engine object owned by exactly one binding (or parked in the recycle
/// cache). Pairs the object's id with the disposer that removes it.
pub struct CellHandle {
    id: CellId,
    engine: EngineHandle,
    disposer: Option<Cleanup>,
    /// Last props applied to the object, for diffing after reuse.
    pub(crate) applied: Option<Applied>,
    /// Visibility before the handle was parked.
    pub(crate) parked_visible: Option<bool>,
}

impl CellHandle {
    pub fn new(id: CellId, engine: EngineHandle, disposer: Cleanup) -> Self {
        Self {
            id,
            engine,
            disposer: Some(disposer),
            applied: None,
            parked_visible: None,
        }
    }

    /// Handle whose disposer removes the object from the engine.
    pub fn removing(id: CellId, engine: EngineHandle) -> Self {
        let remove_engine = engine.clone();
        let remove_id = id.clone();
        Self::new(
            id,
            engine,
            Box::new(move || {
                let removed = remove_engine.remove_cell(&remove_id, MutationOptions::component());
                if let Err(err) = removed {
                    tracing::warn!(cell = %remove_id, error = %err, "cell removal failed");
                }
            }),
        )
    }

    pub fn id(&self) -> &CellId {
        &self.id
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Name of the cell kind that last applied props to the object.
    pub fn kind(&self) -> Option<&str> {
        self.applied.as_ref().map(|applied| applied.kind.as_str())
    }

    /// True while the engine still has the object.
    pub fn is_alive(&self) -> bool {
        self.engine.contains(&self.id)
    }

    /// Hide the object while it waits in the recycle cache.
    pub(crate) fn park(&mut self) {
        self.parked_visible = self.engine.is_visible(&self.id);
        if self.parked_visible == Some(true)
            && let Err(err) =
                self.engine
                    .mutate(&self.id, Mutation::Visible(false), MutationOptions::component())
        {
            tracing::warn!(cell = %self.id, error = %err, "hiding recycled cell failed");
        }
    }

    /// Restore the visibility it had before [`park`](Self::park).
    pub(crate) fn unpark(&mut self) {
        if self.parked_visible.take() == Some(true)
            && let Err(err) =
                self.engine
                    .mutate(&self.id, Mutation::Visible(true), MutationOptions::component())
        {
            tracing::warn!(cell = %self.id, error = %err, "showing reused cell failed");
        }
    }

    /// Destroy the engine object. Consumes the handle.
    pub fn dispose(mut self) {
        tracing::debug!(cell = %self.id, "cell disposed");
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl fmt::Debug for CellHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellHandle")
            .field("id", &self.id)
            .field("parked", &self.parked_visible.is_some())
            .finish()
    }
}
