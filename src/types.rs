//! Core types shared by every binding.
//!
//! - [`CellId`] - stable identity of an engine object
//! - [`Origin`] / [`MutationOptions`] - who caused a mutation (echo suppression)
//! - [`PropMask`] - which watched properties an update touched
//! - Geometry re-exported from `kurbo`

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use kurbo::{Affine, Point, Rect, Size};

// =============================================================================
// Cell Identity
// =============================================================================

/// Identity of an engine object (node, edge, shape).
///
/// Assigned at creation time, either by the descriptor or by the engine, and
/// stable for the object's whole lifetime. It is the dispatch key of the
/// delegation registry and the cache key of the recycle cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CellId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&CellId> for CellId {
    fn from(id: &CellId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for CellId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Mutation Options
// =============================================================================

/// Who issued a mutation.
///
/// The engine echoes the options of a mutation on the change events it emits,
/// so listeners can tell a binding's own setter call apart from a user edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Interaction or engine-internal change.
    #[default]
    User,
    /// Issued by a binding while applying a descriptor diff.
    Component,
}

/// Options passed with every engine mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MutationOptions {
    pub origin: Origin,
    /// Merge nested attribute objects instead of replacing them.
    pub deep: bool,
    /// Ask the engine not to emit change events at all.
    pub silent: bool,
}

impl MutationOptions {
    /// Options for a binding-issued mutation; its echo is ignored by bindings.
    pub fn component() -> Self {
        Self {
            origin: Origin::Component,
            ..Self::default()
        }
    }

    /// Options for a user-originated mutation.
    pub fn user() -> Self {
        Self::default()
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// True if a listener attached by a binding must ignore the resulting event.
    pub fn is_own_echo(&self) -> bool {
        self.origin == Origin::Component
    }
}

// =============================================================================
// Property Mask (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Watched descriptor properties.
    ///
    /// Returned by updates so callers can see exactly which setters ran.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropMask: u32 {
        const ATTRS = 1 << 0;
        const Z_INDEX = 1 << 1;
        const VISIBLE = 1 << 2;
        const DATA = 1 << 3;
        const TOOLS = 1 << 4;
        const SIZE = 1 << 5;
        const POSITION = 1 << 6;
        const ANGLE = 1 << 7;
        const SOURCE = 1 << 8;
        const TARGET = 1 << 9;
        const LABEL = 1 << 10;
        const ROUTER = 1 << 11;
        const CONNECTOR = 1 << 12;
        const VERTICES = 1 << 13;
        const LABELS = 1 << 14;
        /// Any shape-specific property.
        const CUSTOM = 1 << 15;

        const CELL = Self::ATTRS.bits()
            | Self::Z_INDEX.bits()
            | Self::VISIBLE.bits()
            | Self::DATA.bits()
            | Self::TOOLS.bits();
        const NODE = Self::SIZE.bits() | Self::POSITION.bits() | Self::ANGLE.bits();
        const EDGE = Self::SOURCE.bits()
            | Self::TARGET.bits()
            | Self::LABEL.bits()
            | Self::ROUTER.bits()
            | Self::CONNECTOR.bits()
            | Self::VERTICES.bits()
            | Self::LABELS.bits();
    }
}
