//! # graph-binding
//!
//! Declarative binding layer for mutable diagram engines.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for the
//! reactive overlay store.
//!
//! ## Architecture
//!
//! A diagram engine owns mutable objects (nodes, edges, shapes) and mutates
//! them through imperative setters. This crate lets callers describe the
//! graph declaratively: each bound cell holds a descriptor, and every update
//! is diffed against the last applied one so only changed properties reach
//! the engine.
//!
//! ```text
//! GraphBinding ─ attach_engine ─→ ReadyNotifier ─→ CellBinding::create
//!      │                                              │
//!      └─ GraphContext (delegation, recycle, lifecycle) ←┘
//!                        │
//!                 OverlaySync ─→ Signal<Option<OverlayBox>>
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Core types (CellId, MutationOptions, PropMask, geometry)
//! - [`engine`] - The engine trait, mutation commands, in-memory engine
//! - [`binding`] - Ready notifier, event delegation, graph context and scope
//! - [`cell`] - Descriptors, cell kinds and the generic reconciler
//! - [`recycle`] - Short-lived cache of unmounted engine objects
//! - [`overlay`] - Viewport box tracking for overlays
//! - [`scheduler`] - Tick / frame / timer abstraction
//! - [`config`] - Binding configuration

pub mod binding;
pub mod cell;
pub mod config;
pub mod dispose;
pub mod engine;
pub mod error;
pub mod overlay;
pub mod recycle;
pub mod scheduler;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::{BindingError, EngineError, Result};

pub use dispose::{Cleanup, Disposer, noop};

pub use config::BindingConfig;

pub use scheduler::{FrameId, ManualScheduler, Scheduler, Task, TimerId};

pub use engine::{
    Engine, EngineEvent, EngineHandle, EventHandler, MemoryEngine, Mutation, SubscriptionId,
};

pub use binding::{
    CellEvent, CellListener, DelegationRegistry, EventRoute, EventStore, GraphBinding,
    GraphContext, ReadyListener, ReadyNotifier, current_graph, current_parent,
    normalize_event_name, provide_graph, provide_parent,
};

pub use cell::{
    CellBinding, CellContext, CellHandle, CellKind, CellProps, CellTerminal, EdgeBinding,
    EdgeDescriptor, EdgeKind, EdgeProps, Factory, NodeBinding, NodeDescriptor, NodeKind, NodeProps,
    ShapeBinding, ShapeKind, Terminal, default_factory,
};

pub use recycle::{KeepAlive, NeverRecycle, RecycleCache, RecyclePolicy};

pub use overlay::{FrameDebounce, OverlayBox, OverlaySync};
