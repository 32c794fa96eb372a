//! Reactive primitives.
//!
//! This module implements the core reactive system: cells, derived values,
//! reactions, and the scope tree that owns them.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Cell`] is a container for mutable state. When a cell's value is read
//! within a tracked computation (a derived value or reaction), the cell is
//! recorded as a dependency. When the cell's value changes, all dependents
//! are notified synchronously.
//!
//! ## Derived values
//!
//! A [`Derived`] is a read-only value recomputed from other sources. It
//! re-subscribes to exactly the set of sources it read during its last run,
//! and only notifies its own subscribers when the computed result actually
//! changes.
//!
//! ## Reactions
//!
//! A [`Reaction`] is a side-effecting computation that re-runs whenever its
//! dependencies change. Reactions are what keep the node tree (or any other
//! external system) synchronized with reactive state.
//!
//! ## Scopes
//!
//! A [`Scope`] is a hierarchical disposal context. Every cell, derived value,
//! reaction, and cleanup is owned by exactly one scope; disposing the scope
//! tears all of it down, children first.
//!
//! # Implementation Notes
//!
//! Dependency detection uses a thread-local tracking frame: while a
//! computation runs, every source it reads records itself in the frame, and
//! the computation subscribes to that exact set afterwards. This approach
//! ("automatic dependency tracking") is the one used by SolidJS, Vue 3, and
//! Leptos. Ownership, by contrast, is never ambient: constructors take the
//! owning scope as an explicit parameter.

mod batch;
mod cell;
mod context;
mod derived;
mod reaction;
mod scope;
mod source;

pub use batch::batch;
pub use cell::Cell;
pub use context::untracked;
pub use derived::Derived;
pub use reaction::{Reaction, MAX_REACTION_ITERATIONS};
pub use scope::{CleanupFn, Scope};
pub use source::SubscriberId;

pub(crate) use source::{NotifyFn, Track};
