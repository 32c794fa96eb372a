//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis fine-grained
//! reactive UI framework. It implements:
//!
//! - Reactive primitives (cells, derived values, reactions)
//! - Hierarchical scopes with ordered disposal
//! - A retained node tree with a value reconciler
//! - Keyed list rendering with stable node identity
//! - Hydration of pre-rendered trees and a serialized state registry
//!
//! # Architecture
//!
//! The crate is organized into two layers:
//!
//! - `reactive`: cells, derived values, reactions, batching, and the scope
//!   tree; dependency tracking is automatic, ownership is explicit
//! - `dom`: the node tree, the reconciler that maps values onto it, keyed
//!   lists, hydration, and serialized state
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::{Cell, Derived, Reaction, Scope};
//!
//! let scope = Scope::root();
//! let count = Cell::new(&scope, 0);
//!
//! let count2 = count.clone();
//! let doubled = Derived::new(&scope, move || count2.get() * 2);
//!
//! let doubled2 = doubled.clone();
//! Reaction::new(&scope, move |_| {
//!     println!("doubled: {}", doubled2.get());
//! });
//!
//! count.set(5); // the reaction runs, prints "doubled: 10"
//! ```

pub mod dom;
pub mod error;
pub mod reactive;

pub use error::{RuntimeError, StateError};
