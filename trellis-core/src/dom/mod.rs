//! Tree rendering.
//!
//! This module maps reactive state onto a retained node tree:
//!
//! - [`node`]: the host tree itself (elements, text, markers, fragments),
//!   with pointer identity and explicit parent/child structure.
//! - [`value`]: the reconciler's input vocabulary, including the
//!   type-tagged [`Accessor`] that marks a position as reactive.
//! - [`reconcile`]: [`insert`] places values into the tree and keeps them
//!   current, persisting text nodes across updates.
//! - [`keyed`]: list rendering with per-key node identity.
//! - [`hydrate`]: structural claiming of a pre-rendered tree.
//! - [`state`]: the serialized state registry that carries values from a
//!   server render into the client pass.

pub mod hydrate;
mod keyed;
mod node;
mod reconcile;
pub mod state;
mod value;

pub use keyed::keyed;
pub use node::{Node, NodeKind};
pub use reconcile::{bind_attribute, clear_slot, insert, Slot};
pub use value::{Accessor, Value};
