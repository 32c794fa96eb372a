//! Reconciler input values.
//!
//! [`Value`] is everything the reconciler knows how to map onto a tree
//! position: primitives, nodes, lists, and reactive accessors. An
//! [`Accessor`] is an explicit tagged wrapper produced only by
//! [`Cell::accessor`] and [`Derived::accessor`]; reactivity is decided by
//! this type tag, never by inspecting a value's shape.

use std::sync::Arc;

use crate::reactive::{Cell, Derived, Track};

use super::node::Node;

/// A value the reconciler can place at a tree position.
#[derive(Debug, Clone)]
pub enum Value {
    /// Nothing; removes whatever occupied the position.
    Empty,
    /// A string, written into a persisted text node.
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// An existing node, inserted as-is (fragments are unwrapped).
    Node(Node),
    /// An ordered sequence reconciled element-wise at the same position.
    List(Vec<Value>),
    /// A reactive accessor; the position re-renders when it changes.
    Dyn(Accessor),
}

impl Value {
    /// Coerce to text.
    ///
    /// Lists nested inside a list render through this path: they are
    /// stringified with comma separators, not flattened into the tree.
    pub fn coerce_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Text(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Node(_) => String::new(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::coerce_text).collect();
                parts.join(",")
            }
            Value::Dyn(accessor) => accessor.read().coerce_text(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// A read handle over a reactive source, tagged as reactive by construction.
///
/// Only the cell and derived-value constructors can produce one, so the
/// reconciler never has to guess whether something is an accessor.
#[derive(Clone)]
pub struct Accessor {
    source: Arc<dyn Track>,
    read: Arc<dyn Fn() -> Value + Send + Sync>,
}

impl Accessor {
    pub(crate) fn from_parts(
        source: Arc<dyn Track>,
        read: Arc<dyn Fn() -> Value + Send + Sync>,
    ) -> Self {
        Self { source, read }
    }

    /// Read the current value. Does not record a tracking dependency; the
    /// reconciler subscribes explicitly through the source handle.
    pub fn read(&self) -> Value {
        (self.read)()
    }

    pub(crate) fn source(&self) -> &Arc<dyn Track> {
        &self.source
    }
}

impl std::fmt::Debug for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accessor")
            .field("source", &self.source.source_id())
            .finish()
    }
}

impl<T> Cell<T>
where
    T: Into<Value> + Clone + Send + Sync + PartialEq + 'static,
{
    /// Wrap this cell as a reconciler accessor.
    pub fn accessor(&self) -> Accessor {
        let this = self.clone();
        Accessor::from_parts(
            self.track_handle(),
            Arc::new(move || this.get_untracked().into()),
        )
    }
}

impl<T> Derived<T>
where
    T: Into<Value> + Clone + Send + Sync + PartialEq + 'static,
{
    /// Wrap this derived value as a reconciler accessor.
    pub fn accessor(&self) -> Accessor {
        let this = self.clone();
        Accessor::from_parts(
            self.track_handle(),
            Arc::new(move || this.get_untracked().into()),
        )
    }
}
