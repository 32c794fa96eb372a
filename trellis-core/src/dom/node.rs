//! Host tree nodes.
//!
//! The reconciler and hydration matcher are written purely in terms of the
//! capability set in this file: create element/text/comment nodes, insert
//! before an anchor, remove, replace, and get/set attributes. Nothing else in
//! the crate touches node internals.
//!
//! Invariants:
//! - Element tag names are canonical ASCII-lowercase.
//! - Child ordering is explicit and deterministic; a node has at most one
//!   parent at a time (inserting an attached node moves it).
//! - Node identity is pointer identity ([`Node::same`]); there are no
//!   injected identifier attributes.
//! - Reactive subscriptions established for a node's content are registered
//!   against that node and torn down when [`Node::remove_child`] detaches it,
//!   recursively. A plain move via [`Node::insert_before`] keeps them alive.

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::reactive::{SubscriberId, Track};

/// The kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a tag name, attributes, and children.
    Element,
    /// A text node carrying character data.
    Text,
    /// A comment node; used as a stable sentinel marker for dynamic regions.
    Comment,
    /// An unparented sequence of children, unwrapped on insertion.
    Fragment,
}

/// A stop-handle for a reactive subscription owned by a node.
pub(crate) struct Binding {
    source: Arc<dyn Track>,
    subscriber_id: SubscriberId,
}

impl Binding {
    pub fn new(source: Arc<dyn Track>, subscriber_id: SubscriberId) -> Self {
        Self {
            source,
            subscriber_id,
        }
    }

    fn dispose(&self) {
        self.source.unsubscribe(self.subscriber_id);
    }
}

/// A handle to a tree node. Cloning the handle does not clone the node;
/// identity is shared and compared with [`Node::same`].
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    kind: NodeKind,
    /// Canonical lowercase tag name; elements only.
    tag: Option<String>,
    /// Character data; text and comment nodes only.
    data: RwLock<String>,
    /// Attributes in insertion order; elements only.
    attributes: RwLock<IndexMap<String, String>>,
    children: RwLock<Vec<Node>>,
    parent: RwLock<Weak<NodeInner>>,
    /// Reactive subscriptions owned by this node.
    bindings: RwLock<Vec<Binding>>,
}

impl NodeInner {
    fn new(kind: NodeKind, tag: Option<String>, data: String) -> Self {
        Self {
            kind,
            tag,
            data: RwLock::new(data),
            attributes: RwLock::new(IndexMap::new()),
            children: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
            bindings: RwLock::new(Vec::new()),
        }
    }
}

impl Node {
    /// Create an element node. The tag is canonicalized to ASCII lowercase.
    pub fn element(tag: &str) -> Self {
        Self {
            inner: Arc::new(NodeInner::new(
                NodeKind::Element,
                Some(tag.to_ascii_lowercase()),
                String::new(),
            )),
        }
    }

    /// Create a text node.
    pub fn text(data: &str) -> Self {
        Self {
            inner: Arc::new(NodeInner::new(NodeKind::Text, None, data.to_owned())),
        }
    }

    /// Create a comment node, used as a sentinel marker bounding a dynamic
    /// region.
    pub fn marker(data: &str) -> Self {
        Self {
            inner: Arc::new(NodeInner::new(NodeKind::Comment, None, data.to_owned())),
        }
    }

    /// Create a fragment wrapping an ordered child sequence.
    pub fn fragment(children: Vec<Node>) -> Self {
        let fragment = Self {
            inner: Arc::new(NodeInner::new(NodeKind::Fragment, None, String::new())),
        };
        for child in &children {
            fragment.append(child);
        }
        fragment
    }

    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    pub fn is_element(&self) -> bool {
        self.inner.kind == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.inner.kind == NodeKind::Text
    }

    pub fn is_comment(&self) -> bool {
        self.inner.kind == NodeKind::Comment
    }

    pub fn is_fragment(&self) -> bool {
        self.inner.kind == NodeKind::Fragment
    }

    /// Canonical lowercase tag name; `None` for non-elements.
    pub fn tag(&self) -> Option<String> {
        self.inner.tag.clone()
    }

    /// Pointer identity.
    pub fn same(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Character data of a text or comment node.
    pub fn data(&self) -> String {
        self.inner.data.read().clone()
    }

    /// Mutate the character data in place. The node object is unchanged;
    /// this is what keeps high-frequency text updates free of node churn.
    pub fn set_data(&self, data: &str) {
        debug_assert!(
            self.is_text() || self.is_comment(),
            "set_data on a non-character node"
        );
        *self.inner.data.write() = data.to_owned();
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    /// Set an attribute, preserving first-set order.
    pub fn set_attribute(&self, name: &str, value: &str) {
        debug_assert!(self.is_element(), "set_attribute on a non-element");
        self.inner
            .attributes
            .write()
            .insert(name.to_ascii_lowercase(), value.to_owned());
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner
            .attributes
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn remove_attribute(&self, name: &str) {
        self.inner
            .attributes
            .write()
            .shift_remove(&name.to_ascii_lowercase());
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .parent
            .read()
            .upgrade()
            .map(|inner| Node { inner })
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.read().len()
    }

    /// Snapshot of the child list.
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.read().clone()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.inner.children.read().first().cloned()
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let children = parent.inner.children.read();
        let index = children.iter().position(|c| c.same(self))?;
        children.get(index + 1).cloned()
    }

    pub fn contains_child(&self, node: &Node) -> bool {
        self.inner.children.read().iter().any(|c| c.same(node))
    }

    /// Insert `child` immediately before `anchor`, or at the end when the
    /// anchor is `None` or not attached to this node. An attached child is
    /// moved, keeping its reactive bindings alive.
    pub fn insert_before(&self, child: &Node, anchor: Option<&Node>) {
        // Detach first: taking the old parent's child lock while holding our
        // own would deadlock on a same-parent move.
        child.detach();

        let mut children = self.inner.children.write();
        let index = anchor.and_then(|a| children.iter().position(|c| c.same(a)));
        match index {
            Some(i) => children.insert(i, child.clone()),
            None => children.push(child.clone()),
        }
        drop(children);

        *child.inner.parent.write() = Arc::downgrade(&self.inner);
    }

    /// Append `child` as the last child.
    pub fn append(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Remove `child` from this node's children and tear down every reactive
    /// binding registered in the removed subtree. Returns false if `child`
    /// was not a child of this node.
    pub fn remove_child(&self, child: &Node) -> bool {
        let removed = {
            let mut children = self.inner.children.write();
            let before = children.len();
            children.retain(|c| !c.same(child));
            children.len() != before
        };

        if removed {
            *child.inner.parent.write() = Weak::new();
            child.teardown_bindings();
        }
        removed
    }

    /// Replace `old` with `new` at the same position. `old` leaves the tree
    /// and its bindings are torn down. Returns false if `old` was not found.
    pub fn replace_child(&self, new: &Node, old: &Node) -> bool {
        new.detach();

        let replaced = {
            let mut children = self.inner.children.write();
            match children.iter().position(|c| c.same(old)) {
                Some(i) => {
                    children[i] = new.clone();
                    true
                }
                None => false,
            }
        };

        if replaced {
            *old.inner.parent.write() = Weak::new();
            old.teardown_bindings();
            *new.inner.parent.write() = Arc::downgrade(&self.inner);
        }
        replaced
    }

    /// Remove this node from its parent without touching bindings.
    fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.inner.children.write().retain(|c| !c.same(self));
        }
        *self.inner.parent.write() = Weak::new();
    }

    // ------------------------------------------------------------------
    // Reactive binding ownership
    // ------------------------------------------------------------------

    /// Register a subscription stop-handle against this node.
    pub(crate) fn register_binding(&self, binding: Binding) {
        self.inner.bindings.write().push(binding);
    }

    pub(crate) fn binding_count(&self) -> usize {
        self.inner.bindings.read().len()
    }

    /// Drop the binding for `subscriber_id`, unsubscribing it. Used when a
    /// reconciled region is cleared while its host node stays in the tree.
    pub(crate) fn remove_binding(&self, subscriber_id: SubscriberId) {
        let binding = {
            let mut guard = self.inner.bindings.write();
            let position = guard.iter().position(|b| b.subscriber_id == subscriber_id);
            position.map(|i| guard.remove(i))
        };
        if let Some(binding) = binding {
            binding.dispose();
        }
    }

    fn teardown_bindings(&self) {
        let bindings: Vec<Binding> = {
            let mut guard = self.inner.bindings.write();
            guard.drain(..).collect()
        };
        for binding in &bindings {
            binding.dispose();
        }

        for child in self.children() {
            child.teardown_bindings();
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("kind", &self.kind());
        if let Some(tag) = self.tag() {
            s.field("tag", &tag);
        }
        if self.is_text() || self.is_comment() {
            s.field("data", &self.data());
        }
        s.field("children", &self.child_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_tags_are_canonical_lowercase() {
        let node = Node::element("DIV");
        assert_eq!(node.tag().as_deref(), Some("div"));
    }

    #[test]
    fn insert_before_and_sibling_order() {
        let parent = Node::element("ul");
        let a = Node::element("li");
        let b = Node::element("li");
        let c = Node::element("li");

        parent.append(&a);
        parent.append(&c);
        parent.insert_before(&b, Some(&c));

        let children = parent.children();
        assert!(children[0].same(&a));
        assert!(children[1].same(&b));
        assert!(children[2].same(&c));

        assert!(a.next_sibling().unwrap().same(&b));
        assert!(c.next_sibling().is_none());
        assert!(parent.first_child().unwrap().same(&a));
    }

    #[test]
    fn insert_with_detached_anchor_appends() {
        let parent = Node::element("div");
        let stray = Node::element("span");
        let child = Node::text("x");

        parent.insert_before(&child, Some(&stray));
        assert!(parent.first_child().unwrap().same(&child));
    }

    #[test]
    fn inserting_an_attached_node_moves_it() {
        let left = Node::element("div");
        let right = Node::element("div");
        let child = Node::element("span");

        left.append(&child);
        right.append(&child);

        assert_eq!(left.child_count(), 0);
        assert_eq!(right.child_count(), 1);
        assert!(child.parent().unwrap().same(&right));
    }

    #[test]
    fn move_within_same_parent_reorders() {
        let parent = Node::element("div");
        let a = Node::text("a");
        let b = Node::text("b");

        parent.append(&a);
        parent.append(&b);
        parent.insert_before(&b, Some(&a));

        let children = parent.children();
        assert!(children[0].same(&b));
        assert!(children[1].same(&a));
        assert_eq!(parent.child_count(), 2);
    }

    #[test]
    fn remove_child_clears_parent() {
        let parent = Node::element("div");
        let child = Node::element("span");

        parent.append(&child);
        assert!(parent.remove_child(&child));
        assert_eq!(parent.child_count(), 0);
        assert!(child.parent().is_none());

        // Removing again reports false.
        assert!(!parent.remove_child(&child));
    }

    #[test]
    fn replace_child_swaps_in_place() {
        let parent = Node::element("div");
        let old = Node::element("span");
        let tail = Node::text("t");
        let new = Node::element("b");

        parent.append(&old);
        parent.append(&tail);

        assert!(parent.replace_child(&new, &old));
        let children = parent.children();
        assert!(children[0].same(&new));
        assert!(children[1].same(&tail));
        assert!(old.parent().is_none());
    }

    #[test]
    fn attributes_preserve_first_set_order() {
        let el = Node::element("input");
        el.set_attribute("TYPE", "text");
        el.set_attribute("name", "q");
        el.set_attribute("type", "search"); // overwrite keeps position

        assert_eq!(el.attribute("type").as_deref(), Some("search"));
        assert_eq!(el.attribute("name").as_deref(), Some("q"));

        el.remove_attribute("type");
        assert!(el.attribute("type").is_none());
    }

    #[test]
    fn text_mutation_keeps_identity() {
        let text = Node::text("before");
        let alias = text.clone();

        text.set_data("after");
        assert_eq!(alias.data(), "after");
        assert!(text.same(&alias));
    }
}
