//! Tree reconciler.
//!
//! [`insert`] maps a [`Value`] onto a position in the node tree, bounded by
//! an optional sentinel marker, and returns the [`Slot`] now occupying that
//! position. Callers thread the returned slot back into the next call; the
//! reconciler mutates in place wherever the slot shape allows it.
//!
//! The one guarantee callers rely on hardest: a text position keeps its
//! text node. Re-rendering a string updates the persisted node's character
//! data and never replaces the node itself.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::reactive::{NotifyFn, SubscriberId, Track};

use super::hydrate;
use super::node::{Binding, Node};
use super::value::{Accessor, Value};

/// What currently occupies a reconciled position.
pub enum Slot {
    /// Nothing rendered.
    Empty,
    /// A single inserted node.
    Node(Node),
    /// A persisted text node, mutated in place on re-render.
    Text(Node),
    /// One slot per list element, in order.
    Many(Vec<Slot>),
    /// A self-updating position driven by an accessor.
    Live(LiveSlot),
}

/// The shared state behind a dynamic position. The subscription re-renders
/// into `state` whenever the source changes; clearing the slot unsubscribes.
pub struct LiveSlot {
    state: Arc<RwLock<Slot>>,
    source: Arc<dyn Track>,
    subscriber_id: SubscriberId,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Empty => f.write_str("Empty"),
            Slot::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Slot::Text(node) => f.debug_tuple("Text").field(node).finish(),
            Slot::Many(slots) => f.debug_tuple("Many").field(&slots.len()).finish(),
            Slot::Live(_) => f.write_str("Live"),
        }
    }
}

/// Render `value` at the position in `parent` bounded by `marker`, replacing
/// whatever `current` describes. Returns the slot now occupying the position.
///
/// Nodes are placed immediately before `marker`; if the marker is absent or
/// no longer a child of `parent`, placement falls back to appending.
pub fn insert(parent: &Node, value: Value, marker: Option<&Node>, current: Slot) -> Slot {
    match value {
        Value::Empty => {
            clear_slot(parent, current);
            Slot::Empty
        }
        Value::Text(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
            let text = value.coerce_text();
            insert_text(parent, &text, marker, current)
        }
        Value::Node(node) => insert_node(parent, node, marker, current),
        Value::List(items) => insert_list(parent, items, marker, current),
        Value::Dyn(accessor) => insert_dynamic(parent, accessor, marker, current),
    }
}

/// Remove everything `slot` placed under `parent` and drop its
/// subscriptions.
pub fn clear_slot(parent: &Node, slot: Slot) {
    match slot {
        Slot::Empty => {}
        Slot::Node(node) | Slot::Text(node) => {
            parent.remove_child(&node);
        }
        Slot::Many(slots) => {
            for slot in slots {
                clear_slot(parent, slot);
            }
        }
        Slot::Live(live) => {
            live.source.unsubscribe(live.subscriber_id);
            // The parent stays in the tree; its binding entry must go too,
            // or repeated re-renders pile up stale handles.
            parent.remove_binding(live.subscriber_id);
            let inner = mem::replace(&mut *live.state.write(), Slot::Empty);
            clear_slot(parent, inner);
        }
    }
}

/// Place `node` before `marker`, or append when the marker is absent or no
/// longer attached to `parent`.
fn place(parent: &Node, node: &Node, marker: Option<&Node>) {
    match marker {
        Some(anchor) if parent.contains_child(anchor) => {
            parent.insert_before(node, Some(anchor));
        }
        Some(_) => {
            trace!("marker not attached to parent; appending instead");
            parent.append(node);
        }
        None => parent.append(node),
    }
}

fn insert_text(parent: &Node, text: &str, marker: Option<&Node>, current: Slot) -> Slot {
    // The position already holds a text node: mutate its data, keep the
    // node object.
    if let Slot::Text(node) = current {
        if node.data() != text {
            node.set_data(text);
        }
        return Slot::Text(node);
    }
    clear_slot(parent, current);

    if let Some(claimed) = hydrate::claim_text(text) {
        return Slot::Text(claimed);
    }

    let node = Node::text(text);
    place(parent, &node, marker);
    Slot::Text(node)
}

fn insert_node(parent: &Node, node: Node, marker: Option<&Node>, current: Slot) -> Slot {
    // Fragments are unwrapped: their children land in the parent directly
    // and the fragment object itself never enters the tree.
    if node.is_fragment() {
        clear_slot(parent, current);
        let children = node.children();
        let mut slots = Vec::with_capacity(children.len());
        for child in children {
            place(parent, &child, marker);
            slots.push(Slot::Node(child));
        }
        return Slot::Many(slots);
    }

    if let Slot::Node(existing) = &current {
        if existing.same(&node) {
            return current;
        }
    }
    clear_slot(parent, current);
    place(parent, &node, marker);
    Slot::Node(node)
}

fn insert_list(parent: &Node, items: Vec<Value>, marker: Option<&Node>, current: Slot) -> Slot {
    let mut existing = match current {
        Slot::Many(slots) => slots,
        other => {
            clear_slot(parent, other);
            Vec::new()
        }
    };

    // Trailing slots with no corresponding element leave the tree.
    while existing.len() > items.len() {
        let slot = existing.pop().unwrap_or(Slot::Empty);
        clear_slot(parent, slot);
    }

    let mut prior = existing.into_iter();
    let mut slots = Vec::with_capacity(items.len());
    for item in items {
        let slot = prior.next().unwrap_or(Slot::Empty);
        // A list inside a list renders as text, never as nested children.
        let slot = match item {
            Value::List(_) => insert_text(parent, &item.coerce_text(), marker, slot),
            other => insert(parent, other, marker, slot),
        };
        slots.push(slot);
    }
    Slot::Many(slots)
}

fn insert_dynamic(parent: &Node, accessor: Accessor, marker: Option<&Node>, current: Slot) -> Slot {
    let state = Arc::new(RwLock::new(current));
    let source = Arc::clone(accessor.source());
    let subscriber_id = SubscriberId::new();

    let render = {
        let state = Arc::clone(&state);
        let parent = parent.clone();
        let marker = marker.cloned();
        move || {
            let value = accessor.read();
            let mut slot = state.write();
            let previous = mem::replace(&mut *slot, Slot::Empty);
            *slot = insert(&parent, value, marker.as_ref(), previous);
        }
    };
    render();

    let notify: NotifyFn = Arc::new(render);
    source.subscribe(subscriber_id, notify);
    // The parent owns the subscription; removing the parent's subtree tears
    // it down.
    parent.register_binding(Binding::new(Arc::clone(&source), subscriber_id));

    Slot::Live(LiveSlot {
        state,
        source,
        subscriber_id,
    })
}

/// Bind an element attribute to an accessor. The attribute is written
/// immediately and rewritten whenever the source changes.
///
/// A panic while computing the attribute text is fail-soft: it is logged and
/// the attribute is written as the empty string, so one bad binding cannot
/// take down an unrelated write.
pub fn bind_attribute(node: &Node, name: &str, accessor: &Accessor) {
    let name = name.to_ascii_lowercase();

    let update = {
        let node = node.clone();
        let accessor = accessor.clone();
        move || {
            match panic::catch_unwind(AssertUnwindSafe(|| accessor.read().coerce_text())) {
                Ok(text) => node.set_attribute(&name, &text),
                Err(_) => {
                    warn!(attribute = %name, "attribute update panicked; writing empty value");
                    node.set_attribute(&name, "");
                }
            }
        }
    };
    update();

    let subscriber_id = SubscriberId::new();
    let source = Arc::clone(accessor.source());
    source.subscribe(subscriber_id, Arc::new(update));
    node.register_binding(Binding::new(source, subscriber_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Cell, Scope};

    #[test]
    fn static_text_creates_one_text_child() {
        let parent = Node::element("div");
        let slot = insert(&parent, Value::from("hello"), None, Slot::Empty);

        assert_eq!(parent.child_count(), 1);
        let child = parent.first_child().unwrap();
        assert!(child.is_text());
        assert_eq!(child.data(), "hello");
        assert!(matches!(slot, Slot::Text(_)));
    }

    #[test]
    fn re_rendered_text_mutates_the_same_node() {
        let parent = Node::element("div");
        let slot = insert(&parent, Value::from("one"), None, Slot::Empty);
        let first = parent.first_child().unwrap();

        let slot = insert(&parent, Value::from(2i64), None, slot);
        let second = parent.first_child().unwrap();

        assert!(first.same(&second));
        assert_eq!(second.data(), "2");
        assert_eq!(parent.child_count(), 1);
        assert!(matches!(slot, Slot::Text(_)));
    }

    #[test]
    fn empty_clears_the_position() {
        let parent = Node::element("div");
        let slot = insert(&parent, Value::from("gone"), None, Slot::Empty);
        let slot = insert(&parent, Value::Empty, None, slot);

        assert_eq!(parent.child_count(), 0);
        assert!(matches!(slot, Slot::Empty));
    }

    #[test]
    fn nodes_land_before_the_marker() {
        let parent = Node::element("div");
        let marker = Node::marker("anchor");
        parent.append(&marker);

        let child = Node::element("span");
        insert(&parent, Value::from(child.clone()), Some(&marker), Slot::Empty);

        let children = parent.children();
        assert!(children[0].same(&child));
        assert!(children[1].same(&marker));
    }

    #[test]
    fn detached_marker_falls_back_to_append() {
        let parent = Node::element("div");
        let tail = Node::text("tail");
        parent.append(&tail);
        let stray = Node::marker("never attached");

        let child = Node::element("span");
        insert(&parent, Value::from(child.clone()), Some(&stray), Slot::Empty);

        let children = parent.children();
        assert!(children[0].same(&tail));
        assert!(children[1].same(&child));
    }

    #[test]
    fn fragments_unwrap_into_the_parent() {
        let parent = Node::element("div");
        let a = Node::element("a");
        let b = Node::text("mid");
        let fragment = Node::fragment(vec![a.clone(), b.clone()]);

        let slot = insert(&parent, Value::from(fragment.clone()), None, Slot::Empty);

        assert_eq!(parent.child_count(), 2);
        assert!(parent.children()[0].same(&a));
        assert!(parent.children()[1].same(&b));
        assert!(!parent.contains_child(&fragment));
        assert!(matches!(slot, Slot::Many(ref slots) if slots.len() == 2));
    }

    #[test]
    fn reinserting_the_same_node_is_a_no_op() {
        let parent = Node::element("div");
        let child = Node::element("span");

        let slot = insert(&parent, Value::from(child.clone()), None, Slot::Empty);
        let slot = insert(&parent, Value::from(child.clone()), None, slot);

        assert_eq!(parent.child_count(), 1);
        assert!(matches!(slot, Slot::Node(ref n) if n.same(&child)));
    }

    #[test]
    fn lists_reconcile_element_wise() {
        let parent = Node::element("ul");
        let slot = insert(&parent, Value::from(vec!["a", "b", "c"]), None, Slot::Empty);
        assert_eq!(parent.child_count(), 3);
        let first = parent.children()[0].clone();

        // Shrinks, and the surviving text nodes persist.
        let slot = insert(&parent, Value::from(vec!["x", "y"]), None, slot);
        assert_eq!(parent.child_count(), 2);
        assert!(parent.children()[0].same(&first));
        assert_eq!(first.data(), "x");
        assert!(matches!(slot, Slot::Many(ref slots) if slots.len() == 2));
    }

    #[test]
    fn nested_lists_stringify_rather_than_flatten() {
        let parent = Node::element("div");
        let inner = Value::from(vec![1i64, 2]);
        let slot = insert(&parent, Value::List(vec![inner]), None, Slot::Empty);

        assert_eq!(parent.child_count(), 1);
        let text = parent.first_child().unwrap();
        assert!(text.is_text());
        assert_eq!(text.data(), "1,2");

        // Re-rendering the nested list mutates the same text node.
        let inner = Value::from(vec![3i64, 4, 5]);
        insert(&parent, Value::List(vec![inner]), None, slot);
        assert_eq!(parent.child_count(), 1);
        assert!(parent.first_child().unwrap().same(&text));
        assert_eq!(text.data(), "3,4,5");
    }

    #[test]
    fn dynamic_text_tracks_its_cell() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, 1i64);
        let parent = Node::element("div");

        let slot = insert(&parent, Value::Dyn(cell.accessor()), None, Slot::Empty);
        let node = parent.first_child().unwrap();
        assert_eq!(node.data(), "1");
        assert!(matches!(slot, Slot::Live(_)));

        cell.set(7);
        // Same node, new data.
        assert!(parent.first_child().unwrap().same(&node));
        assert_eq!(node.data(), "7");
    }

    #[test]
    fn clearing_a_dynamic_slot_unsubscribes() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, 0i64);
        let parent = Node::element("div");

        let slot = insert(&parent, Value::Dyn(cell.accessor()), None, Slot::Empty);
        assert!(cell.subscriber_count() > 0);

        clear_slot(&parent, slot);
        assert_eq!(parent.child_count(), 0);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn cleared_dynamic_slots_leave_no_binding_behind() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, 0i64);
        let parent = Node::element("div");

        for _ in 0..100 {
            let slot = insert(&parent, Value::Dyn(cell.accessor()), None, Slot::Empty);
            clear_slot(&parent, slot);
        }

        assert_eq!(cell.subscriber_count(), 0);
        // The long-lived parent must not accumulate dead entries.
        assert_eq!(parent.binding_count(), 0);
    }

    #[test]
    fn removing_the_parent_subtree_tears_down_the_binding() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, 0i64);
        let root = Node::element("main");
        let parent = Node::element("div");
        root.append(&parent);

        insert(&parent, Value::Dyn(cell.accessor()), None, Slot::Empty);
        assert!(cell.subscriber_count() > 0);

        root.remove_child(&parent);
        assert_eq!(cell.subscriber_count(), 0);

        // A write after teardown renders nowhere and panics nowhere.
        cell.set(5);
    }

    #[test]
    fn bound_attribute_follows_the_cell() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, "on".to_owned());
        let el = Node::element("input");

        bind_attribute(&el, "DATA-STATE", &cell.accessor());
        assert_eq!(el.attribute("data-state").as_deref(), Some("on"));

        cell.set("off".to_owned());
        assert_eq!(el.attribute("data-state").as_deref(), Some("off"));
    }

    #[test]
    fn panicking_attribute_update_degrades_to_empty() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, 0i64);
        let el = Node::element("div");

        let accessor = Accessor::from_parts(
            cell.accessor().source().clone(),
            Arc::new(|| panic!("bad attribute")),
        );
        bind_attribute(&el, "title", &accessor);

        assert_eq!(el.attribute("title").as_deref(), Some(""));

        // Unrelated writes keep working afterwards.
        el.set_attribute("title", "manual");
        assert_eq!(el.attribute("title").as_deref(), Some("manual"));
    }

    #[test]
    fn hydration_claims_text_positions() {
        let _guard = hydrate::test_lock();
        let parent = Node::element("p");
        let server_text = Node::text("stale");
        parent.append(&server_text);

        hydrate::start(&parent);
        let slot = insert(&parent, Value::from("fresh"), None, Slot::Empty);
        hydrate::end();

        assert_eq!(parent.child_count(), 1);
        assert!(matches!(slot, Slot::Text(ref n) if n.same(&server_text)));
        assert_eq!(server_text.data(), "fresh");
    }
}
