//! Keyed list differ.
//!
//! [`keyed`] renders a reactive list of items into a region of the tree,
//! preserving per-key node identity across reorders. Each key gets its own
//! child scope and an index cell; when the list changes, surviving keys keep
//! their node and scope, get their index cell updated in place, and are moved
//! rather than rebuilt.
//!
//! Reordering is deliberately not edit-distance minimal: the differ walks the
//! desired order from the back and reinserts any node whose successor is
//! wrong. Nodes already in position are left untouched, which covers the
//! common append/prepend/remove cases cheaply.

use std::hash::Hash;
use std::mem;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::warn;

use crate::reactive::{untracked, Cell, Reaction, Scope};

use super::node::Node;

struct KeyedEntry {
    scope: Scope,
    node: Node,
    index: Cell<usize>,
}

/// Render a keyed list into `parent`, bounded by `marker`.
///
/// `source` produces the item list and is tracked; the differ re-runs when it
/// changes. `key_fn` extracts a stable key per item. `map_fn` renders one
/// item, receiving the item's own scope (disposed when the key disappears)
/// and an index cell that updates in place on reorder; it runs untracked, so
/// reads inside it bind to their own positions instead of re-running the
/// whole list.
///
/// Returns the driving reaction; stopping it freezes the region.
pub fn keyed<T, K, S, KF, MF>(
    owner: &Scope,
    parent: &Node,
    marker: Option<&Node>,
    source: S,
    key_fn: KF,
    map_fn: MF,
) -> Reaction
where
    T: 'static,
    K: Eq + Hash + Clone + Send + Sync + 'static,
    S: Fn() -> Vec<T> + Send + Sync + 'static,
    KF: Fn(&T) -> K + Send + Sync + 'static,
    MF: Fn(&Scope, &T, Cell<usize>) -> Node + Send + Sync + 'static,
{
    let entries: Arc<Mutex<IndexMap<K, KeyedEntry>>> = Arc::new(Mutex::new(IndexMap::new()));

    let parent = parent.clone();
    let marker = marker.cloned();
    // Weak: the owner scope owns the reaction, not the other way around.
    let owner_weak = owner.downgrade();
    let entries_handle = Arc::clone(&entries);

    Reaction::new(owner, move |_| {
        let Some(owner_inner) = owner_weak.upgrade() else {
            return;
        };
        let owner_scope = Scope::from_inner(owner_inner);

        // Reading the source here is what subscribes the differ.
        let items = source();

        let mut guard = entries_handle.lock().expect("keyed entries lock poisoned");
        let mut old = mem::take(&mut *guard);
        let mut next: IndexMap<K, KeyedEntry> = IndexMap::with_capacity(items.len());

        for item in &items {
            let key = key_fn(item);
            if next.contains_key(&key) {
                warn!("duplicate key in keyed list; item skipped");
                continue;
            }

            let entry = match old.shift_remove(&key) {
                Some(existing) => existing,
                None => untracked(|| {
                    let scope = owner_scope.child();
                    let index = Cell::new(&scope, next.len());
                    let node = map_fn(&scope, item, index.clone());
                    KeyedEntry { scope, node, index }
                }),
            };
            next.insert(key, entry);
        }

        // Keys absent from the new list leave the tree and die with their
        // scope.
        for (_, entry) in old.drain(..) {
            parent.remove_child(&entry.node);
            entry.scope.dispose();
        }

        // Surviving entries learn their new position in place.
        for (position, (_, entry)) in next.iter().enumerate() {
            entry.index.set(position);
        }

        // Walk the desired order from the back. A node whose successor is
        // already correct stays put; everything else (including fresh nodes,
        // which have no parent yet) is inserted before its successor, or
        // before the region marker at the tail.
        let mut anchor = marker.clone();
        for (_, entry) in next.iter().rev() {
            let attached = entry
                .node
                .parent()
                .map_or(false, |p| p.same(&parent));
            let in_place = attached
                && match (entry.node.next_sibling(), &anchor) {
                    (Some(sibling), Some(expected)) => sibling.same(expected),
                    (None, None) => true,
                    _ => false,
                };
            if !in_place {
                parent.insert_before(&entry.node, anchor.as_ref());
            }
            anchor = Some(entry.node.clone());
        }

        *guard = next;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{insert, Slot, Value};

    fn render_item(_scope: &Scope, item: &i64, _index: Cell<usize>) -> Node {
        let li = Node::element("li");
        insert(&li, Value::from(item.to_string()), None, Slot::Empty);
        li
    }

    fn texts(parent: &Node) -> Vec<String> {
        parent
            .children()
            .iter()
            .filter(|c| c.is_element())
            .map(|c| c.first_child().map(|t| t.data()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn initial_render_is_in_order() {
        let scope = Scope::root();
        let list = Cell::new(&scope, vec![1i64, 2, 3]);
        let parent = Node::element("ul");

        let list2 = list.clone();
        let _reaction = keyed(
            &scope,
            &parent,
            None,
            move || list2.get(),
            |item| *item,
            render_item,
        );

        assert_eq!(texts(&parent), vec!["1", "2", "3"]);
    }

    #[test]
    fn reorder_preserves_node_identity() {
        let scope = Scope::root();
        let list = Cell::new(&scope, vec![1i64, 2, 3]);
        let parent = Node::element("ul");

        let list2 = list.clone();
        let _reaction = keyed(
            &scope,
            &parent,
            None,
            move || list2.get(),
            |item| *item,
            render_item,
        );

        let before = parent.children();

        list.set(vec![3, 1, 2]);
        assert_eq!(texts(&parent), vec!["3", "1", "2"]);

        let after = parent.children();
        assert!(after[0].same(&before[2]));
        assert!(after[1].same(&before[0]));
        assert!(after[2].same(&before[1]));
    }

    #[test]
    fn new_nodes_land_before_the_marker() {
        let scope = Scope::root();
        let list = Cell::new(&scope, vec![1i64]);
        let parent = Node::element("ul");
        let marker = Node::marker("list end");
        parent.append(&marker);

        let list2 = list.clone();
        let _reaction = keyed(
            &scope,
            &parent,
            Some(&marker),
            move || list2.get(),
            |item| *item,
            render_item,
        );

        list.set(vec![1, 2]);

        let children = parent.children();
        assert_eq!(children.len(), 3);
        assert!(children[2].same(&marker));
        assert_eq!(texts(&parent), vec!["1", "2"]);
    }

    #[test]
    fn removed_keys_dispose_their_scope() {
        let scope = Scope::root();
        let list = Cell::new(&scope, vec![1i64, 2]);
        let parent = Node::element("ul");
        let dropped = Arc::new(Mutex::new(Vec::new()));

        let (list2, dropped2) = (list.clone(), Arc::clone(&dropped));
        let _reaction = keyed(
            &scope,
            &parent,
            None,
            move || list2.get(),
            |item| *item,
            move |item_scope, item, _index| {
                let key = *item;
                let dropped3 = Arc::clone(&dropped2);
                item_scope.on_cleanup(move || dropped3.lock().unwrap().push(key));
                Node::element("li")
            },
        );

        list.set(vec![2]);
        assert_eq!(*dropped.lock().unwrap(), vec![1]);
        assert_eq!(parent.child_count(), 1);
    }

    #[test]
    fn index_cells_update_in_place() {
        let scope = Scope::root();
        let list = Cell::new(&scope, vec!["a".to_owned(), "b".to_owned()]);
        let parent = Node::element("ul");
        let indexes: Arc<Mutex<Vec<(String, Cell<usize>)>>> = Arc::new(Mutex::new(Vec::new()));

        let (list2, indexes2) = (list.clone(), Arc::clone(&indexes));
        let _reaction = keyed(
            &scope,
            &parent,
            None,
            move || list2.get(),
            |item| item.clone(),
            move |_, item, index| {
                indexes2.lock().unwrap().push((item.clone(), index));
                Node::element("li")
            },
        );

        list.set(vec!["b".to_owned(), "a".to_owned()]);

        let guard = indexes.lock().unwrap();
        // map_fn ran exactly once per key; the cells were mutated instead.
        assert_eq!(guard.len(), 2);
        let a = guard.iter().find(|(k, _)| k == "a").unwrap();
        let b = guard.iter().find(|(k, _)| k == "b").unwrap();
        assert_eq!(a.1.get_untracked(), 1);
        assert_eq!(b.1.get_untracked(), 0);
    }

    #[test]
    fn duplicate_keys_keep_the_first_item() {
        let scope = Scope::root();
        let list = Cell::new(&scope, vec![1i64, 1, 2]);
        let parent = Node::element("ul");

        let list2 = list.clone();
        let _reaction = keyed(
            &scope,
            &parent,
            None,
            move || list2.get(),
            |item| *item,
            render_item,
        );

        assert_eq!(texts(&parent), vec!["1", "2"]);
    }
}
