//! Hydration matcher.
//!
//! Hydration walks an externally supplied tree (typically parsed from
//! server-rendered markup) in lock-step with the tree the client would
//! build, claiming existing nodes by shape match instead of creating new
//! ones. Matching is structural: position and tag name only, with no
//! injected identifiers in the source tree.
//!
//! A failed claim is never an error. The claim functions return `None`, bump
//! a mismatch counter, and the caller falls back to creating a fresh node;
//! the subtree simply loses reuse, not correctness.
//!
//! The matcher state is process-global with lifecycle
//! `start -> (nested enter/leave during traversal) -> end`; only one
//! hydration pass is active at a time.

use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::debug;

use super::node::Node;

#[derive(Default)]
struct HydrationState {
    enabled: bool,
    /// The tree being hydrated; cleared when the pass ends.
    source_root: Option<Node>,
    cursor: Option<Node>,
    /// Saved cursors for enclosing levels, innermost last.
    context_stack: Vec<Option<Node>>,
    mismatches: usize,
}

static HYDRATION: OnceLock<RwLock<HydrationState>> = OnceLock::new();

fn state() -> &'static RwLock<HydrationState> {
    HYDRATION.get_or_init(|| RwLock::new(HydrationState::default()))
}

/// Begin a hydration pass over `root`'s children.
///
/// Resets the mismatch counter from any previous pass.
pub fn start(root: &Node) {
    let mut guard = state().write();
    guard.enabled = true;
    guard.source_root = Some(root.clone());
    guard.cursor = root.first_child();
    guard.context_stack.clear();
    guard.mismatches = 0;
    debug!(root = ?root, "hydration started");
}

/// End the hydration pass. The mismatch counter survives until the next
/// [`start`] so callers can inspect the outcome.
pub fn end() {
    let mut guard = state().write();
    guard.enabled = false;
    guard.source_root = None;
    guard.cursor = None;
    guard.context_stack.clear();
    debug!(mismatches = guard.mismatches, "hydration ended");
}

/// Check whether a hydration pass is active.
pub fn is_active() -> bool {
    state().read().enabled
}

/// Structural mismatches observed since the last [`start`].
pub fn mismatch_count() -> usize {
    state().read().mismatches
}

/// The tree the active pass is claiming from; `None` when no pass is active.
/// After a mismatched pass a caller can re-render fresh content under it.
pub fn source_root() -> Option<Node> {
    state().read().source_root.clone()
}

/// Claim the next element sibling at the cursor if its tag matches.
///
/// Non-element siblings at the cursor are skipped. On a match the cursor
/// advances past the claimed node; on a mismatch the cursor is left in place,
/// the mismatch counter is bumped, and the caller creates a fresh node.
pub fn claim_element(tag: &str) -> Option<Node> {
    let mut guard = state().write();
    if !guard.enabled {
        return None;
    }

    let tag = tag.to_ascii_lowercase();

    let mut candidate = guard.cursor.clone();
    while let Some(node) = &candidate {
        if node.is_element() {
            break;
        }
        candidate = node.next_sibling();
    }

    match candidate {
        Some(node) if node.tag().as_deref() == Some(tag.as_str()) => {
            guard.cursor = node.next_sibling();
            debug!(tag = %tag, "hydration claimed element");
            Some(node)
        }
        _ => {
            guard.mismatches += 1;
            debug!(tag = %tag, "hydration mismatch; falling back to fresh node");
            None
        }
    }
}

/// Claim a text node at the cursor, writing `initial` into it if its content
/// differs. Returns `None` (and counts a mismatch) if the cursor does not
/// sit on a text node.
pub fn claim_text(initial: &str) -> Option<Node> {
    let mut guard = state().write();
    if !guard.enabled {
        return None;
    }

    match guard.cursor.clone() {
        Some(node) if node.is_text() => {
            guard.cursor = node.next_sibling();
            if node.data() != initial {
                node.set_data(initial);
            }
            Some(node)
        }
        _ => {
            guard.mismatches += 1;
            debug!("hydration text mismatch; falling back to fresh node");
            None
        }
    }
}

/// Descend into a claimed element: push the current cursor and continue
/// matching against the element's children.
pub fn enter_children(claimed: &Node) {
    let mut guard = state().write();
    if !guard.enabled {
        return;
    }
    let saved = guard.cursor.take();
    guard.context_stack.push(saved);
    guard.cursor = claimed.first_child();
}

/// Leave the current element's children, restoring the saved cursor.
pub fn leave_children() {
    let mut guard = state().write();
    if !guard.enabled {
        return;
    }
    guard.cursor = guard.context_stack.pop().unwrap_or(None);
}

/// Create-or-claim convenience: reuse a structurally matching element from
/// the hydration source when a pass is active, otherwise create a fresh one.
pub fn element(tag: &str) -> Node {
    claim_element(tag).unwrap_or_else(|| Node::element(tag))
}

/// Serializes tests that touch the global hydration state.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
