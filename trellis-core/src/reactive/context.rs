//! Dependency tracking context.
//!
//! The tracking context records which sources the currently running
//! computation reads. This enables automatic dependency tracking: when a cell
//! or derived value is read, it drops a handle to itself into the active
//! frame, and the computation subscribes to exactly that set when it finishes.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. When entering a tracked computation
//! (running a derived value or a reaction), we push a frame; when the
//! computation completes, we pop it and hand the collected source handles back
//! to the caller. The stack supports nesting (a derived value that reads
//! another derived value).
//!
//! Only *tracking* lives in thread-local state. *Ownership* of subscriptions
//! is always an explicit scope or tree-node parameter; there is no ambient
//! "current owner".

use std::cell::RefCell;
use std::sync::Arc;

use super::source::{SubscriberId, Track};

thread_local! {
    static FRAME_STACK: RefCell<Vec<FrameEntry>> = RefCell::new(Vec::new());
}

/// An entry in the tracking stack.
struct FrameEntry {
    /// The subscriber ID of the computation being tracked.
    subscriber_id: SubscriberId,
    /// Source handles read during this computation, in read order,
    /// deduplicated by source ID.
    sources: Vec<Arc<dyn Track>>,
    /// Whether a recorded source was written after being read. The
    /// computation is not subscribed yet mid-run, so notification alone
    /// cannot reach it; this flag is how the write survives the run.
    wrote: bool,
}

/// Guard for an active tracking frame.
///
/// Popping happens either through [`TrackingFrame::finish`] (the normal path,
/// which yields the collected sources) or through `Drop` (the panic path), so
/// the stack stays balanced even if the computation panics.
pub(crate) struct TrackingFrame {
    subscriber_id: SubscriberId,
}

impl TrackingFrame {
    /// Push a new frame for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        FRAME_STACK.with(|stack| {
            stack.borrow_mut().push(FrameEntry {
                subscriber_id,
                sources: Vec::new(),
                wrote: false,
            });
        });

        Self { subscriber_id }
    }

    /// Check if there is an active tracking frame.
    pub fn is_active() -> bool {
        FRAME_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Record a source read in the innermost frame.
    ///
    /// Called by sources when they are read. Repeated reads of the same
    /// source within one frame collapse to a single entry.
    pub fn record(source: Arc<dyn Track>) {
        FRAME_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                let id = source.source_id();
                if !entry.sources.iter().any(|s| s.source_id() == id) {
                    entry.sources.push(source);
                }
            }
        });
    }

    /// Mark every frame that has already recorded `source_id` as having seen
    /// a write to it.
    ///
    /// Sources call this when written. A computation that reads a source and
    /// then writes it within the same run holds a stale value, but is not
    /// subscribed until the run finishes; the flag carries the fact across.
    pub fn note_write(source_id: u64) {
        FRAME_STACK.with(|stack| {
            for entry in stack.borrow_mut().iter_mut() {
                if entry.sources.iter().any(|s| s.source_id() == source_id) {
                    entry.wrote = true;
                }
            }
        });
    }

    /// Pop the frame and return the sources it collected.
    pub fn finish(self) -> Vec<Arc<dyn Track>> {
        self.finish_with_writes().0
    }

    /// Like [`TrackingFrame::finish`], also reporting whether any recorded
    /// source was written during the run.
    pub fn finish_with_writes(self) -> (Vec<Arc<dyn Track>>, bool) {
        let (sources, wrote) = FRAME_STACK.with(|stack| {
            let entry = stack
                .borrow_mut()
                .pop()
                .expect("tracking frame stack underflow");
            debug_assert_eq!(
                entry.subscriber_id, self.subscriber_id,
                "tracking frame mismatch on finish"
            );
            (entry.sources, entry.wrote)
        });

        // The frame is already popped; skip the Drop path.
        std::mem::forget(self);
        (sources, wrote)
    }
}

/// Run `f` without recording dependencies in any enclosing frame.
///
/// Reads inside `f` land in a throwaway frame that is popped and discarded,
/// so the enclosing computation never subscribes to them.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _frame = TrackingFrame::enter(SubscriberId::new());
    f()
}

impl Drop for TrackingFrame {
    fn drop(&mut self) {
        FRAME_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "tracking frame mismatch on drop"
                );
            }
        });
    }
}
