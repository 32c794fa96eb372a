//! Write batching.
//!
//! `batch` defers subscriber notification until the batch body returns,
//! coalescing multiple writes to the same cell into a single notification
//! pass. The values themselves are stored immediately; only *delivery* is
//! deferred, so reads inside the batch always observe the latest write.
//!
//! Nested batches only bump a depth counter; the single flush happens when
//! the outermost batch exits. There is exactly one batching semantics in this
//! crate: true deferral.

use std::cell::RefCell;

use indexmap::IndexMap;

use super::source::NotifyFn;

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState {
        depth: 0,
        pending: IndexMap::new(),
    });
}

struct BatchState {
    depth: usize,
    /// Pending notification passes keyed by source ID, in first-write order.
    /// The map is what coalesces repeated writes to one delivery per cell.
    pending: IndexMap<u64, NotifyFn>,
}

/// Check whether a batch is currently active on this thread.
pub(crate) fn active() -> bool {
    BATCH.with(|batch| batch.borrow().depth > 0)
}

/// Queue a notification pass for the given source.
///
/// Repeated calls for the same source within one batch are collapsed; the
/// pass delivered at flush time reads the cell's final value.
pub(crate) fn defer(source_id: u64, notify: NotifyFn) {
    BATCH.with(|batch| {
        batch
            .borrow_mut()
            .pending
            .entry(source_id)
            .or_insert(notify);
    });
}

/// Execute `f` with notification delivery deferred until it returns.
///
/// Writes inside `f` update values immediately but queue their notification
/// passes; the queue is flushed once, in first-write order, when the
/// outermost batch exits. If `f` panics, queued deliveries are discarded.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    BATCH.with(|batch| batch.borrow_mut().depth += 1);
    let _guard = BatchGuard;
    f()
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let pending = BATCH.with(|batch| {
            let mut state = batch.borrow_mut();
            state.depth -= 1;
            if state.depth == 0 {
                Some(std::mem::take(&mut state.pending))
            } else {
                None
            }
        });

        let Some(pending) = pending else { return };
        if std::thread::panicking() {
            return;
        }

        // Delivery happens outside the thread-local borrow; a subscriber that
        // writes again at this point notifies synchronously (depth is zero).
        for (_, notify) in pending {
            notify();
        }
    }
}
