//! Subscriber bookkeeping shared by every reactive source.
//!
//! Cells and derived values both embed a [`SourceCore`]: an identity plus an
//! ordered subscriber list. Notification is synchronous and walks the list in
//! subscription order.
//!
//! A panic in a subscriber callback is fail-fast: the source clears its whole
//! subscriber set (the survivors' state can no longer be trusted mid-walk)
//! and the panic resumes into the writer.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Counter for generating unique source IDs.
static SOURCE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Counter for generating unique subscriber IDs.
static SUBSCRIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifies one subscription edge. Fresh per subscriber, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub fn new() -> Self {
        Self(SUBSCRIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked when a source's value changes.
pub(crate) type NotifyFn = Arc<dyn Fn() + Send + Sync>;

/// The capability a dependent needs from a dependency: identity plus
/// subscription management. Implemented by cells and derived values.
pub(crate) trait Track: Send + Sync {
    fn source_id(&self) -> u64;
    fn subscribe(&self, subscriber_id: SubscriberId, notify: NotifyFn);
    fn unsubscribe(&self, subscriber_id: SubscriberId);
    fn clear_subscribers(&self);
}

/// Identity and subscriber list for one reactive source.
pub(crate) struct SourceCore {
    id: u64,
    /// Subscribers in subscription order.
    subscribers: RwLock<Vec<(SubscriberId, NotifyFn)>>,
}

impl SourceCore {
    pub fn new() -> Self {
        Self {
            id: SOURCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .expect("subscriber lock poisoned")
            .len()
    }

    /// Add or replace the subscription for `subscriber_id`.
    pub fn subscribe(&self, subscriber_id: SubscriberId, notify: NotifyFn) {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        subscribers.retain(|(id, _)| *id != subscriber_id);
        subscribers.push((subscriber_id, notify));
    }

    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .retain(|(id, _)| *id != subscriber_id);
    }

    pub fn clear(&self) {
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .clear();
    }

    /// Notify every subscriber in subscription order.
    ///
    /// The list is snapshotted first: callbacks routinely resubscribe while
    /// the walk is in progress. If a callback panics, the remaining
    /// subscribers are not notified, the entire subscriber set is cleared,
    /// and the panic resumes into the caller.
    pub fn notify(&self) {
        let snapshot: Vec<(SubscriberId, NotifyFn)> = self
            .subscribers
            .read()
            .expect("subscriber lock poisoned")
            .clone();

        for (_, notify) in &snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| notify())) {
                self.clear();
                panic::resume_unwind(payload);
            }
        }
    }
}
