//! Cell implementation.
//!
//! A `Cell` is the fundamental reactive primitive: a mutable value plus an
//! ordered subscriber set. When a cell is read within a tracking frame (a
//! derived value or reaction run), the read is recorded so the computation
//! can subscribe to it. When the cell's value changes, all subscribers are
//! notified synchronously, in subscription order.
//!
//! # Write semantics
//!
//! - A write that compares equal to the current value performs no
//!   notification at all.
//! - Outside a batch, `set` drives its entire subscriber fan-out to
//!   completion before returning.
//! - Inside a batch, the value is stored immediately but delivery is deferred
//!   and coalesced to one pass per cell (see [`crate::reactive::batch`]).
//! - A subscriber that panics aborts the remaining fan-out, clears the
//!   subscriber set, and the panic surfaces to the caller of `set`.
//!
//! Every cell is owned by exactly one [`Scope`]; disposing the scope clears
//! the subscriber set, after which no notification is possible.

use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::batch;
use super::context::TrackingFrame;
use super::scope::{Owned, Scope};
use super::source::{NotifyFn, SourceCore, SubscriberId, Track};

/// A mutable reactive value.
///
/// Cloning a `Cell` produces another handle to the same underlying value;
/// this is how closures capture cells they read or write.
///
/// # Example
///
/// ```rust,ignore
/// let scope = Scope::root();
/// let count = Cell::new(&scope, 0);
///
/// let value = count.get();
/// count.set(5); // notifies subscribers
/// ```
pub struct Cell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<CellInner<T>>,
}

pub(crate) struct CellInner<T> {
    core: SourceCore,
    value: RwLock<T>,
}

impl<T> Track for CellInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn source_id(&self) -> u64 {
        self.core.id()
    }

    fn subscribe(&self, subscriber_id: SubscriberId, notify: NotifyFn) {
        self.core.subscribe(subscriber_id, notify);
    }

    fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.core.unsubscribe(subscriber_id);
    }

    fn clear_subscribers(&self) {
        self.core.clear();
    }
}

impl<T> Owned for CellInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn dispose_owned(&self) {
        self.core.clear();
    }
}

impl<T> Cell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new cell owned by `owner`.
    ///
    /// The owner is mandatory: when it is disposed, the cell's subscriber set
    /// is cleared and no further notifications are possible.
    pub fn new(owner: &Scope, value: T) -> Self {
        let inner = Arc::new(CellInner {
            core: SourceCore::new(),
            value: RwLock::new(value),
        });
        owner.adopt_owned(inner.clone());
        Self { inner }
    }

    /// Get the cell's unique source ID.
    pub fn id(&self) -> u64 {
        self.inner.core.id()
    }

    /// Get the current value.
    ///
    /// If called within a tracked computation, the cell is recorded as a
    /// dependency of that computation.
    pub fn get(&self) -> T {
        if TrackingFrame::is_active() {
            TrackingFrame::record(self.track_handle());
        }

        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// A value equal to the current one is ignored entirely: nothing is
    /// stored and nobody is notified.
    pub fn set(&self, value: T) {
        {
            let current = self.inner.value.read().expect("value lock poisoned");
            if *current == value {
                trace!(source = self.id(), "write ignored: value unchanged");
                return;
            }
        }

        {
            let mut guard = self.inner.value.write().expect("value lock poisoned");
            *guard = value;
        }

        // A tracked computation that already read this cell holds a stale
        // value but is not subscribed yet; flag it so it runs again.
        TrackingFrame::note_write(self.id());

        if batch::active() {
            let inner = Arc::clone(&self.inner);
            batch::defer(self.id(), Arc::new(move || inner.core.notify()));
        } else {
            self.inner.core.notify();
        }
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read().expect("value lock poisoned");
            f(&guard)
        };
        self.set(new_value);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.core.subscriber_count()
    }

    pub(crate) fn track_handle(&self) -> Arc<dyn Track> {
        self.inner.clone()
    }
}

impl<T> Clone for Cell<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Cell<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
