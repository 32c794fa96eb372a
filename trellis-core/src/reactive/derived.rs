//! Derived value implementation.
//!
//! A `Derived` is a read-only cell whose value is produced by a compute
//! function. The function runs once at creation inside a tracking frame; the
//! sources it reads become the dependency set. Each dependency is subscribed
//! with a handler that re-runs the function, and on a changed result writes
//! it through to the derivation's own subscribers.
//!
//! # Dynamic tracking
//!
//! The dependency set is recomputed fresh on every run: stale dependencies
//! from the previous run are fully unsubscribed before the new set is
//! subscribed. A derivation reading `if cond { a } else { b }` is therefore
//! subscribed to exactly one of `a`/`b` at any time, and changes to the other
//! cannot trigger a recompute.
//!
//! # Read-only
//!
//! There is no `set` on `Derived`; writes are rejected by the type system.
//! The only way the value changes is through the compute function.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use smallvec::SmallVec;

use super::context::TrackingFrame;
use super::scope::{Owned, Scope};
use super::source::{NotifyFn, SourceCore, SubscriberId, Track};

type DepList = SmallVec<[Arc<dyn Track>; 4]>;

/// A read-only reactive value computed from other sources.
///
/// # Example
///
/// ```rust,ignore
/// let scope = Scope::root();
/// let a = Cell::new(&scope, 2);
/// let b = Cell::new(&scope, 3);
///
/// let a2 = a.clone();
/// let b2 = b.clone();
/// let sum = Derived::new(&scope, move || a2.get() + b2.get());
///
/// assert_eq!(sum.get(), 5);
/// a.set(10); // sum recomputes to 13
/// ```
pub struct Derived<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<DerivedInner<T>>,
}

pub(crate) struct DerivedInner<T> {
    core: SourceCore,
    subscriber_id: SubscriberId,
    compute: Arc<dyn Fn() -> T + Send + Sync>,
    value: RwLock<T>,
    /// Dependencies subscribed during the last run; fully replaced each run.
    deps: RwLock<DepList>,
    /// Number of times the compute function has run.
    run_count: AtomicU64,
}

impl<T> DerivedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Run the compute function inside a fresh tracking frame and replace the
    /// subscription set with what it read.
    fn run_tracked(self: &Arc<Self>) -> T {
        let frame = TrackingFrame::enter(self.subscriber_id);
        let value = (self.compute)();
        let sources = frame.finish();
        self.run_count.fetch_add(1, Ordering::Relaxed);
        self.replace_deps(sources);
        value
    }

    fn replace_deps(self: &Arc<Self>, sources: Vec<Arc<dyn Track>>) {
        let mut deps = self.deps.write().expect("deps lock poisoned");
        for dep in deps.drain(..) {
            dep.unsubscribe(self.subscriber_id);
        }

        let weak = Arc::downgrade(self);
        for source in sources {
            let handler = dependency_handler(weak.clone());
            source.subscribe(self.subscriber_id, handler);
            deps.push(source);
        }
    }

    fn on_dependency_change(self: &Arc<Self>) {
        let new_value = self.run_tracked();

        let changed = {
            let current = self.value.read().expect("value lock poisoned");
            *current != new_value
        };
        if !changed {
            return;
        }

        {
            let mut guard = self.value.write().expect("value lock poisoned");
            *guard = new_value;
        }
        // A mid-run reader of this derivation is not subscribed yet; flag it
        // the same way a direct cell write would.
        TrackingFrame::note_write(self.core.id());
        self.core.notify();
    }
}

fn dependency_handler<T>(weak: Weak<DerivedInner<T>>) -> NotifyFn
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Arc::new(move || {
        if let Some(inner) = weak.upgrade() {
            inner.on_dependency_change();
        }
    })
}

impl<T> Track for DerivedInner<T>
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

impl<T> Owned for DerivedInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn dispose_owned(&self) {
        let mut deps = self.deps.write().expect("deps lock poisoned");
        for dep in deps.drain(..) {
            dep.unsubscribe(self.subscriber_id);
        }
        self.core.clear();
    }
}

impl<T> Derived<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new derived value owned by `owner`.
    ///
    /// The compute function runs immediately to establish the initial value
    /// and dependency set.
    pub fn new<F>(owner: &Scope, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let subscriber_id = SubscriberId::new();
        let compute: Arc<dyn Fn() -> T + Send + Sync> = Arc::new(compute);

        // First run: track dependencies before the inner exists, then attach.
        let frame = TrackingFrame::enter(subscriber_id);
        let initial = compute();
        let sources = frame.finish();

        let inner = Arc::new(DerivedInner {
            core: SourceCore::new(),
            subscriber_id,
            compute,
            value: RwLock::new(initial),
            deps: RwLock::new(SmallVec::new()),
            run_count: AtomicU64::new(1),
        });
        inner.replace_deps(sources);

        owner.adopt_owned(inner.clone());
        Self { inner }
    }

    /// Get the derivation's unique source ID.
    pub fn id(&self) -> u64 {
        self.inner.core.id()
    }

    /// Get the current value.
    ///
    /// If called within a tracked computation, the derivation is recorded as
    /// a dependency of that computation.
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

    /// Number of times the compute function has run.
    pub fn run_count(&self) -> u64 {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.core.subscriber_count()
    }

    pub(crate) fn track_handle(&self) -> Arc<dyn Track> {
        self.inner.clone()
    }
}

impl<T> Clone for Derived<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Derived<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("run_count", &self.run_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::cell::Cell;

    #[test]
    fn derived_computes_at_creation() {
        let scope = Scope::root();
        let derived = Derived::new(&scope, || 42);

        assert_eq!(derived.get(), 42);
        assert_eq!(derived.run_count(), 1);
    }

    #[test]
    fn derived_recomputes_on_dependency_change() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, 10);

        let cell_clone = cell.clone();
        let doubled = Derived::new(&scope, move || cell_clone.get() * 2);

        assert_eq!(doubled.get(), 20);
        assert_eq!(doubled.run_count(), 1);

        cell.set(5);
        assert_eq!(doubled.get(), 10);
        assert_eq!(doubled.run_count(), 2);
    }

    #[test]
    fn unchanged_result_notifies_nobody_downstream() {
        let scope = Scope::root();
        let cell = Cell::new(&scope, 4);

        let cell_clone = cell.clone();
        let parity = Derived::new(&scope, move || cell_clone.get() % 2);

        let parity_clone = parity.clone();
        let downstream = Derived::new(&scope, move || parity_clone.get() + 100);
        assert_eq!(downstream.get(), 100);
        assert_eq!(downstream.run_count(), 1);

        // 4 -> 6: parity recomputes but stays 0, downstream must not run.
        cell.set(6);
        assert_eq!(parity.run_count(), 2);
        assert_eq!(downstream.run_count(), 1);

        cell.set(7);
        assert_eq!(downstream.get(), 101);
        assert_eq!(downstream.run_count(), 2);
    }

    #[test]
    fn dependency_set_is_replaced_every_run() {
        let scope = Scope::root();
        let cond = Cell::new(&scope, true);
        let a = Cell::new(&scope, 1);
        let b = Cell::new(&scope, 100);

        let (cond2, a2, b2) = (cond.clone(), a.clone(), b.clone());
        let picked = Derived::new(&scope, move || {
            if cond2.get() {
                a2.get()
            } else {
                b2.get()
            }
        });

        assert_eq!(picked.get(), 1);
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 0);

        cond.set(false);
        assert_eq!(picked.get(), 100);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);

        // Changes to the abandoned branch must not recompute.
        let runs_before = picked.run_count();
        a.set(2);
        assert_eq!(picked.run_count(), runs_before);
    }

    #[test]
    fn derived_chains_propagate() {
        let scope = Scope::root();
        let base = Cell::new(&scope, 5);

        let base_clone = base.clone();
        let doubled = Derived::new(&scope, move || base_clone.get() * 2);

        let doubled_clone = doubled.clone();
        let plus_ten = Derived::new(&scope, move || doubled_clone.get() + 10);

        assert_eq!(doubled.get(), 10);
        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert_eq!(doubled.get(), 20);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn disposed_owner_disconnects_derived() {
        let root = Scope::root();
        let cell = Cell::new(&root, 1);

        let inner = root.child();
        let cell_clone = cell.clone();
        let derived = Derived::new(&inner, move || cell_clone.get() + 1);
        assert_eq!(derived.get(), 2);
        assert_eq!(cell.subscriber_count(), 1);

        inner.dispose();
        assert_eq!(cell.subscriber_count(), 0);

        let runs = derived.run_count();
        cell.set(50);
        assert_eq!(derived.run_count(), runs);
    }
}
