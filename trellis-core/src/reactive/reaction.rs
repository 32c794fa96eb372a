//! Reaction implementation.
//!
//! A `Reaction` is a side-effecting computation re-run whenever any cell or
//! derived value it read during its last run changes. It has no externally
//! observable value; it exists to synchronize reactive state with the outside
//! world (the node tree, logging, anything else).
//!
//! # Cleanup
//!
//! A reaction built with [`Reaction::with_cleanup`] returns a cleanup
//! callback from each run; the callback is invoked before the next run and
//! when the reaction stops. Each run also gets a fresh child scope, so
//! anything registered against that scope mid-run dies before the next run.
//!
//! # Re-entrancy
//!
//! If a dependency fires while the reaction is already running, the run is
//! marked dirty instead of recursing. After the body returns, the reaction
//! loops (cleanup, re-run, resubscribe) until it settles, up to
//! [`MAX_REACTION_ITERATIONS`]; past the cap it panics with
//! [`RuntimeError::RunawayReaction`]. This is the primary defense against
//! infinite update cycles: a reaction that unconditionally writes a fresh
//! value to a cell it also reads trips the cap instead of hanging.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use smallvec::SmallVec;

use crate::error::RuntimeError;

use super::context::TrackingFrame;
use super::scope::{CleanupFn, Scope, ScopeInner};
use super::source::{NotifyFn, SubscriberId, Track};

/// Retry cap for a single logical update of one reaction.
pub const MAX_REACTION_ITERATIONS: usize = 100;

/// Counter for generating unique reaction IDs.
static REACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_reaction_id() -> u64 {
    REACTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type DepList = SmallVec<[Arc<dyn Track>; 4]>;

/// A side-effecting computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let scope = Scope::root();
/// let count = Cell::new(&scope, 0);
///
/// let count2 = count.clone();
/// Reaction::new(&scope, move |_| {
///     println!("count is {}", count2.get());
/// });
///
/// count.set(5); // prints "count is 5"
/// ```
pub struct Reaction {
    inner: Arc<ReactionInner>,
}

struct ReactionInner {
    id: u64,
    subscriber_id: SubscriberId,

    /// The body; returns an optional cleanup to run before the next pass.
    run: Box<dyn Fn(&Scope) -> Option<CleanupFn> + Send + Sync>,

    /// The scope the reaction was created under. Weak: the scope owns the
    /// reaction, not the other way around.
    owner: Weak<ScopeInner>,

    /// Dependencies subscribed during the last run; fully replaced each run.
    deps: RwLock<DepList>,

    /// Cleanup returned by the last run, if any.
    cleanup: Mutex<Option<CleanupFn>>,

    /// Child scope for the current run; disposed before the next run.
    run_scope: Mutex<Option<Scope>>,

    running: AtomicBool,
    dirty: AtomicBool,
    stopped: AtomicBool,
    run_count: AtomicU64,
}

/// Clears the running flag even if the body panics.
struct RunningReset<'a>(&'a AtomicBool);

impl Drop for RunningReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReactionInner {
    /// Request a (re-)run. Coalesces re-entrant triggers into the retry loop.
    fn trigger(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        self.dirty.store(true, Ordering::SeqCst);
        if self.running.swap(true, Ordering::SeqCst) {
            // Already mid-run; the loop below picks the dirty flag up.
            return;
        }
        let _reset = RunningReset(&self.running);

        let mut iterations = 0usize;
        while self.dirty.swap(false, Ordering::SeqCst) {
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            iterations += 1;
            if iterations > MAX_REACTION_ITERATIONS {
                panic!(
                    "{}",
                    RuntimeError::RunawayReaction {
                        id: self.id,
                        max: MAX_REACTION_ITERATIONS,
                    }
                );
            }
            self.run_once();
        }
    }

    fn run_once(self: &Arc<Self>) {
        // Previous run's cleanup fires before the next body.
        if let Some(cleanup) = self.cleanup.lock().expect("cleanup lock poisoned").take() {
            cleanup();
        }
        // Anything registered mid-run last time dies with its scope.
        if let Some(scope) = self.run_scope.lock().expect("run scope lock poisoned").take() {
            scope.dispose();
        }

        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        let owner = Scope::from_inner(owner);
        if owner.is_disposed() {
            return;
        }

        let run_scope = owner.child();
        *self.run_scope.lock().expect("run scope lock poisoned") = Some(run_scope.clone());

        let frame = TrackingFrame::enter(self.subscriber_id);
        let cleanup = (self.run)(&run_scope);
        let (sources, wrote) = frame.finish_with_writes();

        // The body may have disposed its own owner, stopping this reaction
        // mid-run. Leave nothing behind: no subscriptions, and the returned
        // cleanup fires now instead of waiting for a next run that never
        // comes.
        if self.stopped.load(Ordering::SeqCst) {
            if let Some(cleanup) = cleanup {
                cleanup();
            }
            if let Some(scope) = self.run_scope.lock().expect("run scope lock poisoned").take() {
                scope.dispose();
            }
            return;
        }

        self.replace_deps(sources);
        *self.cleanup.lock().expect("cleanup lock poisoned") = cleanup;
        // A write to a source read earlier in this same run happened before
        // the subscriptions above existed; re-run for it.
        if wrote {
            self.dirty.store(true, Ordering::SeqCst);
        }
        self.run_count.fetch_add(1, Ordering::Relaxed);
    }

    fn replace_deps(self: &Arc<Self>, sources: Vec<Arc<dyn Track>>) {
        let mut deps = self.deps.write().expect("deps lock poisoned");
        for dep in deps.drain(..) {
            dep.unsubscribe(self.subscriber_id);
        }

        let weak = Arc::downgrade(self);
        for source in sources {
            let handler = trigger_handler(weak.clone());
            source.subscribe(self.subscriber_id, handler);
            deps.push(source);
        }
    }
}

fn trigger_handler(weak: Weak<ReactionInner>) -> NotifyFn {
    Arc::new(move || {
        if let Some(inner) = weak.upgrade() {
            inner.trigger();
        }
    })
}

impl Reaction {
    /// Create a reaction owned by `owner` and run it once to establish
    /// dependencies.
    ///
    /// The body receives the reaction's per-run child scope; cleanups and
    /// values registered against it last exactly until the next run.
    pub fn new<F>(owner: &Scope, f: F) -> Self
    where
        F: Fn(&Scope) + Send + Sync + 'static,
    {
        Self::build(
            owner,
            Box::new(move |scope| {
                f(scope);
                None
            }),
        )
    }

    /// Like [`Reaction::new`], but the body returns a cleanup callback that
    /// runs before the next pass and when the reaction stops.
    pub fn with_cleanup<F, C>(owner: &Scope, f: F) -> Self
    where
        F: Fn(&Scope) -> C + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::build(
            owner,
            Box::new(move |scope| Some(Box::new(f(scope)) as CleanupFn)),
        )
    }

    fn build(owner: &Scope, run: Box<dyn Fn(&Scope) -> Option<CleanupFn> + Send + Sync>) -> Self {
        let inner = Arc::new(ReactionInner {
            id: next_reaction_id(),
            subscriber_id: SubscriberId::new(),
            run,
            owner: owner.downgrade(),
            deps: RwLock::new(SmallVec::new()),
            cleanup: Mutex::new(None),
            run_scope: Mutex::new(None),
            running: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            run_count: AtomicU64::new(0),
        });

        let reaction = Reaction { inner };
        if owner.adopt_reaction(reaction.clone()) {
            reaction.inner.trigger();
        }
        reaction
    }

    /// Get the reaction's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> u64 {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Check whether the reaction has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stop the reaction: unsubscribe from all dependencies, run the pending
    /// cleanup, and dispose the per-run scope. Idempotent.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut deps = self.inner.deps.write().expect("deps lock poisoned");
            for dep in deps.drain(..) {
                dep.unsubscribe(self.inner.subscriber_id);
            }
        }

        if let Some(cleanup) = self
            .inner
            .cleanup
            .lock()
            .expect("cleanup lock poisoned")
            .take()
        {
            cleanup();
        }
        if let Some(scope) = self
            .inner
            .run_scope
            .lock()
            .expect("run scope lock poisoned")
            .take()
        {
            scope.dispose();
        }
    }
}

impl Clone for Reaction {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
