//! Scope tree and disposal.
//!
//! A `Scope` is a hierarchical disposal context. Every reaction, cell,
//! derived value, and registered cleanup belongs to exactly one scope, so
//! tearing down a scope finds and cancels everything created under it. This
//! is the only cancellation primitive in the runtime: there is no garbage
//! collector or background watcher noticing detachment, ownership is always
//! explicit.
//!
//! # Disposal order
//!
//! Disposing a scope walks, each set in reverse creation order:
//!
//! 1. child scopes (recursively),
//! 2. reactions,
//! 3. cells and derived values,
//! 4. unmount callbacks,
//! 5. plain cleanup callbacks,
//!
//! then detaches from the parent. Every callback in the walk runs inside a
//! panic guard: a failing cleanup is logged and the walk continues, so
//! teardown always completes. Note the asymmetry with the write path, which
//! is fail-fast (see `source`).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::warn;

use super::reaction::Reaction;

/// Counter for generating unique scope IDs.
static SCOPE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_scope_id() -> u64 {
    SCOPE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A cleanup callback registered against a scope.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// Resources a scope owns and disposes: cells and derived values implement
/// this to clear their subscriber sets (and, for derived values, drop their
/// own subscriptions).
pub(crate) trait Owned: Send + Sync {
    fn dispose_owned(&self);
}

/// A hierarchical disposal context.
///
/// Cloning a `Scope` produces another handle to the same context. Scopes are
/// created with [`Scope::root`] at the top of a reactive tree and
/// [`Scope::child`] everywhere below it.
pub struct Scope {
    inner: Arc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    id: u64,
    parent: RwLock<Weak<ScopeInner>>,
    children: RwLock<Vec<Arc<ScopeInner>>>,
    reactions: RwLock<Vec<Reaction>>,
    owned: RwLock<Vec<Arc<dyn Owned>>>,
    unmount_cleanups: Mutex<Vec<CleanupFn>>,
    cleanups: Mutex<Vec<CleanupFn>>,
    disposed: AtomicBool,
}

impl ScopeInner {
    fn new(parent: Weak<ScopeInner>) -> Self {
        Self {
            id: next_scope_id(),
            parent: RwLock::new(parent),
            children: RwLock::new(Vec::new()),
            reactions: RwLock::new(Vec::new()),
            owned: RwLock::new(Vec::new()),
            unmount_cleanups: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    fn dispose(self: &Arc<Self>) {
        // Double-dispose is a no-op; marking first also blocks any
        // registration attempted from inside the teardown callbacks.
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let children: Vec<_> = {
            let mut guard = self.children.write().expect("children lock poisoned");
            guard.drain(..).collect()
        };
        for child in children.iter().rev() {
            run_guarded("child scope disposal", || child.dispose());
        }

        let reactions: Vec<_> = {
            let mut guard = self.reactions.write().expect("reactions lock poisoned");
            guard.drain(..).collect()
        };
        for reaction in reactions.iter().rev() {
            run_guarded("reaction stop", || reaction.stop());
        }

        let owned: Vec<_> = {
            let mut guard = self.owned.write().expect("owned lock poisoned");
            guard.drain(..).collect()
        };
        for item in owned.iter().rev() {
            run_guarded("owned value disposal", || item.dispose_owned());
        }

        let unmounts: Vec<_> = {
            let mut guard = self
                .unmount_cleanups
                .lock()
                .expect("unmount cleanup lock poisoned");
            guard.drain(..).collect()
        };
        for cleanup in unmounts.into_iter().rev() {
            run_guarded("unmount callback", cleanup);
        }

        let cleanups: Vec<_> = {
            let mut guard = self.cleanups.lock().expect("cleanup lock poisoned");
            guard.drain(..).collect()
        };
        for cleanup in cleanups.into_iter().rev() {
            run_guarded("cleanup callback", cleanup);
        }

        let parent = self
            .parent
            .write()
            .expect("parent lock poisoned")
            .upgrade();
        if let Some(parent) = parent {
            parent
                .children
                .write()
                .expect("children lock poisoned")
                .retain(|c| !Arc::ptr_eq(c, self));
        }
    }
}

/// Invoke a teardown callback under a panic guard. Disposal must always
/// complete even if individual cleanups misbehave.
fn run_guarded<F: FnOnce()>(what: &str, f: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(
            step = what,
            panic = panic_message(&payload),
            "panic during scope disposal; continuing teardown"
        );
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

impl Scope {
    /// Create a root scope with no parent.
    pub fn root() -> Self {
        Self {
            inner: Arc::new(ScopeInner::new(Weak::new())),
        }
    }

    /// Create a child scope.
    ///
    /// Disposing the parent disposes the child first. Calling this on a
    /// disposed scope is rejected: the returned scope is itself already
    /// disposed and owns nothing.
    pub fn child(&self) -> Scope {
        if self.is_disposed() {
            warn!(scope = self.id(), "child requested on a disposed scope");
            let orphan = Arc::new(ScopeInner::new(Weak::new()));
            orphan.disposed.store(true, Ordering::SeqCst);
            return Scope { inner: orphan };
        }

        let child = Arc::new(ScopeInner::new(Arc::downgrade(&self.inner)));
        self.inner
            .children
            .write()
            .expect("children lock poisoned")
            .push(child.clone());
        Scope { inner: child }
    }

    /// Get the scope's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Check whether the scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Register a cleanup callback, run when the scope is disposed.
    pub fn on_cleanup<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_disposed() {
            warn!(scope = self.id(), "cleanup registered on a disposed scope; dropped");
            return;
        }
        self.inner
            .cleanups
            .lock()
            .expect("cleanup lock poisoned")
            .push(Box::new(f));
    }

    /// Register an unmount callback.
    ///
    /// Unmount callbacks run during disposal after owned values are gone but
    /// before plain cleanups; they are where tree detachment work belongs.
    pub fn on_unmount<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_disposed() {
            warn!(scope = self.id(), "unmount callback registered on a disposed scope; dropped");
            return;
        }
        self.inner
            .unmount_cleanups
            .lock()
            .expect("unmount cleanup lock poisoned")
            .push(Box::new(f));
    }

    /// Dispose the scope: children first, then reactions, owned values, and
    /// cleanups, all in reverse creation order. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub(crate) fn adopt_owned(&self, item: Arc<dyn Owned>) {
        if self.is_disposed() {
            warn!(scope = self.id(), "value adopted by a disposed scope; disposing immediately");
            item.dispose_owned();
            return;
        }
        self.inner
            .owned
            .write()
            .expect("owned lock poisoned")
            .push(item);
    }

    pub(crate) fn adopt_reaction(&self, reaction: Reaction) -> bool {
        if self.is_disposed() {
            warn!(scope = self.id(), "reaction adopted by a disposed scope; stopped");
            reaction.stop();
            return false;
        }
        self.inner
            .reactions
            .write()
            .expect("reactions lock poisoned")
            .push(reaction);
        true
    }

    pub(crate) fn downgrade(&self) -> Weak<ScopeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ScopeInner>) -> Scope {
        Scope { inner }
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
