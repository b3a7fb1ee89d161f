//! Derived<D, T> - memoised values computed from upstream nodes
//!
//! A derived node is a pull/push hybrid:
//!
//! - **Pull**: [`Derived::state`] compares the upstream versions with the
//!   ones captured at the last computation and recomputes only on mismatch.
//!   Pulling a derived node that depends on another derived node refreshes
//!   the upstream first, which yields dependency order without a scheduler.
//! - **Push**: once [`Derived::mount`]ed, the node listens to its upstreams
//!   and notifies its own listeners whenever its output changed.
//!
//! # Memoisation contract
//!
//! The compute function receives [`DeriveArgs`]: the previous output and the
//! previous/current upstream snapshots. Returning the previous `Arc` means
//! "unchanged"; the node's version only moves when a different `Arc` comes
//! back.
//!
//! The compute function runs with the node's cache locked. It may read other
//! nodes but must not read the node being computed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::store::{Listener, ListenerId, Listeners, Readable};

/// A fixed list of upstream nodes.
///
/// Implemented for one- and two-element tuples of [`Readable`]s.
pub trait Dependencies: Clone + Send + Sync + 'static {
    /// Snapshot of every upstream value, in tuple order.
    type Values: Clone + Send + Sync + 'static;

    /// Current upstream versions. Refreshes derived upstreams.
    fn versions(&self) -> Vec<u64>;

    /// Current upstream snapshots.
    fn values(&self) -> Self::Values;

    /// Subscribe `listener` to every upstream.
    fn subscribe_all(&self, listener: Listener) -> Vec<ListenerId>;

    /// Undo [`Dependencies::subscribe_all`].
    fn unsubscribe_all(&self, ids: &[ListenerId]);
}

impl<A: Readable> Dependencies for (A,) {
    type Values = (Arc<A::Value>,);

    fn versions(&self) -> Vec<u64> {
        vec![self.0.version()]
    }

    fn values(&self) -> Self::Values {
        (self.0.state(),)
    }

    fn subscribe_all(&self, listener: Listener) -> Vec<ListenerId> {
        vec![self.0.subscribe_listener(listener)]
    }

    fn unsubscribe_all(&self, ids: &[ListenerId]) {
        if let Some(id) = ids.first() {
            self.0.unsubscribe(*id);
        }
    }
}

impl<A: Readable, B: Readable> Dependencies for (A, B) {
    type Values = (Arc<A::Value>, Arc<B::Value>);

    fn versions(&self) -> Vec<u64> {
        vec![self.0.version(), self.1.version()]
    }

    fn values(&self) -> Self::Values {
        (self.0.state(), self.1.state())
    }

    fn subscribe_all(&self, listener: Listener) -> Vec<ListenerId> {
        vec![
            self.0.subscribe_listener(listener.clone()),
            self.1.subscribe_listener(listener),
        ]
    }

    fn unsubscribe_all(&self, ids: &[ListenerId]) {
        if let [first, second] = ids {
            self.0.unsubscribe(*first);
            self.1.unsubscribe(*second);
        }
    }
}

/// Inputs handed to a derived node's compute function.
pub struct DeriveArgs<D: Dependencies, T> {
    /// Upstream snapshots from the previous computation, if any.
    pub prev_dep_vals: Option<D::Values>,
    /// Upstream snapshots for this computation.
    pub curr_dep_vals: D::Values,
    /// The previous output, if any.
    pub prev_val: Option<Arc<T>>,
}

type ComputeFn<D, T> = Box<dyn Fn(DeriveArgs<D, T>) -> Arc<T> + Send + Sync>;

struct Cached<D: Dependencies, T> {
    dep_versions: Vec<u64>,
    dep_vals: D::Values,
    value: Arc<T>,
}

struct DerivedInner<D: Dependencies, T> {
    deps: D,
    compute: ComputeFn<D, T>,
    cache: Mutex<Option<Cached<D, T>>>,
    version: AtomicU64,
    notified_version: AtomicU64,
    listeners: Listeners,
}

impl<D: Dependencies, T: Send + Sync + 'static> DerivedInner<D, T> {
    /// Bring the cache up to date and return the current output.
    fn refresh(&self) -> Arc<T> {
        let versions = self.deps.versions();
        let mut cache = self.cache.lock();

        if let Some(cached) = cache.as_ref() {
            if cached.dep_versions == versions {
                return cached.value.clone();
            }
        }

        let curr_dep_vals = self.deps.values();
        let (prev_dep_vals, prev_val) = match cache.take() {
            Some(cached) => (Some(cached.dep_vals), Some(cached.value)),
            None => (None, None),
        };

        let value = (self.compute)(DeriveArgs {
            prev_dep_vals,
            curr_dep_vals: curr_dep_vals.clone(),
            prev_val: prev_val.clone(),
        });

        let changed = prev_val
            .as_ref()
            .map_or(true, |prev| !Arc::ptr_eq(prev, &value));
        if changed {
            self.version.fetch_add(1, Ordering::Release);
        }
        trace!(changed, "derived node recomputed");

        *cache = Some(Cached {
            dep_versions: versions,
            dep_vals: curr_dep_vals,
            value: value.clone(),
        });
        value
    }

    /// Push path: refresh, then notify if the output moved since the last
    /// notification (it may have moved through a pull in between).
    fn on_upstream_change(&self) {
        self.refresh();
        let version = self.version.load(Ordering::Acquire);
        if self.notified_version.swap(version, Ordering::AcqRel) != version {
            self.listeners.notify();
        }
    }
}

/// A memoised value derived from the upstream nodes `D`.
///
/// Cloning a `Derived` creates a new handle to the **same** node.
pub struct Derived<D: Dependencies, T> {
    inner: Arc<DerivedInner<D, T>>,
}

impl<D: Dependencies, T> Clone for Derived<D, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Dependencies, T: Send + Sync + 'static> Derived<D, T> {
    /// Create a derived node. Nothing is computed until the first read or
    /// mount.
    pub fn new<F>(deps: D, compute: F) -> Self
    where
        F: Fn(DeriveArgs<D, T>) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DerivedInner {
                deps,
                compute: Box::new(compute),
                cache: Mutex::new(None),
                version: AtomicU64::new(0),
                notified_version: AtomicU64::new(0),
                listeners: Listeners::new(),
            }),
        }
    }

    /// Current output, recomputed first if any upstream moved.
    pub fn state(&self) -> Arc<T> {
        self.inner.refresh()
    }

    /// Output version. Bumps only when the compute function returns a new
    /// `Arc`.
    pub fn version(&self) -> u64 {
        self.inner.refresh();
        self.inner.version.load(Ordering::Acquire)
    }

    /// Subscribe to output changes. Only delivered while mounted.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Remove a listener registered with [`Derived::subscribe`].
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    /// Start pushing upstream changes through this node.
    ///
    /// Computes eagerly once. Dropping the returned guard unmounts.
    pub fn mount(&self) -> MountGuard {
        let weak: Weak<DerivedInner<D, T>> = Arc::downgrade(&self.inner);
        let listener: Listener = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_upstream_change();
            }
        });

        let ids = self.inner.deps.subscribe_all(listener);
        self.inner.refresh();
        let version = self.inner.version.load(Ordering::Acquire);
        self.inner.notified_version.store(version, Ordering::Release);

        let deps = self.inner.deps.clone();
        MountGuard::new(move || deps.unsubscribe_all(&ids))
    }
}

impl<D: Dependencies, T: Send + Sync + 'static> Readable for Derived<D, T> {
    type Value = T;

    fn state(&self) -> Arc<T> {
        Derived::state(self)
    }

    fn version(&self) -> u64 {
        Derived::version(self)
    }

    fn subscribe_listener(&self, listener: Listener) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        Derived::unsubscribe(self, id);
    }
}

/// Keeps a mounted node subscribed to its upstreams.
///
/// Unmounts on [`MountGuard::unmount`] or drop, whichever comes first.
#[must_use = "dropping the guard unmounts immediately"]
pub struct MountGuard {
    cleanup: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl MountGuard {
    /// Wrap an arbitrary cleanup action.
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// Combine several guards into one that unmounts them in order.
    pub fn join(guards: Vec<MountGuard>) -> Self {
        Self::new(move || {
            for guard in guards {
                guard.unmount();
            }
        })
    }

    /// Unmount now.
    pub fn unmount(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for MountGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for MountGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountGuard")
            .field("mounted", &self.cleanup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Store};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_derived_is_lazy_and_memoised() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_c = calls.clone();
        let source = Store::new(10);
        let doubled = Derived::new((source.clone(),), move |args| {
            calls_c.fetch_add(1, Ordering::SeqCst);
            Arc::new(*args.curr_dep_vals.0 * 2)
        });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*doubled.state(), 20);
        assert_eq!(*doubled.state(), 20);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        source.set_state(|_| 5);
        assert_eq!(*doubled.state(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_compute_receives_previous_snapshots() {
        let source = Store::new(1);
        let history = Derived::new((source.clone(),), |args: DeriveArgs<_, (i32, i32)>| {
            let prev = args.prev_dep_vals.map_or(0, |(prev,)| *prev);
            Arc::new((prev, *args.curr_dep_vals.0))
        });

        assert_eq!(*history.state(), (0, 1));
        source.set_state(|_| 2);
        assert_eq!(*history.state(), (1, 2));
    }

    #[test]
    fn test_returning_previous_arc_keeps_version() {
        let source = Store::new(3);
        let parity = Derived::new((source.clone(),), |args: DeriveArgs<_, bool>| {
            let even = *args.curr_dep_vals.0 % 2 == 0;
            match args.prev_val {
                Some(prev) if *prev == even => prev,
                _ => Arc::new(even),
            }
        });

        let first = parity.state();
        let version = parity.version();
        source.set_state(|_| 5);
        let second = parity.state();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(parity.version(), version);

        source.set_state(|_| 6);
        assert!(*parity.state());
        assert_eq!(parity.version(), version + 1);
    }

    #[test]
    fn test_derived_of_derived_pulls_in_order() {
        let source = Store::new(2);
        let squared = Derived::new((source.clone(),), |args: DeriveArgs<_, i32>| {
            Arc::new(*args.curr_dep_vals.0 * *args.curr_dep_vals.0)
        });
        let summary = Derived::new(
            (source.clone(), squared.clone()),
            |args: DeriveArgs<_, String>| {
                let (value, squared) = args.curr_dep_vals;
                Arc::new(format!("{value}^2={squared}"))
            },
        );

        assert_eq!(summary.state().as_str(), "2^2=4");
        source.set_state(|_| 3);
        assert_eq!(summary.state().as_str(), "3^2=9");
    }

    #[test]
    fn test_mounted_derived_notifies_once_per_batch() {
        let source = Store::new(0);
        let doubled = Derived::new((source.clone(),), |args: DeriveArgs<_, i32>| {
            Arc::new(*args.curr_dep_vals.0 * 2)
        });
        let count = Arc::new(AtomicUsize::new(0));
        let count_c = count.clone();
        doubled.subscribe(move || {
            count_c.fetch_add(1, Ordering::SeqCst);
        });

        let guard = doubled.mount();
        batch(|| {
            source.set_state(|v| v + 1);
            source.set_state(|v| v + 1);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*doubled.state(), 4);

        guard.unmount();
        source.set_state(|v| v + 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(source.listener_count(), 0);
    }

    #[test]
    fn test_mounted_derived_notifies_after_pull() {
        let source = Store::new(0);
        let doubled = Derived::new((source.clone(),), |args: DeriveArgs<_, i32>| {
            Arc::new(*args.curr_dep_vals.0 * 2)
        });
        let doubled_reader = doubled.clone();
        // A second node reads `doubled` from its own listener before
        // `doubled`'s listener runs.
        source.subscribe(move || {
            let _ = doubled_reader.state();
        });
        let count = Arc::new(AtomicUsize::new(0));
        let count_c = count.clone();
        doubled.subscribe(move || {
            count_c.fetch_add(1, Ordering::SeqCst);
        });

        let _guard = doubled.mount();
        source.set_state(|_| 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mount_guard_join_unmounts_all() {
        let a = Store::new(0);
        let b = Store::new(0);
        let da = Derived::new((a.clone(),), |args: DeriveArgs<_, i32>| args.curr_dep_vals.0);
        let db = Derived::new((b.clone(),), |args: DeriveArgs<_, i32>| args.curr_dep_vals.0);

        let guard = MountGuard::join(vec![da.mount(), db.mount()]);
        assert_eq!(a.listener_count(), 1);
        assert_eq!(b.listener_count(), 1);

        drop(guard);
        assert_eq!(a.listener_count(), 0);
        assert_eq!(b.listener_count(), 0);
    }
}
