//! Store<T> - A mutable value cell with change notifications
//!
//! `Store<T>` holds the current value as an `Arc<T>` snapshot. Readers get a
//! cheap `Arc` clone; writers replace the snapshot wholesale, which bumps the
//! version and notifies listeners.
//!
//! [`Store::subscribe`] registers a callback invoked after each committed
//! write, or once at the end of the enclosing batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::batch::{self, Notify};

/// Change callback. Listeners read the new state themselves.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Listener registry shared by stores and derived nodes.
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) {
        self.entries.lock().retain(|(entry_id, _)| *entry_id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Invoke every listener in registration order.
    ///
    /// The list is cloned first so listeners may subscribe or unsubscribe
    /// without deadlocking.
    pub(crate) fn notify(&self) {
        let snapshot: Vec<Listener> = self
            .entries
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener();
        }
    }
}

/// Anything the derivation graph can read from: stores and derived nodes.
pub trait Readable: Clone + Send + Sync + 'static {
    /// The value type exposed by this node.
    type Value: Send + Sync + 'static;

    /// Current snapshot. For derived nodes this recomputes if stale.
    fn state(&self) -> Arc<Self::Value>;

    /// Monotonic version; changes whenever `state()` would return a
    /// different `Arc`.
    fn version(&self) -> u64;

    /// Register a change listener.
    fn subscribe_listener(&self, listener: Listener) -> ListenerId;

    /// Remove a change listener.
    fn unsubscribe(&self, id: ListenerId);
}

struct StoreInner<T> {
    value: RwLock<Arc<T>>,
    /// Held from read to commit so concurrent writers never lose an update.
    writer: Mutex<()>,
    version: AtomicU64,
    listeners: Listeners,
}

impl<T: Send + Sync> Notify for StoreInner<T> {
    fn notify(&self) {
        self.listeners.notify();
    }
}

/// A mutable value cell.
///
/// Cloning a `Store` creates a new handle to the **same** value.
///
/// # Thread Safety
///
/// `Store<T>` is `Send + Sync`. Writers are serialised: an updater sees the
/// snapshot its result replaces. Updaters may read any store, this one
/// included, but must not write to this store.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Store<T> {
    /// Create a new Store with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                value: RwLock::new(Arc::new(value)),
                writer: Mutex::new(()),
                version: AtomicU64::new(0),
                listeners: Listeners::new(),
            }),
        }
    }

    /// Get the current snapshot.
    pub fn state(&self) -> Arc<T> {
        self.inner.value.read().clone()
    }

    /// Get the current version number.
    ///
    /// The version is incremented once per committed write.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Compute the next value from the current one and commit it.
    pub fn set_state<F>(&self, updater: F)
    where
        F: FnOnce(&T) -> T,
    {
        let writer = self.inner.writer.lock();
        let next = updater(&self.state());
        self.commit(Arc::new(next));
        drop(writer);
        self.notify();
    }

    /// Like [`Store::set_state`], but the updater may refuse. Nothing is
    /// committed and no listener runs when it does.
    pub fn try_set_state<F, E>(&self, updater: F) -> Result<(), E>
    where
        F: FnOnce(&T) -> Result<T, E>,
    {
        let writer = self.inner.writer.lock();
        let next = updater(&self.state())?;
        self.commit(Arc::new(next));
        drop(writer);
        self.notify();
        Ok(())
    }

    /// Commit a pre-built snapshot.
    pub fn replace(&self, value: Arc<T>) {
        let writer = self.inner.writer.lock();
        self.commit(value);
        drop(writer);
        self.notify();
    }

    fn commit(&self, value: Arc<T>) {
        *self.inner.value.write() = value;
        self.inner.version.fetch_add(1, Ordering::Release);
    }

    /// Listeners run after the writer lock is released, so they may write.
    fn notify(&self) {
        let target: Arc<dyn Notify> = self.inner.clone();
        if !batch::defer(target) {
            self.inner.listeners.notify();
        }
    }

    /// Subscribe to committed writes.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners.add(Arc::new(listener))
    }

    /// Remove a listener registered with [`Store::subscribe`].
    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.listeners.remove(id);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl<T: Default + Send + Sync + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug + Send + Sync + 'static> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("value", &self.state())
            .field("version", &self.version())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Readable for Store<T> {
    type Value = T;

    fn state(&self) -> Arc<T> {
        Store::state(self)
    }

    fn version(&self) -> u64 {
        Store::version(self)
    }

    fn subscribe_listener(&self, listener: Listener) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        Store::unsubscribe(self, id);
    }
}
