//! Thread-local batching of store notifications.
//!
//! A batch is a synchronous scope: it never spans an `.await`, so tracking
//! the open depth per thread is sufficient even under a multi-threaded
//! runtime.

use std::cell::RefCell;
use std::sync::Arc;

/// Something that can be told to notify its listeners once a batch closes.
pub(crate) trait Notify: Send + Sync {
    fn notify(&self);
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: Vec<Arc<dyn Notify>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Run `f` with store notifications deferred until the outermost batch
/// completes.
///
/// Every store written inside the batch notifies exactly once when the
/// outermost batch exits, in first-write order. Nested batches compose.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    BATCH.with(|state| state.borrow_mut().depth += 1);
    let _guard = BatchGuard;
    f()
}

/// Queue a notification for the end of the current batch.
///
/// Returns `false` (and queues nothing) when no batch is open; the caller
/// should then notify immediately.
pub(crate) fn defer(target: Arc<dyn Notify>) -> bool {
    BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth == 0 {
            return false;
        }
        let addr = Arc::as_ptr(&target).cast::<()>();
        let queued = state
            .pending
            .iter()
            .any(|existing| Arc::as_ptr(existing).cast::<()>() == addr);
        if !queued {
            state.pending.push(target);
        }
        true
    })
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let pending = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            if state.depth == 0 {
                std::mem::take(&mut state.pending)
            } else {
                Vec::new()
            }
        });

        // Listeners must not run during unwinding; the writes already landed.
        if std::thread::panicking() {
            return;
        }
        for target in pending {
            target.notify();
        }
    }
}
