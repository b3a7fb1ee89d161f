//! Reform Core - Reactive Primitives
//!
//! This crate provides the small reactive substrate the form engine is built
//! on. It knows nothing about forms; it only knows how to hold a value, derive
//! values from other values, and tell interested parties when either changed.
//!
//! # Primitives
//!
//! - [`Store<T>`](reactive::Store): the mutable source of truth. Holds an
//!   `Arc<T>` snapshot, a version counter and a listener list.
//! - [`Derived<D, T>`](reactive::Derived): a memoised node computed from one
//!   or more upstream [`Readable`](reactive::Readable)s. Recomputation sees
//!   the previous output and the previous/current upstream snapshots so it
//!   can hand back the *same* `Arc` when nothing relevant changed.
//! - [`batch`](reactive::batch): defers store notifications until the
//!   outermost batch completes.
//! - [`CancellationToken`](effects::task::CancellationToken): cooperative
//!   cancellation used to supersede stale asynchronous work.

#![forbid(unsafe_code)]

/// Store, derived nodes and batching
pub mod reactive;

/// Runtime-agnostic effect contracts
pub mod effects;

pub use effects::task::{CancellationSource, CancellationToken, WatchCancellationToken};
pub use reactive::{
    batch, DeriveArgs, Dependencies, Derived, ListenerId, MountGuard, Readable, Store,
};
