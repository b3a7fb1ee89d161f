//! # Reactive Primitives for Form State
//!
//! This module provides the reactive primitives the form engine derives its
//! public state with.
//!
//! ## Core Types
//!
//! - [`Store<T>`]: A mutable value cell. Writes bump a version and notify
//!   listeners (immediately, or once at the end of the enclosing [`batch`]).
//!
//! - [`Derived<D, T>`]: A value recomputed from the upstream nodes `D`.
//!   Pulled lazily on read, pushed eagerly to listeners once mounted.
//!
//! ## Design Principles
//!
//! 1. **Snapshots are `Arc`s**: reading never copies the value, and identity
//!    (`Arc::ptr_eq`) is the change signal downstream consumers rely on.
//!
//! 2. **Explicit memoisation**: a derived node is handed its previous output
//!    and the previous upstream snapshots; returning the previous `Arc`
//!    means "unchanged" and does not bump the node's version.
//!
//! 3. **No torn reads inside a batch**: listeners never run while a batch is
//!    open, so related writes are observed as one transition.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reform_core::reactive::{batch, Derived, Store};
//!
//! let count = Store::new(1);
//! let doubled = Derived::new((count.clone(),), |args| {
//!     std::sync::Arc::new(*args.curr_dep_vals.0 * 2)
//! });
//!
//! batch(|| {
//!     count.set_state(|c| c + 1);
//!     count.set_state(|c| c + 1);
//! });
//! assert_eq!(*doubled.state(), 6);
//! ```

mod batch;
mod derived;
mod store;

pub use batch::batch;
pub use derived::{DeriveArgs, Dependencies, Derived, MountGuard};
pub use store::{Listener, ListenerId, Readable, Store};
