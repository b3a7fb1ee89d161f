//! Effect contracts shared by the engine and its callers.
//!
//! The form engine never spawns tasks itself; asynchronous validation hands
//! futures back to the caller. What it does need is a way to tell a pending
//! validation that a newer one has superseded it.

pub mod task;
