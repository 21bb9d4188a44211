#![forbid(unsafe_code)]

//! Tonewheel State
//!
//! A process-wide, path-addressed state container with synchronous change
//! notification:
//!
//! - [`path`] - dotted-path keys (`modules.edo.value`)
//! - [`store`] - the state tree, writes, and subscriptions
//! - [`batch`] - notification coalescing across multi-write transactions
//!
//! # Role in Tonewheel
//! The store is the single authoritative home for all mutable orchestration
//! state: module order, expand/collapse flags, and field values. It performs
//! structural writes only - validation happens upstream in the control
//! binder, and the store trusts what it is given.
//!
//! # Execution model
//! Single-threaded and cooperative. Handles are `Rc`-shared; notifications
//! fire synchronously, in subscription order, before `set` returns.

pub mod batch;
pub mod path;
pub mod store;

pub use batch::BatchScope;
pub use path::{Path, PathError};
pub use store::{StateStore, StoreSubscription, Value};
