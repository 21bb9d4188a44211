#![forbid(unsafe_code)]

//! Batch coalescing for store notifications.
//!
//! When several paths are written in rapid succession - seeding a module's
//! defaults at registration, or a reorder commit alongside dependent
//! writes - subscribers would otherwise be notified once per write. A
//! [`BatchScope`] defers all notifications until the scope exits, then
//! fires each unique subscriber at most once with its latest deferred
//! payload.
//!
//! # Invariants
//!
//! 1. Nested batches are supported: only the outermost scope triggers the
//!    flush.
//! 2. Within a batch, reads always return the latest value (values are
//!    updated immediately; only notifications are deferred).
//! 3. Flush fires deferred callbacks in the order they were first
//!    enqueued; a re-deferred callback keeps its original slot but
//!    carries the newest payload.
//!
//! # Failure Modes
//!
//! - **Callback panics during flush**: remaining callbacks still run; the
//!   first panic is re-raised after all have been attempted.

use std::cell::{Cell, RefCell};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

type DeferredNotify = Box<dyn FnOnce()>;

struct DeferredEntry {
    key: usize,
    notify: DeferredNotify,
}

thread_local! {
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static DEFERRED: RefCell<Vec<DeferredEntry>> = const { RefCell::new(Vec::new()) };
}

/// Whether a batch scope is currently active on this thread.
#[must_use]
pub fn is_batching() -> bool {
    BATCH_DEPTH.with(|d| d.get()) > 0
}

/// Defer `notify` until the outermost batch exits, or run it immediately
/// if no batch is active.
///
/// `key` identifies the subscriber (callback pointer identity); a second
/// deferral with the same key replaces the pending payload instead of
/// queueing a duplicate.
pub fn defer_or_run_keyed(key: usize, notify: impl FnOnce() + 'static) {
    if !is_batching() {
        notify();
        return;
    }
    DEFERRED.with(|q| {
        let mut queue = q.borrow_mut();
        if let Some(entry) = queue.iter_mut().find(|e| e.key == key) {
            entry.notify = Box::new(notify);
        } else {
            queue.push(DeferredEntry {
                key,
                notify: Box::new(notify),
            });
        }
    });
}

/// RAII scope that defers store notifications until it is dropped.
///
/// ```
/// use twl_state::{BatchScope, Path, StateStore, Value};
///
/// let store = StateStore::new();
/// {
///     let _batch = BatchScope::new();
///     store.set(&Path::new("a").unwrap(), Value::Int(1));
///     store.set(&Path::new("b").unwrap(), Value::Int(2));
/// } // subscribers notified here, once each
/// ```
#[derive(Debug)]
pub struct BatchScope {
    _private: (),
}

impl BatchScope {
    /// Enter a batch scope.
    #[must_use]
    pub fn new() -> Self {
        BATCH_DEPTH.with(|d| d.set(d.get() + 1));
        Self { _private: () }
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let depth = BATCH_DEPTH.with(|d| {
            let next = d.get().saturating_sub(1);
            d.set(next);
            next
        });
        if depth > 0 {
            return;
        }
        let entries = DEFERRED.with(|q| q.take());
        let mut first_panic = None;
        for entry in entries {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(entry.notify)) {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            resume_unwind(payload);
        }
    }
}
