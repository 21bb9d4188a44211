#![forbid(unsafe_code)]

//! The path-addressed state store.
//!
//! # Design
//!
//! [`StateStore`] holds a tree of [`Value`] leaves in shared,
//! reference-counted storage (`Rc<RefCell<..>>`). A write to a dotted
//! [`Path`] creates intermediate branches as needed, then synchronously
//! notifies every subscriber whose registered prefix is the written path
//! or an ancestor of it, in registration order.
//!
//! The store performs structural writes only: it never validates values.
//! Callers (the control binder, the registry) are responsible for only
//! committing values that have already passed validation.
//!
//! # Performance
//!
//! | Operation     | Complexity                         |
//! |---------------|------------------------------------|
//! | `get()`       | O(depth)                           |
//! | `set()`       | O(depth + S), S = live subscribers |
//! | `subscribe()` | O(1) amortized                     |
//!
//! # Failure Modes
//!
//! - **Overwriting a branch with a leaf**: allowed; the subtree is
//!   dropped. Subscribers registered below the dropped subtree simply
//!   stop receiving notifications (their paths no longer exist).
//! - **Subscriber leak**: dead weak references are pruned lazily during
//!   notification, as in any long-lived observer list.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::batch;
use crate::path::Path;

/// A value stored at a leaf of the state tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean flag (expand/collapse, checkboxes).
    Bool(bool),
    /// Integer field (divisions, step counts).
    Int(i64),
    /// Floating-point field (cents, generators).
    Float(f64),
    /// String field (selects, labels).
    Str(String),
    /// Ordered list (the module order).
    List(Vec<Value>),
}

impl Value {
    /// Extract a boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an integer, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a float; integers coerce losslessly enough for field math.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Extract a string slice, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract a list slice, if this is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Stable name of the value's type, for messages and logs.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A node in the state tree.
#[derive(Debug)]
enum Node {
    Leaf(Value),
    Branch(AHashMap<String, Node>),
}

type CallbackRc = Rc<dyn Fn(&Path, &Value)>;
type CallbackWeak = Weak<dyn Fn(&Path, &Value)>;

struct Subscriber {
    prefix: Path,
    callback: CallbackWeak,
}

struct StoreInner {
    root: AHashMap<String, Node>,
    version: u64,
    subscribers: Vec<Subscriber>,
}

/// A shared, path-addressed state tree with change notification.
///
/// Cloning a `StateStore` creates a new handle to the **same** tree -
/// both handles see the same values and share subscribers.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 per value-changing write.
/// 2. Writing a value equal to the current one is a no-op (no notify,
///    no version bump).
/// 3. Subscribers are notified in registration order, synchronously,
///    before `set` returns (unless a [`batch::BatchScope`] is active).
/// 4. Dead subscribers (dropped [`StoreSubscription`] guards) are pruned
///    lazily during notification.
pub struct StateStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl Clone for StateStore {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("StateStore")
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                root: AHashMap::new(),
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Read the value at `path`, if a leaf exists there.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Value> {
        let inner = self.inner.borrow();
        let mut segments = path.segments();
        let first = segments.next()?;
        let mut node = inner.root.get(first)?;
        for segment in segments {
            match node {
                Node::Branch(children) => node = children.get(segment)?,
                Node::Leaf(_) => return None,
            }
        }
        match node {
            Node::Leaf(value) => Some(value.clone()),
            Node::Branch(_) => None,
        }
    }

    /// Whether a leaf exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Write `value` at `path`, creating intermediate branches as needed,
    /// then notify matching subscribers.
    ///
    /// Returns `true` if the write changed the stored value. Writing a
    /// value equal to the current one returns `false` without notifying.
    ///
    /// Safe to call re-entrantly from within subscriber callbacks.
    pub fn set(&self, path: &Path, value: Value) -> bool {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            let segments: Vec<&str> = path.segments().collect();
            let (last, intermediate) = match segments.split_last() {
                Some(split) => split,
                // Path validation guarantees at least one segment.
                None => return false,
            };

            let mut children = &mut inner.root;
            for segment in intermediate {
                let entry = children
                    .entry((*segment).to_string())
                    .or_insert_with(|| Node::Branch(AHashMap::new()));
                // A leaf in the middle of the path is overwritten by a branch.
                if matches!(entry, Node::Leaf(_)) {
                    *entry = Node::Branch(AHashMap::new());
                }
                match entry {
                    Node::Branch(next) => children = next,
                    Node::Leaf(_) => unreachable!("leaf replaced by branch above"),
                }
            }

            let changed = match children.get_mut(*last) {
                Some(Node::Leaf(existing)) if *existing == value => false,
                Some(existing) => {
                    *existing = Node::Leaf(value.clone());
                    true
                }
                None => {
                    children.insert((*last).to_string(), Node::Leaf(value.clone()));
                    true
                }
            };
            if changed {
                inner.version += 1;
            }
            changed
        };

        if changed {
            self.notify(path, &value);
        }
        changed
    }

    /// Subscribe to writes at `prefix` or anywhere below it.
    ///
    /// The callback receives the written path and the new value. Returns
    /// an RAII guard; dropping it unsubscribes.
    pub fn subscribe(
        &self,
        prefix: Path,
        callback: impl Fn(&Path, &Value) + 'static,
    ) -> StoreSubscription {
        let strong: CallbackRc = Rc::new(callback);
        self.inner.borrow_mut().subscribers.push(Subscriber {
            prefix,
            callback: Rc::downgrade(&strong),
        });
        StoreSubscription { _guard: strong }
    }

    /// Current version. Increments by 1 per value-changing write; useful
    /// for dirty-checking.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Number of registered subscribers (including dead ones not yet
    /// pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    /// Notify subscribers matching `path`; prune dead entries.
    ///
    /// Callbacks are collected before any is invoked, so a callback may
    /// freely write back into the store.
    fn notify(&self, path: &Path, value: &Value) {
        let callbacks: Vec<CallbackRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|s| s.callback.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter(|s| path.starts_with(&s.prefix))
                .filter_map(|s| s.callback.upgrade())
                .collect()
        };

        if callbacks.is_empty() {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(path = %path, notified = callbacks.len(), "store write");

        for cb in callbacks {
            let key = Rc::as_ptr(&cb) as *const () as usize;
            let path = path.clone();
            let value = value.clone();
            batch::defer_or_run_keyed(key, move || cb(&path, &value));
        }
    }
}

/// RAII guard for a store subscriber.
///
/// Dropping the guard makes the callback unreachable; it is pruned from
/// the subscriber list on the next notification cycle.
pub struct StoreSubscription {
    _guard: CallbackRc,
}

impl fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubscription").finish_non_exhaustive()
    }
}
