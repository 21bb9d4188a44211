#![forbid(unsafe_code)]

//! Cross-module interaction rules.
//!
//! Some field commits have knock-on effects in other modules: enabling a
//! module's "active" flag auto-expands it, changing a tuning period
//! rescales a sibling's generator. Rules are registered per
//! `(module, field)` and run after a successful commit.
//!
//! A rule's own writes go through [`InteractionCtx`], which re-dispatches
//! rules for the paths it touches. That cascade is depth-bounded: a rule
//! chain (including cycles in a misconfigured table) stops at the cap
//! instead of looping, with a warning naming the truncated link.
//!
//! # Invariants
//!
//! 1. Rules run only after a value-changing commit; writes that leave the
//!    store unchanged trigger nothing.
//! 2. The cascade depth counts `set_field` hops, so a cap of 5 allows at
//!    most 5 rule-initiated writes per originating commit.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::warn;
use twl_state::{StateStore, Value};

use crate::module::ModuleId;
use crate::registry::{expanded_path, field_path};

/// Default cascade depth cap.
pub const DEFAULT_DEPTH_CAP: u8 = 5;

/// A side-effect capability invoked after a successful commit.
pub type InteractionFn = Rc<dyn Fn(&InteractionCtx<'_>, &Value)>;

/// Context handed to a rule; all writes must go through it so cascades
/// stay visible to the table.
pub struct InteractionCtx<'a> {
    store: &'a StateStore,
    table: &'a InteractionTable,
    depth: u8,
}

impl InteractionCtx<'_> {
    /// The backing store, for reads.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        self.store
    }

    /// Current cascade depth (0 for rules fired by the original commit).
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Write another module's field, cascading that module's own rules.
    ///
    /// Past the depth cap the write is dropped and a warning logged.
    pub fn set_field(&self, module: &ModuleId, field: &str, value: Value) {
        if self.depth >= self.table.depth_cap {
            warn!(
                module = %module,
                field,
                cap = self.table.depth_cap,
                "interaction cascade truncated at depth cap"
            );
            return;
        }
        if self.store.set(&field_path(module, field), value.clone()) {
            self.table
                .dispatch_at(self.store, module, field, &value, self.depth + 1);
        }
    }

    /// Expand or collapse a module. Expansion state has no rules of its
    /// own, so this never deepens the cascade.
    pub fn set_expanded(&self, module: &ModuleId, expanded: bool) {
        self.store.set(&expanded_path(module), Value::Bool(expanded));
    }
}

/// Registrable table of cross-module interaction rules.
pub struct InteractionTable {
    rules: AHashMap<(ModuleId, String), Vec<InteractionFn>>,
    depth_cap: u8,
}

impl Default for InteractionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InteractionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionTable")
            .field("rules", &self.rules.len())
            .field("depth_cap", &self.depth_cap)
            .finish()
    }
}

impl InteractionTable {
    /// Empty table with the default depth cap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: AHashMap::new(),
            depth_cap: DEFAULT_DEPTH_CAP,
        }
    }

    /// Override the cascade depth cap.
    #[must_use]
    pub fn with_depth_cap(mut self, cap: u8) -> Self {
        self.depth_cap = cap;
        self
    }

    /// Register a rule for commits to `(module, field)`.
    pub fn register(
        &mut self,
        module: ModuleId,
        field: impl Into<String>,
        rule: impl Fn(&InteractionCtx<'_>, &Value) + 'static,
    ) {
        self.rules
            .entry((module, field.into()))
            .or_default()
            .push(Rc::new(rule));
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run the rules for a committed write to `(module, field)`.
    pub fn dispatch(&self, store: &StateStore, module: &ModuleId, field: &str, value: &Value) {
        self.dispatch_at(store, module, field, value, 0);
    }

    fn dispatch_at(
        &self,
        store: &StateStore,
        module: &ModuleId,
        field: &str,
        value: &Value,
        depth: u8,
    ) {
        let key = (module.clone(), field.to_string());
        let Some(rules) = self.rules.get(&key) else {
            return;
        };
        let ctx = InteractionCtx {
            store,
            table: self,
            depth,
        };
        for rule in rules {
            rule(&ctx, value);
        }
    }
}
