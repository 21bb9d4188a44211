#![forbid(unsafe_code)]

//! Two-way binding between input controls and the state store.
//!
//! For every bound field the binder maintains:
//!
//! - **Write path** (control → store): raw changes are validated; valid
//!   values commit through a debounce window for continuous fields and
//!   immediately for discrete ones. Rejected values never reach the
//!   store - the message is shown at the control, and on blur the control
//!   reverts to the last known-valid store value.
//! - **Read path** (store → control): a store subscription pushes
//!   external changes back into the control. A re-entrancy guard
//!   suppresses the write handler while a programmatic update is in
//!   flight, so the two paths cannot feed each other.
//!
//! Commits always use the validator's normalized value; the store never
//! holds an out-of-range value.
//!
//! # Timing
//!
//! The binder owns no timer. Debounce deadlines are recorded as
//! [`Instant`]s and flushed by [`tick`](ControlBinder::tick), which the
//! host calls from its event loop - the same discipline the drag
//! recognizer uses for long-lived thresholds. A pending commit whose
//! module collapses before the deadline is dropped, not committed: no
//! stale write lands after a field becomes inactive.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use ahash::AHashMap;
use tracing::{debug, trace};
use twl_state::{Path, StateStore, StoreSubscription, Value};
use web_time::Instant;

use crate::interactions::InteractionTable;
use crate::module::{FieldKind, FieldSpec, ModuleId, Validator};
use crate::registry::{expanded_path, field_path};
use crate::validate::{ValidationError, ValidationResult};

/// Binder timing configuration.
#[derive(Debug, Clone)]
pub struct BinderConfig {
    /// Quiet period before a continuous field's commit lands
    /// (default: 150 ms).
    pub debounce: Duration,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(150),
        }
    }
}

/// Minimal capability the binder needs from a visual control.
///
/// The binder never touches UI nodes itself; whatever widget toolkit
/// hosts the panel implements this for each control.
pub trait InputAdapter {
    /// The control's current raw value.
    fn raw_value(&self) -> Value;

    /// Push a normalized value into the control's display.
    fn set_value(&mut self, value: &Value);

    /// Show an inline validation message at the control.
    fn show_message(&mut self, message: &str);

    /// Clear any inline validation message.
    fn clear_message(&mut self);
}

struct PendingCommit {
    value: Value,
    deadline: Instant,
}

struct Binding {
    module: ModuleId,
    field: String,
    kind: FieldKind,
    validator: Validator,
    path: Path,
    adapter: Rc<RefCell<dyn InputAdapter>>,
    /// Set while a programmatic control update is in flight.
    guard: Rc<Cell<bool>>,
    invalid: bool,
    pending: Option<PendingCommit>,
    _store_sub: StoreSubscription,
}

/// Binds input controls to state-store paths with validation and
/// debouncing.
pub struct ControlBinder {
    store: StateStore,
    config: BinderConfig,
    interactions: InteractionTable,
    bindings: Vec<Binding>,
    index: AHashMap<(ModuleId, String), usize>,
}

impl fmt::Debug for ControlBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBinder")
            .field("bindings", &self.bindings.len())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ControlBinder {
    /// Create a binder over `store` with the given interaction table.
    #[must_use]
    pub fn new(store: StateStore, config: BinderConfig, interactions: InteractionTable) -> Self {
        Self {
            store,
            config,
            interactions,
            bindings: Vec::new(),
            index: AHashMap::new(),
        }
    }

    /// Bind a control to `(module, field)`. Rebinding the same pair
    /// replaces the previous binding (and drops its subscription).
    pub fn bind(
        &mut self,
        module: &ModuleId,
        spec: &FieldSpec,
        adapter: Rc<RefCell<dyn InputAdapter>>,
    ) {
        let path = field_path(module, &spec.name);
        let guard = Rc::new(Cell::new(false));

        // Read path: external store changes update the control, guarded
        // so the write handler stays quiet.
        let sub_adapter = Rc::clone(&adapter);
        let sub_guard = Rc::clone(&guard);
        let store_sub = self.store.subscribe(path.clone(), move |_, value| {
            sub_guard.set(true);
            sub_adapter.borrow_mut().set_value(value);
            sub_guard.set(false);
        });

        let binding = Binding {
            module: module.clone(),
            field: spec.name.clone(),
            kind: spec.kind,
            validator: Rc::clone(&spec.validator),
            path,
            adapter,
            guard,
            invalid: false,
            pending: None,
            _store_sub: store_sub,
        };

        let key = (module.clone(), spec.name.clone());
        match self.index.get(&key) {
            Some(&idx) => self.bindings[idx] = binding,
            None => {
                self.index.insert(key, self.bindings.len());
                self.bindings.push(binding);
            }
        }
    }

    /// Number of bound fields.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Number of debounced commits currently waiting for their deadline.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.pending.is_some()).count()
    }

    /// Handle a raw change reported by the control behind
    /// `(module, field)`.
    ///
    /// Returns the validation failure, if any, for callers that surface
    /// errors beyond the control itself.
    pub fn raw_changed(
        &mut self,
        module: &ModuleId,
        field: &str,
        now: Instant,
    ) -> Option<ValidationError> {
        let idx = *self.index.get(&(module.clone(), field.to_string()))?;

        let verdict = {
            let binding = &mut self.bindings[idx];
            if binding.guard.get() {
                // Programmatic update in flight; not a user edit.
                return None;
            }
            let raw = binding.adapter.borrow().raw_value();
            (binding.validator)(&raw)
        };

        match verdict {
            ValidationResult::Rejected { message, .. } => {
                let binding = &mut self.bindings[idx];
                binding.invalid = true;
                binding.pending = None;
                binding.adapter.borrow_mut().show_message(&message);
                Some(ValidationError {
                    module: binding.module.clone(),
                    field: binding.field.clone(),
                    message,
                })
            }
            verdict => {
                // Accepted or corrected; the normalized value commits.
                let normalized = match verdict.normalized() {
                    Some(v) => v.clone(),
                    None => return None,
                };
                let kind = {
                    let binding = &mut self.bindings[idx];
                    binding.invalid = false;
                    binding.adapter.borrow_mut().clear_message();
                    binding.kind
                };
                match kind {
                    FieldKind::Discrete => self.commit(idx, normalized),
                    FieldKind::Continuous => {
                        // Latest raw change wins; the deadline restarts.
                        self.bindings[idx].pending = Some(PendingCommit {
                            value: normalized,
                            deadline: now + self.config.debounce,
                        });
                    }
                }
                None
            }
        }
    }

    /// Handle the control behind `(module, field)` losing focus.
    ///
    /// If the control still shows a rejected value, it reverts to the
    /// last known-valid store value (or stays untouched if the store has
    /// none yet).
    pub fn blurred(&mut self, module: &ModuleId, field: &str) {
        let Some(&idx) = self.index.get(&(module.clone(), field.to_string())) else {
            return;
        };
        let binding = &mut self.bindings[idx];
        if !binding.invalid {
            return;
        }
        binding.invalid = false;
        if let Some(value) = self.store.get(&binding.path) {
            binding.guard.set(true);
            binding.adapter.borrow_mut().set_value(&value);
            binding.guard.set(false);
        }
        binding.adapter.borrow_mut().clear_message();
        debug!(module = %binding.module, field = %binding.field, "reverted invalid control on blur");
    }

    /// Flush debounce deadlines that have elapsed by `now`.
    ///
    /// Pending commits whose module has collapsed are dropped.
    pub fn tick(&mut self, now: Instant) {
        let mut due: Vec<(usize, Value)> = Vec::new();
        for (idx, binding) in self.bindings.iter_mut().enumerate() {
            let elapsed = binding
                .pending
                .as_ref()
                .is_some_and(|p| p.deadline <= now);
            if !elapsed {
                continue;
            }
            let pending = match binding.pending.take() {
                Some(p) => p,
                None => continue,
            };
            let still_active = self
                .store
                .get(&expanded_path(&binding.module))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if still_active {
                due.push((idx, pending.value));
            } else {
                trace!(
                    module = %binding.module,
                    field = %binding.field,
                    "dropped debounced commit for collapsed module"
                );
            }
        }
        for (idx, value) in due {
            self.commit(idx, value);
        }
    }

    /// Commit a normalized value for the binding at `idx` and run any
    /// cross-module rules it triggers.
    fn commit(&mut self, idx: usize, value: Value) {
        let (path, module, field) = {
            let binding = &self.bindings[idx];
            (
                binding.path.clone(),
                binding.module.clone(),
                binding.field.clone(),
            )
        };
        let changed = self.store.set(&path, value.clone());
        trace!(path = %path, changed, "field commit");
        if changed {
            self.interactions.dispatch(&self.store, &module, &field, &value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validators;

    /// Test stand-in for a visual control.
    struct SimControl {
        raw: Value,
        displayed: Option<Value>,
        message: Option<String>,
    }

    impl SimControl {
        fn new(raw: Value) -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                raw,
                displayed: None,
                message: None,
            }))
        }
    }

    impl InputAdapter for SimControl {
        fn raw_value(&self) -> Value {
            self.raw.clone()
        }
        fn set_value(&mut self, value: &Value) {
            self.displayed = Some(value.clone());
            self.raw = value.clone();
        }
        fn show_message(&mut self, message: &str) {
            self.message = Some(message.to_string());
        }
        fn clear_message(&mut self) {
            self.message = None;
        }
    }

    struct Fixture {
        store: StateStore,
        binder: ControlBinder,
        module: ModuleId,
        control: Rc<RefCell<SimControl>>,
        epoch: Instant,
    }

    fn fixture(kind: FieldKind) -> Fixture {
        let store = StateStore::new();
        let module = ModuleId::new("edo");
        store.set(&expanded_path(&module), Value::Bool(true));
        let spec = FieldSpec::new("divisions", kind, Value::Int(12), validators::int_range(1, 270));
        store.set(&field_path(&module, "divisions"), Value::Int(12));

        let control = SimControl::new(Value::Int(12));
        let mut binder =
            ControlBinder::new(store.clone(), BinderConfig::default(), InteractionTable::new());
        binder.bind(&module, &spec, control.clone());
        Fixture {
            store,
            binder,
            module,
            control,
            epoch: Instant::now(),
        }
    }

    fn divisions_path(module: &ModuleId) -> Path {
        field_path(module, "divisions")
    }

    #[test]
    fn discrete_commit_is_immediate() {
        let mut fx = fixture(FieldKind::Discrete);
        fx.control.borrow_mut().raw = Value::Int(19);
        fx.binder.raw_changed(&fx.module, "divisions", fx.epoch);
        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(19))
        );
    }

    #[test]
    fn continuous_commit_waits_for_debounce() {
        let mut fx = fixture(FieldKind::Continuous);
        fx.control.borrow_mut().raw = Value::Int(19);
        fx.binder.raw_changed(&fx.module, "divisions", fx.epoch);

        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(12)),
            "no write before the window elapses"
        );
        assert_eq!(fx.binder.pending_count(), 1);

        fx.binder.tick(fx.epoch + Duration::from_millis(149));
        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(12))
        );

        fx.binder.tick(fx.epoch + Duration::from_millis(150));
        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(19))
        );
        assert_eq!(fx.binder.pending_count(), 0);
    }

    #[test]
    fn rapid_changes_coalesce_to_last_value() {
        let mut fx = fixture(FieldKind::Continuous);
        let writes = Rc::new(Cell::new(0u32));
        let w = Rc::clone(&writes);
        let _sub = fx
            .store
            .subscribe(divisions_path(&fx.module), move |_, _| w.set(w.get() + 1));

        for (ms, value) in [(0u64, 13), (30, 17), (60, 22)] {
            fx.control.borrow_mut().raw = Value::Int(value);
            fx.binder
                .raw_changed(&fx.module, "divisions", fx.epoch + Duration::from_millis(ms));
        }

        fx.binder.tick(fx.epoch + Duration::from_millis(300));
        assert_eq!(writes.get(), 1, "exactly one store write");
        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(22)),
            "the last change wins"
        );
    }

    #[test]
    fn corrected_value_commits_normalized() {
        let mut fx = fixture(FieldKind::Discrete);
        fx.control.borrow_mut().raw = Value::Int(4000);
        fx.binder.raw_changed(&fx.module, "divisions", fx.epoch);
        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(270)),
            "store receives the clamped value, never the raw one"
        );
        // The read path echoed the normalized value into the control.
        assert_eq!(fx.control.borrow().displayed, Some(Value::Int(270)));
    }

    #[test]
    fn rejected_value_blocks_commit_and_shows_message() {
        let mut fx = fixture(FieldKind::Discrete);
        fx.control.borrow_mut().raw = Value::Str("twelve".into());
        let err = fx.binder.raw_changed(&fx.module, "divisions", fx.epoch);
        assert!(err.is_some());
        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(12)),
            "store untouched"
        );
        assert!(fx.control.borrow().message.is_some());
    }

    #[test]
    fn blur_reverts_invalid_control() {
        let mut fx = fixture(FieldKind::Discrete);
        fx.control.borrow_mut().raw = Value::Str("twelve".into());
        fx.binder.raw_changed(&fx.module, "divisions", fx.epoch);

        fx.binder.blurred(&fx.module, "divisions");
        assert_eq!(fx.control.borrow().displayed, Some(Value::Int(12)));
        assert!(fx.control.borrow().message.is_none());
    }

    #[test]
    fn external_change_updates_control_without_write_loop() {
        let fx = fixture(FieldKind::Continuous);
        fx.store
            .set(&divisions_path(&fx.module), Value::Int(31));
        assert_eq!(fx.control.borrow().displayed, Some(Value::Int(31)));
        // The programmatic update must not have armed a debounce.
        assert_eq!(fx.binder.pending_count(), 0);
    }

    #[test]
    fn collapse_cancels_pending_commit() {
        let mut fx = fixture(FieldKind::Continuous);
        fx.control.borrow_mut().raw = Value::Int(19);
        fx.binder.raw_changed(&fx.module, "divisions", fx.epoch);
        assert_eq!(fx.binder.pending_count(), 1);

        fx.store.set(&expanded_path(&fx.module), Value::Bool(false));
        fx.binder.tick(fx.epoch + Duration::from_millis(200));

        assert_eq!(
            fx.store.get(&divisions_path(&fx.module)),
            Some(Value::Int(12)),
            "no stale write after collapse"
        );
        assert_eq!(fx.binder.pending_count(), 0);
    }

    #[test]
    fn commit_triggers_interactions() {
        let store = StateStore::new();
        let edo = ModuleId::new("edo");
        let ji = ModuleId::new("ji");
        store.set(&expanded_path(&edo), Value::Bool(true));
        store.set(&expanded_path(&ji), Value::Bool(false));

        let mut table = InteractionTable::new();
        let ji2 = ji.clone();
        table.register(edo.clone(), "active", move |ctx, value| {
            if value.as_bool() == Some(true) {
                ctx.set_expanded(&ji2, true);
            }
        });

        let spec = FieldSpec::new(
            "active",
            FieldKind::Discrete,
            Value::Bool(false),
            validators::boolean(),
        );
        let control = SimControl::new(Value::Bool(true));
        let mut binder = ControlBinder::new(store.clone(), BinderConfig::default(), table);
        binder.bind(&edo, &spec, control);

        binder.raw_changed(&edo, "active", Instant::now());
        assert_eq!(store.get(&expanded_path(&ji)), Some(Value::Bool(true)));
    }
}
