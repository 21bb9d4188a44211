#![forbid(unsafe_code)]

//! The module registry: ordered registration and permutation-safe reorder.
//!
//! The registry owns the module descriptors and the authoritative order.
//! The order doubles as the sidebar sequence and the layer stacking
//! sequence, and is mirrored into the state store at `module_order` so
//! subscribers (the render coordinator, external styling) observe order
//! changes like any other state change.
//!
//! # Invariants
//!
//! 1. `module_order` is always a permutation of exactly the registered
//!    ids: no duplicates, no omissions.
//! 2. A rejected [`reorder`](ModuleRegistry::reorder) leaves the previous
//!    order untouched - there is no partial application.
//! 3. `modules.<id>.*` paths exist in the store only for registered ids
//!    (the registry is the only writer that creates them).

use std::fmt;

use ahash::{AHashMap, AHashSet};
use tracing::warn;
use twl_state::{BatchScope, Path, StateStore, Value};

use crate::module::{FieldValues, ModuleDescriptor, ModuleId};

/// Store path holding the module order.
#[must_use]
pub fn order_path() -> Path {
    // The literal is well-formed; construction cannot fail.
    Path::new("module_order").expect("static path")
}

/// Store path of a module's subtree.
#[must_use]
pub fn module_path(id: &ModuleId) -> Path {
    Path::new("modules").expect("static path").join(id.as_str())
}

/// Store path of a module's expand/collapse flag.
#[must_use]
pub fn expanded_path(id: &ModuleId) -> Path {
    module_path(id).join("expanded")
}

/// Store path of one module field.
#[must_use]
pub fn field_path(id: &ModuleId, field: &str) -> Path {
    module_path(id).join(field)
}

/// How a proposed order fails to be a permutation of the registered ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderViolation {
    /// Wrong number of entries.
    LengthMismatch {
        /// Registered module count.
        expected: usize,
        /// Entries in the proposed order.
        got: usize,
    },
    /// An entry names no registered module.
    UnknownId(ModuleId),
    /// An id appears more than once.
    DuplicateEntry(ModuleId),
}

impl fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, got } => {
                write!(f, "expected {} entries, got {}", expected, got)
            }
            Self::UnknownId(id) => write!(f, "unknown module '{}'", id),
            Self::DuplicateEntry(id) => write!(f, "module '{}' listed twice", id),
        }
    }
}

/// Errors from registry operations. Fatal to the offending call, never to
/// the system; the prior state is preserved unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A module with this id is already registered.
    DuplicateId(ModuleId),
    /// The proposed order is not a permutation of the registered ids.
    InvalidOrder(OrderViolation),
    /// The named module is not registered.
    UnknownModule(ModuleId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "duplicate module id '{}'", id),
            Self::InvalidOrder(violation) => write!(f, "invalid module order: {}", violation),
            Self::UnknownModule(id) => write!(f, "no module registered as '{}'", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Ordered collection of module descriptors backed by the state store.
pub struct ModuleRegistry<L> {
    store: StateStore,
    modules: AHashMap<ModuleId, ModuleDescriptor<L>>,
    order: Vec<ModuleId>,
}

impl<L> fmt::Debug for ModuleRegistry<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl<L> ModuleRegistry<L> {
    /// Create an empty registry writing into `store`.
    #[must_use]
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            modules: AHashMap::new(),
            order: Vec::new(),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Register a module, appending it to the order and seeding its
    /// `expanded` flag and field defaults into the store.
    pub fn register(&mut self, descriptor: ModuleDescriptor<L>) -> Result<(), RegistryError> {
        let id = descriptor.id.clone();
        if self.modules.contains_key(&id) {
            warn!(module = %id, "rejected duplicate registration");
            return Err(RegistryError::DuplicateId(id));
        }

        // Seed the subtree and the new order in one notification batch.
        let _batch = BatchScope::new();
        self.store
            .set(&expanded_path(&id), Value::Bool(descriptor.expanded));
        for field in &descriptor.fields {
            self.store
                .set(&field_path(&id, &field.name), field.default.clone());
        }

        self.order.push(id.clone());
        self.modules.insert(id, descriptor);
        self.write_order();
        Ok(())
    }

    /// Look up a descriptor by id.
    #[must_use]
    pub fn get(&self, id: &ModuleId) -> Option<&ModuleDescriptor<L>> {
        self.modules.get(id)
    }

    /// Whether a module is registered.
    #[must_use]
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no modules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The current order.
    #[must_use]
    pub fn order(&self) -> &[ModuleId] {
        &self.order
    }

    /// Descriptors in current order.
    pub fn ordered(&self) -> impl Iterator<Item = &ModuleDescriptor<L>> {
        self.order.iter().filter_map(|id| self.modules.get(id))
    }

    /// Replace the order with `new_order`, which must be a permutation of
    /// the registered ids. The store's `module_order` is updated in a
    /// single write - the one atomic commit point for reordering.
    ///
    /// On rejection the previous order remains in effect, both here and
    /// in the store.
    pub fn reorder(&mut self, new_order: Vec<ModuleId>) -> Result<&[ModuleId], RegistryError> {
        if let Err(violation) = self.validate_order(&new_order) {
            warn!(%violation, "rejected reorder");
            return Err(RegistryError::InvalidOrder(violation));
        }
        self.order = new_order;
        self.write_order();
        Ok(&self.order)
    }

    /// Set a module's expand/collapse flag.
    pub fn set_expanded(&self, id: &ModuleId, expanded: bool) -> Result<(), RegistryError> {
        if !self.modules.contains_key(id) {
            return Err(RegistryError::UnknownModule(id.clone()));
        }
        self.store.set(&expanded_path(id), Value::Bool(expanded));
        Ok(())
    }

    /// Flip a module's expand/collapse flag; returns the new state.
    pub fn toggle_expanded(&self, id: &ModuleId) -> Result<bool, RegistryError> {
        let next = !self.is_expanded(id);
        self.set_expanded(id, next)?;
        Ok(next)
    }

    /// Whether a module is currently expanded (collapsed if unknown).
    #[must_use]
    pub fn is_expanded(&self, id: &ModuleId) -> bool {
        self.store
            .get(&expanded_path(id))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Snapshot a module's current field values from the store, falling
    /// back to each field's default where the store has no leaf.
    #[must_use]
    pub fn field_values(&self, id: &ModuleId) -> FieldValues {
        let mut values = FieldValues::new();
        if let Some(descriptor) = self.modules.get(id) {
            for field in &descriptor.fields {
                let value = self
                    .store
                    .get(&field_path(id, &field.name))
                    .unwrap_or_else(|| field.default.clone());
                values.insert(field.name.clone(), value);
            }
        }
        values
    }

    fn validate_order(&self, candidate: &[ModuleId]) -> Result<(), OrderViolation> {
        if candidate.len() != self.order.len() {
            return Err(OrderViolation::LengthMismatch {
                expected: self.order.len(),
                got: candidate.len(),
            });
        }
        let mut seen = AHashSet::with_capacity(candidate.len());
        for id in candidate {
            if !self.modules.contains_key(id) {
                return Err(OrderViolation::UnknownId(id.clone()));
            }
            if !seen.insert(id.clone()) {
                return Err(OrderViolation::DuplicateEntry(id.clone()));
            }
        }
        Ok(())
    }

    fn write_order(&self) {
        let list = Value::List(
            self.order
                .iter()
                .map(|id| Value::Str(id.as_str().to_string()))
                .collect(),
        );
        self.store.set(&order_path(), list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FieldKind, FieldSpec};
    use crate::validate::validators;

    fn descriptor(id: &str) -> ModuleDescriptor<u32> {
        ModuleDescriptor::new(ModuleId::new(id), id.to_uppercase(), |_, _| Ok(0)).with_field(
            FieldSpec::new(
                "value",
                FieldKind::Continuous,
                Value::Int(1),
                validators::int_range(0, 100),
            ),
        )
    }

    fn registry_with(ids: &[&str]) -> ModuleRegistry<u32> {
        let mut registry = ModuleRegistry::new(StateStore::new());
        for id in ids {
            registry.register(descriptor(id)).unwrap();
        }
        registry
    }

    #[test]
    fn register_appends_and_seeds_store() {
        let registry = registry_with(&["edo", "ji"]);
        assert_eq!(
            registry.order(),
            &[ModuleId::new("edo"), ModuleId::new("ji")]
        );
        assert!(registry.is_expanded(&ModuleId::new("edo")));
        assert_eq!(
            registry.store().get(&field_path(&ModuleId::new("ji"), "value")),
            Some(Value::Int(1))
        );
        assert_eq!(
            registry.store().get(&order_path()),
            Some(Value::List(vec![
                Value::Str("edo".into()),
                Value::Str("ji".into())
            ]))
        );
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = registry_with(&["edo"]);
        let err = registry.register(descriptor("edo")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId(ModuleId::new("edo")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reorder_accepts_permutation() {
        let mut registry = registry_with(&["a", "b", "c"]);
        let new_order = vec![ModuleId::new("c"), ModuleId::new("a"), ModuleId::new("b")];
        registry.reorder(new_order.clone()).unwrap();
        assert_eq!(registry.order(), new_order.as_slice());
        assert_eq!(
            registry.store().get(&order_path()),
            Some(Value::List(vec![
                Value::Str("c".into()),
                Value::Str("a".into()),
                Value::Str("b".into())
            ]))
        );
    }

    #[test]
    fn reorder_rejects_and_preserves_previous_order() {
        let mut registry = registry_with(&["a", "b", "c"]);
        let before = registry.order().to_vec();
        let before_store = registry.store().get(&order_path());

        // Too short.
        let err = registry
            .reorder(vec![ModuleId::new("a"), ModuleId::new("b")])
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidOrder(OrderViolation::LengthMismatch { expected: 3, got: 2 })
        ));

        // Unknown id.
        let err = registry
            .reorder(vec![
                ModuleId::new("a"),
                ModuleId::new("b"),
                ModuleId::new("zz"),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidOrder(OrderViolation::UnknownId(_))
        ));

        // Duplicate entry.
        let err = registry
            .reorder(vec![
                ModuleId::new("a"),
                ModuleId::new("b"),
                ModuleId::new("b"),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidOrder(OrderViolation::DuplicateEntry(_))
        ));

        assert_eq!(registry.order(), before.as_slice());
        assert_eq!(registry.store().get(&order_path()), before_store);
    }

    #[test]
    fn expand_collapse_roundtrip() {
        let registry = registry_with(&["edo"]);
        let id = ModuleId::new("edo");
        assert!(registry.is_expanded(&id));
        registry.set_expanded(&id, false).unwrap();
        assert!(!registry.is_expanded(&id));
        assert_eq!(registry.toggle_expanded(&id).unwrap(), true);
        assert!(registry
            .set_expanded(&ModuleId::new("nope"), true)
            .is_err());
    }

    #[test]
    fn field_values_fall_back_to_defaults() {
        let registry = registry_with(&["edo"]);
        let id = ModuleId::new("edo");
        assert_eq!(registry.field_values(&id).int("value"), Some(1));

        registry
            .store()
            .set(&field_path(&id, "value"), Value::Int(42));
        assert_eq!(registry.field_values(&id).int("value"), Some(42));
    }

    #[test]
    fn registration_batch_coalesces_notifications() {
        let store = StateStore::new();
        let hits = std::rc::Rc::new(std::cell::Cell::new(0u32));
        let h = std::rc::Rc::clone(&hits);
        let _sub = store.subscribe(Path::new("modules").unwrap(), move |_, _| {
            h.set(h.get() + 1);
        });

        let mut registry: ModuleRegistry<u32> = ModuleRegistry::new(store);
        registry.register(descriptor("edo")).unwrap();
        // One expanded write + one field write, coalesced per subscriber.
        assert_eq!(hits.get(), 1);
    }
}
