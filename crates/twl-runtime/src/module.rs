#![forbid(unsafe_code)]

//! Module descriptors: identity, fields, and the render capability.
//!
//! A module pairs one sidebar panel with one diagram layer. The runtime
//! treats both the panel's controls and the layer's contents as opaque:
//! controls are reached through adapter capabilities (see
//! [`binder`](crate::binder)), and the layer is whatever type `L` the
//! module's render routine produces.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use twl_state::Value;

use crate::validate::ValidationResult;

/// Stable module identifier.
///
/// Unique within a registry, immutable after registration, and used as a
/// state-path segment (`modules.<id>.…`), so it may not contain dots.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModuleId(Rc<str>);

impl ModuleId {
    /// Create an id. The string must be non-empty and dot-free (it
    /// becomes a state-path segment); checked in debug builds.
    #[must_use]
    pub fn new(id: &str) -> Self {
        debug_assert!(!id.is_empty() && !id.contains('.'));
        Self(Rc::from(id))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

/// A module's identifying accent color. Opaque to the runtime; passed
/// through to whatever renders the panel chrome and the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccentColor {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl AccentColor {
    /// Create a color from 8-bit channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Layout dimensions shared by every module's render routine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharedDimensions {
    /// Drawing surface width.
    pub width: f32,
    /// Drawing surface height.
    pub height: f32,
}

impl SharedDimensions {
    /// Create dimensions.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Surface center.
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }

    /// Radius of the largest centered circle that fits the surface.
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.width.min(self.height) / 2.0
    }

    /// Whether the surface can be drawn on at all.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// A snapshot of one module's field values, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct FieldValues {
    values: AHashMap<String, Value>,
}

impl FieldValues {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look up a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Integer field shortcut.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Float field shortcut (integers coerce).
    #[must_use]
    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_float)
    }

    /// Boolean field shortcut.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// String field shortcut.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Number of fields in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Failure reported by a module's render routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerError {
    message: String,
}

impl LayerError {
    /// Create a render failure with a human-readable reason.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LayerError {}

/// A field validator capability: raw value in, verdict out.
pub type Validator = Rc<dyn Fn(&Value) -> ValidationResult>;

/// Commit behavior of a field's control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Continuous input (numeric stepper, slider): commits are debounced.
    Continuous,
    /// Discrete input (checkbox, select): commits land immediately.
    Discrete,
}

/// One typed field of a module.
pub struct FieldSpec {
    /// Field name; becomes the last state-path segment
    /// (`modules.<id>.<name>`), so it may not contain dots.
    pub name: String,
    /// Commit behavior.
    pub kind: FieldKind,
    /// Initial value, seeded into the store at registration.
    pub default: Value,
    /// Validator run on every raw change.
    pub validator: Validator,
}

impl FieldSpec {
    /// Create a field spec. Stock validators live in
    /// [`validators`](crate::validate::validators); custom ones are any
    /// `Rc`-wrapped closure.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind, default: Value, validator: Validator) -> Self {
        let name = name.into();
        debug_assert!(!name.is_empty() && !name.contains('.'));
        Self {
            name,
            kind,
            default,
            validator,
        }
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

/// The render capability a module supplies: shared dimensions plus the
/// module's current field values in, one layer out.
pub type RenderFn<L> = Box<dyn Fn(&SharedDimensions, &FieldValues) -> Result<L, LayerError>>;

/// One configuration panel paired with one diagram layer.
pub struct ModuleDescriptor<L> {
    /// Stable identifier.
    pub id: ModuleId,
    /// Display label for the panel header.
    pub title: String,
    /// Identifying accent, passed through to rendering.
    pub color: AccentColor,
    /// Initial expand state.
    pub expanded: bool,
    /// The module's typed fields.
    pub fields: Vec<FieldSpec>,
    /// The module's render routine.
    pub render: RenderFn<L>,
}

impl<L> ModuleDescriptor<L> {
    /// Create a descriptor with the mandatory parts; defaults to expanded
    /// with no fields and a neutral accent.
    #[must_use]
    pub fn new(
        id: ModuleId,
        title: impl Into<String>,
        render: impl Fn(&SharedDimensions, &FieldValues) -> Result<L, LayerError> + 'static,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            color: AccentColor::default(),
            expanded: true,
            fields: Vec::new(),
            render: Box::new(render),
        }
    }

    /// Set the accent color.
    #[must_use]
    pub fn with_color(mut self, color: AccentColor) -> Self {
        self.color = color;
        self
    }

    /// Start collapsed instead of expanded.
    #[must_use]
    pub fn collapsed(mut self) -> Self {
        self.expanded = false;
        self
    }

    /// Add a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field spec by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl<L> fmt::Debug for ModuleDescriptor<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("expanded", &self.expanded)
            .field("fields", &self.fields.len())
            .finish_non_exhaustive()
    }
}
