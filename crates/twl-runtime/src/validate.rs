#![forbid(unsafe_code)]

//! Field validation: verdicts and stock validators.
//!
//! A validator inspects a raw value and either accepts it unchanged,
//! corrects it (clamping is still a *valid* outcome - the store receives
//! the corrected value), or rejects it with a human-readable reason and a
//! suggested fallback.
//!
//! # Invariants
//!
//! 1. Validation is idempotent: feeding an accepted or corrected value
//!    back through the same validator yields `Accepted` with the value
//!    unchanged.
//! 2. A `Rejected` verdict never reaches the store; the binder blocks the
//!    commit and surfaces the message at the control.

use std::fmt;

use twl_state::Value;

use crate::module::{ModuleId, Validator};

/// Verdict of running a field validator against a raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// The raw value is valid as-is.
    Accepted(Value),
    /// The raw value was out of range but correctable; `normalized` is
    /// what the store should receive. Still a valid outcome.
    Corrected {
        /// The corrected value.
        normalized: Value,
    },
    /// The raw value cannot be used.
    Rejected {
        /// Human-readable reason, shown at the control.
        message: String,
        /// A value the control may offer as a replacement.
        fallback: Value,
    },
}

impl ValidationResult {
    /// Whether the verdict permits a commit.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// The value a commit should use, if the verdict permits one.
    #[must_use]
    pub fn normalized(&self) -> Option<&Value> {
        match self {
            Self::Accepted(v) => Some(v),
            Self::Corrected { normalized } => Some(normalized),
            Self::Rejected { .. } => None,
        }
    }

    /// The rejection message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Rejected { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// A field-scoped validation failure. Non-fatal: it blocks one commit and
/// is surfaced inline at the offending control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The module owning the field.
    pub module: ModuleId,
    /// The field name.
    pub field: String,
    /// Why the value was rejected.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.module, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Stock validators for the common field shapes.
pub mod validators {
    use super::*;
    use std::rc::Rc;

    /// Integer field clamped to `min..=max`. Non-integers are rejected
    /// with `min` as the suggested fallback.
    #[must_use]
    pub fn int_range(min: i64, max: i64) -> Validator {
        Rc::new(move |raw: &Value| match raw.as_int() {
            Some(i) if i < min || i > max => ValidationResult::Corrected {
                normalized: Value::Int(i.clamp(min, max)),
            },
            Some(i) => ValidationResult::Accepted(Value::Int(i)),
            None => ValidationResult::Rejected {
                message: format!("expected an integer in {}..={}, got {}", min, max, raw.type_name()),
                fallback: Value::Int(min),
            },
        })
    }

    /// Float field clamped to `min..=max`. Integers coerce; NaN and
    /// non-numbers are rejected with `min` as the suggested fallback.
    #[must_use]
    pub fn float_range(min: f64, max: f64) -> Validator {
        Rc::new(move |raw: &Value| match raw.as_float() {
            Some(x) if x.is_nan() => ValidationResult::Rejected {
                message: "expected a number, got NaN".to_string(),
                fallback: Value::Float(min),
            },
            Some(x) if x < min || x > max => ValidationResult::Corrected {
                normalized: Value::Float(x.clamp(min, max)),
            },
            Some(x) => ValidationResult::Accepted(Value::Float(x)),
            None => ValidationResult::Rejected {
                message: format!("expected a number in {}..={}, got {}", min, max, raw.type_name()),
                fallback: Value::Float(min),
            },
        })
    }

    /// String field restricted to a fixed option set (selects). Anything
    /// else is rejected with the given fallback option.
    #[must_use]
    pub fn one_of(options: &'static [&'static str], fallback: &'static str) -> Validator {
        Rc::new(move |raw: &Value| match raw.as_str() {
            Some(s) if options.contains(&s) => ValidationResult::Accepted(raw.clone()),
            _ => ValidationResult::Rejected {
                message: format!("expected one of {:?}", options),
                fallback: Value::Str(fallback.to_string()),
            },
        })
    }

    /// Boolean field (checkboxes). Non-booleans are rejected with `false`
    /// as the suggested fallback.
    #[must_use]
    pub fn boolean() -> Validator {
        Rc::new(|raw: &Value| match raw {
            Value::Bool(_) => ValidationResult::Accepted(raw.clone()),
            _ => ValidationResult::Rejected {
                message: format!("expected a flag, got {}", raw.type_name()),
                fallback: Value::Bool(false),
            },
        })
    }
}
