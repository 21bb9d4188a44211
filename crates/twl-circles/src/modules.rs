#![forbid(unsafe_code)]

//! The three demo modules: EDO, JI, and MOS circles.
//!
//! Each carries an `active` flag (discrete, drives expansion through the
//! interaction table), plus its own tuning fields. Validators exercise
//! all three verdicts: in-range values pass, out-of-range numbers clamp,
//! and malformed input is rejected with a fallback.

use twl_runtime::{
    AccentColor, FieldKind, FieldSpec, InteractionTable, LayerError, ModuleDescriptor, ModuleId,
    validators,
};
use twl_state::Value;

use crate::layers::{CircleLayer, CirclePoint};

/// Odd-limit ratio tables for the JI ring, in `(numerator, denominator)`
/// pairs per octave.
fn ji_ratios(limit: &str) -> Option<&'static [(u32, u32)]> {
    match limit {
        "3" => Some(&[(1, 1), (4, 3), (3, 2)]),
        "5" => Some(&[(1, 1), (6, 5), (5, 4), (4, 3), (3, 2), (8, 5), (5, 3)]),
        "7" => Some(&[
            (1, 1),
            (8, 7),
            (7, 6),
            (6, 5),
            (5, 4),
            (4, 3),
            (7, 5),
            (3, 2),
            (8, 5),
            (5, 3),
            (7, 4),
        ]),
        "9" => Some(&[
            (1, 1),
            (9, 8),
            (8, 7),
            (7, 6),
            (6, 5),
            (5, 4),
            (9, 7),
            (4, 3),
            (7, 5),
            (3, 2),
            (14, 9),
            (8, 5),
            (5, 3),
            (12, 7),
            (7, 4),
            (16, 9),
        ]),
        _ => None,
    }
}

/// Angle of a frequency ratio on the octave circle, in turns.
fn ratio_turns(num: u32, den: u32) -> f32 {
    (num as f32 / den as f32).log2().rem_euclid(1.0)
}

/// Equal divisions of the octave: `divisions` evenly spaced marks.
#[must_use]
pub fn edo_module() -> ModuleDescriptor<CircleLayer> {
    let color = AccentColor::new(226, 106, 44);
    ModuleDescriptor::new(ModuleId::new("edo"), "Equal Divisions", move |_, values| {
        let divisions = values.int("divisions").unwrap_or(12);
        if divisions < 1 {
            return Err(LayerError::new("division count must be positive"));
        }
        let points = (0..divisions)
            .map(|i| CirclePoint::new(i as f32 / divisions as f32, i.to_string()))
            .collect();
        Ok(CircleLayer::new("Equal Divisions", color, points))
    })
    .with_color(color)
    .with_field(FieldSpec::new(
        "active",
        FieldKind::Discrete,
        Value::Bool(true),
        validators::boolean(),
    ))
    .with_field(FieldSpec::new(
        "divisions",
        FieldKind::Continuous,
        Value::Int(12),
        validators::int_range(1, 270),
    ))
}

/// Just intonation: every ratio within the selected odd limit.
#[must_use]
pub fn ji_module() -> ModuleDescriptor<CircleLayer> {
    let color = AccentColor::new(58, 134, 162);
    ModuleDescriptor::new(ModuleId::new("ji"), "Just Intonation", move |_, values| {
        let limit = values.str("limit").unwrap_or("5");
        let ratios = ji_ratios(limit)
            .ok_or_else(|| LayerError::new(format!("unsupported odd limit '{}'", limit)))?;
        let points = ratios
            .iter()
            .map(|&(num, den)| {
                CirclePoint::new(ratio_turns(num, den), format!("{}/{}", num, den))
            })
            .collect();
        Ok(CircleLayer::new("Just Intonation", color, points))
    })
    .with_color(color)
    .with_field(FieldSpec::new(
        "active",
        FieldKind::Discrete,
        Value::Bool(true),
        validators::boolean(),
    ))
    .with_field(FieldSpec::new(
        "limit",
        FieldKind::Discrete,
        Value::Str("5".to_string()),
        validators::one_of(&["3", "5", "7", "9"], "5"),
    ))
}

/// Moment of symmetry: `steps` stacked generators, reduced to the circle.
#[must_use]
pub fn mos_module() -> ModuleDescriptor<CircleLayer> {
    let color = AccentColor::new(114, 168, 86);
    ModuleDescriptor::new(ModuleId::new("mos"), "Moment of Symmetry", move |_, values| {
        let generator = values.float("generator").unwrap_or(0.585) as f32;
        let steps = values.int("steps").unwrap_or(7);
        if !(0.0..=1.0).contains(&generator) {
            return Err(LayerError::new("generator must lie within one period"));
        }
        let points = (0..steps)
            .map(|k| CirclePoint::new(k as f32 * generator, k.to_string()))
            .collect();
        Ok(CircleLayer::new("Moment of Symmetry", color, points))
    })
    .with_color(color)
    .collapsed()
    .with_field(FieldSpec::new(
        "active",
        FieldKind::Discrete,
        Value::Bool(false),
        validators::boolean(),
    ))
    .with_field(FieldSpec::new(
        "generator",
        FieldKind::Continuous,
        Value::Float(0.585),
        validators::float_range(0.0, 1.0),
    ))
    .with_field(FieldSpec::new(
        "steps",
        FieldKind::Continuous,
        Value::Int(7),
        validators::int_range(2, 47),
    ))
}

/// The cross-module rules the demo ships with: each module's `active`
/// flag expands or collapses its own panel.
#[must_use]
pub fn default_interactions() -> InteractionTable {
    let mut table = InteractionTable::new();
    for id in ["edo", "ji", "mos"] {
        let module = ModuleId::new(id);
        let target = module.clone();
        table.register(module, "active", move |ctx, value| {
            if let Some(active) = value.as_bool() {
                ctx.set_expanded(&target, active);
            }
        });
    }
    table
}
