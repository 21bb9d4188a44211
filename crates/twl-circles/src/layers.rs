#![forbid(unsafe_code)]

//! The layer type the demo modules render into.
//!
//! A [`CircleLayer`] is a set of labeled points on the unit circle, with
//! angles in *turns* (octave fractions map directly onto turns, which
//! keeps the math free of radians until actual drawing).

use twl_runtime::{AccentColor, SharedDimensions};

/// One pitch mark on the circle.
#[derive(Debug, Clone, PartialEq)]
pub struct CirclePoint {
    /// Angle in turns, in `[0, 1)`; 0 is the top of the circle.
    pub angle_turns: f32,
    /// Display label (scale degree, ratio, step number).
    pub label: String,
}

impl CirclePoint {
    /// Create a point, normalizing the angle into `[0, 1)`.
    #[must_use]
    pub fn new(angle_turns: f32, label: impl Into<String>) -> Self {
        Self {
            angle_turns: angle_turns.rem_euclid(1.0),
            label: label.into(),
        }
    }

    /// Surface position of this point on the largest centered circle.
    #[must_use]
    pub fn position(&self, dims: &SharedDimensions) -> (f32, f32) {
        let (cx, cy) = dims.center();
        let r = dims.radius();
        let theta = self.angle_turns * std::f32::consts::TAU - std::f32::consts::FRAC_PI_2;
        (cx + r * theta.cos(), cy + r * theta.sin())
    }
}

/// One module's rendered ring of points.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleLayer {
    /// The producing module's display label.
    pub label: String,
    /// The module's accent, carried through for drawing.
    pub color: AccentColor,
    /// Marks in circle order.
    pub points: Vec<CirclePoint>,
}

impl CircleLayer {
    /// Create a layer.
    #[must_use]
    pub fn new(label: impl Into<String>, color: AccentColor, points: Vec<CirclePoint>) -> Self {
        Self {
            label: label.into(),
            color,
            points,
        }
    }
}
