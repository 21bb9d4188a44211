#![forbid(unsafe_code)]

//! Tonewheel Core
//!
//! Foundational input and geometry types for the Tonewheel diagram
//! orchestrator:
//!
//! - [`event`] - canonical pointer/keyboard events
//! - [`geometry`] - points, rects, and ordering-axis helpers
//! - [`gesture`] - stateful drag-gesture recognition
//!
//! # Role in Tonewheel
//! `twl-core` knows nothing about modules, state, or rendering. It turns
//! raw input into well-typed events and semantic drag phases that
//! `twl-runtime` consumes.

pub mod event;
pub mod geometry;
pub mod gesture;

pub use event::{Event, KeyCode, KeyEvent, KeyEventKind, Modifiers, PointerButton, PointerEvent, PointerEventKind};
pub use geometry::{Axis, Point, Rect};
pub use gesture::{DragConfig, DragGesture, DragPhase, ReleaseOutcome};
