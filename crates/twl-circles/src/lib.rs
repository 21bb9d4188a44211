#![forbid(unsafe_code)]

//! Tonewheel Circles
//!
//! The demo modules for the Tonewheel orchestrator: three circle
//! visualizations - equal divisions of the octave, a just-intonation
//! odd-limit lattice ring, and a moment-of-symmetry generator stack -
//! each packaged as a [`ModuleDescriptor`](twl_runtime::ModuleDescriptor)
//! with validated fields and a render routine producing a
//! [`CircleLayer`].
//!
//! The orchestrator treats the layer as opaque; everything in this crate
//! is "host side" from its point of view.

pub mod layers;
pub mod modules;

pub use layers::{CircleLayer, CirclePoint};
pub use modules::{default_interactions, edo_module, ji_module, mos_module};
