#![forbid(unsafe_code)]

//! Tonewheel Runtime
//!
//! The orchestration layer for the Tonewheel diagram app: an ordered set
//! of collapsible configuration panels ("modules"), each owning a bag of
//! validated fields and one diagram layer, with the panel order driving
//! both sidebar position and layer stacking.
//!
//! # Key Components
//!
//! - [`ModuleDescriptor`] / [`FieldSpec`] - what a module is
//! - [`ModuleRegistry`] - ordered registration and permutation-safe reorder
//! - [`ControlBinder`] - two-way field binding with validation and debounce
//! - [`ReorderEngine`] - pointer-drag reordering with a discrete fallback
//! - [`RenderCoordinator`] - frame-coalesced layer rebuilding in stack order
//! - [`HealthTracker`] - per-module degradation and system fallback
//! - [`Orchestrator`] - wires the above into one event-driven surface
//!
//! # How it fits in the system
//! `twl-runtime` consumes input events from `twl-core` and keeps all
//! authoritative state in a `twl-state` store. Rendering itself is a
//! capability each module supplies; the runtime only decides *what* to
//! render, *in which order*, and *what to do when a module misbehaves*.

pub mod binder;
pub mod coordinator;
pub mod fault;
pub mod interactions;
pub mod lifecycle;
pub mod module;
pub mod orchestrator;
pub mod registry;
pub mod reorder;
pub mod validate;

pub use binder::{BinderConfig, ControlBinder, InputAdapter};
pub use coordinator::{FrameConfig, FrameOutcome, LayerSlot, RenderCoordinator};
pub use fault::{HealthDecision, HealthEvidence, HealthTracker, ModuleHealth, SystemHealth};
pub use interactions::{InteractionCtx, InteractionTable};
pub use lifecycle::{LifecycleBus, LifecycleEvent, LifecycleSubscription};
pub use module::{
    AccentColor, FieldKind, FieldSpec, FieldValues, LayerError, ModuleDescriptor, ModuleId,
    SharedDimensions, Validator,
};
pub use orchestrator::{InitError, Orchestrator, OrchestratorConfig, SystemMode};
pub use registry::{
    ModuleRegistry, OrderViolation, RegistryError, expanded_path, field_path, module_path,
    order_path,
};
pub use reorder::{DropTarget, EngineUpdate, ModuleBounds, ReleaseResult, ReorderEngine};
pub use validate::{ValidationError, ValidationResult, validators};
