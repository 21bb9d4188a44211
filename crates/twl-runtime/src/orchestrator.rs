#![forbid(unsafe_code)]

//! The orchestrator: one surface over the store, registry, binder,
//! reorder engine, coordinator, and health tracker.
//!
//! The host owns layout and input; the orchestrator owns state and
//! policy. The host feeds it raw events, panel bounds after each layout
//! pass, field-change notifications from bound controls, a periodic
//! `tick` for debounce deadlines, and a per-animation-frame `frame` call.
//! In return it exposes the layer stack to draw and the lifecycle bus to
//! observe.
//!
//! # Fallback
//!
//! Construction failures - an unusable drawing surface, duplicate module
//! ids - put the whole subsystem into [`SystemMode::Fallback`]: a static
//! configuration that renders every module in registration order with its
//! default field values. No reordering, no collapse, no binding; the mode
//! is terminal for the session. Per-module render isolation still
//! applies, because a broken module is no reason to blank the diagram.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use tracing::{error, warn};
use twl_core::event::Event;
use twl_core::geometry::{Axis, Point};
use twl_core::gesture::DragConfig;
use twl_state::StateStore;
use web_time::Instant;

use crate::binder::{BinderConfig, ControlBinder, InputAdapter};
use crate::coordinator::{FrameConfig, FrameOutcome, LayerSlot, RenderCoordinator};
use crate::fault::HealthTracker;
use crate::interactions::InteractionTable;
use crate::lifecycle::{LifecycleBus, LifecycleEvent};
use crate::module::{FieldValues, ModuleDescriptor, ModuleId, SharedDimensions};
use crate::registry::{ModuleRegistry, RegistryError};
use crate::reorder::{EngineUpdate, ModuleBounds, ReleaseResult, ReorderEngine};
use crate::validate::ValidationError;

/// Failure that prevents the orchestration layer from starting.
#[derive(Debug, Clone, PartialEq)]
pub enum InitError {
    /// The shared drawing surface has no usable area.
    SurfaceUnavailable {
        /// Offending width.
        width: f32,
        /// Offending height.
        height: f32,
    },
    /// Module registration cannot succeed.
    Registry(RegistryError),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceUnavailable { width, height } => {
                write!(f, "unusable drawing surface ({} x {})", width, height)
            }
            Self::Registry(e) => write!(f, "registry init failed: {}", e),
        }
    }
}

impl std::error::Error for InitError {}

impl From<RegistryError> for InitError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

/// Whether orchestration is live or bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    /// Dynamic ordering, collapse, and binding are in effect.
    Orchestrated,
    /// The static configuration is in effect (terminal).
    Fallback,
}

/// Tunables for the orchestrator's moving parts.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Axis panels are ordered along.
    pub axis: Axis,
    /// Drag recognition thresholds.
    pub drag: DragConfig,
    /// Binder timing.
    pub binder: BinderConfig,
    /// Frame pacing.
    pub frame: FrameConfig,
}

/// The orchestrated internals; absent in fallback mode.
struct Core<L> {
    store: StateStore,
    registry: ModuleRegistry<L>,
    binder: ControlBinder,
    engine: ReorderEngine,
    coordinator: RenderCoordinator<L>,
    bounds: Vec<ModuleBounds>,
}

/// The static configuration used when orchestration is bypassed.
struct FallbackView<L> {
    descriptors: Vec<ModuleDescriptor<L>>,
    stack: Vec<LayerSlot<L>>,
    rendered: bool,
}

/// Module orchestration behind a single event-driven surface.
pub struct Orchestrator<L: 'static> {
    dims: SharedDimensions,
    health: HealthTracker,
    lifecycle: LifecycleBus,
    core: Option<Core<L>>,
    fallback: Option<FallbackView<L>>,
}

impl<L> fmt::Debug for Orchestrator<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl<L: 'static> Orchestrator<L> {
    /// Build the orchestrator. On an init failure the instance comes up
    /// in fallback mode instead of failing outright.
    #[must_use]
    pub fn new(
        dims: SharedDimensions,
        descriptors: Vec<ModuleDescriptor<L>>,
        interactions: InteractionTable,
        config: OrchestratorConfig,
    ) -> Self {
        if !dims.is_usable() {
            return Self::enter_fallback(
                dims,
                descriptors,
                InitError::SurfaceUnavailable {
                    width: dims.width,
                    height: dims.height,
                },
            );
        }
        if let Some(dup) = first_duplicate_id(&descriptors) {
            return Self::enter_fallback(
                dims,
                descriptors,
                InitError::Registry(RegistryError::DuplicateId(dup)),
            );
        }

        let store = StateStore::new();
        let coordinator = RenderCoordinator::new(&store, dims, config.frame);
        let binder = ControlBinder::new(store.clone(), config.binder, interactions);
        let mut registry = ModuleRegistry::new(store.clone());
        for descriptor in descriptors {
            let id = descriptor.id.clone();
            if let Err(e) = registry.register(descriptor) {
                // Ids were pre-checked; an error here drops one module,
                // not the system.
                error!(module = %id, error = %e, "registration failed; module dropped");
            }
        }

        Self {
            dims,
            health: HealthTracker::new(),
            lifecycle: LifecycleBus::new(),
            core: Some(Core {
                store,
                registry,
                binder,
                engine: ReorderEngine::new(config.axis, config.drag),
                coordinator,
                bounds: Vec::new(),
            }),
            fallback: None,
        }
    }

    fn enter_fallback(
        dims: SharedDimensions,
        descriptors: Vec<ModuleDescriptor<L>>,
        reason: InitError,
    ) -> Self {
        let mut health = HealthTracker::new();
        health.declare_fallback(&reason.to_string());
        let lifecycle = LifecycleBus::new();
        lifecycle.emit(&LifecycleEvent::SystemFallback);
        Self {
            dims,
            health,
            lifecycle,
            core: None,
            fallback: Some(FallbackView {
                descriptors,
                stack: Vec::new(),
                rendered: false,
            }),
        }
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> SystemMode {
        if self.core.is_some() {
            SystemMode::Orchestrated
        } else {
            SystemMode::Fallback
        }
    }

    /// The state store, when orchestration is live.
    #[must_use]
    pub fn store(&self) -> Option<&StateStore> {
        self.core.as_ref().map(|c| &c.store)
    }

    /// The registry, when orchestration is live.
    #[must_use]
    pub fn registry(&self) -> Option<&ModuleRegistry<L>> {
        self.core.as_ref().map(|c| &c.registry)
    }

    /// Health of modules and system.
    #[must_use]
    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// The lifecycle event bus.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleBus {
        &self.lifecycle
    }

    /// The current layer stack, in stacking order.
    #[must_use]
    pub fn layers(&self) -> &[LayerSlot<L>] {
        match (&self.core, &self.fallback) {
            (Some(core), _) => core.coordinator.layers(),
            (None, Some(view)) => &view.stack,
            (None, None) => &[],
        }
    }

    /// The host finished a sidebar layout pass; record panel bounds for
    /// drag hit-testing.
    pub fn set_panel_bounds(&mut self, bounds: Vec<ModuleBounds>) {
        if let Some(core) = &mut self.core {
            core.bounds = bounds;
        }
    }

    /// Replace the shared drawing dimensions.
    pub fn resize(&mut self, dims: SharedDimensions) {
        self.dims = dims;
        if let Some(core) = &mut self.core {
            core.coordinator.set_dimensions(dims);
        }
        if let Some(view) = &mut self.fallback {
            view.rendered = false;
        }
    }

    /// Route a raw event. Returns an order the host should relayout
    /// panels to, when a drag changed or restored the provisional order.
    pub fn handle_event(&mut self, event: &Event) -> Option<Vec<ModuleId>> {
        if let Event::Resize { width, height } = event {
            self.resize(SharedDimensions::new(*width, *height));
            return None;
        }
        let core = self.core.as_mut()?;
        match core.engine.handle_event(event, &core.bounds) {
            EngineUpdate::Provisional(order) | EngineUpdate::Restored(order) => Some(order),
            EngineUpdate::None => None,
        }
    }

    /// A pointer-down landed on `id`'s drag affordance.
    pub fn press_drag_handle(&mut self, id: &ModuleId, pos: Point) {
        if let Some(core) = &mut self.core {
            let order = core.registry.order().to_vec();
            core.engine.press(id, pos, &order);
        }
    }

    /// A pointer-up arrived. Completed drags commit; short presses toggle
    /// the pressed module's panel (click-to-toggle is suppressed only
    /// while a real drag is in flight).
    pub fn release_pointer(&mut self, pos: Point) -> ReleaseResult {
        let Some(core) = &mut self.core else {
            return ReleaseResult::Ignored;
        };
        let result = core.engine.release(pos, &mut core.registry);
        if let ReleaseResult::Click(id) = &result
            && let Err(e) = core.registry.toggle_expanded(id)
        {
            warn!(module = %id, error = %e, "toggle after click failed");
        }
        result
    }

    /// Discrete reorder fallback: move a module one slot toward the
    /// front.
    pub fn move_module_up(&mut self, id: &ModuleId) -> Result<(), RegistryError> {
        match &mut self.core {
            Some(core) => core.engine.move_up(id, &mut core.registry),
            None => Ok(()),
        }
    }

    /// Discrete reorder fallback: move a module one slot toward the
    /// back.
    pub fn move_module_down(&mut self, id: &ModuleId) -> Result<(), RegistryError> {
        match &mut self.core {
            Some(core) => core.engine.move_down(id, &mut core.registry),
            None => Ok(()),
        }
    }

    /// Bind a control to a module field. Returns whether the binding was
    /// made (unknown modules or fields are logged and skipped).
    pub fn bind_field(
        &mut self,
        module: &ModuleId,
        field: &str,
        adapter: Rc<std::cell::RefCell<dyn InputAdapter>>,
    ) -> bool {
        let Some(core) = &mut self.core else {
            return false;
        };
        let Some(spec) = core.registry.get(module).and_then(|d| d.field(field)) else {
            warn!(module = %module, field, "no such field to bind");
            return false;
        };
        core.binder.bind(module, spec, adapter);
        true
    }

    /// A bound control reported a raw change.
    pub fn field_changed(
        &mut self,
        module: &ModuleId,
        field: &str,
        now: Instant,
    ) -> Option<ValidationError> {
        self.core
            .as_mut()
            .and_then(|core| core.binder.raw_changed(module, field, now))
    }

    /// A bound control lost focus.
    pub fn field_blurred(&mut self, module: &ModuleId, field: &str) {
        if let Some(core) = &mut self.core {
            core.binder.blurred(module, field);
        }
    }

    /// Flush elapsed debounce deadlines. Call from the host's timer loop.
    pub fn tick(&mut self, now: Instant) {
        if let Some(core) = &mut self.core {
            core.binder.tick(now);
        }
    }

    /// Run a render pass if needed. Call once per animation tick.
    pub fn frame(&mut self, now: Instant) -> FrameOutcome {
        if let Some(core) = &mut self.core {
            return core
                .coordinator
                .frame(now, &core.registry, &mut self.health, &self.lifecycle);
        }
        self.render_fallback()
    }

    /// Render the static configuration: every module, registration
    /// order, default field values.
    fn render_fallback(&mut self) -> FrameOutcome {
        let Some(view) = &mut self.fallback else {
            return FrameOutcome::Idle;
        };
        if view.rendered {
            return FrameOutcome::Idle;
        }
        view.stack.clear();
        let mut failures = 0usize;
        for descriptor in &view.descriptors {
            let mut values = FieldValues::new();
            for field in &descriptor.fields {
                values.insert(field.name.clone(), field.default.clone());
            }
            let dims = self.dims;
            let render = &descriptor.render;
            match catch_unwind(AssertUnwindSafe(|| render(&dims, &values))) {
                Ok(Ok(layer)) => view.stack.push(LayerSlot {
                    id: descriptor.id.clone(),
                    stacking: view.stack.len(),
                    layer: Rc::new(layer),
                }),
                Ok(Err(e)) => {
                    failures += 1;
                    self.health.mark_failure(&descriptor.id, e.to_string());
                }
                Err(_) => {
                    failures += 1;
                    self.health
                        .mark_failure(&descriptor.id, "render routine panicked");
                }
            }
        }
        view.rendered = true;
        FrameOutcome::Rendered {
            layers: view.stack.len(),
            failures,
        }
    }
}

fn first_duplicate_id<L>(descriptors: &[ModuleDescriptor<L>]) -> Option<ModuleId> {
    let mut seen = ahash::AHashSet::with_capacity(descriptors.len());
    descriptors
        .iter()
        .map(|d| d.id.clone())
        .find(|id| !seen.insert(id.clone()))
}
