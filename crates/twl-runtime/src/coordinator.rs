#![forbid(unsafe_code)]

//! Render coordination: from state changes to a stacked set of layers.
//!
//! The coordinator subscribes to the store paths that matter for
//! rendering (`module_order`, every `modules.<id>.…`) and marks modules
//! dirty as writes land. [`frame`](RenderCoordinator::frame) - called by
//! the host once per animation tick - rebuilds the layer stack:
//!
//! 1. Walk the registered modules in current order, keeping the expanded
//!    ones.
//! 2. Re-invoke the render routine of each dirty module (and of any
//!    expanded module with no cached layer); reuse cached layers for the
//!    rest.
//! 3. Assign stacking positions by index - later in the order means
//!    drawn on top.
//! 4. Release layers of modules that collapsed or failed.
//!
//! # Coalescing
//!
//! Rapid successive writes (a slider drag) mark dirt many times, but a
//! frame younger than [`FrameConfig::min_interval`] is skipped and the
//! dirt carries over, so at most one full pass runs per interval.
//!
//! # Failure isolation
//!
//! Each render invocation is individually wrapped: an `Err` from the
//! routine, or a panic inside it, degrades that one module (layer
//! omitted, notice recorded, `ModuleDegraded` emitted) and the pass
//! continues with the others. A later successful render recovers it.

use std::cell::RefCell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::time::Duration;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use tracing::{debug, trace};
use twl_state::{StateStore, StoreSubscription};
use web_time::Instant;

use crate::fault::{HealthDecision, HealthTracker};
use crate::lifecycle::{LifecycleBus, LifecycleEvent};
use crate::module::{ModuleId, SharedDimensions};
use crate::registry::{ModuleRegistry, order_path};

/// Frame pacing configuration.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Minimum interval between full passes, roughly one animation frame
    /// (default: 16 ms).
    pub min_interval: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(16),
        }
    }
}

/// One rendered layer with its stacking position.
#[derive(Debug, Clone)]
pub struct LayerSlot<L> {
    /// The module that produced the layer.
    pub id: ModuleId,
    /// Position in the visual stack; higher is drawn on top.
    pub stacking: usize,
    /// The layer itself, opaque to the coordinator.
    pub layer: Rc<L>,
}

/// What a call to [`RenderCoordinator::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing was dirty; no work done.
    Idle,
    /// Work is pending but the previous frame is too recent; the dirt
    /// carries over to the next call.
    Coalesced,
    /// A pass ran.
    Rendered {
        /// Layers in the resulting stack.
        layers: usize,
        /// Render failures observed during the pass.
        failures: usize,
    },
}

#[derive(Default)]
struct DirtyState {
    /// Re-render every module.
    all: bool,
    /// Re-render these modules.
    modules: AHashSet<ModuleId>,
    /// Restack (order / expansion changed).
    stack: bool,
}

impl DirtyState {
    fn any(&self) -> bool {
        self.all || self.stack || !self.modules.is_empty()
    }
}

/// Rebuilds the visual layer stack from module order and state.
pub struct RenderCoordinator<L> {
    config: FrameConfig,
    dims: SharedDimensions,
    dirty: Rc<RefCell<DirtyState>>,
    cache: AHashMap<ModuleId, Rc<L>>,
    stack: SmallVec<[LayerSlot<L>; 8]>,
    last_frame: Option<Instant>,
    _subs: Vec<StoreSubscription>,
}

impl<L> fmt::Debug for RenderCoordinator<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCoordinator")
            .field("layers", &self.stack.len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl<L> RenderCoordinator<L> {
    /// Create a coordinator watching `store`. The first
    /// [`frame`](RenderCoordinator::frame) renders everything.
    #[must_use]
    pub fn new(store: &StateStore, dims: SharedDimensions, config: FrameConfig) -> Self {
        let dirty = Rc::new(RefCell::new(DirtyState {
            all: true,
            stack: true,
            modules: AHashSet::new(),
        }));

        // Order changes only restack; cached layers stay valid.
        let order_dirty = Rc::clone(&dirty);
        let order_sub = store.subscribe(order_path(), move |_, _| {
            order_dirty.borrow_mut().stack = true;
        });

        // Module subtree changes: expansion restacks, field writes mark
        // the owning module for re-render.
        let module_dirty = Rc::clone(&dirty);
        let modules_prefix = twl_state::Path::new("modules").expect("static path");
        let module_sub = store.subscribe(modules_prefix, move |path, _| {
            let mut segments = path.segments().skip(1);
            let Some(id) = segments.next() else { return };
            let mut state = module_dirty.borrow_mut();
            state.stack = true;
            match segments.next() {
                Some("expanded") => {}
                _ => {
                    state.modules.insert(ModuleId::new(id));
                }
            }
        });

        Self {
            config,
            dims,
            dirty,
            cache: AHashMap::new(),
            stack: SmallVec::new(),
            last_frame: None,
            _subs: vec![order_sub, module_sub],
        }
    }

    /// The current layer stack, in stacking order.
    #[must_use]
    pub fn layers(&self) -> &[LayerSlot<L>] {
        &self.stack
    }

    /// Current shared dimensions.
    #[must_use]
    pub fn dimensions(&self) -> SharedDimensions {
        self.dims
    }

    /// Replace the shared dimensions; every module re-renders next frame.
    pub fn set_dimensions(&mut self, dims: SharedDimensions) {
        if dims == self.dims {
            return;
        }
        self.dims = dims;
        let mut state = self.dirty.borrow_mut();
        state.all = true;
        state.stack = true;
    }

    /// Run a pass if anything is dirty and the frame interval allows it.
    pub fn frame(
        &mut self,
        now: Instant,
        registry: &ModuleRegistry<L>,
        health: &mut HealthTracker,
        lifecycle: &LifecycleBus,
    ) -> FrameOutcome {
        if !self.dirty.borrow().any() {
            return FrameOutcome::Idle;
        }
        if let Some(last) = self.last_frame
            && now.saturating_duration_since(last) < self.config.min_interval
        {
            trace!("frame coalesced");
            return FrameOutcome::Coalesced;
        }
        self.last_frame = Some(now);
        let dirt = std::mem::take(&mut *self.dirty.borrow_mut());

        let mut failures = 0usize;
        let mut stack: SmallVec<[LayerSlot<L>; 8]> = SmallVec::new();
        let mut live: AHashSet<ModuleId> = AHashSet::new();

        for descriptor in registry.ordered() {
            let id = &descriptor.id;
            if !registry.is_expanded(id) {
                continue;
            }
            let needs_render =
                dirt.all || dirt.modules.contains(id) || !self.cache.contains_key(id);
            if needs_render {
                let values = registry.field_values(id);
                let dims = self.dims;
                let render = &descriptor.render;
                let invoked = catch_unwind(AssertUnwindSafe(|| render(&dims, &values)));
                match invoked {
                    Ok(Ok(layer)) => {
                        self.cache.insert(id.clone(), Rc::new(layer));
                        health.mark_success(id);
                    }
                    Ok(Err(error)) => {
                        failures += 1;
                        self.cache.remove(id);
                        if health.mark_failure(id, error.to_string()) == HealthDecision::Degrade {
                            lifecycle.emit(&LifecycleEvent::ModuleDegraded(id.clone()));
                        }
                    }
                    Err(payload) => {
                        failures += 1;
                        self.cache.remove(id);
                        let message = panic_message(payload.as_ref());
                        if health.mark_failure(id, message) == HealthDecision::Degrade {
                            lifecycle.emit(&LifecycleEvent::ModuleDegraded(id.clone()));
                        }
                    }
                }
            }
            if let Some(layer) = self.cache.get(id) {
                live.insert(id.clone());
                stack.push(LayerSlot {
                    id: id.clone(),
                    stacking: stack.len(),
                    layer: Rc::clone(layer),
                });
            }
        }

        // Release layers of modules that collapsed, failed, or were
        // removed from the order.
        self.cache.retain(|id, _| live.contains(id));
        self.stack = stack;

        debug!(layers = self.stack.len(), failures, "render pass");
        lifecycle.emit(&LifecycleEvent::ModulesChanged);
        FrameOutcome::Rendered {
            layers: self.stack.len(),
            failures,
        }
    }
}

/// Best-effort extraction of a panic payload's message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "render routine panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{FieldKind, FieldSpec, LayerError, ModuleDescriptor};
    use crate::registry::{expanded_path, field_path};
    use crate::validate::validators;
    use std::cell::Cell;
    use twl_state::Value;

    /// Layer type for tests: just the rendered division count.
    type TestLayer = i64;

    struct Fixture {
        registry: ModuleRegistry<TestLayer>,
        coordinator: RenderCoordinator<TestLayer>,
        health: HealthTracker,
        lifecycle: LifecycleBus,
        clock: Instant,
    }

    impl Fixture {
        fn frame(&mut self) -> FrameOutcome {
            // Step well past the frame interval each call.
            self.clock += Duration::from_millis(100);
            self.coordinator
                .frame(self.clock, &self.registry, &mut self.health, &self.lifecycle)
        }

        fn stack_ids(&self) -> Vec<String> {
            self.coordinator
                .layers()
                .iter()
                .map(|slot| slot.id.as_str().to_string())
                .collect()
        }
    }

    fn plain_module(id: &str) -> ModuleDescriptor<TestLayer> {
        ModuleDescriptor::new(ModuleId::new(id), id.to_uppercase(), |_, values| {
            Ok(values.int("divisions").unwrap_or(0))
        })
        .with_field(FieldSpec::new(
            "divisions",
            FieldKind::Continuous,
            Value::Int(12),
            validators::int_range(1, 270),
        ))
    }

    fn fixture(modules: Vec<ModuleDescriptor<TestLayer>>) -> Fixture {
        let store = StateStore::new();
        let coordinator =
            RenderCoordinator::new(&store, SharedDimensions::new(800.0, 600.0), FrameConfig::default());
        let mut registry = ModuleRegistry::new(store);
        for m in modules {
            registry.register(m).unwrap();
        }
        Fixture {
            registry,
            coordinator,
            health: HealthTracker::new(),
            lifecycle: LifecycleBus::new(),
            clock: Instant::now(),
        }
    }

    #[test]
    fn first_frame_renders_all_expanded() {
        let mut fx = fixture(vec![plain_module("a"), plain_module("b")]);
        let outcome = fx.frame();
        assert_eq!(outcome, FrameOutcome::Rendered { layers: 2, failures: 0 });
        assert_eq!(fx.stack_ids(), ["a", "b"]);
    }

    #[test]
    fn stacking_follows_module_order() {
        let mut fx = fixture(vec![plain_module("a"), plain_module("b"), plain_module("c")]);
        fx.frame();
        let positions: Vec<usize> = fx.coordinator.layers().iter().map(|s| s.stacking).collect();
        assert_eq!(positions, [0, 1, 2]);

        fx.registry
            .reorder(vec![ModuleId::new("c"), ModuleId::new("a"), ModuleId::new("b")])
            .unwrap();
        fx.frame();
        assert_eq!(fx.stack_ids(), ["c", "a", "b"]);
        // Later in the order = strictly higher stacking.
        let stack = fx.coordinator.layers();
        for pair in stack.windows(2) {
            assert!(pair[0].stacking < pair[1].stacking);
        }
    }

    #[test]
    fn collapse_hides_layer_without_disturbing_others() {
        let mut fx = fixture(vec![plain_module("a"), plain_module("b"), plain_module("c")]);
        fx.frame();
        fx.registry.set_expanded(&ModuleId::new("b"), false).unwrap();
        fx.frame();
        assert_eq!(fx.stack_ids(), ["a", "c"]);
        let stack = fx.coordinator.layers();
        assert!(stack[0].stacking < stack[1].stacking);
    }

    #[test]
    fn failing_module_is_isolated() {
        let failing = ModuleDescriptor::new(ModuleId::new("b"), "B", |_, _| {
            Err(LayerError::new("division by zero octaves"))
        });
        let mut fx = fixture(vec![plain_module("a"), failing, plain_module("c")]);

        let degraded_seen = Rc::new(Cell::new(false));
        let d = Rc::clone(&degraded_seen);
        let _sub = fx.lifecycle.subscribe(move |event| {
            if matches!(event, LifecycleEvent::ModuleDegraded(id) if id.as_str() == "b") {
                d.set(true);
            }
        });

        let outcome = fx.frame();
        assert_eq!(outcome, FrameOutcome::Rendered { layers: 2, failures: 1 });
        assert_eq!(fx.stack_ids(), ["a", "c"]);
        assert!(fx.health.is_degraded(&ModuleId::new("b")));
        assert!(degraded_seen.get());
        assert!(fx.health.notice(&ModuleId::new("b")).is_some());
    }

    #[test]
    fn panicking_module_is_isolated() {
        let panicking = ModuleDescriptor::new(ModuleId::new("b"), "B", |_, _| -> Result<i64, LayerError> {
            panic!("generator out of range")
        });
        let mut fx = fixture(vec![plain_module("a"), panicking]);
        let outcome = fx.frame();
        assert_eq!(outcome, FrameOutcome::Rendered { layers: 1, failures: 1 });
        assert_eq!(
            fx.health.notice(&ModuleId::new("b")),
            Some("generator out of range")
        );
    }

    #[test]
    fn module_recovers_on_next_successful_render() {
        // Fails while divisions == 0, succeeds otherwise.
        let flaky = ModuleDescriptor::new(ModuleId::new("a"), "A", |_, values| {
            match values.int("divisions") {
                Some(0) => Err(LayerError::new("zero divisions")),
                Some(n) => Ok(n),
                None => Ok(0),
            }
        })
        .with_field(FieldSpec::new(
            "divisions",
            FieldKind::Continuous,
            Value::Int(0),
            validators::int_range(0, 270),
        ));
        let mut fx = fixture(vec![flaky]);

        fx.frame();
        assert!(fx.health.is_degraded(&ModuleId::new("a")));

        // User fixes the field.
        fx.registry
            .store()
            .set(&field_path(&ModuleId::new("a"), "divisions"), Value::Int(19));
        fx.frame();
        assert!(!fx.health.is_degraded(&ModuleId::new("a")));
        assert_eq!(fx.stack_ids(), ["a"]);
    }

    #[test]
    fn unaffected_modules_reuse_cached_layers() {
        let renders = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&renders);
        let counting = ModuleDescriptor::new(ModuleId::new("a"), "A", move |_, _| {
            r.set(r.get() + 1);
            Ok(0)
        });
        let mut fx = fixture(vec![counting, plain_module("b")]);

        fx.frame();
        assert_eq!(renders.get(), 1);

        // Touch only b's field; a's layer must be reused.
        fx.registry
            .store()
            .set(&field_path(&ModuleId::new("b"), "divisions"), Value::Int(31));
        fx.frame();
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn rapid_writes_coalesce_to_one_pass() {
        let mut fx = fixture(vec![plain_module("a")]);
        fx.frame();

        let base = fx.clock;
        for (offset, value) in [(1u64, 13), (2, 17), (3, 22)] {
            fx.registry.store().set(
                &field_path(&ModuleId::new("a"), "divisions"),
                Value::Int(value),
            );
            let outcome = fx.coordinator.frame(
                base + Duration::from_millis(offset),
                &fx.registry,
                &mut fx.health,
                &fx.lifecycle,
            );
            assert_eq!(outcome, FrameOutcome::Coalesced);
        }

        let outcome = fx.frame();
        assert_eq!(outcome, FrameOutcome::Rendered { layers: 1, failures: 0 });
        assert_eq!(*fx.coordinator.layers()[0].layer, 22);
    }

    #[test]
    fn idle_when_clean() {
        let mut fx = fixture(vec![plain_module("a")]);
        fx.frame();
        assert_eq!(fx.frame(), FrameOutcome::Idle);
    }

    #[test]
    fn resize_rerenders_everything() {
        let renders = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&renders);
        let counting = ModuleDescriptor::new(ModuleId::new("a"), "A", move |dims, _| {
            r.set(r.get() + 1);
            Ok(dims.radius() as i64)
        });
        let mut fx = fixture(vec![counting]);
        fx.frame();
        assert_eq!(renders.get(), 1);

        fx.coordinator.set_dimensions(SharedDimensions::new(1000.0, 1000.0));
        fx.frame();
        assert_eq!(renders.get(), 2);
        assert_eq!(*fx.coordinator.layers()[0].layer, 500);
    }

    #[test]
    fn expanded_flag_only_restacks_without_rerender() {
        let renders = Rc::new(Cell::new(0u32));
        let r = Rc::clone(&renders);
        let counting = ModuleDescriptor::new(ModuleId::new("a"), "A", move |_, _| {
            r.set(r.get() + 1);
            Ok(0)
        });
        let mut fx = fixture(vec![counting, plain_module("b")]);
        fx.frame();
        assert_eq!(renders.get(), 1);

        // Collapsing b restacks but must not re-render a.
        fx.registry.set_expanded(&ModuleId::new("b"), false).unwrap();
        fx.frame();
        assert_eq!(renders.get(), 1);
        assert_eq!(fx.stack_ids(), ["a"]);
    }
}
