#![forbid(unsafe_code)]

//! Headless driver for the Tonewheel orchestrator.
//!
//! Builds the three circle modules, then walks through the interactions a
//! host UI would generate: an initial render, a field edit through a
//! bound control (debounced), a drag that lifts the MOS panel to the top
//! of the stack, and a collapse. The resulting layer stacks are logged
//! after each step.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;
use twl_core::event::{Event, PointerEvent, PointerEventKind};
use twl_core::geometry::{Point, Rect};
use twl_runtime::{
    InputAdapter, ModuleBounds, ModuleId, Orchestrator, OrchestratorConfig, SharedDimensions,
};
use twl_state::Value;
use web_time::Instant;

use twl_circles::{CircleLayer, default_interactions, edo_module, ji_module, mos_module};

/// Minimal in-memory control for the headless run.
struct HeadlessControl {
    raw: Value,
    message: Option<String>,
}

impl HeadlessControl {
    fn new(raw: Value) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self { raw, message: None }))
    }
}

impl InputAdapter for HeadlessControl {
    fn raw_value(&self) -> Value {
        self.raw.clone()
    }
    fn set_value(&mut self, value: &Value) {
        self.raw = value.clone();
    }
    fn show_message(&mut self, message: &str) {
        self.message = Some(message.to_string());
    }
    fn clear_message(&mut self) {
        self.message = None;
    }
}

fn log_stack(orch: &Orchestrator<CircleLayer>, step: &str) {
    let described: Vec<String> = orch
        .layers()
        .iter()
        .map(|slot| format!("{}:{} ({} pts)", slot.stacking, slot.id, slot.layer.points.len()))
        .collect();
    info!(step, stack = described.join(", "), "layer stack");
}

/// Sidebar layout for the current panel order: full-width rows of 100.
fn layout(order: &[ModuleId]) -> Vec<ModuleBounds> {
    order
        .iter()
        .enumerate()
        .map(|(i, id)| ModuleBounds {
            id: id.clone(),
            bounds: Rect::new(0.0, i as f32 * 100.0, 240.0, 100.0),
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut orch = Orchestrator::new(
        SharedDimensions::new(640.0, 640.0),
        vec![edo_module(), ji_module(), mos_module()],
        default_interactions(),
        OrchestratorConfig::default(),
    );
    info!(mode = ?orch.mode(), "orchestrator up");

    let mut now = Instant::now();
    orch.frame(now);
    log_stack(&orch, "initial");

    // Bind the EDO divisions stepper and nudge it; the commit lands after
    // the debounce window.
    let edo = ModuleId::new("edo");
    let control = HeadlessControl::new(Value::Int(12));
    orch.bind_field(&edo, "divisions", control.clone());
    control.borrow_mut().raw = Value::Int(19);
    orch.field_changed(&edo, "divisions", now);
    now += Duration::from_millis(200);
    orch.tick(now);
    now += Duration::from_millis(50);
    orch.frame(now);
    log_stack(&orch, "after edit (19edo)");

    // Activate the MOS module through its flag; the interaction table
    // expands the panel.
    let mos = ModuleId::new("mos");
    let active = HeadlessControl::new(Value::Bool(true));
    orch.bind_field(&mos, "active", active.clone());
    orch.field_changed(&mos, "active", now);
    now += Duration::from_millis(50);
    orch.frame(now);
    log_stack(&orch, "after mos activation");

    // Drag the MOS panel (bottom row) above the EDO panel's midpoint.
    if let Some(registry) = orch.registry() {
        let order = registry.order().to_vec();
        orch.set_panel_bounds(layout(&order));
    }
    orch.press_drag_handle(&mos, Point::new(120.0, 250.0));
    let relayout = orch.handle_event(&Event::Pointer(PointerEvent::new(
        PointerEventKind::Moved,
        120.0,
        30.0,
    )));
    if let Some(order) = relayout {
        orch.set_panel_bounds(layout(&order));
    }
    let result = orch.release_pointer(Point::new(120.0, 30.0));
    info!(?result, "drag finished");
    now += Duration::from_millis(50);
    orch.frame(now);
    log_stack(&orch, "after drag (mos first in order)");

    // Collapse JI; its layer leaves the stack.
    if let Some(registry) = orch.registry() {
        let _ = registry.set_expanded(&ModuleId::new("ji"), false);
    }
    now += Duration::from_millis(50);
    orch.frame(now);
    log_stack(&orch, "after ji collapse");
}
