#![forbid(unsafe_code)]

//! Drag reordering: from pointer gestures to a committed module order.
//!
//! The engine consumes [`DragPhase`]s from the core recognizer plus the
//! panel bounds the host lays out, and maintains a *provisional* order
//! for visual feedback. Nothing touches the store until the gesture ends:
//! [`ModuleRegistry::reorder`] is the single atomic commit point, and a
//! cancelled gesture restores the pre-gesture order exactly.
//!
//! # Insertion rule
//!
//! On each move, the panel whose bounds contain the pointer along the
//! ordering axis is found (pointer outside the list: no change). If the
//! pointer sits before that panel's midpoint the dragged module inserts
//! immediately before it, otherwise immediately after. Comparing against
//! the midpoint rather than the edges keeps the insertion point stable
//! while the pointer hovers near a boundary.
//!
//! # Discrete fallback
//!
//! Pointer-drag support varies across hosts, so
//! [`move_up`](ReorderEngine::move_up) / [`move_down`](ReorderEngine::move_down)
//! swap a module with its neighbor and commit immediately - the path
//! keyboard and coarse-touch environments use.

use std::fmt;

use tracing::warn;
use twl_core::event::Event;
use twl_core::geometry::{Axis, Point, Rect};
use twl_core::gesture::{DragConfig, DragGesture, DragPhase, ReleaseOutcome};

use crate::module::ModuleId;
use crate::registry::{ModuleRegistry, RegistryError};

/// One panel's layout bounds, supplied by the host after each layout pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleBounds {
    /// The panel's module.
    pub id: ModuleId,
    /// The panel's bounds in surface coordinates.
    pub bounds: Rect,
}

/// Ephemeral drop state; exists only during an active drag.
#[derive(Debug, Clone, PartialEq)]
pub struct DropTarget {
    /// The module being dragged.
    pub dragged: ModuleId,
    /// Current insertion index (within the order minus the dragged module).
    pub insertion: usize,
    /// The previously computed insertion index, for change detection.
    pub previous: Option<usize>,
}

/// What the host should do after feeding the engine an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    /// Nothing changed.
    None,
    /// The provisional order changed; relayout panels to match.
    Provisional(Vec<ModuleId>),
    /// The gesture was cancelled; relayout panels to this restored order.
    Restored(Vec<ModuleId>),
}

/// Outcome of a pointer release routed through the engine.
#[derive(Debug, PartialEq)]
pub enum ReleaseResult {
    /// No gesture was in progress.
    Ignored,
    /// The press never became a drag; treat it as a click on the module's
    /// header (click-to-toggle is suppressed only for real drags).
    Click(ModuleId),
    /// The provisional order was committed.
    Committed(Vec<ModuleId>),
    /// The registry rejected the final order; the pre-gesture order
    /// remains in effect.
    Reverted {
        /// The order to lay panels back out to.
        restored: Vec<ModuleId>,
        /// Why the commit was rejected.
        error: RegistryError,
    },
}

#[derive(Debug)]
struct ActiveDrag {
    dragged: ModuleId,
    origin_order: Vec<ModuleId>,
    provisional: Vec<ModuleId>,
    target: Option<DropTarget>,
}

/// Translates drag gestures into module-order changes.
pub struct ReorderEngine {
    axis: Axis,
    gesture: DragGesture,
    active: Option<ActiveDrag>,
}

impl fmt::Debug for ReorderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReorderEngine")
            .field("axis", &self.axis)
            .field("dragging", &self.gesture.is_dragging())
            .finish_non_exhaustive()
    }
}

impl ReorderEngine {
    /// Create an engine ordering along `axis`.
    #[must_use]
    pub fn new(axis: Axis, config: DragConfig) -> Self {
        Self {
            axis,
            gesture: DragGesture::new(config),
            active: None,
        }
    }

    /// Whether a drag is currently active.
    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.gesture.is_dragging()
    }

    /// The current drop target, if a drag has computed one.
    #[must_use]
    pub fn target(&self) -> Option<&DropTarget> {
        self.active.as_ref().and_then(|a| a.target.as_ref())
    }

    /// A pointer-down landed on `id`'s drag affordance.
    ///
    /// `current_order` is snapshotted so cancellation can restore it.
    pub fn press(&mut self, id: &ModuleId, pos: Point, current_order: &[ModuleId]) {
        self.gesture.arm(pos);
        self.active = Some(ActiveDrag {
            dragged: id.clone(),
            origin_order: current_order.to_vec(),
            provisional: current_order.to_vec(),
            target: None,
        });
    }

    /// Route a raw event (pointer move, Escape, focus loss) through the
    /// engine. Pointer-downs and -ups are not handled here: the host
    /// hit-tests downs itself (see [`press`](ReorderEngine::press)) and
    /// routes ups through [`release`](ReorderEngine::release).
    pub fn handle_event(&mut self, event: &Event, bounds: &[ModuleBounds]) -> EngineUpdate {
        match self.gesture.process(event) {
            Some(DragPhase::Start { pos, .. }) | Some(DragPhase::Move { pos }) => {
                if self.compute_insertion(pos, bounds) {
                    match &self.active {
                        Some(active) => EngineUpdate::Provisional(active.provisional.clone()),
                        None => EngineUpdate::None,
                    }
                } else {
                    EngineUpdate::None
                }
            }
            Some(DragPhase::Cancel) => match self.active.take() {
                Some(active) => EngineUpdate::Restored(active.origin_order),
                None => EngineUpdate::None,
            },
            Some(DragPhase::End { .. }) | None => EngineUpdate::None,
        }
    }

    /// A pointer-up arrived; finish the gesture.
    ///
    /// On a completed drag the provisional order is committed through the
    /// registry. A rejected commit (which leaves the registry untouched)
    /// is reported with the order to restore visually.
    pub fn release<L>(
        &mut self,
        pos: Point,
        registry: &mut ModuleRegistry<L>,
    ) -> ReleaseResult {
        match self.gesture.pointer_up(pos) {
            ReleaseOutcome::Ignored => ReleaseResult::Ignored,
            ReleaseOutcome::WasClick => match self.active.take() {
                Some(active) => ReleaseResult::Click(active.dragged),
                None => ReleaseResult::Ignored,
            },
            ReleaseOutcome::Ended(_) => match self.active.take() {
                Some(active) => match registry.reorder(active.provisional.clone()) {
                    Ok(order) => ReleaseResult::Committed(order.to_vec()),
                    Err(error) => {
                        warn!(%error, "drag commit rejected; restoring pre-gesture order");
                        ReleaseResult::Reverted {
                            restored: active.origin_order,
                            error,
                        }
                    }
                },
                None => ReleaseResult::Ignored,
            },
        }
    }

    /// Abandon any gesture in progress. Returns the order to restore
    /// visually if a drag had altered the provisional layout.
    pub fn cancel(&mut self) -> Option<Vec<ModuleId>> {
        let was_dragging = self.gesture.is_dragging();
        self.gesture.cancel();
        let active = self.active.take()?;
        was_dragging.then_some(active.origin_order)
    }

    /// Discrete fallback: swap `id` with its predecessor and commit
    /// immediately. A module already first is left where it is.
    pub fn move_up<L>(
        &self,
        id: &ModuleId,
        registry: &mut ModuleRegistry<L>,
    ) -> Result<(), RegistryError> {
        let mut order = registry.order().to_vec();
        match order.iter().position(|m| m == id) {
            None => Err(RegistryError::UnknownModule(id.clone())),
            Some(0) => Ok(()),
            Some(idx) => {
                order.swap(idx - 1, idx);
                registry.reorder(order).map(|_| ())
            }
        }
    }

    /// Discrete fallback: swap `id` with its successor and commit
    /// immediately. A module already last is left where it is.
    pub fn move_down<L>(
        &self,
        id: &ModuleId,
        registry: &mut ModuleRegistry<L>,
    ) -> Result<(), RegistryError> {
        let mut order = registry.order().to_vec();
        match order.iter().position(|m| m == id) {
            None => Err(RegistryError::UnknownModule(id.clone())),
            Some(idx) if idx + 1 == order.len() => Ok(()),
            Some(idx) => {
                order.swap(idx, idx + 1);
                registry.reorder(order).map(|_| ())
            }
        }
    }

    /// Recompute the insertion point for a pointer position. Returns
    /// whether the provisional order changed.
    fn compute_insertion(&mut self, pos: Point, bounds: &[ModuleBounds]) -> bool {
        let Some(active) = &mut self.active else {
            return false;
        };
        // Panel under the pointer along the ordering axis, other than the
        // dragged one. Pointer outside the list: insertion unchanged.
        let Some(hit) = bounds
            .iter()
            .find(|b| b.id != active.dragged && self.axis.span_contains(&b.bounds, pos))
        else {
            return false;
        };

        let before = self.axis.coordinate(pos) < self.axis.midpoint(&hit.bounds);
        let remaining: Vec<ModuleId> = active
            .provisional
            .iter()
            .filter(|id| **id != active.dragged)
            .cloned()
            .collect();
        let Some(hit_idx) = remaining.iter().position(|id| *id == hit.id) else {
            return false;
        };
        let insertion = if before { hit_idx } else { hit_idx + 1 };

        let previous = active.target.as_ref().map(|t| t.insertion);
        if previous == Some(insertion) {
            // Same slot as last time; skip the layout churn.
            return false;
        }

        let mut next = remaining;
        next.insert(insertion, active.dragged.clone());
        active.provisional = next;
        active.target = Some(DropTarget {
            dragged: active.dragged.clone(),
            insertion,
            previous,
        });
        true
    }
}
