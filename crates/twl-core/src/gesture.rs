#![forbid(unsafe_code)]

//! Drag-gesture recognition: transforms raw pointer events into drag phases.
//!
//! [`DragGesture`] is a stateful recognizer. The host arms it when a
//! pointer-down lands on a drag affordance (the recognizer does no
//! hit-testing of its own), then feeds it subsequent pointer and key
//! events. The recognizer decides when an armed press becomes a drag and
//! emits [`DragPhase`]s the reorder engine consumes.
//!
//! # State Machine
//!
//! ```text
//! Idle --arm--> Armed --move beyond threshold--> Dragging
//!   ^             |  up (click, no drag)            | up -> End
//!   |             v                                 | Escape/focus loss -> Cancel
//!   +-------------+---------------------------------+
//! ```
//!
//! # Invariants
//!
//! 1. A single press-release interaction produces either a click (the
//!    recognizer stays silent and `pointer_up` reports `WasClick`) or a
//!    drag (`Start` .. `End`), never both.
//! 2. `Start` is emitted exactly once per drag, before any `Move`.
//! 3. After `End` or `Cancel` the recognizer is `Idle` again.
//! 4. Escape during a drag emits `Cancel`; Escape while merely armed
//!    disarms without emitting anything.
//!
//! # Failure Modes
//!
//! - Focus loss during a drag emits `Cancel` (same as Escape); the host
//!   is responsible for restoring any provisional visual state.

use crate::event::{Event, KeyCode, KeyEventKind, PointerEventKind};
use crate::geometry::Point;

/// Thresholds for drag recognition.
#[derive(Debug, Clone)]
pub struct DragConfig {
    /// Minimum manhattan distance (surface units) before an armed press
    /// becomes a drag (default: 3.0).
    pub start_threshold: f32,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self {
            start_threshold: 3.0,
        }
    }
}

/// A semantic drag phase emitted by the recognizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragPhase {
    /// The armed press moved beyond the threshold; a drag is now active.
    Start {
        /// Where the press was armed.
        origin: Point,
        /// Current pointer position.
        pos: Point,
    },
    /// The active drag moved.
    Move {
        /// Current pointer position.
        pos: Point,
    },
    /// The pointer was released while dragging.
    End {
        /// Release position.
        pos: Point,
    },
    /// The drag was abandoned (Escape or focus loss).
    Cancel,
}

/// Outcome of a pointer release, distinguishing click from drag-end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReleaseOutcome {
    /// No press was armed; the release is not ours.
    Ignored,
    /// The press never became a drag; the host may treat it as a click.
    WasClick,
    /// A drag was in progress and has ended at this position.
    Ended(Point),
}

#[derive(Debug, Clone, Copy)]
enum DragState {
    Idle,
    Armed { origin: Point },
    Dragging { origin: Point, last: Point },
}

/// Stateful drag recognizer.
///
/// Call [`arm`](DragGesture::arm) when a pointer-down lands on a drag
/// affordance, then route pointer/key events through
/// [`process`](DragGesture::process).
#[derive(Debug)]
pub struct DragGesture {
    config: DragConfig,
    state: DragState,
}

impl Default for DragGesture {
    fn default() -> Self {
        Self::new(DragConfig::default())
    }
}

impl DragGesture {
    /// Create a new recognizer with the given configuration.
    #[must_use]
    pub fn new(config: DragConfig) -> Self {
        Self {
            config,
            state: DragState::Idle,
        }
    }

    /// Arm the recognizer: a pointer-down landed on a drag affordance.
    ///
    /// Re-arming while a drag is active cancels the previous drag first
    /// and is reported through the returned phase.
    pub fn arm(&mut self, origin: Point) -> Option<DragPhase> {
        let cancelled = matches!(self.state, DragState::Dragging { .. });
        self.state = DragState::Armed { origin };
        cancelled.then_some(DragPhase::Cancel)
    }

    /// Whether a drag is currently active (past the start threshold).
    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Whether the recognizer is armed or dragging.
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        !matches!(self.state, DragState::Idle)
    }

    /// Feed a pointer movement. Returns the phase to act on, if any.
    pub fn pointer_moved(&mut self, pos: Point) -> Option<DragPhase> {
        match self.state {
            DragState::Idle => None,
            DragState::Armed { origin } => {
                if origin.manhattan_distance(pos) >= self.config.start_threshold {
                    self.state = DragState::Dragging { origin, last: pos };
                    #[cfg(feature = "tracing")]
                    tracing::debug!(?origin, ?pos, "drag started");
                    Some(DragPhase::Start { origin, pos })
                } else {
                    None
                }
            }
            DragState::Dragging { origin, last } => {
                if last == pos {
                    return None;
                }
                self.state = DragState::Dragging { origin, last: pos };
                Some(DragPhase::Move { pos })
            }
        }
    }

    /// Feed a pointer release.
    pub fn pointer_up(&mut self, pos: Point) -> ReleaseOutcome {
        match self.state {
            DragState::Idle => ReleaseOutcome::Ignored,
            DragState::Armed { .. } => {
                self.state = DragState::Idle;
                ReleaseOutcome::WasClick
            }
            DragState::Dragging { .. } => {
                self.state = DragState::Idle;
                ReleaseOutcome::Ended(pos)
            }
        }
    }

    /// Abandon any armed press or active drag.
    ///
    /// Returns `Some(Cancel)` only if a drag was actually in progress.
    pub fn cancel(&mut self) -> Option<DragPhase> {
        let was_dragging = self.is_dragging();
        self.state = DragState::Idle;
        was_dragging.then_some(DragPhase::Cancel)
    }

    /// Route a raw event through the recognizer.
    ///
    /// Handles pointer moves, Escape, and focus loss. Pointer-downs are
    /// not handled here: only the host knows whether a press landed on a
    /// drag affordance, so it must call [`arm`](DragGesture::arm) itself.
    /// Pointer-ups are also left to the host (via
    /// [`pointer_up`](DragGesture::pointer_up)) because the click/drag
    /// distinction feeds back into host behavior.
    pub fn process(&mut self, event: &Event) -> Option<DragPhase> {
        match event {
            Event::Pointer(p) if p.kind == PointerEventKind::Moved => {
                self.pointer_moved(p.position())
            }
            Event::Key(key) if key.kind == KeyEventKind::Press && key.code == KeyCode::Escape => {
                self.cancel()
            }
            Event::Focus(false) => self.cancel(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyEvent;

    fn drag() -> DragGesture {
        DragGesture::default()
    }

    #[test]
    fn press_release_without_movement_is_click() {
        let mut g = drag();
        assert!(g.arm(Point::new(5.0, 5.0)).is_none());
        assert_eq!(
            g.pointer_up(Point::new(5.0, 5.0)),
            ReleaseOutcome::WasClick
        );
        assert!(!g.is_engaged());
    }

    #[test]
    fn movement_below_threshold_stays_armed() {
        let mut g = drag();
        g.arm(Point::new(0.0, 0.0));
        assert!(g.pointer_moved(Point::new(1.0, 1.0)).is_none());
        assert!(!g.is_dragging());
        assert!(g.is_engaged());
    }

    #[test]
    fn movement_beyond_threshold_starts_drag() {
        let mut g = drag();
        g.arm(Point::new(0.0, 0.0));
        let phase = g.pointer_moved(Point::new(0.0, 5.0));
        assert!(matches!(phase, Some(DragPhase::Start { .. })));
        assert!(g.is_dragging());

        let phase = g.pointer_moved(Point::new(0.0, 9.0));
        assert_eq!(phase, Some(DragPhase::Move { pos: Point::new(0.0, 9.0) }));
    }

    #[test]
    fn stationary_move_during_drag_is_silent() {
        let mut g = drag();
        g.arm(Point::new(0.0, 0.0));
        g.pointer_moved(Point::new(0.0, 5.0));
        assert!(g.pointer_moved(Point::new(0.0, 5.0)).is_none());
    }

    #[test]
    fn drag_release_ends_not_clicks() {
        let mut g = drag();
        g.arm(Point::new(0.0, 0.0));
        g.pointer_moved(Point::new(0.0, 10.0));
        assert_eq!(
            g.pointer_up(Point::new(0.0, 10.0)),
            ReleaseOutcome::Ended(Point::new(0.0, 10.0))
        );
    }

    #[test]
    fn escape_cancels_active_drag() {
        let mut g = drag();
        g.arm(Point::new(0.0, 0.0));
        g.pointer_moved(Point::new(0.0, 10.0));
        let phase = g.process(&Event::Key(KeyEvent::new(KeyCode::Escape)));
        assert_eq!(phase, Some(DragPhase::Cancel));
        assert!(!g.is_engaged());
    }

    #[test]
    fn escape_while_armed_disarms_silently() {
        let mut g = drag();
        g.arm(Point::new(0.0, 0.0));
        assert!(g.process(&Event::Key(KeyEvent::new(KeyCode::Escape))).is_none());
        assert!(!g.is_engaged());
    }

    #[test]
    fn focus_loss_cancels() {
        let mut g = drag();
        g.arm(Point::new(0.0, 0.0));
        g.pointer_moved(Point::new(10.0, 0.0));
        assert_eq!(g.process(&Event::Focus(false)), Some(DragPhase::Cancel));
    }

    #[test]
    fn release_when_idle_is_ignored() {
        let mut g = drag();
        assert_eq!(g.pointer_up(Point::new(0.0, 0.0)), ReleaseOutcome::Ignored);
    }
}
