#![forbid(unsafe_code)]

//! Lifecycle events exposed to code outside the orchestrator.
//!
//! Styling, accessibility wiring, and other observers subscribe here
//! rather than to the store: these events fire at well-defined points
//! (after a render pass, on a health transition), not per store write.
//! The bus is purely in-memory; there is no persisted or wire format.
//!
//! Subscriptions follow the same RAII weak-callback shape as the store's:
//! dropping the guard unsubscribes, dead entries are pruned on emit, and
//! callbacks are collected before any is invoked so a subscriber may
//! re-enter the orchestrator.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::module::ModuleId;

/// An event the orchestrator announces to the outside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A committed state change relevant to rendering was applied and a
    /// render pass completed.
    ModulesChanged,
    /// A module moved to the degraded state.
    ModuleDegraded(ModuleId),
    /// The orchestration layer gave up and the static configuration took
    /// over.
    SystemFallback,
}

type CallbackRc = Rc<dyn Fn(&LifecycleEvent)>;
type CallbackWeak = Weak<dyn Fn(&LifecycleEvent)>;

/// Synchronous, in-memory event bus.
#[derive(Default)]
pub struct LifecycleBus {
    subscribers: RefCell<Vec<CallbackWeak>>,
}

impl fmt::Debug for LifecycleBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBus")
            .field("subscriber_count", &self.subscribers.borrow().len())
            .finish()
    }
}

impl LifecycleBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to lifecycle events. Dropping the returned guard
    /// unsubscribes.
    pub fn subscribe(&self, callback: impl Fn(&LifecycleEvent) + 'static) -> LifecycleSubscription {
        let strong: CallbackRc = Rc::new(callback);
        self.subscribers.borrow_mut().push(Rc::downgrade(&strong));
        LifecycleSubscription { _guard: strong }
    }

    /// Emit an event to all live subscribers, in subscription order.
    pub fn emit(&self, event: &LifecycleEvent) {
        let callbacks: Vec<CallbackRc> = {
            let mut subs = self.subscribers.borrow_mut();
            subs.retain(|w| w.strong_count() > 0);
            subs.iter().filter_map(Weak::upgrade).collect()
        };
        for cb in callbacks {
            cb(event);
        }
    }

    /// Number of registered subscribers (including dead ones not yet
    /// pruned).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }
}

/// RAII guard for a lifecycle subscriber.
pub struct LifecycleSubscription {
    _guard: CallbackRc,
}

impl fmt::Debug for LifecycleSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleSubscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn emit_reaches_subscribers_in_order() {
        let bus = LifecycleBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _s1 = bus.subscribe(move |_| l1.borrow_mut().push(1));
        let l2 = Rc::clone(&log);
        let _s2 = bus.subscribe(move |_| l2.borrow_mut().push(2));

        bus.emit(&LifecycleEvent::ModulesChanged);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn dropped_guard_stops_delivery() {
        let bus = LifecycleBus::new();
        let hits = Rc::new(Cell::new(0u32));
        let h = Rc::clone(&hits);
        let sub = bus.subscribe(move |_| h.set(h.get() + 1));

        bus.emit(&LifecycleEvent::SystemFallback);
        assert_eq!(hits.get(), 1);

        drop(sub);
        bus.emit(&LifecycleEvent::SystemFallback);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn event_payload_carries_module() {
        let bus = LifecycleBus::new();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            if let LifecycleEvent::ModuleDegraded(id) = event {
                *s.borrow_mut() = Some(id.clone());
            }
        });

        bus.emit(&LifecycleEvent::ModuleDegraded(ModuleId::new("ji")));
        assert_eq!(seen.borrow().as_ref().map(|m| m.as_str().to_string()), Some("ji".into()));
    }
}
