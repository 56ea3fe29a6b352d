//! Controller event channel
//!
//! Handlers are plain callbacks. `emit` snapshots the handler list before
//! calling anything, so a handler may subscribe or unsubscribe while it runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use super::controller::ControllerState;
use super::error::ActionError;

/// Lifecycle event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A transition completed.
    StepChange,
    /// An action failed.
    ActionError,
    /// Any runtime error; every `actionerror` is repeated here.
    Error,
    /// The diagram should be rendered.
    Render,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StepChange => "stepchange",
            EventKind::ActionError => "actionerror",
            EventKind::Error => "error",
            EventKind::Render => "render",
        }
    }

    /// Parse a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stepchange" => Some(EventKind::StepChange),
            "actionerror" => Some(EventKind::ActionError),
            "error" => Some(EventKind::Error),
            "render" => Some(EventKind::Render),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// New controller state after a transition.
    StepChange(ControllerState),
    /// A failed action.
    ActionError(ActionError),
    /// Generic error channel.
    Error(ActionError),
    /// Render payload handed to `init`.
    Render(Value),
}

impl ControllerEvent {
    /// Which channel this event is delivered on.
    pub fn kind(&self) -> EventKind {
        match self {
            ControllerEvent::StepChange(_) => EventKind::StepChange,
            ControllerEvent::ActionError(_) => EventKind::ActionError,
            ControllerEvent::Error(_) => EventKind::Error,
            ControllerEvent::Render(_) => EventKind::Render,
        }
    }
}

/// Event callback.
pub type EventHandler = Arc<dyn Fn(&ControllerEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: BTreeMap<u64, (EventKind, EventHandler)>,
}

/// Fan-out of controller events to subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `kind`.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&ControllerEvent) + Send + Sync + 'static) -> Subscription {
        let handler: EventHandler = Arc::new(handler);
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.insert(id, (kind, handler));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to its subscribers in subscription order.
    pub fn emit(&self, event: ControllerEvent) {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .inner
            .lock()
            .handlers
            .values()
            .filter(|(subscribed, _)| *subscribed == kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    /// Drop every subscriber.
    pub fn clear(&self) {
        self.inner.lock().handlers.clear();
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("subscriptions", &self.len()).finish()
    }
}

/// Handle returned by [`EventBus::on`].
///
/// Dropping it keeps the handler registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Remove the handler. A no-op once the bus is gone or cleared.
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().handlers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_only_see_their_kind() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = bus.on(EventKind::Render, move |event| sink.lock().push(event.kind()));

        bus.emit(ControllerEvent::Render(Value::Null));
        bus.emit(ControllerEvent::Error(ActionError::UnknownAction { kind: "x".into() }));
        assert_eq!(*seen.lock(), vec![EventKind::Render]);

        sub.unsubscribe();
        bus.emit(ControllerEvent::Render(Value::Null));
        assert_eq!(seen.lock().len(), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn handler_may_unsubscribe_during_emit() {
        let bus = EventBus::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(Mutex::new(0));
        let (inner_slot, inner_hits) = (Arc::clone(&slot), Arc::clone(&hits));
        let sub = bus.on(EventKind::Render, move |_| {
            *inner_hits.lock() += 1;
            if let Some(sub) = inner_slot.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        bus.emit(ControllerEvent::Render(Value::Null));
        bus.emit(ControllerEvent::Render(Value::Null));
        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn names_round_trip() {
        for kind in [EventKind::StepChange, EventKind::ActionError, EventKind::Error, EventKind::Render] {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("click"), None);
    }
}
