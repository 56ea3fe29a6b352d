//! Collaborator contracts consumed by the runtime.
//!
//! Rendering, camera motion, overlays, frame pacing and native event
//! delivery all live outside the core. The controller receives them as
//! trait objects through [`ControllerConfig`](super::ControllerConfig).

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::document::TargetDescriptor;

/// Opaque handle to a rendered element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

impl ElementRef {
    /// Handle for the element with `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a listener is attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventTarget {
    /// Global target; receives every event that is not stopped.
    Window,
    /// A rendered element.
    Element(ElementRef),
}

impl fmt::Display for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTarget::Window => f.write_str("window"),
            EventTarget::Element(element) => element.fmt(f),
        }
    }
}

/// The live diagram.
pub trait Diagram: Send + Sync {
    /// Element for a binding target, if it exists in the rendered diagram.
    fn resolve_target(&self, target: &TargetDescriptor) -> Option<ElementRef>;

    /// Root element of the rendered diagram.
    fn root(&self) -> ElementRef;

    /// Release rendering resources.
    fn destroy(&self);
}

/// Viewport control.
pub trait Camera: Send + Sync {
    /// Return to the resting viewport.
    fn reset(&self);

    /// Release camera resources.
    fn destroy(&self);
}

/// Callouts and tooltips drawn over the diagram.
pub trait Overlay: Send + Sync {
    /// Remove everything currently shown.
    fn clear(&self);

    /// Release overlay resources.
    fn destroy(&self);
}

/// Yields to the renderer between transition phases.
pub trait FrameClock: Send + Sync {
    /// Resolves at the next frame boundary.
    fn next_frame(&self) -> BoxFuture<'static, ()>;
}

/// Native event as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    /// Native event name, e.g. `click` or `keydown`.
    pub name: String,
    /// Element the event originated on.
    pub target: EventTarget,
    /// Host timestamp in milliseconds.
    pub time_stamp: f64,
    /// Pointer x coordinate for mouse events.
    pub client_x: Option<f64>,
    /// Pointer y coordinate for mouse events.
    pub client_y: Option<f64>,
    /// Key name for keyboard events.
    pub key: Option<String>,
}

impl HostEvent {
    /// Event with only a name and target.
    pub fn new(name: impl Into<String>, target: EventTarget) -> Self {
        Self {
            name: name.into(),
            target,
            time_stamp: 0.0,
            client_x: None,
            client_y: None,
            key: None,
        }
    }

    /// `keydown` on the window.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::new("keydown", EventTarget::Window)
        }
    }

    /// Pointer event at a position.
    pub fn pointer(name: impl Into<String>, target: EventTarget, x: f64, y: f64) -> Self {
        Self {
            client_x: Some(x),
            client_y: Some(y),
            ..Self::new(name, target)
        }
    }
}

/// Stable event shape handed to actions fired by bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Native event name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Element the event originated on.
    pub target: EventTarget,
    /// Element the listener was attached to.
    pub current_target: EventTarget,
    /// Host timestamp in milliseconds.
    pub time_stamp: f64,
    /// Pointer x coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_x: Option<f64>,
    /// Pointer y coordinate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_y: Option<f64>,
    /// Key name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl NormalizedEvent {
    /// Normalize a native event received by a listener on `current_target`.
    pub fn from_host(event: &HostEvent, current_target: &EventTarget) -> Self {
        Self {
            kind: event.name.clone(),
            target: event.target.clone(),
            current_target: current_target.clone(),
            time_stamp: event.time_stamp,
            client_x: event.client_x,
            client_y: event.client_y,
            key: event.key.clone(),
        }
    }

    /// Synthetic event for a timer binding.
    pub fn timer(current_target: EventTarget, time_stamp: f64) -> Self {
        Self {
            kind: "timer".to_string(),
            target: current_target.clone(),
            current_target,
            time_stamp,
            client_x: None,
            client_y: None,
            key: None,
        }
    }
}

/// Listener callback. The host may await the returned future or spawn it.
pub type Listener = Arc<dyn Fn(HostEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned by [`EventHost::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Native event registration.
pub trait EventHost: Send + Sync {
    /// Attach `listener` for `event` on `target`.
    fn add_listener(&self, target: EventTarget, event: &str, listener: Listener) -> ListenerId;

    /// Detach a listener. Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalized_events_serialize_compactly() {
        let host = HostEvent::pointer("click", EventTarget::Element(ElementRef::new("A")), 4.0, 8.0);
        let event = NormalizedEvent::from_host(&host, &EventTarget::Element(ElementRef::new("root")));
        assert_eq!(
            serde_json::to_value(&event).expect("json"),
            json!({
                "type": "click",
                "target": { "element": "A" },
                "currentTarget": { "element": "root" },
                "timeStamp": 0.0,
                "clientX": 4.0,
                "clientY": 8.0
            })
        );
        assert_eq!(EventTarget::Window.to_string(), "window");
    }
}
