//! In-memory collaborators.
//!
//! These back the CLI's headless playback and the test suite. Nothing is
//! rendered; calls are counted and logged.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::debug;

use super::document::{TargetDescriptor, TargetSpec};
use super::host::{
    Camera, Diagram, ElementRef, EventHost, EventTarget, FrameClock, HostEvent, Listener,
    ListenerId, Overlay,
};

/// Id of the headless diagram's root element.
pub const HEADLESS_ROOT: &str = "diagram-root";

/// Diagram made of a fixed set of element ids.
#[derive(Debug, Default)]
pub struct HeadlessDiagram {
    elements: HashSet<String>,
    destroyed: AtomicBool,
}

impl HeadlessDiagram {
    /// Diagram containing the given element ids.
    pub fn new<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Whether [`Diagram::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn known(&self, id: &str) -> Option<ElementRef> {
        self.elements.contains(id).then(|| ElementRef::new(id))
    }
}

impl Diagram for HeadlessDiagram {
    fn resolve_target(&self, target: &TargetDescriptor) -> Option<ElementRef> {
        match target {
            TargetDescriptor::Raw(raw) => self.known(raw.trim_start_matches('#')),
            TargetDescriptor::Spec(
                TargetSpec::Node { id } | TargetSpec::Subgraph { id } | TargetSpec::Id { id },
            ) => self.known(id),
            TargetDescriptor::Spec(TargetSpec::Edge { id: Some(id), .. }) => self.known(id),
            TargetDescriptor::Spec(TargetSpec::Edge {
                from: Some(from),
                to: Some(to),
                ..
            }) => self.known(&format!("{from}->{to}")),
            TargetDescriptor::Spec(_) => None,
        }
    }

    fn root(&self) -> ElementRef {
        ElementRef::new(HEADLESS_ROOT)
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Camera that counts resets.
#[derive(Debug, Default)]
pub struct HeadlessCamera {
    resets: AtomicUsize,
    destroyed: AtomicBool,
}

impl HeadlessCamera {
    /// Number of [`Camera::reset`] calls so far.
    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Whether [`Camera::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Camera for HeadlessCamera {
    fn reset(&self) {
        debug!("camera reset");
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Overlay that counts clears.
#[derive(Debug, Default)]
pub struct HeadlessOverlay {
    clears: AtomicUsize,
    destroyed: AtomicBool,
}

impl HeadlessOverlay {
    /// Number of [`Overlay::clear`] calls so far.
    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Whether [`Overlay::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Overlay for HeadlessOverlay {
    fn clear(&self) {
        debug!("overlay cleared");
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Frame clock that only yields to the scheduler.
#[derive(Debug, Default)]
pub struct ImmediateFrames {
    frames: AtomicUsize,
}

impl ImmediateFrames {
    /// Frames handed out so far.
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

impl FrameClock for ImmediateFrames {
    fn next_frame(&self) -> BoxFuture<'static, ()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Box::pin(tokio::task::yield_now())
    }
}

/// Frame clock ticking on a fixed interval.
#[derive(Debug, Clone)]
pub struct IntervalFrames {
    interval: Duration,
}

impl IntervalFrames {
    /// Frames every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl FrameClock for IntervalFrames {
    fn next_frame(&self) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(self.interval))
    }
}

struct Registration {
    target: EventTarget,
    event: String,
    listener: Listener,
}

/// Event host that keeps listeners in memory and delivers on demand.
#[derive(Default)]
pub struct MemoryHost {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Registration>>,
}

impl MemoryHost {
    /// Empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Deliver `event` to listeners on its target and on the window, in
    /// registration order, awaiting each. Returns how many ran.
    pub async fn dispatch(&self, event: HostEvent) -> usize {
        let matching: Vec<Listener> = {
            let listeners = self.listeners.lock();
            listeners
                .values()
                .filter(|reg| reg.event == event.name)
                .filter(|reg| reg.target == event.target || reg.target == EventTarget::Window)
                .map(|reg| Arc::clone(&reg.listener))
                .collect()
        };
        debug!(event = %event.name, target = %event.target, listeners = matching.len(), "dispatching host event");
        for listener in &matching {
            listener(event.clone()).await;
        }
        matching.len()
    }
}

impl EventHost for MemoryHost {
    fn add_listener(&self, target: EventTarget, event: &str, listener: Listener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(
            id,
            Registration {
                target,
                event: event.to_string(),
                listener,
            },
        );
        ListenerId(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn resolves_known_ids_only() {
        let diagram = HeadlessDiagram::new(["A", "B", "A->B"]);
        let node = TargetDescriptor::Spec(TargetSpec::Node { id: "A".into() });
        assert_eq!(diagram.resolve_target(&node), Some(ElementRef::new("A")));
        let edge = TargetDescriptor::Spec(TargetSpec::Edge {
            id: None,
            from: Some("A".into()),
            to: Some("B".into()),
        });
        assert_eq!(diagram.resolve_target(&edge), Some(ElementRef::new("A->B")));
        assert_eq!(diagram.resolve_target(&TargetDescriptor::Raw("#B".into())), Some(ElementRef::new("B")));
        assert_eq!(diagram.resolve_target(&TargetDescriptor::Raw("Z".into())), None);
    }

    #[tokio::test]
    async fn dispatch_reaches_target_and_window_listeners() {
        let host = MemoryHost::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let make = |hits: Arc<AtomicUsize>| -> Listener {
            Arc::new(move |_event: HostEvent| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
                .boxed()
            })
        };
        let a = EventTarget::Element(ElementRef::new("A"));
        host.add_listener(a.clone(), "click", make(Arc::clone(&hits)));
        host.add_listener(EventTarget::Window, "click", make(Arc::clone(&hits)));
        let other = host.add_listener(EventTarget::Element(ElementRef::new("B")), "click", make(Arc::clone(&hits)));

        assert_eq!(host.dispatch(HostEvent::new("click", a.clone())).await, 2);
        host.remove_listener(other);
        assert_eq!(host.listener_count(), 2);
        assert_eq!(host.dispatch(HostEvent::new("mouseenter", a)).await, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
