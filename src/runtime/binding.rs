//! Event bindings
//!
//! A [`BindingEngine`] owns the listener and timer handles created by
//! [`bind`](BindingEngine::bind). They are released together by
//! [`destroy`](BindingEngine::destroy) or when the engine is dropped; there
//! is no way to remove a single binding.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::action::{ActionContext, ActionEngine};
use super::document::{ActionDefinition, BindingDefinition, BindingEvent, ErrorPolicy};
use super::error::ActionError;
use super::host::{EventHost, EventTarget, HostEvent, Listener, ListenerId, NormalizedEvent};

/// Receives every action error raised by a fired binding.
pub type ErrorSink = Arc<dyn Fn(ActionError) + Send + Sync>;

/// Everything a fired binding needs to run its actions.
#[derive(Clone)]
pub struct BindingContext {
    /// Engine the actions are dispatched through.
    pub actions: Arc<ActionEngine>,
    /// Context passed to handlers; its `event` is filled in per firing.
    pub action_context: ActionContext,
    /// Ambient error policy.
    pub policy: ErrorPolicy,
    /// Error callback.
    pub on_error: ErrorSink,
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext")
            .field("action_context", &self.action_context)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BindingContext {
    async fn fire(&self, actions: &[ActionDefinition], event: NormalizedEvent) {
        debug!(event = %event.kind, target = %event.current_target, actions = actions.len(), "binding fired");
        let ctx = ActionContext {
            event: Some(event),
            ..self.action_context.clone()
        };
        match self.actions.run(actions, &ctx, self.policy).await {
            Ok(errors) => errors.into_iter().for_each(|err| (self.on_error)(err)),
            Err(err) => (self.on_error)(err),
        }
    }
}

/// Native event name a binding listens for.
pub fn native_event_name(binding: &BindingDefinition) -> Option<String> {
    match binding.event {
        BindingEvent::Click => Some("click".to_string()),
        BindingEvent::Hover => Some("mouseenter".to_string()),
        BindingEvent::Key => Some("keydown".to_string()),
        BindingEvent::Custom => binding.event_name.clone(),
        BindingEvent::Timer => None,
    }
}

/// Listener and timer registrations for one binding scope.
pub struct BindingEngine {
    host: Arc<dyn EventHost>,
    listeners: Vec<ListenerId>,
    timers: Vec<JoinHandle<()>>,
}

impl BindingEngine {
    /// Engine registering listeners on `host`.
    pub fn new(host: Arc<dyn EventHost>) -> Self {
        Self {
            host,
            listeners: Vec::new(),
            timers: Vec::new(),
        }
    }

    /// Register every binding in `bindings`.
    ///
    /// Timer bindings need a running tokio runtime; outside one they are
    /// skipped with a warning.
    pub fn bind(&mut self, bindings: &[BindingDefinition], ctx: &BindingContext) {
        for binding in bindings {
            if binding.event == BindingEvent::Timer {
                self.bind_timer(binding, ctx);
            } else {
                self.bind_listener(binding, ctx);
            }
        }
    }

    fn bind_timer(&mut self, binding: &BindingDefinition, ctx: &BindingContext) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("timer binding skipped: no tokio runtime");
            return;
        };
        let delay_ms = binding.delay_ms.unwrap_or(0);
        let current_target = EventTarget::Element(ctx.action_context.diagram.root());
        let actions = binding.actions.clone();
        let ctx = ctx.clone();
        debug!(delay_ms, "timer binding scheduled");
        let fire_on = runtime.clone();
        // Only the sleep is abortable; fired actions run on their own task.
        let handle = runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            // Timestamp is the delay since binding.
            let event = NormalizedEvent::timer(current_target, delay_ms as f64);
            fire_on.spawn(async move { ctx.fire(&actions, event).await });
        });
        self.timers.push(handle);
    }

    fn bind_listener(&mut self, binding: &BindingDefinition, ctx: &BindingContext) {
        let Some(name) = native_event_name(binding) else {
            warn!(event = binding.event.as_str(), "custom binding without an event name skipped");
            return;
        };
        let diagram = &ctx.action_context.diagram;
        let current_target = binding
            .target
            .as_ref()
            .and_then(|target| diagram.resolve_target(target))
            .map(EventTarget::Element)
            .unwrap_or_else(|| match binding.event {
                BindingEvent::Key => EventTarget::Window,
                _ => EventTarget::Element(diagram.root()),
            });
        let key_filter = match binding.event {
            BindingEvent::Key => binding.key.clone(),
            _ => None,
        };

        let actions: Arc<[ActionDefinition]> = binding.actions.clone().into();
        let ctx = ctx.clone();
        let listener_target = current_target.clone();
        let listener: Listener = Arc::new(move |event: HostEvent| {
            let (ctx, actions) = (ctx.clone(), Arc::clone(&actions));
            let current_target = listener_target.clone();
            let key_filter = key_filter.clone();
            async move {
                if let Some(expected) = key_filter {
                    if event.key.as_deref() != Some(expected.as_str()) {
                        return;
                    }
                }
                let normalized = NormalizedEvent::from_host(&event, &current_target);
                ctx.fire(&actions, normalized).await;
            }
            .boxed()
        });

        debug!(event = %name, target = %current_target, "listener attached");
        let id = self.host.add_listener(current_target, &name, listener);
        self.listeners.push(id);
    }

    /// Detach every listener and cancel every pending timer.
    ///
    /// Timers that already elapsed are unaffected; their actions finish.
    pub fn destroy(&mut self) {
        if self.listeners.is_empty() && self.timers.is_empty() {
            return;
        }
        debug!(listeners = self.listeners.len(), timers = self.timers.len(), "bindings released");
        for id in self.listeners.drain(..) {
            self.host.remove_listener(id);
        }
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    /// Attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Scheduled timers, fired or not.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }
}

impl fmt::Debug for BindingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingEngine")
            .field("listeners", &self.listeners)
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl Drop for BindingEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::action::HandlerMap;
    use crate::runtime::document::TargetDescriptor;
    use crate::runtime::headless::{HEADLESS_ROOT, HeadlessDiagram, MemoryHost};
    use crate::runtime::host::ElementRef;
    use parking_lot::Mutex;

    struct Fixture {
        host: Arc<MemoryHost>,
        fired: Arc<Mutex<Vec<NormalizedEvent>>>,
        errors: Arc<Mutex<Vec<ActionError>>>,
        ctx: BindingContext,
    }

    fn fixture() -> Fixture {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let handlers = HandlerMap::new().with("record", move |_action: ActionDefinition, ctx: ActionContext| {
            let sink = Arc::clone(&sink);
            async move {
                if let Some(event) = ctx.event {
                    sink.lock().push(event);
                }
                Ok::<_, anyhow::Error>(())
            }
        });
        let error_sink = Arc::clone(&errors);
        let ctx = BindingContext {
            actions: Arc::new(ActionEngine::new(handlers)),
            action_context: ActionContext {
                step_index: 0,
                step_id: None,
                event: None,
                diagram: Arc::new(HeadlessDiagram::new(["A"])),
                camera: None,
                overlay: None,
            },
            policy: ErrorPolicy::ContinueOnError,
            on_error: Arc::new(move |err| error_sink.lock().push(err)),
        };
        Fixture {
            host: Arc::new(MemoryHost::new()),
            fired,
            errors,
            ctx,
        }
    }

    fn binding(event: BindingEvent, kind: &str) -> BindingDefinition {
        BindingDefinition {
            actions: vec![ActionDefinition::new(kind)],
            ..BindingDefinition::new(event)
        }
    }

    #[tokio::test]
    async fn listeners_map_event_names_and_targets() {
        let f = fixture();
        let mut engine = BindingEngine::new(f.host.clone());
        let click = BindingDefinition {
            target: Some(TargetDescriptor::Raw("A".into())),
            ..binding(BindingEvent::Click, "record")
        };
        let hover = BindingDefinition {
            target: Some(TargetDescriptor::Raw("missing".into())),
            ..binding(BindingEvent::Hover, "record")
        };
        engine.bind(&[click, hover], &f.ctx);
        assert_eq!(engine.listener_count(), 2);

        let a = EventTarget::Element(ElementRef::new("A"));
        let root = EventTarget::Element(ElementRef::new(HEADLESS_ROOT));
        assert_eq!(f.host.dispatch(HostEvent::pointer("click", a.clone(), 1.0, 2.0)).await, 1);
        assert_eq!(f.host.dispatch(HostEvent::new("mouseenter", root.clone())).await, 1);
        assert_eq!(f.host.dispatch(HostEvent::new("mouseenter", a.clone())).await, 0);

        let fired = f.fired.lock().clone();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].kind, "click");
        assert_eq!(fired[0].current_target, a);
        assert_eq!(fired[0].client_x, Some(1.0));
        assert_eq!(fired[1].current_target, root);
    }

    #[tokio::test]
    async fn key_bindings_filter_on_key() {
        let f = fixture();
        let mut engine = BindingEngine::new(f.host.clone());
        let key = BindingDefinition {
            key: Some("ArrowRight".into()),
            ..binding(BindingEvent::Key, "record")
        };
        engine.bind(&[key], &f.ctx);

        f.host.dispatch(HostEvent::key("ArrowLeft")).await;
        f.host.dispatch(HostEvent::key("ArrowRight")).await;
        let fired = f.fired.lock().clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].key.as_deref(), Some("ArrowRight"));
        assert_eq!(fired[0].current_target, EventTarget::Window);
    }

    #[tokio::test]
    async fn errors_reach_the_sink() {
        let f = fixture();
        let mut engine = BindingEngine::new(f.host.clone());
        let custom = BindingDefinition {
            event_name: Some("poke".into()),
            ..binding(BindingEvent::Custom, "nope")
        };
        engine.bind(&[custom], &f.ctx);
        f.host
            .dispatch(HostEvent::new("poke", EventTarget::Element(ElementRef::new(HEADLESS_ROOT))))
            .await;
        assert_eq!(*f.errors.lock(), vec![ActionError::UnknownAction { kind: "nope".into() }]);
    }

    #[tokio::test]
    async fn destroy_detaches_everything() {
        let f = fixture();
        let mut engine = BindingEngine::new(f.host.clone());
        engine.bind(&[binding(BindingEvent::Click, "record")], &f.ctx);
        assert_eq!(f.host.listener_count(), 1);
        engine.destroy();
        assert_eq!(f.host.listener_count(), 0);
        assert_eq!(engine.listener_count(), 0);

        engine.bind(&[binding(BindingEvent::Click, "record")], &f.ctx);
        drop(engine);
        assert_eq!(f.host.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_once_and_cancel_on_destroy() {
        let f = fixture();
        let mut engine = BindingEngine::new(f.host.clone());
        let timer = BindingDefinition {
            delay_ms: Some(100),
            ..binding(BindingEvent::Timer, "record")
        };
        engine.bind(&[timer.clone()], &f.ctx);
        assert_eq!(engine.timer_count(), 1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(f.fired.lock().len(), 1);
        assert_eq!(f.fired.lock()[0].kind, "timer");

        engine.bind(&[timer], &f.ctx);
        engine.destroy();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(f.fired.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_actions_survive_destroying_their_engine() {
        let f = fixture();
        let engine = Arc::new(Mutex::new(BindingEngine::new(f.host.clone())));
        let finished = Arc::new(Mutex::new(false));
        let (owner, done) = (Arc::clone(&engine), Arc::clone(&finished));
        let handlers = HandlerMap::new().with("teardown", move |_action: ActionDefinition, _ctx: ActionContext| {
            let (owner, done) = (Arc::clone(&owner), Arc::clone(&done));
            async move {
                owner.lock().destroy();
                tokio::task::yield_now().await;
                *done.lock() = true;
                Ok::<_, anyhow::Error>(())
            }
        });
        let ctx = BindingContext {
            actions: Arc::new(ActionEngine::new(handlers)),
            ..f.ctx.clone()
        };
        let timer = BindingDefinition {
            delay_ms: Some(50),
            ..binding(BindingEvent::Timer, "teardown")
        };
        engine.lock().bind(&[timer], &ctx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(*finished.lock());
        assert_eq!(engine.lock().timer_count(), 0);
        assert!(f.errors.lock().is_empty());
    }
}
