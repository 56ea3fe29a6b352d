//! Step controller
//!
//! The [`Controller`] owns the current step index, the two binding scopes
//! (deck bindings live until [`destroy`](Controller::destroy), step bindings
//! are rebuilt on every transition) and the event bus. Transitions are
//! serialized: a `goto` issued while another is in flight waits for it, and
//! relative targets are resolved only once it is this call's turn. A `goto`
//! issued by an action of the running transition cannot wait for it, so it
//! is queued on its own task and the call returns at once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::PlaybackConfig;
use super::action::{ActionContext, ActionEngine, HandlerMap};
use super::binding::{BindingContext, BindingEngine, ErrorSink};
use super::document::{ActionDefinition, ErrorPolicy, PresentationDocument};
use super::error::{ActionError, ActionResult};
use super::events::{ControllerEvent, EventBus, EventKind, Subscription};
use super::headless::ImmediateFrames;
use super::host::{Camera, Diagram, EventHost, FrameClock, Overlay};

tokio::task_local! {
    // Set while a transition runs on the current task.
    static IN_TRANSITION: ();
}

/// Action run before every step to drop highlight state.
pub const STYLE_CLEAR_ACTION: &str = "style.clear";

/// Where a `goto` should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTarget {
    /// Absolute index; out of range is a no-op.
    Index(i64),
    /// Step id; unknown ids are a no-op.
    Id(String),
    /// Offset from the index current when the transition starts.
    Offset(i64),
}

impl From<i32> for StepTarget {
    fn from(index: i32) -> Self {
        StepTarget::Index(index.into())
    }
}

impl From<i64> for StepTarget {
    fn from(index: i64) -> Self {
        StepTarget::Index(index)
    }
}

impl From<usize> for StepTarget {
    fn from(index: usize) -> Self {
        StepTarget::Index(i64::try_from(index).unwrap_or(i64::MAX))
    }
}

impl From<&str> for StepTarget {
    fn from(id: &str) -> Self {
        StepTarget::Id(id.to_string())
    }
}

impl From<String> for StepTarget {
    fn from(id: String) -> Self {
        StepTarget::Id(id)
    }
}

/// Snapshot of the controller, as carried by `stepchange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerState {
    /// Current step, `-1` before the first step was entered.
    pub step_index: isize,
    /// Id of the current step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Steps in the document.
    pub step_count: usize,
    /// Last action error of the most recent transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_state: Option<ActionError>,
}

/// Everything a [`Controller`] is built from.
#[derive(Clone)]
pub struct ControllerConfig {
    /// Document to play.
    pub document: PresentationDocument,
    /// Rendered diagram.
    pub diagram: Arc<dyn Diagram>,
    /// Native event registration.
    pub host: Arc<dyn EventHost>,
    /// Action handlers.
    pub handlers: HandlerMap,
    /// Optional camera.
    pub camera: Option<Arc<dyn Camera>>,
    /// Optional overlay.
    pub overlay: Option<Arc<dyn Overlay>>,
    /// Frame pacing for the settle wait.
    pub frames: Arc<dyn FrameClock>,
    /// Playback tuning.
    pub playback: PlaybackConfig,
}

impl ControllerConfig {
    /// Config with no handlers, camera or overlay, and immediate frames.
    pub fn new(document: PresentationDocument, diagram: Arc<dyn Diagram>, host: Arc<dyn EventHost>) -> Self {
        Self {
            document,
            diagram,
            host,
            handlers: HandlerMap::new(),
            camera: None,
            overlay: None,
            frames: Arc::new(ImmediateFrames::default()),
            playback: PlaybackConfig::default(),
        }
    }

    /// Use `handlers`.
    pub fn with_handlers(mut self, handlers: HandlerMap) -> Self {
        self.handlers = handlers;
        self
    }

    /// Attach a camera.
    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Attach an overlay.
    pub fn with_overlay(mut self, overlay: Arc<dyn Overlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Use `frames` for the settle wait.
    pub fn with_frames(mut self, frames: Arc<dyn FrameClock>) -> Self {
        self.frames = frames;
        self
    }

    /// Use `playback`.
    pub fn with_playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }
}

impl fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("steps", &self.document.steps.len())
            .field("handlers", &self.handlers)
            .field("camera", &self.camera.is_some())
            .field("overlay", &self.overlay.is_some())
            .field("playback", &self.playback)
            .finish()
    }
}

#[derive(Debug)]
struct Position {
    step_index: isize,
    error_state: Option<ActionError>,
    destroyed: bool,
}

struct Inner {
    document: PresentationDocument,
    diagram: Arc<dyn Diagram>,
    camera: Option<Arc<dyn Camera>>,
    overlay: Option<Arc<dyn Overlay>>,
    frames: Arc<dyn FrameClock>,
    playback: PlaybackConfig,
    actions: Arc<ActionEngine>,
    events: EventBus,
    position: Mutex<Position>,
    deck_bindings: Mutex<BindingEngine>,
    step_bindings: Mutex<BindingEngine>,
    transition: tokio::sync::Mutex<()>,
}

/// Handle to a playing presentation. Clones share the same state.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    /// Build a controller. Nothing runs until [`init`](Self::init).
    pub fn new(config: ControllerConfig) -> Self {
        let ControllerConfig {
            document,
            diagram,
            host,
            handlers,
            camera,
            overlay,
            frames,
            playback,
        } = config;
        Self {
            inner: Arc::new(Inner {
                document,
                diagram,
                camera,
                overlay,
                frames,
                playback,
                actions: Arc::new(ActionEngine::new(handlers)),
                events: EventBus::new(),
                position: Mutex::new(Position {
                    step_index: -1,
                    error_state: None,
                    destroyed: false,
                }),
                deck_bindings: Mutex::new(BindingEngine::new(Arc::clone(&host))),
                step_bindings: Mutex::new(BindingEngine::new(host)),
                transition: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Document being played.
    pub fn document(&self) -> &PresentationDocument {
        &self.inner.document
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        let position = self.inner.position.lock();
        let step_id = usize::try_from(position.step_index)
            .ok()
            .and_then(|index| self.inner.document.steps.get(index))
            .map(|step| step.id.clone());
        ControllerState {
            step_index: position.step_index,
            step_id,
            step_count: self.inner.document.steps.len(),
            error_state: position.error_state.clone(),
        }
    }

    /// Whether [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.position.lock().destroyed
    }

    /// Subscribe to a lifecycle event.
    pub fn on(&self, kind: EventKind, handler: impl Fn(&ControllerEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.events.on(kind, handler)
    }

    /// Emit `render` when a payload is given, bind deck bindings, then enter
    /// the first step if there is one.
    pub async fn init(&self, render: Option<Value>) -> ActionResult<()> {
        info!(steps = self.inner.document.steps.len(), "presentation starting");
        if let Some(payload) = render {
            self.inner.events.emit(ControllerEvent::Render(payload));
        }
        let deck = self.binding_context(-1, None, self.inner.playback.default_error_policy);
        self.inner.deck_bindings.lock().bind(&self.inner.document.bindings, &deck);
        if self.inner.document.steps.is_empty() {
            return Ok(());
        }
        self.goto(0).await
    }

    /// Transition to `target`.
    ///
    /// Out-of-range indexes and unknown ids change nothing and emit nothing.
    /// Returns `Err` only when a `haltOnError` step aborts; the index then
    /// stays where it was and the new step's bindings are not attached.
    ///
    /// Called from inside a running transition, the move is queued behind
    /// it and this returns `Ok` immediately.
    pub async fn goto(&self, target: impl Into<StepTarget>) -> ActionResult<()> {
        let target = target.into();
        if IN_TRANSITION.try_with(|_| ()).is_ok() {
            self.defer(target);
            return Ok(());
        }
        IN_TRANSITION.scope((), self.transition(target)).await
    }

    fn defer(&self, target: StepTarget) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(?target, "nested goto dropped: no tokio runtime");
            return;
        };
        debug!(?target, "nested goto queued");
        let controller = self.clone();
        runtime.spawn(async move {
            if let Err(err) = IN_TRANSITION.scope((), controller.transition(target)).await {
                debug!("queued goto aborted: {err}");
            }
        });
    }

    async fn transition(&self, target: StepTarget) -> ActionResult<()> {
        let _transition = self.inner.transition.lock().await;
        if self.is_destroyed() {
            debug!(?target, "goto after destroy ignored");
            return Ok(());
        }
        let Some(index) = self.resolve(&target) else {
            debug!(?target, "goto out of range ignored");
            return Ok(());
        };
        let inner = &self.inner;
        let step = &inner.document.steps[index];
        let step_index = isize::try_from(index).unwrap_or(isize::MAX);
        debug!(from = self.state().step_index, to = step_index, step = %step.id, "transition started");

        inner.step_bindings.lock().destroy();
        if let Some(overlay) = &inner.overlay {
            overlay.clear();
        }
        let positions_camera = step
            .actions
            .first()
            .is_some_and(|action| action.kind.starts_with(&inner.playback.camera_action_prefix));
        if !positions_camera {
            if let Some(camera) = &inner.camera {
                camera.reset();
            }
        }

        let ctx = self.action_context(step_index, Some(step.id.clone()));
        let clear = [ActionDefinition::new(STYLE_CLEAR_ACTION)];
        if let Ok(errors) = inner.actions.run(&clear, &ctx, ErrorPolicy::ContinueOnError).await {
            if !errors.is_empty() {
                debug!(errors = errors.len(), "style reset errors ignored");
            }
        }

        for _ in 0..inner.playback.settle_frames {
            inner.frames.next_frame().await;
        }

        let policy = step.error_policy.unwrap_or(inner.playback.default_error_policy);
        let errors = match inner.actions.run(&step.actions, &ctx, policy).await {
            Ok(errors) => errors,
            Err(err) => {
                warn!(step = %step.id, "step aborted: {err}");
                inner.position.lock().error_state = Some(err.clone());
                self.emit_action_error(err.clone());
                return Err(err);
            }
        };
        for err in &errors {
            self.emit_action_error(err.clone());
        }

        {
            let mut position = inner.position.lock();
            position.step_index = step_index;
            position.error_state = errors.last().cloned();
        }
        let step_ctx = self.binding_context(step_index, Some(step.id.clone()), policy);
        inner.step_bindings.lock().bind(&step.bindings, &step_ctx);

        let state = self.state();
        info!(step = %step.id, index = step_index, errors = errors.len(), "step entered");
        inner.events.emit(ControllerEvent::StepChange(state));
        Ok(())
    }

    /// Go to the following step.
    pub async fn next(&self) -> ActionResult<()> {
        self.goto(StepTarget::Offset(1)).await
    }

    /// Go to the preceding step.
    pub async fn prev(&self) -> ActionResult<()> {
        self.goto(StepTarget::Offset(-1)).await
    }

    /// Go to the first step.
    pub async fn reset(&self) -> ActionResult<()> {
        self.goto(0).await
    }

    /// Release both binding scopes, destroy the collaborators and drop every
    /// subscriber. Later calls do nothing, as do transitions.
    pub fn destroy(&self) {
        let inner = &self.inner;
        {
            let mut position = inner.position.lock();
            if position.destroyed {
                return;
            }
            position.destroyed = true;
        }
        inner.deck_bindings.lock().destroy();
        inner.step_bindings.lock().destroy();
        if let Some(camera) = &inner.camera {
            camera.destroy();
        }
        if let Some(overlay) = &inner.overlay {
            overlay.destroy();
        }
        inner.diagram.destroy();
        inner.events.clear();
        info!("presentation destroyed");
    }

    fn resolve(&self, target: &StepTarget) -> Option<usize> {
        let count = self.inner.document.steps.len();
        let index = match target {
            StepTarget::Index(index) => *index,
            StepTarget::Id(id) => return self.inner.document.step_index(id),
            StepTarget::Offset(offset) => {
                let current = i64::try_from(self.inner.position.lock().step_index).ok()?;
                current.checked_add(*offset)?
            }
        };
        usize::try_from(index).ok().filter(|index| *index < count)
    }

    fn action_context(&self, step_index: isize, step_id: Option<String>) -> ActionContext {
        ActionContext {
            step_index,
            step_id,
            event: None,
            diagram: Arc::clone(&self.inner.diagram),
            camera: self.inner.camera.clone(),
            overlay: self.inner.overlay.clone(),
        }
    }

    fn binding_context(&self, step_index: isize, step_id: Option<String>, policy: ErrorPolicy) -> BindingContext {
        let events = self.inner.events.clone();
        let on_error: ErrorSink = Arc::new(move |err: ActionError| {
            events.emit(ControllerEvent::ActionError(err.clone()));
            events.emit(ControllerEvent::Error(err));
        });
        BindingContext {
            actions: Arc::clone(&self.inner.actions),
            action_context: self.action_context(step_index, step_id),
            policy,
            on_error,
        }
    }

    fn emit_action_error(&self, err: ActionError) {
        self.inner.events.emit(ControllerEvent::ActionError(err.clone()));
        self.inner.events.emit(ControllerEvent::Error(err));
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller").field("state", &self.state()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::document::StepDefinition;
    use crate::runtime::headless::{HeadlessCamera, HeadlessDiagram, HeadlessOverlay, MemoryHost};

    fn step(id: &str, kinds: &[&str]) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            actions: kinds.iter().map(|kind| ActionDefinition::new(*kind)).collect(),
            ..StepDefinition::default()
        }
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>) -> HandlerMap {
        let mut handlers = HandlerMap::new();
        for kind in ["noop", "camera.fit", STYLE_CLEAR_ACTION] {
            let log = Arc::clone(log);
            handlers.register(kind, move |action: ActionDefinition, _ctx: ActionContext| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(action.kind);
                    Ok::<_, anyhow::Error>(())
                }
            });
        }
        handlers
    }

    #[test]
    fn targets_convert() {
        assert_eq!(StepTarget::from(2), StepTarget::Index(2));
        assert_eq!(StepTarget::from(3usize), StepTarget::Index(3));
        assert_eq!(StepTarget::from("s2"), StepTarget::Id("s2".into()));
    }

    #[tokio::test]
    async fn camera_reset_skipped_when_step_positions_camera() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let camera = Arc::new(HeadlessCamera::default());
        let overlay = Arc::new(HeadlessOverlay::default());
        let frames = Arc::new(ImmediateFrames::default());
        let document = PresentationDocument {
            steps: vec![step("a", &["noop"]), step("b", &["camera.fit", "noop"])],
            ..PresentationDocument::default()
        };
        let config = ControllerConfig::new(document, Arc::new(HeadlessDiagram::default()), Arc::new(MemoryHost::new()))
            .with_handlers(recording(&log))
            .with_camera(camera.clone())
            .with_overlay(overlay.clone())
            .with_frames(frames.clone());
        let controller = Controller::new(config);

        controller.init(None).await.expect("init");
        assert_eq!(camera.resets(), 1);
        controller.next().await.expect("next");
        assert_eq!(camera.resets(), 1);
        assert_eq!(overlay.clears(), 2);
        assert_eq!(frames.frames(), 4);
        assert_eq!(
            *log.lock(),
            vec![STYLE_CLEAR_ACTION, "noop", STYLE_CLEAR_ACTION, "camera.fit", "noop"]
        );
    }

    #[tokio::test]
    async fn next_and_prev_stop_at_the_ends() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let document = PresentationDocument {
            steps: vec![step("a", &[]), step("b", &[])],
            ..PresentationDocument::default()
        };
        let controller = Controller::new(
            ControllerConfig::new(document, Arc::new(HeadlessDiagram::default()), Arc::new(MemoryHost::new()))
                .with_handlers(recording(&log)),
        );
        controller.init(None).await.expect("init");
        controller.prev().await.expect("prev");
        assert_eq!(controller.state().step_index, 0);
        controller.next().await.expect("next");
        controller.next().await.expect("next");
        assert_eq!(controller.state().step_id.as_deref(), Some("b"));
        controller.reset().await.expect("reset");
        assert_eq!(controller.state().step_index, 0);
    }

    #[tokio::test]
    async fn missing_style_clear_handler_is_swallowed() {
        let errors = Arc::new(Mutex::new(0));
        let document = PresentationDocument {
            steps: vec![step("a", &[])],
            ..PresentationDocument::default()
        };
        let controller = Controller::new(ControllerConfig::new(
            document,
            Arc::new(HeadlessDiagram::default()),
            Arc::new(MemoryHost::new()),
        ));
        let counter = Arc::clone(&errors);
        controller.on(EventKind::Error, move |_| *counter.lock() += 1);
        controller.init(None).await.expect("init");
        assert_eq!(*errors.lock(), 0);
        assert_eq!(controller.state().error_state, None);
    }

    #[tokio::test]
    async fn destroy_tears_everything_down_once() {
        let diagram = Arc::new(HeadlessDiagram::default());
        let camera = Arc::new(HeadlessCamera::default());
        let document = PresentationDocument {
            steps: vec![step("a", &[]), step("b", &[])],
            ..PresentationDocument::default()
        };
        let controller = Controller::new(
            ControllerConfig::new(document, diagram.clone(), Arc::new(MemoryHost::new())).with_camera(camera.clone()),
        );
        controller.on(EventKind::StepChange, |_| {});
        controller.init(None).await.expect("init");
        controller.destroy();
        controller.destroy();
        assert!(diagram.is_destroyed());
        assert!(camera.is_destroyed());
        assert!(controller.is_destroyed());

        controller.goto(1).await.expect("ignored");
        assert_eq!(controller.state().step_index, 0);
    }

    #[test]
    fn state_serializes_camel_case() {
        let state = ControllerState {
            step_index: 1,
            step_id: Some("s2".into()),
            step_count: 2,
            error_state: None,
        };
        assert_eq!(
            serde_json::to_value(&state).expect("json"),
            serde_json::json!({ "stepIndex": 1, "stepId": "s2", "stepCount": 2 })
        );
    }
}
