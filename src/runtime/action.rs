//! Action dispatch
//!
//! Actions are looked up by type in a [`HandlerMap`] and run strictly in
//! order. The [`ErrorPolicy`] decides whether the first failure stops the
//! batch or every failure is collected.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::document::{ActionDefinition, ErrorPolicy};
use super::error::{ActionError, ActionResult};
use super::host::{Camera, Diagram, NormalizedEvent, Overlay};

/// Executes one action type.
///
/// Implemented for any `Fn(ActionDefinition, ActionContext) -> impl Future`
/// so plain async closures can be registered directly.
pub trait ActionHandler: Send + Sync {
    /// Run `action`.
    fn handle(&self, action: ActionDefinition, ctx: ActionContext)
    -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> ActionHandler for F
where
    F: Fn(ActionDefinition, ActionContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle(
        &self,
        action: ActionDefinition,
        ctx: ActionContext,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        self(action, ctx).boxed()
    }
}

/// What a handler can see while it runs.
#[derive(Clone)]
pub struct ActionContext {
    /// Index of the step being entered or shown; `-1` for deck bindings.
    pub step_index: isize,
    /// Id of that step.
    pub step_id: Option<String>,
    /// Event that fired a binding, if any.
    pub event: Option<NormalizedEvent>,
    /// Live diagram.
    pub diagram: Arc<dyn Diagram>,
    /// Camera, when the host has one.
    pub camera: Option<Arc<dyn Camera>>,
    /// Overlay, when the host has one.
    pub overlay: Option<Arc<dyn Overlay>>,
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("step_index", &self.step_index)
            .field("step_id", &self.step_id)
            .field("event", &self.event)
            .field("camera", &self.camera.is_some())
            .field("overlay", &self.overlay.is_some())
            .finish()
    }
}

/// Action type to handler mapping, injected by the host application.
#[derive(Clone, Default)]
pub struct HandlerMap {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, handler: impl ActionHandler + 'static) -> &mut Self {
        self.handlers.insert(kind.into(), Arc::new(handler));
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        self.register(kind, handler);
        self
    }

    /// Handler for `kind`.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Whether a handler exists for `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerMap").field("kinds", &kinds).finish()
    }
}

enum Failure {
    Error(ActionError),
    Panic(Box<dyn Any + Send>),
}

/// Runs action batches against a [`HandlerMap`].
#[derive(Debug, Clone, Default)]
pub struct ActionEngine {
    handlers: HandlerMap,
}

impl ActionEngine {
    /// Engine over `handlers`.
    pub fn new(handlers: HandlerMap) -> Self {
        Self { handlers }
    }

    /// Registered handlers.
    pub fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    /// Run `actions` in order.
    ///
    /// Under [`ErrorPolicy::HaltOnError`] the first failure is returned as
    /// `Err` and later actions are skipped; a panicking handler is resumed
    /// unchanged. Under [`ErrorPolicy::ContinueOnError`] every action runs
    /// and the failures, panics included, come back in `Ok`.
    pub async fn run(
        &self,
        actions: &[ActionDefinition],
        ctx: &ActionContext,
        policy: ErrorPolicy,
    ) -> ActionResult<Vec<ActionError>> {
        let mut errors = Vec::new();
        for action in actions {
            let Err(failure) = self.dispatch(action, ctx).await else {
                continue;
            };
            let error = match (failure, policy) {
                (Failure::Error(error), _) => error,
                (Failure::Panic(payload), ErrorPolicy::HaltOnError) => panic::resume_unwind(payload),
                (Failure::Panic(payload), ErrorPolicy::ContinueOnError) => ActionError::Panicked {
                    kind: action.kind.clone(),
                    message: panic_message(payload.as_ref()),
                },
            };
            warn!(action = %action.kind, policy = policy.as_str(), "{error}");
            match policy {
                ErrorPolicy::HaltOnError => return Err(error),
                ErrorPolicy::ContinueOnError => errors.push(error),
            }
        }
        Ok(errors)
    }

    async fn dispatch(&self, action: &ActionDefinition, ctx: &ActionContext) -> Result<(), Failure> {
        let Some(handler) = self.handlers.get(&action.kind) else {
            return Err(Failure::Error(ActionError::UnknownAction {
                kind: action.kind.clone(),
            }));
        };
        debug!(action = %action.kind, step = ctx.step_index, "dispatching action");

        // A handler may panic while building its future or while polling it.
        let future = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(action.clone(), ctx.clone())))
            .map_err(Failure::Panic)?;
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Failure::Error(ActionError::Handler {
                kind: action.kind.clone(),
                message: format!("{err:#}"),
            })),
            Err(payload) => Err(Failure::Panic(payload)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::headless::HeadlessDiagram;
    use parking_lot::Mutex;

    fn context() -> ActionContext {
        ActionContext {
            step_index: 0,
            step_id: Some("s".into()),
            event: None,
            diagram: Arc::new(HeadlessDiagram::default()),
            camera: None,
            overlay: None,
        }
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>) -> HandlerMap {
        let ok = {
            let log = Arc::clone(log);
            move |action: ActionDefinition, _ctx: ActionContext| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(action.kind);
                    Ok::<_, anyhow::Error>(())
                }
            }
        };
        let failing = {
            let log = Arc::clone(log);
            move |action: ActionDefinition, _ctx: ActionContext| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(action.kind);
                    Err::<(), _>(anyhow::anyhow!("boom"))
                }
            }
        };
        HandlerMap::new()
            .with("a", ok.clone())
            .with("c", ok)
            .with("b", failing)
            .with("p", |action: ActionDefinition, _ctx: ActionContext| async move {
                if action.kind == "p" {
                    panic!("handler exploded");
                }
                Ok::<_, anyhow::Error>(())
            })
    }

    fn batch(kinds: &[&str]) -> Vec<ActionDefinition> {
        kinds.iter().map(|kind| ActionDefinition::new(*kind)).collect()
    }

    #[tokio::test]
    async fn continue_collects_every_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = ActionEngine::new(recording(&log));
        let errors = engine
            .run(&batch(&["a", "b", "missing", "c"]), &context(), ErrorPolicy::ContinueOnError)
            .await
            .expect("continue never fails");
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            errors[0],
            ActionError::Handler {
                kind: "b".into(),
                message: "boom".into()
            }
        );
        assert_eq!(errors[1], ActionError::UnknownAction { kind: "missing".into() });
    }

    #[tokio::test]
    async fn halt_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = ActionEngine::new(recording(&log));
        let outcome: ActionResult<Vec<ActionError>> = engine
            .run(&batch(&["a", "b", "c"]), &context(), ErrorPolicy::HaltOnError)
            .await;
        let err = outcome.expect_err("b fails");
        assert_eq!(err.action_type(), "b");
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn panics_are_captured_only_when_continuing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let engine = ActionEngine::new(recording(&log));
        let errors = engine
            .run(&batch(&["p", "a"]), &context(), ErrorPolicy::ContinueOnError)
            .await
            .expect("continue never fails");
        assert!(matches!(
            &errors[..],
            [ActionError::Panicked { kind, message }] if kind == "p" && message == "handler exploded"
        ));
        assert_eq!(*log.lock(), vec!["a"]);

        let halted = AssertUnwindSafe(engine.run(&batch(&["p", "a"]), &context(), ErrorPolicy::HaltOnError))
            .catch_unwind()
            .await;
        assert!(halted.is_err());
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn empty_batch_is_ok() {
        let engine = ActionEngine::default();
        let errors = engine
            .run(&[], &context(), ErrorPolicy::HaltOnError)
            .await
            .expect("nothing to fail");
        assert!(errors.is_empty());
    }
}
