//! Presentation runtime and public API
//!
//! A [`Controller`] walks a [`PresentationDocument`] step by step. Actions
//! go through the [`ActionEngine`], event bindings through
//! [`BindingEngine`]s, and everything that touches pixels or native events is
//! supplied by the embedding application through the traits in [`host`].

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Submodules
pub mod action;
pub mod binding;
pub mod controller;
pub mod document;
pub mod error;
pub mod events;
pub mod headless;
pub mod host;

/// Tuning knobs for playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlaybackConfig {
    /// Policy for steps that do not declare one
    pub default_error_policy: ErrorPolicy,

    /// Frames to wait between clearing the previous step and running the next
    pub settle_frames: u32,

    /// Action types with this prefix position the camera themselves
    pub camera_action_prefix: String,

    /// Frame interval for interval-driven frame clocks
    pub frame_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_error_policy: ErrorPolicy::ContinueOnError,
            settle_frames: 2,
            camera_action_prefix: "camera.".to_string(),
            frame_interval_ms: 16,
        }
    }
}

impl PlaybackConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let data = fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|err| RuntimeError::Config(format!("{}: {err}", path.display())))
    }

    /// [`frame_interval_ms`](Self::frame_interval_ms) as a duration
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

// Re-export commonly used types
pub use action::{ActionContext, ActionEngine, ActionHandler, HandlerMap};
pub use binding::{BindingContext, BindingEngine};
pub use controller::{Controller, ControllerConfig, ControllerState, StepTarget};
pub use document::{
    ActionDefinition, BindingDefinition, BindingEvent, ErrorPolicy, PresentationDocument,
    StepDefinition, TargetDescriptor, TargetSpec,
};
pub use error::{ActionError, ActionResult, DocumentError, RuntimeError, RuntimeResult};
pub use events::{ControllerEvent, EventKind, Subscription};
