//! Error types for the presentation runtime
//!
//! Domain errors use thiserror; action handlers and the CLI work in anyhow
//! and are converted at the action-engine boundary.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Action failed under `haltOnError`
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// Document could not be loaded
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Failure of a single action
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "camelCase")]
pub enum ActionError {
    /// No handler is registered for the action type
    #[error("Unknown action '{kind}'")]
    UnknownAction {
        /// Action type
        kind: String,
    },

    /// Handler returned an error
    #[error("Action '{kind}' failed: {message}")]
    Handler {
        /// Action type
        kind: String,
        /// Rendered handler error, including its causes
        message: String,
    },

    /// Handler panicked and the panic was captured
    #[error("Action '{kind}' panicked: {message}")]
    Panicked {
        /// Action type
        kind: String,
        /// Panic payload, when it was a string
        message: String,
    },
}

impl ActionError {
    /// Type of the action that failed.
    pub fn action_type(&self) -> &str {
        match self {
            ActionError::UnknownAction { kind }
            | ActionError::Handler { kind, .. }
            | ActionError::Panicked { kind, .. } => kind,
        }
    }
}

/// Presentation document errors
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Malformed JSON or wrong shape
    #[error("Invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Two steps share an id
    #[error("Duplicate step id '{0}'")]
    DuplicateStepId(String),

    /// Step without an id
    #[error("Step {0} has an empty id")]
    EmptyStepId(usize),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Result type for document operations
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

/// Result type for action execution
pub type ActionResult<T> = std::result::Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_action() {
        let err = ActionError::Handler {
            kind: "style.highlight".into(),
            message: "no such node".into(),
        };
        assert_eq!(err.to_string(), "Action 'style.highlight' failed: no such node");
        assert_eq!(err.action_type(), "style.highlight");

        let wrapped: RuntimeError = ActionError::UnknownAction { kind: "x".into() }.into();
        assert_eq!(wrapped.to_string(), "Action error: Unknown action 'x'");
    }
}
