//! Presentation documents: the runtime's normalized input.
//!
//! A document is produced either by normalizing an MPD program or by
//! deserializing the equivalent JSON. It is read-only once constructed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{DocumentError, DocumentResult};

pub use crate::compiler::ast::EventKind as BindingEvent;

/// Ordered steps plus deck-level bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationDocument {
    /// Steps in playback order. Ids are unique.
    pub steps: Vec<StepDefinition>,
    /// Bindings that live until the controller is destroyed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingDefinition>,
    /// Diagram source carried along for the `render` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram: Option<DiagramSpec>,
    /// Free-form document metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl PresentationDocument {
    /// Parse a JSON document and check its invariants.
    pub fn from_json(json: &str) -> DocumentResult<Self> {
        let document: Self = serde_json::from_str(json)?;
        document.validate()?;
        Ok(document)
    }

    /// Build from an already-parsed JSON value.
    pub fn from_value(value: Value) -> DocumentResult<Self> {
        let document: Self = serde_json::from_value(value)?;
        document.validate()?;
        Ok(document)
    }

    /// Step ids must be non-empty and unique.
    pub fn validate(&self) -> DocumentResult<()> {
        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.id.is_empty() {
                return Err(DocumentError::EmptyStepId(index));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(DocumentError::DuplicateStepId(step.id.clone()));
            }
        }
        Ok(())
    }

    /// Index of the step with `id`.
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == id)
    }

    /// Payload for the controller's `render` event.
    pub fn render_payload(&self) -> Option<Value> {
        let diagram = self.diagram.as_ref()?;
        serde_json::to_value(diagram).ok()
    }

    /// Pretty JSON rendering.
    pub fn to_json_pretty(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One beat of the presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Unique id used by `goto`.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Actions run in order when the step is entered.
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    /// Bindings active while this step is current.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<BindingDefinition>,
    /// Overrides the playback default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_policy: Option<ErrorPolicy>,
    /// Step metadata other than `errorPolicy`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

/// Opaque instruction resolved by an action handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Handler key, e.g. `camera.fit`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Handler-specific arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ActionDefinition {
    /// Action without a payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Action with a payload.
    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload: Some(payload),
        }
    }
}

/// Declarative event-to-actions rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingDefinition {
    /// What fires the rule.
    pub event: BindingEvent,
    /// Element to listen on; defaults depend on the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetDescriptor>,
    /// Key filter for `key` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Delay for `timer` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Host event name for `custom` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    /// Actions run when the rule fires.
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

impl BindingDefinition {
    /// Rule for `event` with no target, filter or actions yet.
    pub fn new(event: BindingEvent) -> Self {
        Self {
            event,
            target: None,
            key: None,
            delay_ms: None,
            event_name: None,
            actions: Vec::new(),
        }
    }
}

/// How action failures inside a step are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorPolicy {
    /// The first failure aborts the step.
    HaltOnError,
    /// Failures are collected and every action still runs.
    #[default]
    ContinueOnError,
}

impl ErrorPolicy {
    /// JSON spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorPolicy::HaltOnError => "haltOnError",
            ErrorPolicy::ContinueOnError => "continueOnError",
        }
    }

    /// Parse the JSON spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "haltOnError" => Some(ErrorPolicy::HaltOnError),
            "continueOnError" => Some(ErrorPolicy::ContinueOnError),
            _ => None,
        }
    }
}

/// Diagram source attached to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramSpec {
    /// Source language, e.g. `mermaid`.
    pub kind: String,
    /// Source text.
    pub source: String,
    /// Declared diagram name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Renderer configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// Binding target as authored: a raw host selector or a structured target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetDescriptor {
    /// Host-specific selector string.
    Raw(String),
    /// Structured target.
    Spec(TargetSpec),
}

/// JSON form of a target expression. Wildcards are spelled `"*"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TargetSpec {
    /// Diagram node by id.
    Node {
        /// Node id or `*`.
        id: String,
    },
    /// Edge by id or by endpoints.
    Edge {
        /// Edge id or `*`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Source node.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        /// Destination node.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },
    /// Subgraph by id.
    Subgraph {
        /// Subgraph id or `*`.
        id: String,
    },
    /// Raw CSS selector.
    Css {
        /// Selector text.
        selector: String,
    },
    /// Element id in the rendered output.
    Id {
        /// Element id.
        id: String,
    },
    /// Elements whose label matches.
    Text {
        /// Label text.
        text: String,
    },
    /// Unordered bag of targets.
    Group {
        /// Members.
        targets: Vec<TargetSpec>,
    },
    /// Set union.
    Union {
        /// Operands.
        targets: Vec<TargetSpec>,
    },
    /// Set intersection.
    Intersect {
        /// Operands.
        targets: Vec<TargetSpec>,
    },
    /// Set difference.
    Except {
        /// Base set.
        base: Box<TargetSpec>,
        /// Elements removed from the base.
        remove: Box<TargetSpec>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_json_surface() {
        let document = PresentationDocument::from_json(
            r##"{
              "steps": [
                { "id": "s1", "actions": [{ "type": "noop" }] },
                {
                  "id": "s2",
                  "name": "Second",
                  "errorPolicy": "haltOnError",
                  "actions": [{ "type": "camera.fit", "payload": { "target": { "type": "node", "id": "A" } } }],
                  "bindings": [{ "event": "key", "key": "Enter", "actions": [] }]
                }
              ],
              "bindings": [
                { "event": "click", "target": "#next", "actions": [{ "type": "nav.next" }] },
                { "event": "timer", "delayMs": 500, "actions": [] },
                { "event": "custom", "eventName": "tour:jump", "target": { "type": "css", "selector": ".x" }, "actions": [] }
              ]
            }"##,
        )
        .expect("document");
        assert_eq!(document.steps.len(), 2);
        assert_eq!(document.steps[1].error_policy, Some(ErrorPolicy::HaltOnError));
        assert_eq!(document.step_index("s2"), Some(1));
        assert_eq!(document.bindings[0].target, Some(TargetDescriptor::Raw("#next".into())));
        assert_eq!(document.bindings[1].delay_ms, Some(500));
        assert_eq!(
            document.bindings[2].target,
            Some(TargetDescriptor::Spec(TargetSpec::Css {
                selector: ".x".into()
            }))
        );
    }

    #[test]
    fn rejects_duplicate_and_empty_ids() {
        let duplicate = json!({ "steps": [{ "id": "a" }, { "id": "a" }] });
        assert!(matches!(
            PresentationDocument::from_value(duplicate),
            Err(DocumentError::DuplicateStepId(id)) if id == "a"
        ));
        let empty = json!({ "steps": [{ "id": "a" }, { "id": "" }] });
        assert!(matches!(
            PresentationDocument::from_value(empty),
            Err(DocumentError::EmptyStepId(1))
        ));
        assert!(matches!(
            PresentationDocument::from_json("{"),
            Err(DocumentError::Json(_))
        ));
    }

    #[test]
    fn serializes_camel_case_and_omits_empty_fields() {
        let document = PresentationDocument {
            steps: vec![StepDefinition {
                id: "s".into(),
                error_policy: Some(ErrorPolicy::ContinueOnError),
                actions: vec![ActionDefinition::new("noop")],
                ..Default::default()
            }],
            ..Default::default()
        };
        let value = serde_json::to_value(&document).expect("json");
        assert_eq!(
            value,
            json!({ "steps": [{ "id": "s", "actions": [{ "type": "noop" }], "errorPolicy": "continueOnError" }] })
        );
    }
}
