//! Wire model for NLU service responses

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Semantic classification of an NLU result.
///
/// The wire tag is a free-form string; anything outside the four known kinds
/// is preserved in [`ResultKind::Unknown`] so the dispatch error can name it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Run a registered action handler, then query again.
    Action,
    /// Post the reply text to the conversation, then query again.
    Message,
    /// End the turn loop and await the next user message.
    Stop,
    /// The service reported an unrecoverable error for this exchange.
    Error,
    /// A kind this engine does not understand.
    Unknown(String),
}

/// Structured result returned by the NLU service for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NluResult {
    /// Raw result kind tag (`action`, `msg`, `stop`, `error`).
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Reply text, present for `msg` results.
    #[serde(rename = "msg", default)]
    pub message: Option<String>,

    /// Classification confidence reported by the service.
    #[serde(default)]
    pub confidence: f32,

    /// Action name, present for `action` results.
    #[serde(default)]
    pub action: Option<String>,

    /// Quick-reply suggestions offered alongside the result.
    #[serde(default)]
    pub quickreplies: Vec<String>,

    /// Entities extracted from the utterance, grouped by category.
    #[serde(default)]
    pub entities: HashMap<String, Vec<NluEntity>>,
}

/// A single entity extracted from the utterance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NluEntity {
    /// Extraction confidence.
    #[serde(default)]
    pub confidence: f32,

    /// Entity kind tag (e.g. `value`, `resolved`).
    #[serde(rename = "type", default)]
    pub entity_type: String,

    /// Extracted value.
    #[serde(default)]
    pub value: String,

    /// True when the value was suggested rather than matched verbatim.
    #[serde(default)]
    pub suggested: bool,
}

impl NluResult {
    /// Classify the raw kind tag.
    pub fn result_kind(&self) -> ResultKind {
        match self.kind.as_str() {
            "action" => ResultKind::Action,
            "msg" => ResultKind::Message,
            "stop" => ResultKind::Stop,
            "error" => ResultKind::Error,
            other => ResultKind::Unknown(other.to_string()),
        }
    }

    /// First entity in the given category, the common handler access pattern.
    pub fn first_entity(&self, category: &str) -> Option<&NluEntity> {
        self.entities.get(category).and_then(|list| list.first())
    }

    /// An `action` result naming `action`.
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            kind: "action".to_string(),
            action: Some(action.into()),
            ..Self::default()
        }
    }

    /// A `msg` result carrying `message`.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            kind: "msg".to_string(),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// A `stop` result ending the exchange.
    pub fn stop() -> Self {
        Self {
            kind: "stop".to_string(),
            ..Self::default()
        }
    }

    /// An `error` result.
    pub fn error() -> Self {
        Self {
            kind: "error".to_string(),
            ..Self::default()
        }
    }
}
