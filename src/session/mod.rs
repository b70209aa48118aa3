//! Session lifecycle - pairing a stable identifier with its context
//!
//! A session identifier, once created, stays stable for the life of the
//! conversation until the NLU service ends it with a `stop` result; the dialog
//! then resets the session to a fresh identifier and an empty context. The
//! host persists [`SessionState`] snapshots between turns and hands them back
//! through `resume_turn`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::ConversationContext;

/// A conversation session: a collision-resistant identifier plus the
/// accumulated conversation context.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    context: ConversationContext,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Start a fresh session with a random identifier and empty context.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context: ConversationContext::new(),
            started_at: Utc::now(),
        }
    }

    /// The session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The conversation context owned by this session.
    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// When the session was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Replace the identifier and drop all accumulated context.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Serializable snapshot for host persistence.
    pub fn snapshot(&self) -> SessionState {
        SessionState {
            session_id: self.id.clone(),
            context: self.context.entries(),
            started_at: self.started_at,
        }
    }

    /// Restore a session previously persisted by the host.
    pub fn restore(state: SessionState) -> Self {
        Self {
            id: state.session_id,
            context: ConversationContext::from_entries(state.context),
            started_at: state.started_at,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque state blob the host stores between dialog invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    /// Identifier of the suspended session.
    pub session_id: String,
    /// Context entries at suspension time.
    pub context: BTreeMap<String, Value>,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
}
