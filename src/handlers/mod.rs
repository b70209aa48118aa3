//! Action handlers and the name-to-handler registry
//!
//! Applications declare (names, handler) bindings when the dialog is built;
//! the registry resolves the action name carried by an NLU result to the
//! bound handler, falling back to the reserved default binding. The table is
//! explicit and immutable after construction - there is no runtime
//! introspection, and a misdeclared binding fails at build time rather than
//! at dispatch time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ConversationContext;
use crate::error::DialogError;
use crate::host::{DialogHost, InboundMessage};
use crate::model::NluResult;

/// Reserved registry key for the fallback handler.
pub const DEFAULT_ACTION: &str = "";

/// Everything a handler may touch while an action is being dispatched.
///
/// Handlers run one at a time within a conversation's turn loop; context
/// mutations made here are serialized into the next NLU query.
pub struct TurnContext<'a> {
    /// Shared conversation context.
    pub context: &'a ConversationContext,
    /// Reply channel of the hosting framework.
    pub host: &'a dyn DialogHost,
    /// The inbound message that started this turn.
    pub message: &'a InboundMessage,
    /// Identifier of the active session.
    pub session_id: &'a str,
}

/// An application-defined handler for one or more named actions.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, turn: &TurnContext<'_>, result: &NluResult) -> anyhow::Result<()>;
}

/// A declarative (names, handler) pair used to build a registry.
///
/// One handler may be declared under several names; a blank name registers
/// the handler as the default fallback.
#[derive(Clone)]
pub struct ActionBinding {
    names: Vec<String>,
    handler: Arc<dyn ActionHandler>,
}

impl ActionBinding {
    /// Bind `handler` under every name in `names`.
    pub fn new<I, S>(names: I, handler: Arc<dyn ActionHandler>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            handler,
        }
    }

    /// Bind `handler` as the default fallback.
    pub fn default_handler(handler: Arc<dyn ActionHandler>) -> Self {
        Self::new([DEFAULT_ACTION], handler)
    }
}

impl fmt::Debug for ActionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBinding")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from action name to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from a declarative binding list.
    ///
    /// Fails with a configuration error when a binding declares no names or
    /// when two bindings claim the same name with different handlers. Building
    /// twice from the same list yields identical resolution.
    pub fn from_bindings(bindings: Vec<ActionBinding>) -> Result<Self, DialogError> {
        let mut registry = Self::new();
        for binding in bindings {
            if binding.names.is_empty() {
                return Err(DialogError::Configuration(
                    "action binding declares no names".to_string(),
                ));
            }
            for name in &binding.names {
                registry.insert(name, binding.handler.clone())?;
            }
        }
        Ok(registry)
    }

    /// Register `handler` under `name`; a blank name registers the default.
    pub fn register(
        &mut self,
        name: &str,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), DialogError> {
        self.insert(name, handler)
    }

    /// Register the fallback handler invoked when no name matches.
    pub fn register_default(&mut self, handler: Arc<dyn ActionHandler>) -> Result<(), DialogError> {
        self.insert(DEFAULT_ACTION, handler)
    }

    fn insert(&mut self, name: &str, handler: Arc<dyn ActionHandler>) -> Result<(), DialogError> {
        let key = if name.trim().is_empty() {
            DEFAULT_ACTION.to_string()
        } else {
            name.to_string()
        };

        // Re-declaring the same handler under the same name is harmless;
        // binding a second handler to a taken name is ambiguous.
        if let Some(existing) = self.handlers.get(&key) {
            if !Arc::ptr_eq(existing, &handler) {
                return Err(DialogError::Configuration(format!(
                    "action `{key}` is bound to two different handlers"
                )));
            }
        }

        self.handlers.insert(key, handler);
        Ok(())
    }

    /// Resolve an action name to a handler.
    ///
    /// Matching is exact and case-sensitive; an empty, absent, or unknown
    /// name falls back to the default binding. With no default registered,
    /// resolution fails with [`DialogError::HandlerNotFound`].
    pub fn resolve(&self, action: Option<&str>) -> Result<Arc<dyn ActionHandler>, DialogError> {
        let name = action.unwrap_or(DEFAULT_ACTION);
        if !name.is_empty() {
            if let Some(handler) = self.handlers.get(name) {
                return Ok(handler.clone());
            }
        }

        self.handlers
            .get(DEFAULT_ACTION)
            .cloned()
            .ok_or_else(|| DialogError::HandlerNotFound(name.to_string()))
    }

    /// Number of registered names (the default key counts as one).
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("actions", &names)
            .finish()
    }
}
