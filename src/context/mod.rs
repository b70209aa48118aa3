//! Conversation context - the accumulated key/value state of one conversation
//!
//! The context travels with every NLU query and is mutated by action handlers
//! while a turn is in flight, so the store is internally synchronized and
//! callers never take their own locks. Keys are case-insensitive: two keys
//! differing only in letter case address the same entry.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// Thread-safe, case-insensitive key/value store for conversation state.
///
/// Keys are normalized to lowercase on every access. Cloning the handle
/// shares the underlying map, which is how the turn loop and action handlers
/// see each other's mutations.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl ConversationContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the value for `key`.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_lowercase(), value.into());
    }

    /// Case-insensitive lookup.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key.to_lowercase()).cloned()
    }

    /// Remove the entry for `key`, returning true if one existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.remove(&key.to_lowercase()).is_some()
    }

    /// Remove all entries. Operations issued afterwards observe empty state.
    pub fn clear(&self) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    /// True when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deterministic JSON projection of all entries, one property per entry.
    ///
    /// The underlying map is ordered, so two contexts holding the same entries
    /// always serialize to the same string regardless of insertion order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_string(&*entries)
    }

    /// Copy of the current entries, used for session snapshots.
    pub(crate) fn entries(&self) -> BTreeMap<String, Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.clone()
    }

    /// Rebuild a context from persisted entries. Keys are re-normalized in
    /// case the snapshot predates normalization.
    pub(crate) fn from_entries(entries: BTreeMap<String, Value>) -> Self {
        let normalized = entries
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(normalized)),
        }
    }
}
