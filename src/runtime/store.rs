//! Per-session conversation storage.
//!
//! One store per session, one slot per `(thread, context)`. Switching the
//! active context never touches sibling slots, so coming back to an earlier
//! table or document restores its history intact. Retention is deliberately
//! process-lifetime: nothing here evicts.

use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::state::ConversationState;

/// Conversation histories for one session.
pub struct ConversationStore {
    thread_id: String,
    histories: FxHashMap<(String, String), ConversationState>,
}

impl ConversationStore {
    /// Creates a store with a fresh thread id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            thread_id: Uuid::new_v4().to_string(),
            histories: FxHashMap::default(),
        }
    }

    /// Stable thread id grouping this session's slots.
    #[must_use]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Slot key for a table context.
    #[must_use]
    pub fn table_key(table: &str) -> String {
        format!("table:{table}")
    }

    /// Slot key for a document context.
    #[must_use]
    pub fn document_key(document: &str) -> String {
        format!("document:{document}")
    }

    /// The stored state for a context, if it has run before.
    #[must_use]
    pub fn state(&self, context: &str) -> Option<&ConversationState> {
        self.histories
            .get(&(self.thread_id.clone(), context.to_string()))
    }

    /// Writes a context's state back after a finished turn.
    pub fn save(&mut self, context: &str, state: ConversationState) {
        self.histories
            .insert((self.thread_id.clone(), context.to_string()), state);
    }

    /// Number of contexts with stored history.
    #[must_use]
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
