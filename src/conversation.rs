//! Conversation state and the named-conversation registry.

use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Correlation identifiers threading multi-turn context through the
/// remote service. All three start empty, which signals "new conversation"
/// on the first exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub conversation_id: String,
    pub response_id: String,
    pub choice_id: String,
}

impl ConversationState {
    /// True until the first successful exchange.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.conversation_id.is_empty() && self.response_id.is_empty() && self.choice_id.is_empty()
    }

    /// Overwrite all three identifiers from a decoded response.
    pub(crate) fn update(&mut self, conversation_id: &str, response_id: &str, choice_id: &str) {
        self.conversation_id = conversation_id.to_string();
        self.response_id = response_id.to_string();
        self.choice_id = choice_id.to_string();
    }
}

/// Insertion-ordered registry of named conversations plus the current
/// selection. Single-threaded use; no internal locking.
#[derive(Debug, Default)]
pub struct ConversationRegistry {
    conversations: IndexMap<String, ConversationState>,
    current: Option<String>,
}

impl ConversationRegistry {
    /// Create a conversation and select it. When `name` is omitted a
    /// `conversation_{n}` name is generated, skipping names already taken.
    pub fn create(&mut self, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(n) => {
                if self.conversations.contains_key(n) {
                    return Err(Error::Conversation(format!(
                        "conversation '{n}' already exists"
                    )));
                }
                n.to_string()
            }
            None => self.generate_name(),
        };

        self.conversations
            .insert(name.clone(), ConversationState::default());
        self.current = Some(name.clone());
        Ok(name)
    }

    /// Select an existing conversation.
    pub fn switch(&mut self, name: &str) -> Result<()> {
        if !self.conversations.contains_key(name) {
            return Err(Error::Conversation(format!(
                "conversation '{name}' does not exist"
            )));
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// All conversation names in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        self.conversations.keys().map(String::as_str).collect()
    }

    /// Delete a conversation. If it was current, the selection falls back
    /// to the first remaining conversation, or to none when empty.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        if self.conversations.shift_remove(name).is_none() {
            return Err(Error::Conversation(format!(
                "conversation '{name}' does not exist"
            )));
        }
        if self.current.as_deref() == Some(name) {
            self.current = self.conversations.keys().next().cloned();
        }
        Ok(())
    }

    /// Name of the currently selected conversation.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// State of the currently selected conversation.
    #[must_use]
    pub fn current_state(&self) -> Option<&ConversationState> {
        self.current
            .as_ref()
            .and_then(|name| self.conversations.get(name))
    }

    pub(crate) fn current_state_mut(&mut self) -> Option<&mut ConversationState> {
        let name = self.current.clone()?;
        self.conversations.get_mut(&name)
    }

    fn generate_name(&self) -> String {
        let mut n = self.conversations.len() + 1;
        loop {
            let candidate = format!("conversation_{n}");
            if !self.conversations.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}
