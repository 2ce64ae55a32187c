//! UI-agnostic conversation state
//!
//! Turns are shared between different front ends (TUI, desktop shell, etc.)
//! and don't depend on any specific UI framework.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// The role of a conversation turn's author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Role name expected by the generation backend.
    pub fn wire_role(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        }
    }
}

/// A web source backing part of an assistant answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Citation {
    /// Text a renderer should show for the link.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.uri)
    }
}

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ChatRole,
    pub text: String,
    /// `None` when the backend supplied no grounding at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            citations: None,
        }
    }

    pub fn assistant(text: impl Into<String>, citations: Option<Vec<Citation>>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
            citations,
        }
    }
}

/// Append-only transcript for chat mode.
///
/// Clones share the same transcript. Readers get snapshots, so a turn is
/// either fully visible or not visible at all.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    turns: Arc<RwLock<Vec<ConversationTurn>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn and returns the new transcript length.
    pub fn append(&self, turn: ConversationTurn) -> usize {
        let mut turns = self.turns.write().unwrap_or_else(PoisonError::into_inner);
        turns.push(turn);
        turns.len()
    }

    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<ConversationTurn> {
        self.turns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.turns.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_preserves_arrival_order() {
        let store = ConversationStore::new();
        assert_eq!(store.append(ConversationTurn::user("A")), 1);
        assert_eq!(store.append(ConversationTurn::assistant("a", None)), 2);
        assert_eq!(store.append(ConversationTurn::user("B")), 3);

        let texts: Vec<String> = store.snapshot().into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["A", "a", "B"]);
    }

    #[test]
    fn test_snapshot_is_detached_from_later_appends() {
        let store = ConversationStore::new();
        store.append(ConversationTurn::user("first"));
        let snapshot = store.snapshot();
        store.append(ConversationTurn::user("second"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_clones_share_one_transcript() {
        let store = ConversationStore::new();
        let reader = store.clone();
        store.append(ConversationTurn::user("hello"));
        assert_eq!(reader.last(), Some(ConversationTurn::user("hello")));
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_turns() {
        let store = ConversationStore::new();
        let writer = store.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..200 {
                writer.append(ConversationTurn::user(format!("turn {i}")));
            }
        });
        for _ in 0..200 {
            for turn in store.snapshot() {
                assert!(turn.text.starts_with("turn "));
            }
        }
        handle.join().unwrap();
        assert_eq!(store.len(), 200);
    }

    #[test]
    fn test_citation_label_falls_back_to_uri() {
        let bare = Citation {
            uri: "https://example.com".to_string(),
            title: None,
        };
        assert_eq!(bare.label(), "https://example.com");
    }

    #[test]
    fn test_assistant_role_maps_to_model_on_the_wire() {
        assert_eq!(ChatRole::User.wire_role(), "user");
        assert_eq!(ChatRole::Assistant.wire_role(), "model");
    }
}
