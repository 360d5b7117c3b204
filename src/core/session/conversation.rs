//! Transcript accumulation and the logs shown to the user.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who said something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Author::User => write!(f, "user"),
            Author::Assistant => write!(f, "assistant"),
        }
    }
}

/// One finished utterance in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub author: Author,
    pub text: String,
}

impl Message {
    /// A message, unless `text` is blank.
    pub fn non_empty(author: Author, text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        (!text.trim().is_empty()).then_some(Self { author, text })
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            author: Author::Assistant,
            text: text.into(),
        }
    }
}

/// Transcript fragments of the turn in progress.
#[derive(Debug, Clone, Default)]
pub struct ConversationTurn {
    user: String,
    assistant: String,
}

impl ConversationTurn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, fragment: &str) {
        self.user.push_str(fragment);
    }

    pub fn push_assistant(&mut self, fragment: &str) {
        self.assistant.push_str(fragment);
    }

    pub fn user_text(&self) -> &str {
        &self.user
    }

    pub fn assistant_text(&self) -> &str {
        &self.assistant
    }

    /// End the turn: yield the user then the assistant message, skipping blank
    /// ones, and reset both buffers.
    pub fn flush(&mut self) -> Vec<Message> {
        let user = std::mem::take(&mut self.user);
        let assistant = std::mem::take(&mut self.assistant);
        [
            Message::non_empty(Author::User, user),
            Message::non_empty(Author::Assistant, assistant),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// The most recent tool invocations, oldest first.
#[derive(Debug, Clone)]
pub struct ToolLog {
    capacity: usize,
    entries: VecDeque<String>,
}

impl ToolLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Record `name → args`, evicting the oldest entry when full.
    pub fn record(&mut self, name: &str, args: &Value) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(format!("{} → {}", name, args));
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flush_skips_empty_assistant() {
        let mut turn = ConversationTurn::new();
        turn.push_user("hello");

        assert_eq!(turn.flush(), vec![Message::user("hello")]);
        assert!(turn.user_text().is_empty());
        assert!(turn.flush().is_empty());
    }

    #[test]
    fn test_flush_orders_user_first() {
        let mut turn = ConversationTurn::new();
        turn.push_assistant("Opening ");
        turn.push_user("open ");
        turn.push_assistant("YouTube.");
        turn.push_user("youtube");

        assert_eq!(
            turn.flush(),
            vec![Message::user("open youtube"), Message::assistant("Opening YouTube.")]
        );
    }

    #[test]
    fn test_whitespace_is_dropped() {
        let mut turn = ConversationTurn::new();
        turn.push_user("  \n ");
        turn.push_assistant("\t");
        assert!(turn.flush().is_empty());
        assert!(turn.assistant_text().is_empty());
    }

    #[test]
    fn test_tool_log_keeps_last_entries() {
        let mut log = ToolLog::new(7);
        for i in 0..10 {
            log.record("openUrl", &json!({ "url": format!("site{}.com", i) }));
        }

        assert_eq!(log.len(), 7);
        let entries: Vec<&str> = log.entries().collect();
        assert_eq!(entries[0], r#"openUrl → {"url":"site3.com"}"#);
        assert_eq!(entries[6], r#"openUrl → {"url":"site9.com"}"#);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_author_serde() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"author":"assistant","text":"hi"}"#);
    }
}
