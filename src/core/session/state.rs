//! Observable application state.

use serde::{Deserialize, Serialize};

/// What the assistant is doing right now. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppState {
    /// No session
    #[default]
    Idle,
    /// Acquiring the microphone and opening the channel
    Connecting,
    /// Session open, waiting for the user
    Listening,
    /// Executing tool calls
    Thinking,
    /// Model audio is playing
    Speaking,
}

impl AppState {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Idle => "IDLE",
            AppState::Connecting => "CONNECTING",
            AppState::Listening => "LISTENING",
            AppState::Thinking => "THINKING",
            AppState::Speaking => "SPEAKING",
        }
    }

    /// True while a session exists or is being opened.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppState::Idle)
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
