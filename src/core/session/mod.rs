//! Session control: lifecycle, conversation state and the user-facing toggle.

pub mod assistant;
pub mod conversation;
pub mod orchestrator;
pub mod prompt;
pub mod state;

pub use assistant::{
    ACTIVATION_FAILED_MESSAGE, Assistant, CaptureEndedCallback, ErrorCallback,
    SESSION_ERROR_MESSAGE, StateCallback, ToolCallCallback, ToolCallObserved,
    TranscriptionCallback, TurnCompleteCallback,
};
pub use conversation::{Author, ConversationTurn, Message, ToolLog};
pub use orchestrator::{
    AudioSettings, SessionError, SessionEvent, SessionHandle, SessionOrchestrator, SessionResult,
};
pub use prompt::SYSTEM_PROMPT;
pub use state::AppState;
