//! User-facing controller: one toggle, one session, observable logs.
//!
//! The [`Assistant`] turns session events into the state a front end shows:
//! the current [`AppState`], the append-only conversation log and the recent
//! tool calls. Front ends register async callbacks and flip the session on and
//! off with [`Assistant::toggle`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::conversation::{Message, ToolLog};
use super::orchestrator::{
    SessionError, SessionEvent, SessionHandle, SessionOrchestrator, SessionResult,
};
use super::state::AppState;
use crate::core::live::LiveError;

/// Appended to the conversation when a session cannot be started.
pub const ACTIVATION_FAILED_MESSAGE: &str = "Failed to start session.";

/// Appended to the conversation when a running session fails.
pub const SESSION_ERROR_MESSAGE: &str = "An error occurred. Please try again.";

// =============================================================================
// Callback Types
// =============================================================================

/// Callback type for state changes.
pub type StateCallback =
    Arc<dyn Fn(AppState) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for transcription fragments.
pub type TranscriptionCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for finished turns.
pub type TurnCompleteCallback =
    Arc<dyn Fn(Vec<Message>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for observed tool calls.
pub type ToolCallCallback =
    Arc<dyn Fn(ToolCallObserved) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for session errors.
pub type ErrorCallback =
    Arc<dyn Fn(LiveError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for the end of microphone input.
pub type CaptureEndedCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A tool invocation as reported to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallObserved {
    pub name: String,
    pub args: Value,
}

#[derive(Clone, Default)]
struct Callbacks {
    state: Option<StateCallback>,
    user: Option<TranscriptionCallback>,
    assistant: Option<TranscriptionCallback>,
    turn: Option<TurnCompleteCallback>,
    tool: Option<ToolCallCallback>,
    error: Option<ErrorCallback>,
    capture_ended: Option<CaptureEndedCallback>,
}

// =============================================================================
// Assistant
// =============================================================================

struct Inner {
    state: AppState,
    messages: Vec<Message>,
    tool_log: ToolLog,
    session: Option<SessionHandle>,
    /// Bumped on every activation and deactivation; events of older sessions are dropped
    generation: u64,
}

/// Owns at most one session and the logs derived from it.
#[derive(Clone)]
pub struct Assistant {
    orchestrator: Arc<SessionOrchestrator>,
    inner: Arc<Mutex<Inner>>,
    callbacks: Arc<RwLock<Callbacks>>,
}

impl Assistant {
    pub fn new(orchestrator: SessionOrchestrator, tool_log_capacity: usize) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            inner: Arc::new(Mutex::new(Inner {
                state: AppState::Idle,
                messages: Vec::new(),
                tool_log: ToolLog::new(tool_log_capacity),
                session: None,
                generation: 0,
            })),
            callbacks: Arc::new(RwLock::new(Callbacks::default())),
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn state(&self) -> AppState {
        self.inner.lock().state
    }

    /// True while a session is open or opening.
    pub fn is_active(&self) -> bool {
        let inner = self.inner.lock();
        inner.session.is_some() || inner.state.is_active()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages.clone()
    }

    pub fn tool_log(&self) -> Vec<String> {
        self.inner
            .lock()
            .tool_log
            .entries()
            .map(str::to_string)
            .collect()
    }

    pub fn on_state_change(&self, callback: StateCallback) {
        self.callbacks.write().state = Some(callback);
    }

    pub fn on_user_transcription(&self, callback: TranscriptionCallback) {
        self.callbacks.write().user = Some(callback);
    }

    pub fn on_assistant_transcription(&self, callback: TranscriptionCallback) {
        self.callbacks.write().assistant = Some(callback);
    }

    pub fn on_turn_complete(&self, callback: TurnCompleteCallback) {
        self.callbacks.write().turn = Some(callback);
    }

    pub fn on_tool_call(&self, callback: ToolCallCallback) {
        self.callbacks.write().tool = Some(callback);
    }

    pub fn on_error(&self, callback: ErrorCallback) {
        self.callbacks.write().error = Some(callback);
    }

    pub fn on_capture_ended(&self, callback: CaptureEndedCallback) {
        self.callbacks.write().capture_ended = Some(callback);
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    /// Start a session when idle, otherwise stop the current one.
    ///
    /// Returns the state right after the toggle.
    pub async fn toggle(&self) -> SessionResult<AppState> {
        if self.is_active() {
            self.deactivate().await;
        } else {
            self.activate().await?;
        }
        Ok(self.state())
    }

    /// Open a session. Fails with [`SessionError::AlreadyActive`] if one exists.
    ///
    /// On failure the state returns to idle and one assistant message
    /// describing the failure is appended.
    pub async fn activate(&self) -> SessionResult<()> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.session.is_some() || inner.state.is_active() {
                return Err(SessionError::AlreadyActive);
            }
            inner.generation += 1;
            inner.state = AppState::Connecting;
            inner.generation
        };
        self.notify_state(AppState::Connecting).await;

        let (tx, rx) = mpsc::unbounded_channel();
        match self.orchestrator.activate(tx).await {
            Ok(handle) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        // Deactivated while connecting; dropping the handle closes it
                        debug!(session_id = %handle.id(), "Discarding session opened after deactivation");
                        return Ok(());
                    }
                    info!(session_id = %handle.id(), "Session started");
                    inner.session = Some(handle);
                    // The session reported Listening before returning
                    inner.state = AppState::Listening;
                }
                self.notify_state(AppState::Listening).await;
                tokio::spawn(self.clone().pump(generation, rx));
                Ok(())
            }
            Err(e) => {
                error!("Failed to start session: {}", e);
                let current = {
                    let mut inner = self.inner.lock();
                    let current = inner.generation == generation;
                    if current {
                        inner.state = AppState::Idle;
                        inner
                            .messages
                            .push(Message::assistant(ACTIVATION_FAILED_MESSAGE));
                    }
                    current
                };
                if current {
                    self.notify_state(AppState::Idle).await;
                }
                Err(e)
            }
        }
    }

    /// Close the session, clear both logs and return to idle. No-op when idle.
    pub async fn deactivate(&self) {
        let handle = {
            let mut inner = self.inner.lock();
            if inner.session.is_none() && !inner.state.is_active() {
                return;
            }
            inner.generation += 1;
            inner.state = AppState::Idle;
            inner.messages.clear();
            inner.tool_log.clear();
            inner.session.take()
        };

        if let Some(mut handle) = handle {
            info!(session_id = %handle.id(), "Stopping session");
            handle.close();
            handle.closed().await;
        }
        self.notify_state(AppState::Idle).await;
    }

    // -------------------------------------------------------------------------
    // Event handling
    // -------------------------------------------------------------------------

    async fn pump(self, generation: u64, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if !self.apply(generation, event).await {
                break;
            }
        }
        debug!(generation, "Session event stream finished");
    }

    /// Apply one event. Returns false once the session is over or stale.
    async fn apply(&self, generation: u64, event: SessionEvent) -> bool {
        let callbacks = self.callbacks.read().clone();

        match event {
            SessionEvent::StateChanged(state) => {
                let changed = {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        return false;
                    }
                    let changed = inner.state != state;
                    inner.state = state;
                    changed
                };
                if changed && let Some(cb) = callbacks.state {
                    cb(state).await;
                }
            }
            SessionEvent::UserTranscription(text) => {
                if !self.is_current(generation) {
                    return false;
                }
                if let Some(cb) = callbacks.user {
                    cb(text).await;
                }
            }
            SessionEvent::AssistantTranscription(text) => {
                if !self.is_current(generation) {
                    return false;
                }
                if let Some(cb) = callbacks.assistant {
                    cb(text).await;
                }
            }
            SessionEvent::TurnComplete(messages) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        return false;
                    }
                    inner.messages.extend(messages.iter().cloned());
                }
                if let Some(cb) = callbacks.turn {
                    cb(messages).await;
                }
            }
            SessionEvent::ToolCall { name, args } => {
                {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        return false;
                    }
                    inner.tool_log.record(&name, &args);
                }
                if let Some(cb) = callbacks.tool {
                    cb(ToolCallObserved { name, args }).await;
                }
            }
            SessionEvent::CaptureEnded => {
                if !self.is_current(generation) {
                    return false;
                }
                if let Some(cb) = callbacks.capture_ended {
                    cb().await;
                }
            }
            SessionEvent::Error(e) => {
                let changed = {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        return false;
                    }
                    inner.messages.push(Message::assistant(SESSION_ERROR_MESSAGE));
                    let changed = inner.state != AppState::Idle;
                    inner.state = AppState::Idle;
                    changed
                };
                if let Some(cb) = callbacks.error {
                    cb(e).await;
                }
                if changed && let Some(cb) = callbacks.state {
                    cb(AppState::Idle).await;
                }
            }
            SessionEvent::Closed { reason } => {
                let (handle, changed) = {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        return false;
                    }
                    let changed = inner.state != AppState::Idle;
                    inner.state = AppState::Idle;
                    (inner.session.take(), changed)
                };
                info!(?reason, "Session ended");
                drop(handle);
                if changed && let Some(cb) = callbacks.state {
                    cb(AppState::Idle).await;
                }
                return false;
            }
        }
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    async fn notify_state(&self, state: AppState) {
        let callback = self.callbacks.read().state.clone();
        if let Some(cb) = callback {
            cb(state).await;
        }
    }
}
