//! Session lifecycle: activation, inbound event dispatch and teardown.
//!
//! Activation acquires the microphone and both audio contexts, opens the
//! remote channel and then hands everything to one session task. That task is
//! the only owner of the channel, the devices, the playback scheduler and the
//! turn buffers, so nothing in here needs a lock. It reports what happens as
//! [`SessionEvent`]s and stops on [`SessionHandle::close`], on a channel error
//! or when the service closes the channel. Every owned resource is released
//! exactly once on the way out.

use std::ops::ControlFlow;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use super::conversation::{ConversationTurn, Message};
use super::state::AppState;
use crate::config::{AssistantConfig, ConfigError};
use crate::core::audio::{
    AudioContext, AudioOutput, ChunkId, DeviceError, MediaAccessError, MediaDevices,
    MicrophoneStream, PlaybackScheduler, decode_inbound,
};
use crate::core::live::gemini::messages::{Blob, FunctionCall};
use crate::core::live::{
    ChannelEvent, ClientMessage, InboundEvent, LiveConnection, LiveConnector, LiveError,
    LiveSetup,
};
use crate::core::tools::{Navigator, ToolDispatcher};

// =============================================================================
// Error Types
// =============================================================================

/// Why a session could not be started or had to stop.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Microphone unavailable or denied
    #[error(transparent)]
    MediaAccess(#[from] MediaAccessError),

    /// Required configuration is missing
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// The remote channel failed
    #[error(transparent)]
    Channel(#[from] LiveError),

    /// An audio device failed
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Only one session may exist at a time
    #[error("A session is already active")]
    AlreadyActive,
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

// =============================================================================
// Events
// =============================================================================

/// Everything a running session reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(AppState),
    /// A fragment of what the user said
    UserTranscription(String),
    /// A fragment of what the model said
    AssistantTranscription(String),
    /// A turn ended; carries its non-empty messages, user first
    TurnComplete(Vec<Message>),
    /// The model invoked a tool (reported before it runs)
    ToolCall { name: String, args: Value },
    /// The microphone source ran dry
    CaptureEnded,
    /// The channel failed; the session is being torn down
    Error(LiveError),
    /// The session is gone and its resources are released
    Closed { reason: Option<String> },
}

// =============================================================================
// Settings
// =============================================================================

/// Audio parameters of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub capture_block_size: usize,
}

// =============================================================================
// Handle
// =============================================================================

/// Owner's handle on a running session. Dropping it closes the session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the session to close. Safe to call repeatedly and in any state.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait until the session task has released everything.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            error!(session_id = %self.id, "Session task failed: {}", e);
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Opens sessions with injected channel, audio and navigation capabilities.
pub struct SessionOrchestrator {
    connector: Arc<dyn LiveConnector>,
    devices: Arc<dyn MediaDevices>,
    dispatcher: ToolDispatcher,
    setup: LiveSetup,
    audio: AudioSettings,
}

impl SessionOrchestrator {
    pub fn new(
        connector: Arc<dyn LiveConnector>,
        devices: Arc<dyn MediaDevices>,
        dispatcher: ToolDispatcher,
        setup: LiveSetup,
        audio: AudioSettings,
    ) -> Self {
        Self {
            connector,
            devices,
            dispatcher,
            setup,
            audio,
        }
    }

    /// Wire up an orchestrator from configuration.
    pub fn from_config(
        config: &AssistantConfig,
        connector: Arc<dyn LiveConnector>,
        devices: Arc<dyn MediaDevices>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::new(
            connector,
            devices,
            ToolDispatcher::new(navigator),
            config.live_setup(),
            config.audio_settings(),
        )
    }

    /// Start a session.
    ///
    /// Returns once the channel is open and capture is running; by then
    /// `StateChanged(Listening)` has been sent on `events`. On failure every
    /// resource acquired so far is released again and nothing is sent.
    pub async fn activate(
        &self,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> SessionResult<SessionHandle> {
        let id = Uuid::new_v4();
        let span = info_span!("session", session_id = %id);

        let session = self
            .open(events)
            .instrument(span.clone())
            .await
            .inspect_err(|e| warn!(parent: &span, "Session activation failed: {}", e))?;

        let cancel = session.cancel.clone();
        let task = tokio::spawn(session.run().instrument(span));

        Ok(SessionHandle {
            id,
            cancel,
            task: Some(task),
        })
    }

    async fn open(&self, events: mpsc::UnboundedSender<SessionEvent>) -> SessionResult<Session> {
        if self.setup.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey.into());
        }

        info!("Requesting microphone");
        let microphone = self.devices.get_user_media().await?;
        let mut resources = Resources {
            microphone: Some(microphone),
            input: None,
            output: None,
        };

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.open_contexts(&mut resources, completion_tx) {
            resources.release();
            return Err(e.into());
        }

        let mut connection = match self.connector.connect(&self.setup).await {
            Ok(connection) => connection,
            Err(e) => {
                resources.release();
                return Err(e.into());
            }
        };

        // Channel is open: start streaming the microphone
        let capture = match resources
            .microphone
            .as_mut()
            .ok_or(DeviceError::Closed)
            .and_then(|mic| mic.start(self.audio.capture_block_size))
        {
            Ok(capture) => capture,
            Err(e) => {
                resources.release();
                connection.shutdown().await;
                return Err(e.into());
            }
        };

        info!(
            block_size = self.audio.capture_block_size,
            input_rate = self.audio.input_sample_rate,
            output_rate = self.audio.output_sample_rate,
            "Session open"
        );

        let mut session = Session {
            connection,
            resources,
            capture: Some(capture),
            completions: completion_rx,
            scheduler: PlaybackScheduler::new(),
            turn: ConversationTurn::new(),
            state: AppState::Connecting,
            dispatcher: self.dispatcher.clone(),
            audio: self.audio,
            events,
            cancel: CancellationToken::new(),
        };
        session.set_state(AppState::Listening);
        Ok(session)
    }

    fn open_contexts(
        &self,
        resources: &mut Resources,
        completions: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<(), DeviceError> {
        resources.input = Some(
            self.devices
                .create_input_context(self.audio.input_sample_rate)?,
        );
        resources.output = Some(
            self.devices
                .create_output_context(self.audio.output_sample_rate, completions)?,
        );
        Ok(())
    }
}

// =============================================================================
// Session Task
// =============================================================================

/// The three hardware handles a session owns.
struct Resources {
    microphone: Option<Box<dyn MicrophoneStream>>,
    input: Option<Box<dyn AudioContext>>,
    output: Option<Box<dyn AudioOutput>>,
}

impl Resources {
    /// Release whatever is still held. Each handle is released at most once.
    fn release(&mut self) {
        if let Some(mut microphone) = self.microphone.take() {
            microphone.stop();
        }
        if let Some(mut input) = self.input.take()
            && !input.is_closed()
        {
            input.close();
        }
        if let Some(mut output) = self.output.take()
            && !output.is_closed()
        {
            output.close();
        }
    }
}

/// How the event loop ended.
enum Ending {
    /// Closed by the owner
    Local,
    /// Closed by the service
    Remote(Option<String>),
    /// The channel failed
    Failed(LiveError),
}

struct Session {
    connection: LiveConnection,
    resources: Resources,
    capture: Option<mpsc::Receiver<Vec<f32>>>,
    completions: mpsc::UnboundedReceiver<ChunkId>,
    scheduler: PlaybackScheduler,
    turn: ConversationTurn,
    state: AppState,
    dispatcher: ToolDispatcher,
    audio: AudioSettings,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(mut self) {
        let cancel = self.cancel.clone();

        let ending = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Ending::Local,

                event = self.connection.recv() => {
                    let flow = match event {
                        Some(ChannelEvent::Message(message)) => {
                            self.handle_message(message.into_events()).await
                        }
                        Some(ChannelEvent::Error(e)) => ControlFlow::Break(Ending::Failed(e)),
                        Some(ChannelEvent::Closed { reason }) => {
                            ControlFlow::Break(Ending::Remote(reason))
                        }
                        None => ControlFlow::Break(Ending::Remote(None)),
                    };
                    if let ControlFlow::Break(ending) = flow {
                        break ending;
                    }
                }

                Some(id) = self.completions.recv() => self.on_chunk_finished(id),

                block = recv_capture(&mut self.capture) => match block {
                    Some(block) => self.send_audio(&block),
                    None => {
                        info!("Microphone input ended");
                        self.capture = None;
                        self.emit(SessionEvent::CaptureEnded);
                    }
                },
            }
        };

        self.shutdown(ending).await;
    }

    // -------------------------------------------------------------------------
    // Inbound dispatch
    // -------------------------------------------------------------------------

    async fn handle_message(&mut self, events: Vec<InboundEvent>) -> ControlFlow<Ending> {
        for event in events {
            if let ControlFlow::Break(ending) = self.handle_event(event).await {
                return ControlFlow::Break(ending);
            }
        }
        ControlFlow::Continue(())
    }

    async fn handle_event(&mut self, event: InboundEvent) -> ControlFlow<Ending> {
        match event {
            InboundEvent::UserTranscription(text) => {
                self.turn.push_user(&text);
                self.emit(SessionEvent::UserTranscription(text));
            }
            InboundEvent::AssistantTranscription(text) => {
                self.turn.push_assistant(&text);
                self.emit(SessionEvent::AssistantTranscription(text));
            }
            InboundEvent::Audio(blob) => self.play(&blob),
            InboundEvent::ToolCalls(calls) => return self.run_tools(calls).await,
            InboundEvent::TurnComplete => {
                let messages = self.turn.flush();
                debug!(messages = messages.len(), "Turn complete");
                if self.state == AppState::Thinking && self.scheduler.is_idle() {
                    self.set_state(AppState::Listening);
                }
                self.emit(SessionEvent::TurnComplete(messages));
            }
            InboundEvent::Interrupted => {
                if let Some(output) = self.resources.output.as_deref_mut() {
                    let stopped = self.scheduler.interrupt(output);
                    debug!(stopped, "Model reply interrupted");
                }
                self.set_state(AppState::Listening);
            }
            InboundEvent::ToolCallCancellation(ids) => {
                // Calls run to completion before the next message is read
                debug!(?ids, "Ignoring cancellation of already handled tool calls");
            }
            InboundEvent::GoAway { time_left } => {
                warn!(?time_left, "Service will close the session soon");
            }
            InboundEvent::SetupComplete => trace!("Duplicate setupComplete"),
        }
        ControlFlow::Continue(())
    }

    fn play(&mut self, blob: &Blob) {
        let rate = blob.sample_rate().unwrap_or(self.audio.output_sample_rate);
        let buffer = match decode_inbound(&blob.data, rate, 1) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Skipping undecodable audio chunk: {}", e);
                return;
            }
        };
        let Some(output) = self.resources.output.as_deref_mut() else {
            return;
        };
        match self.scheduler.enqueue(output, &buffer) {
            Ok(chunk) => {
                trace!(chunk_id = chunk.id, start_at = chunk.start_at, "Queued model audio");
                self.set_state(AppState::Speaking);
            }
            Err(e) => warn!("Failed to schedule audio chunk: {}", e),
        }
    }

    /// Execute a batch of calls strictly in order, answering each before the next.
    async fn run_tools(&mut self, calls: Vec<FunctionCall>) -> ControlFlow<Ending> {
        self.set_state(AppState::Thinking);

        for call in calls {
            info!(call_id = %call.id, tool = %call.name, args = %call.args, "Tool call");
            self.emit(SessionEvent::ToolCall {
                name: call.name.clone(),
                args: call.args.clone(),
            });

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ControlFlow::Break(Ending::Local),
                result = self.dispatcher.execute(&call.name, &call.args) => result,
            };
            debug!(call_id = %call.id, success = result.success, "Tool finished");

            let response = ClientMessage::tool_response(call.id, call.name, &result);
            if let Err(e) = self.connection.send(response).await {
                warn!("Failed to send tool response: {}", e);
                return ControlFlow::Break(Ending::Failed(e));
            }
        }
        ControlFlow::Continue(())
    }

    fn on_chunk_finished(&mut self, id: ChunkId) {
        if self.scheduler.complete(id) && self.state == AppState::Speaking {
            self.set_state(AppState::Listening);
        }
    }

    fn send_audio(&mut self, block: &[f32]) {
        let message = ClientMessage::audio(block, self.audio.input_sample_rate);
        match self.connection.try_send(message) {
            Ok(()) => trace!(samples = block.len(), "Sent microphone block"),
            Err(LiveError::Closed) | Err(LiveError::NotConnected) => {}
            Err(e) => warn!("Dropping microphone block: {}", e),
        }
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    async fn shutdown(mut self, ending: Ending) {
        let reason = match ending {
            Ending::Local => {
                info!("Session closed by client");
                Some("closed by client".to_string())
            }
            Ending::Remote(reason) => {
                info!(?reason, "Session closed by service");
                reason
            }
            Ending::Failed(e) => {
                error!("Session channel error: {}", e);
                let reason = Some(e.to_string());
                self.emit(SessionEvent::Error(e));
                reason
            }
        };

        self.capture = None;
        self.resources.release();
        self.connection.shutdown().await;

        self.set_state(AppState::Idle);
        self.emit(SessionEvent::Closed { reason });
    }

    fn set_state(&mut self, state: AppState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "State change");
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("Session event receiver dropped");
        }
    }
}

async fn recv_capture(capture: &mut Option<mpsc::Receiver<Vec<f32>>>) -> Option<Vec<f32>> {
    match capture {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
