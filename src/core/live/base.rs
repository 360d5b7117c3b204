//! Remote conversational channel abstraction.
//!
//! A [`LiveConnector`] opens one bidirectional session with a hosted speech
//! model and hands back a [`LiveConnection`]: an outbound queue of client
//! messages and an inbound stream of [`ChannelEvent`]s. The transport task
//! behind the connection is owned by the connector implementation.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use zeroize::Zeroize;

use super::gemini::messages::{ClientMessage, ServerMessage};
use crate::core::tools::FunctionDeclaration;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the remote channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiveError {
    /// Connection to the service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The service rejected the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// The peer sent something that breaks the protocol
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// The channel was closed
    #[error("Channel closed")]
    Closed,

    /// The service ended the session abnormally
    #[error("Remote error: {0}")]
    Remote(String),
}

/// Result type for channel operations.
pub type LiveResult<T> = Result<T, LiveError>;

// =============================================================================
// Setup
// =============================================================================

/// Everything sent once when a session opens.
#[derive(Clone)]
pub struct LiveSetup {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,
    pub tools: Vec<FunctionDeclaration>,
    pub input_sample_rate: u32,
    /// How long to wait for the service to acknowledge the setup
    pub setup_timeout: Duration,
}

impl std::fmt::Debug for LiveSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSetup")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("tools", &self.tools.len())
            .field("input_sample_rate", &self.input_sample_rate)
            .field("setup_timeout", &self.setup_timeout)
            .finish()
    }
}

impl Drop for LiveSetup {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

// =============================================================================
// Connection
// =============================================================================

/// One item on the inbound side of a connection.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A protocol message from the service
    Message(Box<ServerMessage>),
    /// The transport failed; no further events follow
    Error(LiveError),
    /// The service closed the session normally; no further events follow
    Closed { reason: Option<String> },
}

/// An open session with the remote model.
///
/// Closing is idempotent. Dropping the outbound queue tells the transport task
/// to send a close frame and stop.
#[derive(Debug)]
pub struct LiveConnection {
    outbound: Option<mpsc::Sender<ClientMessage>>,
    inbound: mpsc::Receiver<ChannelEvent>,
    task: Option<JoinHandle<()>>,
}

impl LiveConnection {
    /// Wrap the two ends of a transport.
    pub fn new(
        outbound: mpsc::Sender<ClientMessage>,
        inbound: mpsc::Receiver<ChannelEvent>,
    ) -> Self {
        Self {
            outbound: Some(outbound),
            inbound,
            task: None,
        }
    }

    /// Attach the transport task so it can be awaited on close.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Queue a message, waiting for room.
    pub async fn send(&self, message: ClientMessage) -> LiveResult<()> {
        let sender = self.outbound.as_ref().ok_or(LiveError::NotConnected)?;
        sender.send(message).await.map_err(|_| LiveError::Closed)
    }

    /// Queue a message without waiting. A full queue drops the message.
    pub fn try_send(&self, message: ClientMessage) -> LiveResult<()> {
        let sender = self.outbound.as_ref().ok_or(LiveError::NotConnected)?;
        match sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LiveError::WebSocketError(
                "outbound queue full, message dropped".to_string(),
            )),
            Err(TrySendError::Closed(_)) => Err(LiveError::Closed),
        }
    }

    /// Next inbound event. `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.inbound.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }

    /// Stop sending and let the transport shut down.
    pub fn close(&mut self) {
        if self.outbound.take().is_some() {
            tracing::debug!("Live connection closing");
        }
        self.inbound.close();
    }

    /// Close and wait for the transport task to finish.
    pub async fn shutdown(&mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Opens sessions with a hosted speech model.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Connect and complete the setup handshake. Returns once the channel is open.
    async fn connect(&self, setup: &LiveSetup) -> LiveResult<LiveConnection>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::live::gemini::messages::ClientMessage;

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (out_tx, mut out_rx) = mpsc::channel(4);
        let (_in_tx, in_rx) = mpsc::channel(4);
        let mut connection = LiveConnection::new(out_tx, in_rx);

        connection
            .send(ClientMessage::audio(&[0.0; 4], 16000))
            .await
            .unwrap();
        assert!(out_rx.recv().await.is_some());

        connection.close();
        connection.close();
        assert!(connection.is_closed());
        assert_eq!(
            connection.try_send(ClientMessage::audio(&[0.0], 16000)),
            Err(LiveError::NotConnected)
        );
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_try_send_reports_full_queue() {
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (_in_tx, in_rx) = mpsc::channel(1);
        let connection = LiveConnection::new(out_tx, in_rx);

        assert!(connection.try_send(ClientMessage::audio(&[0.0], 16000)).is_ok());
        assert!(matches!(
            connection.try_send(ClientMessage::audio(&[0.0], 16000)),
            Err(LiveError::WebSocketError(_))
        ));
    }

    #[test]
    fn test_setup_debug_redacts_key() {
        let setup = LiveSetup {
            api_key: "secret-key".to_string(),
            endpoint: "wss://example.test".to_string(),
            model: "m".to_string(),
            voice: "v".to_string(),
            system_prompt: String::new(),
            tools: Vec::new(),
            input_sample_rate: 16000,
            setup_timeout: Duration::from_secs(1),
        };
        let debug = format!("{:?}", setup);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("REDACTED"));
    }
}
